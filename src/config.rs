use std::env;
use std::path::PathBuf;

/// Score at or above which a Matrix row is served without generation.
pub const DEFAULT_DIRECT_THRESHOLD: u8 = 70;

#[derive(Clone, Debug)]
pub struct MatrixConfig {
    pub matrix_path: PathBuf,
    pub guides_dir: Option<PathBuf>,
    pub rules_path: Option<PathBuf>,
    pub direct_threshold: u8,
}

#[derive(Clone, Debug)]
pub struct FallbackConfig {
    pub max_context_chars: usize,
    pub max_concurrent: usize,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub matrix: MatrixConfig,
    pub fallback: FallbackConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("COMPLIANCE_BIND")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            matrix: MatrixConfig {
                matrix_path: env::var("MATRIX_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data/service_matrix.xlsx")),
                guides_dir: optional_path("GUIDES_DIR"),
                rules_path: optional_path("MATRIX_RULES_PATH"),
                direct_threshold: parsed_var("MATRIX_DIRECT_THRESHOLD")
                    .map(|value: u8| value.min(100))
                    .unwrap_or(DEFAULT_DIRECT_THRESHOLD),
            },
            fallback: FallbackConfig {
                max_context_chars: parsed_var("FALLBACK_MAX_CONTEXT_CHARS").unwrap_or(24_000),
                max_concurrent: parsed_var("FALLBACK_MAX_CONCURRENT")
                    .map(|value: usize| value.max(1))
                    .unwrap_or(2),
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            matrix: MatrixConfig {
                matrix_path: PathBuf::from("./data/service_matrix.xlsx"),
                guides_dir: None,
                rules_path: None,
                direct_threshold: DEFAULT_DIRECT_THRESHOLD,
            },
            fallback: FallbackConfig {
                max_context_chars: 24_000,
                max_concurrent: 2,
            },
        }
    }
}

fn optional_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
