use std::io;

use thiserror::Error;

/// Failures while loading the Service Matrix or its reference guides.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported matrix format '{0}' (expected xlsx, xlsm, xlsb, xls, ods or json)")]
    UnsupportedFormat(String),
    #[error("failed reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Workbook(#[from] calamine::Error),
    #[error("invalid matrix JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("matrix load task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
