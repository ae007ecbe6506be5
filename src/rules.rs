//! Data tables that drive the Matrix resolver.
//!
//! Everything here can be overridden from a JSON file so new synonyms or
//! routing columns do not need a code change. Fields missing from the file
//! keep their built-in values.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Phrase expansions applied when any trigger occurs in a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRule {
    pub triggers: Vec<String>,
    pub expansions: Vec<String>,
}

/// An auxiliary routing column, matched by its normalized header label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagLabel {
    pub label: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRules {
    #[serde(default = "default_aliases")]
    pub aliases: Vec<AliasRule>,
    #[serde(default = "default_flags")]
    pub flags: Vec<FlagLabel>,
    #[serde(default = "default_header_tokens")]
    pub header_tokens: Vec<String>,
    #[serde(default = "default_header_scan_rows")]
    pub header_scan_rows: usize,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
            flags: default_flags(),
            header_tokens: default_header_tokens(),
            header_scan_rows: default_header_scan_rows(),
        }
    }
}

impl MatchRules {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid match rules JSON")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading match rules: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("failed parsing match rules: {}", path.display()))
    }

    /// Loads the rules file when one is configured, otherwise the built-ins.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

fn default_aliases() -> Vec<AliasRule> {
    let double_charge = ["double charged", "charged twice", "double charge"];
    vec![
        AliasRule {
            triggers: strings(&double_charge),
            expansions: strings(&[
                "double charged",
                "charged twice",
                "double charge",
                "duplicate charge",
            ]),
        },
        AliasRule {
            triggers: strings(&["early departure"]),
            expansions: strings(&[
                "early departure after check in",
                "early departure after check-in",
            ]),
        },
    ]
}

fn default_flags() -> Vec<FlagLabel> {
    [
        ("slack", "Slack"),
        ("refund queue", "Refund Queue"),
        ("create a ticket", "Create a Ticket"),
        ("supervisor", "Supervisor"),
    ]
    .into_iter()
    .map(|(label, display)| FlagLabel {
        label: label.to_string(),
        display: display.to_string(),
    })
    .collect()
}

fn default_header_tokens() -> Vec<String> {
    strings(&["instructions", "concern", "issue"])
}

fn default_header_scan_rows() -> usize {
    40
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_builtin_tables() {
        let rules = MatchRules::from_json(
            r#"{"aliases": [{"triggers": ["lost key"], "expansions": ["key card replacement"]}]}"#,
        )
        .unwrap();

        assert_eq!(rules.aliases.len(), 1);
        assert_eq!(rules.aliases[0].expansions, vec!["key card replacement"]);
        assert_eq!(rules.flags, MatchRules::default().flags);
        assert_eq!(rules.header_scan_rows, 40);
    }

    #[test]
    fn builtin_flags_keep_display_order() {
        let rules = MatchRules::default();
        let displays: Vec<&str> = rules
            .flags
            .iter()
            .map(|flag| flag.display.as_str())
            .collect();
        assert_eq!(
            displays,
            vec!["Slack", "Refund Queue", "Create a Ticket", "Supervisor"]
        );
    }

    #[test]
    fn missing_rules_file_is_an_error() {
        let err = MatchRules::load(Some(Path::new("/nonexistent/rules.json"))).unwrap_err();
        assert!(err.to_string().contains("failed reading match rules"));
    }
}
