use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Column holding the free-text concern (spreadsheet column B).
pub const CONCERN_COLUMN: usize = 1;
/// Column holding the pre-authored remedy (spreadsheet column C).
pub const REMEDY_COLUMN: usize = 2;

/// One spreadsheet row. Cells are positional: index 1 is column B.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Row {
    cells: Vec<String>,
}

impl Row {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    /// Concern text and the column it was read from. Single-cell rows carry
    /// the concern in column A.
    pub fn concern_cell(&self) -> Option<(usize, &str)> {
        let column = if self.cells.len() < 2 { 0 } else { CONCERN_COLUMN };
        self.cell(column).map(|text| (column, text))
    }

    pub fn remedy_cell(&self) -> Option<&str> {
        self.cell(REMEDY_COLUMN)
    }

    fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(cells) => Self {
                cells: cells.into_iter().map(cell_from_json).collect(),
            },
            _ => Self::default(),
        }
    }
}

fn cell_from_json(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text,
        serde_json::Value::Bool(flag) => flag.to_string(),
        serde_json::Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Sheet {
    rows: Vec<Row>,
}

impl Sheet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(rows) => Self {
                rows: rows.into_iter().map(Row::from_json).collect(),
            },
            _ => Self::default(),
        }
    }
}

/// Tab name to sheet, kept in authoring order. The order decides ties
/// during a search, so it is never re-sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixDocument {
    tabs: Vec<(String, Sheet)>,
}

impl MatrixDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tab, replacing an existing tab of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, sheet: Sheet) {
        let name = name.into();
        match self.tabs.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = sheet,
            None => self.tabs.push((name, sheet)),
        }
    }

    pub fn with_tab(mut self, name: impl Into<String>, sheet: Sheet) -> Self {
        self.insert(name, sheet);
        self
    }

    pub fn tab(&self, name: &str) -> Option<&Sheet> {
        self.tabs
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, sheet)| sheet)
    }

    pub fn tabs(&self) -> impl Iterator<Item = (&str, &Sheet)> {
        self.tabs.iter().map(|(name, sheet)| (name.as_str(), sheet))
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }
}

impl Serialize for MatrixDocument {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_map(self.tabs.iter().map(|(name, sheet)| (name, sheet)))
    }
}

impl<'de> Deserialize<'de> for MatrixDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = MatrixDocument;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of tab name to rows of cells")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut document = MatrixDocument::new();
                while let Some((name, rows)) = map.next_entry::<String, serde_json::Value>()? {
                    document.insert(name, Sheet::from_json(rows));
                }
                Ok(document)
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Best row found for one question. Lives only for a single search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub score: u8,
    pub tab_name: String,
    pub row_index: usize,
    pub column_index: usize,
    pub matched_text: String,
    pub answer_text: String,
}

impl MatchCandidate {
    /// Spreadsheet row number as an agent would see it.
    pub fn row_number(&self) -> usize {
        self.row_index + 1
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceDoc {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub tab_name: String,
    pub row_number: usize,
    pub concern_column: String,
    pub remedy_column: String,
    pub snippet: String,
    pub score: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    MatrixDirect,
    Generative,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer_markdown: String,
    pub citations: Vec<Citation>,
    pub mode: AnswerMode,
    pub match_score: Option<u8>,
    pub latency_ms: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReloadRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabSummary {
    pub name: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixSummary {
    pub source: String,
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
    pub tabs: Vec<TabSummary>,
    pub guide_count: usize,
}
