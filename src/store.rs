use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use walkdir::WalkDir;

use crate::errors::StoreError;
use crate::models::{
    MatrixDocument, MatrixSummary, ReferenceDoc, ReloadResponse, Row, Sheet, TabSummary,
};

const MEMORY_SOURCE: &str = "<memory>";

/// Everything one request needs to answer from: the Matrix, the guides, and
/// where they came from. Never mutated after construction.
#[derive(Debug)]
pub struct MatrixSnapshot {
    pub document: MatrixDocument,
    pub guides: Vec<ReferenceDoc>,
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
    pub source: PathBuf,
}

impl MatrixSnapshot {
    pub fn in_memory(document: MatrixDocument, guides: Vec<ReferenceDoc>) -> Self {
        let mut hasher = Sha256::new();
        if let Ok(encoded) = serde_json::to_vec(&document) {
            hasher.update(encoded);
        }
        update_with_guides(&mut hasher, &guides);

        Self {
            document,
            guides,
            fingerprint: format!("{:x}", hasher.finalize()),
            loaded_at: Utc::now(),
            source: PathBuf::from(MEMORY_SOURCE),
        }
    }

    pub fn summary(&self) -> MatrixSummary {
        MatrixSummary {
            source: self.source.display().to_string(),
            fingerprint: self.fingerprint.clone(),
            loaded_at: self.loaded_at,
            tabs: self
                .document
                .tabs()
                .map(|(name, sheet)| TabSummary {
                    name: name.to_string(),
                    rows: sheet.row_count(),
                })
                .collect(),
            guide_count: self.guides.len(),
        }
    }
}

/// Holds the current snapshot. Readers clone the `Arc`; a reload swaps it
/// whole, so a request sees either the old or the new document.
#[derive(Clone)]
pub struct MatrixStore {
    matrix_path: PathBuf,
    guides_dir: Option<PathBuf>,
    current: Arc<RwLock<Arc<MatrixSnapshot>>>,
}

impl MatrixStore {
    pub async fn open(matrix_path: PathBuf, guides_dir: Option<PathBuf>) -> Result<Self> {
        let snapshot = load_snapshot(matrix_path.clone(), guides_dir.clone(), None)
            .await?
            .context("initial matrix load produced no snapshot")?;

        tracing::info!(
            source = %matrix_path.display(),
            tabs = snapshot.document.tab_count(),
            guides = snapshot.guides.len(),
            "service matrix loaded"
        );

        Ok(Self {
            matrix_path,
            guides_dir,
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        })
    }

    pub fn from_snapshot(snapshot: MatrixSnapshot) -> Self {
        Self {
            matrix_path: snapshot.source.clone(),
            guides_dir: None,
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    pub async fn snapshot(&self) -> Arc<MatrixSnapshot> {
        self.current.read().await.clone()
    }

    /// Re-reads the sources and swaps the snapshot when their fingerprint
    /// changed (or always, with `force`).
    pub async fn reload(&self, force: bool) -> Result<ReloadResponse> {
        if self.matrix_path.as_os_str() == MEMORY_SOURCE {
            anyhow::bail!("in-memory matrix cannot be reloaded");
        }

        let previous = self.snapshot().await;
        let known = (!force).then(|| previous.fingerprint.clone());
        let loaded =
            load_snapshot(self.matrix_path.clone(), self.guides_dir.clone(), known).await?;

        let Some(snapshot) = loaded else {
            tracing::info!(fingerprint = %previous.fingerprint, "service matrix unchanged");
            return Ok(ReloadResponse {
                reloaded: false,
                fingerprint: previous.fingerprint.clone(),
                loaded_at: previous.loaded_at,
            });
        };

        let response = ReloadResponse {
            reloaded: true,
            fingerprint: snapshot.fingerprint.clone(),
            loaded_at: snapshot.loaded_at,
        };
        tracing::info!(
            fingerprint = %snapshot.fingerprint,
            tabs = snapshot.document.tab_count(),
            guides = snapshot.guides.len(),
            "service matrix reloaded"
        );
        *self.current.write().await = Arc::new(snapshot);

        Ok(response)
    }
}

/// Loads matrix and guides off the async runtime. Returns `None` when the
/// fingerprint equals `known`, skipping the parse.
pub async fn load_snapshot(
    matrix_path: PathBuf,
    guides_dir: Option<PathBuf>,
    known: Option<String>,
) -> Result<Option<MatrixSnapshot>> {
    let loaded = tokio::task::spawn_blocking(move || read_snapshot(matrix_path, guides_dir, known))
        .await
        .map_err(|err| StoreError::Task(err.to_string()))??;

    Ok(loaded)
}

fn read_snapshot(
    matrix_path: PathBuf,
    guides_dir: Option<PathBuf>,
    known: Option<String>,
) -> Result<Option<MatrixSnapshot>, StoreError> {
    let bytes = std::fs::read(&matrix_path).map_err(|err| StoreError::io(&matrix_path, err))?;
    let guides = match &guides_dir {
        Some(dir) => load_guides(dir),
        None => Vec::new(),
    };

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    update_with_guides(&mut hasher, &guides);
    let fingerprint = format!("{:x}", hasher.finalize());

    if known.as_deref() == Some(fingerprint.as_str()) {
        return Ok(None);
    }

    let document = parse_matrix(&matrix_path, &bytes)?;
    Ok(Some(MatrixSnapshot {
        document,
        guides,
        fingerprint,
        loaded_at: Utc::now(),
        source: matrix_path,
    }))
}

/// Reads a matrix file, choosing the parser by extension.
pub fn load_matrix_file(path: &Path) -> Result<MatrixDocument, StoreError> {
    let bytes = std::fs::read(path).map_err(|err| StoreError::io(path, err))?;
    parse_matrix(path, &bytes)
}

fn parse_matrix(path: &Path, bytes: &[u8]) -> Result<MatrixDocument, StoreError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "json" => Ok(serde_json::from_slice(bytes)?),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => load_workbook(bytes),
        other => Err(StoreError::UnsupportedFormat(other.to_string())),
    }
}

/// Parses the bytes that were fingerprinted, never the path again, so the
/// document always matches its fingerprint.
fn load_workbook(bytes: &[u8]) -> Result<MatrixDocument, StoreError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let mut document = MatrixDocument::new();

    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        // ranges start at the first used cell; pad back to A1
        let (row_offset, col_offset) = range
            .start()
            .map(|(row, col)| (row as usize, col as usize))
            .unwrap_or((0, 0));

        let mut rows: Vec<Row> = (0..row_offset).map(|_| Row::default()).collect();
        for cells in range.rows() {
            let padded = std::iter::repeat(String::new())
                .take(col_offset)
                .chain(cells.iter().map(cell_text));
            rows.push(Row::new(padded));
        }

        document.insert(name, Sheet::new(rows));
    }

    Ok(document)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        Data::Float(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        other => other.to_string(),
    }
}

/// Every `.txt` / `.md` file under `dir`, in path order.
pub fn load_guides(dir: &Path) -> Vec<ReferenceDoc> {
    let mut guides = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("skipping guide entry under {}: {}", dir.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_guide_file(entry.path()) {
            continue;
        }

        match std::fs::read_to_string(entry.path()) {
            Ok(content) if !content.trim().is_empty() => {
                let name = entry
                    .path()
                    .strip_prefix(dir)
                    .unwrap_or(entry.path())
                    .display()
                    .to_string();
                guides.push(ReferenceDoc {
                    name,
                    content: content.trim().to_string(),
                });
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!("skipping unreadable guide {}: {}", entry.path().display(), err)
            }
        }
    }

    guides
}

fn is_guide_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "txt" | "md"))
        .unwrap_or(false)
}

fn update_with_guides(hasher: &mut Sha256, guides: &[ReferenceDoc]) {
    for guide in guides {
        hasher.update(guide.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(guide.content.as_bytes());
        hasher.update([0u8]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATRIX_JSON: &str = r##"{
        "Billing": [
            ["#", "Concern", "Instructions", "Slack"],
            ["1", "Guest was double charged", "Refund the duplicate", "Yes"]
        ],
        "Front Desk": [["1", "Late checkout", "Allow until noon"]]
    }"##;

    #[test]
    fn json_matrix_loads_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.json");
        std::fs::write(&path, MATRIX_JSON).unwrap();

        let document = load_matrix_file(&path).unwrap();
        let names: Vec<&str> = document.tabs().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Billing", "Front Desk"]);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.csv");
        std::fs::write(&path, "a,b").unwrap();

        let err = load_matrix_file(&path).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFormat(ext) if ext == "csv"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_matrix_file(Path::new("/nonexistent/matrix.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/matrix.json"));
    }

    #[test]
    fn workbook_cells_keep_spreadsheet_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Matrix").unwrap();
        // leave row 1 and column A empty so the used range starts at B2
        sheet.write_string(1, 1, "Concern").unwrap();
        sheet.write_string(1, 2, "Instructions").unwrap();
        sheet.write_string(2, 1, "Noise complaint").unwrap();
        sheet.write_string(2, 2, "Offer room move").unwrap();
        sheet.write_number(2, 3, 3.0).unwrap();
        workbook.save(&path).unwrap();

        let document = load_matrix_file(&path).unwrap();
        let matrix = document.tab("Matrix").unwrap();

        assert!(matrix.rows()[0].is_empty());
        assert_eq!(matrix.rows()[1].concern_cell(), Some((1, "Concern")));
        assert_eq!(matrix.rows()[2].cells(), &["", "Noise complaint", "Offer room move", "3"]);
    }

    #[test]
    fn workbook_is_parsed_from_fingerprinted_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Billing").unwrap();
        sheet.write_string(0, 1, "Concern").unwrap();
        sheet.write_string(1, 1, "Parking fee").unwrap();
        sheet.write_string(1, 2, "Waive once").unwrap();
        workbook.save(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // the file on disk is replaced after it was read
        std::fs::write(&path, b"not a workbook").unwrap();

        let document = parse_matrix(&path, &bytes).unwrap();
        let billing = document.tab("Billing").unwrap();
        assert_eq!(billing.rows()[1].remedy_cell(), Some("Waive once"));
    }

    #[test]
    fn guides_are_loaded_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("qa")).unwrap();
        std::fs::write(dir.path().join("qa/rubric.md"), "Greet the guest by name.").unwrap();
        std::fs::write(dir.path().join("a_training.txt"), "Always verify identity.").unwrap();
        std::fs::write(dir.path().join("notes.pdf"), "ignored").unwrap();
        std::fs::write(dir.path().join("empty.txt"), "   ").unwrap();

        let guides = load_guides(dir.path());
        let names: Vec<&str> = guides.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["a_training.txt", "qa/rubric.md"]);
    }

    #[tokio::test]
    async fn reload_skips_unchanged_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.json");
        std::fs::write(&path, MATRIX_JSON).unwrap();

        let store = MatrixStore::open(path.clone(), None).await.unwrap();
        let first = store.snapshot().await;

        let unchanged = store.reload(false).await.unwrap();
        assert!(!unchanged.reloaded);
        assert_eq!(unchanged.fingerprint, first.fingerprint);

        std::fs::write(&path, r#"{"Billing": [["1", "Parking fee", "Waive once"]]}"#).unwrap();
        let changed = store.reload(false).await.unwrap();
        assert!(changed.reloaded);
        assert_ne!(changed.fingerprint, first.fingerprint);

        // the old snapshot handed out earlier is untouched
        assert_eq!(first.document.tab_count(), 2);
        assert_eq!(store.snapshot().await.document.tab_count(), 1);

        let forced = store.reload(true).await.unwrap();
        assert!(forced.reloaded);
        assert_eq!(forced.fingerprint, changed.fingerprint);
    }

    #[tokio::test]
    async fn in_memory_store_refuses_reload() {
        let store = MatrixStore::from_snapshot(MatrixSnapshot::in_memory(
            MatrixDocument::new(),
            vec![],
        ));
        assert!(store.reload(true).await.is_err());
        assert_eq!(store.snapshot().await.summary().source, "<memory>");
    }
}
