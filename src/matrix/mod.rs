//! Direct-match lookup against the Service Matrix.
//!
//! A question is normalized, expanded through the alias table and compared
//! with the concern column of every row of every tab. The best row that also
//! carries an actionable remedy or routing flag is returned; whether it is
//! confident enough to bypass generation is decided by the caller.

pub mod extract;
pub mod header;
pub mod normalize;
pub mod score;

use crate::models::{MatchCandidate, MatrixDocument};
use crate::rules::MatchRules;

pub use extract::extract_answer;
pub use header::{build_header_map, detect_header_row};
pub use normalize::{expand_variants, is_absent, normalize, normalize_yes_no};
pub use score::{best_variant_score, score};

/// Scans the whole document and returns the highest-scoring row with an
/// answer. Ties go to the earlier tab, then the earlier row.
pub fn search(
    document: &MatrixDocument,
    question: &str,
    rules: &MatchRules,
) -> Option<MatchCandidate> {
    let normalized = normalize(question);
    if normalized.is_empty() {
        return None;
    }

    let variants = expand_variants(&normalized, rules);
    let mut best: Option<MatchCandidate> = None;

    for (tab_name, sheet) in document.tabs() {
        let header_index = detect_header_row(sheet.rows(), rules);
        let header_map = build_header_map(header_index.and_then(|index| sheet.row(index)));

        for (row_index, row) in sheet.rows().iter().enumerate() {
            let Some((column_index, concern)) = row.concern_cell() else {
                continue;
            };
            // plain emptiness: a concern reading "N/A" is still searchable
            let cell = normalize(concern);
            if cell.is_empty() {
                continue;
            }

            let row_score = best_variant_score(&cell, &variants);
            if row_score == 0 {
                continue;
            }

            let Some(answer_text) = extract_answer(row, &header_map, rules) else {
                continue;
            };

            let improves = best
                .as_ref()
                .map_or(true, |current| row_score > current.score);
            if improves {
                best = Some(MatchCandidate {
                    score: row_score,
                    tab_name: tab_name.to_string(),
                    row_index,
                    column_index,
                    matched_text: concern.trim().to_string(),
                    answer_text,
                });
            }
        }
    }

    match &best {
        Some(candidate) => tracing::debug!(
            score = candidate.score,
            tab = %candidate.tab_name,
            row = candidate.row_number(),
            variants = variants.len(),
            "matrix candidate selected"
        ),
        None => tracing::debug!(variants = variants.len(), "no matrix candidate"),
    }

    best
}
