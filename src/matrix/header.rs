use std::collections::HashMap;

use super::normalize::normalize;
use crate::models::Row;
use crate::rules::MatchRules;

/// First row within the scan window whose cells mention a header token.
/// Title rows and banners above the header are tolerated.
pub fn detect_header_row(rows: &[Row], rules: &MatchRules) -> Option<usize> {
    rows.iter()
        .take(rules.header_scan_rows)
        .position(|row| {
            let joined = row
                .cells()
                .iter()
                .map(|cell| normalize(cell))
                .collect::<Vec<_>>()
                .join(" | ");
            rules.header_tokens.iter().any(|token| {
                let token = normalize(token);
                !token.is_empty() && joined.contains(&token)
            })
        })
}

/// Normalized label to column index. The leftmost column wins when a label
/// repeats.
pub fn build_header_map(header_row: Option<&Row>) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    let Some(row) = header_row else {
        return map;
    };

    for (index, cell) in row.cells().iter().enumerate() {
        let label = normalize(cell);
        if label.is_empty() {
            continue;
        }
        map.entry(label).or_insert(index);
    }
    map
}
