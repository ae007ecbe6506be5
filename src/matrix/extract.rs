use std::collections::HashMap;

use super::normalize::{is_absent, normalize, normalize_yes_no};
use crate::models::Row;
use crate::rules::MatchRules;

/// Remedy text for a matched row, followed by any routing flags the header
/// exposes. `None` means the row has nothing an agent could act on.
pub fn extract_answer(
    row: &Row,
    header_map: &HashMap<String, usize>,
    rules: &MatchRules,
) -> Option<String> {
    let base = row
        .remedy_cell()
        .filter(|remedy| !is_absent(remedy))
        .map(|remedy| remedy.trim().to_string());

    let mut extras = Vec::new();
    for flag in &rules.flags {
        let Some(&column) = header_map.get(&normalize(&flag.label)) else {
            continue;
        };
        let Some(raw) = row.cell(column) else {
            continue;
        };

        let value = normalize_yes_no(raw);
        if is_absent(&value) {
            continue;
        }
        extras.push(format!("{}: {}", flag.display, value));
    }

    match (base, extras.is_empty()) {
        (None, true) => None,
        (Some(base), true) => Some(base),
        (None, false) => Some(extras.join("\n")),
        (Some(base), false) => Some(format!("{base}\n\n{}", extras.join("\n"))),
    }
}
