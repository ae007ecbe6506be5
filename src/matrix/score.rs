use std::collections::HashSet;

pub const EXACT_SCORE: u8 = 100;
pub const CONTAINS_SCORE: u8 = 85;
const OVERLAP_BASE: u8 = 45;
const OVERLAP_STEP: usize = 10;
const OVERLAP_CAP: u8 = 80;

/// Tiered similarity between a normalized concern cell and a normalized
/// query. Returns 0 or a value in 45..=100. Token overlap is capped below the
/// containment tier so it can never outrank a substring hit.
pub fn score(cell: &str, query: &str) -> u8 {
    if cell.is_empty() || query.is_empty() {
        return 0;
    }
    if cell == query {
        return EXACT_SCORE;
    }
    if cell.contains(query) || query.contains(cell) {
        return CONTAINS_SCORE;
    }

    let query_tokens: Vec<&str> = query.split_whitespace().collect();
    let cell_tokens: HashSet<&str> = cell.split_whitespace().collect();
    if query_tokens.is_empty() || cell_tokens.is_empty() {
        return 0;
    }

    let overlap = query_tokens
        .iter()
        .filter(|token| cell_tokens.contains(*token))
        .count();
    let minimum = if query_tokens.len() <= 2 { 1 } else { 2 };
    if overlap < minimum {
        return 0;
    }

    let raw = usize::from(OVERLAP_BASE).saturating_add(overlap.saturating_mul(OVERLAP_STEP));
    raw.min(usize::from(OVERLAP_CAP)) as u8
}

/// Highest score over all variants, stopping at an exact hit.
pub fn best_variant_score(cell: &str, variants: &[String]) -> u8 {
    let mut best = 0;
    for variant in variants {
        best = best.max(score(cell, variant));
        if best == EXACT_SCORE {
            break;
        }
    }
    best
}
