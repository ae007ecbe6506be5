use crate::rules::MatchRules;

const ABSENT_VALUES: [&str; 8] = ["", "no", "n", "none", "na", "n a", "0", "false"];

/// Lower-cases, drops everything except letters, digits and whitespace, and
/// collapses whitespace to single spaces. Applied to cells, header labels and
/// questions alike.
pub fn normalize(value: &str) -> String {
    let kept: String = value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True for blank or explicitly negative cell values.
pub fn is_absent(value: &str) -> bool {
    let normalized = normalize(value);
    ABSENT_VALUES.contains(&normalized.as_str())
}

/// Folds yes/no spellings to "Yes"/"No"; free text such as a channel name is
/// returned trimmed but otherwise untouched.
pub fn normalize_yes_no(value: &str) -> String {
    match normalize(value).as_str() {
        "y" | "yes" | "true" | "1" => "Yes".to_string(),
        "n" | "no" | "false" | "0" => "No".to_string(),
        _ => value.trim().to_string(),
    }
}

/// The question plus every alias expansion it triggers, deduplicated in
/// first-seen order.
pub fn expand_variants(normalized_question: &str, rules: &MatchRules) -> Vec<String> {
    let mut variants = Vec::new();
    push_variant(&mut variants, normalized_question.to_string());

    for rule in &rules.aliases {
        let triggered = rule.triggers.iter().any(|trigger| {
            let trigger = normalize(trigger);
            !trigger.is_empty() && normalized_question.contains(&trigger)
        });
        if !triggered {
            continue;
        }

        for expansion in &rule.expansions {
            push_variant(&mut variants, normalize(expansion));
        }
    }

    variants
}

fn push_variant(variants: &mut Vec<String>, variant: String) {
    if variant.is_empty() || variants.contains(&variant) {
        return;
    }
    variants.push(variant);
}
