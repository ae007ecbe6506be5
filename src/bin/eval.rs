use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use chatbot::chat::is_direct_match;
use chatbot::config::DEFAULT_DIRECT_THRESHOLD;
use chatbot::matrix;
use chatbot::models::MatchCandidate;
use chatbot::rules::MatchRules;
use chatbot::store::load_matrix_file;

#[derive(Parser, Debug)]
#[command(name = "eval")]
#[command(about = "Run a regression set of agent questions against the Service Matrix")]
struct Cli {
    #[arg(long)]
    matrix: PathBuf,
    #[arg(long, default_value = "eval/questions.jsonl")]
    file: String,
    #[arg(long)]
    rules: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_DIRECT_THRESHOLD)]
    threshold: u8,
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct EvalQuestion {
    id: String,
    question: String,
    #[serde(default)]
    expect_tab: Option<String>,
    /// 1-based, as shown in the spreadsheet.
    #[serde(default)]
    expect_row: Option<usize>,
    #[serde(default)]
    expect_direct: Option<bool>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rules = MatchRules::load(cli.rules.as_deref())?;
    let document = load_matrix_file(&cli.matrix)
        .with_context(|| format!("failed loading matrix {}", cli.matrix.display()))?;

    let questions = load_questions(&cli.file)?;
    if questions.is_empty() {
        anyhow::bail!("no questions found in {}", cli.file);
    }

    let mut total = 0usize;
    let mut passed = 0usize;
    let mut direct_count = 0usize;
    let mut no_candidate = 0usize;

    for item in questions {
        total += 1;
        let candidate = matrix::search(&document, &item.question, &rules);
        let direct = candidate
            .as_ref()
            .map(|candidate| is_direct_match(candidate, cli.threshold))
            .unwrap_or(false);
        if direct {
            direct_count += 1;
        }
        if candidate.is_none() {
            no_candidate += 1;
        }

        let failures = check_expectations(&item, candidate.as_ref(), cli.threshold);
        if failures.is_empty() {
            passed += 1;
        } else {
            println!("FAIL {}: {}", item.id, failures.join("; "));
        }

        if cli.verbose {
            println!("--- {} ---", item.id);
            println!("Q: {}", item.question);
            match &candidate {
                Some(c) => println!(
                    "Match: {} row {} score {} -> {}",
                    c.tab_name,
                    c.row_number(),
                    c.score,
                    c.answer_text.replace('\n', " | ")
                ),
                None => println!("Match: none"),
            }
            println!();
        }
    }

    println!("Eval questions: {}", total);
    println!("Expectation pass rate: {:.1}%", ratio(passed, total) * 100.0);
    println!("Direct-answer rate: {:.1}%", ratio(direct_count, total) * 100.0);
    println!("No-candidate rate: {:.1}%", ratio(no_candidate, total) * 100.0);

    Ok(())
}

fn load_questions(path: &str) -> Result<Vec<EvalQuestion>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed opening {}", path))?;
    parse_questions(&content, path)
}

fn parse_questions(content: &str, source: &str) -> Result<Vec<EvalQuestion>> {
    let mut questions = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parsed: EvalQuestion = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON at {} line {}", source, idx + 1))?;
        questions.push(parsed);
    }

    Ok(questions)
}

fn check_expectations(
    item: &EvalQuestion,
    candidate: Option<&MatchCandidate>,
    threshold: u8,
) -> Vec<String> {
    let mut failures = Vec::new();
    let direct = candidate
        .map(|candidate| is_direct_match(candidate, threshold))
        .unwrap_or(false);

    if let Some(tab) = &item.expect_tab {
        let actual = candidate.map(|c| c.tab_name.as_str());
        if actual != Some(tab.as_str()) {
            failures.push(format!("tab expected {tab}, got {actual:?}"));
        }
    }
    if let Some(row) = item.expect_row {
        let actual = candidate.map(|c| c.row_number());
        if actual != Some(row) {
            failures.push(format!("row expected {row}, got {actual:?}"));
        }
    }
    if let Some(expect_direct) = item.expect_direct {
        if expect_direct != direct {
            failures.push(format!("direct expected {expect_direct}, got {direct}"));
        }
    }

    failures
}

fn ratio(n: usize, d: usize) -> f32 {
    if d == 0 {
        return 0.0;
    }
    n as f32 / d as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbot::models::MatrixDocument;

    #[test]
    fn bundled_questions_hold_against_sample_matrix() {
        let document: MatrixDocument =
            serde_json::from_str(include_str!("../../data/sample_matrix.json")).unwrap();
        let questions = parse_questions(
            include_str!("../../eval/questions.jsonl"),
            "eval/questions.jsonl",
        )
        .unwrap();
        let rules = MatchRules::default();

        assert_eq!(questions.len(), 5);
        for item in &questions {
            let candidate = matrix::search(&document, &item.question, &rules);
            let failures =
                check_expectations(item, candidate.as_ref(), DEFAULT_DIRECT_THRESHOLD);
            assert!(failures.is_empty(), "{}: {}", item.id, failures.join("; "));
        }
    }

    #[test]
    fn wrong_row_is_reported() {
        let item: EvalQuestion = serde_json::from_str(
            r#"{"id": "key", "question": "lost key card", "expect_row": 5, "expect_direct": true}"#,
        )
        .unwrap();
        let candidate = MatchCandidate {
            score: 100,
            tab_name: "Front Desk".to_string(),
            row_index: 3,
            column_index: 1,
            matched_text: "Lost key card".to_string(),
            answer_text: "Verify identity before issuing a new key.".to_string(),
        };

        let failures = check_expectations(&item, Some(&candidate), DEFAULT_DIRECT_THRESHOLD);
        assert_eq!(failures, vec!["row expected 5, got Some(4)".to_string()]);
    }
}
