use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chatbot::chat::is_direct_match;
use chatbot::config::DEFAULT_DIRECT_THRESHOLD;
use chatbot::matrix;
use chatbot::rules::MatchRules;
use chatbot::store::load_matrix_file;

#[derive(Parser, Debug)]
#[command(name = "lookup")]
#[command(about = "Look up one agent question against a Service Matrix file")]
struct Cli {
    #[arg(long)]
    matrix: PathBuf,
    #[arg(long)]
    rules: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_DIRECT_THRESHOLD)]
    threshold: u8,
    question: Vec<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let question = cli.question.join(" ");
    let rules = MatchRules::load(cli.rules.as_deref())?;
    let document = load_matrix_file(&cli.matrix)
        .with_context(|| format!("failed loading matrix {}", cli.matrix.display()))?;

    match matrix::search(&document, &question, &rules) {
        Some(candidate) => {
            let route = if is_direct_match(&candidate, cli.threshold) {
                "direct"
            } else {
                "fallback"
            };
            println!("{}", serde_json::to_string_pretty(&candidate)?);
            println!(
                "route={} ({} row {}, score {} vs threshold {})",
                route,
                candidate.tab_name,
                candidate.row_number(),
                candidate.score,
                cli.threshold
            );
        }
        None => println!("route=fallback (no matrix candidate)"),
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
