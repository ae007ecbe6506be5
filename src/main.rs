use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use chatbot::chat::ChatService;
use chatbot::fallback::EscalationFallback;
use chatbot::rules::MatchRules;
use chatbot::store::MatrixStore;
use chatbot::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    let rules = Arc::new(MatchRules::load(config.matrix.rules_path.as_deref())?);
    let store = MatrixStore::open(
        config.matrix.matrix_path.clone(),
        config.matrix.guides_dir.clone(),
    )
    .await?;

    let generation_limit = Arc::new(Semaphore::new(config.fallback.max_concurrent));

    let chat = ChatService::new(
        config.clone(),
        store,
        rules,
        Arc::new(EscalationFallback),
        generation_limit,
    );

    run_server(config, chat).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
