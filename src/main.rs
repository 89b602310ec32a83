//! Mirror Debate Gateway server entry point.

use std::sync::Arc;

use anyhow::Context;
use mimalloc::MiMalloc;

use mirror_debate_gateway::config::AppConfig;
use mirror_debate_gateway::{init_tracing, server};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load().context("failed to load configuration")?;

    // Initialize tracing (M-LOG-STRUCTURED)
    init_tracing(config.server.log_json);

    server::start_server(Arc::new(config)).await
}
