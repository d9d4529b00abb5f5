use insight_core::config::AppConfig;
use insight_core::llm::HttpLlmClient;
use insight_server::{serve, AppState};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
    dotenvy::dotenv().ok();

    let cfg = AppConfig::from_env()?;
    let transport = Arc::new(HttpLlmClient::new(cfg.provider));
    let state = Arc::new(AppState::new(transport, cfg.pipeline));
    serve(state).await
}
