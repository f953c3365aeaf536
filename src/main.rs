use anyhow::{anyhow, Context};
use tokio::net::TcpListener;

use mediawatch::app;
use mediawatch::config::AppConfig;
use mediawatch::logging::{init_logging, LoggingConfig};
use mediawatch::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    let logging = LoggingConfig::from_env().map_err(|e| anyhow!(e))?;
    init_logging(logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let config = AppConfig::from_env().map_err(|e| anyhow!(e))?;
    config.validate().map_err(|e| anyhow!(e))?;

    tracing::info!(
        "🗂️ Reports stored in {} (missing text: {}, unmatched sentiment: {})",
        config.report_dir.display(),
        config.missing_text_policy.as_str(),
        config.unmatched_sentiment_policy.as_str()
    );

    let addr = config.bind_addr;
    let state = AppState::from_config(config).context("Failed to build application state")?;
    let app = app::create_app(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("🚀 Media monitoring backend running at http://{}/", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
