mod config;
mod crawler;
mod error;
mod normalizer;
mod storage;

use config::Config;
use crawler::service::ScrapingService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cfg = Config::from_env()?;
    let service = ScrapingService::new(cfg).await?;
    let summary = service.run().await?;

    tracing::info!(?summary, "Success");
    Ok(())
}
