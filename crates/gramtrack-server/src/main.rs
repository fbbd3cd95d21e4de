mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use gramtrack_db::PoolConfig;
use gramtrack_engine::{Tracker, TrackQueue};
use gramtrack_scraper::ScraperClient;
use tracing_subscriber::EnvFilter;

/// How often the cookie pools clear failure state on aged-out credentials.
const COOKIE_AUTO_RESET_INTERVAL: Duration = Duration::from_secs(180);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = gramtrack_core::load_app_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();
    tracing::info!(?config, "starting gramtrack");

    let pool = gramtrack_db::connect_pool(
        &config.database_url,
        PoolConfig::from_app_config(&config),
    )
    .await?;
    let applied = gramtrack_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let scraper = Arc::new(ScraperClient::new(&config)?);
    scraper.spawn_cookie_auto_reset(COOKIE_AUTO_RESET_INTERVAL);

    let tracker = Arc::new(Tracker::new(pool.clone(), Arc::clone(&scraper), &config));
    let queue = TrackQueue::start(&config, tracker.into_runner());

    let scheduler =
        scheduler::build_scheduler(pool.clone(), Arc::clone(&queue), &config).await?;

    let bind_addr = config.bind_addr;
    let state = api::AppState {
        pool,
        queue,
        config: Arc::new(config),
        scheduler,
    };
    let app = api::build_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
