use gramtrack_core::AppConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

mod daily_metrics;
mod deltas;
mod profiles;
mod reel_metrics;
mod reels;
mod replies;
mod snapshots;

pub use daily_metrics::{
    get_daily_metric, get_previous_daily_metric, insert_daily_metric, latest_daily_metric_since,
    update_daily_metric_for_today, DailyCloseUpdate, DailyMetricRow, NewDailyMetric,
};
pub use deltas::{insert_delta, latest_delta_since, DeltaRow};
pub use profiles::{
    get_profile_by_handle, get_profile_by_id, get_profile_by_tracking_id, insert_profile,
    list_profiles, open_session, set_last_snapshot, update_profile_meta, ProfileFields, ProfileRow,
};
pub use reel_metrics::{insert_reel_metric, list_reel_metrics_since, ReelMetricRow};
pub use reels::{
    get_reel, list_recent_reels, list_reel_shortcodes, list_video_reels, upsert_reel, ReelRow,
    ReelUpsert,
};
pub use replies::{list_replies_for_reel, upsert_reply, NewReply, ReplyRow};
pub use snapshots::{
    get_recent_snapshots, get_snapshots_since, insert_snapshot, latest_snapshot_since,
    NewSnapshot, SnapshotRow,
};

// Path relative to crates/gramtrack-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("record not found")]
    NotFound,
    #[error("uniqueness conflict on {context}")]
    Conflict { context: &'static str },
    #[error(transparent)]
    Config(#[from] gramtrack_core::ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// Maps a unique-violation database error to [`DbError::Conflict`] so the
    /// pipeline can re-read and update instead of failing the run. Any other
    /// error passes through as [`DbError::Sqlx`].
    pub(crate) fn from_insert(err: sqlx::Error, context: &'static str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict { context }
            }
            _ => DbError::Sqlx(err),
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound)
    }
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Connect to a Postgres pool, reading `DATABASE_URL` and pool settings from env.
///
/// # Errors
///
/// Returns [`DbError::Config`] if configuration is missing/invalid, or
/// [`DbError::Sqlx`] if the connection cannot be established.
pub async fn connect_pool_from_env() -> Result<PgPool, DbError> {
    let app_config = gramtrack_core::load_app_config_from_env()?;
    let pool_config = PoolConfig::from_app_config(&app_config);
    connect_pool(&app_config.database_url, pool_config)
        .await
        .map_err(DbError::from)
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // Count applied migrations before running. The _sqlx_migrations table may not
    // exist yet on a fresh database; treat absence as zero applied.
    let applied_before = applied_migrations_count(pool).await?;

    MIGRATOR.run(pool).await?;

    let applied_after = applied_migrations_count(pool).await?;

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

async fn applied_migrations_count(pool: &PgPool) -> Result<i64, sqlx::migrate::MigrateError> {
    let query = "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true";
    match sqlx::query_scalar::<_, i64>(query).fetch_one(pool).await {
        Ok(count) => Ok(count),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("42P01") => {
            // Fresh DB before first migration run: migration table does not exist yet.
            Ok(0)
        }
        Err(err) => Err(sqlx::migrate::MigrateError::Execute(err)),
    }
}
