use std::net::SocketAddr;

use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Scheduler time zone; daily-metric dates are derived in this zone.
    pub timezone: Tz,
    /// Six-field cron for the daily enqueue-all tick.
    pub daily_cron: String,
    /// Six-field cron for the refresh tick; `None` disables it.
    pub refresh_cron: Option<String>,
    pub min_time_between_jobs_ms: u64,
    pub max_backoff_ms: u64,
    pub instagram_cookies: Vec<String>,
    pub twitter_cookies: Vec<String>,
    pub download_reels_to_r2: bool,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub scraper_request_timeout_secs: u64,
    pub scraper_user_agent: String,
    pub scraper_max_retries: u32,
    pub scraper_retry_backoff_base_ms: u64,
    /// Politeness delay between per-reel detail fetches.
    pub media_fetch_delay_ms: u64,
    pub cookie_reset_window_mins: u64,
    pub cookie_switch_delay_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("timezone", &self.timezone)
            .field("daily_cron", &self.daily_cron)
            .field("refresh_cron", &self.refresh_cron)
            .field("min_time_between_jobs_ms", &self.min_time_between_jobs_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("database_url", &"[redacted]")
            .field(
                "instagram_cookies",
                &format_args!("[{} credential(s)]", self.instagram_cookies.len()),
            )
            .field(
                "twitter_cookies",
                &format_args!("[{} credential(s)]", self.twitter_cookies.len()),
            )
            .field("download_reels_to_r2", &self.download_reels_to_r2)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field(
                "scraper_retry_backoff_base_ms",
                &self.scraper_retry_backoff_base_ms,
            )
            .field("media_fetch_delay_ms", &self.media_fetch_delay_ms)
            .field("cookie_reset_window_mins", &self.cookie_reset_window_mins)
            .field("cookie_switch_delay_secs", &self.cookie_switch_delay_secs)
            .finish()
    }
}
