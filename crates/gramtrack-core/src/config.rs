use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u16 = |var: &str, default: &str| -> Result<u16, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u16>().map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: bool| -> Result<bool, ConfigError> {
        match lookup(var) {
            Err(_) => Ok(default),
            Ok(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" | "" => Ok(false),
                other => Err(invalid(var, format!("not a boolean: {other}"))),
            },
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("GRAMTRACK_ENV", "development"));

    let port = parse_u16("PORT", "3000")?;
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let log_level = or_default("GRAMTRACK_LOG_LEVEL", "info");

    let timezone = {
        let raw = or_default("TZ", "Asia/Kolkata");
        raw.parse::<chrono_tz::Tz>()
            .map_err(|e| invalid("TZ", e.to_string()))?
    };

    let daily_cron = normalize_cron(&or_default("DAILY_CRON_SCHEDULE", "15 2 * * *"))
        .ok_or_else(|| invalid("DAILY_CRON_SCHEDULE", "must not be empty".to_string()))?;
    let refresh_cron = normalize_cron(&or_default("REFRESH_CRON_SCHEDULE", "0 */12 * * *"));

    let min_time_between_jobs_ms = parse_u64("MIN_TIME_BETWEEN_JOBS_MS", "300000")?;
    let max_backoff_ms = parse_u64("MAX_BACKOFF_MS", "1800000")?;

    let instagram_cookies = collect_credentials(&lookup, "INSTAGRAM_COOKIES")?;
    let twitter_cookies = collect_credentials(&lookup, "TWITTER_COOKIES")?;
    let download_reels_to_r2 = parse_bool("DOWNLOAD_REELS_TO_R2", false)?;

    let db_max_connections = parse_u32("GRAMTRACK_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("GRAMTRACK_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("GRAMTRACK_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scraper_request_timeout_secs = parse_u64("GRAMTRACK_SCRAPER_REQUEST_TIMEOUT_SECS", "30")?;
    let scraper_user_agent = or_default(
        "GRAMTRACK_SCRAPER_USER_AGENT",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/124.0.0.0 Safari/537.36",
    );
    let scraper_max_retries = parse_u32("GRAMTRACK_SCRAPER_MAX_RETRIES", "3")?;
    let scraper_retry_backoff_base_ms = parse_u64("GRAMTRACK_SCRAPER_RETRY_BACKOFF_BASE_MS", "1000")?;
    let media_fetch_delay_ms = parse_u64("GRAMTRACK_MEDIA_FETCH_DELAY_MS", "2000")?;
    let cookie_reset_window_mins = parse_u64("GRAMTRACK_COOKIE_RESET_WINDOW_MINS", "60")?;
    let cookie_switch_delay_secs = parse_u64("GRAMTRACK_COOKIE_SWITCH_DELAY_SECS", "30")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        timezone,
        daily_cron,
        refresh_cron,
        min_time_between_jobs_ms,
        max_backoff_ms,
        instagram_cookies,
        twitter_cookies,
        download_reels_to_r2,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_max_retries,
        scraper_retry_backoff_base_ms,
        media_fetch_delay_ms,
        cookie_reset_window_mins,
        cookie_switch_delay_secs,
    })
}

/// Collect scraping credentials for one platform from the environment.
///
/// Resolution order:
/// 1. `{prefix}_JSON` — a JSON array of credential strings; wins when set.
/// 2. `{prefix}` as the first credential, then `{prefix}_2`, `{prefix}_3`, …
///    until the first missing variable.
///
/// An empty result is not an error — the platform is simply untracked until
/// credentials are configured.
fn collect_credentials<F>(lookup: &F, prefix: &str) -> Result<Vec<String>, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let json_var = format!("{prefix}_JSON");
    if let Ok(raw) = lookup(&json_var) {
        let parsed: Vec<String> =
            serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidEnvVar {
                var: json_var,
                reason: format!("not a JSON array of strings: {e}"),
            })?;
        return Ok(parsed
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect());
    }

    let mut credentials = Vec::new();
    if let Ok(first) = lookup(prefix) {
        if !first.trim().is_empty() {
            credentials.push(first.trim().to_string());
        }
        let mut n = 2u32;
        while let Ok(next) = lookup(&format!("{prefix}_{n}")) {
            if !next.trim().is_empty() {
                credentials.push(next.trim().to_string());
            }
            n += 1;
        }
    }
    Ok(credentials)
}

/// Normalize a cron expression to the six-field (with seconds) form the
/// scheduler expects. Five-field crontab expressions get `0` prepended as
/// the seconds column. Returns `None` for an empty expression, which is how
/// the refresh tick is disabled.
fn normalize_cron(expr: &str) -> Option<String> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return None;
    }
    let fields = trimmed.split_whitespace().count();
    if fields == 5 {
        Some(format!("0 {trimmed}"))
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_environment(raw: &str) -> Environment {
    match raw.to_lowercase().as_str() {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
