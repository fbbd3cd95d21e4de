//! Offline unit tests for gramtrack-db pool configuration and row types.
//! These tests do not require a live database connection.

use gramtrack_core::{AppConfig, Environment};
use gramtrack_db::{PoolConfig, ProfileRow, ReelRow};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        timezone: chrono_tz::Asia::Kolkata,
        daily_cron: "0 15 2 * * *".to_string(),
        refresh_cron: None,
        min_time_between_jobs_ms: 300_000,
        max_backoff_ms: 1_800_000,
        instagram_cookies: vec![],
        twitter_cookies: vec![],
        download_reels_to_r2: false,
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        scraper_request_timeout_secs: 30,
        scraper_user_agent: "ua".to_string(),
        scraper_max_retries: 3,
        scraper_retry_backoff_base_ms: 1000,
        media_fetch_delay_ms: 2000,
        cookie_reset_window_mins: 60,
        cookie_switch_delay_secs: 30,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

/// Compile-time smoke test: confirm that [`ProfileRow`] has all expected
/// fields with the correct types, and that the session boundary applies the
/// one-second skew tolerance. No database required.
#[test]
fn profile_row_session_start_applies_skew_tolerance() {
    use chrono::Utc;

    let now = Utc::now();
    let row = ProfileRow {
        id: 1,
        platform: "instagram".to_string(),
        username: "alice".to_string(),
        account_id: None,
        display_name: None,
        avatar_url: None,
        biography: None,
        external_url: None,
        user_id: None,
        tracking_id: "trk-1".to_string(),
        followers: 100,
        following: 50,
        media_count: 10,
        reel_count: 3,
        last_snapshot_id: None,
        created_at: now,
        updated_at: now,
    };

    assert_eq!(row.session_start(), now - chrono::Duration::seconds(1));
}

#[test]
fn reel_row_video_condition_covers_both_paths() {
    use chrono::Utc;

    let base = ReelRow {
        id: 1,
        profile_id: 1,
        shortcode: "R1".to_string(),
        view_count: 0,
        like_count: 0,
        comment_count: 0,
        views_delta: 0,
        likes_delta: 0,
        comments_delta: 0,
        is_video: false,
        video_url: None,
        video_mirror_url: None,
        display_url: None,
        duration_secs: None,
        avg_watch_time_secs: None,
        taken_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    assert!(!base.is_reel());

    let flagged = ReelRow {
        is_video: true,
        ..base.clone()
    };
    assert!(flagged.is_reel());

    let with_url = ReelRow {
        video_url: Some("https://cdn.example.com/v.mp4".to_string()),
        ..base
    };
    assert!(with_url.is_reel(), "acquiring a video URL also qualifies");
}
