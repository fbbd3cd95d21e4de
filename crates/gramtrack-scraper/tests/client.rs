//! Integration tests for `ScraperClient` using wiremock HTTP mocks.

use gramtrack_core::{AppConfig, Environment, Platform};
use gramtrack_scraper::{ScraperClient, ScraperError};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use wiremock::matchers::{method, path, query_param, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(cookies: Vec<String>) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        timezone: chrono_tz::Asia::Kolkata,
        daily_cron: "0 15 2 * * *".to_string(),
        refresh_cron: None,
        min_time_between_jobs_ms: 300_000,
        max_backoff_ms: 1_800_000,
        instagram_cookies: cookies.clone(),
        twitter_cookies: cookies,
        download_reels_to_r2: false,
        db_max_connections: 10,
        db_min_connections: 1,
        db_acquire_timeout_secs: 10,
        scraper_request_timeout_secs: 5,
        scraper_user_agent: "gramtrack-test/0.1".to_string(),
        // Backoff disabled so retry paths run instantly under test.
        scraper_max_retries: 1,
        scraper_retry_backoff_base_ms: 0,
        media_fetch_delay_ms: 0,
        cookie_reset_window_mins: 60,
        cookie_switch_delay_secs: 30,
    }
}

fn client_for(server: &MockServer, cookies: &[&str]) -> ScraperClient {
    let config = test_config(cookies.iter().map(|c| (*c).to_string()).collect());
    ScraperClient::with_base_urls(&config, &server.uri(), &server.uri())
        .expect("client construction should not fail")
}

fn profile_body() -> serde_json::Value {
    serde_json::json!({
        "data": { "user": {
            "id": "99887766",
            "full_name": "Alice",
            "biography": "hello",
            "profile_pic_url_hd": "https://cdn.example.com/alice.jpg",
            "edge_followed_by": { "count": 100 },
            "edge_follow": { "count": 50 },
            "edge_owner_to_timeline_media": {
                "count": 10,
                "edges": [ { "node": { "shortcode": "R1", "is_video": true } } ]
            },
            "edge_felix_video_timeline": { "count": 3 }
        }}
    })
}

#[tokio::test]
async fn fetch_profile_parses_and_clears_failure_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .and(query_param("username", "alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .mount(&server)
        .await;

    let client = client_for(&server, &["sessionid=a"]);
    let profile = client
        .fetch_profile(Platform::Instagram, "alice")
        .await
        .expect("should parse profile");

    assert_eq!(profile.followers, 100);
    assert_eq!(profile.reel_count, 3);
    assert_eq!(profile.recent_media.len(), 1);

    let status = client.cookie_status(Platform::Instagram);
    assert_eq!(status.credentials[0].failures, 0);
}

#[tokio::test]
async fn http_429_is_a_rate_limit_and_advances_the_pool() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = client_for(&server, &["sessionid=a", "sessionid=b"]);
    let result = client.fetch_profile(Platform::Instagram, "alice").await;

    let Err(ScraperError::RateLimited {
        platform,
        retry_after_secs,
    }) = result
    else {
        panic!("expected RateLimited, got: {result:?}");
    };
    assert_eq!(platform, Platform::Instagram);
    assert!(retry_after_secs > 0);

    // Exactly one failure, on the first credential only.
    let status = client.cookie_status(Platform::Instagram);
    assert_eq!(status.credentials[0].failures, 1);
    assert_eq!(status.credentials[1].failures, 0);
    assert_eq!(status.active, Some(1), "pool advanced to the next credential");
}

#[tokio::test]
async fn http_401_with_wait_text_is_a_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("Please wait a few minutes before you try again."),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, &["sessionid=a"]);
    let result = client.fetch_profile(Platform::Instagram, "alice").await;
    assert!(
        matches!(result, Err(ScraperError::RateLimited { .. })),
        "expected RateLimited, got: {result:?}"
    );
}

#[tokio::test]
async fn plain_401_is_an_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("login required"))
        .mount(&server)
        .await;

    let client = client_for(&server, &["sessionid=a"]);
    let result = client.fetch_profile(Platform::Instagram, "alice").await;
    assert!(
        matches!(result, Err(ScraperError::AuthFailed { .. })),
        "expected AuthFailed, got: {result:?}"
    );
}

#[tokio::test]
async fn soft_block_page_under_200_is_a_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html>Please wait a few minutes before you try again.</html>"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, &["sessionid=a"]);
    let result = client.fetch_profile(Platform::Instagram, "alice").await;
    assert!(
        matches!(result, Err(ScraperError::RateLimited { .. })),
        "expected RateLimited, got: {result:?}"
    );
}

#[tokio::test]
async fn http_404_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server, &["sessionid=a"]);
    let result = client.fetch_profile(Platform::Instagram, "nobody").await;
    assert!(
        matches!(result, Err(ScraperError::NotFound { .. })),
        "expected NotFound, got: {result:?}"
    );
}

#[tokio::test]
async fn server_errors_are_retried_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .mount(&server)
        .await;

    let client = client_for(&server, &["sessionid=a"]);
    let profile = client
        .fetch_profile(Platform::Instagram, "alice")
        .await
        .expect("retry should recover from a transient 503");
    assert_eq!(profile.followers, 100);
}

#[tokio::test]
async fn html_body_on_success_status_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, &["sessionid=a"]);
    let result = client.fetch_profile(Platform::Instagram, "alice").await;
    assert!(
        matches!(result, Err(ScraperError::Deserialize { .. })),
        "expected Deserialize, got: {result:?}"
    );
}

#[tokio::test]
async fn empty_pool_surfaces_no_credentials() {
    let server = MockServer::start().await;
    let client = client_for(&server, &[]);
    let result = client.fetch_profile(Platform::Instagram, "alice").await;
    assert!(
        matches!(result, Err(ScraperError::NoCredentials { .. })),
        "expected NoCredentials, got: {result:?}"
    );
}

#[tokio::test]
async fn enumeration_follows_cursors_across_pages() {
    let server = MockServer::start().await;

    // First page: no "after" in the variables blob.
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .and(query_param_contains("variables", "\"after\":\"cursor-1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "user": { "edge_owner_to_timeline_media": {
                "edges": [ { "node": { "shortcode": "R3" } } ],
                "page_info": { "has_next_page": false, "end_cursor": null }
            }}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "user": { "edge_owner_to_timeline_media": {
                "edges": [
                    { "node": { "shortcode": "R1" } },
                    { "node": { "shortcode": "R2" } }
                ],
                "page_info": { "has_next_page": true, "end_cursor": "cursor-1" }
            }}}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, &["sessionid=a"]);
    let shortcodes = client
        .list_media_shortcodes(Platform::Instagram, "alice")
        .await
        .expect("enumeration should succeed");
    assert_eq!(shortcodes, vec!["R1", "R2", "R3"]);
}

#[tokio::test]
async fn twitter_profile_and_replies_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/i/api/graphql/UserByScreenName"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "user": { "result": {
                "rest_id": "12345",
                "legacy": {
                    "name": "Alice",
                    "followers_count": 100,
                    "friends_count": 50,
                    "statuses_count": 10,
                    "media_count": 3
                }
            }}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/i/api/graphql/SearchTimeline"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "replies": [
                { "rest_id": "801", "user_screen_name": "bob", "text": "nice", "favorite_count": 3 }
            ]}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, &["auth_token=t; ct0=c"]);
    let profile = client
        .fetch_profile(Platform::Twitter, "alice")
        .await
        .expect("should parse twitter profile");
    assert_eq!(profile.followers, 100);

    let replies = client.fetch_replies("777").await.expect("should parse replies");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].author_handle, "bob");
}
