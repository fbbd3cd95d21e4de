use super::*;
use gramtrack_core::Environment;
use gramtrack_scraper::ScraperError;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;

const BASE_MS: u64 = 300_000;
const MAX_BACKOFF_MS: u64 = 1_800_000;

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        timezone: chrono_tz::Asia::Kolkata,
        daily_cron: "0 15 2 * * *".to_string(),
        refresh_cron: None,
        min_time_between_jobs_ms: BASE_MS,
        max_backoff_ms: MAX_BACKOFF_MS,
        instagram_cookies: vec![],
        twitter_cookies: vec![],
        download_reels_to_r2: false,
        db_max_connections: 10,
        db_min_connections: 1,
        db_acquire_timeout_secs: 10,
        scraper_request_timeout_secs: 30,
        scraper_user_agent: "test".to_string(),
        scraper_max_retries: 0,
        scraper_retry_backoff_base_ms: 0,
        media_fetch_delay_ms: 0,
        cookie_reset_window_mins: 60,
        cookie_switch_delay_secs: 30,
    }
}

fn target(username: &str) -> JobTarget {
    JobTarget {
        platform: Platform::Instagram,
        username: username.to_string(),
    }
}

fn dummy_outcome() -> TrackOutcome {
    let now = Utc::now();
    TrackOutcome {
        profile: gramtrack_db::ProfileRow {
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
        },
        snapshot: gramtrack_db::SnapshotRow {
            id: 1,
            profile_id: 1,
            followers: 100,
            following: 50,
            media_count: 10,
            reel_count: 3,
            biography: None,
            avatar_url: None,
            raw: serde_json::json!({}),
            captured_at: now,
        },
    }
}

fn rate_limited() -> TrackError {
    TrackError::Scraper(ScraperError::RateLimited {
        platform: Platform::Instagram,
        retry_after_secs: 60,
    })
}

/// Scripted runner: pops one outcome per invocation (default success) and
/// records per-start target and instant plus the peak concurrency.
#[derive(Default)]
struct ScriptedRunner {
    outcomes: StdMutex<VecDeque<Result<(), TrackError>>>,
    starts: StdMutex<Vec<(String, Instant)>>,
    running: AtomicU32,
    peak_running: AtomicU32,
    run_for: Option<Duration>,
}

impl ScriptedRunner {
    fn with_outcomes(outcomes: Vec<Result<(), TrackError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: StdMutex::new(outcomes.into()),
            ..Self::default()
        })
    }

    fn start_queue(self: &Arc<Self>) -> Arc<TrackQueue> {
        let runner = Arc::clone(self);
        TrackQueue::start(
            &test_config(),
            Box::new(move |spec| {
                let runner = Arc::clone(&runner);
                Box::pin(async move {
                    let concurrent = runner.running.fetch_add(1, Ordering::SeqCst) + 1;
                    runner.peak_running.fetch_max(concurrent, Ordering::SeqCst);
                    runner
                        .starts
                        .lock()
                        .unwrap()
                        .push((spec.target.username.clone(), Instant::now()));

                    if let Some(run_for) = runner.run_for {
                        tokio::time::sleep(run_for).await;
                    }

                    let outcome = runner
                        .outcomes
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or(Ok(()));
                    runner.running.fetch_sub(1, Ordering::SeqCst);
                    outcome.map(|()| dummy_outcome())
                })
            }),
        )
    }

    fn start_instants(&self) -> Vec<Instant> {
        self.starts.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    fn start_order(&self) -> Vec<String> {
        self.starts.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn at_most_one_job_in_flight_with_base_spacing() {
    let runner = Arc::new(ScriptedRunner {
        run_for: Some(Duration::from_millis(5_000)),
        ..ScriptedRunner::default()
    });
    let queue = runner.start_queue();

    let handles = vec![
        queue.add(target("alice"), false, None, None),
        queue.add(target("bob"), false, None, None),
        queue.add(target("carol"), false, None, None),
    ];
    for handle in handles {
        handle.wait().await.expect("job should succeed");
    }

    assert_eq!(runner.peak_running.load(Ordering::SeqCst), 1);

    let starts = runner.start_instants();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(BASE_MS),
            "consecutive starts closer than base spacing: {:?}",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn add_deduplicates_on_target() {
    let runner = ScriptedRunner::with_outcomes(vec![Ok(())]);
    let queue = runner.start_queue();

    let first = queue.add(target("alice"), false, None, None);
    let second = queue.add(target("alice"), true, None, None);

    assert_eq!(queue.status().size, 1, "same target must share one job");

    first.wait().await.expect("first handle should succeed");
    second.wait().await.expect("second handle should succeed");
    assert_eq!(runner.start_instants().len(), 1, "pipeline ran exactly once");
}

#[tokio::test(start_paused = true)]
async fn immediate_jobs_dispatch_before_older_normal_jobs() {
    let runner = Arc::new(ScriptedRunner::default());
    let queue = runner.start_queue();

    // All three added synchronously, before the dispatcher gets a turn.
    let a = queue.add(target("normal-1"), false, None, None);
    let b = queue.add(target("normal-2"), false, None, None);
    let c = queue.add(target("urgent"), true, None, None);

    for handle in [a, b, c] {
        handle.wait().await.expect("job should succeed");
    }

    assert_eq!(runner.start_order(), vec!["urgent", "normal-1", "normal-2"]);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_storm_backs_off_exponentially_then_resets() {
    let runner = ScriptedRunner::with_outcomes(vec![
        Err(rate_limited()),
        Err(rate_limited()),
        Err(rate_limited()),
        Ok(()),
    ]);
    let queue = runner.start_queue();

    // The future stays pending across the three transparent retries and
    // resolves only on the terminal success.
    let handle = queue.add(target("alice"), false, None, None);
    handle.wait().await.expect("fourth attempt succeeds");

    let starts = runner.start_instants();
    assert_eq!(starts.len(), 4);

    let base = Duration::from_millis(BASE_MS);
    let max_backoff = Duration::from_millis(MAX_BACKOFF_MS);
    // After k consecutive rate-limited outcomes the next start waits
    // min(base * 2^k, max_backoff).
    assert!(starts[1] - starts[0] >= base * 2);
    assert!(starts[2] - starts[1] >= base * 4);
    assert!(starts[3] - starts[2] >= max_backoff, "2^3 clamps to max");

    // Success resets the counter: the next job waits base spacing again.
    let handle = queue.add(target("bob"), false, None, None);
    handle.wait().await.expect("job should succeed");
    let starts = runner.start_instants();
    let gap = starts[4] - starts[3];
    assert!(gap >= base, "spacing never drops below base: {gap:?}");
    assert!(gap < base * 2, "counter must reset after a success: {gap:?}");
}

#[tokio::test(start_paused = true)]
async fn non_rate_limit_failures_settle_the_future() {
    let runner =
        ScriptedRunner::with_outcomes(vec![Err(TrackError::Fatal("boom".to_string()))]);
    let queue = runner.start_queue();

    let handle = queue.add(target("alice"), false, None, None);
    let result = handle.wait().await;

    assert!(result.is_err(), "fatal outcome settles the caller");
    assert_eq!(queue.status().size, 0, "failed job leaves the queue");
    assert_eq!(runner.start_instants().len(), 1, "no transparent retry");
}

#[tokio::test(start_paused = true)]
async fn status_reports_pending_and_backoff_state() {
    let runner = ScriptedRunner::with_outcomes(vec![Err(rate_limited())]);
    let queue = runner.start_queue();

    let status = queue.status();
    assert_eq!(status.size, 0);
    assert_eq!(status.base_spacing_ms, BASE_MS);
    assert_eq!(status.effective_spacing_ms, BASE_MS);

    let _handle = queue.add(target("alice"), false, None, None);
    // Give the dispatcher one full attempt (which rate-limits and re-queues).
    tokio::time::sleep(Duration::from_millis(1)).await;

    let status = queue.status();
    assert_eq!(status.size, 1, "rate-limited job is back in the queue");
    assert_eq!(status.consecutive_rate_limit_errors, 1);
    assert_eq!(status.effective_spacing_ms, BASE_MS * 2);
    assert_eq!(status.pending, vec!["instagram:alice"]);
}
