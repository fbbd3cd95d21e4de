//! Credential rotation pool for scraping sessions.
//!
//! Holds an ordered list of cookie bundles loaded once at process start.
//! Failures advance the active credential; three failures soft-remove a
//! credential from rotation ("hard-failed") until the auto-reset task
//! restores it. Rotation never drops a credential permanently.
//!
//! All mutation happens either on the dispatcher task or the auto-reset
//! task, so a plain `std::sync::Mutex` is adequate — contention is
//! negligible.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Failure count at which a credential leaves active rotation.
const HARD_FAIL_THRESHOLD: u32 = 3;

/// Failure count at which a credential counts toward "all rate limited".
const RATE_LIMIT_THRESHOLD: u32 = 2;

#[derive(Debug)]
struct CredentialState {
    cookie: String,
    failures: u32,
    last_failure: Option<Instant>,
    hard_failed: bool,
}

#[derive(Debug)]
struct PoolInner {
    credentials: Vec<CredentialState>,
    current: usize,
    last_switch: Option<Instant>,
}

/// Mutex-guarded rotation pool over the configured credentials of one
/// platform.
#[derive(Debug)]
pub struct CookiePool {
    inner: Mutex<PoolInner>,
    switch_delay: Duration,
    reset_window: Duration,
}

/// Diagnostic snapshot of the pool. Cookie contents are never exposed.
#[derive(Debug, Clone, Serialize)]
pub struct CookiePoolStatus {
    pub total: usize,
    pub active: Option<usize>,
    pub credentials: Vec<CredentialStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub index: usize,
    pub failures: u32,
    pub hard_failed: bool,
    pub secs_since_last_failure: Option<u64>,
}

impl CookiePool {
    #[must_use]
    pub fn new(cookies: Vec<String>, switch_delay: Duration, reset_window: Duration) -> Self {
        let credentials = cookies
            .into_iter()
            .map(|cookie| CredentialState {
                cookie,
                failures: 0,
                last_failure: None,
                hard_failed: false,
            })
            .collect();
        Self {
            inner: Mutex::new(PoolInner {
                credentials,
                current: 0,
                last_switch: None,
            }),
            switch_delay,
            reset_window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        // Poisoning only happens if a holder panicked; the state itself is
        // still coherent counters, so recover rather than cascade.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().credentials.is_empty()
    }

    /// The active credential's cookie string, or `None` when the pool is
    /// empty or every credential is hard-failed.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        let mut inner = self.lock();
        let active = active_index(&mut inner)?;
        Some(inner.credentials[active].cookie.clone())
    }

    /// Record a failure on the active credential and advance to the next
    /// non-hard-failed one. Returns the suggested wait before the next call:
    /// a fixed cool-down of the configured switch delay, stretched when the
    /// previous switch happened more recently than that delay.
    pub fn mark_failure(&self, reason: &str) -> Duration {
        let mut inner = self.lock();
        let since_switch = inner
            .last_switch
            .map_or(self.switch_delay, |t| t.elapsed());
        if let Some(active) = active_index(&mut inner) {
            let state = &mut inner.credentials[active];
            state.failures += 1;
            state.last_failure = Some(Instant::now());
            if state.failures >= HARD_FAIL_THRESHOLD {
                state.hard_failed = true;
            }
            tracing::warn!(
                credential = active,
                failures = inner.credentials[active].failures,
                hard_failed = inner.credentials[active].hard_failed,
                reason,
                "credential failure — rotating"
            );
            let total = inner.credentials.len();
            inner.current = (active + 1) % total.max(1);
            inner.last_switch = Some(Instant::now());
        }
        self.switch_delay + self.switch_delay.saturating_sub(since_switch)
    }

    /// Clear the failure state on the active credential after a successful
    /// call.
    pub fn mark_success(&self) {
        let mut inner = self.lock();
        if let Some(active) = active_index(&mut inner) {
            let state = &mut inner.credentials[active];
            state.failures = 0;
            state.last_failure = None;
            state.hard_failed = false;
        }
    }

    /// `true` when every credential has accumulated at least two failures
    /// inside the reset window — the upstream is limiting us regardless of
    /// which cookie we present.
    #[must_use]
    pub fn all_rate_limited(&self) -> bool {
        let inner = self.lock();
        !inner.credentials.is_empty()
            && inner.credentials.iter().all(|c| {
                c.failures >= RATE_LIMIT_THRESHOLD
                    && c.last_failure
                        .is_some_and(|t| t.elapsed() < self.reset_window)
            })
    }

    /// How long until the most recently failed credential ages out of the
    /// reset window. Zero when nothing has failed.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        let inner = self.lock();
        inner
            .credentials
            .iter()
            .filter_map(|c| c.last_failure)
            .map(|t| self.reset_window.saturating_sub(t.elapsed()))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Clear failure state on any credential whose last failure is older
    /// than the reset window. Called periodically by the auto-reset task;
    /// hard-fail is soft and always recoverable here.
    pub fn reset_stale_failures(&self) {
        let mut inner = self.lock();
        let window = self.reset_window;
        for (index, state) in inner.credentials.iter_mut().enumerate() {
            if state.failures > 0 && state.last_failure.is_none_or(|t| t.elapsed() >= window) {
                tracing::info!(credential = index, "credential failure state auto-reset");
                state.failures = 0;
                state.last_failure = None;
                state.hard_failed = false;
            }
        }
    }

    /// Spawn the background auto-reset task. The task runs for the life of
    /// the process; dropping the returned handle does not stop it.
    pub fn spawn_auto_reset(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                pool.reset_stale_failures();
            }
        })
    }

    #[must_use]
    pub fn status(&self) -> CookiePoolStatus {
        let mut inner = self.lock();
        let active = active_index(&mut inner);
        CookiePoolStatus {
            total: inner.credentials.len(),
            active,
            credentials: inner
                .credentials
                .iter()
                .enumerate()
                .map(|(index, c)| CredentialStatus {
                    index,
                    failures: c.failures,
                    hard_failed: c.hard_failed,
                    secs_since_last_failure: c.last_failure.map(|t| t.elapsed().as_secs()),
                })
                .collect(),
        }
    }
}

/// Resolve the active index, skipping hard-failed credentials. Returns
/// `None` when the pool is empty or fully hard-failed.
fn active_index(inner: &mut PoolInner) -> Option<usize> {
    let total = inner.credentials.len();
    if total == 0 {
        return None;
    }
    for offset in 0..total {
        let index = (inner.current + offset) % total;
        if !inner.credentials[index].hard_failed {
            inner.current = index;
            return Some(index);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(cookies: &[&str]) -> CookiePool {
        CookiePool::new(
            cookies.iter().map(|c| (*c).to_string()).collect(),
            Duration::from_secs(30),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn empty_pool_has_no_current() {
        let pool = pool(&[]);
        assert!(pool.current().is_none());
        assert!(!pool.all_rate_limited());
    }

    #[test]
    fn failure_advances_to_the_next_credential() {
        let pool = pool(&["c1", "c2", "c3"]);
        assert_eq!(pool.current().as_deref(), Some("c1"));

        let wait = pool.mark_failure("rate_limit");
        assert_eq!(wait, Duration::from_secs(30));
        assert_eq!(pool.current().as_deref(), Some("c2"));
    }

    #[test]
    fn single_failure_touches_only_the_active_credential() {
        let pool = pool(&["c1", "c2"]);
        pool.mark_failure("rate_limit");

        let status = pool.status();
        assert_eq!(status.credentials[0].failures, 1);
        assert_eq!(status.credentials[1].failures, 0);
    }

    #[test]
    fn three_failures_hard_fail_a_credential() {
        let pool = pool(&["c1", "c2"]);
        // Fail c1 once, then c2 once, then c1 twice more to reach three.
        pool.mark_failure("rate_limit"); // c1: 1 -> current c2
        pool.mark_failure("rate_limit"); // c2: 1 -> current c1
        pool.mark_failure("rate_limit"); // c1: 2 -> current c2
        pool.mark_failure("rate_limit"); // c2: 2 -> current c1
        pool.mark_failure("rate_limit"); // c1: 3 -> hard fail

        let status = pool.status();
        assert!(status.credentials[0].hard_failed);
        // c1 is skipped; rotation lands on c2.
        assert_eq!(pool.current().as_deref(), Some("c2"));
    }

    #[test]
    fn success_clears_the_active_credential() {
        let pool = pool(&["c1", "c2"]);
        pool.mark_failure("rate_limit"); // c1: 1, current -> c2
        pool.mark_failure("rate_limit"); // c2: 1, current -> c1
        pool.mark_success(); // clears c1

        let status = pool.status();
        assert_eq!(status.credentials[0].failures, 0);
        assert_eq!(status.credentials[1].failures, 1);
    }

    #[test]
    fn all_rate_limited_needs_two_recent_failures_everywhere() {
        let pool = pool(&["c1", "c2"]);
        pool.mark_failure("rate_limit"); // c1: 1
        pool.mark_failure("rate_limit"); // c2: 1
        assert!(!pool.all_rate_limited());

        pool.mark_failure("rate_limit"); // c1: 2
        pool.mark_failure("rate_limit"); // c2: 2
        assert!(pool.all_rate_limited());
        assert!(pool.retry_after() > Duration::ZERO);
    }

    #[test]
    fn stale_failures_reset_and_restore_hard_failed_credentials() {
        let pool = pool(&["c1"]);
        for _ in 0..3 {
            pool.mark_failure("rate_limit");
        }
        assert!(pool.current().is_none(), "sole credential is hard-failed");

        // Reset window for the test pool is 50 ms.
        std::thread::sleep(Duration::from_millis(60));
        pool.reset_stale_failures();

        assert_eq!(pool.current().as_deref(), Some("c1"));
        assert!(!pool.all_rate_limited());
    }
}
