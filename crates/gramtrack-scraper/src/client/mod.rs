//! Typed scraping client over the public GraphQL/JSON endpoints.
//!
//! Every call attaches the cookie pool's current credential, classifies the
//! response (rate limit, auth failure, transient, shape change), and reports
//! the outcome back to the pool. Transient failures are retried in-call with
//! exponential backoff; rate limits are surfaced immediately for the queue's
//! global backoff.

mod instagram;
mod twitter;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use gramtrack_core::{AppConfig, Platform};
use regex::Regex;
use reqwest::{Client, Url};
use serde_json::Value;

use crate::cookies::{CookiePool, CookiePoolStatus};
use crate::error::ScraperError;
use crate::retry::retry_with_backoff;
use crate::types::{MediaData, ProfileData, ReplyData};

/// Maximum number of enumeration pages to fetch before returning an error.
/// Prevents infinite loops on cycling cursors.
pub(super) const MAX_ENUMERATION_PAGES: usize = 20;

const INSTAGRAM_BASE_URL: &str = "https://www.instagram.com/";
const TWITTER_BASE_URL: &str = "https://x.com/";

/// Body text that means "you are being limited" even under a 200 or 401.
fn rate_limit_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"(?i)wait a few minutes|rate.?limit").expect("static regex must compile")
    })
}

struct PlatformHandle {
    base_url: Url,
    pool: Arc<CookiePool>,
}

/// Scraping client shared by both pipelines.
pub struct ScraperClient {
    client: Client,
    instagram: PlatformHandle,
    twitter: PlatformHandle,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl ScraperClient {
    /// Creates a client pointed at the production endpoints, with one cookie
    /// pool per platform built from the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: &AppConfig) -> Result<Self, ScraperError> {
        Self::with_base_urls(config, INSTAGRAM_BASE_URL, TWITTER_BASE_URL)
    }

    /// Creates a client with custom base URLs (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the client cannot be constructed,
    /// or [`ScraperError::InvalidBaseUrl`] if a base URL does not parse.
    pub fn with_base_urls(
        config: &AppConfig,
        instagram_base: &str,
        twitter_base: &str,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.scraper_request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&config.scraper_user_agent)
            .build()?;

        let switch_delay = Duration::from_secs(config.cookie_switch_delay_secs);
        let reset_window = Duration::from_secs(config.cookie_reset_window_mins * 60);

        Ok(Self {
            client,
            instagram: PlatformHandle {
                base_url: parse_base_url(instagram_base)?,
                pool: Arc::new(CookiePool::new(
                    config.instagram_cookies.clone(),
                    switch_delay,
                    reset_window,
                )),
            },
            twitter: PlatformHandle {
                base_url: parse_base_url(twitter_base)?,
                pool: Arc::new(CookiePool::new(
                    config.twitter_cookies.clone(),
                    switch_delay,
                    reset_window,
                )),
            },
            max_retries: config.scraper_max_retries,
            backoff_base_ms: config.scraper_retry_backoff_base_ms,
        })
    }

    fn handle(&self, platform: Platform) -> &PlatformHandle {
        match platform {
            Platform::Instagram => &self.instagram,
            Platform::Twitter => &self.twitter,
        }
    }

    /// The cookie pool backing one platform. Exposed so the process can
    /// spawn the auto-reset task and read diagnostics.
    #[must_use]
    pub fn cookie_pool(&self, platform: Platform) -> Arc<CookiePool> {
        Arc::clone(&self.handle(platform).pool)
    }

    #[must_use]
    pub fn cookie_status(&self, platform: Platform) -> CookiePoolStatus {
        self.handle(platform).pool.status()
    }

    /// Spawn the credential auto-reset task for both platforms.
    pub fn spawn_cookie_auto_reset(&self, every: Duration) {
        self.instagram.pool.spawn_auto_reset(every);
        self.twitter.pool.spawn_auto_reset(every);
    }

    /// Fetch public profile data: counts, bio, avatar, external link, and
    /// the embedded latest media items.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::RateLimited`] — upstream asked us to back off.
    /// - [`ScraperError::AuthFailed`] — credential rejected.
    /// - [`ScraperError::NoCredentials`] — pool empty or fully hard-failed.
    /// - [`ScraperError::NotFound`] — no such account.
    /// - [`ScraperError::Http`] / [`ScraperError::UnexpectedStatus`] —
    ///   transient failure after retries.
    /// - [`ScraperError::Deserialize`] — upstream shape changed.
    pub async fn fetch_profile(
        &self,
        platform: Platform,
        username: &str,
    ) -> Result<ProfileData, ScraperError> {
        let handle = self.handle(platform);
        match platform {
            Platform::Instagram => {
                let url = instagram::profile_url(&handle.base_url, username);
                let body = self.get_json(platform, url).await?;
                instagram::parse_profile(username, body)
            }
            Platform::Twitter => {
                let url = twitter::profile_url(&handle.base_url, username);
                let body = self.get_json(platform, url).await?;
                twitter::parse_profile(username, body)
            }
        }
    }

    /// Fetch detailed metrics for one media item.
    ///
    /// # Errors
    ///
    /// Same classification as [`ScraperClient::fetch_profile`].
    pub async fn fetch_media(
        &self,
        platform: Platform,
        shortcode: &str,
    ) -> Result<MediaData, ScraperError> {
        let handle = self.handle(platform);
        match platform {
            Platform::Instagram => {
                let url = instagram::media_url(&handle.base_url, shortcode);
                let body = self.get_json(platform, url).await?;
                instagram::parse_media(shortcode, body)
            }
            Platform::Twitter => {
                let url = twitter::tweet_url(&handle.base_url, shortcode);
                let body = self.get_json(platform, url).await?;
                twitter::parse_tweet(shortcode, body)
            }
        }
    }

    /// Enumerate every current media shortcode for an account, following
    /// pagination cursors. Preferred over the profile-embedded list, which
    /// the upstream truncates.
    ///
    /// # Errors
    ///
    /// Same classification as [`ScraperClient::fetch_profile`], plus
    /// [`ScraperError::PaginationLimit`] on a runaway cursor.
    pub async fn list_media_shortcodes(
        &self,
        platform: Platform,
        username: &str,
    ) -> Result<Vec<String>, ScraperError> {
        let handle = self.handle(platform);
        let mut shortcodes = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if pages >= MAX_ENUMERATION_PAGES {
                return Err(ScraperError::PaginationLimit {
                    username: username.to_string(),
                    max_pages: MAX_ENUMERATION_PAGES,
                });
            }
            pages += 1;

            let url = match platform {
                Platform::Instagram => {
                    instagram::enumeration_url(&handle.base_url, username, cursor.as_deref())
                }
                Platform::Twitter => {
                    twitter::enumeration_url(&handle.base_url, username, cursor.as_deref())
                }
            };
            let body = self.get_json(platform, url).await?;
            let page = match platform {
                Platform::Instagram => instagram::parse_enumeration_page(username, body)?,
                Platform::Twitter => twitter::parse_enumeration_page(username, body)?,
            };

            shortcodes.extend(page.shortcodes);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(shortcodes),
            }
        }
    }

    /// Fetch replies to one tweet. Twitter pipeline only.
    ///
    /// # Errors
    ///
    /// Same classification as [`ScraperClient::fetch_profile`].
    pub async fn fetch_replies(&self, tweet_id: &str) -> Result<Vec<ReplyData>, ScraperError> {
        let url = twitter::replies_url(&self.twitter.base_url, tweet_id);
        let body = self.get_json(Platform::Twitter, url).await?;
        twitter::parse_replies(tweet_id, body)
    }

    /// The shared classified GET: attach the current credential, retry
    /// transient failures, classify everything else, and report the outcome
    /// to the cookie pool.
    async fn get_json(&self, platform: Platform, url: Url) -> Result<Value, ScraperError> {
        let handle = self.handle(platform);
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let url = url.clone();
            async move { self.get_json_once(platform, url).await }
        })
        .await
        .inspect(|_| handle.pool.mark_success())
    }

    async fn get_json_once(&self, platform: Platform, url: Url) -> Result<Value, ScraperError> {
        let handle = self.handle(platform);
        let cookie = handle
            .pool
            .current()
            .ok_or(ScraperError::NoCredentials { platform })?;

        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::COOKIE, cookie)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header("x-requested-with", "XMLHttpRequest")
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let header_wait = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(self.rate_limited(platform, header_wait));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            if rate_limit_marker().is_match(&body) {
                return Err(self.rate_limited(platform, None));
            }
            handle.pool.mark_failure("auth");
            return Err(ScraperError::AuthFailed {
                platform,
                reason: format!("status {status}"),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ScraperError::NotFound {
                url: url.to_string(),
            });
        }

        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;

        // A soft block arrives as a 200 with an apology page.
        if rate_limit_marker().is_match(&body) {
            return Err(self.rate_limited(platform, None));
        }

        serde_json::from_str::<Value>(&body).map_err(|e| ScraperError::Deserialize {
            context: format!("{platform} response from {url}"),
            source: e,
        })
    }

    fn rate_limited(&self, platform: Platform, header_wait: Option<u64>) -> ScraperError {
        let pool = &self.handle(platform).pool;
        let suggested = pool.mark_failure("rate_limit");
        let retry_after_secs = match header_wait {
            Some(secs) => secs.max(suggested.as_secs()),
            None if pool.all_rate_limited() => pool.retry_after().as_secs(),
            None => suggested.as_secs(),
        };
        ScraperError::RateLimited {
            platform,
            retry_after_secs,
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ScraperError> {
    // Normalise to exactly one trailing slash so equal configurations
    // compare equal regardless of how the operator wrote them.
    let normalised = format!("{}/", raw.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| ScraperError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// One page of a media enumeration.
pub(super) struct EnumerationPage {
    pub shortcodes: Vec<String>,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
