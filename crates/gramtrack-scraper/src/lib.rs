mod client;
mod cookies;
mod error;
mod retry;
mod types;

pub use client::ScraperClient;
pub use cookies::{CookiePool, CookiePoolStatus, CredentialStatus};
pub use error::ScraperError;
pub use types::{MediaData, MediaSummary, ProfileData, ReplyData};
