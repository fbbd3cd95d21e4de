use serde::{Deserialize, Serialize};

/// Source platform of a tracked account.
///
/// Stored in the database as the lowercase tag returned by
/// [`Platform::as_str`]. Both pipelines share the same tracking engine;
/// the platform tag selects the scraper endpoints and whether the replies
/// sub-pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Twitter,
}

impl Platform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
        }
    }

    /// Whether the replies sub-pipeline applies to this platform.
    #[must_use]
    pub fn has_replies(self) -> bool {
        matches!(self, Platform::Twitter)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "twitter" | "x" => Ok(Platform::Twitter),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_str() {
        assert_eq!("instagram".parse::<Platform>(), Ok(Platform::Instagram));
        assert_eq!("Twitter".parse::<Platform>(), Ok(Platform::Twitter));
        assert_eq!("x".parse::<Platform>(), Ok(Platform::Twitter));
        assert_eq!(Platform::Instagram.to_string(), "instagram");
    }

    #[test]
    fn unknown_platform_is_rejected() {
        assert!("tiktok".parse::<Platform>().is_err());
    }

    #[test]
    fn only_twitter_has_replies() {
        assert!(Platform::Twitter.has_replies());
        assert!(!Platform::Instagram.has_replies());
    }
}
