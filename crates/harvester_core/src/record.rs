use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use url::Url;

/// Best-effort interaction counters shown under a feed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Engagement {
    pub likes: u64,
    pub reposts: u64,
    pub comments: u64,
}

impl Engagement {
    pub fn new(likes: u64, reposts: u64, comments: u64) -> Self {
        Self {
            likes,
            reposts,
            comments,
        }
    }
}

/// One harvested feed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    pub external_id: String,
    pub body: String,
    /// The instant expressed in the reporting timezone.
    pub occurred_at_local: DateTime<FixedOffset>,
    pub occurred_at_utc: DateTime<Utc>,
    pub engagement: Engagement,
    pub media_refs: Vec<String>,
    pub canonical_url: String,
}

impl FeedRecord {
    /// Calendar date of the record in the reporting timezone.
    pub fn reporting_date(&self) -> NaiveDate {
        self.occurred_at_local.date_naive()
    }
}

/// `{profile_url}/posts/{external_id}`, tolerant of a trailing slash on the profile.
pub fn canonical_url(profile_url: &str, external_id: &str) -> String {
    format!(
        "{}/posts/{}",
        profile_url.trim().trim_end_matches('/'),
        external_id
    )
}

/// True for absolute `http`/`https` URLs with a host.
pub fn is_absolute_http_url(candidate: &str) -> bool {
    match Url::parse(candidate.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_joins_profile_and_id() {
        assert_eq!(
            canonical_url("https://feed.example/@someone/", "1147"),
            "https://feed.example/@someone/posts/1147"
        );
        assert_eq!(
            canonical_url("https://feed.example/@someone", "1147"),
            "https://feed.example/@someone/posts/1147"
        );
    }

    #[test]
    fn only_absolute_http_urls_qualify() {
        assert!(is_absolute_http_url("https://cdn.example/a.jpg"));
        assert!(is_absolute_http_url("http://cdn.example/a.mp4"));
        assert!(!is_absolute_http_url("/relative/a.jpg"));
        assert!(!is_absolute_http_url("data:image/png;base64,AAAA"));
        assert!(!is_absolute_http_url("blob:https://feed.example/123"));
        assert!(!is_absolute_http_url(""));
    }
}
