use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use harvester_core::WalkLimits;
use rand::Rng;

pub const DEFAULT_FEED_URL: &str = "https://truthsocial.com/@realDonaldTrump";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_TIME_FORMAT: &str = "%b %d, %Y, %I:%M %p";

/// Inclusive range of wait times; sampled uniformly at millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseRange {
    pub min: Duration,
    pub max: Duration,
}

impl PauseRange {
    pub const ZERO: PauseRange = PauseRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn from_secs_f64(min: f64, max: f64) -> Self {
        Self::new(Duration::from_secs_f64(min), Duration::from_secs_f64(max))
    }

    /// A reversed range collapses to `min`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let low = self.min.as_millis() as u64;
        let high = self.max.as_millis() as u64;
        if high <= low {
            return self.min;
        }
        Duration::from_millis(rng.random_range(low..=high))
    }
}

#[derive(Debug, Clone)]
pub struct ExtractSettings {
    /// Base for canonical record URLs.
    pub profile_url: String,
    /// Zone the feed renders its human-readable timestamps in.
    pub source_timezone: Tz,
    pub reporting_timezone: Tz,
    pub display_time_format: String,
    /// Leading lines of the full item text treated as author/handle/time.
    pub boilerplate_lines: usize,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            profile_url: DEFAULT_FEED_URL.to_string(),
            source_timezone: chrono_tz::US::Eastern,
            reporting_timezone: chrono_tz::US::Eastern,
            display_time_format: DEFAULT_TIME_FORMAT.to_string(),
            boilerplate_lines: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrollSettings {
    /// Fraction of the viewport height advanced per scroll, as (min, max).
    pub viewport_fraction: (f64, f64),
    pub min_steps: u32,
    pub max_steps: u32,
    pub step_pause: PauseRange,
    pub scroll_pause: PauseRange,
    pub verification_pause: PauseRange,
    /// Take a longer rest every this many rounds; 0 disables it.
    pub rest_every: u32,
    pub rest_pause: PauseRange,
}

impl ScrollSettings {
    /// No waiting at all; for driving scripted feeds.
    pub fn instant() -> Self {
        Self {
            step_pause: PauseRange::ZERO,
            scroll_pause: PauseRange::ZERO,
            verification_pause: PauseRange::ZERO,
            rest_pause: PauseRange::ZERO,
            ..Self::default()
        }
    }
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            viewport_fraction: (0.2, 0.5),
            min_steps: 2,
            max_steps: 4,
            step_pause: PauseRange::from_secs_f64(0.2, 0.5),
            scroll_pause: PauseRange::from_secs_f64(4.0, 8.0),
            verification_pause: PauseRange::from_secs_f64(6.0, 12.0),
            rest_every: 10,
            rest_pause: PauseRange::from_secs_f64(8.0, 15.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WalkSettings {
    pub limits: WalkLimits,
    pub scroll: ScrollSettings,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub feed_url: String,
    /// CSS selector matching one rendered feed item.
    pub item_selector: String,
    pub headless: bool,
    pub user_agent: String,
    pub disable_images: bool,
    pub window_size: (u32, u32),
    pub page_load_timeout: Duration,
    pub element_wait_timeout: Duration,
    pub element_poll_interval: Duration,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            item_selector: ".status".to_string(),
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            disable_images: true,
            window_size: (1920, 1080),
            page_load_timeout: Duration::from_secs(60),
            element_wait_timeout: Duration::from_secs(30),
            element_poll_interval: Duration::from_millis(500),
            chrome_executable: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(10),
        }
    }
}

/// Everything one harvest run needs, grouped by component.
#[derive(Debug, Clone, Default)]
pub struct HarvestSettings {
    pub extract: ExtractSettings,
    pub walk: WalkSettings,
    pub session: SessionSettings,
    pub retry: RetrySettings,
}
