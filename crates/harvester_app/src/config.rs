//! RON configuration for the harvester binary.
//!
//! Every field carries a serde default, so an empty file (or no file at all)
//! yields a working configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono_tz::Tz;
use harvester_core::WalkLimits;
use harvester_engine::{
    ExtractSettings, HarvestSettings, PauseRange, ProbeSettings, RetrySettings, ScrollSettings,
    SessionSettings, WalkSettings, DEFAULT_FEED_URL, DEFAULT_TIME_FORMAT, DEFAULT_USER_AGENT,
};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_CONFIG_FILENAME: &str = "feed_harvester.ron";

/// Seconds, as (min, max).
pub(crate) type SecondsRange = (f64, f64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub database_path: PathBuf,
    pub log_file: PathBuf,
    pub log_level: String,
    pub days_back: u32,

    pub feed_url: String,
    pub profile_url: String,
    pub item_selector: String,
    pub source_timezone: String,
    pub reporting_timezone: String,
    pub display_time_format: String,
    pub boilerplate_lines: usize,

    pub headless: bool,
    pub user_agent: String,
    pub disable_images: bool,
    pub window_size: (u32, u32),
    pub chrome_executable: Option<PathBuf>,
    pub page_load_timeout_secs: u64,
    pub element_wait_timeout_secs: u64,

    pub max_scroll_iterations: u32,
    pub max_no_progress_rounds: u32,
    pub rounds_after_target: u32,
    pub viewport_fraction: (f64, f64),
    pub scroll_steps: (u32, u32),
    pub step_pause_secs: SecondsRange,
    pub scroll_pause_secs: SecondsRange,
    pub verification_pause_secs: SecondsRange,
    pub rest_every: u32,
    pub rest_pause_secs: SecondsRange,

    pub max_attempts: u32,
    pub retry_delay_secs: u64,

    pub probe_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let limits = WalkLimits::default();
        let session = SessionSettings::default();
        let scroll = ScrollSettings::default();
        let retry = RetrySettings::default();
        Self {
            database_path: PathBuf::from("feed_harvester.db"),
            log_file: PathBuf::from("feed_harvester.log"),
            log_level: "info".to_string(),
            days_back: 3,

            feed_url: DEFAULT_FEED_URL.to_string(),
            profile_url: DEFAULT_FEED_URL.to_string(),
            item_selector: session.item_selector,
            source_timezone: "US/Eastern".to_string(),
            reporting_timezone: "US/Eastern".to_string(),
            display_time_format: DEFAULT_TIME_FORMAT.to_string(),
            boilerplate_lines: 3,

            headless: session.headless,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            disable_images: session.disable_images,
            window_size: session.window_size,
            chrome_executable: None,
            page_load_timeout_secs: session.page_load_timeout.as_secs(),
            element_wait_timeout_secs: session.element_wait_timeout.as_secs(),

            max_scroll_iterations: limits.max_scroll_iterations,
            max_no_progress_rounds: limits.max_no_progress_rounds,
            rounds_after_target: limits.rounds_after_target,
            viewport_fraction: scroll.viewport_fraction,
            scroll_steps: (scroll.min_steps, scroll.max_steps),
            step_pause_secs: seconds(scroll.step_pause),
            scroll_pause_secs: seconds(scroll.scroll_pause),
            verification_pause_secs: seconds(scroll.verification_pause),
            rest_every: scroll.rest_every,
            rest_pause_secs: seconds(scroll.rest_pause),

            max_attempts: retry.max_attempts,
            retry_delay_secs: retry.retry_delay.as_secs(),

            probe_timeout_secs: 30,
        }
    }
}

fn seconds(range: PauseRange) -> SecondsRange {
    (range.min.as_secs_f64(), range.max.as_secs_f64())
}

/// Longest single wait any pause setting may ask for.
const MAX_PAUSE_SECS: f64 = 3600.0;

fn pause(range: SecondsRange, field: &str) -> anyhow::Result<PauseRange> {
    let (min, max) = range;
    let in_bounds = |secs: f64| (0.0..=MAX_PAUSE_SECS).contains(&secs);
    if !(in_bounds(min) && in_bounds(max)) || max < min {
        return Err(anyhow!(
            "{field} must be (min, max) seconds with 0 <= min <= max <= {MAX_PAUSE_SECS}, got {range:?}"
        ));
    }
    let duration = |secs: f64| {
        Duration::try_from_secs_f64(secs).map_err(|err| anyhow!("{field}: {err}"))
    };
    Ok(PauseRange::new(duration(min)?, duration(max)?))
}

fn timezone(name: &str, field: &str) -> anyhow::Result<Tz> {
    name.parse::<Tz>()
        .map_err(|err| anyhow!("{field}: unknown timezone {name:?}: {err}"))
}

impl AppConfig {
    /// Missing file means defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()));
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        ron::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn to_pretty_ron(&self) -> anyhow::Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
            .context("serializing config")
    }

    pub fn level_filter(&self) -> anyhow::Result<LevelFilter> {
        self.log_level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow!("unknown log level {:?}", self.log_level))
    }

    pub fn reporting_zone(&self) -> anyhow::Result<Tz> {
        timezone(&self.reporting_timezone, "reporting_timezone")
    }

    pub fn to_settings(&self) -> anyhow::Result<HarvestSettings> {
        let (min_steps, max_steps) = self.scroll_steps;
        if min_steps == 0 || max_steps < min_steps {
            return Err(anyhow!(
                "scroll_steps must be (min, max) with 1 <= min <= max, got {:?}",
                self.scroll_steps
            ));
        }
        let (low, high) = self.viewport_fraction;
        if !(low > 0.0 && low <= high && high <= 1.0) {
            return Err(anyhow!(
                "viewport_fraction must be (min, max) with 0 < min <= max <= 1, got {:?}",
                self.viewport_fraction
            ));
        }
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        if self.max_no_progress_rounds == 0 {
            return Err(anyhow!("max_no_progress_rounds must be at least 1"));
        }

        let extract = ExtractSettings {
            profile_url: self.profile_url.clone(),
            source_timezone: timezone(&self.source_timezone, "source_timezone")?,
            reporting_timezone: self.reporting_zone()?,
            display_time_format: self.display_time_format.clone(),
            boilerplate_lines: self.boilerplate_lines,
        };
        let walk = WalkSettings {
            limits: WalkLimits {
                max_scroll_iterations: self.max_scroll_iterations,
                max_no_progress_rounds: self.max_no_progress_rounds,
                rounds_after_target: self.rounds_after_target,
            },
            scroll: ScrollSettings {
                viewport_fraction: self.viewport_fraction,
                min_steps,
                max_steps,
                step_pause: pause(self.step_pause_secs, "step_pause_secs")?,
                scroll_pause: pause(self.scroll_pause_secs, "scroll_pause_secs")?,
                verification_pause: pause(
                    self.verification_pause_secs,
                    "verification_pause_secs",
                )?,
                rest_every: self.rest_every,
                rest_pause: pause(self.rest_pause_secs, "rest_pause_secs")?,
            },
        };
        let session = SessionSettings {
            feed_url: self.feed_url.clone(),
            item_selector: self.item_selector.clone(),
            headless: self.headless,
            user_agent: self.user_agent.clone(),
            disable_images: self.disable_images,
            window_size: self.window_size,
            page_load_timeout: Duration::from_secs(self.page_load_timeout_secs),
            element_wait_timeout: Duration::from_secs(self.element_wait_timeout_secs),
            chrome_executable: self.chrome_executable.clone(),
            ..SessionSettings::default()
        };
        let retry = RetrySettings {
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        };

        Ok(HarvestSettings {
            extract,
            walk,
            session,
            retry,
        })
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            request_timeout: Duration::from_secs(self.probe_timeout_secs),
            user_agent: self.user_agent.clone(),
            ..ProbeSettings::default()
        }
    }
}
