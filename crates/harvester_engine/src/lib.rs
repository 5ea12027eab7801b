//! Harvester engine: browser sessions, extraction, storage and the feed walk.
mod chrome;
mod extract;
mod gate;
mod probe;
mod report;
mod runner;
mod scroll;
mod session;
mod settings;
mod store;
mod text;
mod types;
mod walker;

pub use chrome::{ChromeLauncher, ChromeSession};
pub use extract::{parse_display_time, RecordExtractor};
pub use gate::DedupGate;
pub use probe::{FailureKind, FeedProbe, ProbeError, ProbeOutcome, ProbeSettings};
pub use report::{preview_line, render_harvest_report, MAX_PREVIEW_CHARS};
pub use runner::{cutoff_from_days_back, ResilientRunner};
pub use scroll::{pause, ScrollPlan, ScrollStep};
pub use session::{FeedSession, SessionController, SessionGuard, SessionLauncher};
pub use settings::{
    ExtractSettings, HarvestSettings, PauseRange, RetrySettings, ScrollSettings, SessionSettings,
    WalkSettings, DEFAULT_FEED_URL, DEFAULT_TIME_FORMAT, DEFAULT_USER_AGENT,
};
pub use store::{
    content_fingerprint, DailyActivity, DailySummary, FeedStore, SqliteFeedStore, StoreError,
};
pub use types::{
    ExtractionError, GateOutcome, ItemSnapshot, SessionError, SessionFailureKind, WalkReport,
};
pub use walker::{FeedView, FeedWalker};
