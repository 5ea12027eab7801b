//! Harvester core: feed data model and the pure walk state machine.
mod lookup;
mod progress;
mod record;

pub use lookup::{first_success, LookupChain, Resolved};
pub use progress::{
    HarvestProgress, RoundSummary, StopReason, Verdict, WalkLimits, WalkPhase,
};
pub use record::{canonical_url, is_absolute_http_url, Engagement, FeedRecord};
