use std::fmt;

use chrono::NaiveDate;
use harvester_core::{FeedRecord, StopReason};

/// Captured markup of one rendered feed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub outer_html: String,
}

impl ItemSnapshot {
    pub fn new(outer_html: impl Into<String>) -> Self {
        Self {
            outer_html: outer_html.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("feed item carries no resolvable id")]
    MissingId,
    #[error("feed item {external_id} has no body text")]
    MissingBody { external_id: String },
    #[error("feed item {external_id} has no parsable time ({detail})")]
    UnparsableTime { external_id: String, detail: String },
}

impl ExtractionError {
    /// The item's id, when it was resolved before the failure.
    pub fn external_id(&self) -> Option<&str> {
        match self {
            ExtractionError::MissingId => None,
            ExtractionError::MissingBody { external_id }
            | ExtractionError::UnparsableTime { external_id, .. } => Some(external_id),
        }
    }
}

/// What the dedup gate did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// New id; written.
    Inserted,
    /// Known id whose content changed; overwritten, not counted as new.
    Refreshed,
    /// Already decided this run, or stored with identical content.
    AlreadyKnown,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SessionError {
    pub kind: SessionFailureKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: SessionFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailureKind {
    Launch,
    NavigationTimeout,
    ElementWaitTimeout,
    Browser,
    Cancelled,
}

impl fmt::Display for SessionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFailureKind::Launch => write!(f, "browser launch failed"),
            SessionFailureKind::NavigationTimeout => write!(f, "page load timed out"),
            SessionFailureKind::ElementWaitTimeout => write!(f, "feed items never appeared"),
            SessionFailureKind::Browser => write!(f, "browser error"),
            SessionFailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of one walk over the feed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WalkReport {
    /// Records written for the first time, in discovery order.
    pub inserted: Vec<FeedRecord>,
    pub refreshed: usize,
    pub target_reached: bool,
    /// `None` when no session ran to a normal stop.
    pub stop_reason: Option<StopReason>,
    pub iterations: u32,
    pub earliest_date: Option<NaiveDate>,
}

impl WalkReport {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
    }

    /// Fold a later attempt of the same run into this report. The stop reason
    /// is the later attempt's; everything else accumulates.
    pub fn absorb(&mut self, attempt: WalkReport) {
        self.inserted.extend(attempt.inserted);
        self.refreshed += attempt.refreshed;
        self.iterations += attempt.iterations;
        self.target_reached |= attempt.target_reached;
        self.earliest_date = match (self.earliest_date, attempt.earliest_date) {
            (Some(ours), Some(theirs)) => Some(ours.min(theirs)),
            (ours, theirs) => ours.or(theirs),
        };
        self.stop_reason = attempt.stop_reason;
    }
}
