use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use engine_logging::{engine_error, engine_info, engine_warn};
use tokio_util::sync::CancellationToken;

use crate::scroll::pause;
use crate::session::SessionController;
use crate::settings::RetrySettings;
use crate::store::FeedStore;
use crate::{SessionFailureKind, WalkReport};

/// Cutoff date `days` before today in `zone`; zero means no cutoff.
pub fn cutoff_from_days_back(days: u32, now: DateTime<Utc>, zone: Tz) -> Option<NaiveDate> {
    if days == 0 {
        return None;
    }
    now.with_timezone(&zone)
        .date_naive()
        .checked_sub_days(Days::new(u64::from(days)))
}

/// Retries whole sessions on session-level failures.
pub struct ResilientRunner {
    controller: SessionController,
    retry: RetrySettings,
}

impl ResilientRunner {
    pub fn new(controller: SessionController, retry: RetrySettings) -> Self {
        Self { controller, retry }
    }

    /// Never fails. Records stored by attempts that later failed are kept in
    /// the returned report; a run whose attempts all failed, or that is
    /// cancelled before a session completes, has no stop reason.
    pub async fn run(
        &self,
        store: &dyn FeedStore,
        cutoff: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> WalkReport {
        let mut combined = WalkReport::default();
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                engine_info!("harvest cancelled before attempt {attempt}");
                return combined;
            }
            let mut report = WalkReport::default();
            let outcome = self
                .controller
                .harvest_into(store, cutoff, cancel, &mut report)
                .await;
            combined.absorb(report);
            match outcome {
                Ok(()) => return combined,
                Err(err) if err.kind == SessionFailureKind::Cancelled || cancel.is_cancelled() => {
                    engine_info!("harvest cancelled: {err}");
                    return combined;
                }
                Err(err) => {
                    engine_warn!(
                        "harvest attempt {attempt}/{attempts} failed with {} new record(s) kept: {err}",
                        combined.inserted.len()
                    );
                    if attempt < attempts {
                        engine_info!("retrying in {:?}", self.retry.retry_delay);
                        if !pause(self.retry.retry_delay, cancel).await {
                            return combined;
                        }
                    }
                }
            }
        }
        engine_error!("giving up after {attempts} failed harvest attempts");
        combined
    }
}
