use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::settings::{PauseRange, ScrollSettings};
use crate::walker::FeedView;
use crate::SessionError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollStep {
    /// Absolute vertical offset to move to.
    pub offset: f64,
    /// Wait after arriving.
    pub pause: Duration,
}

/// One randomized, human-paced scroll: a few short hops then a longer settle.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollPlan {
    pub steps: Vec<ScrollStep>,
    pub settle: Duration,
}

impl ScrollPlan {
    pub fn sample<R: Rng + ?Sized>(
        rng: &mut R,
        viewport_height: f64,
        start_offset: f64,
        settings: &ScrollSettings,
        settle: PauseRange,
    ) -> Self {
        let (low, high) = settings.viewport_fraction;
        let low = if low.is_finite() { low.clamp(0.0, 1.0) } else { 0.0 };
        let high = if high.is_finite() { high.clamp(0.0, 1.0) } else { low };
        let fraction = if high > low {
            rng.random_range(low..=high)
        } else {
            low
        };
        let distance = viewport_height.max(0.0) * fraction;

        let min_steps = settings.min_steps.max(1);
        let max_steps = settings.max_steps.max(min_steps);
        let step_count = rng.random_range(min_steps..=max_steps);
        let hop = distance / f64::from(step_count);

        let steps = (1..=step_count)
            .map(|index| ScrollStep {
                offset: start_offset + hop * f64::from(index),
                pause: settings.step_pause.sample(rng),
            })
            .collect();

        Self {
            steps,
            settle: settle.sample(rng),
        }
    }

    pub fn distance(&self, start_offset: f64) -> f64 {
        self.steps
            .last()
            .map(|step| step.offset - start_offset)
            .unwrap_or(0.0)
    }

    /// Drive the view through the plan. `Ok(false)` means cancellation cut it short.
    pub async fn perform<V: FeedView + ?Sized>(
        &self,
        view: &mut V,
        cancel: &CancellationToken,
    ) -> Result<bool, SessionError> {
        for step in &self.steps {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            view.scroll_to(step.offset).await?;
            if !pause(step.pause, cancel).await {
                return Ok(false);
            }
        }
        Ok(pause(self.settle, cancel).await)
    }
}

/// Sleep unless cancelled first; `false` when cancelled.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
