use std::collections::HashSet;

use chrono::NaiveDate;

/// Empirical thresholds that shape when a walk gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    /// Hard bound on evaluated rounds, regardless of anything else.
    pub max_scroll_iterations: u32,
    /// Consecutive rounds without inserts or growth before exhaustion is assumed.
    pub max_no_progress_rounds: u32,
    /// Extra rounds after the cutoff is first observed, for out-of-order rendering.
    pub rounds_after_target: u32,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            max_scroll_iterations: 30,
            max_no_progress_rounds: 8,
            rounds_after_target: 3,
        }
    }
}

/// Where the walker currently is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkPhase {
    #[default]
    Scrolling,
    Extracting,
    Evaluating,
    Stopped(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cutoff was observed and the post-target rounds were absorbed.
    TargetReached,
    /// The hard iteration bound was hit.
    IterationCap,
    /// No cutoff was requested and the feed stopped producing content.
    Exhausted,
    /// A cutoff was requested but the retrievable depth ended before it.
    TargetUnmet,
    /// Cooperative cancellation was requested.
    Cancelled,
}

/// What the walker saw during one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundSummary {
    /// Items rendered in the view when the round started.
    pub rendered: usize,
    /// Records durably inserted during the round.
    pub inserted: usize,
}

/// Outcome of evaluating a finished round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// Scroll once more, slowly, and report the rendered count via
    /// [`HarvestProgress::confirm_exhaustion`].
    VerifyExhaustion,
    Stop(StopReason),
}

/// Per-walk bookkeeping. Never persisted; one value per walker invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HarvestProgress {
    cutoff: Option<NaiveDate>,
    decided: HashSet<String>,
    inserted: usize,
    earliest_date: Option<NaiveDate>,
    no_progress_rounds: u32,
    target_reached: bool,
    rounds_since_target: u32,
    iterations: u32,
    last_rendered: Option<usize>,
    phase: WalkPhase,
}

impl HarvestProgress {
    pub fn new(cutoff: Option<NaiveDate>) -> Self {
        Self {
            cutoff,
            ..Self::default()
        }
    }

    pub fn cutoff(&self) -> Option<NaiveDate> {
        self.cutoff
    }

    pub fn phase(&self) -> WalkPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: WalkPhase) {
        if !matches!(self.phase, WalkPhase::Stopped(_)) {
            self.phase = phase;
        }
    }

    pub fn is_decided(&self, external_id: &str) -> bool {
        self.decided.contains(external_id)
    }

    /// Returns `false` if the id was already decided this run.
    pub fn mark_decided(&mut self, external_id: &str) -> bool {
        self.decided.insert(external_id.to_string())
    }

    pub fn record_inserted(&mut self, external_id: &str) {
        self.mark_decided(external_id);
        self.inserted += 1;
    }

    /// Track the reporting date of an extracted record; flags the target once
    /// a date on or before the cutoff shows up.
    pub fn observe_date(&mut self, date: NaiveDate) {
        if self.earliest_date.is_none_or(|earliest| date < earliest) {
            self.earliest_date = Some(date);
        }
        if let Some(cutoff) = self.cutoff {
            if date <= cutoff {
                self.target_reached = true;
            }
        }
    }

    pub fn decided_count(&self) -> usize {
        self.decided.len()
    }

    pub fn inserted_count(&self) -> usize {
        self.inserted
    }

    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.earliest_date
    }

    pub fn target_reached(&self) -> bool {
        self.target_reached
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn no_progress_rounds(&self) -> u32 {
        self.no_progress_rounds
    }

    /// Close a round and decide what happens next.
    ///
    /// Precedence: target reached, then the iteration cap, then exhaustion.
    pub fn close_round(&mut self, round: RoundSummary, limits: &WalkLimits) -> Verdict {
        self.iterations += 1;
        let grew = self
            .last_rendered
            .is_none_or(|previous| round.rendered > previous);
        self.last_rendered = Some(round.rendered);

        if self.target_reached {
            if self.rounds_since_target >= limits.rounds_after_target {
                return self.stop(StopReason::TargetReached);
            }
            self.rounds_since_target += 1;
        }

        if self.iterations >= limits.max_scroll_iterations {
            return self.stop(StopReason::IterationCap);
        }

        if self.target_reached {
            return Verdict::Continue;
        }

        if round.inserted == 0 && !grew {
            self.no_progress_rounds += 1;
        } else {
            self.no_progress_rounds = 0;
        }

        if self.no_progress_rounds >= limits.max_no_progress_rounds {
            return match self.cutoff {
                None => self.stop(StopReason::Exhausted),
                Some(_) => Verdict::VerifyExhaustion,
            };
        }
        Verdict::Continue
    }

    /// Resolve a [`Verdict::VerifyExhaustion`] with the rendered count seen
    /// after the slow verification scroll.
    pub fn confirm_exhaustion(&mut self, rendered_after: usize) -> Verdict {
        let previous = self.last_rendered.unwrap_or(0);
        if rendered_after > previous {
            self.no_progress_rounds = 0;
            self.last_rendered = Some(rendered_after);
            Verdict::Continue
        } else {
            self.stop(StopReason::TargetUnmet)
        }
    }

    pub fn cancel(&mut self) -> Verdict {
        self.stop(StopReason::Cancelled)
    }

    fn stop(&mut self, reason: StopReason) -> Verdict {
        self.phase = WalkPhase::Stopped(reason);
        Verdict::Stop(reason)
    }
}
