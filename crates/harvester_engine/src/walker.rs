use async_trait::async_trait;
use chrono::NaiveDate;
use engine_logging::{engine_debug, engine_info, engine_warn};
use harvester_core::{HarvestProgress, RoundSummary, StopReason, Verdict, WalkPhase};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use crate::extract::RecordExtractor;
use crate::gate::DedupGate;
use crate::scroll::{pause, ScrollPlan};
use crate::settings::WalkSettings;
use crate::store::FeedStore;
use crate::{GateOutcome, ItemSnapshot, SessionError, WalkReport};

/// A scrollable rendering of the feed.
#[async_trait]
pub trait FeedView: Send {
    /// Every feed item currently rendered, in document order.
    async fn rendered_items(&mut self) -> Result<Vec<ItemSnapshot>, SessionError>;
    async fn viewport_height(&mut self) -> Result<f64, SessionError>;
    async fn scroll_offset(&mut self) -> Result<f64, SessionError>;
    async fn scroll_to(&mut self, offset: f64) -> Result<(), SessionError>;
}

/// Drives the scroll, extract, gate loop until a stop condition holds.
pub struct FeedWalker {
    extractor: RecordExtractor,
    settings: WalkSettings,
    rng: StdRng,
}

impl FeedWalker {
    pub fn new(extractor: RecordExtractor, settings: WalkSettings) -> Self {
        Self {
            extractor,
            settings,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible scroll distances and pauses.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Walk the view from its current position.
    ///
    /// Only view failures are errors; every normal ending, including an unmet
    /// cutoff and cancellation, is reported through the stop reason.
    pub async fn walk<V: FeedView + ?Sized>(
        &mut self,
        view: &mut V,
        store: &dyn FeedStore,
        cutoff: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> Result<WalkReport, SessionError> {
        let mut report = WalkReport::default();
        self.walk_into(view, store, cutoff, cancel, &mut report)
            .await?;
        Ok(report)
    }

    /// Like [`FeedWalker::walk`], but records land in `report` as they are
    /// stored, so a view failure keeps everything written before it.
    pub async fn walk_into<V: FeedView + ?Sized>(
        &mut self,
        view: &mut V,
        store: &dyn FeedStore,
        cutoff: Option<NaiveDate>,
        cancel: &CancellationToken,
        report: &mut WalkReport,
    ) -> Result<(), SessionError> {
        let mut progress = HarvestProgress::new(cutoff);
        let outcome = self
            .run_rounds(view, store, &mut progress, report, cancel)
            .await;

        report.target_reached = progress.target_reached();
        report.iterations = progress.iterations();
        report.earliest_date = progress.earliest_date();
        match outcome {
            Ok(reason) => {
                engine_info!(
                    "walk stopped after {} rounds ({reason:?}), {} new, {} refreshed, {} ids seen",
                    progress.iterations(),
                    report.inserted.len(),
                    report.refreshed,
                    progress.decided_count()
                );
                report.stop_reason = Some(reason);
                Ok(())
            }
            Err(err) => {
                engine_warn!(
                    "walk failed while {:?} after {} round(s), keeping {} new record(s): {err}",
                    progress.phase(),
                    progress.iterations(),
                    report.inserted.len()
                );
                Err(err)
            }
        }
    }

    async fn run_rounds<V: FeedView + ?Sized>(
        &mut self,
        view: &mut V,
        store: &dyn FeedStore,
        progress: &mut HarvestProgress,
        report: &mut WalkReport,
        cancel: &CancellationToken,
    ) -> Result<StopReason, SessionError> {
        let gate = DedupGate::new(store);

        loop {
            if cancel.is_cancelled() {
                progress.cancel();
                return Ok(StopReason::Cancelled);
            }

            progress.set_phase(WalkPhase::Extracting);
            let items = view.rendered_items().await?;
            let rendered = items.len();
            let mut inserted = 0;

            for item in &items {
                if let Some(id) = self.extractor.external_id(item) {
                    if progress.is_decided(&id) {
                        continue;
                    }
                }
                let record = match self.extractor.extract(item) {
                    Ok(record) => record,
                    Err(err) => {
                        engine_debug!("skipping feed item: {err}");
                        if let Some(id) = err.external_id() {
                            progress.mark_decided(id);
                        }
                        continue;
                    }
                };
                progress.observe_date(record.reporting_date());
                match gate.admit(progress, &record).await {
                    Ok(GateOutcome::Inserted) => {
                        inserted += 1;
                        report.inserted.push(record);
                    }
                    Ok(GateOutcome::Refreshed) => report.refreshed += 1,
                    Ok(GateOutcome::AlreadyKnown) => {}
                    // Logged by the gate; the id stays undecided.
                    Err(_) => {}
                }
            }

            progress.set_phase(WalkPhase::Evaluating);
            let verdict = progress.close_round(RoundSummary { rendered, inserted }, &self.settings.limits);
            engine_info!(
                "round {}: {rendered} rendered, {inserted} new, {} new in total",
                progress.iterations(),
                progress.inserted_count()
            );

            let verdict = match verdict {
                Verdict::VerifyExhaustion => {
                    engine_info!("no progress for a while, verifying the feed is exhausted");
                    match self.verification_scroll(view, cancel).await? {
                        Some(rendered_after) => progress.confirm_exhaustion(rendered_after),
                        None => progress.cancel(),
                    }
                }
                other => other,
            };
            if let Verdict::Stop(reason) = verdict {
                return Ok(reason);
            }

            progress.set_phase(WalkPhase::Scrolling);
            if !self.scroll(view, progress.iterations(), cancel).await? {
                progress.cancel();
                return Ok(StopReason::Cancelled);
            }
        }
    }

    /// One regular scroll, with the periodic longer rest. `false` when cancelled.
    async fn scroll<V: FeedView + ?Sized>(
        &mut self,
        view: &mut V,
        round: u32,
        cancel: &CancellationToken,
    ) -> Result<bool, SessionError> {
        let scroll = &self.settings.scroll;
        if scroll.rest_every > 0 && round % scroll.rest_every == 0 {
            let rest = scroll.rest_pause.sample(&mut self.rng);
            engine_debug!("resting for {rest:?}");
            if !pause(rest, cancel).await {
                return Ok(false);
            }
        }
        let viewport = view.viewport_height().await?;
        let offset = view.scroll_offset().await?;
        let plan = ScrollPlan::sample(&mut self.rng, viewport, offset, scroll, scroll.scroll_pause);
        plan.perform(view, cancel).await
    }

    /// Slow scroll then recount; `None` when cancelled.
    async fn verification_scroll<V: FeedView + ?Sized>(
        &mut self,
        view: &mut V,
        cancel: &CancellationToken,
    ) -> Result<Option<usize>, SessionError> {
        let scroll = &self.settings.scroll;
        let viewport = view.viewport_height().await?;
        let offset = view.scroll_offset().await?;
        let plan = ScrollPlan::sample(
            &mut self.rng,
            viewport,
            offset,
            scroll,
            scroll.verification_pause,
        );
        if !plan.perform(view, cancel).await? {
            return Ok(None);
        }
        Ok(Some(view.rendered_items().await?.len()))
    }
}
