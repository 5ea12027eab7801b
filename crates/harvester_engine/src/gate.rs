use engine_logging::{engine_debug, engine_error};
use harvester_core::{FeedRecord, HarvestProgress};

use crate::store::{content_fingerprint, FeedStore, StoreError};
use crate::GateOutcome;

/// Decides whether a record is new and writes it at most once per run.
pub struct DedupGate<'a> {
    store: &'a dyn FeedStore,
}

impl<'a> DedupGate<'a> {
    pub fn new(store: &'a dyn FeedStore) -> Self {
        Self { store }
    }

    /// On a store failure the id stays undecided so a later pass can retry it.
    pub async fn admit(
        &self,
        progress: &mut HarvestProgress,
        record: &FeedRecord,
    ) -> Result<GateOutcome, StoreError> {
        let id = record.external_id.as_str();
        if progress.is_decided(id) {
            return Ok(GateOutcome::AlreadyKnown);
        }

        let fingerprint = content_fingerprint(record);
        let stored = self.store.fingerprint(id).await.inspect_err(|err| {
            engine_error!("lookup of record {id} failed: {err}");
        })?;

        let outcome = match stored {
            Some(existing) if existing == fingerprint => GateOutcome::AlreadyKnown,
            Some(_) => GateOutcome::Refreshed,
            None => GateOutcome::Inserted,
        };

        if outcome != GateOutcome::AlreadyKnown {
            self.store
                .upsert_record(record, &fingerprint)
                .await
                .inspect_err(|err| {
                    engine_error!("persisting record {id} failed: {err}");
                })?;
        }

        match outcome {
            GateOutcome::Inserted => progress.record_inserted(id),
            GateOutcome::Refreshed | GateOutcome::AlreadyKnown => {
                progress.mark_decided(id);
            }
        }
        engine_debug!("record {id}: {outcome:?}");
        Ok(outcome)
    }
}
