//! Single task execution: script fetch into the cache, audio preload from it.

use crate::error::Result;
use crate::retry::fetch_with_retry;
use crate::types::{Event, LoadTask, SeedRange, TaskKind, TaskStatus};

use super::ProgressiveLoader;

/// What a fetch step achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchOutcome {
    /// Work done and recorded
    Done,
    /// Nothing to fetch yet (audio for a range with no cached scripts)
    Empty,
    /// The session changed while fetching; results were discarded
    Stale,
}

impl ProgressiveLoader {
    /// Execute one task against the current session
    ///
    /// Never fails: errors from the content source are logged, the task ends
    /// in [`TaskStatus::Error`] and its ledger key is released so a later
    /// queue can retry it. A task whose key is already in the ledger completes
    /// immediately without fetching.
    pub async fn execute_task(&self, task: &mut LoadTask) {
        let generation = self.current_generation();
        self.execute_task_in(generation, task).await;
    }

    pub(crate) async fn execute_task_in(&self, generation: u64, task: &mut LoadTask) {
        let key = task.dedupe_key();

        if !self.cache.try_claim(&key).await {
            tracing::debug!(key = %key, "Range already satisfied, skipping fetch");
            task.status = TaskStatus::Complete;
            return;
        }

        self.queue_state.unsettled_keys().insert(key.clone());
        task.status = TaskStatus::Loading;
        tracing::debug!(
            kind = %task.kind,
            tier = %task.tier,
            range_start = task.range.start,
            range_end = task.range.end,
            priority = task.priority,
            "Executing load task"
        );

        let result = match task.kind {
            TaskKind::Script => self.load_script_range(generation, task.range, &task.tier).await,
            TaskKind::Audio => self.load_audio_range(task.range).await,
        };
        self.queue_state.unsettled_keys().remove(&key);

        match result {
            Ok(FetchOutcome::Done) => {
                task.status = TaskStatus::Complete;
                self.emit_event(Event::TaskCompleted { task: task.clone() });
            }
            Ok(FetchOutcome::Empty) => {
                // Nothing was preloaded, so leave the range open for a later attempt
                self.cache.release(&key).await;
                task.status = TaskStatus::Complete;
                self.emit_event(Event::TaskCompleted { task: task.clone() });
            }
            Ok(FetchOutcome::Stale) => {
                self.cache.release(&key).await;
                task.status = TaskStatus::Pending;
                tracing::debug!(key = %key, "Session changed during fetch, result discarded");
            }
            Err(e) => {
                self.cache.release(&key).await;
                task.status = TaskStatus::Error;
                tracing::warn!(
                    kind = %task.kind,
                    tier = %task.tier,
                    range_start = task.range.start,
                    range_end = task.range.end,
                    error = %e,
                    "Load task failed, continuing with queue"
                );
                self.emit_event(Event::TaskFailed {
                    task: task.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Fetch the script chunk for `range` and index every returned unit by its own seed
    pub(crate) async fn load_script_range(
        &self,
        generation: u64,
        range: SeedRange,
        tier: &str,
    ) -> Result<FetchOutcome> {
        if range.is_empty() {
            return Ok(FetchOutcome::Empty);
        }

        let units = fetch_with_retry(&self.config.retry, || {
            self.source.fetch_script_chunk(range.start, range.len())
        })
        .await?;

        if !self.is_current(generation) {
            return Ok(FetchOutcome::Stale);
        }

        if units.len() < range.len() as usize {
            tracing::debug!(
                requested = range.len(),
                returned = units.len(),
                range_start = range.start,
                "Source returned a short chunk"
            );
        }

        self.store_units(units, tier).await;
        Ok(FetchOutcome::Done)
    }

    /// Preload the audio referenced by units already cached inside `range`
    pub(crate) async fn load_audio_range(&self, range: SeedRange) -> Result<FetchOutcome> {
        let locators = self.cache.audio_locators(range).await;
        if locators.is_empty() {
            return Ok(FetchOutcome::Empty);
        }

        fetch_with_retry(&self.config.retry, || {
            self.source.preload_audio_batch(&locators)
        })
        .await?;

        self.refresh_audio_count().await;
        Ok(FetchOutcome::Done)
    }
}
