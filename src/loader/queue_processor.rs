//! Queue processor: two-phase draining and session lifecycle.
//!
//! Phase 0 (the blocking window) runs while the caller waits; everything
//! else drains afterwards. Within each phase all Script tasks run before any
//! Audio task, because audio extraction reads units the scripts put in the
//! cache.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::types::{Event, LoadTask, Seed, TaskKind, TaskStatus};

use super::{InFlightGuard, ProgressiveLoader, load_seed};

/// Delay between attempts to take over from a drain that is winding down
const TAKEOVER_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Queue indices of each phase, scripts first, priority order kept within each kind
pub(crate) fn plan_phases(tasks: &[LoadTask]) -> (Vec<usize>, Vec<usize>) {
    let mut blocking = Vec::new();
    let mut rest = Vec::new();

    for kind in [TaskKind::Script, TaskKind::Audio] {
        for (idx, task) in tasks.iter().enumerate() {
            if task.kind != kind {
                continue;
            }
            if task.priority == 0 {
                blocking.push(idx);
            } else {
                rest.push(idx);
            }
        }
    }

    (blocking, rest)
}

impl ProgressiveLoader {
    /// Start a session at `position`
    ///
    /// Stops any drain left over from a previous initialization, builds a
    /// fresh queue, and returns once the blocking window has been processed
    /// and [`is_ready`](ProgressiveLoader::is_ready) is true. The remaining
    /// tasks keep draining in a background task.
    ///
    /// Cached content and the dedupe ledger survive re-initialization, so
    /// ranges fetched earlier in the session are not fetched again.
    pub async fn initialize_from_seed(&self, position: Seed) {
        let generation = self.stop_background_drain().await;
        let seed = self.tiers.clamp(position);

        let tasks = self.generate_load_queue(seed);
        let task_count = tasks.len();
        {
            let mut queue = self.queue_state.queue.lock().await;
            *queue = tasks;
        }
        self.queue_state.seed.store(seed, Ordering::Release);
        self.observable.is_ready.store(false, Ordering::Release);

        tracing::info!(
            seed,
            tier = %self.tiers.tier_for(seed).name,
            tasks = task_count,
            "Initializing from seed"
        );
        self.emit_event(Event::QueueGenerated {
            seed,
            tasks: task_count,
        });

        let Some(guard) = self.acquire_in_flight(generation).await else {
            // A newer initialization or a teardown won the race
            return;
        };

        let (blocking, rest) = {
            let queue = self.queue_state.queue.lock().await;
            plan_phases(&queue)
        };

        if !self.run_blocking_phase(generation, &blocking).await {
            return;
        }

        let loader = self.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            loader.run_background_phase(generation, &rest).await;
        });

        let mut background = self.queue_state.background.lock().await;
        if self.is_current(generation) {
            *background = Some(handle);
        } else {
            handle.abort();
        }
    }

    /// Drain the stored queue inline, both phases
    ///
    /// A no-op if a drain is already running or no queue is stored. Task
    /// failures are recorded on the tasks and never surface here.
    pub async fn process_queue(&self) {
        let Some(_guard) = InFlightGuard::try_acquire(&self.queue_state.in_flight) else {
            tracing::debug!("Queue drain already in progress, ignoring");
            return;
        };
        self.release_orphaned_claims().await;
        let generation = self.current_generation();

        let (blocking, rest) = {
            let queue = self.queue_state.queue.lock().await;
            plan_phases(&queue)
        };
        if blocking.is_empty() && rest.is_empty() {
            tracing::debug!("No load queue stored, nothing to drain");
            return;
        }

        if self.run_blocking_phase(generation, &blocking).await {
            self.run_background_phase(generation, &rest).await;
        }
    }

    /// Wait for the background drain started by `initialize_from_seed`, if any
    pub async fn wait_until_idle(&self) {
        let handle = self.queue_state.background.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
            && !e.is_cancelled()
        {
            tracing::error!(error = %e, "Background drain panicked");
        }
    }

    /// Tear down the session
    ///
    /// Abandons any running drain, cancels an offline download, and clears
    /// the cache, completed tiers, dedupe ledger, queue and observable state.
    pub async fn reset(&self) {
        self.stop_background_drain().await;
        self.cancel_download();

        self.cache.clear().await;
        self.queue_state.unsettled_keys().clear();
        self.queue_state.queue.lock().await.clear();
        self.queue_state.seed.store(0, Ordering::Release);
        self.observable.is_ready.store(false, Ordering::Release);
        self.observable
            .cached_audio_count
            .store(0, Ordering::Relaxed);
        self.set_status("Idle").await;

        tracing::info!("Loader reset");
    }

    /// Invalidate the current generation and abort the spawned drain.
    /// Returns the new generation.
    async fn stop_background_drain(&self) -> u64 {
        let generation = self.queue_state.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let handle = self.queue_state.background.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            // Awaiting the aborted task drops its in-flight guard
            let _ = handle.await;
        }

        generation
    }

    /// Take the in-flight flag, waiting for an inline drain of an older
    /// generation to notice it is stale and stop.
    async fn acquire_in_flight(&self, generation: u64) -> Option<InFlightGuard> {
        loop {
            if let Some(guard) = InFlightGuard::try_acquire(&self.queue_state.in_flight) {
                self.release_orphaned_claims().await;
                return Some(guard);
            }
            if !self.is_current(generation) {
                return None;
            }
            tokio::time::sleep(TAKEOVER_POLL_INTERVAL).await;
        }
    }

    /// Release claims left by tasks that were dropped mid-fetch (an aborted
    /// drain, or an abandoned `initialize_from_seed` future). Only called
    /// while holding the in-flight flag, when no queued task can be running.
    async fn release_orphaned_claims(&self) {
        let orphaned: Vec<String> = self.queue_state.unsettled_keys().drain().collect();
        if orphaned.is_empty() {
            return;
        }
        for key in &orphaned {
            self.cache.release(key).await;
        }
        tracing::debug!(keys = orphaned.len(), "Released claims of interrupted tasks");
    }

    /// Run the blocking tasks and flip the ready flag. Returns false if the
    /// session changed underneath.
    async fn run_blocking_phase(&self, generation: u64, indices: &[usize]) -> bool {
        self.set_status("Loading first lessons").await;

        if self.run_tasks(generation, indices).await.is_none() {
            return false;
        }

        self.observable.is_ready.store(true, Ordering::Release);
        let seed = load_seed(&self.queue_state);
        tracing::info!(seed, "Blocking phase complete, ready for playback");
        self.emit_event(Event::Ready { seed });
        true
    }

    async fn run_background_phase(&self, generation: u64, indices: &[usize]) {
        self.set_status("Loading ahead in background").await;

        let Some(failed_tasks) = self.run_tasks(generation, indices).await else {
            return;
        };

        self.refresh_audio_count().await;
        self.set_status("All content loaded").await;
        tracing::info!(
            tasks = indices.len(),
            failed_tasks,
            "Background loading complete"
        );
        self.emit_event(Event::BackgroundComplete { failed_tasks });
    }

    /// Execute the queue entries at `indices` in order, writing statuses back.
    /// Returns the number of failed tasks, or `None` once the generation is stale.
    async fn run_tasks(&self, generation: u64, indices: &[usize]) -> Option<usize> {
        let mut failed = 0;

        for &idx in indices {
            let mut task = {
                let mut queue = self.queue_state.queue.lock().await;
                if !self.is_current(generation) {
                    return None;
                }
                let slot = queue.get_mut(idx)?;
                slot.status = TaskStatus::Loading;
                slot.clone()
            };

            self.execute_task_in(generation, &mut task).await;

            let mut queue = self.queue_state.queue.lock().await;
            if !self.is_current(generation) {
                return None;
            }
            if let Some(slot) = queue.get_mut(idx) {
                slot.status = task.status;
            }
            if task.status == TaskStatus::Error {
                failed += 1;
            }
        }

        Some(failed)
    }
}
