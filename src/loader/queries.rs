//! Read-only cache queries and observable state for the playback/UI layer.

use std::sync::atomic::Ordering;

use crate::types::{LoadTask, LoaderStatus, Seed, Unit};

use super::ProgressiveLoader;

impl ProgressiveLoader {
    /// Cached units in `[start, start + count)`, in seed order
    ///
    /// Positions that are not loaded yet are simply missing from the result.
    pub async fn get_rounds_for_range(&self, start: Seed, count: u32) -> Vec<Unit> {
        self.cache.range(start, count).await
    }

    /// The cached unit at `seed`, if loaded
    pub async fn get_round_by_seed(&self, seed: Seed) -> Option<Unit> {
        self.cache.get(seed).await
    }

    /// Whether the leading units of `tier` are cached
    pub async fn is_belt_ready(&self, tier: &str) -> bool {
        self.cache.is_tier_complete(tier).await
    }

    /// Tiers whose leading units are cached, in completion order
    pub async fn completed_tiers(&self) -> Vec<String> {
        self.cache.completed_tiers().await
    }

    /// Phase 0 finished for the current session
    pub fn is_ready(&self) -> bool {
        self.observable.is_ready.load(Ordering::Acquire)
    }

    /// A queue drain is running
    pub fn is_loading(&self) -> bool {
        self.queue_state.in_flight.load(Ordering::Acquire)
    }

    /// Audio files the source's cache reports as preloaded
    pub fn cached_audio_count(&self) -> u64 {
        self.observable.cached_audio_count.load(Ordering::Relaxed)
    }

    /// Number of seeds present in the ready cache
    pub async fn cached_script_seeds(&self) -> usize {
        self.cache.len().await
    }

    /// Free-text description of the current activity
    pub async fn loading_status(&self) -> String {
        self.observable.loading_status.read().await.clone()
    }

    /// The current queue with per-task statuses
    pub async fn queue_snapshot(&self) -> Vec<LoadTask> {
        self.queue_state.queue.lock().await.clone()
    }

    /// Everything the UI displays, in one snapshot
    pub async fn status(&self) -> LoaderStatus {
        LoaderStatus {
            is_ready: self.is_ready(),
            is_loading: self.is_loading(),
            loading_status: self.loading_status().await,
            cached_audio_count: self.cached_audio_count(),
            cached_script_seeds: self.cached_script_seeds().await,
            completed_tiers: self.completed_tiers().await,
            queue_len: self.queue_state.queue.lock().await.len(),
        }
    }
}
