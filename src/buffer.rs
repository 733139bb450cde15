//! Playback buffer maintenance
//!
//! Keeps a rolling look-ahead of fully cached units in front of the playback
//! position. Buffer health counts only *contiguous* cached units: a cached
//! unit stranded behind an uncached one cannot be played without stalling.
//!
//! Everything here is best-effort. [`BufferMaintainer::ensure_buffer`] runs
//! after every completed unit and never returns an error; failures land in
//! [`BufferState::last_error`] and the log.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::config::BufferConfig;
use crate::error::Result;
use crate::source::AudioStore;
use crate::types::{BufferState, Unit};
use crate::utils::InFlightGuard;

/// Result of fetching a set of resources with bounded concurrency
#[derive(Debug, Default)]
struct FetchReport {
    succeeded: u64,
    failed: u64,
    first_error: Option<String>,
}

/// Maintains the playback look-ahead buffer (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct BufferMaintainer {
    config: Arc<BufferConfig>,
    store: Arc<dyn AudioStore>,
    state: Arc<Mutex<BufferState>>,
    prefetching: Arc<AtomicBool>,
    /// Bumped by `reset`; runs started under an older value drop their results
    generation: Arc<AtomicU64>,
}

impl BufferMaintainer {
    /// Create a maintainer over `store`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `config` does not validate.
    pub fn new(config: BufferConfig, store: Arc<dyn AudioStore>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            store,
            state: Arc::new(Mutex::new(BufferState::default())),
            prefetching: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Minutes of contiguous, fully cached content after `current_index`
    ///
    /// Walks forward from `current_index + 1` and stops at the first unit with
    /// any uncached resource.
    pub async fn calculate_buffer(&self, current_index: usize, all_units: &[Unit]) -> f64 {
        let mut ready_units = 0usize;
        for unit in all_units.iter().skip(current_index.saturating_add(1)) {
            if !self.is_fully_cached(unit).await {
                break;
            }
            ready_units += 1;
        }
        ready_units as f64 * self.config.average_unit_seconds / 60.0
    }

    /// Top the buffer up if it has fallen below the target
    ///
    /// Cheap when the buffer is healthy, and a no-op while another prefetch
    /// run is in flight. Stages up to `batch_size` units that are neither
    /// fully cached nor already prefetched, fetching their resources
    /// `concurrency` at a time; one resource failing does not stop the others.
    ///
    /// A run overtaken by [`reset`](Self::reset) leaves the state untouched.
    pub async fn ensure_buffer(&self, current_index: usize, all_units: &[Unit]) {
        let generation = self.current_generation();
        let minutes = self.calculate_buffer(current_index, all_units).await;
        {
            let mut state = self.state.lock().await;
            if !self.is_current(generation) {
                return;
            }
            state.buffer_minutes = minutes;
        }

        if minutes >= self.config.target_minutes {
            return;
        }

        let Some(_guard) = InFlightGuard::try_acquire(&self.prefetching) else {
            tracing::debug!("Prefetch already in flight, skipping");
            return;
        };

        let candidates = self.collect_candidates(current_index, all_units).await;
        if candidates.is_empty() {
            return;
        }

        let mut locators = Vec::new();
        for unit in &candidates {
            locators.extend(self.uncached_locators(unit).await);
        }

        tracing::debug!(
            buffer_minutes = minutes,
            target_minutes = self.config.target_minutes,
            units = candidates.len(),
            resources = locators.len(),
            "Buffer below target, prefetching"
        );

        let report = self.fetch_all(locators).await;

        let mut newly_ready = Vec::new();
        for unit in &candidates {
            if self.is_fully_cached(unit).await {
                newly_ready.push(unit.id.clone());
            }
        }

        let minutes = self.calculate_buffer(current_index, all_units).await;

        let mut state = self.state.lock().await;
        if !self.is_current(generation) {
            tracing::debug!("Buffer reset during prefetch, discarding results");
            return;
        }
        state.prefetched_unit_ids.extend(newly_ready);
        state.total_prefetched += report.succeeded;
        state.buffer_minutes = minutes;
        self.record_outcome(&mut state, &report);
    }

    /// Fetch every missing resource of `unit` right now
    ///
    /// For when playback is about to reach a unit that may not be staged.
    /// Returns whether the unit ended up fully cached.
    pub async fn prefetch_now(&self, unit: &Unit) -> bool {
        let generation = self.current_generation();
        let locators = self.uncached_locators(unit).await;
        let report = if locators.is_empty() {
            None
        } else {
            Some(self.fetch_all(locators).await)
        };

        let ready = self.is_fully_cached(unit).await;

        let mut state = self.state.lock().await;
        if !self.is_current(generation) {
            return ready;
        }
        if let Some(report) = report {
            state.total_prefetched += report.succeeded;
            self.record_outcome(&mut state, &report);
        }
        if ready {
            state.prefetched_unit_ids.insert(unit.id.clone());
        }
        ready
    }

    /// Forget all counters and prefetched units (course switch)
    ///
    /// Runs still in flight finish their fetches but record nothing.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        *state = BufferState::default();
        tracing::debug!("Buffer state reset");
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> BufferState {
        let mut state = self.state.lock().await.clone();
        state.is_prefetching = self.is_prefetching();
        state
    }

    /// Buffer size from the most recent calculation, in minutes
    pub async fn buffer_minutes(&self) -> f64 {
        self.state.lock().await.buffer_minutes
    }

    /// A prefetch run is in flight
    pub fn is_prefetching(&self) -> bool {
        self.prefetching.load(Ordering::Acquire)
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    async fn is_fully_cached(&self, unit: &Unit) -> bool {
        for locator in unit.audio_locators() {
            if !self.store.is_cached(locator).await {
                return false;
            }
        }
        true
    }

    async fn uncached_locators(&self, unit: &Unit) -> Vec<String> {
        let mut missing = Vec::new();
        for locator in unit.audio_locators() {
            if !self.store.is_cached(locator).await && !missing.iter().any(|m| m == locator) {
                missing.push(locator.to_string());
            }
        }
        missing
    }

    async fn collect_candidates<'a>(&self, current_index: usize, all_units: &'a [Unit]) -> Vec<&'a Unit> {
        let prefetched = self.state.lock().await.prefetched_unit_ids.clone();

        let mut candidates = Vec::new();
        for unit in all_units.iter().skip(current_index.saturating_add(1)) {
            if candidates.len() >= self.config.batch_size {
                break;
            }
            if prefetched.contains(&unit.id) || self.is_fully_cached(unit).await {
                continue;
            }
            candidates.push(unit);
        }
        candidates
    }

    /// Fetch `locators` with bounded concurrency, settling every one
    async fn fetch_all(&self, locators: Vec<String>) -> FetchReport {
        let results: Vec<(String, Result<()>)> = stream::iter(locators)
            .map(|locator| {
                let store = Arc::clone(&self.store);
                async move {
                    let result = store.cache_audio(&locator).await;
                    (locator, result)
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut report = FetchReport::default();
        for (locator, result) in results {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::debug!(locator = %locator, error = %e, "Resource prefetch failed");
                    report.failed += 1;
                    if report.first_error.is_none() {
                        report.first_error = Some(format!("{locator}: {e}"));
                    }
                }
            }
        }
        report
    }

    fn record_outcome(&self, state: &mut BufferState, report: &FetchReport) {
        match &report.first_error {
            Some(first) => {
                let message = format!(
                    "{} of {} resources failed to prefetch (first: {})",
                    report.failed,
                    report.failed + report.succeeded,
                    first
                );
                tracing::warn!(
                    failed = report.failed,
                    succeeded = report.succeeded,
                    error = %first,
                    "Buffer prefetch incomplete"
                );
                state.last_error = Some(message);
            }
            None => state.last_error = None,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::Error;
    use crate::test_helpers::{MockAudioStore, make_unit};

    fn config() -> BufferConfig {
        BufferConfig {
            target_minutes: 1.0,
            batch_size: 3,
            concurrency: 2,
            average_unit_seconds: 30.0,
        }
    }

    fn units(count: u32) -> Vec<Unit> {
        (1..=count).map(make_unit).collect()
    }

    #[tokio::test]
    async fn buffer_counts_only_contiguous_cached_units() {
        let all = units(4);
        let store = Arc::new(MockAudioStore::new());
        // u1 and u2 cached, u3 missing, u4 cached
        for idx in [0, 1, 3] {
            store.preload(all[idx].audio_locators()).await;
        }
        let maintainer = BufferMaintainer::new(config(), store).unwrap();

        // A sentinel unit sits before u1 so "current" precedes it
        let mut with_current = vec![make_unit(0)];
        with_current.extend(all);

        let minutes = maintainer.calculate_buffer(0, &with_current).await;
        assert_eq!(minutes, 1.0, "two 30-second units = 1 minute, u4 excluded");
    }

    #[tokio::test]
    async fn healthy_buffer_is_a_no_op() {
        let all = units(4);
        let store = Arc::new(MockAudioStore::new());
        for unit in &all {
            store.preload(unit.audio_locators()).await;
        }
        let maintainer = BufferMaintainer::new(config(), store.clone()).unwrap();

        maintainer.ensure_buffer(0, &all).await;

        assert_eq!(store.cache_calls(), 0);
        let state = maintainer.state().await;
        assert_eq!(state.buffer_minutes, 1.5);
        assert_eq!(state.total_prefetched, 0);
    }

    #[tokio::test]
    async fn ensure_buffer_prefetches_next_batch() {
        let all = units(6);
        let store = Arc::new(MockAudioStore::new());
        let maintainer = BufferMaintainer::new(config(), store.clone()).unwrap();

        maintainer.ensure_buffer(0, &all).await;

        // batch_size 3: units 2, 3, 4 with two resources each
        assert_eq!(store.cache_calls(), 6);
        let state = maintainer.state().await;
        assert_eq!(state.total_prefetched, 6);
        assert_eq!(state.buffer_minutes, 1.5);
        assert!(state.prefetched_unit_ids.contains("unit-2"));
        assert!(!state.prefetched_unit_ids.contains("unit-5"));
        assert!(state.last_error.is_none());
        assert!(!state.is_prefetching);
    }

    #[tokio::test]
    async fn ensure_buffer_never_fails_when_every_fetch_rejects() {
        let all = units(4);
        let store = Arc::new(MockAudioStore::failing());
        let maintainer = BufferMaintainer::new(config(), store.clone()).unwrap();

        maintainer.ensure_buffer(0, &all).await;

        let state = maintainer.state().await;
        assert!(state.last_error.is_some(), "failure should be recorded");
        assert_eq!(state.buffer_minutes, 0.0);
        assert_eq!(state.total_prefetched, 0);
        assert!(state.prefetched_unit_ids.is_empty());
        assert!(!maintainer.is_prefetching(), "guard must be released");
    }

    #[tokio::test]
    async fn one_failing_resource_does_not_cancel_siblings() {
        let all = units(3);
        let store = Arc::new(MockAudioStore::new());
        store.fail_locator("unit-2-b.mp3").await;
        let maintainer = BufferMaintainer::new(config(), store.clone()).unwrap();

        maintainer.ensure_buffer(0, &all).await;

        assert!(store.contains("unit-2-a.mp3").await);
        assert!(store.contains("unit-3-a.mp3").await);
        assert!(store.contains("unit-3-b.mp3").await);

        let state = maintainer.state().await;
        assert_eq!(state.total_prefetched, 3);
        assert!(state.last_error.as_deref().unwrap().contains("unit-2-b.mp3"));
        assert!(!state.prefetched_unit_ids.contains("unit-2"));
        assert!(state.prefetched_unit_ids.contains("unit-3"));
    }

    #[tokio::test]
    async fn runs_do_not_overlap() {
        let all = units(4);
        let store = Arc::new(MockAudioStore::new());
        let maintainer = BufferMaintainer::new(config(), store.clone()).unwrap();

        let running = InFlightGuard::try_acquire(&maintainer.prefetching);
        assert!(maintainer.is_prefetching());
        maintainer.ensure_buffer(0, &all).await;
        assert_eq!(store.cache_calls(), 0);

        drop(running);
        maintainer.ensure_buffer(0, &all).await;
        assert_eq!(store.cache_calls(), 6);
    }

    #[tokio::test]
    async fn prefetch_now_reports_readiness() {
        let unit = make_unit(7);
        let store = Arc::new(MockAudioStore::new());
        let maintainer = BufferMaintainer::new(config(), store.clone()).unwrap();

        assert!(maintainer.prefetch_now(&unit).await);
        assert_eq!(store.cache_calls(), 2);

        // Already cached: no further fetches
        assert!(maintainer.prefetch_now(&unit).await);
        assert_eq!(store.cache_calls(), 2);
    }

    #[tokio::test]
    async fn prefetch_now_returns_false_on_failure() {
        let unit = make_unit(7);
        let store = Arc::new(MockAudioStore::failing());
        let maintainer = BufferMaintainer::new(config(), store).unwrap();

        assert!(!maintainer.prefetch_now(&unit).await);
        assert!(maintainer.state().await.last_error.is_some());
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let all = units(4);
        let store = Arc::new(MockAudioStore::new());
        let maintainer = BufferMaintainer::new(config(), store).unwrap();
        maintainer.ensure_buffer(0, &all).await;
        assert!(maintainer.state().await.total_prefetched > 0);

        maintainer.reset().await;

        assert_eq!(maintainer.state().await, BufferState::default());
    }

    #[tokio::test]
    async fn reset_during_prefetch_discards_the_old_run() {
        let all = units(6);
        let store = Arc::new(MockAudioStore::new().with_delay(Duration::from_millis(50)));
        let maintainer = BufferMaintainer::new(config(), store.clone()).unwrap();

        let run = {
            let maintainer = maintainer.clone();
            tokio::spawn(async move { maintainer.ensure_buffer(0, &all).await })
        };
        while store.cache_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        maintainer.reset().await;
        run.await.unwrap();

        let state = maintainer.state().await;
        assert_eq!(state.total_prefetched, 0);
        assert!(state.prefetched_unit_ids.is_empty());
        assert_eq!(state.buffer_minutes, 0.0);
        assert!(!state.is_prefetching);
    }

    #[tokio::test]
    async fn reset_during_prefetch_now_discards_the_old_run() {
        let unit = make_unit(7);
        let store = Arc::new(MockAudioStore::new().with_delay(Duration::from_millis(50)));
        let maintainer = BufferMaintainer::new(config(), store.clone()).unwrap();

        let run = {
            let maintainer = maintainer.clone();
            tokio::spawn(async move { maintainer.prefetch_now(&unit).await })
        };
        while store.cache_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        maintainer.reset().await;
        assert!(run.await.unwrap(), "fetches themselves still complete");

        assert_eq!(maintainer.state().await, BufferState::default());
    }

    #[tokio::test]
    async fn index_past_end_gives_empty_buffer() {
        let all = units(2);
        let maintainer =
            BufferMaintainer::new(config(), Arc::new(MockAudioStore::new())).unwrap();
        assert_eq!(maintainer.calculate_buffer(usize::MAX, &all).await, 0.0);
        maintainer.ensure_buffer(usize::MAX, &all).await;
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut bad = config();
        bad.concurrency = 0;
        let result = BufferMaintainer::new(bad, Arc::new(MockAudioStore::new()));
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
