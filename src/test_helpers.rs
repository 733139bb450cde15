//! Shared test helpers: unit fixtures and in-memory collaborators.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::loader::ProgressiveLoader;
use crate::source::{AudioStore, ContentSource};
use crate::tiers::TierTable;
use crate::types::{CacheStats, Seed, Unit, UnitItem};

/// A unit with two audio files, `unit-{seed}-a.mp3` and `unit-{seed}-b.mp3`
pub(crate) fn make_unit(seed: Seed) -> Unit {
    Unit {
        seed,
        id: format!("unit-{seed}"),
        group_id: format!("lesson-{}", seed.div_ceil(5)),
        items: vec![
            UnitItem {
                id: format!("unit-{seed}-item-1"),
                audio: vec![format!("unit-{seed}-a.mp3")],
            },
            UnitItem {
                id: format!("unit-{seed}-item-2"),
                audio: vec![format!("unit-{seed}-b.mp3")],
            },
        ],
        review: None,
    }
}

/// In-memory content source serving every seed up to `total`
pub(crate) struct MockContentSource {
    total: Seed,
    delay: Option<Duration>,
    failing_chunks: Mutex<HashSet<Seed>>,
    fail_audio: bool,
    script_calls: Mutex<Vec<(Seed, u32)>>,
    audio_batches: AtomicUsize,
    preloaded: Mutex<HashSet<String>>,
}

impl MockContentSource {
    pub(crate) fn new(total: Seed) -> Self {
        Self {
            total,
            delay: None,
            failing_chunks: Mutex::new(HashSet::new()),
            fail_audio: false,
            script_calls: Mutex::new(Vec::new()),
            audio_batches: AtomicUsize::new(0),
            preloaded: Mutex::new(HashSet::new()),
        }
    }

    /// Sleep this long inside every call
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject every audio preload
    pub(crate) fn with_failing_audio(mut self) -> Self {
        self.fail_audio = true;
        self
    }

    /// Fail script requests starting at `start`
    pub(crate) fn fail_chunk_at(&self, start: Seed) {
        self.failing_chunks.lock().unwrap().insert(start);
    }

    pub(crate) fn heal_chunk_at(&self, start: Seed) {
        self.failing_chunks.lock().unwrap().remove(&start);
    }

    pub(crate) fn script_calls(&self) -> Vec<(Seed, u32)> {
        self.script_calls.lock().unwrap().clone()
    }

    pub(crate) fn script_call_count(&self) -> usize {
        self.script_calls.lock().unwrap().len()
    }

    /// How often a script request started at `start`
    pub(crate) fn calls_starting_at(&self, start: Seed) -> usize {
        self.script_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == start)
            .count()
    }

    pub(crate) fn audio_batch_count(&self) -> usize {
        self.audio_batches.load(Ordering::SeqCst)
    }

    pub(crate) fn preloaded_count(&self) -> usize {
        self.preloaded.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ContentSource for MockContentSource {
    async fn fetch_script_chunk(&self, start: Seed, count: u32) -> Result<Vec<Unit>> {
        self.script_calls.lock().unwrap().push((start, count));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_chunks.lock().unwrap().contains(&start) {
            return Err(Error::Fetch(format!("chunk at {start} unavailable")));
        }

        let end = start.saturating_add(count.saturating_sub(1)).min(self.total);
        Ok((start..=end).map(make_unit).collect())
    }

    async fn preload_audio_batch(&self, locators: &[String]) -> Result<()> {
        self.audio_batches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_audio {
            return Err(Error::Fetch("audio host unreachable".into()));
        }
        self.preloaded
            .lock()
            .unwrap()
            .extend(locators.iter().cloned());
        Ok(())
    }

    async fn audio_cache_stats(&self) -> CacheStats {
        CacheStats {
            count: self.preloaded_count() as u64,
        }
    }
}

/// In-memory audio store with per-locator failure injection
pub(crate) struct MockAudioStore {
    cached: tokio::sync::Mutex<HashSet<String>>,
    failing: tokio::sync::Mutex<HashSet<String>>,
    fail_all: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockAudioStore {
    pub(crate) fn new() -> Self {
        Self {
            cached: tokio::sync::Mutex::new(HashSet::new()),
            failing: tokio::sync::Mutex::new(HashSet::new()),
            fail_all: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every `cache_audio` call
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A store whose every `cache_audio` call fails
    pub(crate) fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }

    pub(crate) async fn preload<'a>(&self, locators: impl IntoIterator<Item = &'a str>) {
        let mut cached = self.cached.lock().await;
        cached.extend(locators.into_iter().map(str::to_string));
    }

    pub(crate) async fn fail_locator(&self, locator: &str) {
        self.failing.lock().await.insert(locator.to_string());
    }

    pub(crate) async fn contains(&self, locator: &str) -> bool {
        self.cached.lock().await.contains(locator)
    }

    pub(crate) fn cache_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AudioStore for MockAudioStore {
    async fn is_cached(&self, locator: &str) -> bool {
        self.cached.lock().await.contains(locator)
    }

    async fn cache_audio(&self, locator: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Yield so sibling fetches interleave under buffer_unordered
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        if self.fail_all || self.failing.lock().await.contains(locator) {
            return Err(Error::Fetch(format!("{locator} not found")));
        }
        self.cached.lock().await.insert(locator.to_string());
        Ok(())
    }
}

/// A loader over the default belt table backed by `source`
pub(crate) fn create_test_loader(source: Arc<MockContentSource>) -> ProgressiveLoader {
    ProgressiveLoader::new(Config::default(), TierTable::default(), source).unwrap()
}
