//! In-memory course content for integration tests

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use course_loader::{
    AudioStore, CacheStats, ContentSource, Error, Result, ReviewMeta, Seed, Unit, UnitItem,
};

/// A unit with one prompt and one answer recording
pub fn course_unit(seed: Seed) -> Unit {
    Unit {
        seed,
        id: format!("u{seed}"),
        group_id: format!("lesson-{}", seed.div_ceil(10)),
        items: vec![
            UnitItem {
                id: format!("u{seed}-prompt"),
                audio: vec![format!("audio/{seed}/prompt.mp3")],
            },
            UnitItem {
                id: format!("u{seed}-answer"),
                audio: vec![format!("audio/{seed}/answer.mp3")],
            },
        ],
        review: (seed > 10 && seed % 10 == 0).then(|| ReviewMeta {
            review_of: vec![seed - 10],
            interval: 10,
        }),
    }
}

/// Course server stand-in with a shared audio cache
///
/// Implements both collaborator traits so the loader's preloads and the
/// buffer maintainer's per-file fetches land in the same cache.
pub struct FakeCourse {
    total: Seed,
    unavailable: Mutex<HashSet<Seed>>,
    script_requests: AtomicUsize,
    audio: Mutex<HashSet<String>>,
}

impl FakeCourse {
    /// A course of `total` units
    pub fn new(total: Seed) -> Self {
        Self {
            total,
            unavailable: Mutex::new(HashSet::new()),
            script_requests: AtomicUsize::new(0),
            audio: Mutex::new(HashSet::new()),
        }
    }

    /// Make script requests starting at `start` fail
    pub fn make_unavailable(&self, start: Seed) {
        self.unavailable.lock().unwrap().insert(start);
    }

    /// Number of script requests served or refused
    pub fn script_requests(&self) -> usize {
        self.script_requests.load(Ordering::SeqCst)
    }

    /// Whether `locator` is in the shared audio cache
    pub fn has_audio(&self, locator: &str) -> bool {
        self.audio.lock().unwrap().contains(locator)
    }
}

#[async_trait::async_trait]
impl ContentSource for FakeCourse {
    async fn fetch_script_chunk(&self, start: Seed, count: u32) -> Result<Vec<Unit>> {
        self.script_requests.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.unavailable.lock().unwrap().contains(&start) {
            return Err(Error::Fetch(format!("script {start}+{count}: 503")));
        }
        let end = start.saturating_add(count.saturating_sub(1)).min(self.total);
        Ok((start..=end).map(course_unit).collect())
    }

    async fn preload_audio_batch(&self, locators: &[String]) -> Result<()> {
        tokio::task::yield_now().await;
        self.audio.lock().unwrap().extend(locators.iter().cloned());
        Ok(())
    }

    async fn audio_cache_stats(&self) -> CacheStats {
        CacheStats {
            count: self.audio.lock().unwrap().len() as u64,
        }
    }
}

#[async_trait::async_trait]
impl AudioStore for FakeCourse {
    async fn is_cached(&self, locator: &str) -> bool {
        self.has_audio(locator)
    }

    async fn cache_audio(&self, locator: &str) -> Result<()> {
        tokio::task::yield_now().await;
        self.audio.lock().unwrap().insert(locator.to_string());
        Ok(())
    }
}
