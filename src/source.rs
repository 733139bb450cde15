//! Injected collaborator seams
//!
//! The loader never talks to the network or to storage itself. The embedding
//! application supplies a [`ContentSource`] for script chunks and audio
//! preloads, and an [`AudioStore`] for the per-file existence check and put
//! used by the buffer maintainer.

use crate::error::Result;
use crate::types::{CacheStats, Seed, Unit};

/// Remote content provider
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the units in `[start, start + count)`
    ///
    /// May return fewer units than requested. Each returned unit is indexed by
    /// its own `seed`, not by its place in the request.
    async fn fetch_script_chunk(&self, start: Seed, count: u32) -> Result<Vec<Unit>>;

    /// Best-effort preload of a batch of audio files
    ///
    /// Individual file failures should not fail the batch; an `Err` means the
    /// batch as a whole could not be attempted.
    async fn preload_audio_batch(&self, locators: &[String]) -> Result<()>;

    /// Counters from the underlying audio cache, for display only
    async fn audio_cache_stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Per-file audio cache used by the buffer maintainer
#[async_trait::async_trait]
pub trait AudioStore: Send + Sync {
    /// Whether `locator` is already stored locally
    async fn is_cached(&self, locator: &str) -> bool;

    /// Fetch `locator` and store it
    async fn cache_audio(&self, locator: &str) -> Result<()>;
}
