//! Window expansion near the edge of loaded content.

use crate::error::Result;
use crate::types::{Seed, SeedRange};

use super::ProgressiveLoader;
use super::task::FetchOutcome;

impl ProgressiveLoader {
    /// Fetch scripts and audio for `[position, position + expand_window - 1]`
    ///
    /// Called by the playback layer when it approaches the end of what is
    /// loaded. Gated by an `expand:start-end` ledger key, which never collides
    /// with the tier-indexed keys of queued tasks; the key is only kept when
    /// both fetches succeed.
    ///
    /// Returns `Ok(false)` if the window was already expanded.
    ///
    /// # Errors
    ///
    /// Returns the content source's error if either fetch fails.
    pub async fn expand_from_seed(&self, position: Seed) -> Result<bool> {
        let start = self.tiers.clamp(position);
        let end = start
            .saturating_add(self.config.loader.expand_window - 1)
            .min(self.tiers.total());
        let range = SeedRange::new(start, end);
        let key = format!("expand:{range}");

        if !self.cache.try_claim(&key).await {
            tracing::debug!(key = %key, "Window already expanded");
            return Ok(false);
        }

        tracing::info!(range_start = start, range_end = end, "Expanding loaded window");
        let generation = self.current_generation();
        let tier = self.tiers.tier_for(start).name.clone();

        let result: Result<FetchOutcome> = async {
            if self.load_script_range(generation, range, &tier).await? == FetchOutcome::Stale {
                return Ok(FetchOutcome::Stale);
            }
            self.load_audio_range(range).await
        }
        .await;

        match result {
            Ok(FetchOutcome::Stale) => {
                self.cache.release(&key).await;
                Ok(false)
            }
            Ok(_) => Ok(true),
            Err(e) => {
                self.cache.release(&key).await;
                tracing::warn!(
                    range_start = start,
                    range_end = end,
                    error = %e,
                    "Window expansion failed"
                );
                Err(e)
            }
        }
    }
}
