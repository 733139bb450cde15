//! Bulk download for offline use: a separate, cancellable state machine.
//!
//! Scripts are fetched in fixed-size chunks, then the audio they reference in
//! fixed-size batches. Cancellation is checked between chunks and batches and
//! also raced against each fetch, so a cancel takes effect without waiting
//! for an in-flight request to finish.

use std::sync::{MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::retry::fetch_with_retry;
use crate::tiers::TierTable;
use crate::types::{DownloadOption, DownloadPhase, DownloadProgress, Event, Seed, SeedRange};

use super::ProgressiveLoader;

/// Units covered by `option` when starting from `position`
pub(crate) fn offline_range(tiers: &TierTable, option: DownloadOption, position: Seed) -> SeedRange {
    let position = tiers.clamp(position);
    let total = tiers.total();
    let window = |units: u32| SeedRange::new(position, position.saturating_add(units - 1).min(total));

    match option {
        DownloadOption::Current => SeedRange::new(position, tiers.tier_for(position).end),
        DownloadOption::Next50 => window(50),
        DownloadOption::Next100 => window(100),
        DownloadOption::Entire => SeedRange::new(tiers.first_position(), total),
    }
}

impl ProgressiveLoader {
    /// Download a range of the course for offline use
    ///
    /// `on_progress` is called once at the start, after every script chunk
    /// and audio batch, and once more in the terminal state. Only one
    /// download may run at a time.
    ///
    /// Cancellation via [`cancel_download`](ProgressiveLoader::cancel_download)
    /// is not an error: the returned progress has phase
    /// [`DownloadPhase::Cancelled`].
    ///
    /// # Errors
    ///
    /// - [`Error::DownloadInProgress`] if another download is running
    /// - the content source's error if a fetch fails; the phase is left where
    ///   it was
    pub async fn download_for_offline<F>(
        &self,
        option: DownloadOption,
        current_position: Seed,
        mut on_progress: F,
    ) -> Result<DownloadProgress>
    where
        F: FnMut(&DownloadProgress) + Send,
    {
        let token = self.register_download()?;
        // Cancelling on drop frees the slot however this function exits
        let _slot = token.clone().drop_guard();

        let range = offline_range(&self.tiers, option, current_position);
        tracing::info!(
            option = ?option,
            range_start = range.start,
            range_end = range.end,
            "Offline download started"
        );

        let mut progress = DownloadProgress::new(range.len());
        self.report(&progress, &mut on_progress);

        if !self.download_scripts(range, &token, &mut progress, &mut on_progress).await? {
            return Ok(self.finish_cancelled(progress, &mut on_progress));
        }
        if !self.download_audio(range, &token, &mut progress, &mut on_progress).await? {
            return Ok(self.finish_cancelled(progress, &mut on_progress));
        }

        self.refresh_audio_count().await;
        progress.phase = DownloadPhase::Complete;
        progress.recompute_percent();
        self.report(&progress, &mut on_progress);

        tracing::info!(
            units = progress.completed_units,
            audio_files = progress.completed_audio_files,
            "Offline download complete"
        );
        Ok(progress)
    }

    /// Signal the running offline download to stop
    ///
    /// Returns true if a running download was signalled.
    pub fn cancel_download(&self) -> bool {
        let slot = self.download_slot();
        match slot.as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                tracing::info!("Offline download cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Whether an offline download is running
    pub fn is_downloading(&self) -> bool {
        self.download_slot()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    fn download_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.offline
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn register_download(&self) -> Result<CancellationToken> {
        let mut slot = self.download_slot();
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return Err(Error::DownloadInProgress);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Script phase. Returns false if cancelled.
    async fn download_scripts<F>(
        &self,
        range: SeedRange,
        token: &CancellationToken,
        progress: &mut DownloadProgress,
        on_progress: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(&DownloadProgress) + Send,
    {
        let chunk_size = self.config.loader.download_chunk_size;
        let mut start = range.start;

        while start <= range.end {
            if token.is_cancelled() {
                return Ok(false);
            }

            let count = chunk_size.min(range.end - start + 1);
            let chunk = SeedRange::new(start, start + count - 1);

            if !self.cache.contains_all(chunk).await {
                let fetch = fetch_with_retry(&self.config.retry, || {
                    self.source.fetch_script_chunk(start, count)
                });
                let units = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Ok(false),
                    result = fetch => result.map_err(|e| {
                        tracing::error!(
                            range_start = chunk.start,
                            range_end = chunk.end,
                            error = %e,
                            "Offline download failed during script phase"
                        );
                        e
                    })?,
                };
                // A teardown may have landed after the fetch resolved
                if token.is_cancelled() {
                    return Ok(false);
                }
                let tier = self.tiers.tier_for(start).name.clone();
                self.store_units(units, &tier).await;
            }

            progress.completed_units += count;
            progress.recompute_percent();
            self.report(progress, on_progress);

            start += count;
        }

        Ok(true)
    }

    /// Audio phase. Returns false if cancelled.
    async fn download_audio<F>(
        &self,
        range: SeedRange,
        token: &CancellationToken,
        progress: &mut DownloadProgress,
        on_progress: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(&DownloadProgress) + Send,
    {
        if token.is_cancelled() {
            return Ok(false);
        }

        let locators = self.cache.audio_locators(range).await;
        progress.phase = DownloadPhase::Audio;
        progress.total_audio_files = locators.len();
        progress.recompute_percent();
        self.report(progress, on_progress);

        for batch in locators.chunks(self.config.loader.audio_batch_size) {
            if token.is_cancelled() {
                return Ok(false);
            }

            let fetch = fetch_with_retry(&self.config.retry, || {
                self.source.preload_audio_batch(batch)
            });
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(false),
                result = fetch => result.map_err(|e| {
                    tracing::error!(
                        batch_size = batch.len(),
                        error = %e,
                        "Offline download failed during audio phase"
                    );
                    e
                })?,
            }

            progress.completed_audio_files += batch.len();
            progress.recompute_percent();
            self.report(progress, on_progress);
        }

        Ok(true)
    }

    fn finish_cancelled<F>(&self, mut progress: DownloadProgress, on_progress: &mut F) -> DownloadProgress
    where
        F: FnMut(&DownloadProgress) + Send,
    {
        progress.phase = DownloadPhase::Cancelled;
        progress.recompute_percent();
        self.report(&progress, on_progress);

        tracing::info!(
            completed_units = progress.completed_units,
            total_units = progress.total_units,
            completed_audio_files = progress.completed_audio_files,
            "Offline download cancelled"
        );
        progress
    }

    fn report<F>(&self, progress: &DownloadProgress, on_progress: &mut F)
    where
        F: FnMut(&DownloadProgress) + Send,
    {
        on_progress(progress);
        self.emit_event(Event::DownloadProgress {
            progress: progress.clone(),
        });
    }
}
