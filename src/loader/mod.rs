//! Progressive loader split into focused submodules.
//!
//! The `ProgressiveLoader` struct and its methods are organized by domain:
//! - [`cache`] - Shared ready cache, completed tiers and dedupe ledger
//! - [`queue`] - Load queue generation
//! - [`task`] - Single task execution
//! - [`queue_processor`] - Two-phase queue draining and session lifecycle
//! - [`expand`] - Window expansion near the edge of loaded content
//! - [`offline`] - Cancellable bulk download for offline use
//! - [`queries`] - Read-only cache queries and observable state

pub(crate) mod cache;
mod expand;
mod offline;
mod queries;
mod queue;
mod queue_processor;
mod task;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use queue::build_load_queue;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::source::ContentSource;
use crate::tiers::TierTable;
use crate::types::{Event, LoadTask, Seed, Unit};

pub(crate) use crate::utils::InFlightGuard;

use cache::ContentCache;

/// Task queue and drain bookkeeping
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Tasks of the current session, sorted by priority
    pub(crate) queue: Arc<Mutex<Vec<LoadTask>>>,
    /// Seed the current queue was generated from
    pub(crate) seed: Arc<AtomicU32>,
    /// Bumped on every (re)initialization and teardown; drains and fetches
    /// started under an older generation discard their results
    pub(crate) generation: Arc<AtomicU64>,
    /// Set while a drain is running (see [`InFlightGuard`])
    pub(crate) in_flight: Arc<AtomicBool>,
    /// Handle of the spawned background drain, if any
    pub(crate) background: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Ledger keys claimed by tasks that have not settled yet; released when
    /// the drain running them is aborted
    pub(crate) unsettled: Arc<StdMutex<HashSet<String>>>,
}

/// State the UI layer displays
#[derive(Clone)]
pub(crate) struct ObservableState {
    pub(crate) is_ready: Arc<AtomicBool>,
    pub(crate) loading_status: Arc<RwLock<String>>,
    pub(crate) cached_audio_count: Arc<AtomicU64>,
}

/// Cancellation slot for the offline download
///
/// A plain mutex so that `cancel_download` can be called from synchronous
/// contexts such as progress callbacks.
#[derive(Clone, Default)]
pub(crate) struct OfflineState {
    pub(crate) active: Arc<StdMutex<Option<CancellationToken>>>,
}

/// Priority-scheduled progressive content loader (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ProgressiveLoader {
    pub(crate) config: Arc<Config>,
    pub(crate) tiers: Arc<TierTable>,
    pub(crate) source: Arc<dyn ContentSource>,
    pub(crate) cache: Arc<ContentCache>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) queue_state: QueueState,
    pub(crate) observable: ObservableState,
    pub(crate) offline: OfflineState,
}

impl ProgressiveLoader {
    /// Create a loader for one course
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `config` does not validate.
    pub fn new(config: Config, tiers: TierTable, source: Arc<dyn ContentSource>) -> Result<Self> {
        config.validate()?;

        // Buffer of 1000 events; slow subscribers see RecvError::Lagged
        let (event_tx, _rx) = broadcast::channel(1000);

        tracing::info!(
            tiers = tiers.tiers().len(),
            total_units = tiers.total(),
            "Progressive loader created"
        );

        Ok(Self {
            config: Arc::new(config),
            tiers: Arc::new(tiers),
            source,
            cache: Arc::new(ContentCache::new()),
            event_tx,
            queue_state: QueueState {
                queue: Arc::new(Mutex::new(Vec::new())),
                seed: Arc::new(AtomicU32::new(0)),
                generation: Arc::new(AtomicU64::new(0)),
                in_flight: Arc::new(AtomicBool::new(false)),
                background: Arc::new(Mutex::new(None)),
                unsettled: Arc::new(StdMutex::new(HashSet::new())),
            },
            observable: ObservableState {
                is_ready: Arc::new(AtomicBool::new(false)),
                loading_status: Arc::new(RwLock::new(String::from("Idle"))),
                cached_audio_count: Arc::new(AtomicU64::new(0)),
            },
            offline: OfflineState::default(),
        })
    }

    /// Create a loader with [`Config::default()`] and the default belt table
    pub fn with_defaults(source: Arc<dyn ContentSource>) -> Result<Self> {
        Self::new(Config::default(), TierTable::default(), source)
    }

    /// Subscribe to loader events
    ///
    /// Each subscriber receives all events independently.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The tier table this loader schedules against
    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    /// The active configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers; dropped silently when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) fn current_generation(&self) -> u64 {
        self.queue_state.generation.load(Ordering::Acquire)
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    pub(crate) async fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        {
            let mut current = self.observable.loading_status.write().await;
            if *current == status {
                return;
            }
            current.clone_from(&status);
        }
        tracing::debug!(status = %status, "Loading status changed");
        self.emit_event(Event::StatusChanged { status });
    }

    /// Refresh the displayed audio count from the source's cache counters
    pub(crate) async fn refresh_audio_count(&self) {
        let stats = self.source.audio_cache_stats().await;
        self.observable
            .cached_audio_count
            .store(stats.count, Ordering::Relaxed);
    }

    /// Add `tier` to the completed set once its leading units are all cached
    pub(crate) async fn refresh_tier_completion(&self, tier: &str) {
        let Some(entry) = self.tiers.get(tier) else {
            return;
        };
        let head = entry.head(self.config.loader.tier_ready_depth);
        if self.cache.contains_all(head).await && self.cache.mark_tier_complete(tier).await {
            tracing::info!(tier = %tier, "Tier ready");
            self.emit_event(Event::TierCompleted {
                tier: tier.to_string(),
            });
        }
    }

    /// Insert fetched units and re-check completion for every tier they touch
    pub(crate) async fn store_units(&self, units: Vec<Unit>, task_tier: &str) {
        let mut touched: Vec<String> = vec![task_tier.to_string()];
        for unit in &units {
            let name = &self.tiers.tier_for(unit.seed).name;
            if !touched.contains(name) {
                touched.push(name.clone());
            }
        }

        self.cache.insert_units(units).await;

        for tier in &touched {
            self.refresh_tier_completion(tier).await;
        }
    }
}

impl QueueState {
    pub(crate) fn unsettled_keys(&self) -> MutexGuard<'_, HashSet<String>> {
        self.unsettled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Seed a queue was generated from; 0 before the first initialization
pub(crate) fn load_seed(state: &QueueState) -> Seed {
    state.seed.load(Ordering::Acquire)
}
