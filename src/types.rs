//! Core types and events for course-loader

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Absolute position of a unit in the curriculum (1-based)
pub type Seed = u32;

/// One sub-item of a unit, with the audio files it plays
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitItem {
    /// Item identifier
    pub id: String,
    /// Audio file locators referenced by this item, in playback order
    #[serde(default)]
    pub audio: Vec<String>,
}

/// Spaced-review metadata attached to some units
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewMeta {
    /// Earlier seeds this unit revisits
    pub review_of: Vec<Seed>,
    /// Review interval, in units
    pub interval: u32,
}

/// A fully materialized unit of curriculum content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Absolute position of the unit; the cache is keyed by this value
    pub seed: Seed,
    /// Unit identifier
    pub id: String,
    /// Identifier of the group (lesson) the unit belongs to
    pub group_id: String,
    /// Ordered sub-items
    pub items: Vec<UnitItem>,
    /// Optional review metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewMeta>,
}

impl Unit {
    /// Iterate every audio locator referenced by the unit's items
    pub fn audio_locators(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .flat_map(|item| item.audio.iter().map(String::as_str))
    }
}

/// Collect the distinct audio locators of `units`, keeping first-seen order
pub(crate) fn unique_locators<'a>(units: impl IntoIterator<Item = &'a Unit>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut locators = Vec::new();
    for unit in units {
        for locator in unit.audio_locators() {
            if seen.insert(locator) {
                locators.push(locator.to_string());
            }
        }
    }
    locators
}

/// Inclusive range of seeds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedRange {
    /// First seed (inclusive)
    pub start: Seed,
    /// Last seed (inclusive)
    pub end: Seed,
}

impl SeedRange {
    /// Create a range; `end` is clamped up to `start` so the range is never inverted
    pub fn new(start: Seed, end: Seed) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Number of seeds in the range; 0 for an inverted range built from its fields
    pub fn len(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// Only a range built with `end < start` is empty; [`SeedRange::new`] never makes one
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Whether `seed` falls inside the range
    pub fn contains(&self, seed: Seed) -> bool {
        (self.start..=self.end).contains(&seed)
    }
}

impl fmt::Display for SeedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// What a load task fetches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Script chunk (unit payloads)
    Script,
    /// Audio files referenced by already cached units
    Audio,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Script => f.write_str("script"),
            TaskKind::Audio => f.write_str("audio"),
        }
    }
}

/// Load task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not started
    Pending,
    /// Currently fetching
    Loading,
    /// Finished (or already satisfied)
    Complete,
    /// Fetch failed; the queue moved on
    Error,
}

/// A unit of scheduled work in the loader queue
///
/// Everything except `status` is fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTask {
    /// Scheduling priority; 0 is the blocking phase, larger runs later
    pub priority: u32,
    /// Script or audio
    pub kind: TaskKind,
    /// Name of the tier the range belongs to
    pub tier: String,
    /// Seeds covered by the task
    pub range: SeedRange,
    /// Current status
    pub status: TaskStatus,
}

impl LoadTask {
    /// Create a pending task
    pub fn new(priority: u32, kind: TaskKind, tier: impl Into<String>, range: SeedRange) -> Self {
        Self {
            priority,
            kind,
            tier: tier.into(),
            range,
            status: TaskStatus::Pending,
        }
    }

    /// Ledger key identifying the work this task performs (`tier:start-end:kind`)
    pub fn dedupe_key(&self) -> String {
        format!("{}:{}:{}", self.tier, self.range, self.kind)
    }
}

/// Scope of an offline download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadOption {
    /// Rest of the current tier
    Current,
    /// Next 50 units from the current position
    Next50,
    /// Next 100 units from the current position
    Next100,
    /// The whole course
    Entire,
}

/// Phase of an offline download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPhase {
    /// Fetching script chunks
    Scripts,
    /// Fetching audio batches
    Audio,
    /// Finished
    Complete,
    /// Stopped by `cancel_download`
    Cancelled,
}

/// Progress of one offline download
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Units in the selected range
    pub total_units: u32,
    /// Units whose script chunk has been fetched
    pub completed_units: u32,
    /// Audio files referenced by the range (known once the audio phase starts)
    pub total_audio_files: usize,
    /// Audio files preloaded so far
    pub completed_audio_files: usize,
    /// Current phase
    pub phase: DownloadPhase,
    /// Overall progress (0.0 to 100.0)
    pub percent: f32,
}

impl DownloadProgress {
    pub(crate) fn new(total_units: u32) -> Self {
        Self {
            total_units,
            completed_units: 0,
            total_audio_files: 0,
            completed_audio_files: 0,
            phase: DownloadPhase::Scripts,
            percent: 0.0,
        }
    }

    /// Recompute `percent` from the counters: scripts fill 0-50, audio 50-100
    pub(crate) fn recompute_percent(&mut self) {
        self.percent = match self.phase {
            DownloadPhase::Scripts => {
                if self.total_units == 0 {
                    0.0
                } else {
                    50.0 * self.completed_units as f32 / self.total_units as f32
                }
            }
            DownloadPhase::Audio => {
                if self.total_audio_files == 0 {
                    50.0
                } else {
                    50.0 + 50.0 * self.completed_audio_files as f32
                        / self.total_audio_files as f32
                }
            }
            DownloadPhase::Complete => 100.0,
            DownloadPhase::Cancelled => self.percent,
        };
    }
}

/// Aggregate counters reported by the audio cache
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of audio files held by the cache
    pub count: u64,
}

/// Snapshot of the loader's observable state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoaderStatus {
    /// Phase 0 finished for the current session
    pub is_ready: bool,
    /// A queue drain is running
    pub is_loading: bool,
    /// Free-text description of what the loader is doing
    pub loading_status: String,
    /// Audio files the cache reports as preloaded
    pub cached_audio_count: u64,
    /// Seeds present in the ready cache
    pub cached_script_seeds: usize,
    /// Tiers whose leading units are cached
    pub completed_tiers: Vec<String>,
    /// Tasks in the current queue
    pub queue_len: usize,
}

/// Snapshot of the buffer maintainer's state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferState {
    /// Contiguous cached look-ahead, in minutes (recomputed, never accumulated)
    pub buffer_minutes: f64,
    /// Units already handed to a prefetch run
    pub prefetched_unit_ids: HashSet<String>,
    /// A prefetch run is in flight
    pub is_prefetching: bool,
    /// Last swallowed failure, if any
    pub last_error: Option<String>,
    /// Resources fetched by prefetch runs this session
    pub total_prefetched: u64,
}

/// Event emitted by the loader
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new queue was generated
    QueueGenerated {
        /// Seed the queue was built from
        seed: Seed,
        /// Number of tasks
        tasks: usize,
    },

    /// Phase 0 finished; playback can start
    Ready {
        /// Seed the session was initialized from
        seed: Seed,
    },

    /// A task finished
    TaskCompleted {
        /// The task, with its final status
        task: LoadTask,
    },

    /// A task failed and was skipped
    TaskFailed {
        /// The task, with its final status
        task: LoadTask,
        /// Error message
        error: String,
    },

    /// A tier's leading units became available
    TierCompleted {
        /// Tier name
        tier: String,
    },

    /// Free-text loading status changed
    StatusChanged {
        /// New status text
        status: String,
    },

    /// Offline download progress
    DownloadProgress {
        /// Current progress
        progress: DownloadProgress,
    },

    /// The background queue drain finished
    BackgroundComplete {
        /// Tasks that ended in error
        failed_tasks: usize,
    },
}
