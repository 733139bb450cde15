//! Load queue generation.
//!
//! Breadth first: after the blocking window, every upcoming tier gets a
//! shallow slice before any tier is filled in depth, so a learner who jumps
//! ahead several tiers still lands on cached content.

use crate::config::LoaderConfig;
use crate::tiers::TierTable;
use crate::types::{LoadTask, Seed, SeedRange, TaskKind};

use super::ProgressiveLoader;

/// Build the priority-sorted task list for a session starting at `position`
///
/// Priorities:
/// - `0`: the blocking window `[position, position + window - 1]`, clipped to
///   the current tier (Script, then Audio)
/// - `1..=n`: the first `window` units of each of the next `n` tiers, one
///   tier per priority (Audio, then Script), with `n <= skip_protection_tiers`
/// - `skip_protection_tiers + 1`: the rest of the current tier after the
///   blocking window
/// - `skip_protection_tiers + 2 + i`: the rest of the `i`-th shallow-covered tier
///
/// The result is sorted by priority; equal priorities keep emission order.
/// A `blocking_window` of 0 is treated as 1.
pub fn build_load_queue(tiers: &TierTable, config: &LoaderConfig, position: Seed) -> Vec<LoadTask> {
    let position = tiers.clamp(position);
    let current = tiers.tier_for(position);
    let window = config.blocking_window.max(1);
    let skip_tiers = config.skip_protection_tiers as u32;

    let mut tasks = Vec::new();

    let blocking_end = position.saturating_add(window - 1).min(current.end);
    let blocking = SeedRange::new(position, blocking_end);
    tasks.push(LoadTask::new(0, TaskKind::Script, &current.name, blocking));
    tasks.push(LoadTask::new(0, TaskKind::Audio, &current.name, blocking));

    let upcoming = tiers.next_tiers(&current.name, config.skip_protection_tiers);
    for (i, tier) in upcoming.iter().enumerate() {
        let priority = i as u32 + 1;
        let head = tier.head(window);
        tasks.push(LoadTask::new(priority, TaskKind::Audio, &tier.name, head));
        tasks.push(LoadTask::new(priority, TaskKind::Script, &tier.name, head));
    }

    if blocking_end < current.end {
        let rest = SeedRange::new(blocking_end + 1, current.end);
        let priority = skip_tiers + 1;
        tasks.push(LoadTask::new(priority, TaskKind::Script, &current.name, rest));
        tasks.push(LoadTask::new(priority, TaskKind::Audio, &current.name, rest));
    }

    for (i, tier) in upcoming.iter().enumerate() {
        let head = tier.head(window);
        if head.end >= tier.end {
            continue;
        }
        let rest = SeedRange::new(head.end + 1, tier.end);
        let priority = skip_tiers + 2 + i as u32;
        tasks.push(LoadTask::new(priority, TaskKind::Script, &tier.name, rest));
        tasks.push(LoadTask::new(priority, TaskKind::Audio, &tier.name, rest));
    }

    // Vec::sort_by_key is stable
    tasks.sort_by_key(|task| task.priority);
    tasks
}

impl ProgressiveLoader {
    /// Generate the load queue for `position` using this loader's tiers and config
    ///
    /// Deterministic and side-effect free; the queue is only stored by
    /// [`initialize_from_seed`](ProgressiveLoader::initialize_from_seed).
    pub fn generate_load_queue(&self, position: Seed) -> Vec<LoadTask> {
        build_load_queue(&self.tiers, &self.config.loader, position)
    }
}
