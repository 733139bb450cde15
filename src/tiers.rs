//! Tier ("belt") table mapping positions to named progression stages
//!
//! Tiers partition `[first_position, total]` contiguously. Lookups never fail:
//! out-of-range positions are clamped to the nearest tier so stale or
//! off-by-one indices from the UI stay harmless.

use crate::error::{Error, Result};
use crate::types::{Seed, SeedRange};
use serde::{Deserialize, Serialize};

/// Belt names of the default curriculum, in order
pub const DEFAULT_TIER_NAMES: [&str; 8] = [
    "white", "yellow", "orange", "green", "blue", "purple", "brown", "black",
];

/// Start thresholds of the default curriculum (0 means "from the first unit")
pub const DEFAULT_THRESHOLDS: [Seed; 8] = [0, 8, 20, 40, 80, 150, 280, 400];

/// Total units in the default curriculum
pub const DEFAULT_TOTAL: Seed = 668;

/// One named tier with an inclusive position range
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Tier name
    pub name: String,
    /// First position (inclusive)
    pub start: Seed,
    /// Last position (inclusive)
    pub end: Seed,
}

impl Tier {
    /// Positions covered by the tier
    pub fn range(&self) -> SeedRange {
        SeedRange::new(self.start, self.end)
    }

    /// The first `depth` positions of the tier, clamped to the tier's end
    pub fn head(&self, depth: u32) -> SeedRange {
        let end = self.start.saturating_add(depth.saturating_sub(1)).min(self.end);
        SeedRange::new(self.start, end)
    }
}

/// Ordered, validated table of tiers
///
/// Deserialization goes through [`TierTable::new`], so a table read from
/// JSON is validated the same way.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTierTable")]
pub struct TierTable {
    tiers: Vec<Tier>,
}

/// Unvalidated wire form of [`TierTable`]
#[derive(Deserialize)]
struct RawTierTable {
    tiers: Vec<Tier>,
}

impl TryFrom<RawTierTable> for TierTable {
    type Error = Error;

    fn try_from(raw: RawTierTable) -> Result<Self> {
        Self::new(raw.tiers)
    }
}

impl TierTable {
    /// Build a table from explicit tiers
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the table is empty, a tier is inverted, or
    /// consecutive tiers leave a gap or overlap.
    pub fn new(tiers: Vec<Tier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(Error::config("tiers", "tier table must not be empty"));
        }

        for tier in &tiers {
            if tier.end < tier.start {
                return Err(Error::config(
                    "tiers",
                    format!(
                        "tier '{}' ends ({}) before it starts ({})",
                        tier.name, tier.end, tier.start
                    ),
                ));
            }
        }

        for pair in tiers.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.end.checked_add(1) != Some(next.start) {
                return Err(Error::config(
                    "tiers",
                    format!(
                        "tier '{}' starts at {} but '{}' ends at {}",
                        next.name, next.start, prev.name, prev.end
                    ),
                ));
            }
        }

        Ok(Self { tiers })
    }

    /// Build a table from start thresholds and a course length
    ///
    /// Each tier runs from its threshold to the position before the next
    /// threshold; the last tier ends at `total`. A threshold of 0 is treated
    /// as position 1.
    pub fn from_thresholds(names: &[&str], thresholds: &[Seed], total: Seed) -> Result<Self> {
        if names.len() != thresholds.len() {
            return Err(Error::config(
                "tiers",
                format!(
                    "{} names given for {} thresholds",
                    names.len(),
                    thresholds.len()
                ),
            ));
        }

        let mut tiers = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let start = thresholds[i].max(1);
            let end = match thresholds.get(i + 1) {
                Some(next) => next.saturating_sub(1),
                None => total,
            };
            tiers.push(Tier {
                name: (*name).to_string(),
                start,
                end,
            });
        }

        Self::new(tiers)
    }

    /// All tiers in order
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Lowest position in the table
    pub fn first_position(&self) -> Seed {
        self.tiers[0].start
    }

    /// Highest position in the table
    pub fn total(&self) -> Seed {
        self.tiers[self.tiers.len() - 1].end
    }

    /// Clamp `position` into the table's range
    pub fn clamp(&self, position: Seed) -> Seed {
        position.clamp(self.first_position(), self.total())
    }

    /// The tier containing `position`
    ///
    /// Positions below the table fall back to the first tier and positions
    /// past the end to the last one.
    pub fn tier_for(&self, position: Seed) -> &Tier {
        let position = self.clamp(position);
        let idx = self
            .tiers
            .partition_point(|tier| tier.end < position)
            .min(self.tiers.len() - 1);
        &self.tiers[idx]
    }

    /// Look up a tier by name
    pub fn get(&self, name: &str) -> Option<&Tier> {
        self.tiers.iter().find(|tier| tier.name == name)
    }

    /// Up to `count` tiers strictly after `current`, in table order
    ///
    /// An unknown tier name yields no tiers.
    pub fn next_tiers(&self, current: &str, count: usize) -> Vec<&Tier> {
        match self.tiers.iter().position(|tier| tier.name == current) {
            Some(idx) => self.tiers[idx + 1..].iter().take(count).collect(),
            None => Vec::new(),
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        let tiers = DEFAULT_TIER_NAMES
            .iter()
            .zip(DEFAULT_THRESHOLDS.iter().enumerate())
            .map(|(name, (i, &threshold))| Tier {
                name: (*name).to_string(),
                start: threshold.max(1),
                end: DEFAULT_THRESHOLDS
                    .get(i + 1)
                    .map_or(DEFAULT_TOTAL, |next| next - 1),
            })
            .collect();
        Self { tiers }
    }
}
