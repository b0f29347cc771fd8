//! Forgetting model.
//!
//! A memory's relevance halves every *half-life* hours since it was last
//! accessed.  The base half-life is one week and is stretched by how often
//! the memory has been reinforced and by its author-assigned importance:
//!
//! ```text
//! access_boost     = min(0.1 × access_count, 0.5)
//! importance_boost = (importance / 5) × 0.3
//! half_life        = 168h × (1 + access_boost + importance_boost)
//! decay            = 0.5^(hours_since_access / half_life)
//!                    + 0.2   if created less than 24h ago
//! ```
//!
//! The result is clamped to `[0.05, 1.0]`.  Elapsed times are clamped to be
//! non-negative, so a `last_accessed` in the future counts as "just now".
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use mnemo_memory::decay::compute_decay;
//! use mnemo_types::{MemoryCategory, MemoryEntry};
//!
//! let now = Utc::now();
//! let fresh = MemoryEntry::new_at("likes tea", vec![], MemoryCategory::Preference, 3, now);
//! assert_eq!(compute_decay(&fresh, now), 1.0);
//!
//! let old = MemoryEntry::new_at("likes tea", vec![], MemoryCategory::Preference, 3, now - Duration::days(90));
//! assert!(compute_decay(&old, now) < 0.1);
//! ```

use chrono::{DateTime, Utc};
use mnemo_types::{MIN_DECAY, MemoryEntry};

/// Base half-life in hours (one week).
pub const BASE_HALF_LIFE_HOURS: f64 = 168.0;
/// Bonus added to memories created within [`FRESHNESS_WINDOW_HOURS`].
pub const FRESHNESS_BONUS: f64 = 0.2;
pub const FRESHNESS_WINDOW_HOURS: f64 = 24.0;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Every factor of one decay computation.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayBreakdown {
    pub hours_since_access: f64,
    pub hours_since_creation: f64,
    pub access_boost: f64,
    pub importance_boost: f64,
    pub half_life_hours: f64,
    pub decay_factor: f64,
    pub freshness_bonus: f64,
    /// Clamped result, identical to [`compute_decay`].
    pub value: f64,
}

fn hours_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - earlier).num_milliseconds() as f64 / MS_PER_HOUR;
    if hours.is_finite() { hours.max(0.0) } else { 0.0 }
}

/// Compute the decay multiplier with every intermediate factor exposed.
pub fn compute_breakdown(memory: &MemoryEntry, now: DateTime<Utc>) -> DecayBreakdown {
    let hours_since_access = hours_between(memory.last_accessed, now);
    let hours_since_creation = hours_between(memory.timestamp, now);

    let access_boost = (memory.access_count as f64 * 0.1).min(0.5);
    let importance_boost = (memory.importance as f64 / 5.0) * 0.3;
    let half_life_hours = BASE_HALF_LIFE_HOURS * (1.0 + access_boost + importance_boost);

    let decay_factor = 0.5f64.powf(hours_since_access / half_life_hours);
    let freshness_bonus = if hours_since_creation < FRESHNESS_WINDOW_HOURS {
        FRESHNESS_BONUS
    } else {
        0.0
    };

    let raw = decay_factor + freshness_bonus;
    let value = if raw.is_nan() { MIN_DECAY } else { raw.clamp(MIN_DECAY, 1.0) };

    DecayBreakdown {
        hours_since_access,
        hours_since_creation,
        access_boost,
        importance_boost,
        half_life_hours,
        decay_factor,
        freshness_bonus,
        value,
    }
}

/// Relevance multiplier of `memory` at time `now`, in `[0.05, 1.0]`.
///
/// Pure; the cached `memory.decay` field is ignored.
pub fn compute_decay(memory: &MemoryEntry, now: DateTime<Utc>) -> f64 {
    compute_breakdown(memory, now).value
}

/// Overwrite the cached `decay` snapshot of every memory.
pub fn refresh_decay(memories: &mut [MemoryEntry], now: DateTime<Utc>) {
    for memory in memories {
        memory.decay = compute_decay(memory, now);
    }
}
