//! Consolidation, deduplication, reinforcement and priming.
//!
//! # Destructive operations
//!
//! [`deduplicate_memories`] and [`consolidate_memories`] **drop** entries.
//! Nothing is archived: once the caller saves the returned collection the
//! removed memories are gone.  Use [`consolidate_with_evictions`] to receive
//! the evicted entries and route them to an archive sink instead.
//!
//! # Scaling
//!
//! Deduplication compares every pair of memories against one corpus-wide
//! TF-IDF index, O(n²) in the number of memories.  That is fine for a
//! personal memory bank in the low thousands; larger corpora should bucket
//! candidates first (inverted index or LSH) and keep the same `0.85`
//! threshold.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use mnemo_types::{MemoryCategory, MemoryEntry, MemoryId};
use tracing::{debug, info};

use crate::decay::compute_decay;
use crate::lexical::TfIdfIndex;

/// Cosine similarity above which two memories count as duplicates.
pub const DUPLICATE_THRESHOLD: f64 = 0.85;
/// Most memories kept per category by [`consolidate_memories`].
pub const CATEGORY_CAPACITY: usize = 10;
/// Default activation added to each primed memory.
pub const DEFAULT_PRIME_BOOST: f64 = 0.3;
/// Multiplier applied to the activation of every unprimed memory.
pub const ACTIVATION_COOLDOWN: f64 = 0.9;

// ─────────────────────────────────────────────────────────────────────────────
// Deduplication
// ─────────────────────────────────────────────────────────────────────────────

/// Remove near-duplicate memories.
///
/// For each pair whose TF-IDF cosine similarity exceeds
/// [`DUPLICATE_THRESHOLD`], the lower-importance entry is dropped; on equal
/// importance the earlier entry is kept.  Survivors keep their input order.
pub fn deduplicate_memories(memories: &[MemoryEntry]) -> Vec<MemoryEntry> {
    let index = TfIdfIndex::build(memories);
    let mut removed = vec![false; memories.len()];

    for i in 0..memories.len() {
        if removed[i] {
            continue;
        }
        for j in (i + 1)..memories.len() {
            if removed[j] || index.similarity(i, j) <= DUPLICATE_THRESHOLD {
                continue;
            }
            if memories[j].importance > memories[i].importance {
                removed[i] = true;
                break;
            }
            removed[j] = true;
        }
    }

    let kept: Vec<MemoryEntry> = memories
        .iter()
        .zip(&removed)
        .filter(|(_, gone)| !**gone)
        .map(|(m, _)| m.clone())
        .collect();
    debug!(before = memories.len(), after = kept.len(), "deduplication complete");
    kept
}

// ─────────────────────────────────────────────────────────────────────────────
// Consolidation
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a consolidation pass.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationOutcome {
    /// Surviving memories, in input order.
    pub kept: Vec<MemoryEntry>,
    /// Memories evicted from over-capacity categories, in input order.
    pub evicted: Vec<MemoryEntry>,
}

/// Retention rank used to pick survivors in an over-full category.
pub fn retention_score(memory: &MemoryEntry, now: DateTime<Utc>) -> f64 {
    memory.importance as f64 * 0.4 + compute_decay(memory, now) * 0.3 + memory.access_count as f64 * 0.1
}

/// Cap every category at [`CATEGORY_CAPACITY`] memories, returning the
/// evicted entries alongside the survivors.
///
/// Categories at or under capacity pass through untouched.  Larger ones keep
/// their top entries by [`retention_score`] (ties keep input order).
pub fn consolidate_with_evictions(memories: &[MemoryEntry], now: DateTime<Utc>) -> ConsolidationOutcome {
    let mut by_category: HashMap<&MemoryCategory, Vec<usize>> = HashMap::new();
    for (i, m) in memories.iter().enumerate() {
        by_category.entry(&m.category).or_default().push(i);
    }

    let mut evict: HashSet<usize> = HashSet::new();
    for (category, mut members) in by_category {
        if members.len() <= CATEGORY_CAPACITY {
            continue;
        }
        let scores: HashMap<usize, f64> = members
            .iter()
            .map(|&i| (i, retention_score(&memories[i], now)))
            .collect();
        members.sort_by(|a, b| scores[b].total_cmp(&scores[a]));
        debug!(%category, size = members.len(), evicting = members.len() - CATEGORY_CAPACITY, "category over capacity");
        evict.extend(members.into_iter().skip(CATEGORY_CAPACITY));
    }

    let mut outcome = ConsolidationOutcome::default();
    for (i, m) in memories.iter().enumerate() {
        if evict.contains(&i) {
            outcome.evicted.push(m.clone());
        } else {
            outcome.kept.push(m.clone());
        }
    }
    if !outcome.evicted.is_empty() {
        info!(kept = outcome.kept.len(), evicted = outcome.evicted.len(), "memories consolidated");
    }
    outcome
}

/// Cap every category at [`CATEGORY_CAPACITY`] memories.
///
/// **Destructive**: evicted memories are discarded, not archived.
pub fn consolidate_memories(memories: &[MemoryEntry], now: DateTime<Utc>) -> Vec<MemoryEntry> {
    consolidate_with_evictions(memories, now).kept
}

// ─────────────────────────────────────────────────────────────────────────────
// Reinforcement & priming
// ─────────────────────────────────────────────────────────────────────────────

/// Return `memory` as it looks after being retrieved at `now`.
///
/// Increments the access count, stamps `last_accessed`, and nudges the cached
/// decay (+0.1) and activation (+0.2), both capped at 1.0.
pub fn reinforce_memory(memory: &MemoryEntry, now: DateTime<Utc>) -> MemoryEntry {
    let mut reinforced = memory.clone();
    reinforced.access_count = reinforced.access_count.saturating_add(1);
    reinforced.last_accessed = now;
    reinforced.decay = (reinforced.decay + 0.1).min(1.0);
    reinforced.activation_level = (reinforced.activation_level + 0.2).clamp(0.0, 1.0);
    reinforced
}

/// Boost the activation of `primed_ids` by `boost` (capped at 1.0) and cool
/// every other memory by [`ACTIVATION_COOLDOWN`].
pub fn prime_memories(memories: &mut [MemoryEntry], primed_ids: &[MemoryId], boost: f64) {
    let primed: HashSet<&MemoryId> = primed_ids.iter().collect();
    for memory in memories.iter_mut() {
        memory.activation_level = if primed.contains(&memory.id) {
            (memory.activation_level + boost).clamp(0.0, 1.0)
        } else {
            (memory.activation_level * ACTIVATION_COOLDOWN).clamp(0.0, 1.0)
        };
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
