//! Association graph.
//!
//! Memories are joined by weighted, undirected [`AssociativeLink`]s built
//! from lexical overlap when a memory is added.  At recall time the best
//! direct hits seed a bounded spreading-activation pass that surfaces
//! indirectly related memories.
//!
//! ## Link construction
//!
//! ```text
//! jaccard  = |tokens(a) ∩ tokens(b)| / |tokens(a) ∪ tokens(b)|      (skip < 0.1)
//! strength = min(1, jaccard + 0.15 × shared keywords)              (keep > 0.15)
//! type     = temporal  if created < 5 min apart
//!            topical   if same category
//!            semantic  otherwise
//! ```
//!
//! ## Spreading activation
//!
//! Seeds start at activation `1.0`.  Each hop multiplies by
//! `link.strength × decay_rate`; signals under `0.05` are dropped.  A node
//! keeps the strongest activation that reached it.  The pass stops after
//! `depth` hops regardless of graph size.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use mnemo_memory::association::spread_activation;
//! use mnemo_types::{AssociativeLink, LinkType, MemoryId};
//!
//! let (a, b) = (MemoryId::new(), MemoryId::new());
//! let link = AssociativeLink {
//!     source_id: a.clone(),
//!     target_id: b.clone(),
//!     strength: 0.6,
//!     link_type: LinkType::Topical,
//!     created_at: Utc::now(),
//!     reinforcements: 0,
//! };
//!
//! let nodes = spread_activation(&[a], &[link], 2, 0.5);
//! assert_eq!(nodes[0].node_id, b);
//! assert!((nodes[0].activation_level - 0.3).abs() < 1e-12);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use mnemo_types::{ActivationNode, AssociativeLink, LinkType, MatchType, MemoryEntry, MemoryId, RetrievalResult};
use tracing::debug;

use crate::lexical::{document_text, jaccard_similarity, token_set};

/// Pairs with less token overlap than this are never linked.
pub const MIN_JACCARD: f64 = 0.1;
/// Strength added per keyword the two memories share.
pub const KEYWORD_OVERLAP_WEIGHT: f64 = 0.15;
/// Only links strictly stronger than this are created.
pub const MIN_NEW_LINK_STRENGTH: f64 = 0.15;
/// Most links created for one new memory.
pub const MAX_NEW_LINKS: usize = 8;
/// Memories created closer together than this are linked as temporal.
pub const TEMPORAL_WINDOW_MINUTES: i64 = 5;

/// Propagated signals weaker than this are discarded.
pub const ACTIVATION_FLOOR: f64 = 0.05;
pub const DEFAULT_SPREAD_DEPTH: usize = 2;
pub const DEFAULT_SPREAD_DECAY: f64 = 0.5;

/// Number of direct results used as activation seeds.
pub const ASSOCIATIVE_SEEDS: usize = 3;
/// Activation → score factor for associative results.
pub const ASSOCIATIVE_SCORE_WEIGHT: f64 = 0.6;
pub const MAX_ASSOCIATIVE_RESULTS: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Link construction
// ─────────────────────────────────────────────────────────────────────────────

fn shared_keywords(a: &MemoryEntry, b: &MemoryEntry) -> usize {
    let theirs: HashSet<String> = b.keywords.iter().map(|k| k.trim().to_ascii_lowercase()).collect();
    let mine: BTreeSet<String> = a
        .keywords
        .iter()
        .map(|k| k.trim().to_ascii_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    mine.iter().filter(|k| theirs.contains(*k)).count()
}

fn classify(a: &MemoryEntry, b: &MemoryEntry) -> LinkType {
    let gap = (a.timestamp - b.timestamp).abs();
    if gap < Duration::minutes(TEMPORAL_WINDOW_MINUTES) {
        LinkType::Temporal
    } else if a.category == b.category {
        LinkType::Topical
    } else {
        LinkType::Semantic
    }
}

/// Build links from `new_memory` to every sufficiently similar memory in
/// `existing` that it is not already linked to (in either direction).
///
/// Returns at most [`MAX_NEW_LINKS`] links, strongest first; equal
/// strengths keep the order of `existing`.
///
/// Compares against every existing memory, so cost is linear per insert and
/// quadratic over the life of the bank.
pub fn build_associative_links(
    new_memory: &MemoryEntry,
    existing: &[MemoryEntry],
    existing_links: &[AssociativeLink],
    now: DateTime<Utc>,
) -> Vec<AssociativeLink> {
    let linked: HashSet<&MemoryId> = existing_links
        .iter()
        .filter_map(|l| l.other_end(&new_memory.id))
        .collect();
    let new_tokens = token_set(&document_text(new_memory));

    let mut links: Vec<AssociativeLink> = existing
        .iter()
        .filter(|m| m.id != new_memory.id && !linked.contains(&m.id))
        .filter_map(|m| {
            let jaccard = jaccard_similarity(&new_tokens, &token_set(&document_text(m)));
            if jaccard < MIN_JACCARD {
                return None;
            }
            let strength =
                (jaccard + KEYWORD_OVERLAP_WEIGHT * shared_keywords(new_memory, m) as f64).min(1.0);
            (strength > MIN_NEW_LINK_STRENGTH).then(|| AssociativeLink {
                source_id: new_memory.id.clone(),
                target_id: m.id.clone(),
                strength,
                link_type: classify(new_memory, m),
                created_at: now,
                reinforcements: 0,
            })
        })
        .collect();

    links.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    links.truncate(MAX_NEW_LINKS);
    debug!(memory = %new_memory.id, created = links.len(), "associative links built");
    links
}

/// Append `new_links` to `links`, skipping any whose unordered pair is
/// already present.  Returns the number of links added.
pub fn merge_links(links: &mut Vec<AssociativeLink>, new_links: Vec<AssociativeLink>) -> usize {
    let mut added = 0;
    for link in new_links {
        if link.source_id == link.target_id {
            continue;
        }
        if links.iter().any(|l| l.connects(&link.source_id, &link.target_id)) {
            continue;
        }
        links.push(link);
        added += 1;
    }
    added
}

// ─────────────────────────────────────────────────────────────────────────────
// Pruning
// ─────────────────────────────────────────────────────────────────────────────

/// Remove every link weaker than `min_strength`.
///
/// Returns the number of links removed.
pub fn prune_weak_links(links: &mut Vec<AssociativeLink>, min_strength: f64) -> usize {
    let before = links.len();
    links.retain(|l| l.strength >= min_strength);
    before - links.len()
}

/// Remove links with an endpoint missing from `memories`.
///
/// Returns the number of links removed.
pub fn drop_dangling_links(links: &mut Vec<AssociativeLink>, memories: &[MemoryEntry]) -> usize {
    let ids: HashSet<&MemoryId> = memories.iter().map(|m| &m.id).collect();
    let before = links.len();
    links.retain(|l| ids.contains(&l.source_id) && ids.contains(&l.target_id));
    before - links.len()
}

// ─────────────────────────────────────────────────────────────────────────────
// Spreading activation
// ─────────────────────────────────────────────────────────────────────────────

/// Propagate activation from `seeds` across `links` for up to `depth` hops.
///
/// Links are traversed from either endpoint.  Returns every node reached at
/// depth ≥ 1, sorted by activation (highest first).  Seeds are not returned.
pub fn spread_activation(
    seeds: &[MemoryId],
    links: &[AssociativeLink],
    depth: usize,
    decay_rate: f64,
) -> Vec<ActivationNode> {
    let mut nodes: Vec<ActivationNode> = Vec::new();
    let mut index: HashMap<MemoryId, usize> = HashMap::new();

    for seed in seeds {
        if index.contains_key(seed) {
            continue;
        }
        index.insert(seed.clone(), nodes.len());
        nodes.push(ActivationNode {
            node_id: seed.clone(),
            activation_level: 1.0,
            depth: 0,
            path: vec![seed.clone()],
        });
    }

    for d in 0..depth {
        let frontier: Vec<ActivationNode> = nodes.iter().filter(|n| n.depth == d).cloned().collect();
        if frontier.is_empty() {
            break;
        }
        for node in &frontier {
            for link in links.iter().filter(|l| l.touches(&node.node_id)) {
                let Some(neighbor) = link.other_end(&node.node_id) else {
                    continue;
                };
                if neighbor == &node.node_id {
                    continue;
                }
                let propagated = node.activation_level * link.strength * decay_rate;
                if !propagated.is_finite() || propagated < ACTIVATION_FLOOR {
                    continue;
                }
                let mut path = node.path.clone();
                path.push(neighbor.clone());
                match index.get(neighbor) {
                    None => {
                        index.insert(neighbor.clone(), nodes.len());
                        nodes.push(ActivationNode {
                            node_id: neighbor.clone(),
                            activation_level: propagated,
                            depth: d + 1,
                            path,
                        });
                    }
                    Some(&i) if nodes[i].activation_level < propagated => {
                        nodes[i] = ActivationNode {
                            node_id: neighbor.clone(),
                            activation_level: propagated,
                            depth: d + 1,
                            path,
                        };
                    }
                    Some(_) => {}
                }
            }
        }
    }

    let mut reached: Vec<ActivationNode> = nodes.into_iter().filter(|n| n.depth > 0).collect();
    reached.sort_by(|a, b| b.activation_level.total_cmp(&a.activation_level));
    reached
}

/// Surface memories associated with the top direct results.
///
/// The first [`ASSOCIATIVE_SEEDS`] entries of `direct_results` seed a
/// two-hop activation pass.  Nodes already among the direct results, and
/// link endpoints no longer present in `memories`, are skipped.  Each
/// returned result scores `activation × 0.6`; at most
/// [`MAX_ASSOCIATIVE_RESULTS`] are returned.
pub fn get_associative_memories(
    memories: &[MemoryEntry],
    links: &[AssociativeLink],
    direct_results: &[RetrievalResult],
) -> Vec<RetrievalResult> {
    if links.is_empty() || direct_results.is_empty() {
        return Vec::new();
    }

    let seeds: Vec<MemoryId> = direct_results
        .iter()
        .take(ASSOCIATIVE_SEEDS)
        .map(|r| r.memory.id.clone())
        .collect();
    let direct: HashSet<&MemoryId> = direct_results.iter().map(|r| &r.memory.id).collect();
    let by_id: HashMap<&MemoryId, &MemoryEntry> = memories.iter().map(|m| (&m.id, m)).collect();

    let results: Vec<RetrievalResult> =
        spread_activation(&seeds, links, DEFAULT_SPREAD_DEPTH, DEFAULT_SPREAD_DECAY)
            .into_iter()
            .filter(|n| !direct.contains(&n.node_id))
            .filter_map(|n| {
                by_id.get(&n.node_id).map(|m| RetrievalResult {
                    memory: (*m).clone(),
                    score: n.activation_level * ASSOCIATIVE_SCORE_WEIGHT,
                    match_type: MatchType::Associative,
                })
            })
            .take(MAX_ASSOCIATIVE_RESULTS)
            .collect();

    debug!(seeds = seeds.len(), returned = results.len(), "associative recall complete");
    results
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_types::MemoryCategory;

    fn entry_at(content: &str, keywords: &[&str], category: MemoryCategory, at: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry::new_at(
            content,
            keywords.iter().map(|k| k.to_string()).collect(),
            category,
            3,
            at,
        )
    }

    fn link(a: &MemoryId, b: &MemoryId, strength: f64) -> AssociativeLink {
        AssociativeLink {
            source_id: a.clone(),
            target_id: b.clone(),
            strength,
            link_type: LinkType::Semantic,
            created_at: Utc::now(),
            reinforcements: 0,
        }
    }

    fn result(memory: &MemoryEntry) -> RetrievalResult {
        RetrievalResult {
            memory: memory.clone(),
            score: 1.0,
            match_type: MatchType::Semantic,
        }
    }

    // ── build_associative_links ──────────────────────────────────────────────

    #[test]
    fn links_similar_memories() {
        let now = Utc::now();
        let old = now - Duration::days(2);
        let existing = vec![
            entry_at("hiking in the alps", &[], MemoryCategory::Preference, old),
            entry_at("software engineering job", &[], MemoryCategory::Fact, old),
        ];
        let new = entry_at("hiking trip to the alps", &[], MemoryCategory::Preference, now);
        let links = build_associative_links(&new, &existing, &[], now);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source_id, new.id);
        assert_eq!(links[0].target_id, existing[0].id);
        assert_eq!(links[0].link_type, LinkType::Topical);
        // {hiking, the, alps} ∩ {hiking, trip, the, alps} = 3 / 4
        assert!((links[0].strength - 0.75).abs() < 1e-12);
    }

    #[test]
    fn link_type_classification() {
        let now = Utc::now();
        let recent = entry_at("hiking in the alps", &[], MemoryCategory::Fact, now - Duration::minutes(2));
        let other_cat = entry_at("hiking in the alps", &[], MemoryCategory::Goal, now - Duration::hours(3));
        let new = entry_at("hiking in the alps", &[], MemoryCategory::Preference, now);
        let links = build_associative_links(&new, &[recent.clone(), other_cat.clone()], &[], now);
        let type_of = |id: &MemoryId| links.iter().find(|l| &l.target_id == id).unwrap().link_type;
        assert_eq!(type_of(&recent.id), LinkType::Temporal);
        assert_eq!(type_of(&other_cat.id), LinkType::Semantic);
    }

    #[test]
    fn shared_keywords_strengthen_links() {
        let now = Utc::now();
        let old = now - Duration::days(1);
        let existing = vec![entry_at("likes mountain trails", &["Hiking", "outdoors"], MemoryCategory::Fact, old)];
        let new = entry_at("bought new trail shoes", &["hiking", "outdoors"], MemoryCategory::Fact, now);
        let links = build_associative_links(&new, &existing, &[], now);
        assert_eq!(links.len(), 1);
        // Token sets overlap on "hiking" and "outdoors" (from keywords).
        let jaccard = jaccard_similarity(
            &token_set(&document_text(&new)),
            &token_set(&document_text(&existing[0])),
        );
        assert!((links[0].strength - (jaccard + 0.3).min(1.0)).abs() < 1e-12);
    }

    #[test]
    fn already_linked_pairs_are_skipped_in_either_direction() {
        let now = Utc::now();
        let existing = vec![entry_at("hiking in the alps", &[], MemoryCategory::Fact, now)];
        let new = entry_at("hiking in the alps", &[], MemoryCategory::Fact, now);
        let reverse = link(&existing[0].id, &new.id, 0.9);
        assert!(build_associative_links(&new, &existing, &[reverse], now).is_empty());
    }

    #[test]
    fn dissimilar_memories_are_not_linked() {
        let now = Utc::now();
        let existing = vec![entry_at("software engineering job", &[], MemoryCategory::Fact, now)];
        let new = entry_at("hiking in the alps", &[], MemoryCategory::Fact, now);
        assert!(build_associative_links(&new, &existing, &[], now).is_empty());
    }

    #[test]
    fn at_most_eight_links_strongest_first() {
        let now = Utc::now();
        let existing: Vec<MemoryEntry> = (0..12)
            .map(|i| {
                let extra: String = (0..i).map(|j| format!(" filler{j}")).collect();
                entry_at(&format!("green tea ritual{extra}"), &[], MemoryCategory::Fact, now)
            })
            .collect();
        let new = entry_at("green tea ritual", &[], MemoryCategory::Fact, now);
        let links = build_associative_links(&new, &existing, &[], now);
        assert_eq!(links.len(), MAX_NEW_LINKS);
        assert!(links.windows(2).all(|w| w[0].strength >= w[1].strength));
        assert_eq!(links[0].target_id, existing[0].id);
    }

    #[test]
    fn merge_links_preserves_unordered_uniqueness() {
        let (a, b, c) = (MemoryId::new(), MemoryId::new(), MemoryId::new());
        let mut links = vec![link(&a, &b, 0.5)];
        let added = merge_links(&mut links, vec![link(&b, &a, 0.7), link(&a, &c, 0.4), link(&c, &c, 0.9)]);
        assert_eq!(added, 1);
        assert_eq!(links.len(), 2);
    }

    // ── pruning ──────────────────────────────────────────────────────────────

    #[test]
    fn prune_removes_weak_links() {
        let (a, b, c) = (MemoryId::new(), MemoryId::new(), MemoryId::new());
        let mut links = vec![link(&a, &b, 0.1), link(&b, &c, 0.5), link(&a, &c, 0.2)];
        assert_eq!(prune_weak_links(&mut links, 0.2), 1);
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.strength >= 0.2));
    }

    #[test]
    fn dangling_links_are_dropped() {
        let now = Utc::now();
        let kept = entry_at("a note", &[], MemoryCategory::Fact, now);
        let other = entry_at("b note", &[], MemoryCategory::Fact, now);
        let mut links = vec![link(&kept.id, &other.id, 0.5), link(&kept.id, &MemoryId::new(), 0.5)];
        assert_eq!(drop_dangling_links(&mut links, &[kept, other]), 1);
        assert_eq!(links.len(), 1);
    }

    // ── spread_activation ────────────────────────────────────────────────────

    #[test]
    fn single_hop_propagation() {
        let (a, b) = (MemoryId::new(), MemoryId::new());
        let nodes = spread_activation(&[a.clone()], &[link(&a, &b, 0.6)], 2, 0.5);
        assert_eq!(nodes.len(), 1);
        assert!((nodes[0].activation_level - 0.3).abs() < 1e-12);
        assert_eq!(nodes[0].depth, 1);
        assert_eq!(nodes[0].path, vec![a, b]);
    }

    #[test]
    fn links_are_traversed_from_target_end() {
        let (a, b) = (MemoryId::new(), MemoryId::new());
        let nodes = spread_activation(&[b.clone()], &[link(&a, &b, 0.6)], 1, 0.5);
        assert_eq!(nodes[0].node_id, a);
    }

    #[test]
    fn weak_signals_are_discarded() {
        let (a, b) = (MemoryId::new(), MemoryId::new());
        // 1.0 × 0.09 × 0.5 = 0.045 < 0.05
        assert!(spread_activation(&[a.clone()], &[link(&a, &b, 0.09)], 2, 0.5).is_empty());
    }

    #[test]
    fn two_hop_chain_respects_depth() {
        let (a, b, c, d) = (MemoryId::new(), MemoryId::new(), MemoryId::new(), MemoryId::new());
        let links = vec![link(&a, &b, 1.0), link(&b, &c, 1.0), link(&c, &d, 1.0)];
        let nodes = spread_activation(&[a.clone()], &links, 2, 0.5);
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.node_id != d));
        let c_node = nodes.iter().find(|n| n.node_id == c).unwrap();
        assert_eq!(c_node.depth, 2);
        assert!((c_node.activation_level - 0.25).abs() < 1e-12);
        assert_eq!(c_node.path, vec![a, b, c]);
    }

    #[test]
    fn activation_bounded_by_decay_per_hop() {
        let ids: Vec<MemoryId> = (0..8).map(|_| MemoryId::new()).collect();
        let mut links = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                links.push(link(&ids[i], &ids[j], 1.0 - (i + j) as f64 * 0.03));
            }
        }
        for depth in 1..4 {
            let rate = 0.7;
            let nodes = spread_activation(&ids[..1], &links, depth, rate);
            for n in &nodes {
                assert!(n.depth >= 1 && n.depth <= depth);
                assert!(n.activation_level <= rate.powi(n.depth as i32) + 1e-12);
                assert!(n.activation_level >= ACTIVATION_FLOOR);
                assert_eq!(n.path.len(), n.depth + 1);
            }
        }
    }

    #[test]
    fn stronger_path_replaces_weaker_activation() {
        let (a, b, c) = (MemoryId::new(), MemoryId::new(), MemoryId::new());
        // Direct a–c is weak (0.1 × 0.5 = 0.05 ≥ floor); a–b–c via strong
        // links gives 0.25, which replaces it at depth 2.
        let links = vec![link(&a, &c, 0.1), link(&a, &b, 1.0), link(&b, &c, 1.0)];
        let nodes = spread_activation(&[a.clone()], &links, 2, 0.5);
        let c_node = nodes.iter().find(|n| n.node_id == c).unwrap();
        assert!((c_node.activation_level - 0.25).abs() < 1e-12);
        assert_eq!(c_node.depth, 2);
    }

    #[test]
    fn seeds_are_not_returned() {
        let (a, b) = (MemoryId::new(), MemoryId::new());
        let nodes = spread_activation(&[a.clone(), b.clone()], &[link(&a, &b, 1.0)], 2, 0.5);
        assert!(nodes.is_empty());
    }

    #[test]
    fn zero_depth_returns_nothing() {
        let (a, b) = (MemoryId::new(), MemoryId::new());
        assert!(spread_activation(&[a.clone()], &[link(&a, &b, 1.0)], 0, 0.5).is_empty());
    }

    // ── get_associative_memories ─────────────────────────────────────────────

    #[test]
    fn associative_results_exclude_direct_hits_and_dangling_ids() {
        let now = Utc::now();
        let seed = entry_at("seed", &[], MemoryCategory::Fact, now);
        let direct2 = entry_at("direct", &[], MemoryCategory::Fact, now);
        let neighbor = entry_at("neighbor", &[], MemoryCategory::Goal, now);
        let ghost = MemoryId::new();
        let memories = vec![seed.clone(), direct2.clone(), neighbor.clone()];
        let links = vec![
            link(&seed.id, &direct2.id, 1.0),
            link(&seed.id, &neighbor.id, 0.8),
            link(&seed.id, &ghost, 1.0),
        ];

        let assoc = get_associative_memories(&memories, &links, &[result(&seed), result(&direct2)]);
        assert_eq!(assoc.len(), 1);
        assert_eq!(assoc[0].memory.id, neighbor.id);
        assert_eq!(assoc[0].match_type, MatchType::Associative);
        // 1.0 × 0.8 × 0.5 × 0.6
        assert!((assoc[0].score - 0.24).abs() < 1e-12);
    }

    #[test]
    fn associative_results_capped_at_four() {
        let now = Utc::now();
        let seed = entry_at("seed", &[], MemoryCategory::Fact, now);
        let mut memories = vec![seed.clone()];
        let mut links = Vec::new();
        for i in 0..7 {
            let m = entry_at(&format!("n{i}"), &[], MemoryCategory::Fact, now);
            links.push(link(&seed.id, &m.id, 0.9 - i as f64 * 0.05));
            memories.push(m);
        }
        let assoc = get_associative_memories(&memories, &links, &[result(&seed)]);
        assert_eq!(assoc.len(), MAX_ASSOCIATIVE_RESULTS);
        assert!(assoc.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn no_links_yields_nothing() {
        let seed = entry_at("seed", &[], MemoryCategory::Fact, Utc::now());
        assert!(get_associative_memories(&[seed.clone()], &[], &[result(&seed)]).is_empty());
    }
}
