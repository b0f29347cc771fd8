//! Retrieval engine.
//!
//! Ranks memories against a free-text query by summing five signals:
//!
//! | term               | source                                                     |
//! |--------------------|------------------------------------------------------------|
//! | `tfidf`            | cosine(query, content + keywords + category)               |
//! | `keyword_bonus`    | `min(0.4, 0.15 × matching (query term, keyword) pairs)`   |
//! | `recency`          | `decay(memory, now) × recency_bias`                        |
//! | `importance`       | `(importance / 5) × importance_bias`                       |
//! | `activation`       | `activation_level × 0.15`                                  |
//!
//! Candidates are then picked greedily in score order.  The second and later
//! picks from an already represented category lose `diversity_penalty` and
//! are only kept if they still clear `min_score`.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use mnemo_memory::retrieval::{search, SearchOptions};
//! use mnemo_types::{MemoryCategory, MemoryEntry};
//!
//! let memories = vec![
//!     MemoryEntry::new("I love hiking", vec![], MemoryCategory::Preference, 5),
//!     MemoryEntry::new("I work as an engineer", vec![], MemoryCategory::Fact, 3),
//! ];
//! let results = search(&memories, "What do I like to do outdoors?", &SearchOptions::default(), Utc::now());
//! assert_eq!(results[0].memory.content, "I love hiking");
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use mnemo_types::{MatchType, MemoryCategory, MemoryEntry, RetrievalResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decay::compute_decay;
use crate::lexical::{IdfTable, TermVector, build_idf, cosine_similarity, document_text, tfidf_vector, tokenize};

/// Weight of `activation_level` in the total score.
pub const ACTIVATION_WEIGHT: f64 = 0.15;
/// Score added per (query term, keyword) pair that match.
pub const KEYWORD_MATCH_WEIGHT: f64 = 0.15;
/// Ceiling of the keyword bonus.
pub const MAX_KEYWORD_BONUS: f64 = 0.4;

// ─────────────────────────────────────────────────────────────────────────────
// SearchOptions
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for [`search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub max_results: usize,
    pub min_score: f64,
    /// Restrict candidates to a single category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_filter: Option<MemoryCategory>,
    pub recency_bias: f64,
    pub importance_bias: f64,
    pub diversity_penalty: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 8,
            min_score: 0.05,
            category_filter: None,
            recency_bias: 0.15,
            importance_bias: 0.2,
            diversity_penalty: 0.1,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ScoreBreakdown
// ─────────────────────────────────────────────────────────────────────────────

/// The individual terms of one candidate's score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub tfidf: f64,
    pub keyword_bonus: f64,
    pub recency: f64,
    pub importance: f64,
    pub activation: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.tfidf + self.keyword_bonus + self.recency + self.importance + self.activation
    }

    /// Which signal dominated this match.
    pub fn match_type(&self) -> MatchType {
        if self.activation > self.tfidf && self.activation > self.keyword_bonus {
            MatchType::Primed
        } else if self.tfidf > self.keyword_bonus {
            MatchType::Semantic
        } else {
            MatchType::Keyword
        }
    }
}

/// Query prepared once and scored against many memories.
struct PreparedQuery {
    terms: Vec<String>,
    vector: TermVector,
    idf: IdfTable,
}

impl PreparedQuery {
    fn new(query: &str, corpus: &[MemoryEntry]) -> Self {
        let idf = build_idf(corpus);
        Self {
            terms: tokenize(query),
            vector: tfidf_vector(query, &idf),
            idf,
        }
    }

    fn score(&self, memory: &MemoryEntry, options: &SearchOptions, now: DateTime<Utc>) -> ScoreBreakdown {
        let text = format!("{} {}", document_text(memory), memory.category);
        let tfidf = cosine_similarity(&self.vector, &tfidf_vector(&text, &self.idf));

        let keyword_bonus =
            (KEYWORD_MATCH_WEIGHT * keyword_matches(&self.terms, &memory.keywords) as f64).min(MAX_KEYWORD_BONUS);

        ScoreBreakdown {
            tfidf,
            keyword_bonus,
            recency: compute_decay(memory, now) * options.recency_bias,
            importance: (memory.importance as f64 / 5.0) * options.importance_bias,
            activation: memory.activation_level.clamp(0.0, 1.0) * ACTIVATION_WEIGHT,
        }
    }
}

/// Number of (query term, keyword) pairs where one contains the other.
///
/// A term matching two keywords counts twice.
fn keyword_matches(terms: &[String], keywords: &[String]) -> usize {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_ascii_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    terms
        .iter()
        .map(|term| {
            keywords
                .iter()
                .filter(|kw| kw.contains(term.as_str()) || term.contains(kw.as_str()))
                .count()
        })
        .sum()
}

/// Score every memory against `query` without selection or filtering.
///
/// Returned in input order; useful for explaining a ranking.
pub fn score_breakdowns(
    memories: &[MemoryEntry],
    query: &str,
    options: &SearchOptions,
    now: DateTime<Utc>,
) -> Vec<ScoreBreakdown> {
    let prepared = PreparedQuery::new(query, memories);
    memories.iter().map(|m| prepared.score(m, options, now)).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// search
// ─────────────────────────────────────────────────────────────────────────────

/// Rank `memories` against `query` at time `now`.
///
/// Returns at most `options.max_results` results in descending order of
/// their (possibly diversity-penalised) score.  Empty input, or an empty
/// category-filtered set, yields an empty list.
pub fn search(
    memories: &[MemoryEntry],
    query: &str,
    options: &SearchOptions,
    now: DateTime<Utc>,
) -> Vec<RetrievalResult> {
    if memories.is_empty() || options.max_results == 0 {
        return Vec::new();
    }

    let candidates: Vec<MemoryEntry> = match &options.category_filter {
        Some(category) => memories.iter().filter(|m| &m.category == category).cloned().collect(),
        None => memories.to_vec(),
    };
    if candidates.is_empty() {
        return Vec::new();
    }

    let prepared = PreparedQuery::new(query, &candidates);
    let mut scored: Vec<(usize, ScoreBreakdown, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let breakdown = prepared.score(m, options, now);
            (i, breakdown, breakdown.total())
        })
        .collect();
    scored.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut seen: HashSet<&MemoryCategory> = HashSet::new();
    let mut results: Vec<RetrievalResult> = Vec::with_capacity(options.max_results);
    for (i, breakdown, total) in &scored {
        if results.len() >= options.max_results {
            break;
        }
        let memory = &candidates[*i];
        let score = if seen.contains(&memory.category) {
            total - options.diversity_penalty
        } else {
            *total
        };
        if score >= options.min_score {
            seen.insert(&memory.category);
            results.push(RetrievalResult {
                memory: memory.clone(),
                score,
                match_type: breakdown.match_type(),
            });
        }
    }
    results.sort_by(|a, b| b.score.total_cmp(&a.score));

    debug!(
        candidates = candidates.len(),
        query_terms = prepared.terms.len(),
        returned = results.len(),
        "search complete"
    );
    results
}

/// [`search`] evaluated at the current wall-clock time.
pub fn search_now(memories: &[MemoryEntry], query: &str, options: &SearchOptions) -> Vec<RetrievalResult> {
    search(memories, query, options, Utc::now())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
