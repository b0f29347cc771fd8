//! Lexical index: tokenizer, IDF table, TF-IDF vectors and cosine similarity.
//!
//! Everything here is a pure function of its inputs.  Term maps are
//! [`BTreeMap`]s so that floating-point sums are accumulated in a fixed order
//! and repeated runs over the same corpus produce bit-identical scores.
//!
//! ## Weighting
//!
//! ```text
//! idf(t)      = ln((N + 1) / (df(t) + 1)) + 1
//! tf(t, d)    = 0.5 + 0.5 × freq(t, d) / max_freq(d)
//! weight(t,d) = tf(t, d) × idf(t)          (idf = 1 for unseen terms)
//! ```
//!
//! The `+ 1` floor keeps every IDF at or above 1, so a term that appears in
//! every document still contributes.
//!
//! # Example
//!
//! ```rust
//! use mnemo_memory::lexical::{cosine_similarity, tfidf_vector, tokenize};
//! use std::collections::BTreeMap;
//!
//! assert_eq!(tokenize("I love hiking!"), vec!["love", "hiking"]);
//!
//! let idf = BTreeMap::new();
//! let a = tfidf_vector("hiking in the alps", &idf);
//! let b = tfidf_vector("alps hiking trip", &idf);
//! assert!(cosine_similarity(&a, &b) > 0.5);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use mnemo_types::MemoryEntry;

/// Sparse term → weight map.
pub type TermVector = BTreeMap<String, f64>;

/// Term → inverse document frequency.
pub type IdfTable = BTreeMap<String, f64>;

// ─────────────────────────────────────────────────────────────────────────────
// Tokenizer
// ─────────────────────────────────────────────────────────────────────────────

/// Split `text` into lowercase ASCII alphanumeric tokens longer than two
/// characters.
///
/// Every other character is stripped (not replaced), so `"don't"` becomes
/// `"dont"` and `"café"` becomes `"caf"`.  Both the character class and the
/// lowercasing are ASCII-only, which keeps the result independent of locale.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .collect::<String>()
        })
        .filter(|token| token.chars().count() > 2)
        .collect()
}

/// Distinct tokens of `text`.
pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// The text a memory is indexed under: its content followed by its keywords.
pub fn document_text(memory: &MemoryEntry) -> String {
    if memory.keywords.is_empty() {
        memory.content.clone()
    } else {
        format!("{} {}", memory.content, memory.keywords.join(" "))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IDF / TF-IDF
// ─────────────────────────────────────────────────────────────────────────────

/// Build the IDF table over every memory's content and keywords.
pub fn build_idf(corpus: &[MemoryEntry]) -> IdfTable {
    let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
    for memory in corpus {
        for token in token_set(&document_text(memory)) {
            *doc_freq.entry(token).or_insert(0) += 1;
        }
    }

    let n_docs = corpus.len() as f64;
    doc_freq
        .into_iter()
        .map(|(token, df)| {
            let idf = ((n_docs + 1.0) / (df as f64 + 1.0)).ln() + 1.0;
            (token, idf)
        })
        .collect()
}

/// Build the augmented-frequency TF-IDF vector of `text`.
///
/// Terms missing from `idf` are weighted as if their IDF were 1.
pub fn tfidf_vector(text: &str, idf: &IdfTable) -> TermVector {
    let mut freq: BTreeMap<String, usize> = BTreeMap::new();
    for token in tokenize(text) {
        *freq.entry(token).or_insert(0) += 1;
    }

    let max_freq = freq.values().copied().max().unwrap_or(0);
    if max_freq == 0 {
        return TermVector::new();
    }

    freq.into_iter()
        .map(|(token, count)| {
            let tf = 0.5 + 0.5 * (count as f64 / max_freq as f64);
            let weight = tf * idf.get(&token).copied().unwrap_or(1.0);
            (token, weight)
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Similarity
// ─────────────────────────────────────────────────────────────────────────────

/// Cosine similarity between two sparse vectors.
///
/// Returns `0.0` if either vector has zero magnitude.
pub fn cosine_similarity(a: &TermVector, b: &TermVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|v| w * v))
        .sum();
    let norm_a = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|` of two token sets.
///
/// Two empty sets have similarity `0.0`.
pub fn jaccard_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

// ─────────────────────────────────────────────────────────────────────────────
// Corpus index
// ─────────────────────────────────────────────────────────────────────────────

/// IDF table plus one TF-IDF vector per memory, in corpus order.
#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
    pub idf: IdfTable,
    pub vectors: Vec<TermVector>,
}

impl TfIdfIndex {
    /// Index every memory's content and keywords against the corpus IDF.
    pub fn build(corpus: &[MemoryEntry]) -> Self {
        let idf = build_idf(corpus);
        let vectors = corpus
            .iter()
            .map(|m| tfidf_vector(&document_text(m), &idf))
            .collect();
        Self { idf, vectors }
    }

    /// Cosine similarity between documents `i` and `j`.
    pub fn similarity(&self, i: usize, j: usize) -> f64 {
        match (self.vectors.get(i), self.vectors.get(j)) {
            (Some(a), Some(b)) => cosine_similarity(a, b),
            _ => 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_types::MemoryCategory;

    fn memory(content: &str, keywords: &[&str]) -> MemoryEntry {
        MemoryEntry::new(
            content,
            keywords.iter().map(|k| k.to_string()).collect(),
            MemoryCategory::Fact,
            3,
        )
    }

    // ── tokenize ─────────────────────────────────────────────────────────────

    #[test]
    fn tokenize_lowercases_and_strips_punctuation() {
        assert_eq!(
            tokenize("What do I LIKE to do outdoors?"),
            vec!["what", "like", "outdoors"]
        );
    }

    #[test]
    fn tokenize_drops_short_tokens() {
        assert!(tokenize("a an to of I").is_empty());
    }

    #[test]
    fn tokenize_joins_around_apostrophes() {
        assert_eq!(tokenize("don't"), vec!["dont"]);
    }

    #[test]
    fn tokenize_ignores_case_of_non_ascii_words() {
        let tokens = tokenize("CAFÉ Émile café");
        assert_eq!(tokens, vec!["caf", "mile", "caf"]);
        assert_eq!(token_set("CAFÉ"), token_set("café"));
        assert!(tokens.iter().all(|t| t.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())));
    }

    #[test]
    fn tokenize_empty_text() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t\n ").is_empty());
    }

    // ── build_idf ────────────────────────────────────────────────────────────

    #[test]
    fn idf_is_at_least_one() {
        let corpus = vec![memory("hiking boots", &[]), memory("hiking trails", &[])];
        let idf = build_idf(&corpus);
        // "hiking" appears in both docs: ln(3/3) + 1 = 1.0
        assert!((idf["hiking"] - 1.0).abs() < 1e-12);
        // "boots" appears once: ln(3/2) + 1
        assert!((idf["boots"] - ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
        assert!(idf.values().all(|v| *v >= 1.0));
    }

    #[test]
    fn idf_counts_keywords() {
        let corpus = vec![memory("likes tea", &["beverage"])];
        let idf = build_idf(&corpus);
        assert!(idf.contains_key("beverage"));
    }

    #[test]
    fn idf_counts_each_document_once() {
        let corpus = vec![memory("tea tea tea", &["tea"]), memory("coffee", &[])];
        let idf = build_idf(&corpus);
        assert!((idf["tea"] - ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
    }

    // ── tfidf_vector ─────────────────────────────────────────────────────────

    #[test]
    fn most_frequent_term_gets_full_tf() {
        let idf = IdfTable::new();
        let v = tfidf_vector("tea tea coffee", &idf);
        assert!((v["tea"] - 1.0).abs() < 1e-12);
        assert!((v["coffee"] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn tfidf_applies_idf() {
        let mut idf = IdfTable::new();
        idf.insert("tea".to_string(), 2.0);
        let v = tfidf_vector("tea", &idf);
        assert!((v["tea"] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn tfidf_of_tokenless_text_is_empty() {
        assert!(tfidf_vector("a b ?", &IdfTable::new()).is_empty());
    }

    // ── cosine_similarity ────────────────────────────────────────────────────

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = tfidf_vector("mountain hiking trail", &IdfTable::new());
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_disjoint_vectors_is_zero() {
        let a = tfidf_vector("mountain hiking", &IdfTable::new());
        let b = tfidf_vector("software engineer", &IdfTable::new());
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_zero_vector_returns_zero() {
        let a = TermVector::new();
        let b = tfidf_vector("mountain", &IdfTable::new());
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&a, &a), 0.0);
    }

    // ── jaccard ──────────────────────────────────────────────────────────────

    #[test]
    fn jaccard_half_overlap() {
        let a = token_set("red green");
        let b = token_set("green blue");
        assert!((jaccard_similarity(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn jaccard_of_empty_sets_is_zero() {
        assert_eq!(jaccard_similarity(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }

    // ── TfIdfIndex ───────────────────────────────────────────────────────────

    #[test]
    fn index_similarity_of_verbatim_duplicates_is_one() {
        let corpus = vec![
            memory("I love hiking in the mountains", &[]),
            memory("I love hiking in the mountains", &[]),
            memory("I work as an engineer", &[]),
        ];
        let index = TfIdfIndex::build(&corpus);
        assert_eq!(index.len(), 3);
        assert!((index.similarity(0, 1) - 1.0).abs() < 1e-9);
        assert_eq!(index.similarity(0, 2), 0.0);
        assert_eq!(index.similarity(0, 99), 0.0);
    }
}
