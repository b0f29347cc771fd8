use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lowest importance an author can assign to a memory.
pub const MIN_IMPORTANCE: u8 = 1;
/// Highest importance an author can assign to a memory.
pub const MAX_IMPORTANCE: u8 = 5;
/// Floor of the cached decay multiplier.
pub const MIN_DECAY: f64 = 0.05;

/// Opaque identifier of a [`MemoryEntry`].
///
/// New entries get a random UUID, but any string read from a store is
/// accepted as-is; ids are only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MemoryId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MemoryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MemoryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of fact a memory records.
///
/// Unknown labels read from older stores are preserved verbatim in
/// [`MemoryCategory::Other`] so they survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoryCategory {
    Preference,
    Fact,
    Instruction,
    Goal,
    Persona,
    Skill,
    Entity,
    Episodic,
    Context,
    Other(String),
}

impl MemoryCategory {
    pub fn as_str(&self) -> &str {
        match self {
            MemoryCategory::Preference => "preference",
            MemoryCategory::Fact => "fact",
            MemoryCategory::Instruction => "instruction",
            MemoryCategory::Goal => "goal",
            MemoryCategory::Persona => "persona",
            MemoryCategory::Skill => "skill",
            MemoryCategory::Entity => "entity",
            MemoryCategory::Episodic => "episodic",
            MemoryCategory::Context => "context",
            MemoryCategory::Other(label) => label,
        }
    }
}

impl From<&str> for MemoryCategory {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "preference" => MemoryCategory::Preference,
            "fact" => MemoryCategory::Fact,
            "instruction" => MemoryCategory::Instruction,
            "goal" => MemoryCategory::Goal,
            "persona" => MemoryCategory::Persona,
            "skill" => MemoryCategory::Skill,
            "entity" => MemoryCategory::Entity,
            "episodic" => MemoryCategory::Episodic,
            "context" => MemoryCategory::Context,
            _ => MemoryCategory::Other(s.to_string()),
        }
    }
}

impl From<String> for MemoryCategory {
    fn from(s: String) -> Self {
        MemoryCategory::from(s.as_str())
    }
}

impl From<MemoryCategory> for String {
    fn from(c: MemoryCategory) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single remembered fact.
///
/// `content`, `id` and `timestamp` never change after creation; superseding
/// facts are appended as new entries.  The engine only touches
/// `access_count`, `last_accessed`, `activation_level` and the cached `decay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredMemoryEntry")]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub content: String,
    /// Extracted terms, weighted alongside `content` during scoring.
    pub keywords: Vec<String>,
    pub category: MemoryCategory,
    pub timestamp: DateTime<Utc>,
    /// Author-assigned priority in `[1, 5]`.
    pub importance: u8,
    pub access_count: u32,
    pub last_accessed: DateTime<Utc>,
    /// Transient priming signal in `[0, 1]`.
    pub activation_level: f64,
    /// Last computed relevance multiplier in `[0.05, 1]`.  A snapshot only;
    /// recompute with `mnemo_memory::decay::compute_decay` before use.
    pub decay: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotional_valence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_signature: Option<String>,
}

impl MemoryEntry {
    /// Construct a new entry created now, with a fresh id.
    ///
    /// `importance` is clamped to `[1, 5]`.
    pub fn new(
        content: impl Into<String>,
        keywords: Vec<String>,
        category: MemoryCategory,
        importance: u8,
    ) -> Self {
        Self::new_at(content, keywords, category, importance, Utc::now())
    }

    /// Construct a new entry with an explicit creation time.
    pub fn new_at(
        content: impl Into<String>,
        keywords: Vec<String>,
        category: MemoryCategory,
        importance: u8,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MemoryId::new(),
            content: content.into(),
            keywords,
            category,
            timestamp,
            importance: importance.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE),
            access_count: 0,
            last_accessed: timestamp,
            activation_level: 0.0,
            decay: 1.0,
            relations: None,
            embedding: None,
            emotional_valence: None,
            context_signature: None,
        }
    }
}

/// On-disk shape of a [`MemoryEntry`].
///
/// Records written by older versions may lack any of the mutable fields;
/// the conversion fills defaults and restores the value-range invariants.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMemoryEntry {
    id: MemoryId,
    content: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default = "default_category")]
    category: MemoryCategory,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    importance: Option<u8>,
    #[serde(default)]
    access_count: Option<u32>,
    #[serde(default)]
    last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    activation_level: Option<f64>,
    #[serde(default)]
    decay: Option<f64>,
    #[serde(default)]
    relations: Option<Vec<String>>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    emotional_valence: Option<f64>,
    #[serde(default)]
    context_signature: Option<String>,
}

fn default_category() -> MemoryCategory {
    MemoryCategory::Fact
}

fn unit_or(value: Option<f64>, default: f64, min: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(min, 1.0),
        _ => default,
    }
}

impl From<StoredMemoryEntry> for MemoryEntry {
    fn from(raw: StoredMemoryEntry) -> Self {
        Self {
            id: raw.id,
            content: raw.content,
            keywords: raw.keywords,
            category: raw.category,
            timestamp: raw.timestamp,
            importance: raw
                .importance
                .unwrap_or(3)
                .clamp(MIN_IMPORTANCE, MAX_IMPORTANCE),
            access_count: raw.access_count.unwrap_or(0),
            last_accessed: raw.last_accessed.unwrap_or(raw.timestamp),
            activation_level: unit_or(raw.activation_level, 0.0, 0.0),
            decay: unit_or(raw.decay, 1.0, MIN_DECAY),
            relations: raw.relations,
            embedding: raw.embedding,
            emotional_valence: raw.emotional_valence,
            context_signature: raw.context_signature,
        }
    }
}

/// How two memories came to be associated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Created within a few minutes of each other.
    Temporal,
    /// Same category.
    Topical,
    /// Lexical overlap only.
    Semantic,
}

/// Weighted association between two memories, traversed in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociativeLink {
    pub source_id: MemoryId,
    pub target_id: MemoryId,
    /// Association weight in `(0, 1]`.
    pub strength: f64,
    #[serde(rename = "type")]
    pub link_type: LinkType,
    pub created_at: DateTime<Utc>,
    /// Number of times a caller reinforced this link.
    #[serde(default)]
    pub reinforcements: u32,
}

impl AssociativeLink {
    /// `true` if this link joins `a` and `b` in either direction.
    pub fn connects(&self, a: &MemoryId, b: &MemoryId) -> bool {
        (&self.source_id == a && &self.target_id == b) || (&self.source_id == b && &self.target_id == a)
    }

    /// `true` if `id` is either endpoint.
    pub fn touches(&self, id: &MemoryId) -> bool {
        &self.source_id == id || &self.target_id == id
    }

    /// The endpoint opposite `id`, or `None` if `id` is not on this link.
    pub fn other_end(&self, id: &MemoryId) -> Option<&MemoryId> {
        if &self.source_id == id {
            Some(&self.target_id)
        } else if &self.target_id == id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

/// Why a memory was returned by a retrieval pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Semantic,
    Keyword,
    Primed,
    Associative,
}

/// A scored memory returned by a retrieval pass.  Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub memory: MemoryEntry,
    pub score: f64,
    pub match_type: MatchType,
}

/// Node visited by one spreading-activation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationNode {
    pub node_id: MemoryId,
    pub activation_level: f64,
    /// Hops from the seed; seeds are depth 0.
    pub depth: usize,
    /// Ids from the seed to this node, inclusive.
    pub path: Vec<MemoryId>,
}

/// Global error type for the memory engine and its collaborators.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum MnemoError {
    #[error("Storage Error: {0}")]
    Storage(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Invalid Configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_serialization_roundtrip() {
        let cat = MemoryCategory::Preference;
        let json = serde_json::to_string(&cat).unwrap();
        assert_eq!(json, "\"preference\"");
        let back: MemoryCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(cat, back);
    }

    #[test]
    fn unknown_category_survives_roundtrip() {
        let back: MemoryCategory = serde_json::from_str("\"relationship\"").unwrap();
        assert_eq!(back, MemoryCategory::Other("relationship".to_string()));
        assert_eq!(serde_json::to_string(&back).unwrap(), "\"relationship\"");
    }

    #[test]
    fn new_entry_clamps_importance() {
        let high = MemoryEntry::new("x", vec![], MemoryCategory::Fact, 9);
        assert_eq!(high.importance, MAX_IMPORTANCE);
        let low = MemoryEntry::new("x", vec![], MemoryCategory::Fact, 0);
        assert_eq!(low.importance, MIN_IMPORTANCE);
        assert_eq!(low.last_accessed, low.timestamp);
    }

    #[test]
    fn memory_entry_roundtrip_keeps_extension_fields() {
        let mut entry = MemoryEntry::new(
            "I love hiking",
            vec!["hiking".to_string()],
            MemoryCategory::Preference,
            5,
        );
        entry.relations = Some(vec!["outdoors".to_string()]);
        entry.embedding = Some(vec![0.25, -0.5]);
        entry.emotional_valence = Some(0.75);
        entry.context_signature = Some("weekend".to_string());

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"accessCount\""));
        assert!(json.contains("\"lastAccessed\""));
        let back: MemoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn legacy_record_gets_defaults() {
        let json = r#"{
            "id": "7f1c2a52-3f0e-4b5c-9d53-2b8d0e4f9a11",
            "content": "prefers tea",
            "timestamp": "2024-01-01T00:00:00Z",
            "importance": 12,
            "activationLevel": 4.0
        }"#;
        let entry: MemoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.category, MemoryCategory::Fact);
        assert_eq!(entry.importance, MAX_IMPORTANCE);
        assert_eq!(entry.access_count, 0);
        assert_eq!(entry.last_accessed, entry.timestamp);
        assert_eq!(entry.activation_level, 1.0);
        assert_eq!(entry.decay, 1.0);
        assert!(entry.keywords.is_empty());
    }

    #[test]
    fn non_uuid_ids_load_and_serialize_unchanged() {
        let json = r#"{
            "id": "mem_1700000000000",
            "content": "likes green tea",
            "timestamp": "2024-01-01T00:00:00Z"
        }"#;
        let entry: MemoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id.as_str(), "mem_1700000000000");
        let back = serde_json::to_string(&entry).unwrap();
        assert!(back.contains("\"id\":\"mem_1700000000000\""));
    }

    #[test]
    fn fresh_ids_are_distinct_uuids() {
        let a = MemoryId::new();
        assert_ne!(a, MemoryId::new());
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn link_type_field_is_named_type() {
        let link = AssociativeLink {
            source_id: MemoryId::new(),
            target_id: MemoryId::new(),
            strength: 0.4,
            link_type: LinkType::Topical,
            created_at: Utc::now(),
            reinforcements: 0,
        };
        let json = serde_json::to_string(&link).unwrap();
        assert!(json.contains("\"type\":\"topical\""));
        assert!(json.contains("\"sourceId\""));
        let back: AssociativeLink = serde_json::from_str(&json).unwrap();
        assert_eq!(link, back);
    }

    #[test]
    fn link_endpoints_are_unordered() {
        let a = MemoryId::new();
        let b = MemoryId::new();
        let link = AssociativeLink {
            source_id: a.clone(),
            target_id: b.clone(),
            strength: 0.5,
            link_type: LinkType::Semantic,
            created_at: Utc::now(),
            reinforcements: 0,
        };
        assert!(link.connects(&a, &b));
        assert!(link.connects(&b, &a));
        assert_eq!(link.other_end(&b), Some(&a));
        assert_eq!(link.other_end(&MemoryId::new()), None);
    }

    #[test]
    fn mnemo_error_display() {
        let err = MnemoError::Storage("disk full".to_string());
        assert!(err.to_string().contains("Storage Error"));
        assert!(err.to_string().contains("disk full"));
    }
}
