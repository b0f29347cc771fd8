//! Persistence collaborator.
//!
//! The engine never performs I/O itself; callers hand it collections loaded
//! through a [`MemoryStore`] and write the results back through the same
//! store.  A store is a plain key → bytes map with two logical keys, see
//! [`StoreKey`].  Collections are encoded as JSON arrays.
//!
//! Load failures (missing key, I/O error, undecodable payload) are logged and
//! read as an empty collection.  Records are decoded one at a time, so a
//! single bad record is skipped without losing its neighbours.  Whenever
//! anything is skipped the raw payload is copied to a backup key (see
//! [`StoreKey::backup_key`]) before the next save can replace it.  Save
//! failures are returned so the caller can log them and carry on.
//!
//! # Storage layout ([`SqliteStore`])
//!
//! | column     | type | description                        |
//! |------------|------|------------------------------------|
//! | key        | TEXT | Logical key, primary key           |
//! | value      | BLOB | JSON-encoded collection            |
//! | updated_at | TEXT | RFC-3339 time of the last save     |
//!
//! # Example
//!
//! ```rust
//! use mnemo_memory::store::{load_memories, save_memories, SqliteStore};
//! use mnemo_types::{MemoryCategory, MemoryEntry};
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! assert!(load_memories(&store).is_empty());
//!
//! let entry = MemoryEntry::new("likes tea", vec![], MemoryCategory::Preference, 3);
//! save_memories(&store, &[entry.clone()]).unwrap();
//! assert_eq!(load_memories(&store), vec![entry]);
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use mnemo_types::{AssociativeLink, MemoryEntry, MnemoError};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for MnemoError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Encoding(e) => MnemoError::Serialization(e.to_string()),
            other => MnemoError::Storage(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keys & trait
// ─────────────────────────────────────────────────────────────────────────────

/// The two collections a memory bank persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    Memories,
    AssociativeLinks,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::Memories => "memories",
            StoreKey::AssociativeLinks => "associative_links",
        }
    }

    /// Where the raw payload is kept when some of it could not be decoded.
    pub fn backup_key(&self) -> &'static str {
        match self {
            StoreKey::Memories => "memories.unreadable",
            StoreKey::AssociativeLinks => "associative_links.unreadable",
        }
    }
}

/// Byte-oriented key/value persistence.
///
/// Implementations provide whatever durability they can; the engine assumes
/// nothing beyond "a successful save is visible to the next load".
pub trait MemoryStore: Send + Sync {
    /// Return the bytes stored under `key`, or `None` if the key is absent.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the bytes stored under `key`.
    fn save(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

fn load_collection<T: DeserializeOwned, S: MemoryStore + ?Sized>(store: &S, key: StoreKey) -> Vec<T> {
    let bytes = match store.load(key.as_str()) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(key = key.as_str(), error = %e, "store load failed; treating as empty");
            return Vec::new();
        }
    };
    let records: Vec<serde_json::Value> = match serde_json::from_slice(&bytes) {
        Ok(records) => records,
        Err(e) => {
            warn!(key = key.as_str(), error = %e, "stored collection is not decodable; treating as empty");
            keep_unreadable(store, key, &bytes);
            return Vec::new();
        }
    };

    let total = records.len();
    let items: Vec<T> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(key = key.as_str(), index, error = %e, "skipping undecodable record");
                None
            }
        })
        .collect();
    if items.len() < total {
        keep_unreadable(store, key, &bytes);
    }
    items
}

fn keep_unreadable<S: MemoryStore + ?Sized>(store: &S, key: StoreKey, bytes: &[u8]) {
    match store.save(key.backup_key(), bytes) {
        Ok(()) => warn!(key = key.as_str(), backup = key.backup_key(), "raw payload kept for recovery"),
        Err(e) => warn!(key = key.as_str(), error = %e, "failed to keep raw payload"),
    }
}

fn save_collection<T: Serialize, S: MemoryStore + ?Sized>(
    store: &S,
    key: StoreKey,
    items: &[T],
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(items)?;
    store.save(key.as_str(), &bytes)
}

/// Load the memory collection; empty on any failure.
pub fn load_memories<S: MemoryStore + ?Sized>(store: &S) -> Vec<MemoryEntry> {
    load_collection(store, StoreKey::Memories)
}

/// Replace the memory collection.
pub fn save_memories<S: MemoryStore + ?Sized>(store: &S, memories: &[MemoryEntry]) -> Result<(), StoreError> {
    save_collection(store, StoreKey::Memories, memories)
}

/// Load the associative-link collection; empty on any failure.
pub fn load_links<S: MemoryStore + ?Sized>(store: &S) -> Vec<AssociativeLink> {
    load_collection(store, StoreKey::AssociativeLinks)
}

/// Replace the associative-link collection.
pub fn save_links<S: MemoryStore + ?Sized>(store: &S, links: &[AssociativeLink]) -> Result<(), StoreError> {
    save_collection(store, StoreKey::AssociativeLinks, links)
}

// ─────────────────────────────────────────────────────────────────────────────
// SqliteStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed key/value store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key        TEXT NOT NULL PRIMARY KEY,
                value      BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

impl MemoryStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let value = conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// InMemoryStore
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local store; contents are lost on drop.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryStore for InMemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_types::{LinkType, MemoryCategory, MemoryId};

    fn sample_link() -> AssociativeLink {
        AssociativeLink {
            source_id: MemoryId::new(),
            target_id: MemoryId::new(),
            strength: 0.4,
            link_type: LinkType::Temporal,
            created_at: Utc::now(),
            reinforcements: 2,
        }
    }

    #[test]
    fn missing_keys_load_as_empty() {
        let store = InMemoryStore::new();
        assert!(load_memories(&store).is_empty());
        assert!(load_links(&store).is_empty());
    }

    #[test]
    fn garbage_payload_loads_as_empty() {
        let store = InMemoryStore::new();
        store.save(StoreKey::Memories.as_str(), b"not json").unwrap();
        assert!(load_memories(&store).is_empty());
        assert_eq!(
            store.load(StoreKey::Memories.backup_key()).unwrap().as_deref(),
            Some(&b"not json"[..])
        );
    }

    #[test]
    fn bad_records_are_skipped_individually() {
        let store = InMemoryStore::new();
        let payload = br#"[
            {"id":"mem_1700000000000","content":"likes tea","timestamp":"2023-05-01T12:00:00Z"},
            {"id":"broken","timestamp":"not a date"},
            {"id":"7f1c2a52-3f0e-4b5c-9d53-2b8d0e4f9a11","content":"works remotely","timestamp":"2023-05-02T12:00:00Z"}
        ]"#;
        store.save(StoreKey::Memories.as_str(), payload).unwrap();

        let loaded = load_memories(&store);
        let contents: Vec<&str> = loaded.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["likes tea", "works remotely"]);
        assert_eq!(loaded[0].id.as_str(), "mem_1700000000000");
        assert_eq!(
            store.load(StoreKey::Memories.backup_key()).unwrap().as_deref(),
            Some(&payload[..])
        );
    }

    #[test]
    fn clean_load_writes_no_backup() {
        let store = InMemoryStore::new();
        save_links(&store, &[sample_link()]).unwrap();
        assert_eq!(load_links(&store).len(), 1);
        assert!(store.load(StoreKey::AssociativeLinks.backup_key()).unwrap().is_none());
    }

    #[test]
    fn links_roundtrip_through_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        let links = vec![sample_link(), sample_link()];
        save_links(&store, &links).unwrap();
        assert_eq!(load_links(&store), links);
    }

    #[test]
    fn save_replaces_previous_value() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = MemoryEntry::new("first", vec![], MemoryCategory::Fact, 3);
        let b = MemoryEntry::new("second", vec![], MemoryCategory::Fact, 3);
        save_memories(&store, &[a]).unwrap();
        save_memories(&store, &[b.clone()]).unwrap();
        assert_eq!(load_memories(&store), vec![b]);
    }

    #[test]
    fn keys_are_independent() {
        let store = InMemoryStore::new();
        save_links(&store, &[sample_link()]).unwrap();
        assert!(load_memories(&store).is_empty());
        assert_eq!(load_links(&store).len(), 1);
    }

    #[test]
    fn sqlite_file_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("mnemo.db");
        let entry = MemoryEntry::new("persisted", vec!["disk".to_string()], MemoryCategory::Fact, 4);
        {
            let store = SqliteStore::open(&path).unwrap();
            save_memories(&store, &[entry.clone()]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(load_memories(&store), vec![entry]);
    }

    #[test]
    fn legacy_records_are_migrated_on_load() {
        let store = InMemoryStore::new();
        let legacy = br#"[{"id":"7f1c2a52-3f0e-4b5c-9d53-2b8d0e4f9a11","content":"old","timestamp":"2023-05-01T12:00:00Z"}]"#;
        store.save(StoreKey::Memories.as_str(), legacy).unwrap();
        let loaded = load_memories(&store);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].importance, 3);
        assert_eq!(loaded[0].last_accessed, loaded[0].timestamp);
    }

    #[test]
    fn store_error_converts_to_mnemo_error() {
        let err: MnemoError = StoreError::Poisoned.into();
        assert!(matches!(err, MnemoError::Storage(_)));
    }
}
