//! `mnemo-memory` – The associative memory engine.
//!
//! Stores short natural-language memories, ranks them against free-text
//! queries, links related memories into a weighted graph, and keeps the
//! collection bounded through deduplication, consolidation and decay.
//!
//! # Modules
//!
//! - [`lexical`] – tokenisation, TF-IDF vectors and cosine/Jaccard similarity.
//! - [`decay`] – time-based forgetting curve with access and importance
//!   modifiers.
//! - [`retrieval`] – [`search`][retrieval::search]: multi-signal ranking with
//!   a diversity penalty.
//! - [`association`] – link construction, pruning and bounded spreading
//!   activation.
//! - [`consolidation`] – deduplication, per-category capacity, reinforcement
//!   and priming.
//! - [`store`] – the [`MemoryStore`][store::MemoryStore] persistence trait
//!   with SQLite and in-process implementations.
//! - [`scheduler`] – [`PruneScheduler`][scheduler::PruneScheduler]: debounced
//!   background link pruning on a tokio runtime.
//! - [`bank`] – [`MemoryBank`][bank::MemoryBank]: the load → compute → save
//!   cycle tying the modules above together.
//!
//! The engine modules (`lexical` through `consolidation`) are pure: they take
//! collections and a clock reading and return new values.  Only `store`,
//! `scheduler` and `bank` touch I/O or threads.

pub mod association;
pub mod bank;
pub mod consolidation;
pub mod decay;
pub mod lexical;
pub mod retrieval;
pub mod scheduler;
pub mod store;

pub use bank::{BankConfig, MaintenanceReport, MemoryBank, Quiesced, Recall, Remembered};
pub use retrieval::{SearchOptions, search};
pub use store::{InMemoryStore, MemoryStore, SqliteStore, StoreError, StoreKey};
