//! [`MemoryBank`] – the load → compute → save cycle around a [`MemoryStore`].
//!
//! The engine modules are pure functions over collections the caller owns.
//! `MemoryBank` is the caller most applications want: it loads both
//! collections from the store, runs the engine, and writes the results back.
//!
//! Every cycle runs under one writer lock, so concurrent callers sharing a
//! bank in this process never lose each other's updates.  Separate processes
//! (or separate banks) over the same store are still last-write-wins; the
//! store contract has no version stamp to detect that.
//!
//! # Recall pipeline
//!
//! 1. [`search`] ranks the memories against the query.
//! 2. If links exist, [`get_associative_memories`] spreads activation from
//!    the top direct hits.
//! 3. Direct hits are reinforced; associative hits are primed and every other
//!    memory's activation cools.
//! 4. Memories are saved and a debounced link prune is scheduled.
//!
//! # Example
//!
//! ```rust
//! use mnemo_memory::bank::{BankConfig, MemoryBank};
//! use mnemo_memory::store::InMemoryStore;
//! use mnemo_types::{MemoryCategory, MemoryEntry};
//!
//! let bank = MemoryBank::new(InMemoryStore::new(), BankConfig::default());
//! bank.remember(MemoryEntry::new("I love hiking in the alps", vec![], MemoryCategory::Preference, 5)).unwrap();
//! bank.remember(MemoryEntry::new("I work as an engineer", vec![], MemoryCategory::Fact, 3)).unwrap();
//!
//! let recall = bank.recall("hiking trips").unwrap();
//! assert_eq!(recall.direct[0].memory.content, "I love hiking in the alps");
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use mnemo_types::{AssociativeLink, MemoryEntry, MemoryId, MnemoError, RetrievalResult};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::association::{build_associative_links, drop_dangling_links, get_associative_memories, merge_links, prune_weak_links};
use crate::consolidation::{
    DEFAULT_PRIME_BOOST, consolidate_with_evictions, deduplicate_memories, prime_memories, reinforce_memory,
};
use crate::decay::refresh_decay;
use crate::retrieval::{SearchOptions, search};
use crate::scheduler::PruneScheduler;
use crate::store::{MemoryStore, load_links, load_memories, save_links, save_memories};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for a [`MemoryBank`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    /// Deduplicate and consolidate once the bank holds more memories than this.
    pub maintenance_threshold: usize,
    /// Links weaker than this are removed by the debounced prune.
    pub prune_min_strength: f64,
    /// Quiet period before a scheduled prune runs.
    pub prune_delay_ms: u64,
    /// Activation added to associatively recalled memories.
    pub prime_boost: f64,
    /// Count each direct hit as an access.
    pub reinforce_on_recall: bool,
    pub search: SearchOptions,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            maintenance_threshold: 50,
            prune_min_strength: 0.2,
            prune_delay_ms: 5_000,
            prime_boost: DEFAULT_PRIME_BOOST,
            reinforce_on_recall: true,
            search: SearchOptions::default(),
        }
    }
}

impl BankConfig {
    /// Reject values that would break the engine's invariants.
    pub fn validate(&self) -> Result<(), MnemoError> {
        if !(0.0..=1.0).contains(&self.prune_min_strength) {
            return Err(MnemoError::InvalidConfig(format!(
                "prune_min_strength must be in [0, 1], got {}",
                self.prune_min_strength
            )));
        }
        if !(0.0..=1.0).contains(&self.prime_boost) {
            return Err(MnemoError::InvalidConfig(format!(
                "prime_boost must be in [0, 1], got {}",
                self.prime_boost
            )));
        }
        if self.search.max_results == 0 {
            return Err(MnemoError::InvalidConfig("search.max_results must be at least 1".to_string()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

/// Results of one recall.
#[derive(Debug, Clone, Default)]
pub struct Recall {
    pub direct: Vec<RetrievalResult>,
    pub associative: Vec<RetrievalResult>,
}

impl Recall {
    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.associative.is_empty()
    }
}

/// What a maintenance pass removed.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub duplicates_removed: usize,
    /// Entries dropped by consolidation, for callers that archive them.
    pub evicted: Vec<MemoryEntry>,
    pub links_dropped: usize,
}

/// Outcome of [`MemoryBank::remember`].
#[derive(Debug, Clone, Default)]
pub struct Remembered {
    pub id: MemoryId,
    pub links_created: usize,
    pub maintenance: Option<MaintenanceReport>,
}

/// Returned by [`MemoryBank::quiesce`]; no cycle can start while it lives.
pub struct Quiesced<'a> {
    /// A scheduled prune was pending and has been run.
    pub prune_flushed: bool,
    _writer: MutexGuard<'a, ()>,
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryBank
// ─────────────────────────────────────────────────────────────────────────────

struct BankInner<S> {
    store: S,
    config: BankConfig,
    writer: Mutex<()>,
}

impl<S: MemoryStore> BankInner<S> {
    fn lock(&self) -> Result<MutexGuard<'_, ()>, MnemoError> {
        self.writer
            .lock()
            .map_err(|_| MnemoError::Storage("memory bank writer lock poisoned".to_string()))
    }

    fn prune_links(&self) -> Result<usize, MnemoError> {
        let _guard = self.lock()?;
        let mut links = load_links(&self.store);
        let removed = prune_weak_links(&mut links, self.config.prune_min_strength);
        if removed > 0 {
            save_links(&self.store, &links)?;
            info!(removed, remaining = links.len(), "weak associative links pruned");
        }
        Ok(removed)
    }
}

fn run_maintenance(
    memories: &mut Vec<MemoryEntry>,
    links: &mut Vec<AssociativeLink>,
    now: DateTime<Utc>,
) -> MaintenanceReport {
    let before = memories.len();
    let deduplicated = deduplicate_memories(memories);
    let duplicates_removed = before - deduplicated.len();

    let outcome = consolidate_with_evictions(&deduplicated, now);
    *memories = outcome.kept;
    refresh_decay(memories, now);
    let links_dropped = drop_dangling_links(links, memories);

    info!(
        duplicates_removed,
        evicted = outcome.evicted.len(),
        links_dropped,
        remaining = memories.len(),
        "memory maintenance complete"
    );
    MaintenanceReport {
        duplicates_removed,
        evicted: outcome.evicted,
        links_dropped,
    }
}

/// A memory collection and its association graph behind a [`MemoryStore`].
pub struct MemoryBank<S: MemoryStore + 'static> {
    inner: Arc<BankInner<S>>,
    scheduler: Option<PruneScheduler>,
}

impl<S: MemoryStore + 'static> MemoryBank<S> {
    /// Create a bank without background pruning.
    pub fn new(store: S, config: BankConfig) -> Self {
        Self {
            inner: Arc::new(BankInner {
                store,
                config,
                writer: Mutex::new(()),
            }),
            scheduler: None,
        }
    }

    /// Enable debounced link pruning on `runtime` after each recall.
    pub fn with_prune_scheduler(mut self, runtime: Handle) -> Self {
        let inner = Arc::clone(&self.inner);
        self.scheduler = Some(PruneScheduler::new(runtime, move || {
            if let Err(e) = inner.prune_links() {
                warn!(error = %e, "scheduled link prune failed");
            }
        }));
        self
    }

    pub fn config(&self) -> &BankConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Current memory collection as stored.
    pub fn memories(&self) -> Vec<MemoryEntry> {
        load_memories(&self.inner.store)
    }

    /// Current association graph as stored.
    pub fn links(&self) -> Vec<AssociativeLink> {
        load_links(&self.inner.store)
    }

    /// Append `entry`, link it to related memories, and run maintenance once
    /// the bank exceeds its threshold.
    ///
    /// Maintenance is destructive: duplicates and over-capacity memories are
    /// removed and returned in the report, not archived.
    pub fn remember(&self, entry: MemoryEntry) -> Result<Remembered, MnemoError> {
        let _guard = self.inner.lock()?;
        let now = Utc::now();
        let mut memories = load_memories(&self.inner.store);
        let mut links = load_links(&self.inner.store);

        let new_links = build_associative_links(&entry, &memories, &links, now);
        let links_created = merge_links(&mut links, new_links);
        let id = entry.id.clone();
        memories.push(entry);

        let maintenance = (memories.len() > self.inner.config.maintenance_threshold)
            .then(|| run_maintenance(&mut memories, &mut links, now));

        save_memories(&self.inner.store, &memories)?;
        save_links(&self.inner.store, &links)?;
        debug!(%id, links_created, total = memories.len(), "memory stored");
        Ok(Remembered {
            id,
            links_created,
            maintenance,
        })
    }

    /// Retrieve memories relevant to `query`.
    ///
    /// Persisting the reinforcement and priming side effects is best-effort:
    /// a failed save is logged and the results are still returned.
    pub fn recall(&self, query: &str) -> Result<Recall, MnemoError> {
        let _guard = self.inner.lock()?;
        let now = Utc::now();
        let config = &self.inner.config;
        let mut memories = load_memories(&self.inner.store);
        let links = load_links(&self.inner.store);

        let direct = search(&memories, query, &config.search, now);
        if direct.is_empty() {
            return Ok(Recall::default());
        }
        let associative = if links.is_empty() {
            Vec::new()
        } else {
            get_associative_memories(&memories, &links, &direct)
        };

        if config.reinforce_on_recall {
            let hits: HashSet<&MemoryId> = direct.iter().map(|r| &r.memory.id).collect();
            for memory in memories.iter_mut().filter(|m| hits.contains(&m.id)) {
                *memory = reinforce_memory(memory, now);
            }
        }
        if !associative.is_empty() {
            let primed: Vec<MemoryId> = associative.iter().map(|r| r.memory.id.clone()).collect();
            prime_memories(&mut memories, &primed, config.prime_boost);
        }

        if let Err(e) = save_memories(&self.inner.store, &memories) {
            warn!(error = %e, "failed to persist recall side effects");
        }
        if let Some(scheduler) = self.scheduler.as_ref().filter(|_| !links.is_empty()) {
            scheduler.schedule(Duration::from_millis(config.prune_delay_ms));
        }

        debug!(
            query_len = query.len(),
            direct = direct.len(),
            associative = associative.len(),
            "recall complete"
        );
        Ok(Recall { direct, associative })
    }

    /// Deduplicate, consolidate and drop dangling links now.
    pub fn maintain(&self) -> Result<MaintenanceReport, MnemoError> {
        let _guard = self.inner.lock()?;
        let mut memories = load_memories(&self.inner.store);
        let mut links = load_links(&self.inner.store);
        let report = run_maintenance(&mut memories, &mut links, Utc::now());
        save_memories(&self.inner.store, &memories)?;
        save_links(&self.inner.store, &links)?;
        Ok(report)
    }

    /// Remove links below the configured minimum strength now.
    pub fn prune_links(&self) -> Result<usize, MnemoError> {
        self.inner.prune_links()
    }

    /// Run a pending scheduled prune immediately.  Returns `true` if one was
    /// pending.
    pub fn flush_pending_prune(&self) -> bool {
        self.scheduler.as_ref().is_some_and(|s| s.flush())
    }

    /// Drop a pending scheduled prune without running it.
    pub fn cancel_pending_prune(&self) -> bool {
        self.scheduler.as_ref().is_some_and(|s| s.cancel())
    }

    pub fn has_pending_prune(&self) -> bool {
        self.scheduler.as_ref().is_some_and(|s| s.is_pending())
    }

    /// Run any pending prune, then wait for the cycle in progress and hold
    /// the writer lock until the returned guard drops.
    ///
    /// Call before exiting the process so no `remember` is cut off between
    /// its memory and link saves.
    pub fn quiesce(&self) -> Result<Quiesced<'_>, MnemoError> {
        let prune_flushed = self.flush_pending_prune();
        let writer = self.inner.lock()?;
        // A recall that slipped in after the flush may have armed another.
        self.cancel_pending_prune();
        Ok(Quiesced {
            prune_flushed,
            _writer: writer,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
