//! [`PruneScheduler`] – debounced background link pruning.
//!
//! Pruning weak associative links is cheap but pointless to run after every
//! recall.  The scheduler owns at most one pending task: every call to
//! [`PruneScheduler::schedule`] aborts the previous task and arms a new one,
//! so a burst of recalls results in a single prune `delay` after the last
//! one (last call wins).
//!
//! Each armed task carries a claim flag.  Whichever side sets it first, the
//! timer or [`PruneScheduler::cancel`], decides whether the job runs, so a
//! prune that has already started is never run a second time by
//! [`PruneScheduler::flush`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//! use mnemo_memory::scheduler::PruneScheduler;
//!
//! let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! let runs = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&runs);
//! let scheduler = PruneScheduler::new(rt.handle().clone(), move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! scheduler.schedule(Duration::from_secs(60));
//! assert!(scheduler.is_pending());
//! assert!(scheduler.flush()); // runs the prune now instead of in a minute
//! assert_eq!(runs.load(Ordering::SeqCst), 1);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

type PruneJob = Arc<dyn Fn() + Send + Sync>;

struct Pending {
    task: JoinHandle<()>,
    claimed: Arc<AtomicBool>,
}

impl Pending {
    /// Claim the job for the caller.  `false` once the timer already has.
    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::SeqCst)
    }
}

/// Debounces a prune job onto a tokio runtime.
pub struct PruneScheduler {
    job: PruneJob,
    runtime: Handle,
    pending: Mutex<Option<Pending>>,
}

impl PruneScheduler {
    /// Create a scheduler that runs `job` on `runtime`.
    pub fn new(runtime: Handle, job: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            job: Arc::new(job),
            runtime,
            pending: Mutex::new(None),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run the job after `delay`, replacing any prune still pending.
    pub fn schedule(&self, delay: Duration) {
        let job = Arc::clone(&self.job);
        let claimed = Arc::new(AtomicBool::new(false));
        let timer_claim = Arc::clone(&claimed);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if timer_claim.swap(true, Ordering::SeqCst) {
                return;
            }
            if tokio::task::spawn_blocking(move || job()).await.is_err() {
                debug!("prune job panicked or was cancelled");
            }
        });
        if let Some(previous) = self.pending().replace(Pending { task, claimed }) {
            if previous.claim() {
                previous.task.abort();
            }
            debug!("pending prune rescheduled");
        }
    }

    /// Abort the pending prune, if any.  Returns `true` if one was pending.
    ///
    /// A prune that has already started is left to finish and does not
    /// count as pending.
    pub fn cancel(&self) -> bool {
        match self.pending().take() {
            Some(pending) if pending.claim() => {
                pending.task.abort();
                true
            }
            _ => false,
        }
    }

    /// Run the pending prune immediately on the calling thread.
    ///
    /// Returns `true` if a prune was pending (and has now run).  Returns
    /// `false` without running anything if the timer already started it.
    pub fn flush(&self) -> bool {
        if self.cancel() {
            (self.job)();
            true
        } else {
            false
        }
    }

    /// `true` while a scheduled prune has not yet completed.
    pub fn is_pending(&self) -> bool {
        self.pending().as_ref().is_some_and(|pending| !pending.task.is_finished())
    }
}

impl Drop for PruneScheduler {
    fn drop(&mut self) {
        if let Some(pending) = self.pending().take()
            && pending.claim()
        {
            pending.task.abort();
        }
    }
}
