use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use datasync_error::{DatasyncError, Result};

use crate::liveness::LivenessToken;

/// Default poll interval for abandonment sweeps while parked.
const DEFAULT_SWEEP: Duration = Duration::from_millis(100);

struct Holder {
    ticket: u64,
    liveness: LivenessToken,
}

struct Waiter {
    ticket: u64,
    liveness: LivenessToken,
}

#[derive(Default)]
struct LockState {
    holder: Option<Holder>,
    queue: VecDeque<Waiter>,
    next_ticket: u64,
}

struct NamedLock {
    state: Mutex<LockState>,
    available: Condvar,
}

impl NamedLock {
    fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            available: Condvar::new(),
        }
    }
}

/// Broker of named, queued, mutually-exclusive locks.
///
/// One broker instance spans all contexts of a coordination domain. Grants
/// are strictly FIFO per lock name; `release` is idempotent; a dead holder
/// is reclaimed within one sweep interval.
pub struct LockBroker {
    locks: Mutex<HashMap<String, Arc<NamedLock>>>,
    sweep: Duration,
}

impl Default for LockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl LockBroker {
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP)
    }

    /// Broker with a custom abandonment-sweep interval (tests compress it).
    pub fn with_sweep_interval(sweep: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            sweep,
        }
    }

    fn entry(&self, name: &str) -> Arc<NamedLock> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(NamedLock::new())),
        )
    }

    /// Acquire the named lock, suspending until it is granted.
    ///
    /// Concurrent callers are served in arrival order. If the current holder's
    /// liveness token is revoked without a release, the lock is reclaimed and
    /// handed to the next waiter within one sweep interval. If `liveness` --
    /// the caller's own token -- is revoked while parked, the wait is
    /// abandoned with [`DatasyncError::Cancelled`].
    pub fn acquire(&self, name: &str, liveness: &LivenessToken) -> Result<LockGuard> {
        let lock = self.entry(name);
        let mut state = lock.state.lock();

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(Waiter {
            ticket,
            liveness: liveness.clone(),
        });

        loop {
            // Reclaim from a holder that died without releasing.
            if let Some(holder) = &state.holder {
                if !holder.liveness.is_alive() {
                    warn!("lock '{}' abandoned by dead holder, reclaiming", name);
                    state.holder = None;
                }
            }

            // Drop parked waiters whose contexts have closed.
            state
                .queue
                .retain(|w| w.ticket == ticket || w.liveness.is_alive());

            if !liveness.is_alive() {
                state.queue.retain(|w| w.ticket != ticket);
                lock.available.notify_all();
                return Err(DatasyncError::Cancelled {
                    what: format!("lock '{name}'"),
                });
            }

            if state.holder.is_none() && state.queue.front().map(|w| w.ticket) == Some(ticket) {
                state.queue.pop_front();
                state.holder = Some(Holder {
                    ticket,
                    liveness: liveness.clone(),
                });
                debug!("lock '{}' granted to ticket {}", name, ticket);
                return Ok(LockGuard {
                    name: name.to_string(),
                    ticket,
                    lock: Arc::clone(&lock),
                    released: false,
                });
            }

            // Park until a release or the next abandonment sweep.
            lock.available.wait_for(&mut state, self.sweep);
        }
    }

    /// Whether the named lock currently has a holder.
    pub fn is_held(&self, name: &str) -> bool {
        let lock = self.entry(name);
        let state = lock.state.lock();
        state.holder.is_some()
    }

    /// Number of contexts parked on the named lock.
    pub fn queue_len(&self, name: &str) -> usize {
        let lock = self.entry(name);
        let state = lock.state.lock();
        state.queue.len()
    }
}

/// Exclusive hold on a named lock.
///
/// Releases on drop; `release` may also be called explicitly and is
/// idempotent. Releasing a guard whose hold was already reclaimed (e.g.
/// after abandonment) is ignored rather than an error.
pub struct LockGuard {
    name: String,
    ticket: u64,
    lock: Arc<NamedLock>,
    released: bool,
}

impl LockGuard {
    /// Release the lock. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut state = self.lock.state.lock();
        if state.holder.as_ref().map(|h| h.ticket) == Some(self.ticket) {
            state.holder = None;
            debug!("lock '{}' released by ticket {}", self.name, self.ticket);
            self.lock.available.notify_all();
        }
    }

    /// The lock name this guard holds.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.name)
            .field("ticket", &self.ticket)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
