use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use datasync_types::{now_millis, ContextId, CoordinationConfig};

/// A context's time-bounded claim of leadership for one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub holder: ContextId,
    /// When the lease was claimed or last renewed, millis since epoch.
    pub claimed_at: u64,
}

#[derive(Default)]
struct DbElection {
    /// Registered participants and when they were last seen.
    participants: BTreeMap<ContextId, u64>,
    leader: Option<LeaseRecord>,
}

impl DbElection {
    fn prune(&mut self, now: u64, expiry_ms: u64) {
        self.participants
            .retain(|_, last_seen| now.saturating_sub(*last_seen) <= expiry_ms);
    }
}

/// Broker-owned election state for every database in a coordination domain.
///
/// All mutation happens under one lock, so the single-lease invariant is
/// enforced structurally: there is exactly one `leader` slot per database
/// and claims are check-and-set against it.
pub struct ElectionRegistry {
    inner: Mutex<HashMap<String, DbElection>>,
    changed: Condvar,
    config: CoordinationConfig,
}

impl ElectionRegistry {
    pub fn new(config: CoordinationConfig) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            changed: Condvar::new(),
            config,
        }
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// Register `ctx` as a participant for `db_name`.
    pub fn register(&self, db_name: &str, ctx: &ContextId) {
        let now = now_millis();
        let mut inner = self.inner.lock();
        let election = inner.entry(db_name.to_string()).or_default();
        election.participants.insert(ctx.clone(), now);
        election.prune(now, self.config.participant_expiry_ms);
        debug!(
            "registered {} for '{}' ({} participants)",
            ctx,
            db_name,
            election.participants.len()
        );
        self.changed.notify_all();
    }

    /// Remove `ctx` from the election, clearing its lease if it held one.
    pub fn deregister(&self, db_name: &str, ctx: &ContextId) {
        let mut inner = self.inner.lock();
        if let Some(election) = inner.get_mut(db_name) {
            election.participants.remove(ctx);
            if election.leader.as_ref().map(|l| &l.holder) == Some(ctx) {
                info!("leader {} departed '{}', lease cleared", ctx, db_name);
                election.leader = None;
            }
            if election.participants.is_empty() && election.leader.is_none() {
                inner.remove(db_name);
            }
        }
        self.changed.notify_all();
    }

    /// Attempt to claim the lease for `db_name`.
    ///
    /// Refreshes the caller's registration, prunes stale participants, then:
    /// a valid foreign lease blocks the claim unless `force` is set; an
    /// absent or expired lease goes to the lowest registered context ID (or
    /// to the caller when forcing). Returns whether the caller now leads.
    pub fn try_claim(&self, db_name: &str, ctx: &ContextId, force: bool) -> bool {
        let now = now_millis();
        let mut inner = self.inner.lock();
        let election = inner.entry(db_name.to_string()).or_default();
        election.participants.insert(ctx.clone(), now);
        election.prune(now, self.config.participant_expiry_ms);

        if let Some(lease) = &election.leader {
            let expired = now.saturating_sub(lease.claimed_at) > self.config.lease_ms;
            if expired {
                // Expiry destroys the lease. The holder demonstrably stopped
                // renewing, so it also loses its candidacy until it comes
                // back and re-registers.
                info!(
                    "lease on '{}' held by {} expired, clearing",
                    db_name, lease.holder
                );
                if lease.holder != *ctx {
                    let dead = lease.holder.clone();
                    election.participants.remove(&dead);
                }
                election.leader = None;
            } else if lease.holder != *ctx && !force {
                debug!(
                    "'{}' already led by {} with a valid lease",
                    db_name, lease.holder
                );
                return false;
            }
        }

        let lowest = election.participants.keys().next().cloned();
        if force || lowest.as_ref() == Some(ctx) {
            if force && lowest.as_ref() != Some(ctx) {
                info!("forced leadership takeover of '{}' by {}", db_name, ctx);
            }
            election.leader = Some(LeaseRecord {
                holder: ctx.clone(),
                claimed_at: now,
            });
            info!("{} claimed leadership of '{}'", ctx, db_name);
            self.changed.notify_all();
            true
        } else {
            debug!(
                "{} yields '{}' to lower id {:?}",
                ctx,
                db_name,
                lowest.as_ref().map(ContextId::as_str)
            );
            false
        }
    }

    /// Renew the lease if `ctx` still holds it. Returns false when the
    /// holder has been displaced, signalling its heartbeat to stop.
    pub fn heartbeat(&self, db_name: &str, ctx: &ContextId) -> bool {
        let now = now_millis();
        let mut inner = self.inner.lock();
        let Some(election) = inner.get_mut(db_name) else {
            return false;
        };
        match election.leader.as_mut() {
            Some(lease) if lease.holder == *ctx => {
                lease.claimed_at = now;
                // Renewal also keeps the holder's registration fresh so a
                // long-lived leader is never pruned from candidacy.
                election.participants.insert(ctx.clone(), now);
                true
            }
            _ => false,
        }
    }

    /// The context holding a currently-valid (unexpired) lease, if any.
    pub fn leader_of(&self, db_name: &str) -> Option<ContextId> {
        let now = now_millis();
        let inner = self.inner.lock();
        inner.get(db_name).and_then(|e| {
            e.leader.as_ref().and_then(|lease| {
                if now.saturating_sub(lease.claimed_at) <= self.config.lease_ms {
                    Some(lease.holder.clone())
                } else {
                    None
                }
            })
        })
    }

    /// Whether `ctx` holds a currently-valid lease for `db_name`.
    pub fn is_leader(&self, db_name: &str, ctx: &ContextId) -> bool {
        self.leader_of(db_name).as_ref() == Some(ctx)
    }

    /// Number of live registered participants for `db_name`.
    pub fn participant_count(&self, db_name: &str) -> usize {
        let inner = self.inner.lock();
        inner.get(db_name).map_or(0, |e| e.participants.len())
    }

    /// Wake every waiter blocked on registry changes.
    pub fn notify_all(&self) {
        self.changed.notify_all();
    }

    /// Park until the registry changes or `timeout` elapses.
    ///
    /// Callers re-check their condition in a loop; the timeout bounds the
    /// staleness of that check rather than signalling anything by itself.
    pub fn wait_changed(&self, timeout: Duration) {
        let mut inner = self.inner.lock();
        self.changed.wait_for(&mut inner, timeout);
    }
}
