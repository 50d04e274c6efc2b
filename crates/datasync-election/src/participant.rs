use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use datasync_broker::{db_write_lock, LivenessToken, LockBroker};
use datasync_error::{DatasyncError, Result};
use datasync_types::{ContextId, LeadershipStatus};

use crate::heartbeat::HeartbeatHandle;
use crate::registry::ElectionRegistry;

/// One execution context's membership in a database's election.
///
/// Owns this context's lease claim attempts, its liveness token, and its
/// heartbeat; never touches registry state except through the registry API.
pub struct Participant {
    db_name: String,
    ctx: ContextId,
    registry: Arc<ElectionRegistry>,
    liveness: LivenessToken,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
    closed: AtomicBool,
}

impl Participant {
    /// Register with the election for `db_name` and attempt an initial claim.
    pub fn open(db_name: impl Into<String>, registry: Arc<ElectionRegistry>) -> Self {
        let db_name = db_name.into();
        let ctx = ContextId::generate();
        debug!("context {} opening '{}'", ctx, db_name);
        registry.register(&db_name, &ctx);
        let participant = Self {
            db_name,
            ctx,
            registry,
            liveness: LivenessToken::new(),
            heartbeat: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        if participant
            .registry
            .try_claim(&participant.db_name, &participant.ctx, false)
        {
            participant.start_heartbeat();
        }
        participant
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn context_id(&self) -> &ContextId {
        &self.ctx
    }

    /// Liveness signal for this context, consumed by the lock broker.
    pub fn liveness(&self) -> &LivenessToken {
        &self.liveness
    }

    /// Whether this context currently holds a valid lease.
    ///
    /// When no valid lease exists (vacant or expired), this opportunistically
    /// runs an election round, so a follower polling `is_leader` takes over
    /// from a crashed leader within the lease window.
    pub fn is_leader(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if self.registry.is_leader(&self.db_name, &self.ctx) {
            return true;
        }
        if self.registry.leader_of(&self.db_name).is_none()
            && self.registry.try_claim(&self.db_name, &self.ctx, false)
        {
            self.start_heartbeat();
            return true;
        }
        false
    }

    /// Non-blocking view of this context's leadership status.
    pub fn status(&self) -> LeadershipStatus {
        if self.closed.load(Ordering::Acquire) {
            return LeadershipStatus::Unknown;
        }
        match self.registry.leader_of(&self.db_name) {
            Some(holder) if holder == self.ctx => LeadershipStatus::Leader,
            Some(_) => LeadershipStatus::Follower,
            None => LeadershipStatus::Unknown,
        }
    }

    /// Suspend until this context becomes leader.
    ///
    /// Woken by registry changes and bounded by the sweep interval, so a
    /// leader departure is observed promptly. Cancelled by [`close`], in
    /// which case the pending waiter is released with an error instead of
    /// leaking.
    ///
    /// [`close`]: Participant::close
    pub fn wait_for_leadership(&self) -> Result<()> {
        let sweep = Duration::from_millis(self.registry.config().sweep_ms);
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(DatasyncError::Cancelled {
                    what: format!("leadership of '{}'", self.db_name),
                });
            }
            if self.is_leader() {
                return Ok(());
            }
            self.registry.wait_changed(sweep);
        }
    }

    /// Force a re-election in this context's favor, without torn writes.
    ///
    /// The handover is ordered behind the database's write lock: any
    /// in-flight exclusive operation of the current leader completes before
    /// the new lease is confirmed.
    pub fn request_leadership(&self, broker: &LockBroker) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatasyncError::Cancelled {
                what: format!("leadership of '{}'", self.db_name),
            });
        }
        if self.is_leader() {
            return Ok(());
        }
        info!("{} requesting leadership of '{}'", self.ctx, self.db_name);
        let mut guard = broker.acquire(&db_write_lock(&self.db_name), &self.liveness)?;
        self.registry.try_claim(&self.db_name, &self.ctx, true);
        self.start_heartbeat();
        guard.release();
        Ok(())
    }

    fn start_heartbeat(&self) {
        let mut slot = self.heartbeat.lock();
        if slot.as_ref().is_some_and(HeartbeatHandle::is_running) {
            return;
        }
        let interval = Duration::from_millis(self.registry.config().heartbeat_ms);
        *slot = Some(HeartbeatHandle::start(
            Arc::clone(&self.registry),
            self.db_name.clone(),
            self.ctx.clone(),
            interval,
        ));
    }

    /// Leave the election: stop the heartbeat, revoke liveness, deregister.
    ///
    /// Idempotent. Any thread parked in [`wait_for_leadership`] is woken and
    /// returns an error.
    ///
    /// [`wait_for_leadership`]: Participant::wait_for_leadership
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("context {} closing '{}'", self.ctx, self.db_name);
        if let Some(mut hb) = self.heartbeat.lock().take() {
            hb.stop();
        }
        self.liveness.revoke();
        self.registry.deregister(&self.db_name, &self.ctx);
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.close();
    }
}
