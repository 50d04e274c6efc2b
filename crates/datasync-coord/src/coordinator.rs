use std::sync::Arc;

use tracing::debug;

use datasync_broker::{db_write_lock, LockBroker};
use datasync_election::Participant;
use datasync_error::{DatasyncError, Result};

/// Serializes mutating operations against one database.
///
/// Cheap to clone per handle; all state lives in the shared broker.
#[derive(Clone)]
pub struct WriteCoordinator {
    broker: Arc<LockBroker>,
}

impl WriteCoordinator {
    pub fn new(broker: Arc<LockBroker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<LockBroker> {
        &self.broker
    }

    /// Run `operation` as the single in-flight exclusive operation for the
    /// participant's database.
    ///
    /// The caller must be the current leader unless `allow_non_leader` is
    /// set, in which case any context may queue; either way the write lock
    /// is granted FIFO and released unconditionally, success or failure. A
    /// context that is neither leader nor permitted fails fast with
    /// [`DatasyncError::NotLeader`] rather than queuing forever.
    pub fn perform_exclusive<T>(
        &self,
        participant: &Participant,
        allow_non_leader: bool,
        operation: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let db_name = participant.db_name();
        if !allow_non_leader && !participant.is_leader() {
            debug!(
                "rejecting exclusive operation on '{}' from non-leader {}",
                db_name,
                participant.context_id()
            );
            return Err(DatasyncError::NotLeader {
                name: db_name.to_string(),
            });
        }

        let mut guard = self
            .broker
            .acquire(&db_write_lock(db_name), participant.liveness())?;
        let result = operation();
        guard.release();
        result
    }
}
