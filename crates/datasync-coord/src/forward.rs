//! Forwarded writes from non-leader contexts.
//!
//! A follower that must not write directly can enqueue its statement for
//! the leader, which drains the queue in FIFO order, executes each request
//! under its own write permit, and posts an acknowledgment keyed by request
//! ID. Message types are serde-tagged so they survive a serialized channel
//! between contexts.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use datasync_types::now_millis;

/// A queued write awaiting execution by the leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Unique request ID used to match the acknowledgment.
    pub request_id: String,
    /// SQL statement to execute.
    pub sql: String,
    /// Database the statement targets.
    pub db_name: String,
    /// When the request was queued, millis since epoch.
    pub timestamp: u64,
}

/// Acknowledgment for a forwarded write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WriteResponse {
    Success {
        request_id: String,
        affected_rows: u64,
    },
    Error {
        request_id: String,
        error_message: String,
    },
}

impl WriteResponse {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Success { request_id, .. } | Self::Error { request_id, .. } => request_id,
        }
    }
}

/// Envelope for forwarded-write traffic.
///
/// Adjacently tagged so the payload's own tag (on [`WriteResponse`]) cannot
/// collide with the envelope's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WriteQueueMessage {
    WriteRequest(WriteRequest),
    WriteResponse(WriteResponse),
}

/// Shared FIFO of pending forwarded writes, one queue per database.
#[derive(Default)]
pub struct ForwardQueue {
    queues: Mutex<HashMap<String, VecDeque<WriteRequest>>>,
    responses: Mutex<HashMap<String, WriteResponse>>,
    next_seq: AtomicU64,
}

impl ForwardQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a statement for the leader of `db_name`. Returns the request ID.
    pub fn enqueue(&self, db_name: &str, sql: &str) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let request_id = format!("req_{:x}_{seq:04x}", now_millis());
        let request = WriteRequest {
            request_id: request_id.clone(),
            sql: sql.to_string(),
            db_name: db_name.to_string(),
            timestamp: now_millis(),
        };
        self.queues
            .lock()
            .entry(db_name.to_string())
            .or_default()
            .push_back(request);
        debug!("queued forwarded write {} for '{}'", request_id, db_name);
        request_id
    }

    /// Take every pending request for `db_name`, in submission order.
    pub fn drain(&self, db_name: &str) -> Vec<WriteRequest> {
        self.queues
            .lock()
            .get_mut(db_name)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Number of requests pending for `db_name`.
    pub fn pending(&self, db_name: &str) -> usize {
        self.queues.lock().get(db_name).map_or(0, VecDeque::len)
    }

    /// Record the leader's acknowledgment for a request.
    pub fn respond(&self, response: WriteResponse) {
        self.responses
            .lock()
            .insert(response.request_id().to_string(), response);
    }

    /// Take the acknowledgment for `request_id`, if the leader has produced
    /// one yet.
    pub fn take_response(&self, request_id: &str) -> Option<WriteResponse> {
        self.responses.lock().remove(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_submission_order() {
        let queue = ForwardQueue::new();
        let a = queue.enqueue("t.db", "INSERT INTO t VALUES (1)");
        let b = queue.enqueue("t.db", "INSERT INTO t VALUES (2)");
        let c = queue.enqueue("t.db", "INSERT INTO t VALUES (3)");
        queue.enqueue("other.db", "INSERT INTO x VALUES (9)");

        let drained = queue.drain("t.db");
        let ids: Vec<_> = drained.iter().map(|r| r.request_id.clone()).collect();
        assert_eq!(ids, vec![a, b, c]);
        assert_eq!(queue.pending("t.db"), 0);
        assert_eq!(queue.pending("other.db"), 1);
    }

    #[test]
    fn request_ids_are_unique() {
        let queue = ForwardQueue::new();
        let a = queue.enqueue("t.db", "DELETE FROM t");
        let b = queue.enqueue("t.db", "DELETE FROM t");
        assert_ne!(a, b);
    }

    #[test]
    fn responses_round_trip_by_request_id() {
        let queue = ForwardQueue::new();
        let id = queue.enqueue("t.db", "UPDATE t SET v = 1");
        assert!(queue.take_response(&id).is_none());

        queue.respond(WriteResponse::Success {
            request_id: id.clone(),
            affected_rows: 3,
        });
        let response = queue.take_response(&id).expect("response recorded");
        assert_eq!(
            response,
            WriteResponse::Success {
                request_id: id.clone(),
                affected_rows: 3,
            }
        );
        assert!(queue.take_response(&id).is_none(), "responses are one-shot");
    }

    #[test]
    fn message_envelope_serde_roundtrip() {
        let request = WriteRequest {
            request_id: "req_1_0001".to_string(),
            sql: "INSERT INTO t (v) VALUES ('x')".to_string(),
            db_name: "t.db".to_string(),
            timestamp: 123,
        };
        let message = WriteQueueMessage::WriteRequest(request.clone());
        let json = serde_json::to_string(&message).expect("serialize");
        assert!(json.contains(r#""type":"WriteRequest""#));
        let back: WriteQueueMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, WriteQueueMessage::WriteRequest(request));

        let error = WriteQueueMessage::WriteResponse(WriteResponse::Error {
            request_id: "req_1_0002".to_string(),
            error_message: "no such table".to_string(),
        });
        let json = serde_json::to_string(&error).expect("serialize");
        let back: WriteQueueMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, error);
    }
}
