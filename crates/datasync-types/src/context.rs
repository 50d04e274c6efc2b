//! Context identity for execution contexts sharing a database.
//!
//! Every tab, worker, or test harness instance that opens a database gets an
//! ephemeral [`ContextId`]. The encoding makes lexicographic order equal to
//! arrival order, which is what election tie-breaking sorts on.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Unique ephemeral identity of one execution context.
///
/// Encoded as `{millis:016x}_{rand:03x}`: a zero-padded creation timestamp
/// followed by a random disambiguator. Fixed-width hex means string order is
/// creation order, so "lowest ID wins" breaks election ties by arrival time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    /// Generate a fresh context identity.
    pub fn generate() -> Self {
        let millis = now_millis();
        let suffix: u16 = rand::random::<u16>() & 0x0fff;
        Self(format!("{millis:016x}_{suffix:03x}"))
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Leadership status of a context for one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadershipStatus {
    /// This context holds the current lease.
    Leader,
    /// Another context holds the current lease.
    Follower,
    /// No valid lease exists (election pending or no candidates).
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn context_id_format() {
        let id = ContextId::generate();
        let s = id.as_str();
        assert_eq!(s.len(), 16 + 1 + 3, "fixed-width encoding: {s}");
        let (ts, rest) = s.split_at(16);
        assert!(ts.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(&rest[..1], "_");
        assert!(rest[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn later_context_sorts_higher() {
        let a = ContextId::generate();
        thread::sleep(Duration::from_millis(3));
        let b = ContextId::generate();
        assert_ne!(a, b);
        assert!(a < b, "{a} should sort before {b}");
    }
}
