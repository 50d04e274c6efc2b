use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness signal tied to one execution context's lifetime.
///
/// Clones share the underlying flag. The owning context revokes the token
/// when it closes (or the harness revokes it to simulate a crash); the
/// broker uses it to detect abandoned locks and to cancel parked waiters.
#[derive(Debug, Clone)]
pub struct LivenessToken {
    alive: Arc<AtomicBool>,
}

impl Default for LivenessToken {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessToken {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the owning context is still alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Mark the owning context as gone. Idempotent.
    pub fn revoke(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_alive_and_revokes() {
        let token = LivenessToken::new();
        assert!(token.is_alive());
        token.revoke();
        assert!(!token.is_alive());
        token.revoke();
        assert!(!token.is_alive());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = LivenessToken::new();
        let clone = token.clone();
        token.revoke();
        assert!(!clone.is_alive());
    }
}
