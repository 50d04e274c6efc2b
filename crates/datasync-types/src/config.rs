//! Database and coordination configuration.

use serde::{Deserialize, Serialize};

/// Journal mode applied to the SQL execution surface.
///
/// `Memory` keeps the rollback journal in memory, which is the best default
/// for a browser-style deployment where durability comes from explicit
/// flushes to the durable store rather than from the journal itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JournalMode {
    #[default]
    Memory,
    Wal,
    Delete,
}

impl JournalMode {
    /// The pragma value for this mode.
    pub const fn as_pragma(self) -> &'static str {
        match self {
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }
}

/// Background flush policy for a database handle.
///
/// All fields disabled means flushing only happens through explicit `sync()`
/// and `export_to_file()` calls (and on close).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Flush on this interval from a background worker.
    pub interval_ms: Option<u64>,
    /// Flush after this many unflushed mutating statements.
    pub max_dirty: Option<u64>,
    /// After flushing, read the image back and verify its checksum.
    pub verify_after_write: bool,
}

impl SyncPolicy {
    /// Manual-only flushing.
    pub const fn manual() -> Self {
        Self {
            interval_ms: None,
            max_dirty: None,
            verify_after_write: false,
        }
    }
}

/// Per-handle database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database name; `.db` is appended if missing.
    pub name: String,
    /// Page cache size in pages.
    pub cache_size: Option<usize>,
    /// Page size in bytes; applied before the image is first written.
    pub page_size: Option<usize>,
    /// Whether incremental auto-vacuum is enabled.
    pub auto_vacuum: Option<bool>,
    /// Journal mode for the execution surface.
    pub journal_mode: JournalMode,
    /// Maximum image size allowed out of `export_to_file`.
    ///
    /// Export materializes the whole image in memory, so this guards the
    /// caller against runaway allocations. Default: 2 GiB.
    pub max_export_size_bytes: Option<u64>,
    /// Background flush policy.
    pub sync_policy: SyncPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "default.db".to_string(),
            cache_size: Some(10_000),
            page_size: Some(4096),
            auto_vacuum: Some(true),
            journal_mode: JournalMode::Memory,
            max_export_size_bytes: Some(2 * 1024 * 1024 * 1024),
            sync_policy: SyncPolicy::manual(),
        }
    }
}

impl DatabaseConfig {
    /// Config with the given name and defaults for everything else.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Timing knobs for the election and locking domains.
///
/// The defaults match the production cadence: 1 s heartbeats against a 5 s
/// lease, participant registrations expiring after 10 s, and a 100 ms sweep
/// for abandonment detection. Tests shrink these instead of sleeping for
/// real-world durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// How long a leader lease stays valid without renewal.
    pub lease_ms: u64,
    /// Heartbeat cadence for lease renewal.
    pub heartbeat_ms: u64,
    /// Participant registrations older than this are pruned during elections.
    pub participant_expiry_ms: u64,
    /// Poll interval for abandonment sweeps and cancellable waits.
    pub sweep_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            lease_ms: 5_000,
            heartbeat_ms: 1_000,
            participant_expiry_ms: 10_000,
            sweep_ms: 100,
        }
    }
}

impl CoordinationConfig {
    /// Compressed timing for tests: 200 ms lease, 50 ms heartbeat.
    pub const fn fast() -> Self {
        Self {
            lease_ms: 200,
            heartbeat_ms: 50,
            participant_expiry_ms: 1_000,
            sweep_ms: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_cadence() {
        let c = CoordinationConfig::default();
        assert_eq!(c.lease_ms, 5_000);
        assert_eq!(c.heartbeat_ms, 1_000);
        assert_eq!(c.participant_expiry_ms, 10_000);
        assert!(c.heartbeat_ms < c.lease_ms, "heartbeat must outpace the lease");
    }

    #[test]
    fn database_config_defaults() {
        let c = DatabaseConfig::default();
        assert_eq!(c.name, "default.db");
        assert_eq!(c.journal_mode, JournalMode::Memory);
        assert_eq!(c.max_export_size_bytes, Some(2 * 1024 * 1024 * 1024));
        assert!(c.sync_policy.interval_ms.is_none());
    }

    #[test]
    fn journal_mode_pragma_values() {
        assert_eq!(JournalMode::Memory.as_pragma(), "MEMORY");
        assert_eq!(JournalMode::Wal.as_pragma(), "WAL");
        assert_eq!(JournalMode::Delete.as_pragma(), "DELETE");
    }
}
