use thiserror::Error;

/// Primary error type for DataSync operations.
///
/// Structured variants for the coordination and persistence failure modes,
/// with stable string codes for callers that surface status messages.
#[derive(Error, Debug)]
pub enum DatasyncError {
    // === Handle lifecycle ===
    /// Operation attempted on a handle that is not open.
    #[error("database handle is not open: '{name}'")]
    NotOpened { name: String },

    /// Operation attempted on a handle that was invalidated by an import.
    ///
    /// Importing replaces the persisted image wholesale; the handle's schema
    /// and caches are stale afterwards and the handle must be reopened.
    #[error("handle for '{name}' was closed by import and must be reopened")]
    ImportRequiresReopen { name: String },

    // === Leadership / coordination ===
    /// Write attempted by a context that is not the current leader.
    #[error("only the leader context may write to '{name}'")]
    NotLeader { name: String },

    /// A blocking wait was cancelled because the owning context closed.
    #[error("cancelled while waiting for {what}")]
    Cancelled { what: String },

    /// A lock holder vanished without releasing; the broker reclaimed the
    /// lock. Internal: triggers automatic release, not surfaced to callers.
    #[error("lock '{lock}' was abandoned by its holder")]
    LockAbandoned { lock: String },

    // === Persistence ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying durable-store failure (quota, missing backend, ...).
    #[error("storage error: {detail}")]
    StorageIo { detail: String },

    /// Persisted image failed integrity verification.
    #[error("stored image for '{name}' is corrupt: {detail}")]
    Corrupt { name: String, detail: String },

    /// Bytes are not a valid SQLite database image.
    #[error("file is not a database: {detail}")]
    NotADatabase { detail: String },

    /// Database image exceeds the configured export ceiling.
    #[error("database size {size} exceeds export limit {max}")]
    ExportTooLarge { size: u64, max: u64 },

    // === SQL execution ===
    /// Error reported by the SQL execution surface.
    #[error("SQL error: {detail}")]
    Sql { detail: String },

    // === Internal ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl DatasyncError {
    /// Stable string code for this error, for status surfaces and logs.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotOpened { .. } => "NOT_OPENED",
            Self::ImportRequiresReopen { .. } => "IMPORT_REQUIRES_REOPEN",
            Self::NotLeader { .. } => "WRITE_PERMISSION_DENIED",
            Self::Cancelled { .. } => "CANCELLED",
            Self::LockAbandoned { .. } => "LOCK_ABANDONED",
            Self::Io(_) => "IO_ERROR",
            Self::StorageIo { .. } => "STORAGE_ERROR",
            Self::Corrupt { .. } => "CORRUPT",
            Self::NotADatabase { .. } => "INVALID_SQLITE_FILE",
            Self::ExportTooLarge { .. } => "EXPORT_TOO_LARGE",
            Self::Sql { .. } => "SQLITE_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether this is a transient condition that may succeed on retry.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::LockAbandoned { .. })
    }

    /// Whether the user can likely fix this without code changes.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotOpened { .. }
                | Self::ImportRequiresReopen { .. }
                | Self::NotLeader { .. }
                | Self::ExportTooLarge { .. }
                | Self::NotADatabase { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotLeader { .. } => Some(
                "Check leadership with is_leader(), wait with wait_for_leadership(), \
                 or enable allow_non_leader_writes(true) for single-context use",
            ),
            Self::ImportRequiresReopen { .. } => {
                Some("Reopen the database; import invalidates the previous handle")
            }
            Self::NotOpened { .. } => Some("Open the database before using the handle"),
            Self::ExportTooLarge { .. } => {
                Some("Raise max_export_size_bytes or reduce the database size")
            }
            Self::Corrupt { .. } => Some("Restore the database from a previous export"),
            _ => None,
        }
    }

    /// Create a storage error from any displayable detail.
    pub fn storage(detail: impl Into<String>) -> Self {
        Self::StorageIo {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `DatasyncError`.
pub type Result<T> = std::result::Result<T, DatasyncError>;
