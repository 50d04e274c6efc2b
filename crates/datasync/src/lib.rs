//! DataSync: multi-context SQLite coordination.
//!
//! A single logical database may be opened from several independent
//! execution contexts (tabs, workers, threads) at once. This crate bundles
//! the pieces that make that safe: leader election with leases, a FIFO lock
//! broker with abandonment recovery, serialized exclusive writes, and an
//! atomically-updated durable image store. The [`Database`] handle is the
//! only surface a caller touches.
//!
//! ```no_run
//! use datasync::{Database, DatabaseConfig};
//!
//! # fn main() -> datasync::Result<()> {
//! let db = Database::new(DatabaseConfig::named("notes"))?;
//! db.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")?;
//! db.execute("INSERT INTO notes (body) VALUES ('hello')")?;
//! let image = db.export_to_file()?;
//! assert!(image.starts_with(b"SQLite format 3\0"));
//! db.close()?;
//! # Ok(())
//! # }
//! ```

mod auto_sync;
mod database;
mod origin;
mod sql;

pub use database::Database;
pub use origin::Origin;

pub use datasync_broker::{db_write_lock, LivenessToken, LockBroker};
pub use datasync_coord::{
    ForwardQueue, WriteCoordinator, WriteQueueMessage, WriteRequest, WriteResponse,
};
pub use datasync_election::{ChangeBus, ChangeKind, DataChange, ElectionRegistry, Participant};
pub use datasync_error::{DatasyncError, Result};
pub use datasync_store::{DurableStore, FsStore, MemoryStore};
pub use datasync_types::{
    normalize_db_name, parse_sqlite_header, ColumnValue, CoordinationConfig, DatabaseConfig,
    JournalMode, LeadershipStatus, QueryResult, Row, SqliteHeader, SyncPolicy, SQLITE_MAGIC,
};

/// Names of all databases in the process-wide default origin.
pub fn get_all_databases() -> Result<Vec<String>> {
    Origin::global().get_all_databases()
}

/// Delete a database from the process-wide default origin.
pub fn delete_database(name: &str) -> Result<()> {
    Origin::global().delete_database(name)
}
