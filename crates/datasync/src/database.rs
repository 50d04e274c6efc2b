use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use datasync_broker::db_write_lock;
use datasync_coord::{WriteCoordinator, WriteResponse};
use datasync_election::{ChangeKind, DataChange, Participant};
use datasync_error::{DatasyncError, Result};
use datasync_store::image_checksum;
use datasync_types::{
    normalize_db_name, parse_sqlite_header, ColumnValue, DatabaseConfig, JournalMode,
    LeadershipStatus, QueryResult, Row,
};

use crate::auto_sync::AutoSyncWorker;
use crate::origin::Origin;
use crate::sql::{from_value_ref, is_write_statement, map_sql, run_pragma, to_sql_value};

const STATE_OPEN: u8 = 0;
const STATE_CLOSED: u8 = 1;
const STATE_CLOSED_BY_IMPORT: u8 = 2;

/// State shared between a handle and its background workers.
///
/// The working copy of the database lives in a per-context scratch file;
/// the durable store only ever sees complete flushed images.
pub(crate) struct DbShared {
    name: String,
    origin: Arc<Origin>,
    // Declared before `scratch` so the connection closes before the file is
    // removed on drop.
    conn: Mutex<Option<Connection>>,
    scratch: NamedTempFile,
    journal_mode: JournalMode,
    verify_after_write: bool,
    dirty_writes: AtomicU64,
    liveness: datasync_broker::LivenessToken,
}

impl DbShared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn dirty_writes(&self) -> &AtomicU64 {
        &self.dirty_writes
    }

    fn read_image(&self) -> Result<Vec<u8>> {
        Ok(fs::read(self.scratch.path())?)
    }

    /// Flush buffered state and persist the full image. The caller must
    /// hold the database's write lock.
    pub(crate) fn flush_to_store(&self) -> Result<()> {
        {
            let guard = self.conn.lock();
            let conn = guard.as_ref().ok_or_else(|| DatasyncError::NotOpened {
                name: self.name.clone(),
            })?;
            if self.journal_mode == JournalMode::Wal {
                run_pragma(conn, "PRAGMA wal_checkpoint(TRUNCATE)")?;
            }
        }
        let bytes = self.read_image()?;
        self.origin.store().save(&self.name, &bytes)?;
        if self.verify_after_write {
            let readback = self.origin.store().load(&self.name)?.unwrap_or_default();
            if image_checksum(&readback) != image_checksum(&bytes) {
                return Err(DatasyncError::Corrupt {
                    name: self.name.clone(),
                    detail: "verify-after-write readback mismatch".to_string(),
                });
            }
        }
        self.dirty_writes.store(0, Ordering::Release);
        debug!("flushed '{}' ({} bytes)", self.name, bytes.len());
        Ok(())
    }

    /// Acquire the write lock, flush, release. For paths that persist
    /// already-admitted data (auto-sync, close) and so skip the leader gate
    /// but never the serialization.
    pub(crate) fn locked_flush(&self) -> Result<()> {
        let mut guard = self
            .origin
            .broker()
            .acquire(&db_write_lock(&self.name), &self.liveness)?;
        let result = self.flush_to_store();
        guard.release();
        result
    }

    fn run_sql(&self, sql: &str, params: &[ColumnValue]) -> Result<QueryResult> {
        let started = Instant::now();
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(|| DatasyncError::NotOpened {
            name: self.name.clone(),
        })?;
        let mut stmt = conn.prepare(sql).map_err(map_sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let values: Vec<rusqlite::types::Value> = params.iter().map(to_sql_value).collect();

        let (rows, affected_rows, last_insert_id) = if columns.is_empty() {
            let affected = stmt.execute(params_from_iter(values)).map_err(map_sql)? as u64;
            (Vec::new(), affected, Some(conn.last_insert_rowid()))
        } else {
            let mut out = Vec::new();
            let mut rows = stmt.query(params_from_iter(values)).map_err(map_sql)?;
            while let Some(row) = rows.next().map_err(map_sql)? {
                let mut row_values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    row_values.push(from_value_ref(row.get_ref(i).map_err(map_sql)?));
                }
                out.push(Row { values: row_values });
            }
            (out, 0, None)
        };

        Ok(QueryResult {
            columns,
            rows,
            affected_rows,
            last_insert_id,
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

/// Per-context handle to one logical database.
///
/// The only surface callers touch: SQL execution, export/import, explicit
/// sync, and the leadership API. Mutating statements route through the
/// write coordinator; reads run directly against the context's working
/// copy. Safe to share across threads.
pub struct Database {
    shared: Arc<DbShared>,
    participant: Participant,
    coordinator: WriteCoordinator,
    config: DatabaseConfig,
    allow_non_leader_writes: AtomicBool,
    state: AtomicU8,
    auto_sync: Mutex<Option<AutoSyncWorker>>,
}

impl Database {
    /// Open against the process-wide default origin.
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        Self::open(&Origin::global(), config)
    }

    /// Open a database within a coordination domain.
    ///
    /// Registers with the election, hydrates the working copy from the
    /// durable store when an image exists, and registers a fresh database
    /// in the store immediately so listings see it before the first write.
    pub fn open(origin: &Arc<Origin>, config: DatabaseConfig) -> Result<Self> {
        let name = normalize_db_name(&config.name);
        info!("opening database '{}'", name);
        let participant = Participant::open(name.clone(), Arc::clone(origin.registry()));

        let scratch = tempfile::Builder::new()
            .prefix("datasync-")
            .suffix(".sqlite")
            .tempfile()?;
        let existing = origin.store().load(&name)?;
        if let Some(bytes) = &existing {
            fs::write(scratch.path(), bytes)?;
            debug!("hydrated '{}' from store ({} bytes)", name, bytes.len());
        }

        let conn = Connection::open(scratch.path()).map_err(map_sql)?;
        apply_config_pragmas(&conn, &config)?;

        let shared = Arc::new(DbShared {
            name,
            origin: Arc::clone(origin),
            conn: Mutex::new(Some(conn)),
            scratch,
            journal_mode: config.journal_mode,
            verify_after_write: config.sync_policy.verify_after_write,
            dirty_writes: AtomicU64::new(0),
            liveness: participant.liveness().clone(),
        });

        let database = Self {
            shared,
            participant,
            coordinator: WriteCoordinator::new(Arc::clone(origin.broker())),
            allow_non_leader_writes: AtomicBool::new(false),
            state: AtomicU8::new(STATE_OPEN),
            auto_sync: Mutex::new(None),
            config,
        };

        if existing.is_none() {
            database.shared.locked_flush()?;
        }
        if let Some(interval_ms) = database.config.sync_policy.interval_ms {
            *database.auto_sync.lock() = Some(AutoSyncWorker::start(
                Arc::clone(&database.shared),
                Duration::from_millis(interval_ms),
            ));
        }
        Ok(database)
    }

    /// The normalized database name.
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => Ok(()),
            STATE_CLOSED_BY_IMPORT => Err(DatasyncError::ImportRequiresReopen {
                name: self.shared.name.clone(),
            }),
            _ => Err(DatasyncError::NotOpened {
                name: self.shared.name.clone(),
            }),
        }
    }

    fn allows_non_leader_writes(&self) -> bool {
        self.allow_non_leader_writes.load(Ordering::Acquire)
    }

    fn publish_change(&self, kind: ChangeKind) {
        self.shared.origin.changes().publish(DataChange::new(
            &self.shared.name,
            kind,
            self.participant.context_id().as_str(),
        ));
    }

    /// Execute a SQL statement without parameters.
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.execute_with_params(sql, &[])
    }

    /// Execute a SQL statement with bound parameters.
    ///
    /// Mutating statements require the write permit: the caller must be
    /// leader or have enabled non-leader writes, and executions serialize
    /// FIFO behind the database's write lock. Reads run directly.
    pub fn execute_with_params(&self, sql: &str, params: &[ColumnValue]) -> Result<QueryResult> {
        self.ensure_open()?;
        if !is_write_statement(sql) {
            return self.shared.run_sql(sql, params);
        }

        let shared = Arc::clone(&self.shared);
        let result = self.coordinator.perform_exclusive(
            &self.participant,
            self.allows_non_leader_writes(),
            move || shared.run_sql(sql, params),
        )?;
        self.shared.dirty_writes.fetch_add(1, Ordering::AcqRel);
        self.publish_change(ChangeKind::Write);
        self.maybe_policy_flush()?;
        Ok(result)
    }

    fn maybe_policy_flush(&self) -> Result<()> {
        if let Some(max_dirty) = self.config.sync_policy.max_dirty {
            if self.shared.dirty_writes.load(Ordering::Acquire) >= max_dirty {
                self.shared.locked_flush()?;
            }
        }
        Ok(())
    }

    /// Flush buffered state to the durable store without a full export.
    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        let shared = Arc::clone(&self.shared);
        self.coordinator.perform_exclusive(
            &self.participant,
            self.allows_non_leader_writes(),
            move || shared.flush_to_store(),
        )
    }

    /// Produce the full database image.
    ///
    /// Conceptually a read, but it must flush buffered write-ahead state to
    /// yield a consistent image, so it takes the write permit like any
    /// mutation. Concurrent exports serialize FIFO and all succeed; the
    /// returned bytes always carry a valid SQLite header.
    pub fn export_to_file(&self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let shared = Arc::clone(&self.shared);
        let max_size = self.config.max_export_size_bytes;
        let bytes = self.coordinator.perform_exclusive(
            &self.participant,
            self.allows_non_leader_writes(),
            move || {
                shared.flush_to_store()?;
                let bytes = shared.read_image()?;
                if let Some(max) = max_size {
                    if bytes.len() as u64 > max {
                        return Err(DatasyncError::ExportTooLarge {
                            size: bytes.len() as u64,
                            max,
                        });
                    }
                }
                parse_sqlite_header(&bytes)?;
                Ok(bytes)
            },
        )?;
        info!("exported '{}' ({} bytes)", self.shared.name, bytes.len());
        Ok(bytes)
    }

    /// Replace the persisted image with `bytes` and invalidate this handle.
    ///
    /// The handle is closed on success: schema and caches describe the
    /// pre-import database, so post-import state is structurally a fresh
    /// handle. Subsequent calls return
    /// [`DatasyncError::ImportRequiresReopen`].
    pub fn import_from_file(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        parse_sqlite_header(bytes)?;
        let shared = Arc::clone(&self.shared);
        let image = bytes.to_vec();
        self.coordinator.perform_exclusive(
            &self.participant,
            self.allows_non_leader_writes(),
            move || shared.origin.store().save(&shared.name, &image),
        )?;
        info!(
            "imported {} bytes into '{}', handle must be reopened",
            bytes.len(),
            self.shared.name
        );
        self.publish_change(ChangeKind::Import);
        self.close_with_state(STATE_CLOSED_BY_IMPORT);
        Ok(())
    }

    /// Whether this context currently leads its database's election.
    pub fn is_leader(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_OPEN && self.participant.is_leader()
    }

    /// Non-blocking leadership status.
    pub fn leadership_status(&self) -> LeadershipStatus {
        self.participant.status()
    }

    /// Suspend until this context becomes leader. Cancelled by `close`.
    pub fn wait_for_leadership(&self) -> Result<()> {
        self.ensure_open()?;
        self.participant.wait_for_leadership().map_err(|e| match e {
            DatasyncError::Cancelled { .. } => DatasyncError::NotOpened {
                name: self.shared.name.clone(),
            },
            other => other,
        })
    }

    /// Force a re-election in this context's favor.
    ///
    /// Waits out any in-flight exclusive operation of the current leader
    /// before the new lease is confirmed, so the handover never tears a
    /// write or an export.
    pub fn request_leadership(&self) -> Result<()> {
        self.ensure_open()?;
        self.participant.request_leadership(self.coordinator.broker())
    }

    /// Relax the write path for this handle: any context may take the write
    /// permit, still serialized FIFO by the lock broker.
    pub fn allow_non_leader_writes(&self, allow: bool) {
        self.allow_non_leader_writes.store(allow, Ordering::Release);
    }

    /// Queue a mutating statement for the leader to execute. Returns the
    /// request ID to poll with [`take_forward_response`].
    ///
    /// [`take_forward_response`]: Database::take_forward_response
    pub fn forward_write(&self, sql: &str) -> Result<String> {
        self.ensure_open()?;
        Ok(self
            .shared
            .origin
            .forwards()
            .enqueue(&self.shared.name, sql))
    }

    /// As leader, drain and execute every queued forwarded write, posting
    /// an acknowledgment per request. Returns how many were processed.
    pub fn process_forwarded_writes(&self) -> Result<usize> {
        self.ensure_open()?;
        if !self.participant.is_leader() {
            return Err(DatasyncError::NotLeader {
                name: self.shared.name.clone(),
            });
        }
        let requests = self.shared.origin.forwards().drain(&self.shared.name);
        let count = requests.len();
        for request in requests {
            let response = match self.execute(&request.sql) {
                Ok(result) => WriteResponse::Success {
                    request_id: request.request_id,
                    affected_rows: result.affected_rows,
                },
                Err(e) => WriteResponse::Error {
                    request_id: request.request_id,
                    error_message: e.to_string(),
                },
            };
            self.shared.origin.forwards().respond(response);
        }
        Ok(count)
    }

    /// Take the leader's acknowledgment for a forwarded write, if present.
    pub fn take_forward_response(&self, request_id: &str) -> Option<WriteResponse> {
        self.shared.origin.forwards().take_response(request_id)
    }

    /// Close the handle: flush dirty state, leave the election, release
    /// every lock and lease held by this context. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.state.load(Ordering::Acquire) != STATE_OPEN {
            return Ok(());
        }
        if self.shared.dirty_writes.load(Ordering::Acquire) > 0 {
            if let Err(e) = self.shared.locked_flush() {
                warn!("flush on close of '{}' failed: {}", self.shared.name, e);
            }
        }
        self.close_with_state(STATE_CLOSED);
        Ok(())
    }

    fn close_with_state(&self, target: u8) {
        if self
            .state
            .compare_exchange(STATE_OPEN, target, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        // Stop the worker before revoking liveness so its in-flight flush
        // finishes cleanly.
        drop(self.auto_sync.lock().take());
        self.participant.close();
        drop(self.shared.conn.lock().take());
        info!("closed '{}'", self.shared.name);
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn apply_config_pragmas(conn: &Connection, config: &DatabaseConfig) -> Result<()> {
    if let Some(page_size) = config.page_size {
        run_pragma(conn, &format!("PRAGMA page_size = {page_size}"))?;
    }
    run_pragma(
        conn,
        &format!("PRAGMA journal_mode = {}", config.journal_mode.as_pragma()),
    )?;
    if let Some(cache_size) = config.cache_size {
        run_pragma(conn, &format!("PRAGMA cache_size = {cache_size}"))?;
    }
    if let Some(auto_vacuum) = config.auto_vacuum {
        let mode = if auto_vacuum { "FULL" } else { "NONE" };
        run_pragma(conn, &format!("PRAGMA auto_vacuum = {mode}"))?;
    }
    Ok(())
}
