use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::info;

use datasync_broker::LockBroker;
use datasync_coord::ForwardQueue;
use datasync_election::{ChangeBus, ChangeKind, DataChange, ElectionRegistry};
use datasync_error::Result;
use datasync_store::{DurableStore, MemoryStore};
use datasync_types::{normalize_db_name, CoordinationConfig};

/// One coordination domain: the shared state every context of the same
/// "origin" sees.
///
/// Bundles the durable store, the lock broker, the election registry, the
/// change bus, and the forwarded-write queue. Handles opened against the
/// same `Origin` coordinate with each other; handles on different origins
/// are fully isolated (which is what tests rely on).
pub struct Origin {
    store: Arc<dyn DurableStore>,
    broker: Arc<LockBroker>,
    registry: Arc<ElectionRegistry>,
    changes: Arc<ChangeBus>,
    forwards: Arc<ForwardQueue>,
}

impl Origin {
    /// Origin with an in-memory store and production timing.
    pub fn new() -> Arc<Self> {
        Self::with_config(CoordinationConfig::default())
    }

    /// Origin with an in-memory store and custom timing.
    pub fn with_config(config: CoordinationConfig) -> Arc<Self> {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    /// Origin over a caller-provided durable store.
    pub fn with_store(store: Arc<dyn DurableStore>, config: CoordinationConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            broker: Arc::new(LockBroker::with_sweep_interval(Duration::from_millis(
                config.sweep_ms,
            ))),
            registry: Arc::new(ElectionRegistry::new(config)),
            changes: Arc::new(ChangeBus::new()),
            forwards: Arc::new(ForwardQueue::new()),
        })
    }

    /// The process-wide default origin.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<Origin>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(Self::new))
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    pub fn broker(&self) -> &Arc<LockBroker> {
        &self.broker
    }

    pub fn registry(&self) -> &Arc<ElectionRegistry> {
        &self.registry
    }

    pub fn changes(&self) -> &Arc<ChangeBus> {
        &self.changes
    }

    pub fn forwards(&self) -> &Arc<ForwardQueue> {
        &self.forwards
    }

    /// Names of all stored databases, ascending, excluding system names.
    pub fn get_all_databases(&self) -> Result<Vec<String>> {
        self.store.list_all()
    }

    /// Remove a database's persisted image. Idempotent.
    pub fn delete_database(&self, name: &str) -> Result<()> {
        let name = normalize_db_name(name);
        self.store.delete(&name)?;
        info!("deleted database '{}'", name);
        self.changes
            .publish(DataChange::new(&name, ChangeKind::Delete, "origin"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_isolated() {
        let a = Origin::with_config(CoordinationConfig::fast());
        let b = Origin::with_config(CoordinationConfig::fast());
        a.store().save("only-in-a.db", b"x").expect("save");
        assert_eq!(a.get_all_databases().expect("list"), vec!["only-in-a.db"]);
        assert!(b.get_all_databases().expect("list").is_empty());
    }

    #[test]
    fn delete_normalizes_the_name() {
        let origin = Origin::with_config(CoordinationConfig::fast());
        origin.store().save("gone.db", b"x").expect("save");
        origin.delete_database("gone").expect("delete");
        assert!(origin.get_all_databases().expect("list").is_empty());
    }

    #[test]
    fn global_origin_is_shared() {
        let a = Origin::global();
        let b = Origin::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
