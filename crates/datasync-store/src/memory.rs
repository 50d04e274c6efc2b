use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use datasync_error::{DatasyncError, Result};

use crate::traits::{image_checksum, is_system_name, DurableStore};

/// One stored image plus its integrity metadata.
#[derive(Clone)]
struct ImageRecord {
    bytes: Arc<Vec<u8>>,
    checksum: u64,
    version: u64,
}

/// In-memory durable store.
///
/// The backend for tests and single-process deployments. Atomicity comes
/// from building the complete record outside the lock and swapping it in
/// under a short critical section; readers clone the `Arc`, never the bytes.
#[derive(Default)]
pub struct MemoryStore {
    images: Mutex<BTreeMap<String, ImageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version counter for `name`, for tests asserting on overwrite counts.
    pub fn version(&self, name: &str) -> Option<u64> {
        self.images.lock().get(name).map(|r| r.version)
    }
}

impl DurableStore for MemoryStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let record = match self.images.lock().get(name) {
            Some(r) => r.clone(),
            None => return Ok(None),
        };
        if image_checksum(&record.bytes) != record.checksum {
            return Err(DatasyncError::Corrupt {
                name: name.to_string(),
                detail: "image checksum mismatch".to_string(),
            });
        }
        Ok(Some(record.bytes.as_ref().clone()))
    }

    fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let checksum = image_checksum(bytes);
        let bytes = Arc::new(bytes.to_vec());
        let mut images = self.images.lock();
        let version = images.get(name).map_or(1, |r| r.version + 1);
        images.insert(
            name.to_string(),
            ImageRecord {
                bytes,
                checksum,
                version,
            },
        );
        debug!("saved image '{}' version {}", name, version);
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        if self.images.lock().remove(name).is_some() {
            debug!("deleted image '{}'", name);
        }
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<String>> {
        Ok(self
            .images
            .lock()
            .keys()
            .filter(|n| !is_system_name(n))
            .cloned()
            .collect())
    }
}
