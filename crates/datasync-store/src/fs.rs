use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use datasync_error::{DatasyncError, Result};

use crate::traits::{image_checksum, is_system_name, DurableStore};

/// Filesystem-backed durable store: one file per database name.
///
/// Saves go through write-then-atomic-rename, so a reader opening the file
/// concurrently sees either the old image or the new one in full. Checksums
/// of the last written image are kept beside the store (not inside the
/// persisted bytes, which stay a bare SQLite image) and verified on load.
/// The checksum map's read/write lock also spans the file operation, so a
/// load never pairs a fresh image with a stale expected checksum.
pub struct FsStore {
    root: PathBuf,
    checksums: RwLock<HashMap<String, u64>>,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            checksums: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// The directory this store persists into.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DurableStore for FsStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let checksums = self.checksums.read();
        let bytes = match fs::read(self.path_for(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if let Some(expected) = checksums.get(name).copied() {
            let actual = image_checksum(&bytes);
            if actual != expected {
                return Err(DatasyncError::Corrupt {
                    name: name.to_string(),
                    detail: format!(
                        "image checksum mismatch: expected {expected:016x}, got {actual:016x}"
                    ),
                });
            }
        }
        Ok(Some(bytes))
    }

    fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let checksum = image_checksum(bytes);
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        let mut checksums = self.checksums.write();
        tmp.persist(self.path_for(name)).map_err(|e| {
            warn!("atomic rename failed for '{}': {}", name, e.error);
            DatasyncError::Io(e.error)
        })?;
        checksums.insert(name.to_string(), checksum);
        debug!("persisted image '{}' ({} bytes)", name, bytes.len());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let mut checksums = self.checksums.write();
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => debug!("deleted image '{}'", name),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        checksums.remove(name);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            // Dotfiles cover in-flight temp files from `save`.
            if !name.starts_with('.') && !is_system_name(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
