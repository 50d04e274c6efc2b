use datasync_error::Result;

/// Opaque persistent blob storage keyed by database name.
///
/// Implementations must be safe under true cross-context concurrency: any
/// number of contexts may call `load` while one calls `save`. Nothing outside
/// the store touches the persisted bytes directly.
pub trait DurableStore: Send + Sync {
    /// Load the image for `name`, or `None` if no record exists.
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Atomically replace the image for `name`.
    fn save(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Remove the record for `name`. Removing a missing record is a no-op.
    fn delete(&self, name: &str) -> Result<()>;

    /// All stored database names, ascending, excluding system-prefixed names.
    fn list_all(&self) -> Result<Vec<String>>;
}

/// Whether a record name is internal and must be hidden from listings.
pub fn is_system_name(name: &str) -> bool {
    name.starts_with("sqlite_") || name.starts_with("__")
}

/// Checksum used to verify image integrity across save/load.
pub fn image_checksum(bytes: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_names_are_filtered() {
        assert!(is_system_name("sqlite_sequence"));
        assert!(is_system_name("__meta"));
        assert!(!is_system_name("app.db"));
        assert!(!is_system_name("_single_underscore.db"));
    }

    #[test]
    fn checksum_distinguishes_images() {
        assert_eq!(image_checksum(b"abc"), image_checksum(b"abc"));
        assert_ne!(image_checksum(b"abc"), image_checksum(b"abd"));
    }
}
