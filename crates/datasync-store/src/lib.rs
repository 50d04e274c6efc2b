//! Durable store adapter: atomic persistence of database images.
//!
//! One durable record per database name, holding the full image bytes.
//! Saves are atomic from the reader's perspective: a concurrent load sees
//! either the previous image or the new one, never a torn mix. The memory
//! backend swaps a pointer under a short lock; the filesystem backend writes
//! to a temporary file and renames it into place.

mod fs;
mod memory;
mod traits;

pub use fs::FsStore;
pub use memory::MemoryStore;
pub use traits::{image_checksum, is_system_name, DurableStore};
