//! SQLite image header validation.
//!
//! Export and import both refuse to move bytes that do not begin with a
//! structurally valid SQLite header, so a torn or foreign blob is caught at
//! the boundary instead of corrupting the durable store.

use datasync_error::{DatasyncError, Result};

/// The 16-byte magic at the start of every SQLite database file.
pub const SQLITE_MAGIC: [u8; 16] = *b"SQLite format 3\0";

/// Size of the SQLite database header.
pub const SQLITE_HEADER_SIZE: usize = 100;

/// Byte offset of the big-endian u16 page size field.
const PAGE_SIZE_OFFSET: usize = 16;

/// Byte offset of the big-endian u32 page count field.
const PAGE_COUNT_OFFSET: usize = 28;

const MIN_PAGE_SIZE: usize = 512;
const MAX_PAGE_SIZE: usize = 65_536;

/// Metadata decoded from a SQLite image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteHeader {
    /// Page size in bytes (the on-disk value `1` decodes to 65536).
    pub page_size: usize,
    /// Number of pages in the image.
    pub page_count: u32,
}

/// Parse and validate the header of a SQLite image.
///
/// Checks the magic string, the page size (power of two in
/// `512..=65536`, with `1` meaning 65536), and decodes the page count.
pub fn parse_sqlite_header(data: &[u8]) -> Result<SqliteHeader> {
    if data.len() < SQLITE_HEADER_SIZE {
        return Err(DatasyncError::NotADatabase {
            detail: format!(
                "header too small: {} bytes (minimum {SQLITE_HEADER_SIZE} required)",
                data.len()
            ),
        });
    }

    if data[..16] != SQLITE_MAGIC {
        let magic = String::from_utf8_lossy(&data[..16]);
        return Err(DatasyncError::NotADatabase {
            detail: format!("expected 'SQLite format 3' magic, got '{magic}'"),
        });
    }

    let raw_page_size =
        u16::from_be_bytes([data[PAGE_SIZE_OFFSET], data[PAGE_SIZE_OFFSET + 1]]) as usize;
    // The header encodes 65536 as 1 because the field is only 16 bits wide.
    let page_size = if raw_page_size == 1 {
        MAX_PAGE_SIZE
    } else {
        raw_page_size
    };
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) || !page_size.is_power_of_two() {
        return Err(DatasyncError::NotADatabase {
            detail: format!("invalid page size {page_size}"),
        });
    }

    let page_count = u32::from_be_bytes([
        data[PAGE_COUNT_OFFSET],
        data[PAGE_COUNT_OFFSET + 1],
        data[PAGE_COUNT_OFFSET + 2],
        data[PAGE_COUNT_OFFSET + 3],
    ]);

    Ok(SqliteHeader {
        page_size,
        page_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header_with(page_size_raw: u16, page_count: u32) -> Vec<u8> {
        let mut data = vec![0_u8; SQLITE_HEADER_SIZE];
        data[..16].copy_from_slice(&SQLITE_MAGIC);
        data[PAGE_SIZE_OFFSET..PAGE_SIZE_OFFSET + 2].copy_from_slice(&page_size_raw.to_be_bytes());
        data[PAGE_COUNT_OFFSET..PAGE_COUNT_OFFSET + 4].copy_from_slice(&page_count.to_be_bytes());
        data
    }

    #[test]
    fn parses_valid_header() {
        let h = parse_sqlite_header(&header_with(4096, 12)).expect("valid header");
        assert_eq!(h.page_size, 4096);
        assert_eq!(h.page_count, 12);
    }

    #[test]
    fn page_size_one_means_64k() {
        let h = parse_sqlite_header(&header_with(1, 3)).expect("valid header");
        assert_eq!(h.page_size, 65_536);
    }

    #[test]
    fn rejects_short_input() {
        let err = parse_sqlite_header(&[0_u8; 50]).unwrap_err();
        assert_eq!(err.code(), "INVALID_SQLITE_FILE");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = header_with(4096, 1);
        data[0] = b'X';
        let err = parse_sqlite_header(&data).unwrap_err();
        assert_eq!(err.code(), "INVALID_SQLITE_FILE");
    }

    #[test]
    fn rejects_non_power_of_two_page_size() {
        let err = parse_sqlite_header(&header_with(4095, 1)).unwrap_err();
        assert_eq!(err.code(), "INVALID_SQLITE_FILE");
    }

    proptest! {
        #[test]
        fn valid_power_of_two_sizes_roundtrip(exp in 9_u32..=16, count in 0_u32..1_000_000) {
            let raw = if exp == 16 { 1_u16 } else { 1_u16 << exp };
            let h = parse_sqlite_header(&header_with(raw, count)).expect("valid header");
            prop_assert_eq!(h.page_size, 1_usize << exp);
            prop_assert_eq!(h.page_count, count);
        }

        #[test]
        fn random_garbage_is_rejected(data in proptest::collection::vec(any::<u8>(), 0..200)) {
            // Random bytes essentially never spell out the magic; if they do
            // not, parsing must fail rather than fabricate metadata.
            if data.len() < 16 || data[..16] != SQLITE_MAGIC {
                prop_assert!(parse_sqlite_header(&data).is_err());
            }
        }
    }
}
