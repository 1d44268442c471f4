//! # Retention storage
//!
//! Averaged station records are persisted on a FAT formatted SD card (or any
//! other [`FileMedium`]) and kept for a bounded retention horizon.
//!
//! ## Layout
//!
//! History is sharded into one segment file per UTC day. Each segment is a
//! sequence of fixed 32-byte records sorted by timestamp, so appending the
//! newest record is a single write and pruning expired days is a file delete.
//!
//! ```text
//! /
//! ├── SEGMENTS.IDX   (postcard list of live segment days)
//! ├── D0019723.BIN   (records of day 19723, ascending)
//! ├── D0019724.BIN
//! └── CONFIG.BIN     (station configuration)
//! ```
//!
//! A record whose timestamp already exists is never written twice. A torn
//! trailing record left by a power cut is ignored by readers and dropped by
//! the next write to that segment. A torn index is rebuilt from the segment
//! files present on the medium.

pub mod cursor;
pub mod memory;
pub mod record;
pub mod sd_card;
pub mod store;

pub use cursor::{Cursor, QueryRange};
pub use memory::MemoryMedium;
pub use record::RECORD_SIZE;
pub use sd_card::SdCardMedium;
pub use store::{InsertOutcome, PruneReport, RetentionStore, SEGMENT_SECS};

use core::fmt::{Debug, Write};
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage medium unavailable")]
    Unavailable,
    #[error("Storage I/O failed: {0}")]
    Io(heapless::String<64>),
    #[error("Segment index is corrupt")]
    CorruptIndex,
}

impl StoreError {
    /// Wrap a medium specific error, keeping as much of its debug text as fits.
    pub fn io(details: impl Debug) -> Self {
        let mut text = heapless::String::new();
        // Truncated text is fine for a log line.
        let _ = write!(text, "{:?}", details);
        Self::Io(text)
    }
}

/// Minimal named-file storage used by the retention store and configuration
///
/// Implementations open and close the underlying file on every call, so no
/// handle outlives an operation.
pub trait FileMedium {
    /// Size of `name` in bytes, or `None` if it does not exist.
    fn size(&mut self, name: &str) -> Result<Option<u32>, StoreError>;

    /// Read from `offset` into `buf`, returning the number of bytes read.
    /// Reading a missing file or past its end reads zero bytes.
    fn read_at(&mut self, name: &str, offset: u32, buf: &mut [u8]) -> Result<usize, StoreError>;

    /// Append `bytes`, creating the file if needed.
    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Replace the whole content of `name`, creating it if needed.
    fn replace(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Delete `name`. Deleting a missing file succeeds.
    fn remove(&mut self, name: &str) -> Result<(), StoreError>;

    /// Call `f` with the name of every file on the medium.
    fn for_each_name(&mut self, f: &mut dyn FnMut(&str)) -> Result<(), StoreError>;
}
