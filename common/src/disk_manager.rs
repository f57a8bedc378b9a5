//! A minimal disk manager: fixed-size pages read/written at their natural
//! offset in a single backing file. This is plumbing for the one reference
//! `BufferPool` implementation. The disk manager itself is out of scope
//! for the index (spec §1).

use super::api::{PageId, PAGE_SIZE};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Manages reading and writing pages to a file on disk.
///
/// Uses positioned I/O (`read_at`/`write_at`) so that reads and writes on
/// distinct offsets don't need to serialize on a shared file cursor.
#[derive(Debug)]
pub struct DiskManager {
    db_file: File,
    next_page_id: AtomicUsize,
}

impl DiskManager {
    /// Opens (creating if necessary) a database file and recovers the next
    /// free page id from its current length.
    pub fn new<P: AsRef<Path>>(db_file_path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_file_path)?;
        let len = file.metadata()?.len();
        // Page id 0 is reserved as INVALID_PAGE_ID, so real pages start at 1.
        let next_page_id = ((len / PAGE_SIZE as u64) as usize).max(1);

        Ok(Self {
            db_file: file,
            next_page_id: AtomicUsize::new(next_page_id),
        })
    }

    /// Reads a page into `data`, which must be exactly `PAGE_SIZE` bytes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> io::Result<()> {
        let offset = (page_id * PAGE_SIZE) as u64;
        if offset + PAGE_SIZE as u64 > self.db_file.metadata()?.len() {
            // Page was allocated but never flushed; treat as all-zero.
            data.fill(0);
            return Ok(());
        }
        self.db_file.read_exact_at(data, offset)
    }

    /// Writes `data` (exactly `PAGE_SIZE` bytes) at the page's offset.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> io::Result<()> {
        let offset = (page_id * PAGE_SIZE) as u64;
        self.db_file.write_all_at(data, offset)
    }

    /// Allocates and returns the next page id.
    pub fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }
}
