//! Defines the common API a buffer pool manager must provide for the index
//! to latch-couple against.
//!
//! A `BufferPool` hands out three kinds of scoped guard:
//!
//! - [`BasicPageGuard`]: pin only, no latch. Returned by `new_page` (the
//!   page isn't visible to any other thread yet) and by `fetch_basic`
//!   (debug walkers that don't care about concurrent mutation).
//! - [`ReadPageGuard`]: pin + shared latch.
//! - [`WritePageGuard`]: pin + exclusive latch.
//!
//! All three unpin (and, for the latched ones, unlatch) on `Drop`. Dropping
//! must be unconditional on every exit path; the index relies on this for
//! its crab-latching discipline.

use std::ops::{Deref, DerefMut};

/// A unique identifier for a page in the database.
pub type PageId = usize;

/// A constant to represent an invalid / absent page.
pub const INVALID_PAGE_ID: PageId = 0;

/// The size of a single page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// A specialized error type for buffer pool manager operations.
#[derive(Debug)]
pub enum BpmError {
    /// The pool is full and no unpinned frame could be evicted.
    NoFreeFrames,
    /// An I/O error surfaced by the disk manager.
    IoError(std::io::Error),
    /// `fetch_*` was asked for a page id the pool has never allocated.
    PageNotFound(PageId),
}

impl std::fmt::Display for BpmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BpmError::NoFreeFrames => write!(f, "buffer pool exhausted: no free frames"),
            BpmError::IoError(e) => write!(f, "disk I/O error: {e}"),
            BpmError::PageNotFound(id) => write!(f, "page {id} was never allocated"),
        }
    }
}

impl std::error::Error for BpmError {}

/// A pinned page with no latch held. Bytes are not reachable through this
/// guard; callers that need to read or write must go through
/// [`BufferPool::upgrade_write`] or re-fetch with a latched guard.
pub trait BasicPageGuard: Send {
    fn page_id(&self) -> PageId;
}

/// A pinned page with a shared (read) latch held for the guard's lifetime.
pub trait ReadPageGuard: Deref<Target = [u8]> + Send {
    fn page_id(&self) -> PageId;
}

/// A pinned page with an exclusive (write) latch held for the guard's
/// lifetime. Any mutation through `DerefMut` marks the page dirty.
pub trait WritePageGuard: Deref<Target = [u8]> + DerefMut + Send {
    fn page_id(&self) -> PageId;
}

/// The buffer pool contract consumed by the index (spec §6.1).
///
/// Object-safe by design: the index holds an `Arc<dyn BufferPool>` so it
/// never needs to be generic over a concrete pool implementation.
pub trait BufferPool: Send + Sync {
    /// Pins the page and acquires a shared latch.
    fn fetch_read(&self, page_id: PageId) -> Result<Box<dyn ReadPageGuard + '_>, BpmError>;

    /// Pins the page and acquires an exclusive latch.
    fn fetch_write(&self, page_id: PageId) -> Result<Box<dyn WritePageGuard + '_>, BpmError>;

    /// Allocates a fresh, zeroed page. Returned unlatched since no other
    /// thread can know its id yet.
    fn new_page(&self) -> Result<Box<dyn BasicPageGuard + '_>, BpmError>;

    /// Pins the page with no latch (debug walkers only).
    fn fetch_basic(&self, page_id: PageId) -> Result<Box<dyn BasicPageGuard + '_>, BpmError>;

    /// Promotes a [`BasicPageGuard`] to a [`WritePageGuard`]. The default
    /// implementation simply drops the basic guard (releasing its pin) and
    /// re-fetches with a write latch; this is correct because a brand-new
    /// page has no other observers until its id escapes to the tree above
    /// the header page, by which point it's already been through this call.
    fn upgrade_write<'a>(
        &'a self,
        guard: Box<dyn BasicPageGuard + 'a>,
    ) -> Result<Box<dyn WritePageGuard + 'a>, BpmError> {
        let page_id = guard.page_id();
        drop(guard);
        self.fetch_write(page_id)
    }

    /// Flushes a specific page to disk if dirty.
    fn flush_page(&self, page_id: PageId) -> Result<(), BpmError>;

    /// Flushes every dirty page to disk.
    fn flush_all_pages(&self) -> Result<(), BpmError>;
}
