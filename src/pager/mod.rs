//! Page store: fixed-size page allocation, free list, and raw page I/O.
//!
//! Freed pages are threaded into a singly-linked list through their own first
//! eight bytes, rooted at the header's `free_head`. Allocation pops that list
//! before extending the file. There is no page cache; repeated reads of the
//! same page within one logical operation fetch it from storage again.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::io::{FileIo, StdFileIo};
use crate::types::{PageId, Result, SableError, PAGE_SIZE};

mod meta;

pub use meta::Meta;

/// First eight bytes of a freed page: the next page on the free list.
const NEXT_FREE: Range<usize> = 0..8;

/// Knobs for opening a table file.
#[derive(Clone, Copy, Debug)]
pub struct TableOptions {
    /// Fsync after every page write. Defaults to true, which is what gives
    /// each write its per-page durability; tests may turn it off for speed.
    pub sync_writes: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self { sync_writes: true }
    }
}

/// Synchronous page store over a single file.
pub struct Pager {
    io: Arc<dyn FileIo>,
    sync_writes: bool,
}

impl Pager {
    /// Opens `path`, creating the file and its header page if absent, or
    /// validating the existing header otherwise.
    pub fn open(path: impl AsRef<Path>, options: TableOptions) -> Result<Self> {
        let io = StdFileIo::open(path)?;
        let pager = Self {
            io: Arc::new(io),
            sync_writes: options.sync_writes,
        };
        if pager.io.len()? < PAGE_SIZE as u64 {
            pager.write_meta(&Meta::fresh())?;
            debug!(target: "sable::pager", "initialized fresh table file");
        } else {
            pager.meta()?;
        }
        Ok(pager)
    }

    /// Wraps an already-open I/O handle. The header page must exist.
    pub fn with_io(io: Arc<dyn FileIo>, options: TableOptions) -> Result<Self> {
        let pager = Self {
            io,
            sync_writes: options.sync_writes,
        };
        if pager.io.len()? < PAGE_SIZE as u64 {
            pager.write_meta(&Meta::fresh())?;
        } else {
            pager.meta()?;
        }
        Ok(pager)
    }

    /// Re-reads the header page from storage.
    pub fn meta(&self) -> Result<Meta> {
        let buf = self.read_page(PageId(0))?;
        Meta::decode(&buf)
    }

    /// Persists `meta` to the header page.
    pub fn write_meta(&self, meta: &Meta) -> Result<()> {
        let mut buf = vec![0u8; PAGE_SIZE];
        meta.encode(&mut buf)?;
        self.write_page(PageId(0), &buf)
    }

    /// Points the header at a new root page (null for an empty tree).
    pub fn set_root(&self, root: PageId) -> Result<()> {
        let mut meta = self.meta()?;
        meta.root = root;
        self.write_meta(&meta)
    }

    /// Allocates a page: pops the free list if non-empty, otherwise extends
    /// the file by bumping `page_count`. The header is persisted before the
    /// page id is handed out.
    pub fn alloc_page(&self) -> Result<PageId> {
        let mut meta = self.meta()?;
        if !meta.free_head.is_null() {
            let id = meta.free_head;
            let page = self.read_page(id)?;
            let next = PageId(u64::from_le_bytes(page[NEXT_FREE].try_into().unwrap()));
            if next.0 >= meta.page_count {
                return Err(SableError::Corruption("free list link out of range"));
            }
            meta.free_head = next;
            self.write_meta(&meta)?;
            trace!(target: "sable::pager", page = id.0, "reused freed page");
            return Ok(id);
        }
        let id = PageId(meta.page_count);
        meta.page_count += 1;
        self.write_meta(&meta)?;
        trace!(target: "sable::pager", page = id.0, "extended file by one page");
        Ok(id)
    }

    /// Pushes `id` onto the free list. The page's contents, aside from the
    /// next-free link, become garbage.
    pub fn free_page(&self, id: PageId) -> Result<()> {
        if id.is_null() {
            return Err(SableError::Invalid("cannot free the header page"));
        }
        let mut meta = self.meta()?;
        if id.0 >= meta.page_count {
            return Err(SableError::Invalid("cannot free an unallocated page"));
        }
        let mut page = self.read_page(id)?;
        page[NEXT_FREE].copy_from_slice(&meta.free_head.0.to_le_bytes());
        meta.free_head = id;
        // Link the page before publishing it as the head; a crash between
        // the two writes leaks the page instead of corrupting the list.
        self.write_page(id, &page)?;
        self.write_meta(&meta)?;
        trace!(target: "sable::pager", page = id.0, "freed page");
        Ok(())
    }

    /// Reads a whole page from storage.
    pub fn read_page(&self, id: PageId) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; PAGE_SIZE];
        self.io.read_at(id.0 * PAGE_SIZE as u64, &mut buf)?;
        Ok(buf)
    }

    /// Writes a whole page and, with `sync_writes`, makes it durable before
    /// returning.
    pub fn write_page(&self, id: PageId, buf: &[u8]) -> Result<()> {
        if buf.len() != PAGE_SIZE {
            return Err(SableError::Invalid("page buffer has wrong length"));
        }
        self.io.write_at(id.0 * PAGE_SIZE as u64, buf)?;
        if self.sync_writes {
            self.io.sync_all()?;
        }
        Ok(())
    }
}
