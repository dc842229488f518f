//! The process-wide arena table: a single growable, virtually-mapped
//! region of memory, partitioned into fixed-size pages and addressed by
//! 32-bit offsets (spec §3, §4.1).
//!
//! Real systems code (the teacher's `Pager`) reaches for `memmap2` to get a
//! platform mapping it can advise and grow; we do the same here, since the
//! arena's region really is what callers compare raw value bytes against
//! (see [`crate::layout`]). Node/subgraph bookkeeping, by contrast, lives
//! in ordinary owned Rust collections (see [`crate::graph::Graph`]) rather
//! than inside this mapping — generic, `Drop`-bearing Rust values cannot
//! be read back out of raw bytes the way plain-old-data value payloads
//! can. This split is recorded as a grounding decision in `DESIGN.md`.

use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::page::{PageId, PAGE_SIZE};
use crate::error::precondition_failure;

/// Largest offset the table will ever hand out. Spec invariant 1: every
/// non-nil `AttributeID`'s high bits must resolve below this.
pub const PTR_MAX_OFFSET: u32 = u32::MAX - (u32::MAX % PAGE_SIZE);

struct Region {
    mmap: memmap2::MmapMut,
    /// One bit per page: `true` if allocated to some zone.
    used: Vec<bool>,
    /// Which zone owns each allocated page. Parallel to `used`.
    owners: Vec<u32>,
    /// Rotating scan cursor for first-fit page allocation.
    cursor: usize,
}

impl Region {
    fn new(initial_pages: usize) -> Self {
        let capacity_bytes = (initial_pages.max(1)) * PAGE_SIZE as usize;
        let mmap = memmap2::MmapMut::map_anon(capacity_bytes)
            .unwrap_or_else(|e| precondition_failure(format!("failed to map arena region: {e}")));
        Self {
            mmap,
            used: vec![false; initial_pages.max(1)],
            owners: vec![0; initial_pages.max(1)],
            cursor: 1,
        }
    }

    fn page_count(&self) -> usize {
        self.used.len()
    }

    fn grow(&mut self) {
        let old_pages = self.page_count();
        let new_pages = (old_pages * 4).max(old_pages + 1);
        debug!(old_pages, new_pages, "growing arena region");
        let new_bytes = new_pages * PAGE_SIZE as usize;
        let mut new_mmap = memmap2::MmapMut::map_anon(new_bytes)
            .unwrap_or_else(|e| precondition_failure(format!("failed to grow arena region: {e}")));
        new_mmap[..self.mmap.len()].copy_from_slice(&self.mmap[..]);
        self.mmap = new_mmap;
        self.used.resize(new_pages, false);
        self.owners.resize(new_pages, 0);
    }
}

/// The singleton arena allocator. Obtain it via [`Table::global`].
pub struct Table {
    region: Mutex<Region>,
}

impl Table {
    fn new(initial_pages: usize) -> Self {
        Self {
            region: Mutex::new(Region::new(initial_pages)),
        }
    }

    /// The process-wide table. Spec §9 notes a per-graph table would also
    /// be conformant; we keep the process-wide singleton described in §3.
    pub fn global() -> &'static Table {
        static TABLE: OnceLock<Table> = OnceLock::new();
        TABLE.get_or_init(|| Table::new(64))
    }

    /// Trap if `offset` does not resolve to a valid, in-range location
    /// (spec §3 invariant 1).
    pub fn check_offset(&self, offset: u32) {
        if offset != 0 && offset >= PTR_MAX_OFFSET {
            precondition_failure(format!("attribute offset {offset} exceeds arena bounds"));
        }
    }

    /// Allocate `count` contiguous pages for `zone_id`, growing the region
    /// if no run of free pages is available.
    pub(crate) fn alloc_pages(&self, zone_id: u32, count: usize) -> Vec<PageId> {
        assert!(count > 0);
        let mut region = self.region.lock();
        loop {
            if let Some(start) = Self::find_free_run(&region.used, region.cursor, count) {
                for i in start..start + count {
                    region.used[i] = true;
                    region.owners[i] = zone_id;
                }
                region.cursor = (start + count) % region.page_count().max(1);
                trace!(zone_id, start, count, "allocated arena pages");
                return (start..start + count).map(|p| p as PageId).collect();
            }
            region.grow();
        }
    }

    fn find_free_run(used: &[bool], cursor: usize, count: usize) -> Option<usize> {
        let n = used.len();
        if n <= 1 {
            return None;
        }
        'outer: for start in (1..n).cycle().skip(cursor.saturating_sub(1)).take(n) {
            if start + count > n {
                continue;
            }
            for i in start..start + count {
                if used[i] {
                    continue 'outer;
                }
            }
            return Some(start);
        }
        None
    }

    /// Return pages to the free pool. With `unmap_reusable` the backing
    /// pages are advised `DONTNEED` so the OS can reclaim them immediately
    /// instead of keeping them resident for reuse.
    pub(crate) fn free_pages(&self, pages: &[PageId], unmap_reusable: bool) {
        let mut region = self.region.lock();
        for &p in pages {
            let idx = p as usize;
            if idx >= region.used.len() || !region.used[idx] {
                warn!(page = p, "freeing a page that was not marked in-use");
                continue;
            }
            region.used[idx] = false;
            region.owners[idx] = 0;
            if unmap_reusable {
                let start = idx * PAGE_SIZE as usize;
                let end = start + PAGE_SIZE as usize;
                if let Err(e) = region.mmap.advise_range(
                    memmap2::Advice::DontNeed,
                    start,
                    end - start,
                ) {
                    warn!(page = p, error = %e, "failed to advise page as reusable");
                }
            }
        }
    }

    /// Copy `len` bytes starting at `offset` out of the region.
    pub fn read(&self, offset: u32, len: usize) -> Vec<u8> {
        self.check_offset(offset);
        let region = self.region.lock();
        let start = offset as usize;
        region.mmap[start..start + len].to_vec()
    }

    /// Overwrite `len` bytes starting at `offset`.
    pub fn write(&self, offset: u32, bytes: &[u8]) {
        self.check_offset(offset);
        let mut region = self.region.lock();
        let start = offset as usize;
        region.mmap[start..start + bytes.len()].copy_from_slice(bytes);
    }

    #[cfg(test)]
    pub(crate) fn page_count(&self) -> usize {
        self.region.lock().page_count()
    }
}
