//! Tracking global allocator
//!
//! Wraps the system allocator and counts allocation traffic. Releasing a block
//! of at least [`LARGE_BLOCK_BYTES`] counts as one collection cycle, and the
//! time spent inside the system `dealloc` for that block is recorded as the
//! cycle's pause. These counters are what `/gc-stats` reports.
//!
//! The binary installs the allocator with:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    alloc::{GlobalAlloc, Layout, System},
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use crate::error::StatsError;

/// Releases at or above this size count as a collection cycle
pub const LARGE_BLOCK_BYTES: usize = 1 << 20;

/// Number of recent pauses kept in the history ring
pub const PAUSE_HISTORY: usize = 256;

/// Source of collection statistics
pub trait MemoryManager: Send + Sync {
    /// Read a fresh snapshot. Never cached.
    fn collection_stats(&self) -> Result<CollectionStatistics, StatsError>;
}

/// Point-in-time view of the allocator counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStatistics {
    pub num_collections: u64,
    pub last_collection: Option<DateTime<Utc>>,
    pub pause_total_ns: u64,
    /// Most recent pauses, newest first
    pub pauses_ns: Vec<u64>,
    pub bytes_reclaimed: u64,
    pub bytes_allocated: u64,
    pub live_bytes: u64,
    pub allocations: u64,
    pub deallocations: u64,
}

impl fmt::Display for CollectionStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "num_collections: {}", self.num_collections)?;
        match self.last_collection {
            Some(at) => writeln!(f, "last_collection: {}", at.to_rfc3339())?,
            None => writeln!(f, "last_collection: never")?,
        }
        writeln!(f, "pause_total_ns: {}", self.pause_total_ns)?;
        write!(f, "pauses_ns: [")?;
        for (i, pause) in self.pauses_ns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{pause}")?;
        }
        writeln!(f, "]")?;
        writeln!(f, "bytes_reclaimed: {}", self.bytes_reclaimed)?;
        writeln!(f, "bytes_allocated: {}", self.bytes_allocated)?;
        writeln!(f, "live_bytes: {}", self.live_bytes)?;
        writeln!(f, "allocations: {}", self.allocations)?;
        writeln!(f, "deallocations: {}", self.deallocations)
    }
}

/// Counting wrapper around [`System`]
///
/// Must not allocate on any of its own paths; everything here is atomics and
/// clock reads.
#[derive(Debug)]
pub struct TrackingAllocator {
    allocations: AtomicU64,
    deallocations: AtomicU64,
    bytes_allocated: AtomicU64,
    bytes_reclaimed: AtomicU64,
    collections: AtomicU64,
    pause_total_ns: AtomicU64,
    last_collection_ns: AtomicU64,
    pauses: [AtomicU64; PAUSE_HISTORY],
}

impl TrackingAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            deallocations: AtomicU64::new(0),
            bytes_allocated: AtomicU64::new(0),
            bytes_reclaimed: AtomicU64::new(0),
            collections: AtomicU64::new(0),
            pause_total_ns: AtomicU64::new(0),
            last_collection_ns: AtomicU64::new(0),
            pauses: [const { AtomicU64::new(0) }; PAUSE_HISTORY],
        }
    }

    /// Bytes currently held by live allocations
    pub fn live_bytes(&self) -> u64 {
        let allocated = self.bytes_allocated.load(Ordering::Relaxed);
        let reclaimed = self.bytes_reclaimed.load(Ordering::Relaxed);
        allocated.saturating_sub(reclaimed)
    }

    /// Take a snapshot of every counter
    pub fn snapshot(&self) -> Result<CollectionStatistics, StatsError> {
        let allocations = self.allocations.load(Ordering::Relaxed);
        if allocations == 0 {
            return Err(StatsError::Inactive);
        }

        let num_collections = self.collections.load(Ordering::Relaxed);
        let kept = num_collections.min(PAUSE_HISTORY as u64);
        let pauses_ns = (0..kept)
            .map(|i| {
                let slot = (num_collections - 1 - i) % PAUSE_HISTORY as u64;
                self.pauses[slot as usize].load(Ordering::Relaxed)
            })
            .collect();

        let last_collection = match self.last_collection_ns.load(Ordering::Relaxed) {
            0 => None,
            ns => i64::try_from(ns).ok().map(DateTime::from_timestamp_nanos),
        };

        let bytes_allocated = self.bytes_allocated.load(Ordering::Relaxed);
        let bytes_reclaimed = self.bytes_reclaimed.load(Ordering::Relaxed);

        Ok(CollectionStatistics {
            num_collections,
            last_collection,
            pause_total_ns: self.pause_total_ns.load(Ordering::Relaxed),
            pauses_ns,
            bytes_reclaimed,
            bytes_allocated,
            live_bytes: bytes_allocated.saturating_sub(bytes_reclaimed),
            allocations,
            deallocations: self.deallocations.load(Ordering::Relaxed),
        })
    }

    fn record_alloc(&self, size: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated.fetch_add(size as u64, Ordering::Relaxed);
    }

    fn record_release(&self, size: usize) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_reclaimed.fetch_add(size as u64, Ordering::Relaxed);
    }

    fn record_collection(&self, pause_ns: u64) {
        let cycle = self.collections.fetch_add(1, Ordering::Relaxed);
        self.pauses[(cycle % PAUSE_HISTORY as u64) as usize].store(pause_ns, Ordering::Relaxed);
        self.pause_total_ns.fetch_add(pause_ns, Ordering::Relaxed);

        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        self.last_collection_ns.store(now_ns.max(1), Ordering::Relaxed);
    }
}

impl Default for TrackingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: every call is forwarded unchanged to `System`; the wrapper only
// updates atomics around it.
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            self.record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.size() >= LARGE_BLOCK_BYTES {
            let start = Instant::now();
            unsafe { System.dealloc(ptr, layout) };
            self.record_collection(start.elapsed().as_nanos() as u64);
        } else {
            unsafe { System.dealloc(ptr, layout) };
        }
        self.record_release(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            self.record_release(layout.size());
            self.record_alloc(new_size);
        }
        new_ptr
    }
}

impl MemoryManager for TrackingAllocator {
    fn collection_stats(&self) -> Result<CollectionStatistics, StatsError> {
        self.snapshot()
    }
}
