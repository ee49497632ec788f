//! Cumulative counters and on-demand fragmentation metrics.
//!
//! Mirrors `GcStats` in `examples/original_source/include/gc.h`, widened
//! with the diagnostics fields the spec's §4.7 names and the C backends
//! actually populate (`internal_stats`/`copy_stats`/`gc_stats` in the three
//! `.c` backends).

/// Snapshot of a heap's diagnostic counters, returned by
/// [`crate::heap::GcHeap::get_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GcStats {
    /// Number of collections performed (minor + major, for generational).
    pub collections: u64,
    /// Monotonically increasing total bytes ever allocated.
    pub allocated_bytes: u64,
    /// Monotonically increasing total bytes ever freed/reclaimed.
    pub freed_bytes: u64,
    /// Bytes of live payload currently on the heap.
    pub current_bytes: u64,
    /// Objects visited by the mark/scan phase, cumulative across collections.
    pub objects_scanned: u64,
    /// Objects relocated by a copying/minor collection, cumulative.
    pub objects_copied: u64,
    /// Objects promoted from nursery to old generation, cumulative.
    pub objects_promoted: u64,
    /// Fraction of scanned objects that survived the most recent cycle.
    pub survival_rate: f64,
    /// Pause time of the most recent collection, in milliseconds.
    pub last_gc_pause_ms: f64,
    /// Longest pause time observed so far, in milliseconds.
    pub max_gc_pause_ms: f64,
    /// Mean pause time across all collections, in milliseconds.
    pub avg_gc_pause_ms: f64,
    /// Sum of all pause times, in milliseconds.
    pub total_gc_time_ms: f64,
    /// Estimated bytes consumed by per-object header metadata.
    pub metadata_bytes: u64,

    // --- Fragmentation metrics (recomputed on demand by `get_stats`) ---
    /// Size of the single largest free block.
    pub largest_free_block: u64,
    /// Sum of all free block sizes.
    pub total_free_memory: u64,
    /// Number of distinct free blocks.
    pub free_blocks_count: u64,
    /// Mean free-block size.
    pub average_free_block_size: f64,
    /// `1 - largest/total`; `0` when the heap is fully free or fully live.
    pub fragmentation_index: f64,
    /// Maximum `fragmentation_index` observed across the heap's lifetime.
    pub peak_fragmentation_index: f64,
    /// Header and alignment padding summed across live objects.
    pub wasted_bytes: u64,
    /// `wasted / (current + wasted)`.
    pub internal_fragmentation_ratio: f64,
    /// `wasted / live_object_count`.
    pub average_padding_per_object: f64,
}

/// Externally visible free-block geometry, used by a backend to fold
/// fragmentation numbers into [`GcStats`] without duplicating the walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeGeometry {
    /// Size of the single largest free block encountered.
    pub largest_free_block: u64,
    /// Sum of every free block's size.
    pub total_free_memory: u64,
    /// Number of free blocks encountered.
    pub free_blocks_count: u64,
}

impl FreeGeometry {
    /// Fold this geometry (plus wasted-byte/live-object counts) into an
    /// existing [`GcStats`], updating the peak fragmentation index in
    /// place.
    pub fn apply(self, stats: &mut GcStats, wasted_bytes: u64, live_objects: u64) {
        stats.largest_free_block = self.largest_free_block;
        stats.total_free_memory = self.total_free_memory;
        stats.free_blocks_count = self.free_blocks_count;
        stats.average_free_block_size = if self.free_blocks_count > 0 {
            self.total_free_memory as f64 / self.free_blocks_count as f64
        } else {
            0.0
        };
        stats.fragmentation_index = if self.total_free_memory > 0 {
            1.0 - (self.largest_free_block as f64 / self.total_free_memory as f64)
        } else {
            0.0
        };
        if stats.fragmentation_index > stats.peak_fragmentation_index {
            stats.peak_fragmentation_index = stats.fragmentation_index;
        }

        stats.wasted_bytes = wasted_bytes;
        let total_allocated = stats.current_bytes + wasted_bytes;
        stats.internal_fragmentation_ratio = if total_allocated > 0 {
            wasted_bytes as f64 / total_allocated as f64
        } else {
            0.0
        };
        stats.average_padding_per_object = if live_objects > 0 {
            wasted_bytes as f64 / live_objects as f64
        } else {
            0.0
        };
    }
}

/// Bookkeeping for a single collection's pause-time statistics. A backend
/// calls [`PauseTimer::start`] before collecting and [`PauseTimer::finish`]
/// after, folding the elapsed time into a [`GcStats`].
pub struct PauseTimer {
    start_ms: f64,
}

impl PauseTimer {
    /// Start timing a collection using the given clock.
    pub fn start(clock: &dyn crate::clock::Clock) -> Self {
        Self {
            start_ms: clock.now_ms(),
        }
    }

    /// Finish timing, folding the elapsed pause into `stats`.
    pub fn finish(self, clock: &dyn crate::clock::Clock, stats: &mut GcStats) {
        let elapsed = (clock.now_ms() - self.start_ms).max(0.0);
        stats.last_gc_pause_ms = elapsed;
        stats.total_gc_time_ms += elapsed;
        if elapsed > stats.max_gc_pause_ms {
            stats.max_gc_pause_ms = elapsed;
        }
        if stats.collections > 0 {
            stats.avg_gc_pause_ms = stats.total_gc_time_ms / stats.collections as f64;
        }
    }
}
