//! The pluggable collection strategy behind [`crate::heap::GcHeap`].
//!
//! The C original dispatches through a vtable of function pointers
//! (`GcBackend` in `examples/original_source/src/gc/gc_backend.h`); here the
//! same seam is a trait object. Every method takes `&self` — each
//! implementation manages its own interior mutability (`Cell`/`RefCell`)
//! rather than requiring `&mut self` through `GcHeap`, since trace callbacks
//! invoked deep inside `collect` need to call back into the heap (e.g.
//! `GcHeap::mark_pointer`) while the backend itself is still "borrowed".

use std::ptr::NonNull;

use crate::heap::GcHeap;
use crate::object::{ManagedPtr, RootSlot, TraceFn};
use crate::snapshot::SnapshotEntry;
use crate::stats::GcStats;
use crate::tag::Tag;

pub mod copying;
pub mod generational;
pub mod mark_sweep;

/// A tracing collection strategy.
///
/// Implementors own a heap's storage outright; `GcHeap` holds exactly one
/// `Box<dyn Backend>` and forwards every public operation to it.
pub trait Backend {
    /// Allocate `size` bytes, returning a zeroed payload pointer. Infallible
    /// from the caller's perspective: implementations that cannot satisfy
    /// the request after collecting must abort the process (see
    /// [`crate::error::fatal`]) rather than return an error.
    fn allocate(&self, size: usize, heap: &GcHeap) -> NonNull<u8>;

    /// Attach a trace procedure to the object at `object`. A no-op if
    /// `object`'s header cannot be found (never happens for a pointer this
    /// heap produced).
    fn set_trace(&self, object: NonNull<u8>, trace: TraceFn);

    /// Attach an advisory tag to the object at `object`.
    fn set_tag(&self, object: NonNull<u8>, tag: Tag);

    /// Mark (and, for a moving backend, relocate) the object `ptr` points
    /// to, returning its *current* location. `None` in, `None` out. Trace
    /// procedures call this on every outgoing pointer field and must write
    /// the result back into that field, exactly as the C original's
    /// `gc_mark_ptr` return value contract requires.
    fn mark_pointer(&self, ptr: ManagedPtr, heap: &GcHeap) -> ManagedPtr;

    /// Register a root slot — a mutator-owned memory location whose current
    /// contents must be treated as a live pointer at every collection.
    fn add_root(&self, slot: RootSlot);

    /// Unregister a previously registered root slot.
    fn remove_root(&self, slot: RootSlot);

    /// Record that `child_slot`, a pointer field inside `parent`, was just
    /// written. Backends without generations ignore this.
    fn write_barrier(&self, parent: NonNull<u8>, child_slot: RootSlot);

    /// Run a full collection cycle now.
    fn collect(&self, heap: &GcHeap);

    /// Set the byte threshold that triggers an automatic collection.
    fn set_threshold(&self, bytes: usize);

    /// Current byte threshold.
    fn get_threshold(&self) -> usize;

    /// A snapshot of cumulative counters and on-demand fragmentation
    /// metrics.
    fn stats(&self) -> GcStats;

    /// Enumerate every live object, for `GcHeap::heap_snapshot`.
    fn snapshot(&self) -> Vec<SnapshotEntry>;
}
