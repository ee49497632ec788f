//! The mutator-facing heap: picks a backend and forwards every public
//! operation to it.
//!
//! Mirrors `gc_runtime.c`'s `ensure_backend`/forwarding-function pattern,
//! but as inherent methods on a concrete, ownable type instead of
//! process-global state cached behind a lazily initialized vtable pointer.
//! A program may construct as many independent `GcHeap`s as it likes.

use std::ptr::NonNull;

use crate::backend::copying::CopyingBackend;
use crate::backend::generational::GenerationalBackend;
use crate::backend::mark_sweep::MarkSweepBackend;
use crate::backend::Backend;
use crate::config::{BackendKind, GcConfig};
use crate::object::{ManagedPtr, RootSlot, TraceFn};
use crate::snapshot::SnapshotEntry;
use crate::stats::GcStats;
use crate::tag::Tag;

/// A managed heap backed by one of three interchangeable collection
/// strategies (see [`crate::config::BackendKind`]).
///
/// Not `Sync` — every backend keeps its bookkeeping in `Cell`/`RefCell`
/// rather than behind a lock, since collection is always stop-the-world and
/// run by whichever thread calls into it. Sharing a single `GcHeap` across
/// threads is out of scope; give each thread its own.
pub struct GcHeap {
    backend: Box<dyn Backend>,
    config: GcConfig,
}

impl GcHeap {
    /// Construct a heap running the backend named by `config.backend`, with
    /// every size left unset falling back to that backend's default.
    pub fn new(config: GcConfig) -> Self {
        let backend: Box<dyn Backend> = match config.backend {
            BackendKind::MarkSweep => Box::new(MarkSweepBackend::new(&config)),
            BackendKind::Copying => Box::new(CopyingBackend::new(&config)),
            BackendKind::Generational => Box::new(GenerationalBackend::new(&config)),
        };
        Self { backend, config }
    }

    /// Construct a heap with the backend selected by the `GC_BACKEND`
    /// environment variable (see [`BackendKind::from_env`]) and every other
    /// setting at its default.
    pub fn from_env() -> Self {
        Self::new(GcConfig::from_env())
    }

    /// The configuration this heap was constructed with.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Allocate `size` bytes of zeroed, managed memory.
    ///
    /// Infallible: a backend that cannot satisfy the request even after
    /// collecting aborts the process (see [`crate::error::fatal`]) rather
    /// than returning an error.
    pub fn allocate(&self, size: usize) -> NonNull<u8> {
        self.backend.allocate(size, self)
    }

    /// Attach a trace procedure to `object`. A no-op if `object` is `None`.
    pub fn set_trace(&self, object: ManagedPtr, trace: TraceFn) {
        if let Some(obj) = object {
            self.backend.set_trace(obj, trace);
        }
    }

    /// Attach an advisory tag to `object`. A no-op if `object` is `None`.
    pub fn set_tag(&self, object: ManagedPtr, tag: Tag) {
        if let Some(obj) = object {
            self.backend.set_tag(obj, tag);
        }
    }

    /// Mark (and, under a moving backend, relocate) `ptr`, returning its
    /// current location. Trace procedures call this on every outgoing
    /// pointer field they discover and must write the result back into
    /// that field.
    pub fn mark_pointer(&self, ptr: ManagedPtr) -> ManagedPtr {
        self.backend.mark_pointer(ptr, self)
    }

    /// Register `slot` as a root: its current and future contents are
    /// treated as a live pointer at every collection until removed. A
    /// no-op if `slot` is null or already registered.
    pub fn add_root(&self, slot: RootSlot) {
        self.backend.add_root(slot);
    }

    /// Unregister a previously registered root slot. A no-op if `slot` is
    /// null or was never registered.
    pub fn remove_root(&self, slot: RootSlot) {
        self.backend.remove_root(slot);
    }

    /// Notify the heap that `child_slot`, a pointer field inside `parent`,
    /// was just written. Required after every managed pointer store into
    /// an existing object so the generational backend's remembered set
    /// stays correct; backends without generations ignore the call.
    pub fn write_barrier(&self, parent: ManagedPtr, child_slot: RootSlot) {
        if let Some(parent) = parent {
            self.backend.write_barrier(parent, child_slot);
        }
    }

    /// Run a full collection cycle now.
    pub fn collect(&self) {
        #[cfg(feature = "gc_logging")]
        tracing::debug!("starting collection cycle");

        self.backend.collect(self);

        #[cfg(feature = "gc_logging")]
        {
            let stats = self.backend.stats();
            tracing::info!(
                collections = stats.collections,
                current_bytes = stats.current_bytes,
                last_gc_pause_ms = stats.last_gc_pause_ms,
                "collection cycle complete"
            );
        }
    }

    /// Set the byte threshold that triggers an automatic collection.
    pub fn set_threshold(&self, bytes: usize) {
        self.backend.set_threshold(bytes);
    }

    /// Current byte threshold.
    pub fn get_threshold(&self) -> usize {
        self.backend.get_threshold()
    }

    /// A snapshot of cumulative counters and on-demand fragmentation
    /// metrics.
    pub fn get_stats(&self) -> GcStats {
        self.backend.stats()
    }

    /// Enumerate every currently live object.
    pub fn heap_snapshot(&self) -> Vec<SnapshotEntry> {
        self.backend.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_returns_zeroed_payload() {
        let heap = GcHeap::new(GcConfig::default());
        let ptr = heap.allocate(64);
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn unrooted_object_is_collected() {
        let heap = GcHeap::new(GcConfig::default());
        heap.allocate(128);
        heap.collect();
        let stats = heap.get_stats();
        assert_eq!(stats.current_bytes, 0);
    }

    #[test]
    fn rooted_object_survives_collection() {
        let heap = GcHeap::new(GcConfig::default());
        let ptr = heap.allocate(128);
        let mut slot: ManagedPtr = Some(ptr);
        heap.add_root(&mut slot as RootSlot);
        heap.collect();
        assert!(slot.is_some());
        heap.remove_root(&mut slot as RootSlot);
    }

    #[test]
    fn each_backend_kind_constructs() {
        for backend in [
            BackendKind::MarkSweep,
            BackendKind::Copying,
            BackendKind::Generational,
        ] {
            let heap = GcHeap::new(GcConfig {
                backend,
                ..Default::default()
            });
            let _ = heap.allocate(32);
        }
    }
}
