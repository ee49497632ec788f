//! Mark-sweep over a single free-list arena.
//!
//! Grounded directly on `examples/original_source/src/gc/mark_sweep.c`: a
//! fixed-size arena (default 4MiB), a doubly-linked list of live objects, a
//! recursive mark from roots, then a sweep that returns dead blocks to the
//! shared [`crate::freelist::FreeListHeap`] and grows the collection
//! threshold by `GROWTH_FACTOR` when the heap is still nearly full after
//! collecting.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use crate::backend::Backend;
use crate::clock::{Clock, SystemClock};
use crate::config::GcConfig;
use crate::error::fatal;
use crate::freelist::FreeListHeap;
use crate::heap::GcHeap;
use crate::object::{align_up, header_of, payload_of, ManagedPtr, RootSlot, TraceFn};
use crate::roots::RootTable;
use crate::snapshot::SnapshotEntry;
use crate::stats::{GcStats, PauseTimer};
use crate::tag::{Generation, Tag};

/// Matches the C original's `GC_GROWTH_FACTOR`.
const GROWTH_FACTOR: f64 = 1.5;
/// Re-grow the threshold once live bytes exceed this fraction of it.
const GROW_WATERMARK: f64 = 0.75;

#[repr(C)]
struct MsHeader {
    block_size: usize,
    payload_size: usize,
    trace: Option<TraceFn>,
    tag: Tag,
    marked: bool,
    prev: *mut MsHeader,
    next: *mut MsHeader,
}

/// A single free-list arena, collected by mark-and-sweep.
pub struct MarkSweepBackend {
    arena: RefCell<FreeListHeap>,
    live_head: Cell<*mut MsHeader>,
    live_count: Cell<usize>,
    live_bytes: Cell<usize>,
    roots: RefCell<RootTable>,
    threshold: Cell<usize>,
    stats: RefCell<GcStats>,
    clock: Box<dyn Clock>,
    collecting: Cell<bool>,
}

impl MarkSweepBackend {
    /// Build a backend with a fresh arena sized per `config`.
    pub fn new(config: &GcConfig) -> Self {
        Self {
            arena: RefCell::new(FreeListHeap::new(config.heap_size())),
            live_head: Cell::new(std::ptr::null_mut()),
            live_count: Cell::new(0),
            live_bytes: Cell::new(0),
            roots: RefCell::new(RootTable::new()),
            threshold: Cell::new(config.resolved_threshold()),
            stats: RefCell::new(GcStats::default()),
            clock: Box::new(SystemClock::default()),
            collecting: Cell::new(false),
        }
    }

    fn unlink_all_as_unmarked(&self) {
        let mut node = self.live_head.get();
        while !node.is_null() {
            // SAFETY: every node on the live list is a fully initialized
            // `MsHeader` inside `self.arena`.
            unsafe { (*node).marked = false };
            node = unsafe { (*node).next };
        }
    }

    fn sweep(&self) {
        let mut node = self.live_head.get();
        let mut new_head: *mut MsHeader = std::ptr::null_mut();
        let mut freed_bytes = 0u64;

        while !node.is_null() {
            // SAFETY: `node` is live-list resident.
            let next = unsafe { (*node).next };
            let marked = unsafe { (*node).marked };
            if marked {
                unsafe {
                    (*node).prev = std::ptr::null_mut();
                    (*node).next = new_head;
                }
                if !new_head.is_null() {
                    unsafe { (*new_head).prev = node };
                }
                new_head = node;
            } else {
                let block_size = unsafe { (*node).block_size };
                let payload_size = unsafe { (*node).payload_size };
                freed_bytes += payload_size as u64;
                self.live_bytes.set(self.live_bytes.get() - block_size);
                self.live_count.set(self.live_count.get() - 1);
                self.stats.borrow_mut().current_bytes -= payload_size as u64;
                // SAFETY: `node` was allocated from `self.arena` as exactly
                // `block_size` bytes and is being removed from the live
                // list, so it is safe to return to the free list.
                unsafe { self.arena.borrow_mut().free(node.cast::<u8>(), block_size) };
            }
            node = next;
        }
        self.live_head.set(new_head);
        self.stats.borrow_mut().freed_bytes += freed_bytes;
    }
}

impl Backend for MarkSweepBackend {
    fn allocate(&self, size: usize, heap: &GcHeap) -> NonNull<u8> {
        let payload_size = align_up(size.max(1));
        let header_size = std::mem::size_of::<MsHeader>();
        let total = header_size + payload_size;

        if heap.config().stress_gc || self.live_bytes.get() + total > self.threshold.get() {
            self.collect(heap);
        }

        let (block_ptr, block_size) = match self.arena.borrow_mut().alloc(total) {
            Some(hit) => hit,
            None => {
                self.collect(heap);
                match self.arena.borrow_mut().alloc(total) {
                    Some(hit) => hit,
                    None => fatal(&format!("mark-sweep arena exhausted ({total} bytes requested)")),
                }
            }
        };

        let header = block_ptr.cast::<MsHeader>();
        let old_head = self.live_head.get();
        // SAFETY: `block_ptr` is a freshly allocated block of `block_size`
        // bytes, large enough to hold an `MsHeader` followed by the
        // payload.
        unsafe {
            (*header).block_size = block_size;
            (*header).payload_size = payload_size;
            (*header).trace = None;
            (*header).tag = Tag::default();
            (*header).marked = false;
            (*header).prev = std::ptr::null_mut();
            (*header).next = old_head;
        }
        if !old_head.is_null() {
            unsafe { (*old_head).prev = header };
        }
        self.live_head.set(header);
        self.live_count.set(self.live_count.get() + 1);
        self.live_bytes.set(self.live_bytes.get() + block_size);

        let payload = unsafe { payload_of::<MsHeader>(header) };
        // SAFETY: `payload_size` bytes starting at `payload` lie inside the
        // block just carved out.
        unsafe { std::ptr::write_bytes(payload.as_ptr(), 0, payload_size) };

        let mut stats = self.stats.borrow_mut();
        stats.allocated_bytes += payload_size as u64;
        stats.current_bytes += payload_size as u64;
        stats.metadata_bytes += header_size as u64;
        drop(stats);

        payload
    }

    fn set_trace(&self, object: NonNull<u8>, trace: TraceFn) {
        // SAFETY: `object` was returned by `allocate` on this backend.
        let header = unsafe { header_of::<MsHeader>(object) };
        unsafe { (*header).trace = Some(trace) };
    }

    fn set_tag(&self, object: NonNull<u8>, tag: Tag) {
        // SAFETY: `object` was returned by `allocate` on this backend.
        let header = unsafe { header_of::<MsHeader>(object) };
        unsafe { (*header).tag = tag };
    }

    fn mark_pointer(&self, ptr: ManagedPtr, heap: &GcHeap) -> ManagedPtr {
        let obj = ptr?;
        if !self.collecting.get() {
            return ptr;
        }
        // SAFETY: every live `ManagedPtr` the mutator holds was produced by
        // `allocate` on this backend.
        let header = unsafe { header_of::<MsHeader>(obj) };
        if unsafe { (*header).marked } {
            return ptr;
        }
        unsafe { (*header).marked = true };
        self.stats.borrow_mut().objects_scanned += 1;
        if let Some(trace) = unsafe { (*header).trace } {
            // SAFETY: `obj` is live and `trace` was registered for it via
            // `set_trace`.
            unsafe { trace(obj, heap) };
        }
        ptr
    }

    fn add_root(&self, slot: RootSlot) {
        self.roots.borrow_mut().add(slot);
    }

    fn remove_root(&self, slot: RootSlot) {
        self.roots.borrow_mut().remove(slot);
    }

    fn write_barrier(&self, _parent: NonNull<u8>, _child_slot: RootSlot) {
        // Single generation: nothing to remember.
    }

    fn collect(&self, heap: &GcHeap) {
        if self.collecting.get() {
            return;
        }
        self.collecting.set(true);

        let timer = PauseTimer::start(self.clock.as_ref());

        self.unlink_all_as_unmarked();

        for slot in self.roots.borrow().iter() {
            // SAFETY: registered root slots are guaranteed live by the
            // mutator for as long as they remain registered.
            let current = unsafe { *slot };
            let updated = self.mark_pointer(current, heap);
            unsafe { *slot = updated };
        }

        self.sweep();

        {
            let mut stats = self.stats.borrow_mut();
            stats.collections += 1;
        }

        let live = self.live_bytes.get();
        if live as f64 > self.threshold.get() as f64 * GROW_WATERMARK {
            self.threshold.set((live as f64 * GROWTH_FACTOR) as usize);
        }

        timer.finish(self.clock.as_ref(), &mut self.stats.borrow_mut());
        self.collecting.set(false);
    }

    fn set_threshold(&self, bytes: usize) {
        self.threshold.set(bytes);
    }

    fn get_threshold(&self) -> usize {
        self.threshold.get()
    }

    fn stats(&self) -> GcStats {
        let mut stats = *self.stats.borrow();
        let mut wasted = 0u64;
        let mut node = self.live_head.get();
        while !node.is_null() {
            // SAFETY: live-list resident.
            let block_size = unsafe { (*node).block_size } as u64;
            let payload_size = unsafe { (*node).payload_size } as u64;
            wasted += block_size.saturating_sub(payload_size);
            node = unsafe { (*node).next };
        }
        let geometry = self.arena.borrow().geometry();
        geometry.apply(&mut stats, wasted, self.live_count.get() as u64);
        stats
    }

    fn snapshot(&self) -> Vec<SnapshotEntry> {
        let mut out = Vec::with_capacity(self.live_count.get());
        let mut node = self.live_head.get();
        while !node.is_null() {
            // SAFETY: live-list resident.
            let payload = unsafe { payload_of::<MsHeader>(node) };
            out.push(SnapshotEntry {
                addr: payload.as_ptr() as u64,
                size: unsafe { (*node).payload_size } as u64,
                generation: Generation::Old,
                tag: unsafe { (*node).tag },
            });
            node = unsafe { (*node).next };
        }
        out
    }
}
