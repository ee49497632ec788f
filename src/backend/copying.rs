//! Two semi-spaces, Cheney-style copying collection.
//!
//! Grounded on `examples/original_source/src/gc/copying.c`: bump allocation
//! into an active space (default 32MiB), and on collection a two-finger
//! scan of the other ("to") space — objects reachable from roots are
//! copied first, then `scan` walks forward over already-copied objects,
//! tracing each (which copies its children in turn) until it catches up
//! with the bump pointer. Forwarding pointers are left behind in the
//! vacated from-space header so a second reference to an already-moved
//! object resolves to its new location instead of being copied twice.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use crate::backend::Backend;
use crate::clock::{Clock, SystemClock};
use crate::config::GcConfig;
use crate::error::fatal;
use crate::heap::GcHeap;
use crate::object::{align_up, header_of, payload_of, ManagedPtr, RootSlot, TraceFn};
use crate::roots::RootTable;
use crate::snapshot::SnapshotEntry;
use crate::stats::{GcStats, PauseTimer};
use crate::tag::{Generation, Tag};

#[repr(C)]
struct CopyHeader {
    size: usize,
    trace: Option<TraceFn>,
    forward: ManagedPtr,
    tag: Tag,
}

/// Two equal-sized semi-spaces, collected by Cheney-style copying.
pub struct CopyingBackend {
    spaces: RefCell<[Box<[u8]>; 2]>,
    active: Cell<usize>,
    space_size: usize,
    free: Cell<*mut u8>,
    limit: Cell<*mut u8>,
    live_count: Cell<usize>,
    roots: RefCell<RootTable>,
    threshold: Cell<usize>,
    stats: RefCell<GcStats>,
    clock: Box<dyn Clock>,
    collecting: Cell<bool>,
}

impl CopyingBackend {
    /// Build a backend with two fresh semi-spaces sized per `config`.
    pub fn new(config: &GcConfig) -> Self {
        let space_size = config.heap_size();
        let spaces = [
            vec![0u8; space_size].into_boxed_slice(),
            vec![0u8; space_size].into_boxed_slice(),
        ];
        let start = spaces[0].as_ptr() as *mut u8;
        Self {
            free: Cell::new(start),
            // SAFETY: `start + space_size` is one-past-the-end of `spaces[0]`.
            limit: Cell::new(unsafe { start.add(space_size) }),
            spaces: RefCell::new(spaces),
            active: Cell::new(0),
            space_size,
            live_count: Cell::new(0),
            roots: RefCell::new(RootTable::new()),
            threshold: Cell::new(config.resolved_threshold()),
            stats: RefCell::new(GcStats::default()),
            clock: Box::new(SystemClock::default()),
            collecting: Cell::new(false),
        }
    }

    fn remaining(&self) -> usize {
        self.limit.get() as usize - self.free.get() as usize
    }

    fn active_start(&self) -> *mut u8 {
        self.spaces.borrow()[self.active.get()].as_ptr() as *mut u8
    }

    fn bump(&self, total: usize) -> *mut u8 {
        let dest = self.free.get();
        // SAFETY: caller has already checked `self.remaining() >= total`.
        self.free.set(unsafe { dest.add(total) });
        dest
    }
}

impl Backend for CopyingBackend {
    fn allocate(&self, size: usize, heap: &GcHeap) -> NonNull<u8> {
        let payload_size = align_up(size.max(1));
        let header_size = std::mem::size_of::<CopyHeader>();
        let total = header_size + payload_size;

        if heap.config().stress_gc || self.remaining() < total {
            self.collect(heap);
        }
        if self.remaining() < total {
            fatal(&format!("copying semi-space exhausted ({total} bytes requested)"));
        }

        let block = self.bump(total);
        let header = block.cast::<CopyHeader>();
        // SAFETY: `block` is `total` fresh bytes just carved out of the
        // active space.
        unsafe {
            (*header).size = payload_size;
            (*header).trace = None;
            (*header).forward = None;
            (*header).tag = Tag::default();
        }
        let payload = unsafe { payload_of::<CopyHeader>(header) };
        // SAFETY: `payload_size` bytes at `payload` lie inside the block.
        unsafe { std::ptr::write_bytes(payload.as_ptr(), 0, payload_size) };
        self.live_count.set(self.live_count.get() + 1);

        let mut stats = self.stats.borrow_mut();
        stats.allocated_bytes += total as u64;
        stats.current_bytes += payload_size as u64;
        stats.metadata_bytes += header_size as u64;
        drop(stats);

        payload
    }

    fn set_trace(&self, object: NonNull<u8>, trace: TraceFn) {
        // SAFETY: `object` was returned by `allocate` on this backend.
        let header = unsafe { header_of::<CopyHeader>(object) };
        unsafe { (*header).trace = Some(trace) };
    }

    fn set_tag(&self, object: NonNull<u8>, tag: Tag) {
        // SAFETY: `object` was returned by `allocate` on this backend.
        let header = unsafe { header_of::<CopyHeader>(object) };
        unsafe { (*header).tag = tag };
    }

    fn mark_pointer(&self, ptr: ManagedPtr, _heap: &GcHeap) -> ManagedPtr {
        let obj = ptr?;
        if !self.collecting.get() {
            return ptr;
        }
        // SAFETY: `obj` points at a `CopyHeader`-prefixed object, either
        // still in from-space (first visit) or already relocated.
        let header = unsafe { header_of::<CopyHeader>(obj) };
        if let Some(forwarded) = unsafe { (*header).forward } {
            return Some(forwarded);
        }

        let size = unsafe { (*header).size };
        let header_size = std::mem::size_of::<CopyHeader>();
        let total = header_size + size;

        let dest = self.free.get();
        // SAFETY: checked against `self.limit` immediately below.
        let new_free = unsafe { dest.add(total) };
        if new_free as usize > self.limit.get() as usize {
            fatal("copying to-space overflow during collection");
        }
        self.free.set(new_free);

        // SAFETY: `header..header+total` is the from-space object being
        // relocated; `dest..dest+total` is fresh to-space memory of equal
        // size. Ranges never overlap (different spaces).
        unsafe { std::ptr::copy_nonoverlapping(header.cast::<u8>(), dest, total) };
        let new_header = dest.cast::<CopyHeader>();
        // SAFETY: `new_header` is the copy just written above.
        unsafe { (*new_header).forward = None };
        let new_payload = unsafe { payload_of::<CopyHeader>(new_header) };
        // SAFETY: `header` is still valid from-space memory this cycle.
        unsafe { (*header).forward = Some(new_payload) };

        self.stats.borrow_mut().objects_copied += 1;
        Some(new_payload)
    }

    fn add_root(&self, slot: RootSlot) {
        self.roots.borrow_mut().add(slot);
    }

    fn remove_root(&self, slot: RootSlot) {
        self.roots.borrow_mut().remove(slot);
    }

    fn write_barrier(&self, _parent: NonNull<u8>, _child_slot: RootSlot) {
        // Single space: nothing to remember between collections.
    }

    fn collect(&self, heap: &GcHeap) {
        if self.collecting.get() {
            return;
        }
        self.collecting.set(true);
        let timer = PauseTimer::start(self.clock.as_ref());

        let to_index = 1 - self.active.get();
        let to_start = self.spaces.borrow()[to_index].as_ptr() as *mut u8;
        self.free.set(to_start);
        // SAFETY: `to_start + space_size` is one-past-the-end of that space.
        self.limit.set(unsafe { to_start.add(self.space_size) });

        for slot in self.roots.borrow().iter() {
            // SAFETY: registered root slots remain valid while registered.
            let current = unsafe { *slot };
            let updated = self.mark_pointer(current, heap);
            unsafe { *slot = updated };
        }

        let mut scan = to_start;
        let mut survivors = 0usize;
        while (scan as usize) < (self.free.get() as usize) {
            let header = scan.cast::<CopyHeader>();
            // SAFETY: everything between `to_start` and `self.free.get()`
            // is a fully copied, contiguous sequence of objects.
            let payload = unsafe { payload_of::<CopyHeader>(header) };
            let size = unsafe { (*header).size };
            if let Some(trace) = unsafe { (*header).trace } {
                // SAFETY: `payload` is a live, fully relocated object.
                unsafe { trace(payload, heap) };
            }
            self.stats.borrow_mut().objects_scanned += 1;
            survivors += 1;
            scan = unsafe { payload.as_ptr().add(align_up(size)) };
        }

        self.active.set(to_index);
        self.live_count.set(survivors);

        {
            let mut stats = self.stats.borrow_mut();
            stats.collections += 1;
            stats.current_bytes = (self.free.get() as usize - to_start as usize
                - survivors * std::mem::size_of::<CopyHeader>()) as u64;
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
        let remaining = self.remaining() as u64;
        stats.largest_free_block = remaining;
        stats.total_free_memory = remaining;
        stats.free_blocks_count = if remaining > 0 { 1 } else { 0 };
        stats.average_free_block_size = remaining as f64;
        stats.fragmentation_index = 0.0;
        stats
    }

    fn snapshot(&self) -> Vec<SnapshotEntry> {
        let mut out = Vec::with_capacity(self.live_count.get());
        let mut cursor = self.active_start();
        let end = self.free.get();
        while (cursor as usize) < (end as usize) {
            let header = cursor.cast::<CopyHeader>();
            // SAFETY: `cursor` walks the contiguous, gap-free sequence of
            // objects bump-allocated into the active space.
            let payload = unsafe { payload_of::<CopyHeader>(header) };
            let size = unsafe { (*header).size };
            out.push(SnapshotEntry {
                addr: payload.as_ptr() as u64,
                size: size as u64,
                generation: Generation::Unknown,
                tag: unsafe { (*header).tag },
            });
            cursor = unsafe { payload.as_ptr().add(align_up(size)) };
        }
        out
    }
}
