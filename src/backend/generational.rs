//! Copying nursery over a free-list old generation.
//!
//! Grounded on `examples/original_source/src/gc/generational.c`. A minor
//! collection is a Cheney-style copy of the nursery (mirroring
//! [`crate::backend::copying`]) seeded from both the true root set and the
//! remembered set — old objects that have ever been pointed at a young
//! object via [`GenerationalBackend::write_barrier`]. An object that has
//! survived `PROMOTE_AGE` minor collections is promoted into the old
//! generation (a free list, mirroring [`crate::backend::mark_sweep`])
//! instead of being re-copied within the nursery.
//!
//! Promotion is *deep*: when an object is promoted, its own young children
//! are forced to promote too, regardless of their age, via an iterative
//! worklist rather than recursion — this avoids leaving a freshly promoted
//! old object pointing into a nursery half that is about to be reused,
//! without needing a remembered-set entry for every such edge immediately.
//!
//! A full collection ([`GenerationalBackend::collect`]) runs a minor
//! collection first (settling the nursery and any promotions), then marks
//! and sweeps the old generation starting from the true root set alone —
//! by that point every live young object has already been accounted for.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ptr::NonNull;

use crate::backend::Backend;
use crate::clock::{Clock, SystemClock};
use crate::config::{BackendKind, GcConfig};
use crate::error::fatal;
use crate::freelist::FreeListHeap;
use crate::heap::GcHeap;
use crate::object::{align_up, header_of, payload_of, ManagedPtr, RootSlot, TraceFn};
use crate::remembered::RememberedSet;
use crate::roots::RootTable;
use crate::snapshot::SnapshotEntry;
use crate::stats::{FreeGeometry, GcStats, PauseTimer};
use crate::tag::{Generation, Tag};

/// Matches the C original's `PROMOTE_AGE`.
const PROMOTE_AGE: u8 = 2;
/// Matches the C original's `OLD_GROWTH_FACTOR`.
const OLD_GROWTH_FACTOR: f64 = 2.0;
const GROW_WATERMARK: f64 = 0.75;

#[repr(C)]
struct NurseryHeader {
    size: usize,
    trace: Option<TraceFn>,
    forward: ManagedPtr,
    age: u8,
    tag: Tag,
}

#[repr(C)]
struct OldHeader {
    block_size: usize,
    payload_size: usize,
    trace: Option<TraceFn>,
    tag: Tag,
    marked: bool,
    prev: *mut OldHeader,
    next: *mut OldHeader,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Not currently collecting; `mark_pointer` should never be called.
    Idle,
    /// Running a minor collection: young objects copy or promote.
    Minor,
    /// Running a major collection's old-gen mark phase: old objects use
    /// the mark bit; young objects (already settled by the minor pass
    /// that preceded this) are walked read-only, deduplicated by address.
    MajorOld,
}

/// A copying nursery over a free-list old generation.
pub struct GenerationalBackend {
    nursery: RefCell<[Box<[u8]>; 2]>,
    nursery_active: Cell<usize>,
    nursery_half: usize,
    nursery_free: Cell<*mut u8>,
    nursery_limit: Cell<*mut u8>,
    young_bytes: Cell<u64>,

    old_arena: RefCell<FreeListHeap>,
    old_live_head: Cell<*mut OldHeader>,
    old_live_count: Cell<usize>,
    old_live_bytes: Cell<usize>,
    old_payload_bytes: Cell<u64>,
    old_threshold: Cell<usize>,

    roots: RefCell<RootTable>,
    remembered: RefCell<RememberedSet>,
    promotion_worklist: RefCell<Vec<NonNull<u8>>>,

    mode: Cell<Mode>,
    promoting: Cell<bool>,
    major_visited: RefCell<HashSet<usize>>,

    stats: RefCell<GcStats>,
    clock: Box<dyn Clock>,
    collecting: Cell<bool>,
}

impl GenerationalBackend {
    /// Build a backend with a fresh nursery (split from `config`'s heap
    /// size) and an old generation at the mark-sweep backend's default size.
    pub fn new(config: &GcConfig) -> Self {
        let nursery_half = (config.heap_size() / 2).max(1);
        let nursery = [
            vec![0u8; nursery_half].into_boxed_slice(),
            vec![0u8; nursery_half].into_boxed_slice(),
        ];
        let start = nursery[0].as_ptr() as *mut u8;
        let old_size = BackendKind::MarkSweep.default_heap_size();

        Self {
            // SAFETY: `start + nursery_half` is one-past-the-end of `nursery[0]`.
            nursery_limit: Cell::new(unsafe { start.add(nursery_half) }),
            nursery_free: Cell::new(start),
            nursery: RefCell::new(nursery),
            nursery_active: Cell::new(0),
            nursery_half,
            young_bytes: Cell::new(0),

            old_arena: RefCell::new(FreeListHeap::new(old_size)),
            old_live_head: Cell::new(std::ptr::null_mut()),
            old_live_count: Cell::new(0),
            old_live_bytes: Cell::new(0),
            old_payload_bytes: Cell::new(0),
            old_threshold: Cell::new(old_size),

            roots: RefCell::new(RootTable::new()),
            remembered: RefCell::new(RememberedSet::new()),
            promotion_worklist: RefCell::new(Vec::new()),

            mode: Cell::new(Mode::Idle),
            promoting: Cell::new(false),
            major_visited: RefCell::new(HashSet::new()),

            stats: RefCell::new(GcStats::default()),
            clock: Box::new(SystemClock::default()),
            collecting: Cell::new(false),
        }
    }

    fn remaining_nursery(&self) -> usize {
        self.nursery_limit.get() as usize - self.nursery_free.get() as usize
    }

    fn bump_nursery(&self, total: usize) -> *mut u8 {
        let dest = self.nursery_free.get();
        // SAFETY: caller has already checked `remaining_nursery() >= total`.
        self.nursery_free.set(unsafe { dest.add(total) });
        dest
    }

    fn nursery_active_start(&self) -> *mut u8 {
        self.nursery.borrow()[self.nursery_active.get()].as_ptr() as *mut u8
    }

    fn is_old(&self, ptr: NonNull<u8>) -> bool {
        self.old_arena.borrow().contains(ptr.as_ptr())
    }

    fn nursery_contains_active(&self, ptr: NonNull<u8>) -> bool {
        let spaces = self.nursery.borrow();
        let buf = &spaces[self.nursery_active.get()];
        let start = buf.as_ptr() as usize;
        let end = start + buf.len();
        let p = ptr.as_ptr() as usize;
        p >= start && p < end
    }

    fn ensure_nursery_room(&self, heap: &GcHeap, needed: usize) {
        if !heap.config().stress_gc && self.remaining_nursery() >= needed {
            return;
        }
        if self.collecting.get() {
            return;
        }
        self.collecting.set(true);
        self.minor_collect_inner(heap);
        self.collecting.set(false);
    }

    fn promote(&self, young_header: *mut NurseryHeader) -> NonNull<u8> {
        // SAFETY: `young_header` is a live nursery object not yet forwarded.
        let payload_size = unsafe { (*young_header).size };
        let header_size = std::mem::size_of::<OldHeader>();
        let total = header_size + payload_size;

        let (block_ptr, block_size) = match self.old_arena.borrow_mut().alloc(total) {
            Some(hit) => hit,
            None => fatal(&format!(
                "old generation exhausted while promoting ({total} bytes)"
            )),
        };

        let new_header = block_ptr.cast::<OldHeader>();
        let old_head = self.old_live_head.get();
        // SAFETY: `block_ptr` is a fresh block of `block_size` bytes from
        // the old-gen free list.
        unsafe {
            (*new_header).block_size = block_size;
            (*new_header).payload_size = payload_size;
            (*new_header).trace = (*young_header).trace;
            (*new_header).tag = (*young_header).tag;
            (*new_header).marked = false;
            (*new_header).prev = std::ptr::null_mut();
            (*new_header).next = old_head;
        }
        if !old_head.is_null() {
            unsafe { (*old_head).prev = new_header };
        }
        self.old_live_head.set(new_header);
        self.old_live_count.set(self.old_live_count.get() + 1);
        self.old_live_bytes.set(self.old_live_bytes.get() + block_size);
        self.old_payload_bytes
            .set(self.old_payload_bytes.get() + payload_size as u64);

        let new_payload = unsafe { payload_of::<OldHeader>(new_header) };
        let old_payload = unsafe { payload_of::<NurseryHeader>(young_header) };
        // SAFETY: `old_payload` and `new_payload` are disjoint, each valid
        // for `payload_size` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(old_payload.as_ptr(), new_payload.as_ptr(), payload_size)
        };

        self.stats.borrow_mut().objects_promoted += 1;
        self.promotion_worklist.borrow_mut().push(new_payload);
        new_payload
    }

    fn copy_within_nursery(&self, young_header: *mut NurseryHeader) -> NonNull<u8> {
        // SAFETY: `young_header` is a live nursery object not yet forwarded.
        let size = unsafe { (*young_header).size };
        let header_size = std::mem::size_of::<NurseryHeader>();
        let total = header_size + size;

        let dest = self.nursery_free.get();
        // SAFETY: checked against `self.nursery_limit` immediately below.
        let new_free = unsafe { dest.add(total) };
        if new_free as usize > self.nursery_limit.get() as usize {
            fatal("nursery to-space overflow during minor collection");
        }
        self.nursery_free.set(new_free);

        // SAFETY: from-space object and fresh to-space memory of equal
        // size, in different halves — never overlapping.
        unsafe { std::ptr::copy_nonoverlapping(young_header.cast::<u8>(), dest, total) };
        let new_header = dest.cast::<NurseryHeader>();
        // SAFETY: `new_header` is the copy just written above.
        unsafe {
            (*new_header).age += 1;
            (*new_header).forward = None;
        }
        self.stats.borrow_mut().objects_copied += 1;
        unsafe { payload_of::<NurseryHeader>(new_header) }
    }

    fn mark_young_collecting(&self, obj: NonNull<u8>) -> ManagedPtr {
        // SAFETY: `obj` is a nursery-resident payload pointer.
        let header = unsafe { header_of::<NurseryHeader>(obj) };
        if let Some(forwarded) = unsafe { (*header).forward } {
            return Some(forwarded);
        }
        let age = unsafe { (*header).age };
        let new_ptr = if self.promoting.get() || age + 1 >= PROMOTE_AGE {
            self.promote(header)
        } else {
            self.copy_within_nursery(header)
        };
        unsafe { (*header).forward = Some(new_ptr) };
        Some(new_ptr)
    }

    fn mark_young_passthrough(&self, obj: NonNull<u8>, heap: &GcHeap) -> ManagedPtr {
        let key = obj.as_ptr() as usize;
        if !self.major_visited.borrow_mut().insert(key) {
            return Some(obj);
        }
        // SAFETY: `obj` is a settled nursery survivor (the minor pass that
        // always precedes a major mark phase has already run).
        let header = unsafe { header_of::<NurseryHeader>(obj) };
        if let Some(trace) = unsafe { (*header).trace } {
            // SAFETY: `obj` is live and `trace` was registered for it.
            unsafe { trace(obj, heap) };
        }
        Some(obj)
    }

    fn mark_old(&self, obj: NonNull<u8>, heap: &GcHeap) -> ManagedPtr {
        // SAFETY: `obj` is old-gen resident.
        let header = unsafe { header_of::<OldHeader>(obj) };
        if unsafe { (*header).marked } {
            return Some(obj);
        }
        unsafe { (*header).marked = true };
        self.stats.borrow_mut().objects_scanned += 1;
        if let Some(trace) = unsafe { (*header).trace } {
            // SAFETY: `obj` is live and `trace` was registered for it.
            unsafe { trace(obj, heap) };
        }
        Some(obj)
    }

    fn minor_collect_inner(&self, heap: &GcHeap) {
        let timer = PauseTimer::start(self.clock.as_ref());

        let to_index = 1 - self.nursery_active.get();
        let to_start = self.nursery.borrow()[to_index].as_ptr() as *mut u8;
        self.nursery_free.set(to_start);
        // SAFETY: `to_start + nursery_half` is one-past-the-end of that half.
        self.nursery_limit.set(unsafe { to_start.add(self.nursery_half) });

        self.mode.set(Mode::Minor);

        let roots = self.roots.borrow();
        let remembered = self.remembered.borrow();
        for slot in roots.iter().chain(remembered.iter()) {
            // SAFETY: registered slots remain valid while registered.
            let current = unsafe { *slot };
            let updated = self.mark_pointer(current, heap);
            unsafe { *slot = updated };
        }
        drop(roots);
        drop(remembered);

        let mut scan = to_start;
        let mut survivor_payload = 0u64;
        loop {
            while (scan as usize) < (self.nursery_free.get() as usize) {
                let header = scan.cast::<NurseryHeader>();
                // SAFETY: `[to_start, nursery_free)` is a contiguous,
                // fully copied sequence of nursery survivors.
                let payload = unsafe { payload_of::<NurseryHeader>(header) };
                let size = unsafe { (*header).size };
                if let Some(trace) = unsafe { (*header).trace } {
                    // SAFETY: `payload` is live and settled at its new address.
                    unsafe { trace(payload, heap) };
                }
                self.stats.borrow_mut().objects_scanned += 1;
                survivor_payload += size as u64;
                scan = unsafe { payload.as_ptr().add(align_up(size)) };
            }
            let Some(promoted) = self.promotion_worklist.borrow_mut().pop() else {
                break;
            };
            self.promoting.set(true);
            // SAFETY: `promoted` was just pushed by `promote`, old-gen resident.
            let header = unsafe { header_of::<OldHeader>(promoted) };
            if let Some(trace) = unsafe { (*header).trace } {
                // SAFETY: `promoted` is live.
                unsafe { trace(promoted, heap) };
            }
            self.promoting.set(false);
        }

        self.nursery_active.set(to_index);
        self.mode.set(Mode::Idle);
        self.young_bytes.set(survivor_payload);

        self.remembered.borrow_mut().retain(|slot| {
            // SAFETY: registered slots remain valid while registered.
            match unsafe { *slot } {
                Some(p) => self.nursery_contains_active(p),
                None => false,
            }
        });

        self.stats.borrow_mut().collections += 1;
        timer.finish(self.clock.as_ref(), &mut self.stats.borrow_mut());
    }

    fn mark_and_sweep_old(&self, heap: &GcHeap) {
        self.mode.set(Mode::MajorOld);
        self.major_visited.borrow_mut().clear();

        let mut node = self.old_live_head.get();
        while !node.is_null() {
            // SAFETY: live-list resident.
            unsafe { (*node).marked = false };
            node = unsafe { (*node).next };
        }

        for slot in self.roots.borrow().iter() {
            // SAFETY: registered slots remain valid while registered.
            let current = unsafe { *slot };
            let _ = self.mark_pointer(current, heap);
        }
        self.mode.set(Mode::Idle);

        let mut node = self.old_live_head.get();
        let mut new_head: *mut OldHeader = std::ptr::null_mut();
        let mut freed_bytes = 0u64;
        let mut live_block_bytes = 0usize;
        let mut live_payload_bytes = 0u64;
        let mut live_count = 0usize;
        while !node.is_null() {
            // SAFETY: live-list resident.
            let next = unsafe { (*node).next };
            if unsafe { (*node).marked } {
                unsafe {
                    (*node).prev = std::ptr::null_mut();
                    (*node).next = new_head;
                }
                if !new_head.is_null() {
                    unsafe { (*new_head).prev = node };
                }
                new_head = node;
                live_block_bytes += unsafe { (*node).block_size };
                live_payload_bytes += unsafe { (*node).payload_size } as u64;
                live_count += 1;
            } else {
                let block_size = unsafe { (*node).block_size };
                freed_bytes += block_size as u64;
                // SAFETY: `node` is being removed from the live list and
                // was allocated from `self.old_arena` as exactly
                // `block_size` bytes.
                unsafe { self.old_arena.borrow_mut().free(node.cast::<u8>(), block_size) };
            }
            node = next;
        }
        self.old_live_head.set(new_head);
        self.old_live_count.set(live_count);
        self.old_live_bytes.set(live_block_bytes);
        self.old_payload_bytes.set(live_payload_bytes);
        self.stats.borrow_mut().freed_bytes += freed_bytes;

        if live_block_bytes as f64 > self.old_threshold.get() as f64 * GROW_WATERMARK {
            self.old_threshold
                .set((live_block_bytes as f64 * OLD_GROWTH_FACTOR) as usize);
        }
    }
}

impl Backend for GenerationalBackend {
    fn allocate(&self, size: usize, heap: &GcHeap) -> NonNull<u8> {
        let payload_size = align_up(size.max(1));
        let header_size = std::mem::size_of::<NurseryHeader>();
        let total = header_size + payload_size;

        self.ensure_nursery_room(heap, total);
        if self.remaining_nursery() < total {
            fatal(&format!(
                "nursery exhausted after minor collection ({total} bytes requested)"
            ));
        }

        let dest = self.bump_nursery(total);
        let header = dest.cast::<NurseryHeader>();
        // SAFETY: `dest` is `total` fresh bytes just bumped out of the
        // active nursery half.
        unsafe {
            (*header).size = payload_size;
            (*header).trace = None;
            (*header).forward = None;
            (*header).age = 0;
            (*header).tag = Tag::default();
        }
        let payload = unsafe { payload_of::<NurseryHeader>(header) };
        // SAFETY: `payload_size` bytes at `payload` lie inside the block.
        unsafe { std::ptr::write_bytes(payload.as_ptr(), 0, payload_size) };

        self.young_bytes.set(self.young_bytes.get() + payload_size as u64);
        let mut stats = self.stats.borrow_mut();
        stats.allocated_bytes += total as u64;
        stats.metadata_bytes += header_size as u64;
        drop(stats);

        payload
    }

    fn set_trace(&self, object: NonNull<u8>, trace: TraceFn) {
        if self.is_old(object) {
            // SAFETY: checked old-gen resident above.
            let header = unsafe { header_of::<OldHeader>(object) };
            unsafe { (*header).trace = Some(trace) };
        } else {
            // SAFETY: not old-gen resident, so nursery-resident.
            let header = unsafe { header_of::<NurseryHeader>(object) };
            unsafe { (*header).trace = Some(trace) };
        }
    }

    fn set_tag(&self, object: NonNull<u8>, tag: Tag) {
        if self.is_old(object) {
            // SAFETY: checked old-gen resident above.
            let header = unsafe { header_of::<OldHeader>(object) };
            unsafe { (*header).tag = tag };
        } else {
            // SAFETY: not old-gen resident, so nursery-resident.
            let header = unsafe { header_of::<NurseryHeader>(object) };
            unsafe { (*header).tag = tag };
        }
    }

    fn mark_pointer(&self, ptr: ManagedPtr, heap: &GcHeap) -> ManagedPtr {
        let obj = ptr?;
        if self.is_old(obj) {
            match self.mode.get() {
                Mode::MajorOld => self.mark_old(obj, heap),
                _ => Some(obj),
            }
        } else {
            match self.mode.get() {
                Mode::Minor => self.mark_young_collecting(obj),
                Mode::MajorOld => self.mark_young_passthrough(obj, heap),
                Mode::Idle => Some(obj),
            }
        }
    }

    fn add_root(&self, slot: RootSlot) {
        self.roots.borrow_mut().add(slot);
    }

    fn remove_root(&self, slot: RootSlot) {
        self.roots.borrow_mut().remove(slot);
    }

    fn write_barrier(&self, parent: NonNull<u8>, child_slot: RootSlot) {
        if !self.is_old(parent) {
            return;
        }
        // SAFETY: registered/owned by the mutator for the duration of the call.
        let points_young = match unsafe { *child_slot } {
            Some(p) => !self.is_old(p),
            None => false,
        };
        if points_young {
            self.remembered.borrow_mut().insert(child_slot);
        }
    }

    fn collect(&self, heap: &GcHeap) {
        if self.collecting.get() {
            return;
        }
        self.collecting.set(true);
        let timer = PauseTimer::start(self.clock.as_ref());

        self.minor_collect_inner(heap);
        self.mark_and_sweep_old(heap);

        self.stats.borrow_mut().collections += 1;
        timer.finish(self.clock.as_ref(), &mut self.stats.borrow_mut());
        self.collecting.set(false);
    }

    fn set_threshold(&self, bytes: usize) {
        self.old_threshold.set(bytes);
    }

    fn get_threshold(&self) -> usize {
        self.old_threshold.get()
    }

    fn stats(&self) -> GcStats {
        let mut stats = *self.stats.borrow();
        stats.current_bytes = self.young_bytes.get() + self.old_payload_bytes.get();

        let old_geo = self.old_arena.borrow().geometry();
        let nursery_remaining = self.remaining_nursery() as u64;
        let combined = FreeGeometry {
            largest_free_block: old_geo.largest_free_block.max(nursery_remaining),
            total_free_memory: old_geo.total_free_memory + nursery_remaining,
            free_blocks_count: old_geo.free_blocks_count + u64::from(nursery_remaining > 0),
        };

        let mut wasted = 0u64;
        let mut node = self.old_live_head.get();
        while !node.is_null() {
            // SAFETY: live-list resident.
            let block_size = unsafe { (*node).block_size } as u64;
            let payload_size = unsafe { (*node).payload_size } as u64;
            wasted += block_size.saturating_sub(payload_size);
            node = unsafe { (*node).next };
        }
        combined.apply(&mut stats, wasted, self.old_live_count.get() as u64);
        stats
    }

    fn snapshot(&self) -> Vec<SnapshotEntry> {
        let mut out = Vec::new();

        let mut cursor = self.nursery_active_start();
        let end = self.nursery_free.get();
        while (cursor as usize) < (end as usize) {
            let header = cursor.cast::<NurseryHeader>();
            // SAFETY: the active nursery half, up to the bump pointer, is a
            // contiguous, gap-free sequence of objects.
            let payload = unsafe { payload_of::<NurseryHeader>(header) };
            let size = unsafe { (*header).size };
            out.push(SnapshotEntry {
                addr: payload.as_ptr() as u64,
                size: size as u64,
                generation: Generation::Nursery,
                tag: unsafe { (*header).tag },
            });
            cursor = unsafe { payload.as_ptr().add(align_up(size)) };
        }

        let mut node = self.old_live_head.get();
        while !node.is_null() {
            // SAFETY: live-list resident.
            let payload = unsafe { payload_of::<OldHeader>(node) };
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
