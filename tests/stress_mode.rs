//! `stress_gc` forces a collection around every allocation but must never
//! change what the mutator observes, only how often a collection runs.

use std::ptr::NonNull;

use lisp_gc::{BackendKind, GcConfig, GcHeap, ManagedPtr, RootSlot, Tag};

#[repr(C)]
struct PairLayout {
    car: ManagedPtr,
    cdr: ManagedPtr,
}

unsafe fn trace_pair(object: NonNull<u8>, gc: &GcHeap) {
    let layout = object.as_ptr().cast::<PairLayout>();
    unsafe {
        (*layout).car = gc.mark_pointer((*layout).car);
        (*layout).cdr = gc.mark_pointer((*layout).cdr);
    }
}

fn alloc_pair(heap: &GcHeap, car: ManagedPtr, cdr: ManagedPtr) -> NonNull<u8> {
    let ptr = heap.allocate(std::mem::size_of::<PairLayout>());
    unsafe {
        *ptr.as_ptr().cast::<PairLayout>() = PairLayout { car, cdr };
    }
    heap.set_trace(Some(ptr), trace_pair);
    heap.set_tag(Some(ptr), Tag::Pair);
    ptr
}

/// Build a list of `len` pairs, keeping only the head rooted, then report
/// how many live bytes remain reachable.
fn build_and_measure(backend: BackendKind, stress_gc: bool) -> u64 {
    let heap = GcHeap::new(GcConfig {
        backend,
        initial_heap_size: Some(64 * 1024),
        stress_gc,
        ..Default::default()
    });

    // Root the chain from the very first link: a stress-mode collection can
    // run inside any `allocate` call, including ones in the middle of this
    // loop, so nothing built here may depend on rooting happening later.
    let mut root: Box<ManagedPtr> = Box::new(None);
    heap.add_root(root.as_mut() as RootSlot);
    for _ in 0..20 {
        let node = alloc_pair(&heap, *root, None);
        *root = Some(node);
    }

    heap.collect();
    let stats = heap.get_stats();

    heap.remove_root(root.as_mut() as RootSlot);
    stats.current_bytes
}

#[test]
fn stress_gc_preserves_reachability_for_mark_sweep() {
    let quiet = build_and_measure(BackendKind::MarkSweep, false);
    let stressed = build_and_measure(BackendKind::MarkSweep, true);
    assert_eq!(quiet, stressed);
}

#[test]
fn stress_gc_preserves_reachability_for_copying() {
    let quiet = build_and_measure(BackendKind::Copying, false);
    let stressed = build_and_measure(BackendKind::Copying, true);
    assert_eq!(quiet, stressed);
}

#[test]
fn stress_gc_preserves_reachability_for_generational() {
    let quiet = build_and_measure(BackendKind::Generational, false);
    let stressed = build_and_measure(BackendKind::Generational, true);
    assert_eq!(quiet, stressed);
}

#[test]
fn stress_gc_runs_a_collection_on_every_allocation() {
    let heap = GcHeap::new(GcConfig {
        backend: BackendKind::MarkSweep,
        initial_heap_size: Some(64 * 1024),
        stress_gc: true,
        ..Default::default()
    });

    for _ in 0..10 {
        heap.allocate(32);
    }
    let stats = heap.get_stats();
    assert!(stats.collections >= 10);
}
