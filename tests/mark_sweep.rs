//! End-to-end scenarios for the free-list mark-sweep backend.

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

fn small_heap() -> GcHeap {
    GcHeap::new(GcConfig {
        backend: BackendKind::MarkSweep,
        initial_heap_size: Some(64 * 1024),
        ..Default::default()
    })
}

#[test]
fn liveness_keeps_rooted_objects_and_frees_the_rest() {
    let heap = small_heap();
    let mut root: Box<ManagedPtr> = Box::new(None);

    for i in 0..100 {
        let ptr = heap.allocate(64);
        if i == 0 {
            *root = Some(ptr);
        }
    }
    heap.add_root(root.as_mut() as RootSlot);

    heap.collect();

    let stats = heap.get_stats();
    assert_eq!(stats.current_bytes, 64);
    assert_eq!(stats.freed_bytes, 64 * 99);
    assert_eq!(stats.collections, 1);
    assert!(root.is_some());

    heap.remove_root(root.as_mut() as RootSlot);
}

#[test]
fn chain_of_pairs_survives_through_trace() {
    let heap = small_heap();
    let mut root: Box<ManagedPtr> = Box::new(None);

    let tail = alloc_pair(&heap, None, None);
    let head = alloc_pair(&heap, Some(tail), None);
    *root = Some(head);
    heap.add_root(root.as_mut() as RootSlot);

    heap.collect();

    let stats = heap.get_stats();
    assert_eq!(stats.objects_scanned, 2);
    assert_eq!(stats.current_bytes, 2 * std::mem::size_of::<PairLayout>() as u64);

    heap.remove_root(root.as_mut() as RootSlot);
}

#[test]
fn free_list_coalesces_after_collection() {
    let heap = small_heap();
    for _ in 0..50 {
        heap.allocate(256);
    }
    // Nothing rooted: a collection should reclaim everything and coalesce
    // the whole arena back into one contiguous free block.
    heap.collect();
    let ptr = heap.allocate(32 * 1024);
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 32 * 1024) };
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn fragmentation_index_reflects_surviving_gaps() {
    let heap = small_heap();
    let mut roots = Vec::new();

    // Root every other allocation so the survivors are separated by
    // reclaimed gaps once the unrooted ones are swept.
    for i in 0..20 {
        let ptr = heap.allocate(128);
        if i % 2 == 0 {
            let mut root = Box::new(Some(ptr));
            heap.add_root(root.as_mut() as RootSlot);
            roots.push(root);
        }
    }

    heap.collect();

    let stats = heap.get_stats();
    assert!(stats.free_blocks_count >= 2);
    assert!(stats.fragmentation_index >= 0.0 && stats.fragmentation_index <= 1.0);

    for root in &mut roots {
        heap.remove_root(root.as_mut() as RootSlot);
    }
}

#[test]
fn retagging_and_rereading_tag_round_trips_through_snapshot() {
    let heap = small_heap();
    let mut root = Box::new(Some(heap.allocate(16)));
    heap.set_tag(*root, Tag::Number);
    heap.add_root(root.as_mut() as RootSlot);

    let snapshot = heap.heap_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].tag, Tag::Number);

    heap.remove_root(root.as_mut() as RootSlot);
}
