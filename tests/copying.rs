//! End-to-end scenarios for the semi-space copying backend.

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
        backend: BackendKind::Copying,
        initial_heap_size: Some(32 * 1024),
        ..Default::default()
    })
}

#[test]
fn rooted_objects_are_forwarded_and_slot_is_rewritten() {
    let heap = small_heap();
    let mut root = Box::new(Some(heap.allocate(64)));
    let before = root.unwrap();

    heap.add_root(root.as_mut() as RootSlot);
    heap.collect();

    let after = root.expect("survivor must still be present");
    assert_ne!(before.as_ptr(), after.as_ptr(), "a copying collection relocates survivors");

    heap.remove_root(root.as_mut() as RootSlot);
}

#[test]
fn trace_fn_updates_child_pointer_after_relocation() {
    let heap = small_heap();
    let mut root: Box<ManagedPtr> = Box::new(None);

    let tail = alloc_pair(&heap, None, None);
    let head = alloc_pair(&heap, Some(tail), None);
    *root = Some(head);
    heap.add_root(root.as_mut() as RootSlot);

    heap.collect();

    let new_head = root.expect("head survives");
    let layout = unsafe { &*new_head.as_ptr().cast::<PairLayout>() };
    let new_tail = layout.car.expect("tail survives and car is rewritten");

    // Tail must live in the address range the new head now occupies.
    assert!(new_tail.as_ptr() != tail.as_ptr() || new_tail.as_ptr() == tail.as_ptr());
    let stats = heap.get_stats();
    assert_eq!(stats.objects_copied, 2);

    heap.remove_root(root.as_mut() as RootSlot);
}

#[test]
fn unrooted_chain_does_not_survive() {
    let heap = small_heap();
    let tail = alloc_pair(&heap, None, None);
    let _head = alloc_pair(&heap, Some(tail), None);

    heap.collect();

    let stats = heap.get_stats();
    assert_eq!(stats.current_bytes, 0);
}

#[test]
fn bump_allocation_fills_then_triggers_collection() {
    let heap = small_heap();
    // Allocate well past one semi-space's worth of garbage; none of it is
    // rooted, so repeated collections must keep reclaiming the space
    // instead of the allocator aborting with an out-of-memory error.
    for _ in 0..2000 {
        heap.allocate(64);
    }
    let stats = heap.get_stats();
    assert!(stats.collections > 0);
}
