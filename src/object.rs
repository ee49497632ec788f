//! Core pointer/trace types shared by every backend.
//!
//! None of this is backend-specific: each backend defines its own header
//! layout (see `backend::mark_sweep::MsHeader`, `backend::copying::CopyHeader`,
//! `backend::generational::{NurseryHeader, OldHeader}`) but they all sit at a
//! fixed offset immediately before the payload, and are recovered the same
//! way: `header_of::<H>(ptr)`.

use std::ptr::NonNull;

use crate::heap::GcHeap;

/// A pointer the mutator holds to a managed object's payload, or the
/// collector's own notion of the same. `None` is the managed-heap analogue
/// of a C `NULL`.
pub type ManagedPtr = Option<NonNull<u8>>;

/// The address of a mutator-owned pointer cell: a root slot or a remembered
/// slot. The heap never owns the cell, only its address — the mutator may
/// read or write through it at any time outside of a collection.
///
/// # Safety
/// Any `RootSlot` registered with the heap must remain valid (point at
/// readable/writable memory containing a `ManagedPtr`) for as long as it is
/// registered.
pub type RootSlot = *mut ManagedPtr;

/// A per-object-type callback that discovers a managed object's outgoing
/// pointers.
///
/// Called only by the collector, during a collection. Implementations must:
/// - call [`GcHeap::mark_pointer`] on every managed child pointer,
/// - write the returned value back into the field it came from (children
///   may move under copying/generational collection),
/// - perform no allocation, no write-barrier calls, and mutate no state
///   besides the fields being rewritten.
///
/// # Safety
/// `object` must be a live payload pointer previously returned by
/// [`GcHeap::allocate`], valid for the lifetime of the call.
pub type TraceFn = unsafe fn(object: NonNull<u8>, gc: &GcHeap);

/// Round `size` up to pointer alignment, matching the C originals' `ALIGN`
/// macro (`(size + align - 1) & !(align - 1)`).
#[inline]
pub fn align_up(size: usize) -> usize {
    let align = std::mem::align_of::<usize>();
    (size + align - 1) & !(align - 1)
}

/// Recover a pointer to the `H` header that precedes `ptr`'s payload.
///
/// # Safety
/// `ptr` must point at the payload of an object whose header type is `H`,
/// placed immediately before the payload by the allocator.
#[inline]
pub unsafe fn header_of<H>(ptr: NonNull<u8>) -> *mut H {
    unsafe { ptr.as_ptr().cast::<H>().sub(1) }
}

/// Recover the payload pointer that follows an `H` header.
///
/// # Safety
/// `header` must point at a fully initialized `H` immediately followed by
/// its payload.
#[inline]
pub unsafe fn payload_of<H>(header: *mut H) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked(header.add(1).cast::<u8>()) }
}
