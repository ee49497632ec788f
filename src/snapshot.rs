//! Heap-snapshot types and their flat ABI-friendly serialisation.
//!
//! Mirrors `GcObjectInfo` and the `gc_heap_snapshot*` family in
//! `examples/original_source/include/gc.h`: a fixed-layout record per live
//! object, plus a packed 4×u32 variant for transport across a host/embedder
//! boundary that cannot share Rust types.

/// One live object, as enumerated by [`crate::heap::GcHeap::heap_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// The object's payload address.
    pub addr: u64,
    /// Payload size in bytes.
    pub size: u64,
    /// Which generation the object currently lives in.
    pub generation: crate::tag::Generation,
    /// The advisory tag last set via `set_tag`.
    pub tag: crate::tag::Tag,
}

impl SnapshotEntry {
    /// Number of `u32` words in the flat encoding of one entry.
    pub const FLAT_ARITY: usize = 4;

    /// Pack this entry as `[addr_lo, addr_hi, size, (generation << 8) | tag]`.
    ///
    /// Addresses wider than 32 bits are split across two words so the flat
    /// format stays fixed-width regardless of target pointer size; readers
    /// that only care about 32-bit addresses can ignore the high word.
    pub fn to_flat(self) -> [u32; Self::FLAT_ARITY] {
        [
            self.addr as u32,
            (self.addr >> 32) as u32,
            self.size as u32,
            ((self.generation as u32) << 8) | (self.tag as u32),
        ]
    }
}

/// Flatten a full snapshot into a transport-friendly `u32` buffer, as
/// `gc_heap_snapshot_flat` does in the C original.
pub fn flatten(entries: &[SnapshotEntry]) -> Vec<u32> {
    let mut out = Vec::with_capacity(entries.len() * SnapshotEntry::FLAT_ARITY);
    for entry in entries {
        out.extend_from_slice(&entry.to_flat());
    }
    out
}

/// Size, in `u32` words, of one flat entry. Exposed so an external reader
/// can decode the flat buffer without re-declaring [`SnapshotEntry::FLAT_ARITY`].
pub const fn entry_size() -> usize {
    SnapshotEntry::FLAT_ARITY
}

/// Word offset of the low 32 bits of `addr` within a flat entry.
pub const fn addr_offset() -> usize {
    0
}

/// Word offset of `size` within a flat entry.
pub const fn size_offset() -> usize {
    2
}

/// Word offset of the packed `(generation, tag)` word within a flat entry.
pub const fn generation_tag_offset() -> usize {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{Generation, Tag};

    #[test]
    fn flat_roundtrip_packs_generation_and_tag() {
        let entry = SnapshotEntry {
            addr: 0x1_0000_0002,
            size: 64,
            generation: Generation::Old,
            tag: Tag::Pair,
        };
        let flat = entry.to_flat();
        assert_eq!(flat[addr_offset()], 2);
        assert_eq!(flat[addr_offset() + 1], 1);
        assert_eq!(flat[size_offset()], 64);
        assert_eq!(flat[generation_tag_offset()], (2 << 8) | 3);
    }

    #[test]
    fn flatten_concatenates_entries() {
        let entries = vec![
            SnapshotEntry {
                addr: 1,
                size: 2,
                generation: Generation::Nursery,
                tag: Tag::Number,
            },
            SnapshotEntry {
                addr: 3,
                size: 4,
                generation: Generation::Old,
                tag: Tag::String,
            },
        ];
        let flat = flatten(&entries);
        assert_eq!(flat.len(), entries.len() * entry_size());
    }
}
