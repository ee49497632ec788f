//! Advisory object tags, for diagnostics/visualisation only.
//!
//! Mirrors `GC_TAG_*` in `examples/original_source/include/gc.h`. The
//! collector never branches on a tag; it is purely a label the mutator
//! attaches via [`crate::heap::GcHeap::set_tag`] and reads back via
//! [`crate::heap::GcHeap::heap_snapshot`].

/// A closed enum of object kinds the mutator may advise the heap of.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tag {
    /// No tag set yet (the default for every freshly allocated object).
    #[default]
    Unknown = 0,
    /// A boxed number value.
    Number = 1,
    /// An interned or boxed symbol.
    Symbol = 2,
    /// A cons pair.
    Pair = 3,
    /// A user-defined lambda/closure.
    Lambda = 4,
    /// A built-in procedure.
    Builtin = 5,
    /// An environment frame.
    Env = 10,
    /// A single binding within an environment.
    Binding = 11,
    /// A string buffer.
    String = 12,
}

impl Tag {
    /// Decode a raw byte, as recovered from a heap snapshot entry. Unknown
    /// byte values map to [`Tag::Unknown`] rather than panicking — tags are
    /// advisory and never trusted for memory safety.
    #[inline]
    pub fn from_u8(byte: u8) -> Tag {
        match byte {
            1 => Tag::Number,
            2 => Tag::Symbol,
            3 => Tag::Pair,
            4 => Tag::Lambda,
            5 => Tag::Builtin,
            10 => Tag::Env,
            11 => Tag::Binding,
            12 => Tag::String,
            _ => Tag::Unknown,
        }
    }
}

/// Which generation an object currently lives in, as reported by
/// [`crate::snapshot::SnapshotEntry`]. Mirrors `GC_GEN_*`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Generation {
    /// Backend does not distinguish generations (mark-sweep, copying).
    #[default]
    Unknown = 0,
    /// The young generation (generational backend only).
    Nursery = 1,
    /// The old generation (generational backend; also used by mark-sweep,
    /// which has only one generation and reports it as `Old`).
    Old = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_byte_maps_to_unknown_tag() {
        assert_eq!(Tag::from_u8(200), Tag::Unknown);
        assert_eq!(Tag::from_u8(3), Tag::Pair);
    }
}
