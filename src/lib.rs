//! # Managed heap
//!
//! A pluggable tracing garbage collector for an external, single-threaded
//! mutator (originally written for a small Lisp interpreter, but the heap
//! itself knows nothing about Lisp — it only knows about payload bytes,
//! trace callbacks, and root slots).
//!
//! Three interchangeable backends implement the same [`heap::GcHeap`]
//! surface:
//!
//! - [`backend::mark_sweep`] — a free-list arena, mark-and-sweep.
//! - [`backend::copying`] — two semi-spaces, Cheney-style copying.
//! - [`backend::generational`] — a copying nursery promoting into a
//!   free-list old generation.
//!
//! Select one via [`config::GcConfig`] or the `GC_BACKEND` environment
//! variable ([`config::BackendKind::from_env`]).

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod freelist;
pub mod heap;
pub mod object;
pub mod remembered;
pub mod roots;
pub mod snapshot;
pub mod stats;
pub mod tag;

pub use config::{BackendKind, GcConfig};
pub use heap::GcHeap;
pub use object::{ManagedPtr, RootSlot, TraceFn};
pub use snapshot::SnapshotEntry;
pub use stats::GcStats;
pub use tag::{Generation, Tag};
