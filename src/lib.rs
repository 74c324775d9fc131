//! Half-fit memory allocation for embedded targets.
//!
//! This crate implements the half-fit allocation discipline over a single,
//! statically reserved 32 KiB arena. Memory is handed out in multiples of
//! a 32-byte chunk; free blocks are segregated into 11 size classes with
//! an 11-bit summary word tracking which classes are populated. A request
//! always draws from the smallest class whose blocks are all large enough
//! to satisfy it, so allocation never scans a list: pick a class from the
//! summary word, pop its head, split off the surplus. Freeing merges the
//! block with its free physical neighbors before filing it again, keeping
//! fragmentation bounded without a compaction pass.
//!
//! Both allocation and release run in constant time, which makes the
//! allocator usable where a general purpose heap is unavailable or its
//! timing unacceptable.
//!
//! # Usage
//!
//! The single threaded core is [`HalfFitAllocator`]:
//!
//! ```
//! use halffit::HalfFitAllocator;
//!
//! let mut heap = HalfFitAllocator::new();
//! heap.init();
//!
//! let payload = heap.alloc(100);
//! assert!(!payload.is_null());
//! unsafe { heap.free(payload) };
//! ```
//!
//! [`LockedHalfFitAllocator`] wraps the core in a spinlock so it can back
//! the `alloc` crate on `#![no_std]` targets:
//!
//! ```no_run
//! #[global_allocator]
//! static ALLOCATOR: halffit::LockedHalfFitAllocator =
//!     halffit::LockedHalfFitAllocator::new();
//! ```
//!
//! Note that payload pointers are only 4-byte aligned (each block starts
//! with a packed 4-byte header); the locked wrapper refuses layouts with a
//! stricter alignment.
//!
//! Diagnostics are silent by default and can be routed to any output
//! device through [`diag::register_diag_sink`].

#![cfg_attr(not(test), no_std)]

pub mod diag;
mod err;
pub mod halffit;

pub mod errors {
    pub use crate::err::*;
}

pub use crate::err::AllocError;
pub use crate::halffit::{
    HalfFitAllocator, LockedHalfFitAllocator, ARENA_SIZE, CHUNK_SIZE, HEADER_SIZE, PAYLOAD_ALIGN,
};
