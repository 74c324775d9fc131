//! Half-fit memory allocation over a fixed arena.
//!
//! The allocator manages a statically sized 32 KiB arena carved into
//! 32-byte chunks. Free blocks are segregated into 11 size classes, and an
//! allocation always draws from the smallest class whose blocks are all
//! large enough, so finding a block never requires walking a list. The
//! data structures live in the arena itself: every block starts with a
//! packed one-word header, and free blocks additionally thread a doubly
//! linked bucket list through their second word; only the 11 list heads
//! and the summary word live outside.
//!
//! [`HalfFitAllocator`] is the single threaded core. It can be used with
//! the `#[global_allocator]` attribute through [`LockedHalfFitAllocator`],
//! which adds a spinlock and lazy initialization.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

use spin::Mutex;

pub(crate) mod bucket;
pub(crate) mod header;
pub(crate) mod heap;

pub use heap::HalfFitAllocator;

/// Base-2 logarithm of the chunk size.
pub const CHUNK_SHIFT: usize = 5;

/// Allocation and alignment quantum of the arena, in bytes.
pub const CHUNK_SIZE: usize = 1 << CHUNK_SHIFT;

/// Total size of the managed arena, in bytes.
pub const ARENA_SIZE: usize = CHUNK_SIZE << 10;

/// Number of chunks in the arena.
pub const CHUNK_COUNT: usize = ARENA_SIZE / CHUNK_SIZE;

/// Number of free-list size classes.
pub const BUCKET_COUNT: usize = 11;

/// Size of the per-block header, in bytes.
pub const HEADER_SIZE: usize = 4;

/// Alignment of the payload pointers handed out by the allocator.
pub const PAYLOAD_ALIGN: usize = 4;

/// Locked version of the [`HalfFitAllocator`].
///
/// It uses a spinlock-based Mutex to ensure interior mutability, which
/// makes it suitable as a `#[global_allocator]`. The inner allocator is
/// initialized under the lock on first use.
///
/// Payloads are only 4-byte aligned, so allocation requests with a
/// stricter alignment are refused rather than served misaligned.
pub struct LockedHalfFitAllocator {
    alloc: Mutex<HalfFitAllocator>,
}

impl LockedHalfFitAllocator {
    pub const fn new() -> Self {
        Self {
            alloc: Mutex::new(HalfFitAllocator::new()),
        }
    }
}

impl Default for LockedHalfFitAllocator {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for LockedHalfFitAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > PAYLOAD_ALIGN {
            return ptr::null_mut();
        }

        let mut allocator = self.alloc.lock();
        if !allocator.is_initialized() {
            allocator.init();
        }
        allocator.alloc(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let mut allocator = self.alloc.lock();
        allocator.free(ptr)
    }
}
