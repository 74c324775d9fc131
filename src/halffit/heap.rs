//! The half-fit allocator core.
//!
//! [`HalfFitAllocator`] owns a 32 KiB arena and hands out chunk-granular
//! blocks from it. Allocation picks the smallest bucket whose blocks are
//! all guaranteed to fit the request, pops its head and splits off any
//! surplus. Freeing merges the block with free physical neighbors before
//! filing it back into a bucket, so two adjacent free blocks never
//! coexist. Every operation is a bounded number of header reads and
//! writes.
//!
//! The allocator is single threaded and non-reentrant. Callers that need
//! to share it wrap it in
//! [`LockedHalfFitAllocator`](super::LockedHalfFitAllocator).

use core::cell::UnsafeCell;
use core::ptr::{self, NonNull};

use crate::err::AllocError;
use crate::{error, info};

use super::bucket::{containing_bucket, guaranteed_bucket, round_up_to_chunk, BucketSet, TOP_BUCKET};
use super::header::{BlockHeader, ChunkIndex, FreeLinks};
use super::{ARENA_SIZE, CHUNK_SIZE, HEADER_SIZE};

/// Backing storage for the allocator.
///
/// The original environment pins this region at a fixed physical address
/// through a linker directive; nothing observes the address, so the arena
/// lives inside the allocator and only the 32-byte alignment is imposed.
/// The cell is required because callers legitimately write through the
/// payload pointers handed out while the allocator itself is borrowed.
#[repr(align(32))]
struct Arena(UnsafeCell<[u8; ARENA_SIZE]>);

impl Arena {
    const fn new() -> Self {
        Self(UnsafeCell::new([0; ARENA_SIZE]))
    }

    fn base(&self) -> *mut u8 {
        self.0.get() as *mut u8
    }
}

/// Outcome of scanning the physical neighbors of a freed block.
struct BlockMerge {
    /// Leftmost block of the merged run.
    merged: ChunkIndex,
    /// Total size of the merged run in bytes.
    new_size: usize,
    /// Physical successor of the merged run.
    new_next: Option<ChunkIndex>,
}

/// Half-fit allocator over a fixed 32 KiB arena.
///
/// The allocator starts out empty and unusable; [`init`](Self::init) must
/// run before the first allocation. All requests are rounded up to the
/// 32-byte chunk quantum, and every returned payload pointer is 4-byte
/// aligned (the payload starts right after the 4-byte block header).
///
/// Re-running `init` resets the arena to a single free block and
/// invalidates every pointer previously handed out; making sure none of
/// them is used afterwards is the caller's responsibility.
pub struct HalfFitAllocator {
    arena: Arena,
    buckets: BucketSet,
    initialized: bool,
}

impl HalfFitAllocator {
    /// Creates an uninitialized allocator with a zeroed arena.
    pub const fn new() -> Self {
        Self {
            arena: Arena::new(),
            buckets: BucketSet::new(),
            initialized: false,
        }
    }

    /// Whether [`init`](Self::init) has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Sets up the arena as a single free block spanning all of it.
    pub fn init(&mut self) {
        let whole = BlockHeader::new()
            .with_prev_phys(ChunkIndex::ZERO.raw())
            .with_next_phys(ChunkIndex::ZERO.raw())
            .with_block_size(ARENA_SIZE);
        self.write_header(ChunkIndex::ZERO, whole);

        self.buckets = BucketSet::new();
        self.freelist_insert(ChunkIndex::ZERO, TOP_BUCKET);
        self.initialized = true;

        info!("halffit", "arena initialized, {} bytes free", ARENA_SIZE);
    }

    /// Allocates a block with at least `size` usable bytes.
    ///
    /// The request grows by the 4-byte header and rounds up to a whole
    /// number of chunks, so even `size == 0` consumes one 32-byte chunk.
    /// Failure leaves the allocator state untouched.
    ///
    /// # Panics
    ///
    /// Panics if the allocator has not been initialized.
    pub fn try_alloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        assert!(self.initialized, "allocator used before init");

        if size > ARENA_SIZE - HEADER_SIZE {
            return Err(AllocError::RequestTooLarge);
        }
        let need = round_up_to_chunk(size + HEADER_SIZE);

        let wanted = guaranteed_bucket(need).ok_or(AllocError::RequestTooLarge)?;
        let bucket = self
            .buckets
            .first_at_or_above(wanted)
            .ok_or(AllocError::OutOfMemory)?;
        let block = self
            .buckets
            .head(bucket)
            .expect("summary bit set on an empty bucket");

        self.freelist_remove(block, bucket);

        let mut header = self.read_header(block);
        let block_size = header.block_size();

        // Split whenever the surplus can carry a block of its own.
        if block_size >= need + CHUNK_SIZE {
            let rest = block.add_chunks(need >> super::CHUNK_SHIFT);
            let rest_size = block_size - need;
            let old_next = header.next_neighbor(block);

            let mut rest_header = BlockHeader::new().with_block_size(rest_size);
            rest_header.set_prev_neighbor(Some(block), rest);
            rest_header.set_next_neighbor(old_next, rest);
            self.write_header(rest, rest_header);

            if let Some(next) = old_next {
                let mut next_header = self.read_header(next);
                next_header.set_prev_neighbor(Some(rest), next);
                self.write_header(next, next_header);
            }

            header.set_block_size(need);
            header.set_next_neighbor(Some(rest), block);
            self.freelist_insert(rest, containing_bucket(rest_size));

            info!(
                "halffit",
                "split chunk {}: keeping {} bytes, {} bytes back on the shelf",
                block.raw(),
                need,
                rest_size
            );
        }

        header.set_allocated(true);
        self.write_header(block, header);

        let payload = unsafe { self.block_ptr(block).add(HEADER_SIZE) };
        Ok(NonNull::new(payload).expect("arena pointer is null"))
    }

    /// Allocates a block with at least `size` usable bytes, returning a
    /// null pointer on failure.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        match self.try_alloc(size) {
            Ok(payload) => payload.as_ptr(),
            Err(err) => {
                error!("halffit", "allocation of {} bytes failed: {:?}", size, err);
                ptr::null_mut()
            }
        }
    }

    /// Releases a block previously returned by [`try_alloc`](Self::try_alloc)
    /// or [`alloc`](Self::alloc). A null pointer is ignored.
    ///
    /// # Safety
    ///
    /// `payload` must be a pointer obtained from this allocator that has
    /// not been freed since, and no reference into the block may outlive
    /// this call. Freeing anything else is undefined behavior.
    pub unsafe fn free(&mut self, payload: *mut u8) {
        if payload.is_null() {
            return;
        }
        assert!(self.initialized, "allocator used before init");

        let base = self.arena.base() as usize;
        let addr = payload as usize;
        debug_assert!(
            addr > base && addr < base + ARENA_SIZE,
            "pointer does not belong to the arena"
        );

        let block = ChunkIndex::from_byte_offset(addr - base - HEADER_SIZE);
        let header = self.read_header(block);
        debug_assert!(header.allocated(), "freeing a block that is not allocated");

        let merge = self.merge_neighbors(block, &header);

        let mut merged_header = self.read_header(merge.merged);
        merged_header.set_block_size(merge.new_size);
        merged_header.set_allocated(false);
        merged_header.set_next_neighbor(merge.new_next, merge.merged);
        self.write_header(merge.merged, merged_header);

        if let Some(next) = merge.new_next {
            let mut next_header = self.read_header(next);
            next_header.set_prev_neighbor(Some(merge.merged), next);
            self.write_header(next, next_header);
        }

        self.freelist_insert(merge.merged, containing_bucket(merge.new_size));
    }

    /// Absorbs the free physical neighbors of `block` into one run.
    ///
    /// Neighbors that take part in the merge are pulled out of their
    /// buckets here; the caller rewrites the surviving header and files
    /// the run.
    fn merge_neighbors(&mut self, block: ChunkIndex, header: &BlockHeader) -> BlockMerge {
        let mut merge = BlockMerge {
            merged: block,
            new_size: header.block_size(),
            new_next: header.next_neighbor(block),
        };

        if let Some(next) = merge.new_next {
            let next_header = self.read_header(next);
            if !next_header.allocated() {
                let next_size = next_header.block_size();
                self.freelist_remove(next, containing_bucket(next_size));
                merge.new_size += next_size;
                merge.new_next = next_header.next_neighbor(next);
            }
        }

        if let Some(prev) = header.prev_neighbor(block) {
            let prev_header = self.read_header(prev);
            if !prev_header.allocated() {
                let prev_size = prev_header.block_size();
                self.freelist_remove(prev, containing_bucket(prev_size));
                merge.new_size += prev_size;
                merge.merged = prev;
            }
        }

        if merge.merged != block || merge.new_size != header.block_size() {
            info!(
                "halffit",
                "coalesced into chunk {} spanning {} bytes",
                merge.merged.raw(),
                merge.new_size
            );
        }

        merge
    }

    /// Pushes `block` at the head of `bucket`.
    fn freelist_insert(&mut self, block: ChunkIndex, bucket: usize) {
        let mut links = FreeLinks::new();
        links.set_prev_in_bucket(None, block);

        match self.buckets.head(bucket) {
            Some(old_head) => {
                let mut old_links = self.read_free_links(old_head);
                old_links.set_prev_in_bucket(Some(block), old_head);
                self.write_free_links(old_head, old_links);
                links.set_next_in_bucket(Some(old_head), block);
            }
            None => links.set_next_in_bucket(None, block),
        }

        self.write_free_links(block, links);
        self.buckets.set_head(bucket, Some(block));
    }

    /// Unlinks `block` from `bucket`, wherever it sits in the list.
    fn freelist_remove(&mut self, block: ChunkIndex, bucket: usize) {
        let links = self.read_free_links(block);
        let prev = links.prev_in_bucket(block);
        let next = links.next_in_bucket(block);

        match prev {
            None => {
                debug_assert_eq!(self.buckets.head(bucket), Some(block), "bucket head mismatch");
                self.buckets.set_head(bucket, next);
                if let Some(next) = next {
                    let mut next_links = self.read_free_links(next);
                    next_links.set_prev_in_bucket(None, next);
                    self.write_free_links(next, next_links);
                }
            }
            Some(prev) => {
                let mut prev_links = self.read_free_links(prev);
                prev_links.set_next_in_bucket(next, prev);
                self.write_free_links(prev, prev_links);
                if let Some(next) = next {
                    let mut next_links = self.read_free_links(next);
                    next_links.set_prev_in_bucket(Some(prev), next);
                    self.write_free_links(next, next_links);
                }
            }
        }
    }

    fn block_ptr(&self, block: ChunkIndex) -> *mut u8 {
        unsafe { self.arena.base().add(block.byte_offset()) }
    }

    fn read_header(&self, block: ChunkIndex) -> BlockHeader {
        let mut bytes = [0u8; HEADER_SIZE];
        unsafe { ptr::copy_nonoverlapping(self.block_ptr(block), bytes.as_mut_ptr(), HEADER_SIZE) };
        BlockHeader::from_bytes(bytes)
    }

    fn write_header(&mut self, block: ChunkIndex, header: BlockHeader) {
        let bytes = header.into_bytes();
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.block_ptr(block), HEADER_SIZE) };
    }

    // The link words share a block with caller data once allocated, so
    // they are only touched while the block is on a free list.

    fn read_free_links(&self, block: ChunkIndex) -> FreeLinks {
        let mut bytes = [0u8; HEADER_SIZE];
        unsafe {
            ptr::copy_nonoverlapping(
                self.block_ptr(block).add(HEADER_SIZE),
                bytes.as_mut_ptr(),
                HEADER_SIZE,
            )
        };
        FreeLinks::from_bytes(bytes)
    }

    fn write_free_links(&mut self, block: ChunkIndex, links: FreeLinks) {
        let bytes = links.into_bytes();
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.block_ptr(block).add(HEADER_SIZE),
                HEADER_SIZE,
            )
        };
    }
}

impl Default for HalfFitAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test_support {
    use super::*;
    use crate::halffit::{BUCKET_COUNT, CHUNK_COUNT};

    /// Snapshot of one block taken while walking the physical chain.
    pub(crate) struct BlockView {
        pub index: ChunkIndex,
        pub size: usize,
        pub allocated: bool,
    }

    impl HalfFitAllocator {
        /// Walks the physical chain from the leftmost block and returns
        /// every block in address order.
        ///
        /// Asserts the structural health of the chain on the way: the
        /// chain covers the arena exactly, links are symmetric, decoded
        /// sizes are legal and free blocks never touch.
        pub(crate) fn walk_blocks(&self) -> Vec<BlockView> {
            let mut blocks = Vec::new();
            let mut index = ChunkIndex::ZERO;
            let mut covered = 0usize;

            let leftmost = self.read_header(index);
            assert_eq!(leftmost.prev_neighbor(index), None, "leftmost block has a predecessor");

            loop {
                assert!(blocks.len() < CHUNK_COUNT, "physical chain does not terminate");

                let header = self.read_header(index);
                let size = header.block_size();
                assert!(size >= CHUNK_SIZE && size <= ARENA_SIZE);
                assert_eq!(index.byte_offset(), covered, "physical chain skips bytes");
                covered += size;

                blocks.push(BlockView {
                    index,
                    size,
                    allocated: header.allocated(),
                });

                match header.next_neighbor(index) {
                    Some(next) => {
                        let next_header = self.read_header(next);
                        assert_eq!(
                            next_header.prev_neighbor(next),
                            Some(index),
                            "asymmetric physical links"
                        );
                        assert!(
                            header.allocated() || next_header.allocated(),
                            "adjacent free blocks left uncoalesced"
                        );
                        index = next;
                    }
                    None => break,
                }
            }

            assert_eq!(covered, ARENA_SIZE, "physical chain does not cover the arena");
            blocks
        }

        /// Verifies every structural invariant of the allocator.
        ///
        /// The physical chain must tile the arena, each free block must
        /// sit in exactly the bucket covering its size, bucket links must
        /// be symmetric and the summary word must mirror bucket
        /// occupancy.
        pub(crate) fn check_consistency(&self) {
            let blocks = self.walk_blocks();

            let mut expected: [Vec<ChunkIndex>; BUCKET_COUNT] = Default::default();
            for block in &blocks {
                if !block.allocated {
                    expected[crate::halffit::bucket::containing_bucket(block.size)]
                        .push(block.index);
                }
            }

            for bucket in 0..BUCKET_COUNT {
                let mut listed = Vec::new();
                let mut prev: Option<ChunkIndex> = None;
                let mut cursor = self.buckets.head(bucket);

                while let Some(block) = cursor {
                    assert!(listed.len() < CHUNK_COUNT, "bucket list does not terminate");

                    let links = self.read_free_links(block);
                    assert_eq!(links.prev_in_bucket(block), prev, "asymmetric bucket links");

                    listed.push(block);
                    prev = Some(block);
                    cursor = links.next_in_bucket(block);
                }

                let mut wanted = expected[bucket].clone();
                wanted.sort_by_key(|index| index.raw());
                listed.sort_by_key(|index| index.raw());
                assert_eq!(listed, wanted, "bucket {bucket} does not match the free blocks");

                assert_eq!(
                    self.buckets.summary() & (1 << bucket) != 0,
                    self.buckets.head(bucket).is_some(),
                    "summary bit out of sync for bucket {bucket}"
                );
            }
        }

        pub(crate) fn bucket_summary(&self) -> u16 {
            self.buckets.summary()
        }

        pub(crate) fn arena_base(&self) -> *mut u8 {
            self.arena.base()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_files_the_whole_arena_in_the_top_bucket() {
        let mut heap = HalfFitAllocator::new();
        assert!(!heap.is_initialized());

        heap.init();

        assert!(heap.is_initialized());
        assert_eq!(heap.bucket_summary(), 1 << TOP_BUCKET);

        let blocks = heap.walk_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].size, ARENA_SIZE);
        assert!(!blocks[0].allocated);
        heap.check_consistency();
    }

    #[test]
    #[should_panic(expected = "allocator used before init")]
    fn allocation_before_init_traps() {
        let mut heap = HalfFitAllocator::new();
        let _ = heap.try_alloc(16);
    }

    #[test]
    fn payload_pointers_skip_the_header() {
        let mut heap = HalfFitAllocator::new();
        heap.init();

        let payload = heap.alloc(28);
        assert!(!payload.is_null());

        let offset = payload as usize - heap.arena_base() as usize;
        assert_eq!(offset, HEADER_SIZE);
        assert_eq!(offset % 4, 0);
    }
}
