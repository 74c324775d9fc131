//! Size classes and the per-class free list heads.
//!
//! Free blocks are segregated into 11 buckets by size. Bucket `k` covers
//! block sizes `32 << k` up to `(32 << (k + 1)) - 1` bytes, except for the
//! last bucket which only ever holds a block spanning the whole arena.
//! An 11-bit summary word mirrors which buckets are non-empty, so finding
//! the smallest usable class is a couple of bit operations instead of a
//! walk over the heads.

use super::header::ChunkIndex;
use super::{ARENA_SIZE, BUCKET_COUNT, CHUNK_SHIFT, CHUNK_SIZE};

/// Index of the bucket holding the arena-spanning block.
pub(crate) const TOP_BUCKET: usize = BUCKET_COUNT - 1;

/// Rounds a byte count up to the next chunk boundary.
pub(crate) const fn round_up_to_chunk(bytes: usize) -> usize {
    (bytes + (CHUNK_SIZE - 1)) & !(CHUNK_SIZE - 1)
}

/// Bucket whose size range contains `size`.
///
/// This is the class a free block of that size is filed under. `size` must
/// be a valid block size (a chunk multiple within the arena).
pub(crate) fn containing_bucket(size: usize) -> usize {
    debug_assert!(
        size >= CHUNK_SIZE && size <= ARENA_SIZE && size & (CHUNK_SIZE - 1) == 0,
        "not a block size: {size}"
    );

    let chunks = size >> CHUNK_SHIFT;
    (usize::BITS - 1 - chunks.leading_zeros()) as usize
}

/// Smallest bucket in which every block is at least `size` bytes.
///
/// Allocation pulls from this class so that the head of a non-empty bucket
/// is always large enough, without inspecting individual blocks. When
/// `size` is exactly a class boundary this is the containing bucket,
/// otherwise the one above it. Returns `None` when no block could ever
/// satisfy the request.
pub(crate) fn guaranteed_bucket(size: usize) -> Option<usize> {
    if size > ARENA_SIZE {
        return None;
    }

    let chunks = round_up_to_chunk(size) >> CHUNK_SHIFT;
    Some(chunks.next_power_of_two().trailing_zeros() as usize)
}

/// Heads of the 11 bucket lists, plus the non-empty summary word.
///
/// The two are kept in strict sync: bit `k` of the summary is set exactly
/// when `heads[k]` holds a block. The actual list links live inside the
/// free blocks themselves (see
/// [`FreeLinks`](super::header::FreeLinks)), so this type only tracks the
/// entry points.
pub(crate) struct BucketSet {
    heads: [Option<ChunkIndex>; BUCKET_COUNT],
    summary: u16,
}

impl BucketSet {
    pub(crate) const fn new() -> Self {
        Self {
            heads: [None; BUCKET_COUNT],
            summary: 0,
        }
    }

    pub(crate) fn head(&self, bucket: usize) -> Option<ChunkIndex> {
        self.heads[bucket]
    }

    /// Replaces the head of `bucket`, keeping the summary bit in sync.
    pub(crate) fn set_head(&mut self, bucket: usize, head: Option<ChunkIndex>) {
        self.heads[bucket] = head;
        if head.is_some() {
            self.summary |= 1 << bucket;
        } else {
            self.summary &= !(1 << bucket);
        }
    }

    /// Smallest non-empty bucket at or above `bucket`, if any.
    pub(crate) fn first_at_or_above(&self, bucket: usize) -> Option<usize> {
        let candidates = self.summary & !((1u16 << bucket) - 1);
        if candidates == 0 {
            None
        } else {
            Some(candidates.trailing_zeros() as usize)
        }
    }

    pub(crate) fn summary(&self) -> u16 {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containing_bucket_matches_class_table() {
        let table = [
            (32, 0),
            (64, 1),
            (96, 1),
            (128, 2),
            (256, 3),
            (512, 4),
            (1024, 5),
            (2048, 6),
            (4096, 7),
            (8192, 8),
            (16384, 9),
            (32736, 9),
            (32768, 10),
        ];
        for (size, bucket) in table {
            assert_eq!(containing_bucket(size), bucket, "size {size}");
        }
    }

    #[test]
    fn guaranteed_bucket_rounds_up_between_boundaries() {
        assert_eq!(guaranteed_bucket(32), Some(0));
        assert_eq!(guaranteed_bucket(33), Some(1));
        assert_eq!(guaranteed_bucket(64), Some(1));
        assert_eq!(guaranteed_bucket(65), Some(2));
        assert_eq!(guaranteed_bucket(16384), Some(9));
        assert_eq!(guaranteed_bucket(16416), Some(10));
        assert_eq!(guaranteed_bucket(32768), Some(10));
    }

    #[test]
    fn guaranteed_bucket_refuses_oversized_requests() {
        assert_eq!(guaranteed_bucket(ARENA_SIZE + 1), None);
    }

    #[test]
    fn round_up_masks_low_bits() {
        assert_eq!(round_up_to_chunk(0), 0);
        assert_eq!(round_up_to_chunk(1), 32);
        assert_eq!(round_up_to_chunk(32), 32);
        assert_eq!(round_up_to_chunk(33), 64);
        assert_eq!(round_up_to_chunk(104), 128);
    }

    #[test]
    fn summary_tracks_heads() {
        let mut set = BucketSet::new();
        assert_eq!(set.summary(), 0);
        assert_eq!(set.first_at_or_above(0), None);

        set.set_head(3, Some(ChunkIndex::new(12)));
        set.set_head(10, Some(ChunkIndex::ZERO));
        assert_eq!(set.summary(), (1 << 3) | (1 << 10));

        assert_eq!(set.first_at_or_above(0), Some(3));
        assert_eq!(set.first_at_or_above(3), Some(3));
        assert_eq!(set.first_at_or_above(4), Some(10));
        assert_eq!(set.first_at_or_above(10), Some(10));

        set.set_head(3, None);
        assert_eq!(set.summary(), 1 << 10);
        assert_eq!(set.first_at_or_above(0), Some(10));

        set.set_head(10, None);
        assert_eq!(set.first_at_or_above(0), None);
    }
}
