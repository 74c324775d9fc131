//! Block headers and the compressed chunk addressing they rely on.
//!
//! Every block in the arena starts with a packed 32-bit [`BlockHeader`].
//! Neighbor links do not store real addresses: the arena is at most 1024
//! chunks long, so a 10-bit chunk index is enough to designate any block,
//! and the header stays a single machine word wherever the arena lives.
//!
//! A link holding the index of its own block means "no neighbor". This
//! self-sentinel keeps the encoding symmetric and avoids reserving a
//! dedicated null value in the 10-bit space.

use modular_bitfield::bitfield;
use modular_bitfield::prelude::{B1, B10, B12};

use super::{ARENA_SIZE, CHUNK_COUNT, CHUNK_SHIFT, CHUNK_SIZE};

/// Index of a 32-byte chunk inside the arena.
///
/// Valid values are `0..1024`, so an index always fits the 10-bit link
/// fields of [`BlockHeader`] and [`FreeLinks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChunkIndex(u16);

impl ChunkIndex {
    /// First chunk of the arena.
    pub(crate) const ZERO: Self = Self(0);

    pub(crate) const fn new(raw: u16) -> Self {
        debug_assert!((raw as usize) < CHUNK_COUNT);
        Self(raw)
    }

    pub(crate) const fn raw(self) -> u16 {
        self.0
    }

    /// Byte offset of this chunk from the arena base.
    pub(crate) const fn byte_offset(self) -> usize {
        (self.0 as usize) << CHUNK_SHIFT
    }

    /// Shortens a chunk-aligned byte offset into its chunk index.
    ///
    /// # Panics
    ///
    /// Panics if the offset is not chunk aligned or lies outside the arena.
    pub(crate) fn from_byte_offset(offset: usize) -> Self {
        assert!(
            offset & (CHUNK_SIZE - 1) == 0 && offset < ARENA_SIZE,
            "offset {offset:#x} is not a chunk position"
        );
        Self((offset >> CHUNK_SHIFT) as u16)
    }

    /// Expands a raw 10-bit link relative to the block holding it.
    ///
    /// A link equal to the holder's own index encodes "no neighbor" and
    /// resolves to `None`.
    pub(crate) fn resolve(raw: u16, holder: ChunkIndex) -> Option<Self> {
        if raw == holder.0 {
            None
        } else {
            Some(Self::new(raw))
        }
    }

    /// Index advanced by a whole number of chunks.
    pub(crate) fn add_chunks(self, chunks: usize) -> Self {
        Self::new(self.0 + chunks as u16)
    }
}

/// The header found in the first 4 bytes of every block.
///
/// It has the following structure:
///  ____________________________________________________________
/// | 31 |    30    | 29        20 | 19        10 | 9          0 |
///  ------------------------------------------------------------
/// |  0 | allocated|  size_code   |  next_phys   |  prev_phys   |
///  ------------------------------------------------------------
///
/// `prev_phys` and `next_phys` are the chunk indexes of the physically
/// adjacent blocks, with the self-sentinel convention of [`ChunkIndex`].
/// `size_code` stores the block size in chunks minus one, covering block
/// sizes from one chunk up to the whole arena. The top bit is reserved and
/// always written as zero.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockHeader {
    pub prev_phys: B10,
    pub next_phys: B10,
    pub size_code: B10,
    pub allocated: bool,
    #[skip]
    reserved: B1,
}

impl BlockHeader {
    /// Decoded block size in bytes.
    pub(crate) fn block_size(&self) -> usize {
        (self.size_code() as usize + 1) << CHUNK_SHIFT
    }

    /// Encodes a block size in bytes into the 10-bit size field.
    ///
    /// # Panics
    ///
    /// Panics if the size is zero, not a multiple of the chunk size, or
    /// larger than the arena. Such a size never comes from a valid caller
    /// request and indicates corrupted bookkeeping.
    pub(crate) fn set_block_size(&mut self, bytes: usize) {
        assert!(
            bytes != 0 && bytes & (CHUNK_SIZE - 1) == 0 && bytes <= ARENA_SIZE,
            "unencodable block size {bytes}"
        );
        self.set_size_code(((bytes >> CHUNK_SHIFT) - 1) as u16);
    }

    pub(crate) fn with_block_size(mut self, bytes: usize) -> Self {
        self.set_block_size(bytes);
        self
    }

    /// Physical predecessor of the block holding this header, if any.
    pub(crate) fn prev_neighbor(&self, holder: ChunkIndex) -> Option<ChunkIndex> {
        ChunkIndex::resolve(self.prev_phys(), holder)
    }

    /// Physical successor of the block holding this header, if any.
    pub(crate) fn next_neighbor(&self, holder: ChunkIndex) -> Option<ChunkIndex> {
        ChunkIndex::resolve(self.next_phys(), holder)
    }

    pub(crate) fn set_prev_neighbor(&mut self, link: Option<ChunkIndex>, holder: ChunkIndex) {
        self.set_prev_phys(link.unwrap_or(holder).raw());
    }

    pub(crate) fn set_next_neighbor(&mut self, link: Option<ChunkIndex>, holder: ChunkIndex) {
        self.set_next_phys(link.unwrap_or(holder).raw());
    }
}

/// Bucket links stored in bytes 4..8 of a free block.
///
/// These bytes belong to the caller while the block is allocated, so the
/// links are only meaningful while the `allocated` bit of the block header
/// is clear. The self-sentinel convention marks the bucket head (`prev`)
/// and tail (`next`).
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub(crate) struct FreeLinks {
    pub prev_free: B10,
    pub next_free: B10,
    #[skip]
    reserved: B12,
}

impl FreeLinks {
    /// Previous free block in the same bucket, `None` at the list head.
    pub(crate) fn prev_in_bucket(&self, holder: ChunkIndex) -> Option<ChunkIndex> {
        ChunkIndex::resolve(self.prev_free(), holder)
    }

    /// Next free block in the same bucket, `None` at the list tail.
    pub(crate) fn next_in_bucket(&self, holder: ChunkIndex) -> Option<ChunkIndex> {
        ChunkIndex::resolve(self.next_free(), holder)
    }

    pub(crate) fn set_prev_in_bucket(&mut self, link: Option<ChunkIndex>, holder: ChunkIndex) {
        self.set_prev_free(link.unwrap_or(holder).raw());
    }

    pub(crate) fn set_next_in_bucket(&mut self, link: Option<ChunkIndex>, holder: ChunkIndex) {
        self.set_next_free(link.unwrap_or(holder).raw());
    }
}
