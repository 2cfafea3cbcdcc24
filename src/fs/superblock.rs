use super::{BlockNo, Dev, FsType, Ino, InodeRef};
use crate::{
    io::buf::BufferRef,
    sync::sleeplock::{Sleeplock, SleeplockGuard, Sleeplocked},
};
use arrayvec::ArrayVec;
use bitflags::bitflags;

/// Most bitmap blocks a file system can have: 16-bit counts
/// never need more than eight.
pub const MAX_MAP_BLOCKS: usize = 8;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct SuperblockFlags: u8 {
        /// Bitmaps changed since the last write-back.
        const DIRTY = 1 << 0;
    }
}

/// In-core superblock of a mounted file system.
pub struct Superblock {
    pub dev: Dev,
    pub fs: FsType,
    pub ninodes: u32,
    pub nblocks: u32,
    pub imap_blocks: u32,
    pub zmap_blocks: u32,
    pub first_data_block: BlockNo,
    pub max_size: u32,
    /// Inode map, held in the cache while mounted.
    pub imap: ArrayVec<BufferRef, MAX_MAP_BLOCKS>,
    /// Zone map, held in the cache while mounted.
    pub zmap: ArrayVec<BufferRef, MAX_MAP_BLOCKS>,
    pub root: Option<InodeRef>,
    /// No inode below this number is free.
    pub isearch: Ino,
    /// Zone map block to start the next block search at.
    pub zsearch: usize,
    pub flags: SuperblockFlags,
    lock: Sleeplock,
}
impl Superblock {
    pub fn new(dev: Dev, fs: FsType) -> Superblock {
        Superblock {
            dev,
            fs,
            ninodes: 0,
            nblocks: 0,
            imap_blocks: 0,
            zmap_blocks: 0,
            first_data_block: 0,
            max_size: 0,
            imap: ArrayVec::new(),
            zmap: ArrayVec::new(),
            root: None,
            isearch: 1,
            zsearch: 0,
            flags: SuperblockFlags::empty(),
            lock: Sleeplock::new(),
        }
    }

    /// Serialize metadata mutation. Released when the guard drops.
    pub fn lock(&mut self) -> SleeplockGuard<'_, Superblock> {
        SleeplockGuard::new(self)
    }
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Number of data blocks tracked by the zone map.
    pub fn data_blocks(&self) -> u32 {
        self.nblocks.saturating_sub(self.first_data_block)
    }

    /// Bits of bitmap block `block` that describe real resources.
    pub fn map_bits(total: u32, block: usize) -> usize {
        use crate::param::BITS_PER_BLOCK;
        (total as usize)
            .saturating_sub(block * BITS_PER_BLOCK)
            .min(BITS_PER_BLOCK)
    }
}
impl Sleeplocked for Superblock {
    fn sleeplock(&self) -> &Sleeplock {
        &self.lock
    }
}
