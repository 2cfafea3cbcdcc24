use crate::{
    fs::{BlockNo, Dev},
    param::BLOCK_SIZE,
};
use bitflags::bitflags;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct BufferFlags: u8 {
        /// Data has been read from disk.
        const VALID = 1 << 0;
        /// Data differs from the disk copy.
        const DIRTY = 1 << 1;
        /// Handed out to at least one caller.
        const LOCKED = 1 << 2;
    }
}

/// One disk block resident in memory.
pub struct Buffer {
    pub dev: Dev,
    pub blockno: BlockNo,
    pub flags: BufferFlags,
    pub refcnt: u32,
    /// Cache clock value at the last release, for LRU recycling.
    pub last_use: u64,
    pub data: [u8; BLOCK_SIZE],
}
impl Buffer {
    pub const fn new(dev: Dev, blockno: BlockNo) -> Buffer {
        Buffer {
            dev,
            blockno,
            flags: BufferFlags::empty(),
            refcnt: 0,
            last_use: 0,
            data: [0u8; BLOCK_SIZE],
        }
    }
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(BufferFlags::DIRTY)
    }
    pub fn is_valid(&self) -> bool {
        self.flags.contains(BufferFlags::VALID)
    }
}

/// A reference to a cached block, obtained from `bread` and given back
/// with `brelse`. Deliberately not `Clone`: each handle is one reference.
#[derive(Debug, PartialEq, Eq)]
pub struct BufferRef {
    pub(super) slot: usize,
}
