//! On-disk records, little-endian.
//!
//! Block 0 is the boot block and block 1 holds the superblock. The inode
//! map, the zone map and the inode blocks follow, then the data blocks.

use crate::{
    error::{Error, Result},
    fs::{BlockNo, Ino, NAME_MAX, NR_ZONES},
    param::BLOCK_SIZE,
};
use core::mem::size_of;
use zerocopy::{
    byteorder::little_endian::{U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

pub const SUPER_MAGIC: u16 = 0x137f;
/// Block holding the superblock.
pub const SUPER_BLOCK: BlockNo = 1;
/// Largest file the format can describe, as recorded by mkfs.
pub const MAX_FILE_SIZE: u32 = 67641344;

pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / size_of::<DiskInode>();
pub const DIRENT_SIZE: usize = size_of::<DiskDirent>();
pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;
/// Zone pointers held by an indirect block.
pub const ZONES_PER_BLOCK: usize = BLOCK_SIZE / size_of::<u32>();

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct DiskSuperblock {
    pub ninodes: U16,
    pub nblocks: U16,
    pub imap_blocks: U16,
    pub zmap_blocks: U16,
    pub first_data_block: U16,
    pub pad: U16,
    pub max_size: U32,
    pub magic: U16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct DiskInode {
    pub mode: U16,
    pub nlinks: U16,
    pub uid: U16,
    pub gid: U16,
    pub size: U32,
    pub time: U32,
    pub zones: [U32; NR_ZONES],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct DiskDirent {
    pub ino: U16,
    pub name: [u8; NAME_MAX],
}
impl DiskDirent {
    pub fn new(ino: Ino, name: &str) -> DiskDirent {
        let mut dirent = DiskDirent {
            ino: U16::new(ino),
            name: [0; NAME_MAX],
        };
        let len = name.len().min(NAME_MAX);
        dirent.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        dirent
    }

    /// Compare like `strncmp(name, other, NAME_MAX)`.
    pub fn name_matches(&self, other: &str) -> bool {
        let stored = self.name.iter().position(|b| *b == 0).unwrap_or(NAME_MAX);
        let other = &other.as_bytes()[..other.len().min(NAME_MAX)];
        &self.name[..stored] == other
    }
}

/// Copy record `index` of type `T` out of a block.
pub fn read_record<T: FromBytes>(data: &[u8], index: usize) -> Result<T> {
    let size = size_of::<T>();
    data.get(index * size..(index + 1) * size)
        .and_then(|bytes| T::read_from_bytes(bytes).ok())
        .ok_or(Error::Corrupted)
}

/// Overwrite record `index` of a block with `record`.
pub fn write_record<T: IntoBytes + Immutable>(data: &mut [u8], index: usize, record: &T) -> Result<()> {
    let size = size_of::<T>();
    data.get_mut(index * size..(index + 1) * size)
        .ok_or(Error::Corrupted)?
        .copy_from_slice(record.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_have_the_disk_sizes() {
        assert_eq!(size_of::<DiskSuperblock>(), 18);
        assert_eq!(size_of::<DiskInode>(), 52);
        assert_eq!(DIRENT_SIZE, 16);
        assert_eq!(INODES_PER_BLOCK, 19);
        assert_eq!(DIRENTS_PER_BLOCK, 64);
        assert_eq!(ZONES_PER_BLOCK, 256);
    }

    #[test]
    fn superblock_fields_are_little_endian() {
        let mut block = [0u8; BLOCK_SIZE];
        let sb = DiskSuperblock {
            ninodes: U16::new(0x0102),
            nblocks: U16::new(0),
            imap_blocks: U16::new(1),
            zmap_blocks: U16::new(1),
            first_data_block: U16::new(0),
            pad: U16::new(0),
            max_size: U32::new(MAX_FILE_SIZE),
            magic: U16::new(SUPER_MAGIC),
        };
        write_record(&mut block, 0, &sb).unwrap();
        assert_eq!(&block[..2], &[0x02, 0x01]);
        assert_eq!(&block[16..18], &[0x7f, 0x13]);

        let back: DiskSuperblock = read_record(&block, 0).unwrap();
        assert_eq!(back.magic.get(), SUPER_MAGIC);
    }

    #[test]
    fn dirent_names_are_bounded() {
        let d = DiskDirent::new(3, "a-very-long-file-name");
        assert_eq!(&d.name, b"a-very-long-fi");
        assert!(d.name_matches("a-very-long-fi"));
        assert!(d.name_matches("a-very-long-file"));
        assert!(!d.name_matches("a-very"));

        let short = DiskDirent::new(3, "foo");
        assert!(short.name_matches("foo"));
        assert!(!short.name_matches("fo"));
        assert!(!short.name_matches("food"));
    }

    #[test]
    fn out_of_block_records_are_corrupt() {
        let block = [0u8; BLOCK_SIZE];
        assert_eq!(
            read_record::<DiskInode>(&block, INODES_PER_BLOCK).map(|_| ()),
            Err(Error::Corrupted)
        );
        assert!(read_record::<DiskDirent>(&block, DIRENTS_PER_BLOCK - 1).is_ok());
    }
}
