//! Minix file system, version 1 layout with 16-bit inode numbers.

pub mod block;
pub mod file;
pub mod inode;
pub mod layout;

use self::layout::{
    write_record, DiskSuperblock, INODES_PER_BLOCK, MAX_FILE_SIZE, SUPER_BLOCK, SUPER_MAGIC,
};
use super::{
    DirSlot, Dev, FsType, Ino, Inode, InodeOps, InodeRef, StatFs, Superblock, Vfs, ROOT_INO,
    S_IFDIR, S_IRGRP, S_IROTH, S_IRWXU, S_IXGRP, S_IXOTH,
};
use crate::{
    error::{Error, Result},
    io::bio::BlockCache,
    param::BITS_PER_BLOCK,
    proc::process::Cred,
};
use zerocopy::byteorder::little_endian::{U16, U32};

pub struct Minix;
impl InodeOps for Minix {
    fn read_super(&self, cache: &mut BlockCache, dev: Dev) -> Result<Superblock> {
        inode::read_super(cache, dev)
    }
    fn write_super(&self, cache: &mut BlockCache, sb: &mut Superblock) -> Result<()> {
        inode::write_super(cache, sb)
    }
    fn put_super(&self, cache: &mut BlockCache, sb: Superblock) -> Result<()> {
        inode::put_super(cache, sb)
    }
    fn statfs(&self, cache: &BlockCache, sb: &Superblock) -> StatFs {
        inode::statfs(cache, sb)
    }

    fn inode_read(&self, vfs: &mut Vfs, dev: Dev, num: Ino) -> Result<Inode> {
        inode::inode_read(vfs, dev, num)
    }
    fn inode_write(&self, vfs: &mut Vfs, ip: InodeRef) -> Result<()> {
        inode::inode_write(vfs, ip)
    }
    fn inode_alloc(&self, vfs: &mut Vfs, dev: Dev, mode: u16, cred: &Cred) -> Result<Inode> {
        inode::inode_alloc(vfs, dev, mode, cred)
    }
    fn inode_free(&self, vfs: &mut Vfs, ip: InodeRef) -> Result<()> {
        inode::inode_free(vfs, ip)
    }
    fn inode_truncate(&self, vfs: &mut Vfs, ip: InodeRef) -> Result<()> {
        inode::inode_truncate(vfs, ip)
    }

    fn file_read(&self, vfs: &mut Vfs, ip: InodeRef, buf: &mut [u8], off: u32) -> Result<usize> {
        file::read(vfs, ip, buf, off)
    }
    fn file_write(&self, vfs: &mut Vfs, ip: InodeRef, buf: &[u8], off: u32) -> Result<usize> {
        file::write(vfs, ip, buf, off)
    }
    fn dir_read(&self, vfs: &mut Vfs, ip: InodeRef, buf: &mut [u8], off: u32) -> Result<usize> {
        // Directories are files of dirent records.
        file::read(vfs, ip, buf, off)
    }
    fn dirent_search(&self, vfs: &mut Vfs, dir: InodeRef, name: &str, create: bool) -> Result<DirSlot> {
        file::dirent_search(vfs, dir, name, create)
    }
    fn dir_add(&self, vfs: &mut Vfs, dir: InodeRef, ino: Ino, name: &str) -> Result<()> {
        file::dir_add(vfs, dir, ino, name)
    }
    fn dir_remove(&self, vfs: &mut Vfs, dir: InodeRef, name: &str, cred: &Cred) -> Result<()> {
        file::dir_remove(vfs, dir, name, cred)
    }
}

/// Make a file system with room for `ninodes` inodes over the first
/// `nblocks` blocks of `dev`. The root directory is owned by `uid`/`gid`.
pub fn mkfs(vfs: &mut Vfs, dev: Dev, ninodes: u32, nblocks: u32, uid: u16, gid: u16) -> Result<()> {
    if vfs.superblock(dev).is_ok() {
        return Err(Error::Busy);
    }
    if ninodes == 0
        || ninodes > u16::MAX as u32
        || nblocks > u16::MAX as u32
        || nblocks > vfs.cache.device_size(dev)?
    {
        return Err(Error::InvalidArgument);
    }

    let imap_blocks = ninodes.div_ceil(BITS_PER_BLOCK as u32).max(1);
    let zmap_blocks = nblocks.div_ceil(BITS_PER_BLOCK as u32).max(1);
    let inode_blocks = ninodes.div_ceil(INODES_PER_BLOCK as u32).max(1);
    let first_data_block = 2 + imap_blocks + zmap_blocks + inode_blocks;
    if nblocks <= first_data_block {
        log::warn!("mkfs: {} blocks cannot hold {} inodes", nblocks, ninodes);
        return Err(Error::InvalidArgument);
    }
    log::info!(
        "mkfs: device {}: {} inodes, {} blocks, data from block {}",
        dev,
        ninodes,
        nblocks,
        first_data_block
    );

    for blk in 0..nblocks {
        let buf = vfs.cache.bzero(dev, blk)?;
        vfs.cache.brelse(buf);
    }

    let disk = DiskSuperblock {
        ninodes: U16::new(ninodes as u16),
        nblocks: U16::new(nblocks as u16),
        imap_blocks: U16::new(imap_blocks as u16),
        zmap_blocks: U16::new(zmap_blocks as u16),
        first_data_block: U16::new(first_data_block as u16),
        pad: U16::new(0),
        max_size: U32::new(MAX_FILE_SIZE),
        magic: U16::new(SUPER_MAGIC),
    };
    let buf = vfs.cache.bread(dev, SUPER_BLOCK)?;
    let written = write_record(vfs.cache.data_mut(&buf), 0, &disk).and_then(|_| vfs.cache.bwrite(&buf));
    vfs.cache.brelse(buf);
    written?;

    vfs.mount_raw(dev, FsType::Minix)?;
    let root = make_root(vfs, dev, uid, gid);
    let put = vfs.unmount_raw(dev);
    root.and(put)
}

fn make_root(vfs: &mut Vfs, dev: Dev, uid: u16, gid: u16) -> Result<()> {
    let owner = Cred {
        uid,
        gid,
        euid: uid,
        egid: gid,
    };
    let mode = S_IFDIR | S_IRWXU | S_IRGRP | S_IXGRP | S_IROTH | S_IXOTH;
    let root = vfs.ialloc(dev, mode, &owner)?;
    if vfs.inode(root).num != ROOT_INO {
        let _ = vfs.iput(root);
        return Err(Error::Corrupted);
    }
    let linked = vfs
        .dir_add(root, ROOT_INO, ".")
        .and_then(|_| vfs.dir_add(root, ROOT_INO, ".."));
    if linked.is_ok() {
        vfs.inode_mut(root).nlinks = 2;
        vfs.touch(root);
    }
    let put = vfs.iput(root);
    linked.and(put)
}
