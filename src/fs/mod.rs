//! File system layer.
//!
//! `Vfs` owns the block cache, the mounted superblocks and the in-core
//! inode table. File system specific work is dispatched through
//! [`InodeOps`], selected by the [`FsType`] tag carried by superblocks
//! and inodes.

pub mod bitmap;
pub mod inode;
pub mod minix;
pub mod superblock;

pub use inode::{Inode, InodeFlags, InodeRef, InodeTable};
pub use superblock::{Superblock, SuperblockFlags};

use crate::{
    error::{Error, Result},
    hardware::BlockDevice,
    io::bio::BlockCache,
    param::{MAXPATH, NSUPER},
    proc::process::Cred,
};
use alloc::boxed::Box;
use arrayvec::ArrayVec;

/// Device number.
pub type Dev = u32;
/// Disk block number.
pub type BlockNo = u32;
/// Inode number.
pub type Ino = u16;

pub const BLOCK_NULL: BlockNo = 0;
pub const INODE_NULL: Ino = 0;
/// Inode number of a file system's root directory.
pub const ROOT_INO: Ino = 1;

pub const NR_ZONES_DIRECT: usize = 7;
pub const NR_ZONES_SINGLE: usize = 1;
pub const NR_ZONES_DOUBLE: usize = 1;
pub const NR_ZONES: usize = NR_ZONES_DIRECT + NR_ZONES_SINGLE + NR_ZONES_DOUBLE;
/// Zone index of the singly indirect block.
pub const ZONE_SINGLE: usize = NR_ZONES_DIRECT;
/// Zone index of the doubly indirect block.
pub const ZONE_DOUBLE: usize = NR_ZONES_DIRECT + NR_ZONES_SINGLE;

/// Longest file name component.
pub const NAME_MAX: usize = 14;

pub const S_IFMT: u16 = 0o170000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFBLK: u16 = 0o060000;
pub const S_IFDIR: u16 = 0o040000;
pub const S_IFCHR: u16 = 0o020000;
pub const S_IRWXU: u16 = 0o700;
pub const S_IRUSR: u16 = 0o400;
pub const S_IWUSR: u16 = 0o200;
pub const S_IXUSR: u16 = 0o100;
pub const S_IRWXG: u16 = 0o070;
pub const S_IRGRP: u16 = 0o040;
pub const S_IWGRP: u16 = 0o020;
pub const S_IXGRP: u16 = 0o010;
pub const S_IRWXO: u16 = 0o007;
pub const S_IROTH: u16 = 0o004;
pub const S_IWOTH: u16 = 0o002;
pub const S_IXOTH: u16 = 0o001;

pub const MAY_READ: u16 = 4;
pub const MAY_WRITE: u16 = 2;
pub const MAY_EXEC: u16 = 1;
pub const MAY_ALL: u16 = MAY_READ | MAY_WRITE | MAY_EXEC;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FsType {
    #[default]
    Minix,
}
impl FsType {
    pub fn ops(self) -> &'static dyn InodeOps {
        match self {
            FsType::Minix => &minix::Minix,
        }
    }
}

/// Location of a directory entry: record `index` of disk block `block`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DirSlot {
    pub block: BlockNo,
    pub index: usize,
    /// Inode named by the entry, `INODE_NULL` for a fresh slot.
    pub ino: Ino,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatFs {
    pub ninodes: u32,
    pub free_inodes: u32,
    pub nblocks: u32,
    pub free_blocks: u32,
}

/// Operations a file system backend provides.
pub trait InodeOps: Sync {
    /// Read and validate the superblock of `dev`, pinning its bitmaps.
    fn read_super(&self, cache: &mut BlockCache, dev: Dev) -> Result<Superblock>;
    /// Write the bitmaps back if they changed since the last call.
    fn write_super(&self, cache: &mut BlockCache, sb: &mut Superblock) -> Result<()>;
    /// Write back and unpin everything a superblock holds.
    fn put_super(&self, cache: &mut BlockCache, sb: Superblock) -> Result<()>;
    fn statfs(&self, cache: &BlockCache, sb: &Superblock) -> StatFs;

    fn inode_read(&self, vfs: &mut Vfs, dev: Dev, num: Ino) -> Result<Inode>;
    fn inode_write(&self, vfs: &mut Vfs, ip: InodeRef) -> Result<()>;
    fn inode_alloc(&self, vfs: &mut Vfs, dev: Dev, mode: u16, cred: &Cred) -> Result<Inode>;
    fn inode_free(&self, vfs: &mut Vfs, ip: InodeRef) -> Result<()>;
    fn inode_truncate(&self, vfs: &mut Vfs, ip: InodeRef) -> Result<()>;

    fn file_read(&self, vfs: &mut Vfs, ip: InodeRef, buf: &mut [u8], off: u32) -> Result<usize>;
    fn file_write(&self, vfs: &mut Vfs, ip: InodeRef, buf: &[u8], off: u32) -> Result<usize>;
    fn dir_read(&self, vfs: &mut Vfs, ip: InodeRef, buf: &mut [u8], off: u32) -> Result<usize>;
    fn dirent_search(&self, vfs: &mut Vfs, dir: InodeRef, name: &str, create: bool) -> Result<DirSlot>;
    fn dir_add(&self, vfs: &mut Vfs, dir: InodeRef, ino: Ino, name: &str) -> Result<()>;
    fn dir_remove(&self, vfs: &mut Vfs, dir: InodeRef, name: &str, cred: &Cred) -> Result<()>;
}

/// Check `cred` against the mode bits of `ip`. True if every bit of
/// `mask` is granted.
pub fn permission(ip: &Inode, cred: &Cred, mask: u16) -> bool {
    let granted = if cred.is_superuser() {
        if ip.is_dir() || ip.mode & (S_IXUSR | S_IXGRP | S_IXOTH) != 0 {
            MAY_ALL
        } else {
            MAY_READ | MAY_WRITE
        }
    } else if cred.euid == ip.uid {
        (ip.mode >> 6) & 7
    } else if cred.egid == ip.gid {
        (ip.mode >> 3) & 7
    } else {
        ip.mode & 7
    };
    granted & mask == mask
}

pub struct Vfs {
    pub cache: BlockCache,
    supers: ArrayVec<Superblock, NSUPER>,
    inodes: InodeTable,
    /// Device holding "/".
    root_dev: Option<Dev>,
    /// Timestamp given to touched inodes.
    time: u32,
}
impl Vfs {
    pub fn new() -> Vfs {
        Vfs {
            cache: BlockCache::new(),
            supers: ArrayVec::new(),
            inodes: InodeTable::new(),
            root_dev: None,
            time: 0,
        }
    }

    pub fn attach(&mut self, dev: Dev, device: Box<dyn BlockDevice>) -> Result<()> {
        self.cache.attach(dev, device)
    }

    pub fn set_time(&mut self, now: u32) {
        self.time = now;
    }
    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn superblock(&self, dev: Dev) -> Result<&Superblock> {
        self.supers
            .iter()
            .find(|sb| sb.dev == dev)
            .ok_or(Error::NotFound)
    }
    pub fn superblock_mut(&mut self, dev: Dev) -> Result<&mut Superblock> {
        self.supers
            .iter_mut()
            .find(|sb| sb.dev == dev)
            .ok_or(Error::NotFound)
    }

    /// Borrow the cache, the superblock and the inode behind `ip` at once.
    pub(crate) fn split(
        &mut self,
        ip: InodeRef,
    ) -> Result<(&mut BlockCache, &mut Superblock, &mut Inode)> {
        let inode = self.inodes.get_mut(ip);
        let sb = self
            .supers
            .iter_mut()
            .find(|sb| sb.dev == inode.dev)
            .ok_or(Error::NotFound)?;
        Ok((&mut self.cache, sb, inode))
    }

    /// Lay out a fresh file system on `dev`.
    pub fn mkfs(&mut self, dev: Dev, ninodes: u32, nblocks: u32, uid: u16, gid: u16) -> Result<()> {
        minix::mkfs(self, dev, ninodes, nblocks, uid, gid)
    }

    /// Read the superblock of `dev` without looking at any inode.
    pub(crate) fn mount_raw(&mut self, dev: Dev, fs: FsType) -> Result<()> {
        if self.supers.iter().any(|sb| sb.dev == dev) {
            return Err(Error::Busy);
        }
        if self.supers.is_full() {
            return Err(Error::OutOfSpace);
        }
        let sb = fs.ops().read_super(&mut self.cache, dev)?;
        self.supers.push(sb);
        Ok(())
    }

    /// Drop the superblock of `dev`, writing everything back.
    pub(crate) fn unmount_raw(&mut self, dev: Dev) -> Result<()> {
        let i = self
            .supers
            .iter()
            .position(|sb| sb.dev == dev)
            .ok_or(Error::NotFound)?;
        let sb = self.supers.remove(i);
        sb.fs.ops().put_super(&mut self.cache, sb)
    }

    /// Mount the file system on `dev`. The first mount provides "/".
    pub fn mount(&mut self, dev: Dev) -> Result<()> {
        self.mount_raw(dev, FsType::Minix)?;
        let root = match self.iget(dev, ROOT_INO) {
            Ok(root) if self.inode(root).is_dir() => root,
            Ok(root) => {
                let _ = self.iput(root);
                let _ = self.unmount_raw(dev);
                return Err(Error::Corrupted);
            }
            Err(err) => {
                let _ = self.unmount_raw(dev);
                return Err(err);
            }
        };
        self.superblock_mut(dev)?.root = Some(root);
        if self.root_dev.is_none() {
            self.root_dev = Some(dev);
        }
        log::info!("fs: mounted device {}", dev);
        Ok(())
    }

    /// Unmount `dev`. Fails with `Busy` while any of its inodes other
    /// than the root is referenced.
    pub fn unmount(&mut self, dev: Dev) -> Result<()> {
        let root = self.superblock(dev)?.root;
        let busy = self.inodes.referenced(dev).any(|ip| {
            Some(ip) != root || self.inodes.get(ip).count > 1
        });
        if busy {
            return Err(Error::Busy);
        }
        if let Some(root) = root {
            self.superblock_mut(dev)?.root = None;
            self.iput(root)?;
        }
        self.unmount_raw(dev)?;
        if self.root_dev == Some(dev) {
            self.root_dev = None;
        }
        log::info!("fs: unmounted device {}", dev);
        Ok(())
    }

    /// Write back every dirty inode and buffer.
    pub fn sync(&mut self) -> Result<()> {
        let dirty: ArrayVec<InodeRef, { crate::param::NINODE }> = self
            .supers
            .iter()
            .flat_map(|sb| self.inodes.referenced(sb.dev))
            .filter(|ip| self.inodes.get(*ip).is_dirty())
            .collect();
        for ip in dirty {
            self.inode(ip).fs.ops().inode_write(self, ip)?;
        }
        for sb in self.supers.iter_mut() {
            sb.fs.ops().write_super(&mut self.cache, sb)?;
        }
        self.cache.sync()
    }

    pub fn statfs(&self, dev: Dev) -> Result<StatFs> {
        let sb = self.superblock(dev)?;
        Ok(sb.fs.ops().statfs(&self.cache, sb))
    }

    /// Reference inode `num` of `dev`, reading it in if needed.
    pub fn iget(&mut self, dev: Dev, num: Ino) -> Result<InodeRef> {
        if let Some(ip) = self.inodes.find(dev, num) {
            self.inodes.get_mut(ip).count += 1;
            return Ok(ip);
        }
        let slot = self.inodes.free_slot().ok_or_else(|| {
            log::warn!("fs: inode table overflow");
            Error::OutOfSpace
        })?;
        let fs = self.superblock(dev)?.fs;
        let mut inode = fs.ops().inode_read(self, dev, num)?;
        inode.count = 1;
        self.inodes.install(slot, inode);
        Ok(slot)
    }

    /// Take another reference on `ip`.
    pub fn idup(&mut self, ip: InodeRef) -> InodeRef {
        self.inodes.get_mut(ip).count += 1;
        ip
    }

    /// Drop a reference. The last reference writes the inode back, and
    /// releases its blocks and number when no link is left.
    pub fn iput(&mut self, ip: InodeRef) -> Result<()> {
        let inode = self.inodes.get_mut(ip);
        if inode.count == 0 {
            panic!("iput");
        }
        if inode.count > 1 {
            inode.count -= 1;
            return Ok(());
        }
        let ops = inode.fs.ops();
        let unlinked = inode.nlinks == 0;
        let result = if unlinked {
            ops.inode_truncate(self, ip)
                .and_then(|_| ops.inode_free(self, ip))
                .and_then(|_| ops.inode_write(self, ip))
        } else {
            ops.inode_write(self, ip)
        };
        self.inodes.get_mut(ip).count = 0;
        result
    }

    pub fn inode(&self, ip: InodeRef) -> &Inode {
        self.inodes.get(ip)
    }
    pub fn inode_mut(&mut self, ip: InodeRef) -> &mut Inode {
        self.inodes.get_mut(ip)
    }

    /// Stamp `ip` with the current time and mark it for write-back.
    pub fn touch(&mut self, ip: InodeRef) {
        let now = self.time;
        self.inodes.get_mut(ip).touch(now);
    }

    /// Allocate a fresh inode on `dev`, owned by `cred`, referenced once.
    pub fn ialloc(&mut self, dev: Dev, mode: u16, cred: &Cred) -> Result<InodeRef> {
        let slot = self.inodes.free_slot().ok_or(Error::OutOfSpace)?;
        let fs = self.superblock(dev)?.fs;
        let mut inode = fs.ops().inode_alloc(self, dev, mode, cred)?;
        inode.count = 1;
        self.inodes.install(slot, inode);
        Ok(slot)
    }

    /// Release every block of `ip` and set its size to zero.
    pub fn truncate(&mut self, ip: InodeRef) -> Result<()> {
        self.inode(ip).fs.ops().inode_truncate(self, ip)
    }

    pub fn read(&mut self, ip: InodeRef, buf: &mut [u8], off: u32) -> Result<usize> {
        let inode = self.inode(ip);
        let ops = inode.fs.ops();
        if inode.is_dir() {
            ops.dir_read(self, ip, buf, off)
        } else {
            ops.file_read(self, ip, buf, off)
        }
    }

    pub fn write(&mut self, ip: InodeRef, buf: &[u8], off: u32) -> Result<usize> {
        let inode = self.inode(ip);
        if inode.is_dir() {
            return Err(Error::InvalidArgument);
        }
        inode.fs.ops().file_write(self, ip, buf, off)
    }

    pub fn dirent_search(&mut self, dir: InodeRef, name: &str, create: bool) -> Result<DirSlot> {
        self.inode(dir).fs.ops().dirent_search(self, dir, name, create)
    }
    pub fn dir_add(&mut self, dir: InodeRef, ino: Ino, name: &str) -> Result<()> {
        self.inode(dir).fs.ops().dir_add(self, dir, ino, name)
    }
    pub fn dir_remove(&mut self, dir: InodeRef, name: &str, cred: &Cred) -> Result<()> {
        self.inode(dir).fs.ops().dir_remove(self, dir, name, cred)
    }

    /// Reference the inode `name` names in `dir`.
    pub fn lookup(&mut self, dir: InodeRef, name: &str) -> Result<InodeRef> {
        let slot = self.dirent_search(dir, name, false)?;
        let dev = self.inode(dir).dev;
        self.iget(dev, slot.ino)
    }

    /// Create a regular file `name` in `dir`.
    pub fn create(&mut self, dir: InodeRef, name: &str, mode: u16, cred: &Cred) -> Result<InodeRef> {
        if !permission(self.inode(dir), cred, MAY_WRITE) {
            return Err(Error::PermissionDenied);
        }
        let dev = self.inode(dir).dev;
        let ip = self.ialloc(dev, S_IFREG | (mode & !S_IFMT), cred)?;
        let num = self.inode(ip).num;
        if let Err(err) = self.dir_add(dir, num, name) {
            self.inode_mut(ip).nlinks = 0;
            let _ = self.iput(ip);
            return Err(err);
        }
        Ok(ip)
    }

    /// Create an empty directory `name` in `dir`.
    pub fn mkdir(&mut self, dir: InodeRef, name: &str, mode: u16, cred: &Cred) -> Result<InodeRef> {
        if !permission(self.inode(dir), cred, MAY_WRITE) {
            return Err(Error::PermissionDenied);
        }
        match self.dirent_search(dir, name, false) {
            Ok(_) => return Err(Error::Exists),
            Err(Error::NotFound) => {}
            Err(err) => return Err(err),
        }
        let (dev, parent) = (self.inode(dir).dev, self.inode(dir).num);
        let ip = self.ialloc(dev, S_IFDIR | (mode & !S_IFMT), cred)?;
        let num = self.inode(ip).num;
        let linked = self
            .dir_add(ip, num, ".")
            .and_then(|_| self.dir_add(ip, parent, ".."))
            .and_then(|_| self.dir_add(dir, num, name));
        if let Err(err) = linked {
            self.inode_mut(ip).nlinks = 0;
            let _ = self.iput(ip);
            return Err(err);
        }
        self.inode_mut(ip).nlinks = 2;
        self.touch(ip);
        self.inode_mut(dir).nlinks += 1;
        self.touch(dir);
        Ok(ip)
    }

    /// Remove the empty directory `name` from `dir` and release it.
    pub fn rmdir(&mut self, dir: InodeRef, name: &str, cred: &Cred) -> Result<()> {
        if !permission(self.inode(dir), cred, MAY_WRITE) {
            return Err(Error::PermissionDenied);
        }
        let target = self.lookup(dir, name)?;
        let result = if !self.inode(target).is_dir() {
            Err(Error::InvalidArgument)
        } else {
            self.dir_remove(dir, name, cred)
        };
        if result.is_ok() {
            // Drop the "." and ".." links the directory held.
            let inode = self.inode_mut(target);
            inode.nlinks = inode.nlinks.saturating_sub(1);
            self.touch(target);
            let parent = self.inode_mut(dir);
            parent.nlinks = parent.nlinks.saturating_sub(1);
            self.touch(dir);
        }
        let put = self.iput(target);
        result.and(put)
    }

    /// Root directory of the root file system, referenced.
    pub fn root(&mut self) -> Result<InodeRef> {
        let dev = self.root_dev.ok_or(Error::NotFound)?;
        let root = self.superblock(dev)?.root.ok_or(Error::NotFound)?;
        Ok(self.idup(root))
    }

    /// Resolve `path` to the directory holding its last component, which
    /// is returned alongside. The directory is referenced.
    pub fn dname<'p>(&mut self, path: &'p str, cwd: InodeRef) -> Result<(InodeRef, &'p str)> {
        if path.is_empty() || path.len() >= MAXPATH {
            return Err(Error::InvalidArgument);
        }
        let (dir_path, name) = match path.trim_end_matches('/').rsplit_once('/') {
            Some((dir_path, name)) => (if dir_path.is_empty() { "/" } else { dir_path }, name),
            None => (".", path.trim_end_matches('/')),
        };
        if name.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let dir = self.namei(dir_path, cwd)?;
        if !self.inode(dir).is_dir() {
            let _ = self.iput(dir);
            return Err(Error::NotFound);
        }
        Ok((dir, name))
    }

    /// Resolve `path`, absolute or relative to `cwd`, to a referenced inode.
    pub fn namei(&mut self, path: &str, cwd: InodeRef) -> Result<InodeRef> {
        if path.len() >= MAXPATH {
            return Err(Error::InvalidArgument);
        }
        let mut ip = if path.starts_with('/') {
            self.root()?
        } else {
            self.idup(cwd)
        };
        for name in path.split('/').filter(|c| !c.is_empty()) {
            if !self.inode(ip).is_dir() {
                let _ = self.iput(ip);
                return Err(Error::NotFound);
            }
            let next = self.lookup(ip, name);
            self.iput(ip)?;
            ip = next?;
        }
        Ok(ip)
    }
}
impl Default for Vfs {
    fn default() -> Vfs {
        Vfs::new()
    }
}
