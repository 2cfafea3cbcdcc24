//! File data transfer and directory entries.

use super::{
    block::block_map,
    layout::{read_record, write_record, DiskDirent, DIRENTS_PER_BLOCK, DIRENT_SIZE},
};
use crate::{
    error::{Error, Result},
    fs::{DirSlot, Ino, InodeRef, Vfs, BLOCK_NULL, INODE_NULL},
    param::BLOCK_SIZE,
    proc::process::Cred,
};

/// A transfer that failed after moving some bytes reports those bytes.
fn partial(done: usize, err: Error) -> Result<usize> {
    if done > 0 {
        Ok(done)
    } else {
        Err(err)
    }
}

/// Copy bytes of `ip` starting at `off` into `buf`. Stops at end of
/// file or at a hole.
pub fn read(vfs: &mut Vfs, ip: InodeRef, buf: &mut [u8], off: u32) -> Result<usize> {
    let now = vfs.time;
    let (cache, sb, inode) = vfs.split(ip)?;
    let mut off = off as usize;
    let mut done = 0;

    while done < buf.len() {
        let remaining = (inode.size as usize).saturating_sub(off);
        if remaining == 0 {
            break;
        }
        let blk = match block_map(cache, sb, inode, off, false, now) {
            Ok(BLOCK_NULL) => break,
            Ok(blk) => blk,
            Err(err) => return partial(done, err),
        };
        let blkoff = off % BLOCK_SIZE;
        let chunk = (buf.len() - done).min(BLOCK_SIZE - blkoff).min(remaining);
        let dst = &mut buf[done..done + chunk];
        if let Err(err) = cache.with_block(inode.dev, blk, |data| {
            dst.copy_from_slice(&data[blkoff..blkoff + chunk])
        }) {
            return partial(done, err);
        }
        done += chunk;
        off += chunk;
    }
    Ok(done)
}

/// Copy `buf` into `ip` starting at `off`, allocating blocks and growing
/// the file as needed.
pub fn write(vfs: &mut Vfs, ip: InodeRef, buf: &[u8], off: u32) -> Result<usize> {
    let now = vfs.time;
    let (cache, sb, inode) = vfs.split(ip)?;
    let mut off = off as usize;
    let mut done = 0;

    while done < buf.len() {
        let blk = match block_map(cache, sb, inode, off, true, now) {
            Ok(BLOCK_NULL) => break,
            Ok(blk) => blk,
            Err(err) => return partial(done, err),
        };
        let blkoff = off % BLOCK_SIZE;
        let chunk = (buf.len() - done).min(BLOCK_SIZE - blkoff);
        let src = &buf[done..done + chunk];
        if let Err(err) = cache.with_block_mut(inode.dev, blk, |data| {
            data[blkoff..blkoff + chunk].copy_from_slice(src)
        }) {
            return partial(done, err);
        }
        done += chunk;
        off += chunk;

        if off > inode.size as usize {
            inode.size = off as u32;
            inode.touch(now);
        }
    }
    Ok(done)
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.bytes().any(|b| b == b'/' || b == 0) {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

/// What a scan of one directory block turned up.
struct BlockScan {
    found: Option<(usize, Ino)>,
    first_free: Option<usize>,
}

/// Find the entry `name` in directory `dir`.
///
/// With `create`, an existing entry is `Exists`; otherwise a slot for the
/// new entry is returned, reusing the first free one before growing the
/// directory.
pub fn dirent_search(vfs: &mut Vfs, dir: InodeRef, name: &str, create: bool) -> Result<DirSlot> {
    check_name(name)?;
    let now = vfs.time;
    let (cache, sb, dip) = vfs.split(dir)?;
    if !dip.is_dir() {
        return Err(Error::InvalidArgument);
    }
    let dev = dip.dev;
    let nentries = dip.size as usize / DIRENT_SIZE;
    let mut first_free: Option<(usize, u32)> = None;

    let mut i = 0;
    while i < nentries {
        let end = nentries.min((i / DIRENTS_PER_BLOCK + 1) * DIRENTS_PER_BLOCK);
        let blk = block_map(cache, sb, dip, i * DIRENT_SIZE, false, now)?;

        // Removing entries may free a whole block.
        if blk == BLOCK_NULL {
            i = end;
            continue;
        }

        let start = i;
        let scan = cache.with_block(dev, blk, |data| -> Result<BlockScan> {
            let mut scan = BlockScan {
                found: None,
                first_free: None,
            };
            for entry in start..end {
                let d: DiskDirent = read_record(data, entry % DIRENTS_PER_BLOCK)?;
                if d.ino.get() == INODE_NULL {
                    scan.first_free = scan.first_free.or(Some(entry));
                } else if d.name_matches(name) {
                    scan.found = Some((entry, d.ino.get()));
                    break;
                }
            }
            Ok(scan)
        })??;

        if let Some((entry, ino)) = scan.found {
            if create {
                return Err(Error::Exists);
            }
            return Ok(DirSlot {
                block: blk,
                index: entry % DIRENTS_PER_BLOCK,
                ino,
            });
        }
        if first_free.is_none() {
            first_free = scan.first_free.map(|entry| (entry, blk));
        }
        i = end;
    }

    if !create {
        return Err(Error::NotFound);
    }

    let (entry, blk) = match first_free {
        Some(free) => free,
        None => {
            let entry = nentries;
            let blk = block_map(cache, sb, dip, entry * DIRENT_SIZE, true, now)?;
            dip.size += DIRENT_SIZE as u32;
            dip.touch(now);
            (entry, blk)
        }
    };
    Ok(DirSlot {
        block: blk,
        index: entry % DIRENTS_PER_BLOCK,
        ino: INODE_NULL,
    })
}

/// Add an entry `name` for inode `ino` to `dir`.
pub fn dir_add(vfs: &mut Vfs, dir: InodeRef, ino: Ino, name: &str) -> Result<()> {
    let slot = dirent_search(vfs, dir, name, true)?;
    let dev = vfs.inode(dir).dev;
    let dirent = DiskDirent::new(ino, name);
    vfs.cache
        .with_block_mut(dev, slot.block, |data| write_record(data, slot.index, &dirent))??;
    vfs.touch(dir);
    Ok(())
}

/// Remove the entry `name` from `dir`, dropping one link of its target.
///
/// "." cannot be removed. A directory target needs a superuser and must
/// hold nothing but "." and "..".
pub fn dir_remove(vfs: &mut Vfs, dir: InodeRef, name: &str, cred: &Cred) -> Result<()> {
    let slot = dirent_search(vfs, dir, name, false)?;
    let (dev, num) = (vfs.inode(dir).dev, vfs.inode(dir).num);
    if slot.ino == num {
        return Err(Error::Busy);
    }
    let file = vfs.iget(dev, slot.ino).map_err(|err| match err {
        Error::Io(_) => err,
        _ => Error::NotFound,
    })?;
    let result = unlink(vfs, dir, file, slot, cred);
    let put = vfs.iput(file);
    result.and(put)
}

fn unlink(vfs: &mut Vfs, dir: InodeRef, file: InodeRef, slot: DirSlot, cred: &Cred) -> Result<()> {
    let target = vfs.inode(file);
    if target.is_dir() {
        if !cred.is_superuser() {
            return Err(Error::PermissionDenied);
        }
        // Anything past "." and ".." means not empty.
        if target.size as usize / DIRENT_SIZE > 2 {
            return Err(Error::Busy);
        }
    }

    let dev = vfs.inode(dir).dev;
    vfs.cache.with_block_mut(dev, slot.block, |data| {
        let mut d: DiskDirent = read_record(data, slot.index)?;
        d.ino.set(INODE_NULL);
        write_record(data, slot.index, &d)
    })??;
    vfs.touch(dir);

    let target = vfs.inode_mut(file);
    target.nlinks = target.nlinks.saturating_sub(1);
    vfs.touch(file);
    Ok(())
}
