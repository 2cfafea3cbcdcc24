//! Inode and superblock management for the Minix layout.

use super::{
    block::block_free,
    layout::{
        read_record, write_record, DiskInode, DiskSuperblock, INODES_PER_BLOCK, SUPER_BLOCK,
        SUPER_MAGIC,
    },
};
use crate::{
    error::{Error, Result},
    fs::{
        bitmap, BlockNo, Dev, FsType, Ino, Inode, InodeFlags, InodeRef, StatFs, Superblock,
        SuperblockFlags, Vfs, BLOCK_NULL, NR_ZONES, ZONE_DOUBLE, ZONE_SINGLE,
    },
    io::{bio::BlockCache, buf::BufferRef},
    param::BITS_PER_BLOCK,
    proc::process::Cred,
};
use zerocopy::byteorder::little_endian::{U16, U32};

/// Disk block holding inode `num`.
pub fn inode_block(sb: &Superblock, num: Ino) -> BlockNo {
    2 + sb.imap_blocks + sb.zmap_blocks + (num as u32 - 1) / INODES_PER_BLOCK as u32
}

fn inode_index(num: Ino) -> usize {
    (num as usize - 1) % INODES_PER_BLOCK
}

pub fn read_super(cache: &mut BlockCache, dev: Dev) -> Result<Superblock> {
    let disk: DiskSuperblock = cache.with_block(dev, SUPER_BLOCK, |data| read_record(data, 0))??;
    if disk.magic.get() != SUPER_MAGIC {
        log::warn!("fs: bad magic {:#x} on device {}", disk.magic.get(), dev);
        return Err(Error::Corrupted);
    }

    let mut sb = Superblock::new(dev, FsType::Minix);
    sb.ninodes = disk.ninodes.get() as u32;
    sb.nblocks = disk.nblocks.get() as u32;
    sb.imap_blocks = disk.imap_blocks.get() as u32;
    sb.zmap_blocks = disk.zmap_blocks.get() as u32;
    sb.first_data_block = disk.first_data_block.get() as u32;
    sb.max_size = disk.max_size.get();
    let geometry_ok = sb.imap_blocks as usize <= sb.imap.capacity()
        && sb.zmap_blocks as usize <= sb.zmap.capacity()
        && sb.imap_blocks as usize * BITS_PER_BLOCK >= sb.ninodes as usize
        && sb.zmap_blocks as usize * BITS_PER_BLOCK >= sb.data_blocks() as usize
        && sb.first_data_block > 2 + sb.imap_blocks + sb.zmap_blocks
        && sb.first_data_block < sb.nblocks;
    if !geometry_ok {
        log::warn!("fs: bad geometry on device {}", dev);
        return Err(Error::Corrupted);
    }

    // Pin the bitmaps.
    for i in 0..sb.imap_blocks + sb.zmap_blocks {
        match cache.bread(dev, 2 + i) {
            Ok(buf) if i < sb.imap_blocks => sb.imap.push(buf),
            Ok(buf) => sb.zmap.push(buf),
            Err(err) => {
                release_maps(cache, &mut sb);
                return Err(err);
            }
        }
    }
    Ok(sb)
}

fn release_maps(cache: &mut BlockCache, sb: &mut Superblock) {
    for buf in sb.imap.drain(..).chain(sb.zmap.drain(..)) {
        cache.brelse(buf);
    }
}

/// Write the bitmaps back if they changed since the last call.
pub fn write_super(cache: &mut BlockCache, sb: &mut Superblock) -> Result<()> {
    if !sb.flags.contains(SuperblockFlags::DIRTY) {
        return Ok(());
    }
    for buf in sb.imap.iter().chain(sb.zmap.iter()) {
        cache.bwrite(buf)?;
    }
    sb.flags.remove(SuperblockFlags::DIRTY);
    Ok(())
}

pub fn put_super(cache: &mut BlockCache, mut sb: Superblock) -> Result<()> {
    let dev = sb.dev;
    let written = write_super(cache, &mut sb);
    release_maps(cache, &mut sb);
    written?;
    cache.flush(dev)
}

pub fn statfs(cache: &BlockCache, sb: &Superblock) -> StatFs {
    let free = |maps: &[BufferRef], total: u32| -> u32 {
        maps.iter()
            .enumerate()
            .map(|(i, buf)| bitmap::count_free(cache.data(buf), Superblock::map_bits(total, i)) as u32)
            .sum()
    };
    StatFs {
        ninodes: sb.ninodes,
        free_inodes: free(sb.imap.as_slice(), sb.ninodes),
        nblocks: sb.nblocks,
        free_blocks: free(sb.zmap.as_slice(), sb.data_blocks()),
    }
}

/// Load inode `num` of `dev`. Unused inodes are `NotFound`.
pub fn inode_read(vfs: &mut Vfs, dev: Dev, num: Ino) -> Result<Inode> {
    let sb = vfs.supers.iter().find(|sb| sb.dev == dev).ok_or(Error::NotFound)?;
    if num == 0 || num as u32 > sb.ninodes {
        return Err(Error::NotFound);
    }
    let blk = inode_block(sb, num);
    let disk: DiskInode = vfs
        .cache
        .with_block(dev, blk, |data| read_record(data, inode_index(num)))
        .map_err(|err| {
            log::warn!("fs: failed to read inode {} from disk", num);
            err
        })??;
    if disk.nlinks.get() == 0 {
        return Err(Error::NotFound);
    }

    let mut ip = Inode::new(dev, num, FsType::Minix);
    ip.mode = disk.mode.get();
    ip.nlinks = disk.nlinks.get();
    ip.uid = disk.uid.get();
    ip.gid = disk.gid.get();
    ip.size = disk.size.get();
    ip.time = disk.time.get();
    for (block, zone) in ip.blocks.iter_mut().zip(disk.zones.iter()) {
        *block = zone.get();
    }
    ip.flags = InodeFlags::VALID;
    Ok(ip)
}

/// Write `ip` back to its disk block if it is dirty.
pub fn inode_write(vfs: &mut Vfs, ip: InodeRef) -> Result<()> {
    let (cache, sb, inode) = vfs.split(ip)?;
    if !inode.is_dirty() {
        return Ok(());
    }
    let sb = sb.lock();

    let mut disk = DiskInode {
        mode: U16::new(inode.mode),
        nlinks: U16::new(inode.nlinks),
        uid: U16::new(inode.uid),
        gid: U16::new(inode.gid),
        size: U32::new(inode.size),
        time: U32::new(inode.time),
        zones: [U32::new(BLOCK_NULL); NR_ZONES],
    };
    for (zone, block) in disk.zones.iter_mut().zip(inode.blocks.iter()) {
        *zone = U32::new(*block);
    }
    let num = inode.num;
    cache
        .with_block_mut(sb.dev, inode_block(&sb, num), |data| {
            write_record(data, inode_index(num), &disk)
        })
        .map_err(|err| {
            log::warn!("fs: failed to write inode {} to disk", num);
            err
        })??;
    inode.flags.remove(InodeFlags::DIRTY);
    Ok(())
}

/// Take the first free inode number of `dev` and build a fresh inode for it.
pub fn inode_alloc(vfs: &mut Vfs, dev: Dev, mode: u16, cred: &Cred) -> Result<Inode> {
    let now = vfs.time;
    let cache = &mut vfs.cache;
    let sb = vfs.supers.iter_mut().find(|sb| sb.dev == dev).ok_or(Error::NotFound)?;
    let mut sb = sb.lock();

    let nmaps = sb.imap.len();
    let start = (sb.isearch.max(1) as usize - 1) / BITS_PER_BLOCK;
    let found = (0..nmaps).map(|n| (start + n) % nmaps).find_map(|i| {
        let nbits = Superblock::map_bits(sb.ninodes, i);
        bitmap::first_free(cache.data(&sb.imap[i]), nbits).map(|bit| (i, bit))
    });
    let Some((i, bit)) = found else {
        log::warn!("fs: device {} has no free inodes", dev);
        return Err(Error::OutOfSpace);
    };

    bitmap::set(cache.data_mut(&sb.imap[i]), bit);
    cache.bdirty(&sb.imap[i]);
    let num = (i * BITS_PER_BLOCK + bit + 1) as Ino;
    sb.isearch = num;
    sb.flags.insert(SuperblockFlags::DIRTY);

    let mut ip = Inode::new(dev, num, FsType::Minix);
    ip.mode = mode;
    ip.nlinks = 1;
    ip.uid = cred.euid;
    ip.gid = cred.egid;
    ip.flags = InodeFlags::VALID;
    ip.touch(now);
    Ok(ip)
}

/// Return the number of `ip` to the inode map.
pub fn inode_free(vfs: &mut Vfs, ip: InodeRef) -> Result<()> {
    let (cache, sb, inode) = vfs.split(ip)?;
    let mut sb = sb.lock();
    let index = inode.num as usize - 1;
    let map = sb.imap.get(index / BITS_PER_BLOCK).ok_or(Error::Corrupted)?;
    bitmap::clear(cache.data_mut(map), index % BITS_PER_BLOCK);
    cache.bdirty(map);
    if inode.num < sb.isearch {
        sb.isearch = inode.num;
    }
    sb.flags.insert(SuperblockFlags::DIRTY);
    Ok(())
}

/// Free every zone of `ip` and set its size to zero.
pub fn inode_truncate(vfs: &mut Vfs, ip: InodeRef) -> Result<()> {
    let now = vfs.time;
    let (cache, sb, inode) = vfs.split(ip)?;
    let mut sb = sb.lock();

    let levels = (0..NR_ZONES).map(|zone| match zone {
        ZONE_SINGLE => 1,
        ZONE_DOUBLE => 2,
        _ => 0,
    });
    for (zone, level) in levels.enumerate() {
        block_free(cache, &mut sb, inode.blocks[zone], level)?;
        inode.blocks[zone] = BLOCK_NULL;
    }
    drop(sb);

    inode.size = 0;
    inode.touch(now);
    Ok(())
}
