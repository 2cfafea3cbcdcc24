//! Zone allocation and the logical to physical block map.

use super::layout::{read_record, write_record, ZONES_PER_BLOCK};
use crate::{
    error::{Error, Result},
    fs::{bitmap, BlockNo, Inode, Superblock, BLOCK_NULL, NR_ZONES_DIRECT, ZONE_DOUBLE, ZONE_SINGLE},
    io::bio::BlockCache,
    param::{BITS_PER_BLOCK, BLOCK_SIZE},
};
use zerocopy::byteorder::little_endian::U32;

/// Allocate a zeroed data block.
///
/// Takes the superblock lock. Fails with `OutOfSpace` when the zone
/// map is full.
pub fn block_alloc(cache: &mut BlockCache, sb: &mut Superblock) -> Result<BlockNo> {
    let mut sb = sb.lock();
    let total = sb.data_blocks();
    let nmaps = sb.zmap.len();

    for n in 0..nmaps {
        let i = (sb.zsearch + n) % nmaps;
        let nbits = Superblock::map_bits(total, i);
        let Some(bit) = bitmap::first_free(cache.data(&sb.zmap[i]), nbits) else {
            continue;
        };
        bitmap::set(cache.data_mut(&sb.zmap[i]), bit);
        cache.bdirty(&sb.zmap[i]);

        let index = i * BITS_PER_BLOCK + bit;
        let blk = sb.first_data_block + index as BlockNo;
        match cache.bzero(sb.dev, blk) {
            Ok(buf) => cache.brelse(buf),
            Err(err) => {
                bitmap::clear(cache.data_mut(&sb.zmap[i]), bit);
                return Err(err);
            }
        }
        sb.zsearch = i;
        sb.flags.insert(crate::fs::SuperblockFlags::DIRTY);
        return Ok(blk);
    }

    log::warn!("fs: device {} has no free blocks", sb.dev);
    Err(Error::OutOfSpace)
}

fn block_free_direct(cache: &mut BlockCache, sb: &mut Superblock, blk: BlockNo) -> Result<()> {
    if blk < sb.first_data_block || blk >= sb.nblocks {
        log::warn!("fs: freeing block {} outside the data zone", blk);
        return Err(Error::Corrupted);
    }
    let index = (blk - sb.first_data_block) as usize;
    let map = index / BITS_PER_BLOCK;
    let zmap = sb.zmap.get(map).ok_or(Error::Corrupted)?;
    bitmap::clear(cache.data_mut(zmap), index % BITS_PER_BLOCK);
    cache.bdirty(zmap);
    if map < sb.zsearch {
        sb.zsearch = map;
    }
    sb.flags.insert(crate::fs::SuperblockFlags::DIRTY);
    Ok(())
}

/// Free `blk` and, for `level` 1 or 2, every block it points to.
///
/// The superblock must be locked.
pub fn block_free(cache: &mut BlockCache, sb: &mut Superblock, blk: BlockNo, level: u32) -> Result<()> {
    debug_assert!(sb.is_locked());
    if blk == BLOCK_NULL {
        return Ok(());
    }
    if level > 0 {
        let zones = cache.with_block(sb.dev, blk, |data| {
            let mut zones = [BLOCK_NULL; ZONES_PER_BLOCK];
            for (i, zone) in zones.iter_mut().enumerate() {
                *zone = read_record::<U32>(data, i).map_or(BLOCK_NULL, |z| z.get());
            }
            zones
        })?;
        for zone in zones {
            block_free(cache, sb, zone, level - 1)?;
        }
    }
    block_free_direct(cache, sb, blk)
}

/// Entry `index` of indirect block `blk`, allocating it if `create`.
fn map_indirect(
    cache: &mut BlockCache,
    sb: &mut Superblock,
    blk: BlockNo,
    index: usize,
    create: bool,
) -> Result<BlockNo> {
    let dev = sb.dev;
    let zone = cache.with_block(dev, blk, |data| read_record::<U32>(data, index))??.get();
    if zone != BLOCK_NULL || !create {
        return Ok(zone);
    }
    let zone = block_alloc(cache, sb)?;
    cache.with_block_mut(dev, blk, |data| write_record(data, index, &U32::new(zone)))??;
    Ok(zone)
}

/// Zone slot `zone` of the inode itself, allocating it if `create`.
fn map_zone(
    cache: &mut BlockCache,
    sb: &mut Superblock,
    ip: &mut Inode,
    zone: usize,
    create: bool,
    now: u32,
) -> Result<BlockNo> {
    if ip.blocks[zone] == BLOCK_NULL && create {
        ip.blocks[zone] = block_alloc(cache, sb)?;
        ip.touch(now);
    }
    Ok(ip.blocks[zone])
}

/// Map byte offset `off` of `ip` to a disk block.
///
/// Holes map to `BLOCK_NULL` unless `create` asks for them to be filled.
/// Offsets past the largest file fail when creating and read as holes
/// otherwise.
pub fn block_map(
    cache: &mut BlockCache,
    sb: &mut Superblock,
    ip: &mut Inode,
    off: usize,
    create: bool,
    now: u32,
) -> Result<BlockNo> {
    let mut logic = off / BLOCK_SIZE;
    let too_big = off >= sb.max_size as usize
        || logic >= NR_ZONES_DIRECT + ZONES_PER_BLOCK + ZONES_PER_BLOCK * ZONES_PER_BLOCK;
    if too_big {
        return if create { Err(Error::InvalidArgument) } else { Ok(BLOCK_NULL) };
    }

    if logic < NR_ZONES_DIRECT {
        return map_zone(cache, sb, ip, logic, create, now);
    }
    logic -= NR_ZONES_DIRECT;

    if logic < ZONES_PER_BLOCK {
        let single = map_zone(cache, sb, ip, ZONE_SINGLE, create, now)?;
        if single == BLOCK_NULL {
            return Ok(BLOCK_NULL);
        }
        return map_indirect(cache, sb, single, logic, create);
    }
    logic -= ZONES_PER_BLOCK;

    let double = map_zone(cache, sb, ip, ZONE_DOUBLE, create, now)?;
    if double == BLOCK_NULL {
        return Ok(BLOCK_NULL);
    }
    let single = map_indirect(cache, sb, double, logic / ZONES_PER_BLOCK, create)?;
    if single == BLOCK_NULL {
        return Ok(BLOCK_NULL);
    }
    map_indirect(cache, sb, single, logic % ZONES_PER_BLOCK, create)
}
