//! Buffer cache.
//!
//! The buffer cache is a fixed pool of buffers holding cached
//! copies of disk block contents. Caching disk blocks in memory
//! reduces the number of disk reads and also provides a
//! synchronization point for disk blocks used by multiple processes.
//!
//! Interface:
//! - To get a buffer for a particular disk block, call bread.
//! - After changing buffer data, call bdirty so it is written back.
//! - When done with the buffer, call brelse.
//! - Do not use the buffer after calling brelse.
//! - `with_block` / `with_block_mut` do all three around a closure and
//!   are what most callers want.
//!
//! A buffer is never recycled while its reference count is above zero.
//! Unreferenced buffers are recycled least recently released first,
//! writing them back if dirty.

use super::buf::{Buffer, BufferFlags, BufferRef};
use crate::{
    error::{DeviceError, Error, Result},
    fs::{BlockNo, Dev},
    hardware::BlockDevice,
    param::{BLOCK_SIZE, NBUF, NDEV},
};
use alloc::boxed::Box;
use arrayvec::ArrayVec;

pub struct BlockCache {
    buffers: ArrayVec<Buffer, NBUF>,
    devices: ArrayVec<(Dev, Box<dyn BlockDevice>), NDEV>,
    /// Bumped on every release.
    clock: u64,
}
impl BlockCache {
    pub fn new() -> BlockCache {
        BlockCache {
            buffers: ArrayVec::new(),
            devices: ArrayVec::new(),
            clock: 0,
        }
    }

    /// Register the driver for device number `dev`.
    pub fn attach(&mut self, dev: Dev, device: Box<dyn BlockDevice>) -> Result<()> {
        if self.devices.iter().any(|(d, _)| *d == dev) {
            return Err(Error::Busy);
        }
        self.devices
            .try_push((dev, device))
            .map_err(|_| Error::OutOfSpace)
    }

    /// Write back and forget everything cached for `dev`, returning its driver.
    ///
    /// Slots stay where they are so handles on other devices remain good.
    /// The forgotten buffers become the first to be recycled.
    pub fn detach(&mut self, dev: Dev) -> Result<Box<dyn BlockDevice>> {
        if self.buffers.iter().any(|b| b.dev == dev && b.refcnt > 0) {
            return Err(Error::Busy);
        }
        self.flush(dev)?;
        for buf in self.buffers.iter_mut().filter(|b| b.dev == dev) {
            buf.flags = BufferFlags::empty();
            buf.last_use = 0;
        }
        let i = self
            .devices
            .iter()
            .position(|(d, _)| *d == dev)
            .ok_or(Error::Io(DeviceError::NoDevice))?;
        Ok(self.devices.remove(i).1)
    }

    /// Number of blocks on `dev`.
    pub fn device_size(&self, dev: Dev) -> Result<u32> {
        self.devices
            .iter()
            .find(|(d, _)| *d == dev)
            .map(|(_, device)| device.size())
            .ok_or(Error::Io(DeviceError::NoDevice))
    }

    fn device(
        devices: &mut ArrayVec<(Dev, Box<dyn BlockDevice>), NDEV>,
        dev: Dev,
    ) -> Result<&mut (dyn BlockDevice + 'static)> {
        devices
            .iter_mut()
            .find(|(d, _)| *d == dev)
            .map(|(_, device)| &mut **device)
            .ok_or(Error::Io(DeviceError::NoDevice))
    }

    fn write_back(
        devices: &mut ArrayVec<(Dev, Box<dyn BlockDevice>), NDEV>,
        buf: &mut Buffer,
    ) -> Result<()> {
        Self::device(devices, buf.dev)?.write_block(buf.blockno, &buf.data)?;
        buf.flags.remove(BufferFlags::DIRTY);
        Ok(())
    }

    /// Look through the buffer cache for block on device dev.
    ///
    /// If not found, allocate a buffer.
    /// In either case, return the slot of a referenced buffer.
    fn bget(&mut self, dev: Dev, blockno: BlockNo) -> Result<usize> {
        // Is the block already cached?
        if let Some(slot) = self
            .buffers
            .iter()
            .position(|b| b.dev == dev && b.blockno == blockno)
        {
            let buf = &mut self.buffers[slot];
            buf.refcnt += 1;
            buf.flags.insert(BufferFlags::LOCKED);
            return Ok(slot);
        }

        // Not cached.
        if !self.buffers.is_full() {
            let mut buf = Buffer::new(dev, blockno);
            buf.refcnt = 1;
            buf.flags.insert(BufferFlags::LOCKED);
            self.buffers.push(buf);
            return Ok(self.buffers.len() - 1);
        }

        // Recycle the least recently used unused buffer.
        let slot = self
            .buffers
            .iter()
            .enumerate()
            .filter(|(_, b)| b.refcnt == 0)
            .min_by_key(|(_, b)| b.last_use)
            .map(|(i, _)| i)
            .ok_or_else(|| {
                log::warn!("bio: no buffers");
                Error::OutOfSpace
            })?;
        let buf = &mut self.buffers[slot];
        if buf.is_dirty() {
            Self::write_back(&mut self.devices, buf)?;
        }
        buf.dev = dev;
        buf.blockno = blockno;
        buf.flags = BufferFlags::LOCKED;
        buf.refcnt = 1;
        Ok(slot)
    }

    /// Return a locked buffer with the contents of the indicated block.
    pub fn bread(&mut self, dev: Dev, blockno: BlockNo) -> Result<BufferRef> {
        let slot = self.bget(dev, blockno)?;
        let buf = &mut self.buffers[slot];
        if !buf.is_valid() {
            let read = Self::device(&mut self.devices, dev)
                .and_then(|device| Ok(device.read_block(blockno, &mut buf.data)?));
            if let Err(err) = read {
                log::warn!("bio: failed to read block {} of device {}: {}", blockno, dev, err);
                self.brelse(BufferRef { slot });
                return Err(err);
            }
            buf.flags.insert(BufferFlags::VALID);
        }
        Ok(BufferRef { slot })
    }

    /// Like `bread`, but the block is about to be overwritten entirely:
    /// skip the disk read and hand back zeros.
    pub fn bzero(&mut self, dev: Dev, blockno: BlockNo) -> Result<BufferRef> {
        Self::device(&mut self.devices, dev)?;
        let slot = self.bget(dev, blockno)?;
        let buf = &mut self.buffers[slot];
        buf.data.fill(0);
        buf.flags.insert(BufferFlags::VALID | BufferFlags::DIRTY);
        Ok(BufferRef { slot })
    }

    /// Release a locked buffer.
    pub fn brelse(&mut self, buf: BufferRef) {
        self.clock += 1;
        let buf = &mut self.buffers[buf.slot];
        if buf.refcnt == 0 {
            panic!("brelse");
        }
        buf.refcnt -= 1;
        buf.last_use = self.clock;
        if buf.refcnt == 0 {
            buf.flags.remove(BufferFlags::LOCKED);
        }
    }

    /// Mark a buffer for write-back.
    pub fn bdirty(&mut self, buf: &BufferRef) {
        self.buffers[buf.slot].flags.insert(BufferFlags::DIRTY);
    }

    /// Write a buffer's contents to disk now.
    pub fn bwrite(&mut self, buf: &BufferRef) -> Result<()> {
        Self::write_back(&mut self.devices, &mut self.buffers[buf.slot])
    }

    pub fn data(&self, buf: &BufferRef) -> &[u8; BLOCK_SIZE] {
        &self.buffers[buf.slot].data
    }
    pub fn data_mut(&mut self, buf: &BufferRef) -> &mut [u8; BLOCK_SIZE] {
        &mut self.buffers[buf.slot].data
    }

    /// Read a block, run `f` on its contents and release it.
    pub fn with_block<R>(
        &mut self,
        dev: Dev,
        blockno: BlockNo,
        f: impl FnOnce(&[u8; BLOCK_SIZE]) -> R,
    ) -> Result<R> {
        let buf = self.bread(dev, blockno)?;
        let result = f(self.data(&buf));
        self.brelse(buf);
        Ok(result)
    }

    /// Read a block, let `f` modify it, mark it dirty and release it.
    pub fn with_block_mut<R>(
        &mut self,
        dev: Dev,
        blockno: BlockNo,
        f: impl FnOnce(&mut [u8; BLOCK_SIZE]) -> R,
    ) -> Result<R> {
        let buf = self.bread(dev, blockno)?;
        let result = f(self.data_mut(&buf));
        self.bdirty(&buf);
        self.brelse(buf);
        Ok(result)
    }

    /// Write every dirty buffer of `dev` back to disk.
    pub fn flush(&mut self, dev: Dev) -> Result<()> {
        for buf in self.buffers.iter_mut() {
            if buf.dev == dev && buf.is_dirty() {
                Self::write_back(&mut self.devices, buf)?;
            }
        }
        Ok(())
    }

    /// Write every dirty buffer back to disk.
    pub fn sync(&mut self) -> Result<()> {
        for buf in self.buffers.iter_mut() {
            if buf.is_dirty() {
                Self::write_back(&mut self.devices, buf)?;
            }
        }
        Ok(())
    }

    /// References currently held on the cached copy of a block.
    pub fn refcount(&self, dev: Dev, blockno: BlockNo) -> u32 {
        self.buffers
            .iter()
            .find(|b| b.dev == dev && b.blockno == blockno)
            .map_or(0, |b| b.refcnt)
    }

    /// Total references held on buffers of `dev`.
    pub fn held(&self, dev: Dev) -> u32 {
        self.buffers
            .iter()
            .filter(|b| b.dev == dev)
            .map(|b| b.refcnt)
            .sum()
    }

    pub fn is_dirty(&self, dev: Dev, blockno: BlockNo) -> bool {
        self.buffers
            .iter()
            .any(|b| b.dev == dev && b.blockno == blockno && b.is_dirty())
    }
}
impl Default for BlockCache {
    fn default() -> BlockCache {
        BlockCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::ramdisk::RamDisk;

    const DEV: Dev = 1;

    fn cache(nblocks: u32) -> BlockCache {
        let mut cache = BlockCache::new();
        cache.attach(DEV, Box::new(RamDisk::new(nblocks))).unwrap();
        cache
    }

    #[test]
    fn bread_shares_resident_buffer() {
        let mut cache = cache(8);
        let a = cache.bread(DEV, 3).unwrap();
        let b = cache.bread(DEV, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.refcount(DEV, 3), 2);

        cache.data_mut(&a)[0] = 42;
        assert_eq!(cache.data(&b)[0], 42);

        cache.brelse(a);
        cache.brelse(b);
        assert_eq!(cache.held(DEV), 0);
    }

    #[test]
    fn dirty_buffers_reach_disk_on_flush() {
        let mut cache = cache(8);
        cache
            .with_block_mut(DEV, 5, |data| data[..4].copy_from_slice(b"mini"))
            .unwrap();
        assert!(cache.is_dirty(DEV, 5));
        cache.flush(DEV).unwrap();
        assert!(!cache.is_dirty(DEV, 5));

        let disk = cache.detach(DEV).unwrap();
        let mut cache = BlockCache::new();
        cache.attach(DEV, disk).unwrap();
        let head = cache.with_block(DEV, 5, |data| [data[0], data[1], data[2], data[3]]);
        assert_eq!(head.unwrap(), *b"mini");
    }

    #[test]
    fn referenced_buffers_are_never_recycled() {
        let mut cache = cache(2 * NBUF as u32);
        let held: Vec<_> = (0..NBUF as u32).map(|b| cache.bread(DEV, b).unwrap()).collect();
        assert_eq!(cache.bread(DEV, NBUF as u32), Err(Error::OutOfSpace));

        for buf in held {
            cache.brelse(buf);
        }
        let buf = cache.bread(DEV, NBUF as u32).unwrap();
        cache.brelse(buf);
        // Block 0 was released first, so it was the one recycled.
        assert_eq!(cache.refcount(DEV, 1), 0);
        assert!(cache.buffers.iter().all(|b| b.blockno != 0));
    }

    #[test]
    fn recycled_dirty_buffer_is_written_back() {
        let mut cache = cache(2 * NBUF as u32);
        cache.with_block_mut(DEV, 0, |data| data[7] = 9).unwrap();
        for b in 1..=NBUF as u32 {
            cache.with_block(DEV, b, |_| ()).unwrap();
        }
        assert_eq!(cache.with_block(DEV, 0, |data| data[7]).unwrap(), 9);
    }

    #[test]
    fn read_failure_leaves_no_reference() {
        let mut cache = BlockCache::new();
        cache
            .attach(DEV, Box::new(RamDisk::new(4).with_bad_block(2)))
            .unwrap();
        assert_eq!(
            cache.bread(DEV, 2),
            Err(Error::Io(DeviceError::Failed))
        );
        assert_eq!(cache.held(DEV), 0);
        assert_eq!(cache.bread(7, 0), Err(Error::Io(DeviceError::NoDevice)));
    }

    #[test]
    fn detach_keeps_other_devices_handles() {
        let mut cache = cache(8);
        cache.attach(2, Box::new(RamDisk::new(8))).unwrap();
        cache.with_block_mut(DEV, 1, |data| data[0] = 1).unwrap();
        let held = cache.bread(2, 5).unwrap();
        cache.data_mut(&held)[3] = 77;

        let disk = cache.detach(DEV).unwrap();
        assert_eq!(cache.data(&held)[3], 77);
        assert_eq!(cache.refcount(2, 5), 1);
        cache.brelse(held);
        assert_eq!(cache.held(2), 0);

        // The stale copy of device 1 is read again after reattaching.
        cache.attach(DEV, disk).unwrap();
        assert_eq!(cache.with_block(DEV, 1, |data| data[0]).unwrap(), 1);
    }

    #[test]
    fn detached_buffers_are_recycled_first() {
        let mut cache = cache(2 * NBUF as u32);
        cache.attach(2, Box::new(RamDisk::new(2 * NBUF as u32))).unwrap();
        for b in 0..NBUF as u32 - 1 {
            cache.with_block(2, b, |_| ()).unwrap();
        }
        cache.with_block(DEV, 0, |_| ()).unwrap();
        cache.detach(DEV).unwrap();

        cache.with_block(2, NBUF as u32, |_| ()).unwrap();
        assert!(cache.buffers.iter().all(|b| b.dev == 2));
        assert!(cache.buffers.iter().any(|b| b.blockno == 0));
    }

    #[test]
    fn attach_refuses_duplicates() {
        let mut cache = cache(1);
        assert_eq!(
            cache.attach(DEV, Box::new(RamDisk::new(1))),
            Err(Error::Busy)
        );
        assert_eq!(cache.device_size(DEV), Ok(1));
    }
}
