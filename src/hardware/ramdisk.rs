//! Ramdisk backed by kernel memory, e.g. a disk image loaded by the boot loader.

use super::BlockDevice;
use crate::{error::DeviceError, param::BLOCK_SIZE};
use alloc::vec::Vec;

pub struct RamDisk {
    blocks: Vec<[u8; BLOCK_SIZE]>,
    bad_block: Option<u32>,
}
impl RamDisk {
    /// A zero-filled disk of `nblocks` blocks.
    pub fn new(nblocks: u32) -> RamDisk {
        RamDisk {
            blocks: alloc::vec![[0u8; BLOCK_SIZE]; nblocks as usize],
            bad_block: None,
        }
    }
    /// A disk holding `image`, padded with zeros to a whole block.
    pub fn from_image(image: &[u8]) -> RamDisk {
        let blocks = image
            .chunks(BLOCK_SIZE)
            .map(|chunk| {
                let mut block = [0u8; BLOCK_SIZE];
                block[..chunk.len()].copy_from_slice(chunk);
                block
            })
            .collect();
        RamDisk {
            blocks,
            bad_block: None,
        }
    }
    /// Make every transfer touching `blockno` fail.
    pub fn with_bad_block(mut self, blockno: u32) -> RamDisk {
        self.bad_block = Some(blockno);
        self
    }
    pub fn image(&self) -> Vec<u8> {
        self.blocks.iter().flat_map(|b| b.iter().copied()).collect()
    }

    fn check(&self, blockno: u32) -> Result<usize, DeviceError> {
        if self.bad_block == Some(blockno) {
            Err(DeviceError::Failed)
        } else if blockno as usize >= self.blocks.len() {
            Err(DeviceError::OutOfRange)
        } else {
            Ok(blockno as usize)
        }
    }
}
impl BlockDevice for RamDisk {
    fn read_block(&mut self, blockno: u32, data: &mut [u8; BLOCK_SIZE]) -> Result<(), DeviceError> {
        let i = self.check(blockno)?;
        data.copy_from_slice(&self.blocks[i]);
        Ok(())
    }
    fn write_block(&mut self, blockno: u32, data: &[u8; BLOCK_SIZE]) -> Result<(), DeviceError> {
        let i = self.check(blockno)?;
        self.blocks[i].copy_from_slice(data);
        Ok(())
    }
    fn size(&self) -> u32 {
        self.blocks.len() as u32
    }
}
