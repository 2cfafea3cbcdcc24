//! Boundary to the hardware collaborators: block device drivers and the
//! architecture layer that actually switches stacks.

pub mod ramdisk;

use crate::{
    error::DeviceError,
    param::BLOCK_SIZE,
    proc::{context::FpuState, process::Pid},
};

/// Raw block transfers. One implementation per driver.
pub trait BlockDevice {
    fn read_block(&mut self, blockno: u32, data: &mut [u8; BLOCK_SIZE]) -> Result<(), DeviceError>;
    fn write_block(&mut self, blockno: u32, data: &[u8; BLOCK_SIZE]) -> Result<(), DeviceError>;
    /// Number of blocks on the device.
    fn size(&self) -> u32;
}

/// Context switching and per-process CPU state, as seen by the scheduler.
pub trait Machine {
    /// Transfer the CPU from `from` to `to`.
    fn switch_to(&mut self, from: Pid, to: Pid);
    fn fpu_save(&mut self, fpu: &mut FpuState);
    fn fpu_restore(&mut self, fpu: &FpuState);

    /// Current value of performance counter `counter` (0 or 1).
    fn read_pmc(&mut self, _counter: usize) -> u64 {
        0
    }
    /// Zero both performance counters.
    fn reset_pmcs(&mut self) {}
    /// Start `counter` counting user-mode `event`s.
    fn start_pmc(&mut self, _counter: usize, _event: u32) {}
}
