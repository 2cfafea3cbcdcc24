#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod console;
pub mod error;
pub mod fs;
pub mod hardware;
pub mod io;
pub mod param;
pub mod proc;
pub mod sync;
pub mod sysfile;
pub mod sysproc;

pub(crate) use console::printf::println;
pub use error::{Error, Result};

use alloc::boxed::Box;
use fs::Vfs;
use hardware::{BlockDevice, Machine};
use param::{CLOCK_FREQ, ROOTDEV};
use proc::{Pid, Scheduler};

/// A booted kernel: the root file system mounted and init ready to run.
pub struct Kernel<M: Machine> {
    pub vfs: Vfs,
    pub sched: Scheduler<M>,
}
impl<M: Machine> Kernel<M> {
    /// Mount `rootdev` as the root file system and create init.
    pub fn boot(machine: M, rootdev: Box<dyn BlockDevice>) -> Result<Kernel<M>> {
        println!("\nminikernel is booting");
        let mut vfs = Vfs::new();
        vfs.attach(ROOTDEV, rootdev)?;
        vfs.mount(ROOTDEV)?;

        let mut sched = Scheduler::new(machine);
        let init = sched.spawn(Pid::IDLE, "init")?;
        println!("init is pid {}", sched.process(init).pid);
        Ok(Kernel { vfs, sched })
    }

    /// Clock interrupt.
    pub fn tick(&mut self, user: bool) {
        self.sched.clock_tick(user);
        self.vfs.set_time(self.sched.ticks() / CLOCK_FREQ);
    }

    /// Flush everything and unmount the root file system.
    pub fn shutdown(mut self) -> Result<()> {
        self.vfs.sync()?;
        self.vfs.unmount(ROOTDEV)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        console::{clear_reporter, set_reporter, tests::{capture, SINK_LOCK}},
        fs::minix::tests::DEV,
        hardware::ramdisk::RamDisk,
        proc::{tests::Recorder, ProcessState},
    };

    fn formatted_disk() -> Box<dyn BlockDevice> {
        let mut vfs = Vfs::new();
        vfs.attach(DEV, Box::new(RamDisk::new(256))).unwrap();
        vfs.mkfs(DEV, 64, 256, 0, 0).unwrap();
        vfs.cache.detach(DEV).unwrap()
    }

    #[test]
    fn boot_mounts_root_and_creates_init() {
        let _guard = SINK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let sink = capture();
        set_reporter(sink);
        let mut kernel = Kernel::boot(Recorder::default(), formatted_disk()).unwrap();
        clear_reporter();
        assert!(sink.0.lock().unwrap().iter().any(|l| l.contains("minikernel is booting")));

        let init = kernel.sched.find(1).unwrap();
        assert_eq!(init, Pid::INIT);
        assert_eq!(kernel.sched.process(init).state, ProcessState::Ready);

        kernel.sched.yield_cpu();
        assert_eq!(kernel.sched.current(), init);
        for _ in 0..CLOCK_FREQ {
            kernel.tick(false);
        }
        assert_eq!(kernel.vfs.time(), 1);

        let root = kernel.vfs.root().unwrap();
        let cred = kernel.sched.cred();
        let ip = kernel.vfs.create(root, "motd", 0o644, &cred).unwrap();
        assert_eq!(kernel.vfs.write(ip, b"hello", 0), Ok(5));
        assert_eq!(kernel.vfs.inode(ip).time, 1);
        kernel.vfs.iput(ip).unwrap();
        kernel.vfs.iput(root).unwrap();
        kernel.shutdown().unwrap();
    }

    #[test]
    fn boot_fails_on_a_blank_disk() {
        let _guard = SINK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let result = Kernel::boot(Recorder::default(), Box::new(RamDisk::new(64)));
        assert_eq!(result.err(), Some(Error::Corrupted));
    }
}
