/// Maximum number of processes
pub const NPROC: usize = 64;
/// Maximum number of active inodes
pub const NINODE: usize = 50;
/// Maximum number of attached block devices
pub const NDEV: usize = 10;
/// Maximum number of mounted file systems
pub const NSUPER: usize = 4;
/// Size of disk block cache
pub const NBUF: usize = 32;
/// Number of sleep chains, including one private chain per process
pub const NCHAIN: usize = NPROC + 64;
/// Device number of file system root disk
pub const ROOTDEV: u32 = 1;
/// Maximum file path size
pub const MAXPATH: usize = 128;

/// Block size in bytes.
pub const BLOCK_SIZE: usize = 1024;
/// Bitmap bits per block.
pub const BITS_PER_BLOCK: usize = BLOCK_SIZE * 8;

/// Clock interrupts per second.
pub const CLOCK_FREQ: u32 = 100;
/// Milliseconds between two clock interrupts.
pub const CLOCK_INTERVAL_PER_MS: u32 = 1000 / CLOCK_FREQ;

/// Ticks a process runs before it is preempted.
pub const PROC_QUANTUM: i32 = 50;
/// Default nice value.
pub const NZERO: i32 = 20;

// Sleep priorities. Lower is more urgent.
pub const PRIO_IO: i32 = 0;
pub const PRIO_BUFFER: i32 = 20;
pub const PRIO_INODE: i32 = 40;
pub const PRIO_SUPERBLOCK: i32 = 60;
pub const PRIO_REGION: i32 = 80;
pub const PRIO_TTY: i32 = 100;
pub const PRIO_SIG: i32 = 120;
pub const PRIO_USER: i32 = 140;

/// Length of a single diagnostic line, longer messages are cut.
pub const LINE_MAX: usize = 256;
