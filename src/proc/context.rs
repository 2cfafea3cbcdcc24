/// Saved FPU/SIMD state, in the `fxsave` image format the architecture
/// layer reads and writes.
#[repr(C, align(16))]
#[derive(Copy, Clone)]
pub struct FpuState(pub [u8; 512]);
impl FpuState {
    pub const fn new() -> FpuState {
        FpuState([0u8; 512])
    }
}
impl Default for FpuState {
    fn default() -> FpuState {
        FpuState::new()
    }
}

/// Performance counter configuration and totals of a process.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Pmcs {
    /// Bit 0 enables counter 1, bit 1 counter 2.
    pub enable_counters: u8,
    pub event_c1: u32,
    pub event_c2: u32,
    pub c1: u64,
    pub c2: u64,
}
impl Pmcs {
    pub const fn new() -> Pmcs {
        Pmcs {
            enable_counters: 0,
            event_c1: 0,
            event_c2: 0,
            c1: 0,
            c2: 0,
        }
    }
    pub fn counter1(&self) -> bool {
        self.enable_counters & 1 != 0
    }
    pub fn counter2(&self) -> bool {
        self.enable_counters >> 1 != 0
    }
}
