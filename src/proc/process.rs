use super::{
    context::{FpuState, Pmcs},
    signal::{SigHandler, NR_SIGNALS},
};
use crate::param::{NZERO, PRIO_USER};
use arrayvec::ArrayString;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ProcessState {
    #[default]
    Unused,
    Ready,
    Running,
    /// Blocked on a sleep chain.
    Waiting,
    Stopped,
    Zombie,
}

/// Slot of a process in the process table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub(crate) usize);
impl Pid {
    pub const IDLE: Pid = Pid(0);
    pub const INIT: Pid = Pid(1);

    pub fn index(self) -> usize {
        self.0
    }
}

/// User and group identity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Cred {
    pub uid: u16,
    pub gid: u16,
    pub euid: u16,
    pub egid: u16,
}
impl Cred {
    pub const ROOT: Cred = Cred {
        uid: 0,
        gid: 0,
        euid: 0,
        egid: 0,
    };

    pub fn is_superuser(&self) -> bool {
        self.euid == 0
    }
}

/// Per-process state.
#[derive(Clone)]
pub struct Process {
    /// Process ID
    pub pid: i32,
    pub state: ProcessState,
    /// Static priority. Lower runs first.
    pub priority: i32,
    pub nice: i32,
    /// Quantum left while running, time waited while ready.
    pub counter: i32,
    /// Parent process
    pub father: Option<Pid>,
    pub nchildren: u32,
    /// Pending signals, one bit per signal number.
    pub received: u32,
    pub handlers: [SigHandler; NR_SIGNALS],
    /// Tick at which SIGALRM is due, 0 if none.
    pub alarm: u32,
    /// Tick at which a nanosleep ends, 0 if none.
    pub ns_ticks: u32,
    /// Ticks spent in user mode.
    pub utime: u32,
    /// Ticks spent in kernel mode.
    pub ktime: u32,
    /// Exit status to be returned to parent's wait
    pub exit_status: i32,
    pub cred: Cred,
    pub fpu: FpuState,
    pub pmcs: Pmcs,
    /// Process name (debugging)
    pub name: ArrayString<16>,
}
impl Process {
    pub const fn new() -> Process {
        Process {
            pid: 0,
            state: ProcessState::Unused,
            priority: PRIO_USER,
            nice: NZERO,
            counter: 0,
            father: None,
            nchildren: 0,
            received: 0,
            handlers: [SigHandler::Default; NR_SIGNALS],
            alarm: 0,
            ns_ticks: 0,
            utime: 0,
            ktime: 0,
            exit_status: 0,
            cred: Cred::ROOT,
            fpu: FpuState::new(),
            pmcs: Pmcs::new(),
            name: ArrayString::new_const(),
        }
    }

    /// Effective priority. Lower runs first.
    pub fn effective_priority(&self) -> i32 {
        self.priority + self.nice - self.counter
    }

    /// Whether `candidate` should replace `self` as the next process to
    /// run: strictly more urgent, or as urgent and waiting longer.
    pub fn yields_to(&self, candidate: &Process) -> bool {
        let (mine, theirs) = (self.effective_priority(), candidate.effective_priority());
        theirs < mine || (theirs == mine && candidate.counter > self.counter)
    }

    pub fn is_valid(&self) -> bool {
        self.state != ProcessState::Unused
    }

    pub fn set_name(&mut self, name: &str) {
        self.name.clear();
        for c in name.chars() {
            if self.name.try_push(c).is_err() {
                break;
            }
        }
    }
}
impl Default for Process {
    fn default() -> Process {
        Process::new()
    }
}
