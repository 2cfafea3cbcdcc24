pub mod chain;
pub mod context;
pub mod process;
pub mod scheduler;
pub mod signal;

pub use chain::{ChainId, SleepChains};
pub use process::{Cred, Pid, Process, ProcessState};
pub use scheduler::Scheduler;
pub use signal::{DefaultAction, SigHandler, Signal};
