//! Signal posting and delivery.

use super::{
    process::{Pid, ProcessState},
    scheduler::Scheduler,
};
use crate::{
    error::{Error, Result},
    hardware::Machine,
};

pub const NR_SIGNALS: usize = 23;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Signal {
    Null = 0,
    Kill,
    Stop,
    Urg,
    Abrt,
    Bus,
    Chld,
    Cont,
    Fpe,
    Hup,
    Ill,
    Int,
    Pipe,
    Quit,
    Segv,
    Term,
    Tstp,
    Ttin,
    Ttou,
    Alrm,
    Usr1,
    Usr2,
    Trap,
}

/// What happens to a process when a signal reaches its default handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DefaultAction {
    Terminate,
    Ignore,
    Stop,
    Resume,
    /// Terminate and flag a core image.
    Abort,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SigHandler {
    #[default]
    Default,
    Ignore,
    /// User-space entry point.
    Handler(usize),
}

impl Signal {
    pub const ALL: [Signal; NR_SIGNALS] = [
        Signal::Null,
        Signal::Kill,
        Signal::Stop,
        Signal::Urg,
        Signal::Abrt,
        Signal::Bus,
        Signal::Chld,
        Signal::Cont,
        Signal::Fpe,
        Signal::Hup,
        Signal::Ill,
        Signal::Int,
        Signal::Pipe,
        Signal::Quit,
        Signal::Segv,
        Signal::Term,
        Signal::Tstp,
        Signal::Ttin,
        Signal::Ttou,
        Signal::Alrm,
        Signal::Usr1,
        Signal::Usr2,
        Signal::Trap,
    ];

    pub fn from_raw(sig: i32) -> Option<Signal> {
        usize::try_from(sig).ok().and_then(|n| Signal::ALL.get(n).copied())
    }

    pub fn number(self) -> usize {
        self as usize
    }

    /// Bit of this signal in a pending set.
    pub fn mask(self) -> u32 {
        1 << self as u32
    }

    pub fn default_action(self) -> DefaultAction {
        SIG_DEFAULT[self.number()]
    }
}

/// Default action of every signal, by number.
pub const SIG_DEFAULT: [DefaultAction; NR_SIGNALS] = {
    use DefaultAction::*;
    [
        Ignore,    // null
        Terminate, // kill
        Stop,      // stop
        Ignore,    // urg
        Abort,     // abrt
        Abort,     // bus
        Ignore,    // chld
        Resume,    // cont
        Terminate, // fpe
        Terminate, // hup
        Abort,     // ill
        Terminate, // int
        Abort,     // pipe
        Abort,     // quit
        Abort,     // segv
        Terminate, // term
        Stop,      // tstp
        Stop,      // ttin
        Stop,      // ttou
        Terminate, // alrm
        Terminate, // usr1
        Terminate, // usr2
        Abort,     // trap
    ]
};

impl<M: Machine> Scheduler<M> {
    /// Whether `pid` discards `sig`, explicitly or by default.
    pub fn ignoring(&self, pid: Pid, sig: Signal) -> bool {
        match self.procs[pid.0].handlers[sig.number()] {
            SigHandler::Ignore => true,
            SigHandler::Default => sig.default_action() == DefaultAction::Ignore,
            SigHandler::Handler(_) => false,
        }
    }

    /// Post `sig` to `pid`, waking it if it is blocked.
    pub fn sndsig(&mut self, pid: Pid, sig: Signal) {
        if sig == Signal::Null {
            return;
        }
        match self.procs[pid.0].handlers[sig.number()] {
            SigHandler::Ignore => return,
            SigHandler::Default => match sig.default_action() {
                DefaultAction::Ignore => return,
                DefaultAction::Resume => {
                    self.resume(pid);
                    return;
                }
                _ => {}
            },
            SigHandler::Handler(_) => {}
        }

        log::debug!("proc: signal {:?} to pid {}", sig, self.procs[pid.0].pid);
        let p = &mut self.procs[pid.0];
        p.received |= sig.mask();
        if p.state == ProcessState::Waiting {
            self.chains.remove(pid);
            self.sched(pid);
        }
    }

    /// First pending signal the running process has to act on, or
    /// `Signal::Null`. Ignored signals met on the way are discarded.
    ///
    /// An ignored SIGCHLD reaps every zombie child. It is reported anyway
    /// once no children are left.
    pub fn issig(&mut self) -> Signal {
        let cur = self.current;
        for &sig in Signal::ALL.iter().skip(1) {
            if self.procs[cur.0].received & sig.mask() == 0 {
                continue;
            }

            if sig == Signal::Chld {
                if !self.ignoring(cur, sig) {
                    return sig;
                }
                self.procs[cur.0].received &= !sig.mask();
                self.reap_children(cur);
                if self.procs[cur.0].nchildren > 0 {
                    continue;
                }
                return sig;
            }

            if !self.ignoring(cur, sig) {
                return sig;
            }
            self.procs[cur.0].received &= !sig.mask();
        }
        Signal::Null
    }

    fn reap_children(&mut self, parent: Pid) {
        for i in 0..self.procs.len() {
            let child = &self.procs[i];
            if child.father == Some(parent) && child.state == ProcessState::Zombie {
                self.bury(Pid(i));
            }
        }
    }

    /// Install `handler` for `sig` in `pid`, returning the old handler.
    pub fn signal(&mut self, pid: Pid, sig: Signal, handler: SigHandler) -> Result<SigHandler> {
        if matches!(sig, Signal::Null | Signal::Kill | Signal::Stop) {
            return Err(Error::InvalidArgument);
        }
        let slot = &mut self.procs[pid.0].handlers[sig.number()];
        Ok(core::mem::replace(slot, handler))
    }

    /// Carry out the default action of `sig` on the running process.
    pub fn do_default(&mut self, sig: Signal) {
        let cur = self.current;
        self.procs[cur.0].received &= !sig.mask();
        match sig.default_action() {
            DefaultAction::Terminate => self.die(sig.number() as i32 & 0x7f),
            DefaultAction::Abort => self.die(0x80 | (sig.number() as i32 & 0x7f)),
            DefaultAction::Stop => self.stop(),
            DefaultAction::Resume => self.resume(cur),
            DefaultAction::Ignore => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        param::PRIO_USER,
        proc::{chain::ChainId, tests::Recorder},
    };

    fn two_processes() -> (Scheduler<Recorder>, Pid, Pid) {
        let mut s = Scheduler::new(Recorder::default());
        let init = s.spawn(Pid::IDLE, "init").unwrap();
        let child = s.spawn(init, "child").unwrap();
        (s, init, child)
    }

    #[test]
    fn table_matches_numbering() {
        assert_eq!(Signal::Chld.number(), 6);
        assert_eq!(Signal::Cont.number(), 7);
        assert_eq!(Signal::Alrm.number(), 19);
        assert_eq!(Signal::from_raw(22), Some(Signal::Trap));
        assert_eq!(Signal::from_raw(23), None);
        assert_eq!(Signal::from_raw(-1), None);
        assert_eq!(Signal::Kill.default_action(), DefaultAction::Terminate);
        assert_eq!(Signal::Segv.default_action(), DefaultAction::Abort);
        assert_eq!(Signal::Ttou.default_action(), DefaultAction::Stop);
        assert_eq!(Signal::Urg.default_action(), DefaultAction::Ignore);
    }

    #[test]
    fn posting_wakes_a_waiting_process() {
        let (mut s, _, child) = two_processes();
        s.procs[child.0].state = ProcessState::Waiting;
        s.chains.push(ChainId::private(child), child);

        s.sndsig(child, Signal::Term);
        assert_eq!(s.process(child).state, ProcessState::Ready);
        assert_eq!(s.process(child).counter, 0);
        assert_ne!(s.process(child).received & Signal::Term.mask(), 0);
        assert_eq!(s.chains.chain_of(child), None);
    }

    #[test]
    fn ignored_signals_leave_no_trace() {
        let (mut s, _, child) = two_processes();
        s.procs[child.0].state = ProcessState::Waiting;
        s.chains.push(ChainId::private(child), child);
        s.signal(child, Signal::Int, SigHandler::Ignore).unwrap();

        s.sndsig(child, Signal::Int);
        s.sndsig(child, Signal::Urg);
        assert_eq!(s.process(child).state, ProcessState::Waiting);
        assert_eq!(s.process(child).received, 0);
    }

    #[test]
    fn continue_resumes_without_pending() {
        let (mut s, _, child) = two_processes();
        s.procs[child.0].state = ProcessState::Stopped;
        s.sndsig(child, Signal::Cont);
        assert_eq!(s.process(child).state, ProcessState::Ready);
        assert_eq!(s.process(child).received, 0);
    }

    #[test]
    fn kill_and_stop_cannot_be_caught() {
        let (mut s, _, child) = two_processes();
        for sig in [Signal::Kill, Signal::Stop, Signal::Null] {
            assert_eq!(s.signal(child, sig, SigHandler::Ignore), Err(Error::InvalidArgument));
        }
        assert_eq!(s.signal(child, Signal::Usr1, SigHandler::Handler(0x1000)), Ok(SigHandler::Default));
        assert_eq!(s.signal(child, Signal::Usr1, SigHandler::Default), Ok(SigHandler::Handler(0x1000)));
    }

    #[test]
    fn pending_signals_come_out_lowest_first() {
        let (mut s, init, _) = two_processes();
        s.current = init;
        s.procs[init.0].received = Signal::Usr1.mask() | Signal::Hup.mask();
        assert_eq!(s.issig(), Signal::Hup);
        // Delivery is left to the caller.
        assert_eq!(s.issig(), Signal::Hup);
        s.procs[init.0].received &= !Signal::Hup.mask();
        assert_eq!(s.issig(), Signal::Usr1);
    }

    #[test]
    fn ignored_pending_signals_are_discarded() {
        let (mut s, init, _) = two_processes();
        s.current = init;
        s.procs[init.0].received = Signal::Urg.mask();
        assert_eq!(s.issig(), Signal::Null);
        assert_eq!(s.process(init).received, 0);
    }

    #[test]
    fn ignored_sigchld_reaps_zombies() {
        let (mut s, init, child) = two_processes();
        let other = s.spawn(init, "other").unwrap();
        assert_eq!(s.process(init).nchildren, 2);
        s.procs[child.0].state = ProcessState::Zombie;
        s.current = init;
        s.procs[init.0].received = Signal::Chld.mask();

        // One child still alive, so nothing to report.
        assert_eq!(s.issig(), Signal::Null);
        assert_eq!(s.process(init).nchildren, 1);
        assert_eq!(s.process(child).state, ProcessState::Unused);

        s.procs[other.0].state = ProcessState::Zombie;
        s.procs[init.0].received = Signal::Chld.mask();
        assert_eq!(s.issig(), Signal::Chld);
        assert_eq!(s.process(init).nchildren, 0);
    }

    #[test]
    fn default_stop_parks_the_process() {
        let (mut s, init, child) = two_processes();
        s.current = child;
        s.procs[child.0].state = ProcessState::Running;
        s.procs[init.0].state = ProcessState::Waiting;
        s.chains.push(ChainId::private(init), init);
        s.signal(init, Signal::Chld, SigHandler::Handler(0x2000)).unwrap();

        s.sndsig(child, Signal::Tstp);
        assert_eq!(s.issig(), Signal::Tstp);
        s.do_default(Signal::Tstp);

        assert_eq!(s.process(child).state, ProcessState::Stopped);
        assert_eq!(s.process(child).received, 0);
        // The parent hears about it.
        assert_ne!(s.process(init).received & Signal::Chld.mask(), 0);
        assert_eq!(s.current(), init);
        assert_eq!(s.process(init).priority, PRIO_USER);
    }

    #[test]
    fn default_terminate_leaves_a_zombie() {
        let (mut s, init, child) = two_processes();
        let child_pid = s.process(child).pid;
        s.current = child;
        s.procs[child.0].state = ProcessState::Running;
        s.do_default(Signal::Term);
        assert_eq!(s.process(child).state, ProcessState::Zombie);
        assert_eq!(s.process(child).exit_status, Signal::Term.number() as i32);
        assert_eq!(s.wait_child(init, None), Ok(Some((child_pid, 15))));
    }
}
