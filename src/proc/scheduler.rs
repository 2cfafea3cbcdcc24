//! Process table and CPU scheduling.
//!
//! One CPU, no kernel preemption. A process gives the CPU away by calling
//! `yield_cpu`, directly or through `sleep`, `stop` or `exit`, or when the
//! clock runs its quantum out.

use super::{
    chain::{ChainId, SleepChains},
    process::{Cred, Pid, Process, ProcessState},
    signal::Signal,
};
use crate::{
    error::{Error, Result},
    hardware::Machine,
    param::{NPROC, PRIO_USER, PROC_QUANTUM},
};

pub struct Scheduler<M: Machine> {
    pub(super) procs: [Process; NPROC],
    pub(super) chains: SleepChains,
    pub(super) current: Pid,
    pub(super) last: Pid,
    pub(super) ticks: u32,
    next_pid: i32,
    machine: M,
}
impl<M: Machine> Scheduler<M> {
    /// A table holding only the idle process, which is running.
    pub fn new(machine: M) -> Scheduler<M> {
        let mut procs: [Process; NPROC] = core::array::from_fn(|_| Process::new());
        let idle = &mut procs[Pid::IDLE.0];
        idle.state = ProcessState::Running;
        idle.counter = PROC_QUANTUM;
        idle.set_name("idle");
        Scheduler {
            procs,
            chains: SleepChains::new(),
            current: Pid::IDLE,
            last: Pid::IDLE,
            ticks: 0,
            next_pid: 1,
            machine,
        }
    }

    /// Create a ready child of `parent`. It inherits credentials, nice
    /// value and signal dispositions.
    pub fn spawn(&mut self, parent: Pid, name: &str) -> Result<Pid> {
        let Some(slot) = self.procs.iter().skip(1).position(|p| !p.is_valid()) else {
            log::warn!("proc: process table full");
            return Err(Error::OutOfSpace);
        };
        let pid = Pid(slot + 1);
        let (cred, nice, handlers) = {
            let p = &self.procs[parent.0];
            (p.cred, p.nice, p.handlers)
        };

        let child = &mut self.procs[pid.0];
        *child = Process::new();
        child.pid = self.next_pid;
        child.father = Some(parent);
        child.cred = cred;
        child.nice = nice;
        child.handlers = handlers;
        child.set_name(name);
        self.next_pid += 1;
        self.procs[parent.0].nchildren += 1;
        self.sched(pid);
        Ok(pid)
    }

    pub fn current(&self) -> Pid {
        self.current
    }
    /// Process that held the CPU before the last reschedule.
    pub fn last(&self) -> Pid {
        self.last
    }
    pub fn ticks(&self) -> u32 {
        self.ticks
    }
    pub fn process(&self, pid: Pid) -> &Process {
        &self.procs[pid.0]
    }
    pub fn process_mut(&mut self, pid: Pid) -> &mut Process {
        &mut self.procs[pid.0]
    }
    pub fn cred(&self) -> Cred {
        self.procs[self.current.0].cred
    }
    pub fn machine(&self) -> &M {
        &self.machine
    }
    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    /// Slot of the live process with ID `pid`.
    pub fn find(&self, pid: i32) -> Option<Pid> {
        self.procs
            .iter()
            .position(|p| p.is_valid() && p.pid == pid)
            .map(Pid)
    }

    /// Mark `pid` ready to run.
    pub fn sched(&mut self, pid: Pid) {
        let p = &mut self.procs[pid.0];
        p.state = ProcessState::Ready;
        p.counter = 0;
    }

    /// Stop the running process and tell its parent.
    pub fn stop(&mut self) {
        let cur = self.current;
        self.procs[cur.0].state = ProcessState::Stopped;
        if let Some(father) = self.procs[cur.0].father {
            self.sndsig(father, Signal::Chld);
        }
        self.yield_cpu();
    }

    /// Make a stopped process ready again. Others are left alone.
    pub fn resume(&mut self, pid: Pid) {
        if self.procs[pid.0].state == ProcessState::Stopped {
            self.sched(pid);
        }
    }

    /// Block the running process on `chain`. It runs at `priority` once
    /// woken.
    pub fn sleep(&mut self, chain: ChainId, priority: i32) {
        let cur = self.current;
        if cur == Pid::IDLE {
            log::warn!("proc: idle process cannot sleep");
            return;
        }
        let p = &mut self.procs[cur.0];
        p.state = ProcessState::Waiting;
        p.priority = priority;
        self.chains.push(chain, cur);
        self.yield_cpu();
    }

    /// Make every process sleeping on `chain` ready.
    pub fn wakeup(&mut self, chain: ChainId) {
        for pid in self.chains.take_all(chain) {
            if self.procs[pid.0].state == ProcessState::Waiting {
                self.sched(pid);
            }
        }
    }

    /// Choose the ready process with the best effective priority. Every
    /// ready process passed over waits one unit longer. Idle runs when
    /// nothing else is ready.
    pub(super) fn pick_next(&mut self) -> Pid {
        let mut next: Option<Pid> = None;
        for i in 1..NPROC {
            if self.procs[i].state != ProcessState::Ready {
                continue;
            }
            match next {
                None => next = Some(Pid(i)),
                Some(n) if self.procs[n.0].yields_to(&self.procs[i]) => {
                    self.procs[n.0].counter += 1;
                    next = Some(Pid(i));
                }
                Some(_) => self.procs[i].counter += 1,
            }
        }
        next.unwrap_or(Pid::IDLE)
    }

    /// Give up the CPU and run whichever process should run next.
    pub fn yield_cpu(&mut self) {
        let cur = self.current;
        if self.procs[cur.0].state == ProcessState::Running {
            self.sched(cur);
            #[cfg(feature = "pmc")]
            self.save_pmcs(cur);
        }
        self.last = cur;
        self.check_timers();

        let next = self.pick_next();
        log::trace!("proc: {} -> {}", self.procs[cur.0].name, self.procs[next.0].name);
        let p = &mut self.procs[next.0];
        p.priority = PRIO_USER;
        p.state = ProcessState::Running;
        p.counter = PROC_QUANTUM;
        #[cfg(feature = "pmc")]
        self.start_pmcs(next);

        if next != cur {
            self.machine.fpu_save(&mut self.procs[cur.0].fpu);
            self.machine.fpu_restore(&self.procs[next.0].fpu);
            self.current = next;
            self.machine.switch_to(cur, next);
        }
    }

    /// Post due alarms and end due nanosleeps.
    fn check_timers(&mut self) {
        let ticks = self.ticks;
        for i in 1..NPROC {
            let pid = Pid(i);
            if !self.procs[i].is_valid() {
                continue;
            }
            let alarm = self.procs[i].alarm;
            if alarm != 0 && alarm <= ticks {
                self.procs[i].alarm = 0;
                self.sndsig(pid, Signal::Alrm);
            }

            let p = &mut self.procs[i];
            if p.ns_ticks != 0
                && p.ns_ticks <= ticks
                && p.state == ProcessState::Waiting
                && self.chains.chain_of(pid) == Some(ChainId::private(pid))
            {
                p.ns_ticks = 0;
                self.chains.remove(pid);
                self.sched(pid);
            }
        }
    }

    #[cfg(feature = "pmc")]
    fn save_pmcs(&mut self, pid: Pid) {
        let pmcs = &mut self.procs[pid.0].pmcs;
        if pmcs.enable_counters == 0 {
            return;
        }
        if pmcs.counter1() {
            pmcs.c1 += self.machine.read_pmc(0);
        }
        if pmcs.counter2() {
            pmcs.c2 += self.machine.read_pmc(1);
        }
        self.machine.reset_pmcs();
    }

    #[cfg(feature = "pmc")]
    fn start_pmcs(&mut self, pid: Pid) {
        let pmcs = self.procs[pid.0].pmcs;
        if pmcs.counter1() {
            self.machine.start_pmc(0, pmcs.event_c1);
        }
        if pmcs.counter2() {
            self.machine.start_pmc(1, pmcs.event_c2);
        }
    }

    /// Account one clock tick to the running process. A process running
    /// in user mode is preempted when its quantum is used up.
    pub fn clock_tick(&mut self, user: bool) {
        self.ticks += 1;
        let p = &mut self.procs[self.current.0];
        if !user {
            p.ktime += 1;
            return;
        }
        p.utime += 1;
        p.counter -= 1;
        if p.counter <= 0 {
            self.yield_cpu();
        }
    }

    /// Terminate the running process with exit code `code`.
    pub fn exit(&mut self, code: i32) {
        self.die((code & 0xff) << 8);
    }

    /// Turn the running process into a zombie holding `status`. Its
    /// children go to init.
    pub(super) fn die(&mut self, status: i32) {
        let cur = self.current;
        if cur == Pid::IDLE {
            log::error!("proc: idle process cannot exit");
            return;
        }
        if cur == Pid::INIT {
            log::warn!("proc: init exiting with status {:#x}", status);
        }
        self.chains.remove(cur);

        let mut zombies = false;
        for i in 1..NPROC {
            if i == cur.0 || i == Pid::INIT.0 || self.procs[i].father != Some(cur) {
                continue;
            }
            self.procs[i].father = Some(Pid::INIT);
            self.procs[Pid::INIT.0].nchildren += 1;
            zombies |= self.procs[i].state == ProcessState::Zombie;
        }
        if zombies {
            self.sndsig(Pid::INIT, Signal::Chld);
        }

        let p = &mut self.procs[cur.0];
        p.nchildren = 0;
        p.alarm = 0;
        p.ns_ticks = 0;
        p.received = 0;
        p.exit_status = status;
        p.state = ProcessState::Zombie;
        if let Some(father) = p.father {
            self.sndsig(father, Signal::Chld);
            self.wakeup(ChainId::private(father));
        }
        self.yield_cpu();
    }

    /// Free the slot of `pid`.
    pub fn bury(&mut self, pid: Pid) {
        self.chains.remove(pid);
        if let Some(father) = self.procs[pid.0].father {
            let f = &mut self.procs[father.0];
            f.nchildren = f.nchildren.saturating_sub(1);
        }
        self.procs[pid.0] = Process::new();
    }

    /// Collect a zombie child of `parent`, any child or the one with ID
    /// `pid`. Returns its ID and exit status, or `None` while the matching
    /// children are all alive.
    pub fn wait_child(&mut self, parent: Pid, pid: Option<i32>) -> Result<Option<(i32, i32)>> {
        let mut found = false;
        for i in 1..NPROC {
            let child = &self.procs[i];
            if !child.is_valid() || child.father != Some(parent) {
                continue;
            }
            if pid.is_some_and(|pid| pid != child.pid) {
                continue;
            }
            found = true;
            if child.state == ProcessState::Zombie {
                let reaped = (child.pid, child.exit_status);
                self.bury(Pid(i));
                return Ok(Some(reaped));
            }
        }
        if found {
            Ok(None)
        } else {
            Err(Error::NoSuchProcess)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        param::{NZERO, PRIO_IO},
        proc::tests::{Event, Recorder},
    };

    fn ready_set() -> (Scheduler<Recorder>, [Pid; 3]) {
        let mut s = Scheduler::new(Recorder::default());
        let a = s.spawn(Pid::IDLE, "a").unwrap();
        let b = s.spawn(Pid::IDLE, "b").unwrap();
        let c = s.spawn(Pid::IDLE, "c").unwrap();
        for pid in [a, b, c] {
            s.procs[pid.0].fpu.0[0] = pid.0 as u8;
        }
        (s, [a, b, c])
    }

    #[test]
    fn idle_runs_first() {
        let s = Scheduler::new(Recorder::default());
        assert_eq!(s.current(), Pid::IDLE);
        assert_eq!(s.process(Pid::IDLE).state, ProcessState::Running);
        assert_eq!(s.process(Pid::IDLE).name.as_str(), "idle");
    }

    #[test]
    fn best_priority_runs_and_the_rest_age() {
        let (mut s, [a, b, c]) = ready_set();
        s.procs[b.0].nice = NZERO - 1;
        s.yield_cpu();

        assert_eq!(s.current(), b);
        let winner = s.process(b);
        assert_eq!(winner.state, ProcessState::Running);
        assert_eq!(winner.counter, PROC_QUANTUM);
        assert_eq!(winner.priority, PRIO_USER);
        assert_eq!(s.process(a).counter, 1);
        assert_eq!(s.process(c).counter, 1);
        assert_eq!(s.process(Pid::IDLE).state, ProcessState::Ready);
        assert_eq!(s.last(), Pid::IDLE);
    }

    #[test]
    fn repeated_picks_keep_the_winner_and_age_the_rest() {
        let (mut s, [a, b, c]) = ready_set();
        s.procs[b.0].nice = 0;
        for pass in 1..=3 {
            assert_eq!(s.pick_next(), b);
            assert_eq!(s.process(a).counter, pass);
            assert_eq!(s.process(c).counter, pass);
            assert_eq!(s.process(b).counter, 0);
        }
    }

    #[test]
    fn same_input_same_choice() {
        let (mut one, _) = ready_set();
        let (mut two, _) = ready_set();
        for _ in 0..5 {
            one.yield_cpu();
            two.yield_cpu();
            assert_eq!(one.current(), two.current());
        }
    }

    #[test]
    fn ready_processes_take_turns() {
        let (mut s, [a, b, c]) = ready_set();
        // All equal: the first ready slot wins, then aging rotates.
        s.yield_cpu();
        assert_eq!(s.current(), a);
        s.yield_cpu();
        assert_eq!(s.current(), b);
        s.yield_cpu();
        assert_eq!(s.current(), c);
    }

    #[test]
    fn longer_wait_breaks_ties() {
        let (mut s, [a, b, c]) = ready_set();
        // b: 140 + 21 - 3 = 158, c: 140 + 20 - 2 = 158.
        s.procs[b.0].nice = NZERO + 1;
        s.procs[b.0].counter = 3;
        s.procs[c.0].counter = 2;
        s.procs[a.0].state = ProcessState::Stopped;
        s.yield_cpu();
        assert_eq!(s.current(), b);
        assert_eq!(s.process(c).counter, 3);
    }

    #[test]
    fn switch_saves_then_restores_fpu() {
        let (mut s, [a, ..]) = ready_set();
        s.yield_cpu();
        assert_eq!(
            s.machine().events,
            [Event::FpuSave(0), Event::FpuRestore(a.0 as u8), Event::Switch(Pid::IDLE, a)]
        );
    }

    #[test]
    fn no_switch_when_the_winner_is_running() {
        let mut s = Scheduler::new(Recorder::default());
        let init = s.spawn(Pid::IDLE, "init").unwrap();
        s.yield_cpu();
        assert_eq!(s.current(), init);
        s.machine_mut().events.clear();

        s.yield_cpu();
        assert_eq!(s.current(), init);
        assert!(s.machine().switches().is_empty());
        assert_eq!(s.process(init).counter, PROC_QUANTUM);
    }

    #[test]
    fn idle_runs_when_nothing_is_ready() {
        let mut s = Scheduler::new(Recorder::default());
        let init = s.spawn(Pid::IDLE, "init").unwrap();
        s.yield_cpu();
        let chain = s.chains.new_chain().unwrap();

        s.sleep(chain, PRIO_IO);
        assert_eq!(s.current(), Pid::IDLE);
        assert_eq!(s.process(init).state, ProcessState::Waiting);
        assert_eq!(s.process(init).priority, PRIO_IO);
        assert_eq!(s.chains.chain_of(init), Some(chain));

        s.wakeup(chain);
        assert_eq!(s.process(init).state, ProcessState::Ready);
        assert_eq!(s.process(init).counter, 0);
        assert!(s.chains.is_empty(chain));
        s.yield_cpu();
        assert_eq!(s.current(), init);
        assert_eq!(s.machine().switches(), [(Pid::IDLE, init), (init, Pid::IDLE), (Pid::IDLE, init)]);
    }

    #[test]
    fn stopped_processes_wait_for_resume() {
        let mut s = Scheduler::new(Recorder::default());
        let init = s.spawn(Pid::IDLE, "init").unwrap();
        s.yield_cpu();
        s.stop();
        assert_eq!(s.process(init).state, ProcessState::Stopped);
        assert_eq!(s.current(), Pid::IDLE);

        s.resume(Pid::IDLE);
        assert_eq!(s.process(Pid::IDLE).state, ProcessState::Running);
        s.resume(init);
        assert_eq!(s.process(init).state, ProcessState::Ready);
    }

    #[test]
    fn quantum_expiry_preempts() {
        let (mut s, [a, b, _]) = ready_set();
        s.yield_cpu();
        assert_eq!(s.current(), a);
        for _ in 0..PROC_QUANTUM - 1 {
            s.clock_tick(true);
        }
        assert_eq!(s.current(), a);
        s.clock_tick(false);
        assert_eq!(s.current(), a);
        s.clock_tick(true);
        assert_eq!(s.current(), b);
        assert_eq!(s.process(a).utime, PROC_QUANTUM as u32);
        assert_eq!(s.process(a).ktime, 1);
        assert_eq!(s.ticks(), PROC_QUANTUM as u32 + 1);
    }

    #[test]
    fn due_alarm_posts_sigalrm() {
        let mut s = Scheduler::new(Recorder::default());
        let init = s.spawn(Pid::IDLE, "init").unwrap();
        s.procs[init.0].alarm = 3;
        s.clock_tick(false);
        s.clock_tick(false);
        s.yield_cpu();
        assert_eq!(s.process(init).received, 0);

        s.clock_tick(false);
        s.yield_cpu();
        assert_ne!(s.process(init).received & Signal::Alrm.mask(), 0);
        assert_eq!(s.process(init).alarm, 0);
    }

    #[test]
    fn nanosleep_deadline_wakes_the_sleeper() {
        let mut s = Scheduler::new(Recorder::default());
        let init = s.spawn(Pid::IDLE, "init").unwrap();
        s.yield_cpu();
        s.procs[init.0].ns_ticks = 2;
        s.sleep(ChainId::private(init), PRIO_USER);
        assert_eq!(s.current(), Pid::IDLE);

        s.clock_tick(false);
        s.yield_cpu();
        assert_eq!(s.process(init).state, ProcessState::Waiting);
        s.clock_tick(false);
        s.yield_cpu();
        assert_eq!(s.current(), init);
        assert_eq!(s.process(init).ns_ticks, 0);
    }

    #[test]
    fn exit_hands_children_to_init() {
        let mut s = Scheduler::new(Recorder::default());
        let init = s.spawn(Pid::IDLE, "init").unwrap();
        let parent = s.spawn(init, "parent").unwrap();
        let child = s.spawn(parent, "child").unwrap();
        let parent_pid = s.process(parent).pid;
        s.procs[init.0].state = ProcessState::Stopped;
        s.procs[child.0].state = ProcessState::Stopped;
        s.yield_cpu();
        assert_eq!(s.current(), parent);

        s.exit(3);
        assert_eq!(s.process(parent).state, ProcessState::Zombie);
        assert_eq!(s.process(parent).exit_status, 3 << 8);
        assert_eq!(s.process(child).father, Some(init));
        assert_eq!(s.process(init).nchildren, 2);
        assert_eq!(s.current(), Pid::IDLE);

        assert_eq!(s.wait_child(init, Some(999)), Err(Error::NoSuchProcess));
        assert_eq!(s.wait_child(init, None), Ok(Some((parent_pid, 3 << 8))));
        assert_eq!(s.process(parent).state, ProcessState::Unused);
        assert_eq!(s.wait_child(init, None), Ok(None));
        assert_eq!(s.process(init).nchildren, 1);
    }

    #[test]
    fn table_fills_up() {
        let mut s = Scheduler::new(Recorder::default());
        for _ in 1..NPROC {
            s.spawn(Pid::IDLE, "p").unwrap();
        }
        assert_eq!(s.spawn(Pid::IDLE, "p"), Err(Error::OutOfSpace));
        assert_eq!(s.find(NPROC as i32 - 1), Some(Pid(NPROC - 1)));
        assert_eq!(s.find(NPROC as i32), None);
    }

    #[cfg(feature = "pmc")]
    #[test]
    fn counters_follow_the_process() {
        let mut s = Scheduler::new(Recorder::default());
        let init = s.spawn(Pid::IDLE, "init").unwrap();
        s.procs[init.0].pmcs.enable_counters = 0b11;
        s.procs[init.0].pmcs.event_c1 = 0x3c;
        s.procs[init.0].pmcs.event_c2 = 0xc0;
        s.yield_cpu();
        assert!(s.machine().events.contains(&Event::StartPmc(0, 0x3c)));
        assert!(s.machine().events.contains(&Event::StartPmc(1, 0xc0)));

        s.machine_mut().pmc = 7;
        s.yield_cpu();
        assert_eq!(s.current(), init);
        assert_eq!(s.process(init).pmcs.c1, 7);
        assert_eq!(s.process(init).pmcs.c2, 7);
        assert!(s.machine().events.contains(&Event::ResetPmcs));
    }
}
