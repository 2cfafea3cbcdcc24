//! Process-side system calls. Each runs on behalf of the current process.

use crate::{
    error::{Error, Result},
    hardware::Machine,
    param::{CLOCK_FREQ, CLOCK_INTERVAL_PER_MS, PRIO_SIG, PRIO_USER},
    proc::{ChainId, Pid, ProcessState, Scheduler, SigHandler, Signal},
};

const NSEC_PER_MSEC: i64 = 1_000_000;
const MAX_TIMESPEC: i64 = 1_000_000_000;

/// Schedule SIGALRM `seconds` from now, or cancel it with 0. Returns the
/// whole seconds that were left on the previous alarm.
pub fn sys_alarm<M: Machine>(sched: &mut Scheduler<M>, seconds: u32) -> u32 {
    let ticks = sched.ticks();
    let p = sched.process_mut(sched.current());
    let old = p.alarm;
    p.alarm = if seconds == 0 {
        0
    } else {
        ticks.saturating_add(seconds.saturating_mul(CLOCK_FREQ))
    };
    old.saturating_sub(ticks) / CLOCK_FREQ
}

/// Put the current process to sleep for `sec` seconds and `nsec`
/// nanoseconds, at millisecond precision. Anything shorter than a tick
/// still sleeps one tick.
///
/// Returns once the process is off the CPU. When it runs again,
/// `nanosleep_return` tells how it ended.
pub fn sys_nanosleep<M: Machine>(sched: &mut Scheduler<M>, sec: i64, nsec: i64) -> Result<()> {
    if !(0..MAX_TIMESPEC).contains(&sec) || !(0..MAX_TIMESPEC).contains(&nsec) {
        return Err(Error::InvalidArgument);
    }
    let msec = (nsec / NSEC_PER_MSEC) as u32;
    let mut span = (sec as u32).saturating_mul(CLOCK_FREQ);
    if msec >= CLOCK_INTERVAL_PER_MS {
        span = span.saturating_add(msec / CLOCK_INTERVAL_PER_MS);
    } else if nsec != 0 {
        span = span.saturating_add(1);
    }
    if span == 0 {
        return Ok(());
    }

    let cur = sched.current();
    if cur == Pid::IDLE {
        return Err(Error::InvalidArgument);
    }
    let deadline = sched.ticks().saturating_add(span);
    sched.process_mut(cur).ns_ticks = deadline;
    sched.sleep(ChainId::private(cur), PRIO_USER);
    Ok(())
}

/// Finish a nanosleep of the current process. Returns the ticks left if
/// a signal cut the sleep short, 0 otherwise.
pub fn nanosleep_return<M: Machine>(sched: &mut Scheduler<M>) -> u32 {
    let ticks = sched.ticks();
    let interrupted = sched.issig() != Signal::Null;
    let p = sched.process_mut(sched.current());
    let left = if interrupted {
        p.ns_ticks.saturating_sub(ticks)
    } else {
        0
    };
    p.ns_ticks = 0;
    left
}

/// Send signal `sig` to the process with ID `pid`. Signal 0 only checks
/// that the process exists and may be signalled.
pub fn sys_kill<M: Machine>(sched: &mut Scheduler<M>, pid: i32, sig: i32) -> Result<()> {
    let sig = Signal::from_raw(sig).ok_or(Error::InvalidArgument)?;
    if pid <= 0 {
        return Err(Error::InvalidArgument);
    }
    let target = sched
        .find(pid)
        .filter(|&target| target != Pid::IDLE && sched.process(target).state != ProcessState::Zombie)
        .ok_or(Error::NoSuchProcess)?;

    let cred = sched.cred();
    let owner = sched.process(target).cred.uid;
    if !cred.is_superuser() && cred.uid != owner && cred.euid != owner {
        return Err(Error::PermissionDenied);
    }
    sched.sndsig(target, sig);
    Ok(())
}

/// Block the current process until a signal arrives.
pub fn sys_pause<M: Machine>(sched: &mut Scheduler<M>) {
    let cur = sched.current();
    sched.sleep(ChainId::private(cur), PRIO_SIG);
}

/// Change how the current process handles `sig`. Returns the old handler.
pub fn sys_signal<M: Machine>(sched: &mut Scheduler<M>, sig: i32, handler: SigHandler) -> Result<SigHandler> {
    let sig = Signal::from_raw(sig).ok_or(Error::InvalidArgument)?;
    let cur = sched.current();
    sched.signal(cur, sig, handler)
}
