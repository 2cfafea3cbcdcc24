use core::{
    ops::{Deref, DerefMut, Drop},
    sync::atomic::{AtomicBool, Ordering},
};

/// Advisory lock guarding long-lived kernel metadata.
///
/// The kernel runs on a single hart and file system code never yields
/// while holding one of these, so finding it held on entry means a lock
/// was leaked on some earlier path.
#[derive(Debug, Default)]
pub struct Sleeplock {
    locked: AtomicBool,
}
impl Sleeplock {
    pub const fn new() -> Sleeplock {
        Sleeplock {
            locked: AtomicBool::new(false),
        }
    }
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
    pub fn try_lock_unguarded(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }
    pub fn lock_unguarded(&self) {
        if !self.try_lock_unguarded() {
            panic!("sleeplock: already held");
        }
    }
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// Anything that embeds a [`Sleeplock`] protecting the rest of itself.
pub trait Sleeplocked {
    fn sleeplock(&self) -> &Sleeplock;
}

/// Exclusive access to a locked `T`; unlocks on drop.
pub struct SleeplockGuard<'l, T: Sleeplocked> {
    inner: &'l mut T,
}
impl<'l, T: Sleeplocked> SleeplockGuard<'l, T> {
    pub fn new(inner: &'l mut T) -> SleeplockGuard<'l, T> {
        inner.sleeplock().lock_unguarded();
        SleeplockGuard { inner }
    }
}
impl<'l, T: Sleeplocked> Deref for SleeplockGuard<'l, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.inner
    }
}
impl<'l, T: Sleeplocked> DerefMut for SleeplockGuard<'l, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.inner
    }
}
impl<'l, T: Sleeplocked> Drop for SleeplockGuard<'l, T> {
    fn drop(&mut self) {
        self.inner.sleeplock().unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Meta {
        lock: Sleeplock,
        value: u32,
    }
    impl Sleeplocked for Meta {
        fn sleeplock(&self) -> &Sleeplock {
            &self.lock
        }
    }

    fn bump(meta: &mut Meta, fail: bool) -> Result<(), ()> {
        let mut meta = SleeplockGuard::new(meta);
        meta.value += 1;
        if fail {
            return Err(());
        }
        meta.value += 1;
        Ok(())
    }

    #[test]
    fn guard_releases_on_every_path() {
        let mut meta = Meta {
            lock: Sleeplock::new(),
            value: 0,
        };
        assert!(bump(&mut meta, true).is_err());
        assert!(!meta.lock.is_locked());
        assert!(bump(&mut meta, false).is_ok());
        assert!(!meta.lock.is_locked());
        assert_eq!(meta.value, 3);
    }

    #[test]
    #[should_panic(expected = "already held")]
    fn relocking_a_held_lock_panics() {
        let lock = Sleeplock::new();
        lock.lock_unguarded();
        lock.lock_unguarded();
    }
}
