//! Sleep chains.
//!
//! Waiting processes are linked by process slot, so joining or leaving a
//! chain is O(1) and a chain is never walked to find a member.

use super::process::Pid;
use crate::param::{NCHAIN, NPROC};
use arrayvec::ArrayVec;

/// A chain processes can sleep on. The first `NPROC` chains are private
/// to the process in the matching slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChainId(usize);
impl ChainId {
    pub const fn private(pid: Pid) -> ChainId {
        ChainId(pid.0)
    }
}

#[derive(Copy, Clone, Default)]
struct Head {
    first: Option<Pid>,
    len: usize,
    used: bool,
}

#[derive(Copy, Clone, Default)]
struct Link {
    chain: Option<ChainId>,
    prev: Option<Pid>,
    next: Option<Pid>,
}

pub struct SleepChains {
    heads: [Head; NCHAIN],
    links: [Link; NPROC],
}
impl SleepChains {
    pub fn new() -> SleepChains {
        let mut heads = [Head::default(); NCHAIN];
        for head in heads.iter_mut().take(NPROC) {
            head.used = true;
        }
        SleepChains {
            heads,
            links: [Link::default(); NPROC],
        }
    }

    /// Hand out an unused shared chain.
    pub fn new_chain(&mut self) -> Option<ChainId> {
        let (i, head) = self
            .heads
            .iter_mut()
            .enumerate()
            .skip(NPROC)
            .find(|(_, head)| !head.used)?;
        head.used = true;
        Some(ChainId(i))
    }

    /// Give a shared chain back. Its sleepers are returned.
    pub fn release_chain(&mut self, chain: ChainId) -> ArrayVec<Pid, NPROC> {
        let sleepers = self.take_all(chain);
        if chain.0 >= NPROC {
            self.heads[chain.0].used = false;
        }
        sleepers
    }

    /// Put `pid` at the front of `chain`.
    pub fn push(&mut self, chain: ChainId, pid: Pid) {
        self.remove(pid);
        let old = self.heads[chain.0].first;
        if let Some(old) = old {
            self.links[old.0].prev = Some(pid);
        }
        self.links[pid.0] = Link {
            chain: Some(chain),
            prev: None,
            next: old,
        };
        let head = &mut self.heads[chain.0];
        head.first = Some(pid);
        head.len += 1;
    }

    /// Unlink `pid` from whatever chain it is on.
    pub fn remove(&mut self, pid: Pid) -> Option<ChainId> {
        let link = self.links[pid.0];
        let chain = link.chain?;
        match link.prev {
            Some(prev) => self.links[prev.0].next = link.next,
            None => self.heads[chain.0].first = link.next,
        }
        if let Some(next) = link.next {
            self.links[next.0].prev = link.prev;
        }
        self.heads[chain.0].len -= 1;
        self.links[pid.0] = Link::default();
        Some(chain)
    }

    /// Empty `chain`, returning its sleepers front first.
    pub fn take_all(&mut self, chain: ChainId) -> ArrayVec<Pid, NPROC> {
        let sleepers: ArrayVec<Pid, NPROC> = self.iter(chain).collect();
        for &pid in &sleepers {
            self.links[pid.0] = Link::default();
        }
        self.heads[chain.0].first = None;
        self.heads[chain.0].len = 0;
        sleepers
    }

    pub fn chain_of(&self, pid: Pid) -> Option<ChainId> {
        self.links[pid.0].chain
    }

    pub fn len(&self, chain: ChainId) -> usize {
        self.heads[chain.0].len
    }

    pub fn is_empty(&self, chain: ChainId) -> bool {
        self.len(chain) == 0
    }

    pub fn iter(&self, chain: ChainId) -> impl Iterator<Item = Pid> + '_ {
        core::iter::successors(self.heads[chain.0].first, move |pid| self.links[pid.0].next)
    }
}
impl Default for SleepChains {
    fn default() -> SleepChains {
        SleepChains::new()
    }
}
