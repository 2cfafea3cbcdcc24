use super::{BlockNo, Dev, FsType, Ino, BLOCK_NULL, NR_ZONES, S_IFDIR, S_IFMT, S_IFREG};
use crate::param::NINODE;
use arrayvec::ArrayVec;
use bitflags::bitflags;

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct InodeFlags: u8 {
        /// Differs from the disk copy.
        const DIRTY = 1 << 0;
        /// Fields were loaded from disk or freshly allocated.
        const VALID = 1 << 1;
        /// Another file system is mounted here.
        const MOUNT = 1 << 2;
        const PIPE = 1 << 3;
    }
}

/// In-core copy of an inode.
#[derive(Clone, Debug, Default)]
pub struct Inode {
    /// Device number.
    pub dev: Dev,
    /// Inode number.
    pub num: Ino,
    pub mode: u16,
    /// Number of directory entries naming this inode.
    pub nlinks: u16,
    pub uid: u16,
    pub gid: u16,
    /// Size of file in bytes.
    pub size: u32,
    /// Last modification.
    pub time: u32,
    /// Zone pointers: direct, then singly and doubly indirect.
    pub blocks: [BlockNo; NR_ZONES],
    pub flags: InodeFlags,
    /// Reference count.
    pub count: u32,
    pub fs: FsType,
}
impl Inode {
    pub fn new(dev: Dev, num: Ino, fs: FsType) -> Inode {
        Inode {
            dev,
            num,
            blocks: [BLOCK_NULL; NR_ZONES],
            fs,
            ..Default::default()
        }
    }
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }
    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(InodeFlags::DIRTY)
    }
    /// Stamp the modification time and schedule a write-back.
    pub fn touch(&mut self, now: u32) {
        self.time = now;
        self.flags.insert(InodeFlags::DIRTY);
    }
}

/// Handle on a referenced in-core inode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InodeRef(pub(crate) usize);

/// Table of in-core inodes. A slot whose count dropped to zero is free.
#[derive(Default)]
pub struct InodeTable {
    slots: ArrayVec<Inode, NINODE>,
}
impl InodeTable {
    pub fn new() -> InodeTable {
        InodeTable::default()
    }

    /// Referenced copy of inode `num` of `dev`, if any.
    pub fn find(&self, dev: Dev, num: Ino) -> Option<InodeRef> {
        self.slots
            .iter()
            .position(|ip| ip.count > 0 && ip.dev == dev && ip.num == num)
            .map(InodeRef)
    }

    /// A slot that `install` may fill.
    pub fn free_slot(&self) -> Option<InodeRef> {
        match self.slots.iter().position(|ip| ip.count == 0) {
            Some(slot) => Some(InodeRef(slot)),
            None if !self.slots.is_full() => Some(InodeRef(self.slots.len())),
            None => None,
        }
    }

    /// Fill a slot returned by `free_slot`.
    pub fn install(&mut self, slot: InodeRef, inode: Inode) {
        if slot.0 == self.slots.len() {
            self.slots.push(inode);
        } else {
            self.slots[slot.0] = inode;
        }
    }

    pub fn get(&self, ip: InodeRef) -> &Inode {
        &self.slots[ip.0]
    }
    pub fn get_mut(&mut self, ip: InodeRef) -> &mut Inode {
        &mut self.slots[ip.0]
    }

    /// Referenced inodes living on `dev`.
    pub fn referenced(&self, dev: Dev) -> impl Iterator<Item = InodeRef> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(_, ip)| ip.count > 0 && ip.dev == dev)
            .map(|(i, _)| InodeRef(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_slots_are_reused() {
        let mut table = InodeTable::new();
        let a = table.free_slot().unwrap();
        let mut inode = Inode::new(1, 5, FsType::Minix);
        inode.count = 1;
        table.install(a, inode.clone());
        assert_eq!(table.find(1, 5), Some(a));

        let b = table.free_slot().unwrap();
        assert_ne!(a, b);
        table.get_mut(a).count = 0;
        assert_eq!(table.find(1, 5), None);
        assert_eq!(table.free_slot(), Some(a));
    }

    #[test]
    fn table_fills_up() {
        let mut table = InodeTable::new();
        for num in 1..=NINODE as Ino {
            let slot = table.free_slot().unwrap();
            let mut inode = Inode::new(1, num, FsType::Minix);
            inode.count = 1;
            table.install(slot, inode);
        }
        assert_eq!(table.free_slot(), None);
        assert_eq!(table.referenced(1).count(), NINODE);
    }

    #[test]
    fn touch_marks_dirty() {
        let mut inode = Inode::new(1, 1, FsType::Minix);
        inode.mode = S_IFDIR | 0o755;
        assert!(inode.is_dir());
        assert!(!inode.is_dirty());
        inode.touch(42);
        assert!(inode.is_dirty());
        assert_eq!(inode.time, 42);
    }
}
