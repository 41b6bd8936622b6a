// Frame numbers never exceed MAX_FRAMES, so the usize -> u32 casts below
// cannot truncate.
#![allow(clippy::cast_possible_truncation)]

use super::{FrameNumber, Pid};
use alloc::collections::BTreeMap;
use arbitrary_int::u20;
use kidneyos_shared::{mem::page_round_down, paging::PageTableEntry};

/// The translation interface the swap code needs from an address space.
pub trait PageTableOps {
    /// Marks the translation of `va` in `owner` not present, so that the
    /// next access faults.
    fn clear_page(&mut self, owner: Pid, va: usize);

    /// Sets or clears the dirty bit of `va` in `owner`.
    fn set_dirty(&mut self, owner: Pid, va: usize, dirty: bool);
}

/// The user mappings of one address space, keyed by page-aligned virtual
/// address.
#[derive(Default)]
pub struct PageDirectory {
    entries: BTreeMap<usize, PageTableEntry>,
}

impl PageDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a present mapping from `va` to `frame`.
    ///
    /// Returns `false` if `va` already has a present mapping.
    #[must_use]
    pub fn map(&mut self, va: usize, frame: FrameNumber, writable: bool) -> bool {
        let va = page_round_down(va);
        if self.entries.get(&va).is_some_and(|entry| entry.present()) {
            return false;
        }

        let frame = u20::new(frame.index() as u32);
        self.entries.insert(va, PageTableEntry::user(frame, writable));
        true
    }

    /// Removes the entry for `va` entirely.
    pub fn unmap(&mut self, va: usize) -> Option<PageTableEntry> {
        self.entries.remove(&page_round_down(va))
    }

    pub fn entry(&self, va: usize) -> Option<PageTableEntry> {
        self.entries.get(&page_round_down(va)).copied()
    }

    /// The frame `va` currently translates to, if the mapping is present.
    pub fn translate(&self, va: usize) -> Option<FrameNumber> {
        let entry = self.entry(va)?;
        if !entry.present() {
            return None;
        }
        Some(FrameNumber::new(entry.page_frame_address().value() as usize))
    }

    pub fn is_present(&self, va: usize) -> bool {
        self.entry(va).is_some_and(|entry| entry.present())
    }

    pub fn is_writable(&self, va: usize) -> bool {
        self.entry(va).is_some_and(|entry| entry.read_write())
    }

    pub fn is_dirty(&self, va: usize) -> bool {
        self.entry(va).is_some_and(|entry| entry.dirty())
    }

    pub fn is_accessed(&self, va: usize) -> bool {
        self.entry(va).is_some_and(|entry| entry.accessed())
    }

    pub fn clear_page(&mut self, va: usize) {
        self.update(va, |entry| entry.with_present(false));
    }

    pub fn set_dirty(&mut self, va: usize, dirty: bool) {
        self.update(va, |entry| entry.with_dirty(dirty));
    }

    pub fn set_accessed(&mut self, va: usize, accessed: bool) {
        self.update(va, |entry| entry.with_accessed(accessed));
    }

    /// Number of present mappings.
    pub fn present_pages(&self) -> usize {
        self.entries.values().filter(|entry| entry.present()).count()
    }

    fn update(&mut self, va: usize, f: impl FnOnce(PageTableEntry) -> PageTableEntry) {
        if let Some(entry) = self.entries.get_mut(&page_round_down(va)) {
            *entry = f(*entry);
        }
    }
}

/// Page directories of every live address space.
#[derive(Default)]
pub struct AddressSpaceTable {
    spaces: BTreeMap<Pid, PageDirectory>,
}

impl AddressSpaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty address space for `pid`. Returns `false` if one
    /// already exists.
    pub fn create(&mut self, pid: Pid) -> bool {
        if self.spaces.contains_key(&pid) {
            return false;
        }
        self.spaces.insert(pid, PageDirectory::new());
        true
    }

    pub fn destroy(&mut self, pid: Pid) -> Option<PageDirectory> {
        self.spaces.remove(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.spaces.contains_key(&pid)
    }

    pub fn get(&self, pid: Pid) -> Option<&PageDirectory> {
        self.spaces.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut PageDirectory> {
        self.spaces.get_mut(&pid)
    }
}

impl PageTableOps for AddressSpaceTable {
    fn clear_page(&mut self, owner: Pid, va: usize) {
        if let Some(directory) = self.spaces.get_mut(&owner) {
            directory.clear_page(va);
        }
    }

    fn set_dirty(&mut self, owner: Pid, va: usize, dirty: bool) {
        if let Some(directory) = self.spaces.get_mut(&owner) {
            directory.set_dirty(va, dirty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_and_translate() {
        let mut directory = PageDirectory::new();
        assert!(directory.map(0x4000, FrameNumber::new(7), true));
        assert_eq!(directory.translate(0x4abc), Some(FrameNumber::new(7)));
        assert!(directory.is_writable(0x4000));
        assert!(!directory.map(0x4000, FrameNumber::new(8), true));
        assert_eq!(directory.translate(0x5000), None);
    }

    #[test]
    fn clear_page_invalidates_translation() {
        let mut directory = PageDirectory::new();
        assert!(directory.map(0x4000, FrameNumber::new(1), true));
        directory.set_dirty(0x4000, true);

        directory.clear_page(0x4000);
        assert_eq!(directory.translate(0x4000), None);
        assert!(directory.is_dirty(0x4000));
        assert_eq!(directory.present_pages(), 0);

        // A cleared entry may be mapped again.
        assert!(directory.map(0x4000, FrameNumber::new(2), false));
        assert_eq!(directory.translate(0x4000), Some(FrameNumber::new(2)));
        assert!(!directory.is_dirty(0x4000));
    }

    #[test]
    fn ops_route_to_owner() {
        let mut spaces = AddressSpaceTable::new();
        assert!(spaces.create(1));
        assert!(spaces.create(2));
        assert!(!spaces.create(1));

        for pid in [1, 2] {
            let directory = spaces.get_mut(pid).unwrap();
            assert!(directory.map(0x1000, FrameNumber::new(pid as usize), true));
            directory.set_dirty(0x1000, true);
        }

        spaces.clear_page(1, 0x1000);
        spaces.set_dirty(1, 0x1000, false);

        assert!(!spaces.get(1).unwrap().is_present(0x1000));
        assert!(!spaces.get(1).unwrap().is_dirty(0x1000));
        assert!(spaces.get(2).unwrap().is_present(0x1000));
        assert!(spaces.get(2).unwrap().is_dirty(0x1000));

        // Unknown address spaces are ignored.
        spaces.clear_page(9, 0x1000);
    }
}
