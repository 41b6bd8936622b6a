//! User virtual memory: anonymous pages, page faults and eviction.
//!
//! Locks are always taken in the order page, frames, page tables, policy.
//! The swap bitmap and the swap disk are leaves and may be taken under any
//! of them. The page map lock is only held for lookups and is never held
//! while acquiring another lock.

pub mod anon;
mod vm_error;

pub use anon::{AnonKind, AnonPage, AnonState};
pub use vm_error::{SwapError, VmError};

use crate::block::BlockManager;
use crate::config::{EvictionKind, PlacementKind, VmConfig};
use crate::mem::frame_allocator::placement_algorithms::{FirstFit, NextFit, PlacementAlgorithm};
use crate::mem::{AddressSpaceTable, FrameNumber, FrameTable, PageKey, Pid};
use crate::swapping::page_replacement::{Clock, Fifo, PageReplacementPolicy};
use crate::swapping::{SwapSlot, SwapTable};
use crate::sync::Mutex;
use alloc::{boxed::Box, collections::BTreeMap, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicUsize, Ordering};
use kidneyos_shared::{
    eprintln,
    mem::{is_user_address, page_offset, PAGE_FRAME_SIZE, USER_STACK_TOP},
    println,
};

/// How far below the stack pointer an access may land and still count as
/// stack growth (`pusha` writes 32 bytes below `esp`).
pub const STACK_SLACK: usize = 32;

/// A user page fault as reported by the trap handler.
#[derive(Clone, Copy, Debug)]
pub struct PageFault {
    pub addr: usize,
    pub write: bool,
    /// The user stack pointer at the time of the fault, if the fault came
    /// from user mode.
    pub user_sp: Option<usize>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VmStats {
    pub frames_total: usize,
    pub frames_free: usize,
    pub slots_total: usize,
    pub slots_free: usize,
    pub swap_ins: usize,
    pub swap_outs: usize,
}

/// A page's own lock. `None` once the page has been destroyed; anyone still
/// holding a reference then treats the page as unmapped.
type PageRef = Arc<Mutex<Option<AnonPage>>>;

pub struct Vm {
    swap: SwapTable,
    frames: Mutex<FrameTable>,
    tables: Mutex<AddressSpaceTable>,
    pages: Mutex<BTreeMap<PageKey, PageRef>>,
    policy: Mutex<Box<dyn PageReplacementPolicy>>,
    stack_limit: usize,
    swap_ins: AtomicUsize,
    swap_outs: AtomicUsize,
}

impl Vm {
    /// Claims the swap device from `block_manager` and sets up the frame pool
    /// as described by `config`.
    pub fn new(config: &VmConfig, block_manager: &mut BlockManager) -> Result<Self, VmError> {
        let Some(swap) = SwapTable::from_block_manager(block_manager, config.swap_device.as_deref())
        else {
            eprintln!("VM: no swap device found");
            return Err(VmError::NoSwapDevice);
        };

        let placement: Box<dyn PlacementAlgorithm> = match config.placement {
            PlacementKind::NextFit => Box::new(NextFit::default()),
            PlacementKind::FirstFit => Box::new(FirstFit),
        };
        let policy: Box<dyn PageReplacementPolicy> = match config.eviction {
            EvictionKind::Fifo => Box::new(Fifo),
            EvictionKind::Clock => Box::new(Clock::default()),
        };

        println!(
            "VM: {} user frames, {:?} placement, {:?} eviction",
            config.user_frames, config.placement, config.eviction
        );
        let frames = FrameTable::new(config.user_frames, placement);
        Ok(Self::with_parts(swap, frames, policy, config.stack_limit))
    }

    pub fn with_parts(
        swap: SwapTable,
        frames: FrameTable,
        policy: Box<dyn PageReplacementPolicy>,
        stack_limit: usize,
    ) -> Self {
        Vm {
            swap,
            frames: Mutex::new(frames),
            tables: Mutex::new(AddressSpaceTable::new()),
            pages: Mutex::new(BTreeMap::new()),
            policy: Mutex::new(policy),
            stack_limit,
            swap_ins: AtomicUsize::new(0),
            swap_outs: AtomicUsize::new(0),
        }
    }

    /// Returns `false` if `pid` already has an address space.
    pub fn create_address_space(&self, pid: Pid) -> bool {
        self.tables.lock().create(pid)
    }

    /// Destroys every page of `pid`, then its page directory.
    pub fn destroy_address_space(&self, pid: Pid) -> Result<(), VmError> {
        let doomed: Vec<(PageKey, PageRef)> = {
            let mut pages = self.pages.lock();
            let keys: Vec<PageKey> = pages
                .range(PageKey::new(pid, 0)..=PageKey::new(pid, usize::MAX))
                .map(|(key, _)| *key)
                .collect();
            keys.into_iter()
                .filter_map(|key| pages.remove(&key).map(|page| (key, page)))
                .collect()
        };

        for (key, page) in &doomed {
            self.discard(*key, page);
        }

        match self.tables.lock().destroy(pid) {
            Some(_) => Ok(()),
            None => Err(VmError::NoAddressSpace),
        }
    }

    /// Maps a new zero-filled anonymous page at `va` in `pid`.
    pub fn alloc_anon(&self, pid: Pid, va: usize, kind: AnonKind, writable: bool) -> Result<(), VmError> {
        if !is_user_address(va) {
            return Err(VmError::NotUserAddress);
        }
        if !self.tables.lock().contains(pid) {
            return Err(VmError::NoAddressSpace);
        }

        let key = PageKey::new(pid, va);
        let page: PageRef = Arc::new(Mutex::new(None));
        let mut entry = page.lock();
        {
            let mut pages = self.pages.lock();
            if pages.contains_key(&key) {
                return Err(VmError::AlreadyMapped);
            }
            pages.insert(key, page.clone());
        }

        let frame = match self.get_frame(key) {
            Ok(frame) => frame,
            Err(e) => {
                self.pages.lock().remove(&key);
                return Err(e);
            }
        };

        let mut frames = self.frames.lock();
        let mut tables = self.tables.lock();
        let mapped = match tables.get_mut(pid) {
            Some(directory) => directory
                .map(key.va, frame, writable)
                .then_some(())
                .ok_or(VmError::AlreadyMapped),
            None => Err(VmError::NoAddressSpace),
        };
        if let Err(e) = mapped {
            frames.free(frame);
            drop(tables);
            drop(frames);
            self.pages.lock().remove(&key);
            return Err(e);
        }

        frames.frame_mut(frame).fill(0);
        *entry = Some(AnonPage::new(pid, key.va, writable, kind, frame));
        frames.unpin(frame);
        Ok(())
    }

    /// Removes the page at `va` from `pid` and releases its frame or slot.
    pub fn unmap(&self, pid: Pid, va: usize) -> Result<(), VmError> {
        let key = PageKey::new(pid, va);
        let page = self.pages.lock().remove(&key).ok_or(VmError::NotMapped)?;
        self.discard(key, &page);
        Ok(())
    }

    /// Resolves a fault on a user address of `pid`.
    ///
    /// A swapped-out page is read back into a new frame. A fault on a
    /// resident page succeeds without doing anything, since another thread
    /// got there first. A fault just below the stack pointer inside the stack
    /// region grows the stack by one page.
    pub fn handle_fault(&self, pid: Pid, fault: PageFault) -> Result<(), VmError> {
        if !is_user_address(fault.addr) {
            return Err(VmError::NotUserAddress);
        }

        let key = PageKey::new(pid, fault.addr);
        let page = self.pages.lock().get(&key).cloned();
        let Some(page) = page else {
            return self.grow_stack(pid, fault);
        };

        let mut entry = page.lock();
        let Some(anon) = entry.as_mut() else {
            return Err(VmError::NotMapped);
        };
        if fault.write && !anon.writable() {
            return Err(VmError::WriteProtected);
        }
        if anon.is_resident() {
            return Ok(());
        }

        let frame = self.get_frame(key)?;
        let mut frames = self.frames.lock();
        if let Err(e) = anon.swap_in(&self.swap, &mut frames, frame) {
            frames.free(frame);
            return Err(e.into());
        }
        self.swap_ins.fetch_add(1, Ordering::Relaxed);

        let mapped = self
            .tables
            .lock()
            .get_mut(pid)
            .is_some_and(|directory| directory.map(key.va, frame, anon.writable()));
        frames.unpin(frame);

        if mapped {
            Ok(())
        } else {
            Err(VmError::NoAddressSpace)
        }
    }

    /// Swaps out one page chosen by the replacement policy.
    ///
    /// Pages whose lock is held elsewhere are skipped rather than waited on.
    /// Fails with [`VmError::OutOfFrames`] if no page could be evicted.
    pub fn evict_one(&self) -> Result<SwapSlot, VmError> {
        let attempts = 2 * self.frames.lock().len() + 1;

        for _ in 0..attempts {
            let (victim, key) = {
                let frames = self.frames.lock();
                let mut tables = self.tables.lock();
                let victim = self
                    .policy
                    .lock()
                    .evict_page(&frames, &mut tables)
                    .ok_or(VmError::OutOfFrames)?;
                match frames.owner(victim) {
                    Some(key) => (victim, key),
                    None => continue,
                }
            };

            let page = self.pages.lock().get(&key).cloned();
            let Some(mut entry) = page.as_ref().and_then(|page| page.try_lock()) else {
                self.frames.lock().requeue(victim);
                continue;
            };
            let Some(anon) = entry.as_mut().filter(|anon| anon.frame() == Some(victim)) else {
                // Destroyed or already moved; the frame is free or belongs
                // to a new page by now.
                self.frames.lock().requeue(victim);
                continue;
            };

            let mut frames = self.frames.lock();
            let mut tables = self.tables.lock();
            let slot = anon.swap_out(&self.swap, &mut frames, &mut *tables)?;
            self.swap_outs.fetch_add(1, Ordering::Relaxed);
            return Ok(slot);
        }

        Err(VmError::OutOfFrames)
    }

    /// Copies user memory at `addr` into `buf`, faulting pages in as needed.
    pub fn read_user(&self, pid: Pid, addr: usize, buf: &mut [u8]) -> Result<(), VmError> {
        let mut done = 0;
        while done < buf.len() {
            let va = addr.checked_add(done).ok_or(VmError::NotUserAddress)?;
            let len = (PAGE_FRAME_SIZE - page_offset(va)).min(buf.len() - done);
            let dst = &mut buf[done..done + len];
            self.with_page(pid, va, false, |bytes| dst.copy_from_slice(&bytes[..len]))?;
            done += len;
        }
        Ok(())
    }

    /// Copies `buf` into user memory at `addr`, faulting pages in as needed.
    pub fn write_user(&self, pid: Pid, addr: usize, buf: &[u8]) -> Result<(), VmError> {
        let mut done = 0;
        while done < buf.len() {
            let va = addr.checked_add(done).ok_or(VmError::NotUserAddress)?;
            let len = (PAGE_FRAME_SIZE - page_offset(va)).min(buf.len() - done);
            let src = &buf[done..done + len];
            self.with_page(pid, va, true, |bytes| bytes[..len].copy_from_slice(src))?;
            done += len;
        }
        Ok(())
    }

    /// Where the page at `va` of `pid` currently lives, if there is one.
    pub fn page_state(&self, pid: Pid, va: usize) -> Option<AnonState> {
        let page = self.pages.lock().get(&PageKey::new(pid, va)).cloned()?;
        let entry = page.lock();
        entry.as_ref().map(AnonPage::state)
    }

    /// Whether the page at `va` of `pid` is ordinary or grew the stack.
    pub fn page_kind(&self, pid: Pid, va: usize) -> Option<AnonKind> {
        let page = self.pages.lock().get(&PageKey::new(pid, va)).cloned()?;
        let entry = page.lock();
        entry.as_ref().map(AnonPage::kind)
    }

    pub fn stats(&self) -> VmStats {
        let (frames_total, frames_free) = {
            let frames = self.frames.lock();
            (frames.len(), frames.free_frames())
        };
        VmStats {
            frames_total,
            frames_free,
            slots_total: self.swap.slot_count(),
            slots_free: self.swap.free_slots(),
            swap_ins: self.swap_ins.load(Ordering::Relaxed),
            swap_outs: self.swap_outs.load(Ordering::Relaxed),
        }
    }

    /// Allocates a frame for `owner`, evicting pages until one is free.
    fn get_frame(&self, owner: PageKey) -> Result<FrameNumber, VmError> {
        loop {
            if let Some(frame) = self.frames.lock().alloc(owner) {
                return Ok(frame);
            }
            self.evict_one()?;
        }
    }

    fn grow_stack(&self, pid: Pid, fault: PageFault) -> Result<(), VmError> {
        let addr = fault.addr;
        let in_region = addr >= USER_STACK_TOP.saturating_sub(self.stack_limit) && addr < USER_STACK_TOP;
        let near_sp = fault
            .user_sp
            .is_some_and(|sp| addr >= sp.saturating_sub(STACK_SLACK));
        if !(in_region && near_sp) {
            return Err(VmError::NotMapped);
        }

        match self.alloc_anon(pid, addr, AnonKind::Stack, true) {
            // Another thread grew the stack over the same page.
            Err(VmError::AlreadyMapped) => Ok(()),
            result => result,
        }
    }

    /// Destroys a page already removed from the page map.
    fn discard(&self, key: PageKey, page: &PageRef) {
        let mut entry = page.lock();
        let Some(anon) = entry.take() else {
            return;
        };

        let mut frames = self.frames.lock();
        if let Some(directory) = self.tables.lock().get_mut(key.owner) {
            directory.unmap(key.va);
        }
        anon.destroy(&self.swap, &mut frames);
    }

    /// Runs `f` on the bytes of the page holding `va` from `va` onwards,
    /// updating its accessed and dirty bits. Faults the page in first if it
    /// is not present.
    fn with_page<F: FnMut(&mut [u8])>(
        &self,
        pid: Pid,
        va: usize,
        write: bool,
        mut f: F,
    ) -> Result<(), VmError> {
        if !is_user_address(va) {
            return Err(VmError::NotUserAddress);
        }

        loop {
            {
                let mut frames = self.frames.lock();
                let mut tables = self.tables.lock();
                let directory = tables.get_mut(pid).ok_or(VmError::NoAddressSpace)?;
                if let Some(frame) = directory.translate(va) {
                    if write && !directory.is_writable(va) {
                        return Err(VmError::WriteProtected);
                    }
                    directory.set_accessed(va, true);
                    if write {
                        directory.set_dirty(va, true);
                    }
                    f(&mut frames.frame_mut(frame)[page_offset(va)..]);
                    return Ok(());
                }
            }

            self.handle_fault(
                pid,
                PageFault {
                    addr: va,
                    write,
                    user_sp: None,
                },
            )?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockError, BlockType};
    use crate::drivers::ram_disk::RamDisk;
    use crate::swapping::tests::{faulty_swap_table, swap_table, FaultyDisk};
    use crate::swapping::SECTORS_PER_PAGE;
    use kidneyos_shared::sizes::KB;
    use std::thread;

    const PID: Pid = 3;

    fn vm(frames: usize, slots: usize) -> Vm {
        let vm = Vm::with_parts(
            swap_table(slots),
            FrameTable::new(frames, Box::new(FirstFit)),
            Box::new(Fifo),
            64 * KB,
        );
        assert!(vm.create_address_space(PID));
        vm
    }

    fn page(n: usize) -> usize {
        0x10_0000 + n * PAGE_FRAME_SIZE
    }

    #[test]
    fn new_from_config() {
        let mut manager = BlockManager::new();
        manager.register_block(BlockType::Swap, "hdb", 64, Box::new(RamDisk::new(64)));
        let config = VmConfig::parse("frames=4 evict=fifo").unwrap();

        let vm = Vm::new(&config, &mut manager).unwrap();
        let stats = vm.stats();
        assert_eq!(stats.frames_total, 4);
        assert_eq!(stats.slots_total, 64 / SECTORS_PER_PAGE);
        assert!(manager.is_empty());
    }

    #[test]
    fn new_without_swap() {
        let mut manager = BlockManager::new();
        manager.register_block(BlockType::Swap, "hdb", 64, Box::new(RamDisk::new(64)));
        let config = VmConfig::parse("swap=hdc").unwrap();
        assert!(matches!(Vm::new(&config, &mut manager), Err(VmError::NoSwapDevice)));
    }

    #[test]
    fn anon_pages_start_zeroed() {
        let vm = vm(2, 2);
        vm.alloc_anon(PID, page(0), AnonKind::Ordinary, true).unwrap();

        let mut buf = [0xffu8; 16];
        vm.read_user(PID, page(0) + 100, &mut buf).unwrap();
        assert_eq!(buf, [0; 16]);
        assert!(matches!(vm.page_state(PID, page(0)), Some(AnonState::Resident(_))));
        assert_eq!(vm.page_kind(PID, page(0)), Some(AnonKind::Ordinary));
    }

    #[test]
    fn alloc_rejects_bad_requests() {
        let vm = vm(2, 2);
        vm.alloc_anon(PID, page(0), AnonKind::Ordinary, true).unwrap();

        assert_eq!(
            vm.alloc_anon(PID, page(0) + 8, AnonKind::Ordinary, true),
            Err(VmError::AlreadyMapped)
        );
        assert_eq!(
            vm.alloc_anon(PID, USER_STACK_TOP, AnonKind::Ordinary, true),
            Err(VmError::NotUserAddress)
        );
        assert_eq!(
            vm.alloc_anon(9, page(0), AnonKind::Ordinary, true),
            Err(VmError::NoAddressSpace)
        );
        assert_eq!(vm.stats().frames_free, 1);
    }

    #[test]
    fn memory_pressure_swaps_pages_out_and_back() {
        let vm = vm(2, 8);
        for n in 0..5 {
            vm.alloc_anon(PID, page(n), AnonKind::Ordinary, true).unwrap();
            vm.write_user(PID, page(n), &[n as u8 + 1; 64]).unwrap();
        }

        let stats = vm.stats();
        assert_eq!(stats.frames_free, 0);
        assert_eq!(stats.swap_outs, 3);
        assert_eq!(stats.slots_free, 5);
        assert!(matches!(vm.page_state(PID, page(0)), Some(AnonState::SwappedOut(_))));

        for n in 0..5 {
            let mut buf = [0u8; 64];
            vm.read_user(PID, page(n), &mut buf).unwrap();
            assert_eq!(buf, [n as u8 + 1; 64]);
        }
        assert!(vm.stats().swap_ins >= 3);
    }

    #[test]
    fn access_spanning_pages() {
        let vm = vm(1, 4);
        vm.alloc_anon(PID, page(0), AnonKind::Ordinary, true).unwrap();
        vm.alloc_anon(PID, page(1), AnonKind::Ordinary, true).unwrap();

        // Only one frame: each half of the copy evicts the other page.
        let data: Vec<u8> = (0..200).collect();
        vm.write_user(PID, page(1) - 100, &data).unwrap();

        let mut back = [0u8; 200];
        vm.read_user(PID, page(1) - 100, &mut back).unwrap();
        assert_eq!(&back[..], &data[..]);
    }

    #[test]
    fn failed_swap_in_returns_the_frame() {
        let swap = faulty_swap_table(
            4,
            FaultyDisk {
                reads: false,
                writes: true,
            },
        );
        let vm = Vm::with_parts(swap, FrameTable::new(2, Box::new(FirstFit)), Box::new(Fifo), 0);
        assert!(vm.create_address_space(PID));
        for n in 0..3 {
            vm.alloc_anon(PID, page(n), AnonKind::Ordinary, true).unwrap();
        }
        vm.unmap(PID, page(2)).unwrap();

        let Some(AnonState::SwappedOut(slot)) = vm.page_state(PID, page(0)) else {
            panic!("page 0 should have been evicted");
        };
        let before = vm.stats();
        assert_eq!(before.frames_free, 1);

        let fault = PageFault {
            addr: page(0),
            write: false,
            user_sp: None,
        };
        assert_eq!(
            vm.handle_fault(PID, fault),
            Err(VmError::Swap(SwapError::Block(BlockError::ReadError)))
        );
        assert_eq!(vm.stats(), before);
        assert_eq!(vm.page_state(PID, page(0)), Some(AnonState::SwappedOut(slot)));
        assert!(vm.swap.is_occupied(slot));
    }

    #[test]
    fn fault_on_resident_page_is_spurious() {
        let vm = vm(2, 2);
        vm.alloc_anon(PID, page(0), AnonKind::Ordinary, true).unwrap();
        let before = vm.stats();

        let fault = PageFault {
            addr: page(0) + 4,
            write: true,
            user_sp: None,
        };
        vm.handle_fault(PID, fault).unwrap();
        assert_eq!(vm.stats(), before);
    }

    #[test]
    fn write_to_read_only_page() {
        let vm = vm(1, 2);
        vm.alloc_anon(PID, page(0), AnonKind::Ordinary, false).unwrap();
        assert_eq!(vm.write_user(PID, page(0), &[1]), Err(VmError::WriteProtected));

        vm.alloc_anon(PID, page(1), AnonKind::Ordinary, true).unwrap();
        let fault = PageFault {
            addr: page(0),
            write: true,
            user_sp: None,
        };
        assert_eq!(vm.handle_fault(PID, fault), Err(VmError::WriteProtected));
    }

    #[test]
    fn stack_grows_near_stack_pointer() {
        let vm = vm(4, 4);
        let sp = USER_STACK_TOP - 0x10;
        let fault = PageFault {
            addr: sp - STACK_SLACK,
            write: true,
            user_sp: Some(sp),
        };
        vm.handle_fault(PID, fault).unwrap();
        assert!(matches!(
            vm.page_state(PID, sp),
            Some(AnonState::Resident(_))
        ));
        assert_eq!(vm.page_kind(PID, sp), Some(AnonKind::Stack));

        // Too far below the stack pointer.
        let wild = PageFault {
            addr: sp - 2 * PAGE_FRAME_SIZE,
            write: true,
            user_sp: Some(sp),
        };
        assert_eq!(vm.handle_fault(PID, wild), Err(VmError::NotMapped));

        // Below the stack limit.
        let deep = USER_STACK_TOP - 128 * KB;
        let overflow = PageFault {
            addr: deep,
            write: true,
            user_sp: Some(deep),
        };
        assert_eq!(vm.handle_fault(PID, overflow), Err(VmError::NotMapped));

        // No stack pointer, no growth.
        let kernel = PageFault {
            addr: sp - STACK_SLACK,
            write: false,
            user_sp: None,
        };
        assert_eq!(vm.handle_fault(PID, kernel), Ok(()));
        let unknown = PageFault {
            addr: page(0),
            write: false,
            user_sp: None,
        };
        assert_eq!(vm.handle_fault(PID, unknown), Err(VmError::NotMapped));
    }

    #[test]
    fn stack_pages_swap_like_ordinary_pages() {
        let vm = vm(1, 4);
        let sp = USER_STACK_TOP - 8;
        vm.handle_fault(
            PID,
            PageFault {
                addr: sp,
                write: true,
                user_sp: Some(sp),
            },
        )
        .unwrap();
        vm.write_user(PID, sp, &[0x5a; 8]).unwrap();

        vm.alloc_anon(PID, page(0), AnonKind::Ordinary, true).unwrap();
        assert!(matches!(vm.page_state(PID, sp), Some(AnonState::SwappedOut(_))));

        let mut buf = [0u8; 8];
        vm.read_user(PID, sp, &mut buf).unwrap();
        assert_eq!(buf, [0x5a; 8]);
    }

    #[test]
    fn unmap_releases_frame_or_slot() {
        let vm = vm(1, 2);
        vm.alloc_anon(PID, page(0), AnonKind::Ordinary, true).unwrap();
        vm.alloc_anon(PID, page(1), AnonKind::Ordinary, true).unwrap();
        assert_eq!(vm.stats().slots_free, 1);

        vm.unmap(PID, page(0)).unwrap();
        assert_eq!(vm.stats().slots_free, 2);
        assert_eq!(vm.page_state(PID, page(0)), None);

        vm.unmap(PID, page(1)).unwrap();
        assert_eq!(vm.stats().frames_free, 1);
        assert_eq!(vm.unmap(PID, page(1)), Err(VmError::NotMapped));

        let mut buf = [0u8; 1];
        assert_eq!(vm.read_user(PID, page(1), &mut buf), Err(VmError::NotMapped));
    }

    #[test]
    fn teardown_releases_everything() {
        let vm = vm(2, 4);
        assert!(vm.create_address_space(PID + 1));
        for n in 0..4 {
            vm.alloc_anon(PID, page(n), AnonKind::Ordinary, true).unwrap();
        }
        vm.alloc_anon(PID + 1, page(0), AnonKind::Ordinary, true).unwrap();

        vm.destroy_address_space(PID).unwrap();
        let stats = vm.stats();
        assert_eq!(stats.frames_free, 1);
        assert_eq!(stats.slots_free, stats.slots_total);
        assert_eq!(vm.page_state(PID, page(1)), None);
        assert!(vm.page_state(PID + 1, page(0)).is_some());

        assert_eq!(vm.destroy_address_space(PID), Err(VmError::NoAddressSpace));
    }

    #[test]
    fn out_of_frames_when_everything_is_pinned() {
        let vm = vm(1, 2);
        vm.alloc_anon(PID, page(0), AnonKind::Ordinary, true).unwrap();
        let frame = match vm.page_state(PID, page(0)) {
            Some(AnonState::Resident(frame)) => frame,
            other => panic!("unexpected state {:?}", other),
        };

        vm.frames.lock().pin(frame);
        assert_eq!(vm.evict_one(), Err(VmError::OutOfFrames));
        assert_eq!(
            vm.alloc_anon(PID, page(1), AnonKind::Ordinary, true),
            Err(VmError::OutOfFrames)
        );
        assert_eq!(vm.page_state(PID, page(1)), None);
    }

    #[test]
    fn eviction_moves_past_a_destroyed_page() {
        let vm = vm(2, 4);

        // The oldest frame still names a page whose descriptor is gone.
        let stale = PageKey::new(PID, page(5));
        let frame = vm.frames.lock().alloc(stale).unwrap();
        vm.frames.lock().unpin(frame);
        vm.pages.lock().insert(stale, Arc::new(Mutex::new(None)));

        vm.alloc_anon(PID, page(0), AnonKind::Ordinary, true).unwrap();
        vm.evict_one().unwrap();
        assert!(matches!(vm.page_state(PID, page(0)), Some(AnonState::SwappedOut(_))));
        assert_eq!(vm.stats().swap_outs, 1);
    }

    #[test]
    fn threads_share_a_small_pool() {
        const THREADS: usize = 4;
        const PAGES: usize = 6;

        let vm = Arc::new(vm(4, THREADS * PAGES));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let vm = Arc::clone(&vm);
                thread::spawn(move || {
                    let base = page(t * PAGES);
                    for n in 0..PAGES {
                        let va = base + n * PAGE_FRAME_SIZE;
                        vm.alloc_anon(PID, va, AnonKind::Ordinary, true).unwrap();
                        vm.write_user(PID, va, &[(t * PAGES + n) as u8; 32]).unwrap();
                    }
                    for n in 0..PAGES {
                        let va = base + n * PAGE_FRAME_SIZE;
                        let mut buf = [0u8; 32];
                        vm.read_user(PID, va, &mut buf).unwrap();
                        assert_eq!(buf, [(t * PAGES + n) as u8; 32]);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = vm.stats();
        assert_eq!(stats.frames_free, 0);
        assert_eq!(stats.slots_free, stats.slots_total - (THREADS * PAGES - 4));
    }
}
