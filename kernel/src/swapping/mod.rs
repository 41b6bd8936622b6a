pub mod page_replacement;
mod swapping_utils;

use crate::block::{Block, BlockError, BlockManager, BlockSector, BlockType, BLOCK_SECTOR_SIZE};
use crate::sync::Mutex;
use bitvec::{order::Lsb0, vec::BitVec};
use core::fmt;
use kidneyos_shared::{eprintln, mem::PAGE_FRAME_SIZE, println};
use static_assertions::const_assert_eq;

/// Number of consecutive sectors holding one page on the swap device.
pub const SECTORS_PER_PAGE: usize = PAGE_FRAME_SIZE.div_ceil(BLOCK_SECTOR_SIZE);

// A page must fill its sectors exactly; there is no room for padding on disk.
const_assert_eq!(SECTORS_PER_PAGE * BLOCK_SECTOR_SIZE, PAGE_FRAME_SIZE);

/// Index of a page-sized slot on the swap device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(usize);

impl SwapSlot {
    pub const fn index(self) -> usize {
        self.0
    }

    /// The device sector holding byte 0 of the page stored in this slot.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn first_sector(self) -> BlockSector {
        // Slot counts are derived from a BlockSector capacity, so this fits.
        (self.0 * SECTORS_PER_PAGE) as BlockSector
    }
}

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// The swap device together with its slot occupancy bitmap.
///
/// A set bit means the slot holds the only copy of exactly one swapped-out
/// page. Occupancy lives only in memory; nothing is written to the device
/// besides page contents.
pub struct SwapTable {
    disk: Mutex<Block>,
    slots: Mutex<BitVec<usize, Lsb0>>,
}

impl SwapTable {
    /// Takes ownership of `disk` and sizes the bitmap from its capacity.
    pub fn new(disk: Block) -> Self {
        let slot_count = disk.get_size() as usize / SECTORS_PER_PAGE;
        println!(
            "Swap: using \"{}\" ({} sectors, {} slots)",
            disk.get_name(),
            disk.get_size(),
            slot_count
        );

        Self {
            disk: Mutex::new(disk),
            slots: Mutex::new(BitVec::repeat(false, slot_count)),
        }
    }

    /// Claims the swap device from `block_manager`: the one called `name` if
    /// given, otherwise the first device of type [`BlockType::Swap`].
    pub fn from_block_manager(block_manager: &mut BlockManager, name: Option<&str>) -> Option<Self> {
        block_manager
            .claim(BlockType::Swap, name)
            .map(SwapTable::new)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.lock().count_zeros()
    }

    pub fn is_occupied(&self, slot: SwapSlot) -> bool {
        self.slots
            .lock()
            .get(slot.index())
            .is_some_and(|bit| *bit)
    }

    /// Marks the lowest-indexed free slot occupied and returns it, or `None`
    /// if every slot is taken.
    pub fn try_reserve(&self) -> Option<SwapSlot> {
        let mut slots = self.slots.lock();
        let index = slots.first_zero()?;
        slots.set(index, true);
        Some(SwapSlot(index))
    }

    /// Like [`SwapTable::try_reserve`], but running out of swap is fatal: no
    /// page can be evicted without a slot to hold it.
    pub fn reserve(&self) -> SwapSlot {
        match self.try_reserve() {
            Some(slot) => slot,
            None => {
                let total = self.slot_count();
                eprintln!("Swap: no free slot left among {} slots", total);
                panic!("swap space exhausted ({} slots in use)", total);
            }
        }
    }

    /// Returns `slot` to the free pool.
    ///
    /// Releasing a slot that is not occupied means two pages believed they
    /// owned it, which is fatal.
    pub fn release(&self, slot: SwapSlot) {
        let mut slots = self.slots.lock();
        assert!(
            slots.get(slot.index()).is_some_and(|bit| *bit),
            "releasing free swap {}",
            slot
        );
        slots.set(slot.index(), false);
    }

    /// Writes one page from `frame` into `slot`, sector by sector.
    pub fn write_page(&self, slot: SwapSlot, frame: &[u8]) -> Result<(), BlockError> {
        swapping_utils::write_page(&mut self.disk.lock(), slot, frame)
    }

    /// Reads the page stored in `slot` into `frame`, sector by sector.
    pub fn read_page(&self, slot: SwapSlot, frame: &mut [u8]) -> Result<(), BlockError> {
        swapping_utils::read_page(&mut self.disk.lock(), slot, frame)
    }

    /// Sector reads and writes issued to the swap device so far.
    pub fn io_counts(&self) -> (u32, u32) {
        let disk = self.disk.lock();
        (disk.read_count(), disk.write_count())
    }
}
