pub mod frame_allocator;
pub mod page_table;

pub use frame_allocator::{FrameNumber, FrameTable};
pub use page_table::{AddressSpaceTable, PageDirectory, PageTableOps};

use kidneyos_shared::mem::page_round_down;

/// Address-space identifier.
pub type Pid = u16;

/// Identifies one user page: the address space it belongs to and its
/// page-aligned virtual address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageKey {
    pub owner: Pid,
    pub va: usize,
}

impl PageKey {
    pub const fn new(owner: Pid, addr: usize) -> Self {
        Self {
            owner,
            va: page_round_down(addr),
        }
    }
}
