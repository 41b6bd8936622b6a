// https://wiki.osdev.org/Paging

use arbitrary_int::u20;
use bitbybit::bitfield;

/// A 32-bit x86 page table entry.
///
/// Only the bits the virtual memory code consults are named; the rest stay
/// zero.
#[bitfield(u32, default = 0)]
pub struct PageTableEntry {
    #[bit(0, rw)]
    present: bool,
    #[bit(1, rw)]
    read_write: bool,
    #[bit(2, rw)]
    user_supervisor: bool,
    #[bit(5, rw)]
    accessed: bool,
    #[bit(6, rw)]
    dirty: bool,
    #[bits(12..=31, rw)]
    page_frame_address: u20,
}

impl PageTableEntry {
    /// A present user-mode entry pointing at frame number `frame`.
    pub fn user(frame: u20, writable: bool) -> Self {
        Self::default()
            .with_present(true)
            .with_read_write(writable)
            .with_user_supervisor(true)
            .with_page_frame_address(frame)
    }
}
