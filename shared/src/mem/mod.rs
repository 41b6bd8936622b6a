use crate::sizes::KB;

// Page size is 4KB. This is a property of x86 processors.
pub const PAGE_FRAME_SIZE: usize = 4 * KB;

// Any virtual address at or above OFFSET is a kernel address.
pub const OFFSET: usize = 0x80000000;

/// Top of the user stack; the stack grows down from here.
pub const USER_STACK_TOP: usize = OFFSET;

/// Rounds `addr` down to the start of its page.
#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_FRAME_SIZE - 1)
}

/// Offset of `addr` within its page.
#[inline]
pub const fn page_offset(addr: usize) -> usize {
    addr & (PAGE_FRAME_SIZE - 1)
}

#[inline]
pub const fn is_user_address(addr: usize) -> bool {
    addr < OFFSET
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(page_round_down(0x1234), 0x1000);
        assert_eq!(page_offset(0x1234), 0x234);
        assert_eq!(page_round_down(PAGE_FRAME_SIZE), PAGE_FRAME_SIZE);
        assert!(is_user_address(OFFSET - 1));
        assert!(!is_user_address(OFFSET));
    }
}
