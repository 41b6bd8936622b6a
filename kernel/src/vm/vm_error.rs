use crate::block::BlockError;
use core::error::Error;
use core::fmt::{Debug, Display, Formatter};

/// Error type for the anonymous page lifecycle operations
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SwapError {
    /// `swap_in` on a page that already has a frame
    NotSwappedOut,
    /// `swap_out` on a page that has no frame
    NotResident,
    /// The swap device failed; the page is left as it was
    Block(BlockError),
}

impl Debug for SwapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            SwapError::NotSwappedOut => write!(f, "NotSwappedOut"),
            SwapError::NotResident => write!(f, "NotResident"),
            SwapError::Block(e) => write!(f, "Block({:?})", e),
        }
    }
}

impl Display for SwapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            SwapError::NotSwappedOut => write!(f, "page is not swapped out"),
            SwapError::NotResident => write!(f, "page has no resident frame"),
            SwapError::Block(e) => write!(f, "swap device: {}", e),
        }
    }
}

impl Error for SwapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SwapError::Block(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BlockError> for SwapError {
    fn from(e: BlockError) -> Self {
        SwapError::Block(e)
    }
}

/// Error type for faults and mapping requests
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The address lies in kernel space
    NotUserAddress,
    /// No address space with that pid
    NoAddressSpace,
    /// A page is already mapped at that address
    AlreadyMapped,
    /// No page at that address, and the fault is not stack growth
    NotMapped,
    /// Write access to a read-only page
    WriteProtected,
    /// Every frame is pinned or its page is busy
    OutOfFrames,
    /// No block device was available for swap
    NoSwapDevice,
    Swap(SwapError),
}

impl Debug for VmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            VmError::NotUserAddress => write!(f, "NotUserAddress"),
            VmError::NoAddressSpace => write!(f, "NoAddressSpace"),
            VmError::AlreadyMapped => write!(f, "AlreadyMapped"),
            VmError::NotMapped => write!(f, "NotMapped"),
            VmError::WriteProtected => write!(f, "WriteProtected"),
            VmError::OutOfFrames => write!(f, "OutOfFrames"),
            VmError::NoSwapDevice => write!(f, "NoSwapDevice"),
            VmError::Swap(e) => write!(f, "Swap({:?})", e),
        }
    }
}

impl Display for VmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            VmError::NotUserAddress => write!(f, "address is not a user address"),
            VmError::NoAddressSpace => write!(f, "no such address space"),
            VmError::AlreadyMapped => write!(f, "page is already mapped"),
            VmError::NotMapped => write!(f, "page is not mapped"),
            VmError::WriteProtected => write!(f, "write to a read-only page"),
            VmError::OutOfFrames => write!(f, "no frame could be freed"),
            VmError::NoSwapDevice => write!(f, "no swap device"),
            VmError::Swap(e) => write!(f, "{}", e),
        }
    }
}

impl Error for VmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            VmError::Swap(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SwapError> for VmError {
    fn from(e: SwapError) -> Self {
        VmError::Swap(e)
    }
}
