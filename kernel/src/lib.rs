//! Virtual memory for KidneyOS user processes: the frame pool, per-process
//! page tables, and anonymous pages that are swapped to a block device under
//! memory pressure.

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

pub mod block;
pub mod config;
pub mod drivers;
pub mod mem;
pub mod swapping;
pub mod sync;
pub mod vm;

pub use config::VmConfig;
pub use vm::{PageFault, Vm, VmError};
