//! Sector-level transfer of whole pages between a frame and a swap slot.
//!
//! Sector `i` of a slot holds bytes `i * BLOCK_SECTOR_SIZE ..` of the page,
//! with no header or checksum.

use super::SwapSlot;
use crate::block::{Block, BlockError, BLOCK_SECTOR_SIZE};
use kidneyos_shared::mem::PAGE_FRAME_SIZE;

/// Write the page in `frame` to the sectors of `slot`.
pub(super) fn write_page(swap: &mut Block, slot: SwapSlot, frame: &[u8]) -> Result<(), BlockError> {
    debug_assert_eq!(frame.len(), PAGE_FRAME_SIZE);

    let first_sector = slot.first_sector();
    for (sector, buffer) in (first_sector..).zip(frame.chunks_exact(BLOCK_SECTOR_SIZE)) {
        swap.write(sector, buffer)?;
    }
    Ok(())
}

/// Read the page stored in `slot` into `frame`.
pub(super) fn read_page(swap: &mut Block, slot: SwapSlot, frame: &mut [u8]) -> Result<(), BlockError> {
    debug_assert_eq!(frame.len(), PAGE_FRAME_SIZE);

    let first_sector = slot.first_sector();
    for (sector, buffer) in (first_sector..).zip(frame.chunks_exact_mut(BLOCK_SECTOR_SIZE)) {
        swap.read(sector, buffer)?;
    }
    Ok(())
}
