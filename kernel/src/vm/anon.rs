//! Anonymous pages: user pages with no backing file, whose only copy while
//! evicted lives in a swap slot.

use super::SwapError;
use crate::mem::{FrameNumber, FrameTable, PageTableOps, Pid};
use crate::swapping::{SwapSlot, SwapTable};

/// What an anonymous page was created for.
///
/// Both kinds swap identically; the kind only records whether the page came
/// from stack growth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnonKind {
    Ordinary,
    Stack,
}

/// Where the contents of an anonymous page currently live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnonState {
    Resident(FrameNumber),
    SwappedOut(SwapSlot),
}

/// Descriptor of one anonymous page.
///
/// The page always holds exactly one resource: the frame it is resident in,
/// or the swap slot holding its contents.
#[derive(Debug)]
pub struct AnonPage {
    owner: Pid,
    va: usize,
    writable: bool,
    kind: AnonKind,
    state: AnonState,
}

impl AnonPage {
    /// A new page of `owner` at `va`, resident in the freshly allocated
    /// `frame`.
    pub fn new(owner: Pid, va: usize, writable: bool, kind: AnonKind, frame: FrameNumber) -> Self {
        AnonPage {
            owner,
            va: kidneyos_shared::mem::page_round_down(va),
            writable,
            kind,
            state: AnonState::Resident(frame),
        }
    }

    pub fn owner(&self) -> Pid {
        self.owner
    }

    pub fn va(&self) -> usize {
        self.va
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn kind(&self) -> AnonKind {
        self.kind
    }

    pub fn state(&self) -> AnonState {
        self.state
    }

    pub fn frame(&self) -> Option<FrameNumber> {
        match self.state {
            AnonState::Resident(frame) => Some(frame),
            AnonState::SwappedOut(_) => None,
        }
    }

    pub fn slot(&self) -> Option<SwapSlot> {
        match self.state {
            AnonState::Resident(_) => None,
            AnonState::SwappedOut(slot) => Some(slot),
        }
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.state, AnonState::Resident(_))
    }

    /// Reads the page back from swap into `frame`, which the caller has
    /// already allocated, and frees its slot.
    ///
    /// On error nothing changes: the page stays swapped out in the same slot.
    pub fn swap_in(
        &mut self,
        swap: &SwapTable,
        frames: &mut FrameTable,
        frame: FrameNumber,
    ) -> Result<(), SwapError> {
        let AnonState::SwappedOut(slot) = self.state else {
            return Err(SwapError::NotSwappedOut);
        };

        swap.read_page(slot, frames.frame_mut(frame))?;
        swap.release(slot);
        self.state = AnonState::Resident(frame);
        Ok(())
    }

    /// Writes the page to a fresh swap slot, invalidates its translation and
    /// returns its frame to `frames`.
    ///
    /// The translation is cleared only once the write has completed, and the
    /// frame is freed only after that. Running out of swap slots is fatal.
    pub fn swap_out<P: PageTableOps + ?Sized>(
        &mut self,
        swap: &SwapTable,
        frames: &mut FrameTable,
        tables: &mut P,
    ) -> Result<SwapSlot, SwapError> {
        let AnonState::Resident(frame) = self.state else {
            return Err(SwapError::NotResident);
        };

        let slot = swap.reserve();
        if let Err(e) = swap.write_page(slot, frames.frame(frame)) {
            swap.release(slot);
            return Err(e.into());
        }
        self.state = AnonState::SwappedOut(slot);

        tables.clear_page(self.owner, self.va);
        tables.set_dirty(self.owner, self.va, false);
        frames.free(frame);
        Ok(slot)
    }

    /// Releases whichever resource the page holds. The caller has already
    /// removed its translation.
    pub fn destroy(self, swap: &SwapTable, frames: &mut FrameTable) {
        match self.state {
            AnonState::Resident(frame) => frames.free(frame),
            AnonState::SwappedOut(slot) => swap.release(slot),
        }
    }
}
