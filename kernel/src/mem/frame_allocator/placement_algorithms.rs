//! Implementation of some common frame placement policies.

use super::CoreMapEntry;

/// A placement algorithm for allocating a single user frame.
pub trait PlacementAlgorithm: Send {
    /// Returns the index of a free frame to allocate, or `None` if every frame
    /// in `core_map` is allocated.
    fn place(&mut self, core_map: &[CoreMapEntry]) -> Option<usize>;
}

#[derive(Default)]
pub struct NextFit {
    /// The next frame number to start searching for free frames.
    position: usize,
}

// No internal data. Declared as a zero-sized type.
#[derive(Default)]
pub struct FirstFit;

impl PlacementAlgorithm for NextFit {
    fn place(&mut self, core_map: &[CoreMapEntry]) -> Option<usize> {
        let total_frames = core_map.len();
        if total_frames == 0 {
            return None;
        }

        let found = (0..total_frames)
            .map(|offset| (self.position + offset) % total_frames)
            .find(|&index| !core_map[index].allocated())?;

        self.position = (found + 1) % total_frames;
        Some(found)
    }
}

impl PlacementAlgorithm for FirstFit {
    fn place(&mut self, core_map: &[CoreMapEntry]) -> Option<usize> {
        core_map.iter().position(|entry| !entry.allocated())
    }
}
