//! Victim selection for eviction.

use crate::mem::{AddressSpaceTable, FrameNumber, FrameTable};

pub trait PageReplacementPolicy: Send {
    /// Picks an allocated, unpinned frame to evict, or `None` if every
    /// allocated frame is pinned.
    ///
    /// The policy may update reference bits in `tables` along the way.
    fn evict_page(&mut self, frames: &FrameTable, tables: &mut AddressSpaceTable) -> Option<FrameNumber>;
}

/// Evicts the frame that has been allocated the longest.
#[derive(Default)]
pub struct Fifo;

impl PageReplacementPolicy for Fifo {
    fn evict_page(&mut self, frames: &FrameTable, _tables: &mut AddressSpaceTable) -> Option<FrameNumber> {
        frames.in_use().find(|&frame| !frames.is_pinned(frame))
    }
}

/// Second-chance replacement over the frame pool.
///
/// The hand sweeps frames in index order. A frame whose page was accessed
/// since the last sweep has its accessed bit cleared and is passed over once.
#[derive(Default)]
pub struct Clock {
    hand: usize,
}

impl PageReplacementPolicy for Clock {
    fn evict_page(&mut self, frames: &FrameTable, tables: &mut AddressSpaceTable) -> Option<FrameNumber> {
        let len = frames.len();
        if len == 0 {
            return None;
        }

        // Two full sweeps: the first may only clear accessed bits.
        for _ in 0..2 * len {
            let frame = FrameNumber::new(self.hand % len);
            self.hand = (self.hand + 1) % len;

            if !frames.is_allocated(frame) || frames.is_pinned(frame) {
                continue;
            }

            let Some(key) = frames.owner(frame) else {
                return Some(frame);
            };
            match tables.get_mut(key.owner) {
                Some(directory) if directory.is_accessed(key.va) => {
                    directory.set_accessed(key.va, false);
                }
                _ => return Some(frame),
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::frame_allocator::placement_algorithms::FirstFit;
    use crate::mem::PageKey;
    use alloc::boxed::Box;

    /// A pool of `n` frames, each mapped at `0x1000 * (i + 1)` in pid 1 and
    /// unpinned.
    fn mapped_frames(n: usize) -> (FrameTable, AddressSpaceTable) {
        let mut frames = FrameTable::new(n, Box::new(FirstFit));
        let mut tables = AddressSpaceTable::new();
        assert!(tables.create(1));

        for i in 0..n {
            let va = 0x1000 * (i + 1);
            let frame = frames.alloc(PageKey::new(1, va)).unwrap();
            assert!(tables.get_mut(1).unwrap().map(va, frame, true));
            frames.unpin(frame);
        }
        (frames, tables)
    }

    #[test]
    fn fifo_skips_pinned() {
        let (mut frames, mut tables) = mapped_frames(3);
        let mut fifo = Fifo;

        assert_eq!(fifo.evict_page(&frames, &mut tables), Some(FrameNumber::new(0)));

        frames.pin(FrameNumber::new(0));
        assert_eq!(fifo.evict_page(&frames, &mut tables), Some(FrameNumber::new(1)));

        frames.requeue(FrameNumber::new(1));
        assert_eq!(fifo.evict_page(&frames, &mut tables), Some(FrameNumber::new(2)));
    }

    #[test]
    fn clock_gives_second_chance() {
        let (frames, mut tables) = mapped_frames(3);
        let directory = tables.get_mut(1).unwrap();
        directory.set_accessed(0x1000, true);
        directory.set_accessed(0x2000, true);

        let mut clock = Clock::default();
        assert_eq!(clock.evict_page(&frames, &mut tables), Some(FrameNumber::new(2)));

        // The first sweep cleared both accessed bits.
        let directory = tables.get(1).unwrap();
        assert!(!directory.is_accessed(0x1000));
        assert!(!directory.is_accessed(0x2000));

        assert_eq!(clock.evict_page(&frames, &mut tables), Some(FrameNumber::new(0)));
    }

    #[test]
    fn clock_wraps_when_everything_is_accessed() {
        let (frames, mut tables) = mapped_frames(2);
        for va in [0x1000, 0x2000] {
            tables.get_mut(1).unwrap().set_accessed(va, true);
        }

        let mut clock = Clock::default();
        assert_eq!(clock.evict_page(&frames, &mut tables), Some(FrameNumber::new(0)));
    }

    #[test]
    fn all_pinned_yields_nothing() {
        let (mut frames, mut tables) = mapped_frames(2);
        frames.pin(FrameNumber::new(0));
        frames.pin(FrameNumber::new(1));

        assert_eq!(Fifo.evict_page(&frames, &mut tables), None);
        assert_eq!(Clock::default().evict_page(&frames, &mut tables), None);
    }

    #[test]
    fn empty_pool() {
        let mut frames = FrameTable::new(0, Box::new(FirstFit));
        let mut tables = AddressSpaceTable::new();
        assert!(frames.alloc(PageKey::new(1, 0)).is_none());
        assert_eq!(Clock::default().evict_page(&frames, &mut tables), None);
    }
}
