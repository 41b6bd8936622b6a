pub mod placement_algorithms;

use super::PageKey;
use alloc::{boxed::Box, collections::VecDeque, vec};
use bitbybit::bitfield;
use kidneyos_shared::mem::PAGE_FRAME_SIZE;
use placement_algorithms::PlacementAlgorithm;

/// Frame numbers are stored in the 20-bit address field of a page table entry.
pub const MAX_FRAMES: usize = 1 << 20;

#[bitfield(u8, default = 0)]
pub struct CoreMapEntry {
    #[bit(0, rw)]
    allocated: bool,
    /// Pinned frames are never chosen for eviction.
    #[bit(1, rw)]
    pinned: bool,
}

/// Index of a frame in the user frame pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameNumber(usize);

impl FrameNumber {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

/// The pool of physical frames that back user pages.
///
/// Each allocated frame remembers the page it belongs to and sits on the
/// in-use list, oldest allocation first, until it is freed.
pub struct FrameTable {
    memory: Box<[u8]>,
    core_map: Box<[CoreMapEntry]>,
    owners: Box<[Option<PageKey>]>,
    in_use: VecDeque<FrameNumber>,
    placement_algorithm: Box<dyn PlacementAlgorithm>,
    frames_allocated: usize,
}

impl FrameTable {
    pub fn new(frames: usize, placement_algorithm: Box<dyn PlacementAlgorithm>) -> Self {
        assert!(
            frames <= MAX_FRAMES,
            "{} frames do not fit in a page table entry",
            frames
        );

        FrameTable {
            memory: vec![0; frames * PAGE_FRAME_SIZE].into_boxed_slice(),
            core_map: vec![CoreMapEntry::default(); frames].into_boxed_slice(),
            owners: vec![None; frames].into_boxed_slice(),
            in_use: VecDeque::with_capacity(frames),
            placement_algorithm,
            frames_allocated: 0,
        }
    }

    /// Total number of frames in the pool.
    pub fn len(&self) -> usize {
        self.core_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core_map.is_empty()
    }

    pub fn free_frames(&self) -> usize {
        self.len() - self.frames_allocated
    }

    /// Allocates a frame for the page `owner`.
    ///
    /// The frame comes back pinned; the caller unpins it once the page's
    /// mapping is installed. Returns `None` when every frame is in use.
    pub fn alloc(&mut self, owner: PageKey) -> Option<FrameNumber> {
        if self.frames_allocated == self.len() {
            return None;
        }

        let index = self.placement_algorithm.place(&self.core_map)?;
        assert!(!self.core_map[index].allocated());

        self.core_map[index] = CoreMapEntry::default()
            .with_allocated(true)
            .with_pinned(true);
        self.owners[index] = Some(owner);
        self.frames_allocated += 1;

        let frame = FrameNumber(index);
        self.in_use.push_back(frame);
        Some(frame)
    }

    /// Detaches `frame` from its page and returns it to the pool.
    pub fn free(&mut self, frame: FrameNumber) {
        let index = frame.index();
        assert!(
            self.core_map[index].allocated(),
            "freeing unallocated frame {}",
            index
        );

        self.core_map[index] = CoreMapEntry::default();
        self.owners[index] = None;
        self.frames_allocated -= 1;

        if let Some(position) = self.in_use.iter().position(|&f| f == frame) {
            self.in_use.remove(position);
        }
    }

    pub fn is_allocated(&self, frame: FrameNumber) -> bool {
        self.core_map[frame.index()].allocated()
    }

    pub fn is_pinned(&self, frame: FrameNumber) -> bool {
        self.core_map[frame.index()].pinned()
    }

    pub fn pin(&mut self, frame: FrameNumber) {
        let entry = &mut self.core_map[frame.index()];
        debug_assert!(entry.allocated());
        *entry = entry.with_pinned(true);
    }

    pub fn unpin(&mut self, frame: FrameNumber) {
        let entry = &mut self.core_map[frame.index()];
        *entry = entry.with_pinned(false);
    }

    /// The page that `frame` currently belongs to.
    pub fn owner(&self, frame: FrameNumber) -> Option<PageKey> {
        self.owners[frame.index()]
    }

    /// Moves `frame` to the back of the in-use list.
    pub fn requeue(&mut self, frame: FrameNumber) {
        if let Some(position) = self.in_use.iter().position(|&f| f == frame) {
            self.in_use.remove(position);
            self.in_use.push_back(frame);
        }
    }

    /// Allocated frames, oldest first.
    pub fn in_use(&self) -> impl Iterator<Item = FrameNumber> + '_ {
        self.in_use.iter().copied()
    }

    /// The contents of `frame`.
    pub fn frame(&self, frame: FrameNumber) -> &[u8] {
        let start = frame.index() * PAGE_FRAME_SIZE;
        &self.memory[start..start + PAGE_FRAME_SIZE]
    }

    pub fn frame_mut(&mut self, frame: FrameNumber) -> &mut [u8] {
        let start = frame.index() * PAGE_FRAME_SIZE;
        &mut self.memory[start..start + PAGE_FRAME_SIZE]
    }
}
