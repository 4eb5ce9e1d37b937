//! The managed slab of physical memory, addressed by frame index.

use kernel_memory_addresses::{FRAME_SIZE, FrameRange, PhysicalFrame};

/// Maps between [`PhysicalFrame`]s and indices into the managed range, and
/// writes fill patterns into frames.
///
/// Construction carries the whole unsafety of the allocator stack: after
/// [`FrameArena::new`], fills are plain method calls because the contract
/// established there makes every frame in the range writable.
pub(crate) struct FrameArena {
    range: FrameRange,
}

impl FrameArena {
    /// # Safety
    ///
    /// Every frame in `range` must be mapped at its physical address, valid
    /// for reads and writes, and owned exclusively by the allocator built on
    /// top of this arena, for as long as the arena lives.
    pub(crate) const unsafe fn new(range: FrameRange) -> Self {
        Self { range }
    }

    pub(crate) const fn range(&self) -> FrameRange {
        self.range
    }

    pub(crate) const fn count(&self) -> usize {
        self.range.count()
    }

    /// The index of `frame` within the managed range.
    ///
    /// # Panics
    ///
    /// Panics if `frame` lies outside the range. A foreign frame on a free
    /// list would later be handed out as if the allocator owned it, so this
    /// is treated as corruption, not as an error to report.
    pub(crate) fn index_of(&self, frame: PhysicalFrame) -> usize {
        let Some(index) = frame.checked_index_in(self.range.start()) else {
            panic!("frame {frame:?} below managed range {:?}", self.range);
        };
        assert!(
            index < self.range.count(),
            "frame {frame:?} beyond managed range {:?}",
            self.range
        );
        index
    }

    /// The frame at `index`. Inverse of [`FrameArena::index_of`].
    pub(crate) fn frame_at(&self, index: usize) -> PhysicalFrame {
        debug_assert!(index < self.range.count());
        self.range.start().add_frames(index)
    }

    /// Fills the whole frame at `index` with `value`.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn fill(&self, index: usize, value: u8) {
        assert!(index < self.range.count());
        let base = self.range.start().base().as_u64() as usize as *mut u8;
        // Safety: the constructor's contract covers the range and the assert
        // keeps the write inside it.
        unsafe {
            core::ptr::write_bytes(base.add(index * FRAME_SIZE), value, FRAME_SIZE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    fn arena_at(base: u64, frames: usize) -> FrameArena {
        let start = PhysicalFrame::containing(PhysicalAddress::new(base));
        // Safety: index math only; no test here dereferences the range.
        unsafe { FrameArena::new(FrameRange::new(start, frames)) }
    }

    #[test]
    fn index_round_trips() {
        let arena = arena_at(0x10_0000, 8);
        for i in 0..8 {
            assert_eq!(arena.index_of(arena.frame_at(i)), i);
        }
    }

    #[test]
    #[should_panic(expected = "below managed range")]
    fn frame_below_range_is_fatal() {
        let arena = arena_at(0x10_0000, 8);
        let low = PhysicalFrame::containing(PhysicalAddress::new(0x0F_0000));
        let _ = arena.index_of(low);
    }

    #[test]
    #[should_panic(expected = "beyond managed range")]
    fn frame_beyond_range_is_fatal() {
        let arena = arena_at(0x10_0000, 8);
        let high = arena.range().end();
        let _ = arena.index_of(high);
    }

    #[test]
    fn fill_writes_the_whole_frame() {
        let frames = 4;
        let layout = std::alloc::Layout::from_size_align(frames * FRAME_SIZE, FRAME_SIZE)
            .expect("valid layout");
        let buf = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!buf.is_null());

        let start = PhysicalFrame::new(PhysicalAddress::from_ptr(buf)).expect("aligned");
        let arena = unsafe { FrameArena::new(FrameRange::new(start, frames)) };

        arena.fill(2, 0xAB);
        let bytes = unsafe { std::slice::from_raw_parts(buf, frames * FRAME_SIZE) };
        assert!(bytes[2 * FRAME_SIZE..3 * FRAME_SIZE].iter().all(|&b| b == 0xAB));
        // neighbours untouched
        assert!(bytes[..2 * FRAME_SIZE].iter().all(|&b| b == 0));
        assert!(bytes[3 * FRAME_SIZE..].iter().all(|&b| b == 0));

        unsafe { std::alloc::dealloc(buf, layout) };
    }
}
