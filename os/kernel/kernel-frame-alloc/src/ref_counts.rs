//! Per-frame owner counts and the deferred-free wrapper built on them.

use core::sync::atomic::{AtomicU32, Ordering, fence};

use kernel_memory_addresses::{FrameRange, PhysicalFrame};

use crate::{FramePool, OutOfFrames};

/// An owner count per frame index, zero meaning free.
///
/// ### Semantics
/// - [`claim`](Self::claim) moves a count from 0 to 1 when a frame leaves a
///   free list; [`share`](Self::share) adds an owner; [`release`](Self::release)
///   drops one and reports whether it was the last.
/// - Counts only move 0 -> 1 via `claim` and 1 -> 0 via `release`; any other
///   transition through zero is corruption and panics.
///
/// The table is just atomics, usable on its own wherever shared frame
/// ownership is tracked. [`RefCounted`] pairs it with a [`FramePool`] so
/// the "free when the last owner lets go" rule is applied in one place.
pub struct FrameRefCounts<const N: usize> {
    counts: [AtomicU32; N],
}

impl<const N: usize> FrameRefCounts<N> {
    /// All counts zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: [const { AtomicU32::new(0) }; N],
        }
    }

    /// Make the freshly allocated frame at `index` its first owner's.
    ///
    /// # Panics
    ///
    /// Panics if the frame already has owners.
    pub fn claim(&self, index: usize) {
        let prev = self.counts[index].swap(1, Ordering::Relaxed);
        assert!(prev == 0, "claimed a frame that already has owners");
    }

    /// Add an owner to the frame at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the frame has no owner; only an existing owner may share
    /// a frame.
    pub fn share(&self, index: usize) {
        // Only an existing owner can reach this frame, so the increment
        // needs no ordering of its own.
        let prev = self.counts[index].fetch_add(1, Ordering::Relaxed);
        assert!(prev > 0, "shared a frame with no owner");
    }

    /// Drop one owner of the frame at `index`; `true` when it was the last.
    ///
    /// # Panics
    ///
    /// Panics if the frame has no owner to drop.
    pub fn release(&self, index: usize) -> bool {
        // Release pairs with the fence below: the last owner must observe
        // every other owner's writes before the frame is poisoned and
        // reused.
        let prev = self.counts[index].fetch_sub(1, Ordering::Release);
        assert!(prev > 0, "reference count underflow");
        if prev == 1 {
            fence(Ordering::Acquire);
            return true;
        }
        false
    }

    /// Current owner count of the frame at `index`.
    #[must_use]
    pub fn owners(&self, index: usize) -> u32 {
        self.counts[index].load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for FrameRefCounts<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`FramePool`] with shared ownership: frames go back on a free list
/// only when their last owner releases them.
///
/// ```rust
/// # use kernel_frame_alloc::{FramePool, GlobalFrameAllocator, RefCounted};
/// # use kernel_memory_addresses::*;
/// # let mut buf = vec![0_u8; 3 * FRAME_SIZE];
/// # let base = PhysicalAddress::from_ptr(buf.as_mut_ptr()).align_down() + FRAME_SIZE as u64;
/// static POOL: RefCounted<GlobalFrameAllocator<2>, 2> =
///     RefCounted::new(GlobalFrameAllocator::new());
///
/// unsafe { POOL.pool().init(FrameRange::new(PhysicalFrame::containing(base), 2)) };
///
/// let frame = POOL.allocate(0).unwrap();
/// POOL.share(frame);
///
/// POOL.free(0, frame); // one owner left, frame stays allocated
/// assert_eq!(POOL.owners(frame), 1);
/// POOL.free(0, frame); // last owner, frame returns to the pool
/// assert_eq!(POOL.pool().free_frames(), 2);
/// ```
pub struct RefCounted<P, const N: usize> {
    pool: P,
    counts: FrameRefCounts<N>,
}

impl<P: FramePool, const N: usize> RefCounted<P, N> {
    /// Wrap `pool`; `N` must equal the pool's managed frame count.
    #[must_use]
    pub const fn new(pool: P) -> Self {
        Self {
            pool,
            counts: FrameRefCounts::new(),
        }
    }

    /// The wrapped pool.
    #[must_use]
    pub const fn pool(&self) -> &P {
        &self.pool
    }

    /// Allocate a frame for `cpu` with a single owner.
    ///
    /// # Errors
    ///
    /// [`OutOfFrames`] when the pool is exhausted.
    pub fn allocate(&self, cpu: usize) -> Result<PhysicalFrame, OutOfFrames> {
        let frame = self.pool.allocate(cpu)?;
        self.counts.claim(self.index_of(frame));
        Ok(frame)
    }

    /// Add an owner to an allocated frame.
    ///
    /// # Panics
    ///
    /// Panics if `frame` is outside the managed range or has no owner.
    pub fn share(&self, frame: PhysicalFrame) {
        self.counts.share(self.index_of(frame));
    }

    /// Drop one owner; the frame returns to `cpu`'s free list only when no
    /// owners remain.
    ///
    /// # Panics
    ///
    /// Panics if `frame` is outside the managed range or has no owner to
    /// drop.
    pub fn free(&self, cpu: usize, frame: PhysicalFrame) {
        if self.counts.release(self.index_of(frame)) {
            self.pool.free(cpu, frame);
        }
    }

    /// Current owner count of `frame`.
    ///
    /// # Panics
    ///
    /// Panics if `frame` is outside the managed range.
    #[must_use]
    pub fn owners(&self, frame: PhysicalFrame) -> u32 {
        self.counts.owners(self.index_of(frame))
    }

    /// The managed range, from the wrapped pool.
    #[must_use]
    pub fn managed(&self) -> FrameRange {
        self.pool.managed()
    }

    fn index_of(&self, frame: PhysicalFrame) -> usize {
        let managed = self.pool.managed();
        let Some(index) = frame.checked_index_in(managed.start()) else {
            panic!("frame {frame:?} below managed range {managed:?}");
        };
        assert!(
            index < N && index < managed.count(),
            "frame {frame:?} beyond managed range {managed:?}"
        );
        index
    }
}
