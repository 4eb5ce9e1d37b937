//! Single-list frame allocation behind one lock.

use core::sync::atomic::AtomicU32;

use kernel_info::memory::{FREED_PAGE_FILL, FRESH_PAGE_FILL};
use kernel_memory_addresses::{FrameRange, PhysicalFrame};
use kernel_sync::{SpinLock, SyncOnceCell};

use crate::arena::FrameArena;
use crate::free_list::{FREE_NONE, FreeList};
use crate::{FramePool, OutOfFrames};

/// One free list of `N` frames, shared by every core.
///
/// ### Semantics
/// - Allocation pops the most recently freed frame and fills it with
///   [`FRESH_PAGE_FILL`]; freeing fills with [`FREED_PAGE_FILL`] and pushes.
///   Both fills happen outside the lock, on a frame no other core can
///   reach, so the critical section is a handful of word writes.
/// - The type is `const`-constructible so it can live in a `static`;
///   [`GlobalFrameAllocator::init`] hands it its memory once at boot.
///
/// ### Example
/// ```rust
/// # use kernel_frame_alloc::GlobalFrameAllocator;
/// # use kernel_memory_addresses::*;
/// # let mut buf = vec![0_u8; 5 * FRAME_SIZE];
/// # let base = PhysicalAddress::from_ptr(buf.as_mut_ptr()).align_down() + FRAME_SIZE as u64;
/// static POOL: GlobalFrameAllocator<4> = GlobalFrameAllocator::new();
///
/// let range = FrameRange::new(PhysicalFrame::containing(base), 4);
/// unsafe { POOL.init(range) };
///
/// let frame = POOL.allocate().unwrap();
/// assert!(range.contains(frame));
/// POOL.free(frame);
/// ```
pub struct GlobalFrameAllocator<const N: usize> {
    arena: SyncOnceCell<FrameArena>,
    links: [AtomicU32; N],
    free: SpinLock<FreeList>,
}

impl<const N: usize> GlobalFrameAllocator<N> {
    /// An empty allocator; unusable until [`GlobalFrameAllocator::init`].
    #[must_use]
    pub const fn new() -> Self {
        const {
            assert!(N > 0, "allocator must manage at least one frame");
            assert!(N < FREE_NONE as usize, "frame index must fit a link");
        }
        Self {
            arena: SyncOnceCell::new(),
            links: [const { AtomicU32::new(FREE_NONE) }; N],
            free: SpinLock::new(FreeList::new()),
        }
    }

    /// Adopts `range` as the managed memory and puts every frame, poisoned
    /// with [`FREED_PAGE_FILL`], on the free list.
    ///
    /// # Safety
    ///
    /// Every frame in `range` must be mapped at its physical address, valid
    /// for reads and writes, and reserved for this allocator alone from now
    /// on.
    ///
    /// # Panics
    ///
    /// Panics if `range` does not hold exactly `N` frames or if the
    /// allocator was already initialized.
    pub unsafe fn init(&self, range: FrameRange) {
        assert!(range.count() == N, "seed range must hold exactly N frames");
        assert!(
            !self.arena.is_initialized(),
            "frame allocator already initialized"
        );

        // Safety: forwarded from the caller.
        let arena = self.arena.get_or_init(|| unsafe { FrameArena::new(range) });

        for index in 0..N {
            arena.fill(index, FREED_PAGE_FILL);
        }
        let mut free = self.free.lock();
        for index in 0..N {
            free.push(&self.links, index);
        }
        drop(free);

        log::info!(
            "Frame allocator online: {N} frames ({} KiB) on one list",
            range.size_bytes() / 1024
        );
    }

    /// Pop one frame, filled with [`FRESH_PAGE_FILL`].
    ///
    /// # Errors
    ///
    /// [`OutOfFrames`] when the list is empty.
    pub fn allocate(&self) -> Result<PhysicalFrame, OutOfFrames> {
        let arena = self.arena_ref();
        let Some(index) = self.free.lock().pop(&self.links) else {
            log::debug!("frame pool exhausted");
            return Err(OutOfFrames);
        };
        arena.fill(index, FRESH_PAGE_FILL);
        Ok(arena.frame_at(index))
    }

    /// Poison `frame` with [`FREED_PAGE_FILL`] and return it to the list.
    ///
    /// # Panics
    ///
    /// Panics if `frame` lies outside the managed range.
    pub fn free(&self, frame: PhysicalFrame) {
        let arena = self.arena_ref();
        let index = arena.index_of(frame);
        arena.fill(index, FREED_PAGE_FILL);
        self.free.lock().push(&self.links, index);
    }

    fn arena_ref(&self) -> &FrameArena {
        let Some(arena) = self.arena.get() else {
            panic!("frame allocator used before init");
        };
        arena
    }
}

impl<const N: usize> Default for GlobalFrameAllocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FramePool for GlobalFrameAllocator<N> {
    fn allocate(&self, _cpu: usize) -> Result<PhysicalFrame, OutOfFrames> {
        self.allocate()
    }

    fn free(&self, _cpu: usize, frame: PhysicalFrame) {
        Self::free(self, frame);
    }

    fn managed(&self) -> FrameRange {
        self.arena_ref().range()
    }

    fn free_frames(&self) -> usize {
        self.free.lock().len()
    }
}
