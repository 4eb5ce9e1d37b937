//! Per-core frame allocation with work stealing.

use core::sync::atomic::AtomicU32;

use kernel_info::memory::{FREED_PAGE_FILL, FRESH_PAGE_FILL};
use kernel_memory_addresses::{FrameRange, PhysicalFrame};
use kernel_sync::{SpinLock, SyncOnceCell};

use crate::arena::FrameArena;
use crate::free_list::{FREE_NONE, FreeList};
use crate::{FramePool, OutOfFrames};

/// `N` frames split across `NCPU` free lists, one per core.
///
/// ### Semantics
/// - Seeding carves the managed range into `NCPU` disjoint contiguous
///   slices, one per list, so cores start out working in separate cache
///   and DRAM neighbourhoods.
/// - Allocation pops from the calling core's list first and, only when
///   that is empty, walks the other lists round-robin starting at the next
///   core, popping from the first one that has a frame.
/// - Freeing pushes onto the freeing core's list regardless of where the
///   frame was seeded. A core that frees a lot refills its own list, so
///   the partition adapts to the load instead of staying static.
///
/// ### Invariants
/// - At most one list lock is held at any point inside this type; the
///   steal walk releases each victim before probing the next. Two cores
///   stealing from each other therefore cannot deadlock.
/// - A frame index is on at most one list at a time.
///
/// The fallible surface is the same as [`GlobalFrameAllocator`]'s; the two
/// are interchangeable behind [`FramePool`].
///
/// [`GlobalFrameAllocator`]: crate::GlobalFrameAllocator
pub struct PartitionedFrameAllocator<const N: usize, const NCPU: usize> {
    arena: SyncOnceCell<FrameArena>,
    links: [AtomicU32; N],
    lists: [SpinLock<FreeList>; NCPU],
}

impl<const N: usize, const NCPU: usize> PartitionedFrameAllocator<N, NCPU> {
    /// An empty allocator; unusable until [`PartitionedFrameAllocator::init`].
    #[must_use]
    pub const fn new() -> Self {
        const {
            assert!(N > 0, "allocator must manage at least one frame");
            assert!(NCPU > 0, "allocator needs at least one core");
            assert!(N < FREE_NONE as usize, "frame index must fit a link");
        }
        Self {
            arena: SyncOnceCell::new(),
            links: [const { AtomicU32::new(FREE_NONE) }; N],
            lists: [const { SpinLock::new(FreeList::new()) }; NCPU],
        }
    }

    /// Adopts `range` as the managed memory: poisons every frame with
    /// [`FREED_PAGE_FILL`] and seeds list `cpu` with the `cpu`-th of `NCPU`
    /// contiguous slices.
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

        for (cpu, list) in self.lists.iter().enumerate() {
            let slice = range.chunk(NCPU, cpu);
            let first = arena.index_of(slice.start());
            for index in first..first + slice.count() {
                arena.fill(index, FREED_PAGE_FILL);
            }
            let mut list = list.lock();
            for index in first..first + slice.count() {
                list.push(&self.links, index);
            }
        }

        log::info!(
            "Frame allocator online: {N} frames ({} KiB) across {NCPU} per-core lists",
            range.size_bytes() / 1024
        );
    }

    /// Pop one frame for `cpu`, filled with [`FRESH_PAGE_FILL`]. Steals
    /// from the other cores' lists when `cpu`'s own list is empty.
    ///
    /// # Errors
    ///
    /// [`OutOfFrames`] when every list is empty.
    ///
    /// # Panics
    ///
    /// Panics if `cpu >= NCPU`.
    pub fn allocate(&self, cpu: usize) -> Result<PhysicalFrame, OutOfFrames> {
        assert!(cpu < NCPU, "cpu index out of range");
        let arena = self.arena_ref();
        // The local guard must drop before the steal walk starts; holding
        // two list locks at once is what the invariant above rules out.
        let local = self.lists[cpu].lock().pop(&self.links);
        let Some(index) = local.or_else(|| self.steal(cpu)) else {
            log::debug!("no free frames on any core");
            return Err(OutOfFrames);
        };
        arena.fill(index, FRESH_PAGE_FILL);
        Ok(arena.frame_at(index))
    }

    /// Poison `frame` with [`FREED_PAGE_FILL`] and push it onto `cpu`'s
    /// list.
    ///
    /// # Panics
    ///
    /// Panics if `cpu >= NCPU` or if `frame` lies outside the managed
    /// range.
    pub fn free(&self, cpu: usize, frame: PhysicalFrame) {
        assert!(cpu < NCPU, "cpu index out of range");
        let arena = self.arena_ref();
        let index = arena.index_of(frame);
        arena.fill(index, FREED_PAGE_FILL);
        self.lists[cpu].lock().push(&self.links, index);
    }

    /// Frames currently on `cpu`'s list.
    ///
    /// # Panics
    ///
    /// Panics if `cpu >= NCPU`.
    #[must_use]
    pub fn free_frames_on(&self, cpu: usize) -> usize {
        assert!(cpu < NCPU, "cpu index out of range");
        self.lists[cpu].lock().len()
    }

    /// Walk the other cores' lists, one lock at a time, and pop from the
    /// first that has a frame.
    fn steal(&self, cpu: usize) -> Option<usize> {
        for step in 1..NCPU {
            let victim = (cpu + step) % NCPU;
            if let Some(index) = self.lists[victim].lock().pop(&self.links) {
                log::trace!("cpu {cpu} stole frame {index} from cpu {victim}");
                return Some(index);
            }
        }
        None
    }

    fn arena_ref(&self) -> &FrameArena {
        let Some(arena) = self.arena.get() else {
            panic!("frame allocator used before init");
        };
        arena
    }
}

impl<const N: usize, const NCPU: usize> Default for PartitionedFrameAllocator<N, NCPU> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const NCPU: usize> FramePool for PartitionedFrameAllocator<N, NCPU> {
    fn allocate(&self, cpu: usize) -> Result<PhysicalFrame, OutOfFrames> {
        Self::allocate(self, cpu)
    }

    fn free(&self, cpu: usize, frame: PhysicalFrame) {
        Self::free(self, cpu, frame);
    }

    fn managed(&self) -> FrameRange {
        self.arena_ref().range()
    }

    fn free_frames(&self) -> usize {
        self.lists.iter().map(|list| list.lock().len()).sum()
    }
}
