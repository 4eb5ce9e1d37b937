use kernel_frame_alloc::{
    FramePool, GlobalFrameAllocator, OutOfFrames, PartitionedFrameAllocator, RefCounted,
};
use kernel_info::memory::{FREED_PAGE_FILL, FRESH_PAGE_FILL};
use kernel_memory_addresses::{FRAME_SIZE, FrameRange, PhysicalAddress, PhysicalFrame};
use std::alloc::{self, Layout};

/// A frame-aligned slab of host memory standing in for physical RAM.
struct TestArena {
    buf: *mut u8,
    layout: Layout,
    range: FrameRange,
}

impl TestArena {
    fn new(frames: usize) -> Self {
        let layout =
            Layout::from_size_align(frames * FRAME_SIZE, FRAME_SIZE).expect("valid layout");
        let buf = unsafe { alloc::alloc_zeroed(layout) };
        assert!(!buf.is_null());
        let start =
            PhysicalFrame::new(PhysicalAddress::from_ptr(buf)).expect("allocation is aligned");
        Self {
            buf,
            layout,
            range: FrameRange::new(start, frames),
        }
    }

    fn range(&self) -> FrameRange {
        self.range
    }

    /// Raw view of one frame; only for phases where no other thread is
    /// allocating.
    fn bytes(&self, frame: PhysicalFrame) -> &[u8] {
        let index = frame
            .checked_index_in(self.range.start())
            .expect("frame in arena");
        unsafe { std::slice::from_raw_parts(self.buf.add(index * FRAME_SIZE), FRAME_SIZE) }
    }
}

impl Drop for TestArena {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.buf, self.layout) };
    }
}

#[test]
fn global_pool_serves_every_frame_once() {
    let arena = TestArena::new(10);
    let pool = GlobalFrameAllocator::<10>::new();
    unsafe { pool.init(arena.range()) };
    assert_eq!(pool.free_frames(), 10);

    let mut held: Vec<PhysicalFrame> = Vec::new();
    for _ in 0..10 {
        let frame = pool.allocate().unwrap();
        assert!(arena.range().contains(frame));
        assert!(!held.contains(&frame), "frame handed out twice");
        held.push(frame);
    }

    // the eleventh request fails recoverably
    assert_eq!(pool.allocate(), Err(OutOfFrames));

    // freeing one frame makes exactly one allocation possible again
    let frame = held.pop().unwrap();
    pool.free(frame);
    assert_eq!(pool.allocate(), Ok(frame)); // most recently freed comes back first
    assert_eq!(pool.allocate(), Err(OutOfFrames));
}

#[test]
fn frames_are_junk_filled_on_allocation_and_poisoned_on_free() {
    let arena = TestArena::new(4);
    let pool = GlobalFrameAllocator::<4>::new();
    unsafe { pool.init(arena.range()) };

    // seeding already poisons
    for frame in arena.range() {
        assert!(arena.bytes(frame).iter().all(|&b| b == FREED_PAGE_FILL));
    }

    let frame = pool.allocate().unwrap();
    assert!(arena.bytes(frame).iter().all(|&b| b == FRESH_PAGE_FILL));

    pool.free(frame);
    // the whole page is poison again, no list pointer bytes anywhere
    assert!(arena.bytes(frame).iter().all(|&b| b == FREED_PAGE_FILL));
}

#[test]
#[should_panic(expected = "below managed range")]
fn freeing_below_the_managed_range_is_fatal() {
    let arena = TestArena::new(2);
    let pool = GlobalFrameAllocator::<2>::new();
    unsafe { pool.init(arena.range()) };

    let low = PhysicalFrame::containing(PhysicalAddress::new(
        arena.range().start().base().as_u64() - FRAME_SIZE as u64,
    ));
    pool.free(low);
}

#[test]
#[should_panic(expected = "beyond managed range")]
fn freeing_beyond_the_managed_range_is_fatal() {
    let arena = TestArena::new(2);
    let pool = GlobalFrameAllocator::<2>::new();
    unsafe { pool.init(arena.range()) };

    pool.free(arena.range().end());
}

#[test]
#[should_panic(expected = "used before init")]
fn allocation_before_init_is_fatal() {
    let pool = GlobalFrameAllocator::<2>::new();
    let _ = pool.allocate();
}

#[test]
#[should_panic(expected = "already initialized")]
fn initializing_twice_is_fatal() {
    let arena = TestArena::new(2);
    let pool = GlobalFrameAllocator::<2>::new();
    unsafe { pool.init(arena.range()) };
    unsafe { pool.init(arena.range()) };
}

#[test]
fn partitioned_seeding_is_disjoint_and_contiguous() {
    let arena = TestArena::new(20);
    let pool = PartitionedFrameAllocator::<20, 4>::new();
    unsafe { pool.init(arena.range()) };

    for cpu in 0..4 {
        assert_eq!(pool.free_frames_on(cpu), 5);
    }

    // each core allocates out of its own slice while it lasts
    for cpu in 0..4 {
        let slice = arena.range().chunk(4, cpu);
        for _ in 0..5 {
            let frame = pool.allocate(cpu).unwrap();
            assert!(slice.contains(frame));
        }
    }
    assert_eq!(pool.allocate(0), Err(OutOfFrames));
}

#[test]
fn an_empty_core_steals_from_its_neighbour() {
    let arena = TestArena::new(20);
    let pool = PartitionedFrameAllocator::<20, 4>::new();
    unsafe { pool.init(arena.range()) };

    // drain core 0's own slice
    for _ in 0..5 {
        let frame = pool.allocate(0).unwrap();
        assert!(arena.range().chunk(4, 0).contains(frame));
    }
    assert_eq!(pool.free_frames_on(0), 0);

    // the sixth allocation succeeds by stealing from the next core over
    let stolen = pool.allocate(0).unwrap();
    assert!(arena.range().chunk(4, 1).contains(stolen));
    assert_eq!(pool.free_frames_on(1), 4);
}

#[test]
fn frees_land_on_the_freeing_cores_list() {
    let arena = TestArena::new(20);
    let pool = PartitionedFrameAllocator::<20, 4>::new();
    unsafe { pool.init(arena.range()) };

    let frame = pool.allocate(0).unwrap();
    pool.free(3, frame);
    assert_eq!(pool.free_frames_on(0), 4);
    assert_eq!(pool.free_frames_on(3), 6);

    // and it is the first frame core 3 hands out next
    assert_eq!(pool.allocate(3), Ok(frame));
}

#[test]
fn concurrent_churn_conserves_every_frame() {
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};

    const FRAMES: usize = 64;
    const CORES: usize = 4;
    let iters = 2_000;

    let arena = TestArena::new(FRAMES);
    let pool = Arc::new(PartitionedFrameAllocator::<FRAMES, CORES>::new());
    unsafe { pool.init(arena.range()) };

    let start = Arc::new(Barrier::new(CORES));
    let mut handles = Vec::with_capacity(CORES);
    for cpu in 0..CORES {
        let pool = Arc::clone(&pool);
        let start = Arc::clone(&start);
        handles.push(std::thread::spawn(move || {
            let mut held = Vec::new();
            let mut rng = 0x9E37_79B9_u32.wrapping_add(cpu as u32);
            start.wait();
            for _ in 0..iters {
                rng = rng.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                if rng & 1 == 0 && !held.is_empty() {
                    let victim = (rng >> 8) as usize % held.len();
                    pool.free(cpu, held.swap_remove(victim));
                } else if let Ok(frame) = pool.allocate(cpu) {
                    held.push(frame);
                }
            }
            for frame in held {
                pool.free(cpu, frame);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // every frame came back; none was lost or duplicated
    assert_eq!(pool.free_frames(), FRAMES);
    let mut seen = HashSet::new();
    for _ in 0..FRAMES {
        let frame = pool.allocate(0).unwrap();
        assert!(arena.range().contains(frame));
        assert!(seen.insert(frame.base().as_u64()), "duplicate frame");
    }
    assert_eq!(pool.allocate(0), Err(OutOfFrames));
}

#[test]
fn shared_frames_return_only_after_the_last_release() {
    let arena = TestArena::new(4);
    let pool: RefCounted<GlobalFrameAllocator<4>, 4> =
        RefCounted::new(GlobalFrameAllocator::new());
    unsafe { pool.pool().init(arena.range()) };

    let frame = pool.allocate(0).unwrap();
    pool.share(frame);
    pool.share(frame);
    assert_eq!(pool.owners(frame), 3);

    pool.free(0, frame);
    pool.free(0, frame);
    // two releases later the frame is still allocated and untouched
    assert_eq!(pool.pool().free_frames(), 3);
    assert!(arena.bytes(frame).iter().all(|&b| b == FRESH_PAGE_FILL));

    pool.free(0, frame);
    assert_eq!(pool.pool().free_frames(), 4);
    assert!(arena.bytes(frame).iter().all(|&b| b == FREED_PAGE_FILL));
}

#[test]
#[should_panic(expected = "reference count underflow")]
fn releasing_more_owners_than_exist_is_fatal() {
    let arena = TestArena::new(2);
    let pool: RefCounted<GlobalFrameAllocator<2>, 2> =
        RefCounted::new(GlobalFrameAllocator::new());
    unsafe { pool.pool().init(arena.range()) };

    let frame = pool.allocate(0).unwrap();
    pool.free(0, frame);
    pool.free(0, frame); // no owners left
}

#[test]
fn concurrent_sharers_never_free_early() {
    use std::sync::{Arc, Barrier};

    let threads = 6;
    let iters = 4_000;

    let arena = TestArena::new(2);
    let pool = Arc::new(RefCounted::<GlobalFrameAllocator<2>, 2>::new(
        GlobalFrameAllocator::new(),
    ));
    unsafe { pool.pool().init(arena.range()) };

    let frame = pool.allocate(0).unwrap();
    // hand each thread one owner up front, then drop our own
    for _ in 0..threads {
        pool.share(frame);
    }
    pool.free(0, frame);

    let start = Arc::new(Barrier::new(threads));
    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let pool = Arc::clone(&pool);
        let start = Arc::clone(&start);
        handles.push(std::thread::spawn(move || {
            start.wait();
            for _ in 0..iters {
                pool.share(frame);
                pool.free(0, frame);
            }
            pool.free(0, frame); // the owner handed to this thread
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // the frame was freed exactly once, by whoever released last
    assert_eq!(pool.owners(frame), 0);
    assert_eq!(pool.pool().free_frames(), 2);
}
