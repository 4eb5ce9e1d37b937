//! # Kernel resource layer
//!
//! Wires the component crates together over statically reserved storage: a
//! RAM-backed boot disk under the shared buffer cache, and a frame-aligned
//! arena under the refcounted per-core page allocator. This crate is the only
//! owner of backing memory; the component crates borrow it.
//!
//! [`init`] seeds exactly once no matter how many cores reach it, and a call
//! returns only with the layer ready. Everything afterwards goes through the
//! free functions here, which delegate to the static singletons.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

use kernel_block_cache::BlockCache;
use kernel_frame_alloc::{FramePool, PartitionedFrameAllocator, RefCounted};
use kernel_info::block::{BLOCK_BUCKETS, BLOCK_POOL_SIZE, DISK_BLOCKS};
use kernel_info::memory::{CPU_COUNT, MANAGED_BYTES, MANAGED_FRAMES};
use kernel_memory_addresses::{FrameRange, PhysicalAddress};
use kernel_sync::SyncOnceCell;

pub use kernel_block_cache::{BLOCK_SIZE, BlockGuard, BlockId, DeviceId, MemoryDisk, PinnedBlock};
pub use kernel_frame_alloc::OutOfFrames;
pub use kernel_info::memory::PAGE_SIZE;
pub use kernel_memory_addresses::PhysicalFrame;

/// Device number of the RAM-backed boot disk.
pub const BOOT_DISK: DeviceId = DeviceId::new(0);

/// Guard over one cached disk block; write-through via
/// [`commit`](BlockGuard::commit), residency via [`pin`](BlockGuard::pin).
pub type CachedBlock =
    BlockGuard<'static, &'static MemoryDisk<DISK_BLOCKS>, BLOCK_POOL_SIZE, BLOCK_BUCKETS>;

/// Frame-aligned backing storage for the managed page range.
#[repr(align(4096))]
struct FrameArenaStorage([u8; MANAGED_BYTES]);

/// Managed physical memory, placed in a dedicated `.bss` section. Only ever
/// addressed through raw pointers; the allocator owns its contents from
/// [`init`] onwards.
#[unsafe(link_section = ".bss.frames")]
static mut FRAME_ARENA: FrameArenaStorage = FrameArenaStorage([0; MANAGED_BYTES]);

/// The boot disk backing the block layer.
static RAMDISK: MemoryDisk<DISK_BLOCKS> = MemoryDisk::new(BOOT_DISK);

/// The shared buffer cache over [`RAMDISK`].
static BLOCK_CACHE: BlockCache<&MemoryDisk<DISK_BLOCKS>, BLOCK_POOL_SIZE, BLOCK_BUCKETS> =
    BlockCache::new(&RAMDISK);

/// Refcounted per-core page allocator over [`FRAME_ARENA`].
static PAGES: RefCounted<PartitionedFrameAllocator<MANAGED_FRAMES, CPU_COUNT>, MANAGED_FRAMES> =
    RefCounted::new(PartitionedFrameAllocator::new());

/// One-time initialization cell; late callers wait until seeding finished.
static INIT: SyncOnceCell<()> = SyncOnceCell::new();

/// Brings the resource layer online: seeds the cache's bucket lists and the
/// per-core page free lists, then logs the geometry.
///
/// Idempotent and safe to call from several cores at once: exactly one
/// caller seeds, the rest wait, and every call returns with the layer ready
/// for use.
pub fn init() {
    INIT.get_or_init(|| {
        BLOCK_CACHE.init();

        // SAFETY: only the address is taken; the arena is never referenced
        // directly and the allocator is the sole owner of its contents.
        let base = PhysicalAddress::from_ptr(unsafe { &raw const FRAME_ARENA.0 }.cast::<u8>());
        let Some(start) = PhysicalFrame::new(base) else {
            panic!("frame arena storage is not frame aligned");
        };
        // SAFETY: the arena is statically reserved for the allocator alone
        // and stays mapped at this address for the lifetime of the kernel.
        unsafe {
            PAGES.pool().init(FrameRange::new(start, MANAGED_FRAMES));
        }

        log::info!(
            "Resource layer online: {MANAGED_FRAMES} pages on {CPU_COUNT} cores, \
             {BLOCK_POOL_SIZE} buffers over a {DISK_BLOCKS}-block boot disk"
        );
    });
}

/// Returns a locked, filled buffer for `block` on `device`.
///
/// Blocks while another holder has the same buffer locked. Dirty bytes reach
/// the disk only through [`commit`](BlockGuard::commit).
///
/// # Panics
///
/// Panics when called before [`init`], when `device` is not the boot disk,
/// when `block` lies beyond the disk, or when every buffer in the pool is
/// referenced.
pub fn read_block(device: DeviceId, block: BlockId) -> CachedBlock {
    BLOCK_CACHE.acquire(device, block)
}

/// Redeems a pin taken via [`pin`](BlockGuard::pin), making the buffer
/// eligible for reuse again once unreferenced.
pub fn unpin_block(pin: PinnedBlock) {
    BLOCK_CACHE.unpin(pin);
}

/// Hands out an exclusively owned page, junk-filled, preferring `cpu`'s
/// free list.
///
/// # Errors
///
/// [`OutOfFrames`] when every per-core list is empty.
pub fn allocate_page(cpu: usize) -> Result<PhysicalFrame, OutOfFrames> {
    PAGES.allocate(cpu)
}

/// Records one more owner of `page`.
///
/// # Panics
///
/// Panics when `page` is outside the managed range or currently has no
/// owner at all.
pub fn share_page(page: PhysicalFrame) {
    PAGES.share(page);
}

/// Releases one ownership of `page`. The last release poisons the page and
/// returns it to `cpu`'s free list.
///
/// # Panics
///
/// Panics when `page` is outside the managed range or has no outstanding
/// owners.
pub fn free_page(cpu: usize, page: PhysicalFrame) {
    PAGES.free(cpu, page);
}

/// Pages currently sitting on free lists, summed across cores.
#[must_use]
pub fn free_frames() -> usize {
    PAGES.pool().free_frames()
}
