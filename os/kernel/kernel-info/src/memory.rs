//! # Physical Memory Configuration

use kernel_memory_addresses::FRAME_SIZE;

/// Size of one physical page frame in bytes.
///
/// Re-exported from the address types so configuration consumers need only
/// this crate.
pub const PAGE_SIZE: usize = FRAME_SIZE;

/// Number of cores the kernel runs on, and therefore the number of
/// independent free-list partitions the page allocator maintains.
pub const CPU_COUNT: usize = 8;

/// Page frames under allocator management.
///
/// The managed span is `MANAGED_FRAMES * PAGE_SIZE` bytes starting at the
/// arena base the kernel facade reserves; the base itself is known only at
/// link/run time, which is why the range is configured as a size.
pub const MANAGED_FRAMES: usize = 4096; // 16 MiB

/// Bytes of managed physical memory.
pub const MANAGED_BYTES: usize = MANAGED_FRAMES * PAGE_SIZE;

/// Byte written across a page when it is freed, before it reaches a free
/// list. Dangling references read this instead of stale data.
pub const FREED_PAGE_FILL: u8 = 0x01;

/// Byte filling every freshly allocated page. Distinguishable from
/// [`FREED_PAGE_FILL`] so a use-after-free and a missing initialization
/// look different in the debugger.
pub const FRESH_PAGE_FILL: u8 = 0x05;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(CPU_COUNT > 0);
    assert!(MANAGED_FRAMES > 0);
    assert!(MANAGED_FRAMES.is_multiple_of(CPU_COUNT));
    assert!(FREED_PAGE_FILL != FRESH_PAGE_FILL);
};
