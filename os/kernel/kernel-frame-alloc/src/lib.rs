//! # Physical Page Frame Allocator
//!
//! Free-list allocation of 4 KiB page frames with two interchangeable
//! policies and an optional reference-counting layer for shared ownership:
//!
//! * [`GlobalFrameAllocator`] keeps one free list behind one spin lock.
//!   O(1) allocate and free; contention grows with core count.
//! * [`PartitionedFrameAllocator`] keeps one free list per core, each seeded
//!   with a disjoint contiguous slice of managed memory. Allocation pops
//!   from the calling core's list and falls back to stealing from the other
//!   cores, locking one victim at a time. Freeing always returns a frame to
//!   the freeing core's list, so memory pressure redistributes on its own.
//! * [`RefCounted`] layers a per-frame owner count on either policy: frames
//!   return to a free list only when their last owner releases them.
//!
//! Free lists are index-linked through a side table rather than threaded
//! through the frames themselves, so a free frame holds nothing but its
//! poison pattern. Every frame is filled on both transitions: with
//! [`FREED_PAGE_FILL`](kernel_info::memory::FREED_PAGE_FILL) on free and
//! [`FRESH_PAGE_FILL`](kernel_info::memory::FRESH_PAGE_FILL) on allocate,
//! so stale pointers read recognizable garbage instead of plausible data.
//!
//! ## Failure model
//!
//! Exhaustion is an ordinary result ([`OutOfFrames`]); the caller decides
//! what failing an allocation means. Everything else that can go wrong here
//! (freeing memory outside the managed range, releasing a frame more often
//! than it was acquired, using an allocator before its one-time `init`)
//! is treated as kernel corruption and halts with a panic.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod arena;
mod free_list;
mod global;
mod partitioned;
mod ref_counts;

pub use global::GlobalFrameAllocator;
pub use partitioned::PartitionedFrameAllocator;
pub use ref_counts::{FrameRefCounts, RefCounted};

use kernel_memory_addresses::{FrameRange, PhysicalFrame};

/// No free frame anywhere in the managed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("out of physical frames")]
pub struct OutOfFrames;

/// The allocation surface shared by both list policies.
///
/// `cpu` selects the free list the caller is working against. It is supplied
/// by the caller because core identity belongs to the scheduling layer; the
/// only requirement is that it stays fixed for the duration of each call
/// (interrupts masked, no migration mid-operation).
pub trait FramePool {
    /// Pop one frame, filled with
    /// [`FRESH_PAGE_FILL`](kernel_info::memory::FRESH_PAGE_FILL).
    ///
    /// Never blocks indefinitely and never retries internally.
    ///
    /// # Errors
    ///
    /// [`OutOfFrames`] when no free frame exists anywhere.
    fn allocate(&self, cpu: usize) -> Result<PhysicalFrame, OutOfFrames>;

    /// Poison `frame` with
    /// [`FREED_PAGE_FILL`](kernel_info::memory::FREED_PAGE_FILL) and push it
    /// onto `cpu`'s free list.
    ///
    /// The frame must currently be allocated; freeing twice corrupts the
    /// list (use [`RefCounted`] for a guarded variant).
    ///
    /// # Panics
    ///
    /// Panics if `frame` lies outside the managed range.
    fn free(&self, cpu: usize, frame: PhysicalFrame);

    /// The frame range this pool manages.
    fn managed(&self) -> FrameRange;

    /// Frames currently on free lists. Approximate while other cores are
    /// allocating.
    fn free_frames(&self) -> usize;
}
