//! # Physical Memory Address Types
//!
//! Strongly typed wrappers for the raw addresses handled by the physical
//! page allocator and the buffer cache's backing storage.
//!
//! ## Overview
//!
//! This crate defines a minimal set of types that keep raw integers, page
//! frames, and frame ranges apart at compile time while remaining zero-cost
//! wrappers around `u64` values:
//!
//! | Type | Description |
//! |----------|-------------|
//! | [`PhysicalAddress`] | A raw 64-bit physical address. |
//! | [`PhysicalFrame`] | A frame-aligned base address of one 4 KiB frame. |
//! | [`FrameRange`] | A contiguous half-open run of frames. |
//!
//! The allocator only ever hands out and takes back [`PhysicalFrame`]s, so
//! alignment is checked once at the type boundary instead of on every
//! operation. [`FrameRange`] describes managed memory and carves it into
//! the per-core slices the partitioned allocator is seeded with.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let base = PhysicalAddress::new(0x8000_0000);
//! let range = FrameRange::new(PhysicalFrame::containing(base), 16);
//!
//! // Four disjoint slices of four frames each.
//! let third = range.chunk(4, 3);
//! assert_eq!(third.count(), 4);
//! assert_eq!(third.start().base().as_u64(), 0x8000_C000);
//!
//! // Frames iterate in ascending address order.
//! let first = range.into_iter().next().unwrap();
//! assert_eq!(first.base(), base);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` (or plain pairs of them) and
//!   implement `Copy`, `Eq`, `Ord`, and `Hash`.
//! - All arithmetic is `const fn` and zero-cost in release builds.
//! - Frame size is fixed at 4 KiB; this layer manages a single size class.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

use core::fmt;
use core::ops::{Add, AddAssign};
use core::ptr::NonNull;

/// Size of one physical page frame in bytes.
pub const FRAME_SIZE: usize = 4096;

/// log2([`FRAME_SIZE`]), the number of low offset bits in an address.
pub const FRAME_SHIFT: u32 = 12;

const _: () = {
    assert!(FRAME_SIZE.is_power_of_two());
    assert!(1_usize << FRAME_SHIFT == FRAME_SIZE);
};

/// Raw physical memory address.
///
/// Carries no alignment guarantee; it marks intent ("this is physical, not
/// a host pointer or an index") at the type level.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn from_nonnull<T>(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr.as_ptr())
    }

    #[inline]
    #[must_use]
    pub const fn from_ptr<T>(ptr: *const T) -> Self {
        const _: () = assert!(
            size_of::<*const ()>() == size_of::<u64>(),
            "pointer size mismatch"
        );

        // using a union to const-time convert a pointer to an u64
        union Ptr<T> {
            ptr: *const T,
            raw: u64,
        }

        let ptr = Ptr { ptr };
        Self::new(unsafe { ptr.raw })
    }

    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether the low [`FRAME_SHIFT`] bits are zero.
    #[inline]
    #[must_use]
    pub const fn is_frame_aligned(self) -> bool {
        self.0 & (FRAME_SIZE as u64 - 1) == 0
    }

    /// Align down to the containing frame boundary.
    #[inline]
    #[must_use]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !(FRAME_SIZE as u64 - 1))
    }

    /// The offset within the containing frame (`0..FRAME_SIZE`).
    #[inline]
    #[must_use]
    pub const fn frame_offset(self) -> u64 {
        self.0 & (FRAME_SIZE as u64 - 1)
    }

    /// Byte distance to `base`; `None` if `self < base`.
    #[inline]
    #[must_use]
    pub const fn checked_offset_from(self, base: Self) -> Option<u64> {
        self.0.checked_sub(base.0)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(a: PhysicalAddress) -> Self {
        a.as_u64()
    }
}

/// Frame-aligned base address of one physical page frame.
///
/// ### Semantics
/// - [`PhysicalFrame::new`] accepts only aligned addresses; this is the one
///   place alignment is checked, everything downstream trusts the type.
/// - [`PhysicalFrame::containing`] aligns down instead, for callers holding
///   an address somewhere inside a frame.
///
/// ### Invariants
/// - The low [`FRAME_SHIFT`] bits of the base are always zero.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// assert!(PhysicalFrame::new(PhysicalAddress::new(0x8000_1000)).is_some());
/// assert!(PhysicalFrame::new(PhysicalAddress::new(0x8000_1001)).is_none());
///
/// let frame = PhysicalFrame::containing(PhysicalAddress::new(0x8000_1234));
/// assert_eq!(frame.base().as_u64(), 0x8000_1000);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalFrame(PhysicalAddress);

impl PhysicalFrame {
    /// Create from an address that must be frame aligned.
    #[inline]
    #[must_use]
    pub const fn new(addr: PhysicalAddress) -> Option<Self> {
        if addr.is_frame_aligned() {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// The frame that contains `addr` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(addr: PhysicalAddress) -> Self {
        Self(addr.align_down())
    }

    /// Base address of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        self.0
    }

    /// The `n`-th frame after this one.
    #[inline]
    #[must_use]
    pub const fn add_frames(self, n: usize) -> Self {
        Self(PhysicalAddress::new(
            self.0.as_u64() + (n as u64) * FRAME_SIZE as u64,
        ))
    }

    /// Frame index relative to `base`; `None` if below `base` or if `base`
    /// and `self` are not a whole number of frames apart.
    #[inline]
    #[must_use]
    pub const fn checked_index_in(self, base: Self) -> Option<usize> {
        match self.0.checked_offset_from(base.0) {
            Some(bytes) if bytes % FRAME_SIZE as u64 == 0 => {
                Some((bytes >> FRAME_SHIFT) as usize)
            }
            _ => None,
        }
    }
}

impl fmt::Debug for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(0x{:016X})", self.0.as_u64())
    }
}

impl fmt::Display for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<PhysicalFrame> for PhysicalAddress {
    #[inline]
    fn from(frame: PhysicalFrame) -> Self {
        frame.base()
    }
}

/// A half-open, contiguous run of physical frames.
///
/// ### Semantics
/// - Iterating yields frames in ascending address order.
/// - [`FrameRange::chunk`] carves the range into `parts` disjoint contiguous
///   slices covering it completely; slice `parts - 1` absorbs the remainder.
///   This is how per-core free lists receive their seed memory.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let start = PhysicalFrame::containing(PhysicalAddress::new(0x1_0000));
/// let range = FrameRange::new(start, 10);
///
/// assert_eq!(range.chunk(4, 0).count(), 2);
/// assert_eq!(range.chunk(4, 3).count(), 4); // remainder lives here
/// assert!(range.contains(start.add_frames(9)));
/// assert!(!range.contains(start.add_frames(10)));
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FrameRange {
    start: PhysicalFrame,
    count: usize,
}

impl FrameRange {
    #[inline]
    #[must_use]
    pub const fn new(start: PhysicalFrame, count: usize) -> Self {
        Self { start, count }
    }

    #[inline]
    #[must_use]
    pub const fn start(self) -> PhysicalFrame {
        self.start
    }

    /// First frame past the end of the range.
    #[inline]
    #[must_use]
    pub const fn end(self) -> PhysicalFrame {
        self.start.add_frames(self.count)
    }

    #[inline]
    #[must_use]
    pub const fn count(self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.count == 0
    }

    #[inline]
    #[must_use]
    pub const fn size_bytes(self) -> usize {
        self.count * FRAME_SIZE
    }

    #[inline]
    #[must_use]
    pub const fn contains(self, frame: PhysicalFrame) -> bool {
        let base = self.start.base().as_u64();
        let addr = frame.base().as_u64();
        addr >= base && addr < base + self.size_bytes() as u64
    }

    /// The `which`-th of `parts` disjoint contiguous slices of this range.
    ///
    /// Slices are even-sized except the last, which absorbs the division
    /// remainder. Together they cover the range exactly.
    ///
    /// # Panics
    ///
    /// Panics if `parts == 0` or `which >= parts`.
    #[inline]
    #[must_use]
    pub const fn chunk(self, parts: usize, which: usize) -> Self {
        assert!(parts > 0, "cannot split a range into zero parts");
        assert!(which < parts, "chunk index out of bounds");
        let per = self.count / parts;
        let start = self.start.add_frames(per * which);
        let count = if which == parts - 1 {
            self.count - per * which
        } else {
            per
        };
        Self { start, count }
    }
}

impl fmt::Debug for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FrameRange(0x{:016X}..0x{:016X})",
            self.start.base().as_u64(),
            self.end().base().as_u64()
        )
    }
}

impl IntoIterator for FrameRange {
    type Item = PhysicalFrame;
    type IntoIter = FrameRangeIter;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        FrameRangeIter {
            next: self.start,
            remaining: self.count,
        }
    }
}

/// Iterator over the frames of a [`FrameRange`], in ascending order.
pub struct FrameRangeIter {
    next: PhysicalFrame,
    remaining: usize,
}

impl Iterator for FrameRangeIter {
    type Item = PhysicalFrame;

    #[inline]
    fn next(&mut self) -> Option<PhysicalFrame> {
        if self.remaining == 0 {
            return None;
        }
        let frame = self.next;
        self.next = frame.add_frames(1);
        self.remaining -= 1;
        Some(frame)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for FrameRangeIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        let a = PhysicalAddress::new(0x12345);
        assert!(!a.is_frame_aligned());
        assert_eq!(a.align_down().as_u64(), 0x12000);
        assert_eq!(a.frame_offset(), 0x345);
        assert!(a.align_down().is_frame_aligned());
    }

    #[test]
    fn pointer_constructors_agree() {
        let mut value = 0_u64;
        let by_ptr = PhysicalAddress::from_ptr(&raw const value);
        let by_nonnull = PhysicalAddress::from_nonnull(NonNull::from(&mut value));
        assert_eq!(by_nonnull, by_ptr);
        assert_ne!(by_ptr.as_u64(), 0);
    }

    #[test]
    fn frame_construction_checks_alignment() {
        assert!(PhysicalFrame::new(PhysicalAddress::new(0x4000)).is_some());
        assert!(PhysicalFrame::new(PhysicalAddress::new(0x4001)).is_none());
        let f = PhysicalFrame::containing(PhysicalAddress::new(0x4FFF));
        assert_eq!(f.base().as_u64(), 0x4000);
    }

    #[test]
    fn frame_indexing_round_trips() {
        let base = PhysicalFrame::containing(PhysicalAddress::new(0x10_0000));
        for i in [0_usize, 1, 7, 513] {
            let f = base.add_frames(i);
            assert_eq!(f.checked_index_in(base), Some(i));
        }
        // below the base
        assert_eq!(base.checked_index_in(base.add_frames(1)), None);
    }

    #[test]
    fn range_contains_and_ends() {
        let start = PhysicalFrame::containing(PhysicalAddress::new(0x8000_0000));
        let r = FrameRange::new(start, 4);
        assert_eq!(r.size_bytes(), 4 * FRAME_SIZE);
        assert!(r.contains(start));
        assert!(r.contains(start.add_frames(3)));
        assert!(!r.contains(start.add_frames(4)));
        assert_eq!(r.end().base().as_u64(), 0x8000_4000);
    }

    #[test]
    fn range_iterates_ascending() {
        let start = PhysicalFrame::containing(PhysicalAddress::new(0x2000));
        let r = FrameRange::new(start, 3);
        let frames: Vec<_> = r.into_iter().collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].base().as_u64(), 0x2000);
        assert_eq!(frames[1].base().as_u64(), 0x3000);
        assert_eq!(frames[2].base().as_u64(), 0x4000);
    }

    #[test]
    fn chunks_are_disjoint_and_cover() {
        let start = PhysicalFrame::containing(PhysicalAddress::new(0));
        let r = FrameRange::new(start, 10);

        let total: usize = (0..4).map(|i| r.chunk(4, i).count()).sum();
        assert_eq!(total, 10);

        // even parts first, remainder in the last
        assert_eq!(r.chunk(4, 0).count(), 2);
        assert_eq!(r.chunk(4, 1).count(), 2);
        assert_eq!(r.chunk(4, 2).count(), 2);
        assert_eq!(r.chunk(4, 3).count(), 4);

        // back-to-back
        for i in 0..3 {
            assert_eq!(r.chunk(4, i).end(), r.chunk(4, i + 1).start());
        }

        // exact division
        let r = FrameRange::new(start, 20);
        for i in 0..4 {
            assert_eq!(r.chunk(4, i).count(), 5);
        }
    }
}
