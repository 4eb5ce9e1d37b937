//! Index-linked free lists over a shared link table.

use core::sync::atomic::{AtomicU32, Ordering};

/// Link value marking the end of a list. Also the resting value of a link
/// slot whose frame is currently allocated.
pub(crate) const FREE_NONE: u32 = u32::MAX;

/// A LIFO stack of frame indices, linked through a side table.
///
/// Keeping the links outside the frames means a free frame holds nothing
/// but its poison fill, and a buggy write through a stale frame pointer can
/// scribble on poison instead of on list structure.
///
/// The link table is shared between all lists of one allocator; a frame
/// index sits on at most one list at a time, and only while holding that
/// list's lock does anyone touch the index's link slot. `Relaxed` ordering
/// is enough under that regime; the lock's release/acquire pair publishes
/// the link values between cores.
pub(crate) struct FreeList {
    head: u32,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            head: FREE_NONE,
            len: 0,
        }
    }

    /// Frames currently on this list.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Push `index` onto the front.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn push(&mut self, links: &[AtomicU32], index: usize) {
        debug_assert!(index < links.len() && index < FREE_NONE as usize);
        links[index].store(self.head, Ordering::Relaxed);
        self.head = index as u32;
        self.len += 1;
    }

    /// Pop the most recently pushed index, if any.
    pub(crate) fn pop(&mut self, links: &[AtomicU32]) -> Option<usize> {
        if self.head == FREE_NONE {
            return None;
        }
        let index = self.head as usize;
        // Allocated frames keep their link slot at FREE_NONE.
        self.head = links[index].swap(FREE_NONE, Ordering::Relaxed);
        self.len -= 1;
        Some(index)
    }
}
