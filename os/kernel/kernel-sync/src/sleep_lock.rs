use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::relax::{Relax, Spin};

/// Blocking mutual exclusion, safe to hold across long operations.
///
/// A waiter does not monopolize its core: between attempts it invokes
/// `R::relax()`, which in a running kernel yields to the scheduler. Device
/// I/O is performed while holding this lock, which is exactly why it must
/// never be acquired while a [`SpinLock`](crate::SpinLock) is held and why
/// it leaves interrupts alone.
///
/// ### Semantics
///
/// * `lock` returns only once the caller holds the lock exclusively.
/// * The guard releases on drop; a waiter observes the release on its next
///   attempt and proceeds.
/// * No cancellation, no timeout. A blocked acquisition completes once the
///   holder makes progress.
pub struct SleepLock<T, R = Spin> {
    /// lock state
    /// * `false`: unlocked
    /// * `true`: locked
    locked: AtomicBool,
    inner: UnsafeCell<T>,
    _relax: PhantomData<R>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send, R> Sync for SleepLock<T, R> {}

impl<T, R> SleepLock<T, R> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
            _relax: PhantomData,
        }
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T, R: Relax> SleepLock<T, R> {
    /// Try once; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T, R>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SleepLockGuard { lock: self })
        } else {
            None
        }
    }

    /// Block until the lock is held exclusively.
    pub fn lock(&self) -> SleepLockGuard<'_, T, R> {
        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                R::relax();
            }
        }
        SleepLockGuard { lock: self }
    }
}

pub struct SleepLockGuard<'a, T, R: Relax = Spin> {
    lock: &'a SleepLock<T, R>,
}

impl<T, R: Relax> Deref for SleepLockGuard<'_, T, R> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T, R: Relax> DerefMut for SleepLockGuard<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T, R: Relax> Drop for SleepLockGuard<'_, T, R> {
    fn drop(&mut self) {
        // Release publishes the critical section; waiters see it on their
        // next attempt.
        self.lock.locked.store(false, Ordering::Release);
    }
}
