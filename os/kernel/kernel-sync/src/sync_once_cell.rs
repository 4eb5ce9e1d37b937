use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

/// 0 = UNINIT, 1 = INITING, 2 = READY
const UNINIT: u8 = 0;
const INITING: u8 = 1;
const READY: u8 = 2;

/// A cell initialized at most once, then shared read-only.
///
/// Pool state (buffer arrays, free lists) is constructed exactly once
/// before other cores start scheduling work; afterwards every access goes
/// through the initialized value. Losing the initialization race means
/// spinning briefly until the winner publishes.
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Whether initialization has completed.
    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Returns `Some(&T)` if already initialized.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        if self.is_initialized() {
            // SAFETY: READY guarantees the write is done.
            Some(unsafe { &*(*self.value.get()).as_ptr() })
        } else {
            None
        }
    }

    /// Initialize at most once and return `&T`.
    ///
    /// Exactly one caller runs `init`; concurrent callers wait until the
    /// value is published.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        // Fast path.
        if let Some(v) = self.get() {
            return v;
        }

        // Try to take initialization.
        if self
            .state
            .compare_exchange(UNINIT, INITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            // We are the initializer.
            let v = init();
            unsafe {
                (*self.value.get()).write(v);
            }
            // Publish the value before marking READY.
            self.state.store(READY, Ordering::Release);
            // SAFETY: just wrote it.
            return unsafe { &*(*self.value.get()).as_ptr() };
        }

        // Someone else is initializing; wait until READY.
        while self.state.load(Ordering::Acquire) != READY {
            spin_loop();
        }
        // SAFETY: READY
        unsafe { &*(*self.value.get()).as_ptr() }
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // SAFETY: READY means the value was written and never taken out.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

// Safety: shared after READY; initialization is single-writer.
unsafe impl<T: Sync> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}
