/// What a waiter does between failed acquisition attempts of a
/// [`SleepLock`](crate::SleepLock).
///
/// The scheduler is the natural implementor: its strategy parks the current
/// thread of execution so the holder can run. This crate ships two built-in
/// strategies, [`Spin`] for environments without a scheduler (early boot)
/// and [`Yield`] for hosted builds.
pub trait Relax {
    /// Called once per failed attempt while the lock is observed held.
    fn relax();
}

/// Busy-wait strategy: a pause hint to the core, nothing more.
pub struct Spin;

impl Relax for Spin {
    #[inline]
    fn relax() {
        core::hint::spin_loop();
    }
}

/// Hosted strategy: give the rest of the time slice back to the OS.
#[cfg(any(test, doctest, feature = "std"))]
pub struct Yield;

#[cfg(any(test, doctest, feature = "std"))]
impl Relax for Yield {
    #[inline]
    fn relax() {
        std::thread::yield_now();
    }
}
