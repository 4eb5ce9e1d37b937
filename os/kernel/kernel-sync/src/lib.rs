//! # Kernel synchronization primitives
//!
//! Two mutual-exclusion flavors with a strict division of labor:
//!
//! * [`SpinLock`] busy-waits with interrupts masked. For short, bounded
//!   critical sections only; nothing that blocks may run while one is held.
//! * [`SleepLock`] gives up the core between acquisition attempts via a
//!   [`Relax`] strategy. Safe to hold across long operations such as device
//!   I/O; never acquire one while a spin lock is held.
//!
//! [`InterruptGuard`] is the masking primitive the spin lock is built on, and
//! [`SyncOnceCell`] covers one-time initialization of shared state before
//! other cores start running.

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![allow(unsafe_code)]

pub mod interrupts;
mod relax;
mod sleep_lock;
mod spin_lock;
mod sync_once_cell;

pub use interrupts::InterruptGuard;
pub use relax::{Relax, Spin};
pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;

#[cfg(any(test, doctest, feature = "std"))]
pub use relax::Yield;
