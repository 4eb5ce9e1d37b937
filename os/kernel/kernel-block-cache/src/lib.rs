//! # Sharded Block Cache
//!
//! A fixed pool of block-sized buffers caching the contents of a block
//! device, indexed by `(device, block)` identity and sharded into hash
//! buckets so cores working on unrelated blocks never contend on a lock.
//!
//! ## Locking protocol
//!
//! Two kinds of lock, always taken in the same order:
//!
//! 1. A **bucket lock** (spin) guards one bucket's resident list: which
//!    identities live in the bucket, which pool slot each maps to, and the
//!    reference counts that decide whether a slot may be evicted. Held for
//!    a few dozen instructions at most.
//! 2. A **buffer lock** (blocking) guards one slot's payload. Device I/O
//!    happens while holding it, so waiters yield the CPU instead of
//!    spinning.
//!
//! Bucket lock first, then buffer lock, never the reverse; and no bucket
//! lock is held while a buffer lock is taken. Cross-bucket eviction holds
//! two bucket locks for the few stores of a list splice, acquiring them in
//! bucket-index order.
//!
//! ## Failure model
//!
//! The pool is a build-time capacity guarantee. Finding no evictable
//! buffer anywhere is a configuration error and panics; see
//! [`BlockCache::acquire`]. Device faults also panic, inside the device
//! implementation. No operation returns an error value.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod cache;
mod device;

pub use cache::{BlockCache, BlockGuard, PinnedBlock};
pub use device::{BlockDevice, BlockId, DeviceId, MemoryDisk};

/// Byte size of one cached block, fixed across the cache and its devices.
pub use kernel_info::block::BLOCK_SIZE;
