//! The buffer pool, its bucket index, and the acquire protocol.

use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use arrayvec::ArrayVec;
use kernel_info::block::BLOCK_SIZE;
use kernel_sync::{Relax, SleepLock, SleepLockGuard, Spin, SpinLock};

use crate::device::{BlockDevice, BlockId, DeviceId};

/// One pool slot.
struct BlockSlot<R> {
    /// Outstanding references: live guards plus explicit pins. The slot's
    /// identity may change only while this is zero, under the lock of the
    /// bucket the slot currently resides in.
    refs: AtomicU32,
    /// Whether the payload holds its identity's bytes. Cleared under the
    /// bucket lock on identity change, set under the payload lock after a
    /// fill; every reader sits downstream of one of those locks.
    valid: AtomicBool,
    data: SleepLock<[u8; BLOCK_SIZE], R>,
}

impl<R> BlockSlot<R> {
    const fn new() -> Self {
        Self {
            refs: AtomicU32::new(0),
            valid: AtomicBool::new(false),
            data: SleepLock::new([0; BLOCK_SIZE]),
        }
    }
}

/// A bucket's record of one resident slot. `None` identities exist only
/// between seeding and a slot's first use.
#[derive(Clone, Copy)]
struct Resident {
    key: Option<(DeviceId, BlockId)>,
    slot: usize,
}

type Bucket<const N: usize> = ArrayVec<Resident, N>;

/// A pool of `N` block buffers over device `D`, indexed through `B`
/// bucket lists.
///
/// ### Semantics
/// - [`acquire`](Self::acquire) returns the unique buffer for an identity,
///   locked and holding valid bytes; concurrent acquirers of one identity
///   serialize on the buffer, never on the pool.
/// - Buffers are recycled, not destroyed. A buffer whose references reach
///   zero keeps identity and content and stays a cheap hit until some
///   acquisition repurposes it.
/// - List order is recency: reused and relocated buffers enter at their
///   bucket's head, and eviction scans take the first unreferenced buffer
///   they meet front to back.
///
/// ### Locking
/// Bucket spin locks index the pool; per-buffer blocking locks own the
/// payloads (see the crate docs for the full protocol). The only moment
/// two bucket locks are held is the cross-bucket splice in the eviction
/// path, taken in bucket-index order.
pub struct BlockCache<D, const N: usize, const B: usize, R = Spin> {
    device: D,
    slots: [BlockSlot<R>; N],
    buckets: [SpinLock<Bucket<N>>; B],
    seeded: AtomicBool,
}

impl<D, const N: usize, const B: usize, R> BlockCache<D, N, B, R> {
    /// An empty cache over `device`; unusable until [`BlockCache::init`].
    #[must_use]
    pub const fn new(device: D) -> Self {
        const {
            assert!(N > 0, "cache needs at least one buffer");
            assert!(B > 0, "cache needs at least one bucket");
        }
        Self {
            device,
            slots: [const { BlockSlot::new() }; N],
            buckets: [const { SpinLock::new(ArrayVec::new_const()) }; B],
            seeded: AtomicBool::new(false),
        }
    }

    /// Scatter the `N` slots round-robin across the buckets, identityless.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn init(&self) {
        assert!(
            !self.seeded.swap(true, Ordering::AcqRel),
            "block cache already initialized"
        );
        for slot in 0..N {
            self.buckets[slot % B].lock().push(Resident { key: None, slot });
        }
        log::info!("Block cache online: {N} buffers in {B} buckets");
    }

    /// The bucket an identity hashes to.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn home_bucket(device: DeviceId, block: BlockId) -> usize {
        (device.get() as u64 * 31 + block.get() as u64) as usize % B
    }

    /// Residents currently listed in `bucket`. Diagnostic; the answer can
    /// be stale by the time it returns.
    ///
    /// # Panics
    ///
    /// Panics when `bucket` is not below `B`.
    #[must_use]
    pub fn bucket_len(&self, bucket: usize) -> usize {
        self.buckets[bucket].lock().len()
    }

    /// Release a pin taken with [`BlockGuard::pin`].
    ///
    /// # Panics
    ///
    /// Panics on reference count underflow.
    pub fn unpin(&self, pin: PinnedBlock) {
        let prev = self.slots[pin.slot].refs.fetch_sub(1, Ordering::Release);
        assert!(prev > 0, "reference count underflow");
    }

    fn find(bucket: &Bucket<N>, device: DeviceId, block: BlockId) -> Option<usize> {
        bucket
            .iter()
            .find(|entry| entry.key == Some((device, block)))
            .map(|entry| entry.slot)
    }
}

impl<D: BlockDevice, const N: usize, const B: usize, R: Relax> BlockCache<D, N, B, R> {
    /// The buffer holding `block` of `device`, locked and valid.
    ///
    /// Blocks while another holder owns the buffer and, on a cold buffer,
    /// for the backing read. Never blocks while holding a bucket lock.
    ///
    /// # Panics
    ///
    /// Panics when the identity is absent and every buffer in the pool is
    /// referenced; a correctly sized pool never reaches this. Also panics
    /// if the cache was not initialized.
    pub fn acquire(&self, device: DeviceId, block: BlockId) -> BlockGuard<'_, D, N, B, R> {
        assert!(
            self.seeded.load(Ordering::Acquire),
            "block cache used before init"
        );
        let home = Self::home_bucket(device, block);

        let mut bucket = self.buckets[home].lock();
        let mut free = None;
        let mut hit = None;
        for (position, entry) in bucket.iter().enumerate() {
            if entry.key == Some((device, block)) {
                hit = Some(entry.slot);
                break;
            }
            if free.is_none() && self.slots[entry.slot].refs.load(Ordering::Relaxed) == 0 {
                free = Some(position);
            }
        }

        if let Some(slot) = hit {
            self.slots[slot].refs.fetch_add(1, Ordering::Relaxed);
            drop(bucket);
            return self.lock_filled(device, block, slot);
        }
        if let Some(position) = free {
            let slot = self.claim(&mut bucket, position, device, block);
            drop(bucket);
            return self.lock_filled(device, block, slot);
        }
        drop(bucket);

        self.evict_into(home, device, block)
    }

    /// Walk the other buckets for an unreferenced slot and splice it into
    /// `home` under the new identity.
    fn evict_into(
        &self,
        home: usize,
        device: DeviceId,
        block: BlockId,
    ) -> BlockGuard<'_, D, N, B, R> {
        for step in 1..B {
            let victim = (home + step) % B;

            // Probe with a single lock held; most buckets have nothing
            // for us.
            let promising = self
                .buckets[victim]
                .lock()
                .iter()
                .any(|entry| self.slots[entry.slot].refs.load(Ordering::Relaxed) == 0);
            if !promising {
                continue;
            }

            // Take both locks in index order, then re-check everything:
            // the world may have moved while no lock was held. The guards
            // drop in reverse acquisition order.
            let (low, high) = if home < victim {
                (home, victim)
            } else {
                (victim, home)
            };
            let mut first = self.buckets[low].lock();
            let mut second = self.buckets[high].lock();
            let (home_list, victim_list) = if home == low {
                (&mut *first, &mut *second)
            } else {
                (&mut *second, &mut *first)
            };

            // Another core may have cached this very identity meanwhile.
            if let Some(slot) = Self::find(home_list, device, block) {
                self.slots[slot].refs.fetch_add(1, Ordering::Relaxed);
                drop(second);
                drop(first);
                return self.lock_filled(device, block, slot);
            }

            let candidate = victim_list
                .iter()
                .position(|entry| self.slots[entry.slot].refs.load(Ordering::Relaxed) == 0);
            let Some(position) = candidate else {
                // The probe's candidate was taken; keep walking.
                continue;
            };

            let mut entry = victim_list.remove(position);
            let slot = entry.slot;
            entry.key = Some((device, block));
            home_list.insert(0, entry);
            self.slots[slot].refs.store(1, Ordering::Relaxed);
            self.slots[slot].valid.store(false, Ordering::Relaxed);
            drop(second);
            drop(first);

            log::trace!("{device:?} {block:?} took an idle buffer from bucket {victim}");
            return self.lock_filled(device, block, slot);
        }
        panic!("block cache exhausted: all {N} buffers referenced");
    }

    /// Under the home bucket lock, repurpose the entry at `position` for a
    /// new identity and move it to the bucket head. The slot must be
    /// unreferenced.
    fn claim(
        &self,
        bucket: &mut Bucket<N>,
        position: usize,
        device: DeviceId,
        block: BlockId,
    ) -> usize {
        let mut entry = bucket.remove(position);
        let slot = entry.slot;
        entry.key = Some((device, block));
        bucket.insert(0, entry);
        self.slots[slot].refs.store(1, Ordering::Relaxed);
        self.slots[slot].valid.store(false, Ordering::Relaxed);
        slot
    }

    /// Block until the slot's payload lock is held, filling the payload
    /// from the device if it is not valid.
    fn lock_filled(
        &self,
        device: DeviceId,
        block: BlockId,
        slot: usize,
    ) -> BlockGuard<'_, D, N, B, R> {
        let mut data = self.slots[slot].data.lock();
        if !self.slots[slot].valid.load(Ordering::Relaxed) {
            self.device.read_block(device, block, &mut data);
            self.slots[slot].valid.store(true, Ordering::Relaxed);
        }
        BlockGuard {
            cache: self,
            slot,
            device,
            block,
            data,
        }
    }
}

/// Exclusive, validated access to one cached block.
///
/// Dereferences to the block's bytes. Dropping the guard surrenders the
/// reference and then releases the payload lock; the buffer keeps identity
/// and content and remains a cheap hit until the pool repurposes it.
pub struct BlockGuard<'a, D, const N: usize, const B: usize, R: Relax = Spin> {
    cache: &'a BlockCache<D, N, B, R>,
    slot: usize,
    device: DeviceId,
    block: BlockId,
    data: SleepLockGuard<'a, [u8; BLOCK_SIZE], R>,
}

impl<D: BlockDevice, const N: usize, const B: usize, R: Relax> BlockGuard<'_, D, N, B, R> {
    /// The device this buffer caches a block of.
    #[must_use]
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    /// The block this buffer holds.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Synchronously write the payload back to the device.
    pub fn commit(&self) {
        self.cache
            .device
            .write_block(self.device, self.block, &self.data);
    }

    /// Raise the reference count past this guard's lifetime, keeping the
    /// buffer resident. The payload lock is not part of the pin.
    #[must_use = "an unredeemed pin keeps its buffer resident forever"]
    pub fn pin(&self) -> PinnedBlock {
        // A reference is already held through this guard, so a plain
        // increment cannot race an eviction.
        self.cache.slots[self.slot].refs.fetch_add(1, Ordering::Relaxed);
        PinnedBlock {
            slot: self.slot,
            device: self.device,
            block: self.block,
        }
    }
}

impl<D, const N: usize, const B: usize, R: Relax> Deref for BlockGuard<'_, D, N, B, R> {
    type Target = [u8; BLOCK_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<D, const N: usize, const B: usize, R: Relax> DerefMut for BlockGuard<'_, D, N, B, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<D, const N: usize, const B: usize, R: Relax> Drop for BlockGuard<'_, D, N, B, R> {
    fn drop(&mut self) {
        // The reference goes first; the payload lock in `data` releases
        // right after, when the fields drop.
        let prev = self.cache.slots[self.slot].refs.fetch_sub(1, Ordering::Release);
        assert!(prev > 0, "reference count underflow");
    }
}

/// Proof that a buffer's reference count was raised beyond its guard.
///
/// Redeem at the owning cache with [`BlockCache::unpin`]. Dropping the
/// token instead leaves the buffer resident forever.
#[derive(Debug)]
pub struct PinnedBlock {
    slot: usize,
    device: DeviceId,
    block: BlockId,
}

impl PinnedBlock {
    /// The device of the pinned block.
    #[must_use]
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    /// The pinned block.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }
}
