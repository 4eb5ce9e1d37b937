//! The device side of the cache: identities and the transfer contract.

use core::sync::atomic::{AtomicUsize, Ordering};

use kernel_info::block::BLOCK_SIZE;
use kernel_sync::SpinLock;

/// Identifies one block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u32);

impl DeviceId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Identifies one block on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Synchronous block transfer.
///
/// The cache calls [`read_block`](Self::read_block) exactly when a buffer
/// holds no valid copy of its block, and [`write_block`](Self::write_block)
/// exactly when a caller commits one. Both complete before returning.
///
/// Addressing errors (unknown device, block out of range) are bugs in the
/// caller, not runtime conditions; implementations panic on them rather
/// than report them.
pub trait BlockDevice {
    /// Read `block` of `device` into `buf`.
    fn read_block(&self, device: DeviceId, block: BlockId, buf: &mut [u8; BLOCK_SIZE]);

    /// Write `buf` to `block` of `device`.
    fn write_block(&self, device: DeviceId, block: BlockId, buf: &[u8; BLOCK_SIZE]);
}

impl<D: BlockDevice> BlockDevice for &D {
    fn read_block(&self, device: DeviceId, block: BlockId, buf: &mut [u8; BLOCK_SIZE]) {
        (**self).read_block(device, block, buf);
    }

    fn write_block(&self, device: DeviceId, block: BlockId, buf: &[u8; BLOCK_SIZE]) {
        (**self).write_block(device, block, buf);
    }
}

/// A RAM-backed block device of `NB` blocks.
///
/// Serves as the backing store during bring-up and in tests. Transfers are
/// counted so callers can observe which operations actually reached the
/// device and which were absorbed by the cache.
pub struct MemoryDisk<const NB: usize> {
    device: DeviceId,
    blocks: SpinLock<[[u8; BLOCK_SIZE]; NB]>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl<const NB: usize> MemoryDisk<NB> {
    /// A zero-filled disk answering to `device`.
    #[must_use]
    pub const fn new(device: DeviceId) -> Self {
        Self {
            device,
            blocks: SpinLock::new([[0; BLOCK_SIZE]; NB]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// The device this disk answers to.
    #[inline]
    #[must_use]
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    /// Completed read transfers so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Completed write transfers so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn index(&self, device: DeviceId, block: BlockId) -> usize {
        assert!(
            device == self.device,
            "request for {device:?} reached {:?}",
            self.device
        );
        let index = block.get() as usize;
        assert!(index < NB, "{block:?} out of range for {NB}-block disk");
        index
    }
}

impl<const NB: usize> BlockDevice for MemoryDisk<NB> {
    fn read_block(&self, device: DeviceId, block: BlockId, buf: &mut [u8; BLOCK_SIZE]) {
        let index = self.index(device, block);
        buf.copy_from_slice(&self.blocks.lock()[index]);
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn write_block(&self, device: DeviceId, block: BlockId, buf: &[u8; BLOCK_SIZE]) {
        let index = self.index(device, block);
        self.blocks.lock()[index].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}
