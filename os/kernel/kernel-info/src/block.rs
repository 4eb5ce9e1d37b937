//! # Block Cache Configuration

/// Bytes per disk block, the payload size of one cache buffer.
pub const BLOCK_SIZE: usize = 1024;

/// Buffer records in the cache pool. A build-time capacity guarantee;
/// running out at runtime is a configuration error, not a load condition.
pub const BLOCK_POOL_SIZE: usize = 30;

/// Hash buckets sharding the pool. Prime, so runs of consecutive block
/// numbers spread instead of piling into one bucket.
pub const BLOCK_BUCKETS: usize = 13;

/// Capacity of the in-memory backing disk, in blocks.
pub const DISK_BLOCKS: usize = 1024;

const _: () = {
    assert!(BLOCK_SIZE > 0);
    assert!(BLOCK_POOL_SIZE > 0);
    assert!(BLOCK_BUCKETS > 0);
    assert!(BLOCK_BUCKETS <= BLOCK_POOL_SIZE);
    assert!(DISK_BLOCKS > 0);
};
