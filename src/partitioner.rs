//! Routing of items to partitions.
//!
//! Every occurrence of an item must land in the same partition for the
//! lifetime of a run; per-partition top-N pruning is only sound because no
//! item is ever split across partitions.

/// Deterministic item → partition routing.
pub trait Partitioner: Send + Sync {
    /// Number of partitions items are routed into.
    fn partitions(&self) -> usize;

    /// Partition id in `[0, partitions())` for `item`.
    fn partition(&self, item: &str) -> usize;
}

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over `bytes`.
#[must_use]
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |h, &b| {
        (h ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// FNV-1a hash of `item` masked to 31 bits, so it is always non-negative
/// when read as a signed integer.
#[must_use]
pub fn hash_item(item: &str) -> u32 {
    fnv1a_32(item.as_bytes()) & 0x7fff_ffff
}

/// The default partitioner: `hash_item(item) mod n_reduce`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashPartitioner {
    n_reduce: usize,
}

impl HashPartitioner {
    /// # Panics
    /// Panics if `n_reduce == 0`.
    #[must_use]
    pub fn new(n_reduce: usize) -> Self {
        assert!(n_reduce > 0, "n_reduce must be at least 1");
        Self { n_reduce }
    }
}

impl Partitioner for HashPartitioner {
    fn partitions(&self) -> usize {
        self.n_reduce
    }

    #[inline]
    fn partition(&self, item: &str) -> usize {
        hash_item(item) as usize % self.n_reduce
    }
}
