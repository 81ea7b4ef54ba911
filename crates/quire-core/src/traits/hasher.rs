use xxhash_rust::xxh3::xxh3_128;

/// Content fingerprint used for revision hashes and attachment digests
///
/// Each storage engine picks its own strategy. The result is opaque to
/// comparison logic, it only has to be deterministic.
pub trait RevisionHasher: Send + Sync {
    fn hash(&self, input: &[u8]) -> String;
}

/// 128-bit xxh3, rendered as 32 lowercase hex characters
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3Hasher;

impl RevisionHasher for Xxh3Hasher {
    fn hash(&self, input: &[u8]) -> String {
        format!("{:032x}", xxh3_128(input))
    }
}
