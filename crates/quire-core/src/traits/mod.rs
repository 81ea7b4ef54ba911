pub mod clock;
pub mod hasher;
pub mod storage;

pub use clock::{Clock, MonotonicClock};
pub use hasher::{RevisionHasher, Xxh3Hasher};
pub use storage::StorageInstance;
