pub mod database;
pub mod storage;

pub use database::{DatabaseConfig, DedupConfig};
pub use storage::MemoryStorageConfig;
