//! In-memory storage engine for Quire
//!
//! Keeps every collection in process memory behind a single lock. Built on
//! the shared categorizer, so it honours the full bulk-write contract:
//! - Call-scoped snapshot for conflict detection
//! - Attachment payloads kept in a side table, never inside documents
//! - One change-stream event bulk per accepted bulk write
//! - Checkpoints of the form `{ "id": .., "lwt": .. }`

pub mod store;

pub use store::MemoryStorageInstance;
