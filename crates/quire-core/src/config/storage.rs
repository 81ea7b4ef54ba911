use serde::{Deserialize, Serialize};

/// Configuration for the in-memory storage engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    pub database_name: String,
    pub collection_name: String,

    /// Buffered event bulks per change-stream subscriber (default: 1024)
    ///
    /// Slow subscribers that fall further behind skip the oldest bulks.
    #[serde(default = "default_change_stream_capacity")]
    pub change_stream_capacity: usize,
}

fn default_change_stream_capacity() -> usize {
    1024
}

impl MemoryStorageConfig {
    pub fn new(database_name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            collection_name: collection_name.into(),
            change_stream_capacity: default_change_stream_capacity(),
        }
    }

    pub fn with_change_stream_capacity(mut self, capacity: usize) -> Self {
        self.change_stream_capacity = capacity;
        self
    }
}
