use serde::{Deserialize, Serialize};

/// Bounds of the seen-event-bulk set kept by a database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// How long an emitted bulk id is remembered in milliseconds (default: 60000)
    #[serde(default = "default_dedup_ttl")]
    pub ttl_ms: u64,

    /// Maximum number of remembered ids (default: 10,000)
    ///
    /// When full, the oldest id is forgotten first.
    #[serde(default = "default_dedup_max_entries")]
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_dedup_ttl(),
            max_entries: default_dedup_max_entries(),
        }
    }
}

impl DedupConfig {
    pub fn new(ttl_ms: u64, max_entries: usize) -> Self {
        Self {
            ttl_ms,
            max_entries,
        }
    }
}

fn default_dedup_ttl() -> u64 {
    60_000
}

fn default_dedup_max_entries() -> usize {
    10_000
}

/// Configuration for a database handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database name, part of every event key
    pub name: String,

    /// Run the expensive write-path consistency checks (default: false)
    ///
    /// Verifies primary keys, revision heights and `_meta` key retention on
    /// every row before it reaches the engine.
    #[serde(default)]
    pub dev_mode: bool,

    /// Run-queue acquisition timeout in milliseconds (default: 5000)
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    #[serde(default)]
    pub event_bulk_dedup: DedupConfig,

    /// Buffered event bulks per subscriber of the database stream (default: 1024)
    #[serde(default = "default_event_bulk_capacity")]
    pub event_bulk_capacity: usize,
}

fn default_lock_timeout() -> u64 {
    5000
}

fn default_event_bulk_capacity() -> usize {
    1024
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dev_mode: false,
            lock_timeout_ms: default_lock_timeout(),
            event_bulk_dedup: DedupConfig::default(),
            event_bulk_capacity: default_event_bulk_capacity(),
        }
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// Set run-queue acquisition timeout in milliseconds
    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    pub fn with_event_bulk_dedup(mut self, dedup: DedupConfig) -> Self {
        self.event_bulk_dedup = dedup;
        self
    }

    pub fn with_event_bulk_capacity(mut self, capacity: usize) -> Self {
        self.event_bulk_capacity = capacity;
        self
    }

    /// Reject values the database cannot run with
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.name.is_empty() {
            return Err(crate::error::QuireError::Config(
                "database name must not be empty".into(),
            ));
        }
        if self.event_bulk_capacity == 0 {
            return Err(crate::error::QuireError::Config(
                "event_bulk_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: DatabaseConfig = serde_json::from_str(r#"{ "name": "app" }"#).unwrap();
        assert_eq!(config.name, "app");
        assert!(!config.dev_mode);
        assert_eq!(config.lock_timeout_ms, 5000);
        assert_eq!(config.event_bulk_dedup.ttl_ms, 60_000);
        assert_eq!(config.event_bulk_dedup.max_entries, 10_000);
        assert_eq!(config.event_bulk_capacity, 1024);
    }

    #[test]
    fn test_validate() {
        assert!(DatabaseConfig::new("app").validate().is_ok());
        assert!(DatabaseConfig::new("").validate().is_err());
        assert!(DatabaseConfig::new("app")
            .with_event_bulk_capacity(0)
            .validate()
            .is_err());
    }
}
