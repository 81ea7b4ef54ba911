use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque progress marker for incremental change reads
///
/// Each storage engine decides what goes in here. Layered or sharded engines
/// produce partial checkpoints that are merged with [`stack_checkpoints`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(pub Map<String, Value>);

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Checkpoint {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Shallow-merge checkpoints in order; later keys override earlier ones
pub fn stack_checkpoints<'a, I>(checkpoints: I) -> Checkpoint
where
    I: IntoIterator<Item = &'a Checkpoint>,
{
    let mut stacked = Map::new();
    for checkpoint in checkpoints {
        for (key, value) in &checkpoint.0 {
            stacked.insert(key.clone(), value.clone());
        }
    }
    Checkpoint(stacked)
}
