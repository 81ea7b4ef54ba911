//! Bounded memory of emitted event bulk ids
//!
//! The same event bulk can reach a database twice, once from the local write
//! and once echoed back by another process. [`EventBulkDedup`] remembers ids
//! for a time window and drops repeats.
//!
//! - TTL-based expiry: ids older than `ttl_ms` are forgotten
//! - FIFO eviction: when `max_entries` is reached, the oldest id goes first

use parking_lot::Mutex;
use quire_core::DedupConfig;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

struct DedupState {
    seen: HashMap<String, Instant>,
    order: VecDeque<(String, Instant)>,
}

impl DedupState {
    /// Drop the front entry, keeping `seen` in sync
    fn pop_oldest(&mut self) {
        if let Some((id, inserted_at)) = self.order.pop_front() {
            // Only forget the id if it was not re-inserted later
            if self.seen.get(&id) == Some(&inserted_at) {
                self.seen.remove(&id);
            }
        }
    }

    fn evict_expired(&mut self, ttl: Duration, now: Instant) {
        while let Some((_, inserted_at)) = self.order.front() {
            if now.duration_since(*inserted_at) <= ttl {
                break;
            }
            self.pop_oldest();
        }
    }
}

pub struct EventBulkDedup {
    ttl: Duration,
    max_entries: usize,
    state: Mutex<DedupState>,
}

impl EventBulkDedup {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            ttl: Duration::from_millis(config.ttl_ms),
            max_entries: config.max_entries.max(1),
            state: Mutex::new(DedupState {
                seen: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Record `id`, returning `false` if it was already seen within the window
    pub fn insert(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.evict_expired(self.ttl, now);

        if state.seen.contains_key(id) {
            return false;
        }

        while state.seen.len() >= self.max_entries && !state.order.is_empty() {
            state.pop_oldest();
        }
        state.seen.insert(id.to_string(), now);
        state.order.push_back((id.to_string(), now));
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        state.evict_expired(self.ttl, Instant::now());
        state.seen.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.seen.clear();
        state.order.clear();
    }
}
