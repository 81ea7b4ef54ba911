//! Database handle
//!
//! Owns what every wrapped storage instance of one database shares: the
//! run-queue, the hook chain, the write clock and the stream of emitted
//! event bulks.

use crate::dedup::EventBulkDedup;
use crate::hooks::HookChain;
use crate::wrapper::WrappedStorageInstance;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use quire_core::{
    broadcast_stream, observe, random_token, Clock, DatabaseConfig, EventBulk, MonotonicClock,
    QuireError, Result, RunQueue, StorageInstance,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const TOKEN_LENGTH: usize = 10;

/// An open Quire database
///
/// # Example
///
/// ```no_run
/// use quire::prelude::*;
/// use std::sync::Arc;
///
/// # async fn demo() -> Result<()> {
/// let db = Database::open(DatabaseConfig::new("app"), HookChain::new())?;
/// let raw = MemoryStorageInstance::open(
///     MemoryStorageConfig::new("app", "people"),
///     CollectionSchema::new("id"),
/// )?;
/// let people = db.wrap_storage_instance(Arc::new(raw));
/// let _forwarder = db.forward_changes(&people);
/// # Ok(())
/// # }
/// ```
pub struct Database {
    config: DatabaseConfig,
    token: String,
    run_queue: RunQueue,
    hooks: HookChain,
    dedup: EventBulkDedup,
    event_bulks: Mutex<Option<broadcast::Sender<EventBulk>>>,
    clock: MonotonicClock,
    closed: AtomicBool,
}

impl Database {
    pub fn open(config: DatabaseConfig, hooks: HookChain) -> Result<Arc<Self>> {
        config.validate()?;

        let (event_bulks, _) = broadcast::channel(config.event_bulk_capacity);
        let db = Self {
            token: random_token(TOKEN_LENGTH),
            run_queue: RunQueue::new(Duration::from_millis(config.lock_timeout_ms)),
            dedup: EventBulkDedup::new(&config.event_bulk_dedup),
            event_bulks: Mutex::new(Some(event_bulks)),
            clock: MonotonicClock::new(),
            closed: AtomicBool::new(false),
            hooks,
            config,
        };

        info!(
            database = %db.config.name,
            token = %db.token,
            dev_mode = db.config.dev_mode,
            "Opened database"
        );
        Ok(Arc::new(db))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Random id of this open handle
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    pub fn run_queue(&self) -> &RunQueue {
        &self.run_queue
    }

    /// Clock used to stamp `_meta.lwt`
    pub fn clock(&self) -> &dyn Clock {
        &self.clock
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(QuireError::Closed(self.config.name.clone()));
        }
        Ok(())
    }

    /// Publish `bulk` to subscribers of [`event_bulks`](Self::event_bulks)
    ///
    /// Returns `false` without publishing if a bulk with the same id was
    /// already emitted within the dedup window, or if the database is closed.
    pub fn emit(&self, bulk: EventBulk) -> bool {
        if self.is_closed() {
            return false;
        }
        if !self.dedup.insert(&bulk.id) {
            warn!(database = %self.config.name, bulk = %bulk.id, "Dropped duplicate event bulk");
            observe::record_duplicate_event_bulk();
            return false;
        }
        if let Some(sender) = self.event_bulks.lock().as_ref() {
            // No subscriber is not an error
            let _ = sender.send(bulk);
        }
        true
    }

    /// Every event bulk emitted after this call, ending when the database closes
    pub fn event_bulks(&self) -> BoxStream<'static, EventBulk> {
        match self.event_bulks.lock().as_ref() {
            Some(sender) => broadcast_stream(sender.subscribe(), "database.event_bulks"),
            None => stream::empty().boxed(),
        }
    }

    /// Bind a raw storage instance to this database
    pub fn wrap_storage_instance<S>(self: &Arc<Self>, raw: Arc<S>) -> WrappedStorageInstance<S>
    where
        S: StorageInstance + 'static,
    {
        WrappedStorageInstance::new(Arc::clone(self), raw)
    }

    /// Pipe the change stream of `instance` into [`emit`](Self::emit)
    ///
    /// The task ends when the instance's stream ends or the database closes.
    pub fn forward_changes<S>(self: &Arc<Self>, instance: &S) -> JoinHandle<()>
    where
        S: StorageInstance + ?Sized,
    {
        let mut changes = instance.change_stream();
        let db = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(bulk) = changes.next().await {
                if db.is_closed() {
                    break;
                }
                db.emit(bulk);
            }
        })
    }

    /// Close the handle once in-flight wrapped operations have finished
    pub async fn close(&self) -> Result<()> {
        let _guard = self.run_queue.exclusive().await?;
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.event_bulks.lock().take();
        self.dedup.clear();
        info!(database = %self.config.name, "Closed database");
        Ok(())
    }
}
