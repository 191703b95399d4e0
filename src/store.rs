//! Storage for identities, message records and the todo queue
//!
//! `Storage` is the full capability set the pipeline and the API need.
//! `SnapshotStore` keeps everything in memory and persists a JSON snapshot
//! to disk from a background task.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};
use tokio::time::interval;

use crate::error::StoreResult;
use crate::ledger::MessageLedger;
use crate::registry::{BindError, BindOutcome, IdentityRegistry};
use crate::types::{
    Identity, MessageId, MessageRecord, MessageStatus, Party, PlatformUserId, RecordUpdate,
};

#[async_trait]
pub trait Storage: Send + Sync {
    // ============ Identities ============

    async fn bind(
        &self,
        public_key: &str,
        platform_user_id: PlatformUserId,
        handle: &str,
    ) -> Result<BindOutcome, BindError>;

    async fn get_parties(&self) -> Vec<Party>;

    async fn get_blocked(&self) -> Vec<Identity>;

    // ============ Message Records ============

    async fn get_record(&self, message_id: MessageId) -> StoreResult<Option<MessageRecord>>;

    async fn upsert_record(&self, message_id: MessageId, update: RecordUpdate) -> StoreResult<()>;

    async fn status_counts(&self) -> BTreeMap<MessageStatus, usize>;

    async fn last_seen_id(&self) -> Option<MessageId>;

    // ============ Todo Queue ============

    async fn enqueue_todo(&self, message_id: MessageId) -> StoreResult<()>;

    async fn list_todo(&self, limit: usize) -> Vec<MessageId>;

    async fn is_todo(&self, message_id: MessageId) -> bool;

    async fn todo_count(&self) -> usize;

    async fn reconcile_todo(&self) -> StoreResult<usize>;

    // ============ Persistence ============

    /// Ask for pending writes to be persisted now rather than on the next tick
    fn request_persist(&self) {}
}

/// In-memory store with periodic JSON snapshots.
///
/// Registry and ledger each sit behind one write lock, so every
/// read-check-write (`bind`, `upsert_record`) is applied as a unit.
pub struct SnapshotStore {
    registry: RwLock<IdentityRegistry>,
    ledger: RwLock<MessageLedger>,
    /// Snapshot location; `None` keeps the store purely in memory
    state_file: Option<PathBuf>,
    dirty: AtomicBool,
    persist_notify: Notify,
    shutdown: AtomicBool,
    last_persist: std::sync::RwLock<Option<DateTime<Utc>>>,
}

#[derive(Serialize, Deserialize)]
struct StateSnapshot {
    identities: Vec<Identity>,
    ledger: MessageLedger,
    saved_at: DateTime<Utc>,
}

impl SnapshotStore {
    pub fn new(state_file: PathBuf) -> Arc<Self> {
        Arc::new(Self::with_state_file(Some(state_file)))
    }

    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self::with_state_file(None))
    }

    fn with_state_file(state_file: Option<PathBuf>) -> Self {
        Self {
            registry: RwLock::new(IdentityRegistry::new()),
            ledger: RwLock::new(MessageLedger::new()),
            state_file,
            dirty: AtomicBool::new(false),
            persist_notify: Notify::new(),
            shutdown: AtomicBool::new(false),
            last_persist: std::sync::RwLock::new(None),
        }
    }

    /// Load the snapshot written by a previous run, if any
    pub async fn load_from_disk(&self) -> anyhow::Result<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };

        if !path.exists() {
            tracing::info!("No existing state file, starting fresh");
            return Ok(());
        }

        let json = tokio::fs::read_to_string(path).await?;
        let snapshot: StateSnapshot = serde_json::from_str(&json)?;

        let mut registry = self.registry.write().await;
        let mut ledger = self.ledger.write().await;
        *registry = IdentityRegistry::from_identities(snapshot.identities);
        *ledger = snapshot.ledger;

        tracing::info!(
            "Loaded state: {} identities, {} message records (saved {})",
            registry.len(),
            ledger.len(),
            snapshot.saved_at
        );
        Ok(())
    }

    /// Start background persistence worker
    pub fn spawn_persister(self: &Arc<Self>, persist_interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(persist_interval);

            loop {
                if store.shutdown.load(Ordering::SeqCst) {
                    tracing::info!("Persister shutting down, final save...");
                    if let Err(e) = store.save_to_disk().await {
                        tracing::error!("Failed final persist: {}", e);
                    }
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        if store.dirty.swap(false, Ordering::SeqCst) {
                            if let Err(e) = store.save_to_disk().await {
                                tracing::error!("Failed to persist state: {}", e);
                            }
                        }
                    }
                    _ = store.persist_notify.notified() => {
                        store.dirty.store(false, Ordering::SeqCst);
                        if let Err(e) = store.save_to_disk().await {
                            tracing::error!("Failed to persist state: {}", e);
                        }
                    }
                }
            }
        })
    }

    pub fn signal_shutdown(&self) {
        tracing::info!("Shutdown signaled");
        self.shutdown.store(true, Ordering::SeqCst);
        self.persist_notify.notify_one();
    }

    pub fn last_persist(&self) -> Option<DateTime<Utc>> {
        self.last_persist.read().ok().and_then(|guard| *guard)
    }

    /// Write the snapshot atomically (temp file + rename)
    pub async fn save_to_disk(&self) -> StoreResult<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };

        let snapshot = {
            let registry = self.registry.read().await;
            let ledger = self.ledger.read().await;
            StateSnapshot {
                identities: registry.identities().to_vec(),
                ledger: ledger.clone(),
                saved_at: Utc::now(),
            }
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::rename(&temp_path, path).await?;

        if let Ok(mut guard) = self.last_persist.write() {
            *guard = Some(Utc::now());
        }
        tracing::info!(
            "State persisted: {} identities, {} message records",
            snapshot.identities.len(),
            snapshot.ledger.len()
        );
        Ok(())
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for SnapshotStore {
    async fn bind(
        &self,
        public_key: &str,
        platform_user_id: PlatformUserId,
        handle: &str,
    ) -> Result<BindOutcome, BindError> {
        let mut registry = self.registry.write().await;
        let result = registry.bind(public_key, platform_user_id, handle, Utc::now());
        // a split claim writes the block markers, so both arms are dirty
        self.mark_dirty();
        result
    }

    async fn get_parties(&self) -> Vec<Party> {
        self.registry.read().await.get_parties()
    }

    async fn get_blocked(&self) -> Vec<Identity> {
        self.registry.read().await.get_blocked()
    }

    async fn get_record(&self, message_id: MessageId) -> StoreResult<Option<MessageRecord>> {
        Ok(self.ledger.read().await.get_record(message_id).cloned())
    }

    async fn upsert_record(&self, message_id: MessageId, update: RecordUpdate) -> StoreResult<()> {
        self.ledger
            .write()
            .await
            .upsert_record(message_id, update, Utc::now());
        self.mark_dirty();
        Ok(())
    }

    async fn status_counts(&self) -> BTreeMap<MessageStatus, usize> {
        self.ledger.read().await.status_counts()
    }

    async fn last_seen_id(&self) -> Option<MessageId> {
        self.ledger.read().await.last_seen_id()
    }

    async fn enqueue_todo(&self, message_id: MessageId) -> StoreResult<()> {
        self.ledger.write().await.enqueue(message_id);
        self.mark_dirty();
        Ok(())
    }

    async fn list_todo(&self, limit: usize) -> Vec<MessageId> {
        self.ledger.read().await.list(limit)
    }

    async fn is_todo(&self, message_id: MessageId) -> bool {
        self.ledger.read().await.is_queued(message_id)
    }

    async fn todo_count(&self) -> usize {
        self.ledger.read().await.queued_count()
    }

    async fn reconcile_todo(&self) -> StoreResult<usize> {
        let removed = self.ledger.write().await.reconcile();
        if removed > 0 {
            self.mark_dirty();
        }
        Ok(removed)
    }

    fn request_persist(&self) {
        if self.state_file.is_some() {
            self.persist_notify.notify_one();
        }
    }
}
