//! Write-behind snapshot persistence.
//!
//! Committed snapshots are handed to a dedicated writer task over a bounded
//! channel. The auction writer never waits on storage: if the lane is full
//! the oldest pending snapshot for that commit is simply superseded by the
//! next one, and storage failures are retried in the background while the
//! auction keeps running.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use pavilion_types::view::AuctionView;
use pavilion_types::AuctionId;

const PERSIST_LANE_CAPACITY: usize = 64;
const SAVE_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Storage backend for auction snapshots.
///
/// Snapshots are self-contained: recovery loads the latest snapshot per
/// auction, nothing else.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn save_snapshot(&self, view: &AuctionView) -> anyhow::Result<()>;
    async fn load_snapshot(&self, auction_id: AuctionId) -> anyhow::Result<Option<AuctionView>>;
}

/// In-memory store, used in tests and as the default for ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    snapshots: Mutex<HashMap<AuctionId, AuctionView>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    async fn save_snapshot(&self, view: &AuctionView) -> anyhow::Result<()> {
        self.snapshots.lock().insert(view.auction_id, view.clone());
        Ok(())
    }

    async fn load_snapshot(&self, auction_id: AuctionId) -> anyhow::Result<Option<AuctionView>> {
        Ok(self.snapshots.lock().get(&auction_id).cloned())
    }
}

/// One JSON file per auction under a base directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, auction_id: AuctionId) -> PathBuf {
        self.dir.join(format!("auction-{auction_id}.json"))
    }
}

#[async_trait]
impl PersistenceAdapter for JsonFileStore {
    async fn save_snapshot(&self, view: &AuctionView) -> anyhow::Result<()> {
        let path = self.path_for(view.auction_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(view)?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn load_snapshot(&self, auction_id: AuctionId) -> anyhow::Result<Option<AuctionView>> {
        let path = self.path_for(auction_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// Sender half of the persistence lane, cloned into each auction writer.
#[derive(Clone)]
pub struct PersistLane {
    tx: mpsc::Sender<Arc<AuctionView>>,
}

impl PersistLane {
    /// A lane that drops everything, for tests that do not care about storage.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    /// Queue a snapshot for the writer task. Never blocks: when the lane is
    /// full the snapshot is dropped with a warning, and the next commit will
    /// carry a fresher one anyway.
    pub fn offer(&self, view: Arc<AuctionView>) {
        if let Err(err) = self.tx.try_send(view) {
            match err {
                mpsc::error::TrySendError::Full(view) => {
                    warn!(
                        auction_id = view.auction_id,
                        version = view.version,
                        "persistence lane full, snapshot dropped"
                    );
                }
                mpsc::error::TrySendError::Closed(_) => {}
            }
        }
    }
}

/// Spawn the background writer and return the lane feeding it.
pub fn spawn_writer(store: Arc<dyn PersistenceAdapter>) -> PersistLane {
    let (tx, mut rx) = mpsc::channel::<Arc<AuctionView>>(PERSIST_LANE_CAPACITY);
    tokio::spawn(async move {
        while let Some(view) = rx.recv().await {
            save_with_retry(store.as_ref(), &view).await;
        }
        debug!("persistence writer stopped");
    });
    PersistLane { tx }
}

async fn save_with_retry(store: &dyn PersistenceAdapter, view: &AuctionView) {
    for attempt in 1..=SAVE_ATTEMPTS {
        match store.save_snapshot(view).await {
            Ok(()) => {
                debug!(
                    auction_id = view.auction_id,
                    version = view.version,
                    "snapshot saved"
                );
                return;
            }
            Err(err) if attempt < SAVE_ATTEMPTS => {
                warn!(
                    auction_id = view.auction_id,
                    version = view.version,
                    attempt,
                    %err,
                    "snapshot save failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) => {
                // The auction keeps running on in-memory state; raise an
                // operator-visible alert and move on.
                error!(
                    auction_id = view.auction_id,
                    version = view.version,
                    %err,
                    "snapshot save failed permanently"
                );
            }
        }
    }
}
