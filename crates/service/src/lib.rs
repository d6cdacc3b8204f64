//! Async runtime around the auction state machine.
//!
//! The engine crate is synchronous; this crate gives each auction its
//! concurrency shell:
//!
//! - `actor`: one writer task per auction, applying commands in arrival order
//! - `timer`: countdown tasks that inject expiry into the writer's own queue
//! - `hub`: lossy broadcast fan-out of snapshots and announcements
//! - `persist`: write-behind snapshot storage that never blocks the writer
//! - `registry`: handle lookup plus admin/team bearer-token authorization

use thiserror::Error;

use pavilion_engine::AuctionError;
use pavilion_types::{AuctionId, Millis};

pub mod actor;
pub mod hub;
pub mod persist;
pub mod registry;
mod timer;

pub use actor::{spawn_auction, AuctionHandle, CommandReply};
pub use hub::{BroadcastHub, Subscription};
pub use persist::{spawn_writer, JsonFileStore, MemoryStore, PersistLane, PersistenceAdapter};
pub use registry::{AuctionRegistry, CreateAuctionSpec, RegistryError};

/// Errors surfaced by auction handles.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The command was applied and rejected by the state machine.
    #[error(transparent)]
    Auction(#[from] AuctionError),

    /// The writer task is gone; the auction no longer accepts commands.
    #[error("auction {0} is no longer running")]
    AuctionStopped(AuctionId),
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> Millis {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Millis)
        .unwrap_or(0)
}
