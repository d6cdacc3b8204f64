//! JSON-RPC server for live player auctions.
//!
//! Exposes the admin command surface, the team bid surface and read-only
//! queries over HTTP/WebSocket, plus WebSocket subscriptions for state
//! snapshots and admin announcements. Authorization is bearer-token per
//! auction: one admin token, one token per team.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use jsonrpsee::core::{async_trait, SubscriptionResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{PendingSubscriptionSink, Server, SubscriptionMessage};
use jsonrpsee::types::ErrorObjectOwned;
use tracing::{info, warn};

use pavilion_engine::AuctionCommand;
use pavilion_service::{
    spawn_writer, AuctionRegistry, JsonFileStore, MemoryStore, PersistLane, PersistenceAdapter,
    RegistryError, ServiceError,
};
use pavilion_types::view::{AuctionStats, AuctionView};
use pavilion_types::{Amount, AuctionId, PlayerId};

mod types;
use types::*;

const ERR_REJECTED: i32 = -32000;
const ERR_UNAUTHORIZED: i32 = -32001;
const ERR_NOT_FOUND: i32 = -32004;

/// RPC API for the auction server.
#[rpc(server)]
pub trait PavilionApi {
    // ============ Admin Methods ============

    /// Create and register a new auction in `configured` state.
    #[method(name = "admin_createAuction")]
    async fn admin_create_auction(
        &self,
        params: CreateAuctionParams,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Start a configured auction.
    #[method(name = "admin_start")]
    async fn admin_start(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Pause a live auction, freezing bids and the countdown.
    #[method(name = "admin_pause")]
    async fn admin_pause(
        &self,
        auction_id: AuctionId,
        token: String,
        reason: Option<String>,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Resume a paused auction.
    #[method(name = "admin_resume")]
    async fn admin_resume(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Open a bidding round for the next queued player.
    #[method(name = "admin_nextPlayer")]
    async fn admin_next_player(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Mark the current player unsold before any bid lands.
    #[method(name = "admin_skip")]
    async fn admin_skip(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Disqualify the in-bidding player, or reverse the sale completed this
    /// round.
    #[method(name = "admin_disqualify")]
    async fn admin_disqualify(
        &self,
        auction_id: AuctionId,
        token: String,
        player_id: PlayerId,
        reason: Option<String>,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Undo the most recent undoable resolution.
    #[method(name = "admin_undo")]
    async fn admin_undo(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Force the auction to completed.
    #[method(name = "admin_complete")]
    async fn admin_complete(
        &self,
        auction_id: AuctionId,
        token: String,
        reason: Option<String>,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Broadcast a free-text message to all subscribers.
    #[method(name = "admin_announce")]
    async fn admin_announce(
        &self,
        auction_id: AuctionId,
        token: String,
        message: String,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Open the post-auction trade window.
    #[method(name = "admin_openTradeWindow")]
    async fn admin_open_trade_window(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    /// Archive the auction.
    #[method(name = "admin_finalize")]
    async fn admin_finalize(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    // ============ Team Methods ============

    /// Place a bid; the team is resolved from the bearer token.
    #[method(name = "team_bid")]
    async fn team_bid(
        &self,
        auction_id: AuctionId,
        token: String,
        amount: Amount,
    ) -> Result<CommandResponse, ErrorObjectOwned>;

    // ============ Query Methods ============

    /// Latest committed snapshot of an auction.
    #[method(name = "query_getState")]
    async fn query_get_state(
        &self,
        auction_id: AuctionId,
    ) -> Result<AuctionView, ErrorObjectOwned>;

    /// Pool counters for an auction.
    #[method(name = "query_getStats")]
    async fn query_get_stats(
        &self,
        auction_id: AuctionId,
    ) -> Result<AuctionStats, ErrorObjectOwned>;

    /// All registered auction ids.
    #[method(name = "query_listAuctions")]
    async fn query_list_auctions(&self) -> Result<Vec<AuctionId>, ErrorObjectOwned>;

    // ============ Subscriptions ============

    /// Stream of state snapshots, starting with the current one.
    #[subscription(name = "state_subscribe" => "state", unsubscribe = "state_unsubscribe", item = AuctionView)]
    async fn subscribe_state(&self, auction_id: AuctionId) -> SubscriptionResult;

    /// Stream of admin announcements.
    #[subscription(name = "announce_subscribe" => "announcement", unsubscribe = "announce_unsubscribe", item = pavilion_types::view::Announcement)]
    async fn subscribe_announcements(&self, auction_id: AuctionId) -> SubscriptionResult;
}

struct PavilionServer {
    registry: Arc<AuctionRegistry>,
}

impl PavilionServer {
    fn new(persist: PersistLane) -> Self {
        Self {
            registry: Arc::new(AuctionRegistry::new(persist)),
        }
    }

    async fn admin_execute(
        &self,
        auction_id: AuctionId,
        token: &str,
        command: AuctionCommand,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        let handle = self
            .registry
            .authorize_admin(auction_id, token)
            .map_err(registry_error)?;
        let reply = handle.execute(command).await.map_err(service_error)?;
        Ok(reply.into())
    }
}

fn registry_error(err: RegistryError) -> ErrorObjectOwned {
    let code = match &err {
        RegistryError::Unauthorized => ERR_UNAUTHORIZED,
        RegistryError::UnknownAuction(_) => ERR_NOT_FOUND,
        _ => ERR_REJECTED,
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}

fn service_error(err: ServiceError) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(ERR_REJECTED, err.to_string(), None::<()>)
}

fn rpc_error(msg: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(ERR_REJECTED, msg.into(), None::<()>)
}

#[async_trait]
impl PavilionApiServer for PavilionServer {
    async fn admin_create_auction(
        &self,
        params: CreateAuctionParams,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        let spec = params.into_spec().map_err(|e| rpc_error(e.to_string()))?;
        let handle = self.registry.create(spec).map_err(registry_error)?;
        let view = handle
            .snapshot()
            .ok_or_else(|| rpc_error("auction has no snapshot yet"))?;
        info!(auction_id = view.auction_id, "auction created");
        Ok(CommandResponse {
            status: view.status,
            version: view.version,
            description: Some("auction created".to_string()),
        })
    }

    async fn admin_start(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(auction_id, &token, AuctionCommand::Start)
            .await
    }

    async fn admin_pause(
        &self,
        auction_id: AuctionId,
        token: String,
        reason: Option<String>,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(auction_id, &token, AuctionCommand::Pause { reason })
            .await
    }

    async fn admin_resume(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(auction_id, &token, AuctionCommand::Resume)
            .await
    }

    async fn admin_next_player(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(auction_id, &token, AuctionCommand::NextPlayer)
            .await
    }

    async fn admin_skip(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(auction_id, &token, AuctionCommand::Skip)
            .await
    }

    async fn admin_disqualify(
        &self,
        auction_id: AuctionId,
        token: String,
        player_id: PlayerId,
        reason: Option<String>,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(
            auction_id,
            &token,
            AuctionCommand::Disqualify { player_id, reason },
        )
        .await
    }

    async fn admin_undo(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(auction_id, &token, AuctionCommand::Undo)
            .await
    }

    async fn admin_complete(
        &self,
        auction_id: AuctionId,
        token: String,
        reason: Option<String>,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(auction_id, &token, AuctionCommand::Complete { reason })
            .await
    }

    async fn admin_announce(
        &self,
        auction_id: AuctionId,
        token: String,
        message: String,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(auction_id, &token, AuctionCommand::Announce { message })
            .await
    }

    async fn admin_open_trade_window(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(auction_id, &token, AuctionCommand::OpenTradeWindow)
            .await
    }

    async fn admin_finalize(
        &self,
        auction_id: AuctionId,
        token: String,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        self.admin_execute(auction_id, &token, AuctionCommand::Finalize)
            .await
    }

    async fn team_bid(
        &self,
        auction_id: AuctionId,
        token: String,
        amount: Amount,
    ) -> Result<CommandResponse, ErrorObjectOwned> {
        let (handle, team_id) = self
            .registry
            .authorize_team(auction_id, &token)
            .map_err(registry_error)?;
        let reply = handle
            .execute(AuctionCommand::Bid { team_id, amount })
            .await
            .map_err(service_error)?;
        Ok(reply.into())
    }

    async fn query_get_state(
        &self,
        auction_id: AuctionId,
    ) -> Result<AuctionView, ErrorObjectOwned> {
        let handle = self.registry.get(auction_id).map_err(registry_error)?;
        let view = handle
            .snapshot()
            .ok_or_else(|| rpc_error("auction has no snapshot yet"))?;
        Ok((*view).clone())
    }

    async fn query_get_stats(
        &self,
        auction_id: AuctionId,
    ) -> Result<AuctionStats, ErrorObjectOwned> {
        Ok(self.query_get_state(auction_id).await?.stats)
    }

    async fn query_list_auctions(&self) -> Result<Vec<AuctionId>, ErrorObjectOwned> {
        Ok(self.registry.auction_ids())
    }

    async fn subscribe_state(
        &self,
        pending: PendingSubscriptionSink,
        auction_id: AuctionId,
    ) -> SubscriptionResult {
        let handle = self.registry.get(auction_id).map_err(|e| e.to_string())?;
        let mut sub = handle.subscribe();
        let sink = pending.accept().await?;

        tokio::spawn(async move {
            while let Some(view) = sub.next_state().await {
                let msg = match SubscriptionMessage::from_json(&*view) {
                    Ok(msg) => msg,
                    Err(err) => {
                        warn!(%err, "failed to encode state snapshot");
                        continue;
                    }
                };
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    async fn subscribe_announcements(
        &self,
        pending: PendingSubscriptionSink,
        auction_id: AuctionId,
    ) -> SubscriptionResult {
        let handle = self.registry.get(auction_id).map_err(|e| e.to_string())?;
        let mut sub = handle.subscribe();
        let sink = pending.accept().await?;

        tokio::spawn(async move {
            while let Some(announcement) = sub.next_announcement().await {
                let msg = match SubscriptionMessage::from_json(&announcement) {
                    Ok(msg) => msg,
                    Err(err) => {
                        warn!(%err, "failed to encode announcement");
                        continue;
                    }
                };
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }
}

#[derive(Debug, Parser)]
#[command(name = "pavilion-server", about = "Live auction JSON-RPC server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:9955")]
    listen: SocketAddr,

    /// Directory for snapshot persistence; in-memory only when omitted.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pavilion_server=info".parse()?)
                .add_directive("pavilion_service=info".parse()?)
                .add_directive("pavilion_engine=info".parse()?)
                .add_directive("jsonrpsee=warn".parse()?),
        )
        .init();

    let args = Args::parse();

    let store: Arc<dyn PersistenceAdapter> = match &args.data_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "persisting snapshots to disk");
            Arc::new(JsonFileStore::new(dir)?)
        }
        None => {
            info!("no data dir given, snapshots stay in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let persist = spawn_writer(store);

    info!("Starting auction server on {}", args.listen);

    let server = Server::builder().build(args.listen).await?;
    let handle = server.start(PavilionServer::new(persist).into_rpc());

    info!("Auction server running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.stop()?;
    handle.stopped().await;

    Ok(())
}
