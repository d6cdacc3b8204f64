//! Auction registry and caller authorization.
//!
//! The registry owns every running auction's handle plus the bearer tokens
//! that gate its command surface: one admin token per auction and one token
//! per team. Token lookup happens outside the writer queue, so an
//! unauthorized caller never costs the auction any serialization slot.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use pavilion_engine::AuctionState;
use pavilion_types::{AuctionId, AuctionSetup, ConfigError, TeamId};

use crate::actor::{spawn_auction, AuctionHandle};
use crate::persist::PersistLane;

/// Everything needed to bring a new auction online.
#[derive(Clone, Debug)]
pub struct CreateAuctionSpec {
    pub setup: AuctionSetup,
    pub admin_token: String,
    /// Bearer token per team; a team without a token cannot bid.
    pub team_tokens: HashMap<TeamId, String>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("auction {0} already exists")]
    DuplicateAuction(AuctionId),

    #[error("auction {0} not found")]
    UnknownAuction(AuctionId),

    #[error("invalid auction configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("token for team {0} does not match any configured team")]
    UnknownTokenTeam(TeamId),

    #[error("unauthorized")]
    Unauthorized,
}

struct AuctionEntry {
    handle: AuctionHandle,
    admin_token: String,
    /// token -> team id, inverted from the create spec for O(1) bid auth.
    team_by_token: HashMap<String, TeamId>,
}

/// Registry of live auctions, shared across RPC connections.
pub struct AuctionRegistry {
    auctions: RwLock<HashMap<AuctionId, AuctionEntry>>,
    persist: PersistLane,
}

impl AuctionRegistry {
    pub fn new(persist: PersistLane) -> Self {
        Self {
            auctions: RwLock::new(HashMap::new()),
            persist,
        }
    }

    /// Validate the setup, spawn the writer and register the handle.
    pub fn create(&self, spec: CreateAuctionSpec) -> Result<AuctionHandle, RegistryError> {
        let auction_id = spec.setup.config.auction_id;
        for team_id in spec.team_tokens.keys() {
            if !spec.setup.teams.iter().any(|t| t.team_id == *team_id) {
                return Err(RegistryError::UnknownTokenTeam(*team_id));
            }
        }

        let state = AuctionState::from_setup(spec.setup)?;

        let mut auctions = self.auctions.write();
        if auctions.contains_key(&auction_id) {
            return Err(RegistryError::DuplicateAuction(auction_id));
        }

        let handle = spawn_auction(state, self.persist.clone());
        let team_by_token = spec
            .team_tokens
            .into_iter()
            .map(|(team_id, token)| (token, team_id))
            .collect();
        auctions.insert(
            auction_id,
            AuctionEntry {
                handle: handle.clone(),
                admin_token: spec.admin_token,
                team_by_token,
            },
        );
        info!(auction_id, "auction registered");
        Ok(handle)
    }

    /// Handle lookup without authorization, for read-only queries.
    pub fn get(&self, auction_id: AuctionId) -> Result<AuctionHandle, RegistryError> {
        self.auctions
            .read()
            .get(&auction_id)
            .map(|entry| entry.handle.clone())
            .ok_or(RegistryError::UnknownAuction(auction_id))
    }

    /// Handle lookup gated on the auction's admin token.
    pub fn authorize_admin(
        &self,
        auction_id: AuctionId,
        token: &str,
    ) -> Result<AuctionHandle, RegistryError> {
        let auctions = self.auctions.read();
        let entry = auctions
            .get(&auction_id)
            .ok_or(RegistryError::UnknownAuction(auction_id))?;
        if entry.admin_token != token {
            return Err(RegistryError::Unauthorized);
        }
        Ok(entry.handle.clone())
    }

    /// Resolve a team bearer token to its team id, gating the bid surface.
    pub fn authorize_team(
        &self,
        auction_id: AuctionId,
        token: &str,
    ) -> Result<(AuctionHandle, TeamId), RegistryError> {
        let auctions = self.auctions.read();
        let entry = auctions
            .get(&auction_id)
            .ok_or(RegistryError::UnknownAuction(auction_id))?;
        let team_id = *entry
            .team_by_token
            .get(token)
            .ok_or(RegistryError::Unauthorized)?;
        Ok((entry.handle.clone(), team_id))
    }

    pub fn auction_ids(&self) -> Vec<AuctionId> {
        let mut ids: Vec<_> = self.auctions.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pavilion_types::{
        AuctionConfig, AuctionStatus, IncrementSchedule, PlayerPoolEntry, ResumePolicy,
        TeamState,
    };

    fn spec(auction_id: AuctionId) -> CreateAuctionSpec {
        CreateAuctionSpec {
            setup: AuctionSetup {
                config: AuctionConfig {
                    auction_id,
                    name: "test".into(),
                    base_price: 500_000,
                    squad_min: 1,
                    squad_max: 5,
                    increments: IncrementSchedule::preset("standard").unwrap(),
                    bid_window_ms: 30_000,
                    resume_policy: ResumePolicy::default(),
                },
                teams: vec![TeamState::new(1, "Strikers", 10_000_000, vec![]).unwrap()],
                pool: vec![PlayerPoolEntry::queued(10, "Opener")],
            },
            admin_token: "admin-secret".into(),
            team_tokens: HashMap::from([(1, "strikers-secret".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let registry = AuctionRegistry::new(PersistLane::disabled());
        registry.create(spec(1)).unwrap();

        let handle = registry.get(1).unwrap();
        assert_eq!(
            handle.snapshot().unwrap().status,
            AuctionStatus::Configured
        );
        assert!(matches!(
            registry.get(2),
            Err(RegistryError::UnknownAuction(2))
        ));
        assert_eq!(registry.auction_ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_duplicate_auction_rejected() {
        let registry = AuctionRegistry::new(PersistLane::disabled());
        registry.create(spec(1)).unwrap();
        assert!(matches!(
            registry.create(spec(1)),
            Err(RegistryError::DuplicateAuction(1))
        ));
    }

    #[tokio::test]
    async fn test_invalid_setup_rejected() {
        let registry = AuctionRegistry::new(PersistLane::disabled());
        let mut bad = spec(1);
        bad.setup.config.base_price = 0;
        assert!(matches!(
            registry.create(bad),
            Err(RegistryError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_token_for_unknown_team_rejected() {
        let registry = AuctionRegistry::new(PersistLane::disabled());
        let mut bad = spec(1);
        bad.team_tokens.insert(9, "ghost".into());
        assert!(matches!(
            registry.create(bad),
            Err(RegistryError::UnknownTokenTeam(9))
        ));
    }

    #[tokio::test]
    async fn test_admin_authorization() {
        let registry = AuctionRegistry::new(PersistLane::disabled());
        registry.create(spec(1)).unwrap();

        assert!(registry.authorize_admin(1, "admin-secret").is_ok());
        assert!(matches!(
            registry.authorize_admin(1, "wrong"),
            Err(RegistryError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_team_authorization_maps_token_to_team() {
        let registry = AuctionRegistry::new(PersistLane::disabled());
        registry.create(spec(1)).unwrap();

        let (_, team_id) = registry.authorize_team(1, "strikers-secret").unwrap();
        assert_eq!(team_id, 1);
        assert!(matches!(
            registry.authorize_team(1, "admin-secret"),
            Err(RegistryError::Unauthorized)
        ));
    }
}
