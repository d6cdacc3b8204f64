//! RPC-facing parameter and response types.
//!
//! These are JSON shapes for the wire; they are converted into the core
//! types before anything touches an auction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use pavilion_service::{CommandReply, CreateAuctionSpec};
use pavilion_types::{
    Amount, AuctionConfig, AuctionId, AuctionSetup, AuctionStatus, IncrementBand,
    IncrementSchedule, Millis, PlayerId, PlayerPoolEntry, ResumePolicy, RetainedPlayer, TeamId,
    TeamState,
};

/// Parameters for `admin_createAuction`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAuctionParams {
    pub auction_id: AuctionId,
    pub name: String,
    pub base_price: Amount,
    pub squad_min: usize,
    pub squad_max: usize,
    /// Named preset ("standard", "premium"); ignored when `increment_bands`
    /// is given.
    #[serde(default = "default_preset")]
    pub increment_preset: String,
    pub increment_bands: Option<Vec<IncrementBandParams>>,
    pub bid_window_ms: Millis,
    #[serde(default)]
    pub resume_policy: ResumePolicy,
    pub admin_token: String,
    pub teams: Vec<TeamParams>,
    /// Players in auction order.
    pub players: Vec<PlayerParams>,
}

fn default_preset() -> String {
    "standard".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncrementBandParams {
    pub upto: Option<Amount>,
    pub step: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TeamParams {
    pub team_id: TeamId,
    pub name: String,
    pub purse: Amount,
    /// Bearer token the team's client must present on every bid.
    pub token: String,
    #[serde(default)]
    pub retained: Vec<RetainedParams>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetainedParams {
    pub player_id: PlayerId,
    pub price: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerParams {
    pub player_id: PlayerId,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("unknown increment preset {0:?}")]
    UnknownPreset(String),

    #[error("team {0}: retention fees exceed the purse")]
    RetentionExceedsPurse(TeamId),
}

impl CreateAuctionParams {
    /// Convert wire params into the registry's create spec.
    pub fn into_spec(self) -> Result<CreateAuctionSpec, ParamsError> {
        let increments = match self.increment_bands {
            Some(bands) => IncrementSchedule {
                name: "custom".to_string(),
                bands: bands
                    .into_iter()
                    .map(|b| IncrementBand {
                        upto: b.upto,
                        step: b.step,
                    })
                    .collect(),
            },
            None => IncrementSchedule::preset(&self.increment_preset)
                .ok_or(ParamsError::UnknownPreset(self.increment_preset))?,
        };

        let mut teams = Vec::with_capacity(self.teams.len());
        let mut team_tokens = HashMap::with_capacity(self.teams.len());
        for team in self.teams {
            let retained = team
                .retained
                .into_iter()
                .map(|r| RetainedPlayer {
                    player_id: r.player_id,
                    price: r.price,
                })
                .collect();
            let state = TeamState::new(team.team_id, team.name, team.purse, retained)
                .ok_or(ParamsError::RetentionExceedsPurse(team.team_id))?;
            teams.push(state);
            team_tokens.insert(team.team_id, team.token);
        }

        let pool = self
            .players
            .into_iter()
            .map(|p| PlayerPoolEntry::queued(p.player_id, p.name))
            .collect();

        Ok(CreateAuctionSpec {
            setup: AuctionSetup {
                config: AuctionConfig {
                    auction_id: self.auction_id,
                    name: self.name,
                    base_price: self.base_price,
                    squad_min: self.squad_min,
                    squad_max: self.squad_max,
                    increments,
                    bid_window_ms: self.bid_window_ms,
                    resume_policy: self.resume_policy,
                },
                teams,
                pool,
            },
            admin_token: self.admin_token,
            team_tokens,
        })
    }
}

/// Outcome of any applied command.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: AuctionStatus,
    pub version: u64,
    pub description: Option<String>,
}

impl From<CommandReply> for CommandResponse {
    fn from(reply: CommandReply) -> Self {
        Self {
            status: reply.view.status,
            version: reply.view.version,
            description: reply.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CreateAuctionParams {
        CreateAuctionParams {
            auction_id: 1,
            name: "Season 7".into(),
            base_price: 500_000,
            squad_min: 2,
            squad_max: 5,
            increment_preset: "standard".into(),
            increment_bands: None,
            bid_window_ms: 30_000,
            resume_policy: ResumePolicy::default(),
            admin_token: "admin".into(),
            teams: vec![TeamParams {
                team_id: 1,
                name: "Strikers".into(),
                purse: 10_000_000,
                token: "t1".into(),
                retained: vec![RetainedParams {
                    player_id: 42,
                    price: 4_000_000,
                }],
            }],
            players: vec![PlayerParams {
                player_id: 10,
                name: "Opener".into(),
            }],
        }
    }

    #[test]
    fn test_into_spec_builds_setup() {
        let spec = params().into_spec().unwrap();
        assert_eq!(spec.setup.config.increments.name, "standard");
        assert_eq!(spec.setup.teams[0].purse_remaining, 6_000_000);
        assert_eq!(spec.team_tokens.get(&1).map(String::as_str), Some("t1"));
        assert_eq!(spec.setup.pool.len(), 1);
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let mut p = params();
        p.increment_preset = "nope".into();
        assert!(matches!(
            p.into_spec(),
            Err(ParamsError::UnknownPreset(_))
        ));
    }

    #[test]
    fn test_custom_bands_override_preset() {
        let mut p = params();
        p.increment_bands = Some(vec![IncrementBandParams {
            upto: None,
            step: 25_000,
        }]);
        let spec = p.into_spec().unwrap();
        assert_eq!(spec.setup.config.increments.name, "custom");
        assert_eq!(spec.setup.config.increments.bands[0].step, 25_000);
    }

    #[test]
    fn test_retention_beyond_purse_rejected() {
        let mut p = params();
        p.teams[0].purse = 1_000_000;
        assert!(matches!(
            p.into_spec(),
            Err(ParamsError::RetentionExceedsPurse(1))
        ));
    }
}
