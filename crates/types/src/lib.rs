//! Core type definitions for the pavilion live auction engine.
//!
//! This crate provides the shared data structures used across the bidding
//! system: auction configuration, team purses and rosters, the player pool,
//! the ephemeral bidding round, and the broadcast view shapes.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub mod view;

// =========================
// IDENTIFIERS & AMOUNTS
// =========================

/// Auction identifier.
pub type AuctionId = u64;

/// Team identifier.
pub type TeamId = u64;

/// Player identifier.
pub type PlayerId = u64;

/// Money amount in the platform's smallest denomination (rupees).
pub type Amount = u64;

/// Unix timestamp in milliseconds.
pub type Millis = u64;

// =========================
// AUCTION LIFECYCLE
// =========================

/// Top-level auction lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    /// Created, not yet fully configured
    Draft,
    /// Configured and ready to go live
    Configured,
    /// Live bidding in progress
    Live,
    /// Live bidding frozen by the admin
    Paused,
    /// Player pool exhausted or admin-forced end
    Completed,
    /// Post-auction trade window
    TradeWindow,
    /// Archived
    Finalized,
}

// =========================
// INCREMENT SCHEDULE
// =========================

/// One band of the bid-increment step function.
///
/// The band applies while the current highest bid is strictly below `upto`;
/// a band with `upto: None` is the open-ended tail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementBand {
    pub upto: Option<Amount>,
    pub step: Amount,
}

/// A named step-function schedule mapping current price to the minimum
/// required raise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementSchedule {
    pub name: String,
    pub bands: Vec<IncrementBand>,
}

impl IncrementSchedule {
    /// Look up a named preset.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self {
                name: "standard".to_string(),
                bands: vec![
                    IncrementBand {
                        upto: Some(2_000_000),
                        step: 50_000,
                    },
                    IncrementBand {
                        upto: Some(5_000_000),
                        step: 100_000,
                    },
                    IncrementBand {
                        upto: None,
                        step: 250_000,
                    },
                ],
            }),
            "premium" => Some(Self {
                name: "premium".to_string(),
                bands: vec![
                    IncrementBand {
                        upto: Some(10_000_000),
                        step: 500_000,
                    },
                    IncrementBand {
                        upto: None,
                        step: 1_000_000,
                    },
                ],
            }),
            _ => None,
        }
    }

    /// Required raise above `current` for the band containing it.
    pub fn step_at(&self, current: Amount) -> Amount {
        for band in &self.bands {
            match band.upto {
                Some(upto) if current < upto => return band.step,
                Some(_) => continue,
                None => return band.step,
            }
        }
        // A schedule with no open-ended tail falls back to its last band.
        self.bands.last().map(|b| b.step).unwrap_or(0)
    }

    /// A schedule is usable when every band has a non-zero step and band
    /// boundaries are strictly increasing, ending with an open tail.
    pub fn is_valid(&self) -> bool {
        if self.bands.is_empty() {
            return false;
        }
        let mut prev: Option<Amount> = None;
        for (i, band) in self.bands.iter().enumerate() {
            if band.step == 0 {
                return false;
            }
            match band.upto {
                Some(upto) => {
                    if i == self.bands.len() - 1 {
                        return false; // last band must be open-ended
                    }
                    if let Some(p) = prev {
                        if upto <= p {
                            return false;
                        }
                    }
                    prev = Some(upto);
                }
                None => {
                    if i != self.bands.len() - 1 {
                        return false;
                    }
                }
            }
        }
        true
    }
}

// =========================
// CONFIGURATION
// =========================

/// What happens to the round timer when a paused auction resumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    /// Re-arm the full bid window on resume.
    #[default]
    RestartWindow,
    /// Resume with whatever time was left when the auction paused.
    ResumeRemaining,
}

/// Full configuration for one auction, fixed before it goes live.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuctionConfig {
    pub auction_id: AuctionId,
    pub name: String,

    // Rules
    /// Opening price for every player; the first bid of a round must match it.
    pub base_price: Amount,
    /// Minimum squad size each team must be able to complete.
    pub squad_min: usize,
    /// Maximum squad size (retained players included).
    pub squad_max: usize,
    pub increments: IncrementSchedule,

    // Timing
    /// Bid window in milliseconds; every accepted bid re-arms it.
    pub bid_window_ms: Millis,
    pub resume_policy: ResumePolicy,
}

impl AuctionConfig {
    /// Validate the configuration before the auction is allowed to go live.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_price == 0 {
            return Err(ConfigError::InvalidBasePrice);
        }
        if self.squad_min == 0 || self.squad_min > self.squad_max {
            return Err(ConfigError::InvalidSquadBounds {
                min: self.squad_min,
                max: self.squad_max,
            });
        }
        if self.bid_window_ms == 0 {
            return Err(ConfigError::InvalidBidWindow);
        }
        if !self.increments.is_valid() {
            return Err(ConfigError::InvalidIncrementSchedule(
                self.increments.name.clone(),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur during auction configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Base price cannot be zero")]
    InvalidBasePrice,

    #[error("Invalid squad bounds: min {min}, max {max}")]
    InvalidSquadBounds { min: usize, max: usize },

    #[error("Bid window cannot be zero")]
    InvalidBidWindow,

    #[error("Invalid increment schedule: {0}")]
    InvalidIncrementSchedule(String),
}

// =========================
// TEAMS
// =========================

/// A player retained by a team before the auction, outside live bidding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainedPlayer {
    pub player_id: PlayerId,
    /// Retention fee deducted from the purse at configuration time.
    pub price: Amount,
}

/// A roster slot won during live bidding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSlot {
    pub player_id: PlayerId,
    pub price: Amount,
}

/// One team's purse and roster, mutated only by the owning auction's writer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TeamState {
    pub team_id: TeamId,
    pub name: String,
    pub purse_total: Amount,
    pub purse_remaining: Amount,
    pub roster: Vec<RosterSlot>,
    pub retained: Vec<RetainedPlayer>,
}

impl TeamState {
    /// Build a team, deducting retention fees from the purse up front.
    ///
    /// Returns `None` if retention fees exceed the purse.
    pub fn new(
        team_id: TeamId,
        name: impl Into<String>,
        purse_total: Amount,
        retained: Vec<RetainedPlayer>,
    ) -> Option<Self> {
        let retention: Amount = retained.iter().map(|r| r.price).sum();
        let purse_remaining = purse_total.checked_sub(retention)?;
        Some(Self {
            team_id,
            name: name.into(),
            purse_total,
            purse_remaining,
            roster: Vec::new(),
            retained,
        })
    }

    /// Squad size counting retained players and won roster slots.
    pub fn squad_size(&self) -> usize {
        self.roster.len() + self.retained.len()
    }
}

// =========================
// PLAYER POOL
// =========================

/// Where a player stands in the auction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PlayerStatus {
    /// Awaiting a bidding round
    Queued,
    /// Currently under the hammer
    InBidding,
    /// Won by a team at a final price (terminal)
    Sold { team_id: TeamId, price: Amount },
    /// Round closed with no winner (terminal)
    Unsold,
    /// Removed by the admin (terminal)
    Disqualified,
}

/// One player awaiting, undergoing, or having completed auction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPoolEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub status: PlayerStatus,
}

impl PlayerPoolEntry {
    pub fn queued(player_id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            player_id,
            name: name.into(),
            status: PlayerStatus::Queued,
        }
    }
}

// =========================
// BIDDING ROUND
// =========================

/// One accepted bid within a round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRecord {
    pub team_id: TeamId,
    pub amount: Amount,
    pub timestamp_ms: Millis,
}

/// The ephemeral bidding contest for one player.
///
/// Exists only while the player is `InBidding`; destroyed on resolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BiddingRound {
    pub player_id: PlayerId,
    pub round_no: u64,
    pub current_bid: Option<Amount>,
    pub leading_team: Option<TeamId>,
    pub history: Vec<BidRecord>,
    /// Instant the current bid window expires.
    pub expires_at_ms: Millis,
    /// Window time left when the auction paused, for `ResumeRemaining`.
    pub remaining_at_pause_ms: Option<Millis>,
}

impl BiddingRound {
    pub fn open(player_id: PlayerId, round_no: u64, expires_at_ms: Millis) -> Self {
        Self {
            player_id,
            round_no,
            current_bid: None,
            leading_team: None,
            history: Vec::new(),
            expires_at_ms,
            remaining_at_pause_ms: None,
        }
    }

    /// Whether any bid has ever been accepted in this round.
    pub fn has_bids(&self) -> bool {
        !self.history.is_empty()
    }
}

// =========================
// SETUP PAYLOAD
// =========================

/// Everything the external configuration surface hands the engine when an
/// auction is created: the frozen config, the teams, and the ordered pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuctionSetup {
    pub config: AuctionConfig,
    pub teams: Vec<TeamState>,
    /// Players in auction order.
    pub pool: Vec<PlayerPoolEntry>,
}

impl AuctionSetup {
    /// Ordered queue of player ids still awaiting bidding.
    pub fn queued_ids(&self) -> VecDeque<PlayerId> {
        self.pool
            .iter()
            .filter(|p| p.status == PlayerStatus::Queued)
            .map(|p| p.player_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> IncrementSchedule {
        IncrementSchedule::preset("standard").unwrap()
    }

    #[test]
    fn test_standard_preset_steps() {
        let sched = standard();
        assert_eq!(sched.step_at(500_000), 50_000);
        assert_eq!(sched.step_at(1_999_999), 50_000);
        assert_eq!(sched.step_at(2_000_000), 100_000);
        assert_eq!(sched.step_at(5_000_000), 250_000);
        assert_eq!(sched.step_at(50_000_000), 250_000);
    }

    #[test]
    fn test_unknown_preset() {
        assert!(IncrementSchedule::preset("nope").is_none());
    }

    #[test]
    fn test_schedule_validation() {
        assert!(standard().is_valid());

        let no_tail = IncrementSchedule {
            name: "no-tail".into(),
            bands: vec![IncrementBand {
                upto: Some(100),
                step: 10,
            }],
        };
        assert!(!no_tail.is_valid());

        let zero_step = IncrementSchedule {
            name: "zero".into(),
            bands: vec![IncrementBand {
                upto: None,
                step: 0,
            }],
        };
        assert!(!zero_step.is_valid());

        let unordered = IncrementSchedule {
            name: "unordered".into(),
            bands: vec![
                IncrementBand {
                    upto: Some(200),
                    step: 10,
                },
                IncrementBand {
                    upto: Some(100),
                    step: 20,
                },
                IncrementBand {
                    upto: None,
                    step: 30,
                },
            ],
        };
        assert!(!unordered.is_valid());
    }

    #[test]
    fn test_config_validate() {
        let config = AuctionConfig {
            auction_id: 1,
            name: "Season 7".into(),
            base_price: 500_000,
            squad_min: 11,
            squad_max: 18,
            increments: standard(),
            bid_window_ms: 30_000,
            resume_policy: ResumePolicy::default(),
        };
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.base_price = 0;
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidBasePrice)));

        let mut bad = config.clone();
        bad.squad_min = 20;
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidSquadBounds { .. })
        ));

        let mut bad = config;
        bad.bid_window_ms = 0;
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidBidWindow)));
    }

    #[test]
    fn test_team_retention_deducts_purse() {
        let team = TeamState::new(
            1,
            "Strikers",
            10_000_000,
            vec![RetainedPlayer {
                player_id: 42,
                price: 4_000_000,
            }],
        )
        .unwrap();
        assert_eq!(team.purse_remaining, 6_000_000);
        assert_eq!(team.squad_size(), 1);

        // Retention beyond the purse is a configuration error.
        assert!(TeamState::new(
            2,
            "Overspent",
            1_000_000,
            vec![RetainedPlayer {
                player_id: 43,
                price: 2_000_000
            }]
        )
        .is_none());
    }

    #[test]
    fn test_setup_queued_ids_skips_resolved() {
        let setup = AuctionSetup {
            config: AuctionConfig {
                auction_id: 1,
                name: "t".into(),
                base_price: 100,
                squad_min: 1,
                squad_max: 2,
                increments: standard(),
                bid_window_ms: 1000,
                resume_policy: ResumePolicy::default(),
            },
            teams: vec![],
            pool: vec![
                PlayerPoolEntry::queued(1, "a"),
                PlayerPoolEntry {
                    player_id: 2,
                    name: "b".into(),
                    status: PlayerStatus::Unsold,
                },
                PlayerPoolEntry::queued(3, "c"),
            ],
        };
        assert_eq!(setup.queued_ids(), VecDeque::from(vec![1, 3]));
    }
}
