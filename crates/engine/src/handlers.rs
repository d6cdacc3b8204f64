//! Command handlers for the auction state machine.
//!
//! These functions implement the transition logic for each command. They are
//! synchronous and non-blocking: the per-auction writer dequeues one command,
//! applies it here against current in-memory state, and only then looks at
//! the next command. Timer expiry arrives through the same path, so the race
//! between "timer fires" and "a bid arrives in the last millisecond" is
//! resolved by queue order.

use tracing::{debug, error, info};

use pavilion_types::{AuctionStatus, BidRecord, Millis, PlayerStatus};

use crate::call::AuctionCommand;
use crate::error::AuctionError;
use crate::state::{AuctionState, SaleRecord};
use crate::undo::{UndoEntry, MAX_CONSECUTIVE_UNDOS};
use crate::validator;

/// What the runtime must do with the round timer after a commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerDirective {
    /// Arm (or re-arm) the countdown for the given generation.
    Arm { window_ms: Millis, epoch: u64 },
    /// Disarm any pending countdown.
    Cancel,
    /// Leave the timer as it is.
    Leave,
}

/// Outcome of a successfully applied command.
#[derive(Clone, Debug)]
pub struct Committed {
    pub timer: TimerDirective,
    /// Whether a full-state snapshot must be fanned out to subscribers.
    pub broadcast: bool,
    /// Admin message for the announce channel, if any.
    pub announcement: Option<String>,
    /// Human-readable summary returned to the command issuer.
    pub description: Option<String>,
}

impl Committed {
    fn broadcast_with(timer: TimerDirective, description: impl Into<String>) -> Self {
        Self {
            timer,
            broadcast: true,
            announcement: None,
            description: Some(description.into()),
        }
    }

    fn noop() -> Self {
        Self {
            timer: TimerDirective::Leave,
            broadcast: false,
            announcement: None,
            description: None,
        }
    }
}

/// Result type for handlers.
pub type HandlerResult<T> = Result<T, AuctionError>;

/// Apply one command to the auction, returning the committed effects.
///
/// On success the view version is bumped for every broadcast commit, and any
/// non-undo state-changing command resets the consecutive-undo counter.
pub fn apply(
    state: &mut AuctionState,
    now_ms: Millis,
    command: AuctionCommand,
) -> HandlerResult<Committed> {
    let name = command.name();
    let is_undo = matches!(command, AuctionCommand::Undo);

    let committed = match command {
        AuctionCommand::Start => handle_start(state),
        AuctionCommand::Pause { reason } => handle_pause(state, now_ms, reason),
        AuctionCommand::Resume => handle_resume(state, now_ms),
        AuctionCommand::NextPlayer => handle_next_player(state, now_ms),
        AuctionCommand::Skip => handle_skip(state),
        AuctionCommand::Disqualify { player_id, reason } => {
            handle_disqualify(state, player_id, reason)
        }
        AuctionCommand::Undo => handle_undo(state),
        AuctionCommand::Complete { reason } => handle_complete(state, reason),
        AuctionCommand::Announce { message } => handle_announce(state, message),
        AuctionCommand::OpenTradeWindow => handle_open_trade_window(state),
        AuctionCommand::Finalize => handle_finalize(state),
        AuctionCommand::Bid { team_id, amount } => handle_bid(state, now_ms, team_id, amount),
        AuctionCommand::TimerElapsed { epoch } => handle_timer_elapsed(state, epoch),
    }?;

    if committed.broadcast {
        state.version += 1;
        if !is_undo {
            state.undo.note_forward_action();
        }
        debug!(
            auction_id = state.config.auction_id,
            command = name,
            version = state.version,
            "committed"
        );
    }

    Ok(committed)
}

fn invalid(command: &'static str, state: &AuctionState) -> AuctionError {
    AuctionError::InvalidTransition {
        command,
        status: state.status,
    }
}

fn handle_start(state: &mut AuctionState) -> HandlerResult<Committed> {
    if state.status != AuctionStatus::Configured {
        return Err(invalid("start", state));
    }
    state.status = AuctionStatus::Live;
    info!(auction_id = state.config.auction_id, "auction live");
    Ok(Committed::broadcast_with(
        TimerDirective::Leave,
        "auction live",
    ))
}

fn handle_pause(
    state: &mut AuctionState,
    now_ms: Millis,
    reason: Option<String>,
) -> HandlerResult<Committed> {
    if state.status != AuctionStatus::Live {
        return Err(invalid("pause", state));
    }
    state.status = AuctionStatus::Paused;
    // Preserve full round state so resume continues seamlessly.
    if let Some(round) = state.round.as_mut() {
        round.remaining_at_pause_ms = Some(round.expires_at_ms.saturating_sub(now_ms));
    }
    info!(
        auction_id = state.config.auction_id,
        reason = reason.as_deref().unwrap_or(""),
        "auction paused"
    );
    Ok(Committed::broadcast_with(
        TimerDirective::Cancel,
        "auction paused",
    ))
}

fn handle_resume(state: &mut AuctionState, now_ms: Millis) -> HandlerResult<Committed> {
    if state.status != AuctionStatus::Paused {
        return Err(invalid("resume", state));
    }
    state.status = AuctionStatus::Live;

    let timer = match state.round.as_mut() {
        Some(round) => {
            let window = match state.config.resume_policy {
                pavilion_types::ResumePolicy::RestartWindow => state.config.bid_window_ms,
                pavilion_types::ResumePolicy::ResumeRemaining => round
                    .remaining_at_pause_ms
                    .unwrap_or(state.config.bid_window_ms),
            };
            round.remaining_at_pause_ms = None;
            round.expires_at_ms = now_ms + window;
            let epoch = state.next_epoch();
            TimerDirective::Arm {
                window_ms: window,
                epoch,
            }
        }
        None => TimerDirective::Leave,
    };

    info!(auction_id = state.config.auction_id, "auction resumed");
    Ok(Committed::broadcast_with(timer, "auction resumed"))
}

fn handle_next_player(state: &mut AuctionState, now_ms: Millis) -> HandlerResult<Committed> {
    if state.status != AuctionStatus::Live {
        return Err(invalid("next_player", state));
    }
    if state.round.is_some() {
        return Err(AuctionError::RoundAlreadyOpen);
    }

    // Advancing closes the disqualify-after-sale correction window.
    state.last_sale = None;

    let Some(player_id) = state.pop_next_queued() else {
        // Pool exhausted: the auction completes automatically.
        state.status = AuctionStatus::Completed;
        info!(
            auction_id = state.config.auction_id,
            "player pool exhausted, auction completed"
        );
        return Ok(Committed::broadcast_with(
            TimerDirective::Cancel,
            "player pool exhausted; auction completed",
        ));
    };

    state.rounds_opened += 1;
    let round_no = state.rounds_opened;
    let window = state.config.bid_window_ms;
    if let Some(player) = state.player_mut(player_id) {
        player.status = PlayerStatus::InBidding;
    }
    state.round = Some(pavilion_types::BiddingRound::open(
        player_id,
        round_no,
        now_ms + window,
    ));
    let epoch = state.next_epoch();

    info!(
        auction_id = state.config.auction_id,
        player_id, round_no, "round opened"
    );
    Ok(Committed::broadcast_with(
        TimerDirective::Arm {
            window_ms: window,
            epoch,
        },
        format!("round {round_no} opened for player {player_id}"),
    ))
}

fn handle_bid(
    state: &mut AuctionState,
    now_ms: Millis,
    team_id: pavilion_types::TeamId,
    amount: pavilion_types::Amount,
) -> HandlerResult<Committed> {
    if state.status != AuctionStatus::Live {
        return Err(invalid("bid", state));
    }
    let round = state.round.as_ref().ok_or(AuctionError::RoundClosed)?;
    let team = state
        .team(team_id)
        .ok_or(AuctionError::TeamNotFound(team_id))?;

    validator::validate_bid(&state.config, team, round, team_id, amount)?;

    // Highest bid, leading team and timer reset commit atomically: nothing
    // else runs against this auction until the handler returns.
    let window = state.config.bid_window_ms;
    let round = state.round.as_mut().ok_or(AuctionError::RoundClosed)?;
    round.current_bid = Some(amount);
    round.leading_team = Some(team_id);
    round.history.push(BidRecord {
        team_id,
        amount,
        timestamp_ms: now_ms,
    });
    round.expires_at_ms = now_ms + window;
    let epoch = state.next_epoch();

    debug!(
        auction_id = state.config.auction_id,
        team_id, amount, "bid accepted"
    );
    Ok(Committed::broadcast_with(
        TimerDirective::Arm {
            window_ms: window,
            epoch,
        },
        format!("bid of {amount} accepted from team {team_id}"),
    ))
}

fn handle_skip(state: &mut AuctionState) -> HandlerResult<Committed> {
    if state.status != AuctionStatus::Live {
        return Err(invalid("skip", state));
    }
    let round = state.round.as_ref().ok_or(AuctionError::RoundClosed)?;
    if round.has_bids() {
        return Err(AuctionError::SkipAfterBid);
    }
    let description = resolve_unsold(state);
    Ok(Committed::broadcast_with(TimerDirective::Cancel, description))
}

fn handle_disqualify(
    state: &mut AuctionState,
    player_id: pavilion_types::PlayerId,
    reason: Option<String>,
) -> HandlerResult<Committed> {
    if state.status != AuctionStatus::Live {
        return Err(invalid("disqualify", state));
    }
    if state.player(player_id).is_none() {
        return Err(AuctionError::PlayerNotFound(player_id));
    }

    // Case 1: the player currently under the hammer. The round is destroyed;
    // no purse was ever debited, so the leading team's provisional
    // reservation is released simply by dropping the round.
    if state.round.as_ref().map(|r| r.player_id) == Some(player_id) {
        state.round = None;
        if let Some(player) = state.player_mut(player_id) {
            player.status = PlayerStatus::Disqualified;
        }
        state.undo.push(UndoEntry::Disqualified { player_id });
        info!(
            auction_id = state.config.auction_id,
            player_id,
            reason = reason.as_deref().unwrap_or(""),
            "in-bidding player disqualified"
        );
        return Ok(Committed::broadcast_with(
            TimerDirective::Cancel,
            format!("player {player_id} disqualified mid-round"),
        ));
    }

    // Case 2: immediate correction of the sale completed this round, valid
    // only until the next `next_player`.
    if let Some(sale) = state.last_sale.filter(|s| s.player_id == player_id) {
        if !state.credit_purse(sale.team_id, sale.price) {
            error!(
                auction_id = state.config.auction_id,
                team_id = sale.team_id,
                "purse credit failed while reversing sale"
            );
        }
        if let Some(team) = state.team_mut(sale.team_id) {
            team.roster.retain(|slot| slot.player_id != player_id);
        }
        if let Some(player) = state.player_mut(player_id) {
            player.status = PlayerStatus::Disqualified;
        }
        state.last_sale = None;
        state.undo.push(UndoEntry::DisqualifiedAfterSale {
            player_id,
            team_id: sale.team_id,
            price: sale.price,
        });
        info!(
            auction_id = state.config.auction_id,
            player_id,
            team_id = sale.team_id,
            reason = reason.as_deref().unwrap_or(""),
            "just-sold player disqualified, sale reversed"
        );
        return Ok(Committed::broadcast_with(
            TimerDirective::Leave,
            format!("player {player_id} disqualified; sale reversed"),
        ));
    }

    Err(AuctionError::DisqualifyWindowClosed(player_id))
}

fn handle_undo(state: &mut AuctionState) -> HandlerResult<Committed> {
    if state.status != AuctionStatus::Live {
        return Err(invalid("undo", state));
    }
    if state.undo.at_consecutive_limit() {
        return Err(AuctionError::UndoLimitReached(MAX_CONSECUTIVE_UNDOS));
    }
    let entry = state.undo.pop().ok_or(AuctionError::UndoUnavailable)?;
    let description = entry.description();

    match entry {
        UndoEntry::Sold {
            player_id,
            team_id,
            price,
        } => {
            if !state.credit_purse(team_id, price) {
                error!(
                    auction_id = state.config.auction_id,
                    team_id, "purse credit failed during undo"
                );
            }
            if let Some(team) = state.team_mut(team_id) {
                team.roster.retain(|slot| slot.player_id != player_id);
            }
            requeue_front(state, player_id);
            if state.last_sale.map(|s| s.player_id) == Some(player_id) {
                state.last_sale = None;
            }
        }
        UndoEntry::Unsold { player_id } | UndoEntry::Disqualified { player_id } => {
            requeue_front(state, player_id);
        }
        UndoEntry::DisqualifiedAfterSale {
            player_id,
            team_id,
            price,
        } => {
            // Restore the sale the disqualification reversed.
            if !state.debit_purse(team_id, price) {
                error!(
                    auction_id = state.config.auction_id,
                    team_id, "purse debit failed during undo"
                );
            }
            if let Some(team) = state.team_mut(team_id) {
                team.roster.push(pavilion_types::RosterSlot { player_id, price });
            }
            if let Some(player) = state.player_mut(player_id) {
                player.status = PlayerStatus::Sold { team_id, price };
            }
            state.last_sale = Some(SaleRecord {
                player_id,
                team_id,
                price,
            });
        }
    }

    state.undo.note_undo();
    info!(
        auction_id = state.config.auction_id,
        undone = %description,
        "undo applied"
    );
    Ok(Committed::broadcast_with(
        TimerDirective::Leave,
        format!("undid {description}"),
    ))
}

fn handle_complete(state: &mut AuctionState, reason: Option<String>) -> HandlerResult<Committed> {
    if !matches!(state.status, AuctionStatus::Live | AuctionStatus::Paused) {
        return Err(invalid("complete", state));
    }
    // A round interrupted by a forced end resolves to nothing: the player
    // returns to the front of the pool with no purse movement.
    if let Some(round) = state.round.take() {
        requeue_front(state, round.player_id);
    }
    state.last_sale = None;
    state.status = AuctionStatus::Completed;
    info!(
        auction_id = state.config.auction_id,
        reason = reason.as_deref().unwrap_or(""),
        "auction completed"
    );
    Ok(Committed::broadcast_with(
        TimerDirective::Cancel,
        "auction completed",
    ))
}

fn handle_announce(state: &AuctionState, message: String) -> HandlerResult<Committed> {
    // Pure broadcast side-effect: no state mutation, no undo, no timer.
    debug!(auction_id = state.config.auction_id, "announcement");
    Ok(Committed {
        timer: TimerDirective::Leave,
        broadcast: false,
        announcement: Some(message),
        description: None,
    })
}

fn handle_open_trade_window(state: &mut AuctionState) -> HandlerResult<Committed> {
    if state.status != AuctionStatus::Completed {
        return Err(invalid("open_trade_window", state));
    }
    state.status = AuctionStatus::TradeWindow;
    Ok(Committed::broadcast_with(
        TimerDirective::Leave,
        "trade window open",
    ))
}

fn handle_finalize(state: &mut AuctionState) -> HandlerResult<Committed> {
    if state.status != AuctionStatus::TradeWindow {
        return Err(invalid("finalize", state));
    }
    state.status = AuctionStatus::Finalized;
    Ok(Committed::broadcast_with(
        TimerDirective::Leave,
        "auction finalized",
    ))
}

fn handle_timer_elapsed(state: &mut AuctionState, epoch: u64) -> HandlerResult<Committed> {
    // A cancelled or superseded arm cycle may still deliver its expiry; the
    // generation check makes it a harmless no-op.
    if state.status != AuctionStatus::Live
        || epoch != state.round_epoch
        || state.round.is_none()
    {
        debug!(
            auction_id = state.config.auction_id,
            epoch,
            current_epoch = state.round_epoch,
            "stale timer expiry ignored"
        );
        return Ok(Committed::noop());
    }

    let has_leader = state
        .round
        .as_ref()
        .map(|r| r.leading_team.is_some())
        .unwrap_or(false);

    let description = if has_leader {
        resolve_sold(state)
    } else {
        resolve_unsold(state)
    };
    Ok(Committed::broadcast_with(TimerDirective::Leave, description))
}

/// Close the round as sold to the leading team at the highest bid.
fn resolve_sold(state: &mut AuctionState) -> String {
    let Some(round) = state.round.take() else {
        return "no round".to_string();
    };
    let player_id = round.player_id;
    let (Some(team_id), Some(price)) = (round.leading_team, round.current_bid) else {
        return "no leading bid".to_string();
    };

    if !state.debit_purse(team_id, price) {
        error!(
            auction_id = state.config.auction_id,
            team_id, price, "purse debit failed on sale; validator invariant broken"
        );
    }
    if let Some(team) = state.team_mut(team_id) {
        team.roster.push(pavilion_types::RosterSlot { player_id, price });
    }
    if let Some(player) = state.player_mut(player_id) {
        player.status = PlayerStatus::Sold { team_id, price };
    }
    state.last_sale = Some(SaleRecord {
        player_id,
        team_id,
        price,
    });
    state.undo.push(UndoEntry::Sold {
        player_id,
        team_id,
        price,
    });

    info!(
        auction_id = state.config.auction_id,
        player_id, team_id, price, "player sold"
    );
    format!("player {player_id} sold to team {team_id} for {price}")
}

/// Close the round as unsold.
fn resolve_unsold(state: &mut AuctionState) -> String {
    let Some(round) = state.round.take() else {
        return "no round".to_string();
    };
    let player_id = round.player_id;
    if let Some(player) = state.player_mut(player_id) {
        player.status = PlayerStatus::Unsold;
    }
    state.undo.push(UndoEntry::Unsold { player_id });

    info!(
        auction_id = state.config.auction_id,
        player_id, "player unsold"
    );
    format!("player {player_id} unsold")
}

/// Return a player to the front of the queue in `Queued` status.
fn requeue_front(state: &mut AuctionState, player_id: pavilion_types::PlayerId) {
    if let Some(player) = state.player_mut(player_id) {
        player.status = PlayerStatus::Queued;
    }
    state.queue.push_front(player_id);
}
