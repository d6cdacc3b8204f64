//! Core auction state machine for live player auctions.
//!
//! This crate holds the synchronous heart of the system:
//!
//! - Lifecycle transitions for an auction (configured through finalized)
//! - Bid validation against increment bands, purse and roster rules
//! - Round resolution on timer expiry (sold / unsold)
//! - A bounded undo ledger of inverse snapshots
//!
//! # Architecture
//!
//! - `call`: Command types for state-changing operations
//! - `handlers`: Transition logic applying one command at a time
//! - `validator`: Pure bid acceptance rules
//! - `queries`: Read-only view construction
//! - `state`: In-memory authoritative state
//! - `undo`: Bounded inverse-snapshot ledger
//! - `error`: Error types
//!
//! Everything here is synchronous and single-threaded per auction. The
//! async runtime around it (queues, timers, broadcast) lives in the service
//! crate; timer expiry enters through [`call::AuctionCommand::TimerElapsed`]
//! like any other command, which is what makes round resolution
//! deterministic under concurrent bidding.

pub mod call;
pub mod error;
pub mod handlers;
pub mod queries;
pub mod state;
pub mod undo;
pub mod validator;

pub use call::AuctionCommand;
pub use error::AuctionError;
pub use handlers::{apply, Committed, HandlerResult, TimerDirective};
pub use queries::build_view;
pub use state::{AuctionState, SaleRecord};
pub use undo::{UndoEntry, UndoLedger, MAX_CONSECUTIVE_UNDOS, UNDO_DEPTH};
