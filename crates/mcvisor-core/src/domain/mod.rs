//! Core domain types.
//!
//! These types represent the pure domain model, independent of any
//! process or I/O concerns.
//!
//! # Structure
//!
//! - `log_line` - Parsed output lines (`LogLine`, `LogLevel`)
//! - `state` - Live server state and player roster

mod log_line;
mod state;

pub use log_line::{LogLevel, LogLine};
pub use state::{
    Coordinates, PendingPlayerLogin, PlayerSession, ServerState, StateHandle,
};
