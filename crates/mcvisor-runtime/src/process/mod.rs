//! Process supervision for the server child.
//!
//! # Structure
//!
//! - `ProcessSupervisor` - Spawning, serialized stdin writes, lifecycle status
//! - `OutputChunk` / `StreamKind` - Raw output as read from stdout/stderr
//! - `ProcessStatus` - Started/exited signals
//! - `shutdown` - SIGTERM → SIGKILL escalation for forced stops

mod core;
mod events;
pub mod shutdown;
mod stream;
mod types;

pub use core::ProcessSupervisor;
pub use events::ProcessStatus;
pub use shutdown::shutdown_child;
pub use types::{OutputChunk, StreamKind};
