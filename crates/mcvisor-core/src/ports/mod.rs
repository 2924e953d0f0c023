//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from infrastructure.
//! They contain no implementation details and use only domain types.

mod command_sink;
mod launch;

pub use command_sink::CommandSink;
pub use launch::LaunchConfig;
