//! Process runtime for a supervised Minecraft-style server.
//!
//! Owns the child process and connects it to the pure logic in
//! `mcvisor-core`: output is split into lines and fed to the state tracker,
//! commands are written to stdin and correlated with the replies that follow.
//!
//! Most callers only need [`Server`]:
//!
//! ```no_run
//! use mcvisor_runtime::{LaunchConfig, Server, SupervisorSettings};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LaunchConfig::new("java", "/srv/minecraft")
//!     .args(["-jar", "server.jar", "nogui"]);
//! let server = Server::launch(config, SupervisorSettings::with_defaults())?;
//! server.wait_ready().await?;
//! let reply = server.send_probed("say hello").await?;
//! println!("{} ({:?})", reply.message, reply.success);
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]

pub mod command;
pub mod process;
mod server;

pub use command::{CommandChannel, CommandReply, Deadline, SendOptions};
pub use process::{OutputChunk, ProcessStatus, ProcessSupervisor, StreamKind};
pub use server::{LaunchError, Server, ServerBuilder};

// Re-export the core vocabulary so callers need a single dependency.
pub use mcvisor_core::{
    CommandError, FatalCondition, LaunchConfig, ProcessError, ServerEvent, ServerState,
    Subscription, SupervisorSettings, Topic,
};
