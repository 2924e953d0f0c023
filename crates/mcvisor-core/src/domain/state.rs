//! Live server state derived from the log stream.
//!
//! `ServerState` is written only by the state tracker. Everything else
//! reads it through a [`StateHandle`], which hands out clones.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Block coordinates where a player logged in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinates {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A player whose UUID has been assigned but whose login has not been seen yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPlayerLogin {
    pub name: String,
    pub uuid: String,
}

/// A player that completed login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSession {
    pub name: String,
    pub uuid: String,
    pub ip: String,
    pub port: u16,
    pub entity_id: i64,
    pub coordinates: Coordinates,
}

impl PlayerSession {
    /// Promote a pending login with the details from the login line.
    pub fn promote(
        pending: PendingPlayerLogin,
        ip: String,
        port: u16,
        entity_id: i64,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            name: pending.name,
            uuid: pending.uuid,
            ip,
            port,
            entity_id,
            coordinates,
        }
    }
}

/// Everything known about the supervised server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerState {
    pub version: Option<String>,
    pub default_game_mode: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub world: Option<String>,
    /// Spawn preparation progress, 0-100.
    pub prepare_percentage: u8,
    /// Set once by the `Done` line and never cleared.
    pub ready: bool,
    /// Players in login order. Entries are never removed.
    pub players: Vec<PlayerSession>,
}

impl ServerState {
    /// Find a roster entry by exact player name.
    pub fn player(&self, name: &str) -> Option<&PlayerSession> {
        self.players.iter().find(|p| p.name == name)
    }
}

/// Shared read access to a tracker-owned [`ServerState`].
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<ServerState>>,
}

impl StateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> ServerState {
        self.inner.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().ready
    }

    /// Run `f` against the state under the write lock.
    ///
    /// Crate-private: only the tracker mutates state.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut ServerState) -> R) -> R {
        f(&mut self.inner.write())
    }
}
