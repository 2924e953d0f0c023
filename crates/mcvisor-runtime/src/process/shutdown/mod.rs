//! Forced termination of the supervised server.
//!
//! The normal path is the `stop` console command. This module is the hard
//! path for a server that ignores it: SIGTERM, then SIGKILL after a grace
//! period.

mod child;

pub use child::{DEFAULT_KILL_GRACE, shutdown_child};
