//! Names shared between the incprof agent and the incprof CLI.
//!
//! The agent is configured purely through the environment of the host
//! process, so the CLI and the agent must agree on variable names and on
//! the layout of the files the agent leaves behind.

pub mod env;
pub mod number;
pub mod platform;
pub mod snapshot;

pub use snapshot::SnapshotNaming;
