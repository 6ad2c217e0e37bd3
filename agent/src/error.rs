use std::path::PathBuf;

use thiserror::Error;

/// Every reason the agent can decline to sample.
///
/// None of these reach the host: the load-time shim logs them and returns.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot determine executable path: {0}")]
    ExecutablePath(#[source] std::io::Error),

    #[error("wrong executable '{}' (expected '{expected}')", .actual.display())]
    IdentityMismatch { expected: String, actual: PathBuf },

    #[error("agent already attached")]
    AlreadyAttached,

    #[error("unable to resolve flush routine via '{anchor}': {reason}")]
    Unresolved { anchor: String, reason: String },

    #[error("cannot start sampler thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} missing")]
    MissingVariable(&'static str),

    #[error("invalid value for {name}: '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    #[error("sampling period is zero, using the default")]
    ZeroInterval,
}

pub type Result<T> = std::result::Result<T, AgentError>;
