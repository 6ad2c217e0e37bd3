//! Agent configuration, resolved once from the host environment.

use std::path::PathBuf;
use std::time::Duration;

use incprof_protocol::{env, SnapshotNaming};

pub use incprof_protocol::number::parse_number;

use crate::error::ConfigError;

/// Byte offset from `moncontrol` back to glibc's hidden `write_gmon`.
///
/// Found by disassembling the C library by hand (`write_gmon` is emitted
/// directly before `moncontrol`). Only valid for the library builds it was
/// measured on; override with `IPR_GMONOFFSET` elsewhere.
#[cfg(target_arch = "x86_64")]
pub const DEFAULT_SYMBOL_OFFSET: i64 = 0x108d80 - 0x1092b0;

#[cfg(target_arch = "x86")]
pub const DEFAULT_SYMBOL_OFFSET: i64 = 0xf43f0 - 0xf4940;

/// No measured offset for this architecture.
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
pub const DEFAULT_SYMBOL_OFFSET: i64 = 0;

pub const DEFAULT_INTERVAL_SECONDS: u64 = 0;

/// 1/8 second.
pub const DEFAULT_INTERVAL_MICROS: u64 = 125_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub expected_host_name: String,
    pub data_directory: Option<PathBuf>,
    pub symbol_offset: i64,
    pub interval_seconds: u64,
    pub interval_micros: u64,
    pub debug: bool,
}

impl AgentConfig {
    /// Configuration with every option at its default.
    pub fn new(expected_host_name: impl Into<String>) -> Self {
        Self {
            expected_host_name: expected_host_name.into(),
            data_directory: None,
            symbol_offset: DEFAULT_SYMBOL_OFFSET,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            interval_micros: DEFAULT_INTERVAL_MICROS,
            debug: false,
        }
    }

    /// Combined sampling period.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds) + Duration::from_micros(self.interval_micros)
    }

    pub fn naming(&self) -> SnapshotNaming {
        SnapshotNaming::new(self.data_directory.clone())
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<ResolvedConfig, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the configuration from an arbitrary variable lookup.
    ///
    /// Fails only when the identity name is missing. Values that do not
    /// parse keep their default and are listed in `rejected`.
    pub fn from_lookup<F>(lookup: F) -> Result<ResolvedConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup(env::APP_NAME)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingVariable(env::APP_NAME))?;

        let mut config = AgentConfig::new(name);
        let mut rejected = Vec::new();

        config.debug = debug_from(&lookup);
        config.data_directory = lookup(env::DATA_DIR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        if let Some(offset) = numeric(&lookup, env::GMON_OFFSET, &mut rejected) {
            config.symbol_offset = offset;
        }
        if let Some(secs) = non_negative(&lookup, env::SECONDS, &mut rejected) {
            config.interval_seconds = secs;
        }
        if let Some(micros) = non_negative(&lookup, env::USECONDS, &mut rejected) {
            config.interval_micros = micros;
        }

        if config.interval().is_zero() {
            config.interval_seconds = DEFAULT_INTERVAL_SECONDS;
            config.interval_micros = DEFAULT_INTERVAL_MICROS;
            rejected.push(ConfigError::ZeroInterval);
        }

        Ok(ResolvedConfig { config, rejected })
    }
}

/// A resolved configuration together with the values that were ignored.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: AgentConfig,
    pub rejected: Vec<ConfigError>,
}

/// `IPR_DEBUG` is on for any non-zero integer.
pub fn debug_from<F>(lookup: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(env::DEBUG)
        .and_then(|v| parse_number(&v))
        .is_some_and(|v| v != 0)
}

fn numeric<F>(lookup: &F, name: &'static str, rejected: &mut Vec<ConfigError>) -> Option<i64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match parse_number(&raw) {
        Some(v) => Some(v),
        None => {
            rejected.push(ConfigError::InvalidNumber { name, value: raw });
            None
        }
    }
}

fn non_negative<F>(lookup: &F, name: &'static str, rejected: &mut Vec<ConfigError>) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match parse_number(&raw).and_then(|v| u64::try_from(v).ok()) {
        Some(v) => Some(v),
        None => {
            rejected.push(ConfigError::InvalidNumber { name, value: raw });
            None
        }
    }
}
