//! Environment variables understood by the agent.

/// Base name of the executable the agent is allowed to attach to. Required.
pub const APP_NAME: &str = "IPR_APPNAME";

/// Non-zero integer enables diagnostics.
pub const DEBUG: &str = "IPR_DEBUG";

/// Directory that receives snapshot files and the debug log.
pub const DATA_DIR: &str = "IPR_DATADIR";

/// Signed byte offset (decimal or hex) from `moncontrol` to the hidden
/// `write_gmon` routine.
pub const GMON_OFFSET: &str = "IPR_GMONOFFSET";

/// Whole-second component of the sampling period.
pub const SECONDS: &str = "IPR_SECONDS";

/// Microsecond component of the sampling period.
pub const USECONDS: &str = "IPR_USECONDS";

/// Read by glibc's `write_gmon`: output goes to `<prefix>.<pid>` instead of
/// `gmon.out` when set.
pub const GMON_OUT_PREFIX: &str = "GMON_OUT_PREFIX";

/// Log filter for the agent (`env_logger` syntax). Kept apart from
/// `RUST_LOG` so the host's own setting does not leak into the agent.
pub const LOG: &str = "INCPROF_LOG";

/// Explicit path to the agent library, consulted by the CLI.
pub const AGENT_LIB: &str = "INCPROF_AGENT_LIB";

/// All variables the CLI forwards to a launched program.
pub const AGENT_VARS: [&str; 6] = [APP_NAME, DEBUG, DATA_DIR, GMON_OFFSET, SECONDS, USECONDS];
