//! Names needed to inject the agent into a child process.
//!
//! The agent starts from an `.init_array` constructor, so only ELF systems
//! with a preloading dynamic loader are covered.

use std::path::PathBuf;

/// Read by the dynamic loader for libraries mapped ahead of the program's own.
pub const PRELOAD_ENV_VAR: &str = "LD_PRELOAD";

/// Crate name of the agent, as cargo spells it in artifact names.
const AGENT_ARTIFACT_STEM: &str = "incprof_agent";

/// File name of the built agent library.
pub fn agent_lib_name() -> String {
    format!("lib{}.so", AGENT_ARTIFACT_STEM)
}

/// System directories searched once the build tree comes up empty.
pub fn installed_lib_paths() -> Vec<PathBuf> {
    ["/usr/local/lib", "/usr/lib"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}
