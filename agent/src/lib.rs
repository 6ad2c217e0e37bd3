//! incprof agent - injected into a gprof-instrumented process to take
//! periodic profile snapshots.
//!
//! This library is compiled as a cdylib and loaded into the target process
//! via LD_PRELOAD. Its load-time constructor checks that it landed in the
//! intended executable, locates glibc's hidden `write_gmon` routine and
//! starts a background thread that calls it on a fixed interval, renaming
//! each result to `gmon-<n>.out`.
//!
//! Nothing here may take the host down: every failure disables sampling
//! and is reported on stderr, never propagated.

pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod locator;
pub mod logging;
pub mod native;
pub mod rotate;
pub mod sample_log;
pub mod sampler;

#[cfg(test)]
mod test_utils;

use std::path::Path;
use std::sync::{LazyLock, OnceLock};
use std::time::Instant;

use log::{debug, error, info, warn};

pub use config::AgentConfig;
pub use error::{AgentError, ConfigError, Result};
pub use lifecycle::LifecycleState;
pub use locator::{DlsymResolver, EntryPoint, ResolvedEntryPoint, SymbolResolver};
pub use sampler::{SamplerExit, SamplerHandle};

use crate::lifecycle::Lifecycle;
use crate::sampler::Sampler;

/// Attach controller. One per process in production; tests build their own.
pub struct Agent<R: SymbolResolver = DlsymResolver> {
    lifecycle: Lifecycle,
    resolver: R,
}

impl<R: SymbolResolver> Agent<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            resolver,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Attach to the current process if `executable` is the expected host.
    ///
    /// Only the first call can succeed; later calls return
    /// `AgentError::AlreadyAttached` without side effects.
    pub fn attach(&self, config: AgentConfig, executable: &Path) -> Result<AgentHandle> {
        if !self.lifecycle.try_claim() {
            return Err(AgentError::AlreadyAttached);
        }
        let result = self.start(config, executable);
        self.lifecycle.finish(result.is_ok());
        result
    }

    /// Attach using the process environment and `/proc/self/exe`.
    pub fn attach_from_env(&self) -> Result<AgentHandle> {
        let resolved = AgentConfig::from_env()?;
        for rejected in &resolved.rejected {
            debug!("{}", rejected);
        }
        let executable = identity::current_executable().map_err(AgentError::ExecutablePath)?;
        self.attach(resolved.config, &executable)
    }

    fn start(&self, config: AgentConfig, executable: &Path) -> Result<AgentHandle> {
        if !identity::is_expected_host(&config.expected_host_name, executable) {
            return Err(AgentError::IdentityMismatch {
                expected: config.expected_host_name,
                actual: executable.to_path_buf(),
            });
        }
        debug!("Attaching to {}", executable.display());

        let entry = self.resolver.resolve(config.symbol_offset).into_result()?;
        debug!("Flush routine resolved: {:?}", entry);

        let handle = Sampler::new(&config, ResolvedEntryPoint::Resolved(entry), Instant::now())
            .spawn()?;
        info!(
            "Sampling every {:?} into {}",
            config.interval(),
            config
                .data_directory
                .as_deref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| ".".to_string())
        );

        Ok(AgentHandle {
            config,
            sampler: handle,
        })
    }
}

/// A running agent. Keep it alive for as long as sampling should continue.
pub struct AgentHandle {
    config: AgentConfig,
    sampler: SamplerHandle,
}

impl AgentHandle {
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Completed sample cycles so far.
    pub fn samples(&self) -> u64 {
        self.sampler.samples()
    }

    /// Stop sampling and wait for the worker to finish its current cycle.
    pub fn stop(self) -> SamplerExit {
        self.sampler.stop()
    }
}

/// Unload-time counterpart of [`Agent::attach`].
///
/// Sampling is left running until the process exits and no final flush is
/// attempted. The runtime's own exit-time flush follows `GMON_OUT_PREFIX`,
/// which by then names the next unused index, so it lands in
/// `gmon-<n>.<pid>` for the launcher to rename.
pub fn detach(handle: &AgentHandle) {
    debug!(
        "Detaching after {} samples (no final flush)",
        handle.samples()
    );
}

/// Agent used by the load-time hooks.
static AGENT: LazyLock<Agent> = LazyLock::new(|| Agent::new(DlsymResolver::default()));

/// Handle of the process-wide agent. Never dropped.
static HANDLE: OnceLock<AgentHandle> = OnceLock::new();

fn report(err: &AgentError) {
    match err {
        AgentError::Config(_) | AgentError::AlreadyAttached => debug!("Not attaching: {}", err),
        AgentError::IdentityMismatch { .. } | AgentError::ExecutablePath(_) => {
            warn!("Not attaching: {}", err)
        }
        AgentError::Unresolved { .. } => {
            error!("{}; interval profiling will not be performed", err)
        }
        AgentError::WorkerSpawn(_) => error!("{}", err),
    }
}

/// Agent entry point called when the library is loaded.
///
/// Returns 0 when sampling started, -1 otherwise. Never unwinds into the
/// caller.
#[unsafe(no_mangle)]
pub extern "C" fn incprof_agent_init() -> i32 {
    let outcome = std::panic::catch_unwind(|| {
        logging::init(config::debug_from(&|name: &str| std::env::var(name).ok()));

        match AGENT.attach_from_env() {
            Ok(handle) => {
                if HANDLE.set(handle).is_err() {
                    warn!("Agent handle already stored");
                }
                0
            }
            Err(e) => {
                report(&e);
                -1
            }
        }
    });
    outcome.unwrap_or(-1)
}

/// Agent exit point called when the library is unloaded.
#[unsafe(no_mangle)]
pub extern "C" fn incprof_agent_fini() {
    let _ = std::panic::catch_unwind(|| {
        if let Some(handle) = HANDLE.get() {
            detach(handle);
        }
    });
}

/// Constructor attribute for automatic initialization on library load (Linux).
#[cfg(all(target_os = "linux", not(test)))]
#[unsafe(link_section = ".init_array")]
#[used]
static INIT: extern "C" fn() = {
    extern "C" fn init() {
        incprof_agent_init();
    }
    init
};

/// Destructor run when the library is unloaded or the process exits (Linux).
#[cfg(all(target_os = "linux", not(test)))]
#[unsafe(link_section = ".fini_array")]
#[used]
static FINI: extern "C" fn() = {
    extern "C" fn fini() {
        incprof_agent_fini();
    }
    fini
};
