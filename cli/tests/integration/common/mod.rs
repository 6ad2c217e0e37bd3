//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use incprof_protocol::platform::agent_lib_name;

/// Path of the CLI binary under test.
pub fn incprof_bin() -> &'static str {
    env!("CARGO_BIN_EXE_incprof")
}

/// Run the CLI in `cwd` with a clean agent environment.
pub fn run_incprof(cwd: &Path, args: &[&str]) -> Output {
    Command::new(incprof_bin())
        .args(args)
        .current_dir(cwd)
        .env_remove("INCPROF_AGENT_LIB")
        .env_remove("LD_PRELOAD")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run incprof")
}

/// Run the CLI in `cwd` with `INCPROF_AGENT_LIB` pointing at `agent_lib`.
pub fn run_incprof_with_agent(cwd: &Path, agent_lib: &Path, args: &[&str]) -> Output {
    Command::new(incprof_bin())
        .args(args)
        .current_dir(cwd)
        .env("INCPROF_AGENT_LIB", agent_lib)
        .env_remove("LD_PRELOAD")
        .env_remove("RUST_LOG")
        .env_remove("INCPROF_LOG")
        .output()
        .expect("failed to run incprof")
}

/// Agent library from the same cargo build as the test binary, if built.
pub fn agent_library() -> Option<PathBuf> {
    let deps = std::env::current_exe().ok()?.parent()?.to_path_buf();
    let profile = deps.parent()?.to_path_buf();
    [profile.join(agent_lib_name()), deps.join(agent_lib_name())]
        .into_iter()
        .find(|p| p.exists())
}

/// A file the dynamic loader rejects and skips, so the launcher can be
/// exercised without any agent code running.
pub fn inert_agent(dir: &Path) -> PathBuf {
    let path = dir.join("libinert.so");
    std::fs::write(&path, b"").unwrap();
    path
}

/// Compile `source` with `cc -pg` into `dir`. None when no compiler works.
pub fn compile_profiled(dir: &Path, name: &str, source: &str) -> Option<PathBuf> {
    let src = dir.join(format!("{}.c", name));
    let exe = dir.join(name);
    std::fs::write(&src, source).unwrap();
    let status = Command::new("cc")
        .arg("-pg")
        .arg("-O0")
        .arg("-o")
        .arg(&exe)
        .arg(&src)
        .status()
        .ok()?;
    status.success().then_some(exe)
}

/// Stdout and stderr combined, for assertions that do not care which.
pub fn combined(output: &Output) -> String {
    format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

/// First C library found in the usual locations.
pub fn system_libc() -> Option<&'static Path> {
    [
        "/lib/x86_64-linux-gnu/libc.so.6",
        "/usr/lib/x86_64-linux-gnu/libc.so.6",
        "/lib64/libc.so.6",
        "/usr/lib64/libc.so.6",
        "/lib/i386-linux-gnu/libc.so.6",
        "/lib/aarch64-linux-gnu/libc.so.6",
    ]
    .into_iter()
    .map(Path::new)
    .find(|p| p.exists())
}
