//! Spawn a process with the agent library preloaded.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use incprof_protocol::platform::{agent_lib_name, installed_lib_paths, PRELOAD_ENV_VAR};
use incprof_protocol::{env, snapshot, SnapshotNaming};

use crate::offset;

/// Agent settings chosen on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub app_name: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub offset: Option<i64>,
    pub seconds: Option<u64>,
    pub useconds: Option<u64>,
    pub debug: bool,
}

/// Find the agent library path.
fn find_agent_library() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(env::AGENT_LIB) {
        let p = Path::new(&path);
        if p.exists() {
            return p
                .canonicalize()
                .with_context(|| format!("Failed to canonicalize path: {}", path));
        }
        warn!("{} points to missing file {}", env::AGENT_LIB, path);
    }

    let lib_name = agent_lib_name();

    let mut candidates: Vec<PathBuf> = vec![
        // Development builds (relative to CWD)
        format!("./target/release/{}", lib_name).into(),
        format!("./target/debug/{}", lib_name).into(),
    ];

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            // Built alongside the CLI in the same target directory
            candidates.push(exe_dir.join(&lib_name));
            // {prefix}/bin/../lib/ -> {prefix}/lib/
            candidates.push(exe_dir.join("..").join("lib").join(&lib_name));
        }
    }

    for install_path in installed_lib_paths() {
        candidates.push(install_path.join(&lib_name));
    }

    for candidate in &candidates {
        if candidate.exists() {
            // Return absolute path (required for preloading)
            return candidate
                .canonicalize()
                .with_context(|| format!("Failed to canonicalize path: {:?}", candidate));
        }
    }

    anyhow::bail!(
        "Agent library not found. Build with 'cargo build --release' or set {}",
        env::AGENT_LIB
    )
}

/// Base name the agent compares against `/proc/self/exe`.
fn default_app_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}

/// Prepend the agent to an existing preload list.
fn preload_value(agent_lib: &Path, existing: Option<&str>) -> String {
    match existing {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{}:{}", agent_lib.display(), existing)
        }
        _ => agent_lib.display().to_string(),
    }
}

/// Environment variables that configure the agent for `program`.
fn agent_environment(options: &RunOptions, program: &str) -> Vec<(&'static str, String)> {
    let mut vars = vec![(
        env::APP_NAME,
        options
            .app_name
            .clone()
            .unwrap_or_else(|| default_app_name(program)),
    )];
    if options.debug {
        vars.push((env::DEBUG, "1".to_string()));
    }
    if let Some(dir) = &options.data_dir {
        vars.push((env::DATA_DIR, dir.display().to_string()));
    }
    if let Some(offset) = options.offset {
        vars.push((env::GMON_OFFSET, offset.to_string()));
    }
    if let Some(seconds) = options.seconds {
        vars.push((env::SECONDS, seconds.to_string()));
    }
    if let Some(useconds) = options.useconds {
        vars.push((env::USECONDS, useconds.to_string()));
    }
    vars
}

/// Offset of `write_gmon` in the C library this process maps.
fn detect_offset() -> Result<i64> {
    let libc = offset::mapped_libc()?;
    let data =
        std::fs::read(&libc).with_context(|| format!("Failed to read {}", libc.display()))?;
    let report = offset::find_offset(&data, offset::DEFAULT_ANCHOR)
        .with_context(|| format!("No offset found in {}", libc.display()))?;
    debug!("{}: {}", libc.display(), report.to_string().trim_end());
    Ok(report.offset())
}

/// Give every staged file left in `dir` a numbered name: its own index
/// when free, the next index after the highest snapshot otherwise.
fn adopt_leftovers(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut taken: BTreeSet<u64> = snapshot::list_snapshots(dir)
        .with_context(|| format!("Cannot list {}", dir.display()))?
        .into_iter()
        .map(|(index, _)| index)
        .collect();
    let naming = SnapshotNaming::new(Some(dir.to_path_buf()));

    let mut adopted = Vec::new();
    for (index, pid, staged) in snapshot::list_staged(dir)? {
        let index = if taken.contains(&index) {
            taken.last().map_or(0, |last| last + 1)
        } else {
            index
        };
        let target = naming.snapshot_path(index);
        std::fs::rename(&staged, &target).with_context(|| {
            format!("Failed to move {} to {}", staged.display(), target.display())
        })?;
        debug!("Final dump of pid {} stored as {}", pid, target.display());
        taken.insert(index);
        adopted.push(target);
    }
    Ok(adopted)
}

/// Run `program` under the agent, wait for it and return its exit code.
pub fn run(options: &RunOptions, program: &[String]) -> Result<i32> {
    let (exe, args) = program
        .split_first()
        .context("No program given")?;

    let mut options = options.clone();
    if let Some(dir) = &options.data_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        // The program may change directory; give the agent an absolute path.
        options.data_dir = Some(
            dir.canonicalize()
                .with_context(|| format!("Failed to canonicalize path: {}", dir.display()))?,
        );
    }

    let agent_lib = find_agent_library()?;
    debug!("Agent library: {}", agent_lib.display());

    if options.offset.is_none() {
        match detect_offset() {
            Ok(found) => {
                info!("Using write_gmon offset {}", found);
                options.offset = Some(found);
            }
            Err(e) => warn!(
                "Cannot determine the write_gmon offset ({:#}); the agent falls back to its built-in value",
                e
            ),
        }
    }

    let mut cmd = Command::new(exe);
    cmd.args(args);
    for name in env::AGENT_VARS {
        cmd.env_remove(name);
    }
    for (name, value) in agent_environment(&options, exe) {
        debug!("{}={}", name, value);
        cmd.env(name, value);
    }
    let existing = std::env::var(PRELOAD_ENV_VAR).ok();
    cmd.env(
        PRELOAD_ENV_VAR,
        preload_value(&agent_lib, existing.as_deref()),
    );

    let status = cmd
        .status()
        .with_context(|| format!("Failed to spawn {}", exe))?;
    debug!("{} exited with {}", exe, status);

    let dir = options
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    if let Err(e) = adopt_leftovers(&dir) {
        warn!("{:#}", e);
    }
    match snapshot::list_snapshots(&dir) {
        Ok(found) if found.is_empty() => warn!("No snapshots in {}", dir.display()),
        Ok(found) => info!("{} snapshots in {}", found.len(), dir.display()),
        Err(e) => warn!("Cannot list {}: {}", dir.display(), e),
    }

    Ok(exit_code(status))
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
