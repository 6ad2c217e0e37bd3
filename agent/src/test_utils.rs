//! Shared test utilities for the agent crate.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};

use incprof_protocol::env;

use crate::locator::{EntryPoint, ResolvedEntryPoint, SymbolResolver};

/// Process-global lock for tests that write `GMON_OUT_PREFIX` or run a
/// sampler. The environment is shared by every test thread.
pub fn lock_env() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// Flush routine that behaves like glibc's `write_gmon`: writes
/// `$GMON_OUT_PREFIX.<pid>`, or `gmon.out` when the prefix is unset.
/// The file holds the prefix's base name so tests can spot overwrites.
pub fn gmon_emulator() -> ResolvedEntryPoint {
    ResolvedEntryPoint::Resolved(EntryPoint::from_fn(|| {
        let (path, content) = match std::env::var_os(env::GMON_OUT_PREFIX) {
            Some(prefix) => {
                let prefix = PathBuf::from(prefix);
                let name = prefix
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut path = prefix.into_os_string();
                path.push(format!(".{}", std::process::id()));
                (PathBuf::from(path), name)
            }
            None => (PathBuf::from("gmon.out"), String::new()),
        };
        let _ = std::fs::write(path, content);
    }))
}

/// Resolver returning a fixed outcome and recording the requested offset.
pub struct StubResolver {
    entry: ResolvedEntryPoint,
    pub requested: Mutex<Vec<i64>>,
}

impl StubResolver {
    pub fn new(entry: ResolvedEntryPoint) -> Self {
        Self {
            entry,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn unresolved() -> Self {
        Self::new(ResolvedEntryPoint::Unresolved {
            anchor: "moncontrol".to_string(),
            reason: "stubbed out".to_string(),
        })
    }
}

impl SymbolResolver for StubResolver {
    fn resolve(&self, offset: i64) -> ResolvedEntryPoint {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(offset);
        self.entry.clone()
    }
}
