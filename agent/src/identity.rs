//! Host identity check.
//!
//! `LD_PRELOAD` is inherited by every child of the launched program, so the
//! agent only proceeds inside the executable named by `IPR_APPNAME`.

use std::path::{Path, PathBuf};

/// Path of the running executable.
pub fn current_executable() -> std::io::Result<PathBuf> {
    match std::fs::read_link("/proc/self/exe") {
        Ok(path) => Ok(path),
        Err(_) => std::env::current_exe(),
    }
}

/// Compare the base name of `executable` against the expected host name.
pub fn is_expected_host(expected: &str, executable: &Path) -> bool {
    executable
        .file_name()
        .is_some_and(|name| name == std::ffi::OsStr::new(expected))
}
