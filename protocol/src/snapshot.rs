//! Snapshot file naming.
//!
//! Every sample cycle stages the runtime's output under a per-index prefix
//! and then renames it to `gmon-<index>.out`, both inside the configured
//! data directory so the rename never crosses a filesystem.

use std::path::{Path, PathBuf};

/// Name glibc writes to when `GMON_OUT_PREFIX` is unset or unusable.
pub const DEFAULT_ARTIFACT: &str = "gmon.out";

/// Stem shared by staged and numbered snapshot files.
pub const SNAPSHOT_STEM: &str = "gmon";

/// Extension of numbered snapshot files.
pub const SNAPSHOT_EXTENSION: &str = "out";

/// Append-only debug log written when diagnostics are enabled.
pub const DEBUG_LOG: &str = "ipr.log";

/// Resolves every path the agent produces for a given data directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnapshotNaming {
    dir: Option<PathBuf>,
}

impl SnapshotNaming {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    fn join(&self, name: String) -> PathBuf {
        match &self.dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Value for `GMON_OUT_PREFIX` during cycle `index`.
    pub fn staging_prefix(&self, index: u64) -> PathBuf {
        self.join(format!("{}-{}", SNAPSHOT_STEM, index))
    }

    /// File glibc writes for `staging_prefix(index)` in process `pid`.
    pub fn staged_artifact(&self, index: u64, pid: u32) -> PathBuf {
        self.join(format!("{}-{}.{}", SNAPSHOT_STEM, index, pid))
    }

    /// Final, numbered snapshot name for cycle `index`.
    pub fn snapshot_path(&self, index: u64) -> PathBuf {
        self.join(snapshot_file_name(index))
    }

    /// Where the runtime writes when it ignores the prefix, restricted to the
    /// data directory so it is renamed without leaving it.
    pub fn default_artifact(&self) -> PathBuf {
        self.join(DEFAULT_ARTIFACT.to_string())
    }

    pub fn debug_log_path(&self) -> PathBuf {
        self.join(DEBUG_LOG.to_string())
    }
}

/// `gmon-<index>.out`
pub fn snapshot_file_name(index: u64) -> String {
    format!("{}-{}.{}", SNAPSHOT_STEM, index, SNAPSHOT_EXTENSION)
}

/// Inverse of [`snapshot_file_name`]. Staged files and the debug log do not
/// match.
pub fn parse_snapshot_index(file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(SNAPSHOT_STEM)?.strip_prefix('-')?;
    let digits = rest
        .strip_suffix(SNAPSHOT_EXTENSION)?
        .strip_suffix('.')?;
    if !all_digits(digits) {
        return None;
    }
    digits.parse().ok()
}

/// Index and pid of a staged `gmon-<index>.<pid>` file.
pub fn parse_staged_artifact(file_name: &str) -> Option<(u64, u32)> {
    let rest = file_name.strip_prefix(SNAPSHOT_STEM)?.strip_prefix('-')?;
    let (index, pid) = rest.split_once('.')?;
    if !all_digits(index) || !all_digits(pid) {
        return None;
    }
    Some((index.parse().ok()?, pid.parse().ok()?))
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Staged files never renamed, such as the runtime's exit-time dump.
/// Sorted by index, then pid.
pub fn list_staged(dir: &Path) -> std::io::Result<Vec<(u64, u32, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some((index, pid)) = name.to_str().and_then(parse_staged_artifact) {
            found.push((index, pid, entry.path()));
        }
    }
    found.sort_by_key(|(index, pid, _)| (*index, *pid));
    Ok(found)
}

/// Numbered snapshots in `dir`, sorted by index.
pub fn list_snapshots(dir: &Path) -> std::io::Result<Vec<(u64, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(parse_snapshot_index) {
            found.push((index, entry.path()));
        }
    }
    found.sort_by_key(|(index, _)| *index);
    Ok(found)
}
