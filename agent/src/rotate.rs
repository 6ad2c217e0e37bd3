//! Per-cycle snapshot rotation.
//!
//! Before each flush the agent points `GMON_OUT_PREFIX` at a per-index
//! staging name inside the data directory; afterwards the staged file is
//! renamed to its numbered name. One `rename(2)` within one directory, so an
//! observer sees either the staged file or the numbered one, never neither.
//!
//! Once a cycle is done the prefix moves on to the next index, so a flush
//! the runtime performs on its own (at exit) never lands on a name that was
//! already used.
//!
//! If the runtime ignores the prefix it writes `gmon.out` to its working
//! directory. Only a `gmon.out` inside the data directory is taken as the
//! fallback, so an unrelated one elsewhere is never moved.

use std::path::{Path, PathBuf};

use incprof_protocol::{env, SnapshotNaming};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RotateError {
    #[error("no artifact produced (looked for {} and {})", .staged.display(), .fallback.display())]
    NoArtifact { staged: PathBuf, fallback: PathBuf },

    #[error("cannot move {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Rotator {
    naming: SnapshotNaming,
    pid: u32,
    default_artifact: PathBuf,
}

impl Rotator {
    pub fn new(naming: SnapshotNaming, pid: u32) -> Self {
        Self {
            default_artifact: naming.default_artifact(),
            naming,
            pid,
        }
    }

    /// Point the runtime's next flush at the staging name for `index`.
    ///
    /// The environment is process-global; the host may read it concurrently.
    pub fn prepare(&self, index: u64) {
        std::env::set_var(env::GMON_OUT_PREFIX, self.naming.staging_prefix(index));
    }

    /// Move the artifact of cycle `index` to its numbered name.
    pub fn rotate(&self, index: u64) -> Result<PathBuf, RotateError> {
        let staged = self.naming.staged_artifact(index, self.pid);
        let source = if staged.exists() {
            staged
        } else if self.default_artifact.exists() {
            self.default_artifact.clone()
        } else {
            return Err(RotateError::NoArtifact {
                staged,
                fallback: self.default_artifact.clone(),
            });
        };

        let target = self.naming.snapshot_path(index);
        rename(&source, &target)?;
        Ok(target)
    }
}

fn rename(from: &Path, to: &Path) -> Result<(), RotateError> {
    std::fs::rename(from, to).map_err(|source| RotateError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}
