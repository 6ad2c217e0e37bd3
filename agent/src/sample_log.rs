//! Debug-only sample log (`ipr.log`).

use std::ffi::CStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Appends one line per sample: `sample <index> at <seconds> (<ctime>)`.
#[derive(Debug, Clone)]
pub struct SampleLog {
    path: PathBuf,
    start: Instant,
}

impl SampleLog {
    /// Seconds in each line are measured from `start`.
    pub fn new(path: impl Into<PathBuf>, start: Instant) -> Self {
        Self {
            path: path.into(),
            start,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, index: u64) -> std::io::Result<()> {
        let elapsed = self.start.elapsed().as_secs_f64();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "sample {} at {:.6} ({})", index, elapsed, wall_clock())
    }
}

/// Current local time as `ctime(3)` formats it, without the newline.
fn wall_clock() -> String {
    let mut buf = [0 as libc::c_char; 64];
    unsafe {
        let now = libc::time(std::ptr::null_mut());
        if libc::ctime_r(&now, buf.as_mut_ptr()).is_null() {
            return String::from("?");
        }
        CStr::from_ptr(buf.as_ptr())
            .to_string_lossy()
            .trim_end()
            .to_string()
    }
}
