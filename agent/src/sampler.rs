//! Background sampling loop.
//!
//! One worker thread per attached agent. Each cycle points the runtime at a
//! fresh staging name, calls the flush routine, renames the result and then
//! waits for the interval. Cycles are strictly sequential, so cycle N's
//! rename finishes before cycle N+1's flush starts.
//!
//! Between cycles the prefix already names the next index. The runtime's
//! own flush at exit therefore leaves `gmon-<n>.<pid>` for an unused `n`,
//! which the launcher renames once the host is gone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::locator::{EntryPoint, ResolvedEntryPoint};
use crate::rotate::Rotator;
use crate::sample_log::SampleLog;

/// Name of the worker thread.
pub const THREAD_NAME: &str = "incprof-sampler";

/// Why the worker returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerExit {
    /// Stopped by its handle after this many cycles.
    Stopped(u64),
    /// No flush routine; exited without sampling.
    Unresolved,
}

pub struct Sampler {
    entry: ResolvedEntryPoint,
    interval: Duration,
    rotator: Rotator,
    log: Option<SampleLog>,
    samples: Arc<AtomicU64>,
}

impl Sampler {
    pub fn new(config: &AgentConfig, entry: ResolvedEntryPoint, start: Instant) -> Self {
        let naming = config.naming();
        let log = config
            .debug
            .then(|| SampleLog::new(naming.debug_log_path(), start));
        Self {
            entry,
            interval: config.interval(),
            rotator: Rotator::new(naming, std::process::id()),
            log,
            samples: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the worker thread.
    pub fn spawn(self) -> Result<SamplerHandle, AgentError> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let samples = self.samples.clone();
        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || self.run(stop_rx))
            .map_err(AgentError::WorkerSpawn)?;

        Ok(SamplerHandle {
            stop_tx,
            thread,
            samples,
        })
    }

    fn run(self, stop_rx: Receiver<()>) -> SamplerExit {
        let entry = match &self.entry {
            ResolvedEntryPoint::Resolved(entry) => entry.clone(),
            ResolvedEntryPoint::Unresolved { anchor, reason } => {
                error!(
                    "Unable to find flush routine via {} ({}), interval profiling will not be performed",
                    anchor, reason
                );
                return SamplerExit::Unresolved;
            }
        };

        let mut index: u64 = 0;
        loop {
            self.cycle(&entry, index);
            index += 1;
            self.samples.store(index, Ordering::Release);

            match stop_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!("Sampler stopped after {} samples", index);
        SamplerExit::Stopped(index)
    }

    fn cycle(&self, entry: &EntryPoint, index: u64) {
        self.rotator.prepare(index);
        entry.invoke();

        match self.rotator.rotate(index) {
            Ok(path) => debug!("sample {} written to {}", index, path.display()),
            Err(e) => debug!("sample {}: {}", index, e),
        }
        self.rotator.prepare(index + 1);

        if let Some(log) = &self.log {
            if let Err(e) = log.record(index) {
                debug!("sample {}: cannot append to {}: {}", index, log.path().display(), e);
            }
        }
    }
}

/// Owner of a running sampler. Dropping it lets the worker exit after its
/// current wait.
pub struct SamplerHandle {
    stop_tx: Sender<()>,
    thread: JoinHandle<SamplerExit>,
    samples: Arc<AtomicU64>,
}

impl SamplerHandle {
    /// Completed sample cycles so far.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stop the worker and wait for it.
    pub fn stop(self) -> SamplerExit {
        let _ = self.stop_tx.send(());
        match self.thread.join() {
            Ok(exit) => exit,
            Err(_) => SamplerExit::Stopped(self.samples.load(Ordering::Acquire)),
        }
    }
}
