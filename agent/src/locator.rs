//! Locating the runtime's hidden flush routine.
//!
//! glibc never exports `write_gmon`, the routine that serializes gprof
//! counters to disk. It does export `moncontrol`, and in the library builds
//! we target `write_gmon` is emitted immediately before it, so the flush
//! routine is `moncontrol + offset` for a build-specific negative offset.

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::error::AgentError;
use crate::native;

/// Exported anchor symbol of glibc's profiling support.
pub const FLUSH_ANCHOR: &str = "moncontrol";

/// Signature of `write_gmon`.
pub type FlushFn = unsafe extern "C" fn();

/// An invocable flush routine.
#[derive(Clone)]
pub struct EntryPoint {
    address: usize,
    invoke: Arc<dyn Fn() + Send + Sync>,
}

impl EntryPoint {
    /// Wrap a raw code address.
    ///
    /// # Safety
    /// `address` must be the start of a function with signature `FlushFn`
    /// that stays mapped for as long as the entry point is used.
    pub unsafe fn from_address(address: usize) -> Self {
        let f: FlushFn = std::mem::transmute::<usize, FlushFn>(address);
        Self {
            address,
            invoke: Arc::new(move || unsafe { f() }),
        }
    }

    /// Wrap a Rust closure. The reported address is 0.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            address: 0,
            invoke: Arc::new(f),
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn invoke(&self) {
        (self.invoke)()
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint({:#x})", self.address)
    }
}

/// Outcome of a resolution attempt. Never re-resolved.
#[derive(Debug, Clone)]
pub enum ResolvedEntryPoint {
    Resolved(EntryPoint),
    Unresolved { anchor: String, reason: String },
}

impl ResolvedEntryPoint {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolvedEntryPoint::Resolved(_))
    }

    pub fn into_result(self) -> Result<EntryPoint, AgentError> {
        match self {
            ResolvedEntryPoint::Resolved(entry) => Ok(entry),
            ResolvedEntryPoint::Unresolved { anchor, reason } => {
                Err(AgentError::Unresolved { anchor, reason })
            }
        }
    }
}

/// Capability to find the flush routine given a byte offset.
pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, offset: i64) -> ResolvedEntryPoint;
}

/// Production resolver: `dlsym(RTLD_DEFAULT, anchor) + offset`.
#[derive(Debug, Clone)]
pub struct DlsymResolver {
    anchor: String,
}

impl DlsymResolver {
    pub fn new(anchor: impl Into<String>) -> Self {
        Self {
            anchor: anchor.into(),
        }
    }

    fn unresolved(&self, reason: impl Into<String>) -> ResolvedEntryPoint {
        ResolvedEntryPoint::Unresolved {
            anchor: self.anchor.clone(),
            reason: reason.into(),
        }
    }
}

impl Default for DlsymResolver {
    fn default() -> Self {
        Self::new(FLUSH_ANCHOR)
    }
}

impl SymbolResolver for DlsymResolver {
    fn resolve(&self, offset: i64) -> ResolvedEntryPoint {
        if offset == 0 {
            return self.unresolved("offset is zero (no known offset for this platform)");
        }
        let Ok(delta) = isize::try_from(offset) else {
            return self.unresolved(format!("offset {} out of range", offset));
        };

        let anchor = match native::find_global_export(&self.anchor) {
            Ok(addr) => addr,
            Err(e) => return self.unresolved(e),
        };

        let target = (anchor as *const u8).wrapping_offset(delta) as usize;
        debug!(
            "{} at {:#x} ({}), flush routine at {:#x} (offset {})",
            self.anchor,
            anchor,
            native::describe_address(anchor).unwrap_or_else(|| "?".to_string()),
            target,
            offset
        );

        // Safety: the offset is trusted configuration; a wrong value is the
        // operator's responsibility, exactly as with the hand-measured default.
        ResolvedEntryPoint::Resolved(unsafe { EntryPoint::from_address(target) })
    }
}
