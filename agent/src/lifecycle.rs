//! Attach lifecycle flag.
//!
//! Guards against the load-time hook firing more than once in a process.
//! The flag only moves forward: `Uninitialized -> Attaching -> Active|Failed`.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    /// Claimed by an attach that has not finished yet.
    Attaching,
    Active,
    Failed,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Uninitialized,
            1 => LifecycleState::Attaching,
            2 => LifecycleState::Active,
            _ => LifecycleState::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LifecycleState::Uninitialized => 0,
            LifecycleState::Attaching => 1,
            LifecycleState::Active => 2,
            LifecycleState::Failed => 3,
        }
    }
}

#[derive(Debug, Default)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Claim the right to attach. Only the first caller gets `true`.
    pub fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(
                LifecycleState::Uninitialized.as_u8(),
                LifecycleState::Attaching.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Settle a claimed attach. Has no effect unless the state is `Attaching`.
    pub fn finish(&self, success: bool) {
        let target = if success {
            LifecycleState::Active
        } else {
            LifecycleState::Failed
        };
        let _ = self.state.compare_exchange(
            LifecycleState::Attaching.as_u8(),
            target.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
