// crates/sync-types/src/lifecycle.rs
//
// The decoder worker state machine from spec.md §4.2, lifted out of the
// worker itself so both sync-decode's generic worker and its subtitle
// worker (which doesn't fit the generic Handler shape — see spec.md §4.5)
// can share one atomic representation and one set of transition rules.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Running = 0,
    Flushing = 1,
    Closing = 2,
    Closed = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Running,
            1 => LifecycleState::Flushing,
            2 => LifecycleState::Closing,
            _ => LifecycleState::Closed,
        }
    }
}

/// Atomic cell holding a `LifecycleState`. State transitions are observed
/// via this atomic on the worker's next loop iteration — they are never
/// synchronized with an in-flight `handle()` call (spec.md §5).
pub struct LifecycleCell(AtomicU8);

impl LifecycleCell {
    pub fn new(initial: LifecycleState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn load(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for LifecycleCell {
    fn default() -> Self {
        Self::new(LifecycleState::Running)
    }
}
