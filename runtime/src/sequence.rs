use std::sync::atomic::{AtomicU64, Ordering};

use waymark_core::transition::TransitionId;

pub const DEFAULT_TRANSITION_ID_SEED: u64 = 0x1000;

/// Source of transition identifiers owned by a router.
pub trait TransitionSequence: Send + Sync + 'static {
    /// Next identifier; strictly greater than every one returned before.
    fn next_id(&self) -> TransitionId;
}

/// Counter starting at a configurable seed.
#[derive(Debug)]
pub struct MonotonicSequence {
    next: AtomicU64,
}

impl MonotonicSequence {
    pub fn new(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }
}

impl Default for MonotonicSequence {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSITION_ID_SEED)
    }
}

impl TransitionSequence for MonotonicSequence {
    fn next_id(&self) -> TransitionId {
        TransitionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
