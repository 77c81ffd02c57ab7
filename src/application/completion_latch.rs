//! One-shot completion latch.
//!
//! Every detection path (sentinel line, structured result, process exit)
//! asks the latch before acting. Exactly one caller per run wins; everyone
//! after it sees `false` and must do nothing.

use std::sync::atomic::{AtomicBool, Ordering};

/// Single-use guard around reconciliation for one run.
#[derive(Debug, Default)]
pub struct CompletionLatch {
    fired: AtomicBool,
}

impl CompletionLatch {
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Claim the latch. Returns `true` for the first caller only.
    pub fn try_fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
