//! Shared termination signal.
//!
//! A one-way flag: unset at the start of a run, set once by the execution
//! environment, never reset. Messengers only get a read-only observer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Writer side of the termination flag.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal {
    flag: Arc<AtomicBool>,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cooperative shutdown. Idempotent.
    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// A read-only view for workers.
    pub fn observer(&self) -> TerminationObserver {
        TerminationObserver {
            flag: Arc::clone(&self.flag),
        }
    }
}

/// Read-only side of the termination flag.
#[derive(Debug, Clone)]
pub struct TerminationObserver {
    flag: Arc<AtomicBool>,
}

impl TerminationObserver {
    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
