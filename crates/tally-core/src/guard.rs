//! Re-entrancy guard
//!
//! A guarded operation holds a [`GuardToken`] for its whole duration,
//! including any outstanding external transfer. A nested entry attempt while
//! the token is alive fails with [`TallyError::Reentrancy`]. Dropping the
//! token releases the guard on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, TallyError};

#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    entered: AtomicBool,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the guard for the current scope
    pub fn enter(&self) -> Result<GuardToken<'_>> {
        self.entered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TallyError::Reentrancy)?;
        Ok(GuardToken { guard: self })
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// Scoped acquisition of a [`ReentrancyGuard`]
#[must_use = "the guard is released as soon as the token is dropped"]
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.entered.store(false, Ordering::Release);
    }
}
