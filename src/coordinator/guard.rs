use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use super::CyclePhase;

/// Exclusive claim on an entry's cycle slot
///
/// Dropping the guard (success, error or cancelled future) frees the slot
/// and puts the phase back to `Idle`.
#[derive(Debug)]
pub(crate) struct CycleGuard<'a> {
    running: &'a AtomicBool,
    phase: &'a AtomicU8,
}

impl<'a> CycleGuard<'a> {
    /// `None` when a cycle already holds the slot
    pub(crate) fn try_acquire(running: &'a AtomicBool, phase: &'a AtomicU8) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        Some(Self { running, phase })
    }

    pub(crate) fn set_phase(&self, phase: CyclePhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.phase.store(CyclePhase::Idle as u8, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }
}
