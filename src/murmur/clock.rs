use std::sync::atomic::{AtomicI64, Ordering};

use time::OffsetDateTime;

/// An injectable time source. Replaces a process-wide test-time override
/// with a value threaded through at open/create time; a `MurmurFile`
/// carries whichever `Clock` it was opened with.
pub trait Clock: Send + Sync {
    /// Current wall time, in whole seconds since the Unix epoch.
    fn now(&self) -> u64;
}

/// The production clock: the OS wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
    }
}

/// A clock that always reports a fixed, externally-set time. Used by tests
/// that need deterministic archive-selection and bucket-alignment behavior.
#[derive(Debug)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now: u64) -> FixedClock {
        FixedClock(AtomicI64::new(now as i64))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now as i64, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst) as u64
    }
}
