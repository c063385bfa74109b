//! The clock collaborator from spec §6, used for header last-modified
//! timestamps. Microsecond resolution, matching the contract's
//! `now() -> i64 microseconds since epoch`.

pub trait Clock {
    fn now_micros(&self) -> i64;
}

/// Default collaborator implementation, backed by `SystemTime`.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0)
    }
}
