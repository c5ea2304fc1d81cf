//! External time reference.
//!
//! A GNSS receiver (or any other source) supplies already-decoded UTC time.
//! The logger only uses it to anchor a session's local microsecond clock to
//! wall time; sampling never waits for a fix.

use chrono::{DateTime, Utc};

/// Source of a validated UTC fix.
pub trait TimeFixProvider {
    /// The current UTC time, or `None` without a valid fix.
    fn current_fix(&self) -> Option<DateTime<Utc>>;
}

impl<T: TimeFixProvider + ?Sized> TimeFixProvider for Box<T> {
    fn current_fix(&self) -> Option<DateTime<Utc>> {
        (**self).current_fix()
    }
}

/// No time reference attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTimeFix;

impl TimeFixProvider for NoTimeFix {
    fn current_fix(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Trusts the host's system clock as the fix.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeFix;

impl TimeFixProvider for SystemTimeFix {
    fn current_fix(&self) -> Option<DateTime<Utc>> {
        Some(Utc::now())
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeFix(pub DateTime<Utc>);

impl TimeFixProvider for FixedTimeFix {
    fn current_fix(&self) -> Option<DateTime<Utc>> {
        Some(self.0)
    }
}

/// Map a local timestamp to UTC given a session anchor.
pub fn to_utc(anchor: DateTime<Utc>, anchor_us: u64, timestamp_us: u64) -> DateTime<Utc> {
    let delta = timestamp_us as i64 - anchor_us as i64;
    anchor + chrono::Duration::microseconds(delta)
}
