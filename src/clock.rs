//! Fixed-rate sample clock and the single-slot tick mailbox.
//!
//! The clock's fire path does exactly one thing: set [`ClockFlag`]. Sensor
//! reads, formatting and storage all happen in the main context after it
//! observes the flag. The flag is a boolean, not a queue: ticks that arrive
//! while it is still set are coalesced into one and lost. The raise counter
//! exists so that loss can be measured.
//!
//! On a microcontroller `fire` runs in the timer interrupt. On a host a
//! dedicated thread driven by [`crossbeam_channel::tick`] plays that role.

use crossbeam_channel::tick;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct FlagState {
    pending: AtomicBool,
    raised: AtomicU64,
}

/// Boolean "a sample is due" mailbox shared between the clock and main context.
#[derive(Debug, Clone, Default)]
pub struct ClockFlag {
    inner: Arc<FlagState>,
}

impl ClockFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a tick as due. Never blocks.
    pub fn raise(&self) {
        self.inner.raised.fetch_add(1, Ordering::Relaxed);
        self.inner.pending.store(true, Ordering::Release);
    }

    /// Consume the pending tick, if any.
    ///
    /// Returns true at most once per observed set, however many raises
    /// happened in between.
    pub fn take(&self) -> bool {
        self.inner.pending.swap(false, Ordering::AcqRel)
    }

    /// Check for a pending tick without consuming it.
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Total number of raises since creation.
    pub fn raised_count(&self) -> u64 {
        self.inner.raised.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct ClockShared {
    enabled: AtomicBool,
    flag: ClockFlag,
}

impl ClockShared {
    fn fire(&self) -> bool {
        if self.enabled.load(Ordering::Acquire) {
            self.flag.raise();
            true
        } else {
            false
        }
    }
}

/// Errors that can occur when starting the clock thread.
#[derive(Debug)]
pub enum ClockError {
    AlreadyRunning,
    InvalidPeriod,
}

impl std::fmt::Display for ClockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockError::AlreadyRunning => write!(f, "Sample clock is already running"),
            ClockError::InvalidPeriod => write!(f, "Sample clock period must be non-zero"),
        }
    }
}

impl std::error::Error for ClockError {}

/// Fixed-period tick source.
pub struct SampleClock {
    period: Duration,
    shared: Arc<ClockShared>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SampleClock {
    /// Create a clock that raises `flag` every `period`. Starts enabled but
    /// without a timer thread; call [`SampleClock::start`] to begin ticking.
    pub fn new(period: Duration, flag: ClockFlag) -> Self {
        Self {
            period,
            shared: Arc::new(ClockShared {
                enabled: AtomicBool::new(true),
                flag,
            }),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// The mailbox this clock raises.
    pub fn flag(&self) -> &ClockFlag {
        &self.shared.flag
    }

    /// The interrupt-handler body: raise the flag if enabled.
    ///
    /// Returns whether the tick was delivered.
    pub fn fire(&self) -> bool {
        self.shared.fire()
    }

    pub fn enable(&self) {
        self.shared.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Start the timer thread.
    pub fn start(&mut self) -> Result<(), ClockError> {
        if self.period.is_zero() {
            return Err(ClockError::InvalidPeriod);
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(ClockError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let running = self.running.clone();
        let period = self.period;

        let handle = thread::spawn(move || {
            let ticker = tick(period);
            while running.load(Ordering::Acquire) {
                if ticker.recv().is_err() {
                    break;
                }
                shared.fire();
            }
        });

        self.thread_handle = Some(handle);
        tracing::debug!(period_us = self.period.as_micros() as u64, "sample clock started");
        Ok(())
    }

    /// Stop the timer thread. Returns once the thread has exited.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            // The thread exits on its next tick
            let _ = handle.join();
        }
    }

    /// Check if the timer thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for SampleClock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Monotonic microsecond counter since logger start.
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    origin: Instant,
}

impl Uptime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

impl Default for Uptime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_coalesces_raises() {
        let flag = ClockFlag::new();
        flag.raise();
        flag.raise();
        flag.raise();

        assert!(flag.take());
        assert!(!flag.take());
        assert_eq!(flag.raised_count(), 3);
    }

    #[test]
    fn test_disabled_clock_drops_ticks() {
        let clock = SampleClock::new(Duration::from_micros(1000), ClockFlag::new());
        clock.disable();
        assert!(!clock.fire());
        assert!(!clock.flag().is_pending());

        clock.enable();
        assert!(clock.fire());
        assert!(clock.flag().take());
    }

    #[test]
    fn test_timer_thread_raises_flag() {
        let flag = ClockFlag::new();
        let mut clock = SampleClock::new(Duration::from_millis(1), flag.clone());
        clock.start().unwrap();
        assert!(matches!(clock.start(), Err(ClockError::AlreadyRunning)));

        let deadline = Instant::now() + Duration::from_secs(2);
        while !flag.is_pending() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        clock.stop();

        assert!(flag.take());
        assert!(!clock.is_running());
    }

    #[test]
    fn test_zero_period_rejected() {
        let mut clock = SampleClock::new(Duration::ZERO, ClockFlag::new());
        assert!(matches!(clock.start(), Err(ClockError::InvalidPeriod)));
    }

    #[test]
    fn test_uptime_is_monotonic() {
        let uptime = Uptime::new();
        let a = uptime.micros();
        thread::sleep(Duration::from_millis(2));
        assert!(uptime.micros() > a);
    }
}
