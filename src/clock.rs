//! Time and cancellation primitives for the monitor loop.
//!
//! Every sleep in the pipeline goes through a `Clock` so that:
//! - a `StopSignal` interrupts the sleep instead of waiting it out
//! - tests can drive cooldown and settle timing deterministically (`ManualClock`)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Longest uninterrupted slice a `SystemClock` sleeps before re-checking the stop signal.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Shared, cloneable stop flag.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Monotonic time source with a cancellable sleep.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Sleep for `duration`. Returns `false` if `stop` was raised before the
    /// sleep completed.
    fn sleep(&self, duration: Duration, stop: &StopSignal) -> bool;
}

/// Wall-clock implementation backed by `Instant` and `thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, stop: &StopSignal) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if stop.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Deterministic clock for tests. `sleep` advances virtual time instantly.
#[derive(Clone, Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move virtual time forward without sleeping.
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }

    /// Virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration, stop: &StopSignal) -> bool {
        if stop.is_stopped() {
            return false;
        }
        self.advance(duration);
        !stop.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let stop = StopSignal::new();
        let start = clock.now();

        assert!(clock.sleep(Duration::from_millis(500), &stop));
        assert_eq!(clock.now() - start, Duration::from_millis(500));
    }

    #[test]
    fn stopped_sleep_returns_early() {
        let stop = StopSignal::new();
        stop.stop();

        let started = Instant::now();
        assert!(!SystemClock.sleep(Duration::from_secs(5), &stop));
        assert!(started.elapsed() < Duration::from_secs(1));

        let clock = ManualClock::new();
        assert!(!clock.sleep(Duration::from_secs(5), &stop));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn system_clock_sleep_is_interrupted_by_another_thread() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            remote.stop();
        });

        let started = Instant::now();
        assert!(!SystemClock.sleep(Duration::from_secs(10), &stop));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
