/// Monotonic elapsed-time gate used for the authentication budgets.
///
/// The gate never reads process CPU time; it asks a [`Clock`] for the current
/// monotonic instant, so real wall time spent blocked or sleeping counts.
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of monotonic instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// `std::time::Instant` backed clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Used for log replay and tests.
///
/// Clones share the same offset.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }

    /// Jump to `at` past the clock's origin. Never moves backwards.
    pub fn set(&self, at: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            if at > *offset {
                *offset = at;
            }
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or(Duration::ZERO);
        self.base + offset
    }
}

/// Start/reset/stop stopwatch over a shared clock.
pub struct TimingGate {
    clock: Arc<dyn Clock>,
    enabled: bool,
    started: Option<Instant>,
    elapsed: Duration,
}

impl TimingGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            enabled: false,
            started: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Arm the gate. A gate that is already running keeps its start instant.
    pub fn start(&mut self) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        self.started = Some(self.clock.now());
        self.elapsed = Duration::ZERO;
    }

    /// Seconds since start, or 0 while disabled.
    pub fn update(&mut self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Elapsed time since start, or zero while disabled.
    pub fn elapsed(&mut self) -> Duration {
        match (self.enabled, self.started) {
            (true, Some(started)) => {
                self.elapsed = self.clock.now().saturating_duration_since(started);
                self.elapsed
            }
            _ => Duration::ZERO,
        }
    }

    pub fn stop(&mut self) {
        self.enabled = false;
        self.started = None;
        self.elapsed = Duration::ZERO;
    }

    /// Re-arm from now, dropping whatever had elapsed.
    pub fn reset(&mut self) {
        self.enabled = true;
        self.started = Some(self.clock.now());
        self.elapsed = Duration::ZERO;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> (ManualClock, TimingGate) {
        let clock = ManualClock::new();
        let gate = TimingGate::new(Arc::new(clock.clone()));
        (clock, gate)
    }

    #[test]
    fn update_before_start_is_zero() {
        let (clock, mut gate) = gate();
        clock.advance(Duration::from_secs(30));
        assert_eq!(gate.update(), 0.0);
        assert!(!gate.is_enabled());
    }

    #[test]
    fn update_tracks_clock_after_start() {
        let (clock, mut gate) = gate();
        gate.start();
        clock.advance(Duration::from_millis(2500));
        assert_eq!(gate.update(), 2.5);
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let (clock, mut gate) = gate();
        gate.start();
        clock.advance(Duration::from_secs(5));
        gate.start();
        clock.advance(Duration::from_secs(1));
        assert_eq!(gate.update(), 6.0);
    }

    #[test]
    fn stop_zeroes_regardless_of_elapsed() {
        let (clock, mut gate) = gate();
        gate.start();
        clock.advance(Duration::from_secs(90));
        gate.stop();
        clock.advance(Duration::from_secs(90));
        assert_eq!(gate.update(), 0.0);
        assert!(!gate.is_enabled());
    }

    #[test]
    fn reset_discards_prior_elapsed() {
        let (clock, mut gate) = gate();
        gate.start();
        clock.advance(Duration::from_secs(40));
        gate.reset();
        clock.advance(Duration::from_secs(3));
        assert_eq!(gate.update(), 3.0);
        assert!(gate.is_enabled());
    }

    #[test]
    fn reset_arms_a_stopped_gate() {
        let (clock, mut gate) = gate();
        gate.reset();
        clock.advance(Duration::from_secs(1));
        assert_eq!(gate.update(), 1.0);
    }

    #[test]
    fn manual_clock_set_never_goes_backwards() {
        let clock = ManualClock::new();
        let origin = clock.now();
        clock.set(Duration::from_secs(10));
        clock.set(Duration::from_secs(4));
        assert_eq!(clock.now() - origin, Duration::from_secs(10));
    }
}
