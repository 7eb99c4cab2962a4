//! Log-time pacing for `--once` replays.
//!
//! A replay reads hours of log in milliseconds, so wall time says nothing
//! about the budgets. Instead the detectors run on a [`ManualClock`] that
//! follows the time of day printed at the start of each line.

use std::time::Duration;

use cellhound::timing::ManualClock;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// A time of day going back by more than this is taken as midnight rollover.
const ROLLOVER: Duration = Duration::from_secs(12 * 60 * 60);

/// Time of day of a log line: the first `HH:MM:SS[.frac]` token before the
/// first `[`, as in `10:00:05.123456 [RRC ] ...` or
/// `Tue Oct 18 10:00:05 2026 [RRC ] ...`.
pub fn line_time(line: &str) -> Option<Duration> {
    let head = line.split('[').next()?;
    head.split_whitespace().find_map(parse_time_of_day)
}

fn parse_time_of_day(token: &str) -> Option<Duration> {
    let (hms, frac) = token.split_once('.').unwrap_or((token, ""));
    let mut fields = hms.split(':').map(|f| {
        if f.len() == 2 && f.bytes().all(|b| b.is_ascii_digit()) {
            f.parse::<u64>().ok()
        } else {
            None
        }
    });
    let h = fields.next()??;
    let m = fields.next()??;
    let s = fields.next()??;
    if fields.next().is_some() || h > 23 || m > 59 || s > 60 {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits = &frac[..frac.len().min(9)];
    let nanos = if digits.is_empty() {
        0
    } else {
        digits.parse::<u32>().ok()? * 10u32.pow(9 - digits.len() as u32)
    };
    Some(Duration::new(h * 3600 + m * 60 + s, nanos))
}

pub struct LineClock {
    clock: ManualClock,
    first: Option<Duration>,
    last: Duration,
    days: u32,
}

impl LineClock {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            first: None,
            last: Duration::ZERO,
            days: 0,
        }
    }

    /// Move the clock to the time of `line`. Lines without a time leave it put.
    pub fn observe(&mut self, line: &str) {
        let Some(time) = line_time(line) else {
            return;
        };
        let mut at = time + DAY * self.days;
        if at + ROLLOVER < self.last {
            self.days += 1;
            at += DAY;
        }
        self.last = self.last.max(at);
        let first = *self.first.get_or_insert(at);
        self.clock.set(at.saturating_sub(first));
    }

    /// Treat the end of the log as silence lasting `silence`.
    pub fn settle(&self, silence: Duration) {
        self.clock.advance(silence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellhound::timing::Clock;

    #[test]
    fn parses_both_line_styles() {
        assert_eq!(
            line_time("10:00:05.250000 [RRC ] I SIB12"),
            Some(Duration::from_millis(36_005_250))
        );
        assert_eq!(
            line_time("Tue Oct 18 10:00:05 2026 [NAS ] I Authentication Request"),
            Some(Duration::from_secs(36_005))
        );
    }

    #[test]
    fn ignores_lines_without_time() {
        assert_eq!(line_time("[NAS ] I Authentication Request 10:00:05"), None);
        assert_eq!(line_time("garbage 1:2:3 [RRC ]"), None);
        assert_eq!(line_time("25:00:00 [RRC ]"), None);
        assert_eq!(line_time(""), None);
    }

    #[test]
    fn clock_follows_line_times() {
        let clock = ManualClock::new();
        let origin = clock.now();
        let mut pace = LineClock::new(clock.clone());

        pace.observe("10:00:00.000000 [RRC ] I first");
        assert_eq!(clock.now() - origin, Duration::ZERO);
        pace.observe("no time here");
        pace.observe("10:00:42.500000 [MAC ] D later");
        assert_eq!(clock.now() - origin, Duration::from_millis(42_500));
    }

    #[test]
    fn midnight_rollover_keeps_counting() {
        let clock = ManualClock::new();
        let origin = clock.now();
        let mut pace = LineClock::new(clock.clone());

        pace.observe("23:59:50 [RRC ] I a");
        pace.observe("00:00:20 [RRC ] I b");
        assert_eq!(clock.now() - origin, Duration::from_secs(30));
    }

    #[test]
    fn settle_adds_silence() {
        let clock = ManualClock::new();
        let origin = clock.now();
        let mut pace = LineClock::new(clock.clone());
        pace.observe("10:00:00 [RRC ] I a");
        pace.settle(Duration::from_secs(61));
        assert_eq!(clock.now() - origin, Duration::from_secs(61));
    }
}
