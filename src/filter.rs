/// Level-gated log sink feeding the fake station detectors.
///
/// Lines are formatted once, written to the `log` facade, and handed to the
/// detector of their source when that source is observed. Each observed
/// source gets its own [`AnomalyDetector`]; all of them live behind one lock
/// that is held from classification through the resulting transition.
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::alert::{AlertSink, LogAlert};
use crate::classifier::{is_observed, LogEvent};
use crate::decode::{CbsDecoder, DecodeBridge};
use crate::defaults::{HEX_LIMIT, OBSERVED_SOURCES};
use crate::detector::{AnomalyDetector, DetectorConfig, DetectorState, Outcome};
use crate::timing::Clock;

/// Verbosity, ordered from quiet to chatty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    None,
    Error,
    Warning,
    Info,
    Debug,
}

impl Level {
    pub fn short(&self) -> &'static str {
        match self {
            Level::None => "-",
            Level::Error => "E",
            Level::Warning => "W",
            Level::Info => "I",
            Level::Debug => "D",
        }
    }

    fn to_log(self) -> log::Level {
        match self {
            Level::Error => log::Level::Error,
            Level::Warning => log::Level::Warn,
            Level::Info => log::Level::Info,
            Level::None | Level::Debug => log::Level::Debug,
        }
    }
}

/// Runtime sink configuration.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Most verbose level that is still emitted
    pub min_level: Level,
    /// Prefix lines with the TTI tag
    pub tti: bool,
    /// Bytes of hex payload rendered under a line
    pub hex_limit: usize,
    /// Sources whose lines feed the detector (suffix match)
    pub observed: Vec<String>,
}

impl FilterConfig {
    pub fn new() -> Self {
        Self {
            min_level: Level::Info,
            tti: false,
            hex_limit: HEX_LIMIT,
            observed: OBSERVED_SOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        level != Level::None && level <= self.min_level
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one source's detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub source: String,
    pub state: DetectorState,
    pub alerts: u32,
}

struct Sessions {
    config: DetectorConfig,
    detectors: BTreeMap<String, AnomalyDetector>,
}

pub struct LogSink {
    filter: FilterConfig,
    clock: Arc<dyn Clock>,
    boot: Instant,
    decoder: Arc<dyn DecodeBridge>,
    alert: Arc<dyn AlertSink>,
    sessions: Mutex<Sessions>,
}

impl LogSink {
    pub fn new(filter: FilterConfig, detector: DetectorConfig, clock: Arc<dyn Clock>) -> Self {
        let boot = clock.now();
        Self {
            filter,
            clock,
            boot,
            decoder: Arc::new(CbsDecoder::default()),
            alert: Arc::new(LogAlert),
            sessions: Mutex::new(Sessions {
                config: detector,
                detectors: BTreeMap::new(),
            }),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn DecodeBridge>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_alert(mut self, alert: Arc<dyn AlertSink>) -> Self {
        self.alert = alert;
        self
    }

    pub fn filter(&self) -> &FilterConfig {
        &self.filter
    }

    /// Milliseconds since the sink was built, wrapping at `u32::MAX`.
    pub fn uptime_ms(&self) -> u32 {
        let ms = self.clock.now().saturating_duration_since(self.boot).as_millis();
        (ms & 0xFFFF_FFFF) as u32
    }

    fn sessions(&self) -> MutexGuard<'_, Sessions> {
        // A panic in one observation must not silence every source.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Format and emit one log call.
    ///
    /// Returns the detector outcome when the line reached a detector.
    pub fn emit(
        &self,
        level: Level,
        source: &str,
        tti: u32,
        text: &str,
        hex: Option<&[u8]>,
    ) -> Option<Outcome> {
        if !self.filter.enabled(level) {
            return None;
        }
        let line = self.format_line(level, source, tti, text, hex);
        log::log!(level.to_log(), "{}", line.trim_end());
        self.observe_line(source, &line)
    }

    /// Hand an already finalized line to the detector of `source`.
    pub fn observe_line(&self, source: &str, line: &str) -> Option<Outcome> {
        if !is_observed(source, &self.filter.observed) {
            return None;
        }
        let event = LogEvent {
            source,
            text: line,
            ts: self.uptime_ms(),
        };

        let mut sessions = self.sessions();
        let Sessions { config, detectors } = &mut *sessions;
        let detector = detectors.entry(event.source.to_string()).or_insert_with(|| {
            log::info!("Watching {} for fake base stations", event.source);
            AnomalyDetector::new(event.source, *config, self.clock.clone())
                .with_decoder(self.decoder.clone())
                .with_alert(self.alert.clone())
        });
        Some(detector.observe_line(event.text, event.ts))
    }

    /// Check every running budget, for sources that went quiet.
    pub fn poll(&self) -> Vec<(String, Outcome)> {
        let ts = self.uptime_ms();
        self.sessions()
            .detectors
            .iter_mut()
            .map(|(source, detector)| (source.clone(), detector.poll(ts)))
            .filter(|(_, out)| !out.transitions.is_empty())
            .collect()
    }

    /// Send every finished or running cycle back to idle.
    pub fn rearm(&self) -> Vec<(String, Outcome)> {
        let ts = self.uptime_ms();
        self.sessions()
            .detectors
            .iter_mut()
            .map(|(source, detector)| (source.clone(), detector.rearm(ts)))
            .filter(|(_, out)| !out.transitions.is_empty())
            .collect()
    }

    pub fn detector_config(&self) -> DetectorConfig {
        self.sessions().config
    }

    /// Apply new timing policy to current and future sources.
    pub fn set_detector_config(&self, config: DetectorConfig) {
        let mut sessions = self.sessions();
        sessions.config = config;
        for detector in sessions.detectors.values_mut() {
            detector.set_config(config);
        }
    }

    pub fn status(&self) -> Vec<SessionStatus> {
        self.sessions()
            .detectors
            .values()
            .map(|d| SessionStatus {
                source: d.source().to_string(),
                state: d.state(),
                alerts: d.alerts(),
            })
            .collect()
    }

    /// Total fake station verdicts across sources.
    pub fn alerts(&self) -> u32 {
        self.sessions()
            .detectors
            .values()
            .fold(0u32, |n, d| n.wrapping_add(d.alerts()))
    }

    fn format_line(&self, level: Level, source: &str, tti: u32, text: &str, hex: Option<&[u8]>) -> String {
        let secs = self.clock.now().saturating_duration_since(self.boot).as_secs_f64();
        let mut line = String::with_capacity(text.len() + 48);
        let _ = write!(line, "{:10.6} [{:<4}] {} ", secs, source, level.short());
        if self.filter.tti {
            let _ = write!(line, "[{:5}] ", tti);
        }
        line.push_str(text);
        if !text.ends_with('\n') {
            line.push('\n');
        }
        if let Some(hex) = hex {
            line.push_str(&hex_dump(hex, self.filter.hex_limit));
        }
        line
    }
}

/// Render `bytes` as offset-prefixed rows of 16, stopping at `limit` bytes.
pub fn hex_dump(bytes: &[u8], limit: usize) -> String {
    let bytes = &bytes[..bytes.len().min(limit)];
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "             {:04x}: ", row * 16);
        for b in chunk {
            let _ = write!(out, "{:02x} ", b);
        }
        out.push('\n');
    }
    out
}
