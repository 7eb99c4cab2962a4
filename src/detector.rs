/// Fake base station detector.
///
/// A legitimate cell that broadcasts an emergency warning is expected to go
/// on and authenticate the UE within bounded time. The detector watches one
/// log source and walks this cycle:
///
/// ```text
/// Idle --warning segment--> SibReceived --Authentication Request--> AuthRequested
///   ^                          |  budget                               |  budget      \ success
///   |                          v                                       v               v
///   +------------------- FakeDetected <--------------------------------+         AuthSucceeded
/// ```
///
/// `FakeDetected` raises the alert and falls straight back to `Idle`, so the
/// next broadcast is watched again. Each marker counts once per cycle.
use std::sync::Arc;
use std::time::Duration;

use heapless::Vec;

use crate::alert::{self, AlertContext, AlertSink, LogAlert, Phase};
use crate::classifier::{self, EventKind};
use crate::decode::{CbsDecoder, DecodeBridge};
use crate::defaults::{AUTH_REQUEST_TO_SUCCESS_SECS, PAGE_WIDTH_HEX, SIB_TO_AUTH_REQUEST_SECS};
use crate::reassembly::{self, ReassembledMessage};
use crate::timing::{Clock, TimingGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    SibReceived,
    AuthRequested,
    AuthSucceeded,
    FakeDetected,
}

impl DetectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorState::Idle => "idle",
            DetectorState::SibReceived => "sib_received",
            DetectorState::AuthRequested => "auth_requested",
            DetectorState::AuthSucceeded => "auth_succeeded",
            DetectorState::FakeDetected => "fake_detected",
        }
    }
}

/// Timing policy and payload geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Longest wait from warning broadcast to Authentication Request
    pub sib_to_auth_request: Duration,
    /// Longest wait from Authentication Request to success
    pub auth_request_to_success: Duration,
    /// Hex characters per CB page
    pub page_width: usize,
}

impl DetectorConfig {
    pub const fn new() -> Self {
        Self {
            sib_to_auth_request: Duration::from_secs(SIB_TO_AUTH_REQUEST_SECS),
            auth_request_to_success: Duration::from_secs(AUTH_REQUEST_TO_SUCCESS_SECS),
            page_width: PAGE_WIDTH_HEX,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: DetectorState,
    pub to: DetectorState,
    pub ts: u32,
}

/// What one observation did. At most two transitions happen per call
/// (`-> FakeDetected -> Idle`), plus one when the same line opens a cycle.
#[derive(Debug, Default)]
pub struct Outcome {
    pub transitions: Vec<Transition, 4>,
    pub alert: Option<AlertContext>,
}

pub struct AnomalyDetector {
    source: String,
    config: DetectorConfig,
    state: DetectorState,
    gate: TimingGate,
    decoder: Arc<dyn DecodeBridge>,
    alert: Arc<dyn AlertSink>,
    message: Option<ReassembledMessage>,
    cell_id: String,
    alerts: u32,
}

impl AnomalyDetector {
    /// Detector for `source` using the in-process decoder and log alerts.
    pub fn new(source: impl Into<String>, config: DetectorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            source: source.into(),
            config,
            state: DetectorState::Idle,
            gate: TimingGate::new(clock),
            decoder: Arc::new(CbsDecoder::default()),
            alert: Arc::new(LogAlert),
            message: None,
            cell_id: String::new(),
            alerts: 0,
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

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Takes effect for budgets checked from now on, including the running one.
    pub fn set_config(&mut self, config: DetectorConfig) {
        self.config = config;
    }

    pub fn message(&self) -> Option<&ReassembledMessage> {
        self.message.as_ref()
    }

    pub fn cell_id(&self) -> &str {
        &self.cell_id
    }

    pub fn set_cell_id(&mut self, cell_id: &str) {
        self.cell_id.clear();
        self.cell_id.push_str(cell_id);
    }

    /// Number of fake station verdicts since construction.
    pub fn alerts(&self) -> u32 {
        self.alerts
    }

    pub fn gate_running(&self) -> bool {
        self.gate.is_enabled()
    }

    /// Classify a finalized line and feed it to the state machine.
    pub fn observe_line(&mut self, text: &str, ts: u32) -> Outcome {
        if let Some(pci) = classifier::cell_id(text) {
            self.set_cell_id(pci);
        }
        self.observe(classifier::classify(text), text, ts)
    }

    /// Feed one classified event.
    ///
    /// Budgets are checked before the event is applied, so a marker that
    /// arrives after its window has closed no longer rescues the cycle.
    pub fn observe(&mut self, kind: EventKind, text: &str, ts: u32) -> Outcome {
        let mut out = Outcome::default();
        self.check_budget(ts, &mut out);

        match (self.state, kind) {
            (DetectorState::Idle, EventKind::WarningSegment) => {
                match reassembly::reassemble(text, self.config.page_width, &*self.decoder) {
                    Ok(message) => {
                        log::info!("{}: warning broadcast {:?}", self.source, message.text);
                        self.message = Some(message);
                        self.gate.start();
                        self.transition(DetectorState::SibReceived, ts, &mut out);
                    }
                    Err(e) => {
                        log::warn!("{}: ignoring warning segment: {}", self.source, e);
                    }
                }
            }
            (DetectorState::SibReceived, EventKind::AuthRequest) => {
                self.gate.reset();
                self.transition(DetectorState::AuthRequested, ts, &mut out);
            }
            (DetectorState::AuthRequested, EventKind::AuthSuccess) => {
                self.gate.stop();
                self.transition(DetectorState::AuthSucceeded, ts, &mut out);
            }
            _ => {}
        }

        out
    }

    /// Check the running budget without a new line, e.g. from a periodic tick.
    pub fn poll(&mut self, ts: u32) -> Outcome {
        let mut out = Outcome::default();
        self.check_budget(ts, &mut out);
        out
    }

    /// Leave a finished cycle and watch for the next broadcast.
    pub fn rearm(&mut self, ts: u32) -> Outcome {
        let mut out = Outcome::default();
        self.gate.stop();
        self.message = None;
        if self.state != DetectorState::Idle {
            self.transition(DetectorState::Idle, ts, &mut out);
        }
        out
    }

    fn check_budget(&mut self, ts: u32, out: &mut Outcome) {
        let (budget, phase) = match self.state {
            DetectorState::SibReceived => (self.config.sib_to_auth_request, Phase::AuthRequest),
            DetectorState::AuthRequested => (self.config.auth_request_to_success, Phase::AuthSuccess),
            _ => return,
        };

        let elapsed = self.gate.elapsed();
        if elapsed > budget {
            self.declare_fake(phase, elapsed, ts, out);
        }
    }

    fn declare_fake(&mut self, phase: Phase, elapsed: Duration, ts: u32, out: &mut Outcome) {
        self.transition(DetectorState::FakeDetected, ts, out);

        let ctx = AlertContext {
            source: self.source.clone(),
            cell_id: self.cell_id.clone(),
            message: self.message.take().map(|m| m.text).unwrap_or_default(),
            phase,
            elapsed,
            ts,
        };
        self.alerts = self.alerts.wrapping_add(1);
        alert::dispatch(&*self.alert, &ctx);

        self.gate.stop();
        self.transition(DetectorState::Idle, ts, out);
        out.alert = Some(ctx);
    }

    fn transition(&mut self, to: DetectorState, ts: u32, out: &mut Outcome) {
        let from = self.state;
        self.state = to;
        log::info!("{}: {} -> {}", self.source, from.as_str(), to.as_str());
        let _ = out.transitions.push(Transition { from, to, ts });
    }
}
