/// NDJSON transport helpers.
///
/// Detector outcomes leave the process as newline-delimited JSON, and host
/// commands arrive the same way, one object per line.
use std::time::Duration;

use crate::alert::AlertContext;
use crate::detector::Outcome;
use crate::filter::LogSink;
use crate::protocol::{clip, HostCommand, MonitorMessage, MsgBuffer, RawCommand, MAX_ALERT_TEXT, MAX_MSG_LEN, VERSION};

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a MonitorMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &MonitorMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize into an owned, newline-terminated buffer.
pub fn to_buffer(msg: &MonitorMessage) -> Option<MsgBuffer> {
    let mut buf = [0u8; MAX_MSG_LEN];
    let len = serialize_message(msg, &mut buf)?;
    MsgBuffer::from_slice(&buf[..len]).ok()
}

/// Every transition of `out`, then its alert, as NDJSON lines.
pub fn encode_outcome(source: &str, out: &Outcome) -> Vec<MsgBuffer> {
    let mut lines = Vec::with_capacity(out.transitions.len() + 1);
    for t in &out.transitions {
        let msg = MonitorMessage::Transition {
            src: source,
            from: t.from.as_str(),
            to: t.to.as_str(),
            ts: t.ts,
        };
        match to_buffer(&msg) {
            Some(buf) => lines.push(buf),
            None => log::warn!("Dropping oversized transition message for {}", source),
        }
    }

    if let Some(ctx) = &out.alert {
        match encode_alert(source, ctx) {
            Some(buf) => lines.push(buf),
            None => log::warn!("Dropping oversized alert message for {}", source),
        }
    }
    lines
}

/// Alert line for `ctx`. Escaping can grow the text up to six times, so the
/// text is halved until the line fits; the verdict itself is never dropped
/// for the sake of its text.
fn encode_alert(source: &str, ctx: &AlertContext) -> Option<MsgBuffer> {
    let elapsed_ms = ctx.elapsed.as_millis().min(u32::MAX as u128) as u32;
    let text = ctx.message.trim_end();
    let mut limit = MAX_ALERT_TEXT;
    loop {
        let msg = MonitorMessage::Alert {
            src: source,
            cell: &ctx.cell_id,
            phase: ctx.phase.as_str(),
            elapsed_ms,
            msg: clip(text, limit),
            ts: ctx.ts,
        };
        if let Some(buf) = to_buffer(&msg) {
            return Some(buf);
        }
        if limit == 0 {
            return None;
        }
        limit /= 2;
    }
}

/// Current status of `sink`.
pub fn status_message(sink: &LogSink, monitoring: bool) -> MonitorMessage<'static> {
    MonitorMessage::Status {
        monitoring,
        uptime: sink.uptime_ms() / 1000,
        sources: sink.status().len().min(u16::MAX as usize) as u16,
        alerts: sink.alerts(),
        version: VERSION,
    }
}

// ── Host commands ──────────────────────────────────────────────────────

/// Deserialize a HostCommand from a JSON byte slice.
///
/// Uses [`RawCommand`] as an intermediate because `serde_json_core` does not
/// support internally tagged enums.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    match raw.cmd.as_str() {
        "start" => Some(HostCommand::Start),
        "stop" => Some(HostCommand::Stop),
        "status" => Some(HostCommand::GetStatus),
        "reset" => Some(HostCommand::Reset),
        "set_timeouts" => Some(HostCommand::SetTimeouts {
            sib_secs: raw.sib_secs,
            auth_secs: raw.auth_secs,
        }),
        _ => None,
    }
}

/// Process a received host command and update state accordingly.
///
/// Returns the outcomes of a reset or stop, one per source that left a cycle.
/// Status replies are built by the caller with [`status_message`].
pub fn handle_command(cmd: HostCommand, sink: &LogSink, monitoring: &mut bool) -> Vec<(String, Outcome)> {
    match cmd {
        HostCommand::Start => {
            *monitoring = true;
            log::info!("Monitoring started by host command");
            Vec::new()
        }
        HostCommand::Stop => {
            *monitoring = false;
            log::info!("Monitoring stopped by host command");
            // Lines are dropped from here on, so running budgets would go stale.
            sink.rearm()
        }
        HostCommand::GetStatus => Vec::new(),
        HostCommand::Reset => {
            log::info!("Detectors reset by host command");
            sink.rearm()
        }
        HostCommand::SetTimeouts { sib_secs, auth_secs } => {
            let mut config = sink.detector_config();
            if let Some(secs) = sib_secs.filter(|&s| s > 0) {
                config.sib_to_auth_request = Duration::from_secs(secs.into());
            }
            if let Some(secs) = auth_secs.filter(|&s| s > 0) {
                config.auth_request_to_success = Duration::from_secs(secs.into());
            }
            log::info!(
                "Budgets set to {}s (warning to request) and {}s (request to success)",
                config.sib_to_auth_request.as_secs(),
                config.auth_request_to_success.as_secs()
            );
            sink.set_detector_config(config);
            Vec::new()
        }
    }
}

// ── NDJSON line reader ─────────────────────────────────────────────────

/// NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_MSG_LEN],
    pos: usize,
    overflow: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_MSG_LEN],
            pos: 0,
            overflow: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected. An overlong line is dropped whole.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            let len = core::mem::take(&mut self.pos);
            if core::mem::take(&mut self.overflow) || len == 0 {
                None
            } else {
                Some(&self.buf[..len])
            }
        } else if self.overflow {
            None
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            self.overflow = true;
            self.pos = 0;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\n' | b'\r' | b'\t'))
        .map_or(0, |i| i + 1);
    &data[..end]
}
