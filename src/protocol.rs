/// JSON message protocol between the monitor and whatever consumes its output.
///
/// All messages are newline-delimited JSON (NDJSON), serialized with
/// `serde-json-core` into fixed `heapless` buffers.
use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Longest alert message carried on the wire, in bytes
pub const MAX_ALERT_TEXT: usize = 128;

/// Messages sent by the monitor
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum MonitorMessage<'a> {
    /// Detector state change
    #[serde(rename = "transition")]
    Transition {
        src: &'a str,
        /// State left, e.g. "sib_received"
        from: &'static str,
        to: &'static str,
        /// Uptime in milliseconds
        ts: u32,
    },
    /// Fake base station verdict
    #[serde(rename = "alert")]
    Alert {
        src: &'a str,
        /// Physical cell id, empty when never logged
        cell: &'a str,
        /// Budget that ran out: "auth_request" or "auth_success"
        phase: &'static str,
        elapsed_ms: u32,
        /// Reassembled warning text, see [`clip`]
        msg: &'a str,
        ts: u32,
    },
    /// Monitor status report
    #[serde(rename = "status")]
    Status {
        monitoring: bool,
        /// Uptime in seconds
        uptime: u32,
        /// Sources with a live detector
        sources: u16,
        /// Fake station verdicts so far
        alerts: u32,
        version: &'static str,
    },
}

/// Commands sent to the monitor.
///
/// Deserialized manually via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
#[derive(Debug, PartialEq)]
pub enum HostCommand {
    /// Resume feeding lines to the detectors
    Start,
    /// Pause detection; lines are still read and dropped
    Stop,
    /// Request current status
    GetStatus,
    /// Return every detector to idle
    Reset,
    /// Change the timing budgets, in seconds. Absent fields keep their value.
    SetTimeouts {
        sib_secs: Option<u16>,
        auth_secs: Option<u16>,
    },
}

/// Wire format for host commands. Flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: heapless::String<16>,
    #[serde(default)]
    pub sib_secs: Option<u16>,
    #[serde(default)]
    pub auth_secs: Option<u16>,
}

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 512;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

/// Longest prefix of `text` within `max` bytes that ends on a char boundary.
pub fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_json(msg: &MonitorMessage) -> std::string::String {
        let mut buf = [0u8; MAX_MSG_LEN];
        let len = serde_json_core::to_slice(msg, &mut buf).unwrap();
        core::str::from_utf8(&buf[..len]).unwrap().to_string()
    }

    // ── MonitorMessage serialization ────────────────────────────────

    #[test]
    fn serialize_transition_message() {
        let json = to_json(&MonitorMessage::Transition {
            src: "/tmp/ue.log",
            from: "idle",
            to: "sib_received",
            ts: 1000,
        });
        assert_eq!(
            json,
            r#"{"type":"transition","src":"/tmp/ue.log","from":"idle","to":"sib_received","ts":1000}"#
        );
    }

    #[test]
    fn serialize_alert_message() {
        let json = to_json(&MonitorMessage::Alert {
            src: "ue.log",
            cell: "371",
            phase: "auth_request",
            elapsed_ms: 61_000,
            msg: "Earthquake \"drill\"",
            ts: 61_000,
        });
        assert!(json.contains(r#""type":"alert""#));
        assert!(json.contains(r#""cell":"371""#));
        assert!(json.contains(r#""elapsed_ms":61000"#));
        assert!(json.contains(r#""msg":"Earthquake \"drill\"""#));
    }

    #[test]
    fn serialize_status_message() {
        let json = to_json(&MonitorMessage::Status {
            monitoring: true,
            uptime: 120,
            sources: 1,
            alerts: 2,
            version: "0.1.0",
        });
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""monitoring":true"#));
        assert!(json.contains(r#""uptime":120"#));
        assert!(json.contains(r#""alerts":2"#));
    }

    // ── clip ────────────────────────────────────────────────────────

    #[test]
    fn clip_keeps_short_text() {
        assert_eq!(clip("drill", MAX_ALERT_TEXT), "drill");
    }

    #[test]
    fn clip_respects_char_boundary() {
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(clip("aé", 2), "a");
        assert_eq!(clip("aé", 3), "aé");
    }

    #[test]
    fn host_command_equality() {
        assert_eq!(
            HostCommand::SetTimeouts { sib_secs: Some(30), auth_secs: None },
            HostCommand::SetTimeouts { sib_secs: Some(30), auth_secs: None }
        );
        assert_ne!(HostCommand::Start, HostCommand::Stop);
    }

    #[test]
    fn version_is_semver() {
        let parts: heapless::Vec<&str, 4> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION should be semver (major.minor.patch)");
        for part in &parts {
            assert!(part.parse::<u32>().is_ok(), "'{part}' is not a number");
        }
    }
}
