/// Log line classification.
///
/// Turns a finalized log line into the detector event it represents, by
/// exact substring match on the marker strings in `defaults`. Lines that
/// carry no marker still matter to the detector (they drive the timeout
/// checks), so they classify as [`EventKind::Other`].
use crate::defaults::{
    CELL_ID_KEY, MARKER_AUTH_REQUEST, MARKER_AUTH_SUCCESS, MARKER_WARNING_SEGMENT,
};

/// Detector event derived from one log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    WarningSegment,
    AuthRequest,
    AuthSuccess,
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::WarningSegment => "warning_segment",
            EventKind::AuthRequest => "auth_request",
            EventKind::AuthSuccess => "auth_success",
            EventKind::Other => "other",
        }
    }
}

/// A finalized line from one log source, stamped with uptime milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct LogEvent<'a> {
    pub source: &'a str,
    pub text: &'a str,
    pub ts: u32,
}

/// Classify a line. The warning segment wins when a line carries several markers.
pub fn classify(text: &str) -> EventKind {
    if text.contains(MARKER_WARNING_SEGMENT) {
        EventKind::WarningSegment
    } else if text.contains(MARKER_AUTH_SUCCESS) {
        EventKind::AuthSuccess
    } else if text.contains(MARKER_AUTH_REQUEST) {
        EventKind::AuthRequest
    } else {
        EventKind::Other
    }
}

/// Physical cell id from a cell search line (`... PCI=371, PRB=50 ...`).
pub fn cell_id(text: &str) -> Option<&str> {
    let at = text.find(CELL_ID_KEY)? + CELL_ID_KEY.len();
    let rest = &text[at..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

/// True when `source` is one of the observed sources (suffix match, so a
/// full path such as `/tmp/ue.log` matches `ue.log`).
pub fn is_observed<S: AsRef<str>>(source: &str, observed: &[S]) -> bool {
    observed.iter().any(|suffix| source.ends_with(suffix.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_marker() {
        assert_eq!(
            classify("[RRC ] I SIB12 warningMessageSegment-r9 : \"01\""),
            EventKind::WarningSegment
        );
        assert_eq!(
            classify("[NAS ] I Received Authentication Request"),
            EventKind::AuthRequest
        );
        assert_eq!(
            classify("[NAS ] I Network authentication successful"),
            EventKind::AuthSuccess
        );
        assert_eq!(classify("[MAC ] D RACH done"), EventKind::Other);
    }

    #[test]
    fn marker_match_is_case_sensitive() {
        assert_eq!(classify("authentication request"), EventKind::Other);
    }

    #[test]
    fn observed_source_is_suffix_match() {
        assert!(is_observed("/tmp/ue.log", &["ue.log"]));
        assert!(is_observed("ue.log", &["enb.log", "ue.log"]));
        assert!(!is_observed("/tmp/ue.log.1", &["ue.log"]));
        assert!(!is_observed::<&str>("ue.log", &[]));
    }

    #[test]
    fn extracts_cell_id() {
        assert_eq!(
            cell_id("[PHY0] I Found Cell:  Mode=FDD, PCI=371, PRB=50, Ports=1"),
            Some("371")
        );
        assert_eq!(cell_id("[PHY0] I PCI=12"), Some("12"));
        assert_eq!(cell_id("[PHY0] I PCI=, PRB=50"), None);
        assert_eq!(cell_id("[NAS ] I Authentication Request"), None);
    }

    #[test]
    fn event_kind_names() {
        assert_eq!(EventKind::WarningSegment.as_str(), "warning_segment");
        assert_eq!(EventKind::Other.as_str(), "other");
    }
}
