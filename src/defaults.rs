/// Compiled-in defaults for fake base station detection.
///
/// Marker strings are matched verbatim against finalized UE log lines as
/// written by the srsUE NAS and RRC layers. Timing budgets and the CB page
/// geometry are only starting values; every one of them can be overridden
/// through `DetectorConfig` or a host command.

/// Marker carrying a quoted SIB12 warning segment payload.
pub const MARKER_WARNING_SEGMENT: &str = "warningMessageSegment-r9";

/// NAS marker: network started the authentication challenge.
pub const MARKER_AUTH_REQUEST: &str = "Authentication Request";

/// NAS marker: the challenge/response completed.
pub const MARKER_AUTH_SUCCESS: &str = "Network authentication successful";

/// Key preceding the physical cell id in cell search lines.
pub const CELL_ID_KEY: &str = "PCI=";

/// Log sources whose lines feed the detector (suffix match on the source tag).
pub static OBSERVED_SOURCES: &[&str] = &["ue.log"];

/// Seconds allowed between the warning broadcast and the Authentication Request.
pub const SIB_TO_AUTH_REQUEST_SECS: u64 = 60;

/// Seconds allowed between the Authentication Request and its success.
pub const AUTH_REQUEST_TO_SUCCESS_SECS: u64 = 10;

/// One CB page: 82 octets of CB data plus one length octet, in hex.
pub const PAGE_WIDTH_HEX: usize = 83 * 2;

/// Hex characters holding the fragment count at the head of a payload.
pub const PAGE_COUNT_HEX: usize = 2;

/// Upper bound for a single external decode run.
pub const DECODE_TIMEOUT_MS: u64 = 2_000;

/// Upper bound for a single operator notification run.
pub const ALERT_TIMEOUT_MS: u64 = 5_000;

/// Poll interval while waiting on a child process.
pub const CHILD_POLL_MS: u64 = 10;

/// Bytes of a hex payload rendered under a log line.
pub const HEX_LIMIT: usize = 256;
