//! CellHound library: fake base station detection from UE protocol-stack logs.
//!
//! A rogue LTE cell can broadcast a convincing emergency warning (SIB12) but
//! cannot complete NAS authentication, because it lacks the subscriber keys.
//! This crate watches the finalized log lines of a UE stack, reassembles the
//! warning text, and times the authentication exchange that a genuine cell
//! would follow up with. A budget that runs out is a fake station verdict.
//!
//! The library is organized in layers:
//! - **Input**: `filter` (level-gated sink, one detector per observed source)
//!   and `classifier` (marker matching).
//! - **Detection**: `detector`, `timing`, `reassembly`, `decode`, `alert`.
//! - **Wire**: `protocol` and `comm`, NDJSON in and out.
//!
//! The `cellhound-daemon` binary in `daemon/` is a thin consumer that tails a
//! log file and wires stdin/stdout to the wire layer.

pub mod alert;
pub mod classifier;
pub mod comm;
pub mod decode;
pub mod defaults;
pub mod detector;
pub mod error;
pub mod exec;
pub mod filter;
pub mod protocol;
pub mod reassembly;
pub mod timing;

pub use error::DetectError;
