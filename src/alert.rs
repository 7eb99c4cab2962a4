/// Operator notification on a fake station verdict.
///
/// Sinks may block (they usually run an external notifier), so every sink
/// that leaves the process is bounded by a timeout. Failures are reported
/// through [`dispatch`] and never reach the detection pipeline.
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use crate::defaults::ALERT_TIMEOUT_MS;
use crate::error::DetectError;
use crate::exec::run_bounded;

/// Which authentication budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No Authentication Request after the warning broadcast.
    AuthRequest,
    /// Authentication Request seen, success never followed.
    AuthSuccess,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::AuthRequest => "auth_request",
            Phase::AuthSuccess => "auth_success",
        }
    }
}

/// Everything an operator needs to act on a verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertContext {
    pub source: String,
    /// Cell identity of the suspect, empty when unknown
    pub cell_id: String,
    /// Reassembled warning text that started the cycle
    pub message: String,
    pub phase: Phase,
    /// Time spent waiting in `phase` when the budget expired
    pub elapsed: Duration,
    /// Uptime milliseconds of the line that tripped the verdict
    pub ts: u32,
}

pub trait AlertSink: Send + Sync {
    fn trigger(&self, ctx: &AlertContext) -> Result<(), DetectError>;
}

/// Notify through `sink`, reporting and swallowing any failure.
///
/// Returns whether the notification went out.
pub fn dispatch(sink: &dyn AlertSink, ctx: &AlertContext) -> bool {
    match sink.trigger(ctx) {
        Ok(()) => true,
        Err(e) => {
            log::error!("Alert for {} not delivered: {}", ctx.source, e);
            false
        }
    }
}

/// Writes the verdict to the log at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlert;

impl AlertSink for LogAlert {
    fn trigger(&self, ctx: &AlertContext) -> Result<(), DetectError> {
        log::warn!(
            "Fake station detected on {} (cell {:?}): no {} within {:.1}s; warning text {:?}",
            ctx.source,
            ctx.cell_id,
            ctx.phase.as_str(),
            ctx.elapsed.as_secs_f64(),
            ctx.message,
        );
        Ok(())
    }
}

/// Runs an external notifier as `program [args...] <cell_id> <message>`.
///
/// Arguments are passed as a vector, never through a shell, so cell ids and
/// warning text cannot inject commands.
#[derive(Debug, Clone)]
pub struct CommandAlert {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandAlert {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_millis(ALERT_TIMEOUT_MS),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl AlertSink for CommandAlert {
    fn trigger(&self, ctx: &AlertContext) -> Result<(), DetectError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&ctx.cell_id)
            .arg(ctx.message.trim_end());
        run_bounded(&mut cmd, self.timeout)
            .map_err(|e| DetectError::AlertDispatch(format!("{}: {}", self.program.display(), e)))
    }
}

/// Fans one verdict out to several sinks. Fails if any sink failed, after
/// trying all of them.
#[derive(Default)]
pub struct AlertFanout {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl AlertFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AlertSink for AlertFanout {
    fn trigger(&self, ctx: &AlertContext) -> Result<(), DetectError> {
        let mut failed = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.trigger(ctx) {
                failed.push(e.to_string());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(DetectError::AlertDispatch(failed.join("; ")))
        }
    }
}
