/// Bounded child-process runner shared by the script decoder and the command alert.
///
/// Children are always built from an argument vector; nothing here goes
/// through a shell.
use std::io;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::defaults::CHILD_POLL_MS;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("spawn failed: {0}")]
    Spawn(#[source] io::Error),
    #[error("wait failed: {0}")]
    Wait(#[source] io::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("exited with {0}")]
    Failed(ExitStatus),
}

/// Run `cmd` to completion, killing it once `timeout` has passed.
///
/// Stdio is detached so a chatty child can never block on a full pipe.
pub fn run_bounded(cmd: &mut Command, timeout: Duration) -> Result<(), ExecError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(ExecError::Spawn)?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait().map_err(ExecError::Wait)? {
            Some(status) if status.success() => return Ok(()),
            Some(status) => return Err(ExecError::Failed(status)),
            None => {}
        }
        if Instant::now() >= deadline {
            // Child may have exited between try_wait and kill; either way reap it.
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExecError::TimedOut(timeout));
        }
        thread::sleep(Duration::from_millis(CHILD_POLL_MS));
    }
}
