//! Bounded command execution.
//!
//! Commands run through `/bin/sh -c` in their own process group, with stdin
//! closed and stdout/stderr drained on helper threads so a chatty child can
//! never block on a full pipe.
//!
//! # Graceful Degradation
//!
//! - Spawn failure: returns ExecError::Spawn
//! - Timeout: the process group receives SIGTERM, then SIGKILL after the
//!   grace period; returns ExecError::TimedOut with whatever stdout arrived
//! - Background jobs outliving the shell: the group is stopped the same way
//!   once the shell exits, so they cannot hold the check open
//! - Timeout too large to represent: treated as no timeout
//! - Cancellation: same termination sequence; returns ExecError::Cancelled
//! - Non-UTF8 output: converted lossily
//!
//! No function in this module will panic.

use crate::engine::cancel::CancellationToken;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Shell used to interpret check commands.
pub const SHELL: &str = "/bin/sh";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Reasons a command did not run to completion.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {}s", .timeout.as_secs_f64())]
    TimedOut { timeout: Duration, stdout: String },

    #[error("cancelled while running")]
    Cancelled,

    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Limits applied to a single command execution.
#[derive(Debug, Clone)]
pub struct ExecLimits<'a> {
    pub timeout: Duration,
    pub kill_grace: Duration,
    pub cancel: &'a CancellationToken,
}

enum Stopped {
    TimedOut,
    Cancelled,
    WaitFailed(std::io::Error),
}

/// Run `command` under the shell, bounded by `limits`.
pub fn run_shell(command: &str, limits: &ExecLimits<'_>) -> Result<CommandOutput, ExecError> {
    let mut cmd = Command::new(SHELL);
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        command: command.to_string(),
        source,
    })?;
    debug!(pid = child.id(), command, "spawned");

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let pipes = [&stdout, &stderr];

    // None when the timeout is too large to represent; such a command only
    // stops on exit or cancellation.
    let deadline = start.checked_add(limits.timeout);
    let waited = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {
                if limits.cancel.is_cancelled() {
                    terminate(&mut child, limits.kill_grace, &pipes);
                    break Err(Stopped::Cancelled);
                }
                if reached(deadline) {
                    terminate(&mut child, limits.kill_grace, &pipes);
                    break Err(Stopped::TimedOut);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                terminate(&mut child, limits.kill_grace, &pipes);
                break Err(Stopped::WaitFailed(e));
            }
        }
    };

    // Background jobs left behind by the shell still hold the pipes open.
    if waited.is_ok() && !all_closed(&pipes) {
        debug!(pid = child.id(), "shell exited with processes still attached");
        stop_group(child.id(), limits.kill_grace, || all_closed(&pipes));
    }

    let collect_by = Instant::now().checked_add(limits.kill_grace);
    let stdout = stdout.collect(collect_by);
    let stderr = stderr.collect(collect_by);

    match waited {
        Ok(status) => Ok(CommandOutput {
            exit_code: status.code(),
            stdout,
            stderr,
            duration: start.elapsed(),
        }),
        Err(Stopped::TimedOut) => Err(ExecError::TimedOut {
            timeout: limits.timeout,
            stdout,
        }),
        Err(Stopped::Cancelled) => Err(ExecError::Cancelled),
        Err(Stopped::WaitFailed(source)) => Err(ExecError::Wait {
            command: command.to_string(),
            source,
        }),
    }
}

/// Output of one pipe, accumulated on a helper thread.
///
/// The buffer is shared so that whatever arrived can still be read when a
/// process outside our group keeps the pipe open forever.
struct Pipe {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

impl Pipe {
    /// True once the reader saw end of file (or there was no pipe)
    fn is_closed(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for end of file until `by` (forever when `None`), then take
    /// what was read.
    fn collect(self, by: Option<Instant>) -> String {
        while !self.is_closed() && !reached(by) {
            thread::sleep(POLL_INTERVAL);
        }
        match self.handle {
            Some(handle) if handle.is_finished() => {
                let _ = handle.join();
            }
            Some(_) => warn!("pipe still held open by a detached process; output may be incomplete"),
            None => {}
        }

        let bytes = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Pipe {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let handle = pipe.map(|mut pipe| {
        let buf = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => buf
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        })
    });
    Pipe { buf, handle }
}

fn all_closed(pipes: &[&Pipe]) -> bool {
    pipes.iter().all(|p| p.is_closed())
}

/// Stop a command that is still running, then reap the shell.
fn terminate(child: &mut Child, grace: Duration, pipes: &[&Pipe]) {
    let pid = child.id();
    warn!(pid, grace_ms = grace.as_millis() as u64, "terminating command");
    stop_group(pid, grace, || matches!(child.try_wait(), Ok(Some(_))) && all_closed(pipes));
    let _ = child.kill();
    let _ = child.wait();
}

/// SIGTERM the process group, wait up to `grace` until `settled`, then
/// SIGKILL whatever is left.
fn stop_group(pid: u32, grace: Duration, mut settled: impl FnMut() -> bool) {
    signal_group(pid, Signal::Term);

    let deadline = Instant::now().checked_add(grace);
    while !reached(deadline) && !settled() {
        thread::sleep(POLL_INTERVAL);
    }

    signal_group(pid, Signal::Kill);
}

/// `None` stands for a deadline too far out to represent, which never comes.
fn reached(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: Signal) {
    let raw = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        warn!(pid, "pid out of range for a process group");
        return;
    };

    // The group was created at spawn with the shell as leader.
    // SAFETY: killpg has no memory-safety preconditions.
    let rc = unsafe { libc::killpg(pgid, raw) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        // ESRCH: every member already exited
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pid, ?signal, error = %err, "could not signal process group");
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: Signal) {}
