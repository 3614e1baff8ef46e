//! Encoder subprocess lifecycle.
//!
//! A [`ProcessSupervisor`] owns exactly one child process. Two background
//! tasks run next to it:
//! - the exit watcher owns the `Child`, waits for it and publishes the final
//!   [`ExitState`] on a `watch` channel (it also performs the force-kill)
//! - the stderr reader forwards diagnostic lines to `tracing`, surfacing only
//!   the ones that look like errors
//!
//! Shutdown is two-phase: closing stdin signals end of stream, and the
//! process is killed only if it outlives the grace period.

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{oneshot, watch};

use crate::config::SubprocessConfig;
use crate::error::{CamwireError, Result};

/// Lifecycle of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Still running.
    Running,
    /// Exited on its own with this code.
    Exited(i32),
    /// Killed by us or terminated by a signal.
    Killed,
}

impl ExitState {
    /// Whether the process is still running.
    pub fn is_running(&self) -> bool {
        matches!(self, ExitState::Running)
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitState::Running => f.write_str("running"),
            ExitState::Exited(code) => write!(f, "exited with code {}", code),
            ExitState::Killed => f.write_str("killed"),
        }
    }
}

/// Process id, input sink and exit signal of the running child.
#[derive(Debug)]
struct ProcessHandle {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    exit_rx: watch::Receiver<ExitState>,
    kill_tx: Option<oneshot::Sender<()>>,
}

/// Owner of one encoder subprocess.
///
/// Dropping the supervisor without calling [`terminate`](Self::terminate)
/// kills the process.
#[derive(Debug)]
pub struct ProcessSupervisor {
    handle: ProcessHandle,
    grace_period: Duration,
    program: String,
}

impl ProcessSupervisor {
    /// Start the configured program with piped stdin and stderr.
    ///
    /// # Errors
    ///
    /// Returns `Spawn` if the program cannot be executed.
    pub fn spawn(config: &SubprocessConfig) -> Result<Self> {
        let program = config.program.to_string_lossy().into_owned();

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CamwireError::Spawn)?;

        let pid = child.id();
        let stdin = child.stdin.take();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, program.clone()));
        }

        let (exit_tx, exit_rx) = watch::channel(ExitState::Running);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(watch_exit(child, kill_rx, exit_tx, program.clone()));

        tracing::info!("Started {} (pid {:?})", program, pid);

        Ok(Self {
            handle: ProcessHandle {
                pid,
                stdin,
                exit_rx,
                kill_tx: Some(kill_tx),
            },
            grace_period: config.grace_period,
            program,
        })
    }

    /// Write `bytes` to the process's stdin.
    ///
    /// Write failures are logged and swallowed; the sink is closed so later
    /// calls return `NotRunning` without touching the pipe.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` if the process has exited or stdin is closed.
    pub async fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.is_running() {
            self.handle.stdin = None;
            return Err(CamwireError::NotRunning);
        }
        let Some(stdin) = self.handle.stdin.as_mut() else {
            return Err(CamwireError::NotRunning);
        };

        if let Err(e) = stdin.write_all(bytes).await {
            tracing::debug!("Write to {} stdin failed, closing it: {}", self.program, e);
            self.handle.stdin = None;
        }
        Ok(())
    }

    /// Stop the process and wait until it has fully exited.
    ///
    /// Closes stdin, waits up to the grace period for a natural exit, then
    /// force-kills. Idempotent; later calls return the same state at once.
    pub async fn terminate(&mut self) -> ExitState {
        // EOF on stdin is the encoder's cue to flush and exit.
        self.handle.stdin = None;

        let mut exit_rx = self.handle.exit_rx.clone();
        if let Ok(state) = tokio::time::timeout(self.grace_period, wait_exit(&mut exit_rx)).await {
            return state;
        }

        tracing::warn!(
            "{} still running {:?} after stdin closed, killing it",
            self.program,
            self.grace_period
        );
        if let Some(kill_tx) = self.handle.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        wait_exit(&mut exit_rx).await
    }

    /// Current exit state.
    pub fn exit_state(&self) -> ExitState {
        *self.handle.exit_rx.borrow()
    }

    /// Whether the process is still running.
    pub fn is_running(&self) -> bool {
        self.exit_state().is_running()
    }

    /// Resolves once the process has exited, whoever caused it.
    pub async fn exited(&self) -> ExitState {
        let mut exit_rx = self.handle.exit_rx.clone();
        wait_exit(&mut exit_rx).await
    }

    /// OS process id, if the process was still alive when spawned.
    pub fn pid(&self) -> Option<u32> {
        self.handle.pid
    }
}

/// Wait for the watcher to publish a final state.
async fn wait_exit(exit_rx: &mut watch::Receiver<ExitState>) -> ExitState {
    match exit_rx.wait_for(|state| !state.is_running()).await {
        Ok(state) => *state,
        // Watcher gone without reporting: the child was dropped and killed.
        Err(_) => ExitState::Killed,
    }
}

/// Own the child until it exits; kill it when asked (or when the supervisor is dropped).
async fn watch_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<ExitState>,
    program: String,
) {
    let natural = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill_rx => None,
    };

    let (status, killed) = match natural {
        Some(status) => (status, false),
        None => {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Kill of {} failed: {}", program, e);
            }
            (child.wait().await, true)
        }
    };

    let state = match status {
        Ok(status) => classify_exit(status, killed, &program),
        Err(e) => {
            tracing::error!("Waiting for {} failed: {}", program, e);
            ExitState::Killed
        }
    };

    tracing::info!("{} {}", program, state);
    let _ = exit_tx.send(state);
}

fn classify_exit(status: ExitStatus, killed: bool, program: &str) -> ExitState {
    match status.code() {
        Some(code) if !killed => {
            // 255 is what ffmpeg reports when interrupted.
            if code != 0 && code != 255 {
                tracing::warn!("{} exited unexpectedly with code {}", program, code);
            }
            ExitState::Exited(code)
        }
        Some(_) => ExitState::Killed,
        None => {
            if !killed {
                tracing::warn!("{} terminated by signal ({})", program, status);
            }
            ExitState::Killed
        }
    }
}

/// Log stderr line by line: errors at error level, the rest at trace.
async fn forward_stderr(stderr: ChildStderr, program: String) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.contains("Error") || line.contains("Invalid") {
                    tracing::error!("[{}] {}", program, line);
                } else {
                    tracing::trace!("[{}] {}", program, line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Reading {} stderr failed: {}", program, e);
                break;
            }
        }
    }
}
