use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::streamer::LiveFileStreamer;

// Owner can read and write, group members can read.
const OUTPUT_FILE_MODE: u32 = 0o640;

/// Current process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// The process is currently running.
    Running,
    /// The process was deliberately stopped by the caller. Different from
    /// [`Complete`](JobState::Complete) in that the kill signal we sent is
    /// what actually ended the process.
    Stopped,
    /// Not necessarily a success (see the exit code for that). The process
    /// is no longer running for any reason other than a caller stop.
    Complete,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Running => write!(f, "running"),
            JobState::Stopped => write!(f, "stopped"),
            JobState::Complete => write!(f, "complete"),
        }
    }
}

/// Read-only status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    /// Present only when the process exited with a code. Absent while
    /// running and for signal terminations.
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct JobArgs {
    pub command: String,
    pub args: Vec<String>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

#[derive(Debug, Default)]
struct ExitState {
    exited: bool,
    user_killed: bool,
    exit_code: Option<i32>,
    signal: Option<i32>,
}

/// Derive the externally visible state from an exit-state snapshot.
fn derive_state(state: &ExitState) -> JobState {
    if !state.exited {
        return JobState::Running;
    }
    // The 'user_killed' flag may be set even though the process exited on
    // its own just as stop() was called. Only report Stopped when the kill
    // signal is what actually terminated it.
    if state.user_killed && state.signal == Some(Signal::SIGKILL as i32) {
        return JobState::Stopped;
    }
    JobState::Complete
}

/// A supervised child process whose stdout and stderr are persisted to two
/// append-only files.
///
/// The job owns the child for its whole life and publishes a one-shot
/// writer-done signal once the child has been reaped, at which point the
/// output files are at their final length. Fresh output readers can be
/// attached at any time, before or after exit; each replays its file from
/// byte 0 and terminates cleanly on the writer-done signal.
///
/// All methods are safe to invoke from multiple tasks concurrently.
pub struct Job {
    state: Arc<Mutex<ExitState>>,
    pid: Pid,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    writer_done: CancellationToken,
}

impl Job {
    /// Spawn the command described by `args` and begin supervising it.
    ///
    /// On failure nothing observable persists: file handles are released and
    /// no child is left behind.
    pub fn spawn(args: JobArgs) -> Result<Self, JobError> {
        let stdout_file = create_output_file(&args.stdout_path)?;
        let stderr_file = create_output_file(&args.stderr_path)?;

        // The files move into the child as its stdout/stderr; this process
        // keeps no write handle. Once the child is reaped its descriptors
        // are gone and the files can never grow again.
        let child = Command::new(&args.command)
            .args(&args.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file))
            .spawn()
            .map_err(JobError::Spawn)?;

        let pid = match child.id() {
            Some(pid) => Pid::from_raw(pid as i32),
            None => {
                return Err(JobError::Spawn(io::Error::other(
                    "process exited before it could be tracked",
                )))
            }
        };

        let state = Arc::new(Mutex::new(ExitState::default()));
        let writer_done = CancellationToken::new();
        tokio::spawn(supervise(child, Arc::clone(&state), writer_done.clone()));

        Ok(Self {
            state,
            pid,
            stdout_path: args.stdout_path,
            stderr_path: args.stderr_path,
            writer_done,
        })
    }

    /// Snapshot the job's status. Non-blocking.
    pub fn status(&self) -> JobStatus {
        let state = lock_state(&self.state);
        JobStatus {
            state: derive_state(&state),
            exit_code: state.exit_code,
        }
    }

    /// Send an uncatchable kill signal to the process. Succeeds without
    /// effect if the process has already exited. Does not wait for the
    /// process to terminate; observe completion via [`status`](Job::status).
    pub fn stop(&self) -> Result<(), JobError> {
        let mut state = lock_state(&self.state);
        if !state.exited {
            signal::kill(self.pid, Signal::SIGKILL).map_err(JobError::Kill)?;
            // Track that a successful kill signal was sent to a running
            // process by the caller.
            state.user_killed = true;
        }
        Ok(())
    }

    /// Attach a fresh reader to the job's stdout file.
    pub async fn stdout(&self) -> Result<LiveFileStreamer, JobError> {
        self.watch_output(&self.stdout_path).await
    }

    /// Attach a fresh reader to the job's stderr file.
    pub async fn stderr(&self) -> Result<LiveFileStreamer, JobError> {
        self.watch_output(&self.stderr_path).await
    }

    async fn watch_output(&self, path: &Path) -> Result<LiveFileStreamer, JobError> {
        LiveFileStreamer::new(path, self.writer_done.clone())
            .await
            .map_err(JobError::Attach)
    }
}

/// Wait for the child to terminate, record its exit state, then fire the
/// writer-done signal.
async fn supervise(mut child: Child, state: Arc<Mutex<ExitState>>, writer_done: CancellationToken) {
    let result = child.wait().await;
    {
        let mut state = lock_state(&state);
        state.exited = true;
        match result {
            Ok(status) => {
                state.exit_code = status.code();
                state.signal = status.signal();
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed waiting on child process");
            }
        }
    }
    // The child has been reaped, so the only write handles to the output
    // files are closed and every byte it wrote is visible to a subsequent
    // read. Observers of this signal find the files at their final length.
    writer_done.cancel();
}

fn lock_state(state: &Mutex<ExitState>) -> MutexGuard<'_, ExitState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn create_output_file(path: &Path) -> Result<std::fs::File, JobError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(OUTPUT_FILE_MODE)
        .open(path)
        .map_err(|source| JobError::OutputFile {
            path: path.to_path_buf(),
            source,
        })
}
