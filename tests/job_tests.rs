//! Tests for job lifecycle: spawning, status transitions, stopping, and
//! attaching output readers. Jobs run the `echo-job` helper binary, which
//! writes "stdout N" / "stderr N" once every 500 ms.

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use jobrunner::job::{Job, JobArgs, JobState};
use jobrunner::streamer::LiveFileStreamer;

const ECHO_JOB: &str = env!("CARGO_BIN_EXE_echo-job");

fn echo_args(dir: &Path, count: u32) -> JobArgs {
    JobArgs {
        command: ECHO_JOB.to_string(),
        args: vec![count.to_string()],
        stdout_path: dir.join("file.stdout"),
        stderr_path: dir.join("file.stderr"),
    }
}

fn expect_echo_output(stream: &str, count: usize) -> String {
    (1..=count).map(|n| format!("{stream} {n}\n")).collect()
}

async fn read_to_end(streamer: &mut LiveFileStreamer) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let count = streamer.read(&mut buf).await?;
        if count == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..count]);
    }
}

async fn read_full(streamer: &mut LiveFileStreamer, want: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(want);
    let mut buf = vec![0u8; want];
    while out.len() < want {
        let count = streamer
            .read(&mut buf[..want - out.len()])
            .await
            .expect("read failed");
        assert!(count > 0, "unexpected end of stream");
        out.extend_from_slice(&buf[..count]);
    }
    out
}

/// Poll the job status until it reaches `want` or the timeout elapses.
async fn wait_for_state(job: &Job, want: JobState, timeout: Duration) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout {
        if job.status().state == want {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// First happy path test of the job: full stdout, then stderr after the
// process has already exited.
#[tokio::test]
async fn happy_tail() {
    let dir = TempDir::new().unwrap();
    // Takes >= 2.5 seconds to complete
    let job = Job::spawn(echo_args(dir.path(), 5)).expect("Failed to spawn job");

    assert_eq!(job.status().state, JobState::Running);

    let mut stdout = job.stdout().await.unwrap();
    let mut stderr = job.stderr().await.unwrap();

    let stdout_data = read_to_end(&mut stdout).await.unwrap();
    assert_eq!(stdout_data, expect_echo_output("stdout", 5).as_bytes());

    // The process has exited by now, but stderr is still fully readable.
    let status = job.status();
    assert_eq!(status.state, JobState::Complete);
    assert_eq!(status.exit_code, Some(0));

    let stderr_data = read_to_end(&mut stderr).await.unwrap();
    assert_eq!(stderr_data, expect_echo_output("stderr", 5).as_bytes());

    stdout.close().await.unwrap();
    stderr.close().await.unwrap();
}

#[tokio::test]
async fn bad_output_paths() {
    let dir = TempDir::new().unwrap();
    let mut args = echo_args(dir.path(), 5);
    args.stdout_path = dir.path().join("missing").join("file.stdout");
    args.stderr_path = dir.path().join("missing").join("file.stderr");

    assert!(Job::spawn(args).is_err());
}

#[tokio::test]
async fn missing_command_fails() {
    let dir = TempDir::new().unwrap();
    let mut args = echo_args(dir.path(), 5);
    args.command = dir.path().join("notexists").display().to_string();

    assert!(Job::spawn(args).is_err());
}

#[tokio::test]
async fn stop_mid_run() {
    let dir = TempDir::new().unwrap();
    // Would take >= 250 seconds to complete on its own
    let job = Job::spawn(echo_args(dir.path(), 500)).expect("Failed to spawn job");

    job.stop().expect("Failed to stop job");

    assert!(
        wait_for_state(&job, JobState::Stopped, Duration::from_secs(1)).await,
        "job should reach Stopped"
    );
    // Killed by a signal, so there is no exit code to report.
    assert_eq!(job.status().exit_code, None);
}

#[tokio::test]
async fn stop_is_idempotent_and_harmless_after_exit() {
    let dir = TempDir::new().unwrap();
    let job = Job::spawn(echo_args(dir.path(), 1)).expect("Failed to spawn job");

    assert!(
        wait_for_state(&job, JobState::Complete, Duration::from_secs(5)).await,
        "job should complete on its own"
    );

    // Stopping an exited job succeeds without effect, any number of times.
    job.stop().unwrap();
    job.stop().unwrap();

    let status = job.status();
    assert_eq!(status.state, JobState::Complete);
    assert_eq!(status.exit_code, Some(0));
}

// Attach to stdout, detach shortly after, then attach again: the second
// reader replays the stream from the beginning.
#[tokio::test]
async fn detach_and_reattach() {
    let dir = TempDir::new().unwrap();
    let job = Job::spawn(echo_args(dir.path(), 15)).expect("Failed to spawn job");

    let mut first = job.stdout().await.unwrap();
    let first_data = read_full(&mut first, 8).await;
    first.close().await.unwrap();

    let mut second = job.stdout().await.unwrap();
    let second_data = read_full(&mut second, 8).await;

    // Each attach restarts at the beginning of the stream.
    assert_eq!(first_data, second_data);
    assert_eq!(first_data, b"stdout 1");

    // Stop the job and wait for it to finish by draining the reader.
    job.stop().unwrap();
    read_to_end(&mut second).await.unwrap();
    assert_eq!(job.status().state, JobState::Stopped);
    second.close().await.unwrap();
}

#[tokio::test]
async fn concurrent_readers_deliver_identical_bytes() {
    let dir = TempDir::new().unwrap();
    let job = Job::spawn(echo_args(dir.path(), 3)).expect("Failed to spawn job");

    let mut first = job.stdout().await.unwrap();
    let mut second = job.stdout().await.unwrap();

    let (first_data, second_data) =
        tokio::join!(read_to_end(&mut first), read_to_end(&mut second));
    let first_data = first_data.unwrap();
    assert_eq!(first_data, second_data.unwrap());
    assert_eq!(first_data, expect_echo_output("stdout", 3).as_bytes());

    first.close().await.unwrap();
    second.close().await.unwrap();
}

// A child that writes nothing and exits immediately: readers see a clean
// end-of-stream with zero bytes delivered.
#[tokio::test]
async fn silent_child() {
    let dir = TempDir::new().unwrap();
    let job = Job::spawn(echo_args(dir.path(), 0)).expect("Failed to spawn job");

    let mut stdout = job.stdout().await.unwrap();
    let mut stderr = job.stderr().await.unwrap();

    assert!(read_to_end(&mut stdout).await.unwrap().is_empty());
    assert!(read_to_end(&mut stderr).await.unwrap().is_empty());

    let status = job.status();
    assert_eq!(status.state, JobState::Complete);
    assert_eq!(status.exit_code, Some(0));

    stdout.close().await.unwrap();
    stderr.close().await.unwrap();
}
