//! Tests for the job registry's identifier assignment and owner scoping.

use std::time::Duration;

use tempfile::TempDir;

use jobrunner::error::JobError;
use jobrunner::job::JobState;
use jobrunner::registry::{JobRegistry, OutputStream};
use uuid::Uuid;

const ECHO_JOB: &str = env!("CARGO_BIN_EXE_echo-job");

fn test_registry() -> (JobRegistry, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    (JobRegistry::new(dir.path().to_path_buf()), dir)
}

async fn start_echo(registry: &JobRegistry, owner: &str, count: u32) -> Uuid {
    registry
        .start_job(owner, ECHO_JOB.to_string(), vec![count.to_string()])
        .await
        .expect("Failed to start job")
}

#[tokio::test]
async fn start_assigns_distinct_ids_and_output_paths() {
    let (registry, dir) = test_registry();

    let first = start_echo(&registry, "someuser", 1).await;
    let second = start_echo(&registry, "someuser", 1).await;
    assert_ne!(first, second);

    // Output files live under the registry's directory, named by identifier.
    for id in [first, second] {
        assert!(dir.path().join(format!("{id}-stdout")).exists());
        assert!(dir.path().join(format!("{id}-stderr")).exists());
    }
}

#[tokio::test]
async fn lookup_is_scoped_to_the_owner() {
    let (registry, _dir) = test_registry();
    let id = start_echo(&registry, "alice", 1).await;

    assert!(registry.lookup(&id, "alice").await.is_some());
    // An entry owned by someone else looks exactly like a missing entry.
    assert!(registry.lookup(&id, "bob").await.is_none());
    assert!(registry.lookup(&Uuid::new_v4(), "alice").await.is_none());
}

#[tokio::test]
async fn operations_on_foreign_jobs_are_not_found() {
    let (registry, _dir) = test_registry();
    let id = start_echo(&registry, "alice", 500).await;

    assert!(matches!(
        registry.stop(&id, "bob").await,
        Err(JobError::JobNotFound(_))
    ));
    assert!(matches!(
        registry.status(&id, "bob").await,
        Err(JobError::JobNotFound(_))
    ));
    assert!(matches!(
        registry.stream(&id, "bob", OutputStream::Stdout).await,
        Err(JobError::JobNotFound(_))
    ));

    // The job is untouched by the denied attempts.
    let status = registry.status(&id, "alice").await.unwrap();
    assert_eq!(status.state, JobState::Running);

    registry.stop(&id, "alice").await.unwrap();
}

#[tokio::test]
async fn stop_and_stream_delegate_to_the_job() {
    let (registry, _dir) = test_registry();
    let id = start_echo(&registry, "someuser", 500).await;

    let mut reader = registry
        .stream(&id, "someuser", OutputStream::Stdout)
        .await
        .unwrap();

    registry.stop(&id, "someuser").await.unwrap();

    // Draining the reader observes the stop as a clean end of stream.
    let mut buf = [0u8; 1024];
    loop {
        let count = tokio::time::timeout(Duration::from_secs(2), reader.read(&mut buf))
            .await
            .expect("read should settle after a stop")
            .unwrap();
        if count == 0 {
            break;
        }
    }
    reader.close().await.unwrap();

    let status = registry.status(&id, "someuser").await.unwrap();
    assert_eq!(status.state, JobState::Stopped);
}
