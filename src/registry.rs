use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{JobError, Result};
use crate::job::{Job, JobArgs, JobStatus};
use crate::streamer::LiveFileStreamer;

/// Selects which of a job's output streams to attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

struct JobEntry {
    owner: String,
    job: Arc<Job>,
    created_at: DateTime<Utc>,
}

/// Owns the set of active jobs and enforces owner-only access.
///
/// Memory-only: entries vanish on process restart. Identifiers are random
/// 128-bit tokens and are never recycled, which makes them preferable to
/// operating system process ids.
pub struct JobRegistry {
    /// Directory in which job output files are stored.
    output_dir: PathBuf,
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
}

impl JobRegistry {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new job owned by `owner` and return its identifier.
    pub async fn start_job(&self, owner: &str, command: String, args: Vec<String>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let job = Job::spawn(JobArgs {
            command,
            args,
            stdout_path: self.output_file_path(&id, "stdout"),
            stderr_path: self.output_file_path(&id, "stderr"),
        })?;

        let entry = JobEntry {
            owner: owner.to_string(),
            job: Arc::new(job),
            created_at: Utc::now(),
        };
        tracing::debug!(job_id = %id, owner, created_at = %entry.created_at, "Job registered");

        self.jobs.write().await.insert(id, entry);
        Ok(id)
    }

    /// Look up a job, returning it only when `requester` owns it. An entry
    /// owned by someone else is reported the same as a missing entry so that
    /// identifiers are not disclosed to users who don't own them.
    pub async fn lookup(&self, id: &Uuid, requester: &str) -> Option<Arc<Job>> {
        let jobs = self.jobs.read().await;
        jobs.get(id)
            .filter(|entry| entry.owner == requester)
            .map(|entry| Arc::clone(&entry.job))
    }

    /// Stop the requester's job with the given identifier.
    pub async fn stop(&self, id: &Uuid, requester: &str) -> Result<()> {
        let job = self
            .lookup(id, requester)
            .await
            .ok_or(JobError::JobNotFound(*id))?;
        job.stop()
    }

    /// Report the status of the requester's job with the given identifier.
    pub async fn status(&self, id: &Uuid, requester: &str) -> Result<JobStatus> {
        let job = self
            .lookup(id, requester)
            .await
            .ok_or(JobError::JobNotFound(*id))?;
        Ok(job.status())
    }

    /// Attach a fresh reader to one of the output streams of the requester's
    /// job with the given identifier.
    pub async fn stream(
        &self,
        id: &Uuid,
        requester: &str,
        which: OutputStream,
    ) -> Result<LiveFileStreamer> {
        let job = self
            .lookup(id, requester)
            .await
            .ok_or(JobError::JobNotFound(*id))?;
        match which {
            OutputStream::Stdout => job.stdout().await,
            OutputStream::Stderr => job.stderr().await,
        }
    }

    fn output_file_path(&self, id: &Uuid, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{id}-{suffix}"))
    }
}
