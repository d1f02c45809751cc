use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("error creating output file '{path}': {source}")]
    OutputFile { path: PathBuf, source: io::Error },

    #[error("error starting process: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to send kill signal to process: {0}")]
    Kill(#[source] nix::errno::Errno),

    #[error("failed to create file streamer: {0}")]
    Attach(#[source] io::Error),

    #[error("job not found: {0}")]
    JobNotFound(Uuid),
}

pub type Result<T> = std::result::Result<T, JobError>;
