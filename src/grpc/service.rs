use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::error::JobError;
use crate::grpc::auth::Principal;
use crate::job::JobState;
use crate::proto::job_manager_server::JobManager;
use crate::proto::{
    GetJobOutputRequest, GetJobOutputResponse, GetStatusRequest, GetStatusResponse, OutputType,
    StartJobRequest, StartJobResponse, Status as ProtoStatus, StopJobRequest, StopJobResponse,
};
use crate::registry::{JobRegistry, OutputStream};

/// Upper bound on the size of a single streamed output chunk.
const OUTPUT_CHUNK_SIZE: usize = 4096;

/// gRPC implementation of the job manager API, backed by a [`JobRegistry`].
pub struct JobService {
    registry: Arc<JobRegistry>,
}

impl JobService {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl JobManager for JobService {
    async fn start_job(
        &self,
        request: Request<StartJobRequest>,
    ) -> Result<Response<StartJobResponse>, Status> {
        let user = principal(&request)?;
        let req = request.into_inner();

        if req.command.trim().is_empty() {
            return Err(Status::invalid_argument("Must provide non-empty command"));
        }

        match self.registry.start_job(&user, req.command, req.args).await {
            Ok(id) => {
                tracing::info!(user = %user, job_id = %id, "Job started");
                Ok(Response::new(StartJobResponse {
                    job_id: id.as_bytes().to_vec(),
                }))
            }
            Err(e) => {
                // Spawn failures carry local details (paths, errno) that are
                // not the caller's business. Log them, return a generic code.
                tracing::error!(user = %user, error = %e, "Error starting job");
                Err(Status::internal("Error starting job"))
            }
        }
    }

    async fn stop_job(
        &self,
        request: Request<StopJobRequest>,
    ) -> Result<Response<StopJobResponse>, Status> {
        let user = principal(&request)?;
        let id = parse_job_id(&request.get_ref().job_id)?;

        match self.registry.stop(&id, &user).await {
            Ok(()) => {
                tracing::info!(user = %user, job_id = %id, "Job stopped");
                Ok(Response::new(StopJobResponse {}))
            }
            Err(JobError::JobNotFound(_)) => Err(Status::not_found("No such job exists")),
            Err(e) => {
                tracing::error!(user = %user, job_id = %id, error = %e, "Error stopping job");
                Err(Status::internal("Failed to stop job"))
            }
        }
    }

    async fn get_status(
        &self,
        request: Request<GetStatusRequest>,
    ) -> Result<Response<GetStatusResponse>, Status> {
        let user = principal(&request)?;
        let id = parse_job_id(&request.get_ref().job_id)?;

        match self.registry.status(&id, &user).await {
            Ok(status) => Ok(Response::new(GetStatusResponse {
                current_status: state_to_proto(status.state) as i32,
                exit_code: status.exit_code,
            })),
            Err(JobError::JobNotFound(_)) => Err(Status::not_found("No such job exists")),
            Err(e) => {
                tracing::error!(user = %user, job_id = %id, error = %e, "Error getting job status");
                Err(Status::internal("Error getting job status"))
            }
        }
    }

    type GetJobOutputStream = ReceiverStream<Result<GetJobOutputResponse, Status>>;

    async fn get_job_output(
        &self,
        request: Request<GetJobOutputRequest>,
    ) -> Result<Response<Self::GetJobOutputStream>, Status> {
        let user = principal(&request)?;
        let req = request.into_inner();
        let id = parse_job_id(&req.job_id)?;

        let which = match req.r#type() {
            OutputType::Stdout => OutputStream::Stdout,
            OutputType::Stderr => OutputStream::Stderr,
            OutputType::Unspecified => {
                return Err(Status::invalid_argument("Must specify valid output type"))
            }
        };

        let mut reader = match self.registry.stream(&id, &user, which).await {
            Ok(reader) => reader,
            Err(JobError::JobNotFound(_)) => return Err(Status::not_found("No such job exists")),
            Err(e) => {
                tracing::error!(user = %user, job_id = %id, error = %e, "Error attaching to job output");
                return Err(Status::internal("Error attaching to job output"));
            }
        };

        tracing::info!(user = %user, job_id = %id, ?which, "Streaming job output");

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut buf = vec![0u8; OUTPUT_CHUNK_SIZE];
            loop {
                tokio::select! {
                    // The caller can detach at any time; a closed channel
                    // unblocks a read parked on the live tail. The job and
                    // its other readers are unaffected.
                    _ = tx.closed() => {
                        tracing::info!(job_id = %id, "Job output stream cancelled");
                        break;
                    }
                    read = reader.read(&mut buf) => match read {
                        Ok(0) => break,
                        Ok(count) => {
                            let chunk = GetJobOutputResponse {
                                data: buf[..count].to_vec(),
                            };
                            if tx.send(Ok(chunk)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!(job_id = %id, error = %e, "Error occurred while reading process output");
                            let _ = tx
                                .send(Err(Status::internal(
                                    "Error occurred while reading process output",
                                )))
                                .await;
                            break;
                        }
                    },
                }
            }
            if let Err(e) = reader.close().await {
                tracing::error!(job_id = %id, error = %e, "Error closing job output reader");
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// The authenticated caller recorded by the auth interceptor.
fn principal<T>(request: &Request<T>) -> Result<String, Status> {
    request
        .extensions()
        .get::<Principal>()
        .map(|principal| principal.0.clone())
        .ok_or_else(|| Status::unauthenticated("No authenticated principal"))
}

fn parse_job_id(raw: &[u8]) -> Result<Uuid, Status> {
    Uuid::from_slice(raw).map_err(|_| Status::invalid_argument("Must provide valid job id"))
}

fn state_to_proto(state: JobState) -> ProtoStatus {
    match state {
        JobState::Running => ProtoStatus::Running,
        JobState::Stopped => ProtoStatus::Stopped,
        JobState::Complete => ProtoStatus::Complete,
    }
}
