use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::grpc::auth;
use crate::grpc::service::JobService;
use crate::proto::job_manager_server::JobManagerServer;
use crate::registry::JobRegistry;
use crate::tls::TlsIdentity;

pub struct GrpcServer {
    addr: SocketAddr,
    registry: Arc<JobRegistry>,
    tls_identity: TlsIdentity,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, registry: Arc<JobRegistry>, tls_identity: TlsIdentity) -> Self {
        Self {
            addr,
            registry,
            tls_identity,
        }
    }

    /// Serve the job manager API until the shutdown token fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), tonic::transport::Error> {
        let service = JobService::new(self.registry);

        tracing::info!(addr = %self.addr, "Starting gRPC server");

        Server::builder()
            .tls_config(self.tls_identity.server_tls_config())?
            .add_service(JobManagerServer::with_interceptor(
                service,
                auth::authenticate,
            ))
            .serve_with_shutdown(self.addr, shutdown.cancelled_owned())
            .await
    }
}
