use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use jobrunner::config::{ServerConfig, TlsConfig};
use jobrunner::grpc::GrpcServer;
use jobrunner::registry::JobRegistry;
use jobrunner::shutdown;
use jobrunner::tls::TlsIdentity;

#[derive(Parser, Debug)]
#[command(name = "jobrunner")]
#[command(about = "A job runner service that executes processes and streams their output")]
struct Args {
    /// Address to listen on for gRPC
    #[arg(long, default_value = "127.0.0.1:8443")]
    listen: SocketAddr,

    /// Directory in which job output files are stored (defaults to the
    /// system temp directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Path to the CA certificate used to verify client certificates
    #[arg(long, default_value = "certs/ca.crt")]
    ca_cert: PathBuf,

    /// Path to the server certificate
    #[arg(long, default_value = "certs/server.crt")]
    cert: PathBuf,

    /// Path to the server private key
    #[arg(long, default_value = "certs/server.key")]
    key: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = ServerConfig {
        listen_addr: args.listen,
        output_dir: args.output_dir.unwrap_or_else(std::env::temp_dir),
        tls: TlsConfig {
            ca_cert_path: args.ca_cert,
            cert_path: args.cert,
            key_path: args.key,
        },
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        output_dir = %config.output_dir.display(),
        "Starting jobrunner server"
    );

    let tls_identity = TlsIdentity::load(&config.tls).await?;
    let registry = Arc::new(JobRegistry::new(config.output_dir.clone()));

    let shutdown = shutdown::shutdown_token();
    GrpcServer::new(config.listen_addr, registry, tls_identity)
        .run(shutdown)
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
