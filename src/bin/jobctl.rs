use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tonic::transport::Channel;
use tonic::Request;
use uuid::Uuid;

use jobrunner::config::TlsConfig;
use jobrunner::proto::job_manager_client::JobManagerClient;
use jobrunner::proto::{
    GetJobOutputRequest, GetStatusRequest, OutputType, StartJobRequest, StopJobRequest,
};
use jobrunner::tls::TlsIdentity;

#[derive(Parser, Debug)]
#[command(name = "jobctl")]
#[command(about = "A command line client for jobrunner servers")]
struct Cli {
    /// Server host:port
    #[arg(long, global = true, default_value = "localhost:8443")]
    host: String,

    /// Path to the CA certificate used to verify the server
    #[arg(long, global = true, default_value = "certs/ca.crt")]
    ca_cert: PathBuf,

    /// Path to the client certificate
    #[arg(long, global = true, default_value = "certs/client.crt")]
    cert: PathBuf,

    /// Path to the client private key
    #[arg(long, global = true, default_value = "certs/client.key")]
    key: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new job
    Start {
        /// Path to the program to run
        command: String,
        /// Arguments passed to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Stop a running job
    Stop { job_id: String },
    /// Show the current status of a job
    Status { job_id: String },
    /// Stream a job's output from the beginning
    Attach {
        job_id: String,
        /// Attach to stderr output instead of stdout
        #[arg(long)]
        stderr: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut client = connect(&cli).await?;

    match cli.command {
        Command::Start { command, args } => {
            let resp = client
                .start_job(Request::new(StartJobRequest { command, args }))
                .await?
                .into_inner();
            let id = Uuid::from_slice(&resp.job_id)
                .map_err(|e| format!("server returned invalid job id: {e}"))?;
            println!("Started Job: {id}");
        }
        Command::Stop { job_id } => {
            let id = parse_job_id(&job_id)?;
            client
                .stop_job(Request::new(StopJobRequest {
                    job_id: id.as_bytes().to_vec(),
                }))
                .await?;
            println!("Stopped job {id}");
        }
        Command::Status { job_id } => {
            let id = parse_job_id(&job_id)?;
            let resp = client
                .get_status(Request::new(GetStatusRequest {
                    job_id: id.as_bytes().to_vec(),
                }))
                .await?
                .into_inner();
            println!("Status: {}", resp.current_status().as_str_name());
            if let Some(exit_code) = resp.exit_code {
                println!("Exit Code: {exit_code}");
            }
        }
        Command::Attach { job_id, stderr } => {
            let id = parse_job_id(&job_id)?;
            let output_type = if stderr {
                OutputType::Stderr
            } else {
                OutputType::Stdout
            };
            let mut stream = client
                .get_job_output(Request::new(GetJobOutputRequest {
                    job_id: id.as_bytes().to_vec(),
                    r#type: output_type as i32,
                }))
                .await?
                .into_inner();

            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = stream.message().await? {
                stdout.write_all(&chunk.data).await?;
                stdout.flush().await?;
            }
        }
    }

    Ok(())
}

async fn connect(cli: &Cli) -> Result<JobManagerClient<Channel>, Box<dyn std::error::Error>> {
    let tls = TlsConfig {
        ca_cert_path: cli.ca_cert.clone(),
        cert_path: cli.cert.clone(),
        key_path: cli.key.clone(),
    };
    let identity = TlsIdentity::load(&tls).await?;

    // Validate the server certificate against the hostname it was issued for.
    let domain = cli.host.split(':').next().unwrap_or("localhost");
    let channel = Channel::from_shared(format!("https://{}", cli.host))?
        .tls_config(identity.client_tls_config(domain))?
        .connect()
        .await?;
    Ok(JobManagerClient::new(channel))
}

fn parse_job_id(raw: &str) -> Result<Uuid, Box<dyn std::error::Error>> {
    Ok(Uuid::parse_str(raw).map_err(|e| format!("failed to parse job id: {e}"))?)
}
