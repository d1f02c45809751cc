use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Directory in which job output files are stored.
    pub output_dir: PathBuf,
    pub tls: TlsConfig,
}

/// Certificate material locations. All three are required: the server only
/// speaks mutually authenticated TLS.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub ca_cert_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}
