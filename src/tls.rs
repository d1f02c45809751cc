//! TLS utilities for loading certificates and configuring mTLS.
//!
//! The server requires clients to present a certificate signed by the
//! configured CA; the client certificate's subject common name is the
//! caller's identity (see [`crate::grpc::auth`]).

use std::path::PathBuf;

use tokio::fs;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

use crate::config::TlsConfig;

/// Error type for TLS configuration issues.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("CA certificate not found: {0}")]
    CaCertNotFound(PathBuf),

    #[error("Certificate not found: {0}")]
    CertNotFound(PathBuf),

    #[error("Private key not found: {0}")]
    KeyNotFound(PathBuf),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

/// Loaded TLS materials ready for use with tonic.
///
/// Contains both this endpoint's identity (certificate + private key) and
/// the CA certificate used to verify peer certificates.
#[derive(Clone)]
pub struct TlsIdentity {
    identity: Identity,
    ca_cert: Certificate,
}

impl TlsIdentity {
    /// Load TLS materials from the file paths in the config.
    ///
    /// # Errors
    ///
    /// Returns an error if any file does not exist or cannot be read.
    pub async fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        // Validate paths exist before reading
        if !config.ca_cert_path.exists() {
            return Err(TlsError::CaCertNotFound(config.ca_cert_path.clone()));
        }
        if !config.cert_path.exists() {
            return Err(TlsError::CertNotFound(config.cert_path.clone()));
        }
        if !config.key_path.exists() {
            return Err(TlsError::KeyNotFound(config.key_path.clone()));
        }

        let ca_pem = fs::read(&config.ca_cert_path).await?;
        let cert_pem = fs::read(&config.cert_path).await?;
        let key_pem = fs::read(&config.key_path).await?;

        Ok(Self {
            identity: Identity::from_pem(cert_pem, key_pem),
            ca_cert: Certificate::from_pem(ca_pem),
        })
    }

    /// Create a server TLS config with client certificate verification.
    ///
    /// The returned config:
    /// - Presents this server's certificate to clients
    /// - Requires clients to present a valid certificate
    /// - Verifies client certificates against the CA
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(self.identity.clone())
            .client_ca_root(self.ca_cert.clone())
    }

    /// Create a client TLS config for connecting to a server.
    ///
    /// The returned config presents this client's certificate to the server
    /// and verifies the server's certificate against the CA. `domain` must
    /// match the name the server's certificate was issued for.
    pub fn client_tls_config(&self, domain: &str) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .domain_name(domain)
            .ca_certificate(self.ca_cert.clone())
            .identity(self.identity.clone())
    }
}
