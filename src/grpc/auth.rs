//! Client-certificate authentication.
//!
//! The TLS layer has already verified the client certificate against the CA
//! by the time a request reaches the interceptor; all that is left is to dig
//! the subject common name out of the certificate and record it as the
//! caller's identity.

use tonic::{Request, Status};
use x509_parser::prelude::*;

/// The authenticated identity of a caller, derived from the client
/// certificate's subject common name. Stored as a request extension by
/// [`authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

/// Interceptor that requires a verified client certificate and records the
/// caller's identity as a request extension. Assumes clients present exactly
/// one certificate. Applies uniformly to unary and streaming calls.
pub fn authenticate(mut request: Request<()>) -> Result<Request<()>, Status> {
    let certs = request
        .peer_certs()
        .ok_or_else(|| Status::unauthenticated("No TLS info"))?;
    if certs.len() != 1 {
        return Err(Status::unauthenticated(
            "Client must present exactly one certificate",
        ));
    }

    let (_, cert) = X509Certificate::from_der(certs[0].as_ref())
        .map_err(|_| Status::unauthenticated("Could not parse client certificate"))?;
    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .ok_or_else(|| Status::unauthenticated("Client certificate has no common name"))?;

    let principal = Principal(common_name.to_string());
    request.extensions_mut().insert(principal);
    Ok(request)
}
