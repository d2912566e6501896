//! Error types for gcpkit

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gcpkit
#[derive(Error, Debug)]
pub enum GcpError {
    /// The ambient environment offers no way to produce credentials.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// A companion field was supplied for an auth kind that does not own it,
    /// or a required companion field is absent.
    #[error("precondition violation: {0}")]
    PreconditionViolation(String),

    /// The configured auth kind matches none of the supported variants.
    #[error("credential type '{0}' not implemented")]
    UnsupportedAuthKind(String),

    /// A service-account key file could not be read or parsed.
    #[error("cannot load credential file {}: {reason}", path.display())]
    CredentialFile { path: PathBuf, reason: String },

    /// A transport-level failure (connection refused, timeout, malformed
    /// response). Callers never see the underlying client library's types.
    #[error("transport error: {0}")]
    Transport(String),

    /// A non-success API response, raised only by an explicit status check.
    #[error("GCP returned error {status}: {body}")]
    Api { status: u16, body: String },

    /// The supplied configuration violates the argument contract.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GcpError>;
