//! The closed set of supported authentication strategies.

use std::fmt;
use std::str::FromStr;

use crate::errors::GcpError;

/// How credentials are obtained.
///
/// Each variant owns its companion fields: `ServiceAccount` a key-file path,
/// `MachineAccount` a service-account email, `Application` nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// Ambient discovery of Application Default Credentials.
    Application,
    /// A service-account key file on disk.
    ServiceAccount,
    /// The instance identity of the host machine, bound to an email.
    MachineAccount,
}

/// Wire spellings accepted in configuration and `GCP_AUTH_KIND`.
pub const AUTH_KIND_CHOICES: &[&str] = &["application", "serviceaccount", "machineaccount"];

impl AuthKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthKind::Application => "application",
            AuthKind::ServiceAccount => "serviceaccount",
            AuthKind::MachineAccount => "machineaccount",
        }
    }
}

impl FromStr for AuthKind {
    type Err = GcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "application" => Ok(AuthKind::Application),
            "serviceaccount" => Ok(AuthKind::ServiceAccount),
            "machineaccount" => Ok(AuthKind::MachineAccount),
            other => Err(GcpError::UnsupportedAuthKind(other.to_string())),
        }
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
