//! Credential handling
//!
//! Supports the three mutually exclusive authentication strategies used by
//! GCP automation modules:
//! - Application Default Credentials (ambient discovery)
//! - Service-account key file
//! - Machine account (instance identity via the metadata server)

pub mod credentials;
pub mod kind;

pub use credentials::{CompanionFields, Credential, CredentialResolver, DEFAULT_SCOPE};
pub use kind::{AuthKind, AUTH_KIND_CHOICES};
