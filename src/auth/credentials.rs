//! Credential resolution and OAuth2 token exchange
//!
//! Resolution is strictly offline: it validates companion fields, discovers
//! or loads key material, and binds the requested scopes. The network is only
//! touched when a session asks the resolved [`Credential`] for an access
//! token.

use std::fmt;
use std::path::{Path, PathBuf};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::kind::AuthKind;
use crate::errors::{GcpError, Result};

/// Token endpoint used when a key file does not carry its own `token_uri`.
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Metadata server host used when `GCE_METADATA_HOST` is not set.
const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Grant type for the signed service-account assertion.
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Scope bound to a credential when the caller requests none.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Companion fields accepted alongside an [`AuthKind`]. Each field is owned
/// by exactly one kind and must be absent for the others.
#[derive(Debug, Clone, Default)]
pub struct CompanionFields {
    /// Owned by [`AuthKind::MachineAccount`].
    pub service_account_email: Option<String>,
    /// Owned by [`AuthKind::ServiceAccount`].
    pub service_account_file: Option<PathBuf>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The subset of a service-account key file the JWT-bearer grant needs.
#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

/// An authorized-user credential as written by
/// `gcloud auth application-default login`.
#[derive(Clone, Deserialize)]
struct AuthorizedUserKey {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

#[derive(Clone)]
enum Source {
    ServiceAccount { key: ServiceAccountKey, signer: EncodingKey },
    AuthorizedUser(AuthorizedUserKey),
    Metadata { email: String, host: String },
}

/// An opaque, scope-bound authorization artifact produced by exactly one
/// resolution path. Immutable once created; lives as long as the session
/// that holds it.
#[derive(Clone)]
pub struct Credential {
    source: Source,
    scopes: Vec<String>,
}

// Key material never appears in logs or debug output.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::ServiceAccount { key, .. } => format!("service-account {}", key.client_email),
            Source::AuthorizedUser(_) => "authorized-user".to_string(),
            Source::Metadata { email, .. } => format!("machine-account {email}"),
        };
        f.debug_struct("Credential")
            .field("source", &source)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credential {
    /// Bind the credential to a permission set. Replaces any previous scopes.
    pub fn with_scopes(mut self, scopes: &[String]) -> Self {
        self.scopes = scopes.to_vec();
        self
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Exchange the credential for a bearer token over `http`.
    ///
    /// Non-2xx token responses surface as [`GcpError::Api`]; anything the
    /// transport itself rejects surfaces as [`GcpError::Transport`].
    pub fn access_token(&self, http: &reqwest::blocking::Client) -> Result<String> {
        match &self.source {
            Source::ServiceAccount { key, signer } => self.service_account_token(http, key, signer),
            Source::AuthorizedUser(user) => self.refresh_token(http, user),
            Source::Metadata { email, host } => self.metadata_token(http, email, host),
        }
    }

    fn service_account_token(
        &self,
        http: &reqwest::blocking::Client,
        key: &ServiceAccountKey,
        signer: &EncodingKey,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct AssertionClaims<'a> {
            iss: &'a str,
            scope: String,
            aud: &'a str,
            iat: i64,
            exp: i64,
        }

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: self.scopes.join(" "),
            aud: &key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, signer)
            .map_err(|e| GcpError::Transport(format!("failed to sign token assertion: {e}")))?;

        debug!(token_uri = %key.token_uri, "exchanging service-account assertion");
        let response = http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .map_err(|e| GcpError::Transport(e.to_string()))?;
        read_token_response(response)
    }

    fn refresh_token(&self, http: &reqwest::blocking::Client, user: &AuthorizedUserKey) -> Result<String> {
        debug!(token_uri = %user.token_uri, "refreshing authorized-user token");
        let response = http
            .post(&user.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
                ("refresh_token", user.refresh_token.as_str()),
            ])
            .send()
            .map_err(|e| GcpError::Transport(e.to_string()))?;
        read_token_response(response)
    }

    fn metadata_token(&self, http: &reqwest::blocking::Client, email: &str, host: &str) -> Result<String> {
        let mut url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/{}/token",
            metadata_base(host),
            email
        );
        if !self.scopes.is_empty() {
            url.push_str("?scopes=");
            url.push_str(&self.scopes.join(","));
        }

        debug!(%url, "requesting token from metadata server");
        let response = http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .map_err(|e| GcpError::Transport(e.to_string()))?;
        read_token_response(response)
    }
}

/// Normalize a metadata host into a base URL. Hosts from `GCE_METADATA_HOST`
/// come without a scheme.
fn metadata_base(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("http://{host}")
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn read_token_response(response: reqwest::blocking::Response) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|e| GcpError::Transport(e.to_string()))?;
    if !status.is_success() {
        return Err(GcpError::Api {
            status: status.as_u16(),
            body,
        });
    }
    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| GcpError::Transport(format!("malformed token response: {e}")))?;
    Ok(token.access_token)
}

/// Resolves an [`AuthKind`] plus its companion fields into a [`Credential`].
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    metadata_host: Option<String>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the metadata server host. Without an override the resolver
    /// consults `GCE_METADATA_HOST` and falls back to the conventional host.
    pub fn with_metadata_host(mut self, host: impl Into<String>) -> Self {
        self.metadata_host = Some(host.into());
        self
    }

    /// Resolve credentials for `kind`, scoped to `scopes`.
    ///
    /// Validation runs before any resolution attempt: a companion field
    /// supplied for a kind that does not own it is a
    /// [`GcpError::PreconditionViolation`].
    pub fn resolve(
        &self,
        kind: AuthKind,
        fields: &CompanionFields,
        scopes: &[String],
    ) -> Result<Credential> {
        validate_companions(kind, fields)?;
        debug!(kind = %kind, "resolving credentials");

        let source = match kind {
            AuthKind::Application => self.application_default()?,
            AuthKind::ServiceAccount => {
                let path = fields.service_account_file.as_deref().ok_or_else(|| {
                    GcpError::PreconditionViolation(
                        "Service Account-based authentication requires service_account_file".to_string(),
                    )
                })?;
                load_service_account_key(path)?
            }
            AuthKind::MachineAccount => {
                let email = fields.service_account_email.clone().ok_or_else(|| {
                    GcpError::PreconditionViolation(
                        "Machine Account-based authentication requires service_account_email".to_string(),
                    )
                })?;
                Source::Metadata {
                    email,
                    host: self.metadata_host(),
                }
            }
        };

        let credential = Credential {
            source,
            scopes: Vec::new(),
        };
        Ok(credential.with_scopes(scopes))
    }

    fn metadata_host(&self) -> String {
        self.metadata_host
            .clone()
            .or_else(|| std::env::var("GCE_METADATA_HOST").ok())
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string())
    }

    /// The ambient discovery chain: explicit env var, then the gcloud
    /// well-known file, then the metadata server if a host is declared.
    fn application_default(&self) -> Result<Source> {
        if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            debug!(%path, "using GOOGLE_APPLICATION_CREDENTIALS");
            return load_adc_file(Path::new(&path));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let well_known = config_dir.join("gcloud/application_default_credentials.json");
            if well_known.exists() {
                debug!(path = %well_known.display(), "using gcloud well-known credentials file");
                return load_adc_file(&well_known);
            }
        }

        if let Some(host) = self
            .metadata_host
            .clone()
            .or_else(|| std::env::var("GCE_METADATA_HOST").ok())
        {
            debug!(%host, "falling back to metadata-server identity");
            return Ok(Source::Metadata {
                email: "default".to_string(),
                host,
            });
        }

        Err(GcpError::MissingDependency(
            "no application default credentials found; set GOOGLE_APPLICATION_CREDENTIALS, \
             run `gcloud auth application-default login`, or set GCE_METADATA_HOST on Compute Engine"
                .to_string(),
        ))
    }
}

fn validate_companions(kind: AuthKind, fields: &CompanionFields) -> Result<()> {
    if fields.service_account_email.is_some() && kind != AuthKind::MachineAccount {
        return Err(GcpError::PreconditionViolation(
            "Service Account Email only works with Machine Account-based authentication".to_string(),
        ));
    }
    if fields.service_account_file.is_some() && kind != AuthKind::ServiceAccount {
        return Err(GcpError::PreconditionViolation(
            "Service Account File only works with Service Account-based authentication".to_string(),
        ));
    }
    Ok(())
}

fn credential_file_error(path: &Path, reason: impl Into<String>) -> GcpError {
    GcpError::CredentialFile {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Load a key file that must contain a service-account key.
fn load_service_account_key(path: &Path) -> Result<Source> {
    let raw = read_key_material(path)?;
    if raw.get("type").and_then(|t| t.as_str()) == Some("authorized_user") {
        return Err(credential_file_error(path, "not a service-account key file"));
    }
    service_account_source(path, raw)
}

/// Load an ADC file, which may hold either flavor of credential.
fn load_adc_file(path: &Path) -> Result<Source> {
    let raw = read_key_material(path)?;
    match raw.get("type").and_then(|t| t.as_str()) {
        Some("authorized_user") => {
            let user: AuthorizedUserKey = serde_json::from_value(raw)
                .map_err(|e| credential_file_error(path, e.to_string()))?;
            Ok(Source::AuthorizedUser(user))
        }
        _ => service_account_source(path, raw),
    }
}

fn read_key_material(path: &Path) -> Result<serde_json::Value> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| credential_file_error(path, e.to_string()))?;
    serde_json::from_str(&contents).map_err(|e| credential_file_error(path, e.to_string()))
}

fn service_account_source(path: &Path, raw: serde_json::Value) -> Result<Source> {
    let key: ServiceAccountKey =
        serde_json::from_value(raw).map_err(|e| credential_file_error(path, e.to_string()))?;
    let signer = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| credential_file_error(path, format!("invalid private key: {e}")))?;
    Ok(Source::ServiceAccount { key, signer })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(email: Option<&str>, file: Option<&str>) -> CompanionFields {
        CompanionFields {
            service_account_email: email.map(String::from),
            service_account_file: file.map(PathBuf::from),
        }
    }

    #[test]
    fn test_email_rejected_for_non_machine_kinds() {
        for kind in [AuthKind::Application, AuthKind::ServiceAccount] {
            let err = validate_companions(kind, &fields(Some("sa@project.iam"), None)).unwrap_err();
            assert!(matches!(err, GcpError::PreconditionViolation(_)));
        }
    }

    #[test]
    fn test_file_rejected_for_non_service_account_kinds() {
        for kind in [AuthKind::Application, AuthKind::MachineAccount] {
            let err = validate_companions(kind, &fields(None, Some("/tmp/key.json"))).unwrap_err();
            assert!(matches!(err, GcpError::PreconditionViolation(_)));
        }
    }

    #[test]
    fn test_machine_account_with_file_fails_before_resolution() {
        // The file is owned by the serviceaccount kind; no key file is read
        // and no network is touched.
        let resolver = CredentialResolver::new();
        let err = resolver
            .resolve(
                AuthKind::MachineAccount,
                &fields(None, Some("/nonexistent/key.json")),
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, GcpError::PreconditionViolation(_)));
    }

    #[test]
    fn test_machine_account_without_email_fails() {
        let resolver = CredentialResolver::new();
        let err = resolver
            .resolve(AuthKind::MachineAccount, &fields(None, None), &[])
            .unwrap_err();
        assert!(matches!(err, GcpError::PreconditionViolation(_)));
    }

    #[test]
    fn test_machine_account_resolves_to_scoped_credential() {
        let resolver = CredentialResolver::new().with_metadata_host("metadata.test");
        let scopes = vec![DEFAULT_SCOPE.to_string()];
        let cred = resolver
            .resolve(AuthKind::MachineAccount, &fields(Some("sa@project.iam"), None), &scopes)
            .unwrap();
        assert_eq!(cred.scopes(), scopes.as_slice());
    }

    #[test]
    fn test_metadata_base_normalizes_scheme() {
        assert_eq!(metadata_base("metadata.google.internal"), "http://metadata.google.internal");
        assert_eq!(metadata_base("http://127.0.0.1:8554/"), "http://127.0.0.1:8554");
    }

    #[test]
    fn test_debug_output_redacts_key_material() {
        let resolver = CredentialResolver::new().with_metadata_host("metadata.test");
        let cred = resolver
            .resolve(AuthKind::MachineAccount, &fields(Some("sa@project.iam"), None), &[])
            .unwrap();
        let rendered = format!("{cred:?}");
        assert!(rendered.contains("machine-account"));
        assert!(!rendered.contains("private_key"));
    }
}
