//! Module argument contract
//!
//! Declares the merged, validated shape of the configuration an automation
//! module accepts: the credential fields every module shares plus whatever
//! fields the caller declares on top. Validation applies environment
//! fallbacks, enforces required fields, choice lists, and mutual exclusion,
//! and produces a [`ResolvedConfig`] that feeds credential resolution
//! directly. All of this happens before any network activity.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::debug;

use crate::auth::credentials::DEFAULT_SCOPE;
use crate::auth::kind::AUTH_KIND_CHOICES;
use crate::auth::{AuthKind, CompanionFields, Credential, CredentialResolver};
use crate::client::AuthenticatedSession;
use crate::errors::{GcpError, Result};

/// The value shape a declared field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Str,
    Path,
    List,
    Dict,
    Bool,
    Int,
}

/// Declaration of one accepted configuration field.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub arg_type: ArgType,
    pub required: bool,
    pub choices: Vec<String>,
    pub env_fallback: Option<String>,
}

impl ArgSpec {
    pub fn new(arg_type: ArgType) -> Self {
        Self {
            arg_type,
            required: false,
            choices: Vec::new(),
            env_fallback: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_env_fallback(mut self, var: &str) -> Self {
        self.env_fallback = Some(var.to_string());
        self
    }
}

/// The merged set of accepted fields plus cross-field constraints.
///
/// [`ModuleArgumentContract::new`] seeds the contract every module shares;
/// caller declarations merge over it and win on name collision.
#[derive(Debug, Clone)]
pub struct ModuleArgumentContract {
    fields: BTreeMap<String, ArgSpec>,
    mutually_exclusive: Vec<(String, String)>,
}

impl Default for ModuleArgumentContract {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleArgumentContract {
    /// The base contract: `project` plus the credential fields, with their
    /// environment fallbacks and the email/file mutual exclusion.
    pub fn new() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("project".to_string(), ArgSpec::new(ArgType::Str).required());
        fields.insert(
            "auth_kind".to_string(),
            ArgSpec::new(ArgType::Str)
                .with_choices(AUTH_KIND_CHOICES)
                .with_env_fallback("GCP_AUTH_KIND"),
        );
        fields.insert(
            "service_account_email".to_string(),
            ArgSpec::new(ArgType::Str).with_env_fallback("GCP_SERVICE_ACCOUNT_EMAIL"),
        );
        fields.insert(
            "service_account_file".to_string(),
            ArgSpec::new(ArgType::Path).with_env_fallback("GCP_SERVICE_ACCOUNT_FILE"),
        );
        fields.insert(
            "scopes".to_string(),
            ArgSpec::new(ArgType::List).with_env_fallback("GCP_SCOPES"),
        );

        Self {
            fields,
            mutually_exclusive: vec![(
                "service_account_email".to_string(),
                "service_account_file".to_string(),
            )],
        }
    }

    /// Declare (or override) a field.
    pub fn with_field(mut self, name: &str, spec: ArgSpec) -> Self {
        self.fields.insert(name.to_string(), spec);
        self
    }

    /// Register an additional mutually exclusive pair.
    pub fn with_mutually_exclusive(mut self, a: &str, b: &str) -> Self {
        self.mutually_exclusive.push((a.to_string(), b.to_string()));
        self
    }

    /// Validate `config` against the contract and resolve environment
    /// fallbacks.
    ///
    /// Null values count as absent, matching how automation frontends pass
    /// undeclared optional fields.
    pub fn validate(&self, config: &Map<String, Value>) -> Result<ResolvedConfig> {
        for name in config.keys() {
            if !self.fields.contains_key(name) {
                return Err(GcpError::InvalidConfiguration(format!(
                    "unsupported parameter: {name}"
                )));
            }
        }

        let mut params: Map<String, Value> = config
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        for (name, spec) in &self.fields {
            if params.contains_key(name) {
                continue;
            }
            let Some(var) = &spec.env_fallback else { continue };
            let Ok(raw) = std::env::var(var) else { continue };
            debug!(field = %name, env = %var, "applying environment fallback");
            params.insert(name.clone(), env_value(&raw, spec.arg_type));
        }

        for (name, spec) in &self.fields {
            match params.get(name) {
                Some(value) => {
                    check_type(name, spec, value)?;
                    check_choices(name, spec, value)?;
                }
                None if spec.required => {
                    return Err(GcpError::InvalidConfiguration(format!(
                        "missing required parameter: {name}"
                    )));
                }
                None => {}
            }
        }

        for (a, b) in &self.mutually_exclusive {
            if params.contains_key(a) && params.contains_key(b) {
                return Err(GcpError::InvalidConfiguration(format!(
                    "parameters are mutually exclusive: {a}, {b}"
                )));
            }
        }

        ResolvedConfig::from_params(params)
    }
}

fn env_value(raw: &str, arg_type: ArgType) -> Value {
    match arg_type {
        ArgType::List => Value::Array(
            raw.split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect(),
        ),
        _ => Value::String(raw.to_string()),
    }
}

fn check_type(name: &str, spec: &ArgSpec, value: &Value) -> Result<()> {
    let ok = match spec.arg_type {
        ArgType::Str | ArgType::Path => value.is_string(),
        ArgType::List => value.is_array(),
        ArgType::Dict => value.is_object(),
        ArgType::Bool => value.is_boolean(),
        ArgType::Int => value.is_i64() || value.is_u64(),
    };
    if ok {
        Ok(())
    } else {
        Err(GcpError::InvalidConfiguration(format!(
            "parameter {name} has the wrong type"
        )))
    }
}

fn check_choices(name: &str, spec: &ArgSpec, value: &Value) -> Result<()> {
    if spec.choices.is_empty() {
        return Ok(());
    }
    let Some(s) = value.as_str() else {
        return Ok(());
    };
    if spec.choices.iter().any(|c| c == s) {
        Ok(())
    } else {
        Err(GcpError::InvalidConfiguration(format!(
            "value of {name} must be one of: {}, got: {s}",
            spec.choices.join(", ")
        )))
    }
}

/// Configuration after contract validation: the typed credential inputs plus
/// the full parameter tree for reference rewriting.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub project: String,
    pub auth_kind: Option<AuthKind>,
    pub service_account_email: Option<String>,
    pub service_account_file: Option<PathBuf>,
    pub scopes: Vec<String>,
    /// The validated tree, fallbacks applied. Owned by the workflow; the
    /// rewriting operations in [`crate::params`] run against it.
    pub params: Map<String, Value>,
}

impl ResolvedConfig {
    fn from_params(params: Map<String, Value>) -> Result<Self> {
        let project = params
            .get("project")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                GcpError::InvalidConfiguration("missing required parameter: project".to_string())
            })?
            .to_string();

        let auth_kind = params
            .get("auth_kind")
            .and_then(|v| v.as_str())
            .map(|s| s.parse::<AuthKind>())
            .transpose()?;

        let scopes = match params.get("scopes").and_then(|v| v.as_array()) {
            Some(items) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(String::from)
                .collect(),
            None => vec![DEFAULT_SCOPE.to_string()],
        };

        Ok(Self {
            project,
            auth_kind,
            service_account_email: params
                .get("service_account_email")
                .and_then(|v| v.as_str())
                .map(String::from),
            service_account_file: params
                .get("service_account_file")
                .and_then(|v| v.as_str())
                .map(PathBuf::from),
            scopes,
            params,
        })
    }

    pub fn companion_fields(&self) -> CompanionFields {
        CompanionFields {
            service_account_email: self.service_account_email.clone(),
            service_account_file: self.service_account_file.clone(),
        }
    }

    /// Resolve credentials for this configuration.
    pub fn credential(&self, resolver: &CredentialResolver) -> Result<Credential> {
        let kind = self.auth_kind.ok_or_else(|| {
            GcpError::InvalidConfiguration(
                "auth_kind is required to build credentials".to_string(),
            )
        })?;
        resolver.resolve(kind, &self.companion_fields(), &self.scopes)
    }

    /// Wire contract, resolver, and session together the way module
    /// workflows compose them.
    pub fn session(&self, product: &str) -> Result<AuthenticatedSession> {
        let credential = self.credential(&CredentialResolver::new())?;
        AuthenticatedSession::new(credential, product)
    }
}
