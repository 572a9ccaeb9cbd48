//! Credential resolution for the data platform client.
//!
//! Every field resolves in the same order: the explicit command-line value,
//! then the JSON credentials file, then (only when no credentials file was
//! given) an interactive [`Prompt`]. The host additionally falls back to
//! [`DEFAULT_CDF_HOST`].

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, error, info};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{CdfError, Result};

pub const DEFAULT_CDF_HOST: &str = "https://api.cognitedata.com";

/// Authentication parameters as supplied on the command line. All optional.
#[derive(Debug, Clone, Default)]
pub struct CredentialArgs {
    pub project: Option<String>,
    pub host: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
    pub credentials_file: Option<PathBuf>,
}

/// On-disk credentials file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsFile {
    pub cdf_host: Option<String>,
    pub cdf_project: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub aad_tenant_id: Option<String>,
}

/// Source of interactively entered values.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Prompt: Send + Sync {
    /// Ask for a value that may be echoed to the terminal.
    fn prompt_visible(&self, label: &str) -> Result<String>;

    /// Ask for a value without echoing it.
    fn prompt_secret(&self, label: &str) -> Result<String>;
}

/// Outcome of resolution. Fields that no source supplied stay `None`.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub host: String,
    pub project: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("host", &self.host)
            .field("project", &self.project)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// A complete credential set, ready for client construction.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub host: String,
    pub project: String,
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("host", &self.host)
            .field("project", &self.project)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

impl ResolvedCredentials {
    /// Fails with a configuration error naming the first missing field.
    pub fn require(self) -> Result<ClientCredentials> {
        fn present(value: Option<String>, flag: &str) -> Result<String> {
            value.ok_or_else(|| {
                CdfError::Configuration(format!("no value resolved for {flag}"))
            })
        }
        Ok(ClientCredentials {
            project: present(self.project, "--cdf-project")?,
            client_id: present(self.client_id, "--client-id")?,
            client_secret: present(self.client_secret, "--client-secret")?,
            tenant_id: present(self.tenant_id, "--tenant-id")?,
            host: self.host,
        })
    }
}

/// Resolves [`CredentialArgs`] against the credentials file and a prompt.
///
/// The credentials file is read at most once, and only when some field is not
/// supplied explicitly. A failed read or parse is cached as well.
pub struct CredentialResolver<'p> {
    args: CredentialArgs,
    prompt: Option<&'p dyn Prompt>,
    file: OnceLock<std::result::Result<CredentialsFile, String>>,
}

impl<'p> CredentialResolver<'p> {
    pub fn new(args: CredentialArgs, prompt: Option<&'p dyn Prompt>) -> Self {
        Self {
            args,
            prompt,
            file: OnceLock::new(),
        }
    }

    pub fn resolve(&self) -> Result<ResolvedCredentials> {
        let mut resolved = ResolvedCredentials {
            host: self
                .field(self.args.host.as_ref(), |f| f.cdf_host.as_ref())?
                .unwrap_or_else(|| DEFAULT_CDF_HOST.to_string()),
            project: self.field(self.args.project.as_ref(), |f| f.cdf_project.as_ref())?,
            client_id: self.field(self.args.client_id.as_ref(), |f| f.client_id.as_ref())?,
            client_secret: self
                .field(self.args.client_secret.as_ref(), |f| f.client_secret.as_ref())?,
            tenant_id: self.field(self.args.tenant_id.as_ref(), |f| f.aad_tenant_id.as_ref())?,
        };

        if self.args.credentials_file.is_none() {
            if let Some(prompt) = self.prompt {
                fill_visible(prompt, &mut resolved.project, "--cdf-project")?;
                fill_visible(prompt, &mut resolved.client_id, "--client-id")?;
                fill_secret(prompt, &mut resolved.client_secret, "--client-secret")?;
                fill_visible(prompt, &mut resolved.tenant_id, "--tenant-id")?;
            }
        }

        debug!(credentials = ?resolved, "Resolved credentials");
        Ok(resolved)
    }

    fn field(
        &self,
        explicit: Option<&String>,
        from_file: impl Fn(&CredentialsFile) -> Option<&String>,
    ) -> Result<Option<String>> {
        if let Some(value) = explicit {
            return Ok(Some(value.clone()));
        }
        Ok(self.credentials_file()?.and_then(from_file).cloned())
    }

    fn credentials_file(&self) -> Result<Option<&CredentialsFile>> {
        let Some(path) = self.args.credentials_file.as_deref() else {
            return Ok(None);
        };
        match self.file.get_or_init(|| load_credentials_file(path)) {
            Ok(file) => Ok(Some(file)),
            Err(msg) => Err(CdfError::Configuration(msg.clone())),
        }
    }
}

fn fill_visible(prompt: &dyn Prompt, slot: &mut Option<String>, flag: &str) -> Result<()> {
    if slot.is_none() {
        let value = prompt.prompt_visible(&format!("Enter value for {flag}:"))?;
        *slot = Some(value).filter(|v| !v.is_empty());
    }
    Ok(())
}

fn fill_secret(prompt: &dyn Prompt, slot: &mut Option<String>, flag: &str) -> Result<()> {
    if slot.is_none() {
        let value = prompt.prompt_secret(&format!("Enter value for {flag}:"))?;
        *slot = Some(value).filter(|v| !v.is_empty());
    }
    Ok(())
}

fn load_credentials_file(path: &Path) -> std::result::Result<CredentialsFile, String> {
    info!(credentials_file = %path.display(), "Reading credentials file");
    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, credentials_file = %path.display(), "Failed to read credentials file");
        format!("failed to read credentials file {}: {e}", path.display())
    })?;
    serde_json::from_str(&content).map_err(|e| {
        error!(error = ?e, credentials_file = %path.display(), "Failed to parse credentials file");
        format!("failed to parse credentials file {}: {e}", path.display())
    })
}
