//! Connection settings for the API server.
//!
//! Inside a pod the service account mounted by the kubelet is used. Outside
//! a cluster the settings come from a kubeconfig file, by default the one
//! kubeadm writes for the scheduler.

use crate::error::{ClientError, Result};
use base64::Engine;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory where the kubelet mounts the pod's service account
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Kubeconfig used when not running inside a cluster
pub const DEFAULT_KUBECONFIG: &str = "/etc/kubernetes/scheduler.conf";

pub const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
pub const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

/// Resolved connection settings
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    /// API server base URL
    pub server: String,
    /// Bearer token sent with every request
    pub bearer_token: Option<String>,
    /// PEM bundle of the cluster CA
    pub root_ca_pem: Option<Vec<u8>>,
    /// PEM client certificate followed by its private key
    pub identity_pem: Option<Vec<u8>>,
    /// Skip server certificate verification
    pub insecure_skip_tls_verify: bool,
}

impl ClusterConfig {
    /// In-cluster settings from the service environment and the mounted
    /// service account
    pub fn in_cluster() -> Result<Self> {
        let host = std::env::var(SERVICE_HOST_ENV).map_err(|_| {
            ClientError::invalid_config(format!("{} is not set", SERVICE_HOST_ENV))
        })?;
        let port = std::env::var(SERVICE_PORT_ENV).map_err(|_| {
            ClientError::invalid_config(format!("{} is not set", SERVICE_PORT_ENV))
        })?;

        Self::from_service_account(&host, &port, Path::new(SERVICE_ACCOUNT_DIR))
    }

    /// Settings for the API server at `host:port`, authenticated with the
    /// `token` and `ca.crt` files found in `dir`
    pub fn from_service_account(host: &str, port: &str, dir: &Path) -> Result<Self> {
        if host.is_empty() || port.is_empty() {
            return Err(ClientError::invalid_config(
                "API server host and port must not be empty",
            ));
        }

        let token = read_file(&dir.join("token"))?;
        let token = String::from_utf8(token)
            .map_err(|e| ClientError::invalid_config(format!("service account token: {}", e)))?;
        let root_ca_pem = read_file(&dir.join("ca.crt"))?;

        // IPv6 service addresses need brackets
        let server = if host.contains(':') {
            format!("https://[{}]:{}", host, port)
        } else {
            format!("https://{}:{}", host, port)
        };

        Ok(Self {
            server,
            bearer_token: Some(token.trim().to_string()),
            root_ca_pem: Some(root_ca_pem),
            identity_pem: None,
            insecure_skip_tls_verify: false,
        })
    }

    /// Settings from the current context of a kubeconfig file
    pub fn from_kubeconfig(path: &Path) -> Result<Self> {
        let data = read_file(path)?;
        let kubeconfig: Kubeconfig = serde_yaml::from_slice(&data).map_err(|e| {
            ClientError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let context = kubeconfig.selected_context()?;

        let cluster = match context {
            Some(ctx) => kubeconfig.clusters.iter().find(|c| c.name == ctx.cluster),
            None => kubeconfig.clusters.first(),
        }
        .map(|c| &c.cluster)
        .ok_or_else(|| {
            ClientError::invalid_config(format!("no matching cluster in {}", path.display()))
        })?;

        let user = match context {
            Some(ContextEntry {
                user: Some(name), ..
            }) => Some(
                kubeconfig
                    .users
                    .iter()
                    .find(|u| &u.name == name)
                    .map(|u| &u.user)
                    .ok_or_else(|| {
                        ClientError::invalid_config(format!(
                            "user '{}' not found in {}",
                            name,
                            path.display()
                        ))
                    })?,
            ),
            Some(_) => None,
            None => kubeconfig.users.first().map(|u| &u.user),
        };

        let root_ca_pem = inline_or_file(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base,
        )?;

        let mut config = Self {
            server: cluster.server.trim_end_matches('/').to_string(),
            root_ca_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
            ..Default::default()
        };

        if let Some(user) = user {
            config.bearer_token = match (&user.token, &user.token_file) {
                (Some(token), _) => Some(token.clone()),
                (None, Some(file)) => {
                    let token = read_file(&resolve(base, file))?;
                    Some(String::from_utf8_lossy(&token).trim().to_string())
                }
                (None, None) => None,
            };

            let cert = inline_or_file(
                user.client_certificate_data.as_deref(),
                user.client_certificate.as_deref(),
                base,
            )?;
            let key = inline_or_file(
                user.client_key_data.as_deref(),
                user.client_key.as_deref(),
                base,
            )?;
            config.identity_pem = match (cert, key) {
                (Some(mut cert), Some(key)) => {
                    if !cert.ends_with(b"\n") {
                        cert.push(b'\n');
                    }
                    cert.extend_from_slice(&key);
                    Some(cert)
                }
                (None, None) => None,
                _ => {
                    return Err(ClientError::invalid_config(
                        "client certificate and client key must be set together",
                    ))
                }
            };
        }

        debug!(server = %config.server, path = %path.display(), "Loaded kubeconfig");
        Ok(config)
    }

    /// In-cluster settings when available, otherwise the given kubeconfig
    pub fn infer(kubeconfig: &Path) -> Result<Self> {
        match Self::in_cluster() {
            Ok(config) => {
                info!("Using in-cluster configuration for {}", config.server);
                Ok(config)
            }
            Err(e) => {
                debug!("In-cluster configuration unavailable: {}", e);
                info!("Using kubeconfig {}", kubeconfig.display());
                Self::from_kubeconfig(kubeconfig)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

impl Kubeconfig {
    /// The current context, or the first context when none is current
    fn selected_context(&self) -> Result<Option<&ContextEntry>> {
        match &self.current_context {
            Some(name) if !name.is_empty() => self
                .contexts
                .iter()
                .find(|c| &c.name == name)
                .map(|c| Some(&c.context))
                .ok_or_else(|| ClientError::invalid_config(format!("context '{}' not found", name))),
            _ => Ok(self.contexts.first().map(|c| &c.context)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    token_file: Option<PathBuf>,
    #[serde(default)]
    client_certificate: Option<PathBuf>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key: Option<PathBuf>,
    #[serde(default)]
    client_key_data: Option<String>,
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| ClientError::invalid_config(format!("{}: {}", path.display(), e)))
}

/// Relative paths in a kubeconfig are relative to the file itself
fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Base64 `*-data` value when set, else the contents of the referenced file
fn inline_or_file(data: Option<&str>, file: Option<&Path>, base: &Path) -> Result<Option<Vec<u8>>> {
    if let Some(data) = data {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| ClientError::invalid_config(format!("invalid base64 data: {}", e)))?;
        return Ok(Some(decoded));
    }

    file.map(|f| read_file(&resolve(base, f))).transpose()
}
