use miette::Diagnostic;
use thiserror::Error;

/// Error type for API server requests
#[derive(Error, Debug, Diagnostic)]
pub enum ClientError {
    /// The request never produced a response
    #[error("{method} {url} failed: {message}")]
    #[diagnostic(
        code(slicer::client::request_failed),
        help("Verify the API server URL is reachable from the scheduler and that TLS settings match")
    )]
    RequestFailed {
        #[allow(unused)]
        method: String,
        #[allow(unused)]
        url: String,
        #[allow(unused)]
        message: String,
    },

    /// The API server answered with a non-success status
    #[error("{method} {url} returned status {status}: {body}")]
    #[diagnostic(
        code(slicer::client::unexpected_status),
        help("A 401/403 usually means the scheduler token lacks RBAC for pods/patch. A 404 means the pod was deleted while being scheduled")
    )]
    UnexpectedStatus {
        #[allow(unused)]
        method: String,
        #[allow(unused)]
        url: String,
        #[allow(unused)]
        status: u16,
        #[allow(unused)]
        body: String,
    },

    /// The response body could not be decoded
    #[error("Invalid response from API server: {message}")]
    #[diagnostic(
        code(slicer::client::invalid_response),
        help("The API server returned a body that is not the expected Kubernetes object")
    )]
    InvalidResponse {
        #[allow(unused)]
        message: String,
    },

    /// Connection settings could not be loaded or used
    #[error("Invalid API server configuration: {message}")]
    #[diagnostic(
        code(slicer::client::invalid_config),
        help("Run inside a pod with a mounted service account, pass --kubeconfig, or set --api-url")
    )]
    InvalidConfig {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn request_failed(
        method: impl Into<String>,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RequestFailed {
            method: method.into(),
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn unexpected_status(
        method: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::UnexpectedStatus {
            method: method.into(),
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// HTTP status returned by the API server, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
