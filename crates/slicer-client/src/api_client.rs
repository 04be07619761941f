use crate::config::ClusterConfig;
use crate::error::{ClientError, Result};
use k8s_openapi::api::core::v1::Pod;
use reqwest::{Certificate, Client, Identity, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const CERTIFICATE_MARKER: &[u8] = b"-----BEGIN CERTIFICATE-----";

/// Content type of a Kubernetes strategic merge patch
pub const STRATEGIC_MERGE_PATCH: &str = "application/strategic-merge-patch+json";

/// Build a strategic merge patch that sets the given pod annotations.
///
/// Only the listed keys are touched; other annotations and the object's
/// resourceVersion are left to the API server.
pub fn annotation_patch(annotations: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "annotations": annotations,
        }
    })
}

/// Lightweight HTTP client for the scheduler to talk to the API server
pub struct ApiClient {
    base_url: String,
    bearer_token: Option<String>,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: None,
            client: Client::new(),
        }
    }

    /// Client for the API server described by `config`, trusting its CA and
    /// presenting its client certificate when set
    pub fn from_config(config: ClusterConfig) -> Result<Self> {
        let mut builder = Client::builder().use_rustls_tls();

        if let Some(pem) = &config.root_ca_pem {
            if !pem
                .windows(CERTIFICATE_MARKER.len())
                .any(|w| w == CERTIFICATE_MARKER)
            {
                return Err(ClientError::invalid_config(
                    "cluster CA bundle contains no PEM certificate",
                ));
            }
            let ca = Certificate::from_pem(pem)
                .map_err(|e| ClientError::invalid_config(format!("cluster CA: {}", e)))?;
            builder = builder.add_root_certificate(ca);
        }

        if let Some(pem) = &config.identity_pem {
            let identity = Identity::from_pem(pem)
                .map_err(|e| ClientError::invalid_config(format!("client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }

        if config.insecure_skip_tls_verify {
            warn!(server = %config.server, "TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::invalid_config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.server.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token,
            client,
        })
    }

    /// Authenticate every request with a bearer token
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// PATCH /api/v1/namespaces/{namespace}/pods/{name}
    ///
    /// Sends a single strategic merge patch setting `annotations`. The call
    /// is not retried.
    pub async fn patch_pod_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Pod> {
        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}",
            self.base_url, namespace, name
        );
        debug!("PATCH {}", url);

        let body = serde_json::to_vec(&annotation_patch(annotations))
            .map_err(|e| ClientError::invalid_response(format!("Failed to encode patch: {}", e)))?;

        let request = self
            .client
            .patch(&url)
            .header(reqwest::header::CONTENT_TYPE, STRATEGIC_MERGE_PATCH)
            .body(body);

        let resp = self.send("PATCH", &url, request).await?;
        Self::decode(resp, "pod").await
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, method: &str, url: &str, request: RequestBuilder) -> Result<Response> {
        let request = match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let resp = request
            .send()
            .await
            .map_err(|e| ClientError::request_failed(method, url, e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::unexpected_status(method, url, status, body));
        }

        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
        resp.json::<T>()
            .await
            .map_err(|e| ClientError::invalid_response(format!("Failed to parse {}: {}", what, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicer_core::annotations::SCHEDULER_TIMESTAMP_ANNOTATION;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP exchange and hand back the raw request text
    async fn serve_once(status_line: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);

                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "{}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_annotation_patch_shape() {
        let annotations = BTreeMap::from([(
            SCHEDULER_TIMESTAMP_ANNOTATION.to_string(),
            "42".to_string(),
        )]);
        let patch = annotation_patch(&annotations);
        assert_eq!(
            patch,
            serde_json::json!({"metadata": {"annotations": {"scheduler-timestamp": "42"}}})
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://127.0.0.1:6443/");
        assert_eq!(client.base_url(), "http://127.0.0.1:6443");
    }

    #[tokio::test]
    async fn test_patch_pod_annotations_request() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"metadata":{"name":"trainer","namespace":"ml"}}"#.to_string(),
        )
        .await;

        let client = ApiClient::new(&url).with_bearer_token("s3cret");
        let annotations = BTreeMap::from([(
            SCHEDULER_TIMESTAMP_ANNOTATION.to_string(),
            "1700000000000000000".to_string(),
        )]);

        let pod = client
            .patch_pod_annotations("ml", "trainer", &annotations)
            .await
            .unwrap();
        assert_eq!(pod.metadata.name, Some("trainer".to_string()));

        let request = server.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("PATCH /api/v1/namespaces/ml/pods/trainer "));
        assert!(lower.contains(&format!("content-type: {}", STRATEGIC_MERGE_PATCH)));
        assert!(lower.contains("authorization: bearer s3cret"));
        assert!(request.contains(r#""scheduler-timestamp":"1700000000000000000""#));
    }

    #[tokio::test]
    async fn test_patch_pod_annotations_error_status() {
        let (url, server) = serve_once(
            "HTTP/1.1 403 Forbidden",
            r#"{"kind":"Status","reason":"Forbidden"}"#.to_string(),
        )
        .await;

        let client = ApiClient::new(&url);
        let err = client
            .patch_pod_annotations("ml", "trainer", &BTreeMap::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("Forbidden"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_failed_when_unreachable() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&format!("http://{}", addr));
        let err = client
            .patch_pod_annotations("ml", "trainer", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RequestFailed { .. }));
    }
}
