//! HTTP adapter for the consular back-office API

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::core::analysis::{AnalysisResult, DocumentSet};
use crate::core::identity::RecordId;
use crate::core::ports::{
    DocumentAnalyzer, FieldValues, PortError, ProfileRecord, ProfileStore, SubmissionAck,
    SubmissionGateway, SubmissionRequest, UpdatedRecord,
};

/// Implements every port against `{base}/profiles/...` and
/// `{base}/documents/analyze`
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, PortError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("intake/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PortError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, PortError> {
        let response = self.authorize(request).send().await.map_err(map_transport)?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %message, "back office rejected request");
        Err(PortError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, PortError> {
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Serialization(e.to_string()))
    }
}

fn map_transport(err: reqwest::Error) -> PortError {
    if err.is_timeout() {
        PortError::Timeout
    } else {
        PortError::Network(err.to_string())
    }
}

fn not_found(response: &Response, what: String) -> Result<(), PortError> {
    if response.status() == StatusCode::NOT_FOUND {
        Err(PortError::NotFound(what))
    } else {
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for HttpGateway {
    async fn load_profile(&self, profile_id: &RecordId) -> Result<Option<ProfileRecord>, PortError> {
        let response = self
            .send(self.client.get(self.url(&format!("profiles/{}", profile_id))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(response).await.map(Some)
    }

    async fn update_step_data(
        &self,
        profile_id: &RecordId,
        step: &str,
        values: &FieldValues,
    ) -> Result<UpdatedRecord, PortError> {
        let url = self.url(&format!("profiles/{}/steps/{}", profile_id, step));
        tracing::debug!(%url, fields = values.len(), "PATCH step data");
        let response = self.send(self.client.patch(url).json(values)).await?;
        not_found(&response, profile_id.to_string())?;
        Self::decode(response).await
    }
}

#[async_trait]
impl SubmissionGateway for HttpGateway {
    async fn submit_for_validation(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionAck, PortError> {
        let url = self.url(&format!("profiles/{}/submissions", request.profile_id));
        let response = self
            .send(
                self.client
                    .post(url)
                    .header("Idempotency-Key", &request.idempotency_key)
                    .json(request),
            )
            .await?;
        not_found(&response, request.profile_id.to_string())?;
        Self::decode(response).await
    }
}

#[async_trait]
impl DocumentAnalyzer for HttpGateway {
    async fn analyze_documents(&self, documents: &DocumentSet) -> Result<AnalysisResult, PortError> {
        let response = self
            .send(self.client.post(self.url("documents/analyze")).json(documents))
            .await?;
        not_found(&response, "documents/analyze".to_string())?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analysis::DocumentTag;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one canned response and hand back the raw request
    async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });

        (base, handle)
    }

    fn gateway(base: &str) -> HttpGateway {
        HttpGateway::new(base, Some("secret".into()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_missing_profile_is_none() {
        let (base, server) = serve_once("404 Not Found", "").await;
        let id = RecordId::profile();
        let profile = gateway(&base).load_profile(&id).await.unwrap();
        assert!(profile.is_none());

        let request = server.await.unwrap();
        assert!(request.starts_with(&format!("GET /profiles/{} ", id)));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn test_submission_sends_idempotency_key() {
        let body = r#"{"submission_id":"SUB-1","received":"2026-01-05T10:00:00Z"}"#;
        let (base, server) = serve_once("201 Created", body).await;
        let request = SubmissionRequest {
            profile_id: RecordId::profile(),
            flow: "adult".into(),
            payload: json!({"basicInfo": {"firstName": "Jean"}}),
            idempotency_key: "k-42".into(),
        };

        let ack = gateway(&base).submit_for_validation(&request).await.unwrap();
        assert_eq!(ack.submission_id, "SUB-1");
        assert!(!ack.duplicate);

        let raw = server.await.unwrap();
        assert!(raw.to_ascii_lowercase().contains("idempotency-key: k-42"));
        assert!(raw.contains("\"firstName\":\"Jean\""));
    }

    #[tokio::test]
    async fn test_server_error_is_retryable_rejection() {
        let (base, _server) = serve_once("503 Service Unavailable", "down").await;
        let mut documents = DocumentSet::new();
        documents.insert(DocumentTag::Passport, "https://files/p.pdf".into());

        let err = gateway(&base).analyze_documents(&documents).await.unwrap_err();
        assert!(matches!(err, PortError::Rejected { status: 503, ref message } if message == "down"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_url_joining() {
        let gateway = HttpGateway::new("https://api.example/v1/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(gateway.base_url(), "https://api.example/v1");
        assert_eq!(gateway.url("/documents/analyze"), "https://api.example/v1/documents/analyze");
    }
}
