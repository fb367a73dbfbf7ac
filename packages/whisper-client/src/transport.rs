//! Transport seam between the client's state machine and HTTP.
//!
//! [`Transport`] deals only in raw status codes and bodies. Interpreting
//! them (auth failures, job states, payload shapes) is the client's job, so
//! a scripted transport can drive every branch in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};

use crate::config::{AuthScheme, ClientConfig, SubmissionMode};
use crate::error::{Result, WhisperError};
use crate::types::JobHandle;

/// Extra time granted to the HTTP layer beyond the server-side wait.
const SYNC_GRACE: Duration = Duration::from_secs(30);

/// A fully validated submission, ready to send.
#[derive(Debug, Clone)]
pub struct Submission {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Form fields (sync) or query parameters (async), in send order.
    pub params: Vec<(&'static str, String)>,
    pub mode: SubmissionMode,
}

/// Raw HTTP answer.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The four calls the extraction service exposes.
///
/// Implementations return `Err` only for failures below HTTP (connect,
/// TLS, local deadline). Any well-formed response, success or not, comes
/// back as `Ok(ApiResponse)`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, submission: &Submission) -> Result<ApiResponse>;

    async fn status(&self, handle: &JobHandle) -> Result<ApiResponse>;

    async fn retrieve(&self, handle: &JobHandle) -> Result<ApiResponse>;

    async fn usage(&self) -> Result<ApiResponse>;

    /// Transport name for logging.
    fn name(&self) -> &str;
}

/// reqwest-backed transport for the LLMWhisperer v2 API.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: SecretString,
    auth_scheme: AuthScheme,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .build()
            .map_err(|e| WhisperError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(config.api_key.expose_secret().to_owned()),
            auth_scheme: config.auth_scheme,
            request_timeout: config.request_timeout,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth_scheme {
            AuthScheme::Bearer => request.bearer_auth(self.api_key.expose_secret()),
            AuthScheme::Header => request.header("unstract-key", self.api_key.expose_secret()),
        }
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, endpoint);
        let request = self
            .client
            .get(&url)
            .query(query)
            .timeout(self.request_timeout);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| WhisperError::Transport(e.to_string()))?;

        read_response(response).await
    }
}

async fn read_response(response: reqwest::Response) -> Result<ApiResponse> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| WhisperError::Transport(format!("failed to read response body: {}", e)))?;
    Ok(ApiResponse { status, body })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, submission: &Submission) -> Result<ApiResponse> {
        let url = format!("{}/whisper", self.base_url);

        let (request, deadline) = match submission.mode {
            SubmissionMode::Sync { wait_timeout } => {
                let part = reqwest::multipart::Part::bytes(submission.bytes.clone())
                    .file_name(submission.file_name.clone())
                    .mime_str("application/octet-stream")
                    .map_err(|e| WhisperError::InvalidRequest(e.to_string()))?;
                let form = submission
                    .params
                    .iter()
                    .fold(reqwest::multipart::Form::new(), |form, (k, v)| {
                        form.text(*k, v.clone())
                    })
                    .part("file", part);

                (
                    self.client.post(&url).multipart(form),
                    wait_timeout + SYNC_GRACE,
                )
            }
            SubmissionMode::Async => (
                self.client
                    .post(&url)
                    .query(&submission.params)
                    .query(&[("file_name", submission.file_name.as_str())])
                    .header(header::CONTENT_TYPE, "application/octet-stream")
                    .body(submission.bytes.clone()),
                self.request_timeout,
            ),
        };

        let response = self
            .authorize(request.timeout(deadline))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WhisperError::Timeout {
                        handle: None,
                        waited: deadline,
                    }
                } else {
                    WhisperError::Transport(e.to_string())
                }
            })?;

        read_response(response).await
    }

    async fn status(&self, handle: &JobHandle) -> Result<ApiResponse> {
        self.get("/whisper-status", &[("whisper_hash", handle.as_str())])
            .await
    }

    async fn retrieve(&self, handle: &JobHandle) -> Result<ApiResponse> {
        self.get("/whisper-retrieve", &[("whisper_hash", handle.as_str())])
            .await
    }

    async fn usage(&self) -> Result<ApiResponse> {
        self.get("/get-usage-info", &[]).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_transport() {
        let config = ClientConfig::new("test-key").with_base_url("https://example.com/api/v2/");
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.name(), "http");
    }

    #[test]
    fn test_blank_key_fails_construction() {
        assert!(matches!(
            HttpTransport::new(&ClientConfig::new(" ")),
            Err(WhisperError::Config(_))
        ));
    }
}
