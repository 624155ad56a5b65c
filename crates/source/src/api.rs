//! Remote prompt API source.
//!
//! Wraps the prompt service HTTP endpoints using [`reqwest`]:
//!
//! | Operation      | Request                                              |
//! |----------------|------------------------------------------------------|
//! | fetch pending  | `GET {api}/prompts/pending?limit=N[&secret=S]`       |
//! | mark success   | `GET {api}/prompts/{id}/increment-success[?secret=S]` |

use async_trait::async_trait;
use relay_core::prompt::Prompt;
use relay_core::types::PromptId;
use serde::Deserialize;

use crate::error::SourceError;
use crate::PromptSource;

/// HTTP client for the prompt service.
pub struct ApiSource {
    client: reqwest::Client,
    api_url: String,
    secret: Option<String>,
}

/// Body of `GET /prompts/pending`.
///
/// The service wraps the list in an envelope; older deployments return a
/// bare array, which is accepted as well.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PendingResponse {
    Envelope { success: bool, data: PendingData },
    Bare(Vec<Prompt>),
}

#[derive(Debug, Deserialize)]
struct PendingData {
    prompts: Vec<Prompt>,
}

impl ApiSource {
    /// Create a source for the prompt service at `api_url`.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `https://prompts.example.com/api`.
    /// * `secret`  - Shared secret appended as the `secret` query parameter.
    pub fn new(api_url: impl Into<String>, secret: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, secret)
    }

    /// Create a source reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        secret: Option<String>,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            secret,
        }
    }

    /// Base URL of the prompt service (without trailing slash).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn pending_request(&self, limit: usize) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(format!("{}/prompts/pending", self.api_url))
            .query(&[("limit", limit.to_string())]);
        self.with_secret(request)
    }

    fn increment_request(&self, id: PromptId) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(format!("{}/prompts/{id}/increment-success", self.api_url));
        self.with_secret(request)
    }

    fn with_secret(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.secret {
            Some(secret) => request.query(&[("secret", secret)]),
            None => request,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`SourceError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SourceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Parse the body of a pending-prompts response.
pub fn parse_pending_body(body: &str) -> Result<Vec<Prompt>, SourceError> {
    match serde_json::from_str::<PendingResponse>(body)? {
        PendingResponse::Envelope { success: true, data } => Ok(data.prompts),
        PendingResponse::Envelope { success: false, .. } => Err(SourceError::Rejected(
            "pending prompts request reported success=false".to_string(),
        )),
        PendingResponse::Bare(prompts) => Ok(prompts),
    }
}

#[async_trait]
impl PromptSource for ApiSource {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Prompt>, SourceError> {
        tracing::debug!(api_url = %self.api_url, limit, "Fetching pending prompts");

        let response = self.pending_request(limit).send().await?;
        let body = Self::ensure_success(response).await?.text().await?;
        let prompts = parse_pending_body(&body)?;

        tracing::info!(count = prompts.len(), "Fetched pending prompts from API");
        Ok(prompts)
    }

    async fn mark_success(&self, id: PromptId) -> Result<(), SourceError> {
        let response = self.increment_request(id).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::UnknownPrompt(id));
        }
        Self::ensure_success(response).await?;

        tracing::debug!(prompt_id = id, "Incremented successful runs");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("remote API at {}", self.api_url)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
