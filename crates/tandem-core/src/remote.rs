//! Typed CRUD client for one remote document endpoint.
//!
//! The client is stateless apart from its base URL and credential pair;
//! authentication travels as a per-request `Authorization: token key:secret`
//! header. Optimistic-concurrency collisions on update are retried by
//! refetching the current document and carrying its `modified` value.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::EndpointConfig;
use crate::document::{doc_modified, Document};
use crate::util::clamp_message;

/// Total attempts for an update hitting timestamp mismatches.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Substrings identifying an optimistic-concurrency rejection, matched
/// case-insensitively against the remote's error message.
const TIMESTAMP_MISMATCH_SENTINELS: &[&str] = &[
    "timestamp mismatch",
    "document has been modified",
    "has been modified after you have opened it",
];

/// Errors returned by remote document operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("Network error: {0}")]
    Network(String),
    /// Credentials rejected by the remote
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Document or route does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// The remote rejected the document contents
    #[error("Validation error: {0}")]
    Validation(String),
    /// Optimistic-concurrency collision survived the client-level retries
    #[error("Timestamp mismatch: {0}")]
    TimestampMismatch(String),
    /// Remote-side failure (5xx)
    #[error("Remote error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },
    /// Response body did not match the expected envelope
    #[error("Invalid response payload: {0}")]
    InvalidPayload(String),
    /// Client misconfiguration detected at construction
    #[error("Invalid client configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidPayload(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// Result of an update, including how many attempts it took.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Destination document as returned by the remote
    pub document: Document,
    /// Total attempts; greater than 1 means a timestamp mismatch was retried
    pub attempts: usize,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    message: String,
}

/// Handle bound to one remote document endpoint.
#[derive(Clone)]
pub struct RemoteClient {
    base: Url,
    instance: String,
    auth_header: String,
    client: Client,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteClient")
            .field("base", &self.base.as_str())
            .field("instance", &self.instance)
            .field("auth_header", &"[REDACTED]")
            .finish()
    }
}

impl RemoteClient {
    /// Create a client bound to `config`, labeled `instance` for logs.
    pub fn new(config: &EndpointConfig, instance: impl Into<String>) -> RemoteResult<Self> {
        let base = Url::parse(config.url.trim_end_matches('/')).map_err(|error| {
            RemoteError::InvalidConfiguration(format!("invalid endpoint URL: {error}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::InvalidConfiguration(
                "endpoint URL cannot be used as a base".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| {
                RemoteError::InvalidConfiguration(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            base,
            instance: instance.into(),
            auth_header: format!("token {}:{}", config.api_key, config.api_secret),
            client,
        })
    }

    /// Instance label this client was constructed with.
    #[must_use]
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Fetch one document, `None` when the remote reports 404.
    pub async fn get(&self, doctype: &str, name: &str) -> RemoteResult<Option<Document>> {
        let url = self.join(&["api", "resource", doctype, name])?;
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        let envelope: DataEnvelope<Document> = response.json().await?;
        Ok(Some(envelope.data))
    }

    /// List documents of a doctype, optionally filtered.
    pub async fn list(
        &self,
        doctype: &str,
        filters: Option<&Value>,
        limit: usize,
        offset: usize,
    ) -> RemoteResult<Vec<Document>> {
        let mut url = self.join(&["api", "resource", doctype])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit_page_length", &limit.to_string());
            pairs.append_pair("limit_start", &offset.to_string());
            pairs.append_pair("fields", "[\"*\"]");
            if let Some(filters) = filters {
                pairs.append_pair("filters", &filters.to_string());
            }
        }
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let envelope: DataEnvelope<Vec<Document>> = response.json().await?;
        Ok(envelope.data)
    }

    /// List documents whose `modified` timestamp is strictly after `since`.
    pub async fn list_modified_since(
        &self,
        doctype: &str,
        since: &str,
        limit: usize,
    ) -> RemoteResult<Vec<Document>> {
        let filters = serde_json::json!({ "modified": [">", since] });
        self.list(doctype, Some(&filters), limit, 0).await
    }

    /// Create a document from a field bag.
    pub async fn create(&self, doctype: &str, fields: &Document) -> RemoteResult<Document> {
        let url = self.join(&["api", "resource", doctype])?;
        let mut payload = fields.clone();
        payload.insert("doctype".to_string(), Value::String(doctype.to_string()));
        let response = self
            .client
            .post(url)
            .header("Authorization", &self.auth_header)
            .json(&payload)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let envelope: DataEnvelope<Document> = response.json().await?;
        Ok(envelope.data)
    }

    /// Update a document, retrying optimistic-concurrency collisions.
    ///
    /// The caller-supplied `modified` value rides along on the first
    /// attempt; each retry refetches the current document and carries its
    /// `modified` instead. No backoff between attempts: the race is almost
    /// always resolved by reading the newest version.
    pub async fn update(
        &self,
        doctype: &str,
        name: &str,
        fields: &Document,
    ) -> RemoteResult<UpdateOutcome> {
        let url = self.join(&["api", "resource", doctype, name])?;
        let mut payload = fields.clone();
        let mut last_mismatch = String::new();

        for attempt in 0..MAX_UPDATE_ATTEMPTS {
            if attempt > 0 {
                tracing::warn!(
                    instance = %self.instance,
                    doctype,
                    name,
                    attempt = attempt + 1,
                    "timestamp mismatch; refetching latest version before retry"
                );
                if let Some(latest) = self.get(doctype, name).await? {
                    if let Some(modified) = doc_modified(&latest) {
                        payload.insert("modified".to_string(), Value::String(modified.to_string()));
                    }
                }
            }

            let response = self
                .client
                .put(url.clone())
                .header("Authorization", &self.auth_header)
                .json(&payload)
                .send()
                .await?;
            match Self::check(response).await {
                Ok(response) => {
                    let envelope: DataEnvelope<Document> = response.json().await?;
                    return Ok(UpdateOutcome {
                        document: envelope.data,
                        attempts: attempt + 1,
                    });
                }
                Err(RemoteError::TimestampMismatch(message)) => last_mismatch = message,
                Err(error) => return Err(error),
            }
        }

        Err(RemoteError::TimestampMismatch(format!(
            "{doctype}/{name} still colliding after {MAX_UPDATE_ATTEMPTS} attempts: {last_mismatch}"
        )))
    }

    /// Delete a document. Returns `false` when it did not exist.
    pub async fn delete(&self, doctype: &str, name: &str) -> RemoteResult<bool> {
        let url = self.join(&["api", "resource", doctype, name])?;
        let response = self
            .client
            .delete(url)
            .header("Authorization", &self.auth_header)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }

    /// Verify connectivity and credentials; returns the authenticated user.
    pub async fn ping(&self) -> RemoteResult<String> {
        let url = self.join(&["api", "method", "frappe.auth.get_logged_user"])?;
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let envelope: MessageEnvelope = response.json().await?;
        Ok(envelope.message)
    }

    fn join(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RemoteError::InvalidConfiguration("endpoint URL cannot be a base".to_string())
            })?
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RemoteError::Unauthorized(message))
            }
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(message)),
            status if status.is_client_error() => {
                if is_timestamp_mismatch(&message) {
                    Err(RemoteError::TimestampMismatch(message))
                } else {
                    Err(RemoteError::Validation(message))
                }
            }
            status => Err(RemoteError::Remote {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

/// Pull a human-readable message out of a remote error body.
///
/// Tries the `_server_messages`, `message`, and `exception` keys of a JSON
/// body before falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["_server_messages", "message", "exception"] {
            if let Some(text) = value.get(key).and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    return clamp_message(text);
                }
            }
        }
    }
    clamp_message(body)
}

fn is_timestamp_mismatch(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TIMESTAMP_MISMATCH_SENTINELS
        .iter()
        .any(|sentinel| lowered.contains(sentinel))
}
