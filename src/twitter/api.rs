//! Core X API utilities.
//!
//! This module contains the transport seam and the retrying client every
//! operation uses. Each attempt is signed immediately before it is sent,
//! HTTP 429 responses are retried under the caller's [`RetryPolicy`], and all
//! other failures end the call at once.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Credentials;
use crate::error::ApiError;
use crate::oauth::sign_request;

use super::retry::{with_retry, RetryOutcome, RetryPolicy};

/// Platform error code for "Rate limit exceeded".
pub const RATE_LIMIT_ERROR_CODE: i64 = 88;

/// Platform error code for "You have already retweeted this Tweet".
pub const ALREADY_RETWEETED_ERROR_CODE: i64 = 327;

/// Sanitizes text for safe logging by truncating and escaping control characters.
///
/// # Parameters
///
/// - `text`: The text to sanitize
/// - `max_len`: Maximum length in bytes before truncation
///
/// # Returns
///
/// A sanitized string safe for logging
pub(crate) fn sanitize_for_logging(text: &str, max_len: usize) -> String {
    let sanitized: String = text
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            c if c.is_control() => '?',
            c => c,
        })
        .collect();

    if sanitized.len() > max_len {
        let mut end = max_len;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... [truncated, {} total bytes]",
            &sanitized[..end],
            text.len()
        )
    } else {
        sanitized
    }
}

/// Returns the first platform error code in a response body, if any.
///
/// The platform reports these as `{"errors": [{"code": 88, ...}]}`.
pub(crate) fn platform_error_code(body: &Value) -> Option<i64> {
    body.get("errors")?
        .as_array()?
        .iter()
        .find_map(|e| e.get("code").and_then(Value::as_i64))
}

/// Body of an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// A single file part. The transport supplies the boundary header.
    Multipart {
        field: String,
        file_name: String,
        bytes: Vec<u8>,
    },
}

/// A request as handed to the [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(url: impl Into<String>, payload: Value) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Json(payload),
        }
    }

    pub fn post_multipart(
        url: impl Into<String>,
        field: impl Into<String>,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Multipart {
                field: field.into(),
                file_name: file_name.into(),
                bytes,
            },
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A raw response from the [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one HTTP request. Implementations never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ApiError::Config(format!("invalid HTTP method: {}", e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(payload) => builder.json(&payload),
            RequestBody::Multipart {
                field,
                file_name,
                bytes,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
                builder.multipart(reqwest::multipart::Form::new().part(field, part))
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(ApiResponse { status, body })
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum AttemptFailure {
    /// HTTP 429, or platform error code 88 in any body
    RateLimited { body: Value },
    /// Any other non-2xx status
    Rejected { status: u16, body: String },
    /// No response, or the request could not be built or signed
    Error(ApiError),
}

impl AttemptFailure {
    /// Default retry predicate: only HTTP 429 is worth another attempt.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AttemptFailure::RateLimited { .. })
    }

    /// Platform error code in the failure body, if any.
    pub fn error_code(&self) -> Option<i64> {
        match self {
            AttemptFailure::RateLimited { body } => platform_error_code(body),
            AttemptFailure::Rejected { body, .. } => serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| platform_error_code(&v)),
            AttemptFailure::Error(_) => None,
        }
    }

    fn into_api_error(self, attempts: u32) -> ApiError {
        match self {
            AttemptFailure::RateLimited { .. } => ApiError::RateLimited { attempts },
            AttemptFailure::Rejected { status, body } => ApiError::UpstreamRejected { status, body },
            AttemptFailure::Error(e) => e,
        }
    }
}

/// Signs and sends requests under a retry policy.
///
/// Cheap to clone; shares the credentials and transport.
#[derive(Clone)]
pub struct RetryingClient {
    credentials: Arc<Credentials>,
    transport: Arc<dyn Transport>,
}

impl RetryingClient {
    /// Creates a client, failing fast if any credential is empty.
    pub fn new(
        credentials: Arc<Credentials>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ApiError> {
        credentials.validate()?;
        Ok(Self {
            credentials,
            transport,
        })
    }

    /// The underlying transport, for unsigned requests such as media downloads.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Makes a signed call, retrying HTTP 429 responses.
    ///
    /// # Parameters
    ///
    /// - `request`: The unsigned request; signed afresh for every attempt
    /// - `policy`: Attempt count and backoff
    /// - `cancel`: Aborts the wait between attempts
    /// - `operation_name`: Human-readable name for logging
    ///
    /// # Returns
    ///
    /// - `Ok(Value)`: The decoded JSON body of a 2xx response (`null` when empty)
    /// - `Err(ApiError)`: Rate limited, rejected, transport failure, malformed body or cancelled
    pub async fn call(
        &self,
        request: &ApiRequest,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        operation_name: &str,
    ) -> Result<Value, ApiError> {
        self.call_with(request, policy, cancel, operation_name, AttemptFailure::is_rate_limit)
            .await
    }

    /// Like [`RetryingClient::call`] with an explicit retry predicate.
    pub async fn call_with<P>(
        &self,
        request: &ApiRequest,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        operation_name: &str,
        is_retryable: P,
    ) -> Result<Value, ApiError>
    where
        P: Fn(&AttemptFailure) -> bool,
    {
        info!(
            "Making signed {} request for operation: {}",
            request.method, operation_name
        );

        let outcome = with_retry(policy, cancel, is_retryable, |attempt| {
            self.attempt(request, attempt, operation_name)
        })
        .await;

        match outcome {
            RetryOutcome::Success(body) => {
                info!("Operation '{}' completed successfully", operation_name);
                Ok(body)
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                error!(
                    "Operation '{}' gave up after {} attempt(s)",
                    operation_name, attempts
                );
                Err(last_error.into_api_error(attempts))
            }
            RetryOutcome::Permanent { error, attempts } => {
                error!(
                    "Operation '{}' failed on attempt {}: {}",
                    operation_name,
                    attempts,
                    error_summary(&error)
                );
                Err(error.into_api_error(attempts))
            }
            RetryOutcome::Cancelled { attempts } => {
                warn!(
                    "Operation '{}' cancelled after {} attempt(s)",
                    operation_name, attempts
                );
                Err(ApiError::Cancelled)
            }
        }
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        attempt: u32,
        operation_name: &str,
    ) -> Result<Value, AttemptFailure> {
        let signed = sign_request(&request.method, &request.url, &self.credentials)
            .map_err(AttemptFailure::Error)?;

        let mut outgoing = request.clone();
        outgoing
            .headers
            .push(("Authorization".to_string(), signed.authorization));
        if !matches!(request.body, RequestBody::Multipart { .. }) {
            outgoing
                .headers
                .push(("Content-Type".to_string(), signed.content_type));
        }

        debug!(
            "Attempt {} for '{}': {} {} (Authorization: OAuth [REDACTED])",
            attempt + 1,
            operation_name,
            outgoing.method,
            outgoing.url
        );

        let response = self.transport.send(outgoing).await.map_err(|e| {
            error!("Transport failure for '{}': {}", operation_name, e);
            AttemptFailure::Error(e)
        })?;

        info!(
            "Received response with status: {} for operation: {} (attempt {})",
            response.status,
            operation_name,
            attempt + 1
        );

        if response.is_success() {
            if response.body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            let body: Value = serde_json::from_slice(&response.body).map_err(|e| {
                AttemptFailure::Error(ApiError::MalformedResponse(format!(
                    "response for '{}' is not JSON: {}",
                    operation_name, e
                )))
            })?;
            if platform_error_code(&body) == Some(RATE_LIMIT_ERROR_CODE) {
                warn!(
                    "Rate limit error code in successful response for '{}'",
                    operation_name
                );
                return Err(AttemptFailure::RateLimited { body });
            }
            return Ok(body);
        }

        let text = response.text();
        debug!(
            "Error response for '{}': {}",
            operation_name,
            sanitize_for_logging(&text, 200)
        );

        if response.status == 429 {
            warn!("Rate limit reached for operation '{}'", operation_name);
            let body = serde_json::from_str(&text).unwrap_or(Value::Null);
            return Err(AttemptFailure::RateLimited { body });
        }

        Err(AttemptFailure::Rejected {
            status: response.status,
            body: text,
        })
    }
}

fn error_summary(failure: &AttemptFailure) -> String {
    match failure {
        AttemptFailure::RateLimited { body } => format!(
            "rate limited (code {:?})",
            platform_error_code(body)
        ),
        AttemptFailure::Rejected { status, body } => {
            format!("HTTP {}: {}", status, sanitize_for_logging(body, 200))
        }
        AttemptFailure::Error(e) => e.to_string(),
    }
}
