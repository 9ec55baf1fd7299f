//! Shared test utilities: a scripted transport and prebuilt clients.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{Credentials, EndpointConfig};
use crate::error::ApiError;
use crate::twitter::{
    ApiRequest, ApiResponse, MediaUploader, PostOperations, RequestBody, RetryingClient, Transport,
};

pub const BASE_URL: &str = "https://api.x.com/2";
pub const UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
pub const USER_ID: &str = "1001";

type SendHook = Box<dyn Fn(&ApiRequest) + Send + Sync>;

/// A request seen by the [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request: ApiRequest,
    pub sent_at: Instant,
}

impl RecordedRequest {
    pub fn json_body(&self) -> Option<&Value> {
        match &self.request.body {
            RequestBody::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Replays queued responses in order and records every request.
///
/// Once the queue is empty every further request gets a 500.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<ApiResponse, ApiError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    hook: Mutex<Option<SendHook>>,
    latency: Mutex<Duration>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<ApiResponse>) -> Arc<Self> {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ApiResponse, ApiError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
        })
    }

    /// Runs `hook` on every request before its response is returned.
    pub fn on_send<F>(self: Arc<Self>, hook: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) + Send + Sync + 'static,
    {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
        self
    }

    /// Delays every response by `latency`, as a slow server would.
    pub fn with_latency(self: Arc<Self>, latency: Duration) -> Arc<Self> {
        *self.latency.lock().unwrap() = latency;
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests matching `method` and exactly `url`.
    pub fn requests_to(&self, method: &str, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.request.method == method && r.request.url == url)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(&request);
        }
        self.requests.lock().unwrap().push(RecordedRequest {
            request,
            sent_at: Instant::now(),
        });
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse::new(500, "no scripted response")))
    }
}

pub fn test_credentials() -> Credentials {
    Credentials::new(
        "test-consumer-key",
        "test-consumer-secret",
        "test-access-token",
        "test-access-token-secret",
    )
}

pub fn test_endpoints() -> EndpointConfig {
    EndpointConfig::new(BASE_URL, UPLOAD_URL, USER_ID)
}

pub fn test_client(transport: Arc<ScriptedTransport>) -> RetryingClient {
    RetryingClient::new(Arc::new(test_credentials()), transport).unwrap()
}

pub fn test_operations(transport: Arc<ScriptedTransport>, temp_dir: &Path) -> PostOperations {
    let client = test_client(transport);
    let uploader = MediaUploader::new(client.clone(), test_endpoints(), temp_dir.to_path_buf());
    PostOperations::new(client, test_endpoints(), uploader)
}

/// Number of entries left in `dir`.
pub fn dir_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
