//! HTTP route handlers for the xposter service.
//!
//! This module contains all the HTTP route handler functions that process
//! incoming requests and return appropriate responses. Every handler runs its
//! operation under a per-request deadline; when the deadline elapses the
//! operation is cancelled and the request answers 504.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::error::ApiError;
use crate::twitter::{
    MediaHandle, MediaSource, OperationResult, PostOperations, TweetRef, TweetType,
};

/// Response type shared by the JSON handlers.
pub type HandlerResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub ops: Arc<PostOperations>,
    /// Upper bound on the time a single request may spend on the X API.
    pub request_deadline: Duration,
    /// Where uploaded form files are staged before they are posted.
    pub media_temp_dir: PathBuf,
    /// Body limit of `/api/create-post-with-media`.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(ops: Arc<PostOperations>, request_deadline: Duration, media_temp_dir: PathBuf) -> Self {
        Self {
            ops,
            request_deadline,
            media_temp_dir,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// Builds the application router with all routes and the given state.
///
/// Middleware is added by the caller so tests can drive the bare router. The
/// media upload route replaces axum's 2 MB default body limit with
/// `state.max_upload_bytes`.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/ping", get(handle_ping))
        .route("/api/tweets/:id", get(handle_get_tweet))
        .route("/api/process-tweet/:id", post(handle_process_tweet))
        .route("/api/repost-tweet/:id", post(handle_repost_tweet))
        .route("/api/quote-tweet/:id", post(handle_quote_tweet))
        .route("/api/create-post", post(handle_create_post))
        .route(
            "/api/create-post-with-media",
            post(handle_create_post_with_media).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(state)
}

/// A cancellation token that fires when the request deadline elapses.
///
/// The token is also cancelled when the guard is dropped, which happens when
/// the handler finishes or the client goes away.
struct RequestDeadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl RequestDeadline {
    fn start(deadline: Duration) -> Self {
        let token = CancellationToken::new();
        let expired = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!("Request deadline of {:?} elapsed, cancelling", deadline);
            expired.cancel();
        });
        Self { token, timer }
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RequestDeadline {
    fn drop(&mut self) {
        self.timer.abort();
        self.token.cancel();
    }
}

fn error_response(status: StatusCode, message: &str, error: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({"status": "error", "message": message, "error": error.into()})),
    )
}

/// Maps an operation result to the service's JSON envelope.
///
/// # Response bodies
///
/// - Success: `{"status": "success", "message": ..., "data": ...}` with 200
/// - Already done: `{"status": "skipped", "message": <reason>}` with 200
/// - Rejected: `{"status": "error", ...}` with 400
/// - Failed: `{"status": "error", ...}` with the error's status code
fn respond<T: Serialize>(
    result: OperationResult<T>,
    success_message: &str,
    failure_message: &str,
) -> HandlerResult {
    match result {
        OperationResult::Success(data) => Ok(Json(
            json!({"status": "success", "message": success_message, "data": data}),
        )),
        OperationResult::AlreadyDone { reason } => {
            info!("Skipped: {}", reason);
            Ok(Json(json!({"status": "skipped", "message": reason})))
        }
        OperationResult::Rejected { reason } => {
            warn!("{}: {}", failure_message, reason);
            Err(error_response(StatusCode::BAD_REQUEST, failure_message, reason))
        }
        OperationResult::Failed(e) => {
            error!("{}: {}", failure_message, e);
            Err(error_response(e.status_code(), failure_message, e.to_string()))
        }
    }
}

fn parse_tweet_ref(id: String) -> Result<TweetRef, (StatusCode, Json<Value>)> {
    TweetRef::new(id)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, "Invalid tweet id", e.to_string()))
}

/// Handles GET requests to the `/health` endpoint.
///
/// # Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "service": "xposter"
/// }
/// ```
pub async fn handle_health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "xposter"}))
}

/// Handles GET requests to `/api/ping`, a keep-alive probe.
pub async fn handle_ping() -> Json<Value> {
    info!("Ping received");
    Json(json!({"message": "App is awake and running!"}))
}

/// Handles GET requests to `/api/tweets/:id`.
pub async fn handle_get_tweet(State(state): State<AppState>, Path(id): Path<String>) -> HandlerResult {
    let tweet = parse_tweet_ref(id)?;
    let deadline = RequestDeadline::start(state.request_deadline);
    let result = state.ops.fetch_details(&tweet, deadline.token()).await;
    respond(result, "Tweet fetched", "Failed to fetch tweet")
}

/// Handles POST requests to `/api/process-tweet/:id`.
///
/// Reposts the tweet only when it is an original post. Retweets, quotes and
/// tweets that could not be classified answer 400.
pub async fn handle_process_tweet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HandlerResult {
    let tweet = parse_tweet_ref(id)?;
    let deadline = RequestDeadline::start(state.request_deadline);
    info!("Processing tweet {}", tweet);

    match state.ops.classify_type(&tweet, deadline.token()).await {
        OperationResult::Success(TweetType::Original) => {
            let result = state.ops.repost(&tweet, deadline.token()).await;
            respond(result, "Tweet reposted", "Failed to repost tweet")
        }
        OperationResult::Success(kind) => {
            let reason = match kind {
                TweetType::Derived { reference } => format!("tweet is a {} tweet", reference),
                TweetType::FailSafe { reason } => reason,
                TweetType::Original => String::new(),
            };
            info!("Tweet {} is not eligible for reposting: {}", tweet, reason);
            Err(error_response(
                StatusCode::BAD_REQUEST,
                "Tweet is not eligible for reposting.",
                reason,
            ))
        }
        other => respond(
            other.map(|_| Value::Null),
            "Tweet classified",
            "Failed to classify tweet",
        ),
    }
}

/// Handles POST requests to `/api/repost-tweet/:id`.
pub async fn handle_repost_tweet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HandlerResult {
    let tweet = parse_tweet_ref(id)?;
    let deadline = RequestDeadline::start(state.request_deadline);
    let result = state.ops.repost(&tweet, deadline.token()).await;
    respond(result, "Tweet reposted", "Failed to repost tweet")
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub comment: Option<String>,
    pub media_id: Option<String>,
}

/// Handles POST requests to `/api/quote-tweet/:id`.
///
/// Body: `{"comment": "...", "media_id": "..."}`; `media_id` is optional.
pub async fn handle_quote_tweet(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<QuoteRequest>,
) -> HandlerResult {
    let tweet = parse_tweet_ref(id)?;
    let comment = match body.comment.as_deref().map(str::trim) {
        Some(comment) if !comment.is_empty() => comment.to_string(),
        _ => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Comment is required for quote tweet",
                "missing comment",
            ))
        }
    };
    let media = body.media_id.map(MediaHandle::new);

    let deadline = RequestDeadline::start(state.request_deadline);
    let result = state
        .ops
        .quote(&tweet, &comment, media.as_ref(), deadline.token())
        .await;
    respond(result, "Quote tweet posted", "Failed to post quote tweet")
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub text: String,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

/// Handles POST requests to `/api/create-post`.
///
/// Body: `{"text": "...", "imageUrl": "https://..."}`; `imageUrl` is optional
/// and must be an http(s) URL.
pub async fn handle_create_post(
    State(state): State<AppState>,
    Json(body): Json<CreatePostRequest>,
) -> HandlerResult {
    let media = match body.image_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => match MediaSource::parse(url) {
            source @ MediaSource::RemoteUrl(_) => Some(source),
            MediaSource::LocalPath(_) => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "Failed to create post",
                    "imageUrl must be an http(s) URL",
                ))
            }
        },
        None => None,
    };

    let deadline = RequestDeadline::start(state.request_deadline);
    let result = state
        .ops
        .create_post(&body.text, media.as_ref(), deadline.token())
        .await;
    respond(result, "Post created", "Failed to create post")
}

/// Handles POST requests to `/api/create-post-with-media`.
///
/// Expects a multipart form with a `text` field and a file field `media`.
/// The file is staged in a temporary file that is removed once the request
/// completes.
pub async fn handle_create_post_with_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> HandlerResult {
    let invalid_form = |e: axum::extract::multipart::MultipartError| {
        error_response(StatusCode::BAD_REQUEST, "Invalid multipart form", e.to_string())
    };

    let mut text = String::new();
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("text") => text = field.text().await.map_err(invalid_form)?,
            Some("media") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid_form)?;
                upload = Some((file_name, bytes.to_vec()));
            }
            other => warn!("Ignoring unexpected form field {:?}", other),
        }
    }

    let (file_name, bytes) = match upload {
        Some((name, bytes)) if !bytes.is_empty() => (name, bytes),
        _ => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Media file is required",
                "missing media file",
            ))
        }
    };

    let staged = stage_upload(&state.media_temp_dir, file_name.as_deref(), &bytes).map_err(|e| {
        error!("Failed to stage uploaded media: {}", e);
        error_response(e.status_code(), "Failed to stage media", e.to_string())
    })?;
    let source = MediaSource::LocalPath(staged.path().to_path_buf());

    let deadline = RequestDeadline::start(state.request_deadline);
    let result = state
        .ops
        .create_post(&text, Some(&source), deadline.token())
        .await;

    let path = staged.path().to_path_buf();
    if let Err(e) = staged.close() {
        warn!("Failed to remove staged upload {}: {}", path.display(), e);
    }

    respond(result, "Post with media created", "Failed to create post with media")
}

/// Writes a form upload to a uniquely named temp file, keeping its extension.
fn stage_upload(
    dir: &std::path::Path,
    file_name: Option<&str>,
    bytes: &[u8],
) -> Result<tempfile::NamedTempFile, ApiError> {
    let suffix = file_name
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    let mut file = tempfile::Builder::new()
        .prefix("xposter-upload-")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}
