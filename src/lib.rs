//! # Xposter Library
//!
//! A Rust web service library that posts, reposts, quotes and attaches media
//! on X (Twitter). Every outbound call is signed with OAuth 1.0a (HMAC-SHA1)
//! user context credentials and retried under a rate-limit aware policy.
//!
//! ## Features
//!
//! - OAuth 1.0a request signing
//! - Retrying client with linear or exponential backoff and cancellation
//! - Media upload from a URL or local file through a scoped temp file
//! - Post lookup, repost eligibility, repost, quote and post creation
//! - HTTP endpoints under `/api` plus `/health`
//! - Structured logging
//!
//! ## Configuration
//!
//! The following environment variables are required (an optional `.env` file
//! is loaded first):
//! - `API_KEY`, `API_SECRET`: Consumer credentials
//! - `ACCESS_TOKEN`, `ACCESS_TOKEN_SECRET`: Access token credentials
//! - `BASE_URL`: X API v2 base URL, e.g. `https://api.x.com/2`
//! - `UPLOAD_URL`: Media upload endpoint
//! - `USER_ID`: Account id used for reposts
//!
//! Optional: `PORT` (8080), `REQUEST_DEADLINE_SECS` (120),
//! `HTTP_TIMEOUT_SECS` (30), `MEDIA_TEMP_DIR` (system temp dir),
//! `MAX_UPLOAD_BYTES` (media form body limit, 5 MiB plus 64 KiB).
//!
//! ## API Endpoints
//!
//! - `GET /health`: Returns service health status
//! - `GET /api/ping`: Keep-alive probe
//! - `GET /api/tweets/:id`: Fetches a tweet
//! - `POST /api/process-tweet/:id`: Reposts the tweet if it is an original post
//! - `POST /api/repost-tweet/:id`: Reposts a tweet
//! - `POST /api/quote-tweet/:id`: Quotes a tweet with a comment
//! - `POST /api/create-post`: Creates a post, optionally with an image URL
//! - `POST /api/create-post-with-media`: Creates a post with an uploaded file

pub mod config;
pub mod error;
pub mod handlers;
pub mod oauth;
pub mod twitter;

// Re-export commonly used types and functions
pub use config::{AppConfig, Credentials, EndpointConfig};
pub use error::ApiError;
pub use handlers::{create_router, AppState};
pub use oauth::{sign_request, sign_request_with, SignedHeaders};
pub use twitter::{MediaSource, OperationResult, PostOperations, TweetRef};

#[cfg(test)]
mod test_utils;
