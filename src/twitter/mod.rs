//! Twitter/X API integration module.
//!
//! This module contains the client stack for the X API: a signed, retrying
//! client over a pluggable transport, a media uploader and the post
//! operations built on top of them. All requests use OAuth 1.0a user
//! context signing.

mod api;
mod media;
mod parsing;
mod retry;
mod tweets;
mod types;

// Re-export public API
pub use api::{
    ApiRequest, ApiResponse, AttemptFailure, RequestBody, ReqwestTransport, RetryingClient,
    Transport, ALREADY_RETWEETED_ERROR_CODE, RATE_LIMIT_ERROR_CODE,
};
pub use media::MediaUploader;
pub use parsing::sanitize_comment;
pub use retry::{with_retry, Backoff, RetryOutcome, RetryPolicy};
pub use tweets::PostOperations;
pub use types::{
    MediaHandle, MediaSource, OperationResult, ReferencedTweet, TweetData, TweetRef, TweetType,
};
