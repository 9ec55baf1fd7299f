//! Post operations for the X API.
//!
//! This module contains the domain operations the service exposes: post
//! lookup, repost eligibility, reposting, quoting and posting with optional
//! media. Each operation composes the signer, the retrying client and, for
//! attachments, the media uploader.

use log::{debug, info, warn};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, EndpointConfig};
use crate::error::ApiError;

use super::api::{
    platform_error_code, ApiRequest, AttemptFailure, ReqwestTransport, RetryingClient,
    ALREADY_RETWEETED_ERROR_CODE, RATE_LIMIT_ERROR_CODE,
};
use super::media::MediaUploader;
use super::parsing::{parse_tweet_details, sanitize_comment};
use super::retry::RetryPolicy;
use super::types::{MediaHandle, MediaSource, OperationResult, TweetData, TweetRef, TweetType};

/// Domain operations against the X API.
#[derive(Clone)]
pub struct PostOperations {
    client: RetryingClient,
    endpoints: EndpointConfig,
    uploader: MediaUploader,
}

impl PostOperations {
    pub fn new(client: RetryingClient, endpoints: EndpointConfig, uploader: MediaUploader) -> Self {
        Self {
            client,
            endpoints,
            uploader,
        }
    }

    /// Builds the operations on a `reqwest` transport from the loaded configuration.
    ///
    /// # Returns
    ///
    /// - `Ok(PostOperations)`: Ready to use
    /// - `Err(ApiError::Config)`: If a credential is empty or the HTTP client cannot be built
    pub fn from_config(config: &AppConfig) -> Result<Self, ApiError> {
        let transport = Arc::new(ReqwestTransport::new(config.http_timeout)?);
        let client = RetryingClient::new(Arc::new(config.credentials.clone()), transport)?;
        let uploader = MediaUploader::new(
            client.clone(),
            config.endpoints.clone(),
            config.media_temp_dir.clone(),
        );
        Ok(Self::new(client, config.endpoints.clone(), uploader))
    }

    /// Fetches a post.
    ///
    /// `GET {base}/tweets/{id}` with the standard retry policy.
    pub async fn fetch_details(
        &self,
        tweet: &TweetRef,
        cancel: &CancellationToken,
    ) -> OperationResult<TweetData> {
        self.fetch(tweet, cancel).await.into()
    }

    /// Classifies a post for repost eligibility.
    ///
    /// Always succeeds. When the lookup fails or the payload is malformed the
    /// result is [`TweetType::FailSafe`], which is not original, so an unknown
    /// post is never reposted.
    pub async fn classify_type(
        &self,
        tweet: &TweetRef,
        cancel: &CancellationToken,
    ) -> OperationResult<TweetType> {
        let kind = match self.fetch(tweet, cancel).await {
            Ok(data) => match data.derived_reference() {
                Some(reference) => {
                    info!(
                        "Tweet {} is a {} tweet - not eligible for reposting",
                        tweet, reference.kind
                    );
                    TweetType::Derived {
                        reference: reference.kind.clone(),
                    }
                }
                None => TweetType::Original,
            },
            Err(e) => {
                warn!(
                    "Could not classify tweet {} ({}); treating it as not original",
                    tweet, e
                );
                TweetType::FailSafe {
                    reason: e.to_string(),
                }
            }
        };
        OperationResult::Success(kind)
    }

    /// Reposts a post unless the account already has.
    ///
    /// # Returns
    ///
    /// - `Success(Value)`: The platform's response body
    /// - `AlreadyDone`: The post is already reposted; no repost request was sent
    /// - `Failed(ApiError::RateLimited)`: HTTP 429 on both attempts, or platform code 88
    /// - `Failed(..)`: The lookup or the repost failed
    pub async fn repost(
        &self,
        tweet: &TweetRef,
        cancel: &CancellationToken,
    ) -> OperationResult<Value> {
        info!("Starting repost operation for tweet {}", tweet);

        let details = match self.fetch(tweet, cancel).await {
            Ok(details) => details,
            Err(e) => return OperationResult::Failed(e),
        };

        if details.retweeted {
            info!("Tweet {} has already been retweeted. Skipping.", tweet);
            return already_retweeted(tweet);
        }

        let request = ApiRequest::post_json(
            self.endpoints.retweets_url(),
            json!({ "tweet_id": tweet.as_str() }),
        );

        let result = self
            .client
            .call_with(
                &request,
                &RetryPolicy::REPOST,
                cancel,
                "repost",
                |failure: &AttemptFailure| {
                    failure.is_rate_limit() && failure.error_code() != Some(RATE_LIMIT_ERROR_CODE)
                },
            )
            .await;

        match result {
            Ok(body) if platform_error_code(&body) == Some(ALREADY_RETWEETED_ERROR_CODE) => {
                already_retweeted(tweet)
            }
            Ok(body) => {
                info!("Retweet of {} successful", tweet);
                OperationResult::Success(body)
            }
            Err(ApiError::UpstreamRejected { ref body, .. })
                if body_error_code(body) == Some(ALREADY_RETWEETED_ERROR_CODE) =>
            {
                already_retweeted(tweet)
            }
            Err(e) => OperationResult::Failed(e),
        }
    }

    /// Quotes a post with a comment and optional media.
    ///
    /// The comment is sanitized with [`sanitize_comment`] and the quoted post
    /// must exist before anything is posted.
    pub async fn quote(
        &self,
        tweet: &TweetRef,
        comment: &str,
        media: Option<&MediaHandle>,
        cancel: &CancellationToken,
    ) -> OperationResult<Value> {
        let text = sanitize_comment(comment);
        if text.is_empty() {
            return OperationResult::Rejected {
                reason: "Comment is required for quote tweet".to_string(),
            };
        }
        if media.is_some_and(|m| m.media_id.trim().is_empty()) {
            return OperationResult::Rejected {
                reason: "media id cannot be empty".to_string(),
            };
        }

        info!("Starting quote operation for tweet {}", tweet);
        if let Err(e) = self.fetch(tweet, cancel).await {
            warn!("Tweet {} could not be verified, not quoting it", tweet);
            return OperationResult::Failed(e);
        }

        let mut payload = Map::new();
        payload.insert("text".to_string(), Value::String(text));
        payload.insert(
            "quote_tweet_id".to_string(),
            Value::String(tweet.as_str().to_string()),
        );
        if let Some(handle) = media {
            payload.insert("media".to_string(), media_payload(handle));
        }

        self.post_tweet(Value::Object(payload), cancel, "quote_tweet")
            .await
    }

    /// Creates a post, uploading media first when a source is given.
    ///
    /// A failed upload fails the whole operation; no post is created without
    /// the media it asked for.
    pub async fn create_post(
        &self,
        text: &str,
        media: Option<&MediaSource>,
        cancel: &CancellationToken,
    ) -> OperationResult<Value> {
        if text.trim().is_empty() && media.is_none() {
            return OperationResult::Rejected {
                reason: "Post text is required".to_string(),
            };
        }

        let handle = match media {
            Some(source) => {
                info!("Uploading media for new post");
                match self.uploader.upload(source, cancel).await {
                    OperationResult::Success(handle) => Some(handle),
                    other => return other.map(|_| Value::Null),
                }
            }
            None => None,
        };

        let mut payload = Map::new();
        if !text.trim().is_empty() {
            payload.insert("text".to_string(), Value::String(text.to_string()));
        }
        if let Some(handle) = &handle {
            payload.insert("media".to_string(), media_payload(handle));
        }

        self.post_tweet(Value::Object(payload), cancel, "create_post")
            .await
    }

    /// Looks up the authenticated account; used to check the credentials.
    pub async fn verify_credentials(&self, cancel: &CancellationToken) -> OperationResult<Value> {
        let request = ApiRequest::get(self.endpoints.me_url());
        self.client
            .call(&request, &RetryPolicy::STANDARD, cancel, "verify_credentials")
            .await
            .into()
    }

    async fn fetch(
        &self,
        tweet: &TweetRef,
        cancel: &CancellationToken,
    ) -> Result<TweetData, ApiError> {
        let request = ApiRequest::get(self.endpoints.tweet_url(tweet.as_str()));
        let body = self
            .client
            .call(&request, &RetryPolicy::STANDARD, cancel, "fetch_tweet")
            .await?;
        let details = parse_tweet_details(&body)?;
        debug!(
            "Tweet {} details: retweeted={}, {} referenced tweet(s)",
            tweet,
            details.retweeted,
            details.referenced_tweets.len()
        );
        Ok(details)
    }

    async fn post_tweet(
        &self,
        payload: Value,
        cancel: &CancellationToken,
        operation_name: &str,
    ) -> OperationResult<Value> {
        debug!("{} payload: {}", operation_name, payload);
        let request = ApiRequest::post_json(self.endpoints.tweets_url(), payload);
        self.client
            .call(&request, &RetryPolicy::STANDARD, cancel, operation_name)
            .await
            .into()
    }
}

fn media_payload(handle: &MediaHandle) -> Value {
    json!({ "media_ids": [handle.media_id] })
}

fn body_error_code(body: &str) -> Option<i64> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| platform_error_code(&v))
}

fn already_retweeted(tweet: &TweetRef) -> OperationResult<Value> {
    OperationResult::AlreadyDone {
        reason: format!("Tweet {} already retweeted", tweet),
    }
}
