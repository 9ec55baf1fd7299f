//! Domain types shared by the X API operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::ApiError;

/// Identifier of a post on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TweetRef(String);

impl TweetRef {
    /// Wraps a post id, rejecting blank ids and ids with characters other
    /// than ASCII letters, digits, `_` and `-`.
    pub fn new(id: impl Into<String>) -> Result<Self, ApiError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ApiError::Validation("tweet id is required".to_string()));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ApiError::Validation(format!(
                "tweet id '{}' contains invalid characters",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TweetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Media id returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaHandle {
    pub media_id: String,
}

impl MediaHandle {
    pub fn new(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
        }
    }
}

/// Where media bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Downloaded with a plain HTTP GET
    RemoteUrl(String),
    /// Read from the local filesystem
    LocalPath(PathBuf),
}

impl MediaSource {
    /// Treats `http://` and `https://` strings as remote URLs and anything else as a path.
    pub fn parse(source: &str) -> Self {
        let trimmed = source.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            MediaSource::RemoteUrl(trimmed.to_string())
        } else {
            MediaSource::LocalPath(PathBuf::from(trimmed))
        }
    }

    /// File name used for the multipart part.
    pub fn file_name(&self) -> String {
        let name = match self {
            MediaSource::RemoteUrl(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|path| path.rsplit('/').next())
                .map(str::to_string),
            MediaSource::LocalPath(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        };
        name.filter(|n| !n.is_empty())
            .unwrap_or_else(|| "media".to_string())
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::RemoteUrl(url) => write!(f, "{}", url),
            MediaSource::LocalPath(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A post reference listed in `referenced_tweets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// The `data` object of a post lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub retweeted: bool,
    #[serde(default)]
    pub referenced_tweets: Vec<ReferencedTweet>,
}

impl TweetData {
    /// The first reference that makes this post a repost or a quote.
    pub fn derived_reference(&self) -> Option<&ReferencedTweet> {
        self.referenced_tweets
            .iter()
            .find(|r| r.kind == "retweeted" || r.kind == "quoted")
    }
}

/// Classification of a post for repost eligibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TweetType {
    /// Authored content; eligible for reposting
    Original,
    /// A repost or quote of another post
    Derived { reference: String },
    /// Classification failed; treated as not original
    FailSafe { reason: String },
}

impl TweetType {
    pub fn is_original(&self) -> bool {
        matches!(self, TweetType::Original)
    }
}

/// Outcome of a domain operation.
#[derive(Debug)]
pub enum OperationResult<T> {
    Success(T),
    /// Nothing to do; not an error and must not be retried.
    AlreadyDone {
        reason: String,
    },
    /// Refused before any side effect, e.g. missing input.
    Rejected {
        reason: String,
    },
    Failed(ApiError),
}

impl<T> OperationResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            OperationResult::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> OperationResult<U> {
        match self {
            OperationResult::Success(value) => OperationResult::Success(f(value)),
            OperationResult::AlreadyDone { reason } => OperationResult::AlreadyDone { reason },
            OperationResult::Rejected { reason } => OperationResult::Rejected { reason },
            OperationResult::Failed(e) => OperationResult::Failed(e),
        }
    }
}

impl<T> From<Result<T, ApiError>> for OperationResult<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(value) => OperationResult::Success(value),
            Err(ApiError::Validation(reason)) => OperationResult::Rejected { reason },
            Err(e) => OperationResult::Failed(e),
        }
    }
}
