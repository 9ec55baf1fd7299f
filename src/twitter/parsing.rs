//! Text and payload parsing for X API operations.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::ApiError;

use super::types::TweetData;

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

/// Collapses newlines, tabs and repeated spaces into single spaces and trims the ends.
///
/// # Example
///
/// ```rust
/// use xposter::twitter::sanitize_comment;
///
/// assert_eq!(sanitize_comment("  hello\tworld\n"), "hello world");
/// ```
pub fn sanitize_comment(text: &str) -> String {
    whitespace_run().replace_all(text.trim(), " ").into_owned()
}

/// Extracts the `data` object from a post lookup response.
///
/// # Returns
///
/// - `Ok(TweetData)`: If `data` is present and well formed
/// - `Err(ApiError::MalformedResponse)`: If `data` is missing, null or has the wrong shape
pub(crate) fn parse_tweet_details(body: &Value) -> Result<TweetData, ApiError> {
    let data = body
        .get("data")
        .filter(|d| !d.is_null())
        .ok_or_else(|| ApiError::MalformedResponse("tweet lookup returned no data".to_string()))?;

    serde_json::from_value(data.clone())
        .map_err(|e| ApiError::MalformedResponse(format!("unexpected tweet data: {}", e)))
}
