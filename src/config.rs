//! Configuration module for the xposter service.
//!
//! This module contains the credential and endpoint structures used by the
//! X API integration, and the environment variable handling that builds them
//! once at startup.

use log::{debug, error, info, warn};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ApiError;
use crate::oauth::percent_encode;

/// Default port when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 8080;

const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 120;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default cap on a media form upload: the platform's 5 MB image limit plus
/// room for the other form fields.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024 + 64 * 1024;

/// OAuth 1.0a credentials for the X API.
///
/// Loaded once at startup and shared read-only by every signer call. The
/// `Debug` implementation masks all four values.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The API key (OAuth consumer key)
    pub consumer_key: String,
    /// The API key secret (OAuth consumer secret)
    pub consumer_secret: String,
    /// The user access token
    pub access_token: String,
    /// The user access token secret
    pub access_token_secret: String,
}

impl Credentials {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: access_token.into(),
            access_token_secret: access_token_secret.into(),
        }
    }

    /// Checks that no credential is empty.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: If all four values are present
    /// - `Err(ApiError::Config)`: Naming the first empty value
    pub fn validate(&self) -> Result<(), ApiError> {
        let fields = [
            ("consumer key", &self.consumer_key),
            ("consumer secret", &self.consumer_secret),
            ("access token", &self.access_token),
            ("access token secret", &self.access_token_secret),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ApiError::Config(format!("{} is empty", name)));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &mask_secret(&self.consumer_key))
            .field("consumer_secret", &mask_secret(&self.consumer_secret))
            .field("access_token", &mask_secret(&self.access_token))
            .field("access_token_secret", &mask_secret(&self.access_token_secret))
            .finish()
    }
}

/// Platform endpoints and the account the service acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Base URL of the v2 API, e.g. `https://api.x.com/2`
    pub api_base_url: String,
    /// Full media upload URL, e.g. `https://upload.twitter.com/1.1/media/upload.json`
    pub upload_url: String,
    /// Numeric id of the authenticated user, used by the repost endpoint
    pub user_id: String,
}

impl EndpointConfig {
    pub fn new(
        api_base_url: impl Into<String>,
        upload_url: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            upload_url: upload_url.into(),
            user_id: user_id.into(),
        }
    }

    /// The id is percent-encoded so it always stays a single path segment.
    pub fn tweet_url(&self, tweet_id: &str) -> String {
        format!("{}/tweets/{}", self.api_base_url, percent_encode(tweet_id))
    }

    pub fn tweets_url(&self) -> String {
        format!("{}/tweets", self.api_base_url)
    }

    pub fn retweets_url(&self) -> String {
        format!("{}/users/{}/retweets", self.api_base_url, self.user_id)
    }

    pub fn me_url(&self) -> String {
        format!("{}/users/me", self.api_base_url)
    }
}

/// Everything the service reads from its environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub endpoints: EndpointConfig,
    pub port: u16,
    /// Upper bound on how long a single inbound request may spend on the platform
    pub request_deadline: Duration,
    /// Timeout applied to each outbound HTTP request
    pub http_timeout: Duration,
    /// Directory in which media is staged before upload
    pub media_temp_dir: PathBuf,
    /// Largest multipart body accepted by the media upload route
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Creates a new `AppConfig` by loading values from environment variables.
    ///
    /// # Required Environment Variables
    ///
    /// - `API_KEY`, `API_SECRET`: OAuth consumer key and secret
    /// - `ACCESS_TOKEN`, `ACCESS_TOKEN_SECRET`: OAuth user token and secret
    /// - `BASE_URL`: Base URL of the v2 API
    /// - `UPLOAD_URL`: Media upload endpoint
    /// - `USER_ID`: Numeric id of the authenticated account
    ///
    /// # Optional Environment Variables
    ///
    /// - `PORT`: Server port (defaults to 8080)
    /// - `REQUEST_DEADLINE_SECS`: Per-request deadline (defaults to 120)
    /// - `HTTP_TIMEOUT_SECS`: Outbound HTTP timeout (defaults to 30)
    /// - `MEDIA_TEMP_DIR`: Staging directory for uploads (defaults to the system temp dir)
    /// - `MAX_UPLOAD_BYTES`: Body limit for media form uploads (defaults to 5 MB plus form overhead)
    ///
    /// # Returns
    ///
    /// - `Ok(AppConfig)`: If every required variable is present and non-empty
    /// - `Err(ApiError::Config)`: Naming the first missing or invalid variable
    pub fn from_env() -> Result<Self, ApiError> {
        info!("Loading configuration from environment variables");
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a map instead of touching the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = Credentials::new(
            required_secret(&lookup, "API_KEY")?,
            required_secret(&lookup, "API_SECRET")?,
            required_secret(&lookup, "ACCESS_TOKEN")?,
            required_secret(&lookup, "ACCESS_TOKEN_SECRET")?,
        );

        let endpoints = EndpointConfig::new(
            required(&lookup, "BASE_URL")?,
            required(&lookup, "UPLOAD_URL")?,
            required(&lookup, "USER_ID")?,
        );

        let port = optional_number(&lookup, "PORT", DEFAULT_PORT)?;
        let request_deadline = Duration::from_secs(optional_number(
            &lookup,
            "REQUEST_DEADLINE_SECS",
            DEFAULT_REQUEST_DEADLINE_SECS,
        )?);
        let http_timeout = Duration::from_secs(optional_number(
            &lookup,
            "HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);

        let max_upload_bytes =
            optional_number(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        let media_temp_dir = match lookup("MEDIA_TEMP_DIR").filter(|v| !v.trim().is_empty()) {
            Some(dir) => {
                info!("Using MEDIA_TEMP_DIR for media staging: {}", dir);
                PathBuf::from(dir)
            }
            None => env::temp_dir(),
        };

        let config = AppConfig {
            credentials,
            endpoints,
            port,
            request_deadline,
            http_timeout,
            media_temp_dir,
            max_upload_bytes,
        };

        info!(
            "Configuration loaded successfully (api base: {}, user id: {})",
            config.endpoints.api_base_url, config.endpoints.user_id
        );
        Ok(config)
    }
}

/// Masks a secret for logging, keeping only its first four characters.
pub(crate) fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}...", prefix)
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ApiError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => {
            debug!("Found {} environment variable", key);
            Ok(value.trim().to_string())
        }
        Some(_) => {
            error!("{} is set but empty", key);
            Err(ApiError::Config(format!("{} cannot be empty", key)))
        }
        None => {
            error!("Make sure {} environment variable is set", key);
            Err(ApiError::Config(format!(
                "Missing {} environment variable",
                key
            )))
        }
    }
}

fn required_secret<F>(lookup: &F, key: &str) -> Result<String, ApiError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = required(lookup, key)?;
    info!(
        "Found {} environment variable with length: {}",
        key,
        value.len()
    );
    debug!("{} (masked): {}", key, mask_secret(&value));
    if value.len() < 10 {
        warn!("{} seems unusually short ({} characters)", key, value.len());
    }
    Ok(value)
}

fn optional_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ApiError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            error!("{} must be a valid number, got '{}'", key, raw);
            ApiError::Config(format!("{} must be a valid number", key))
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("API_KEY", "consumer-key-123".to_string()),
            ("API_SECRET", "consumer-secret-456".to_string()),
            ("ACCESS_TOKEN", "access-token-789".to_string()),
            ("ACCESS_TOKEN_SECRET", "token-secret-000".to_string()),
            ("BASE_URL", "https://api.x.com/2/".to_string()),
            (
                "UPLOAD_URL",
                "https://upload.twitter.com/1.1/media/upload.json".to_string(),
            ),
            ("USER_ID", "1234567890".to_string()),
        ])
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<AppConfig, ApiError> {
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_loads_required_values_and_defaults() {
        let config = load(&full_env()).unwrap();

        assert_eq!(config.credentials.consumer_key, "consumer-key-123");
        assert_eq!(config.credentials.access_token_secret, "token-secret-000");
        assert_eq!(config.endpoints.api_base_url, "https://api.x.com/2");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.request_deadline, Duration::from_secs(120));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_missing_credential_is_config_error() {
        let mut vars = full_env();
        vars.remove("ACCESS_TOKEN_SECRET");

        match load(&vars) {
            Err(ApiError::Config(msg)) => assert!(msg.contains("ACCESS_TOKEN_SECRET")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_value_is_config_error() {
        let mut vars = full_env();
        vars.insert("USER_ID", "   ".to_string());

        assert!(matches!(load(&vars), Err(ApiError::Config(_))));
    }

    #[test]
    fn test_optional_values_are_parsed() {
        let mut vars = full_env();
        vars.insert("PORT", "9090".to_string());
        vars.insert("REQUEST_DEADLINE_SECS", "15".to_string());
        vars.insert("MEDIA_TEMP_DIR", "/var/tmp/xposter".to_string());
        vars.insert("MAX_UPLOAD_BYTES", "1048576".to_string());

        let config = load(&vars).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.request_deadline, Duration::from_secs(15));
        assert_eq!(config.media_temp_dir, PathBuf::from("/var/tmp/xposter"));
        assert_eq!(config.max_upload_bytes, 1_048_576);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut vars = full_env();
        vars.insert("PORT", "eighty".to_string());

        assert!(matches!(load(&vars), Err(ApiError::Config(_))));
    }

    #[test]
    fn test_endpoint_templates() {
        let endpoints = EndpointConfig::new("https://api.x.com/2", "https://up/x.json", "77");

        assert_eq!(endpoints.tweet_url("42"), "https://api.x.com/2/tweets/42");
        assert_eq!(endpoints.tweets_url(), "https://api.x.com/2/tweets");
        assert_eq!(
            endpoints.retweets_url(),
            "https://api.x.com/2/users/77/retweets"
        );
        assert_eq!(endpoints.me_url(), "https://api.x.com/2/users/me");
    }

    #[test]
    fn test_tweet_url_keeps_id_in_one_segment() {
        let endpoints = EndpointConfig::new("https://api.x.com/2", "https://up/x.json", "77");

        assert_eq!(
            endpoints.tweet_url("../users/me?user.fields=x#frag"),
            "https://api.x.com/2/tweets/..%2Fusers%2Fme%3Fuser.fields%3Dx%23frag"
        );
        let url = url::Url::parse(&endpoints.tweet_url("a/b?c#d")).unwrap();
        assert_eq!(url.path(), "/2/tweets/a%2Fb%3Fc%23d");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_credentials_debug_masks_secrets() {
        let creds = Credentials::new("abcdefgh", "secretvalue", "tokenvalue", "tokensecret");
        let debug = format!("{:?}", creds);

        assert!(!debug.contains("secretvalue"));
        assert!(!debug.contains("tokensecret"));
        assert!(debug.contains("abcd..."));
    }

    #[test]
    fn test_validate_rejects_empty_credential() {
        let creds = Credentials::new("key", "", "token", "secret");
        assert!(matches!(creds.validate(), Err(ApiError::Config(_))));
    }
}
