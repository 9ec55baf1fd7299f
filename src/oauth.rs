//! OAuth 1.0a request signing for X API integration.
//!
//! Every outbound call is signed with HMAC-SHA1 over the request method, the
//! normalized URL and the OAuth protocol parameters. A signature is bound to
//! a single nonce and timestamp, so callers sign again for every attempt.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use sha1::Sha1;
use url::Url;

use crate::config::Credentials;
use crate::error::ApiError;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";
const NONCE_LENGTH: usize = 32;

/// Headers produced by signing a request.
///
/// Holds a fresh nonce and timestamp; never reuse it for a second request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// The complete `Authorization` header value, starting with `OAuth `
    pub authorization: String,
    /// Defaults to `application/json`
    pub content_type: String,
}

/// Signs a request with a freshly generated nonce and the current time.
///
/// # Parameters
///
/// - `method`: HTTP method, e.g. `GET` or `POST`
/// - `url`: Full request URL; query parameters are included in the signature
/// - `credentials`: Consumer and token credentials
///
/// # Returns
///
/// - `Ok(SignedHeaders)`: `Authorization` and `Content-Type` headers
/// - `Err(ApiError::Config)`: If a credential is empty or the URL does not parse
///
/// # Example
///
/// ```rust
/// use xposter::{sign_request, Credentials};
///
/// let creds = Credentials::new("key", "secret", "token", "token-secret");
/// let headers = sign_request("GET", "https://api.x.com/2/users/me", &creds).unwrap();
/// assert!(headers.authorization.starts_with("OAuth "));
/// ```
pub fn sign_request(
    method: &str,
    url: &str,
    credentials: &Credentials,
) -> Result<SignedHeaders, ApiError> {
    let nonce = generate_nonce();
    let timestamp = chrono::Utc::now().timestamp();
    sign_request_with(method, url, credentials, &nonce, timestamp)
}

/// Signs a request with a caller-supplied nonce and timestamp.
///
/// With both fixed, the output depends only on `method`, `url` and
/// `credentials`.
pub fn sign_request_with(
    method: &str,
    url: &str,
    credentials: &Credentials,
    nonce: &str,
    timestamp: i64,
) -> Result<SignedHeaders, ApiError> {
    credentials.validate()?;

    let parsed = Url::parse(url)
        .map_err(|e| ApiError::Config(format!("cannot sign invalid URL '{}': {}", url, e)))?;

    let timestamp = timestamp.to_string();
    let mut oauth_params: Vec<(&str, &str)> = vec![
        ("oauth_consumer_key", credentials.consumer_key.as_str()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", SIGNATURE_METHOD),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", credentials.access_token.as_str()),
        ("oauth_version", OAUTH_VERSION),
    ];

    let query_params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    let base_string = signature_base_string(method, &parsed, &oauth_params, &query_params);

    let signing_key = format!(
        "{}&{}",
        percent_encode(&credentials.consumer_secret),
        percent_encode(&credentials.access_token_secret)
    );
    let signature = hmac_sha1_base64(&signing_key, &base_string)?;

    oauth_params.push(("oauth_signature", signature.as_str()));
    oauth_params.sort_by(|a, b| a.0.cmp(b.0));

    let header_params: Vec<String> = oauth_params
        .iter()
        .map(|(key, value)| format!("{}=\"{}\"", percent_encode(key), percent_encode(value)))
        .collect();

    Ok(SignedHeaders {
        authorization: format!("OAuth {}", header_params.join(", ")),
        content_type: "application/json".to_string(),
    })
}

/// Percent-encodes a string with the RFC 3986 unreserved set, as OAuth requires.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Builds the signature base string: `METHOD&url&params`.
fn signature_base_string(
    method: &str,
    url: &Url,
    oauth_params: &[(&str, &str)],
    query_params: &[(String, String)],
) -> String {
    let mut encoded: Vec<(String, String)> = oauth_params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .chain(
            query_params
                .iter()
                .map(|(k, v)| (percent_encode(k), percent_encode(v))),
        )
        .collect();
    encoded.sort();

    let parameter_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(&normalize_url(url)),
        percent_encode(&parameter_string)
    )
}

/// Scheme, host, non-default port and path; no query or fragment.
fn normalize_url(url: &Url) -> String {
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    // `Url::port` is already `None` for the scheme's default port.
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", scheme, host, port, url.path()),
        None => format!("{}://{}{}", scheme, host, url.path()),
    }
}

fn hmac_sha1_base64(key: &str, data: &str) -> Result<String, ApiError> {
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| ApiError::Config(format!("invalid signing key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Credentials from the platform's "Creating a signature" walkthrough.
    fn documented_credentials() -> Credentials {
        Credentials::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        )
    }

    fn header_param<'a>(header: &'a str, key: &str) -> Option<&'a str> {
        header
            .strip_prefix("OAuth ")?
            .split(", ")
            .find_map(|pair| pair.strip_prefix(&format!("{}=\"", key)))
            .and_then(|rest| rest.strip_suffix('"'))
    }

    #[test]
    fn test_matches_documented_signature() {
        let url = "https://api.twitter.com/1.1/statuses/update.json?include_entities=true&status=Hello%20Ladies%20%2B%20Gentlemen%2C%20a%20signed%20OAuth%20request%21";

        let headers = sign_request_with(
            "POST",
            url,
            &documented_credentials(),
            "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            1318622958,
        )
        .unwrap();

        // "hCtSmYh+iHYCEqBWrE7C7hYmtUk=" percent-encoded in the header
        assert_eq!(
            header_param(&headers.authorization, "oauth_signature"),
            Some("hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D")
        );
    }

    #[test]
    fn test_fixed_nonce_and_timestamp_are_reproducible() {
        let creds = documented_credentials();
        let a = sign_request_with("GET", "https://api.x.com/2/tweets/42", &creds, "abc", 1700000000)
            .unwrap();
        let b = sign_request_with("GET", "https://api.x.com/2/tweets/42", &creds, "abc", 1700000000)
            .unwrap();
        assert_eq!(a, b);

        let other_method =
            sign_request_with("POST", "https://api.x.com/2/tweets/42", &creds, "abc", 1700000000)
                .unwrap();
        assert_ne!(a.authorization, other_method.authorization);
    }

    #[test]
    fn test_header_carries_all_protocol_parameters() {
        let headers = sign_request_with(
            "get",
            "https://api.x.com/2/users/me",
            &documented_credentials(),
            "nonce123",
            1700000000,
        )
        .unwrap();

        let auth = &headers.authorization;
        assert_eq!(
            header_param(auth, "oauth_consumer_key"),
            Some("xvz1evFS4wEEPTGEFPHBog")
        );
        assert_eq!(header_param(auth, "oauth_nonce"), Some("nonce123"));
        assert_eq!(header_param(auth, "oauth_signature_method"), Some("HMAC-SHA1"));
        assert_eq!(header_param(auth, "oauth_timestamp"), Some("1700000000"));
        assert_eq!(header_param(auth, "oauth_version"), Some("1.0"));
        assert!(header_param(auth, "oauth_token").is_some());
        assert!(header_param(auth, "oauth_signature").is_some());
        assert_eq!(headers.content_type, "application/json");
    }

    #[test]
    fn test_fresh_signatures_use_distinct_nonces() {
        let creds = documented_credentials();
        let a = sign_request("GET", "https://api.x.com/2/users/me", &creds).unwrap();
        let b = sign_request("GET", "https://api.x.com/2/users/me", &creds).unwrap();

        let nonce_a = header_param(&a.authorization, "oauth_nonce").unwrap();
        let nonce_b = header_param(&b.authorization, "oauth_nonce").unwrap();
        assert_eq!(nonce_a.len(), NONCE_LENGTH);
        assert_ne!(nonce_a, nonce_b);
    }

    #[test]
    fn test_empty_credentials_are_config_error() {
        let creds = Credentials::new("key", "secret", "", "token-secret");
        let result = sign_request("GET", "https://api.x.com/2/users/me", &creds);
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let result = sign_request("GET", "not a url", &documented_credentials());
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[test]
    fn test_normalize_url_drops_default_port_and_query() {
        let url = Url::parse("HTTPS://API.X.com:443/2/tweets?ids=1#frag").unwrap();
        assert_eq!(normalize_url(&url), "https://api.x.com/2/tweets");

        let url = Url::parse("http://localhost:8080/2/tweets").unwrap();
        assert_eq!(normalize_url(&url), "http://localhost:8080/2/tweets");
    }

    #[test]
    fn test_percent_encode_uses_unreserved_set() {
        assert_eq!(percent_encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
        assert_eq!(percent_encode("a-b.c_d~e"), "a-b.c_d~e");
        assert_eq!(percent_encode("☃"), "%E2%98%83");
    }
}
