//! Media uploads for the X API.
//!
//! Media bytes are staged in a temporary file before they are uploaded as a
//! multipart body. The temporary file lives exactly as long as the upload:
//! it is removed on every exit path.

use log::{debug, error, info, warn};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use crate::config::EndpointConfig;
use crate::error::ApiError;

use super::api::{sanitize_for_logging, ApiRequest, RetryingClient};
use super::retry::RetryPolicy;
use super::types::{MediaHandle, MediaSource, OperationResult};

/// Multipart field name the upload endpoint expects.
const MEDIA_FIELD: &str = "media";

/// Uploads media and returns the platform's media id.
#[derive(Clone)]
pub struct MediaUploader {
    client: RetryingClient,
    endpoints: EndpointConfig,
    temp_dir: PathBuf,
}

impl MediaUploader {
    pub fn new(client: RetryingClient, endpoints: EndpointConfig, temp_dir: PathBuf) -> Self {
        Self {
            client,
            endpoints,
            temp_dir,
        }
    }

    /// Uploads media from a URL or local path.
    ///
    /// # Returns
    ///
    /// - `Success(MediaHandle)`: The upload response carried `media_id_string`
    /// - `Rejected`: The source was empty
    /// - `Failed`: Download, staging, upload or response validation failed
    pub async fn upload(
        &self,
        source: &MediaSource,
        cancel: &CancellationToken,
    ) -> OperationResult<MediaHandle> {
        info!("Starting media upload from {}", source);
        let result = self.upload_inner(source, cancel).await;
        match &result {
            Ok(handle) => info!("Media uploaded with id {}", handle.media_id),
            Err(e) => error!("Media upload from {} failed: {}", source, e),
        }
        result.into()
    }

    async fn upload_inner(
        &self,
        source: &MediaSource,
        cancel: &CancellationToken,
    ) -> Result<MediaHandle, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let bytes = self.acquire(source, cancel).await?;
        if bytes.is_empty() {
            return Err(ApiError::Validation(format!("media at {} is empty", source)));
        }

        // Dropping `staged` deletes the file, so every early return below cleans up.
        let staged = self.stage(&bytes)?;
        debug!(
            "Staged {} bytes of media at {}",
            bytes.len(),
            staged.path().display()
        );
        drop(bytes);

        let payload = tokio::fs::read(staged.path()).await?;
        let request = ApiRequest::post_multipart(
            &self.endpoints.upload_url,
            MEDIA_FIELD,
            source.file_name(),
            payload,
        );

        let response = self
            .client
            .call(&request, &RetryPolicy::STANDARD, cancel, "upload_media")
            .await;

        let path = staged.path().to_path_buf();
        if let Err(e) = staged.close() {
            warn!("Failed to remove staged media {}: {}", path.display(), e);
        }

        let body = response?;
        body.get("media_id_string")
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
            .map(MediaHandle::new)
            .ok_or_else(|| {
                ApiError::MalformedResponse(format!(
                    "upload response has no media_id_string: {}",
                    sanitize_for_logging(&body.to_string(), 200)
                ))
            })
    }

    async fn acquire(
        &self,
        source: &MediaSource,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ApiError> {
        match source {
            MediaSource::RemoteUrl(url) => {
                info!("Downloading media from {}", url);
                let response = tokio::select! {
                    biased;
                    response = self.client.transport().send(ApiRequest::get(url)) => response?,
                    _ = cancel.cancelled() => {
                        warn!("Media download from {} cancelled", url);
                        return Err(ApiError::Cancelled);
                    }
                };
                if !response.is_success() {
                    let body = response.text();
                    error!("Media download failed - Status: {}", response.status);
                    return Err(ApiError::UpstreamRejected {
                        status: response.status,
                        body: sanitize_for_logging(&body, 200),
                    });
                }
                Ok(response.body)
            }
            MediaSource::LocalPath(path) => {
                info!("Reading media from {}", path.display());
                Ok(tokio::fs::read(path).await?)
            }
        }
    }

    /// Writes `bytes` to a uniquely named file in the staging directory.
    fn stage(&self, bytes: &[u8]) -> Result<NamedTempFile, ApiError> {
        let prefix = format!(
            "xposter-media-{}-",
            chrono::Utc::now().timestamp_millis()
        );
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .tempfile_in(&self.temp_dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{dir_entries, test_client, test_endpoints, ScriptedTransport, UPLOAD_URL};
    use crate::twitter::{ApiResponse, RequestBody};
    use serde_json::json;

    fn uploader(transport: std::sync::Arc<ScriptedTransport>, dir: &std::path::Path) -> MediaUploader {
        MediaUploader::new(test_client(transport), test_endpoints(), dir.to_path_buf())
    }

    #[tokio::test]
    async fn test_remote_upload_returns_handle_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![
            ApiResponse::new(200, vec![0xFFu8, 0xD8, 0xFF]),
            ApiResponse::json(200, &json!({"media_id_string": "710511363345354753"})),
        ]);

        let result = uploader(transport.clone(), dir.path())
            .upload(
                &MediaSource::parse("http://img/x.jpg"),
                &CancellationToken::new(),
            )
            .await;

        let handle = result.success().unwrap();
        assert_eq!(handle.media_id, "710511363345354753");
        assert_eq!(dir_entries(dir.path()), 0);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].request.method, "GET");
        assert!(requests[0].request.header("Authorization").is_none());
        assert_eq!(requests[1].request.url, UPLOAD_URL);
        match &requests[1].request.body {
            RequestBody::Multipart {
                field,
                file_name,
                bytes,
            } => {
                assert_eq!(field, "media");
                assert_eq!(file_name, "x.jpg");
                assert_eq!(bytes, &vec![0xFF, 0xD8, 0xFF]);
            }
            other => panic!("expected multipart body, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_upload_still_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![
            ApiResponse::new(200, vec![1u8, 2, 3]),
            ApiResponse::new(400, r#"{"errors":[{"code":324,"message":"Invalid media"}]}"#),
        ]);

        let result = uploader(transport, dir.path())
            .upload(&MediaSource::parse("http://img/x.jpg"), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            OperationResult::Failed(ApiError::UpstreamRejected { status: 400, .. })
        ));
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_media_id_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![
            ApiResponse::new(200, vec![1u8]),
            ApiResponse::json(200, &json!({"media_id": 5})),
        ]);

        let result = uploader(transport, dir.path())
            .upload(&MediaSource::parse("http://img/x.jpg"), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            OperationResult::Failed(ApiError::MalformedResponse(_))
        ));
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_failed_download_never_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![ApiResponse::new(404, "not found")]);

        let result = uploader(transport.clone(), dir.path())
            .upload(&MediaSource::parse("http://img/x.jpg"), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            OperationResult::Failed(ApiError::UpstreamRejected { status: 404, .. })
        ));
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_local_file_upload() {
        let staging = tempfile::tempdir().unwrap();
        let inputs = tempfile::tempdir().unwrap();
        let photo = inputs.path().join("photo.png");
        std::fs::write(&photo, b"png-bytes").unwrap();

        let transport = ScriptedTransport::new(vec![ApiResponse::json(
            200,
            &json!({"media_id_string": "9"}),
        )]);

        let result = uploader(transport.clone(), staging.path())
            .upload(&MediaSource::LocalPath(photo), &CancellationToken::new())
            .await;

        assert_eq!(result.success().unwrap().media_id, "9");
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(dir_entries(staging.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_local_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![]);

        let result = uploader(transport.clone(), dir.path())
            .upload(
                &MediaSource::LocalPath(dir.path().join("missing.jpg")),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, OperationResult::Failed(ApiError::Io(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_media_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![ApiResponse::new(200, Vec::<u8>::new())]);

        let result = uploader(transport.clone(), dir.path())
            .upload(&MediaSource::parse("http://img/empty.jpg"), &CancellationToken::new())
            .await;

        assert!(matches!(result, OperationResult::Rejected { .. }));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_download_stops_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let transport = ScriptedTransport::new(vec![ApiResponse::new(200, vec![1u8, 2])])
            .with_latency(std::time::Duration::from_secs(30));
        let started = tokio::time::Instant::now();

        let result = uploader(transport.clone(), dir.path())
            .upload(&MediaSource::parse("http://img/x.jpg"), &cancel)
            .await;

        assert!(matches!(result, OperationResult::Failed(ApiError::Cancelled)));
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_upload_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let transport = ScriptedTransport::new(vec![
            ApiResponse::new(200, vec![7u8, 7]),
            ApiResponse::new(429, "{}"),
        ])
        .on_send(move |req| {
            if req.url == UPLOAD_URL {
                trigger.cancel();
            }
        });

        let result = uploader(transport.clone(), dir.path())
            .upload(&MediaSource::parse("http://img/x.jpg"), &cancel)
            .await;

        assert!(matches!(result, OperationResult::Failed(ApiError::Cancelled)));
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(dir_entries(dir.path()), 0);
    }
}
