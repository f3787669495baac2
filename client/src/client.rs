//! HTTP client for the registry's storage-info and download endpoints.

use std::path::Path;

use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{Result, SyncError};

/// Remote-side description of one artifact, as returned by the storage-info
/// endpoint. Fetched fresh on every sync invocation; never cached.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    /// Authoritative fetch location. Non-empty whenever resolution succeeds.
    pub download_uri: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub checksums: ArtifactChecksums,
}

/// Digest set the registry has computed for an artifact. Any entry may be
/// empty if the server has not (yet) computed that digest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactChecksums {
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub md5: String,
}

/// Client for one registry. Cheap to clone; the inner `reqwest::Client`
/// is already reference-counted.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl RegistryClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base = url::Url::parse(&config.base_url).map_err(|e| {
            SyncError::Validation(format!("invalid registry URL '{}': {e}", config.base_url))
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(SyncError::Validation(format!(
                "registry URL '{}' must use http or https",
                config.base_url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::RemoteUnavailable(format!("HTTP client build failed: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url);
        if let Some(key) = &self.config.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        req
    }

    /// Direct download URL for a repo path, used by alias-mode sync where the
    /// server resolves the path itself. `path` is used verbatim, not escaped.
    pub fn direct_url(&self, repo_key: &str, path: &str) -> String {
        format!("{}/{}/{}", self.config.base_url, repo_key, path)
    }

    /// Fetch artifact metadata (download URI + checksum set) for a repo path.
    ///
    /// Distinguishes a missing artifact (`RemoteNotFound`) from a registry
    /// that could not be reached or answered abnormally (`RemoteUnavailable`).
    pub async fn storage_info(&self, repo_key: &str, path: &str) -> Result<ArtifactMetadata> {
        let url = format!(
            "{}/api/v1/repositories/{}/artifacts/{}/storage-info",
            self.config.base_url, repo_key, path
        );
        tracing::debug!(repo = repo_key, path = path, "Resolving artifact metadata");

        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(SyncError::RemoteNotFound(format!("{repo_key}/{path}")));
            }
            status if !status.is_success() => {
                return Err(SyncError::RemoteUnavailable(format!(
                    "storage-info for {repo_key}/{path} returned {status}"
                )));
            }
            _ => {}
        }

        let metadata: ArtifactMetadata = response
            .json()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(format!("invalid storage-info body: {e}")))?;

        if metadata.download_uri.is_empty() {
            return Err(SyncError::RemoteUnavailable(format!(
                "storage-info for {repo_key}/{path} has no downloadUri"
            )));
        }

        Ok(metadata)
    }

    /// Stream a download to `local_path`, creating parent directories and
    /// truncating any existing file.
    ///
    /// A transport failure mid-stream leaves the partial file in place (the
    /// caller's checksum gate re-fetches it on the next verified sync).
    /// Cancellation aborts the transfer and removes the partial file.
    pub async fn download_to(
        &self,
        url: &str,
        local_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let response = self
            .request(url)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(SyncError::RemoteNotFound(url.to_string()));
            }
            status if !status.is_success() => {
                return Err(SyncError::RemoteUnavailable(format!(
                    "download of {url} returned {status}"
                )));
            }
            _ => {}
        }

        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::File::create(local_path).await?;

        let result = Self::write_body(&mut file, response, cancel).await;
        drop(file);

        if matches!(result, Err(SyncError::Cancelled)) {
            // Best effort; the cancel itself is the reported error.
            if let Err(e) = tokio::fs::remove_file(local_path).await {
                tracing::warn!(path = %local_path.display(), error = %e, "Failed to remove partial file after cancel");
            }
        }
        result
    }

    async fn write_body(
        file: &mut tokio::fs::File,
        response: reqwest::Response,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut stream = response.bytes_stream();
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(SyncError::Cancelled);
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => file.write_all(&bytes).await?,
                    Some(Err(e)) => {
                        return Err(SyncError::RemoteUnavailable(format!(
                            "transfer aborted mid-stream: {e}"
                        )));
                    }
                    None => break,
                },
            }
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_unparseable_base_url() {
        let err = RegistryClient::new(ClientConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn test_new_rejects_non_http_scheme() {
        let err = RegistryClient::new(ClientConfig::new("ftp://registry.example.com")).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn test_direct_url_joins_verbatim() {
        let client =
            RegistryClient::new(ClientConfig::new("http://registry.example.com/")).unwrap();
        assert_eq!(
            client.direct_url("libs-release", "org/acme/app/[RELEASE]/app.jar"),
            "http://registry.example.com/libs-release/org/acme/app/[RELEASE]/app.jar"
        );
    }

    #[test]
    fn test_metadata_deserializes_artifactory_style_body() {
        let body = r#"{
            "downloadUri": "http://registry.example.com/libs-release/a.jar",
            "size": 1024,
            "checksums": { "sha256": "ABCD", "sha1": "", "md5": "ff" }
        }"#;
        let meta: ArtifactMetadata = serde_json::from_str(body).unwrap();
        assert_eq!(
            meta.download_uri,
            "http://registry.example.com/libs-release/a.jar"
        );
        assert_eq!(meta.size, Some(1024));
        assert_eq!(meta.checksums.sha256, "ABCD");
    }

    #[test]
    fn test_metadata_tolerates_missing_checksums() {
        let body = r#"{ "downloadUri": "http://r/x" }"#;
        let meta: ArtifactMetadata = serde_json::from_str(body).unwrap();
        assert!(meta.checksums.sha256.is_empty());
        assert!(meta.size.is_none());
    }
}
