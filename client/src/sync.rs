//! Sync orchestration: skip/fetch decision, transfer, post-verify.
//!
//! Two modes share one entry function. Verified mode gates the download on a
//! SHA-256 comparison against the registry's storage-info and re-hashes the
//! file after transfer. Alias mode targets server-resolved pointer paths
//! (e.g. a "latest" alias) where no stable digest exists to compare against,
//! so it skips on existence alone and performs no post-verify.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::checksum;
use crate::client::RegistryClient;
use crate::error::{Result, SyncError};

/// How a sync invocation treats the requested path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Stable path: checksum-gated download with post-transfer verification.
    Verified,
    /// Server-resolved pointer path: existence-only skip, no verification.
    Aliased,
}

/// Skip/fetch decision for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Skip,
    Fetch,
}

/// What a successful sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Skip,
    Fetched,
}

/// Result record for one sync invocation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncOutcome {
    pub action: SyncAction,
    /// True when the local file is known to match the registry's digest,
    /// either by the pre-download comparison (skip) or by post-verify (fetch).
    pub verified: bool,
}

/// Decide whether a download is needed. Pure; first match wins.
///
/// The force flag beats everything. An empty remote digest means the registry
/// has not computed one, which is treated as "assume changed" rather than
/// silently skipping a sync the caller cannot verify.
pub fn decide(local_exists: bool, local_sha256: &str, remote_sha256: &str, force: bool) -> Action {
    if force {
        return Action::Fetch;
    }
    if !local_exists {
        return Action::Fetch;
    }
    if remote_sha256.is_empty() {
        return Action::Fetch;
    }
    if !checksum::digests_match(local_sha256, remote_sha256) {
        return Action::Fetch;
    }
    Action::Skip
}

/// Race a blocking stage against cancellation. `biased` so a cancelled token
/// wins deterministically even when the stage future is already ready.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fut => result,
    }
}

/// Advisory per-path locks. Two invocations targeting the same local path
/// serialize their transfer + verify sections; distinct paths never contend.
/// Keys are the paths as given, so callers racing through different spellings
/// of one path are not protected.
#[derive(Debug, Default)]
struct PathLocks {
    inner: StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    async fn acquire(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // An entry whose Arc is only held by the map is idle (no guard,
            // no waiter); drop it so the map does not grow unboundedly over
            // the life of the Syncer.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Synchronizes single artifacts from a registry to local paths.
///
/// Each call is a self-contained unit of work; no state is carried across
/// invocations beyond the advisory lock map.
pub struct Syncer {
    client: RegistryClient,
    locks: PathLocks,
}

impl Syncer {
    pub fn new(client: RegistryClient) -> Self {
        Self {
            client,
            locks: PathLocks::default(),
        }
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    /// Checksum-gated sync with post-transfer verification.
    pub async fn sync_verified(
        &self,
        repo_key: &str,
        path: &str,
        local_path: &Path,
        force: bool,
    ) -> Result<SyncOutcome> {
        self.sync(
            SyncMode::Verified,
            repo_key,
            path,
            local_path,
            force,
            &CancellationToken::new(),
        )
        .await
    }

    /// Existence-gated sync of a server-resolved alias path.
    pub async fn sync_aliased(
        &self,
        repo_key: &str,
        path: &str,
        local_path: &Path,
        force: bool,
    ) -> Result<SyncOutcome> {
        self.sync(
            SyncMode::Aliased,
            repo_key,
            path,
            local_path,
            force,
            &CancellationToken::new(),
        )
        .await
    }

    /// Single entry point for both modes. `cancel` short-circuits every
    /// blocking stage (metadata resolution, hashing, transfer); a transfer
    /// aborted by it removes its partial file.
    pub async fn sync(
        &self,
        mode: SyncMode,
        repo_key: &str,
        path: &str,
        local_path: &Path,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        if repo_key.is_empty() {
            return Err(SyncError::Validation("repository key is required".into()));
        }
        if path.is_empty() {
            return Err(SyncError::Validation("artifact path is required".into()));
        }
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let _guard = self.locks.acquire(local_path).await;
        let local_exists = tokio::fs::try_exists(local_path).await.unwrap_or(false);

        match mode {
            SyncMode::Aliased => {
                self.sync_alias_locked(repo_key, path, local_path, local_exists, force, cancel)
                    .await
            }
            SyncMode::Verified => {
                self.sync_verified_locked(repo_key, path, local_path, local_exists, force, cancel)
                    .await
            }
        }
    }

    async fn sync_verified_locked(
        &self,
        repo_key: &str,
        path: &str,
        local_path: &Path,
        local_exists: bool,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let metadata = cancellable(cancel, self.client.storage_info(repo_key, path)).await?;
        let remote_sha256 = metadata.checksums.sha256.clone();

        // Hash the local file only when the decision can actually use it.
        let local_sha256 = if local_exists && !force && !remote_sha256.is_empty() {
            cancellable(cancel, checksum::file_sha256(local_path)).await?
        } else {
            String::new()
        };

        match decide(local_exists, &local_sha256, &remote_sha256, force) {
            Action::Skip => {
                tracing::debug!(
                    repo = repo_key,
                    path = path,
                    sha256 = %remote_sha256,
                    "Local file up to date, skipping download"
                );
                Ok(SyncOutcome {
                    action: SyncAction::Skip,
                    verified: true,
                })
            }
            Action::Fetch => {
                tracing::info!(
                    repo = repo_key,
                    path = path,
                    dest = %local_path.display(),
                    "Downloading artifact"
                );
                self.client
                    .download_to(&metadata.download_uri, local_path, cancel)
                    .await?;

                if remote_sha256.is_empty() {
                    tracing::warn!(
                        repo = repo_key,
                        path = path,
                        "Registry supplied no sha256; downloaded file is unverified"
                    );
                    return Ok(SyncOutcome {
                        action: SyncAction::Fetched,
                        verified: false,
                    });
                }

                let actual = cancellable(cancel, checksum::file_sha256(local_path)).await?;
                if !checksum::digests_match(&actual, &remote_sha256) {
                    return Err(SyncError::ChecksumMismatch {
                        expected: remote_sha256,
                        actual,
                    });
                }
                Ok(SyncOutcome {
                    action: SyncAction::Fetched,
                    verified: true,
                })
            }
        }
    }

    async fn sync_alias_locked(
        &self,
        repo_key: &str,
        path: &str,
        local_path: &Path,
        local_exists: bool,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        if local_exists && !force {
            tracing::debug!(
                repo = repo_key,
                path = path,
                "Local file present, skipping alias download"
            );
            return Ok(SyncOutcome {
                action: SyncAction::Skip,
                verified: false,
            });
        }

        let url = self.client.direct_url(repo_key, path);
        tracing::info!(
            repo = repo_key,
            path = path,
            dest = %local_path.display(),
            "Downloading alias artifact"
        );
        self.client.download_to(&url, local_path, cancel).await?;

        Ok(SyncOutcome {
            action: SyncAction::Fetched,
            verified: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA_A: &str = "7a240aa93422ecde5e4f69a75e1f1a0e07b1dba1e011e6099b30e9f0b50dfdd8";
    const SHA_B: &str = "c0ffee0000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn test_decide_table() {
        // (exists, local, remote, force) -> expected
        let cases: &[(bool, &str, &str, bool, Action)] = &[
            // force wins over everything, including equality
            (true, SHA_A, SHA_A, true, Action::Fetch),
            (true, SHA_A, SHA_B, true, Action::Fetch),
            (false, "", SHA_A, true, Action::Fetch),
            (true, SHA_A, "", true, Action::Fetch),
            // missing local file
            (false, "", SHA_A, false, Action::Fetch),
            (false, "", "", false, Action::Fetch),
            // unknown remote digest is assumed changed
            (true, SHA_A, "", false, Action::Fetch),
            // digest mismatch
            (true, SHA_A, SHA_B, false, Action::Fetch),
            // equality skips
            (true, SHA_A, SHA_A, false, Action::Skip),
        ];
        for &(exists, local, remote, force, expected) in cases {
            assert_eq!(
                decide(exists, local, remote, force),
                expected,
                "decide({exists}, {local:?}, {remote:?}, {force})"
            );
        }
    }

    #[test]
    fn test_decide_ignores_digest_case() {
        assert_eq!(
            decide(true, &SHA_A.to_uppercase(), SHA_A, false),
            Action::Skip
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = SyncOutcome {
            action: SyncAction::Fetched,
            verified: true,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"action\":\"fetched\""));
        assert!(json.contains("\"verified\":true"));
    }

    #[tokio::test]
    async fn test_path_locks_serialize_same_path() {
        let locks = Arc::new(PathLocks::default());
        let path = PathBuf::from("/tmp/some-artifact");

        let guard = locks.acquire(&path).await;
        let locks2 = locks.clone();
        let path2 = path.clone();
        let contender = tokio::spawn(async move {
            let _g = locks2.acquire(&path2).await;
        });

        // The second acquire must not complete while the guard is held.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_path_locks_distinct_paths_do_not_contend() {
        let locks = PathLocks::default();
        let _a = locks.acquire(Path::new("/tmp/a")).await;
        // Would deadlock if keyed incorrectly.
        let _b = locks.acquire(Path::new("/tmp/b")).await;
    }

    #[tokio::test]
    async fn test_idle_path_locks_are_pruned() {
        let locks = PathLocks::default();
        let guard = locks.acquire(Path::new("/tmp/a")).await;
        drop(guard);

        let _b = locks.acquire(Path::new("/tmp/b")).await;

        let map = locks.inner.lock().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(Path::new("/tmp/b")));
    }

    #[tokio::test]
    async fn test_held_path_locks_survive_pruning() {
        let locks = PathLocks::default();
        let _a = locks.acquire(Path::new("/tmp/a")).await;

        let _b = locks.acquire(Path::new("/tmp/b")).await;

        let map = locks.inner.lock().unwrap();
        assert!(map.contains_key(Path::new("/tmp/a")));
        assert!(map.contains_key(Path::new("/tmp/b")));
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation_over_ready_future() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cancellable(&cancel, async { Ok(42) }).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellable_passes_through_uncancelled() {
        let cancel = CancellationToken::new();
        let value = cancellable(&cancel, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
