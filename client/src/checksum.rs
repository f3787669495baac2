//! Streaming SHA-256 for local files.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::Result;

const READ_BUF_SIZE: usize = 64 * 1024;

/// Hash a local file, returning the lowercase hex digest.
pub async fn file_sha256(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Case-insensitive digest comparison. Registries are not consistent about
/// hex casing, so neither side's case is trusted. Empty digests never match.
pub fn digests_match(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // sha256("hello world")
    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[tokio::test]
    async fn test_file_sha256_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello world")
            .unwrap();

        let digest = file_sha256(&path).await.unwrap();
        assert_eq!(digest, HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_file_sha256_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::File::create(&path).unwrap();

        let digest = file_sha256(&path).await.unwrap();
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_file_sha256_missing_file_is_local_io() {
        let err = file_sha256(Path::new("/nonexistent/file")).await.unwrap_err();
        assert!(matches!(err, crate::error::SyncError::LocalIo(_)));
    }

    #[test]
    fn test_digests_match_is_case_insensitive() {
        assert!(digests_match(HELLO_SHA256, &HELLO_SHA256.to_uppercase()));
    }

    #[test]
    fn test_empty_digests_never_match() {
        assert!(!digests_match("", ""));
        assert!(!digests_match(HELLO_SHA256, ""));
        assert!(!digests_match("", HELLO_SHA256));
    }
}
