//! Checksum-gated artifact sync client.
//!
//! Downloads single artifacts from an Artifactory-style registry to local
//! paths, fetching only when the registry's SHA-256 differs from the local
//! copy (or a force flag is set) and verifying the bytes after transfer.
//! Alias paths the server resolves itself (e.g. "latest" pointers) use an
//! existence-only fast path with no checksum work.
//!
//! ```ignore
//! use artifact_sync::{ClientConfig, RegistryClient, Syncer};
//!
//! let client = RegistryClient::new(
//!     ClientConfig::new("https://registry.example.com").with_api_key("token"),
//! )?;
//! let syncer = Syncer::new(client);
//! let outcome = syncer
//!     .sync_verified("libs-release", "org/acme/app/1.0/app.jar", "app.jar".as_ref(), false)
//!     .await?;
//! ```

pub mod checksum;
pub mod client;
pub mod config;
pub mod error;
pub mod sync;

pub use client::{ArtifactChecksums, ArtifactMetadata, RegistryClient};
pub use config::ClientConfig;
pub use error::{Result, SyncError};
pub use sync::{decide, Action, SyncAction, SyncMode, SyncOutcome, Syncer};
