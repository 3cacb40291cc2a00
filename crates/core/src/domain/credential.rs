// Credential Bundle Domain Model

use std::path::{Path, PathBuf};
use tracing::warn;

/// Decrypted, extracted credential directory.
///
/// Materialized exactly once at startup by the provisioner and shared
/// read-only across all later components. The core never interprets its
/// contents; the ingestion worker consumes the files for authentication
/// to the META source.
#[derive(Debug)]
pub struct CredentialBundle {
    dir: PathBuf,
}

impl CredentialBundle {
    /// Wrap a fully extracted credential directory.
    ///
    /// In production only the provisioner constructs bundles, and only
    /// after extraction succeeded as a unit - a half-extracted directory
    /// must never become a bundle.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for CredentialBundle {
    /// Best-effort teardown of the credential files on process exit.
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "Failed to remove credential directory");
        }
    }
}
