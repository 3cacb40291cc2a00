// Secret Provisioner - one-shot credential bootstrap at startup
//
// Three hard checkpoints against three independent external systems:
// object storage (fetch), KMS (decrypt), local filesystem (extract).
// Each failure kind is distinct so an operator can tell a wrong URL from
// a wrong key from a corrupt upload by the logs alone. No internal retry:
// a cold-start failure indicates misconfiguration, and restart/backoff
// policy belongs to the container orchestration layer.

use crate::domain::CredentialBundle;
use crate::port::{
    ArchiveExtractor, ExtractError, KmsClient, KmsError, KmsKeyRef, ObjectStore, ObjectStoreError,
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Name of the staged ciphertext file inside the work dir
const CIPHERTEXT_FILE: &str = "credentials.tar.gz.enc";
/// Name of the staged plaintext archive inside the work dir
const PLAINTEXT_FILE: &str = "credentials.tar.gz";

/// Provisioning failure, one variant per external system plus one for
/// the local staging filesystem - a disk-full error must never read as a
/// storage or KMS failure in the logs.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("credential fetch failed: {0}")]
    Fetch(#[from] ObjectStoreError),

    #[error("credential decrypt failed: {0}")]
    Decrypt(#[from] KmsError),

    #[error("credential extract failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("credential staging failed: {0}")]
    Staging(#[from] std::io::Error),
}

impl ProvisionError {
    /// Stage name for structured logging
    pub fn stage(&self) -> &'static str {
        match self {
            ProvisionError::Fetch(_) => "fetch",
            ProvisionError::Decrypt(_) => "decrypt",
            ProvisionError::Extract(_) => "extract",
            ProvisionError::Staging(_) => "staging",
        }
    }
}

/// Everything needed to locate and decrypt the credential archive
#[derive(Debug, Clone)]
pub struct ProvisionSpec {
    pub secret_url: String,
    pub kms_key: KmsKeyRef,
}

/// One-shot credential provisioner.
///
/// Stages the ciphertext and plaintext archives as two files under
/// `work_dir` (not guaranteed to be cleaned up on success - a bounded,
/// one-time cost) and extracts the bundle into `credentials_dir`.
pub struct Provisioner {
    object_store: Arc<dyn ObjectStore>,
    kms: Arc<dyn KmsClient>,
    extractor: Arc<dyn ArchiveExtractor>,
    work_dir: PathBuf,
    credentials_dir: PathBuf,
}

impl Provisioner {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        kms: Arc<dyn KmsClient>,
        extractor: Arc<dyn ArchiveExtractor>,
        work_dir: PathBuf,
        credentials_dir: PathBuf,
    ) -> Self {
        Self {
            object_store,
            kms,
            extractor,
            work_dir,
            credentials_dir,
        }
    }

    /// Fetch, decrypt and extract the credential archive.
    ///
    /// Returns a usable bundle or fails as a unit - a failed extraction
    /// never leaves a directory that later stages could mistake for one.
    pub async fn provision(
        &self,
        spec: &ProvisionSpec,
    ) -> Result<CredentialBundle, ProvisionError> {
        info!(url = %spec.secret_url, "Fetching encrypted credential archive");
        let ciphertext = self.object_store.get(&spec.secret_url).await?;
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let ciphertext_path = self.work_dir.join(CIPHERTEXT_FILE);
        tokio::fs::write(&ciphertext_path, &ciphertext).await?;

        info!(
            project = %spec.kms_key.project,
            keyring = %spec.kms_key.keyring,
            key = %spec.kms_key.key,
            "Decrypting credential archive"
        );
        let plaintext = self.kms.decrypt(&spec.kms_key, &ciphertext).await?;
        let plaintext_path = self.work_dir.join(PLAINTEXT_FILE);
        tokio::fs::write(&plaintext_path, &plaintext).await?;

        info!(dir = %self.credentials_dir.display(), "Extracting credential bundle");
        if let Err(e) = self
            .extractor
            .extract(&plaintext, &self.credentials_dir)
            .await
        {
            // Never leave a half-extracted directory that could pass for a
            // valid bundle.
            if let Err(rm_err) = tokio::fs::remove_dir_all(&self.credentials_dir).await {
                if rm_err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        dir = %self.credentials_dir.display(),
                        error = %rm_err,
                        "Failed to remove partial credential directory"
                    );
                }
            }
            return Err(ProvisionError::Extract(e));
        }

        info!(dir = %self.credentials_dir.display(), "Credential bundle provisioned");
        Ok(CredentialBundle::new(self.credentials_dir.clone()))
    }
}
