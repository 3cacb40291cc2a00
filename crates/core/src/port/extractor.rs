// Archive Extractor Port

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Archive extraction error
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ExtractError(pub String);

/// Archive extraction interface
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Unpack `archive` into `dest_dir`, creating it if needed.
    ///
    /// Implementations may leave partial output behind on failure; the
    /// provisioner owns removing it so a failed extraction is never
    /// observable as a usable directory.
    async fn extract(&self, archive: &[u8], dest_dir: &Path) -> Result<(), ExtractError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Mock extractor writing a marker file, or failing (optionally after
    /// leaving partial output behind, to exercise cleanup)
    pub struct MockExtractor {
        fail_message: Option<String>,
        leave_partial_output: bool,
    }

    impl MockExtractor {
        pub fn new_success() -> Self {
            Self {
                fail_message: None,
                leave_partial_output: false,
            }
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self {
                fail_message: Some(message.into()),
                leave_partial_output: false,
            }
        }

        pub fn new_fail_with_partial_output(message: impl Into<String>) -> Self {
            Self {
                fail_message: Some(message.into()),
                leave_partial_output: true,
            }
        }
    }

    #[async_trait]
    impl ArchiveExtractor for MockExtractor {
        async fn extract(&self, archive: &[u8], dest_dir: &Path) -> Result<(), ExtractError> {
            if let Some(msg) = &self.fail_message {
                if self.leave_partial_output {
                    std::fs::create_dir_all(dest_dir)
                        .map_err(|e| ExtractError(e.to_string()))?;
                    std::fs::write(dest_dir.join("partial"), b"truncated")
                        .map_err(|e| ExtractError(e.to_string()))?;
                }
                return Err(ExtractError(msg.clone()));
            }
            std::fs::create_dir_all(dest_dir).map_err(|e| ExtractError(e.to_string()))?;
            std::fs::write(dest_dir.join("extracted"), archive)
                .map_err(|e| ExtractError(e.to_string()))?;
            Ok(())
        }
    }
}
