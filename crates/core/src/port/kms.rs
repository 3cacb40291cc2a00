// KMS Port
// Abstraction over the external key-management decrypt primitive

use async_trait::async_trait;
use thiserror::Error;

/// Key-management coordinates identifying one decryption key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsKeyRef {
    pub project: String,
    pub keyring: String,
    pub key: String,
}

/// KMS errors
#[derive(Error, Debug)]
pub enum KmsError {
    #[error("authorization failed: {0}")]
    Unauthorized(String),

    #[error("KMS request failed: {0}")]
    Api(String),

    #[error("malformed ciphertext or response: {0}")]
    Malformed(String),
}

/// KMS decrypt interface
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Decrypt `ciphertext` with the key identified by `key_ref`.
    ///
    /// # Errors
    /// - `KmsError::Unauthorized` if the caller lacks decrypt permission
    /// - `KmsError::Malformed` if the ciphertext is not valid for the key
    async fn decrypt(&self, key_ref: &KmsKeyRef, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Mock KMS client returning fixed plaintext or a fixed error
    pub struct MockKmsClient {
        response: Result<Vec<u8>, String>,
    }

    impl MockKmsClient {
        pub fn new_success(plaintext: impl Into<Vec<u8>>) -> Self {
            Self {
                response: Ok(plaintext.into()),
            }
        }

        pub fn new_unauthorized(message: impl Into<String>) -> Self {
            Self {
                response: Err(message.into()),
            }
        }
    }

    #[async_trait]
    impl KmsClient for MockKmsClient {
        async fn decrypt(
            &self,
            _key_ref: &KmsKeyRef,
            _ciphertext: &[u8],
        ) -> Result<Vec<u8>, KmsError> {
            self.response.clone().map_err(KmsError::Unauthorized)
        }
    }
}
