// Object Store Port
// Abstraction over the cloud storage holding the encrypted credential
// archive and the uploaded META source archives

use async_trait::async_trait;
use thiserror::Error;

/// Object store errors
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },
}

/// Object store interface
///
/// Implementations:
/// - HttpObjectStore: https:// and gs:// URLs via HTTP
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the object at `url` into memory.
    ///
    /// # Errors
    /// Any network, permission or status failure is an error; there is no
    /// partial-result path.
    async fn get(&self, url: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Upload `body` as the object at `url`, replacing any existing object.
    async fn put(&self, url: &str, body: Vec<u8>) -> Result<(), ObjectStoreError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Mock object store returning fixed bytes or a fixed error, and
    /// recording every uploaded object.
    pub struct MockObjectStore {
        response: Result<Vec<u8>, String>,
        put_error: Option<String>,
        puts: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl MockObjectStore {
        pub fn new_success(bytes: impl Into<Vec<u8>>) -> Self {
            Self {
                response: Ok(bytes.into()),
                put_error: None,
                puts: Mutex::new(Vec::new()),
            }
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self {
                response: Err(message.into()),
                put_error: None,
                puts: Mutex::new(Vec::new()),
            }
        }

        /// Downloads succeed, uploads fail.
        pub fn new_put_fail(message: impl Into<String>) -> Self {
            Self {
                response: Ok(Vec::new()),
                put_error: Some(message.into()),
                puts: Mutex::new(Vec::new()),
            }
        }

        /// Every `(url, body)` uploaded so far, in order.
        pub fn puts(&self) -> Vec<(String, Vec<u8>)> {
            self.puts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectStore for MockObjectStore {
        async fn get(&self, _url: &str) -> Result<Vec<u8>, ObjectStoreError> {
            self.response
                .clone()
                .map_err(ObjectStoreError::Request)
        }

        async fn put(&self, url: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
            if let Some(message) = &self.put_error {
                return Err(ObjectStoreError::Request(message.clone()));
            }
            self.puts.lock().unwrap().push((url.to_string(), body));
            Ok(())
        }
    }
}
