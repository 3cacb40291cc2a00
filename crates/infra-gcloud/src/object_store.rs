// HTTP object store adapter
//
// Serves https:// URLs directly and gs:// URLs through the Cloud Storage
// XML endpoint with a bearer token from the metadata server. Uploads use
// the same endpoint: a single PUT per object, no resumable sessions (the
// META source archives are small).

use async_trait::async_trait;
use metamon_core::port::{ObjectStore, ObjectStoreError};
use tracing::info;

use crate::auth::fetch_access_token;

const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Object store over HTTP(S) and Cloud Storage
pub struct HttpObjectStore {
    http: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Map a gs:// URL onto its Cloud Storage HTTP form.
    fn resolve(url: &str) -> (String, bool) {
        match url.strip_prefix("gs://") {
            Some(rest) => (format!("{GCS_ENDPOINT}/{rest}"), true),
            None => (url.to_string(), false),
        }
    }
}

impl Default for HttpObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, url: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let (http_url, needs_auth) = Self::resolve(url);

        let mut request = self.http.get(&http_url);
        if needs_auth {
            let token = fetch_access_token(&self.http)
                .await
                .map_err(ObjectStoreError::Request)?;
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ObjectStoreError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ObjectStoreError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ObjectStoreError::Request(e.to_string()))?;
        info!(url = %url, bytes = bytes.len(), "Object fetched");
        Ok(bytes.to_vec())
    }

    async fn put(&self, url: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        let (http_url, needs_auth) = Self::resolve(url);
        let size = body.len();

        let mut request = self.http.put(&http_url).body(body);
        if needs_auth {
            let token = fetch_access_token(&self.http)
                .await
                .map_err(ObjectStoreError::Request)?;
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ObjectStoreError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ObjectStoreError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        info!(url = %url, bytes = size, "Object uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gs_urls_map_to_storage_endpoint() {
        let (url, auth) = HttpObjectStore::resolve("gs://meta-secrets/creds.tar.gz.enc");
        assert_eq!(url, "https://storage.googleapis.com/meta-secrets/creds.tar.gz.enc");
        assert!(auth);
    }

    #[test]
    fn https_urls_pass_through_unauthenticated() {
        let (url, auth) = HttpObjectStore::resolve("https://example.com/creds.enc");
        assert_eq!(url, "https://example.com/creds.enc");
        assert!(!auth);
    }
}
