// Cloud KMS decrypt adapter
//
// Thin client for the cryptoKeys.decrypt REST method. Keys live in the
// "global" location, matching the deployment's key layout.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use metamon_core::port::{KmsClient, KmsError, KmsKeyRef};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::fetch_access_token;

const KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com";
const KMS_LOCATION: &str = "global";

#[derive(Serialize)]
struct DecryptRequest {
    ciphertext: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    plaintext: String,
}

/// Cloud KMS client
pub struct GcpKmsClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GcpKmsClient {
    pub fn new() -> Self {
        Self::with_endpoint(KMS_ENDPOINT)
    }

    /// Endpoint override for tests
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn decrypt_url(&self, key_ref: &KmsKeyRef) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}:decrypt",
            self.endpoint, key_ref.project, KMS_LOCATION, key_ref.keyring, key_ref.key
        )
    }
}

impl Default for GcpKmsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KmsClient for GcpKmsClient {
    async fn decrypt(&self, key_ref: &KmsKeyRef, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError> {
        let token = fetch_access_token(&self.http)
            .await
            .map_err(KmsError::Unauthorized)?;

        let body = DecryptRequest {
            ciphertext: BASE64.encode(ciphertext),
        };
        let response = self
            .http
            .post(self.decrypt_url(key_ref))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| KmsError::Api(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(KmsError::Unauthorized(format!(
                "decrypt denied for key {} (status {})",
                key_ref.key, status
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(KmsError::Api(format!("status {status}: {detail}")));
        }

        let decrypted: DecryptResponse = response
            .json()
            .await
            .map_err(|e| KmsError::Malformed(e.to_string()))?;
        let plaintext = BASE64
            .decode(decrypted.plaintext.as_bytes())
            .map_err(|e| KmsError::Malformed(format!("plaintext not base64: {e}")))?;

        info!(key = %key_ref.key, bytes = plaintext.len(), "Ciphertext decrypted");
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_url_encodes_key_coordinates() {
        let client = GcpKmsClient::new();
        let key_ref = KmsKeyRef {
            project: "meta-monitor".to_string(),
            keyring: "monitor-ring".to_string(),
            key: "credentials-key".to_string(),
        };
        assert_eq!(
            client.decrypt_url(&key_ref),
            "https://cloudkms.googleapis.com/v1/projects/meta-monitor/locations/global\
             /keyRings/monitor-ring/cryptoKeys/credentials-key:decrypt"
        );
    }
}
