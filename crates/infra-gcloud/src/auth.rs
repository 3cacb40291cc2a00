// GCE metadata-server authentication
//
// The daemon runs inside a container on GCE; the instance service account
// provides OAuth tokens through the metadata server. An explicit
// GOOGLE_OAUTH_ACCESS_TOKEN override exists for local runs and tests.

use serde::Deserialize;
use tracing::debug;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Fetch an OAuth access token for Google Cloud API calls.
pub async fn fetch_access_token(http: &reqwest::Client) -> Result<String, String> {
    if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
        if !token.is_empty() {
            debug!("Using access token from environment");
            return Ok(token);
        }
    }

    let response = http
        .get(METADATA_TOKEN_URL)
        .header(METADATA_FLAVOR_HEADER, "Google")
        .send()
        .await
        .map_err(|e| format!("metadata server unreachable: {e}"))?;

    if !response.status().is_success() {
        return Err(format!(
            "metadata server returned status {}",
            response.status()
        ));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| format!("malformed metadata token response: {e}"))?;
    Ok(token.access_token)
}
