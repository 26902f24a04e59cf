// Token refresh network call

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::types::{RefreshRequest, RefreshResponse, TokenPair};

/// Exchange a refresh token for a new pair
///
/// A refresh token missing from the response means the server did not rotate
/// it, so the current one is kept. The whole exchange is bounded by `timeout`.
pub async fn refresh_token_pair(
    client: &Client,
    url: &str,
    refresh_token: &str,
    timeout: Duration,
) -> Result<TokenPair> {
    tracing::debug!(url = %url, "Refreshing access token...");

    let exchange = async {
        let response = client
            .post(url)
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await
            .context("Failed to send refresh request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Token refresh failed: {} - {}", status, error_text);
        }

        response
            .json::<RefreshResponse>()
            .await
            .context("Failed to parse refresh response")
    };

    let data = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| anyhow::anyhow!("Token refresh timed out after {:?}", timeout))??;

    if data.access.is_empty() {
        anyhow::bail!("Refresh response does not contain an access token");
    }

    let refresh = match data.refresh {
        Some(rotated) if !rotated.is_empty() => rotated,
        _ => refresh_token.to_string(),
    };

    Ok(TokenPair {
        access: data.access,
        refresh,
    })
}
