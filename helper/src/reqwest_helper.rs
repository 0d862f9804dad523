use anyhow::{bail, Context, Result};
use reqwest::Response;
use serde::de::DeserializeOwned;

/// Header carrying the protocol version on every exchange.
pub const API_VERSION_HEADER: &str = "X-API-Version";

pub async fn deserialize_response<T>(response: Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let url = response.url().to_string();
    let full = response
        .bytes()
        .await
        .with_context(|| format!("Cannot read the body sent by {}", url))?;

    serde_json::from_slice(&full).with_context(|| {
        format!(
            "{} did not send the expected JSON, got {:?}",
            url,
            String::from_utf8_lossy(&full)
        )
    })
}

/// Turn a non-2xx response into an error that keeps the beginning of the
/// body, which is where peers put their explanation.
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    bail!("{} answered with status {}: {}", url, status, body)
}
