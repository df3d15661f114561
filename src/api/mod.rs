pub mod elevenlabs;
pub mod openai;
pub mod runway;
pub mod youtube;

use crate::error::SynthesisError;
use crate::logw;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

pub fn build_client(request_timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(Duration::from_secs(request_timeout_secs.max(1)))
        .build()
        .context("Failed to build HTTP client")
}

pub(crate) async fn http_get_text(client: &reqwest::Client, url: &str) -> Result<(reqwest::StatusCode, String)> {
    let resp = client
        .get(url)
        .header("User-Agent", BROWSER_USER_AGENT)
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .with_context(|| format!("GET {url} failed"))?;

    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    Ok((status, text))
}

pub(crate) fn provider_error_message(provider: &str, raw: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(raw).ok()?;
    let err = root.get("error")?;

    // Some providers send `"error": "text"` instead of an object.
    if let Some(msg) = err.as_str() {
        return Some(msg.to_string());
    }
    if let Some(typ) = err.get("type").and_then(|v| v.as_str()) {
        logw(format!("{provider} error type: {typ}"));
    }
    if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
        logw(format!("{provider} error code: {code}"));
    }
    err.get("message").and_then(|v| v.as_str()).map(str::to_string)
}

pub(crate) async fn send_for_text(provider: &str, request: reqwest::RequestBuilder) -> Result<String, SynthesisError> {
    let resp = request
        .send()
        .await
        .map_err(|e| SynthesisError::from_reqwest(provider, &e))?;

    let status = resp.status();
    let raw = resp
        .text()
        .await
        .map_err(|e| SynthesisError::from_reqwest(provider, &e))?;

    if !status.is_success() {
        logw(format!("{provider} HTTP {}", status.as_u16()));
        let detail = provider_error_message(provider, &raw).unwrap_or_else(|| raw.clone());
        return Err(SynthesisError::from_status(provider, status.as_u16(), &detail));
    }
    Ok(raw)
}

pub(crate) async fn write_output(provider: &str, out: &Path, bytes: &[u8]) -> Result<(), SynthesisError> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SynthesisError::from_io(provider, parent, &e))?;
    }
    fs::write(out, bytes)
        .await
        .map_err(|e| SynthesisError::from_io(provider, out, &e))?;
    if bytes.is_empty() {
        return Err(SynthesisError::permanent(provider, "empty response body"));
    }
    Ok(())
}
