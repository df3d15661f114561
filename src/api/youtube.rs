use crate::config::YoutubeConfig;
use crate::error::UploadError;
use crate::upload::{UploadMetadata, Uploader};
use crate::{logi, logok, logw};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tokio::fs;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
}

#[derive(Clone)]
pub struct YouTube {
    client: Client,
    creds: YoutubeConfig,
}

impl YouTube {
    pub fn new(client: Client, creds: YoutubeConfig) -> Self {
        Self { client, creds }
    }

    async fn access_token(&self) -> Result<String, UploadError> {
        let resp = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.creds.client_id.as_str()),
                ("client_secret", self.creds.client_secret.as_str()),
                ("refresh_token", self.creds.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| UploadError::Auth(e.to_string()))?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet = raw.chars().take(400).collect::<String>();
            return Err(UploadError::Auth(format!("HTTP {}: {snippet}", status.as_u16())));
        }
        let token: TokenResponse =
            serde_json::from_str(&raw).map_err(|e| UploadError::Auth(format!("bad token response: {e}")))?;
        Ok(token.access_token)
    }
}

pub fn video_url(video_id: &str) -> String {
    format!("https://youtu.be/{video_id}")
}

fn resource_body(metadata: &UploadMetadata) -> serde_json::Value {
    json!({
        "snippet": {
            "title": metadata.title,
            "description": metadata.description,
            "tags": metadata.tags,
            "categoryId": metadata.category_id,
        },
        "status": {
            "privacyStatus": metadata.privacy.as_str(),
        },
    })
}

#[async_trait]
impl Uploader for YouTube {
    async fn upload(&self, video: &Path, metadata: &UploadMetadata) -> Result<String, UploadError> {
        if !self.creds.is_configured() {
            logw("YouTube credentials missing; upload disabled.");
            return Err(UploadError::Disabled("youtube credentials not configured".into()));
        }

        let bytes = fs::read(video)
            .await
            .map_err(|_| UploadError::MissingFile(video.to_path_buf()))?;
        let token = self.access_token().await?;

        logi(format!("Starting YouTube upload: {}", video.display()));
        let session = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(&token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", bytes.len().to_string())
            .json(&resource_body(metadata))
            .send()
            .await
            .map_err(|e| UploadError::Request(e.to_string()))?;

        if !session.status().is_success() {
            let status = session.status().as_u16();
            let raw = session.text().await.unwrap_or_default();
            return Err(UploadError::Request(format!("session HTTP {status}: {}", raw.chars().take(400).collect::<String>())));
        }
        let location = session
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploadError::Request("resumable session missing Location header".into()))?;

        let resp = self
            .client
            .put(location)
            .bearer_auth(&token)
            .header("Content-Type", "video/mp4")
            .body(bytes)
            .send()
            .await
            .map_err(|e| UploadError::Request(e.to_string()))?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(UploadError::Request(format!(
                "upload HTTP {}: {}",
                status.as_u16(),
                raw.chars().take(400).collect::<String>()
            )));
        }
        let uploaded: UploadedVideo =
            serde_json::from_str(&raw).map_err(|e| UploadError::Request(format!("bad upload response: {e}")))?;

        let url = video_url(&uploaded.id);
        logok(format!("Uploaded: {url}"));
        Ok(url)
    }
}
