use crate::api::send_for_text;
use crate::config::Config;
use crate::error::SynthesisError;
use crate::synth::{VideoRequest, VideoSynthesizer};
use crate::{logi, logok, logw};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const PROVIDER: &str = "runway";
const API_BASE: &str = "https://api.dev.runwayml.com/v1";
const API_VERSION: &str = "2024-11-06";
const MODEL: &str = "gen3a_turbo";
const RATIO: &str = "768:1280";
const CLIP_SECONDS: u32 = 5;
const MAX_STATUS_ERRORS: u32 = 3;

#[derive(Debug, Deserialize)]
struct TaskCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    status: String,
    #[serde(default)]
    output: Vec<String>,
    #[serde(default)]
    failure: Option<String>,
}

#[derive(Clone)]
pub struct Runway {
    client: Client,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl Runway {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.runway_api_key.clone(),
            poll_interval: Duration::from_secs(20),
            max_polls: 45,
        }
    }

    async fn submit(&self, image_uri: String, prompt: &str) -> Result<String, SynthesisError> {
        let body = json!({
            "model": MODEL,
            "promptImage": image_uri,
            "promptText": prompt,
            "ratio": RATIO,
            "duration": CLIP_SECONDS,
        });
        let raw = send_for_text(
            PROVIDER,
            self.client
                .post(format!("{API_BASE}/image_to_video"))
                .bearer_auth(&self.api_key)
                .header("X-Runway-Version", API_VERSION)
                .json(&body),
        )
        .await?;

        let created: TaskCreated = serde_json::from_str(&raw)
            .map_err(|e| SynthesisError::permanent(PROVIDER, format!("bad task response: {e}")))?;
        Ok(created.id)
    }

    async fn fetch_status(&self, task_id: &str) -> Result<String, SynthesisError> {
        send_for_text(
            PROVIDER,
            self.client
                .get(format!("{API_BASE}/tasks/{task_id}"))
                .bearer_auth(&self.api_key)
                .header("X-Runway-Version", API_VERSION),
        )
        .await
    }

    async fn poll(&self, task_id: &str) -> Result<String, SynthesisError> {
        self.poll_with(task_id, || self.fetch_status(task_id)).await
    }

    // Errors from here are permanent so the caller's retry never resubmits the task.
    async fn poll_with<F, Fut>(&self, task_id: &str, mut fetch: F) -> Result<String, SynthesisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, SynthesisError>>,
    {
        let mut status_errors = 0;
        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let raw = match fetch().await {
                Ok(raw) => {
                    status_errors = 0;
                    raw
                }
                Err(e) if e.is_transient() && status_errors < MAX_STATUS_ERRORS => {
                    status_errors += 1;
                    logw(format!("Runway status check for {task_id} failed ({status_errors}/{MAX_STATUS_ERRORS}): {e}"));
                    continue;
                }
                Err(e) => return Err(SynthesisError::permanent(PROVIDER, format!("task {task_id}: {e}"))),
            };
            let task: TaskStatus = serde_json::from_str(&raw)
                .map_err(|e| SynthesisError::permanent(PROVIDER, format!("bad task status: {e}")))?;

            match task.status.as_str() {
                "SUCCEEDED" => {
                    return task
                        .output
                        .into_iter()
                        .next()
                        .ok_or_else(|| SynthesisError::permanent(PROVIDER, "task succeeded without output"));
                }
                "FAILED" | "CANCELLED" => {
                    let reason = task.failure.unwrap_or_else(|| task.status.clone());
                    return Err(SynthesisError::permanent(PROVIDER, format!("task {task_id}: {reason}")));
                }
                other => logi(format!("Runway task {task_id} status: {other}")),
            }
        }
        Err(SynthesisError::permanent(
            PROVIDER,
            format!("task {task_id} still running after {} polls", self.max_polls),
        ))
    }

    async fn download(&self, url: &str, out: &Path) -> Result<(), SynthesisError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SynthesisError::from_reqwest(PROVIDER, &e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SynthesisError::from_status(PROVIDER, status.as_u16(), "video download"));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SynthesisError::from_reqwest(PROVIDER, &e))?;
        crate::api::write_output(PROVIDER, out, &bytes).await
    }
}

pub fn image_data_uri(path: &Path, bytes: &[u8]) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "png".to_string());
    let mime = if ext == "jpg" { "jpeg".to_string() } else { ext };
    format!("data:image/{mime};base64,{}", BASE64.encode(bytes))
}

#[async_trait]
impl VideoSynthesizer for Runway {
    async fn synthesize(&self, request: &VideoRequest, out: &Path) -> Result<PathBuf, SynthesisError> {
        if self.api_key.is_empty() {
            return Err(SynthesisError::permanent(PROVIDER, "runway_api_key not configured"));
        }
        let bytes = fs::read(&request.image)
            .await
            .map_err(|e| SynthesisError::from_io(PROVIDER, &request.image, &e))?;

        let task_id = self.submit(image_data_uri(&request.image, &bytes), &request.prompt).await?;
        logi(format!("Runway task started: {task_id}"));

        let url = self.poll(&task_id).await?;
        self.download(&url, out)
            .await
            .map_err(|e| SynthesisError::permanent(PROVIDER, format!("task {task_id} download: {e}")))?;
        logok(format!("Runway clip saved: {}", out.display()));
        Ok(out.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_uses_extension_mime() {
        assert_eq!(
            image_data_uri(Path::new("a/b.PNG"), b"hi"),
            "data:image/png;base64,aGk="
        );
        assert!(image_data_uri(Path::new("x.jpg"), b"hi").starts_with("data:image/jpeg;"));
    }

    #[test]
    fn task_status_parses_with_missing_fields() {
        let running: TaskStatus = serde_json::from_str(r#"{"id":"t","status":"RUNNING"}"#).unwrap();
        assert!(running.output.is_empty());
        let done: TaskStatus =
            serde_json::from_str(r#"{"status":"SUCCEEDED","output":["https://cdn/x.mp4"]}"#).unwrap();
        assert_eq!(done.output[0], "https://cdn/x.mp4");
    }

    fn quick(max_polls: u32) -> Runway {
        Runway {
            client: Client::new(),
            api_key: "key".into(),
            poll_interval: Duration::ZERO,
            max_polls,
        }
    }

    fn scripted(replies: Vec<Result<&'static str, SynthesisError>>) -> std::sync::Mutex<Vec<Result<String, SynthesisError>>> {
        let mut replies: Vec<_> = replies.into_iter().map(|r| r.map(str::to_string)).collect();
        replies.reverse();
        std::sync::Mutex::new(replies)
    }

    #[tokio::test]
    async fn status_hiccups_are_absorbed_while_polling() {
        let replies = scripted(vec![
            Err(SynthesisError::transient(PROVIDER, "HTTP 502")),
            Ok(r#"{"status":"RUNNING"}"#),
            Err(SynthesisError::transient(PROVIDER, "timeout")),
            Ok(r#"{"status":"SUCCEEDED","output":["https://cdn/x.mp4"]}"#),
        ]);
        let runway = quick(10);

        let url = runway
            .poll_with("t1", || {
                let next = replies.lock().unwrap().pop().unwrap();
                async move { next }
            })
            .await
            .unwrap();

        assert_eq!(url, "https://cdn/x.mp4");
    }

    #[tokio::test]
    async fn exhausted_polls_are_permanent() {
        let runway = quick(3);
        let err = runway
            .poll_with("t2", || async { Ok(r#"{"status":"RUNNING"}"#.to_string()) })
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn repeated_status_errors_are_permanent() {
        let runway = quick(10);
        let err = runway
            .poll_with("t3", || async { Err(SynthesisError::transient(PROVIDER, "HTTP 503")) })
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
