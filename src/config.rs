use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const IMAGE_SIZES: &[&str] = &["1024x1024", "1792x1024", "1024x1792"];
const IMAGE_QUALITIES: &[&str] = &["low", "medium", "high"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "open_api_key", default)]
    pub openai_key: String,
    #[serde(default)]
    pub runway_api_key: String,
    #[serde(rename = "elevenlabs_api_key", default)]
    pub elevenlabs_key: String,
    #[serde(rename = "eleven_voice_id")]
    #[serde(default = "default_voice_id")]
    pub eleven_voice_id: String,
    #[serde(rename = "eleven_model_id")]
    #[serde(default = "default_model_id")]
    pub eleven_model_id: String,

    #[serde(default = "default_chat_model")]
    pub openai_chat_model: String,
    #[serde(default = "default_image_model")]
    pub openai_image_model: String,
    #[serde(default = "default_image_size")]
    pub openai_image_size: String,
    #[serde(default = "default_image_quality")]
    pub openai_image_quality: String,
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,

    #[serde(default)]
    pub youtube: YoutubeConfig,

    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
    #[serde(default = "default_music_dir")]
    pub background_music_dir: PathBuf,
    #[serde(default = "default_history_file")]
    pub upload_history_file: PathBuf,

    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub timelapse: TimelapseConfig,

    // Units beyond this index keep their static image instead of a generated clip.
    #[serde(default = "default_max_video_units")]
    pub max_video_units: usize,
    #[serde(default = "default_max_units")]
    pub max_units: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    // Upper bound for a whole run. Off when absent.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_category_id")]
    pub category_id: String,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            category_id: default_category_id(),
        }
    }
}

impl YoutubeConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.refresh_token.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelapseConfig {
    pub frames_per_transition: usize,
    pub main_frame_duration: f64,
    pub inter_frame_duration: f64,
}

impl Default for TimelapseConfig {
    fn default() -> Self {
        Self {
            frames_per_transition: 32,
            main_frame_duration: 1.0,
            inter_frame_duration: 0.03,
        }
    }
}

fn default_voice_id() -> String {
    "JBFqnCBsd6RMkjVDRZzb".to_string()
}

fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini-2024-07-18".to_string()
}

fn default_image_model() -> String {
    "gpt-image-1".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_image_quality() -> String {
    "medium".to_string()
}

fn default_chat_temperature() -> f32 {
    0.9
}

fn default_chat_max_tokens() -> u32 {
    300
}

fn default_category_id() -> String {
    "22".to_string()
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_music_dir() -> PathBuf {
    PathBuf::from("backgroundmusic")
}

fn default_history_file() -> PathBuf {
    PathBuf::from("upload_history.json")
}

fn default_max_video_units() -> usize {
    4
}

fn default_max_units() -> usize {
    8
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_tool_timeout_secs() -> u64 {
    600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_key: String::new(),
            runway_api_key: String::new(),
            elevenlabs_key: String::new(),
            eleven_voice_id: default_voice_id(),
            eleven_model_id: default_model_id(),
            openai_chat_model: default_chat_model(),
            openai_image_model: default_image_model(),
            openai_image_size: default_image_size(),
            openai_image_quality: default_image_quality(),
            chat_temperature: default_chat_temperature(),
            chat_max_tokens: default_chat_max_tokens(),
            youtube: YoutubeConfig::default(),
            runs_dir: default_runs_dir(),
            background_music_dir: default_music_dir(),
            upload_history_file: default_history_file(),
            retry: RetryPolicy::default(),
            video: VideoConfig::default(),
            timelapse: TimelapseConfig::default(),
            max_video_units: default_max_video_units(),
            max_units: default_max_units(),
            request_timeout_secs: default_request_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            run_timeout_secs: None,
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if fs::metadata(path).await.is_ok() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai_key = v;
        }
        if let Some(v) = get("RUNWAY_API_KEY") {
            self.runway_api_key = v;
        }
        if let Some(v) = get("ELEVENLABS_API_KEY") {
            self.elevenlabs_key = v;
        }
        if let Some(v) = get("ELEVEN_VOICE_ID") {
            self.eleven_voice_id = v;
        }
        if let Some(v) = get("OPENAI_IMAGE_SIZE") {
            self.openai_image_size = v;
        }
        if let Some(v) = get("OPENAI_IMAGE_QUALITY") {
            self.openai_image_quality = v.to_lowercase();
        }
        if let Some(v) = get("YOUTUBE_CLIENT_ID") {
            self.youtube.client_id = v;
        }
        if let Some(v) = get("YOUTUBE_CLIENT_SECRET") {
            self.youtube.client_secret = v;
        }
        if let Some(v) = get("YOUTUBE_REFRESH_TOKEN") {
            self.youtube.refresh_token = v;
        }
        if let Some(n) = get("MAX_RUNWAY_VIDEOS_PER_SEGMENT").and_then(|v| v.parse().ok()) {
            self.max_video_units = n;
        }
        if let Some(t) = get("CHAT_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.chat_temperature = t;
        }
        if let Some(n) = get("CHAT_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.chat_max_tokens = n;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.openai_key.is_empty() {
            anyhow::bail!("open_api_key missing (config.json or OPENAI_API_KEY)");
        }
        if !IMAGE_SIZES.contains(&self.openai_image_size.as_str()) {
            anyhow::bail!(
                "Invalid OPENAI_IMAGE_SIZE: {}. Must be one of {:?}",
                self.openai_image_size,
                IMAGE_SIZES
            );
        }
        if !IMAGE_QUALITIES.contains(&self.openai_image_quality.as_str()) {
            anyhow::bail!(
                "Invalid OPENAI_IMAGE_QUALITY: {}. Must be one of {:?}",
                self.openai_image_quality,
                IMAGE_QUALITIES
            );
        }
        if self.video.width == 0 || self.video.height == 0 || self.video.fps == 0 {
            anyhow::bail!("video width/height/fps must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.youtube.category_id, "22");
        assert_eq!(cfg.video, VideoConfig::default());
        assert_eq!(cfg.timelapse.frames_per_transition, 32);
        assert_eq!(cfg.runs_dir, PathBuf::from("runs"));
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert!(cfg.run_timeout_secs.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg: Config =
            serde_json::from_str(r#"{"open_api_key":"file-key","eleven_voice_id":"v1"}"#)
                .unwrap();
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "env-key"),
            ("ELEVEN_VOICE_ID", ""),
            ("OPENAI_IMAGE_QUALITY", "HIGH"),
            ("MAX_RUNWAY_VIDEOS_PER_SEGMENT", "2"),
        ]
        .into_iter()
        .collect();

        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.openai_key, "env-key");
        assert_eq!(cfg.eleven_voice_id, "v1");
        assert_eq!(cfg.openai_image_quality, "high");
        assert_eq!(cfg.max_video_units, 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_image_size() {
        let mut cfg = Config::default();
        cfg.openai_key = "k".into();
        cfg.openai_image_size = "512x512".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_openai_key_is_an_error() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn youtube_requires_all_credentials() {
        let mut yt = YoutubeConfig::default();
        yt.client_id = "id".into();
        yt.client_secret = "secret".into();
        assert!(!yt.is_configured());
        yt.refresh_token = "token".into();
        assert!(yt.is_configured());
    }
}
