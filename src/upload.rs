use crate::error::UploadError;
use crate::{logi, logw};
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

const TITLE_MAX_CHARS: usize = 90;
const SNIPPET_MAX_CHARS: usize = 100;

pub const DEFAULT_TAGS: &[&str] = &["AI short", "YouTube Shorts", "OpenAI", "RunwayML", "ElevenLabs"];
pub const TIMELAPSE_TAGS: &[&str] = &["timelapse", "evolution", "ai-generated"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Unlisted => "unlisted",
            Privacy::Private => "private",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privacy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Privacy::Public),
            "unlisted" => Ok(Privacy::Unlisted),
            "private" => Ok(Privacy::Private),
            other => Err(format!("unknown privacy status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy: Privacy,
}

impl UploadMetadata {
    pub fn for_story(story: &str, category_id: &str, privacy: Privacy) -> Self {
        let story = story.trim();
        Self {
            title: title_from_story(story),
            description: format!("{story}\n\nGenerated with GPT, RunwayML, and ElevenLabs."),
            tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
            category_id: category_id.to_string(),
            privacy,
        }
    }

    pub fn for_timelapse(topic: &str, start_year: i32, end_year: i32, category_id: &str, privacy: Privacy) -> Self {
        Self {
            title: format!("Evolution of {topic} ({start_year}-{end_year})"),
            description: format!(
                "Watch how {topic} evolved from {start_year} to {end_year} in this AI-generated timelapse."
            ),
            tags: TIMELAPSE_TAGS.iter().map(|t| t.to_string()).collect(),
            category_id: category_id.to_string(),
            privacy,
        }
    }
}

pub fn title_from_story(story: &str) -> String {
    let first = story.split('.').next().unwrap_or_default().trim();
    let head: String = first.chars().take(TITLE_MAX_CHARS).collect();
    format!("{head}...")
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, video: &Path, metadata: &UploadMetadata) -> Result<String, UploadError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub title: String,
    pub url: String,
    pub story_snippet: String,
    pub upload_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    uploads: Vec<UploadRecord>,
}

// JSON ledger of past uploads. A missing or corrupt file reads as empty.
#[derive(Debug, Clone)]
pub struct UploadHistory {
    path: PathBuf,
}

impl UploadHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> HistoryFile {
        let Ok(content) = fs::read_to_string(&self.path).await else {
            return HistoryFile::default();
        };
        match serde_json::from_str(&content) {
            Ok(history) => history,
            Err(e) => {
                logw(format!("Upload history unreadable, starting fresh: {e}"));
                HistoryFile::default()
            }
        }
    }

    async fn save(&self, history: &HistoryFile) -> Result<(), UploadError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(history)
            .map_err(|e| UploadError::Request(format!("history encode: {e}")))?;
        fs::write(&self.path, json).await?;
        Ok(())
    }

    pub async fn is_duplicate_title(&self, title: &str) -> bool {
        self.load().await.uploads.iter().any(|u| u.title == title)
    }

    // `title` unchanged when unseen, otherwise suffixed with a unix timestamp.
    pub async fn unique_title(&self, title: &str) -> String {
        if !self.is_duplicate_title(title).await {
            return title.to_string();
        }
        let unique = format!("{title} ({})", Local::now().timestamp());
        logw(format!("Duplicate title detected, using: {unique}"));
        unique
    }

    pub async fn record(&self, title: &str, url: &str, story: &str) -> Result<(), UploadError> {
        let mut history = self.load().await;
        let snippet = if story.chars().count() > SNIPPET_MAX_CHARS {
            format!("{}...", story.chars().take(SNIPPET_MAX_CHARS).collect::<String>())
        } else {
            story.to_string()
        };
        history.uploads.push(UploadRecord {
            title: title.to_string(),
            url: url.to_string(),
            story_snippet: snippet,
            upload_date: Local::now().to_rfc3339(),
        });
        self.save(&history).await?;
        logi(format!("Added upload to history: {title}"));
        Ok(())
    }

    pub async fn recent(&self, limit: usize) -> Vec<UploadRecord> {
        let mut uploads = self.load().await.uploads;
        uploads.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
        uploads.truncate(limit);
        uploads
    }
}

pub async fn publish(
    uploader: &dyn Uploader,
    history: &UploadHistory,
    video: &Path,
    mut metadata: UploadMetadata,
    story: &str,
) -> Result<String, UploadError> {
    if fs::metadata(video).await.is_err() {
        return Err(UploadError::MissingFile(video.to_path_buf()));
    }
    metadata.title = history.unique_title(&metadata.title).await;

    let url = uploader.upload(video, &metadata).await?;
    if let Err(e) = history.record(&metadata.title, &url, story).await {
        logw(format!("Uploaded but failed to write history: {e}"));
    }
    Ok(url)
}
