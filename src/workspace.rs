use crate::error::RunError;
use crate::logi;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::fs;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const STAGE_DIRS: &[&str] = &["images", "audio", "videos", "paragraph_videos", "frames"];

#[derive(Debug, Clone)]
pub struct RunWorkspace {
    root: PathBuf,
    started_at: DateTime<Local>,
}

impl RunWorkspace {
    pub async fn create(runs_dir: &Path) -> Result<Self, RunError> {
        Self::create_at(runs_dir, Local::now()).await
    }

    // Create `runs_dir/<timestamp>` and its stage folders. An existing
    // `runs_dir` is fine; a colliding run directory gets a numeric suffix.
    pub async fn create_at(runs_dir: &Path, started_at: DateTime<Local>) -> Result<Self, RunError> {
        ensure_dir(runs_dir).await?;

        let stamp = started_at.format(TIMESTAMP_FORMAT).to_string();
        let mut root = runs_dir.join(&stamp);
        let mut suffix = 1;
        while fs::metadata(&root).await.is_ok() {
            root = runs_dir.join(format!("{stamp}-{suffix}"));
            suffix += 1;
        }

        ensure_dir(&root).await?;
        for dir in STAGE_DIRS {
            ensure_dir(&root.join(dir)).await?;
        }

        logi(format!("Created run directory: {}", root.display()));
        Ok(Self { root, started_at })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.root.join("videos")
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join("paragraph_videos")
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn story_path(&self) -> PathBuf {
        self.root.join("story_prompt.txt")
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.root.join("paragraph_image_mapping.txt")
    }

    pub fn concat_list_path(&self) -> PathBuf {
        self.root.join("concat_list.txt")
    }

    pub fn slideshow_list_path(&self) -> PathBuf {
        self.root.join("timelapse_list.txt")
    }

    pub fn timelapse_segment_path(&self) -> PathBuf {
        self.segments_dir().join("timelapse.mp4")
    }

    pub fn concat_tmp_path(&self) -> PathBuf {
        self.root.join("concat_tmp.mp4")
    }

    pub fn final_video_path(&self) -> PathBuf {
        self.root.join("final_story_video.mp4")
    }

    pub fn image_path(&self, index: usize, label: Option<&str>) -> PathBuf {
        match label {
            Some(label) => self.images_dir().join(format!("{}.png", file_safe(label))),
            None => self.images_dir().join(format!("paragraph_{}.png", index + 1)),
        }
    }

    pub fn audio_path(&self, index: usize) -> PathBuf {
        self.audio_dir().join(format!("paragraph_{}.mp3", index + 1))
    }

    pub fn video_path(&self, index: usize) -> PathBuf {
        self.videos_dir().join(format!("paragraph_{}.mp4", index + 1))
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.segments_dir().join(format!("paragraph_{}.mp4", index + 1))
    }

    pub fn relative(&self, path: &Path) -> PathBuf {
        pathdiff::diff_paths(path, &self.root).unwrap_or_else(|| path.to_path_buf())
    }
}

fn file_safe(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn ensure_dir(path: &Path) -> Result<(), RunError> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| RunError::Workspace {
            path: path.to_path_buf(),
            source,
        })
}
