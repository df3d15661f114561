use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    AiStory,
    Internet,
    Transcript,
    Timelapse,
}

impl ContentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentMode::AiStory => "ai_story",
            ContentMode::Internet => "internet",
            ContentMode::Transcript => "transcript",
            ContentMode::Timelapse => "timelapse",
        }
    }

    pub fn requires_narration(&self) -> bool {
        !matches!(self, ContentMode::Timelapse)
    }
}

impl fmt::Display for ContentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphSeed {
    pub text: String,
    pub label: Option<String>,
}

impl ParagraphSeed {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: None,
        }
    }

    pub fn labeled(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: Some(label.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceContent {
    pub title: String,
    pub body: String,
    pub seeds: Vec<ParagraphSeed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TextToImage,
    ImageToVideo,
    TextToSpeech,
    Interpolation,
    Composition,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::TextToImage => "image",
            Stage::ImageToVideo => "video",
            Stage::TextToSpeech => "audio",
            Stage::Interpolation => "interpolation",
            Stage::Composition => "composition",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaArtifact {
    pub path: PathBuf,
    pub stage: Stage,
    pub unit: usize,
    #[serde(default)]
    pub cached: bool,
}

impl MediaArtifact {
    pub fn new(path: PathBuf, stage: Stage, unit: usize) -> Self {
        Self {
            path,
            stage,
            unit,
            cached: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphUnit {
    pub index: usize,
    pub text: String,
    pub label: Option<String>,
    pub requires_audio: bool,
    pub image: Option<MediaArtifact>,
    pub audio: Option<MediaArtifact>,
    pub video: Option<MediaArtifact>,
    pub segment: Option<MediaArtifact>,
    pub failures: Vec<UnitFailure>,
}

impl ParagraphUnit {
    pub fn from_seed(index: usize, seed: &ParagraphSeed, requires_audio: bool) -> Self {
        Self {
            index,
            text: seed.text.clone(),
            label: seed.label.clone(),
            requires_audio,
            image: None,
            audio: None,
            video: None,
            segment: None,
            failures: Vec::new(),
        }
    }

    pub fn has_visual(&self) -> bool {
        self.image.is_some() || self.video.is_some()
    }

    // A unit may be composed only once it has a visual and, when narrated, audio.
    pub fn is_complete(&self) -> bool {
        self.has_visual() && (!self.requires_audio || self.audio.is_some())
    }

    pub fn record_failure(&mut self, stage: Stage, message: impl Into<String>) {
        self.failures.push(UnitFailure {
            stage,
            message: message.into(),
        });
    }

    pub fn number(&self) -> usize {
        self.index + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVideo {
    pub path: PathBuf,
    pub units: Vec<usize>,
    pub background_mixed: bool,
}

impl FinalVideo {
    pub fn segment_count(&self) -> usize {
        self.units.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    Skipped,
    Uploaded { video_id: String, url: String },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_dir: PathBuf,
    pub mode: ContentMode,
    pub title: String,
    pub units: Vec<ParagraphUnit>,
    pub final_video: FinalVideo,
    pub upload: UploadOutcome,
}

impl RunReport {
    pub fn completed_units(&self) -> usize {
        self.units.iter().filter(|u| u.segment.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(stage: Stage) -> Option<MediaArtifact> {
        Some(MediaArtifact::new(PathBuf::from("x"), stage, 0))
    }

    #[test]
    fn narrated_unit_needs_visual_and_audio() {
        let mut unit = ParagraphUnit::from_seed(0, &ParagraphSeed::new("hi"), true);
        assert!(!unit.is_complete());
        unit.image = artifact(Stage::TextToImage);
        assert!(!unit.is_complete());
        unit.audio = artifact(Stage::TextToSpeech);
        assert!(unit.is_complete());
    }

    #[test]
    fn synthesized_video_stands_in_for_image() {
        let mut unit = ParagraphUnit::from_seed(2, &ParagraphSeed::new("hi"), true);
        unit.video = artifact(Stage::ImageToVideo);
        unit.audio = artifact(Stage::TextToSpeech);
        assert!(unit.is_complete());
        assert_eq!(unit.number(), 3);
    }

    #[test]
    fn silent_unit_needs_only_visual() {
        let mut unit = ParagraphUnit::from_seed(0, &ParagraphSeed::labeled("p", "2001"), false);
        assert!(!unit.is_complete());
        unit.image = artifact(Stage::TextToImage);
        assert!(unit.is_complete());
        assert_eq!(unit.label.as_deref(), Some("2001"));
    }

    #[test]
    fn only_timelapse_is_silent() {
        assert!(ContentMode::AiStory.requires_narration());
        assert!(ContentMode::Internet.requires_narration());
        assert!(ContentMode::Transcript.requires_narration());
        assert!(!ContentMode::Timelapse.requires_narration());
    }
}
