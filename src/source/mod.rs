pub mod internet;
pub mod story;
pub mod timelapse;
pub mod transcript;

use crate::error::{SourceError, SynthesisError};
use crate::model::{ContentMode, SourceContent};
use crate::retry::{RetryPolicy, with_retry};
use crate::synth::{TextGenerator, TextRequest};
use async_trait::async_trait;
use std::sync::Arc;

pub use internet::InternetSource;
pub use story::StorySource;
pub use timelapse::TimelapseSource;
pub use transcript::TranscriptSource;

#[async_trait]
pub trait ContentSource: Send + Sync {
    fn mode(&self) -> ContentMode;

    async fn fetch(&self) -> Result<SourceContent, SourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRequest {
    AiStory,
    Internet { url: String },
    Transcript { url: String },
    Timelapse { topic: String, start_year: i32, end_year: i32 },
}

impl ContentRequest {
    pub fn mode(&self) -> ContentMode {
        match self {
            ContentRequest::AiStory => ContentMode::AiStory,
            ContentRequest::Internet { .. } => ContentMode::Internet,
            ContentRequest::Transcript { .. } => ContentMode::Transcript,
            ContentRequest::Timelapse { .. } => ContentMode::Timelapse,
        }
    }
}

#[derive(Clone)]
pub struct SourceDeps {
    pub text: Arc<dyn TextGenerator>,
    pub http: reqwest::Client,
    pub chat_temperature: f32,
    pub chat_max_tokens: u32,
    pub max_units: usize,
    pub retry: RetryPolicy,
}

impl SourceDeps {
    pub async fn ask(&self, label: &str, request: &TextRequest) -> Result<String, SynthesisError> {
        let text = &self.text;
        with_retry(&self.retry, label, || text.generate(request)).await
    }
}

pub fn build(request: &ContentRequest, deps: SourceDeps) -> Result<Box<dyn ContentSource>, SourceError> {
    let source: Box<dyn ContentSource> = match request {
        ContentRequest::AiStory => Box::new(StorySource::new(deps)),
        ContentRequest::Internet { url } => Box::new(InternetSource::new(url, deps)?),
        ContentRequest::Transcript { url } => Box::new(TranscriptSource::new(url, deps)?),
        ContentRequest::Timelapse {
            topic,
            start_year,
            end_year,
        } => Box::new(TimelapseSource::new(topic, *start_year, *end_year)?),
    };
    Ok(source)
}
