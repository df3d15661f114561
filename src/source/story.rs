use super::{ContentSource, SourceDeps};
use crate::error::SourceError;
use crate::model::{ContentMode, ParagraphSeed, SourceContent};
use crate::prompts;
use crate::synth::TextRequest;
use crate::text::{self, MAX_STORY_PARAGRAPHS};
use crate::upload::title_from_story;
use crate::{logi, logok};
use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn now_seed() -> u64 {
    chrono::Local::now().timestamp_nanos_opt().unwrap_or_default() as u64
}

pub struct StorySource {
    deps: SourceDeps,
    seed: u64,
}

impl StorySource {
    pub fn new(deps: SourceDeps) -> Self {
        Self { deps, seed: now_seed() }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[async_trait]
impl ContentSource for StorySource {
    fn mode(&self) -> ContentMode {
        ContentMode::AiStory
    }

    async fn fetch(&self) -> Result<SourceContent, SourceError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let prompt = prompts::micro_story(&mut rng);
        logi(format!("Story prompt: {prompt}"));

        let request = TextRequest::new(prompt)
            .with_temperature(self.deps.chat_temperature)
            .with_max_tokens(self.deps.chat_max_tokens);
        let story = self.deps.ask("story", &request).await?;
        let story = story.trim().to_string();
        if story.is_empty() {
            return Err(SourceError::Empty);
        }

        let limit = self.deps.max_units.clamp(1, MAX_STORY_PARAGRAPHS);
        let paragraphs = text::segment_story(&story, limit);
        let paragraphs = text::summarize_long(self.deps.text.as_ref(), &self.deps.retry, paragraphs).await;
        if paragraphs.is_empty() {
            return Err(SourceError::Empty);
        }

        logok(format!("Story generated: {} paragraph(s)", paragraphs.len()));
        Ok(SourceContent {
            title: title_from_story(&story),
            body: story,
            seeds: paragraphs.into_iter().map(ParagraphSeed::new).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthesisError;
    use crate::source::stubs::{ScriptedText, deps};
    use std::sync::Arc;

    #[tokio::test]
    async fn story_becomes_paragraph_seeds() {
        let text = Arc::new(ScriptedText::ok("A squid sang.\n\nThe grandma wept.\n\nThe sky melted."));
        let source = StorySource::new(deps(text.clone())).with_seed(3);

        let content = source.fetch().await.unwrap();

        assert_eq!(content.seeds.len(), 3);
        assert_eq!(content.seeds[1].text, "The grandma wept.");
        assert_eq!(content.title, "A squid sang...");
        let prompts = text.prompts.lock().unwrap();
        assert!(prompts[0].prompt.starts_with("Write a cursed micro-story"));
        assert_eq!(prompts[0].max_tokens, 300);
    }

    #[tokio::test]
    async fn blank_story_is_empty_error() {
        let source = StorySource::new(deps(Arc::new(ScriptedText::ok("   "))));
        assert!(matches!(source.fetch().await, Err(SourceError::Empty)));
    }

    #[tokio::test]
    async fn generator_failure_is_fatal() {
        let text = Arc::new(ScriptedText::new(vec![Err(SynthesisError::permanent("stub", "401"))]));
        let source = StorySource::new(deps(text));
        assert!(matches!(source.fetch().await, Err(SourceError::Generation(_))));
    }

    #[tokio::test]
    async fn rate_limited_story_call_is_retried() {
        let text = Arc::new(ScriptedText::new(vec![
            Err(SynthesisError::transient("openai", "HTTP 429")),
            Ok("A fox sings.\n\nA crow answers.".into()),
        ]));
        let source = StorySource::new(deps(text.clone())).with_seed(1);

        let content = source.fetch().await.unwrap();

        assert_eq!(content.seeds.len(), 2);
        assert_eq!(text.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn persistent_rate_limit_exhausts_budget() {
        let text = Arc::new(ScriptedText::new(vec![Err(SynthesisError::transient("openai", "HTTP 429"))]));
        let source = StorySource::new(deps(text.clone()));

        assert!(matches!(source.fetch().await, Err(SourceError::Generation(_))));
        assert_eq!(text.prompts.lock().unwrap().len(), 3);
    }
}
