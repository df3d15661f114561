use crate::error::SynthesisError;
use crate::model::{MediaArtifact, Stage};
use crate::retry::{RetryPolicy, with_retry};
use crate::logok;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl TextRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }

    pub fn cache_key(&self) -> String {
        self.prompt
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub image: PathBuf,
    pub prompt: String,
    pub motion_hint: Option<String>,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &TextRequest) -> Result<String, SynthesisError>;
}

#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &ImageRequest, out: &Path) -> Result<PathBuf, SynthesisError>;
}

#[async_trait]
pub trait VideoSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &VideoRequest, out: &Path) -> Result<PathBuf, SynthesisError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, out: &Path) -> Result<PathBuf, SynthesisError>;
}

#[derive(Clone)]
pub struct Synthesizers {
    pub image: Arc<dyn ImageSynthesizer>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub video: Option<Arc<dyn VideoSynthesizer>>,
}

// Per-run text-to-image cache keyed by normalized prompt.
//
// The lock is held across the provider call so a given key is synthesized at
// most once even if callers ever run concurrently.
pub struct ImageCache {
    inner: Arc<dyn ImageSynthesizer>,
    entries: Mutex<HashMap<String, PathBuf>>,
}

impl ImageCache {
    pub fn new(inner: Arc<dyn ImageSynthesizer>) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn resolve(
        &self,
        request: &ImageRequest,
        out: &Path,
        unit: usize,
        policy: &RetryPolicy,
    ) -> Result<MediaArtifact, SynthesisError> {
        let key = request.cache_key();
        let mut entries = self.entries.lock().await;

        if let Some(existing) = entries.get(&key) {
            if tokio::fs::metadata(existing).await.is_ok() {
                logok(format!("Image cache hit for unit {}: {}", unit + 1, existing.display()));
                let mut artifact = MediaArtifact::new(existing.clone(), Stage::TextToImage, unit);
                artifact.cached = true;
                return Ok(artifact);
            }
        }

        let label = format!("image unit {}", unit + 1);
        let path = with_retry(policy, &label, || self.inner.synthesize(request, out)).await?;
        entries.insert(key, path.clone());
        Ok(MediaArtifact::new(path, Stage::TextToImage, unit))
    }
}

#[cfg(test)]
pub(crate) mod stubs {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    pub struct StubImages {
        pub calls: AtomicUsize,
        pub permanent: HashSet<String>,
        pub transient_failures: StdMutex<HashMap<String, usize>>,
    }

    impl StubImages {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn failing_permanently(keys: &[&str]) -> Self {
            Self {
                permanent: keys.iter().map(|k| k.to_string()).collect(),
                ..Default::default()
            }
        }

        pub fn failing_transiently(key: &str, times: usize) -> Self {
            let stub = Self::default();
            stub.transient_failures
                .lock()
                .unwrap()
                .insert(key.to_string(), times);
            stub
        }
    }

    #[async_trait]
    impl ImageSynthesizer for StubImages {
        async fn synthesize(&self, request: &ImageRequest, out: &Path) -> Result<PathBuf, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent.iter().any(|k| request.prompt.contains(k)) {
                return Err(SynthesisError::permanent("stub-image", "content policy"));
            }
            {
                let mut transient = self.transient_failures.lock().unwrap();
                for (key, remaining) in transient.iter_mut() {
                    if request.prompt.contains(key.as_str()) && *remaining > 0 {
                        *remaining -= 1;
                        return Err(SynthesisError::transient("stub-image", "429"));
                    }
                }
            }
            write_png(out);
            Ok(out.to_path_buf())
        }
    }

    #[derive(Default)]
    pub struct StubSpeech {
        pub calls: AtomicUsize,
        pub permanent: HashSet<String>,
    }

    impl StubSpeech {
        pub fn failing_permanently(keys: &[&str]) -> Self {
            Self {
                permanent: keys.iter().map(|k| k.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for StubSpeech {
        async fn synthesize(&self, text: &str, out: &Path) -> Result<PathBuf, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent.iter().any(|k| text.contains(k)) {
                return Err(SynthesisError::permanent("stub-tts", "invalid input"));
            }
            std::fs::write(out, b"mp3").unwrap();
            Ok(out.to_path_buf())
        }
    }

    #[derive(Default)]
    pub struct StubVideo {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    #[async_trait]
    impl VideoSynthesizer for StubVideo {
        async fn synthesize(&self, _request: &VideoRequest, out: &Path) -> Result<PathBuf, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SynthesisError::permanent("stub-video", "task FAILED"));
            }
            std::fs::write(out, b"mp4").unwrap();
            Ok(out.to_path_buf())
        }
    }

    pub fn write_png(out: &Path) {
        let shade = (out.to_string_lossy().len() % 200) as u8;
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([shade, 40, 200]));
        img.save(out).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::stubs::StubImages;
    use super::*;

    #[test]
    fn cache_key_normalizes_prompt() {
        let a = ImageRequest::new("  A Red   Ferrari\n in 2001 ");
        let b = ImageRequest::new("a red ferrari in 2001");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[tokio::test]
    async fn repeated_prompt_hits_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubImages::default());
        let cache = ImageCache::new(stub.clone());
        let policy = RetryPolicy::immediate(1);
        let req = ImageRequest::new("same prompt");

        let first = cache
            .resolve(&req, &tmp.path().join("a.png"), 0, &policy)
            .await
            .unwrap();
        let second = cache
            .resolve(&req, &tmp.path().join("b.png"), 1, &policy)
            .await
            .unwrap();

        assert_eq!(stub.calls(), 1);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.path, first.path);
        assert_eq!(second.unit, 1);
    }

    #[tokio::test]
    async fn different_prompts_each_call_provider() {
        let tmp = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubImages::default());
        let cache = ImageCache::new(stub.clone());
        let policy = RetryPolicy::immediate(1);

        for (i, prompt) in ["one", "two", "three"].iter().enumerate() {
            cache
                .resolve(&ImageRequest::new(*prompt), &tmp.path().join(format!("{i}.png")), i, &policy)
                .await
                .unwrap();
        }

        assert_eq!(stub.calls(), 3);
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn failed_synthesis_is_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubImages::failing_permanently(&["bad"]));
        let cache = ImageCache::new(stub.clone());
        let policy = RetryPolicy::immediate(3);

        let result = cache
            .resolve(&ImageRequest::new("bad prompt"), &tmp.path().join("x.png"), 0, &policy)
            .await;

        assert!(result.is_err());
        assert_eq!(stub.calls(), 1);
        assert_eq!(cache.len().await, 0);
    }
}
