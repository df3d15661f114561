use crate::model::{ContentMode, MediaArtifact, ParagraphSeed, ParagraphUnit, Stage};
use crate::prompts;
use crate::retry::{RetryPolicy, with_retry};
use crate::synth::{ImageCache, ImageRequest, Synthesizers, VideoRequest};
use crate::workspace::RunWorkspace;
use crate::{logi, logok, logw};
use rand::SeedableRng;
use rand::rngs::StdRng;

pub struct Assembler<'a> {
    synth: &'a Synthesizers,
    cache: &'a ImageCache,
    policy: RetryPolicy,
    mode: ContentMode,
    max_video_units: usize,
    seed: u64,
}

impl<'a> Assembler<'a> {
    pub fn new(synth: &'a Synthesizers, cache: &'a ImageCache, policy: RetryPolicy, mode: ContentMode) -> Self {
        Self {
            synth,
            cache,
            policy,
            mode,
            max_video_units: 0,
            seed: 0,
        }
    }

    pub fn with_video_limit(mut self, limit: usize) -> Self {
        self.max_video_units = limit;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn image_prompt(&self, seed: &ParagraphSeed) -> String {
        match self.mode {
            ContentMode::Timelapse => seed.text.clone(),
            _ => prompts::scene_image(&seed.text),
        }
    }

    fn wants_video(&self, unit: &ParagraphUnit) -> bool {
        self.synth.video.is_some()
            && self.mode != ContentMode::Timelapse
            && unit.index < self.max_video_units
            && unit.image.is_some()
    }

    // One unit per seed, in input order. Failures stay on their unit and
    // never stop later units.
    pub async fn assemble(&self, ws: &RunWorkspace, seeds: &[ParagraphSeed]) -> Vec<ParagraphUnit> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut units = Vec::with_capacity(seeds.len());

        for (index, seed) in seeds.iter().enumerate() {
            let mut unit = ParagraphUnit::from_seed(index, seed, self.mode.requires_narration());
            logi(format!("=== Unit {}/{} ===", unit.number(), seeds.len()));

            let request = ImageRequest::new(self.image_prompt(seed));
            let image_out = ws.image_path(index, seed.label.as_deref());
            match self.cache.resolve(&request, &image_out, index, &self.policy).await {
                Ok(artifact) => unit.image = Some(artifact),
                Err(e) => {
                    logw(format!("Unit {} image failed: {e}", unit.number()));
                    unit.record_failure(Stage::TextToImage, e.to_string());
                }
            }

            if !unit.has_visual() {
                logw(format!("Unit {} has no visual; skipping remaining stages.", unit.number()));
                units.push(unit);
                continue;
            }

            if self.wants_video(&unit) {
                self.resolve_video(ws, &mut unit, &mut rng).await;
            }

            if unit.requires_audio {
                self.resolve_audio(ws, &mut unit).await;
            }

            if unit.is_complete() {
                logok(format!("Unit {} ready", unit.number()));
            }
            units.push(unit);
        }

        let complete = units.iter().filter(|u| u.is_complete()).count();
        logi(format!("Assembled {complete}/{} complete unit(s)", units.len()));
        units
    }

    async fn resolve_video(&self, ws: &RunWorkspace, unit: &mut ParagraphUnit, rng: &mut StdRng) {
        let (Some(video), Some(image)) = (&self.synth.video, &unit.image) else {
            return;
        };
        let (prompt, hint) = prompts::motion(rng, &unit.text);
        let request = VideoRequest {
            image: image.path.clone(),
            prompt,
            motion_hint: Some(hint),
        };
        let out = ws.video_path(unit.index);
        let label = format!("video unit {}", unit.number());

        match with_retry(&self.policy, &label, || video.synthesize(&request, &out)).await {
            Ok(path) => unit.video = Some(MediaArtifact::new(path, Stage::ImageToVideo, unit.index)),
            Err(e) => {
                // The still image remains a usable visual.
                logw(format!("Unit {} video failed, keeping image: {e}", unit.number()));
                unit.record_failure(Stage::ImageToVideo, e.to_string());
            }
        }
    }

    async fn resolve_audio(&self, ws: &RunWorkspace, unit: &mut ParagraphUnit) {
        let out = ws.audio_path(unit.index);
        let label = format!("audio unit {}", unit.number());
        let speech = &self.synth.speech;
        let text = unit.text.clone();

        match with_retry(&self.policy, &label, || speech.synthesize(&text, &out)).await {
            Ok(path) => unit.audio = Some(MediaArtifact::new(path, Stage::TextToSpeech, unit.index)),
            Err(e) => {
                logw(format!("Unit {} audio failed: {e}", unit.number()));
                unit.record_failure(Stage::TextToSpeech, e.to_string());
            }
        }
    }
}
