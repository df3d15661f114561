use crate::api::{self, elevenlabs::ElevenLabs, openai::OpenAi, runway::Runway, youtube::YouTube};
use crate::assembler::Assembler;
use crate::compositor::{Compositor, segments_in_order};
use crate::config::Config;
use crate::error::{RunError, SourceError};
use crate::ffmpeg::{Ffmpeg, MediaTool};
use crate::model::{ContentMode, FinalVideo, ParagraphUnit, RunReport, SourceContent, UploadOutcome};
use crate::source::{self, ContentRequest, SourceDeps};
use crate::synth::{ImageCache, Synthesizers, TextGenerator, VideoSynthesizer};
use crate::upload::{self, Privacy, UploadHistory, UploadMetadata, Uploader};
use crate::workspace::RunWorkspace;
use crate::{loge, logi, logok, logw};
use anyhow::{Context, Result};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use walkdir::WalkDir;

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "aac", "ogg"];

fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub upload: bool,
    pub video: bool,
    pub privacy: Privacy,
    pub music: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            upload: true,
            video: true,
            privacy: Privacy::default(),
            music: None,
        }
    }
}

pub fn list_music(dir: &Path) -> Vec<PathBuf> {
    let mut tracks: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(OsStr::to_str)
                .map(|ext| MUSIC_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
                .unwrap_or(false)
        })
        .collect();
    tracks.sort();
    tracks
}

pub fn pick_music(dir: &Path, rng: &mut impl Rng) -> Option<PathBuf> {
    let tracks = list_music(dir);
    if tracks.is_empty() {
        return None;
    }
    let idx = rng.gen_range(0..tracks.len());
    Some(tracks[idx].clone())
}

pub fn image_mapping(ws: &RunWorkspace, units: &[ParagraphUnit]) -> String {
    let mut out = String::new();
    for unit in units {
        let image = unit
            .image
            .as_ref()
            .map(|img| ws.relative(&img.path).display().to_string())
            .unwrap_or_else(|| "FAILED".to_string());
        out.push_str(&format!("Paragraph {}: {}\nImage: {image}\n\n", unit.number(), unit.text));
    }
    out
}

fn metadata_for(request: &ContentRequest, content: &SourceContent, category_id: &str, privacy: Privacy) -> UploadMetadata {
    match request {
        ContentRequest::Timelapse {
            topic,
            start_year,
            end_year,
        } => UploadMetadata::for_timelapse(topic, *start_year, *end_year, category_id, privacy),
        _ => {
            let mut meta = UploadMetadata::for_story(&content.body, category_id, privacy);
            if !content.title.trim().is_empty() {
                meta.title = content.title.trim().to_string();
            }
            meta
        }
    }
}

async fn write_artifact(path: &Path, contents: &str) -> Result<(), RunError> {
    fs::write(path, contents).await.map_err(|source| RunError::Workspace {
        path: path.to_path_buf(),
        source,
    })
}

pub struct Pipeline {
    config: Config,
    text: Arc<dyn TextGenerator>,
    synth: Synthesizers,
    tool: Arc<dyn MediaTool>,
    uploader: Option<Arc<dyn Uploader>>,
    http: reqwest::Client,
    history: UploadHistory,
    options: RunOptions,
}

impl Pipeline {
    pub fn new(config: Config, text: Arc<dyn TextGenerator>, synth: Synthesizers, tool: Arc<dyn MediaTool>) -> Self {
        let history = UploadHistory::new(config.upload_history_file.clone());
        Self {
            config,
            text,
            synth,
            tool,
            uploader: None,
            http: reqwest::Client::new(),
            history,
            options: RunOptions::default(),
        }
    }

    pub fn from_config(config: Config, options: RunOptions) -> Result<Self> {
        let http = api::build_client(config.request_timeout_secs).context("Failed to build HTTP client")?;
        let openai = Arc::new(OpenAi::new(http.clone(), &config));

        if config.elevenlabs_key.is_empty() {
            logw("ElevenLabs key missing; narrated modes will produce no audio.");
        }
        let speech = Arc::new(ElevenLabs::new(http.clone(), &config));

        let video: Option<Arc<dyn VideoSynthesizer>> = if !options.video {
            logi("Image-to-video disabled for this run.");
            None
        } else if config.runway_api_key.is_empty() {
            logw("Runway key missing; paragraphs will use still images.");
            None
        } else {
            Some(Arc::new(Runway::new(http.clone(), &config)))
        };

        let uploader: Option<Arc<dyn Uploader>> = if !options.upload {
            None
        } else if config.youtube.is_configured() {
            Some(Arc::new(YouTube::new(http.clone(), config.youtube.clone())))
        } else {
            logw("YouTube credentials missing; upload disabled.");
            None
        };

        let tool = Arc::new(Ffmpeg::new(config.video, config.tool_timeout_secs));
        let synth = Synthesizers {
            image: openai.clone(),
            speech,
            video,
        };

        let mut pipeline = Self::new(config, openai, synth, tool).with_http(http).with_options(options);
        pipeline.uploader = uploader;
        Ok(pipeline)
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, request: &ContentRequest) -> Result<RunReport, RunError> {
        let ws = RunWorkspace::create(&self.config.runs_dir).await?;
        logi(format!("Run directory: {}", ws.root().display()));

        let Some(secs) = self.config.run_timeout_secs else {
            return self.run_in(&ws, request).await;
        };
        match tokio::time::timeout(Duration::from_secs(secs), self.run_in(&ws, request)).await {
            Ok(result) => result,
            Err(_) => {
                loge(format!("Run exceeded {secs}s; partial artifacts left in {}", ws.root().display()));
                Err(RunError::TimedOut(secs))
            }
        }
    }

    pub async fn run_in(&self, ws: &RunWorkspace, request: &ContentRequest) -> Result<RunReport, RunError> {
        let mode = request.mode();
        logi(format!("Mode: {mode}"));

        let deps = SourceDeps {
            text: self.text.clone(),
            http: self.http.clone(),
            chat_temperature: self.config.chat_temperature,
            chat_max_tokens: self.config.chat_max_tokens,
            max_units: self.config.max_units,
            retry: self.config.retry,
        };
        let content = source::build(request, deps)?.fetch().await?;
        if content.seeds.is_empty() {
            return Err(SourceError::Empty.into());
        }
        logok(format!("Source produced {} paragraph(s)", content.seeds.len()));
        write_artifact(&ws.story_path(), &content.body).await?;

        let cache = ImageCache::new(self.synth.image.clone());
        let mut units = Assembler::new(&self.synth, &cache, self.config.retry, mode)
            .with_video_limit(self.config.max_video_units)
            .with_seed(now_seed())
            .assemble(ws, &content.seeds)
            .await;
        write_artifact(&ws.mapping_path(), &image_mapping(ws, &units)).await?;

        let attempted = units.len();
        if !units.iter().any(|u| u.is_complete()) {
            return Err(RunError::NoCompleteUnits { attempted });
        }

        let final_video = self.compose(ws, mode, &mut units).await?;
        let upload = self.upload(request, &content, &final_video).await;

        let report = RunReport {
            run_dir: ws.root().to_path_buf(),
            mode,
            title: content.title,
            units,
            final_video,
            upload,
        };
        logok(format!(
            "Run complete: {}/{} unit(s) in {}",
            report.completed_units(),
            attempted,
            report.final_video.path.display()
        ));
        Ok(report)
    }

    async fn compose(&self, ws: &RunWorkspace, mode: ContentMode, units: &mut [ParagraphUnit]) -> Result<FinalVideo, RunError> {
        let compositor = Compositor::new(self.tool.as_ref(), ws);
        let music = self.background_music();

        let (segments, indices) = if mode == ContentMode::Timelapse {
            let timelapse = compositor.compose_timelapse(units, &self.config.timelapse).await?;
            (vec![timelapse.segment.path], timelapse.units)
        } else {
            compositor.compose_all(units).await;
            segments_in_order(units)
        };
        if segments.is_empty() {
            return Err(RunError::NoCompleteUnits { attempted: units.len() });
        }

        let has_speech = mode.requires_narration();
        Ok(compositor
            .concatenate(&segments, indices, music.as_deref(), has_speech)
            .await?)
    }

    fn background_music(&self) -> Option<PathBuf> {
        if let Some(music) = &self.options.music {
            return Some(music.clone());
        }
        let mut rng = StdRng::seed_from_u64(now_seed());
        let picked = pick_music(&self.config.background_music_dir, &mut rng);
        if picked.is_none() {
            logw(format!(
                "No background music in {}; output keeps its own audio only.",
                self.config.background_music_dir.display()
            ));
        }
        picked
    }

    async fn upload(&self, request: &ContentRequest, content: &SourceContent, video: &FinalVideo) -> UploadOutcome {
        let Some(uploader) = self.uploader.as_ref().filter(|_| self.options.upload) else {
            return UploadOutcome::Skipped;
        };
        let metadata = metadata_for(
            request,
            content,
            &self.config.youtube.category_id,
            self.options.privacy,
        );
        match upload::publish(uploader.as_ref(), &self.history, &video.path, metadata, &content.body).await {
            Ok(url) => {
                logok(format!("Uploaded: {url}"));
                let video_id = url.rsplit('/').next().unwrap_or_default().to_string();
                UploadOutcome::Uploaded { video_id, url }
            }
            Err(e) => {
                logw(format!("Upload failed; video kept at {}: {e}", video.path.display()));
                UploadOutcome::Failed(e.to_string())
            }
        }
    }
}
