use super::{ContentSource, SourceDeps};
use crate::api::http_get_text;
use crate::error::{SourceError, SynthesisError};
use crate::model::{ContentMode, ParagraphSeed, SourceContent};
use crate::synth::TextRequest;
use crate::text::{chunk_words, split_paragraphs};
use crate::upload::title_from_story;
use crate::{logi, logok, logw};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;

const WORDS_PER_CHUNK: usize = 500;
const MIN_TAIL_WORDS: usize = 100;
const MIN_TRANSCRIPT_CHARS: usize = 30;
const ROLLING_SUMMARIES: usize = 2;

const SCRIPT_SYSTEM_PROMPT: &str = "You are a transcript expert who creates engaging YouTube Shorts scripts.\n\
Task:\n\
  1. Produce a cohesive script of about one minute.\n\
  2. Keep a natural, conversational tone.\n\
  3. If earlier content is given, ensure continuity.\n\
  4. Each script must work as a standalone YouTube Short.\n\
Separate paragraphs with blank lines.";

fn video_id_regex() -> Option<&'static Regex> {
    static ID_RE: OnceCell<Regex> = OnceCell::new();
    ID_RE
        .get_or_try_init(|| {
            Regex::new(
                r"(?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/|youtube\.com/e/|youtube\.com/shorts/|youtube\.com/live/)([A-Za-z0-9_-]{11})",
            )
        })
        .ok()
}

fn bare_id_regex() -> Option<&'static Regex> {
    static BARE_RE: OnceCell<Regex> = OnceCell::new();
    BARE_RE.get_or_try_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$")).ok()
}

pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if bare_id_regex().is_some_and(|re| re.is_match(input)) {
        return Some(input.to_string());
    }
    video_id_regex()?
        .captures(input)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    #[serde(default)]
    pub language_code: String,
    #[serde(default)]
    pub kind: Option<String>,
}

impl CaptionTrack {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

pub fn parse_caption_tracks(watch_html: &str) -> Vec<CaptionTrack> {
    const KEY: &str = "\"captionTracks\":";
    let Some(start) = watch_html.find(KEY) else {
        return Vec::new();
    };
    let rest = &watch_html[start + KEY.len()..];
    serde_json::Deserializer::from_str(rest)
        .into_iter::<Vec<CaptionTrack>>()
        .next()
        .and_then(Result::ok)
        .unwrap_or_default()
}

pub fn choose_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    tracks.iter().find(|t| t.is_generated()).or_else(|| tracks.first())
}

#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

pub fn join_json3(body: &str) -> Option<String> {
    let mut doc: Json3 = serde_json::from_str(body).ok()?;
    doc.events.sort_by_key(|e| e.t_start_ms);
    let text = doc
        .events
        .iter()
        .flat_map(|e| e.segs.iter())
        .map(|s| s.utf8.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

pub struct TranscriptSource {
    video_id: String,
    deps: SourceDeps,
}

impl TranscriptSource {
    pub fn new(url: &str, deps: SourceDeps) -> Result<Self, SourceError> {
        let video_id = extract_video_id(url)
            .ok_or_else(|| SourceError::InvalidRequest(format!("no YouTube video id in {url}")))?;
        Ok(Self { video_id, deps })
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    async fn fetch_transcript(&self) -> Result<String, SourceError> {
        let watch_url = format!("https://www.youtube.com/watch?v={}", self.video_id);
        let fetch_err = |message: String| SourceError::Fetch {
            url: watch_url.clone(),
            message,
        };

        let (status, html) = http_get_text(&self.deps.http, &watch_url)
            .await
            .map_err(|e| fetch_err(format!("{e:#}")))?;
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {}", status.as_u16())));
        }

        let tracks = parse_caption_tracks(&html);
        logi(format!("Found {} caption track(s) for {}", tracks.len(), self.video_id));
        let track = choose_track(&tracks).ok_or_else(|| fetch_err("no caption tracks".into()))?;

        let url = format!("{}&fmt=json3", track.base_url);
        let (status, body) = http_get_text(&self.deps.http, &url)
            .await
            .map_err(|e| fetch_err(format!("{e:#}")))?;
        if !status.is_success() {
            return Err(fetch_err(format!("caption HTTP {}", status.as_u16())));
        }
        join_json3(&body).ok_or(SourceError::Empty)
    }

    async fn ask(&self, request: TextRequest) -> Result<String, SynthesisError> {
        self.deps.ask("transcript script", &request).await.map(|s| s.trim().to_string())
    }

    // One script per word chunk, each seeing up to two summaries of the
    // scripts before it. Failed chunks are skipped.
    pub async fn scripts_from_transcript(&self, transcript: &str) -> Vec<String> {
        let chunks = chunk_words(transcript, WORDS_PER_CHUNK, MIN_TAIL_WORDS);
        logi(format!("Split transcript into {} chunk(s)", chunks.len()));

        let mut scripts = Vec::new();
        let mut summaries: Vec<String> = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            logi(format!("Processing chunk {}/{}", i + 1, chunks.len()));
            let context = if summaries.is_empty() {
                String::new()
            } else {
                format!("Summary of earlier content:\n{}\n\n", summaries.join("\n"))
            };
            let prompt = format!(
                "{context}Below is a transcript extracted from a YouTube video. Analyze it, \
                 then explain concisely who is speaking about what.\n\n{chunk}"
            );

            let request = TextRequest::new(prompt)
                .with_system(SCRIPT_SYSTEM_PROMPT)
                .with_temperature(0.7)
                .with_max_tokens(1000);
            let script = match self.ask(request).await {
                Ok(s) if !s.is_empty() => s,
                Ok(_) => continue,
                Err(e) => {
                    logw(format!("Script for chunk {} failed: {e}", i + 1));
                    continue;
                }
            };

            let summary_request = TextRequest::new(format!(
                "Summarize the key points of this script in 50-100 words:\n\n{script}"
            ))
            .with_temperature(0.3)
            .with_max_tokens(400);
            if let Ok(summary) = self.ask(summary_request).await {
                if !summary.is_empty() {
                    summaries.push(summary);
                    if summaries.len() > ROLLING_SUMMARIES {
                        summaries.remove(0);
                    }
                }
            }
            scripts.push(script);
        }
        scripts
    }
}

#[async_trait]
impl ContentSource for TranscriptSource {
    fn mode(&self) -> ContentMode {
        ContentMode::Transcript
    }

    async fn fetch(&self) -> Result<SourceContent, SourceError> {
        let transcript = self.fetch_transcript().await?;
        if transcript.trim().chars().count() < MIN_TRANSCRIPT_CHARS {
            return Err(SourceError::Empty);
        }

        let scripts = self.scripts_from_transcript(&transcript).await;
        let seeds: Vec<ParagraphSeed> = scripts
            .iter()
            .flat_map(|s| split_paragraphs(s))
            .take(self.deps.max_units.max(1))
            .map(ParagraphSeed::new)
            .collect();
        if seeds.is_empty() {
            return Err(SourceError::Empty);
        }

        let body = scripts.join("\n\n");
        logok(format!("Transcript {} -> {} seed(s)", self.video_id, seeds.len()));
        Ok(SourceContent {
            title: title_from_story(&body),
            body,
            seeds,
        })
    }
}
