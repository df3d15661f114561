use crate::config::Config;
use crate::error::SynthesisError;
use crate::logw;
use crate::synth::SpeechSynthesizer;
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};

const PROVIDER: &str = "elevenlabs";

#[derive(Clone)]
pub struct ElevenLabs {
    client: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabs {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.elevenlabs_key.clone(),
            voice_id: cfg.eleven_voice_id.clone(),
            model_id: cfg.eleven_model_id.clone(),
        }
    }

    fn url(&self) -> String {
        format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=mp3_44100_128",
            self.voice_id
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabs {
    async fn synthesize(&self, text: &str, out: &Path) -> Result<PathBuf, SynthesisError> {
        if self.api_key.is_empty() {
            return Err(SynthesisError::permanent(PROVIDER, "elevenlabs_api_key not configured"));
        }
        if text.trim().is_empty() {
            return Err(SynthesisError::permanent(PROVIDER, "empty narration text"));
        }

        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
        });

        let resp = self
            .client
            .post(self.url())
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::from_reqwest(PROVIDER, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            logw(format!("ElevenLabs TTS failed HTTP {}", status.as_u16()));
            return Err(SynthesisError::from_status(PROVIDER, status.as_u16(), &raw));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SynthesisError::from_reqwest(PROVIDER, &e))?;
        crate::api::write_output(PROVIDER, out, &bytes).await?;
        Ok(out.to_path_buf())
    }
}
