use crate::api::send_for_text;
use crate::config::Config;
use crate::error::SynthesisError;
use crate::synth::{ImageRequest, ImageSynthesizer, TextGenerator, TextRequest};
use crate::text::trim_copy_utf8_safe;
use crate::{logi, logw};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde_json::json;
use std::path::{Path, PathBuf};

const PROVIDER: &str = "openai";
const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";
const MAX_PROMPT_CHARS: usize = 32_000;

#[derive(Clone)]
pub struct OpenAi {
    client: Client,
    api_key: String,
    chat_model: String,
    image_model: String,
    image_size: String,
    image_quality: String,
}

impl OpenAi {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.openai_key.clone(),
            chat_model: cfg.openai_chat_model.clone(),
            image_model: cfg.openai_image_model.clone(),
            image_size: cfg.openai_image_size.clone(),
            image_quality: cfg.openai_image_quality.clone(),
        }
    }
}

fn chat_body(model: &str, request: &TextRequest) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({
        "role": "user",
        "content": trim_copy_utf8_safe(&request.prompt, MAX_PROMPT_CHARS),
    }));

    json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

fn extract_chat_text(raw: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(raw).ok()?;
    let text = root
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()?
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}

fn extract_image_b64(raw: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(raw).ok()?;
    root.get("data")?
        .as_array()?
        .first()?
        .get("b64_json")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl TextGenerator for OpenAi {
    async fn generate(&self, request: &TextRequest) -> Result<String, SynthesisError> {
        let body = chat_body(&self.chat_model, request);
        let raw = send_for_text(
            PROVIDER,
            self.client.post(CHAT_URL).bearer_auth(&self.api_key).json(&body),
        )
        .await?;

        match extract_chat_text(&raw) {
            Some(text) => Ok(text),
            None => {
                let snippet = raw.chars().take(800).collect::<String>();
                logw(format!("OpenAI response parse failed. Raw body: {snippet}"));
                Err(SynthesisError::permanent(PROVIDER, "no completion text in response"))
            }
        }
    }
}

#[async_trait]
impl ImageSynthesizer for OpenAi {
    async fn synthesize(&self, request: &ImageRequest, out: &Path) -> Result<PathBuf, SynthesisError> {
        let body = json!({
            "model": self.image_model,
            "prompt": trim_copy_utf8_safe(&request.prompt, MAX_PROMPT_CHARS),
            "size": self.image_size,
            "quality": self.image_quality,
            "n": 1,
        });

        let raw = send_for_text(
            PROVIDER,
            self.client.post(IMAGES_URL).bearer_auth(&self.api_key).json(&body),
        )
        .await?;

        let b64 = extract_image_b64(&raw)
            .ok_or_else(|| SynthesisError::permanent(PROVIDER, "no b64_json image in response"))?;
        let bytes = BASE64
            .decode(b64.as_bytes())
            .map_err(|e| SynthesisError::permanent(PROVIDER, format!("bad image payload: {e}")))?;

        crate::api::write_output(PROVIDER, out, &bytes).await?;
        logi(format!("Image saved: {}", out.display()));
        Ok(out.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_body_includes_optional_system_message() {
        let req = TextRequest::new("hello")
            .with_system("be brief")
            .with_temperature(0.3)
            .with_max_tokens(150);
        let body = chat_body("gpt-test", &req);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hello");
        assert_eq!(body["max_tokens"], 150);

        let bare = chat_body("gpt-test", &TextRequest::new("hi"));
        assert_eq!(bare["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parses_first_choice_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"  A fox waltzed.  "}}]}"#;
        assert_eq!(extract_chat_text(raw).as_deref(), Some("A fox waltzed."));
        assert!(extract_chat_text(r#"{"choices":[]}"#).is_none());
        assert!(extract_chat_text(r#"{"choices":[{"message":{"content":"   "}}]}"#).is_none());
    }

    #[test]
    fn parses_image_payload() {
        let raw = r#"{"created":1,"data":[{"b64_json":"aGVsbG8="}]}"#;
        let b64 = extract_image_b64(raw).unwrap();
        assert_eq!(BASE64.decode(b64).unwrap(), b"hello");
        assert!(extract_image_b64(r#"{"data":[{"url":"https://x"}]}"#).is_none());
    }
}
