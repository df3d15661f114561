use super::{ContentSource, SourceDeps};
use crate::api::http_get_text;
use crate::error::SourceError;
use crate::model::{ContentMode, ParagraphSeed, SourceContent};
use crate::synth::TextRequest;
use crate::text::{html_to_text_basic, normalize_whitespace, split_paragraphs, truncate_chars};
use crate::{logi, logw};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;

const MAX_CONTENT_CHARS: usize = 4000;
const MIN_PARAGRAPH_CHARS: usize = 20;
const MAX_PARAGRAPHS: usize = 6;

fn regex_cell(cell: &'static OnceCell<Regex>, pattern: &str) -> Result<&'static Regex, SourceError> {
    cell.get_or_try_init(|| Regex::new(pattern))
        .map_err(|e| SourceError::InvalidRequest(format!("bad pattern: {e}")))
}

fn title_regex() -> Result<&'static Regex, SourceError> {
    static TITLE_RE: OnceCell<Regex> = OnceCell::new();
    regex_cell(&TITLE_RE, r"(?is)<title[^>]*>(.*?)</title>")
}

fn paragraph_regex() -> Result<&'static Regex, SourceError> {
    static P_RE: OnceCell<Regex> = OnceCell::new();
    regex_cell(&P_RE, r"(?is)<p(?:\s[^>]*)?>(.*?)</p>")
}

fn noise_regex() -> Result<&'static Regex, SourceError> {
    static NOISE_RE: OnceCell<Regex> = OnceCell::new();
    regex_cell(&NOISE_RE, r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
}

pub fn extract_article(html: &str) -> Result<(String, String), SourceError> {
    let cleaned = noise_regex()?.replace_all(html, " ");

    let title = title_regex()?
        .captures(&cleaned)
        .and_then(|c| c.get(1))
        .map(|m| normalize_whitespace(&html_to_text_basic(m.as_str())))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled Post".to_string());

    let paragraphs: Vec<String> = paragraph_regex()?
        .captures_iter(&cleaned)
        .filter_map(|c| c.get(1))
        .map(|m| normalize_whitespace(&html_to_text_basic(m.as_str())))
        .filter(|p| !p.is_empty())
        .collect();

    let body = if paragraphs.is_empty() {
        normalize_whitespace(&html_to_text_basic(&cleaned))
    } else {
        paragraphs.join("\n\n")
    };
    Ok((title, body))
}

fn keep_paragraphs<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    items
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
        .take(MAX_PARAGRAPHS)
        .collect()
}

pub struct InternetSource {
    url: String,
    deps: SourceDeps,
}

impl InternetSource {
    pub fn new(url: &str, deps: SourceDeps) -> Result<Self, SourceError> {
        let parsed = reqwest::Url::parse(url.trim())
            .map_err(|e| SourceError::InvalidRequest(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SourceError::InvalidRequest(format!("unsupported scheme: {url}")));
        }
        Ok(Self {
            url: parsed.to_string(),
            deps,
        })
    }

    async fn summarize(&self, title: &str, body: &str) -> Vec<String> {
        let mut content = truncate_chars(body, MAX_CONTENT_CHARS);
        if body.chars().count() > MAX_CONTENT_CHARS {
            content.push_str("...");
        }
        let prompt = format!(
            "Summarize the following web article and split it into 4-6 paragraphs. \
             Each paragraph should be short and clear, suitable for a YouTube Short, \
             understandable on its own while the whole still reads as one story. \
             Separate paragraphs with line breaks.\n\nTitle: {title}\n\nArticle:\n{content}"
        );

        let request = TextRequest::new(prompt).with_temperature(0.7).with_max_tokens(1000);
        match self.deps.ask("article summary", &request).await {
            Ok(summary) => keep_paragraphs(summary.lines().map(str::to_string)),
            Err(e) => {
                logw(format!("Summarization failed, splitting article instead: {e}"));
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ContentSource for InternetSource {
    fn mode(&self) -> ContentMode {
        ContentMode::Internet
    }

    async fn fetch(&self) -> Result<SourceContent, SourceError> {
        logi(format!("Fetching article: {}", self.url));
        let (status, html) = http_get_text(&self.deps.http, &self.url)
            .await
            .map_err(|e| SourceError::Fetch {
                url: self.url.clone(),
                message: format!("{e:#}"),
            })?;
        if !status.is_success() {
            return Err(SourceError::Fetch {
                url: self.url.clone(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let (title, body) = extract_article(&html)?;
        if body.trim().is_empty() {
            return Err(SourceError::Empty);
        }

        let mut paragraphs = self.summarize(&title, &body).await;
        if paragraphs.is_empty() {
            paragraphs = keep_paragraphs(split_paragraphs(&body));
        }
        paragraphs.truncate(self.deps.max_units.max(1));
        if paragraphs.is_empty() {
            return Err(SourceError::Empty);
        }

        logi(format!("Article '{title}' -> {} paragraph(s)", paragraphs.len()));
        Ok(SourceContent {
            title,
            body: paragraphs.join("\n\n"),
            seeds: paragraphs.into_iter().map(ParagraphSeed::new).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_paragraphs() {
        let html = r#"<html><head><title> Big  News </title><style>p{color:red}</style></head>
            <body><p class="lead">First &amp; foremost.</p><div>nav</div><p>Second <b>bold</b> line.</p>
            <script>var p = "<p>fake</p>";</script></body></html>"#;
        let (title, body) = extract_article(html).unwrap();
        assert_eq!(title, "Big News");
        assert_eq!(body, "First & foremost.\n\nSecond bold line.");
    }

    #[test]
    fn broken_markup_still_yields_text() {
        let html = "<div>Unclosed <span>text here<div>more words";
        let (title, body) = extract_article(html).unwrap();
        assert_eq!(title, "Untitled Post");
        assert!(body.contains("Unclosed text heremore words") || body.contains("text here"));
    }

    #[test]
    fn short_paragraphs_dropped_and_capped() {
        let items = (0..10).map(|i| format!("Paragraph number {i} has enough text."));
        let kept = keep_paragraphs(std::iter::once("tiny".to_string()).chain(items));
        assert_eq!(kept.len(), MAX_PARAGRAPHS);
        assert!(kept[0].starts_with("Paragraph number 0"));
    }
}
