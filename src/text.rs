use crate::retry::{RetryPolicy, with_retry};
use crate::synth::{TextGenerator, TextRequest};
use crate::{logi, logw};

pub const MAX_STORY_PARAGRAPHS: usize = 8;
const SUMMARIZE_OVER_CHARS: usize = 300;
const TRUNCATE_FALLBACK_CHARS: usize = 500;
const LARGE_BLOCK_CHARS: usize = 500;
const SHORT_TEXT_CHARS: usize = 100;
const MAX_CHUNK_CHARS: usize = 300;

const SUMMARY_SYSTEM_PROMPT: &str = "Summarize the following paragraph concisely in about 2-3 sentences while preserving the key points and emotional tone. Keep it engaging for a short video format.";

pub fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}

pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            let sentence = current.trim();
            if !sentence.is_empty() {
                out.push(sentence.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

pub fn split_chunks(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= SHORT_TEXT_CHARS {
        let whole = text.trim();
        return if whole.is_empty() { Vec::new() } else { vec![whole.to_string()] };
    }

    let target = (chars.len() / 150).clamp(2, 4);
    let size = chars.len().div_ceil(target).min(MAX_CHUNK_CHARS);

    chars
        .chunks(size)
        .map(|c| c.iter().collect::<String>().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn is_large_block(segments: &[String]) -> bool {
    segments.len() == 1 && segments[0].chars().count() > LARGE_BLOCK_CHARS
}

// Paragraphs first; one oversized block falls back to sentences, then to
// fixed-size chunks. Capped at `max`.
pub fn segment_story(text: &str, max: usize) -> Vec<String> {
    let mut segments = split_paragraphs(text);

    if segments.is_empty() || is_large_block(&segments) {
        let sentences = split_sentences(text);
        if sentences.len() > 1 {
            logi(format!("Split text into {} sentences", sentences.len()));
            segments = sentences;
        } else {
            let chunks = split_chunks(text);
            logi(format!("Created {} chunks from text", chunks.len()));
            segments = chunks;
        }
    }

    if segments.len() > max {
        logi(format!("Limiting to {max} paragraphs for shorts."));
        segments.truncate(max);
    }
    segments
}

// Summarize paragraphs over 300 chars. A failed or empty summary falls back
// to the first 500 chars of the original.
pub async fn summarize_long(generator: &dyn TextGenerator, policy: &RetryPolicy, paragraphs: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(paragraphs.len());
    for (i, paragraph) in paragraphs.into_iter().enumerate() {
        let len = paragraph.chars().count();
        if len <= SUMMARIZE_OVER_CHARS {
            out.push(paragraph);
            continue;
        }

        logi(format!("Paragraph {} is long ({len} chars), summarizing.", i + 1));
        let request = TextRequest::new(paragraph.as_str())
            .with_system(SUMMARY_SYSTEM_PROMPT)
            .with_max_tokens(150)
            .with_temperature(0.7);

        let label = format!("summary paragraph {}", i + 1);
        match with_retry(policy, &label, || generator.generate(&request)).await {
            Ok(summary) if !summary.trim().is_empty() => out.push(summary.trim().to_string()),
            Ok(_) => out.push(truncate_chars(&paragraph, TRUNCATE_FALLBACK_CHARS)),
            Err(e) => {
                logw(format!("Summarizing paragraph {} failed: {e}. Truncating.", i + 1));
                out.push(truncate_chars(&paragraph, TRUNCATE_FALLBACK_CHARS));
            }
        }
    }
    out
}

// Split `text` into chunks of `size` words; a trailing chunk under
// `min_tail` words is merged into the previous one.
pub fn chunk_words(text: &str, size: usize, min_tail: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || size == 0 {
        return Vec::new();
    }

    let mut chunks: Vec<Vec<&str>> = words.chunks(size).map(<[&str]>::to_vec).collect();
    if chunks.len() > 1 && chunks.last().is_some_and(|c| c.len() < min_tail) {
        if let Some(tail) = chunks.pop() {
            if let Some(prev) = chunks.last_mut() {
                prev.extend(tail);
            }
        }
    }
    chunks.into_iter().map(|c| c.join(" ")).collect()
}

pub fn html_to_text_basic(html: &str) -> String {
    let mut out = String::new();
    let bytes = html.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            let starts = |tag: &[u8]| {
                bytes.len() >= j + tag.len() && bytes[j..j + tag.len()].eq_ignore_ascii_case(tag)
            };
            if starts(b"br") || starts(b"/p") || starts(b"/div") || starts(b"/h") {
                out.push('\n');
            }
            while i < bytes.len() && bytes[i] != b'>' {
                i += 1;
            }
            if i < bytes.len() {
                i += 1;
            }
            continue;
        }

        if bytes[i] == b'&' {
            let slice = &html[i..];
            let entity = [
                ("&nbsp;", ' '),
                ("&amp;", '&'),
                ("&lt;", '<'),
                ("&gt;", '>'),
                ("&quot;", '"'),
                ("&#39;", '\''),
            ]
            .into_iter()
            .find(|(name, _)| slice.starts_with(name));
            if let Some((name, ch)) = entity {
                out.push(ch);
                i += name.len();
                continue;
            }
        }

        // Copy the whole UTF-8 scalar so multibyte text survives.
        let ch_len = html[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&html[i..i + ch_len]);
        i += ch_len;
    }
    out
}

pub fn normalize_whitespace(text: &str) -> String {
    let mut out = Vec::new();
    let mut blank = false;
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            if !blank && !out.is_empty() {
                out.push(String::new());
            }
            blank = true;
        } else {
            out.push(line);
            blank = false;
        }
    }
    out.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthesisError;
    use async_trait::async_trait;

    struct FixedSummary(Result<String, SynthesisError>);

    #[async_trait]
    impl TextGenerator for FixedSummary {
        async fn generate(&self, _request: &TextRequest) -> Result<String, SynthesisError> {
            self.0.clone()
        }
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let text = "First para.\n\n\n  Second para.  \r\n\r\nThird.";
        assert_eq!(split_paragraphs(text), vec!["First para.", "Second para.", "Third."]);
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let s = split_sentences("One. Two! Three? Four 3.5 stays");
        assert_eq!(s, vec!["One.", "Two!", "Three?", "Four 3.5 stays"]);
    }

    #[test]
    fn chunks_respect_bounds() {
        assert_eq!(split_chunks("short text"), vec!["short text"]);
        assert!(split_chunks("   ").is_empty());

        let long = "a".repeat(1000);
        let chunks = split_chunks(&long);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_CHUNK_CHARS));
    }

    #[test]
    fn story_segments_prefer_paragraphs_and_cap() {
        let text = (1..=10).map(|i| format!("Para {i}.")).collect::<Vec<_>>().join("\n\n");
        let segs = segment_story(&text, MAX_STORY_PARAGRAPHS);
        assert_eq!(segs.len(), 8);
        assert_eq!(segs[0], "Para 1.");
    }

    #[test]
    fn one_large_block_falls_back_to_sentences() {
        let text = "This is a long sentence that keeps going for a while. ".repeat(12);
        let segs = segment_story(&text, MAX_STORY_PARAGRAPHS);
        assert_eq!(segs.len(), 8);
        assert!(segs.iter().all(|s| s.ends_with('.')));
    }

    #[test]
    fn unpunctuated_block_falls_back_to_chunks() {
        let text = "word ".repeat(150);
        let segs = segment_story(&text, MAX_STORY_PARAGRAPHS);
        assert!(segs.len() >= 2);
    }

    #[test]
    fn word_chunks_merge_short_tail() {
        let text = (0..1050).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunk_words(&text, 500, 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].split_whitespace().count(), 550);

        let text = (0..1200).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        assert_eq!(chunk_words(&text, 500, 100).len(), 3);
        assert!(chunk_words("", 500, 100).is_empty());
    }

    #[test]
    fn html_is_stripped_and_entities_decoded() {
        let html = "<p>Caf\u{e9} &amp; bar</p><p>Line<br/>two &lt;3</p>";
        let text = html_to_text_basic(html);
        assert!(text.contains("Caf\u{e9} & bar\n"));
        assert!(text.contains("Line\ntwo <3"));
    }

    #[test]
    fn whitespace_normalized() {
        assert_eq!(normalize_whitespace("  a   b \n\n\n\n c\t d "), "a b\n\nc d");
    }

    #[tokio::test]
    async fn long_paragraphs_are_summarized() {
        let generator = FixedSummary(Ok("Short summary.".into()));
        let out = summarize_long(&generator, &RetryPolicy::immediate(2), vec!["tiny".into(), "x".repeat(400)]).await;
        assert_eq!(out, vec!["tiny".to_string(), "Short summary.".to_string()]);
    }

    #[tokio::test]
    async fn failed_summary_truncates() {
        let generator = FixedSummary(Err(SynthesisError::permanent("stub", "down")));
        let out = summarize_long(&generator, &RetryPolicy::immediate(2), vec!["y".repeat(900)]).await;
        assert_eq!(out[0].chars().count(), TRUNCATE_FALLBACK_CHARS);
    }
}
