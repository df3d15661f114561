use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("content source returned no paragraphs")]
    Empty,
    #[error("invalid source request: {0}")]
    InvalidRequest(String),
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("text generation failed: {0}")]
    Generation(#[from] SynthesisError),
}

// Failure from an external synthesis provider.
//
// Transient failures (rate limits, timeouts, 5xx) are retried by
// [`crate::retry::with_retry`]; permanent ones propagate immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("{provider}: transient failure: {message}")]
    Transient { provider: String, message: String },
    #[error("{provider}: permanent failure: {message}")]
    Permanent { provider: String, message: String },
}

impl SynthesisError {
    pub fn transient(provider: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn permanent(provider: &str, message: impl Into<String>) -> Self {
        Self::Permanent {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(400).collect();
        let message = format!("HTTP {status}: {snippet}");
        if matches!(status, 408 | 429 | 500 | 502 | 503 | 504) {
            Self::transient(provider, message)
        } else {
            Self::permanent(provider, message)
        }
    }

    pub fn from_reqwest(provider: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::transient(provider, err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(provider, status.as_u16(), "")
        } else {
            Self::permanent(provider, err.to_string())
        }
    }

    pub fn from_io(provider: &str, path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::permanent(provider, format!("{}: {err}", path.display()))
    }
}

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("{tool} timed out after {secs}s")]
    TimedOut { tool: String, secs: u64 },
    #[error("invalid duration for {0}")]
    InvalidDuration(PathBuf),
    #[error("missing input {0}")]
    MissingInput(PathBuf),
    #[error("output not produced: {0}")]
    MissingOutput(PathBuf),
    #[error("unit {0} has no composable media")]
    Incomplete(usize),
    #[error("no segments to concatenate")]
    NoSegments,
    #[error("frame blend failed: {0}")]
    Blend(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload disabled: {0}")]
    Disabled(String),
    #[error("video file not found: {0}")]
    MissingFile(PathBuf),
    #[error("oauth token refresh failed: {0}")]
    Auth(String),
    #[error("upload request failed: {0}")]
    Request(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("workspace error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("no paragraph unit completed ({attempted} attempted)")]
    NoCompleteUnits { attempted: usize },
    #[error("composition failed: {0}")]
    Composition(#[from] CompositionError),
    #[error("run timed out after {0}s")]
    TimedOut(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(SynthesisError::from_status("openai", status, "").is_transient());
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 401, 403, 404, 422] {
            let err = SynthesisError::from_status("openai", status, "bad prompt");
            assert!(!err.is_transient());
            assert!(err.to_string().contains("bad prompt"));
        }
    }
}
