use crate::config::Config;
use crate::{logi, logw};
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

const REQUIRED_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [&cfg.runs_dir, &cfg.background_music_dir] {
        ensure_dir(dir).await?;
    }
    Ok(())
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    if fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Ok(());
    }
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    logi(format!("Created directory: {}", dir.display()));
    Ok(())
}

async fn tool_available(name: &str) -> bool {
    match tokio::process::Command::new(name).arg("-version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

pub async fn missing_tools() -> Vec<&'static str> {
    let mut missing = Vec::new();
    for tool in REQUIRED_TOOLS {
        if !tool_available(tool).await {
            logw(format!("{tool} not found in PATH. Please install FFmpeg."));
            missing.push(*tool);
        }
    }
    missing
}
