use crate::config::VideoConfig;
use crate::error::CompositionError;
use crate::logi;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const MIN_DURATION_SECS: f64 = 0.1;

#[async_trait]
pub trait MediaTool: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> Result<f64, CompositionError>;

    async fn render_still(&self, image: &Path, audio: &Path, duration: f64, out: &Path) -> Result<(), CompositionError>;

    async fn render_clip(&self, video: &Path, audio: &Path, duration: f64, out: &Path) -> Result<(), CompositionError>;

    async fn render_slideshow(&self, list_file: &Path, out: &Path) -> Result<(), CompositionError>;

    async fn concat(&self, list_file: &Path, out: &Path) -> Result<(), CompositionError>;

    async fn mix_background(&self, video: &Path, music: &Path, has_speech: bool, out: &Path) -> Result<(), CompositionError>;
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    video: VideoConfig,
    timeout: Duration,
}

impl Ffmpeg {
    pub fn new(video: VideoConfig, timeout_secs: u64) -> Self {
        Self {
            video,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    async fn run_cmd(&self, tool: &str, args: &[String]) -> Result<Vec<u8>, CompositionError> {
        let mut cmd = Command::new(tool);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| CompositionError::Spawn {
                tool: tool.to_string(),
                source,
            })?,
            Err(_) => {
                return Err(CompositionError::TimedOut {
                    tool: tool.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.chars().rev().take(600).collect::<Vec<_>>().into_iter().rev().collect();
            return Err(CompositionError::ToolFailed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: tail.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn ffmpeg(&self, args: Vec<String>, out: &Path) -> Result<(), CompositionError> {
        let mut full = strings(&["-y", "-hide_banner", "-loglevel", "error"]);
        full.extend(args);
        full.push(out.display().to_string());
        self.run_cmd("ffmpeg", &full).await?;

        match tokio::fs::metadata(out).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(CompositionError::MissingOutput(out.to_path_buf())),
        }
    }

    fn encode_args(&self) -> Vec<String> {
        strings(&[
            "-c:v", "libx264", "-pix_fmt", "yuv420p", "-preset", "veryfast", "-crf", "22", "-c:a", "aac", "-b:a",
            "192k", "-movflags", "+faststart",
        ])
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

// Fill the target frame: a blurred, cropped copy behind the letterboxed
// original. Reads `[0:v]`, writes `[v]`.
pub fn fill_filter(video: &VideoConfig) -> String {
    let (w, h, fps) = (video.width, video.height, video.fps);
    format!(
        "[0:v]split[bgsrc][fgsrc];\
         [bgsrc]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},boxblur=10:1[bg];\
         [fgsrc]scale={w}:{h}:force_original_aspect_ratio=decrease[fg];\
         [bg][fg]overlay=(W-w)/2:(H-h)/2,setsar=1,fps={fps},format=yuv420p[v]"
    )
}

pub fn pad_filter(video: &VideoConfig) -> String {
    let (w, h, fps) = (video.width, video.height, video.fps);
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1,fps={fps},format=yuv420p"
    )
}

pub fn parse_duration(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > MIN_DURATION_SECS)
}

#[async_trait]
impl MediaTool for Ffmpeg {
    async fn probe_duration(&self, path: &Path) -> Result<f64, CompositionError> {
        if tokio::fs::metadata(path).await.is_err() {
            return Err(CompositionError::MissingInput(path.to_path_buf()));
        }
        let mut args = strings(&["-v", "error", "-show_entries", "format=duration", "-of", "default=noprint_wrappers=1:nokey=1"]);
        args.push(path_arg(path));
        let stdout = self.run_cmd("ffprobe", &args).await?;
        parse_duration(&String::from_utf8_lossy(&stdout))
            .ok_or_else(|| CompositionError::InvalidDuration(path.to_path_buf()))
    }

    async fn render_still(&self, image: &Path, audio: &Path, duration: f64, out: &Path) -> Result<(), CompositionError> {
        let mut args = strings(&["-loop", "1", "-i"]);
        args.push(path_arg(image));
        args.push("-i".into());
        args.push(path_arg(audio));
        args.extend(strings(&["-filter_complex"]));
        args.push(fill_filter(&self.video));
        args.extend(strings(&["-map", "[v]", "-map", "1:a", "-tune", "stillimage"]));
        args.extend(self.encode_args());
        args.push("-t".into());
        args.push(format!("{duration:.3}"));
        self.ffmpeg(args, out).await
    }

    async fn render_clip(&self, video: &Path, audio: &Path, duration: f64, out: &Path) -> Result<(), CompositionError> {
        let mut args = strings(&["-stream_loop", "-1", "-i"]);
        args.push(path_arg(video));
        args.push("-i".into());
        args.push(path_arg(audio));
        args.push("-filter_complex".into());
        args.push(fill_filter(&self.video));
        args.extend(strings(&["-map", "[v]", "-map", "1:a"]));
        args.extend(self.encode_args());
        args.push("-t".into());
        args.push(format!("{duration:.3}"));
        self.ffmpeg(args, out).await
    }

    async fn render_slideshow(&self, list_file: &Path, out: &Path) -> Result<(), CompositionError> {
        let mut args = strings(&["-f", "concat", "-safe", "0", "-i"]);
        args.push(path_arg(list_file));
        args.push("-vf".into());
        args.push(pad_filter(&self.video));
        args.push("-an".into());
        args.extend(self.encode_args());
        self.ffmpeg(args, out).await
    }

    async fn concat(&self, list_file: &Path, out: &Path) -> Result<(), CompositionError> {
        logi(format!("Concatenating segments from {}", list_file.display()));
        let mut args = strings(&["-f", "concat", "-safe", "0", "-i"]);
        args.push(path_arg(list_file));
        args.push("-vf".into());
        args.push(pad_filter(&self.video));
        args.extend(self.encode_args());
        self.ffmpeg(args, out).await
    }

    async fn mix_background(&self, video: &Path, music: &Path, has_speech: bool, out: &Path) -> Result<(), CompositionError> {
        let mut args = vec!["-i".to_string(), path_arg(video)];
        if has_speech {
            args.push("-i".into());
            args.push(path_arg(music));
            args.extend(strings(&[
                "-filter_complex",
                "[0:a]volume=2.5[a0];[1:a]volume=0.1[a1];[a0][a1]amix=inputs=2:duration=first:dropout_transition=2[a]",
                "-map",
                "0:v",
                "-map",
                "[a]",
            ]));
        } else {
            args.extend(strings(&["-stream_loop", "-1", "-i"]));
            args.push(path_arg(music));
            args.extend(strings(&["-map", "0:v", "-map", "1:a", "-shortest"]));
        }
        args.extend(strings(&["-c:v", "copy", "-c:a", "aac", "-b:a", "192k", "-movflags", "+faststart"]));
        self.ffmpeg(args, out).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing_rejects_tiny_and_garbage() {
        assert_eq!(parse_duration("12.480000\n"), Some(12.48));
        assert_eq!(parse_duration("0.05"), None);
        assert_eq!(parse_duration("N/A"), None);
    }

    #[test]
    fn filters_target_configured_frame() {
        let video = VideoConfig::default();
        let fill = fill_filter(&video);
        assert!(fill.contains("crop=1080:1920"));
        assert!(fill.contains("fps=30"));
        assert!(fill.ends_with("[v]"));
        assert!(pad_filter(&video).contains("pad=1080:1920"));
    }

    #[tokio::test]
    async fn missing_tool_is_a_spawn_error() {
        let tool = Ffmpeg::new(VideoConfig::default(), 5);
        let err = tool
            .run_cmd("definitely-not-a-real-binary-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CompositionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn probe_of_missing_file_is_missing_input() {
        let tool = Ffmpeg::new(VideoConfig::default(), 5);
        let err = tool.probe_duration(Path::new("/nonexistent/a.mp3")).await.unwrap_err();
        assert!(matches!(err, CompositionError::MissingInput(_)));
    }
}
