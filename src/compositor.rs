use crate::config::TimelapseConfig;
use crate::error::CompositionError;
use crate::ffmpeg::MediaTool;
use crate::interpolate::interpolate_pair;
use crate::model::{FinalVideo, MediaArtifact, ParagraphUnit, Stage};
use crate::workspace::RunWorkspace;
use crate::{logi, logok, logw};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone)]
pub struct TimelapseSegment {
    pub segment: MediaArtifact,
    pub units: Vec<usize>,
    pub transitions: Vec<usize>,
}

pub struct Compositor<'a> {
    tool: &'a dyn MediaTool,
    ws: &'a RunWorkspace,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CompositionError + '_ {
    move |source| CompositionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// `file '...'` line for the concat demuxer. Paths are made absolute since
// the demuxer resolves relative entries against the list file.
fn concat_entry(path: &Path) -> Result<String, CompositionError> {
    let abs = std::path::absolute(path).map_err(io_err(path))?;
    let escaped = abs.display().to_string().replace('\'', "'\\''");
    Ok(format!("file '{escaped}'"))
}

pub fn concat_list(segments: &[PathBuf]) -> Result<String, CompositionError> {
    let mut out = String::new();
    for seg in segments {
        out.push_str(&concat_entry(seg)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn timelapse_timeline(mains: &[PathBuf], transitions: &[Vec<PathBuf>], cfg: &TimelapseConfig) -> Vec<(PathBuf, f64)> {
    let mut timeline = Vec::new();
    for (k, main) in mains.iter().enumerate() {
        timeline.push((main.clone(), cfg.main_frame_duration));
        if let Some(frames) = transitions.get(k) {
            timeline.extend(frames.iter().map(|f| (f.clone(), cfg.inter_frame_duration)));
        }
    }
    timeline
}

// Concat-demuxer list with per-entry durations. The last file is repeated
// so its duration is honored.
pub fn slideshow_list(timeline: &[(PathBuf, f64)]) -> Result<String, CompositionError> {
    let mut out = String::new();
    for (path, secs) in timeline {
        out.push_str(&concat_entry(path)?);
        out.push_str(&format!("\nduration {secs:.3}\n"));
    }
    if let Some((last, _)) = timeline.last() {
        out.push_str(&concat_entry(last)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn segments_in_order(units: &[ParagraphUnit]) -> (Vec<PathBuf>, Vec<usize>) {
    let mut composed: Vec<&ParagraphUnit> = units.iter().filter(|u| u.segment.is_some()).collect();
    composed.sort_by_key(|u| u.index);
    composed
        .into_iter()
        .filter_map(|u| u.segment.as_ref().map(|s| (s.path.clone(), u.index)))
        .unzip()
}

impl<'a> Compositor<'a> {
    pub fn new(tool: &'a dyn MediaTool, ws: &'a RunWorkspace) -> Self {
        Self { tool, ws }
    }

    // Render one narrated unit. The audio length sets the segment length.
    pub async fn compose(&self, unit: &ParagraphUnit) -> Result<MediaArtifact, CompositionError> {
        let Some(audio) = unit.audio.as_ref().filter(|_| unit.is_complete()) else {
            return Err(CompositionError::Incomplete(unit.index));
        };
        let duration = self.tool.probe_duration(&audio.path).await?;
        let out = self.ws.segment_path(unit.index);

        if let Some(video) = &unit.video {
            match self.tool.render_clip(&video.path, &audio.path, duration, &out).await {
                Ok(()) => return Ok(MediaArtifact::new(out, Stage::Composition, unit.index)),
                Err(e) if unit.image.is_some() => {
                    logw(format!("Unit {} clip render failed, using still: {e}", unit.number()));
                }
                Err(e) => return Err(e),
            }
        }

        let image = unit.image.as_ref().ok_or(CompositionError::Incomplete(unit.index))?;
        self.tool.render_still(&image.path, &audio.path, duration, &out).await?;
        Ok(MediaArtifact::new(out, Stage::Composition, unit.index))
    }

    pub async fn compose_all(&self, units: &mut [ParagraphUnit]) -> usize {
        let mut composed = 0;
        for unit in units.iter_mut().filter(|u| u.is_complete()) {
            match self.compose(unit).await {
                Ok(segment) => {
                    logok(format!("Segment {} rendered", unit.number()));
                    unit.segment = Some(segment);
                    composed += 1;
                }
                Err(e) => {
                    logw(format!("Unit {} composition failed: {e}", unit.number()));
                    unit.record_failure(Stage::Composition, e.to_string());
                }
            }
        }
        composed
    }

    pub async fn concatenate(
        &self,
        segments: &[PathBuf],
        units: Vec<usize>,
        music: Option<&Path>,
        has_speech: bool,
    ) -> Result<FinalVideo, CompositionError> {
        if segments.is_empty() {
            return Err(CompositionError::NoSegments);
        }

        let list_path = self.ws.concat_list_path();
        fs::write(&list_path, concat_list(segments)?)
            .await
            .map_err(io_err(&list_path))?;

        let final_path = self.ws.final_video_path();
        let Some(music) = music else {
            self.tool.concat(&list_path, &final_path).await?;
            logok(format!("Final video: {}", final_path.display()));
            return Ok(FinalVideo {
                path: final_path,
                units,
                background_mixed: false,
            });
        };

        let joined = self.ws.concat_tmp_path();
        self.tool.concat(&list_path, &joined).await?;

        let background_mixed = match self.tool.mix_background(&joined, music, has_speech, &final_path).await {
            Ok(()) => {
                logi(format!("Mixed background music: {}", music.display()));
                let _ = fs::remove_file(&joined).await;
                true
            }
            Err(e) => {
                logw(format!("Background mix failed, keeping narration only: {e}"));
                fs::rename(&joined, &final_path).await.map_err(io_err(&final_path))?;
                false
            }
        };

        logok(format!("Final video: {}", final_path.display()));
        Ok(FinalVideo {
            path: final_path,
            units,
            background_mixed,
        })
    }

    // Slideshow of the complete year images with cross-fades between
    // neighbours. Missing years are bridged by the nearest pair; a failed
    // blend becomes a hard cut.
    pub async fn compose_timelapse(
        &self,
        units: &mut [ParagraphUnit],
        cfg: &TimelapseConfig,
    ) -> Result<TimelapseSegment, CompositionError> {
        let mut available: Vec<(usize, PathBuf)> = units
            .iter()
            .filter(|u| u.is_complete())
            .filter_map(|u| u.image.as_ref().map(|img| (u.index, img.path.clone())))
            .collect();
        available.sort_by_key(|(index, _)| *index);
        if available.is_empty() {
            return Err(CompositionError::NoSegments);
        }

        let frames_dir = self.ws.frames_dir();
        let mut transitions = Vec::new();
        for pair in available.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            match interpolate_pair(&from.1, &to.1, cfg.frames_per_transition, &frames_dir).await {
                Ok(frames) => transitions.push(frames),
                Err(e) => {
                    logw(format!("Transition after unit {} failed, hard cut: {e}", from.0 + 1));
                    if let Some(unit) = units.iter_mut().find(|u| u.index == from.0) {
                        unit.record_failure(Stage::Interpolation, e.to_string());
                    }
                    transitions.push(Vec::new());
                }
            }
        }

        let mains: Vec<PathBuf> = available.iter().map(|(_, p)| p.clone()).collect();
        let timeline = timelapse_timeline(&mains, &transitions, cfg);
        let list_path = self.ws.slideshow_list_path();
        fs::write(&list_path, slideshow_list(&timeline)?)
            .await
            .map_err(io_err(&list_path))?;

        let out = self.ws.timelapse_segment_path();
        self.tool.render_slideshow(&list_path, &out).await?;

        let indices: Vec<usize> = available.iter().map(|(i, _)| *i).collect();
        let segment = MediaArtifact::new(out, Stage::Composition, indices[0]);
        for unit in units.iter_mut().filter(|u| indices.contains(&u.index)) {
            unit.segment = Some(segment.clone());
        }
        logok(format!(
            "Time-lapse slideshow: {} year(s), {} frame(s)",
            indices.len(),
            timeline.len()
        ));

        Ok(TimelapseSegment {
            segment,
            units: indices,
            transitions: transitions.iter().map(Vec::len).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::stubs::{Call, StubTool};
    use crate::model::ParagraphSeed;
    use crate::synth::stubs::write_png;

    async fn workspace() -> (tempfile::TempDir, RunWorkspace) {
        let tmp = tempfile::tempdir().unwrap();
        let ws = RunWorkspace::create(tmp.path()).await.unwrap();
        (tmp, ws)
    }

    fn narrated_unit(ws: &RunWorkspace, index: usize, with_audio: bool) -> ParagraphUnit {
        let mut unit = ParagraphUnit::from_seed(index, &ParagraphSeed::new("p"), true);
        let image = ws.image_path(index, None);
        write_png(&image);
        unit.image = Some(MediaArtifact::new(image, Stage::TextToImage, index));
        if with_audio {
            let audio = ws.audio_path(index);
            std::fs::write(&audio, b"mp3").unwrap();
            unit.audio = Some(MediaArtifact::new(audio, Stage::TextToSpeech, index));
        }
        unit
    }

    #[tokio::test]
    async fn still_segment_lasts_as_long_as_audio() {
        let (_tmp, ws) = workspace().await;
        let tool = StubTool { duration: 6.5, ..Default::default() };
        let compositor = Compositor::new(&tool, &ws);

        let segment = compositor.compose(&narrated_unit(&ws, 0, true)).await.unwrap();

        assert!(segment.path.ends_with("paragraph_videos/paragraph_1.mp4"));
        assert!(matches!(tool.calls()[0], Call::Still { duration, .. } if duration == 6.5));
    }

    #[tokio::test]
    async fn synthesized_video_is_fitted_to_audio() {
        let (_tmp, ws) = workspace().await;
        let tool = StubTool::default();
        let compositor = Compositor::new(&tool, &ws);
        let mut unit = narrated_unit(&ws, 0, true);
        unit.video = Some(MediaArtifact::new(ws.video_path(0), Stage::ImageToVideo, 0));

        compositor.compose(&unit).await.unwrap();

        assert!(matches!(&tool.calls()[0], Call::Clip { video, duration } if video.ends_with("videos/paragraph_1.mp4") && *duration == 4.2));
    }

    #[tokio::test]
    async fn incomplete_unit_is_never_composed() {
        let (_tmp, ws) = workspace().await;
        let tool = StubTool::default();
        let compositor = Compositor::new(&tool, &ws);
        let mut units = vec![narrated_unit(&ws, 0, true), narrated_unit(&ws, 1, false)];

        assert!(matches!(
            compositor.compose(&units[1]).await,
            Err(CompositionError::Incomplete(1))
        ));
        assert_eq!(compositor.compose_all(&mut units).await, 1);
        assert!(units[1].segment.is_none());
        assert_eq!(tool.calls().len(), 1);
    }

    #[tokio::test]
    async fn concatenation_keeps_index_order_and_mixes_music() {
        let (tmp, ws) = workspace().await;
        let tool = StubTool::default();
        let compositor = Compositor::new(&tool, &ws);
        let mut units = vec![narrated_unit(&ws, 2, true), narrated_unit(&ws, 0, true)];
        compositor.compose_all(&mut units).await;
        let music = tmp.path().join("bgm.mp3");
        std::fs::write(&music, b"mp3").unwrap();

        let (segments, indices) = segments_in_order(&units);
        let video = compositor.concatenate(&segments, indices, Some(&music), true).await.unwrap();

        assert_eq!(video.units, vec![0, 2]);
        assert!(video.background_mixed);
        assert!(video.path.exists());
        let list = std::fs::read_to_string(ws.concat_list_path()).unwrap();
        let first = list.find("paragraph_1.mp4").unwrap();
        let third = list.find("paragraph_3.mp4").unwrap();
        assert!(first < third);
        assert!(!ws.concat_tmp_path().exists());
    }

    #[tokio::test]
    async fn failed_mix_falls_back_to_narration_only() {
        let (tmp, ws) = workspace().await;
        let tool = StubTool { fail_mix: true, ..Default::default() };
        let compositor = Compositor::new(&tool, &ws);
        let seg = ws.segment_path(0);
        std::fs::write(&seg, b"seg").unwrap();

        let video = compositor
            .concatenate(&[seg], vec![0], Some(&tmp.path().join("bgm.mp3")), true)
            .await
            .unwrap();

        assert!(!video.background_mixed);
        assert!(video.path.exists());
    }

    #[tokio::test]
    async fn concat_failure_is_fatal_and_leaves_no_output() {
        let (_tmp, ws) = workspace().await;
        let tool = StubTool { fail_concat: true, ..Default::default() };
        let compositor = Compositor::new(&tool, &ws);

        let err = compositor
            .concatenate(&[ws.segment_path(0)], vec![0], None, true)
            .await
            .unwrap_err();

        assert!(matches!(err, CompositionError::ToolFailed { .. }));
        assert!(!ws.final_video_path().exists());
        assert!(matches!(
            compositor.concatenate(&[], vec![], None, true).await,
            Err(CompositionError::NoSegments)
        ));
    }

    #[test]
    fn concat_entries_escape_quotes() {
        let list = concat_list(&[PathBuf::from("/tmp/it's.mp4")]).unwrap();
        assert_eq!(list, "file '/tmp/it'\\''s.mp4'\n");
    }

    #[test]
    fn timeline_interleaves_transitions() {
        let cfg = TimelapseConfig {
            frames_per_transition: 2,
            main_frame_duration: 1.0,
            inter_frame_duration: 0.03,
        };
        let mains = vec![PathBuf::from("/a.png"), PathBuf::from("/b.png")];
        let transitions = vec![vec![PathBuf::from("/t1.png"), PathBuf::from("/t2.png")]];

        let timeline = timelapse_timeline(&mains, &transitions, &cfg);

        let names: Vec<_> = timeline.iter().map(|(p, _)| p.display().to_string()).collect();
        assert_eq!(names, vec!["/a.png", "/t1.png", "/t2.png", "/b.png"]);
        assert_eq!(timeline[1].1, 0.03);

        let list = slideshow_list(&timeline).unwrap();
        assert_eq!(list.matches("duration").count(), 4);
        assert!(list.ends_with("file '/b.png'\n"));
    }

    fn year_unit(ws: &RunWorkspace, index: usize, year: &str, image: bool) -> ParagraphUnit {
        let mut unit = ParagraphUnit::from_seed(index, &ParagraphSeed::labeled(year, year), false);
        if image {
            let path = ws.image_path(index, Some(year));
            write_png(&path);
            unit.image = Some(MediaArtifact::new(path, Stage::TextToImage, index));
        }
        unit
    }

    fn cfg(frames: usize) -> TimelapseConfig {
        TimelapseConfig {
            frames_per_transition: frames,
            ..TimelapseConfig::default()
        }
    }

    #[tokio::test]
    async fn missing_year_is_bridged_by_nearest_pair() {
        let (_tmp, ws) = workspace().await;
        let tool = StubTool::default();
        let compositor = Compositor::new(&tool, &ws);
        let mut units = vec![
            year_unit(&ws, 0, "2000", true),
            year_unit(&ws, 1, "2001", false),
            year_unit(&ws, 2, "2002", true),
        ];

        let lapse = compositor.compose_timelapse(&mut units, &cfg(3)).await.unwrap();

        assert_eq!(lapse.units, vec![0, 2]);
        assert_eq!(lapse.transitions, vec![3]);
        assert!(units[1].segment.is_none());
        let list = std::fs::read_to_string(ws.slideshow_list_path()).unwrap();
        let first = list.find("2000.png").unwrap();
        let bridge = list.find("interp_2000_3.png").unwrap();
        let last = list.find("2002.png").unwrap();
        assert!(first < bridge && bridge < last);
        assert!(matches!(&tool.calls()[0], Call::Slideshow { .. }));
    }

    #[tokio::test]
    async fn undecodable_image_becomes_hard_cut() {
        let (_tmp, ws) = workspace().await;
        let tool = StubTool::default();
        let compositor = Compositor::new(&tool, &ws);
        let mut units = vec![year_unit(&ws, 0, "2000", true), year_unit(&ws, 1, "2001", true)];
        std::fs::write(&units[1].image.as_ref().unwrap().path, b"not a png").unwrap();

        let lapse = compositor.compose_timelapse(&mut units, &cfg(4)).await.unwrap();

        assert_eq!(lapse.units, vec![0, 1]);
        assert_eq!(lapse.transitions, vec![0]);
        assert_eq!(units[0].failures[0].stage, Stage::Interpolation);
        assert!(units[1].failures.is_empty());
        let list = std::fs::read_to_string(ws.slideshow_list_path()).unwrap();
        assert!(!list.contains("interp_"));
    }
}
