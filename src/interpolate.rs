use crate::error::CompositionError;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use std::path::{Path, PathBuf};

fn open_rgb(path: &Path) -> Result<RgbImage, CompositionError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| CompositionError::Blend(format!("{}: {e}", path.display())))
}

// Pixelwise `(1 - alpha) * a + alpha * b`. `b` must match `a`'s size.
pub fn blend(a: &RgbImage, b: &RgbImage, alpha: f32) -> RgbImage {
    let alpha = alpha.clamp(0.0, 1.0);
    ImageBuffer::from_fn(a.width(), a.height(), |x, y| {
        let pa = a.get_pixel(x, y);
        let pb = b.get_pixel(x, y);
        let mix = |i: usize| ((1.0 - alpha) * pa[i] as f32 + alpha * pb[i] as f32).round() as u8;
        Rgb([mix(0), mix(1), mix(2)])
    })
}

fn blend_pair_blocking(
    first: &Path,
    second: &Path,
    count: usize,
    frames_dir: &Path,
) -> Result<Vec<PathBuf>, CompositionError> {
    let a = open_rgb(first)?;
    let mut b = open_rgb(second)?;
    if a.dimensions() != b.dimensions() {
        b = imageops::resize(&b, a.width(), a.height(), FilterType::Triangle);
    }

    let stem = first
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());

    let mut frames = Vec::with_capacity(count);
    for i in 1..=count {
        let alpha = i as f32 / (count + 1) as f32;
        let out = frames_dir.join(format!("interp_{stem}_{i}.png"));
        blend(&a, &b, alpha)
            .save(&out)
            .map_err(|e| CompositionError::Blend(format!("{}: {e}", out.display())))?;
        frames.push(out);
    }
    Ok(frames)
}

pub async fn interpolate_pair(
    first: &Path,
    second: &Path,
    count: usize,
    frames_dir: &Path,
) -> Result<Vec<PathBuf>, CompositionError> {
    let (first, second, frames_dir) = (first.to_path_buf(), second.to_path_buf(), frames_dir.to_path_buf());
    tokio::task::spawn_blocking(move || blend_pair_blocking(&first, &second, count, &frames_dir))
        .await
        .map_err(|e| CompositionError::Blend(format!("blend task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn blend_is_linear() {
        let a = solid(2, 2, 0);
        let b = solid(2, 2, 200);
        assert_eq!(blend(&a, &b, 0.0).get_pixel(0, 0)[0], 0);
        assert_eq!(blend(&a, &b, 0.25).get_pixel(1, 1)[0], 50);
        assert_eq!(blend(&a, &b, 1.0).get_pixel(0, 1)[0], 200);
    }

    #[tokio::test]
    async fn writes_requested_frames_with_even_alphas() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("2000.png");
        let second = tmp.path().join("2001.png");
        solid(4, 4, 0).save(&first).unwrap();
        // Different size forces a resize to the first image.
        solid(8, 6, 250).save(&second).unwrap();

        let frames = interpolate_pair(&first, &second, 4, tmp.path()).await.unwrap();

        assert_eq!(frames.len(), 4);
        assert!(frames[0].ends_with("interp_2000_1.png"));
        let mid = image::open(&frames[1]).unwrap().to_rgb8();
        assert_eq!(mid.dimensions(), (4, 4));
        assert_eq!(mid.get_pixel(0, 0)[0], 100);
    }

    #[tokio::test]
    async fn unreadable_input_is_blend_error() {
        let tmp = tempfile::tempdir().unwrap();
        let bogus = tmp.path().join("bogus.png");
        std::fs::write(&bogus, b"not a png").unwrap();
        let err = interpolate_pair(&bogus, &bogus, 2, tmp.path()).await.unwrap_err();
        assert!(matches!(err, CompositionError::Blend(_)));
    }
}
