//! Image preprocessing for classical OCR
//!
//! Grayscale, upscale, median denoise, adaptive binarization and projection
//! profile deskew, each toggled by `PreprocessConfig`. The pipeline never fails
//! on a decoded image: steps that cannot apply are skipped.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use imageproc::contrast::adaptive_threshold;
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::debug;

use crate::config::PreprocessConfig;
use crate::error::Result;

/// Largest skew (degrees) the deskew step searches
const MAX_SKEW_DEGREES: f32 = 5.0;
/// Search step (degrees)
const SKEW_STEP_DEGREES: f32 = 0.25;
/// Below this the image is left unrotated
const MIN_SKEW_DEGREES: f32 = 0.5;
const INK_THRESHOLD: u8 = 128;

/// Run the configured preprocessing steps
pub fn preprocess(image: &DynamicImage, config: &PreprocessConfig) -> DynamicImage {
    let binarize = config.binarize && config.block_radius > 0;
    let single_channel = config.denoise || binarize || config.deskew;

    if !config.grayscale && !single_channel {
        debug!("No single-channel steps enabled, keeping colour");
        return if config.upscale {
            upscale_dynamic(image, config.upscale_factor)
        } else {
            image.clone()
        };
    }
    if !config.grayscale {
        // Denoise, binarize and deskew need one channel
        debug!("Grayscale disabled, running the enabled steps on a luma copy");
    }

    let mut gray = image.to_luma8();

    if config.upscale && config.upscale_factor > 1 {
        gray = upscale(&gray, config.upscale_factor);
    }

    if config.denoise {
        gray = median_filter(&gray, 1, 1);
    }

    if binarize {
        gray = adaptive_threshold(&gray, config.block_radius);
    }

    if config.deskew {
        if let Some(angle) = detect_skew_angle(&gray) {
            debug!(angle, "Deskewing receipt");
            gray = rotate_about_center(
                &gray,
                -angle.to_radians(),
                Interpolation::Nearest,
                Luma([255u8]),
            );
        }
    }

    DynamicImage::ImageLuma8(gray)
}

fn upscale(gray: &GrayImage, factor: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    image::imageops::resize(
        gray,
        w.saturating_mul(factor),
        h.saturating_mul(factor),
        FilterType::CatmullRom,
    )
}

fn upscale_dynamic(image: &DynamicImage, factor: u32) -> DynamicImage {
    if factor <= 1 {
        return image.clone();
    }
    image.resize_exact(
        image.width().saturating_mul(factor),
        image.height().saturating_mul(factor),
        FilterType::CatmullRom,
    )
}

/// Estimate skew via the horizontal projection profile
///
/// Candidate angles in [-5, 5] degrees are scored by how sharply the row ink
/// counts change between adjacent rows; text lines aligned with the rows give
/// the crispest profile. Returns `None` for tiny or nearly blank images and
/// for negligible angles.
pub fn detect_skew_angle(img: &GrayImage) -> Option<f32> {
    let (w, h) = img.dimensions();
    if w < 50 || h < 50 {
        return None;
    }

    let dark = img.pixels().filter(|p| p.0[0] < INK_THRESHOLD).count();
    if (dark as f64) / ((w as f64) * (h as f64)) < 0.02 {
        return None;
    }

    let mut best_angle = 0.0f32;
    let mut best_score = f64::NEG_INFINITY;
    let steps = (2.0 * MAX_SKEW_DEGREES / SKEW_STEP_DEGREES).round() as i32;
    for i in 0..=steps {
        let angle = -MAX_SKEW_DEGREES + i as f32 * SKEW_STEP_DEGREES;
        let score = projection_score(img, angle);
        // Ties go to the smaller correction
        if score > best_score || (score == best_score && angle.abs() < best_angle.abs()) {
            best_score = score;
            best_angle = angle;
        }
    }

    if best_angle.abs() < MIN_SKEW_DEGREES {
        None
    } else {
        Some(best_angle)
    }
}

/// Sum of squared differences between adjacent row projections at `angle_deg`
fn projection_score(img: &GrayImage, angle_deg: f32) -> f64 {
    let (w, h) = img.dimensions();
    let tan_a = (angle_deg as f64).to_radians().tan();
    let mut projection = vec![0u32; h as usize];

    for y in 0..h {
        let shift = (y as f64 * tan_a).round() as i64;
        let mut count = 0u32;
        // Every 4th column is plenty for a profile
        for x in (0..w).step_by(4) {
            let sx = x as i64 + shift;
            if sx >= 0 && sx < w as i64 && img.get_pixel(sx as u32, y).0[0] < INK_THRESHOLD {
                count += 1;
            }
        }
        projection[y as usize] = count;
    }

    projection
        .windows(2)
        .map(|pair| {
            let diff = pair[1] as f64 - pair[0] as f64;
            diff * diff
        })
        .sum()
}

/// Encode an image as PNG for handing to OCR subprocesses
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    /// White page with horizontal black bars every 20 rows
    fn striped_page(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |_, y| {
            if y % 20 < 6 {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        })
    }

    #[test]
    fn test_full_pipeline_outputs_upscaled_binary_gray() {
        let rgb = RgbImage::from_fn(60, 40, |x, _| image::Rgb([(x * 4) as u8, 120, 200]));
        let out = preprocess(&DynamicImage::ImageRgb8(rgb), &PreprocessConfig::default());

        assert_eq!(out.width(), 120);
        assert_eq!(out.height(), 80);
        let gray = out.as_luma8().expect("grayscale output");
        assert!(gray.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_disabled_steps_are_skipped() {
        let config = only("none");
        let rgb = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        let out = preprocess(&rgb, &config);
        assert_eq!(out, rgb);
    }

    fn only(step: &str) -> PreprocessConfig {
        PreprocessConfig {
            grayscale: step == "grayscale",
            upscale: step == "upscale",
            denoise: step == "denoise",
            binarize: step == "binarize",
            deskew: step == "deskew",
            ..Default::default()
        }
    }

    fn gradient() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(60, 40, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 6) as u8, 200])
        }))
    }

    fn is_binary(img: &GrayImage) -> bool {
        img.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255)
    }

    #[test]
    fn test_grayscale_alone() {
        let out = preprocess(&gradient(), &only("grayscale"));
        let gray = out.as_luma8().expect("grayscale output");
        assert_eq!(gray.dimensions(), (60, 40));
        assert!(!is_binary(gray));
    }

    #[test]
    fn test_upscale_alone_keeps_colour() {
        let out = preprocess(&gradient(), &only("upscale"));
        assert!(out.as_rgb8().is_some());
        assert_eq!((out.width(), out.height()), (120, 80));
    }

    #[test]
    fn test_binarize_alone_runs_without_grayscale() {
        let out = preprocess(&gradient(), &only("binarize"));
        let gray = out.as_luma8().expect("single channel output");
        assert_eq!(gray.dimensions(), (60, 40));
        assert!(is_binary(gray));
    }

    #[test]
    fn test_denoise_alone_runs_without_grayscale() {
        let mut page = RgbImage::from_pixel(30, 30, image::Rgb([255, 255, 255]));
        page.put_pixel(15, 15, image::Rgb([0, 0, 0]));
        let out = preprocess(&DynamicImage::ImageRgb8(page), &only("denoise"));
        let gray = out.as_luma8().expect("single channel output");
        assert_eq!(gray.get_pixel(15, 15).0[0], 255);
    }

    #[test]
    fn test_deskew_alone_runs_without_grayscale() {
        let page = DynamicImage::ImageLuma8(striped_page(200, 200)).to_rgb8();
        let out = preprocess(&DynamicImage::ImageRgb8(page), &only("deskew"));
        let gray = out.as_luma8().expect("single channel output");
        assert_eq!(gray, &striped_page(200, 200));
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let img = DynamicImage::ImageLuma8(striped_page(80, 80));
        let config = PreprocessConfig::default();
        assert_eq!(preprocess(&img, &config), preprocess(&img, &config));
    }

    #[test]
    fn test_tiny_image_does_not_fail() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        let out = preprocess(&img, &PreprocessConfig::default());
        assert_eq!(out.width(), 2);
    }

    #[test]
    fn test_straight_page_has_no_skew() {
        assert_eq!(detect_skew_angle(&striped_page(200, 200)), None);
    }

    #[test]
    fn test_blank_page_has_no_skew() {
        let blank = GrayImage::from_pixel(200, 200, Luma([255u8]));
        assert_eq!(detect_skew_angle(&blank), None);
    }

    #[test]
    fn test_encode_png_round_trips() {
        let img = DynamicImage::ImageLuma8(striped_page(20, 20));
        let bytes = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_luma8(), img.to_luma8());
    }
}
