//! Blank-tile detection.
//!
//! Both providers answer HTTP 200 with a placeholder tile instead of an
//! error for dates that predate their coverage at high zoom. The
//! classifier samples a coarse grid of pixels and flags payloads that are
//! overwhelmingly near-white or near-black, or whose sampled colors
//! barely vary at all.
//!
//! The thresholds were tuned against observed provider placeholders;
//! treat them as tunables, not derived values.

use image::GenericImageView;

use crate::provider::ProviderError;

/// Sample grid dimension; 8x8 = 64 sampled pixels per tile.
pub const BLANK_SAMPLE_GRID: u32 = 8;

/// Channel value at or above which a sample counts as near-white.
pub const NEAR_WHITE: u8 = 250;

/// Channel value at or below which a sample counts as near-black.
pub const NEAR_BLACK: u8 = 5;

/// Fraction of near-white/near-black samples above which a tile is blank.
pub const BLANK_FRACTION: f64 = 0.9;

/// Luma variance below which a tile is blank regardless of color.
pub const VARIANCE_THRESHOLD: f64 = 40.0;

/// Classify a fetched tile payload as blank or real imagery.
///
/// Payloads that do not decode as an image are decode errors, not blanks.
pub fn is_blank_tile(payload: &[u8]) -> Result<bool, ProviderError> {
    let img = image::load_from_memory(payload)
        .map_err(|e| ProviderError::Decode(format!("tile payload not an image: {}", e)))?;

    let (width, height) = img.dimensions();
    if width < BLANK_SAMPLE_GRID || height < BLANK_SAMPLE_GRID {
        // Degenerate payloads are treated as placeholders.
        return Ok(true);
    }

    let mut extreme = 0usize;
    let mut lumas: Vec<f64> = Vec::with_capacity((BLANK_SAMPLE_GRID * BLANK_SAMPLE_GRID) as usize);

    for gy in 0..BLANK_SAMPLE_GRID {
        for gx in 0..BLANK_SAMPLE_GRID {
            // Cell centers, so a uniform border cannot dominate.
            let x = (2 * gx + 1) * width / (2 * BLANK_SAMPLE_GRID);
            let y = (2 * gy + 1) * height / (2 * BLANK_SAMPLE_GRID);
            let [r, g, b, _] = img.get_pixel(x, y).0;

            if r >= NEAR_WHITE && g >= NEAR_WHITE && b >= NEAR_WHITE {
                extreme += 1;
            } else if r <= NEAR_BLACK && g <= NEAR_BLACK && b <= NEAR_BLACK {
                extreme += 1;
            }
            lumas.push(0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64);
        }
    }

    let samples = lumas.len();
    if extreme as f64 > BLANK_FRACTION * samples as f64 {
        return Ok(true);
    }

    let mean = lumas.iter().sum::<f64>() / samples as f64;
    let variance = lumas.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / samples as f64;
    Ok(variance < VARIANCE_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn solid(color: [u8; 4]) -> Vec<u8> {
        encode(RgbaImage::from_pixel(256, 256, Rgba(color)))
    }

    fn checkerboard() -> Vec<u8> {
        let img = RgbaImage::from_fn(256, 256, |x, y| {
            if (x / 16 + y / 16) % 2 == 0 {
                Rgba([30, 90, 40, 255])
            } else {
                Rgba([180, 200, 120, 255])
            }
        });
        encode(img)
    }

    #[test]
    fn test_all_white_is_blank() {
        assert!(is_blank_tile(&solid([255, 255, 255, 255])).unwrap());
    }

    #[test]
    fn test_all_black_is_blank() {
        assert!(is_blank_tile(&solid([0, 0, 0, 255])).unwrap());
    }

    #[test]
    fn test_uniform_color_is_blank_by_variance() {
        // Mid-gray: not near-white or near-black, caught by variance.
        assert!(is_blank_tile(&solid([128, 128, 128, 255])).unwrap());
    }

    #[test]
    fn test_checkerboard_is_not_blank() {
        assert!(!is_blank_tile(&checkerboard()).unwrap());
    }

    #[test]
    fn test_real_looking_gradient_is_not_blank() {
        let img = RgbaImage::from_fn(256, 256, |x, y| {
            Rgba([(x / 2) as u8, (y / 2) as u8, 80, 255])
        });
        assert!(!is_blank_tile(&encode(img)).unwrap());
    }

    #[test]
    fn test_non_image_payload_is_decode_error() {
        assert!(matches!(
            is_blank_tile(b"<html>503</html>"),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_tiny_payload_is_blank() {
        assert!(is_blank_tile(&encode(RgbaImage::from_pixel(
            4,
            4,
            Rgba([10, 20, 30, 255])
        )))
        .unwrap());
    }
}
