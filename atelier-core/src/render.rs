//! Decode -> resize -> encode, the per-image pipeline step inside a batch
//! flush. Resizes in memory and covers both the thumbnail and cache render
//! paths with the same fit-within scaling.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageEncoder};

use crate::error::{AtelierError, Result};

/// Computes target dimensions that fit within `(max_width, max_height)`
/// while preserving the source aspect ratio; never upscales.
pub fn fit_within(src_width: u32, src_height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if src_width == 0 || src_height == 0 {
        return (max_width, max_height);
    }
    if src_width <= max_width && src_height <= max_height {
        return (src_width, src_height);
    }
    let width_ratio = max_width as f64 / src_width as f64;
    let height_ratio = max_height as f64 / src_height as f64;
    let ratio = width_ratio.min(height_ratio);
    let width = ((src_width as f64) * ratio).round().max(1.0) as u32;
    let height = ((src_height as f64) * ratio).round().max(1.0) as u32;
    (width, height)
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|err| AtelierError::DecodeFailure(err.to_string()))
}

/// Resize to fit within the target box and encode as JPEG at `quality`.
/// The only format this pipeline currently produces; see `SPEC_FULL.md` for
/// the PNG/WebP extension point.
pub fn resize_and_encode_jpeg(image: &DynamicImage, max_width: u32, max_height: u32, quality: u8) -> Result<Vec<u8>> {
    let (src_width, src_height) = image.dimensions();
    let (target_width, target_height) = fit_within(src_width, src_height, max_width, max_height);

    let resized = if (target_width, target_height) == (src_width, src_height) {
        image.clone()
    } else {
        image.resize(target_width, target_height, image::imageops::FilterType::CatmullRom)
    };

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .write_image(
            resized.to_rgb8().as_raw(),
            resized.width(),
            resized.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|err| AtelierError::EncodeFailure(err.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_within_preserves_aspect_ratio_when_downscaling() {
        let (w, h) = fit_within(4000, 3000, 1920, 1080);
        assert!(w <= 1920 && h <= 1080);
        let src_ratio = 4000.0 / 3000.0;
        let dst_ratio = w as f64 / h as f64;
        assert!((src_ratio - dst_ratio).abs() < 0.01);
    }

    #[test]
    fn fit_within_never_upscales() {
        let (w, h) = fit_within(300, 200, 1920, 1080);
        assert_eq!((w, h), (300, 200));
    }

    #[test]
    fn decode_rejects_garbage_bytes() {
        let err = decode(b"not an image").unwrap_err();
        assert!(matches!(err, AtelierError::DecodeFailure(_)));
    }

    #[test]
    fn resize_and_encode_roundtrips_through_decode() {
        let image = DynamicImage::new_rgb8(800, 600);
        let bytes = resize_and_encode_jpeg(&image, 300, 300, 85).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert!(decoded.width() <= 300 && decoded.height() <= 300);
    }
}
