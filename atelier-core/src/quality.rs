//! Source-quality estimation for the cache path.

/// Estimate an encode quality from how many bits the source spent per pixel.
/// Used only to cap a requested quality, never to raise it.
pub fn estimate_source_quality(source_bytes: u64, width: u32, height: u32) -> u8 {
    let pixels = (width as u64) * (height as u64);
    if pixels == 0 {
        return 60;
    }
    let bits_per_pixel = (source_bytes as f64 * 8.0) / pixels as f64;
    if bits_per_pixel >= 2.0 {
        95
    } else if bits_per_pixel >= 1.0 {
        85
    } else if bits_per_pixel >= 0.5 {
        75
    } else {
        60
    }
}

/// The effective cache quality: the requested quality capped by the
/// estimated source quality, unless the source already fits within the
/// cache target in both dimensions, in which case the original is preserved
/// untouched (effective quality 100, no re-encode reduction).
pub fn effective_cache_quality(
    requested_quality: u8,
    source_bytes: u64,
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
) -> u8 {
    if source_width <= target_width && source_height <= target_height {
        return 100;
    }
    let estimated = estimate_source_quality(source_bytes, source_width, source_height);
    requested_quality.min(estimated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_bits_per_pixel_chooses_upper_tier() {
        // Exactly 1.0 bpp: width*height*1/8 bytes.
        let width = 1000;
        let height = 1000;
        let source_bytes = (width as u64 * height as u64) / 8;
        assert_eq!(estimate_source_quality(source_bytes, width, height), 85);
    }

    #[test]
    fn high_density_source_gets_top_tier() {
        let width = 1000;
        let height = 1000;
        let source_bytes = (width as u64 * height as u64) * 3 / 8;
        assert_eq!(estimate_source_quality(source_bytes, width, height), 95);
    }

    #[test]
    fn sparse_source_gets_bottom_tier() {
        assert_eq!(estimate_source_quality(100, 1000, 1000), 60);
    }

    #[test]
    fn source_no_larger_than_target_preserves_original() {
        let quality = effective_cache_quality(85, 500_000, 800, 600, 1920, 1080);
        assert_eq!(quality, 100);
    }

    #[test]
    fn effective_quality_never_exceeds_requested() {
        let quality = effective_cache_quality(70, 3_000_000, 4000, 3000, 1920, 1080);
        assert!(quality <= 70);
    }
}
