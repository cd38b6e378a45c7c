//! The per-image pipeline steps inside a batch flush: pre-flight size
//! validation, source read, and decode/resize/encode. Orchestration (idempotence checks, memory-pool admission,
//! collecting results for the per-collection commit) lives in `mod.rs`.

use atelier_contracts::archive_path;
use image::GenericImageView;

use crate::error::{AtelierError, Result};
use crate::quality::effective_cache_quality;
use crate::render;

/// Reads the raw source bytes for a plain file or a `<archive>#<entry>`
/// composite path, normalizing backslash entry separators first.
pub fn read_source_bytes(path: &str) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    read_source_bytes_into(path, &mut buffer)?;
    Ok(buffer)
}

/// Same as [`read_source_bytes`] but reads into a caller-supplied buffer
/// (cleared first), so a pooled scratch buffer can be reused across reads
/// instead of allocating fresh on every image.
pub fn read_source_bytes_into(path: &str, buffer: &mut Vec<u8>) -> Result<()> {
    buffer.clear();
    let normalized = if archive_path::is_archive_path(path) {
        archive_path::normalize(path).unwrap_or_else(|| path.to_string())
    } else {
        path.to_string()
    };

    match archive_path::split(&normalized) {
        Some((archive_file, entry_path)) => read_archive_entry_into(archive_file, entry_path, buffer),
        None => read_file_into(&normalized, buffer),
    }
}

fn read_file_into(path: &str, buffer: &mut Vec<u8>) -> Result<()> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    file.read_to_end(buffer).map_err(AtelierError::Io)?;
    Ok(())
}

fn read_archive_entry_into(archive_file: &str, entry_path: &str, buffer: &mut Vec<u8>) -> Result<()> {
    use std::io::Read;
    let file = std::fs::File::open(archive_file)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|err| AtelierError::Internal(format!("failed to open archive {archive_file}: {err}")))?;
    let mut entry = archive
        .by_name(entry_path)
        .map_err(|err| AtelierError::NotFound(format!("{archive_file}#{entry_path}: {err}")))?;
    entry.read_to_end(buffer).map_err(AtelierError::Io)?;
    Ok(())
}

/// Source exceeding the configured ceiling is a counted failure with no
/// retry. Exactly-at-the-limit is accepted.
pub fn preflight_check(size_bytes: u64, max_size_bytes: u64) -> Result<()> {
    if size_bytes > max_size_bytes {
        return Err(AtelierError::OversizeSource(format!(
            "{size_bytes} bytes exceeds limit of {max_size_bytes} bytes"
        )));
    }
    Ok(())
}

pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

pub fn render_thumbnail(source_bytes: &[u8], target_width: u32, target_height: u32) -> Result<RenderedArtifact> {
    let image = render::decode(source_bytes)?;
    let bytes = render::resize_and_encode_jpeg(&image, target_width, target_height, 85)?;
    let rendered = render::decode(&bytes)?;
    Ok(RenderedArtifact {
        width: rendered.width(),
        height: rendered.height(),
        quality: 85,
        bytes,
    })
}

pub fn render_cache(
    source_bytes: &[u8],
    target_width: u32,
    target_height: u32,
    requested_quality: u8,
) -> Result<RenderedArtifact> {
    let image = render::decode(source_bytes)?;
    let (source_width, source_height) = image.dimensions();
    let quality = effective_cache_quality(
        requested_quality,
        source_bytes.len() as u64,
        source_width,
        source_height,
        target_width,
        target_height,
    );
    let bytes = render::resize_and_encode_jpeg(&image, target_width, target_height, quality.min(100))?;
    let rendered = render::decode(&bytes)?;
    Ok(RenderedArtifact {
        width: rendered.width(),
        height: rendered.height(),
        quality,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_accepts_exactly_at_limit() {
        assert!(preflight_check(500, 500).is_ok());
    }

    #[test]
    fn preflight_rejects_one_byte_over() {
        assert!(preflight_check(501, 500).is_err());
    }

    #[test]
    fn read_source_bytes_reads_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"hello").unwrap();
        let bytes = read_source_bytes(path.to_str().unwrap()).unwrap();
        assert_eq!(bytes, b"hello");
    }
}
