use atelier_contracts::ImageId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
    Tiff,
}

impl ImageFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            "png" => ImageFormat::Png,
            "webp" => ImageFormat::WebP,
            "gif" => ImageFormat::Gif,
            "bmp" => ImageFormat::Bmp,
            "tif" | "tiff" => ImageFormat::Tiff,
            _ => return None,
        })
    }
}

/// One source image within a collection.
///
/// `full_path` is already resolved to the canonical form: a plain filesystem
/// path for Folder collections, `<archive-path>#<entry-path>` for Archive
/// collections.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub filename: String,
    pub relative_path: String,
    pub full_path: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// A derived thumbnail. An entry with `path.is_empty() && size_bytes == 0`
/// is a sentinel marking a prior permanent failure; it must never be
/// regenerated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThumbnailEntry {
    pub image_id: ImageId,
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub quality: u8,
    pub size_bytes: u64,
}

impl ThumbnailEntry {
    pub fn sentinel(image_id: ImageId, width: u32, height: u32) -> Self {
        Self {
            image_id,
            path: String::new(),
            width,
            height,
            format: ImageFormat::Jpeg,
            quality: 0,
            size_bytes: 0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.path.is_empty() && self.size_bytes == 0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub image_id: ImageId,
    pub path: String,
    pub format: ImageFormat,
    pub quality: u8,
    pub size_bytes: u64,
}

impl CacheEntry {
    pub fn sentinel(image_id: ImageId) -> Self {
        Self {
            image_id,
            path: String::new(),
            format: ImageFormat::Jpeg,
            quality: 0,
            size_bytes: 0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.path.is_empty() && self.size_bytes == 0
    }
}
