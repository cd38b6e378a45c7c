use std::collections::HashMap;

use atelier_contracts::{CollectionId, ImageId};
use serde::{Deserialize, Serialize};

use super::image::{CacheEntry, Image, ThumbnailEntry};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CollectionType {
    Folder,
    Archive,
}

/// Per-collection render settings. Loaded once and carried on
/// the collection record rather than the message: a collection's owner can
/// change these without racing in-flight messages that still name old
/// dimensions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionSettings {
    pub generate_thumbnails: bool,
    pub generate_cache: bool,
    pub use_direct_file_access: bool,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub cache_width: u32,
    pub cache_height: u32,
    pub cache_format: String,
    pub cache_quality: u8,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            generate_thumbnails: true,
            generate_cache: true,
            use_direct_file_access: false,
            thumbnail_width: 300,
            thumbnail_height: 300,
            cache_width: 1920,
            cache_height: 1080,
            cache_format: "jpeg".to_string(),
            cache_quality: 85,
        }
    }
}

/// A unit of images: one directory, or one archive file.
///
/// Images/thumbnails/cache entries are embedded arrays grown only through
/// atomic array-add operations on the repository; nothing here ever points
/// back at a job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub library_id: atelier_contracts::LibraryId,
    pub name: String,
    pub path: String,
    pub collection_type: CollectionType,
    pub settings: CollectionSettings,
    pub images: Vec<Image>,
    pub thumbnails: Vec<ThumbnailEntry>,
    pub cache_images: Vec<CacheEntry>,
    pub cache_folder_bytes: u64,
}

impl Collection {
    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.iter().find(|i| i.id == id)
    }

    pub fn has_image(&self, id: ImageId) -> bool {
        self.images.iter().any(|i| i.id == id)
    }

    pub fn thumbnail(&self, id: ImageId, width: u32, height: u32) -> Option<&ThumbnailEntry> {
        self.thumbnails
            .iter()
            .find(|t| t.image_id == id && t.width == width && t.height == height)
    }

    pub fn cache_entry(&self, id: ImageId) -> Option<&CacheEntry> {
        self.cache_images.iter().find(|c| c.image_id == id)
    }

    /// Images lacking a ThumbnailEntry at the collection's configured
    /// thumbnail dimensions.
    pub fn images_needing_thumbnail(&self) -> Vec<ImageId> {
        self.images
            .iter()
            .filter(|img| {
                self.thumbnail(
                    img.id,
                    self.settings.thumbnail_width,
                    self.settings.thumbnail_height,
                )
                .is_none()
            })
            .map(|img| img.id)
            .collect()
    }

    pub fn images_needing_cache(&self) -> Vec<ImageId> {
        self.images
            .iter()
            .filter(|img| self.cache_entry(img.id).is_none())
            .map(|img| img.id)
            .collect()
    }

    /// Every array-referential-integrity invariant, checked at once.
    /// Intended for tests and defensive assertions, not the hot path.
    pub fn check_invariants(&self) -> Result<(), String> {
        let ids: std::collections::HashSet<ImageId> = self.images.iter().map(|i| i.id).collect();
        for t in &self.thumbnails {
            if !ids.contains(&t.image_id) {
                return Err(format!("thumbnail references unknown image {}", t.image_id));
            }
        }
        for c in &self.cache_images {
            if !ids.contains(&c.image_id) {
                return Err(format!("cache entry references unknown image {}", c.image_id));
            }
        }
        let mut thumb_keys: HashMap<(ImageId, u32, u32), u32> = HashMap::new();
        for t in &self.thumbnails {
            let count = thumb_keys.entry((t.image_id, t.width, t.height)).or_insert(0);
            *count += 1;
            if *count > 1 {
                return Err(format!(
                    "duplicate thumbnail entry for image {} at {}x{}",
                    t.image_id, t.width, t.height
                ));
            }
        }
        let mut cache_keys: HashMap<ImageId, u32> = HashMap::new();
        for c in &self.cache_images {
            let count = cache_keys.entry(c.image_id).or_insert(0);
            *count += 1;
            if *count > 1 {
                return Err(format!("duplicate cache entry for image {}", c.image_id));
            }
        }
        Ok(())
    }
}
