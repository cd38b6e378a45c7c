//! Layered configuration for the atelier image pipeline.
//!
//! Precedence, low to high: built-in defaults -> an optional
//! TOML file -> `ATELIER_*` environment variables.

mod env_overrides;

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use env_overrides::apply_env_overrides;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Batch-processing tuning for the batch thumbnail/cache generator (C8).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchProcessingConfig {
    /// Flush a collection's bucket once it holds this many messages.
    pub max_batch_size: usize,
    /// Flush a collection's bucket once its oldest message has waited this long.
    pub batch_timeout_seconds: u64,
    /// Maximum number of collection buckets flushing concurrently.
    pub max_concurrent_batches: usize,
}

impl Default for BatchProcessingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            batch_timeout_seconds: 5,
            max_concurrent_batches: 4,
        }
    }
}

impl BatchProcessingConfig {
    pub fn batch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.batch_timeout_seconds)
    }
}

/// Memory-pool and decode-concurrency tuning for the batch generator (C8).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryOptimizationConfig {
    /// Ceiling on total decoded-image bytes in flight across all batches.
    pub max_memory_usage_mb: u64,
    /// Per-bucket fan-out for per-image work within one flush.
    pub max_concurrent_processing: usize,
    /// Number of reusable scratch buffers kept in the pool.
    pub memory_pool_size: usize,
    /// Size of each pooled scratch buffer.
    pub default_buffer_size_bytes: usize,
}

impl Default for MemoryOptimizationConfig {
    fn default() -> Self {
        Self {
            max_memory_usage_mb: 4096,
            max_concurrent_processing: 8,
            memory_pool_size: 100,
            default_buffer_size_bytes: 2 * 1024 * 1024,
        }
    }
}

impl MemoryOptimizationConfig {
    pub fn max_memory_usage_bytes(&self) -> u64 {
        self.max_memory_usage_mb * 1024 * 1024
    }
}

/// Per-queue prefetch/concurrency table plus the size ceilings
/// used by pre-flight validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub prefetch: HashMap<String, u16>,
    pub concurrency: HashMap<String, u16>,
    pub message_timeout_hours: u64,
    pub max_image_size_bytes: u64,
    pub max_zip_entry_size_bytes: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let mut prefetch = HashMap::new();
        prefetch.insert("library.scan".to_string(), 10);
        prefetch.insert("collection.scan".to_string(), 20);
        prefetch.insert("image.processing".to_string(), 100);
        prefetch.insert("thumbnail.generation".to_string(), 100);
        prefetch.insert("cache.generation".to_string(), 100);
        prefetch.insert("bulk.operation".to_string(), 10);
        prefetch.insert("dead-letter".to_string(), 1);

        let mut concurrency = HashMap::new();
        concurrency.insert("library.scan".to_string(), 2);
        concurrency.insert("collection.scan".to_string(), 4);
        concurrency.insert("image.processing".to_string(), 8);
        concurrency.insert("thumbnail.generation".to_string(), 8);
        concurrency.insert("cache.generation".to_string(), 8);
        concurrency.insert("bulk.operation".to_string(), 2);
        concurrency.insert("dead-letter".to_string(), 1);

        Self {
            prefetch,
            concurrency,
            message_timeout_hours: 24,
            max_image_size_bytes: 500 * 1024 * 1024,
            max_zip_entry_size_bytes: 20 * 1024 * 1024 * 1024,
        }
    }
}

/// Thumbnail/cache render defaults, loaded once at consumer startup
/// — never carried in the message payload.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache_format: ImageFormatKind,
    pub cache_quality: u8,
    pub cache_width: u32,
    pub cache_height: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_format: ImageFormatKind::Jpeg,
            cache_quality: 85,
            cache_width: 1920,
            cache_height: 1080,
            thumbnail_width: 300,
            thumbnail_height: 300,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatKind {
    Jpeg,
    Png,
    WebP,
}

impl ImageFormatKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormatKind::Jpeg => "jpg",
            ImageFormatKind::Png => "png",
            ImageFormatKind::WebP => "webp",
        }
    }
}

/// Root configuration object assembled by [`load`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch: BatchProcessingConfig,
    pub memory: MemoryOptimizationConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    /// Root directory the [`FsArtifactStore`]-equivalent adapter writes under.
    pub artifact_root: String,
}

/// Load configuration: defaults, optionally overlaid by a TOML file, then by
/// `ATELIER_*` environment variables.
pub fn load(toml_path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let mut config = PipelineConfig {
        artifact_root: "./artifacts".to_string(),
        ..PipelineConfig::default()
    };

    if let Some(path) = toml_path {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        // `#[serde(default)]` falls back to `String::default()` for a field
        // the TOML file omits, which would silently blank out the built-in
        // artifact root instead of keeping it.
        if config.artifact_root.is_empty() {
            config.artifact_root = "./artifacts".to_string();
        }
    }

    apply_env_overrides(&mut config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_with_no_file_uses_documented_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config.artifact_root, "./artifacts");
        assert_eq!(config.batch.max_batch_size, 50);
        assert_eq!(config.cache.cache_quality, 85);
    }

    #[test]
    fn toml_file_omitting_artifact_root_keeps_the_default_instead_of_blanking_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atelier.toml");
        std::fs::write(&path, "[batch]\nmax_batch_size = 10\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.batch.max_batch_size, 10);
        assert_eq!(config.artifact_root, "./artifacts");
    }

    #[test]
    fn toml_file_can_still_override_artifact_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atelier.toml");
        std::fs::write(&path, "artifact_root = \"/data/artifacts\"\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.artifact_root, "/data/artifacts");
    }
}
