//! `ATELIER_*` environment overlay, applied after any TOML file is loaded.
//!
//! Only variables that are actually set are consulted, so an absent
//! variable never clobbers a value supplied by the file layer.

use std::env;

use crate::PipelineConfig;

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u8(key: &str) -> Option<u8> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

pub fn apply_env_overrides(config: &mut PipelineConfig) {
    let _ = dotenvy::dotenv();

    if let Some(v) = env_usize("ATELIER_BATCH_MAX_SIZE") {
        config.batch.max_batch_size = v;
    }
    if let Some(v) = env_u64("ATELIER_BATCH_TIMEOUT_SECONDS") {
        config.batch.batch_timeout_seconds = v;
    }
    if let Some(v) = env_usize("ATELIER_BATCH_MAX_CONCURRENT") {
        config.batch.max_concurrent_batches = v;
    }

    if let Some(v) = env_u64("ATELIER_MAX_MEMORY_USAGE_MB") {
        config.memory.max_memory_usage_mb = v;
    }
    if let Some(v) = env_usize("ATELIER_MAX_CONCURRENT_PROCESSING") {
        config.memory.max_concurrent_processing = v;
    }
    if let Some(v) = env_usize("ATELIER_MEMORY_POOL_SIZE") {
        config.memory.memory_pool_size = v;
    }

    if let Some(v) = env_u64("ATELIER_MAX_IMAGE_SIZE_BYTES") {
        config.queue.max_image_size_bytes = v;
    }
    if let Some(v) = env_u64("ATELIER_MAX_ZIP_ENTRY_SIZE_BYTES") {
        config.queue.max_zip_entry_size_bytes = v;
    }
    if let Some(v) = env_u64("ATELIER_MESSAGE_TIMEOUT_HOURS") {
        config.queue.message_timeout_hours = v;
    }

    if let Some(v) = env_u8("ATELIER_CACHE_QUALITY") {
        config.cache.cache_quality = v;
    }
    if let Some(v) = env_u32("ATELIER_CACHE_WIDTH") {
        config.cache.cache_width = v;
    }
    if let Some(v) = env_u32("ATELIER_CACHE_HEIGHT") {
        config.cache.cache_height = v;
    }
    if let Some(v) = env_u32("ATELIER_THUMBNAIL_WIDTH") {
        config.cache.thumbnail_width = v;
    }
    if let Some(v) = env_u32("ATELIER_THUMBNAIL_HEIGHT") {
        config.cache.thumbnail_height = v;
    }

    if let Ok(v) = env::var("ATELIER_ARTIFACT_ROOT") {
        config.artifact_root = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_defaults_untouched_when_unset() {
        let mut config = PipelineConfig {
            artifact_root: "./artifacts".to_string(),
            ..PipelineConfig::default()
        };
        let before = config.batch.max_batch_size;
        apply_env_overrides(&mut config);
        assert_eq!(config.batch.max_batch_size, before);
    }

    #[test]
    fn applies_set_variable() {
        // SAFETY: test runs single-threaded within this process's env state.
        unsafe {
            env::set_var("ATELIER_CACHE_QUALITY", "42");
        }
        let mut config = PipelineConfig {
            artifact_root: "./artifacts".to_string(),
            ..PipelineConfig::default()
        };
        apply_env_overrides(&mut config);
        assert_eq!(config.cache.cache_quality, 42);
        unsafe {
            env::remove_var("ATELIER_CACHE_QUALITY");
        }
    }
}
