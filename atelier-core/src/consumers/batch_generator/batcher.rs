use std::collections::HashMap;
use std::time::{Duration, Instant};

use atelier_contracts::{CacheGenerationMessage, CollectionId, ThumbnailGenerationMessage};
use parking_lot::Mutex;

/// One unit of generation work, tagged by which message queue it came from
/// so the flush step can apply the right render settings and write the
/// right kind of entry.
#[derive(Clone, Debug)]
pub enum BatchItem {
    Thumbnail {
        delivery_tag: u64,
        message: ThumbnailGenerationMessage,
    },
    Cache {
        delivery_tag: u64,
        message: CacheGenerationMessage,
    },
}

struct Bucket {
    items: Vec<BatchItem>,
    first_seen: Instant,
}

/// Per-collection bucketing with size- and time-based flush triggers. A
/// short mutex guards bucket membership; the actual flush work happens
/// outside the lock.
pub struct Batcher {
    buckets: Mutex<HashMap<CollectionId, Bucket>>,
    max_batch_size: usize,
    batch_timeout: Duration,
}

impl Batcher {
    pub fn new(max_batch_size: usize, batch_timeout: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_batch_size,
            batch_timeout,
        }
    }

    /// Adds one item to its collection's bucket. Returns the bucket's
    /// contents, draining it, if this add pushed the bucket over
    /// `MaxBatchSize`.
    pub fn add(&self, collection_id: CollectionId, item: BatchItem) -> Option<Vec<BatchItem>> {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(collection_id).or_insert_with(|| Bucket {
            items: Vec::new(),
            first_seen: Instant::now(),
        });
        bucket.items.push(item);
        if bucket.items.len() >= self.max_batch_size {
            let bucket = buckets.remove(&collection_id).expect("just inserted");
            return Some(bucket.items);
        }
        None
    }

    /// Drains every bucket whose oldest message has waited past the
    /// timeout. Called from a periodic sweep alongside size-triggered
    /// flushes.
    pub fn drain_timed_out(&self) -> Vec<(CollectionId, Vec<BatchItem>)> {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let timed_out: Vec<CollectionId> = buckets
            .iter()
            .filter(|(_, bucket)| now.duration_since(bucket.first_seen) >= self.batch_timeout)
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .into_iter()
            .map(|id| {
                let bucket = buckets.remove(&id).expect("id came from this map");
                (id, bucket.items)
            })
            .collect()
    }

    /// Drains every bucket regardless of size or age, for graceful shutdown.
    pub fn drain_all(&self) -> Vec<(CollectionId, Vec<BatchItem>)> {
        self.buckets
            .lock()
            .drain()
            .map(|(id, bucket)| (id, bucket.items))
            .collect()
    }
}
