use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Tracks total decoded-image bytes in flight across every collection
/// bucket on a generator, and keeps a bounded free list of reusable scratch
/// buffers so repeated source reads don't reallocate from scratch every
/// time. Admission blocks rather than allocates past the byte ceiling; it
/// never errors the caller.
pub struct MemoryPool {
    max_bytes: u64,
    in_use: AtomicU64,
    notify: Notify,
    free_buffers: Mutex<Vec<Vec<u8>>>,
    pool_size: usize,
    default_buffer_size_bytes: usize,
}

/// RAII guard returned by [`MemoryPool::acquire`]; releases its byte
/// reservation and returns its buffer to the free list on drop, so a
/// panicking or cancelled decode can't leak either.
pub struct MemoryReservation<'a> {
    pool: &'a MemoryPool,
    bytes: u64,
    buffer: Option<Vec<u8>>,
}

impl MemoryReservation<'_> {
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        self.buffer.as_mut().expect("buffer is only taken on drop")
    }

    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_deref().expect("buffer is only taken on drop")
    }
}

impl Drop for MemoryReservation<'_> {
    fn drop(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            buffer.clear();
            let mut free = self.pool.free_buffers.lock();
            if free.len() < self.pool.pool_size {
                free.push(buffer);
            }
        }
        self.pool.release(self.bytes);
    }
}

impl MemoryPool {
    pub fn new(max_bytes: u64, pool_size: usize, default_buffer_size_bytes: usize) -> Self {
        Self {
            max_bytes,
            in_use: AtomicU64::new(0),
            notify: Notify::new(),
            free_buffers: Mutex::new(Vec::with_capacity(pool_size)),
            pool_size,
            default_buffer_size_bytes,
        }
    }

    pub fn in_use_bytes(&self) -> u64 {
        self.in_use.load(Ordering::SeqCst)
    }

    pub fn pooled_buffer_count(&self) -> usize {
        self.free_buffers.lock().len()
    }

    /// Waits until admitting `bytes` would not exceed `max_bytes`, then
    /// reserves it and checks out a scratch buffer, reusing one from the
    /// free list when one is available and already big enough.
    pub async fn acquire(&self, bytes: u64) -> MemoryReservation<'_> {
        loop {
            let current = self.in_use.load(Ordering::SeqCst);
            let fits = current + bytes <= self.max_bytes || current == 0;
            if fits {
                self.in_use.fetch_add(bytes, Ordering::SeqCst);
                let buffer = self.checkout_buffer(bytes);
                return MemoryReservation {
                    pool: self,
                    bytes,
                    buffer: Some(buffer),
                };
            }
            self.notify.notified().await;
        }
    }

    fn checkout_buffer(&self, min_capacity: u64) -> Vec<u8> {
        let wanted = min_capacity.max(self.default_buffer_size_bytes as u64) as usize;
        let mut free = self.free_buffers.lock();
        match free.iter().position(|buffer| buffer.capacity() >= min_capacity as usize) {
            Some(index) => free.swap_remove(index),
            None => Vec::with_capacity(wanted),
        }
    }

    fn release(&self, bytes: u64) {
        self.in_use.fetch_sub(bytes, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
