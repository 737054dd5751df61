//! Reusable decode state
//!
//! `Pool<T>` hands out `Pooled<T>` guards; dropping a guard returns the item,
//! so every exit path of a worker (including errors and panics) gives it back.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Upper bound on a decode buffer kept across uses
const MAX_RETAINED_BUFFER: usize = 16 * 1024 * 1024;

static NEXT_DECODE_CONTEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Scratch state for decoding one chunk payload at a time
#[derive(Debug)]
pub struct DecodeContext {
    id: u64,
    buffer: Vec<u8>,
    chunks_decoded: usize,
}

impl DecodeContext {
    pub fn new() -> Self {
        Self {
            id: NEXT_DECODE_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            buffer: Vec::new(),
            chunks_decoded: 0,
        }
    }

    /// Process-unique identity of this context
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Zeroed scratch buffer of exactly `len` bytes, reusing prior capacity
    pub fn buffer(&mut self, len: usize) -> &mut [u8] {
        self.buffer.clear();
        self.buffer.resize(len, 0);
        &mut self.buffer
    }

    /// Chunks decoded with this context over its lifetime
    pub fn chunks_decoded(&self) -> usize {
        self.chunks_decoded
    }

    pub(crate) fn record_use(&mut self) {
        self.chunks_decoded += 1;
    }

    fn reset(&mut self) {
        self.buffer.clear();
        if self.buffer.capacity() > MAX_RETAINED_BUFFER {
            self.buffer.shrink_to(MAX_RETAINED_BUFFER);
        }
    }
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Reset hook run when an item goes back into a pool
pub trait Recycle {
    fn recycle(&mut self);
}

impl Recycle for DecodeContext {
    fn recycle(&mut self) {
        self.reset();
    }
}

/// A simple object pool; items are created lazily and live for the pool's lifetime
#[derive(Debug)]
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    factory: fn() -> T,
    created: AtomicUsize,
}

impl<T: Recycle> Pool<T> {
    pub fn new(factory: fn() -> T) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            factory,
            created: AtomicUsize::new(0),
        })
    }

    /// Take an item from the pool, creating one if none is free
    pub fn acquire(self: &Arc<Self>) -> Pooled<T> {
        let reused = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let item = reused.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            (self.factory)()
        });

        Pooled {
            item: Some(item),
            pool: Arc::clone(self),
        }
    }

    /// Items created since the pool was built
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Items currently sitting idle in the pool
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, mut item: T) {
        item.recycle();
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }
}

/// Exclusive handle on a pooled item; returns it on drop
#[derive(Debug)]
pub struct Pooled<T: Recycle> {
    item: Option<T>,
    pool: Arc<Pool<T>>,
}

impl<T: Recycle> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // only taken in drop
        self.item.as_ref().expect("pooled item present until drop")
    }
}

impl<T: Recycle> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item present until drop")
    }
}

impl<T: Recycle> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

pub type DecodeContextPool = Pool<DecodeContext>;

/// Process-wide decode context pool
pub fn global_decode_pool() -> Arc<DecodeContextPool> {
    static POOL: OnceLock<Arc<DecodeContextPool>> = OnceLock::new();
    Arc::clone(POOL.get_or_init(|| Pool::new(DecodeContext::new)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_creates_lazily() {
        let pool = Pool::new(DecodeContext::new);
        assert_eq!(pool.created(), 0);

        let ctx = pool.acquire();
        assert_eq!(pool.created(), 1);
        assert_eq!(pool.idle(), 0);
        drop(ctx);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_released_context_is_reused() {
        let pool = Pool::new(DecodeContext::new);

        let id = {
            let mut ctx = pool.acquire();
            ctx.buffer(1024)[0] = 7;
            ctx.record_use();
            ctx.id()
        };

        let mut ctx = pool.acquire();
        assert_eq!(ctx.id(), id);
        assert_eq!(ctx.chunks_decoded(), 1);
        assert_eq!(pool.created(), 1);
        // buffers come back zeroed
        assert!(ctx.buffer(16).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_concurrent_holders_get_distinct_contexts() {
        let pool = Pool::new(DecodeContext::new);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.created(), 2);
    }

    #[test]
    fn test_returned_on_panic() {
        let pool = Pool::new(DecodeContext::new);
        let worker_pool = Arc::clone(&pool);

        let res = std::thread::spawn(move || {
            let _ctx = worker_pool.acquire();
            panic!("decode failed");
        })
        .join();

        assert!(res.is_err());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_oversized_buffer_is_trimmed() {
        let mut ctx = DecodeContext::new();
        ctx.buffer(MAX_RETAINED_BUFFER * 2);
        ctx.recycle();
        assert!(ctx.buffer.capacity() <= MAX_RETAINED_BUFFER);
    }
}
