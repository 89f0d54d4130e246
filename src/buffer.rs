use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// Idle buffers retained per tag by [`PooledBufferManager`].
const MAX_IDLE_PER_TAG: usize = 8;

/// Buffers that grew beyond this capacity are dropped instead of pooled.
const MAX_RETAINED_CAPACITY: usize = 1 << 20;

/// Supplies scratch buffers for compression work.
///
/// Codecs acquire a buffer, write the transformed bytes into it to measure
/// them, then copy the result to the real destination. The returned
/// [`BufferLease`] hands the buffer back when dropped, on every exit path,
/// including a cancelled exchange.
pub trait BufferManager: Send + Sync {
    /// Acquires a buffer, optionally tagged so pooling implementations can
    /// group reuse by call site.
    fn acquire(&self, tag: Option<&str>) -> BufferLease;
}

/// A scratch buffer leased from a [`BufferManager`].
///
/// Derefs to the underlying `Vec<u8>`.
pub struct BufferLease {
    buf: Vec<u8>,
    reclaim: Option<Box<dyn FnOnce(Vec<u8>) + Send>>,
}

impl BufferLease {
    /// A lease that frees its buffer on drop.
    pub fn detached() -> Self {
        Self {
            buf: Vec::new(),
            reclaim: None,
        }
    }

    /// A lease over `buf` that hands it to `reclaim` on drop.
    pub fn reclaimed<F>(buf: Vec<u8>, reclaim: F) -> Self
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        Self {
            buf,
            reclaim: Some(Box::new(reclaim)),
        }
    }
}

impl Deref for BufferLease {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for BufferLease {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl fmt::Debug for BufferLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferLease")
            .field("len", &self.buf.len())
            .field("pooled", &self.reclaim.is_some())
            .finish()
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(reclaim) = self.reclaim.take() {
            reclaim(mem::take(&mut self.buf));
        }
    }
}

/// A [`BufferManager`] that allocates a fresh buffer per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleBufferManager;

impl SimpleBufferManager {
    /// Creates a new simple manager.
    pub fn new() -> Self {
        Self
    }
}

impl BufferManager for SimpleBufferManager {
    fn acquire(&self, _tag: Option<&str>) -> BufferLease {
        BufferLease::detached()
    }
}

type Shelves = Arc<Mutex<HashMap<String, Vec<Vec<u8>>>>>;

/// A [`BufferManager`] that pools idle buffers, keyed loosely by tag, to
/// reduce allocation pressure under sustained load.
///
/// The pool is internally synchronized. At most a handful of idle buffers
/// are retained per tag, and buffers that grew beyond the retention cap are
/// freed instead of pooled.
#[derive(Debug, Clone, Default)]
pub struct PooledBufferManager {
    shelves: Shelves,
}

impl PooledBufferManager {
    /// Creates a new empty pool.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BufferManager for PooledBufferManager {
    fn acquire(&self, tag: Option<&str>) -> BufferLease {
        let key = tag.unwrap_or_default().to_owned();
        let buf = {
            let mut shelves = self.shelves.lock().unwrap_or_else(PoisonError::into_inner);
            shelves.get_mut(&key).and_then(Vec::pop).unwrap_or_default()
        };

        let shelves = Arc::clone(&self.shelves);
        BufferLease::reclaimed(buf, move |mut buf| {
            if buf.capacity() > MAX_RETAINED_CAPACITY {
                return;
            }
            buf.clear();
            let mut shelves = shelves.lock().unwrap_or_else(PoisonError::into_inner);
            let shelf = shelves.entry(key).or_default();
            if shelf.len() < MAX_IDLE_PER_TAG {
                shelf.push(buf);
            }
        })
    }
}
