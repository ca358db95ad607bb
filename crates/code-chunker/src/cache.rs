use crate::clock::{Clock, SystemClock};
use crate::config::ChunkingOptions;
use crate::language::Language;
use crate::types::Chunk;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::fmt::{Debug, Write as _};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of memoized results kept by [`InMemoryChunkCache`]
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Memo store for AST splitter results
pub trait ChunkCache: Send + Sync + Debug {
    fn get(&self, key: &str) -> Option<Vec<Chunk>>;
    fn set(&self, key: &str, value: Vec<Chunk>, ttl_ms: u64);
}

/// SHA-256 over everything that can change the split
pub fn cache_key(
    content: &str,
    language: Language,
    path: &str,
    options: &ChunkingOptions,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(b"\0");
    hasher.update(language.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(path.as_bytes());
    hasher.update(b"\0");
    hasher.update(options.fingerprint().as_bytes());

    let digest = hasher.finalize();
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

#[derive(Debug)]
struct Entry {
    chunks: Vec<Chunk>,
    expires_at_ms: u64,
}

/// In-process LRU backend with per-entry expiry
#[derive(Debug)]
pub struct InMemoryChunkCache {
    entries: Mutex<LruCache<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryChunkCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for InMemoryChunkCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ChunkCache for InMemoryChunkCache {
    fn get(&self, key: &str) -> Option<Vec<Chunk>> {
        let now = self.clock.now_ms();
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if now < entry.expires_at_ms => return Some(entry.chunks.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            log::debug!("Chunk cache entry expired: {key}");
        }
        None
    }

    fn set(&self, key: &str, value: Vec<Chunk>, ttl_ms: u64) {
        let expires_at_ms = self.clock.now_ms().saturating_add(ttl_ms);
        self.lock().put(
            key.to_string(),
            Entry {
                chunks: value,
                expires_at_ms,
            },
        );
    }
}
