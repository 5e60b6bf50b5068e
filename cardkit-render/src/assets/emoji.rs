use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use super::write_atomic;

/// Emoji glyph identity: codepoint key plus the scale it was rendered at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmojiKey {
    pub codepoint: String,
    pub scale_milli: u32,
}

impl EmojiKey {
    pub fn new(codepoint: impl Into<String>, scale: f32) -> Self {
        Self {
            codepoint: codepoint.into(),
            scale_milli: (scale.max(0.0) * 1000.0).round() as u32,
        }
    }

    fn file_name(&self) -> String {
        format!("{}@{}.png", self.codepoint, self.scale_milli)
    }
}

/// Bounded in-memory LRU of emoji PNGs over an unbounded disk directory.
#[derive(Debug)]
pub struct EmojiCache {
    memory: Mutex<LruCache<EmojiKey, Arc<Vec<u8>>>>,
    dir: Option<PathBuf>,
}

impl EmojiCache {
    pub fn new(capacity: usize, dir: Option<PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(capacity)),
            dir,
        }
    }

    /// Memory first, then disk. A disk hit is promoted into memory.
    pub async fn get(&self, key: &EmojiKey) -> Option<Arc<Vec<u8>>> {
        if let Some(bytes) = self.memory.lock().await.get(key) {
            return Some(Arc::clone(bytes));
        }

        let path = self.dir.as_ref()?.join(key.file_name());
        let bytes = Arc::new(tokio::fs::read(&path).await.ok()?);
        debug!(emoji = %key.codepoint, "emoji served from disk cache");
        self.memory
            .lock()
            .await
            .put(key.clone(), Arc::clone(&bytes));
        Some(bytes)
    }

    pub async fn put(&self, key: EmojiKey, bytes: Vec<u8>) -> Arc<Vec<u8>> {
        let bytes = Arc::new(bytes);
        if let Some(dir) = &self.dir
            && let Err(e) = write_atomic(dir, &key.file_name(), &bytes).await
        {
            debug!(emoji = %key.codepoint, "emoji disk cache write failed: {e}");
        }
        self.memory.lock().await.put(key, Arc::clone(&bytes));
        bytes
    }

    pub async fn memory_len(&self) -> usize {
        self.memory.lock().await.len()
    }

    /// Membership check that does not touch recency.
    pub async fn contains(&self, key: &EmojiKey) -> bool {
        self.memory.lock().await.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: &str) -> EmojiKey {
        EmojiKey::new(code, 1.0)
    }

    #[tokio::test]
    async fn test_capacity_plus_one_evicts_oldest() {
        let cache = EmojiCache::new(3, None);
        for code in ["a", "b", "c", "d"] {
            cache.put(key(code), code.as_bytes().to_vec()).await;
        }
        assert_eq!(cache.memory_len().await, 3);
        assert!(!cache.contains(&key("a")).await);
        for code in ["b", "c", "d"] {
            assert!(cache.contains(&key(code)).await);
        }
    }

    #[tokio::test]
    async fn test_access_refreshes_recency() {
        let cache = EmojiCache::new(3, None);
        for code in ["a", "b", "c"] {
            cache.put(key(code), code.as_bytes().to_vec()).await;
        }
        assert!(cache.get(&key("a")).await.is_some());
        cache.put(key("d"), b"d".to_vec()).await;
        assert!(cache.contains(&key("a")).await);
        assert!(!cache.contains(&key("b")).await);
    }

    #[tokio::test]
    async fn test_disk_backs_memory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmojiCache::new(1, Some(dir.path().to_path_buf()));
        cache.put(key("a"), b"alpha".to_vec()).await;
        cache.put(key("b"), b"beta".to_vec()).await;
        assert!(!cache.contains(&key("a")).await);

        let bytes = cache.get(&key("a")).await.unwrap();
        assert_eq!(bytes.as_slice(), b"alpha");
        assert!(dir.path().join("a@1000.png").exists());
    }

    #[test]
    fn test_key_scale_rounding() {
        assert_eq!(EmojiKey::new("1f600", 1.5).scale_milli, 1500);
        assert_eq!(EmojiKey::new("1f600", 0.3334).scale_milli, 333);
    }
}
