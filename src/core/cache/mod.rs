//! In-memory audio cache.
//!
//! Synthesized clips are kept in a strict LRU map so replaying a sentence,
//! seeking back or restarting after a rate change does not hit the network
//! again. Nothing is persisted.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use xxhash_rust::xxh3::xxh3_128;

use crate::core::tts::{AudioClip, ResponseFormat};

/// Default number of clips kept.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

// =============================================================================
// Cache Key
// =============================================================================

/// Digest of everything that influences the synthesized audio.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u128);

impl CacheKey {
    /// Rate participates with three decimals so float noise does not split
    /// entries.
    pub fn new(
        provider_id: &str,
        model: &str,
        voice: &str,
        format: ResponseFormat,
        rate: f32,
        text: &str,
    ) -> Self {
        let mut s = String::with_capacity(
            provider_id.len() + model.len() + voice.len() + text.len() + 24,
        );
        s.push_str(provider_id);
        s.push('|');
        s.push_str(model);
        s.push('|');
        s.push_str(voice);
        s.push('|');
        s.push_str(format.as_str());
        s.push('|');
        s.push_str(&format!("{rate:.3}"));
        s.push('|');
        s.push_str(text);
        Self(xxh3_128(s.as_bytes()))
    }

    pub fn digest(&self) -> String {
        format!("{:032x}", self.0)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.digest())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest())
    }
}

// =============================================================================
// Audio Cache
// =============================================================================

/// Strict LRU of synthesized clips.
///
/// Not synchronized; the scheduler keeps it inside its own locked state.
pub struct AudioCache {
    entries: LruCache<CacheKey, AudioClip>,
}

impl AudioCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Returns the clip and marks it most recently used.
    pub fn get(&mut self, key: &CacheKey) -> Option<AudioClip> {
        self.entries.get(key).cloned()
    }

    /// Whether `key` is cached, without touching recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    /// Inserts or refreshes `key`, evicting the least recently used entry
    /// when full. Returns the evicted key, if any.
    pub fn put(&mut self, key: CacheKey, clip: AudioClip) -> Option<CacheKey> {
        match self.entries.push(key, clip) {
            Some((evicted, _)) if evicted != key => Some(evicted),
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<AudioClip> {
        self.entries.pop(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for AudioCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl fmt::Debug for AudioCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> CacheKey {
        CacheKey::new("openai", "tts-1", "alloy", ResponseFormat::Mp3, 1.0, text)
    }

    fn clip(byte: u8) -> AudioClip {
        AudioClip::new("audio/mpeg", vec![byte; 4])
    }

    #[test]
    fn test_key_depends_on_every_field() {
        let base = key("hello");
        assert_eq!(base, key("hello"));
        assert_ne!(base, key("hello!"));
        assert_ne!(
            base,
            CacheKey::new("other", "tts-1", "alloy", ResponseFormat::Mp3, 1.0, "hello")
        );
        assert_ne!(
            base,
            CacheKey::new("openai", "tts-1", "nova", ResponseFormat::Mp3, 1.0, "hello")
        );
        assert_ne!(
            base,
            CacheKey::new("openai", "tts-1", "alloy", ResponseFormat::Wav, 1.0, "hello")
        );
        assert_ne!(
            base,
            CacheKey::new("openai", "tts-1", "alloy", ResponseFormat::Mp3, 1.25, "hello")
        );
    }

    #[test]
    fn test_key_rate_precision() {
        let a = CacheKey::new("p", "m", "v", ResponseFormat::Mp3, 1.0, "t");
        let b = CacheKey::new("p", "m", "v", ResponseFormat::Mp3, 1.000_01, "t");
        assert_eq!(a, b);
        assert_eq!(a.digest().len(), 32);
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut cache = AudioCache::new(2);
        assert_eq!(cache.put(key("a"), clip(1)), None);
        assert_eq!(cache.put(key("b"), clip(2)), None);

        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get(&key("a")).is_some());
        assert_eq!(cache.put(key("c"), clip(3)), Some(key("b")));

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_put_same_key_replaces_without_eviction() {
        let mut cache = AudioCache::new(1);
        cache.put(key("a"), clip(1));
        assert_eq!(cache.put(key("a"), clip(2)), None);
        assert_eq!(cache.get(&key("a")).unwrap().data[0], 2);
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let cache = AudioCache::new(0);
        assert_eq!(cache.capacity(), 1);
        assert!(cache.is_empty());
    }
}
