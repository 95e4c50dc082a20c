//! Session store for loaded form pipelines.
//!
//! Extraction returns a session key so a later fill call can reuse the
//! already-parsed document instead of resolving and parsing the source again.
//! Sessions are LRU-evicted; an evicted key behaves like one that never
//! existed.

use crate::filler::FormFiller;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use uuid::Uuid;

pub struct SessionStore {
    inner: Mutex<LruCache<String, FormFiller>>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Store a pipeline under a fresh key and return the key.
    pub fn insert(&self, filler: FormFiller) -> String {
        let key = Uuid::new_v4().to_string();
        self.inner.lock().put(key.clone(), filler);
        key
    }

    /// Remove and return the pipeline for `key`. Callers put it back after
    /// use so the session stays live; holding it outside the lock lets
    /// blocking PDF work run without serializing other sessions.
    pub fn take(&self, key: &str) -> Option<FormFiller> {
        self.inner.lock().pop(key)
    }

    pub fn put_back(&self, key: &str, filler: FormFiller) {
        self.inner.lock().put(key.to_string(), filler);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_take_put_back_cycle() {
        let store = SessionStore::new(4);
        let key = store.insert(FormFiller::new());
        assert!(store.contains(&key));

        let filler = store.take(&key).unwrap();
        assert!(!store.contains(&key));

        store.put_back(&key, filler);
        assert!(store.contains(&key));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_key_yields_none() {
        let store = SessionStore::new(4);
        assert!(store.take("no-such-session").is_none());
    }

    #[test]
    fn test_lru_eviction_drops_oldest_session() {
        let store = SessionStore::new(2);
        let first = store.insert(FormFiller::new());
        let second = store.insert(FormFiller::new());
        let third = store.insert(FormFiller::new());

        assert!(!store.contains(&first));
        assert!(store.contains(&second));
        assert!(store.contains(&third));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_keys_are_unique() {
        let store = SessionStore::new(8);
        let a = store.insert(FormFiller::new());
        let b = store.insert(FormFiller::new());
        assert_ne!(a, b);
    }
}
