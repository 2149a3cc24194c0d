//! In-memory backend: a bounded LRU cache with no persistence.
//!
//! Used for ephemeral or test deployments where durability does not matter
//! and the operator would rather bound memory than disk. Capacity is fixed
//! at construction; once full, inserting a new key evicts the least recently
//! used one. `range` is intentionally unsupported here (see
//! [`crate`]'s design notes): an LRU's internal order is recency, not key
//! order, so a prefix scan would have to degrade to a full linear scan with
//! no upper bound on cost, unlike the other three backends' native
//! range support.

use super::{parse_counter, Backend, Direction, Limit};
use crate::error::{Error, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

pub struct InMemoryBackend {
    cache: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
    path: String,
}

impl InMemoryBackend {
    pub fn new(capacity: usize, label: &str) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        InMemoryBackend {
            cache: Mutex::new(LruCache::new(capacity)),
            path: label.to_string(),
        }
    }
}

impl Backend for InMemoryBackend {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut cache = self.cache.lock();
        let created = !cache.contains(key);
        cache.put(key.to_vec(), value.to_vec());
        Ok(created)
    }

    fn add(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut cache = self.cache.lock();
        if cache.contains(key) {
            return Err(Error::AlreadyExists);
        }
        cache.put(key.to_vec(), value.to_vec());
        Ok(true)
    }

    fn replace(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut cache = self.cache.lock();
        if !cache.contains(key) {
            return Err(Error::NotFound);
        }
        cache.put(key.to_vec(), value.to_vec());
        Ok(false)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.lock().get(key).cloned())
    }

    fn delete(&self, key: &[u8], only_if_exists: bool) -> Result<bool> {
        let removed = self.cache.lock().pop(key).is_some();
        if !removed {
            let _ = only_if_exists;
        }
        Ok(removed)
    }

    fn incr(&self, key: &[u8], delta: i64) -> Result<i64> {
        let mut cache = self.cache.lock();
        let current = cache.get(key).ok_or(Error::NotFound)?.clone();
        let value = parse_counter(&current)?;
        let updated = value.wrapping_add(delta);
        cache.put(key.to_vec(), updated.to_string().into_bytes());
        Ok(updated)
    }

    fn range(
        &self,
        _prefix: &[u8],
        _limit: Limit,
        _from: Option<&[u8]>,
        _direction: Direction,
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        Ok(BTreeMap::new())
    }

    fn flush(&self) -> Result<()> {
        self.cache.lock().clear();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> String {
        let cache = self.cache.lock();
        format!(
            "engine=inmemory-lru path={} len={} cap={}",
            self.path,
            cache.len(),
            cache.cap()
        )
    }

    fn db_path(&self) -> &str {
        &self.path
    }
}
