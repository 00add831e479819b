//! In-process cache shared between bucket handles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{Cache, CacheBucket};

type Entries = HashMap<String, (String, Vec<u8>)>;

/// [`Cache`] held in memory for the life of the process.
///
/// Clones and repeated [`Cache::bucket`] calls see the same entries, so a
/// file watcher can invalidate what the renderer stored.
#[derive(Clone, Default)]
pub struct MemoryCache {
    buckets: Arc<Mutex<HashMap<String, Arc<Mutex<Entries>>>>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop `key` from every bucket.
    pub fn invalidate_everywhere(&self, key: &str) {
        let Ok(buckets) = self.buckets.lock() else {
            return;
        };
        for entries in buckets.values() {
            if let Ok(mut entries) = entries.lock() {
                entries.remove(key);
            }
        }
    }
}

impl Cache for MemoryCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        let entries = match self.buckets.lock() {
            Ok(mut buckets) => Arc::clone(buckets.entry(name.to_owned()).or_default()),
            // A poisoned registry degrades to a private, empty bucket.
            Err(_) => Arc::default(),
        };
        Box::new(MemoryBucket { entries })
    }
}

struct MemoryBucket {
    entries: Arc<Mutex<Entries>>,
}

impl CacheBucket for MemoryBucket {
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().ok()?;
        let (stored_etag, value) = entries.get(key)?;
        (etag.is_empty() || stored_etag == etag).then(|| value.clone())
    }

    fn set(&self, key: &str, etag: &str, value: &[u8]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_owned(), (etag.to_owned(), value.to_vec()));
        }
    }

    fn invalidate(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}
