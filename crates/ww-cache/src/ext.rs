//! Typed accessors layered over raw-byte buckets.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::CacheBucket;

/// String and JSON helpers for any [`CacheBucket`].
///
/// Kept off the base trait so buckets stay object-safe and only deal in bytes.
pub trait CacheBucketExt: CacheBucket {
    /// Returns `None` on miss, etag mismatch, or a value that fails to decode.
    fn get_json<T: DeserializeOwned>(&self, key: &str, etag: &str) -> Option<T> {
        let bytes = self.get(key, etag)?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Values that fail to serialize are not stored.
    fn set_json<T: Serialize>(&self, key: &str, etag: &str, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(key, etag, &bytes),
            Err(e) => tracing::debug!(key, error = %e, "skipping cache write"),
        }
    }

    fn get_string(&self, key: &str, etag: &str) -> Option<String> {
        String::from_utf8(self.get(key, etag)?).ok()
    }

    fn set_string(&self, key: &str, etag: &str, value: &str) {
        self.set(key, etag, value.as_bytes());
    }
}

impl<B: CacheBucket + ?Sized> CacheBucketExt for B {}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::{Cache, MemoryCache};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        src: String,
        width: Option<u32>,
    }

    #[test]
    fn test_json_round_trip() {
        let bucket = MemoryCache::new().bucket("embeds");
        let entry = Entry {
            src: "data:image/svg+xml;base64,AA==".to_owned(),
            width: Some(300),
        };
        bucket.set_json("a.svg", "1", &entry);
        assert_eq!(bucket.get_json::<Entry>("a.svg", "1"), Some(entry));
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let bucket = MemoryCache::new().bucket("embeds");
        bucket.set("bin", "1", &[0xff, 0xfe]);
        assert_eq!(bucket.get_string("bin", "1"), None);
    }
}
