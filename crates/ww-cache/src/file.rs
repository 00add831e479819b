//! Cache persisted under a directory.
//!
//! Layout:
//!
//! ```text
//! {root}/
//! +-- VERSION          # format version; mismatch wipes the directory
//! +-- embeds/          # one directory per bucket
//!     +-- 3f5a...c1    # sha256(key) in hex
//! ```
//!
//! An entry file holds the etag on its first line followed by the raw value.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::{Cache, CacheBucket};

/// File-backed [`Cache`].
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open the cache at `root`, wiping it when its `VERSION` differs from
    /// `version`. Failures are logged and leave the cache usable but empty.
    #[must_use]
    pub fn new(root: PathBuf, version: &str) -> Self {
        ensure_version(&root, version);
        Self { root }
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileBucket {
            dir: self.root.join(name),
        })
    }
}

struct FileBucket {
    dir: PathBuf,
}

impl FileBucket {
    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(hex::encode(Sha256::digest(key.as_bytes())))
    }
}

impl CacheBucket for FileBucket {
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>> {
        let mut reader = BufReader::new(File::open(self.entry_path(key)).ok()?);

        let mut stored_etag = String::new();
        reader.read_line(&mut stored_etag).ok()?;
        let stored_etag = stored_etag.strip_suffix('\n')?;
        if !etag.is_empty() && stored_etag != etag {
            return None;
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data).ok()?;
        Some(data)
    }

    fn set(&self, key: &str, etag: &str, value: &[u8]) {
        if etag.contains('\n') {
            tracing::debug!(key, "etag with newline not cacheable");
            return;
        }
        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::debug!(dir = %self.dir.display(), error = %e, "cache directory unavailable");
            return;
        }

        let mut buf = Vec::with_capacity(etag.len() + 1 + value.len());
        buf.extend_from_slice(etag.as_bytes());
        buf.push(b'\n');
        buf.extend_from_slice(value);

        if let Err(e) = fs::write(self.entry_path(key), &buf) {
            tracing::debug!(key, error = %e, "cache write failed");
        }
    }

    fn invalidate(&self, key: &str) {
        let _ = fs::remove_file(self.entry_path(key));
    }
}

fn ensure_version(root: &Path, version: &str) {
    let version_file = root.join("VERSION");

    match fs::read_to_string(&version_file) {
        Ok(stored) if stored == version => return,
        Ok(stored) => {
            tracing::info!(stored = %stored, current = version, "cache version changed, wiping");
        }
        Err(_) => tracing::debug!(root = %root.display(), "initializing cache"),
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!(error = %e, "failed to remove cache directory");
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!(error = %e, "failed to create cache directory");
        return;
    }
    if let Err(e) = fs::write(&version_file, version) {
        tracing::warn!(error = %e, "failed to write cache VERSION file");
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_set_get_and_etag_mismatch() {
        let tmp = TempDir::new().unwrap();
        let bucket = FileCache::new(tmp.path().join("cache"), "1").bucket("embeds");

        bucket.set("notes/a.md", "etag1", b"<section>a</section>");
        assert_eq!(
            bucket.get("notes/a.md", "etag1"),
            Some(b"<section>a</section>".to_vec())
        );
        assert_eq!(bucket.get("notes/a.md", "etag2"), None);
        assert_eq!(bucket.get("notes/a.md", ""), Some(b"<section>a</section>".to_vec()));
    }

    #[test]
    fn test_binary_value_with_newlines() {
        let tmp = TempDir::new().unwrap();
        let bucket = FileCache::new(tmp.path().join("cache"), "1").bucket("embeds");
        let data = vec![0x00, b'\n', 0xff, b'\n'];
        bucket.set("bin", "e", &data);
        assert_eq!(bucket.get("bin", "e"), Some(data));
    }

    #[test]
    fn test_invalidate_removes_entry() {
        let tmp = TempDir::new().unwrap();
        let bucket = FileCache::new(tmp.path().join("cache"), "1").bucket("embeds");
        bucket.set("k", "e", b"v");
        bucket.invalidate("k");
        assert_eq!(bucket.get("k", "e"), None);
    }

    #[test]
    fn test_entries_survive_reopen_with_same_version() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        FileCache::new(root.clone(), "1").bucket("embeds").set("k", "e", b"kept");

        let reopened = FileCache::new(root, "1").bucket("embeds");
        assert_eq!(reopened.get("k", "e"), Some(b"kept".to_vec()));
    }

    #[test]
    fn test_version_change_wipes_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        FileCache::new(root.clone(), "1").bucket("embeds").set("k", "e", b"old");

        let reopened = FileCache::new(root.clone(), "2").bucket("embeds");
        assert_eq!(reopened.get("k", "e"), None);
        assert_eq!(fs::read_to_string(root.join("VERSION")).unwrap(), "2");
    }
}
