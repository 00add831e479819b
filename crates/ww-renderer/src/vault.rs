//! Access to the note vault: file contents, link resolution, versions.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::VaultError;

/// The store notes and attachments live in.
///
/// Paths are vault-relative with `/` separators.
#[async_trait]
pub trait Vault: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>, VaultError>;

    async fn read_to_string(&self, path: &str) -> Result<String, VaultError> {
        String::from_utf8(self.read(path).await?).map_err(|_| VaultError::InvalidUtf8(path.to_owned()))
    }

    /// Resolve a wiki link target as written in the note at `from`.
    fn resolve(&self, link: &str, from: &str) -> Option<String>;

    /// URL an `<img>` in the rendered article can load `path` from.
    fn resource_url(&self, path: &str) -> String;

    /// Opaque version string that changes whenever the file changes.
    async fn version(&self, path: &str) -> Option<String>;
}

/// Vault backed by a directory.
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, VaultError> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(VaultError::OutsideVault(path.to_owned()));
        }
        Ok(self.root.join(relative))
    }

    /// Depth-first search for a file named `name`, skipping hidden entries.
    fn find_by_name(&self, dir: &Path, name: &str) -> Option<PathBuf> {
        let mut entries: Vec<_> = std::fs::read_dir(dir).ok()?.filter_map(Result::ok).collect();
        entries.sort_by_key(std::fs::DirEntry::file_name);
        let mut subdirs = Vec::new();
        for entry in entries {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                subdirs.push(path);
            } else if file_name == name {
                return Some(path);
            }
        }
        subdirs.iter().find_map(|sub| self.find_by_name(sub, name))
    }

    fn to_vault_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        Some(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        )
    }
}

#[async_trait]
impl Vault for FsVault {
    async fn read(&self, path: &str) -> Result<Vec<u8>, VaultError> {
        let full = self.full_path(path)?;
        tokio::fs::read(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::NotFound(path.to_owned())
            } else {
                VaultError::Io {
                    path: path.to_owned(),
                    source: e,
                }
            }
        })
    }

    fn resolve(&self, link: &str, from: &str) -> Option<String> {
        let link = link.trim().trim_start_matches('/');
        if link.is_empty() {
            return None;
        }
        let with_md = if Path::new(link).extension().is_none() {
            Some(format!("{link}.md"))
        } else {
            None
        };
        let names: Vec<&str> = std::iter::once(link).chain(with_md.as_deref()).collect();

        let from_dir = Path::new(from).parent().unwrap_or(Path::new(""));
        for name in &names {
            for candidate in [PathBuf::from(name), from_dir.join(name)] {
                if let Ok(full) = self.full_path(&candidate.to_string_lossy())
                    && full.is_file()
                {
                    return self.to_vault_path(&full);
                }
            }
        }

        names.iter().find_map(|name| {
            let file_name = Path::new(name).file_name()?.to_string_lossy().into_owned();
            let found = self.find_by_name(&self.root, &file_name)?;
            self.to_vault_path(&found)
        })
    }

    fn resource_url(&self, path: &str) -> String {
        match self.full_path(path) {
            Ok(full) => format!("file://{}", full.display()),
            Err(_) => path.to_owned(),
        }
    }

    async fn version(&self, path: &str) -> Option<String> {
        let full = self.full_path(path).ok()?;
        let meta = tokio::fs::metadata(&full).await.ok()?;
        let modified = meta.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
        Some(format!("{}-{}", modified.as_nanos(), meta.len()))
    }
}

/// In-memory vault for tests and previews of unsaved content.
#[derive(Clone, Debug, Default)]
pub struct MemoryVault {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }
}

#[async_trait]
impl Vault for MemoryVault {
    async fn read(&self, path: &str) -> Result<Vec<u8>, VaultError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(path.to_owned()))
    }

    fn resolve(&self, link: &str, _from: &str) -> Option<String> {
        let link = link.trim().trim_start_matches('/');
        let with_md = format!("{link}.md");
        [link, with_md.as_str()].into_iter().find_map(|candidate| {
            if self.files.contains_key(candidate) {
                return Some(candidate.to_owned());
            }
            self.files
                .keys()
                .find(|key| key.rsplit('/').next() == Some(candidate))
                .cloned()
        })
    }

    fn resource_url(&self, path: &str) -> String {
        format!("vault://{path}")
    }

    async fn version(&self, path: &str) -> Option<String> {
        let content = self.files.get(path)?;
        Some(hex::encode(&Sha256::digest(content)[..8]))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn fs_vault() -> (TempDir, FsVault) {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("notes/sub")).unwrap();
        std::fs::create_dir_all(tmp.path().join("assets")).unwrap();
        std::fs::write(tmp.path().join("notes/a.md"), "# A").unwrap();
        std::fs::write(tmp.path().join("notes/sub/b.md"), "# B").unwrap();
        std::fs::write(tmp.path().join("assets/pic.png"), [0u8, 1, 2]).unwrap();
        let vault = FsVault::new(tmp.path());
        (tmp, vault)
    }

    #[tokio::test]
    async fn test_fs_read_and_missing() {
        let (_tmp, vault) = fs_vault();
        assert_eq!(vault.read_to_string("notes/a.md").await.unwrap(), "# A");
        assert!(matches!(
            vault.read("notes/zzz.md").await,
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(
            vault.read("../etc/passwd").await,
            Err(VaultError::OutsideVault(_))
        ));
    }

    #[test]
    fn test_fs_resolve() {
        let (_tmp, vault) = fs_vault();
        assert_eq!(vault.resolve("notes/a", "x.md").as_deref(), Some("notes/a.md"));
        assert_eq!(vault.resolve("a", "notes/c.md").as_deref(), Some("notes/a.md"));
        assert_eq!(vault.resolve("b", "x.md").as_deref(), Some("notes/sub/b.md"));
        assert_eq!(vault.resolve("pic.png", "notes/a.md").as_deref(), Some("assets/pic.png"));
        assert_eq!(vault.resolve("nope", "notes/a.md"), None);
    }

    #[tokio::test]
    async fn test_fs_version_changes_with_content() {
        let (tmp, vault) = fs_vault();
        let before = vault.version("notes/a.md").await.unwrap();
        std::fs::write(tmp.path().join("notes/a.md"), "# A changed").unwrap();
        let after = vault.version("notes/a.md").await.unwrap();
        assert_ne!(before, after);
        assert!(vault.version("missing.md").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_vault() {
        let vault = MemoryVault::new()
            .with_file("notes/a.md", "# A")
            .with_file("img/x.svg", "<svg/>");
        assert_eq!(vault.resolve("a", "b.md").as_deref(), Some("notes/a.md"));
        assert_eq!(vault.resolve("x.svg", "b.md").as_deref(), Some("img/x.svg"));
        assert_eq!(vault.resource_url("img/x.svg"), "vault://img/x.svg");
        let v1 = vault.version("notes/a.md").await.unwrap();
        let changed = vault.clone().with_file("notes/a.md", "# B");
        assert_ne!(v1, changed.version("notes/a.md").await.unwrap());
    }
}
