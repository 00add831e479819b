//! Configuration, vault and engine setup shared by every command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use ww_cache::{Cache, FileCache, NullCache};
use ww_config::{CliSettings, Config};
use ww_renderer::{FsVault, Note, RenderContext, RenderEngine, RenderOutput, StaticHost};

use crate::error::CliError;
use crate::VERSION;

/// Options accepted by every command.
#[derive(Args)]
pub(crate) struct CommonArgs {
    /// Path to configuration file (default: auto-discover ww.toml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Vault root directory (overrides config).
    #[arg(long, env = "WW_VAULT")]
    pub vault: Option<PathBuf>,

    /// HTML the host rendered for the note; borrowed constructs come from here.
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Show code line numbers unless the note says otherwise.
    #[arg(long)]
    pub line_numbers: bool,

    /// Disable the embed cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Keep correlating fragments when the snapshot counts do not match.
    #[arg(long)]
    pub lenient: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            vault_root: self.vault.clone(),
            line_numbers: self.line_numbers.then_some(true),
            cache_enabled: self.no_cache.then_some(false),
            strict_resource_counts: self.lenient.then_some(false),
        }
    }
}

/// Everything needed to render notes of one vault.
pub(crate) struct Session {
    pub config: Arc<Config>,
    pub context: RenderContext,
    pub engine: RenderEngine,
    snapshot_html: Option<String>,
    snapshot: Option<PathBuf>,
}

impl Session {
    /// Load configuration and build the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or snapshot cannot be read.
    pub(crate) fn open(args: &CommonArgs) -> Result<Self, CliError> {
        let config = Arc::new(Config::load(args.config.as_deref(), Some(&args.cli_settings()))?);
        let vault = Arc::new(FsVault::new(config.vault_resolved.root.clone()));
        let cache: Arc<dyn Cache> = if config.cache_resolved.enabled {
            Arc::new(FileCache::new(config.cache_resolved.dir.clone(), VERSION))
        } else {
            Arc::new(NullCache)
        };
        let context = RenderContext::new(Arc::clone(&config), vault).with_cache(cache);
        let engine = ww_extensions::default_engine(&context);
        let snapshot_html = load_snapshot(args.snapshot.as_deref())?;
        tracing::info!(
            vault = %config.vault_resolved.root.display(),
            extensions = ?engine.extension_names(),
            "Session ready"
        );
        Ok(Self {
            config,
            context,
            engine,
            snapshot_html,
            snapshot: args.snapshot.clone(),
        })
    }

    pub(crate) fn vault_root(&self) -> &Path {
        &self.config.vault_resolved.root
    }

    /// Re-read the snapshot file, keeping the previous one if it is gone.
    pub(crate) fn reload_snapshot(&mut self) {
        match load_snapshot(self.snapshot.as_deref()) {
            Ok(html) => self.snapshot_html = html,
            Err(e) => tracing::warn!(error = %e, "Keeping previous snapshot"),
        }
    }

    /// Render `path` and splice in embedded notes.
    ///
    /// The snapshot belongs to `path` only; embedded notes get no host
    /// fragments.
    ///
    /// # Errors
    ///
    /// Returns an error if the note cannot be read or the host is unavailable.
    pub(crate) async fn render(&mut self, path: &str) -> Result<RenderOutput, CliError> {
        let note = Note::load(self.context.vault.as_ref(), path).await?;
        let host = match &self.snapshot_html {
            Some(html) => StaticHost::for_note(path, html.clone()),
            None => StaticHost::empty(),
        };
        let mut output = self.engine.render(&note, &host).await?;
        self.engine
            .resolve_elements(&mut output, &host, self.context.vault.as_ref())
            .await?;
        Ok(output)
    }
}

fn load_snapshot(snapshot: Option<&Path>) -> Result<Option<String>, CliError> {
    snapshot
        .map(std::fs::read_to_string)
        .transpose()
        .map_err(CliError::from)
}

/// Vault-relative `/`-separated path for a note given on the command line.
///
/// Paths that exist on disk are made relative to the vault root; anything
/// else is taken as already vault-relative.
pub(crate) fn note_path(vault_root: &Path, note: &Path) -> Result<String, CliError> {
    let relative = if note.exists() {
        let note = note.canonicalize()?;
        let root = vault_root.canonicalize()?;
        note.strip_prefix(&root)
            .map_err(|_| {
                CliError::Validation(format!(
                    "{} is not inside the vault {}",
                    note.display(),
                    root.display()
                ))
            })?
            .to_path_buf()
    } else {
        note.to_path_buf()
    };
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return Err(CliError::Validation("note path is empty".to_owned()));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_note_path_relative_to_vault() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("notes")).unwrap();
        std::fs::write(tmp.path().join("notes/a.md"), "# A").unwrap();

        let path = note_path(tmp.path(), &tmp.path().join("notes/a.md")).unwrap();
        assert_eq!(path, "notes/a.md");
    }

    #[test]
    fn test_note_path_outside_vault() {
        let vault = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        std::fs::write(other.path().join("b.md"), "# B").unwrap();

        let result = note_path(vault.path(), &other.path().join("b.md"));
        assert!(matches!(result, Err(CliError::Validation(_))));
    }

    #[test]
    fn test_note_path_taken_as_vault_relative() {
        let vault = TempDir::new().unwrap();
        let path = note_path(vault.path(), Path::new("drafts/new.md")).unwrap();
        assert_eq!(path, "drafts/new.md");
    }
}
