//! `ww watch` command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use notify::{RecursiveMode, Watcher};
use ww_extensions::invalidate_embed_cache;

use crate::commands::render::write_html;
use crate::debouncer::{ChangeDebouncer, ChangeKind};
use crate::error::CliError;
use crate::output::Output;
use crate::session::{CommonArgs, Session, note_path};

const DEBOUNCE: Duration = Duration::from_millis(150);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Arguments for the watch command.
#[derive(Args)]
pub(crate) struct WatchArgs {
    /// Note to render, as a file path or a vault-relative path.
    note: PathBuf,

    /// File the HTML is written to after every render.
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Paths whose changes must not trigger a render.
struct Ignored {
    output: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
}

impl Ignored {
    fn contains(&self, path: &Path) -> bool {
        self.output.as_deref() == Some(path)
            || self
                .cache_dir
                .as_deref()
                .is_some_and(|dir| path.starts_with(dir))
            || path
                .components()
                .any(|c| c.as_os_str().to_str().is_some_and(|s| s == ".git"))
    }
}

impl WatchArgs {
    /// Execute the watch command. Runs until the process is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the first render fails or the vault cannot be watched.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let mut session = Session::open(&self.common)?;
        let path = note_path(session.vault_root(), &self.note)?;

        render_once(&mut session, &path, &self.output, &output).await?;

        let vault_root = session.vault_root().canonicalize()?;
        let snapshot = self
            .common
            .snapshot
            .as_deref()
            .map(Path::canonicalize)
            .transpose()?;
        let ignored = Ignored {
            output: self.output.canonicalize().ok(),
            cache_dir: session.config.cache_resolved.dir.canonicalize().ok(),
        };

        let debouncer = Arc::new(ChangeDebouncer::new(DEBOUNCE));
        let watcher_debouncer = Arc::clone(&debouncer);
        let mut watcher = notify::recommended_watcher(move |res| {
            watcher_debouncer.record_notify(res);
        })?;
        watcher.watch(&vault_root, RecursiveMode::Recursive)?;
        if let Some(snapshot) = &snapshot {
            watcher.watch(snapshot, RecursiveMode::NonRecursive)?;
        }

        output.highlight(&format!(
            "Watching {} for changes to {path}",
            vault_root.display()
        ));

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            // Events arriving while a render runs stay pending and are
            // drained together afterwards, so bursts collapse into one render.
            let changes: Vec<_> = debouncer
                .drain_ready()
                .into_iter()
                .filter(|change| !ignored.contains(&change.path))
                .collect();
            if changes.is_empty() {
                continue;
            }

            for change in &changes {
                if snapshot.as_deref() == Some(change.path.as_path()) {
                    session.reload_snapshot();
                    continue;
                }
                let Some(rel) = vault_relative(&vault_root, &change.path) else {
                    continue;
                };
                invalidate_embed_cache(session.context.cache.as_ref(), &rel);
                tracing::info!(path = %rel, kind = ?change.kind, "Vault change");
                if change.kind == ChangeKind::Removed && rel == path {
                    output.warning(&format!("{path} was removed"));
                }
            }

            if let Err(e) = render_once(&mut session, &path, &self.output, &output).await {
                output.error(&format!("Render failed: {e}"));
            }
        }
    }
}

async fn render_once(
    session: &mut Session,
    path: &str,
    file: &Path,
    output: &Output,
) -> Result<(), CliError> {
    let rendered = session.render(path).await?;
    output.warnings(path, &rendered.warnings);
    write_html(Some(file), &rendered.html)?;
    output.success(&format!("Rendered {path} to {}", file.display()));
    Ok(())
}

/// Vault-relative `/`-separated form of an absolute path under `root`.
fn vault_relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_vault_relative() {
        let root = Path::new("/vault");
        assert_eq!(
            vault_relative(root, Path::new("/vault/a/b.svg")).as_deref(),
            Some("a/b.svg")
        );
        assert_eq!(vault_relative(root, Path::new("/other/b.svg")), None);
        assert_eq!(vault_relative(root, root), None);
    }

    #[test]
    fn test_ignored_paths() {
        let ignored = Ignored {
            output: Some(PathBuf::from("/vault/out.html")),
            cache_dir: Some(PathBuf::from("/vault/.wewrite/cache")),
        };
        assert!(ignored.contains(Path::new("/vault/out.html")));
        assert!(ignored.contains(Path::new("/vault/.wewrite/cache/embeds/ab")));
        assert!(ignored.contains(Path::new("/vault/.git/index")));
        assert!(!ignored.contains(Path::new("/vault/note.md")));
    }
}
