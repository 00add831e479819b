//! `ww render` command implementation.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;

use crate::error::CliError;
use crate::output::Output;
use crate::session::{CommonArgs, Session, note_path};

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Note to render, as a file path or a vault-relative path.
    note: PathBuf,

    /// Write HTML here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if the note cannot be rendered or the HTML written.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let mut session = Session::open(&self.common)?;
        let path = note_path(session.vault_root(), &self.note)?;

        let rendered = session.render(&path).await?;
        output.warnings(&path, &rendered.warnings);
        write_html(self.output.as_deref(), &rendered.html)?;

        if let Some(file) = &self.output {
            output.success(&format!("Rendered {path} to {}", file.display()));
        }
        Ok(())
    }
}

/// Write `html` to `path`, or to stdout when no path is given.
pub(crate) fn write_html(path: Option<&Path>, html: &str) -> Result<(), CliError> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, html)?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(html.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_write_html_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out/article.html");
        write_html(Some(&path), "<p>x</p>").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<p>x</p>");
    }
}
