//! `ww check` command implementation.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use ww_renderer::{Note, ResourceCount, Snapshot};

use crate::error::CliError;
use crate::output::Output;
use crate::session::{CommonArgs, Session, note_path};

/// Arguments for the check command.
#[derive(Args)]
pub(crate) struct CheckArgs {
    /// Note to check, as a file path or a vault-relative path.
    note: PathBuf,

    /// Print the counts as JSON on stdout.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// One row of the check report.
#[derive(Debug, Serialize)]
struct CountReport<'a> {
    selector: &'a str,
    demanded: usize,
    available: usize,
}

impl<'a> From<&'a ResourceCount> for CountReport<'a> {
    fn from(count: &'a ResourceCount) -> Self {
        Self {
            selector: count.selector,
            demanded: count.demanded,
            available: count.available,
        }
    }
}

impl CheckArgs {
    /// Execute the check command.
    ///
    /// # Errors
    ///
    /// Returns an error if inputs cannot be read or any selector count differs.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let Some(snapshot_path) = self.common.snapshot.clone() else {
            return Err(CliError::Validation(
                "check needs the host snapshot (--snapshot FILE)".to_owned(),
            ));
        };
        let session = Session::open(&self.common)?;
        let path = note_path(session.vault_root(), &self.note)?;

        let note = Note::load(session.context.vault.as_ref(), &path).await?;
        let html = std::fs::read_to_string(&snapshot_path)?;
        let snapshot = Snapshot::parse(&path, &html);
        let counts = session.engine.check_resources(&note.markdown, &snapshot);

        if self.json {
            let report: Vec<CountReport<'_>> = counts.iter().map(CountReport::from).collect();
            let json = serde_json::to_string_pretty(&report)?;
            crate::commands::render::write_html(None, &format!("{json}\n"))?;
        } else {
            output.highlight(&format!("{path} against {}", snapshot_path.display()));
            if counts.is_empty() {
                output.info("No borrowed fragments needed");
            }
            for count in &counts {
                let line = format!(
                    "  {}: {} in note, {} in snapshot",
                    count.selector, count.demanded, count.available
                );
                if count.matches() {
                    output.success(&line);
                } else {
                    output.warning(&line);
                }
            }
        }

        let drifted = counts.iter().filter(|c| !c.matches()).count();
        if drifted > 0 {
            return Err(CliError::Validation(format!(
                "{drifted} selector(s) do not match the snapshot"
            )));
        }
        Ok(())
    }
}
