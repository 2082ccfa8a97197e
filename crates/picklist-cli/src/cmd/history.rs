//! `pk history`: the audit trail of one field on an artifact.

use crate::cmd::Session;
use crate::output::render;
use clap::Args;
use picklist_core::model::ids::ArtifactId;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Artifact id.
    pub artifact: ArtifactId,

    /// Field name or id.
    pub field: String,
}

pub fn run_history(args: &HistoryArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    store
        .artifact(args.artifact)
        .map_err(|e| session.store_failure(&e))?;
    let field = session.field(&store, &args.field)?;
    let entries = session
        .updater(&store)
        .history(args.artifact, &field)
        .map_err(|e| session.store_failure(&e))?;

    render(session.output, &entries, |entries, w| {
        if entries.is_empty() {
            return writeln!(w, "{}: no changes", field.name);
        }
        for entry in entries {
            let mut lines = entry.rendered.lines();
            let first = lines.next().unwrap_or_default();
            let prefix = format!("#{}", entry.changeset.id);
            writeln!(w, "{prefix}  {first}")?;
            for line in lines {
                writeln!(w, "{:width$}  {line}", "", width = prefix.len())?;
            }
        }
        Ok(())
    })
}
