//! `pk show`: current values of an artifact's fields.

use crate::cmd::Session;
use crate::output::{render, text_kv};
use clap::Args;
use picklist_core::model::changeset::Artifact;
use picklist_core::model::ids::ArtifactId;
use picklist_core::update::FieldSnapshot;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Artifact id.
    pub artifact: ArtifactId,
}

#[derive(Debug, Serialize)]
struct ArtifactView {
    #[serde(flatten)]
    artifact: Artifact,
    fields: Vec<FieldSnapshot>,
}

/// Fields the actor cannot read are left out.
pub fn run_show(args: &ShowArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let artifact = store
        .artifact(args.artifact)
        .map_err(|e| session.store_failure(&e))?;
    let actor = session.require_actor(&store)?;
    let fields = session
        .updater(&store)
        .snapshot(actor, artifact.id)
        .map_err(|e| session.store_failure(&e))?;
    let none_label = session.config.project.history.none_label.clone();

    let view = ArtifactView { artifact, fields };
    render(session.output, &view, |v, w| {
        writeln!(w, "#{} {}", v.artifact.id, v.artifact.title)?;
        for snapshot in &v.fields {
            let shown = if snapshot.labels.is_empty() {
                none_label.clone()
            } else {
                snapshot.labels.join(", ")
            };
            text_kv(w, &snapshot.field.name, shown)?;
        }
        Ok(())
    })
}
