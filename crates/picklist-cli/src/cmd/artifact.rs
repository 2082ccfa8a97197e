//! `pk artifact`: work items whose fields carry list values.

use crate::cmd::Session;
use crate::cmd::set::{check_report, parse_assignments, submit, write_report};
use crate::output::render;
use clap::{Args, Subcommand};
use picklist_core::model::changeset::Artifact;
use picklist_core::update::{UpdateOptions, UpdateReport};
use serde::Serialize;

#[derive(Subcommand, Debug)]
pub enum ArtifactCommand {
    /// Create an artifact and record its first changeset.
    Create(ArtifactCreateArgs),
}

#[derive(Args, Debug)]
pub struct ArtifactCreateArgs {
    pub title: String,

    /// Initial values `field=value[,value...]` (repeatable). Untouched
    /// fields get their default values.
    #[arg(long = "set", value_name = "FIELD=VALUES")]
    pub assignments: Vec<String>,

    /// Skip permission checks on the initial values.
    #[arg(long)]
    pub bypass_permissions: bool,
}

#[derive(Debug, Serialize)]
struct CreatedArtifact {
    artifact: Artifact,
    update: UpdateReport,
}

pub fn run_artifact(command: &ArtifactCommand, session: &Session) -> anyhow::Result<()> {
    match command {
        ArtifactCommand::Create(args) => run_create(args, session),
    }
}

fn run_create(args: &ArtifactCreateArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let actor = session.require_actor(&store)?;
    let submitted = parse_assignments(&args.assignments, &store, session)?;
    let artifact = store
        .create_artifact(args.title.trim(), &actor)
        .map_err(|e| session.store_failure(&e))?;

    let report = submit(
        &store,
        session,
        artifact.id,
        &submitted,
        UpdateOptions {
            bypass_permissions: args.bypass_permissions,
        },
    )?;

    let created = CreatedArtifact {
        artifact,
        update: report,
    };
    render(session.output, &created, |c, w| {
        writeln!(w, "Created artifact #{}: {}", c.artifact.id, c.artifact.title)?;
        write_report(&c.update, w)
    })?;
    check_report(&created.update, session)
}
