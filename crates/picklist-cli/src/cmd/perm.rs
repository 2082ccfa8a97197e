//! `pk perm`: field permissions granted to groups.

use crate::cmd::Session;
use crate::output::render;
use clap::{Args, Subcommand};
use picklist_core::context::Access;
use serde_json::json;

#[derive(Subcommand, Debug)]
pub enum PermCommand {
    /// Grant read, submit or update access on a field to a group.
    Grant(GrantArgs),
}

#[derive(Args, Debug)]
pub struct GrantArgs {
    /// Field name or id.
    pub field: String,

    /// Group name.
    pub group: String,

    /// Access kinds: read, submit, update.
    #[arg(required = true, num_args = 1..)]
    pub access: Vec<Access>,
}

pub fn run_perm(command: &PermCommand, session: &Session) -> anyhow::Result<()> {
    match command {
        PermCommand::Grant(args) => run_grant(args, session),
    }
}

fn run_grant(args: &GrantArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let field = session.field(&store, &args.field)?;
    let group = store
        .group_by_name(&args.group)
        .map_err(|e| session.store_failure(&e))?;
    for access in &args.access {
        store
            .grant(field.id, group, *access)
            .map_err(|e| session.store_failure(&e))?;
    }

    let access: Vec<&str> = args.access.iter().map(|a| a.as_str()).collect();
    let val = json!({ "field": field.name, "group": args.group, "access": access });
    render(session.output, &val, |_, w| {
        writeln!(w, "Granted {} on {} to {}", access.join(", "), field.name, args.group)
    })
}
