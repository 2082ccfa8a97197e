//! `pk group`: user groups used by permissions and transitions.

use crate::cmd::Session;
use crate::output::render;
use clap::{Args, Subcommand};
use serde_json::json;

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Create a user group.
    Create(GroupCreateArgs),
    /// Add a user to a group.
    AddMember(AddMemberArgs),
}

#[derive(Args, Debug)]
pub struct GroupCreateArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct AddMemberArgs {
    /// Group name.
    pub group: String,
    /// User login.
    pub login: String,
}

pub fn run_group(command: &GroupCommand, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    match command {
        GroupCommand::Create(args) => {
            let id = store
                .create_group(&args.name)
                .map_err(|e| session.store_failure(&e))?;
            let val = json!({ "id": id, "name": args.name.trim() });
            render(session.output, &val, |v, w| {
                writeln!(w, "Created group {} (#{})", args.name.trim(), v["id"])
            })
        }
        GroupCommand::AddMember(args) => {
            let group = store
                .group_by_name(&args.group)
                .map_err(|e| session.store_failure(&e))?;
            let user = store.actor(&args.login).map_err(|e| session.store_failure(&e))?;
            let added = store
                .add_member(group, user.id)
                .map_err(|e| session.store_failure(&e))?;
            let val = json!({ "group": args.group, "login": user.login, "added": added });
            render(session.output, &val, |_, w| {
                if added {
                    writeln!(w, "Added {} to {}", args.login, args.group)
                } else {
                    writeln!(w, "{} is already a member of {}", args.login, args.group)
                }
            })
        }
    }
}
