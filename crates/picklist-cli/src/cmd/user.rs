//! `pk user`: project users.

use crate::cmd::Session;
use crate::output::render;
use clap::{Args, Subcommand};
use serde::Serialize;

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user; they join the project members group.
    Create(UserCreateArgs),
}

#[derive(Args, Debug)]
pub struct UserCreateArgs {
    /// Login name.
    pub login: String,

    /// Display name, shown as `Real Name (login)` in user-bound fields.
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatedUser<'a> {
    id: i64,
    login: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

pub fn run_user(command: &UserCommand, session: &Session) -> anyhow::Result<()> {
    match command {
        UserCommand::Create(args) => run_create(args, session),
    }
}

fn run_create(args: &UserCreateArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let user_id = store
        .create_user(&args.login, args.name.as_deref())
        .map_err(|e| session.store_failure(&e))?;

    let created = CreatedUser {
        id: user_id.get(),
        login: args.login.trim(),
        name: args.name.as_deref(),
    };
    render(session.output, &created, |u, w| {
        writeln!(w, "Created user {} (#{})", u.login, u.id)
    })
}
