#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::Session;
use output::{CliError, OutputMode, render_error};
use picklist_core::config::resolve_config;
use picklist_core::error::ErrorCode;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "pk: list fields, workflows and changeset history for work items",
    long_about = None
)]
struct Cli {
    /// Enable debug logging for picklist crates.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Act as this login (overrides PICKLIST_ACTOR and the user config).
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a picklist project",
        after_help = "EXAMPLES:\n    pk init\n    pk init --force --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Manage list fields and their values",
        after_help = "EXAMPLES:\n    pk field create status --label Status\n    pk field add-value status Open --default\n    pk field values status"
    )]
    Field {
        #[command(subcommand)]
        command: cmd::field::FieldCommand,
    },

    #[command(next_help_heading = "Setup", about = "Manage users")]
    User {
        #[command(subcommand)]
        command: cmd::user::UserCommand,
    },

    #[command(next_help_heading = "Setup", about = "Manage user groups")]
    Group {
        #[command(subcommand)]
        command: cmd::group::GroupCommand,
    },

    #[command(
        next_help_heading = "Setup",
        about = "Grant field permissions",
        after_help = "EXAMPLES:\n    pk perm grant status developers read submit update"
    )]
    Perm {
        #[command(subcommand)]
        command: cmd::perm::PermCommand,
    },

    #[command(
        next_help_heading = "Setup",
        about = "Configure field workflows",
        after_help = "EXAMPLES:\n    pk workflow add-transition status --to Open\n    pk workflow add-transition status --from Open --to Closed --group leads\n    pk workflow enable status"
    )]
    Workflow {
        #[command(subcommand)]
        command: cmd::workflow::WorkflowCommand,
    },

    #[command(
        next_help_heading = "Artifacts",
        about = "Create artifacts",
        after_help = "EXAMPLES:\n    pk artifact create \"Login page crashes\" --set status=Open"
    )]
    Artifact {
        #[command(subcommand)]
        command: cmd::artifact::ArtifactCommand,
    },

    #[command(
        next_help_heading = "Artifacts",
        about = "Record new field values on an artifact",
        after_help = "EXAMPLES:\n    pk set 1 status=Closed\n    pk set 1 platforms=Linux,macOS severity="
    )]
    Set(cmd::set::SetArgs),

    #[command(
        next_help_heading = "Artifacts",
        about = "Show an artifact's current values"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Artifacts",
        about = "Show the change history of one field",
        after_help = "EXAMPLES:\n    pk history 1 status"
    )]
    History(cmd::history::HistoryArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("PICKLIST_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "picklist=debug,info"
        } else {
            "picklist=info,warn"
        })
    });

    let format = env::var("PICKLIST_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_root = env::current_dir()?;
    let config = match resolve_config(&project_root, cli.json) {
        Ok(config) => config,
        Err(e) => {
            let output = if cli.json { OutputMode::Json } else { OutputMode::Text };
            render_error(
                output,
                &CliError::with_code(format!("{e:#}"), ErrorCode::ConfigParseError),
            )?;
            return Err(e);
        }
    };
    debug!(output = %config.resolved_output, "resolved configuration");

    let session = Session::new(project_root, config, cli.actor);
    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, session.output, &session.project_root),
        Commands::Field { command } => cmd::field::run_field(command, &session),
        Commands::User { command } => cmd::user::run_user(command, &session),
        Commands::Group { command } => cmd::group::run_group(command, &session),
        Commands::Perm { command } => cmd::perm::run_perm(command, &session),
        Commands::Workflow { command } => cmd::workflow::run_workflow(command, &session),
        Commands::Artifact { command } => cmd::artifact::run_artifact(command, &session),
        Commands::Set(args) => cmd::set::run_set(args, &session),
        Commands::Show(args) => cmd::show::run_show(args, &session),
        Commands::History(args) => cmd::history::run_history(args, &session),
    }
}
