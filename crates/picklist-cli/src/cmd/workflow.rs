//! `pk workflow`: transition rules of a field.

use crate::cmd::{Session, resolve_value};
use crate::output::{CliError, fail, render};
use clap::{Args, Subcommand};
use picklist_core::bind::BindValueStore;
use picklist_core::error::ErrorCode;
use picklist_core::model::field::Field;
use picklist_core::model::ids::ValueId;
use picklist_core::workflow::Workflow;
use serde::Serialize;
use serde_json::json;

#[derive(Subcommand, Debug)]
pub enum WorkflowCommand {
    /// Enforce the field's transitions.
    Enable(WorkflowFieldArgs),
    /// Keep the transitions but stop enforcing them.
    Disable(WorkflowFieldArgs),
    /// Add an allowed transition.
    AddTransition(AddTransitionArgs),
    /// List the field's transitions.
    Show(WorkflowFieldArgs),
}

#[derive(Args, Debug)]
pub struct WorkflowFieldArgs {
    /// Field name or id.
    pub field: String,
}

#[derive(Args, Debug)]
pub struct AddTransitionArgs {
    /// Field name or id.
    pub field: String,

    /// Source value; omit (or pass `none`) for the initial transition.
    #[arg(long)]
    pub from: Option<String>,

    /// Target value.
    #[arg(long)]
    pub to: String,

    /// Groups allowed to make the transition (repeatable).
    #[arg(long = "group")]
    pub groups: Vec<String>,
}

pub fn run_workflow(command: &WorkflowCommand, session: &Session) -> anyhow::Result<()> {
    match command {
        WorkflowCommand::Enable(args) => set_enabled(args, true, session),
        WorkflowCommand::Disable(args) => set_enabled(args, false, session),
        WorkflowCommand::AddTransition(args) => run_add_transition(args, session),
        WorkflowCommand::Show(args) => run_show(args, session),
    }
}

fn set_enabled(args: &WorkflowFieldArgs, enabled: bool, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let field = session.field(&store, &args.field)?;
    store
        .set_workflow_enabled(field.id, enabled)
        .map_err(|e| session.store_failure(&e))?;

    let val = json!({ "field": field.name, "enabled": enabled });
    render(session.output, &val, |_, w| {
        let state = if enabled { "enabled" } else { "disabled" };
        writeln!(w, "Workflow {state} on {}", field.name)
    })
}

fn value_id(values: &BindValueStore, field: &Field, token: &str, session: &Session) -> anyhow::Result<ValueId> {
    resolve_value(values, token)
        .filter(|id| !id.is_none_sentinel())
        .ok_or_else(|| {
            fail(
                session.output,
                CliError::with_code(
                    format!("'{token}' is not a value of the field {}", field.label),
                    ErrorCode::BindValueNotFound,
                ),
            )
        })
}

fn run_add_transition(args: &AddTransitionArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let field = session.field(&store, &args.field)?;
    let values = session.value_store(&store, &field)?;

    let from = match args.from.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(token) if token.eq_ignore_ascii_case("none") => None,
        Some(token) => Some(value_id(&values, &field, token, session)?),
    };
    let to = value_id(&values, &field, &args.to, session)?;
    let groups = args
        .groups
        .iter()
        .map(|name| store.group_by_name(name).map_err(|e| session.store_failure(&e)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let transition_id = store
        .add_transition(field.id, from, to, &groups)
        .map_err(|e| session.store_failure(&e))?;

    let from_label = from.map_or_else(|| values.none_label().to_string(), |id| label(&values, id));
    let to_label = label(&values, to);
    let val = json!({
        "id": transition_id,
        "field": field.name,
        "from": from,
        "to": to,
        "groups": args.groups,
    });
    render(session.output, &val, |_, w| {
        writeln!(w, "Transition {from_label} -> {to_label} saved on {}", field.name)
    })
}

#[derive(Debug, Serialize)]
struct TransitionRow {
    id: i64,
    from: String,
    to: String,
    groups: Vec<String>,
}

fn run_show(args: &WorkflowFieldArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let field = session.field(&store, &args.field)?;
    let values = session.value_store(&store, &field)?;
    let workflow = store
        .workflow(field.id)
        .map_err(|e| session.store_failure(&e))?
        .unwrap_or_else(|| Workflow::new(field.id, false));

    let mut rows = Vec::with_capacity(workflow.transitions.len());
    for t in &workflow.transitions {
        let groups = t
            .authorized_groups
            .iter()
            .map(|&group| store.group_name(group))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| session.store_failure(&e))?;
        rows.push(TransitionRow {
            id: t.id.get(),
            from: t.from.map_or_else(|| values.none_label().to_string(), |id| label(&values, id)),
            to: label(&values, t.to),
            groups,
        });
    }
    let val = json!({ "field": field.name, "enabled": workflow.enabled, "transitions": &rows });
    render(session.output, &val, |_, w| {
        let state = if workflow.enabled { "enabled" } else { "disabled" };
        writeln!(w, "{} workflow: {state}", field.display_name())?;
        for row in &rows {
            let groups = if row.groups.is_empty() {
                "any group".to_string()
            } else {
                row.groups.join(", ")
            };
            writeln!(w, "  {} -> {}  ({groups})", row.from, row.to)?;
        }
        Ok(())
    })
}

fn label(values: &BindValueStore, id: ValueId) -> String {
    values.label_for(id).unwrap_or_else(|| format!("#{id}"))
}
