//! `pk field`: list field definitions and their allowed values.

use crate::cmd::Session;
use crate::output::{CliError, fail, render, text_kv};
use clap::{Args, Subcommand};
use picklist_core::db::store::{NewBindValue, NewField};
use picklist_core::error::ErrorCode;
use picklist_core::model::field::{BindKind, Field};
use picklist_core::model::value::{BindValue, Decorator};
use picklist_core::repo::ArtifactRepository;
use serde::Serialize;

#[derive(Subcommand, Debug)]
pub enum FieldCommand {
    /// Create a list field.
    Create(FieldCreateArgs),
    /// Add an allowed value to a field.
    AddValue(AddValueArgs),
    /// List a field's selectable values.
    Values(ValuesArgs),
    /// Show one field, or every field.
    Show(FieldShowArgs),
}

#[derive(Args, Debug)]
pub struct FieldCreateArgs {
    /// Machine name (`status`).
    pub name: String,

    /// Display label; defaults to the name.
    #[arg(long)]
    pub label: Option<String>,

    /// Value source: static, users or ugroups.
    #[arg(long, default_value = "static")]
    pub kind: BindKind,

    #[arg(long)]
    pub required: bool,

    /// Allow several values at once.
    #[arg(long)]
    pub multiple: bool,

    #[arg(long)]
    pub read_only: bool,
}

#[derive(Args, Debug)]
pub struct AddValueArgs {
    /// Field name or id.
    pub field: String,

    /// Label; for user- and group-bound fields, the login or group name.
    pub label: String,

    #[arg(long)]
    pub description: Option<String>,

    /// Hide the value from selection lists.
    #[arg(long)]
    pub hidden: bool,

    /// Pre-select the value on new artifacts.
    #[arg(long = "default")]
    pub is_default: bool,

    /// Colour shown next to the value (`#rrggbb`).
    #[arg(long)]
    pub decorator: Option<Decorator>,
}

#[derive(Args, Debug)]
pub struct ValuesArgs {
    /// Field name or id.
    pub field: String,

    /// Include hidden values and omit the "None" entry.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct FieldShowArgs {
    /// Field name or id; all fields when omitted.
    pub field: Option<String>,
}

#[derive(Debug, Serialize)]
struct ValueRow {
    #[serde(flatten)]
    value: BindValue,
    display: String,
}

pub fn run_field(command: &FieldCommand, session: &Session) -> anyhow::Result<()> {
    match command {
        FieldCommand::Create(args) => run_create(args, session),
        FieldCommand::AddValue(args) => run_add_value(args, session),
        FieldCommand::Values(args) => run_values(args, session),
        FieldCommand::Show(args) => run_show(args, session),
    }
}

fn run_create(args: &FieldCreateArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let new = NewField {
        required: args.required,
        multiple: args.multiple,
        read_only: args.read_only,
        ..NewField::new(
            args.name.trim(),
            args.label.clone().unwrap_or_else(|| args.name.trim().to_string()),
            args.kind,
        )
    };
    let field = store.create_field(&new).map_err(|e| session.store_failure(&e))?;
    render(session.output, &field, |f, w| {
        writeln!(w, "Created field {} (#{}, {})", f.display_name(), f.id, f.bind_kind)
    })
}

fn run_add_value(args: &AddValueArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let field = session.field(&store, &args.field)?;
    if args.label.trim().is_empty() {
        return Err(fail(
            session.output,
            CliError::with_code("value label must not be empty", ErrorCode::InvalidValue),
        ));
    }

    let new = NewBindValue {
        description: args.description.clone(),
        hidden: args.hidden,
        is_default: args.is_default,
        decorator: args.decorator,
        ..NewBindValue::new(args.label.trim())
    };
    let value_id = store
        .add_bind_value(field.id, &new)
        .map_err(|e| session.store_failure(&e))?;

    let values = session.value_store(&store, &field)?;
    let value = values
        .bind_value(value_id)
        .map_err(|e| fail(session.output, CliError::with_code(e.to_string(), ErrorCode::BindValueNotFound)))?;
    let row = ValueRow {
        display: values.format_value(value),
        value: value.clone(),
    };
    render(session.output, &row, |r, w| {
        writeln!(w, "Added {} (#{}) to {}", r.display, r.value.id, field.name)
    })
}

fn run_values(args: &ValuesArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let field = session.field(&store, &args.field)?;
    let values = session.value_store(&store, &field)?;

    let listed: Vec<BindValue> = if args.all {
        values.all_values().to_vec()
    } else {
        values.visible_values_plus_none(field.required)
    };
    let rows: Vec<ValueRow> = listed
        .into_iter()
        .map(|value| ValueRow {
            display: values.format_value(&value),
            value,
        })
        .collect();

    render(session.output, &rows, |rows, w| {
        for row in rows {
            let mut flags = Vec::new();
            if row.value.is_default {
                flags.push("default");
            }
            if row.value.hidden {
                flags.push("hidden");
            }
            let decorator = row.value.decorator.map(|d| format!(" {d}")).unwrap_or_default();
            if flags.is_empty() {
                writeln!(w, "{:>6}  {}{decorator}", row.value.id, row.display)?;
            } else {
                writeln!(w, "{:>6}  {}{decorator} [{}]", row.value.id, row.display, flags.join(", "))?;
            }
        }
        Ok(())
    })
}

#[derive(Debug, Serialize)]
struct FieldDetail {
    #[serde(flatten)]
    field: Field,
    values: usize,
    workflow: Option<&'static str>,
}

fn run_show(args: &FieldShowArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let fields = match &args.field {
        Some(key) => vec![session.field(&store, key)?],
        None => store.fields().map_err(|e| session.store_failure(&e))?,
    };

    let mut details = Vec::with_capacity(fields.len());
    for field in fields {
        let values = session.value_store(&store, &field)?;
        let workflow = store
            .workflow(field.id)
            .map_err(|e| session.store_failure(&e))?
            .map(|workflow| if workflow.enabled { "enabled" } else { "disabled" });
        details.push(FieldDetail {
            values: values.all_values().len(),
            workflow,
            field,
        });
    }

    render(session.output, &details, |details, w| {
        for detail in details {
            let field = &detail.field;
            text_kv(w, "field", field.display_name())?;
            text_kv(w, "id", field.id.to_string())?;
            text_kv(w, "kind", kind_label(field.bind_kind))?;
            let mut flags = Vec::new();
            if field.required {
                flags.push("required");
            }
            if field.multiple {
                flags.push("multiple");
            }
            if field.read_only {
                flags.push("read-only");
            }
            if !flags.is_empty() {
                text_kv(w, "flags", flags.join(", "))?;
            }
            text_kv(w, "values", detail.values.to_string())?;
            text_kv(w, "workflow", detail.workflow.unwrap_or("none"))?;
            writeln!(w)?;
        }
        Ok(())
    })
}

const fn kind_label(kind: BindKind) -> &'static str {
    match kind {
        BindKind::Static => "static list",
        BindKind::Users => "project users",
        BindKind::Ugroups => "user groups",
    }
}
