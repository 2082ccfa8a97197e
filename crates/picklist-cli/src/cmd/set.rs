//! `pk set`: record a changeset on an artifact.

use crate::cmd::{Session, resolve_values};
use crate::output::{CliError, fail, render};
use clap::Args;
use picklist_core::db::store::SqliteStore;
use picklist_core::error::ErrorCode;
use picklist_core::model::ids::{ArtifactId, FieldId, ValueId};
use picklist_core::update::{FieldOutcome, UpdateError, UpdateOptions, UpdateReport};
use std::collections::BTreeMap;
use std::io::{self, Write};

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Artifact id.
    pub artifact: ArtifactId,

    /// Assignments `field=value[,value...]`; `field=` clears the field.
    /// A value is an exact label, `none`, a value id, or a label in any
    /// case, tried in that order.
    #[arg(required = true, value_name = "FIELD=VALUES")]
    pub assignments: Vec<String>,

    /// Skip permission checks (imports and administrative fixes).
    #[arg(long)]
    pub bypass_permissions: bool,
}

/// Split `field=a,b` into the field key and its value tokens.
pub fn split_assignment(raw: &str) -> Option<(&str, &str)> {
    let (field, values) = raw.split_once('=')?;
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    Some((field, values))
}

/// Resolve assignments to field ids and value ids.
pub fn parse_assignments(
    assignments: &[String],
    store: &SqliteStore,
    session: &Session,
) -> anyhow::Result<BTreeMap<FieldId, Vec<ValueId>>> {
    let mut submitted = BTreeMap::new();
    for raw in assignments {
        let (key, tokens) = split_assignment(raw).ok_or_else(|| {
            fail(
                session.output,
                CliError::new(format!("expected FIELD=VALUES, got '{raw}'")),
            )
        })?;
        let field = session.field(store, key)?;
        let values = session.value_store(store, &field)?;
        let ids = resolve_values(&values, &field, tokens, session.output)?;
        submitted.insert(field.id, ids);
    }
    Ok(submitted)
}

/// Record the changeset as the resolved actor.
pub fn submit(
    store: &SqliteStore,
    session: &Session,
    artifact: ArtifactId,
    submitted: &BTreeMap<FieldId, Vec<ValueId>>,
    options: UpdateOptions,
) -> anyhow::Result<UpdateReport> {
    let actor = session.require_actor(store)?;
    session
        .updater(store)
        .submit(actor, artifact, submitted, options)
        .map_err(|e| match &e {
            UpdateError::Store(inner) => session.store_failure(inner),
            UpdateError::UnknownField(_) => {
                fail(session.output, CliError::with_code(e.to_string(), ErrorCode::FieldNotFound))
            }
        })
}

/// Text rendering of a changeset report: one line per changed or rejected
/// field.
pub fn write_report(report: &UpdateReport, w: &mut dyn Write) -> io::Result<()> {
    match &report.changeset {
        Some(changeset) => writeln!(w, "Changeset #{} on artifact #{}", changeset.id, report.artifact_id)?,
        None => writeln!(w, "No changes recorded on artifact #{}", report.artifact_id)?,
    }
    for field in &report.fields {
        match &field.outcome {
            FieldOutcome::Updated => {
                let change = field.change.as_deref().unwrap_or("updated");
                for (i, line) in change.lines().enumerate() {
                    if i == 0 {
                        writeln!(w, "  {}: {line}", field.field)?;
                    } else {
                        writeln!(w, "  {:width$}  {line}", "", width = field.field.len())?;
                    }
                }
            }
            FieldOutcome::Rejected(errors) => {
                for error in errors {
                    writeln!(w, "  {}: rejected: {}", field.field, error.message)?;
                }
            }
            FieldOutcome::Failed => writeln!(w, "  {}: not saved", field.field)?,
            FieldOutcome::Unchanged => {}
        }
    }
    Ok(())
}

/// Fail when any field was rejected or not saved.
pub fn check_report(report: &UpdateReport, session: &Session) -> anyhow::Result<()> {
    first_problem(report).map_or(Ok(()), |problem| Err(fail(session.output, problem)))
}

fn first_problem(report: &UpdateReport) -> Option<CliError> {
    report.fields.iter().find_map(|field| match &field.outcome {
        FieldOutcome::Rejected(errors) => errors
            .first()
            .map(|error| CliError::with_code(error.message.clone(), error.kind.code())),
        FieldOutcome::Failed => Some(CliError::with_code(
            format!("the value of {} was not saved", field.field),
            ErrorCode::PersistenceFailure,
        )),
        FieldOutcome::Updated | FieldOutcome::Unchanged => None,
    })
}

pub fn run_set(args: &SetArgs, session: &Session) -> anyhow::Result<()> {
    let store = session.open_store()?;
    store
        .artifact(args.artifact)
        .map_err(|e| session.store_failure(&e))?;
    let submitted = parse_assignments(&args.assignments, &store, session)?;
    let report = submit(
        &store,
        session,
        args.artifact,
        &submitted,
        UpdateOptions {
            bypass_permissions: args.bypass_permissions,
        },
    )?;
    render(session.output, &report, write_report)?;
    check_report(&report, session)
}

#[cfg(test)]
mod tests {
    use super::split_assignment;

    #[test]
    fn assignments_split_on_first_equals() {
        assert_eq!(split_assignment("status=Open"), Some(("status", "Open")));
        assert_eq!(split_assignment(" platforms = Linux,macOS"), Some(("platforms", " Linux,macOS")));
        assert_eq!(split_assignment("status="), Some(("status", "")));
        assert_eq!(split_assignment("=Open"), None);
        assert_eq!(split_assignment("status"), None);
    }
}
