//! Artifact updates: one changeset spanning every list field.
//!
//! For each field the updater loads the bind value store, validates the
//! submitted ids, and hands the outcome to the writer. A field whose value
//! is rejected is copied forward unchanged; the other fields still land in
//! the same changeset.
//!
//! The changeset and its value rows are one unit of work. It is rolled back
//! when any field fails to save, and when no field records a new value.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::bind::{BindValueStore, DEFAULT_NONE_LABEL};
use crate::config::HistoryConfig;
use crate::context::RequestContext;
use crate::diff::{DEFAULT_SEPARATOR, DiffFormatter, FieldDiff, diff};
use crate::model::actor::Actor;
use crate::model::changeset::Changeset;
use crate::model::field::Field;
use crate::model::ids::{ArtifactId, FieldId, ValueId};
use crate::model::value::BindValue;
use crate::repo::{ArtifactRepository, FieldPermissions, StoreError, ValueRepository, WorkflowSource};
use crate::resolve::ValueResolver;
use crate::validate::{FieldError, FieldValidator};
use crate::writer::{ChangesetValueWriter, SaveRequest};

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("field {0} is not a list field of this tracker")]
    UnknownField(FieldId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Skip permission checks (imports and administrative fixes).
    pub bypass_permissions: bool,
}

/// What happened to one field in a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "errors", rename_all = "snake_case")]
pub enum FieldOutcome {
    /// A new value set was recorded.
    Updated,
    /// The previous value was carried over, or there was nothing to write.
    Unchanged,
    /// Validation failed; the previous value was carried over.
    Rejected(Vec<FieldError>),
    /// The write did not persist.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldReport {
    pub field_id: FieldId,
    pub field: String,
    pub outcome: FieldOutcome,
    /// Rendered change, for [`FieldOutcome::Updated`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub artifact_id: ArtifactId,
    /// The recorded changeset; `None` when the request was discarded.
    pub changeset: Option<Changeset>,
    pub is_submission: bool,
    pub fields: Vec<FieldReport>,
}

impl UpdateReport {
    #[must_use]
    pub fn has_rejections(&self) -> bool {
        self.fields
            .iter()
            .any(|report| matches!(report.outcome, FieldOutcome::Rejected(_)))
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.fields
            .iter()
            .any(|report| report.outcome == FieldOutcome::Failed)
    }

    #[must_use]
    pub fn updated(&self) -> impl Iterator<Item = &FieldReport> {
        self.fields
            .iter()
            .filter(|report| report.outcome == FieldOutcome::Updated)
    }

    /// Drop the changeset; nothing this report describes was kept.
    fn discarded(mut self) -> Self {
        self.changeset = None;
        for field in &mut self.fields {
            if field.outcome == FieldOutcome::Updated {
                field.outcome = FieldOutcome::Unchanged;
                field.change = None;
            }
        }
        self
    }
}

/// One step of a field's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub changeset: Changeset,
    pub diff: FieldDiff,
    pub rendered: String,
}

/// A field's value in the artifact's latest changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSnapshot {
    pub field: Field,
    pub values: Vec<BindValue>,
    pub labels: Vec<String>,
}

pub struct ArtifactUpdater<'a> {
    artifacts: &'a dyn ArtifactRepository,
    values: &'a dyn ValueRepository,
    workflow: &'a dyn WorkflowSource,
    permissions: &'a dyn FieldPermissions,
    none_label: String,
    separator: String,
}

impl<'a> ArtifactUpdater<'a> {
    pub fn new<S>(store: &'a S) -> Self
    where
        S: ArtifactRepository + ValueRepository + WorkflowSource + FieldPermissions,
    {
        Self {
            artifacts: store,
            values: store,
            workflow: store,
            permissions: store,
            none_label: DEFAULT_NONE_LABEL.to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    #[must_use]
    pub fn with_history_config(mut self, config: &HistoryConfig) -> Self {
        self.none_label.clone_from(&config.none_label);
        self.separator.clone_from(&config.separator);
        self
    }

    /// Record a new changeset on `artifact_id`.
    ///
    /// `submitted` maps fields to the ids the actor picked; fields absent
    /// from the map are left untouched (or get their defaults when the
    /// artifact is being created).
    ///
    /// The changeset is kept only when at least one field records a new
    /// value and every field saved. Otherwise it is rolled back and the
    /// report comes back with `changeset: None`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::UnknownField`] before writing anything when
    /// `submitted` names a field that does not exist, and a store error when
    /// the changeset itself cannot be created or a field cannot be read.
    pub fn submit(
        &self,
        actor: Actor,
        artifact_id: ArtifactId,
        submitted: &BTreeMap<FieldId, Vec<ValueId>>,
        options: UpdateOptions,
    ) -> Result<UpdateReport, UpdateError> {
        let fields = self.artifacts.fields()?;
        if let Some(unknown) = submitted
            .keys()
            .find(|id| !fields.iter().any(|field| field.id == **id))
        {
            return Err(UpdateError::UnknownField(*unknown));
        }

        self.artifacts.begin_changeset()?;
        let report = match self.record(actor, artifact_id, &fields, submitted, options) {
            Ok(report) => report,
            Err(error) => {
                if let Err(rollback) = self.artifacts.rollback_changeset() {
                    tracing::warn!(artifact_id = %artifact_id, error = %rollback, "changeset rollback failed");
                }
                return Err(error.into());
            }
        };

        if report.has_failures() {
            tracing::warn!(artifact_id = %artifact_id, "a field did not save, discarding changeset");
            self.artifacts.rollback_changeset()?;
            return Ok(report.discarded());
        }
        if report.updated().next().is_none() {
            tracing::info!(artifact_id = %artifact_id, "no field changed, discarding changeset");
            self.artifacts.rollback_changeset()?;
            return Ok(report.discarded());
        }

        self.artifacts.commit_changeset()?;
        Ok(report)
    }

    /// Create the changeset and write every field into it. Runs inside the
    /// unit opened by [`Self::submit`].
    fn record(
        &self,
        actor: Actor,
        artifact_id: ArtifactId,
        fields: &[Field],
        submitted: &BTreeMap<FieldId, Vec<ValueId>>,
        options: UpdateOptions,
    ) -> Result<UpdateReport, StoreError> {
        let previous = self.artifacts.changesets(artifact_id)?.last().map(|c| c.id);
        let is_submission = previous.is_none();
        let changeset = self.artifacts.create_changeset(artifact_id, &actor)?;
        tracing::info!(
            artifact_id = %artifact_id,
            changeset_id = %changeset.id,
            actor = %actor.login,
            is_submission,
            fields = submitted.len(),
            "recording changeset"
        );

        let mut ctx = RequestContext::new(actor, self.permissions);
        let mut reports = Vec::with_capacity(fields.len());
        for field in fields {
            let store = self.load_store(field)?;
            let resolver = ValueResolver::new(&store, self.values);
            let (previous_value, previous_ids) = match previous {
                Some(changeset_id) => (
                    resolver.changeset_value(changeset_id)?,
                    resolver.stored_ids(changeset_id)?.unwrap_or_default(),
                ),
                None => (None, Vec::new()),
            };
            let validator = FieldValidator::new(field, &store, self.workflow);

            let untouched = !submitted.contains_key(&field.id);
            let defaults = if untouched && is_submission {
                validator.submit_default_values()
            } else {
                Vec::new()
            };
            let from_defaults = !defaults.is_empty();
            let ids = if from_defaults {
                Some(defaults.as_slice())
            } else {
                submitted.get(&field.id).map(Vec::as_slice)
            };
            let bypass = options.bypass_permissions || from_defaults;

            let valid = match ids {
                Some(ids) if bypass => {
                    validator.is_valid_regarding_required_property(&mut ctx, ids)
                        && validator.is_valid(&mut ctx, previous_value.as_ref(), ids)
                }
                _ => validator.validate_with_permissions_and_required_status(
                    &mut ctx,
                    previous_value.as_ref(),
                    ids,
                    is_submission,
                ),
            };

            let request = SaveRequest {
                artifact_id,
                previous_changeset: previous,
                new_changeset: changeset.id,
                submitted: if valid { ids } else { None },
                is_submission,
                bypass_permissions: bypass,
            };
            let writer = ChangesetValueWriter::new(field, &store, self.values);
            let saved = writer.save_new_changeset(&mut ctx, &request);

            let report = if valid {
                self.report_saved(field, &store, &previous_ids, &request, saved)?
            } else {
                let errors = ctx.errors(field.id).to_vec();
                tracing::info!(field = %field.name, errors = errors.len(), "submitted value rejected");
                FieldReport {
                    field_id: field.id,
                    field: field.name.clone(),
                    outcome: FieldOutcome::Rejected(errors),
                    change: None,
                }
            };
            reports.push(report);
        }

        Ok(UpdateReport {
            artifact_id,
            changeset: Some(changeset),
            is_submission,
            fields: reports,
        })
    }

    fn report_saved(
        &self,
        field: &Field,
        store: &BindValueStore,
        previous: &[ValueId],
        request: &SaveRequest<'_>,
        saved: bool,
    ) -> Result<FieldReport, StoreError> {
        let mut report = FieldReport {
            field_id: field.id,
            field: field.name.clone(),
            outcome: FieldOutcome::Failed,
            change: None,
        };
        if !saved {
            return Ok(report);
        }

        let written = self
            .values
            .load_changeset_value(request.new_changeset, field.id)?;
        match written {
            Some(row) if row.has_changed => {
                report.outcome = FieldOutcome::Updated;
                report.change = self.formatter(store).describe(previous, &row.value_ids);
            }
            _ => report.outcome = FieldOutcome::Unchanged,
        }
        Ok(report)
    }

    /// The field's audit trail on the artifact, oldest first. Changesets
    /// that did not change the field are skipped. Stored ids are diffed as
    /// written, so a deleted value still shows up as `#<id>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read.
    pub fn history(&self, artifact_id: ArtifactId, field: &Field) -> Result<Vec<HistoryEntry>, StoreError> {
        let store = self.load_store(field)?;
        let resolver = ValueResolver::new(&store, self.values);
        let formatter = self.formatter(&store);

        let mut entries = Vec::new();
        let mut before: Vec<ValueId> = Vec::new();
        for changeset in self.artifacts.changesets(artifact_id)? {
            let Some(ids) = resolver.stored_ids(changeset.id)? else {
                continue;
            };
            if let Some(change) = diff(&before, &ids) {
                entries.push(HistoryEntry {
                    rendered: formatter.render(&change),
                    diff: change,
                    changeset,
                });
            }
            before = ids;
        }
        Ok(entries)
    }

    /// Current values of every field the actor may read.
    ///
    /// # Errors
    ///
    /// Returns an error if the values cannot be read.
    pub fn snapshot(&self, actor: Actor, artifact_id: ArtifactId) -> Result<Vec<FieldSnapshot>, StoreError> {
        let last = self.artifacts.changesets(artifact_id)?.last().map(|c| c.id);
        let mut ctx = RequestContext::new(actor, self.permissions);

        let mut snapshots = Vec::new();
        for field in self.artifacts.fields()? {
            if !ctx.can_read(field.id) {
                continue;
            }
            let store = self.load_store(&field)?;
            let values = match last {
                Some(changeset_id) => ValueResolver::new(&store, self.values).values_for_changeset(changeset_id)?,
                None => Vec::new(),
            };
            let labels = values.iter().map(|value| store.format_value(value)).collect();
            snapshots.push(FieldSnapshot {
                field,
                values,
                labels,
            });
        }
        Ok(snapshots)
    }

    fn load_store(&self, field: &Field) -> Result<BindValueStore, StoreError> {
        Ok(BindValueStore::load(field, self.values)?.with_none_label(self.none_label.clone()))
    }

    fn formatter<'s>(&self, store: &'s BindValueStore) -> DiffFormatter<'s> {
        DiffFormatter::new(store).with_separator(self.separator.clone())
    }
}
