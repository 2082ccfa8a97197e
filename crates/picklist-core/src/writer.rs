//! Changeset value writer.
//!
//! Decides, for one field of a new changeset, whether to record a new value
//! set or to copy the previous one forward. It never validates: callers run
//! [`crate::validate::FieldValidator`] first and only hand over values that
//! passed.

use crate::bind::BindValueStore;
use crate::context::RequestContext;
use crate::model::changeset::StoredChangesetValue;
use crate::model::field::Field;
use crate::model::ids::{ArtifactId, ChangesetId, ValueId};
use crate::model::value::normalize_ids;
use crate::repo::{StoreError, ValueRepository};

/// One field's part of a new changeset.
#[derive(Debug, Clone, Copy)]
pub struct SaveRequest<'s> {
    pub artifact_id: ArtifactId,
    /// The artifact's last changeset, if any.
    pub previous_changeset: Option<ChangesetId>,
    pub new_changeset: ChangesetId,
    /// `None` when the request did not touch the field.
    pub submitted: Option<&'s [ValueId]>,
    /// `true` while the artifact is being created.
    pub is_submission: bool,
    pub bypass_permissions: bool,
}

pub struct ChangesetValueWriter<'a> {
    field: &'a Field,
    store: &'a BindValueStore,
    repo: &'a dyn ValueRepository,
}

impl<'a> ChangesetValueWriter<'a> {
    pub fn new(field: &'a Field, store: &'a BindValueStore, repo: &'a dyn ValueRepository) -> Self {
        Self { field, store, repo }
    }

    /// Persist the field's value for `request.new_changeset`.
    ///
    /// Returns `true` when the outcome is consistent: a new value row, a
    /// successful copy forward, or nothing to do. Persistence failures are
    /// logged and reported as `false`.
    pub fn save_new_changeset(&self, ctx: &mut RequestContext<'_>, request: &SaveRequest<'_>) -> bool {
        match self.try_save(ctx, request) {
            Ok(updated) => updated,
            Err(error) => {
                tracing::warn!(
                    artifact_id = %request.artifact_id,
                    changeset_id = %request.new_changeset,
                    field = %self.field.name,
                    error = %error,
                    "failed to save changeset value"
                );
                false
            }
        }
    }

    fn try_save(
        &self,
        ctx: &mut RequestContext<'_>,
        request: &SaveRequest<'_>,
    ) -> Result<bool, StoreError> {
        if self.field.read_only {
            tracing::debug!(field = %self.field.name, "read-only field; nothing to save");
            return Ok(true);
        }

        let has_permission = self.has_permission(ctx, request);
        let previous = match request.previous_changeset {
            Some(changeset_id) => self.repo.load_changeset_value(changeset_id, self.field.id)?,
            None => None,
        };

        match (previous, request.submitted) {
            (Some(previous), submitted) => {
                let changed = has_permission
                    && submitted.is_some_and(|ids| has_changes(&previous.value_ids, ids));
                if changed {
                    self.insert(request, submitted.unwrap_or_default())
                } else {
                    self.copy_forward(request, &previous)
                }
            }
            (None, None) => Ok(true),
            (None, Some(ids)) if has_permission => self.insert(request, ids),
            (None, Some(_)) => {
                tracing::debug!(
                    field = %self.field.name,
                    actor = %ctx.actor().login,
                    "submitted value dropped: no permission"
                );
                Ok(false)
            }
        }
    }

    fn has_permission(&self, ctx: &mut RequestContext<'_>, request: &SaveRequest<'_>) -> bool {
        if request.bypass_permissions {
            return true;
        }
        if request.is_submission {
            ctx.can_submit(self.field.id)
                || (self.field.required && !self.store.default_values().is_empty())
        } else {
            ctx.can_update(self.field.id)
        }
    }

    fn insert(&self, request: &SaveRequest<'_>, ids: &[ValueId]) -> Result<bool, StoreError> {
        let ids = normalize_ids(ids);
        let row = self
            .repo
            .insert_changeset_value(request.new_changeset, self.field.id, &ids)?;
        tracing::info!(
            artifact_id = %request.artifact_id,
            changeset_id = %request.new_changeset,
            field = %self.field.name,
            row = %row,
            count = ids.len(),
            "recorded new value"
        );
        Ok(true)
    }

    fn copy_forward(
        &self,
        request: &SaveRequest<'_>,
        previous: &StoredChangesetValue,
    ) -> Result<bool, StoreError> {
        let linked = self.repo.link_changeset_value_to_existing(
            request.new_changeset,
            self.field.id,
            previous.id,
        )?;
        tracing::debug!(
            changeset_id = %request.new_changeset,
            field = %self.field.name,
            from = %previous.changeset_id,
            linked,
            "copied previous value forward"
        );
        Ok(linked)
    }
}

/// Set comparison of two value id lists.
///
/// Order, duplicates and the "None" sentinel are ignored; an empty list is
/// "None".
#[must_use]
pub fn has_changes(previous: &[ValueId], new: &[ValueId]) -> bool {
    comparable(previous) != comparable(new)
}

fn comparable(ids: &[ValueId]) -> Vec<ValueId> {
    let mut ids = normalize_ids(ids);
    ids.sort_unstable();
    ids
}
