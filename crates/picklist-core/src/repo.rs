//! Collaborator contracts consumed by the engine.
//!
//! The engine never talks to a database directly. Persistence, workflow
//! configuration and permissions are reached through these object-safe
//! traits so the same validation and writer code runs over SQLite
//! ([`crate::db::store::SqliteStore`]) or over in-memory fixtures in tests.

use crate::error::ErrorCode;
use crate::model::actor::Actor;
use crate::model::changeset::{Changeset, StoredChangesetValue};
use crate::model::field::Field;
use crate::model::ids::{
    ArtifactId, ChangesetId, ChangesetValueId, FieldId, TransitionId, ValueId,
};
use crate::model::value::BindValue;
use crate::workflow::WorkflowState;

/// Errors reported by a persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Stored data violates an invariant the schema cannot express.
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Machine code reported to CLI callers.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Sqlite(_) => ErrorCode::PersistenceFailure,
            Self::Corrupt(_) => ErrorCode::CorruptStore,
            Self::NotFound { entity, .. } => match *entity {
                "field" => ErrorCode::FieldNotFound,
                "artifact" => ErrorCode::ArtifactNotFound,
                "user" => ErrorCode::UserNotFound,
                "group" => ErrorCode::GroupNotFound,
                "bind value" => ErrorCode::BindValueNotFound,
                _ => ErrorCode::InternalUnexpected,
            },
        }
    }
}

/// Bind values and changeset value rows.
pub trait ValueRepository {
    /// All bind values of a field in configured order, hidden ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read.
    fn load_bind_values(&self, field_id: FieldId) -> Result<Vec<BindValue>, StoreError>;

    /// The value row of `field_id` in `changeset_id`, if one was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read.
    fn load_changeset_value(
        &self,
        changeset_id: ChangesetId,
        field_id: FieldId,
    ) -> Result<Option<StoredChangesetValue>, StoreError>;

    /// Record a new value set (`has_changed = true`) for the changeset.
    ///
    /// Implementations must write the row and its ids atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing was written.
    fn insert_changeset_value(
        &self,
        changeset_id: ChangesetId,
        field_id: FieldId,
        value_ids: &[ValueId],
    ) -> Result<ChangesetValueId, StoreError>;

    /// Copy an existing value row forward into `changeset_id` with
    /// `has_changed = false`. Returns whether the copy persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails while copying.
    fn link_changeset_value_to_existing(
        &self,
        changeset_id: ChangesetId,
        field_id: FieldId,
        existing: ChangesetValueId,
    ) -> Result<bool, StoreError>;
}

/// Workflow configuration.
pub trait WorkflowSource {
    /// Whether a workflow exists on the field and whether it is enforced.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read.
    fn workflow_state(&self, field_id: FieldId) -> Result<WorkflowState, StoreError>;

    /// The configured transition `from -> to`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read.
    fn transition(
        &self,
        field_id: FieldId,
        from: Option<ValueId>,
        to: ValueId,
    ) -> Result<Option<TransitionId>, StoreError>;

    /// Whether `actor` may traverse the transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read.
    fn is_transition_authorized(
        &self,
        transition_id: TransitionId,
        actor: &Actor,
    ) -> Result<bool, StoreError>;
}

/// Per-field access rights.
pub trait FieldPermissions {
    /// # Errors
    ///
    /// Returns an error if permissions cannot be read.
    fn can_update_field(&self, actor: &Actor, field_id: FieldId) -> Result<bool, StoreError>;

    /// # Errors
    ///
    /// Returns an error if permissions cannot be read.
    fn can_submit_field(&self, actor: &Actor, field_id: FieldId) -> Result<bool, StoreError>;

    /// # Errors
    ///
    /// Returns an error if permissions cannot be read.
    fn can_read_field(&self, actor: &Actor, field_id: FieldId) -> Result<bool, StoreError>;
}

/// Fields, artifacts and changesets.
pub trait ArtifactRepository {
    /// Every list field, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read.
    fn fields(&self) -> Result<Vec<Field>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown field.
    fn field(&self, field_id: FieldId) -> Result<Field, StoreError>;

    /// Append a changeset to the artifact's history.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact does not exist or the write fails.
    fn create_changeset(
        &self,
        artifact_id: ArtifactId,
        actor: &Actor,
    ) -> Result<Changeset, StoreError>;

    /// The artifact's changesets, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read.
    fn changesets(&self, artifact_id: ArtifactId) -> Result<Vec<Changeset>, StoreError>;

    /// Open the unit of work that holds a changeset and its value rows.
    /// Writes made until [`Self::commit_changeset`] or
    /// [`Self::rollback_changeset`] land together or not at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit cannot be opened.
    fn begin_changeset(&self) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns an error if the unit cannot be committed.
    fn commit_changeset(&self) -> Result<(), StoreError>;

    /// Discard every write since [`Self::begin_changeset`].
    ///
    /// # Errors
    ///
    /// Returns an error if the unit cannot be rolled back.
    fn rollback_changeset(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_entity_code() {
        assert_eq!(
            StoreError::not_found("field", "status").error_code(),
            ErrorCode::FieldNotFound
        );
        assert_eq!(
            StoreError::not_found("bind value", 404).error_code(),
            ErrorCode::BindValueNotFound
        );
        assert_eq!(
            StoreError::Corrupt("bad row".into()).error_code(),
            ErrorCode::CorruptStore
        );
        assert_eq!(
            StoreError::not_found("user", "carol").to_string(),
            "user carol not found"
        );
    }
}
