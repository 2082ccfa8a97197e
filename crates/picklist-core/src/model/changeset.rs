use serde::{Deserialize, Serialize};

use super::ids::{ArtifactId, ChangesetId, ChangesetValueId, FieldId, UserId, ValueId};
use super::value::BindValue;

/// A work item whose fields carry list values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub title: String,
    pub created_by: UserId,
    /// Microseconds since the Unix epoch.
    pub created_at_us: i64,
}

/// A committed snapshot of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub id: ChangesetId,
    pub artifact_id: ArtifactId,
    pub submitted_by: UserId,
    /// Microseconds since the Unix epoch.
    pub submitted_on_us: i64,
}

/// The value row of one field in one changeset, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChangesetValue {
    pub id: ChangesetValueId,
    pub changeset_id: ChangesetId,
    pub field_id: FieldId,
    /// Stored bind value ids in insertion order. Empty means "None".
    pub value_ids: Vec<ValueId>,
    pub has_changed: bool,
}

/// A stored changeset value joined against the field's bind values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetValue {
    pub id: ChangesetValueId,
    pub changeset_id: ChangesetId,
    pub field_id: FieldId,
    /// Resolved values; ids that no longer resolve are dropped.
    pub values: Vec<BindValue>,
    pub has_changed: bool,
}

impl ChangesetValue {
    #[must_use]
    pub fn value_ids(&self) -> Vec<ValueId> {
        self.values.iter().map(|value| value.id).collect()
    }

    /// `true` when the field was "None" in this changeset.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.values.is_empty()
    }
}
