//! Semantic diff between two value sets of a field, for the audit trail.
//!
//! [`diff`] works on ids only; [`DiffFormatter`] turns the result into text
//! using the labels the store has *now*, so renaming a value also renames it
//! in old history entries.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::bind::BindValueStore;
use crate::model::ids::{ChangesetId, ValueId};
use crate::model::value::normalize_ids;
use crate::repo::StoreError;
use crate::resolve::ValueResolver;

/// Default separator between labels of a multi-valued change.
pub const DEFAULT_SEPARATOR: &str = ", ";

/// What happened to a field between two changesets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldDiff {
    /// A value set became "None".
    Cleared,
    /// "None" became a value set.
    SetTo { values: Vec<ValueId> },
    /// One value replaced another.
    ChangedFrom { from: ValueId, to: ValueId },
    /// Anything else; either side may be empty.
    Changed {
        removed: Vec<ValueId>,
        added: Vec<ValueId>,
    },
}

/// Compare two value sets. `None` when they hold the same values.
///
/// Order, duplicates and the "None" sentinel do not matter.
#[must_use]
pub fn diff(previous: &[ValueId], next: &[ValueId]) -> Option<FieldDiff> {
    let previous = normalize_ids(previous);
    let next = normalize_ids(next);
    let before: BTreeSet<ValueId> = previous.iter().copied().collect();
    let after: BTreeSet<ValueId> = next.iter().copied().collect();

    if before == after {
        return None;
    }
    if after.is_empty() {
        return Some(FieldDiff::Cleared);
    }
    if before.is_empty() {
        return Some(FieldDiff::SetTo { values: next });
    }
    if let ([from], [to]) = (previous.as_slice(), next.as_slice()) {
        return Some(FieldDiff::ChangedFrom { from: *from, to: *to });
    }

    Some(FieldDiff::Changed {
        removed: previous.into_iter().filter(|id| !after.contains(id)).collect(),
        added: next.into_iter().filter(|id| !before.contains(id)).collect(),
    })
}

/// Renders [`FieldDiff`]s with a field's current labels.
pub struct DiffFormatter<'a> {
    store: &'a BindValueStore,
    separator: String,
}

impl<'a> DiffFormatter<'a> {
    #[must_use]
    pub fn new(store: &'a BindValueStore) -> Self {
        Self {
            store,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Human-readable change description.
    ///
    /// A [`FieldDiff::Changed`] renders one line per non-empty side,
    /// removals first.
    #[must_use]
    pub fn render(&self, diff: &FieldDiff) -> String {
        match diff {
            FieldDiff::Cleared => "cleared".to_string(),
            FieldDiff::SetTo { values } => format!("set to {}", self.labels(values)),
            FieldDiff::ChangedFrom { from, to } => {
                format!("changed from {} to {}", self.label(*from), self.label(*to))
            }
            FieldDiff::Changed { removed, added } => {
                let mut lines = Vec::with_capacity(2);
                if !removed.is_empty() {
                    lines.push(format!("{} removed", self.labels(removed)));
                }
                if !added.is_empty() {
                    lines.push(format!("{} added", self.labels(added)));
                }
                lines.join("\n")
            }
        }
    }

    /// Diff and render in one step. `None` when nothing changed.
    #[must_use]
    pub fn describe(&self, previous: &[ValueId], next: &[ValueId]) -> Option<String> {
        diff(previous, next).map(|change| self.render(&change))
    }

    /// Change of the field between two changesets, as shown in a follow-up
    /// comment. `from` is `None` for the artifact's first changeset.
    ///
    /// Works on the stored ids like the audit trail does, so a deleted
    /// value renders as `#<id>` here too.
    ///
    /// # Errors
    ///
    /// Returns an error if either changeset's value cannot be read.
    pub fn follow_up(
        &self,
        resolver: &ValueResolver<'_>,
        from: Option<ChangesetId>,
        to: ChangesetId,
    ) -> Result<Option<String>, StoreError> {
        let previous = match from {
            Some(changeset_id) => ids_of(resolver, changeset_id)?,
            None => Vec::new(),
        };
        let next = ids_of(resolver, to)?;
        Ok(self.describe(&previous, &next))
    }

    fn label(&self, id: ValueId) -> String {
        self.store
            .label_for(id)
            .unwrap_or_else(|| format!("#{id}"))
    }

    /// Labels in the store's configured order; unknown ids last, by id.
    fn labels(&self, ids: &[ValueId]) -> String {
        let mut ordered = ids.to_vec();
        ordered.sort_by_key(|id| (self.store.rank_of(*id), *id));
        ordered.dedup();
        ordered
            .into_iter()
            .map(|id| self.label(id))
            .collect::<Vec<_>>()
            .join(&self.separator)
    }
}

fn ids_of(resolver: &ValueResolver<'_>, changeset_id: ChangesetId) -> Result<Vec<ValueId>, StoreError> {
    Ok(resolver.stored_ids(changeset_id)?.unwrap_or_default())
}
