//! Bind value store: the enumerated allowed values of one list field.
//!
//! A field binds to one of three value sources, modelled as the tagged union
//! [`Bind`]. Every variant exposes the same contract (ordered values, id
//! lookup, label formatting); only the formatting differs:
//!
//! - [`StaticBind`]: labels configured on the field
//! - [`UserBind`]: project users, shown as `Real Name (login)`
//! - [`UgroupBind`]: user groups, with dynamic group keys humanised
//!
//! The store is a pure read path. It never filters hidden values out of
//! [`BindValueStore::all_values`]; UI-facing enumerations go through
//! [`BindValueStore::visible_values_plus_none`].

pub mod static_values;
pub mod ugroups;
pub mod users;

pub use static_values::StaticBind;
pub use ugroups::UgroupBind;
pub use users::UserBind;

use std::collections::HashMap;

use crate::model::field::{BindKind, Field};
use crate::model::ids::{FieldId, NONE_VALUE_ID, ValueId};
use crate::model::value::BindValue;
use crate::repo::{StoreError, ValueRepository};

/// Label of the synthetic "None" value when none is configured.
pub const DEFAULT_NONE_LABEL: &str = "None";

/// Errors from bind value lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("value {value_id} not found in field {field_id}")]
    NotFound { field_id: FieldId, value_id: ValueId },
}

/// The value source of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    Static(StaticBind),
    Users(UserBind),
    Ugroups(UgroupBind),
}

impl Bind {
    /// Build the variant matching `kind` over `values` (configured order).
    #[must_use]
    pub fn from_kind(kind: BindKind, values: Vec<BindValue>) -> Self {
        match kind {
            BindKind::Static => Self::Static(StaticBind::new(values)),
            BindKind::Users => Self::Users(UserBind::new(values)),
            BindKind::Ugroups => Self::Ugroups(UgroupBind::new(values)),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> BindKind {
        match self {
            Self::Static(_) => BindKind::Static,
            Self::Users(_) => BindKind::Users,
            Self::Ugroups(_) => BindKind::Ugroups,
        }
    }

    #[must_use]
    pub fn values(&self) -> &[BindValue] {
        match self {
            Self::Static(bind) => bind.values(),
            Self::Users(bind) => bind.values(),
            Self::Ugroups(bind) => bind.values(),
        }
    }

    /// Display label of `value` for this source.
    #[must_use]
    pub fn format_value(&self, value: &BindValue) -> String {
        match self {
            Self::Static(_) => StaticBind::format_value(value),
            Self::Users(_) => UserBind::format_value(value),
            Self::Ugroups(_) => UgroupBind::format_value(value),
        }
    }
}

/// Allowed values of one field, indexed by id.
#[derive(Debug, Clone)]
pub struct BindValueStore {
    field_id: FieldId,
    bind: Bind,
    index: HashMap<ValueId, usize>,
    none_label: String,
}

impl BindValueStore {
    #[must_use]
    pub fn new(field_id: FieldId, bind: Bind) -> Self {
        let mut index = HashMap::with_capacity(bind.values().len());
        for (position, value) in bind.values().iter().enumerate() {
            if index.insert(value.id, position).is_some() {
                tracing::warn!(
                    field_id = %field_id,
                    value_id = %value.id,
                    "duplicate bind value id; keeping the last occurrence"
                );
            }
        }
        Self {
            field_id,
            bind,
            index,
            none_label: DEFAULT_NONE_LABEL.to_string(),
        }
    }

    /// Load the field's bind values from the repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot read the values.
    pub fn load(field: &Field, repo: &dyn ValueRepository) -> Result<Self, StoreError> {
        let values = repo.load_bind_values(field.id)?;
        tracing::debug!(field_id = %field.id, count = values.len(), "loaded bind values");
        Ok(Self::new(field.id, Bind::from_kind(field.bind_kind, values)))
    }

    /// Override the label of the synthetic "None" value.
    #[must_use]
    pub fn with_none_label(mut self, label: impl Into<String>) -> Self {
        self.none_label = label.into();
        self
    }

    #[must_use]
    pub const fn field_id(&self) -> FieldId {
        self.field_id
    }

    #[must_use]
    pub const fn bind(&self) -> &Bind {
        &self.bind
    }

    #[must_use]
    pub fn none_label(&self) -> &str {
        &self.none_label
    }

    /// Every value in configured order, hidden ones included.
    #[must_use]
    pub fn all_values(&self) -> &[BindValue] {
        self.bind.values()
    }

    /// Look up one value.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::NotFound`] when `id` is not one of the field's values.
    pub fn bind_value(&self, id: ValueId) -> Result<&BindValue, BindError> {
        self.index
            .get(&id)
            .and_then(|&position| self.bind.values().get(position))
            .ok_or(BindError::NotFound {
                field_id: self.field_id,
                value_id: id,
            })
    }

    /// `true` when `id` is one of the field's values (sentinel excluded).
    #[must_use]
    pub fn contains(&self, id: ValueId) -> bool {
        self.index.contains_key(&id)
    }

    /// Resolve several ids, silently dropping the ones that do not resolve.
    #[must_use]
    pub fn bind_values(&self, ids: &[ValueId]) -> Vec<&BindValue> {
        ids.iter()
            .filter_map(|id| self.bind_value(*id).ok())
            .collect()
    }

    #[must_use]
    pub fn format_value(&self, value: &BindValue) -> String {
        if value.is_none() {
            return self.none_label.clone();
        }
        self.bind.format_value(value)
    }

    /// Display label of `id`, if it resolves.
    #[must_use]
    pub fn label_for(&self, id: ValueId) -> Option<String> {
        if id.is_none_sentinel() {
            return Some(self.none_label.clone());
        }
        self.bind_value(id).ok().map(|value| self.bind.format_value(value))
    }

    /// Position of `id` in configured order; unknown ids sort last.
    #[must_use]
    pub fn rank_of(&self, id: ValueId) -> usize {
        self.index.get(&id).copied().unwrap_or(usize::MAX)
    }

    /// Non-hidden values, preceded by a synthetic "None" entry when the field
    /// is not required and at least one visible value exists.
    #[must_use]
    pub fn visible_values_plus_none(&self, required: bool) -> Vec<BindValue> {
        let mut values: Vec<BindValue> = self
            .all_values()
            .iter()
            .filter(|value| !value.hidden)
            .cloned()
            .collect();
        if !values.is_empty() && !required {
            values.insert(0, BindValue::none(self.none_label.clone()));
        }
        values
    }

    /// Look `id` up among [`Self::visible_values_plus_none`].
    #[must_use]
    pub fn list_value_by_id(&self, id: ValueId, required: bool) -> Option<BindValue> {
        self.visible_values_plus_none(required)
            .into_iter()
            .find(|value| value.id == id)
    }

    /// Values flagged as defaults, in configured order.
    #[must_use]
    pub fn default_values(&self) -> Vec<&BindValue> {
        self.all_values()
            .iter()
            .filter(|value| value.is_default)
            .collect()
    }

    /// Default value ids, or `[NONE_VALUE_ID]` when the field has none.
    #[must_use]
    pub fn default_value_ids(&self) -> Vec<ValueId> {
        let ids: Vec<ValueId> = self.default_values().iter().map(|value| value.id).collect();
        if ids.is_empty() {
            vec![NONE_VALUE_ID]
        } else {
            ids
        }
    }

    /// First value whose raw label matches exactly (import path).
    #[must_use]
    pub fn value_by_label(&self, label: &str) -> Option<&BindValue> {
        self.all_values().iter().find(|value| value.label == label)
    }
}
