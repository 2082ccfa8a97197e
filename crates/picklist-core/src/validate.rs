//! Validation of a submitted list value.
//!
//! Nothing here returns an `Err`: a rejected value is recorded as a
//! [`FieldError`] on the [`RequestContext`] and the check answers `false`.
//! Callers must consult the answer (or [`RequestContext::has_errors`]) before
//! handing the value to the writer. One field's rejection never aborts the
//! rest of an artifact update.
//!
//! Checks, in order:
//! 1. permissions and the required flag ([`FieldValidator::validate_with_permissions_and_required_status`])
//! 2. the required flag against the submitted ids
//! 3. membership of every id in the field's bind values, and the
//!    single-value limit
//! 4. workflow transitions, when the field's workflow is enabled

use serde::Serialize;
use std::fmt;

use crate::bind::BindValueStore;
use crate::context::RequestContext;
use crate::error::ErrorCode;
use crate::model::changeset::ChangesetValue;
use crate::model::field::Field;
use crate::model::ids::ValueId;
use crate::model::value::{is_none_submission, normalize_ids};
use crate::repo::WorkflowSource;
use crate::workflow::TransitionValidator;

/// Why a submitted value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Required,
    PermissionDenied,
    InvalidValue,
    TooManyValues,
    InvalidTransition,
    TransitionToNone,
    TransitionNotAuthorized,
}

impl FieldErrorKind {
    #[must_use]
    pub const fn code(self) -> ErrorCode {
        match self {
            Self::Required => ErrorCode::RequiredValueMissing,
            Self::PermissionDenied => ErrorCode::PermissionDenied,
            Self::InvalidValue | Self::TooManyValues => ErrorCode::InvalidValue,
            Self::InvalidTransition | Self::TransitionToNone => ErrorCode::InvalidTransition,
            Self::TransitionNotAuthorized => ErrorCode::TransitionNotAuthorized,
        }
    }
}

/// A field-level validation failure with its user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.code())
    }
}

/// Validation rules of one list field.
pub struct FieldValidator<'a> {
    field: &'a Field,
    store: &'a BindValueStore,
    transitions: TransitionValidator<'a>,
}

impl<'a> FieldValidator<'a> {
    pub fn new(
        field: &'a Field,
        store: &'a BindValueStore,
        workflow: &'a dyn WorkflowSource,
    ) -> Self {
        Self {
            field,
            store,
            transitions: TransitionValidator::new(field.id, workflow),
        }
    }

    #[must_use]
    pub const fn transitions(&self) -> &TransitionValidator<'a> {
        &self.transitions
    }

    /// Values a new artifact gets for this field when the request leaves it
    /// untouched: the configured defaults, or nothing when an enabled
    /// workflow decides the initial state.
    #[must_use]
    pub fn submit_default_values(&self) -> Vec<ValueId> {
        if self.transitions.is_enabled() {
            return Vec::new();
        }
        self.store.default_values().iter().map(|value| value.id).collect()
    }

    /// Full check of a submission: permissions, the required flag, then
    /// the value itself.
    ///
    /// `previous` is the field's value in the artifact's last changeset and
    /// `submitted` is `None` when the request did not touch the field.
    pub fn validate_with_permissions_and_required_status(
        &self,
        ctx: &mut RequestContext<'_>,
        previous: Option<&ChangesetValue>,
        submitted: Option<&[ValueId]>,
        is_submission: bool,
    ) -> bool {
        let field_id = self.field.id;
        let has_permission = if is_submission {
            ctx.can_submit(field_id)
        } else {
            ctx.can_update(field_id)
        };
        let submitted_something = submitted.is_some_and(|ids| !ids.is_empty());

        if previous.is_none() && !submitted_something && has_permission && self.field.required {
            self.record_required(ctx);
            return false;
        }

        if submitted_something && !has_permission {
            ctx.record_error(
                field_id,
                FieldError::new(
                    FieldErrorKind::PermissionDenied,
                    format!("You are not allowed to update the field {}.", self.field.label),
                ),
            );
            return false;
        }

        match submitted {
            Some(ids) if has_permission => {
                self.is_valid_regarding_required_property(ctx, ids)
                    && self.is_valid(ctx, previous, ids)
            }
            _ => true,
        }
    }

    /// A "None" submission (empty, or only the sentinel) is rejected on a
    /// required field.
    pub fn is_valid_regarding_required_property(
        &self,
        ctx: &mut RequestContext<'_>,
        submitted: &[ValueId],
    ) -> bool {
        if self.field.required && is_none_submission(submitted) {
            self.record_required(ctx);
            return false;
        }
        true
    }

    /// Check the submitted ids against the field's values and, when the
    /// workflow is enabled, against its transitions.
    pub fn is_valid(
        &self,
        ctx: &mut RequestContext<'_>,
        previous: Option<&ChangesetValue>,
        submitted: &[ValueId],
    ) -> bool {
        let unknown: Vec<ValueId> = submitted
            .iter()
            .copied()
            .filter(|id| !id.is_none_sentinel() && !self.store.contains(*id))
            .collect();
        if !unknown.is_empty() {
            let ids: Vec<String> = unknown.iter().map(ToString::to_string).collect();
            ctx.record_error(
                self.field.id,
                FieldError::new(
                    FieldErrorKind::InvalidValue,
                    format!(
                        "The value {} does not belong to the field {}.",
                        ids.join(", "),
                        self.field.label
                    ),
                ),
            );
            return false;
        }

        let ids = normalize_ids(submitted);
        if !self.field.multiple && ids.len() > 1 {
            ctx.record_error(
                self.field.id,
                FieldError::new(
                    FieldErrorKind::TooManyValues,
                    format!("The field {} accepts a single value.", self.field.label),
                ),
            );
            return false;
        }

        if !self.transitions.is_enabled() {
            return true;
        }
        self.validate_transition(ctx, previous, &ids)
    }

    /// Every previous value other than the target must have an edge to the
    /// target, and the actor must be allowed to take the edge leaving the
    /// first previous value.
    ///
    /// Multi-valued fields are checked one previous value at a time against
    /// the first submitted value, i.e. as if the field were single-valued.
    fn validate_transition(
        &self,
        ctx: &mut RequestContext<'_>,
        previous: Option<&ChangesetValue>,
        ids: &[ValueId],
    ) -> bool {
        let Some(&to) = ids.first() else {
            ctx.record_error(
                self.field.id,
                FieldError::new(
                    FieldErrorKind::TransitionToNone,
                    "The transition to None is not valid.",
                ),
            );
            return false;
        };

        let previous_ids = previous.map(ChangesetValue::value_ids).unwrap_or_default();
        let edges_exist = if previous_ids.is_empty() {
            self.transitions.is_transition_valid(None, to)
        } else {
            previous_ids
                .iter()
                .filter(|from| **from != to)
                .all(|from| self.transitions.is_transition_valid(Some(*from), to))
        };

        let target = self.store.label_for(to).unwrap_or_else(|| to.to_string());
        if !edges_exist {
            ctx.record_error(
                self.field.id,
                FieldError::new(
                    FieldErrorKind::InvalidTransition,
                    format!("The transition to the value \"{target}\" is not valid."),
                ),
            );
            return false;
        }

        let from = previous_ids.first().copied();
        let transition_id = self.transitions.transition_id(from, to);
        if !self
            .transitions
            .user_can_make_transition(transition_id, ctx.actor())
        {
            ctx.record_error(
                self.field.id,
                FieldError::new(
                    FieldErrorKind::TransitionNotAuthorized,
                    format!("You are not allowed to make the transition to \"{target}\"."),
                ),
            );
            return false;
        }
        true
    }

    fn record_required(&self, ctx: &mut RequestContext<'_>) {
        ctx.record_error(
            self.field.id,
            FieldError::new(
                FieldErrorKind::Required,
                format!("{} is required.", self.field.display_name()),
            ),
        );
    }
}
