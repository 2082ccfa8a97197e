//! Workflow transitions on a list field.
//!
//! A workflow is a state machine whose states are the field's bind value ids
//! plus an implicit "unset" state (`from = None`). Only an [`WorkflowState::Enabled`]
//! workflow constrains writes; a defined-but-unused workflow behaves like no
//! workflow at all.
//!
//! [`TransitionValidator`] answers the two questions asked during validation:
//! does the edge exist, and may this actor traverse it. Collaborator failures
//! are logged and answered with "no".

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::actor::Actor;
use crate::model::ids::{FieldId, TransitionId, UgroupId, ValueId};
use crate::repo::{StoreError, WorkflowSource};

/// Workflow configuration status of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    /// No workflow on this field.
    #[default]
    Absent,
    /// Transitions are configured but not enforced.
    Defined,
    /// Transitions are enforced.
    Enabled,
}

impl WorkflowState {
    #[must_use]
    pub const fn is_defined(self) -> bool {
        !matches!(self, Self::Absent)
    }

    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// A directed edge of the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    /// `None` is the "unset" state of a new artifact.
    pub from: Option<ValueId>,
    pub to: ValueId,
    /// Groups allowed to traverse the edge.
    #[serde(default)]
    pub authorized_groups: BTreeSet<UgroupId>,
}

impl Transition {
    /// Group-based authorization. An edge without authorized groups is open to
    /// everyone when `unrestricted_when_no_groups` is set.
    #[must_use]
    pub fn authorizes(&self, actor: &Actor, unrestricted_when_no_groups: bool) -> bool {
        if self.authorized_groups.is_empty() {
            return unrestricted_when_no_groups;
        }
        actor.is_member_of_any(&self.authorized_groups)
    }
}

/// An in-memory workflow definition for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub field_id: FieldId,
    pub enabled: bool,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default = "default_true")]
    pub unrestricted_when_no_groups: bool,
}

const fn default_true() -> bool {
    true
}

impl Workflow {
    #[must_use]
    pub const fn new(field_id: FieldId, enabled: bool) -> Self {
        Self {
            field_id,
            enabled,
            transitions: Vec::new(),
            unrestricted_when_no_groups: true,
        }
    }

    /// Add an edge; its id is its 1-based position.
    #[must_use]
    pub fn with_transition(
        mut self,
        from: Option<ValueId>,
        to: ValueId,
        groups: impl IntoIterator<Item = UgroupId>,
    ) -> Self {
        let id = TransitionId::new(
            i64::try_from(self.transitions.len())
                .unwrap_or(i64::MAX)
                .saturating_add(1),
        );
        self.transitions.push(Transition {
            id,
            from,
            to,
            authorized_groups: groups.into_iter().collect(),
        });
        self
    }

    #[must_use]
    pub const fn with_unrestricted_when_no_groups(mut self, unrestricted: bool) -> Self {
        self.unrestricted_when_no_groups = unrestricted;
        self
    }

    #[must_use]
    pub const fn state(&self) -> WorkflowState {
        if self.enabled {
            WorkflowState::Enabled
        } else {
            WorkflowState::Defined
        }
    }

    #[must_use]
    pub fn find(&self, from: Option<ValueId>, to: ValueId) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|transition| transition.from == from && transition.to == to)
    }
}

impl WorkflowSource for Workflow {
    fn workflow_state(&self, field_id: FieldId) -> Result<WorkflowState, StoreError> {
        if field_id == self.field_id {
            Ok(self.state())
        } else {
            Ok(WorkflowState::Absent)
        }
    }

    fn transition(
        &self,
        field_id: FieldId,
        from: Option<ValueId>,
        to: ValueId,
    ) -> Result<Option<TransitionId>, StoreError> {
        if field_id != self.field_id {
            return Ok(None);
        }
        Ok(self.find(from, to).map(|transition| transition.id))
    }

    fn is_transition_authorized(
        &self,
        transition_id: TransitionId,
        actor: &Actor,
    ) -> Result<bool, StoreError> {
        let transition = self
            .transitions
            .iter()
            .find(|transition| transition.id == transition_id)
            .ok_or_else(|| StoreError::not_found("transition", transition_id))?;
        Ok(transition.authorizes(actor, self.unrestricted_when_no_groups))
    }
}

/// Transition checks for one field.
pub struct TransitionValidator<'a> {
    field_id: FieldId,
    source: &'a dyn WorkflowSource,
    state: WorkflowState,
}

impl<'a> TransitionValidator<'a> {
    /// Read the field's workflow state once; a failing source counts as
    /// [`WorkflowState::Absent`].
    pub fn new(field_id: FieldId, source: &'a dyn WorkflowSource) -> Self {
        let state = source.workflow_state(field_id).unwrap_or_else(|error| {
            tracing::warn!(field_id = %field_id, error = %error, "workflow state unavailable");
            WorkflowState::Absent
        });
        Self {
            field_id,
            source,
            state,
        }
    }

    #[must_use]
    pub const fn state(&self) -> WorkflowState {
        self.state
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// Without an enabled workflow every transition is valid. With one, only
    /// configured edges are; a self-transition needs its own edge.
    #[must_use]
    pub fn is_transition_valid(&self, from: Option<ValueId>, to: ValueId) -> bool {
        if !self.is_enabled() {
            return true;
        }
        self.transition_id(from, to).is_some()
    }

    /// The configured edge `from -> to`, if any.
    #[must_use]
    pub fn transition_id(&self, from: Option<ValueId>, to: ValueId) -> Option<TransitionId> {
        match self.source.transition(self.field_id, from, to) {
            Ok(id) => id,
            Err(error) => {
                tracing::warn!(
                    field_id = %self.field_id,
                    error = %error,
                    "transition lookup failed"
                );
                None
            }
        }
    }

    /// No transition id means nothing to authorize.
    #[must_use]
    pub fn user_can_make_transition(
        &self,
        transition_id: Option<TransitionId>,
        actor: &Actor,
    ) -> bool {
        let Some(transition_id) = transition_id else {
            return true;
        };
        match self.source.is_transition_authorized(transition_id, actor) {
            Ok(authorized) => authorized,
            Err(error) => {
                tracing::warn!(
                    transition_id = %transition_id,
                    actor = %actor.login,
                    error = %error,
                    "transition permission lookup failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::UserId;

    const OPEN: ValueId = ValueId::new(1);
    const CLOSED: ValueId = ValueId::new(2);
    const GROUP: UgroupId = UgroupId::new(7);

    fn status_workflow(enabled: bool) -> Workflow {
        Workflow::new(FieldId::new(1), enabled).with_transition(Some(OPEN), CLOSED, [GROUP])
    }

    #[test]
    fn disabled_workflow_accepts_any_transition() {
        let workflow = status_workflow(false);
        let validator = TransitionValidator::new(FieldId::new(1), &workflow);
        assert_eq!(validator.state(), WorkflowState::Defined);
        assert!(validator.is_transition_valid(Some(CLOSED), OPEN));
        assert!(validator.is_transition_valid(None, CLOSED));
    }

    #[test]
    fn absent_workflow_for_other_fields() {
        let workflow = status_workflow(true);
        let validator = TransitionValidator::new(FieldId::new(2), &workflow);
        assert_eq!(validator.state(), WorkflowState::Absent);
        assert!(validator.is_transition_valid(Some(CLOSED), OPEN));
    }

    #[test]
    fn enabled_workflow_requires_configured_edge() {
        let workflow = status_workflow(true);
        let validator = TransitionValidator::new(FieldId::new(1), &workflow);
        assert!(validator.is_transition_valid(Some(OPEN), CLOSED));
        assert!(!validator.is_transition_valid(Some(CLOSED), OPEN));
        assert!(!validator.is_transition_valid(None, OPEN));
    }

    #[test]
    fn self_transition_needs_explicit_edge() {
        let workflow = status_workflow(true);
        let validator = TransitionValidator::new(FieldId::new(1), &workflow);
        assert!(!validator.is_transition_valid(Some(OPEN), OPEN));

        let looped = status_workflow(true).with_transition(Some(OPEN), OPEN, []);
        let validator = TransitionValidator::new(FieldId::new(1), &looped);
        assert!(validator.is_transition_valid(Some(OPEN), OPEN));
    }

    #[test]
    fn transition_permission_follows_group_membership() {
        let workflow = status_workflow(true);
        let validator = TransitionValidator::new(FieldId::new(1), &workflow);
        let id = validator.transition_id(Some(OPEN), CLOSED);
        assert!(id.is_some());

        let member = Actor::new(UserId::new(1), "member").with_groups([GROUP]);
        let outsider = Actor::new(UserId::new(2), "outsider").with_groups([UgroupId::new(8)]);
        assert!(validator.user_can_make_transition(id, &member));
        assert!(!validator.user_can_make_transition(id, &outsider));
    }

    #[test]
    fn missing_transition_id_is_always_permitted() {
        let workflow = status_workflow(true);
        let validator = TransitionValidator::new(FieldId::new(1), &workflow);
        let nobody = Actor::new(UserId::new(3), "nobody");
        assert!(validator.user_can_make_transition(None, &nobody));
    }

    #[test]
    fn edges_without_groups_follow_policy() {
        let open = Workflow::new(FieldId::new(1), true).with_transition(None, OPEN, []);
        let closed = open.clone().with_unrestricted_when_no_groups(false);
        let actor = Actor::new(UserId::new(4), "anyone");

        let validator = TransitionValidator::new(FieldId::new(1), &open);
        assert!(validator.user_can_make_transition(validator.transition_id(None, OPEN), &actor));

        let validator = TransitionValidator::new(FieldId::new(1), &closed);
        assert!(!validator.user_can_make_transition(validator.transition_id(None, OPEN), &actor));
    }

    #[test]
    fn transition_ids_follow_insertion_order() {
        let workflow = Workflow::new(FieldId::new(1), true)
            .with_transition(None, OPEN, [])
            .with_transition(Some(OPEN), CLOSED, []);
        let validator = TransitionValidator::new(FieldId::new(1), &workflow);
        assert_eq!(validator.transition_id(None, OPEN), Some(TransitionId::new(1)));
        assert_eq!(validator.transition_id(Some(OPEN), CLOSED), Some(TransitionId::new(2)));
    }

    #[test]
    fn unknown_transition_id_is_denied() {
        let workflow = status_workflow(true);
        let validator = TransitionValidator::new(FieldId::new(1), &workflow);
        let member = Actor::new(UserId::new(1), "member").with_groups([GROUP]);
        assert!(!validator.user_can_make_transition(Some(TransitionId::new(99)), &member));
    }
}
