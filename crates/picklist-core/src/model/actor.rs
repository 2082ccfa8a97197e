use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{UgroupId, UserId};

/// The user performing a request, with the groups they belong to.
///
/// Passed explicitly to every permission and transition check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub login: String,
    #[serde(default)]
    pub groups: BTreeSet<UgroupId>,
}

impl Actor {
    pub fn new(id: UserId, login: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            groups: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_groups(mut self, groups: impl IntoIterator<Item = UgroupId>) -> Self {
        self.groups.extend(groups);
        self
    }

    #[must_use]
    pub fn is_member_of(&self, group: UgroupId) -> bool {
        self.groups.contains(&group)
    }

    /// `true` when the actor belongs to at least one of `groups`.
    #[must_use]
    pub fn is_member_of_any<'a>(&self, groups: impl IntoIterator<Item = &'a UgroupId>) -> bool {
        groups.into_iter().any(|group| self.groups.contains(group))
    }
}
