//! Per-request state: the acting user, cached permission answers and the
//! validation errors recorded for each field.
//!
//! Build one [`RequestContext`] per incoming request and pass it down to the
//! validator and writer. It replaces lazily-initialised caches on field
//! objects: nothing outlives the request.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::model::actor::Actor;
use crate::model::ids::FieldId;
use crate::repo::FieldPermissions;
use crate::validate::FieldError;

/// Kind of access checked against [`FieldPermissions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Submit,
    Update,
}

impl Access {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Submit => "submit",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown access '{0}': expected read, submit or update")]
pub struct ParseAccessError(pub String);

impl FromStr for Access {
    type Err = ParseAccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "submit" => Ok(Self::Submit),
            "update" => Ok(Self::Update),
            _ => Err(ParseAccessError(s.to_string())),
        }
    }
}

pub struct RequestContext<'a> {
    actor: Actor,
    permissions: &'a dyn FieldPermissions,
    cache: HashMap<(FieldId, Access), bool>,
    errors: BTreeMap<FieldId, Vec<FieldError>>,
}

impl<'a> RequestContext<'a> {
    pub fn new(actor: Actor, permissions: &'a dyn FieldPermissions) -> Self {
        Self {
            actor,
            permissions,
            cache: HashMap::new(),
            errors: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Permission check, memoised for the lifetime of the request. A failing
    /// permission source denies access.
    pub fn can(&mut self, access: Access, field_id: FieldId) -> bool {
        if let Some(&cached) = self.cache.get(&(field_id, access)) {
            return cached;
        }
        let answer = match access {
            Access::Read => self.permissions.can_read_field(&self.actor, field_id),
            Access::Submit => self.permissions.can_submit_field(&self.actor, field_id),
            Access::Update => self.permissions.can_update_field(&self.actor, field_id),
        };
        let granted = answer.unwrap_or_else(|error| {
            tracing::warn!(
                field_id = %field_id,
                actor = %self.actor.login,
                ?access,
                error = %error,
                "permission lookup failed; denying"
            );
            false
        });
        self.cache.insert((field_id, access), granted);
        granted
    }

    pub fn can_read(&mut self, field_id: FieldId) -> bool {
        self.can(Access::Read, field_id)
    }

    pub fn can_submit(&mut self, field_id: FieldId) -> bool {
        self.can(Access::Submit, field_id)
    }

    pub fn can_update(&mut self, field_id: FieldId) -> bool {
        self.can(Access::Update, field_id)
    }

    /// Flag the field as erroneous.
    pub fn record_error(&mut self, field_id: FieldId, error: FieldError) {
        tracing::debug!(field_id = %field_id, kind = ?error.kind, "{}", error.message);
        self.errors.entry(field_id).or_default().push(error);
    }

    #[must_use]
    pub fn has_errors(&self, field_id: FieldId) -> bool {
        self.errors.get(&field_id).is_some_and(|errors| !errors.is_empty())
    }

    #[must_use]
    pub fn errors(&self, field_id: FieldId) -> &[FieldError] {
        self.errors.get(&field_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Reset the error flag of one field.
    pub fn clear_errors(&mut self, field_id: FieldId) {
        self.errors.remove(&field_id);
    }

    /// Drain every recorded error.
    pub fn take_errors(&mut self) -> BTreeMap<FieldId, Vec<FieldError>> {
        std::mem::take(&mut self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::UserId;
    use crate::repo::StoreError;
    use crate::validate::FieldErrorKind;
    use std::cell::Cell;

    struct CountingPermissions {
        calls: Cell<usize>,
    }

    impl FieldPermissions for CountingPermissions {
        fn can_update_field(&self, _: &Actor, field_id: FieldId) -> Result<bool, StoreError> {
            self.calls.set(self.calls.get() + 1);
            Ok(field_id == FieldId::new(1))
        }

        fn can_submit_field(&self, _: &Actor, _: FieldId) -> Result<bool, StoreError> {
            Err(StoreError::Corrupt("permissions table unreadable".into()))
        }

        fn can_read_field(&self, _: &Actor, _: FieldId) -> Result<bool, StoreError> {
            Ok(true)
        }
    }

    #[test]
    fn permission_answers_are_cached_per_request() {
        let permissions = CountingPermissions { calls: Cell::new(0) };
        let mut ctx = RequestContext::new(Actor::new(UserId::new(1), "alice"), &permissions);

        assert!(ctx.can_update(FieldId::new(1)));
        assert!(ctx.can_update(FieldId::new(1)));
        assert!(!ctx.can_update(FieldId::new(2)));
        assert_eq!(permissions.calls.get(), 2);
    }

    #[test]
    fn failing_permission_source_denies() {
        let permissions = CountingPermissions { calls: Cell::new(0) };
        let mut ctx = RequestContext::new(Actor::new(UserId::new(1), "alice"), &permissions);
        assert!(!ctx.can_submit(FieldId::new(1)));
        assert!(ctx.can_read(FieldId::new(1)));
    }

    #[test]
    fn access_parses_case_insensitively() {
        assert_eq!("Update".parse::<Access>(), Ok(Access::Update));
        assert_eq!(" read ".parse::<Access>(), Ok(Access::Read));
        assert!("write".parse::<Access>().is_err());
        assert_eq!(Access::Submit.to_string(), "submit");
    }

    #[test]
    fn errors_are_tracked_per_field() {
        let permissions = CountingPermissions { calls: Cell::new(0) };
        let mut ctx = RequestContext::new(Actor::new(UserId::new(1), "alice"), &permissions);
        let field = FieldId::new(5);

        assert!(!ctx.has_errors(field));
        ctx.record_error(field, FieldError::new(FieldErrorKind::Required, "Status is required."));
        assert!(ctx.has_errors(field));
        assert_eq!(ctx.errors(field).len(), 1);
        assert!(!ctx.has_errors(FieldId::new(6)));

        let drained = ctx.take_errors();
        assert_eq!(drained.len(), 1);
        assert!(!ctx.has_errors(field));
    }
}
