//! Value resolution: which bind values a field held in a given changeset.

use crate::bind::BindValueStore;
use crate::context::RequestContext;
use crate::model::changeset::ChangesetValue;
use crate::model::ids::{ChangesetId, FieldId, ValueId};
use crate::model::value::BindValue;
use crate::repo::{StoreError, ValueRepository};

/// Joins stored value rows against a field's bind value store.
pub struct ValueResolver<'a> {
    store: &'a BindValueStore,
    repo: &'a dyn ValueRepository,
}

impl<'a> ValueResolver<'a> {
    pub fn new(store: &'a BindValueStore, repo: &'a dyn ValueRepository) -> Self {
        Self { store, repo }
    }

    #[must_use]
    pub const fn field_id(&self) -> FieldId {
        self.store.field_id()
    }

    /// The field's value row in `changeset_id`, with ids that no longer
    /// resolve dropped. `None` when the changeset has no row for the field.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored row cannot be read.
    pub fn changeset_value(
        &self,
        changeset_id: ChangesetId,
    ) -> Result<Option<ChangesetValue>, StoreError> {
        let Some(stored) = self.repo.load_changeset_value(changeset_id, self.field_id())? else {
            return Ok(None);
        };

        let mut values = Vec::with_capacity(stored.value_ids.len());
        for id in &stored.value_ids {
            match self.store.bind_value(*id) {
                Ok(value) => values.push(value.clone()),
                Err(error) => {
                    tracing::debug!(
                        changeset_id = %changeset_id,
                        error = %error,
                        "dropping stale value reference"
                    );
                }
            }
        }

        Ok(Some(ChangesetValue {
            id: stored.id,
            changeset_id: stored.changeset_id,
            field_id: stored.field_id,
            values,
            has_changed: stored.has_changed,
        }))
    }

    /// Ids stored for the field in `changeset_id`, as written. Ids whose
    /// bind value was deleted are kept so the audit trail can still show
    /// them. `None` when the changeset has no row for the field.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored row cannot be read.
    pub fn stored_ids(&self, changeset_id: ChangesetId) -> Result<Option<Vec<ValueId>>, StoreError> {
        Ok(self
            .repo
            .load_changeset_value(changeset_id, self.field_id())?
            .map(|row| row.value_ids))
    }

    /// Resolved values of the field in `changeset_id`; empty for "None" or
    /// when nothing was recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored row cannot be read.
    pub fn values_for_changeset(
        &self,
        changeset_id: ChangesetId,
    ) -> Result<Vec<BindValue>, StoreError> {
        Ok(self
            .changeset_value(changeset_id)?
            .map(|value| value.values)
            .unwrap_or_default())
    }

    /// Label of one value of the field in `changeset_id`.
    ///
    /// Meant for fields that are single-valued by convention: for several
    /// values, which label is returned is unspecified.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored row cannot be read.
    pub fn first_value_for(&self, changeset_id: ChangesetId) -> Result<Option<String>, StoreError> {
        Ok(self
            .values_for_changeset(changeset_id)?
            .first()
            .map(|value| self.store.format_value(value))
            .filter(|label| !label.is_empty()))
    }

    /// [`Self::first_value_for`], hidden from actors who cannot read the field.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored row cannot be read.
    pub fn first_value_for_actor(
        &self,
        ctx: &mut RequestContext<'_>,
        changeset_id: ChangesetId,
    ) -> Result<Option<String>, StoreError> {
        if !ctx.can_read(self.field_id()) {
            return Ok(None);
        }
        self.first_value_for(changeset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::Bind;
    use crate::model::actor::Actor;
    use crate::model::changeset::StoredChangesetValue;
    use crate::model::field::BindKind;
    use crate::model::ids::{ChangesetValueId, UserId};
    use crate::repo::FieldPermissions;
    use std::collections::HashMap;

    struct FixedRows(HashMap<ChangesetId, Vec<ValueId>>);

    impl ValueRepository for FixedRows {
        fn load_bind_values(&self, _: FieldId) -> Result<Vec<BindValue>, StoreError> {
            Ok(Vec::new())
        }

        fn load_changeset_value(
            &self,
            changeset_id: ChangesetId,
            field_id: FieldId,
        ) -> Result<Option<StoredChangesetValue>, StoreError> {
            Ok(self.0.get(&changeset_id).map(|ids| StoredChangesetValue {
                id: ChangesetValueId::new(changeset_id.get() * 10),
                changeset_id,
                field_id,
                value_ids: ids.clone(),
                has_changed: true,
            }))
        }

        fn insert_changeset_value(
            &self,
            _: ChangesetId,
            _: FieldId,
            _: &[ValueId],
        ) -> Result<ChangesetValueId, StoreError> {
            Err(StoreError::Corrupt("read-only fixture".into()))
        }

        fn link_changeset_value_to_existing(
            &self,
            _: ChangesetId,
            _: FieldId,
            _: ChangesetValueId,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    struct ReadOnly(bool);

    impl FieldPermissions for ReadOnly {
        fn can_update_field(&self, _: &Actor, _: FieldId) -> Result<bool, StoreError> {
            Ok(false)
        }

        fn can_submit_field(&self, _: &Actor, _: FieldId) -> Result<bool, StoreError> {
            Ok(false)
        }

        fn can_read_field(&self, _: &Actor, _: FieldId) -> Result<bool, StoreError> {
            Ok(self.0)
        }
    }

    fn store() -> BindValueStore {
        BindValueStore::new(
            FieldId::new(1),
            Bind::from_kind(
                BindKind::Static,
                vec![
                    BindValue::new(ValueId::new(1), "Open"),
                    BindValue::new(ValueId::new(2), "Closed"),
                ],
            ),
        )
    }

    fn rows() -> FixedRows {
        FixedRows(HashMap::from([
            (ChangesetId::new(1), vec![ValueId::new(1)]),
            (ChangesetId::new(2), vec![ValueId::new(2), ValueId::new(404)]),
            (ChangesetId::new(3), vec![]),
        ]))
    }

    #[test]
    fn resolves_and_drops_stale_ids() {
        let store = store();
        let repo = rows();
        let resolver = ValueResolver::new(&store, &repo);

        let value = resolver
            .changeset_value(ChangesetId::new(2))
            .expect("read")
            .expect("row exists");
        assert_eq!(value.value_ids(), vec![ValueId::new(2)]);
        assert!(value.has_changed);
    }

    #[test]
    fn stored_ids_keep_stale_references() {
        let store = store();
        let repo = rows();
        let resolver = ValueResolver::new(&store, &repo);

        assert_eq!(
            resolver.stored_ids(ChangesetId::new(2)).expect("read"),
            Some(vec![ValueId::new(2), ValueId::new(404)])
        );
        assert_eq!(resolver.stored_ids(ChangesetId::new(9)).expect("read"), None);
    }

    #[test]
    fn none_and_missing_rows_resolve_to_empty() {
        let store = store();
        let repo = rows();
        let resolver = ValueResolver::new(&store, &repo);

        assert!(resolver.values_for_changeset(ChangesetId::new(3)).expect("read").is_empty());
        assert!(resolver.values_for_changeset(ChangesetId::new(9)).expect("read").is_empty());
        assert!(resolver.changeset_value(ChangesetId::new(9)).expect("read").is_none());
    }

    #[test]
    fn first_value_for_returns_a_label() {
        let store = store();
        let repo = rows();
        let resolver = ValueResolver::new(&store, &repo);

        assert_eq!(
            resolver.first_value_for(ChangesetId::new(1)).expect("read").as_deref(),
            Some("Open")
        );
        assert_eq!(resolver.first_value_for(ChangesetId::new(3)).expect("read"), None);
    }

    #[test]
    fn first_value_for_actor_respects_read_permission() {
        let store = store();
        let repo = rows();
        let resolver = ValueResolver::new(&store, &repo);
        let actor = Actor::new(UserId::new(1), "alice");

        let allowed = ReadOnly(true);
        let mut ctx = RequestContext::new(actor.clone(), &allowed);
        assert_eq!(
            resolver
                .first_value_for_actor(&mut ctx, ChangesetId::new(1))
                .expect("read")
                .as_deref(),
            Some("Open")
        );

        let denied = ReadOnly(false);
        let mut ctx = RequestContext::new(actor, &denied);
        assert_eq!(
            resolver.first_value_for_actor(&mut ctx, ChangesetId::new(1)).expect("read"),
            None
        );
    }
}
