//! `SqliteStore`: every collaborator trait over one SQLite connection, plus
//! the administration writes the CLI needs.
//!
//! Each write that touches more than one row runs in its own transaction.
//! Value row writes use savepoints instead, so they nest inside the
//! changeset unit opened by [`ArtifactRepository::begin_changeset`].
//! Reads go straight to the connection.

use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

use crate::context::Access;
use crate::model::actor::Actor;
use crate::model::changeset::{Artifact, Changeset, StoredChangesetValue};
use crate::model::field::{BindKind, Field};
use crate::model::ids::{
    ArtifactId, ChangesetId, ChangesetValueId, FieldId, TransitionId, UgroupId, UserId, ValueId,
};
use crate::model::value::{BindValue, Decorator};
use crate::repo::{
    ArtifactRepository, FieldPermissions, StoreError, ValueRepository, WorkflowSource,
};
use crate::workflow::{Transition, Workflow, WorkflowState};

/// Built-in group every user joins on creation.
pub const PROJECT_MEMBERS_GROUP: &str = "ugroup_project_members_name_key";

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// A field to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewField {
    pub name: String,
    pub label: String,
    pub bind_kind: BindKind,
    pub required: bool,
    pub multiple: bool,
    pub read_only: bool,
}

impl NewField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, bind_kind: BindKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            bind_kind,
            required: false,
            multiple: false,
            read_only: false,
        }
    }
}

/// A value to append to a field.
///
/// For user-bound fields `label` is a login and for group-bound fields a
/// group name; the referenced user or group must exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBindValue {
    pub label: String,
    pub description: Option<String>,
    pub hidden: bool,
    pub is_default: bool,
    pub decorator: Option<Decorator>,
}

impl NewBindValue {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Connection,
    unrestricted_when_no_groups: bool,
}

impl SqliteStore {
    /// Wrap a migrated connection (see [`crate::db::open_store`]).
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self {
            conn,
            unrestricted_when_no_groups: true,
        }
    }

    /// A fresh migrated in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = super::open_in_memory().context("create in-memory store")?;
        Ok(Self::new(conn))
    }

    /// Whether transitions without authorized groups are open to everyone.
    #[must_use]
    pub fn with_unrestricted_when_no_groups(mut self, unrestricted: bool) -> Self {
        self.unrestricted_when_no_groups = unrestricted;
        self
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `write` inside a savepoint. Unlike a transaction, a savepoint
    /// nests under an open changeset unit.
    fn in_savepoint<T>(
        &self,
        name: &str,
        write: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        match write(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {name}"))?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                {
                    tracing::warn!(savepoint = name, error = %rollback, "savepoint rollback failed");
                }
                Err(error)
            }
        }
    }

    // -- users and groups ---------------------------------------------------

    /// Create the built-in project members group if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn ensure_project_members_group(&self) -> Result<UgroupId, StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO ugroups (name, created_at_us) VALUES (?1, ?2)",
            params![PROJECT_MEMBERS_GROUP, now_us()],
        )?;
        self.group_by_name(PROJECT_MEMBERS_GROUP)
    }

    /// Create a user; they join the project members group when it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the login is taken or the write fails.
    pub fn create_user(&self, login: &str, real_name: Option<&str>) -> Result<UserId, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO users (login, real_name, created_at_us) VALUES (?1, ?2, ?3)",
            params![login.trim(), real_name, now_us()],
        )?;
        let user_id = UserId::new(tx.last_insert_rowid());
        tx.execute(
            "INSERT OR IGNORE INTO ugroup_members (ugroup_id, user_id)
             SELECT ugroup_id, ?1 FROM ugroups WHERE name = ?2",
            params![user_id.get(), PROJECT_MEMBERS_GROUP],
        )?;
        tx.commit()?;
        tracing::info!(user_id = %user_id, login, "created user");
        Ok(user_id)
    }

    /// Load a user with their group memberships.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown login.
    pub fn actor(&self, login: &str) -> Result<Actor, StoreError> {
        let user_id: i64 = self
            .conn
            .query_row(
                "SELECT user_id FROM users WHERE login = ?1",
                [login.trim()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("user", login))?;

        let mut stmt = self
            .conn
            .prepare_cached("SELECT ugroup_id FROM ugroup_members WHERE user_id = ?1")?;
        let groups = stmt
            .query_map([user_id], |row| row.get::<_, i64>(0).map(UgroupId::new))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Actor::new(UserId::new(user_id), login.trim()).with_groups(groups))
    }

    /// # Errors
    ///
    /// Returns an error if the name is taken or the write fails.
    pub fn create_group(&self, name: &str) -> Result<UgroupId, StoreError> {
        self.conn.execute(
            "INSERT INTO ugroups (name, created_at_us) VALUES (?1, ?2)",
            params![name.trim(), now_us()],
        )?;
        let ugroup_id = UgroupId::new(self.conn.last_insert_rowid());
        tracing::info!(ugroup_id = %ugroup_id, name, "created group");
        Ok(ugroup_id)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown group.
    pub fn group_by_name(&self, name: &str) -> Result<UgroupId, StoreError> {
        self.conn
            .query_row(
                "SELECT ugroup_id FROM ugroups WHERE name = ?1",
                [name.trim()],
                |row| row.get::<_, i64>(0).map(UgroupId::new),
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("group", name))
    }

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown group id.
    pub fn group_name(&self, ugroup_id: UgroupId) -> Result<String, StoreError> {
        self.conn
            .query_row(
                "SELECT name FROM ugroups WHERE ugroup_id = ?1",
                [ugroup_id.get()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("group", ugroup_id))
    }

    /// Add a user to a group. Returns `false` when they already were a member.
    ///
    /// # Errors
    ///
    /// Returns an error if either side does not exist.
    pub fn add_member(&self, ugroup_id: UgroupId, user_id: UserId) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO ugroup_members (ugroup_id, user_id) VALUES (?1, ?2)",
            params![ugroup_id.get(), user_id.get()],
        )?;
        Ok(inserted > 0)
    }

    // -- fields and values --------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the name is taken or the write fails.
    pub fn create_field(&self, new: &NewField) -> Result<Field, StoreError> {
        self.conn.execute(
            "INSERT INTO fields (name, label, bind_kind, required, multiple, read_only, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.name.trim(),
                new.label,
                new.bind_kind.as_str(),
                new.required,
                new.multiple,
                new.read_only,
                now_us()
            ],
        )?;
        let field_id = FieldId::new(self.conn.last_insert_rowid());
        tracing::info!(field_id = %field_id, name = %new.name, kind = %new.bind_kind, "created field");
        self.field(field_id)
    }

    /// Look a field up by numeric id or by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when nothing matches.
    pub fn field_by_key(&self, key: &str) -> Result<Field, StoreError> {
        if let Ok(field_id) = key.parse::<FieldId>() {
            return self.field(field_id);
        }
        self.conn
            .query_row(
                &format!("{FIELD_COLUMNS} WHERE name = ?1"),
                [key.trim()],
                row_to_field,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("field", key))
    }

    /// Append a value at the end of the field's configured order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the field, or the user/group a
    /// dynamic value refers to, does not exist.
    pub fn add_bind_value(&self, field_id: FieldId, new: &NewBindValue) -> Result<ValueId, StoreError> {
        let field = self.field(field_id)?;
        let (user_id, ugroup_id) = match field.bind_kind {
            BindKind::Static => (None, None),
            BindKind::Users => (Some(self.actor(&new.label)?.id.get()), None),
            BindKind::Ugroups => (None, Some(self.group_by_name(&new.label)?.get())),
        };

        let tx = self.conn.unchecked_transaction()?;
        let rank: i64 = tx.query_row(
            "SELECT COALESCE(MAX(rank) + 1, 0) FROM bind_values WHERE field_id = ?1",
            [field_id.get()],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO bind_values
                (field_id, label, description, rank, hidden, is_default, user_id, ugroup_id, decorator)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                field_id.get(),
                new.label.trim(),
                new.description,
                rank,
                new.hidden,
                new.is_default,
                user_id,
                ugroup_id,
                new.decorator.map(|decorator| decorator.to_string()),
            ],
        )?;
        let value_id = ValueId::new(tx.last_insert_rowid());
        tx.commit()?;
        tracing::info!(field = %field.name, value_id = %value_id, label = %new.label, "added value");
        Ok(value_id)
    }

    /// # Errors
    ///
    /// Returns an error if the field or group does not exist.
    pub fn grant(&self, field_id: FieldId, ugroup_id: UgroupId, access: Access) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO field_permissions (field_id, ugroup_id, access) VALUES (?1, ?2, ?3)",
            params![field_id.get(), ugroup_id.get(), access.as_str()],
        )?;
        tracing::info!(field_id = %field_id, ugroup_id = %ugroup_id, %access, "granted access");
        Ok(())
    }

    // -- workflow -----------------------------------------------------------

    /// Create the field's workflow if needed and set whether it is enforced.
    ///
    /// # Errors
    ///
    /// Returns an error if the field does not exist.
    pub fn set_workflow_enabled(&self, field_id: FieldId, enabled: bool) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO workflows (field_id, enabled) VALUES (?1, ?2)
             ON CONFLICT(field_id) DO UPDATE SET enabled = excluded.enabled",
            params![field_id.get(), enabled],
        )?;
        tracing::info!(field_id = %field_id, enabled, "workflow updated");
        Ok(())
    }

    /// Add the edge `from -> to` (or extend its groups when it exists).
    /// A field without a workflow gets a disabled one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when a value is not one of the
    /// field's values.
    pub fn add_transition(
        &self,
        field_id: FieldId,
        from: Option<ValueId>,
        to: ValueId,
        groups: &[UgroupId],
    ) -> Result<TransitionId, StoreError> {
        for value_id in from.into_iter().chain([to]) {
            if !self.field_has_value(field_id, value_id)? {
                return Err(StoreError::not_found("bind value", value_id));
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO workflows (field_id, enabled) VALUES (?1, 0)",
            [field_id.get()],
        )?;
        let existing = find_transition(&tx, field_id, from, to)?;
        let transition_id = if let Some(id) = existing {
            id
        } else {
            tx.execute(
                "INSERT INTO transitions (field_id, from_value_id, to_value_id) VALUES (?1, ?2, ?3)",
                params![field_id.get(), from.map(ValueId::get), to.get()],
            )?;
            TransitionId::new(tx.last_insert_rowid())
        };
        for group in groups {
            tx.execute(
                "INSERT OR IGNORE INTO transition_groups (transition_id, ugroup_id) VALUES (?1, ?2)",
                params![transition_id.get(), group.get()],
            )?;
        }
        tx.commit()?;
        tracing::info!(
            field_id = %field_id,
            transition_id = %transition_id,
            from = ?from.map(ValueId::get),
            to = %to,
            "transition saved"
        );
        Ok(transition_id)
    }

    /// The field's workflow with its transitions, if one is defined.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read.
    pub fn workflow(&self, field_id: FieldId) -> Result<Option<Workflow>, StoreError> {
        let state = self.workflow_state(field_id)?;
        if !state.is_defined() {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare_cached(
            "SELECT transition_id, from_value_id, to_value_id FROM transitions
             WHERE field_id = ?1 ORDER BY transition_id",
        )?;
        let rows = stmt
            .query_map([field_id.get()], |row| {
                Ok((
                    TransitionId::new(row.get(0)?),
                    row.get::<_, Option<i64>>(1)?.map(ValueId::new),
                    ValueId::new(row.get(2)?),
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut transitions = Vec::with_capacity(rows.len());
        for (id, from, to) in rows {
            transitions.push(Transition {
                id,
                from,
                to,
                authorized_groups: self.transition_groups(id)?.into_iter().collect(),
            });
        }

        Ok(Some(Workflow {
            field_id,
            enabled: state.is_enabled(),
            transitions,
            unrestricted_when_no_groups: self.unrestricted_when_no_groups,
        }))
    }

    fn transition_groups(&self, transition_id: TransitionId) -> Result<Vec<UgroupId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT ugroup_id FROM transition_groups WHERE transition_id = ?1")?;
        let groups = stmt
            .query_map([transition_id.get()], |row| row.get::<_, i64>(0).map(UgroupId::new))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(groups)
    }

    fn field_has_value(&self, field_id: FieldId, value_id: ValueId) -> Result<bool, StoreError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM bind_values WHERE value_id = ?1 AND field_id = ?2)",
            params![value_id.get(), field_id.get()],
            |row| row.get(0),
        )?)
    }

    // -- artifacts ----------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the creator does not exist or the write fails.
    pub fn create_artifact(&self, title: &str, created_by: &Actor) -> Result<Artifact, StoreError> {
        let created_at_us = now_us();
        self.conn.execute(
            "INSERT INTO artifacts (title, created_by, created_at_us) VALUES (?1, ?2, ?3)",
            params![title, created_by.id.get(), created_at_us],
        )?;
        let artifact = Artifact {
            id: ArtifactId::new(self.conn.last_insert_rowid()),
            title: title.to_string(),
            created_by: created_by.id,
            created_at_us,
        };
        tracing::info!(artifact_id = %artifact.id, actor = %created_by.login, "created artifact");
        Ok(artifact)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown artifact.
    pub fn artifact(&self, artifact_id: ArtifactId) -> Result<Artifact, StoreError> {
        self.conn
            .query_row(
                "SELECT artifact_id, title, created_by, created_at_us FROM artifacts
                 WHERE artifact_id = ?1",
                [artifact_id.get()],
                |row| {
                    Ok(Artifact {
                        id: ArtifactId::new(row.get(0)?),
                        title: row.get(1)?,
                        created_by: UserId::new(row.get(2)?),
                        created_at_us: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("artifact", artifact_id))
    }

    fn value_list(&self, changeset_value_id: i64) -> Result<Vec<ValueId>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT value_id FROM changeset_value_list
             WHERE changeset_value_id = ?1 ORDER BY position",
        )?;
        let ids = stmt
            .query_map([changeset_value_id], |row| row.get::<_, i64>(0).map(ValueId::new))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn granted(&self, actor: &Actor, field_id: FieldId, accesses: &[Access]) -> Result<bool, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT ugroup_id, access FROM field_permissions WHERE field_id = ?1")?;
        let rows = stmt.query_map([field_id.get()], |row| {
            Ok((UgroupId::new(row.get(0)?), row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (group, access) = row?;
            if actor.is_member_of(group) && accesses.iter().any(|a| a.as_str() == access) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

impl ValueRepository for SqliteStore {
    fn load_bind_values(&self, field_id: FieldId) -> Result<Vec<BindValue>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT bv.value_id,
                    COALESCE(u.login, g.name, bv.label),
                    COALESCE(u.real_name, bv.description),
                    bv.hidden,
                    bv.is_default,
                    bv.decorator
             FROM bind_values bv
             LEFT JOIN users u ON u.user_id = bv.user_id
             LEFT JOIN ugroups g ON g.ugroup_id = bv.ugroup_id
             WHERE bv.field_id = ?1
             ORDER BY bv.rank, bv.value_id",
        )?;
        let values = stmt
            .query_map([field_id.get()], row_to_bind_value)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }

    fn load_changeset_value(
        &self,
        changeset_id: ChangesetId,
        field_id: FieldId,
    ) -> Result<Option<StoredChangesetValue>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT changeset_value_id, has_changed FROM changeset_values
                 WHERE changeset_id = ?1 AND field_id = ?2",
                params![changeset_id.get(), field_id.get()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?)),
            )
            .optional()?;
        let Some((row_id, has_changed)) = row else {
            return Ok(None);
        };

        Ok(Some(StoredChangesetValue {
            id: ChangesetValueId::new(row_id),
            changeset_id,
            field_id,
            value_ids: self.value_list(row_id)?,
            has_changed,
        }))
    }

    fn insert_changeset_value(
        &self,
        changeset_id: ChangesetId,
        field_id: FieldId,
        value_ids: &[ValueId],
    ) -> Result<ChangesetValueId, StoreError> {
        self.in_savepoint("changeset_value", |conn| {
            conn.execute(
                "INSERT INTO changeset_values (changeset_id, field_id, has_changed) VALUES (?1, ?2, 1)",
                params![changeset_id.get(), field_id.get()],
            )?;
            let row_id = conn.last_insert_rowid();
            let mut stmt = conn.prepare_cached(
                "INSERT INTO changeset_value_list (changeset_value_id, position, value_id)
                 VALUES (?1, ?2, ?3)",
            )?;
            for (position, value_id) in (0_i64..).zip(value_ids) {
                stmt.execute(params![row_id, position, value_id.get()])?;
            }
            Ok(ChangesetValueId::new(row_id))
        })
    }

    fn link_changeset_value_to_existing(
        &self,
        changeset_id: ChangesetId,
        field_id: FieldId,
        existing: ChangesetValueId,
    ) -> Result<bool, StoreError> {
        self.in_savepoint("changeset_value", |conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM changeset_values WHERE changeset_value_id = ?1)",
                [existing.get()],
                |row| row.get(0),
            )?;
            if !found {
                tracing::warn!(existing = %existing, "value row to copy forward is missing");
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO changeset_values (changeset_id, field_id, has_changed) VALUES (?1, ?2, 0)",
                params![changeset_id.get(), field_id.get()],
            )?;
            let row_id = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO changeset_value_list (changeset_value_id, position, value_id)
                 SELECT ?1, position, value_id FROM changeset_value_list
                 WHERE changeset_value_id = ?2",
                params![row_id, existing.get()],
            )?;
            Ok(true)
        })
    }
}

impl WorkflowSource for SqliteStore {
    fn workflow_state(&self, field_id: FieldId) -> Result<WorkflowState, StoreError> {
        let enabled: Option<bool> = self
            .conn
            .query_row(
                "SELECT enabled FROM workflows WHERE field_id = ?1",
                [field_id.get()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match enabled {
            None => WorkflowState::Absent,
            Some(false) => WorkflowState::Defined,
            Some(true) => WorkflowState::Enabled,
        })
    }

    fn transition(
        &self,
        field_id: FieldId,
        from: Option<ValueId>,
        to: ValueId,
    ) -> Result<Option<TransitionId>, StoreError> {
        find_transition(&self.conn, field_id, from, to)
    }

    fn is_transition_authorized(
        &self,
        transition_id: TransitionId,
        actor: &Actor,
    ) -> Result<bool, StoreError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM transitions WHERE transition_id = ?1)",
            [transition_id.get()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::not_found("transition", transition_id));
        }

        let groups = self.transition_groups(transition_id)?;
        if groups.is_empty() {
            return Ok(self.unrestricted_when_no_groups);
        }
        Ok(actor.is_member_of_any(&groups))
    }
}

impl FieldPermissions for SqliteStore {
    fn can_update_field(&self, actor: &Actor, field_id: FieldId) -> Result<bool, StoreError> {
        self.granted(actor, field_id, &[Access::Update])
    }

    fn can_submit_field(&self, actor: &Actor, field_id: FieldId) -> Result<bool, StoreError> {
        self.granted(actor, field_id, &[Access::Submit])
    }

    /// Update access implies read access.
    fn can_read_field(&self, actor: &Actor, field_id: FieldId) -> Result<bool, StoreError> {
        self.granted(actor, field_id, &[Access::Read, Access::Update])
    }
}

impl ArtifactRepository for SqliteStore {
    fn fields(&self) -> Result<Vec<Field>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{FIELD_COLUMNS} ORDER BY field_id"))?;
        let fields = stmt
            .query_map([], row_to_field)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fields)
    }

    fn field(&self, field_id: FieldId) -> Result<Field, StoreError> {
        self.conn
            .query_row(
                &format!("{FIELD_COLUMNS} WHERE field_id = ?1"),
                [field_id.get()],
                row_to_field,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("field", field_id))
    }

    fn create_changeset(
        &self,
        artifact_id: ArtifactId,
        actor: &Actor,
    ) -> Result<Changeset, StoreError> {
        // Surfaces a missing artifact as NotFound rather than a constraint error.
        self.artifact(artifact_id)?;
        let submitted_on_us = now_us();
        self.conn.execute(
            "INSERT INTO changesets (artifact_id, submitted_by, submitted_on_us) VALUES (?1, ?2, ?3)",
            params![artifact_id.get(), actor.id.get(), submitted_on_us],
        )?;
        Ok(Changeset {
            id: ChangesetId::new(self.conn.last_insert_rowid()),
            artifact_id,
            submitted_by: actor.id,
            submitted_on_us,
        })
    }

    fn changesets(&self, artifact_id: ArtifactId) -> Result<Vec<Changeset>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT changeset_id, submitted_by, submitted_on_us FROM changesets
             WHERE artifact_id = ?1 ORDER BY changeset_id",
        )?;
        let changesets = stmt
            .query_map([artifact_id.get()], |row| {
                Ok(Changeset {
                    id: ChangesetId::new(row.get(0)?),
                    artifact_id,
                    submitted_by: UserId::new(row.get(1)?),
                    submitted_on_us: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(changesets)
    }

    fn begin_changeset(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("SAVEPOINT changeset_unit")?;
        Ok(())
    }

    fn commit_changeset(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("RELEASE changeset_unit")?;
        Ok(())
    }

    fn rollback_changeset(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("ROLLBACK TO changeset_unit; RELEASE changeset_unit")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const FIELD_COLUMNS: &str =
    "SELECT field_id, name, label, bind_kind, required, multiple, read_only FROM fields";

fn row_to_field(row: &Row<'_>) -> rusqlite::Result<Field> {
    let kind: String = row.get(3)?;
    let bind_kind = kind
        .parse::<BindKind>()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(error)))?;
    Ok(Field {
        id: FieldId::new(row.get(0)?),
        name: row.get(1)?,
        label: row.get(2)?,
        bind_kind,
        required: row.get(4)?,
        multiple: row.get(5)?,
        read_only: row.get(6)?,
    })
}

fn row_to_bind_value(row: &Row<'_>) -> rusqlite::Result<BindValue> {
    let decorator = row
        .get::<_, Option<String>>(5)?
        .map(|raw| raw.parse::<Decorator>())
        .transpose()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(error)))?;
    Ok(BindValue {
        id: ValueId::new(row.get(0)?),
        label: row.get(1)?,
        description: row.get(2)?,
        hidden: row.get(3)?,
        is_default: row.get(4)?,
        decorator,
    })
}

fn find_transition(
    conn: &Connection,
    field_id: FieldId,
    from: Option<ValueId>,
    to: ValueId,
) -> Result<Option<TransitionId>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT transition_id FROM transitions
             WHERE field_id = ?1 AND to_value_id = ?2 AND from_value_id IS ?3
             ORDER BY transition_id LIMIT 1",
            params![field_id.get(), to.get(), from.map(ValueId::get)],
            |row| row.get::<_, i64>(0).map(TransitionId::new),
        )
        .optional()?)
}

fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        store: SqliteStore,
        alice: Actor,
        bob: Actor,
        devs: UgroupId,
        status: Field,
        open: ValueId,
        closed: ValueId,
    }

    fn fixture() -> Fixture {
        let store = SqliteStore::open_in_memory().expect("open store");
        store.ensure_project_members_group().expect("members group");
        store.create_user("alice", Some("Alice Liddell")).expect("alice");
        store.create_user("bob", None).expect("bob");
        let devs = store.create_group("developers").expect("group");
        let alice_id = store.actor("alice").expect("alice").id;
        store.add_member(devs, alice_id).expect("membership");

        let status = store
            .create_field(&NewField::new("status", "Status", BindKind::Static))
            .expect("field");
        let open = store
            .add_bind_value(status.id, &NewBindValue::new("Open"))
            .expect("open");
        let closed = store
            .add_bind_value(status.id, &NewBindValue::new("Closed"))
            .expect("closed");

        Fixture {
            alice: store.actor("alice").expect("alice"),
            bob: store.actor("bob").expect("bob"),
            store,
            devs,
            status,
            open,
            closed,
        }
    }

    #[test]
    fn users_join_project_members() {
        let fx = fixture();
        let members = fx
            .store
            .group_by_name(PROJECT_MEMBERS_GROUP)
            .expect("members group");
        assert!(fx.alice.is_member_of(members));
        assert_eq!(fx.store.group_name(fx.devs).expect("name"), "developers");
        assert!(fx.alice.is_member_of(fx.devs));
        assert!(fx.bob.is_member_of(members));
        assert!(!fx.bob.is_member_of(fx.devs));
    }

    #[test]
    fn unknown_lookups_are_not_found() {
        let fx = fixture();
        assert!(matches!(fx.store.actor("carol"), Err(StoreError::NotFound { .. })));
        assert!(matches!(fx.store.group_by_name("qa"), Err(StoreError::NotFound { .. })));
        assert!(matches!(
            fx.store.group_name(UgroupId::new(99)),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(fx.store.field_by_key("priority"), Err(StoreError::NotFound { .. })));
        assert!(matches!(
            fx.store.artifact(ArtifactId::new(9)),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn field_lookup_by_id_or_name() {
        let fx = fixture();
        assert_eq!(fx.store.field_by_key("status").expect("by name"), fx.status);
        assert_eq!(
            fx.store.field_by_key(&fx.status.id.to_string()).expect("by id"),
            fx.status
        );
        assert_eq!(fx.store.fields().expect("fields"), vec![fx.status.clone()]);
    }

    #[test]
    fn bind_values_load_in_configured_order_above_sentinel() {
        let fx = fixture();
        let decorated = NewBindValue {
            hidden: true,
            decorator: Some("#ff0000".parse().expect("colour")),
            ..NewBindValue::new("Obsolete")
        };
        fx.store.add_bind_value(fx.status.id, &decorated).expect("obsolete");

        let values = fx.store.load_bind_values(fx.status.id).expect("values");
        let labels: Vec<&str> = values.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(labels, ["Open", "Closed", "Obsolete"]);
        assert!(values.iter().all(|v| v.id.get() > 100));
        assert!(values[2].hidden);
        assert_eq!(values[2].decorator.map(|d| d.to_string()).as_deref(), Some("#ff0000"));
    }

    #[test]
    fn user_bound_values_track_the_user_row() {
        let fx = fixture();
        let assignee = fx
            .store
            .create_field(&NewField::new("assigned_to", "Assigned to", BindKind::Users))
            .expect("field");
        fx.store
            .add_bind_value(assignee.id, &NewBindValue::new("alice"))
            .expect("alice value");
        assert!(matches!(
            fx.store.add_bind_value(assignee.id, &NewBindValue::new("carol")),
            Err(StoreError::NotFound { .. })
        ));

        let values = fx.store.load_bind_values(assignee.id).expect("values");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].label, "alice");
        assert_eq!(values[0].description.as_deref(), Some("Alice Liddell"));
    }

    #[test]
    fn changeset_values_insert_load_and_copy_forward() {
        let fx = fixture();
        let artifact = fx.store.create_artifact("Crash on save", &fx.alice).expect("artifact");
        let first = fx.store.create_changeset(artifact.id, &fx.alice).expect("cs1");
        let second = fx.store.create_changeset(artifact.id, &fx.bob).expect("cs2");

        let row = fx
            .store
            .insert_changeset_value(first.id, fx.status.id, &[fx.closed, fx.open])
            .expect("insert");
        let stored = fx
            .store
            .load_changeset_value(first.id, fx.status.id)
            .expect("load")
            .expect("row");
        assert_eq!(stored.id, row);
        assert_eq!(stored.value_ids, vec![fx.closed, fx.open]);
        assert!(stored.has_changed);

        assert!(fx
            .store
            .link_changeset_value_to_existing(second.id, fx.status.id, row)
            .expect("link"));
        let copied = fx
            .store
            .load_changeset_value(second.id, fx.status.id)
            .expect("load")
            .expect("row");
        assert_eq!(copied.value_ids, vec![fx.closed, fx.open]);
        assert!(!copied.has_changed);
        assert_ne!(copied.id, row);

        let changesets = fx.store.changesets(artifact.id).expect("changesets");
        let ids: Vec<ChangesetId> = changesets.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn empty_value_set_round_trips_as_none() {
        let fx = fixture();
        let artifact = fx.store.create_artifact("Empty", &fx.alice).expect("artifact");
        let cs = fx.store.create_changeset(artifact.id, &fx.alice).expect("cs");
        fx.store
            .insert_changeset_value(cs.id, fx.status.id, &[])
            .expect("insert");
        let stored = fx
            .store
            .load_changeset_value(cs.id, fx.status.id)
            .expect("load")
            .expect("row");
        assert!(stored.value_ids.is_empty());
    }

    #[test]
    fn link_to_missing_row_reports_false() {
        let fx = fixture();
        let artifact = fx.store.create_artifact("Orphan", &fx.alice).expect("artifact");
        let cs = fx.store.create_changeset(artifact.id, &fx.alice).expect("cs");
        assert!(!fx
            .store
            .link_changeset_value_to_existing(cs.id, fx.status.id, ChangesetValueId::new(404))
            .expect("link"));
        assert!(fx
            .store
            .load_changeset_value(cs.id, fx.status.id)
            .expect("load")
            .is_none());
    }

    #[test]
    fn second_value_for_same_changeset_is_rejected() {
        let fx = fixture();
        let artifact = fx.store.create_artifact("Twice", &fx.alice).expect("artifact");
        let cs = fx.store.create_changeset(artifact.id, &fx.alice).expect("cs");
        fx.store
            .insert_changeset_value(cs.id, fx.status.id, &[fx.open])
            .expect("first insert");
        assert!(fx
            .store
            .insert_changeset_value(cs.id, fx.status.id, &[fx.closed])
            .is_err());
    }

    #[test]
    fn changeset_unit_rolls_back_as_a_whole() {
        let fx = fixture();
        let artifact = fx.store.create_artifact("Atomic", &fx.alice).expect("artifact");

        fx.store.begin_changeset().expect("begin");
        let cs = fx.store.create_changeset(artifact.id, &fx.alice).expect("cs");
        fx.store
            .insert_changeset_value(cs.id, fx.status.id, &[fx.open])
            .expect("insert");
        // A failed row write only undoes itself; the unit stays open.
        assert!(fx
            .store
            .insert_changeset_value(cs.id, fx.status.id, &[fx.closed])
            .is_err());
        assert!(fx
            .store
            .load_changeset_value(cs.id, fx.status.id)
            .expect("load")
            .is_some());
        fx.store.rollback_changeset().expect("rollback");

        assert!(fx.store.changesets(artifact.id).expect("changesets").is_empty());
        assert!(fx
            .store
            .load_changeset_value(cs.id, fx.status.id)
            .expect("load")
            .is_none());

        fx.store.begin_changeset().expect("begin");
        let kept = fx.store.create_changeset(artifact.id, &fx.alice).expect("cs");
        fx.store
            .insert_changeset_value(kept.id, fx.status.id, &[fx.closed])
            .expect("insert");
        fx.store.commit_changeset().expect("commit");
        let row = fx
            .store
            .load_changeset_value(kept.id, fx.status.id)
            .expect("load")
            .expect("row");
        assert_eq!(row.value_ids, vec![fx.closed]);
    }

    #[test]
    fn changeset_for_missing_artifact_is_not_found() {
        let fx = fixture();
        assert!(matches!(
            fx.store.create_changeset(ArtifactId::new(77), &fx.alice),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn workflow_state_and_transitions() {
        let fx = fixture();
        assert_eq!(
            fx.store.workflow_state(fx.status.id).expect("state"),
            WorkflowState::Absent
        );

        let to_closed = fx
            .store
            .add_transition(fx.status.id, Some(fx.open), fx.closed, &[fx.devs])
            .expect("transition");
        let initial = fx
            .store
            .add_transition(fx.status.id, None, fx.open, &[])
            .expect("initial");
        assert_eq!(
            fx.store.workflow_state(fx.status.id).expect("state"),
            WorkflowState::Defined
        );

        fx.store.set_workflow_enabled(fx.status.id, true).expect("enable");
        assert_eq!(
            fx.store.workflow_state(fx.status.id).expect("state"),
            WorkflowState::Enabled
        );

        assert_eq!(
            fx.store.transition(fx.status.id, Some(fx.open), fx.closed).expect("lookup"),
            Some(to_closed)
        );
        assert_eq!(fx.store.transition(fx.status.id, None, fx.open).expect("lookup"), Some(initial));
        assert_eq!(fx.store.transition(fx.status.id, None, fx.closed).expect("lookup"), None);

        // Re-adding extends the groups of the same edge.
        let again = fx
            .store
            .add_transition(fx.status.id, Some(fx.open), fx.closed, &[fx.devs])
            .expect("again");
        assert_eq!(again, to_closed);

        let workflow = fx.store.workflow(fx.status.id).expect("workflow").expect("defined");
        assert!(workflow.enabled);
        assert_eq!(workflow.transitions.len(), 2);
    }

    #[test]
    fn transition_to_foreign_value_is_rejected() {
        let fx = fixture();
        let other = fx
            .store
            .create_field(&NewField::new("severity", "Severity", BindKind::Static))
            .expect("field");
        let major = fx
            .store
            .add_bind_value(other.id, &NewBindValue::new("Major"))
            .expect("value");
        assert!(matches!(
            fx.store.add_transition(fx.status.id, Some(fx.open), major, &[]),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn transition_authorization_follows_groups() {
        let fx = fixture();
        let guarded = fx
            .store
            .add_transition(fx.status.id, Some(fx.open), fx.closed, &[fx.devs])
            .expect("guarded");
        let open_edge = fx
            .store
            .add_transition(fx.status.id, Some(fx.closed), fx.open, &[])
            .expect("open edge");

        assert!(fx.store.is_transition_authorized(guarded, &fx.alice).expect("alice"));
        assert!(!fx.store.is_transition_authorized(guarded, &fx.bob).expect("bob"));
        assert!(fx.store.is_transition_authorized(open_edge, &fx.bob).expect("bob"));
        assert!(matches!(
            fx.store.is_transition_authorized(TransitionId::new(999), &fx.bob),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn strict_policy_closes_edges_without_groups() {
        let fx = fixture();
        let edge = fx
            .store
            .add_transition(fx.status.id, None, fx.open, &[])
            .expect("edge");
        let strict = fx.store.with_unrestricted_when_no_groups(false);
        assert!(!strict.is_transition_authorized(edge, &fx.bob).expect("bob"));
        let workflow = strict.workflow(fx.status.id).expect("workflow").expect("defined");
        assert!(!workflow.unrestricted_when_no_groups);
    }

    #[test]
    fn permissions_are_granted_through_groups() {
        let fx = fixture();
        fx.store
            .grant(fx.status.id, fx.devs, Access::Update)
            .expect("grant update");
        let members = fx
            .store
            .group_by_name(PROJECT_MEMBERS_GROUP)
            .expect("members");
        fx.store
            .grant(fx.status.id, members, Access::Submit)
            .expect("grant submit");

        assert!(fx.store.can_update_field(&fx.alice, fx.status.id).expect("alice update"));
        assert!(fx.store.can_read_field(&fx.alice, fx.status.id).expect("alice read"));
        assert!(!fx.store.can_update_field(&fx.bob, fx.status.id).expect("bob update"));
        assert!(fx.store.can_submit_field(&fx.bob, fx.status.id).expect("bob submit"));
        assert!(!fx.store.can_read_field(&fx.bob, fx.status.id).expect("bob read"));
    }
}
