pub mod artifact;
pub mod field;
pub mod group;
pub mod history;
pub mod init;
pub mod perm;
pub mod set;
pub mod show;
pub mod user;
pub mod workflow;

use crate::actor;
use crate::output::{CliError, OutputMode, fail};
use anyhow::Context as _;
use picklist_core::bind::BindValueStore;
use picklist_core::config::{EffectiveConfig, PROJECT_DIR};
use picklist_core::db::store::SqliteStore;
use picklist_core::db::{STORE_FILE, open_store};
use picklist_core::error::ErrorCode;
use picklist_core::model::actor::Actor;
use picklist_core::model::field::Field;
use picklist_core::model::ids::ValueId;
use picklist_core::repo::{StoreError, ValueRepository};
use picklist_core::update::ArtifactUpdater;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a command needs besides its own arguments.
pub struct Session {
    pub project_root: PathBuf,
    pub output: OutputMode,
    pub config: EffectiveConfig,
    actor_flag: Option<String>,
}

impl Session {
    pub fn new(
        project_root: PathBuf,
        config: EffectiveConfig,
        actor_flag: Option<String>,
    ) -> Self {
        let output = OutputMode::from_resolved(&config.resolved_output);
        Self {
            project_root,
            output,
            config,
            actor_flag,
        }
    }

    pub fn store_path(&self) -> PathBuf {
        store_path(&self.project_root)
    }

    /// Open the project store; fails with a `pk init` hint when the project
    /// has not been initialized.
    pub fn open_store(&self) -> anyhow::Result<SqliteStore> {
        let path = self.store_path();
        if !path.exists() {
            return Err(fail(
                self.output,
                CliError::with_code(
                    format!("no picklist project at {}", self.project_root.display()),
                    ErrorCode::NotInitialized,
                ),
            ));
        }
        let timeout = Duration::from_millis(self.config.project.store.busy_timeout_ms);
        let conn = open_store(&path, timeout)
            .with_context(|| format!("open store {}", path.display()))?;
        Ok(SqliteStore::new(conn)
            .with_unrestricted_when_no_groups(self.config.project.workflow.unrestricted_when_no_groups))
    }

    /// The acting user, with group memberships loaded.
    pub fn require_actor(&self, store: &SqliteStore) -> anyhow::Result<Actor> {
        let login = actor::require_actor(self.actor_flag.as_deref(), self.config.user.actor.as_deref())
            .map_err(|e| fail(self.output, CliError::with_code(e.message, ErrorCode::UserNotFound)))?;
        store.actor(&login).map_err(|e| self.store_failure(&e))
    }

    pub fn updater<'s>(&self, store: &'s SqliteStore) -> ArtifactUpdater<'s> {
        ArtifactUpdater::new(store).with_history_config(&self.config.project.history)
    }

    /// Load a field's bind values with the configured "None" label.
    pub fn value_store(&self, store: &SqliteStore, field: &Field) -> anyhow::Result<BindValueStore> {
        BindValueStore::load(field, store as &dyn ValueRepository)
            .map(|values| values.with_none_label(self.config.project.history.none_label.clone()))
            .map_err(|e| self.store_failure(&e))
    }

    pub fn field(&self, store: &SqliteStore, key: &str) -> anyhow::Result<Field> {
        store.field_by_key(key).map_err(|e| self.store_failure(&e))
    }

    /// Report a store error with its code and convert it for `?`.
    pub fn store_failure(&self, error: &StoreError) -> anyhow::Error {
        fail(self.output, CliError::from(error))
    }
}

pub fn store_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR).join(STORE_FILE)
}

/// Resolve a value token of `field`, first match wins:
///
/// 1. a value whose label is exactly `token`
/// 2. `none` (any case) or the "None" label, for the sentinel
/// 3. a value id
/// 4. a value whose label matches `token` ignoring case
pub fn resolve_value(values: &BindValueStore, token: &str) -> Option<ValueId> {
    let token = token.trim();
    if let Some(value) = values.value_by_label(token) {
        return Some(value.id);
    }
    if token.eq_ignore_ascii_case("none") || token == values.none_label() {
        return Some(picklist_core::model::ids::NONE_VALUE_ID);
    }
    if let Ok(id) = token.parse::<ValueId>() {
        if values.contains(id) {
            return Some(id);
        }
    }
    values
        .all_values()
        .iter()
        .find(|value| value.label.eq_ignore_ascii_case(token))
        .map(|value| value.id)
}

/// Resolve a comma-separated list of value tokens. An empty list means "None".
pub fn resolve_values(
    values: &BindValueStore,
    field: &Field,
    tokens: &str,
    output: OutputMode,
) -> anyhow::Result<Vec<ValueId>> {
    tokens
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            resolve_value(values, token).ok_or_else(|| {
                fail(
                    output,
                    CliError::with_code(
                        format!("'{token}' is not a value of the field {}", field.label),
                        ErrorCode::BindValueNotFound,
                    ),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use picklist_core::bind::Bind;
    use picklist_core::model::field::BindKind;
    use picklist_core::model::ids::{FieldId, NONE_VALUE_ID};
    use picklist_core::model::value::BindValue;

    fn values() -> BindValueStore {
        BindValueStore::new(
            FieldId::new(1),
            Bind::from_kind(
                BindKind::Static,
                vec![
                    BindValue::new(ValueId::new(101), "Open"),
                    BindValue::new(ValueId::new(102), "Closed"),
                ],
            ),
        )
    }

    #[test]
    fn tokens_resolve_by_label_id_or_none() {
        let values = values();
        assert_eq!(resolve_value(&values, "Open"), Some(ValueId::new(101)));
        assert_eq!(resolve_value(&values, "closed"), Some(ValueId::new(102)));
        assert_eq!(resolve_value(&values, "102"), Some(ValueId::new(102)));
        assert_eq!(resolve_value(&values, "None"), Some(NONE_VALUE_ID));
        assert_eq!(resolve_value(&values, "Pending"), None);
        assert_eq!(resolve_value(&values, "999"), None);
    }

    #[test]
    fn exact_label_wins_over_sentinel_and_ids() {
        let values = BindValueStore::new(
            FieldId::new(1),
            Bind::from_kind(
                BindKind::Static,
                vec![
                    BindValue::new(ValueId::new(101), "none"),
                    BindValue::new(ValueId::new(102), "101"),
                    BindValue::new(ValueId::new(103), "Later"),
                ],
            ),
        );
        assert_eq!(resolve_value(&values, "none"), Some(ValueId::new(101)));
        assert_eq!(resolve_value(&values, "NONE"), Some(NONE_VALUE_ID));
        assert_eq!(resolve_value(&values, "101"), Some(ValueId::new(102)));
        assert_eq!(resolve_value(&values, "103"), Some(ValueId::new(103)));
        assert_eq!(resolve_value(&values, "later"), Some(ValueId::new(103)));
    }
}
