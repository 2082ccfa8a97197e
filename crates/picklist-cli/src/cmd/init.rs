use crate::cmd::store_path;
use crate::output::{OutputMode, render, text_kv};
use anyhow::{Context as _, Result};
use clap::Args;
use picklist_core::config::{PROJECT_DIR, ProjectConfig, save_project_config};
use picklist_core::db::store::SqliteStore;
use picklist_core::db::{DEFAULT_BUSY_TIMEOUT, migrations, open_store};
use serde::Serialize;
use std::path::Path;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite `.picklist/config.toml` with defaults even if the project exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitReport {
    ok: bool,
    store: String,
    config: String,
    schema_version: u32,
}

/// Execute `pk init`. Creates the project skeleton:
///
/// ```text
/// .picklist/
///   config.toml    (default project config)
///   picklist.db    (migrated SQLite store)
/// ```
///
/// # Errors
///
/// Returns an error if the project exists and `--force` is not set, or if
/// any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let dir = project_root.join(PROJECT_DIR);
    let db_path = store_path(project_root);
    if db_path.exists() && !args.force {
        anyhow::bail!("{PROJECT_DIR}/ already exists. Use `pk init --force` to reinitialize.");
    }

    let config_path = dir.join("config.toml");
    if args.force || !config_path.exists() {
        save_project_config(project_root, &ProjectConfig::default())?;
    }

    let conn = open_store(&db_path, DEFAULT_BUSY_TIMEOUT)?;
    let schema_version =
        migrations::current_schema_version(&conn).context("read store schema version")?;
    let store = SqliteStore::new(conn);
    store
        .ensure_project_members_group()
        .context("create the project members group")?;
    tracing::info!(path = %db_path.display(), schema_version, "initialized project");

    let report = InitReport {
        ok: true,
        store: db_path.display().to_string(),
        config: config_path.display().to_string(),
        schema_version,
    };
    render(output, &report, |r, w| {
        writeln!(w, "Initialized {PROJECT_DIR}/")?;
        text_kv(w, "store", &r.store)?;
        text_kv(w, "config", &r.config)?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  pk user create <login>")?;
        writeln!(w, "  pk field create status --label Status")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use picklist_core::config::load_project_config;

    #[test]
    fn init_creates_store_and_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).expect("init");

        assert!(store_path(dir.path()).exists());
        let config = load_project_config(dir.path()).expect("config");
        assert_eq!(config.store.busy_timeout_ms, 5_000);
    }

    #[test]
    fn init_twice_requires_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).expect("init");

        let err = run_init(&InitArgs { force: false }, OutputMode::Json, dir.path())
            .expect_err("second init must fail");
        assert!(err.to_string().contains("--force"));

        run_init(&InitArgs { force: true }, OutputMode::Json, dir.path()).expect("forced init");
    }
}
