use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::bind::DEFAULT_NONE_LABEL;
use crate::diff::DEFAULT_SEPARATOR;

/// Directory holding the project's store and configuration.
pub const PROJECT_DIR: &str = ".picklist";

/// Project configuration, read from `.picklist/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Joins the labels of a multi-valued change.
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Label shown for the "None" value.
    #[serde(default = "default_none_label")]
    pub none_label: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            none_label: default_none_label(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Whether a transition without authorized groups is open to everyone.
    #[serde(default = "default_true")]
    pub unrestricted_when_no_groups: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            unrestricted_when_no_groups: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Per-user configuration, read from `<config dir>/picklist/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// Login used when `--actor` and `PICKLIST_ACTOR` are unset.
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(PROJECT_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write `config` to `.picklist/config.toml`, creating the directory.
pub fn save_project_config(project_root: &Path, config: &ProjectConfig) -> Result<()> {
    let dir = project_root.join(PROJECT_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join("config.toml");
    let content = toml::to_string_pretty(config).context("Failed to serialize project config")?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("picklist/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("PICKLIST_FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "human" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    env_format
        .and_then(normalize_output_mode)
        .or_else(|| user_output.and_then(normalize_output_mode))
        .unwrap_or("text")
        .to_string()
}

const fn default_true() -> bool {
    true
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_none_label() -> String {
    DEFAULT_NONE_LABEL.to_string()
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}
