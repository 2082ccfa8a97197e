//! Actor identity resolution for CLI commands.
//!
//! The resolution chain: `--actor` flag > `PICKLIST_ACTOR` env > user config
//! `actor` > `USER` env. Commands that record changes or check permissions
//! require an actor; administrative commands do not.

use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorResolutionError {
    pub message: String,
}

impl std::fmt::Display for ActorResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActorResolutionError {}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

fn resolve_actor_with(
    cli_flag: Option<&str>,
    configured: Option<&str>,
    env: &dyn EnvReader,
) -> Option<String> {
    if let Some(login) = cli_flag.map(str::trim).filter(|login| !login.is_empty()) {
        return Some(login.to_string());
    }
    if let Some(login) = env.get("PICKLIST_ACTOR") {
        return Some(login.trim().to_string());
    }
    if let Some(login) = configured.map(str::trim).filter(|login| !login.is_empty()) {
        return Some(login.to_string());
    }
    env.get("USER").map(|login| login.trim().to_string())
}

/// Resolve the acting login, or explain how to set one.
pub fn require_actor(
    cli_flag: Option<&str>,
    configured: Option<&str>,
) -> Result<String, ActorResolutionError> {
    resolve_actor_with(cli_flag, configured, &RealEnv).ok_or_else(|| ActorResolutionError {
        message: "Actor login required for this command. \
                  Set --actor, PICKLIST_ACTOR, or `actor` in the user config."
            .to_string(),
    })
}
