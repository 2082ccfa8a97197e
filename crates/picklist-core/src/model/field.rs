use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::FieldId;

/// Where a list field takes its allowed values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindKind {
    /// A static enumeration configured on the field.
    Static,
    /// Users of the project.
    Users,
    /// User groups of the project.
    Ugroups,
}

impl BindKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Users => "users",
            Self::Ugroups => "ugroups",
        }
    }
}

impl fmt::Display for BindKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindKind {
    type Err = ParseBindKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "users" | "user" => Ok(Self::Users),
            "ugroups" | "ugroup" | "groups" => Ok(Self::Ugroups),
            _ => Err(ParseBindKindError(s.to_string())),
        }
    }
}

/// Error returned when parsing a bind kind from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid bind kind: '{0}' (expected static|users|ugroups)")]
pub struct ParseBindKindError(pub String);

/// A selectable attribute definition on a tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    /// Short machine name (`status`).
    pub name: String,
    /// Display label (`Status`).
    pub label: String,
    pub bind_kind: BindKind,
    pub required: bool,
    /// Multiple selection allowed.
    pub multiple: bool,
    /// Read-only by policy: writes are accepted as no-ops.
    pub read_only: bool,
}

impl Field {
    /// Label followed by the machine name, as used in error messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.label, self.name)
    }
}
