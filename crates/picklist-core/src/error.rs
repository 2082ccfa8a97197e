use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    FieldNotFound,
    ArtifactNotFound,
    UserNotFound,
    GroupNotFound,
    BindValueNotFound,
    RequiredValueMissing,
    PermissionDenied,
    InvalidValue,
    InvalidTransition,
    TransitionNotAuthorized,
    PersistenceFailure,
    CorruptStore,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::FieldNotFound => "E2001",
            Self::ArtifactNotFound => "E2002",
            Self::UserNotFound => "E2003",
            Self::GroupNotFound => "E2004",
            Self::BindValueNotFound => "E2005",
            Self::RequiredValueMissing => "E3001",
            Self::PermissionDenied => "E3002",
            Self::InvalidValue => "E3003",
            Self::InvalidTransition => "E3004",
            Self::TransitionNotAuthorized => "E3005",
            Self::PersistenceFailure => "E5001",
            Self::CorruptStore => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::FieldNotFound => "Field not found",
            Self::ArtifactNotFound => "Artifact not found",
            Self::UserNotFound => "User not found",
            Self::GroupNotFound => "User group not found",
            Self::BindValueNotFound => "List value not found",
            Self::RequiredValueMissing => "Required field left empty",
            Self::PermissionDenied => "Permission denied on field",
            Self::InvalidValue => "Value does not belong to the field",
            Self::InvalidTransition => "Invalid workflow transition",
            Self::TransitionNotAuthorized => "Transition not authorized for user",
            Self::PersistenceFailure => "Changeset value write failed",
            Self::CorruptStore => "Corrupt SQLite store",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `pk init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .picklist/config.toml and retry."),
            Self::FieldNotFound => Some("List fields with `pk field show`."),
            Self::ArtifactNotFound => Some("Create one with `pk artifact create`."),
            Self::UserNotFound => Some("Create the user with `pk user create` or pass --actor."),
            Self::GroupNotFound => Some("Create the group with `pk group create`."),
            Self::BindValueNotFound => Some("List allowed values with `pk field values <field>`."),
            Self::RequiredValueMissing => Some("Submit one of the field's values."),
            Self::PermissionDenied => Some("Grant access with `pk perm grant`."),
            Self::InvalidValue => Some("List allowed values with `pk field values <field>`."),
            Self::InvalidTransition => {
                Some("Add the transition with `pk workflow add-transition`.")
            }
            Self::TransitionNotAuthorized => {
                Some("Add the actor to one of the transition's authorized groups.")
            }
            Self::PersistenceFailure => Some("Check disk space and write permissions."),
            Self::CorruptStore => Some("Restore .picklist/picklist.db from a backup."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
