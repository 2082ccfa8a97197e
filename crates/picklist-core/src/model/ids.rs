//! Strongly-typed row identifiers.
//!
//! Every table key gets its own newtype so a `FieldId` can never be passed
//! where a `ValueId` is expected. All of them are plain `i64` on the wire
//! (serde-transparent) and print as the bare number.

use serde::{Deserialize, Serialize};
use std::{fmt, num::ParseIntError, str::FromStr};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw row id.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw row id.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

row_id!(
    /// A list field definition.
    FieldId
);
row_id!(
    /// One allowed value of a field's enumeration.
    ValueId
);
row_id!(
    /// A tracked work item.
    ArtifactId
);
row_id!(
    /// One immutable snapshot in an artifact's history.
    ChangesetId
);
row_id!(
    /// The stored value row of one field in one changeset.
    ChangesetValueId
);
row_id!(
    /// A configured workflow edge.
    TransitionId
);
row_id!(
    /// A user account.
    UserId
);
row_id!(
    /// A user group used for permission grouping.
    UgroupId
);

/// Reserved value id meaning "None".
///
/// Never stored as a bind value and never written into a changeset value;
/// an empty value set is how "None" is persisted.
pub const NONE_VALUE_ID: ValueId = ValueId::new(100);

impl ValueId {
    /// `true` for the "None" sentinel.
    #[must_use]
    pub const fn is_none_sentinel(self) -> bool {
        self.0 == NONE_VALUE_ID.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_and_display_as_bare_numbers() {
        let id: FieldId = " 42 ".parse().expect("parse field id");
        assert_eq!(id, FieldId::new(42));
        assert_eq!(id.to_string(), "42");
        assert!("forty-two".parse::<ValueId>().is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&ChangesetId::new(7)).expect("serialize");
        assert_eq!(json, "7");
        let back: ChangesetId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, ChangesetId::new(7));
    }

    #[test]
    fn none_sentinel_is_value_100() {
        assert!(ValueId::new(100).is_none_sentinel());
        assert!(!ValueId::new(101).is_none_sentinel());
    }
}
