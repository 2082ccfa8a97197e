use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::{NONE_VALUE_ID, ValueId};

/// RGB colour shown next to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Decorator {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl fmt::Display for Decorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Decorator {
    type Err = ParseDecoratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseDecoratorError(s.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ParseDecoratorError(s.to_string()))
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl TryFrom<String> for Decorator {
    type Error = ParseDecoratorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Decorator> for String {
    fn from(value: Decorator) -> Self {
        value.to_string()
    }
}

/// Error returned when a decorator is not a `#rrggbb` colour.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decorator '{0}': expected #rrggbb")]
pub struct ParseDecoratorError(pub String);

/// One allowed value in a field's enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindValue {
    pub id: ValueId,
    /// Raw label. For user binds this is the login, for group binds the
    /// group name.
    pub label: String,
    /// Free text; for user binds the real name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decorator: Option<Decorator>,
}

impl BindValue {
    /// A plain visible value with no decorator.
    pub fn new(id: ValueId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            description: None,
            hidden: false,
            is_default: false,
            decorator: None,
        }
    }

    /// The synthetic "None" entry offered for non-required fields.
    #[must_use]
    pub fn none(label: impl Into<String>) -> Self {
        Self::new(NONE_VALUE_ID, label)
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self) -> Self {
        self.is_default = true;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn with_decorator(mut self, decorator: Decorator) -> Self {
        self.decorator = Some(decorator);
        self
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.id.is_none_sentinel()
    }
}

/// `true` when a submitted id list means "None": empty, or only the sentinel.
#[must_use]
pub fn is_none_submission(ids: &[ValueId]) -> bool {
    ids.iter().all(|id| id.is_none_sentinel())
}

/// Drop the sentinel and duplicate ids, keeping first-seen order.
#[must_use]
pub fn normalize_ids(ids: &[ValueId]) -> Vec<ValueId> {
    let mut out: Vec<ValueId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !id.is_none_sentinel() && !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decorator_parses_with_or_without_hash() {
        let red: Decorator = "#ff0000".parse().expect("parse");
        assert_eq!(red, Decorator { r: 255, g: 0, b: 0 });
        let teal: Decorator = "008080".parse().expect("parse");
        assert_eq!(teal.to_string(), "#008080");
        assert!("#fff".parse::<Decorator>().is_err());
        assert!("#gg0000".parse::<Decorator>().is_err());
    }

    #[test]
    fn none_submission_detection() {
        assert!(is_none_submission(&[]));
        assert!(is_none_submission(&[NONE_VALUE_ID]));
        assert!(!is_none_submission(&[NONE_VALUE_ID, ValueId::new(1)]));
    }

    #[test]
    fn normalize_drops_sentinel_and_duplicates() {
        let ids = [
            ValueId::new(3),
            NONE_VALUE_ID,
            ValueId::new(1),
            ValueId::new(3),
        ];
        assert_eq!(normalize_ids(&ids), vec![ValueId::new(3), ValueId::new(1)]);
    }

    #[test]
    fn builder_flags() {
        let value = BindValue::new(ValueId::new(5), "Archived").hidden().default_value();
        assert!(value.hidden);
        assert!(value.is_default);
        assert!(!value.is_none());
        assert!(BindValue::none("None").is_none());
    }
}
