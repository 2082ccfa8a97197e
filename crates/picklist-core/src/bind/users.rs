use crate::model::value::BindValue;

/// Project users. A value's label is the login and its description the
/// real name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserBind {
    values: Vec<BindValue>,
}

impl UserBind {
    #[must_use]
    pub const fn new(values: Vec<BindValue>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn values(&self) -> &[BindValue] {
        &self.values
    }

    /// `Real Name (login)`, or the bare login when no real name is known.
    #[must_use]
    pub fn format_value(value: &BindValue) -> String {
        match value.description.as_deref().map(str::trim) {
            Some(real_name) if !real_name.is_empty() => {
                format!("{real_name} ({})", value.label)
            }
            _ => value.label.clone(),
        }
    }
}
