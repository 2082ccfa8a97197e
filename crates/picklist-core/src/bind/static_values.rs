use crate::model::value::BindValue;

/// Values configured directly on the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticBind {
    values: Vec<BindValue>,
}

impl StaticBind {
    #[must_use]
    pub const fn new(values: Vec<BindValue>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn values(&self) -> &[BindValue] {
        &self.values
    }

    /// Static values show their configured label verbatim.
    #[must_use]
    pub fn format_value(value: &BindValue) -> String {
        value.label.clone()
    }
}
