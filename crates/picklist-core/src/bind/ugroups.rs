use crate::model::value::BindValue;

const DYNAMIC_PREFIX: &str = "ugroup_";
const DYNAMIC_SUFFIX: &str = "_name_key";

/// User groups. A value's label is the group name, which for built-in
/// groups is a key such as `ugroup_project_members_name_key`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UgroupBind {
    values: Vec<BindValue>,
}

impl UgroupBind {
    #[must_use]
    pub const fn new(values: Vec<BindValue>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn values(&self) -> &[BindValue] {
        &self.values
    }

    #[must_use]
    pub fn format_value(value: &BindValue) -> String {
        humanize_group_name(&value.label)
    }
}

/// `ugroup_project_members_name_key` -> `Project members`; other names are
/// returned unchanged.
#[must_use]
pub fn humanize_group_name(name: &str) -> String {
    let Some(words) = name
        .strip_prefix(DYNAMIC_PREFIX)
        .and_then(|rest| rest.strip_suffix(DYNAMIC_SUFFIX))
        .filter(|words| !words.is_empty())
    else {
        return name.to_string();
    };

    let phrase = words.replace('_', " ");
    let mut chars = phrase.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
