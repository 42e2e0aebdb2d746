use std::{borrow::Cow, collections::HashSet};

use graphql_observability_config::LabelsConfig;

/// Reported in place of an operation name that is not part of the allowlist.
pub const OTHER_OPERATION: &str = "other";

/// Bounds the cardinality of label values derived from caller-controlled input.
///
/// The default policy leaves values untouched.
#[derive(Debug, Clone, Default)]
pub struct LabelPolicy {
    max_length: Option<usize>,
    operation_names: Option<HashSet<String>>,
}

impl LabelPolicy {
    pub fn from_config(config: &LabelsConfig) -> Self {
        Self {
            max_length: config.max_length,
            operation_names: config
                .operation_names
                .as_ref()
                .map(|names| names.iter().cloned().collect()),
        }
    }

    pub fn operation_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
        match &self.operation_names {
            Some(allowed) if !allowed.contains(name) => Cow::Borrowed(OTHER_OPERATION),
            _ => self.value(name),
        }
    }

    /// Truncates `value` to the configured length, on a character boundary.
    pub fn value<'a>(&self, value: &'a str) -> Cow<'a, str> {
        let Some(max_length) = self.max_length else {
            return Cow::Borrowed(value);
        };

        match value.char_indices().nth(max_length) {
            Some((end, _)) => Cow::Owned(value[..end].to_string()),
            None => Cow::Borrowed(value),
        }
    }
}
