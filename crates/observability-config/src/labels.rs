/// Bounds applied to label values derived from caller-controlled input
/// (operation names, error types, user names).
///
/// Nothing is bounded by default.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelsConfig {
    /// Label values longer than this many characters are truncated.
    pub max_length: Option<usize>,
    /// When set, operation names outside of this list are reported as `other`.
    pub operation_names: Option<Vec<String>>,
}
