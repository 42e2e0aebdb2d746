/// Defensive bounds for the query shape analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Maximum nesting the analyzer walks before reporting a saturated value.
    pub max_depth: u32,
    /// Maximum number of selections visited for a single measurement.
    pub max_visited_nodes: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_visited_nodes: 100_000,
        }
    }
}
