//! Configuration of the GraphQL observability instrumentation.
//!
//! All options are optional in the TOML document, an empty file yields the defaults.

mod analysis;
mod error;
mod labels;

use std::path::Path;

pub use analysis::AnalysisConfig;
pub use error::ConfigError;
pub use labels::LabelsConfig;

/// Paths of the GraphQL endpoints observed by default.
pub const DEFAULT_PATHS: &[&str] = &["/api/graphql/", "/graphql/"];

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Master switch for every metric series. Query logging is controlled separately.
    pub graphql_metrics_enabled: bool,
    /// Record the nesting depth of each operation.
    pub track_query_depth: bool,
    /// Record the number of fields selected by each operation.
    pub track_query_complexity: bool,
    /// Record the duration of every nested field resolution. Disabled by default, it is the
    /// most expensive option and has the highest label cardinality.
    pub track_field_resolution: bool,
    /// Count requests per authenticated user.
    pub track_per_user: bool,
    /// Emit one log line per GraphQL request.
    pub query_logging_enabled: bool,
    /// Include the query document in the log line.
    pub log_query_body: bool,
    /// Include the query variables in the log line.
    pub log_query_variables: bool,
    /// Request paths recognized as GraphQL endpoints by the transport layer.
    pub paths: Vec<String>,
    pub labels: LabelsConfig,
    pub analysis: AnalysisConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            graphql_metrics_enabled: true,
            track_query_depth: true,
            track_query_complexity: true,
            track_field_resolution: false,
            track_per_user: true,
            query_logging_enabled: false,
            log_query_body: false,
            log_query_variables: false,
            paths: DEFAULT_PATHS.iter().map(|path| path.to_string()).collect(),
            labels: LabelsConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl ObservabilityConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&source)
    }

    /// Whether requests to `path` go through the GraphQL endpoint.
    pub fn is_query_path(&self, path: &str) -> bool {
        self.paths.iter().any(|candidate| candidate == path)
    }

    /// Whether the resolver layer has anything to do at all.
    pub fn is_enabled(&self) -> bool {
        self.graphql_metrics_enabled || self.query_logging_enabled
    }
}
