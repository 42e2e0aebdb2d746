use std::path::PathBuf;

/// Errors raised while loading the observability configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("unable to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid TOML or does not match the expected shape
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
