use std::path::PathBuf;

/// Failure to produce a [`Config`](crate::Config).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("no config file at {}", .0.display())]
    NotFound(PathBuf),
    /// The config file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[error("malformed {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
    /// A value parsed but is not usable.
    #[error("invalid setting: {0}")]
    Validation(String),
    /// `${VAR}` expansion failed for a field.
    #[error("cannot expand {field}: {message}")]
    EnvVar {
        /// Dotted field name, e.g. `cache.dir`.
        field: String,
        message: String,
    },
}
