use std::path::PathBuf;
use thiserror::Error;

/// Failure to produce a usable [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The commented default `config.toml` could not be written.
    #[error("failed to create default config at {path}: {reason}")]
    CreateDefault { path: PathBuf, reason: String },

    /// A file or fragment is not valid TOML for the config schema.
    #[error("TOML parse error: {0}")]
    Parse(String),

    /// A value is out of range; `field` is the dotted path.
    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// The home directory could not be determined.
    #[error("path error: {0}")]
    Path(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
