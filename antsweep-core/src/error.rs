//! Error types.

use std::io;

pub type Result<T> = core::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(String),

    #[cfg(feature = "yaml")]
    #[error("yaml deserialization error: {0}")]
    YamlDeserError(#[from] serde_yaml::Error),
    #[error("toml deserialization error: {0}")]
    TomlDeserError(#[from] toml::de::Error),
    #[error("toml serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("invalid value for `{field}`: {value:?} ({reason})")]
    Configuration {
        field: String,
        value: String,
        reason: String,
    },
    #[error("unknown parameter schema: {0}")]
    UnknownSchema(String),

    #[error("engine rejected command `{command}`: {message}")]
    EngineCommand { command: String, message: String },
    #[error("engine connection failed: {0}")]
    EngineTransport(String),
    #[error("failed spawning engine process: {0}")]
    EngineSpawn(String),

    #[error("reporter output doesn't match the request: {0}")]
    ReporterShape(String),
    #[error("reporter `{reporter}` returned unusable value: {value}")]
    ReporterValue { reporter: String, value: String },

    #[error("malformed raw output line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    #[cfg(feature = "lz4")]
    #[error("failed decompressing snapshot: {0}")]
    SnapshotDecompressionError(String),
    #[error("failed reading snapshot: {0}")]
    FailedReadingSnapshot(String),
    #[error("failed creating snapshot: {0}")]
    FailedCreatingSnapshot(String),

    #[error("other error: {0}")]
    Other(String),
}

impl Error {
    /// Convenience constructor for configuration errors.
    pub fn config(field: &str, value: &str, reason: impl ToString) -> Self {
        Error::Configuration {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
