//! Error types for the bridge.
//!
//! The first four variants are the failures a caller of `call`/`get`/`set`
//! is expected to handle. The rest describe the environment the bridge runs
//! in (files, configuration, the engine process itself).

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The engine reported a failure while evaluating a command.
    #[error("Remote evaluation failed for `{command}`: {message}")]
    RemoteEvaluation { command: String, message: String },

    /// A value has no representation in the payload container.
    #[error("Cannot encode {name}: {message}")]
    Encoding { name: String, message: String },

    /// A result the caller asked for is not in the output payload.
    #[error("Missing result {name} in {path:?}")]
    MissingResult { name: String, path: PathBuf },

    /// A workspace variable does not exist in the remote namespace.
    #[error("Variable not found in remote workspace: {0}")]
    KeyNotFound(String),

    /// Payload bytes could not be read back.
    #[error("Cannot decode payload: {message}")]
    Decoding { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Engine launch failed for {program}: {message}")]
    Launch { program: String, message: String },

    #[error("Engine did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Engine connection closed")]
    EngineClosed,
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BridgeError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    pub(crate) fn decoding(message: impl Into<String>) -> Self {
        BridgeError::Decoding {
            message: message.into(),
        }
    }

    pub(crate) fn encoding(name: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::Encoding {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether the lenient error policy may absorb this error.
    ///
    /// Only failures of the remote call itself qualify. IO, configuration
    /// and transport failures always propagate.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BridgeError::RemoteEvaluation { .. }
                | BridgeError::Encoding { .. }
                | BridgeError::MissingResult { .. }
                | BridgeError::KeyNotFound(_)
                | BridgeError::Decoding { .. }
        )
    }
}

/// Attach a path to `std::io::Error` results.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| BridgeError::io_with_path(e, path))
    }
}
