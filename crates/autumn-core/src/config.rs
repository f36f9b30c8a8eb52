//! Configuration for bridge sessions.
//!
//! Constants live on `BridgeDefaults`. Per-session settings live on
//! `BridgeConfig`, which can also be loaded from a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, IoResultExt, Result};
use crate::value::FloatPolicy;

/// Fixed naming and limit constants.
pub struct BridgeDefaults;

impl BridgeDefaults {
    pub const ARTIFACT_PREFIX: &'static str = "AutumnBridge";
    pub const TOKEN_PREFIX: &'static str = "B";
    pub const TOKEN_MIN: u32 = 1_000_000;
    pub const TOKEN_MAX: u32 = 10_000_000;
    pub const STUB_EXTENSION: &'static str = "m";
    pub const PAYLOAD_EXTENSION: &'static str = "mat";
    /// Longest identifier the remote language accepts.
    pub const MAX_IDENTIFIER_LEN: usize = 63;
    /// Length of the uuid segment used when no instance id is supplied.
    pub const GENERATED_ID_LEN: usize = 8;
}

/// How a failing operation reports its failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Return the error to the caller.
    #[default]
    Strict,
    /// Log a diagnostic and return a neutral value.
    Lenient,
}

impl ErrorPolicy {
    pub fn from_raise(raise_on_error: bool) -> Self {
        if raise_on_error {
            ErrorPolicy::Strict
        } else {
            ErrorPolicy::Lenient
        }
    }

    pub fn is_strict(self) -> bool {
        self == ErrorPolicy::Strict
    }
}

/// Settings for one bridge session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Scoping prefix for every artifact. Generated when absent.
    pub instance_id: Option<String>,
    /// Leading component of every artifact name.
    pub artifact_prefix: String,
    /// Directory shared with the engine. Defaults to the current directory.
    pub work_dir: Option<PathBuf>,
    /// Float width used when widening integers on the way in.
    pub float_policy: FloatPolicy,
    /// Move the engine into `work_dir` when the session starts.
    pub change_dir_on_start: bool,
    /// Policy for entry points that do not take one explicitly.
    pub error_policy: ErrorPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            artifact_prefix: BridgeDefaults::ARTIFACT_PREFIX.to_string(),
            work_dir: None,
            float_policy: FloatPolicy::F64,
            change_dir_on_start: true,
            error_policy: ErrorPolicy::Strict,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).with_path(path)?;
        let config: BridgeConfig = serde_json::from_str(&contents).map_err(|e| {
            BridgeError::Config {
                message: format!("Failed to parse {}: {}", path.display(), e),
            }
        })?;
        Ok(config)
    }

    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    pub fn with_artifact_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.artifact_prefix = prefix.into();
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_float_policy(mut self, policy: FloatPolicy) -> Self {
        self.float_policy = policy;
        self
    }

    pub fn with_change_dir_on_start(mut self, enable: bool) -> Self {
        self.change_dir_on_start = enable;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// The configured work dir, or the current directory.
    pub fn resolve_work_dir(&self) -> Result<PathBuf> {
        match &self.work_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(BridgeError::from),
        }
    }
}
