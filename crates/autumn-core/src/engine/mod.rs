//! The remote evaluate transport.
//!
//! The bridge needs one capability from the engine: evaluate a line of
//! source text and hand back a number of opaque results. Anything that can
//! do that (a child process, a test double) implements [`Engine`].

mod process;

pub use process::{EngineLaunchConfig, ProcessEngine};

use crate::error::Result;

/// Evaluate transport to a numeric-computation engine.
pub trait Engine: Send {
    /// Evaluate `command` and return `result_count` results.
    ///
    /// Remote-side failures are `BridgeError::RemoteEvaluation`.
    fn evaluate(&mut self, command: &str, result_count: usize) -> Result<Vec<RemoteValue>>;

    /// Shut the engine down.
    fn quit(&mut self) -> Result<()>;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn evaluate(&mut self, command: &str, result_count: usize) -> Result<Vec<RemoteValue>> {
        (**self).evaluate(command, result_count)
    }

    fn quit(&mut self) -> Result<()> {
        (**self).quit()
    }
}

/// A result of a raw evaluation, in the engine's own text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteValue(String);

impl RemoteValue {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_text(&self) -> &str {
        &self.0
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.0.trim().parse().ok()
    }

    /// Numbers are true when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self.0.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => self.as_f64().map(|x| x != 0.0),
        }
    }

    /// Char results are quoted; the quotes are stripped.
    pub fn as_str(&self) -> &str {
        let t = self.0.trim();
        t.strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .unwrap_or(t)
    }
}

impl std::fmt::Display for RemoteValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
