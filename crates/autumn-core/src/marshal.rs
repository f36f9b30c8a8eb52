//! Moving argument values in and out of payload artifacts.
//!
//! Inputs are normalized before they reach the codec. Outputs are read back
//! squeezed, so a 1x1 result comes back as a scalar.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::codec::PayloadCodec;
use crate::error::{BridgeError, IoResultExt, Result};
use crate::value::{normalize, FloatPolicy, Value};

/// Encodes call arguments and decodes call results for one session.
pub struct Marshaler<'a> {
    codec: &'a dyn PayloadCodec,
    float_policy: FloatPolicy,
}

impl<'a> Marshaler<'a> {
    pub fn new(codec: &'a dyn PayloadCodec, float_policy: FloatPolicy) -> Self {
        Self {
            codec,
            float_policy,
        }
    }

    /// Extension of the payload files this marshaler reads and writes.
    pub fn extension(&self) -> &'static str {
        self.codec.extension()
    }

    /// Normalize `values` and write them to `path` under `names`, in order.
    ///
    /// Nothing is written when any value fails to normalize or encode.
    pub fn encode_inputs(&self, path: &Path, names: &[String], values: &[Value]) -> Result<()> {
        if names.len() != values.len() {
            return Err(BridgeError::Validation {
                field: "values".to_string(),
                message: format!("{} names for {} values", names.len(), values.len()),
            });
        }
        let vars = names
            .iter()
            .zip(values)
            .map(|(name, value)| Ok((name.clone(), normalize(name, value, self.float_policy)?)))
            .collect::<Result<Vec<_>>>()?;

        let bytes = self.codec.encode(&vars)?;
        fs::write(path, &bytes).with_path(path)?;
        debug!("Wrote {} variable(s) to {}", vars.len(), path.display());
        Ok(())
    }

    /// Read the results named by `names` from `path`, in order.
    ///
    /// A missing file means the remote side never saved anything; it is
    /// reported as a missing result for the first requested name.
    pub fn decode_outputs(&self, path: &Path, names: &[String]) -> Result<Vec<Value>> {
        if !path.exists() {
            return Err(BridgeError::MissingResult {
                name: names.first().cloned().unwrap_or_default(),
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path).with_path(path)?;
        let mut workspace = self.codec.decode(&bytes, true)?;
        debug!("Read {} variable(s) from {}", workspace.len(), path.display());

        names
            .iter()
            .map(|name| {
                workspace
                    .remove(name)
                    .ok_or_else(|| BridgeError::MissingResult {
                        name: name.clone(),
                        path: path.to_path_buf(),
                    })
            })
            .collect()
    }
}

/// Remove a payload artifact if present.
pub fn remove_artifact(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BridgeError::io_with_path(e, path)),
    }
}
