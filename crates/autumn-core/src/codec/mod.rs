//! Payload container codec.
//!
//! Payload artifacts hold a mapping of variable name to value. The bridge
//! only needs `encode`/`decode`; `MatCodec` implements them for MATLAB
//! level-5 MAT files, the format the engine's `load`/`save` commands read
//! and write.

mod format;
mod reader;
mod writer;

use std::collections::BTreeMap;

use crate::config::BridgeDefaults;
use crate::error::Result;
use crate::value::Value;

/// Decoded payload contents.
pub type Workspace = BTreeMap<String, Value>;

/// Encode/decode for payload artifacts.
pub trait PayloadCodec: Send + Sync {
    /// File extension of payload artifacts, without the dot.
    fn extension(&self) -> &'static str;

    /// Serialize variables in order. Values must already be normalized.
    fn encode(&self, vars: &[(String, Value)]) -> Result<Vec<u8>>;

    /// Read every variable. With `squeeze`, singleton dimensions are
    /// dropped and 1x1 values become scalars.
    fn decode(&self, bytes: &[u8], squeeze: bool) -> Result<Workspace>;
}

/// MATLAB level-5 MAT file codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatCodec;

impl MatCodec {
    pub fn new() -> Self {
        Self
    }
}

impl PayloadCodec for MatCodec {
    fn extension(&self) -> &'static str {
        BridgeDefaults::PAYLOAD_EXTENSION
    }

    fn encode(&self, vars: &[(String, Value)]) -> Result<Vec<u8>> {
        writer::write_file(vars)
    }

    fn decode(&self, bytes: &[u8], squeeze: bool) -> Result<Workspace> {
        reader::read_file(bytes, squeeze)
    }
}
