//! Stub routine generation.
//!
//! A stub is a zero-argument routine written to the work dir. It loads the
//! input payload, calls the target routine positionally, and saves the
//! results to the output payload:
//!
//! ```text
//! function [] = AutumnBridge_1a2b3c4d_B1234567()
//! load AutumnBridge_1a2b3c4d_B1234567_in.mat
//! [OutB12345670, OutB12345671] = target(InB12345670, InB12345671);
//! save AutumnBridge_1a2b3c4d_B1234567_out.mat OutB12345670 OutB12345671
//! end
//! ```
//!
//! With no outputs the call line is a plain statement and nothing is saved.

use std::fs;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{BridgeError, IoResultExt, Result};
use crate::naming::{input_names, output_names, ArtifactSet};

/// Source text of the stub for `routine` under `artifacts`.
pub fn render_stub(artifacts: &ArtifactSet, routine: &str, nargin: usize, nargout: usize) -> String {
    let ins = input_names(&artifacts.token, nargin).join(", ");
    let outs = output_names(&artifacts.token, nargout);

    let mut src = format!("function [] = {}()\n", artifacts.routine);
    src.push_str(&format!("load {}\n", artifacts.input_file));
    if outs.is_empty() {
        src.push_str(&format!("{routine}({ins});\n"));
    } else {
        src.push_str(&format!("[{}] = {routine}({ins});\n", outs.join(", ")));
        src.push_str(&format!("save {} {}\n", artifacts.output_file, outs.join(" ")));
    }
    src.push_str("end\n");
    src
}

/// Write the stub source to the work dir, replacing any previous one.
pub fn install_stub(
    artifacts: &ArtifactSet,
    routine: &str,
    nargin: usize,
    nargout: usize,
) -> Result<()> {
    if routine.trim().is_empty() {
        return Err(BridgeError::Validation {
            field: "routine".to_string(),
            message: "routine name is empty".to_string(),
        });
    }
    let path = artifacts.stub_path();
    fs::write(&path, render_stub(artifacts, routine, nargin, nargout)).with_path(&path)?;
    debug!(
        "Installed stub {} for {} ({} in, {} out)",
        artifacts.routine, routine, nargin, nargout
    );
    Ok(())
}

/// Delete the stub source. Absent stubs are not an error.
pub fn remove_stub(artifacts: &ArtifactSet) -> Result<()> {
    let path = artifacts.stub_path();
    match fs::remove_file(&path) {
        Ok(()) => {
            debug!("Removed stub {}", artifacts.routine);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BridgeError::io_with_path(e, path)),
    }
}

pub fn stub_exists(artifacts: &ArtifactSet) -> bool {
    artifacts.stub_path().is_file()
}

/// Short hash of stub source, for telling stubs apart.
pub fn fingerprint(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8])
}

/// Whether the installed stub is the one that would be generated now.
///
/// `None` when there is no readable stub.
pub fn stub_matches(
    artifacts: &ArtifactSet,
    routine: &str,
    nargin: usize,
    nargout: usize,
) -> Option<bool> {
    let installed = fs::read_to_string(artifacts.stub_path()).ok()?;
    let expected = render_stub(artifacts, routine, nargin, nargout);
    Some(fingerprint(&installed) == fingerprint(&expected))
}
