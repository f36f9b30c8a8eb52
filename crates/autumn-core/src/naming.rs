//! Deterministic names for the transient artifacts of a call.
//!
//! Every name is a pure function of (prefix, instance id, token, kind):
//!
//! | kind            | name                              |
//! |-----------------|-----------------------------------|
//! | stub routine    | `AutumnBridge_<id>_<token>`       |
//! | stub definition | `AutumnBridge_<id>_<token>.m`     |
//! | input payload   | `AutumnBridge_<id>_<token>_in.mat`  |
//! | output payload  | `AutumnBridge_<id>_<token>_out.mat` |
//!
//! Payloads use the codec's extension (`mat` by default).
//! Argument variables are `In<token><i>` / `Out<token><i>`, never user names.

use std::path::{Path, PathBuf};

use crate::config::BridgeDefaults;
use crate::error::{BridgeError, Result};

/// The artifacts that make up one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// The stub routine's name inside the remote namespace.
    StubRoutine,
    /// The stub's source file.
    StubDefinition,
    InputPayload,
    OutputPayload,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::StubRoutine,
        ArtifactKind::StubDefinition,
        ArtifactKind::InputPayload,
        ArtifactKind::OutputPayload,
    ];

    fn suffix(self, payload_extension: &str) -> String {
        match self {
            ArtifactKind::StubRoutine => String::new(),
            ArtifactKind::StubDefinition => format!(".{}", BridgeDefaults::STUB_EXTENSION),
            ArtifactKind::InputPayload => format!("_in.{payload_extension}"),
            ArtifactKind::OutputPayload => format!("_out.{payload_extension}"),
        }
    }
}

/// Name of one artifact, with MAT payloads.
pub fn artifact_name(prefix: &str, instance_id: &str, token: &str, kind: ArtifactKind) -> String {
    artifact_name_with(prefix, instance_id, token, kind, BridgeDefaults::PAYLOAD_EXTENSION)
}

/// Name of one artifact, with payloads carrying `payload_extension`.
pub fn artifact_name_with(
    prefix: &str,
    instance_id: &str,
    token: &str,
    kind: ArtifactKind,
    payload_extension: &str,
) -> String {
    format!(
        "{}_{}_{}{}",
        prefix,
        instance_id,
        token,
        kind.suffix(payload_extension)
    )
}

/// Positional argument names, e.g. `InB12345670, InB12345671`.
pub fn argument_names(direction: &str, token: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{direction}{token}{i}"))
        .collect()
}

pub fn input_names(token: &str, count: usize) -> Vec<String> {
    argument_names("In", token, count)
}

pub fn output_names(token: &str, count: usize) -> Vec<String> {
    argument_names("Out", token, count)
}

/// All artifact names for one (instance, token), resolved against the work dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub token: String,
    pub routine: String,
    pub stub_file: String,
    pub input_file: String,
    pub output_file: String,
    work_dir: PathBuf,
}

fn check_length(name: &str, what: &str) -> Result<()> {
    if name.len() > BridgeDefaults::MAX_IDENTIFIER_LEN {
        return Err(BridgeError::Validation {
            field: "token".to_string(),
            message: format!(
                "{what} {name:?} exceeds {} characters",
                BridgeDefaults::MAX_IDENTIFIER_LEN
            ),
        });
    }
    Ok(())
}

impl ArtifactSet {
    /// Names for `token`, with payload files ending in `payload_extension`.
    pub fn new(
        work_dir: &Path,
        prefix: &str,
        instance_id: &str,
        token: &str,
        payload_extension: &str,
    ) -> Result<Self> {
        let name = |kind| artifact_name_with(prefix, instance_id, token, kind, payload_extension);
        let routine = name(ArtifactKind::StubRoutine);
        check_length(&routine, "stub routine name")?;
        Ok(Self {
            token: token.to_string(),
            stub_file: name(ArtifactKind::StubDefinition),
            input_file: name(ArtifactKind::InputPayload),
            output_file: name(ArtifactKind::OutputPayload),
            routine,
            work_dir: work_dir.to_path_buf(),
        })
    }

    /// Check that every argument variable for this arity is a legal name.
    pub fn check_arity(&self, nargin: usize, nargout: usize) -> Result<()> {
        if let Some(last) = input_names(&self.token, nargin).pop() {
            check_length(&last, "argument name")?;
        }
        if let Some(last) = output_names(&self.token, nargout).pop() {
            check_length(&last, "result name")?;
        }
        Ok(())
    }

    pub fn stub_path(&self) -> PathBuf {
        self.work_dir.join(&self.stub_file)
    }

    pub fn input_path(&self) -> PathBuf {
        self.work_dir.join(&self.input_file)
    }

    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(&self.output_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        let p = "AutumnBridge";
        assert_eq!(
            artifact_name(p, "7", "B1234567", ArtifactKind::StubRoutine),
            "AutumnBridge_7_B1234567"
        );
        assert_eq!(
            artifact_name(p, "7", "B1234567", ArtifactKind::StubDefinition),
            "AutumnBridge_7_B1234567.m"
        );
        assert_eq!(
            artifact_name(p, "7", "B1234567", ArtifactKind::InputPayload),
            "AutumnBridge_7_B1234567_in.mat"
        );
        assert_eq!(
            artifact_name(p, "7", "B1234567", ArtifactKind::OutputPayload),
            "AutumnBridge_7_B1234567_out.mat"
        );
    }

    #[test]
    fn test_distinct_tokens_never_collide() {
        for kind in ArtifactKind::ALL {
            let a = artifact_name("AutumnBridge", "lab", "B1000000", kind);
            let b = artifact_name("AutumnBridge", "lab", "B1000001", kind);
            assert_ne!(a, b);
            assert_eq!(a, artifact_name("AutumnBridge", "lab", "B1000000", kind));
        }
    }

    #[test]
    fn test_argument_names() {
        assert_eq!(input_names("B1", 2), vec!["InB10", "InB11"]);
        assert_eq!(output_names("B1", 1), vec!["OutB10"]);
        assert!(output_names("B1", 0).is_empty());
    }

    #[test]
    fn test_artifact_set_paths() {
        let set = ArtifactSet::new(Path::new("/work"), "AutumnBridge", "1", "fit", "mat").unwrap();
        assert_eq!(set.routine, "AutumnBridge_1_fit");
        assert_eq!(set.stub_path(), PathBuf::from("/work/AutumnBridge_1_fit.m"));
        assert_eq!(set.input_path(), PathBuf::from("/work/AutumnBridge_1_fit_in.mat"));
        assert_eq!(set.output_path(), PathBuf::from("/work/AutumnBridge_1_fit_out.mat"));
    }

    #[test]
    fn test_artifact_set_rejects_long_routine_name() {
        let token = "t".repeat(60);
        assert!(ArtifactSet::new(Path::new("/work"), "AutumnBridge", "1", &token, "mat").is_err());
    }

    #[test]
    fn test_artifact_set_payload_extension() {
        let set = ArtifactSet::new(Path::new("/work"), "AutumnBridge", "1", "fit", "bin").unwrap();
        assert_eq!(set.input_file, "AutumnBridge_1_fit_in.bin");
        assert_eq!(set.output_file, "AutumnBridge_1_fit_out.bin");
        assert_eq!(set.stub_file, "AutumnBridge_1_fit.m");
    }

    #[test]
    fn test_check_arity_rejects_long_argument_names() {
        let token = format!("B{}", "7".repeat(58));
        let set = ArtifactSet::new(Path::new("/work"), "A", "1", &token, "mat").unwrap();
        // Out + 59 chars + "9" = 63
        assert!(set.check_arity(10, 10).is_ok());
        // In + 59 chars + "100" = 64
        assert!(set.check_arity(101, 1).is_err());
        // Out + 59 chars + "10" = 64
        assert!(set.check_arity(1, 11).is_err());
    }
}
