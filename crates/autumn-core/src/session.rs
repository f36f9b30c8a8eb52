//! Bridge sessions.
//!
//! A [`Bridge`] owns (or is attached to) one engine and an instance id that
//! scopes every artifact it creates. Routine calls go through stubs; the
//! workspace operations (`get`, `set`, `contains`, ...) use small raw
//! commands plus a payload where values are involved.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::call::{self, CallContext, CallOptions, CallOutput};
use crate::codec::{MatCodec, PayloadCodec};
use crate::config::{BridgeConfig, ErrorPolicy};
use crate::engine::{Engine, EngineLaunchConfig, ProcessEngine, RemoteValue};
use crate::error::{BridgeError, Result};
use crate::marshal::{remove_artifact, Marshaler};
use crate::naming::{output_names, ArtifactSet};
use crate::stub;
use crate::token::{new_instance_id, new_token, validate_fragment, validate_identifier};
use crate::value::Value;

/// A session with one engine.
pub struct Bridge<E: Engine = ProcessEngine> {
    engine: E,
    owned: bool,
    closed: bool,
    instance_id: String,
    work_dir: PathBuf,
    config: BridgeConfig,
    codec: Box<dyn PayloadCodec>,
}

impl Bridge<ProcessEngine> {
    /// Start an engine process and open a session that owns it.
    pub fn launch(config: BridgeConfig, launch: &EngineLaunchConfig) -> Result<Self> {
        let mut launch = launch.clone();
        if launch.work_dir.is_none() {
            launch.work_dir = Some(config.resolve_work_dir()?);
        }
        let engine = ProcessEngine::launch(&launch)?;
        Self::start(engine, config, true)
    }
}

impl<E: Engine> Bridge<E> {
    /// Open a session over an engine this session owns. The engine is shut
    /// down when the session closes.
    pub fn with_engine(engine: E, config: BridgeConfig) -> Result<Self> {
        Self::start(engine, config, true)
    }

    /// Open a session over an engine managed elsewhere. Closing the session
    /// leaves the engine running.
    pub fn attach(engine: E, config: BridgeConfig) -> Result<Self> {
        Self::start(engine, config, false)
    }

    fn start(mut engine: E, config: BridgeConfig, owned: bool) -> Result<Self> {
        let instance_id = match &config.instance_id {
            Some(id) => {
                validate_fragment("instance_id", id)?;
                id.clone()
            }
            None => new_instance_id(),
        };
        // The prefix leads the stub routine name, so it must be an identifier.
        validate_identifier(&config.artifact_prefix).map_err(|e| match e {
            BridgeError::Validation { message, .. } => BridgeError::Validation {
                field: "artifact_prefix".to_string(),
                message,
            },
            other => other,
        })?;
        let work_dir = config.resolve_work_dir()?;

        if config.change_dir_on_start {
            engine.evaluate(&format!("cd('{}')", quote(&work_dir)), 0)?;
        }
        info!(
            "Bridge {} ready in {} ({})",
            instance_id,
            work_dir.display(),
            if owned { "owned" } else { "attached" }
        );
        Ok(Self {
            engine,
            owned,
            closed: false,
            instance_id,
            work_dir,
            config,
            codec: Box::new(MatCodec::new()),
        })
    }

    /// Replace the payload codec.
    pub fn with_codec(mut self, codec: impl PayloadCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Whether closing the session shuts the engine down.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Artifact names for `token` under this session.
    pub fn artifacts(&self, token: &str) -> Result<ArtifactSet> {
        validate_fragment("token", token)?;
        ArtifactSet::new(
            &self.work_dir,
            &self.config.artifact_prefix,
            &self.instance_id,
            token,
            self.codec.extension(),
        )
    }

    /// Evaluate a command directly, without payloads.
    pub fn raw_eval(&mut self, command: &str, result_count: usize) -> Result<Vec<RemoteValue>> {
        self.engine.evaluate(command, result_count)
    }

    /// [`raw_eval`](Self::raw_eval) under an explicit error policy. Lenient
    /// failures are logged and yield no results.
    pub fn raw_eval_with(
        &mut self,
        command: &str,
        result_count: usize,
        policy: ErrorPolicy,
    ) -> Result<Vec<RemoteValue>> {
        match self.engine.evaluate(command, result_count) {
            Err(e) if !policy.is_strict() && e.is_recoverable() => {
                warn!("Command `{}` failed: {}", command, e);
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Evaluate `command`, bring its first `result_count` results back
    /// through a payload.
    pub fn eval_with_payload(&mut self, command: &str, result_count: usize) -> Result<Vec<Value>> {
        let artifacts = self.artifacts(&new_token())?;
        artifacts.check_arity(0, result_count)?;
        let outs = output_names(&artifacts.token, result_count);

        let result = self.eval_into_payload(command, &artifacts, &outs);

        for path in [artifacts.input_path(), artifacts.output_path()] {
            if let Err(e) = remove_artifact(&path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
        if !outs.is_empty() {
            if let Err(e) = self.engine.evaluate(&format!("clear {}", outs.join(" ")), 0) {
                warn!("Failed to clear {}: {}", outs.join(" "), e);
            }
        }
        result
    }

    fn eval_into_payload(
        &mut self,
        command: &str,
        artifacts: &ArtifactSet,
        outs: &[String],
    ) -> Result<Vec<Value>> {
        if outs.is_empty() {
            self.engine.evaluate(command, 0)?;
            return Ok(Vec::new());
        }
        self.engine
            .evaluate(&format!("[{}] = {}", outs.join(", "), command), 0)?;
        self.engine.evaluate(
            &format!("save {} {}", artifacts.output_file, outs.join(" ")),
            0,
        )?;
        Marshaler::new(self.codec.as_ref(), self.config.float_policy)
            .decode_outputs(&artifacts.output_path(), outs)
    }

    /// Whether `name` is a variable in the engine workspace.
    pub fn contains(&mut self, name: &str) -> Result<bool> {
        if validate_identifier(name).is_err() {
            debug!("{:?} is not a variable name", name);
            return Ok(false);
        }
        let values = self.engine.evaluate(&format!("exist('{name}')"), 1)?;
        Ok(values.first().and_then(RemoteValue::as_f64) == Some(1.0))
    }

    /// Read a workspace variable.
    pub fn get(&mut self, name: &str) -> Result<Value> {
        validate_identifier(name)?;
        if !self.contains(name)? {
            return Err(BridgeError::KeyNotFound(name.to_string()));
        }
        let artifacts = self.artifacts(&new_token())?;
        let result = self.fetch(name, &artifacts);
        if let Err(e) = remove_artifact(&artifacts.output_path()) {
            warn!("Failed to remove {}: {}", artifacts.output_file, e);
        }
        result
    }

    fn fetch(&mut self, name: &str, artifacts: &ArtifactSet) -> Result<Value> {
        let command = format!("save {} {}", artifacts.output_file, name);
        self.engine.evaluate(&command, 0).map_err(|e| match e {
            BridgeError::RemoteEvaluation { command, message } => BridgeError::RemoteEvaluation {
                command,
                message: format!("Error occurred when saving {name}: {message}"),
            },
            other => other,
        })?;
        let mut values = Marshaler::new(self.codec.as_ref(), self.config.float_policy)
            .decode_outputs(&artifacts.output_path(), &[name.to_string()])?;
        values.pop().ok_or_else(|| BridgeError::MissingResult {
            name: name.to_string(),
            path: artifacts.output_path(),
        })
    }

    /// Write a workspace variable under exactly `name`.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        validate_identifier(name)?;
        let value = value.into();
        let artifacts = self.artifacts(&new_token())?;
        let path = artifacts.input_path();

        let result = Marshaler::new(self.codec.as_ref(), self.config.float_policy)
            .encode_inputs(&path, &[name.to_string()], std::slice::from_ref(&value))
            .and_then(|_| {
                self.engine
                    .evaluate(&format!("load {}", artifacts.input_file), 0)
                    .map(|_| ())
            });
        if let Err(e) = remove_artifact(&path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
        result
    }

    /// Names of every workspace variable. Empty when the workspace is.
    pub fn list_names(&mut self) -> Result<Vec<String>> {
        let listing = self.eval_with_payload("whos()", 1)?;
        let names = match listing.first() {
            Some(Value::Struct(s)) => s
                .column("name")
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(other) => {
                debug!("whos() returned a {}", other.kind());
                Vec::new()
            }
            None => Vec::new(),
        };
        Ok(names)
    }

    /// A snapshot of [`list_names`](Self::list_names) to iterate over.
    pub fn iter_names(&mut self) -> Result<impl Iterator<Item = String>> {
        Ok(self.list_names()?.into_iter())
    }

    /// Dimensions of a workspace variable, as the engine's `size` reports them.
    pub fn shape_of(&mut self, name: &str) -> Result<Vec<usize>> {
        validate_identifier(name)?;
        if !self.contains(name)? {
            return Err(BridgeError::KeyNotFound(name.to_string()));
        }
        let mut values = self.eval_with_payload(&format!("size({name})"), 1)?;
        let size = values.pop().ok_or_else(|| BridgeError::MissingResult {
            name: format!("size({name})"),
            path: self.work_dir.clone(),
        })?;
        size.to_f64_vec()
            .map(|dims| dims.into_iter().map(|d| d as usize).collect())
            .ok_or_else(|| BridgeError::decoding(format!("size({name}) is a {}", size.kind())))
    }

    /// Print the workspace listing to the engine console.
    pub fn show(&mut self) -> Result<()> {
        self.engine.evaluate("whos", 0).map(|_| ())
    }

    /// Call `routine` with `args` through a stub.
    pub fn call(&mut self, routine: &str, args: &[Value], options: &CallOptions) -> Result<CallOutput> {
        let ctx = CallContext {
            engine: &mut self.engine,
            work_dir: &self.work_dir,
            prefix: &self.config.artifact_prefix,
            instance_id: &self.instance_id,
            marshaler: Marshaler::new(self.codec.as_ref(), self.config.float_policy),
            error_policy: self.config.error_policy,
        };
        call::run(ctx, routine, args, options)
    }

    /// Write the stub for `routine` under `token` ahead of time.
    pub fn build_stub(
        &self,
        routine: &str,
        token: &str,
        nargin: usize,
        nargout: usize,
    ) -> Result<PathBuf> {
        let artifacts = self.artifacts(token)?;
        artifacts.check_arity(nargin, nargout)?;
        stub::install_stub(&artifacts, routine, nargin, nargout)?;
        Ok(artifacts.stub_path())
    }

    /// Remove the stub kept under `token`.
    pub fn delete_stub(&self, token: &str) -> Result<()> {
        stub::remove_stub(&self.artifacts(token)?)
    }

    /// End the session, shutting the engine down if this session owns it.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.owned {
            info!("Closing bridge {}", self.instance_id);
            self.engine.quit()
        } else {
            debug!("Detaching bridge {}", self.instance_id);
            Ok(())
        }
    }
}

impl<E: Engine> Drop for Bridge<E> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Failed to stop engine for bridge {}: {}", self.instance_id, e);
        }
    }
}

/// Escape a path for a single-quoted engine string.
fn quote(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullEngine {
        commands: Vec<String>,
    }

    impl Engine for NullEngine {
        fn evaluate(&mut self, command: &str, _: usize) -> Result<Vec<RemoteValue>> {
            self.commands.push(command.to_string());
            Ok(Vec::new())
        }

        fn quit(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(Path::new("/tmp/it's")), "/tmp/it''s");
    }

    #[test]
    fn test_start_changes_directory() {
        let engine = NullEngine { commands: Vec::new() };
        let config = BridgeConfig::new()
            .with_instance_id("abc")
            .with_work_dir("/data/run");
        let bridge = Bridge::attach(engine, config).unwrap();
        assert_eq!(bridge.instance_id(), "abc");
        assert_eq!(bridge.engine().commands, vec!["cd('/data/run')"]);
    }

    #[test]
    fn test_generated_instance_id() {
        let engine = NullEngine { commands: Vec::new() };
        let config = BridgeConfig::new()
            .with_work_dir("/data")
            .with_change_dir_on_start(false);
        let bridge = Bridge::attach(engine, config).unwrap();
        assert_eq!(bridge.instance_id().len(), 8);
        assert!(bridge.engine().commands.is_empty());
    }

    #[test]
    fn test_invalid_instance_id() {
        let engine = NullEngine { commands: Vec::new() };
        let config = BridgeConfig::new().with_instance_id("not ok");
        assert!(matches!(
            Bridge::attach(engine, config),
            Err(BridgeError::Validation { .. })
        ));
    }

    #[test]
    fn test_contains_rejects_non_identifiers_without_asking() {
        let engine = NullEngine { commands: Vec::new() };
        let config = BridgeConfig::new()
            .with_work_dir("/data")
            .with_change_dir_on_start(false);
        let mut bridge = Bridge::attach(engine, config).unwrap();
        assert!(!bridge.contains("x'); delete('y").unwrap());
        assert!(bridge.engine().commands.is_empty());
    }

    #[test]
    fn test_prefix_must_be_an_identifier() {
        for prefix in ["1Bridge", "_Bridge", "Auto Bridge"] {
            let engine = NullEngine { commands: Vec::new() };
            let config = BridgeConfig::new()
                .with_work_dir("/data")
                .with_artifact_prefix(prefix);
            match Bridge::attach(engine, config) {
                Err(BridgeError::Validation { field, .. }) => assert_eq!(field, "artifact_prefix"),
                _ => panic!("prefix {prefix:?} was not rejected"),
            }
        }
    }

    struct BinCodec;

    impl PayloadCodec for BinCodec {
        fn extension(&self) -> &'static str {
            "bin"
        }

        fn encode(&self, vars: &[(String, crate::value::Value)]) -> Result<Vec<u8>> {
            MatCodec::new().encode(vars)
        }

        fn decode(&self, bytes: &[u8], squeeze: bool) -> Result<crate::codec::Workspace> {
            MatCodec::new().decode(bytes, squeeze)
        }
    }

    #[test]
    fn test_payload_names_follow_codec_extension() {
        let engine = NullEngine { commands: Vec::new() };
        let config = BridgeConfig::new()
            .with_instance_id("test")
            .with_work_dir("/data")
            .with_change_dir_on_start(false);
        let bridge = Bridge::attach(engine, config).unwrap();
        assert_eq!(bridge.artifacts("B1").unwrap().input_file, "AutumnBridge_test_B1_in.mat");

        let bridge = bridge.with_codec(BinCodec);
        let artifacts = bridge.artifacts("B1").unwrap();
        assert_eq!(artifacts.input_file, "AutumnBridge_test_B1_in.bin");
        assert_eq!(artifacts.output_file, "AutumnBridge_test_B1_out.bin");
    }

    #[test]
    fn test_build_stub_rejects_overlong_argument_names() {
        let engine = NullEngine { commands: Vec::new() };
        let config = BridgeConfig::new()
            .with_instance_id("t")
            .with_artifact_prefix("A")
            .with_work_dir("/data")
            .with_change_dir_on_start(false);
        let bridge = Bridge::attach(engine, config).unwrap();
        // A_t_<token> is exactly 63 characters; In<token>100 is 64.
        let token = format!("B{}", "1".repeat(58));
        assert_eq!(bridge.artifacts(&token).unwrap().routine.len(), 63);
        assert!(matches!(
            bridge.build_stub("f", &token, 101, 1),
            Err(BridgeError::Validation { .. })
        ));
    }
}
