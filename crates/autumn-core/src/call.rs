//! The call state machine.
//!
//! A call moves through
//! `Idle -> StubResolved -> InputsMarshaled -> Invoked -> OutputsMarshaled -> Cleaned`.
//! Any failure moves it to `Failed`, and every call ends in `Cleaned`: the
//! input and output payloads are removed on every path, the stub only when
//! the delete policy says so.

use std::path::Path;

use tracing::{debug, error, warn};

use crate::config::ErrorPolicy;
use crate::engine::Engine;
use crate::error::Result;
use crate::marshal::{remove_artifact, Marshaler};
use crate::naming::{input_names, output_names, ArtifactSet};
use crate::stub;
use crate::token::{new_token, validate_fragment};
use crate::value::Value;

/// Whether a call writes its stub before invoking it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StubPolicy {
    /// Install only when no stub exists for the token yet.
    #[default]
    Auto,
    /// Always (re)write the stub.
    Install,
    /// Never write it; the stub must already exist.
    Reuse,
}

impl From<bool> for StubPolicy {
    fn from(install: bool) -> Self {
        if install {
            StubPolicy::Install
        } else {
            StubPolicy::Reuse
        }
    }
}

/// Whether a call removes its stub when it is done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Delete when the token was generated for this call, keep when the
    /// caller named it.
    #[default]
    Auto,
    Delete,
    Keep,
}

impl DeletePolicy {
    pub fn resolve(self, explicit_token: bool) -> bool {
        match self {
            DeletePolicy::Auto => !explicit_token,
            DeletePolicy::Delete => true,
            DeletePolicy::Keep => false,
        }
    }
}

impl From<bool> for DeletePolicy {
    fn from(delete: bool) -> Self {
        if delete {
            DeletePolicy::Delete
        } else {
            DeletePolicy::Keep
        }
    }
}

/// Options for one call.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Number of results to bring back.
    pub result_count: usize,
    /// Reusable token. A fresh one is generated when `None`.
    pub token: Option<String>,
    pub new_stub: StubPolicy,
    pub delete: DeletePolicy,
    /// Falls back to the session's policy when `None`.
    pub error_policy: Option<ErrorPolicy>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            result_count: 1,
            token: None,
            new_stub: StubPolicy::Auto,
            delete: DeletePolicy::Auto,
            error_policy: None,
        }
    }
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result_count(mut self, n: usize) -> Self {
        self.result_count = n;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_new_stub(mut self, policy: impl Into<StubPolicy>) -> Self {
        self.new_stub = policy.into();
        self
    }

    pub fn with_delete(mut self, policy: impl Into<DeletePolicy>) -> Self {
        self.delete = policy.into();
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = Some(policy);
        self
    }
}

/// Where a call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    StubResolved,
    InputsMarshaled,
    Invoked,
    OutputsMarshaled,
    Failed,
    Cleaned,
}

/// Results of a call, shaped by the requested result count.
///
/// One result comes back bare, any other count as a tuple. Under the lenient
/// policy a failed call yields `None` placeholders in the same shape.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutput {
    Single(Option<Value>),
    Tuple(Vec<Option<Value>>),
}

impl CallOutput {
    fn from_values(mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            CallOutput::Single(values.pop())
        } else {
            CallOutput::Tuple(values.into_iter().map(Some).collect())
        }
    }

    fn failed(result_count: usize) -> Self {
        if result_count < 2 {
            CallOutput::Single(None)
        } else {
            CallOutput::Tuple(vec![None; result_count])
        }
    }

    /// The bare result, or the first element of a tuple.
    pub fn into_single(self) -> Option<Value> {
        match self {
            CallOutput::Single(v) => v,
            CallOutput::Tuple(v) => v.into_iter().next().flatten(),
        }
    }

    pub fn into_vec(self) -> Vec<Option<Value>> {
        match self {
            CallOutput::Single(v) => vec![v],
            CallOutput::Tuple(v) => v,
        }
    }

    /// Whether this is a lenient-mode failure placeholder.
    pub fn is_failure(&self) -> bool {
        match self {
            CallOutput::Single(v) => v.is_none(),
            CallOutput::Tuple(v) => v.iter().any(Option::is_none),
        }
    }
}

/// What a call needs from its session.
pub(crate) struct CallContext<'a> {
    pub engine: &'a mut dyn Engine,
    pub work_dir: &'a Path,
    pub prefix: &'a str,
    pub instance_id: &'a str,
    pub marshaler: Marshaler<'a>,
    pub error_policy: ErrorPolicy,
}

struct Call<'a> {
    routine: &'a str,
    artifacts: ArtifactSet,
    state: CallState,
}

impl Call<'_> {
    fn advance(&mut self, next: CallState) {
        debug!(
            "call {} [{}]: {:?} -> {:?}",
            self.routine, self.artifacts.token, self.state, next
        );
        self.state = next;
    }
}

/// Run `routine(args...)` through a stub.
pub(crate) fn run(
    ctx: CallContext<'_>,
    routine: &str,
    args: &[Value],
    options: &CallOptions,
) -> Result<CallOutput> {
    let explicit = options.token.is_some();
    let token = match &options.token {
        Some(t) => {
            validate_fragment("token", t)?;
            t.clone()
        }
        None => new_token(),
    };
    let artifacts = ArtifactSet::new(
        ctx.work_dir,
        ctx.prefix,
        ctx.instance_id,
        &token,
        ctx.marshaler.extension(),
    )?;
    artifacts.check_arity(args.len(), options.result_count)?;
    let delete = options.delete.resolve(explicit);
    let policy = options.error_policy.unwrap_or(ctx.error_policy);

    let mut call = Call {
        routine,
        artifacts,
        state: CallState::Idle,
    };
    let outcome = invoke(ctx.engine, &ctx.marshaler, &mut call, args, options);
    if outcome.is_err() {
        call.advance(CallState::Failed);
    }
    cleanup(&call.artifacts, delete);
    call.advance(CallState::Cleaned);

    match outcome {
        Ok(values) => Ok(if options.result_count == 0 {
            CallOutput::Tuple(Vec::new())
        } else {
            CallOutput::from_values(values)
        }),
        Err(e) if !policy.is_strict() && e.is_recoverable() => {
            warn!(
                "Call to {} via {} failed: {}",
                routine, call.artifacts.routine, e
            );
            Ok(CallOutput::failed(options.result_count))
        }
        Err(e) => {
            if !e.is_recoverable() {
                error!("Call to {} failed: {}", routine, e);
            }
            Err(e)
        }
    }
}

fn invoke(
    engine: &mut dyn Engine,
    marshaler: &Marshaler<'_>,
    call: &mut Call<'_>,
    args: &[Value],
    options: &CallOptions,
) -> Result<Vec<Value>> {
    let nargin = args.len();
    let nargout = options.result_count;
    let artifacts = call.artifacts.clone();

    let install = match options.new_stub {
        StubPolicy::Install => true,
        StubPolicy::Reuse => false,
        StubPolicy::Auto => !stub::stub_exists(&artifacts),
    };
    if install {
        stub::install_stub(&artifacts, call.routine, nargin, nargout)?;
    } else if options.new_stub == StubPolicy::Auto
        && stub::stub_matches(&artifacts, call.routine, nargin, nargout) == Some(false)
    {
        warn!(
            "Reusing stub {} although it was generated for a different routine or arity",
            artifacts.routine
        );
    }
    call.advance(CallState::StubResolved);

    let inputs = input_names(&artifacts.token, nargin);
    marshaler.encode_inputs(&artifacts.input_path(), &inputs, args)?;
    call.advance(CallState::InputsMarshaled);

    engine.evaluate(&artifacts.routine, 0)?;
    call.advance(CallState::Invoked);

    let values = if nargout == 0 {
        Vec::new()
    } else {
        let outputs = output_names(&artifacts.token, nargout);
        marshaler.decode_outputs(&artifacts.output_path(), &outputs)?
    };
    call.advance(CallState::OutputsMarshaled);
    Ok(values)
}

fn cleanup(artifacts: &ArtifactSet, delete_stub: bool) {
    for path in [artifacts.input_path(), artifacts.output_path()] {
        if let Err(e) = remove_artifact(&path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
    if delete_stub {
        if let Err(e) = stub::remove_stub(artifacts) {
            warn!("Failed to remove stub {}: {}", artifacts.routine, e);
        }
    }
}
