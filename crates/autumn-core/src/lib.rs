//! Autumn Bridge - call routines that live in a numeric-computation engine.
//!
//! The engine (MATLAB, or anything that speaks its `load`/`save` dialect)
//! runs as a long-lived process. Small control commands go over its text
//! evaluate channel; arguments and results travel through MAT payload files
//! in a shared work directory, picked up by a generated stub routine.
//!
//! # Example
//!
//! ```rust,ignore
//! use autumn_bridge::{Bridge, BridgeConfig, CallOptions, EngineLaunchConfig, Value};
//!
//! fn main() -> autumn_bridge::Result<()> {
//!     let mut bridge = Bridge::launch(BridgeConfig::new(), &EngineLaunchConfig::default())?;
//!
//!     // y = sort([3 1 2])
//!     let y = bridge.call("sort", &[Value::from(vec![3, 1, 2])], &CallOptions::new())?;
//!     println!("{:?}", y.into_single());
//!
//!     bridge.set("x", vec![1.0, 2.0, 3.0])?;
//!     assert!(bridge.contains("x")?);
//!     println!("{:?}", bridge.list_names()?);
//!
//!     bridge.close()
//! }
//! ```

pub mod call;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod marshal;
pub mod naming;
pub mod session;
pub mod stub;
pub mod token;
pub mod value;

// Re-export commonly used types
pub use call::{CallOptions, CallOutput, CallState, DeletePolicy, StubPolicy};
pub use codec::{MatCodec, PayloadCodec, Workspace};
pub use config::{BridgeConfig, BridgeDefaults, ErrorPolicy};
pub use engine::{Engine, EngineLaunchConfig, ProcessEngine, RemoteValue};
pub use error::{BridgeError, Result};
pub use naming::{artifact_name, artifact_name_with, ArtifactKind, ArtifactSet};
pub use session::Bridge;
pub use token::new_token;
pub use value::{Array, ArrayData, FloatPolicy, StructArray, Value};
