//! Tree-walking interpreter for GN Script
//!
//! Execution state lives in [`EngineState`]; [`Interpreter`] walks the AST
//! against it. refbox methods run on per-slot environments swapped in for
//! the duration of a call, and imports run in a forked engine whose state
//! is merged back.

mod boxes;
mod env;
mod error;
mod eval;
mod ext;
mod import;
pub mod io;
mod ops;
mod scope;
mod value;

pub use boxes::{BoxDefinition, Instance, InstanceRef, MethodEnv, Slot};
pub use env::{EngineState, FunctionKey};
pub use error::{ErrorKind, InterpResult, RuntimeError};
pub use eval::{Interpreter, MAX_CALL_DEPTH};
pub use ext::{ExtensionKind, UserExtension};
pub use scope::ScopeStack;
pub use value::Value;
