//! GN Script
//!
//! A small dynamically-typed scripting language with structural objects
//! ("refboxes"), access control, user-defined extensions and file imports.
//!
//! ```
//! use gnscript::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! interp.run_source("x = 2 ** 5").unwrap();
//! assert_eq!(interp.global("x"), Some(gnscript::interp::Value::Int(32)));
//! ```

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod repl;

pub use ast::Span;
pub use error::{CompileError, Result, ScriptError};
pub use interp::Interpreter;
