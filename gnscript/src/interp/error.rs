//! Runtime errors for the interpreter

use std::fmt;
use thiserror::Error;

/// Runtime error during interpretation
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Runtime error: {message}")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Kinds of runtime errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Variable not bound in any visible scope
    UndefinedVariable,
    /// No function (or method slot) with that name and arity
    UndefinedFunction,
    /// Wrong value kind for an operation
    TypeMismatch,
    /// Void where a value was required
    MissingValue,
    /// Operator not defined for the operand kinds
    UnknownOperator,
    /// Wrong arity or argument kind
    ArgumentError,
    /// Body finished without a return signal
    MissingReturn,
    /// Guarded member touched from outside
    AccessDenied,
    /// Invalid refbox or extension declaration
    DefinitionError,
    ExtensionNotFound,
    /// Non-string path
    InvalidPath,
    FileReadError,
    /// Failure inside an imported script
    ImportExecutionError,
    /// `throw` statement
    UserThrown,
    /// Division by zero or integer overflow
    Arithmetic,
    /// Call depth above the engine limit
    StackOverflow,
    /// Console read/write failure
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
        }
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedVariable,
            format!("variable '{name}' not found"),
        )
    }

    pub fn undefined_function(name: &str, arity: usize) -> Self {
        Self::new(
            ErrorKind::UndefinedFunction,
            format!("function '{name}' with {arity} parameter(s) not found"),
        )
    }

    pub fn type_mismatch(expected: &str, got: &str) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            format!("type mismatch: expected {expected}, got {got}"),
        )
    }

    pub fn missing_value(context: &str) -> Self {
        Self::new(ErrorKind::MissingValue, format!("{context} requires a value"))
    }

    pub fn unknown_operator(op: impl fmt::Display, left: &str, right: &str) -> Self {
        Self::new(
            ErrorKind::UnknownOperator,
            format!("unknown operator '{op}' for {left} and {right}"),
        )
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentError, message)
    }

    pub fn missing_return(name: &str) -> Self {
        Self::new(
            ErrorKind::MissingReturn,
            format!("no return statement in function '{name}'"),
        )
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccessDenied, message)
    }

    pub fn definition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DefinitionError, message)
    }

    pub fn extension_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::ExtensionNotFound,
            format!("extension '{name}' not found"),
        )
    }

    pub fn invalid_path(got: &str) -> Self {
        Self::new(
            ErrorKind::InvalidPath,
            format!("expected a String path, got {got}"),
        )
    }

    pub fn file_read(path: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::FileReadError,
            format!("cannot read file '{path}': {reason}"),
        )
    }

    pub fn import_execution(inner: &str) -> Self {
        Self::new(
            ErrorKind::ImportExecutionError,
            format!("error while executing imported script: {inner}"),
        )
    }

    pub fn user_thrown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserThrown, message)
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arithmetic, message)
    }

    pub fn stack_overflow(limit: usize) -> Self {
        Self::new(
            ErrorKind::StackOverflow,
            format!("stack overflow: call depth exceeded {limit}"),
        )
    }

    pub fn io_error(reason: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Io, format!("IO error: {reason}"))
    }
}

/// Result type for interpreter operations
pub type InterpResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_variable() {
        let err = RuntimeError::undefined_variable("foo");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
        assert_eq!(err.message, "variable 'foo' not found");
    }

    #[test]
    fn test_display_prefix() {
        let err = RuntimeError::user_thrown("boom");
        assert_eq!(err.to_string(), "Runtime error: boom");
    }

    #[test]
    fn test_undefined_function_names_arity() {
        let err = RuntimeError::undefined_function("add", 2);
        assert_eq!(err.kind, ErrorKind::UndefinedFunction);
        assert!(err.message.contains("add"));
        assert!(err.message.contains('2'));
    }

    #[test]
    fn test_unknown_operator() {
        let err = RuntimeError::unknown_operator("%", "String", "String");
        assert_eq!(err.kind, ErrorKind::UnknownOperator);
        assert_eq!(err.message, "unknown operator '%' for String and String");
    }

    #[test]
    fn test_import_wraps_inner_message() {
        let inner = RuntimeError::undefined_variable("x");
        let err = RuntimeError::import_execution(&inner.message);
        assert_eq!(err.kind, ErrorKind::ImportExecutionError);
        assert!(err.message.ends_with("variable 'x' not found"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::AccessDenied.to_string(), "AccessDenied");
    }
}
