//! Runtime values for the interpreter

use super::boxes::{InstanceRef, Slot};
use super::error::{InterpResult, RuntimeError};
use std::fmt;
use std::rc::Rc;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit integer (also the boolean carrier: 0 is false)
    Int(i64),
    /// Text
    Str(String),
    /// Ordered sequence; cloning deep-copies the elements
    Array(Vec<Value>),
    /// refbox instance, shared by handle
    Object(InstanceRef),
    /// Absence of a value
    Void,
}

impl Value {
    /// Kind name as reported by the `type` extension
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Str(_) => "String",
            Value::Array(_) => "Array",
            Value::Object(_) => "RefBox",
            Value::Void => "Void",
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn as_int(&self) -> InterpResult<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Void => Err(RuntimeError::missing_value("Int conversion")),
            other => Err(RuntimeError::type_mismatch("Int", other.kind_name())),
        }
    }

    pub fn as_str(&self) -> InterpResult<&str> {
        match self {
            Value::Str(s) => Ok(s),
            Value::Void => Err(RuntimeError::missing_value("String conversion")),
            other => Err(RuntimeError::type_mismatch("String", other.kind_name())),
        }
    }

    pub fn as_array(&self) -> InterpResult<&[Value]> {
        match self {
            Value::Array(items) => Ok(items),
            Value::Void => Err(RuntimeError::missing_value("Array conversion")),
            other => Err(RuntimeError::type_mismatch("Array", other.kind_name())),
        }
    }

    pub fn as_object(&self) -> InterpResult<&InstanceRef> {
        match self {
            Value::Object(instance) => Ok(instance),
            Value::Void => Err(RuntimeError::missing_value("RefBox conversion")),
            other => Err(RuntimeError::type_mismatch("RefBox", other.kind_name())),
        }
    }

    /// Canonical text form: strings quoted, containers recursive
    pub fn to_printable(&self) -> String {
        let mut open = Vec::new();
        self.printable(&mut open)
    }

    /// `open` holds the instances currently being rendered; meeting one of
    /// them again prints `{Name ...}` instead of recursing
    fn printable(&self, open: &mut Vec<InstanceRef>) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Str(s) => format!("\"{s}\""),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|item| item.printable(open)).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Object(handle) => {
                if open.iter().any(|seen| Rc::ptr_eq(seen, handle)) {
                    return format!("{{{} ...}}", handle.borrow().definition);
                }
                open.push(handle.clone());
                let instance = handle.borrow();
                let parts: Vec<String> = instance
                    .slots
                    .iter()
                    .map(|slot| match slot {
                        Slot::Field { name, value, .. } => {
                            format!("{name}: {}", value.printable(open))
                        }
                        Slot::Function { def, .. } => {
                            format!("{} <- ({})", def.name, def.params.join(", "))
                        }
                    })
                    .collect();
                open.pop();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Void => "(void)".to_string(),
        }
    }

    /// Text as written by `print` and joined by `tostring`: strings are raw
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_printable(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_printable())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Void, Value::Void) => true,
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(i64::from(b))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<InstanceRef> for Value {
    fn from(instance: InstanceRef) -> Self {
        Value::Object(instance)
    }
}

impl From<Option<Value>> for Value {
    fn from(value: Option<Value>) -> Self {
        value.unwrap_or(Value::Void)
    }
}
