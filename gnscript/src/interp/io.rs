//! Console and file surface

use super::error::{InterpResult, RuntimeError};
use super::Value;
use std::cell::RefCell;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::rc::Rc;

/// Shared sink for `print` / `printInline`
pub type OutputRef = Rc<RefCell<dyn Write>>;
/// Shared source for `input`
pub type InputRef = Rc<RefCell<dyn BufRead>>;

pub fn stdout() -> OutputRef {
    Rc::new(RefCell::new(io::stdout()))
}

pub fn stdin() -> InputRef {
    Rc::new(RefCell::new(BufReader::new(io::stdin())))
}

/// Write a value as `print` does: strings raw, everything else printable
pub fn write_value(output: &OutputRef, value: &Value, newline: bool) -> InterpResult<()> {
    let mut out = output.borrow_mut();
    let text = value.to_text();
    let written = if newline {
        writeln!(out, "{text}")
    } else {
        write!(out, "{text}")
    };
    written
        .and_then(|()| out.flush())
        .map_err(RuntimeError::io_error)
}

/// Read one line; an integer line becomes `Int`, anything else stays text
pub fn read_input(input: &InputRef) -> InterpResult<Value> {
    let mut line = String::new();
    input
        .borrow_mut()
        .read_line(&mut line)
        .map_err(RuntimeError::io_error)?;
    let line = line.trim_end_matches(['\n', '\r']);
    Ok(parse_input_line(line))
}

pub fn parse_input_line(line: &str) -> Value {
    match line.trim().parse::<i64>() {
        Ok(n) => Value::Int(n),
        Err(_) => Value::from(line),
    }
}

pub fn read_text(path: &str) -> InterpResult<String> {
    fs::read_to_string(path).map_err(|e| RuntimeError::file_read(path, e))
}

/// All lines of a file as an array of strings
pub fn read_lines(path: &str) -> InterpResult<Value> {
    let text = read_text(path)?;
    Ok(Value::Array(text.lines().map(Value::from).collect()))
}

pub fn file_exists(path: &str) -> Value {
    Value::from(Path::new(path).is_file())
}
