//! `import path`: run another script in a nested engine and fold its
//! definitions back in

use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::io;
use crate::error::ScriptError;
use tracing::debug;

impl Interpreter {
    /// Names already bound here keep their binding; the import only adds.
    pub(super) fn import(&mut self, path: &str) -> InterpResult<()> {
        let source = io::read_text(path)?;
        let inherited = self.state.returns.borrow().len();

        let mut sub = self.fork();
        sub.run_named(path, &source).map_err(|e| {
            let inner = match e {
                ScriptError::Compile(e) => e.to_string(),
                ScriptError::Runtime(e) => e.message,
            };
            RuntimeError::import_execution(&inner)
        })?;

        self.state = self.state.merge_from(&sub.state, inherited);
        self.anonymous_count = self.anonymous_count.max(sub.anonymous_count);
        debug!(path, "import merged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;
    use crate::interp::Value;
    use std::cell::RefCell;
    use std::fs;
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn script(name: &str, source: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gns-import-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, source).unwrap();
        path
    }

    fn interp() -> (Interpreter, Rc<RefCell<Vec<u8>>>) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let input = Rc::new(RefCell::new(Cursor::new(Vec::new())));
        (Interpreter::with_io(buffer.clone(), input), buffer)
    }

    #[test]
    fn test_import_adds_definitions() {
        let lib = script("lib_adds.gns", "function twice(x) return x * 2 shared = 5");
        let (mut interp, buffer) = interp();
        interp
            .run_source(&format!("import \"{}\" print twice(shared)", lib.display()))
            .unwrap();
        assert_eq!(String::from_utf8(buffer.borrow().clone()).unwrap(), "10\n");
    }

    #[test]
    fn test_import_first_write_wins() {
        let lib = script("lib_conflict.gns", "x = 99 y = 1");
        let (mut interp, _) = interp();
        interp
            .run_source(&format!("x = 1 import \"{}\"", lib.display()))
            .unwrap();
        assert_eq!(interp.global("x"), Some(Value::Int(1)));
        assert_eq!(interp.global("y"), Some(Value::Int(1)));
    }

    #[test]
    fn test_import_shares_console() {
        let lib = script("lib_prints.gns", "print \"from lib\"");
        let (mut interp, buffer) = interp();
        interp
            .run_source(&format!("import \"{}\"", lib.display()))
            .unwrap();
        assert_eq!(String::from_utf8(buffer.borrow().clone()).unwrap(), "from lib\n");
    }

    #[test]
    fn test_import_failure_is_wrapped() {
        let lib = script("lib_fails.gns", "throw \"broken\"");
        let (mut interp, _) = interp();
        let err = interp
            .run_source(&format!("import \"{}\"", lib.display()))
            .unwrap_err();
        match err {
            ScriptError::Runtime(e) => {
                assert_eq!(e.kind, ErrorKind::ImportExecutionError);
                assert!(e.message.contains("broken"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_import_missing_file() {
        let (mut interp, _) = interp();
        let err = interp
            .run_source("import \"/nonexistent/gns/lib.gns\"")
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(e) if e.kind == ErrorKind::FileReadError));
    }

    #[test]
    fn test_import_path_must_be_string() {
        let (mut interp, _) = interp();
        let err = interp.run_source("import 5").unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(e) if e.kind == ErrorKind::InvalidPath));
    }
}
