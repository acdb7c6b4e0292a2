//! REPL (Read-Eval-Print Loop) for GN Script
//!
//! Lines accumulate until an empty line, then the whole buffer runs as one
//! program against a persistent interpreter.

use crate::error::{report_error, ScriptError};
use crate::interp::Interpreter;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::path::PathBuf;
use tracing::debug;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = ". ";
const HISTORY_FILE: &str = ".gns_history";

/// What a command asks the loop to do
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    interpreter: Interpreter,
    history_path: Option<PathBuf>,
    buffer: String,
}

impl Repl {
    /// Create a new REPL
    pub fn new() -> RlResult<Self> {
        let editor = DefaultEditor::new()?;
        let history_path = dirs_home().map(|h| h.join(HISTORY_FILE));

        let mut repl = Repl {
            editor,
            interpreter: Interpreter::new(),
            history_path,
            buffer: String::new(),
        };

        if let Some(ref path) = repl.history_path {
            let _ = repl.editor.load_history(path);
        }

        Ok(repl)
    }

    /// Run the REPL
    pub fn run(&mut self) -> RlResult<()> {
        println!("GN Script REPL v{}", env!("CARGO_PKG_VERSION"));
        println!("Enter statements; an empty line runs them. Type :help for help.\n");

        loop {
            let prompt = if self.buffer.is_empty() {
                PROMPT
            } else {
                CONTINUATION_PROMPT
            };
            match self.editor.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        let _ = self.editor.add_history_entry(trimmed);
                    }

                    if self.buffer.is_empty() && trimmed.starts_with(':') {
                        if self.handle_command(trimmed) == Flow::Quit {
                            break;
                        }
                        continue;
                    }

                    if let Some(source) = self.push_line(&line) {
                        self.eval_source(&source);
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    self.buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    if !self.buffer.is_empty() {
                        let source = std::mem::take(&mut self.buffer);
                        self.eval_source(&source);
                    }
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        if let Some(ref path) = self.history_path {
            let _ = self.editor.save_history(path);
        }

        Ok(())
    }

    /// Add a line to the pending buffer; an empty line releases it
    fn push_line(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            if self.buffer.trim().is_empty() {
                self.buffer.clear();
                return None;
            }
            return Some(std::mem::take(&mut self.buffer));
        }
        self.buffer.push_str(line);
        self.buffer.push('\n');
        None
    }

    /// Handle REPL commands (starting with :)
    fn handle_command(&mut self, cmd: &str) -> Flow {
        match cmd {
            ":quit" | ":q" | ":exit" => {
                println!("Goodbye!");
                Flow::Quit
            }
            ":help" | ":h" | ":?" => {
                self.print_help();
                Flow::Continue
            }
            ":dump" => {
                print!("{}", self.interpreter.dump());
                Flow::Continue
            }
            ":clear" => {
                self.interpreter = Interpreter::new();
                self.buffer.clear();
                print!("\x1B[2J\x1B[1;1H");
                Flow::Continue
            }
            _ => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                Flow::Continue
            }
        }
    }

    fn print_help(&self) {
        println!("GN Script REPL Commands:");
        println!("  :help, :h, :?   Show this help");
        println!("  :dump           Show variables, functions and refboxes");
        println!("  :clear          Start over with a fresh interpreter");
        println!("  :quit, :q       Exit the REPL");
        println!();
        println!("Statements are collected until an empty line, for example:");
        println!("  function square(n) return n * n");
        println!("  print square(7)");
    }

    /// Run a complete buffer. Failures keep the session usable.
    fn eval_source(&mut self, source: &str) {
        match self.interpreter.run_named("<repl>", source) {
            Ok(()) => {}
            Err(ScriptError::Compile(err)) => {
                if report_error("<repl>", source, &err).is_err() {
                    eprintln!("{err}");
                }
                self.recover();
            }
            Err(ScriptError::Runtime(err)) => {
                eprintln!("{err}");
                self.recover();
            }
        }
    }

    fn recover(&mut self) {
        self.interpreter.reset_scopes_above_global();
        debug!("repl recovered after error");
    }
}

/// Get home directory
fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}
