//! Statement and expression evaluator
//!
//! The engine walks blocks in order. A `return` does not unwind the host
//! stack: it pushes onto the return-signal stack, and every block polls that
//! stack after each statement. The innermost call boundary pops exactly one
//! signal; loops and conditionals just stop and let it bubble.

use super::env::{EngineState, FunctionKey};
use super::error::{InterpResult, RuntimeError};
use super::io::{self, InputRef, OutputRef};
use super::ops;
use super::value::Value;
use crate::ast::{FunctionDef, Node, Program};
use crate::error::ScriptError;
use crate::lexer::tokenize;
use crate::parser::parse;
use tracing::{debug, trace, warn};

/// Maximum nesting of function, method and extension calls
pub const MAX_CALL_DEPTH: usize = 10_000;

/// Stack growth parameters for deep recursion
const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// The interpreter
pub struct Interpreter {
    pub(super) state: EngineState,
    pub(super) output: OutputRef,
    pub(super) input: InputRef,
    /// Current call nesting
    pub(super) depth: usize,
    /// Counter for synthesized chain definitions
    pub(super) anonymous_count: usize,
}

impl Interpreter {
    /// Create an interpreter wired to the process console
    pub fn new() -> Self {
        Self::with_io(io::stdout(), io::stdin())
    }

    /// Create an interpreter with injected console sinks
    pub fn with_io(output: OutputRef, input: InputRef) -> Self {
        Interpreter {
            state: EngineState::new(),
            output,
            input,
            depth: 0,
            anonymous_count: 0,
        }
    }

    /// Nested engine over a copy of this one's state, sharing the console
    pub(super) fn fork(&self) -> Self {
        Interpreter {
            state: self.state.fork(),
            output: self.output.clone(),
            input: self.input.clone(),
            depth: self.depth,
            anonymous_count: self.anonymous_count,
        }
    }

    /// Run a parsed program. A top-level `return` ends the run.
    pub fn run(&mut self, program: &Program) -> InterpResult<()> {
        for node in &program.body {
            trace!(node = node.label(), "top-level statement");
            self.eval(node)?;
            if self.has_pending_return() {
                let value = self.pop_return();
                debug!(%value, "top-level return ends the run");
                break;
            }
        }
        Ok(())
    }

    /// Tokenize, parse and run a piece of source text
    pub fn run_source(&mut self, source: &str) -> Result<(), ScriptError> {
        self.run_named("<input>", source)
    }

    /// Like [`Interpreter::run_source`], naming the source for diagnostics
    pub fn run_named(&mut self, filename: &str, source: &str) -> Result<(), ScriptError> {
        let tokens = tokenize(source)?;
        let program = parse(filename, source, tokens)?;
        self.run(&program)?;
        Ok(())
    }

    /// Global binding of `name`, if any
    pub fn global(&self, name: &str) -> Option<Value> {
        self.state.variables.borrow().lookup(name, 0).cloned()
    }

    /// Recover after a failure: drop every non-global scope and pending signal
    pub fn reset_scopes_above_global(&mut self) {
        self.state.scope_level = 0;
        self.state.for_section = false;
        self.state.returns.borrow_mut().clear();
        self.depth = 0;
        if let Err(e) = self.state.variables.borrow_mut().clear(1) {
            warn!(error = %e, "failed to clear scopes");
        }
        debug!("scopes above global reset");
    }

    /// Render variables, functions and refbox definitions
    pub fn dump(&self) -> String {
        let mut out = String::from("[Variables]\n");
        {
            let variables = self.state.variables.borrow();
            let mut any = false;
            for (level, scope) in variables.levels() {
                any = true;
                out.push_str(&format!("Scope level: {level}\n"));
                for (name, value) in scope {
                    out.push_str(&format!(
                        "  {{{name}: {}}} [{}]\n",
                        value.to_printable(),
                        value.kind_name()
                    ));
                }
            }
            if !any {
                out.push_str("  No variables to display.\n");
            }
        }

        out.push_str("\n[Functions]\n");
        {
            let functions = self.state.functions.borrow();
            for def in functions.values() {
                out.push_str(&format!("  {} <- {{{}}}\n", def.name, def.params.join(", ")));
            }
            if functions.is_empty() {
                out.push_str("  No functions to display.\n");
            }
        }

        out.push_str("\n[RefBoxes]\n");
        {
            let boxes = self.state.boxes.borrow();
            for (name, def) in boxes.iter() {
                out.push_str(&format!("  {name} : {{{}}}", def.member_summary()));
                if let Some(base) = &def.base {
                    out.push_str(&format!(" [base: {base}]"));
                }
                out.push('\n');
            }
            if boxes.is_empty() {
                out.push_str("  No refboxes to display.\n");
            }
        }
        out
    }

    /// Evaluate a node with automatic stack growth for deep recursion
    pub(super) fn eval(&mut self, node: &Node) -> InterpResult<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(node))
    }

    fn eval_inner(&mut self, node: &Node) -> InterpResult<Value> {
        match node {
            Node::Int(n) => Ok(Value::Int(*n)),
            Node::Str(s) => Ok(Value::Str(s.clone())),
            Node::Variable(name) => self.lookup(name),

            Node::Assign { name, value } => {
                let value = self.eval(value)?;
                self.state.variables.borrow_mut().set(
                    name,
                    value,
                    self.state.scope_level,
                    self.state.for_section,
                );
                Ok(Value::Void)
            }

            Node::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::binary(*op, left, right)
            }

            Node::Negate(operand) => match self.eval(operand)? {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| RuntimeError::arithmetic("integer overflow in negation")),
                Value::Void => Err(RuntimeError::missing_value("unary minus")),
                other => Err(RuntimeError::type_mismatch("Int", other.kind_name())),
            },

            Node::Print { value, newline } => {
                let value = self.eval(value)?;
                io::write_value(&self.output, &value, *newline)?;
                Ok(Value::Void)
            }

            Node::Function(def) => {
                let key = FunctionKey::of(def);
                debug!(function = %key, "declare function");
                self.state.functions.borrow_mut().insert(key, def.clone());
                Ok(Value::Void)
            }

            Node::Call { name, args } => {
                let key = FunctionKey::new(name.clone(), args.len());
                let def = self
                    .state
                    .functions
                    .borrow()
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| RuntimeError::undefined_function(name, args.len()))?;
                let args = self.eval_args(args)?;
                self.invoke(&def, args)
            }

            Node::If {
                condition,
                then_branch,
                else_branch,
            } => self.with_block(|this| {
                let branch = if this.condition(condition)? {
                    Some(then_branch.as_slice())
                } else {
                    else_branch.as_deref()
                };
                if let Some(body) = branch {
                    this.exec_block(body)?;
                }
                Ok(Value::Void)
            }),

            Node::While { condition, body } => self.with_block(|this| {
                while this.condition(condition)? {
                    if this.exec_block(body)? {
                        break;
                    }
                }
                Ok(Value::Void)
            }),

            Node::For {
                init,
                condition,
                increment,
                body,
            } => self.with_block(|this| {
                this.with_for_section(|this| this.eval(init))?;
                while this.condition(condition)? {
                    if this.exec_block(body)? {
                        break;
                    }
                    this.with_for_section(|this| this.eval(increment))?;
                }
                Ok(Value::Void)
            }),

            Node::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Void,
                };
                self.state.returns.borrow_mut().push(value);
                Ok(Value::Void)
            }

            Node::Input => io::read_input(&self.input),

            Node::Array(items) => Ok(Value::Array(self.eval_args(items)?)),

            Node::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                let Value::Array(items) = target else {
                    return Err(RuntimeError::argument(format!(
                        "cannot index into {}",
                        target.kind_name()
                    )));
                };
                let Value::Int(i) = index else {
                    return Err(RuntimeError::argument(format!(
                        "array index must be an Int, got {}",
                        index.kind_name()
                    )));
                };
                let len = items.len();
                usize::try_from(i)
                    .ok()
                    .and_then(|i| items.into_iter().nth(i))
                    .ok_or_else(|| {
                        RuntimeError::argument(format!("index {i} out of range for length {len}"))
                    })
            }

            Node::Extension { target, name, args } => self.eval_extension(target, name, args),

            Node::RefBox(def) => {
                self.declare_box(def)?;
                Ok(Value::Void)
            }

            Node::Create(name) => Ok(Value::Object(self.instantiate(name)?)),

            Node::FieldAccess { instance, field } => self.field_access(instance, field),

            Node::FieldAssign {
                instance,
                field,
                value,
            } => {
                self.field_assign(instance, field, value)?;
                Ok(Value::Void)
            }

            Node::MethodCall(call) => self.call_method(call),

            Node::Throw(message) => {
                let message = self.eval(message)?;
                Err(RuntimeError::user_thrown(message.to_text()))
            }

            Node::Import(path) => {
                let path = self.eval_path(path)?;
                self.import(&path)?;
                Ok(Value::Void)
            }

            Node::ReadLines(path) => {
                let path = self.eval_path(path)?;
                io::read_lines(&path)
            }

            Node::ReadText(path) => {
                let path = self.eval_path(path)?;
                io::read_text(&path).map(Value::Str)
            }

            Node::FileExists(path) => {
                let path = self.eval_path(path)?;
                Ok(io::file_exists(&path))
            }

            Node::ExtensionDecl {
                kind,
                refbox,
                function,
                arity,
            } => {
                self.register_extension(kind, refbox, function, arity)?;
                Ok(Value::Void)
            }
        }
    }

    /// Variable visible from the current scope level
    pub(super) fn lookup(&self, name: &str) -> InterpResult<Value> {
        self.state
            .variables
            .borrow()
            .get(name, self.state.scope_level)
    }

    /// Evaluate arguments left to right in the current scope
    pub(super) fn eval_args(&mut self, args: &[Node]) -> InterpResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn eval_path(&mut self, node: &Node) -> InterpResult<String> {
        match self.eval(node)? {
            Value::Str(path) => Ok(path),
            other => Err(RuntimeError::invalid_path(other.kind_name())),
        }
    }

    fn condition(&mut self, node: &Node) -> InterpResult<bool> {
        Ok(self.eval(node)?.as_int()? != 0)
    }

    pub(super) fn has_pending_return(&self) -> bool {
        !self.state.returns.borrow().is_empty()
    }

    pub(super) fn pop_return(&mut self) -> Value {
        self.state.returns.borrow_mut().pop().unwrap_or(Value::Void)
    }

    /// Run statements in order, stopping once a return signal is pending.
    /// Returns whether a signal is pending.
    pub(super) fn exec_block(&mut self, block: &[Node]) -> InterpResult<bool> {
        for node in block {
            trace!(node = node.label(), level = self.state.scope_level, "statement");
            self.eval(node)?;
            if self.has_pending_return() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run `f` one scope level deeper; the level is cleared on every exit
    fn with_block<T>(&mut self, f: impl FnOnce(&mut Self) -> InterpResult<T>) -> InterpResult<T> {
        let outer = self.state.scope_level;
        self.state.scope_level = outer + 1;
        let result = f(self);
        let cleared = self.state.variables.borrow_mut().clear(outer + 1);
        self.state.scope_level = outer;
        let value = result?;
        cleared?;
        Ok(value)
    }

    /// Run a `for` clause with parameter-style assignment
    fn with_for_section<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> InterpResult<T>,
    ) -> InterpResult<T> {
        let saved = self.state.for_section;
        self.state.for_section = true;
        let result = f(self);
        self.state.for_section = saved;
        result
    }

    /// Count one call level; fails past [`MAX_CALL_DEPTH`]
    pub(super) fn enter_call(&mut self) -> InterpResult<()> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::stack_overflow(MAX_CALL_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    pub(super) fn leave_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Call a plain function in a fresh call scope of the active variables
    pub(super) fn invoke(&mut self, def: &FunctionDef, args: Vec<Value>) -> InterpResult<Value> {
        self.enter_call()?;
        let call_level = self.state.scope_level;
        let saved_section = self.state.for_section;
        self.state.scope_level = call_level + 1;
        self.state.for_section = false;

        let result = self.run_body(def, args);

        let cleared = self.state.variables.borrow_mut().clear(call_level + 1);
        self.state.scope_level = call_level;
        self.state.for_section = saved_section;
        self.leave_call();
        let value = result?;
        cleared?;
        Ok(value)
    }

    /// Bind parameters at the current level and run the body to its return
    pub(super) fn run_body(&mut self, def: &FunctionDef, args: Vec<Value>) -> InterpResult<Value> {
        if args.len() != def.params.len() {
            return Err(RuntimeError::argument(format!(
                "function '{}' expects {} argument(s), got {}",
                def.name,
                def.params.len(),
                args.len()
            )));
        }
        {
            let level = self.state.scope_level;
            let mut variables = self.state.variables.borrow_mut();
            for (param, value) in def.params.iter().zip(args) {
                variables.set(param, value, level, true);
            }
        }
        if self.exec_block(&def.body)? {
            Ok(self.pop_return())
        } else {
            Err(RuntimeError::missing_return(&def.name))
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
