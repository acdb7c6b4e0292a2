//! refbox object system
//!
//! A definition is a structural template of fields and functions. An
//! instance is an ordered list of slots; every function slot owns a
//! persistent [`MethodEnv`] where its locals and activations live.
//!
//! Calling a method swaps the engine onto the slot's environment: the
//! caller's state is snapshotted, the method runs against its own variables
//! and return stack, and the snapshot is restored on every exit before the
//! level-0 field bindings are written back into the instance.

use super::env::{FunctionKey, ReturnStack, ScopeRef};
use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::Value;
use crate::ast::{Access, FunctionDef, MethodCall, Node, Receiver, RefBoxDef};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;
use tracing::debug;

/// Shared handle to an instance
pub type InstanceRef = Rc<RefCell<Instance>>;

/// How a field gets its initial value
#[derive(Debug, Clone)]
pub enum FieldInit {
    /// Evaluated at each instantiation
    Expr(Node),
    /// Fixed value (synthesized chain definitions)
    Const(Value),
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub init: FieldInit,
    pub access: Access,
}

#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub function: Rc<FunctionDef>,
    pub access: Access,
    pub is_abstract: bool,
}

impl MethodSpec {
    pub fn key(&self) -> FunctionKey {
        FunctionKey::of(&self.function)
    }
}

/// Registered refbox definition
#[derive(Debug, Clone)]
pub struct BoxDefinition {
    pub name: String,
    pub base: Option<String>,
    pub is_abstract: bool,
    pub is_const: bool,
    pub fields: Vec<FieldSpec>,
    pub functions: Vec<MethodSpec>,
}

impl From<&RefBoxDef> for BoxDefinition {
    fn from(def: &RefBoxDef) -> Self {
        BoxDefinition {
            name: def.name.clone(),
            base: def.base.clone(),
            is_abstract: def.is_abstract,
            is_const: def.is_const,
            fields: def
                .fields
                .iter()
                .map(|f| FieldSpec {
                    name: f.name.clone(),
                    init: FieldInit::Expr(f.init.clone()),
                    access: f.access,
                })
                .collect(),
            functions: def
                .functions
                .iter()
                .map(|m| MethodSpec {
                    function: m.function.clone(),
                    access: m.access,
                    is_abstract: m.is_abstract,
                })
                .collect(),
        }
    }
}

impl BoxDefinition {
    /// `[Exposed] field, [Guarded] fn <- (a, b)` as shown by the dump
    pub fn member_summary(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(|f| format!("[{}] {}", f.access, f.name));
        let functions = self.functions.iter().map(|m| {
            format!(
                "[{}] {} <- ({})",
                m.access,
                m.function.name,
                m.function.params.join(", ")
            )
        });
        fields.chain(functions).collect::<Vec<_>>().join(", ")
    }

    fn field_names(&self) -> BTreeSet<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    fn function_keys(&self) -> BTreeSet<FunctionKey> {
        self.functions.iter().map(MethodSpec::key).collect()
    }

    /// Reject duplicates, pull in the base's members, check abstract ones
    fn validate(&mut self, base: Option<&BoxDefinition>) -> InterpResult<()> {
        let mut seen = HashSet::new();
        if let Some(dup) = self.fields.iter().find(|f| !seen.insert(f.name.as_str())) {
            return Err(RuntimeError::definition(format!(
                "duplicate field '{}' in refbox '{}'",
                dup.name, self.name
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.functions.iter().find(|m| !seen.insert(m.key())) {
            return Err(RuntimeError::definition(format!(
                "duplicate function '{}' in refbox '{}'",
                dup.key(),
                self.name
            )));
        }

        if let Some(base) = base {
            for field in &base.fields {
                if !self.fields.iter().any(|f| f.name == field.name) {
                    self.fields.push(field.clone());
                }
            }
            for method in &base.functions {
                if !self.functions.iter().any(|m| m.key() == method.key()) {
                    self.functions.push(method.clone());
                }
            }
        }

        let pending: Vec<&str> = self
            .functions
            .iter()
            .filter(|m| m.is_abstract)
            .map(|m| m.function.name.as_str())
            .collect();
        if !pending.is_empty() && !self.is_abstract {
            return Err(RuntimeError::definition(format!(
                "refbox '{}' does not override abstract function(s): {}",
                self.name,
                pending.join(", ")
            )));
        }
        Ok(())
    }
}

/// Persistent per-slot environment of a method
#[derive(Debug, Clone, Default)]
pub struct MethodEnv {
    pub variables: ScopeRef,
    pub returns: ReturnStack,
    /// Highest scope level held by an activation of this slot
    pub level: Rc<Cell<usize>>,
}

/// Named entry of an instance
#[derive(Debug)]
pub enum Slot {
    Field {
        name: String,
        value: Value,
        access: Access,
    },
    Function {
        def: Rc<FunctionDef>,
        access: Access,
        env: MethodEnv,
    },
}

impl Slot {
    pub fn access(&self) -> Access {
        match self {
            Slot::Field { access, .. } | Slot::Function { access, .. } => *access,
        }
    }

    fn visible(&self, include_guarded: bool) -> bool {
        include_guarded || self.access() == Access::Exposed
    }
}

/// refbox instance
#[derive(Debug)]
pub struct Instance {
    /// Name of the definition it was created from
    pub definition: String,
    pub slots: Vec<Slot>,
}

impl Instance {
    pub fn field(&self, name: &str) -> Option<(&Value, Access)> {
        self.slots.iter().find_map(|slot| match slot {
            Slot::Field {
                name: n,
                value,
                access,
            } if n == name => Some((value, *access)),
            _ => None,
        })
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.slots.iter_mut().find_map(|slot| match slot {
            Slot::Field { name: n, value, .. } if n == name => Some(value),
            _ => None,
        })
    }

    pub fn method(&self, key: &FunctionKey) -> Option<(&Rc<FunctionDef>, Access, &MethodEnv)> {
        self.slots.iter().find_map(|slot| match slot {
            Slot::Function { def, access, env } if FunctionKey::of(def) == *key => {
                Some((def, *access, env))
            }
            _ => None,
        })
    }

    pub fn field_names(&self, include_guarded: bool) -> impl Iterator<Item = &str> {
        self.slots.iter().filter_map(move |slot| match slot {
            Slot::Field { name, .. } if slot.visible(include_guarded) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn function_keys(&self, include_guarded: bool) -> impl Iterator<Item = FunctionKey> + '_ {
        self.slots.iter().filter_map(move |slot| match slot {
            Slot::Function { def, .. } if slot.visible(include_guarded) => {
                Some(FunctionKey::of(def))
            }
            _ => None,
        })
    }

    /// Same field names and function identities as `def`
    pub fn matches_definition(&self, def: &BoxDefinition) -> bool {
        let fields: BTreeSet<&str> = self.field_names(true).collect();
        let functions: BTreeSet<FunctionKey> = self.function_keys(true).collect();
        fields == def.field_names() && functions == def.function_keys()
    }

    /// Overwrite a field, keeping its modifier
    pub fn set_field(&mut self, name: &str, value: Value) -> bool {
        match self.field_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Removes synthesized chain definitions on every exit path
struct ChainGuard {
    boxes: super::env::BoxTable,
    names: Vec<String>,
}

impl Drop for ChainGuard {
    fn drop(&mut self) {
        let mut boxes = self.boxes.borrow_mut();
        for name in &self.names {
            boxes.remove(name);
        }
    }
}

impl Interpreter {
    /// Validate and register a refbox definition from source
    pub(super) fn declare_box(&mut self, def: &RefBoxDef) -> InterpResult<()> {
        self.register_box(BoxDefinition::from(def))
    }

    fn register_box(&mut self, mut definition: BoxDefinition) -> InterpResult<()> {
        let boxes = self.state.boxes.clone();
        if let Some(existing) = boxes.borrow().get(&definition.name) {
            if existing.is_const {
                return Err(RuntimeError::definition(format!(
                    "refbox '{}' is const and cannot be redefined",
                    existing.name
                )));
            }
        }

        let base = match &definition.base {
            Some(base) => Some(boxes.borrow().get(base).cloned().ok_or_else(|| {
                RuntimeError::definition(format!("base refbox '{base}' not found"))
            })?),
            None => None,
        };
        definition.validate(base.as_deref())?;

        debug!(
            refbox = %definition.name,
            fields = definition.fields.len(),
            functions = definition.functions.len(),
            "declare refbox"
        );
        boxes
            .borrow_mut()
            .insert(definition.name.clone(), Rc::new(definition));
        Ok(())
    }

    pub(super) fn box_definition(&self, name: &str) -> InterpResult<Rc<BoxDefinition>> {
        self.state
            .boxes
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::definition(format!("refbox '{name}' not found")))
    }

    /// Create an instance, evaluating field initializers in the current scope
    pub(super) fn instantiate(&mut self, name: &str) -> InterpResult<InstanceRef> {
        let def = self.box_definition(name)?;
        if def.is_abstract {
            return Err(RuntimeError::definition(format!(
                "cannot create an instance of abstract refbox '{name}'"
            )));
        }

        let mut slots = Vec::with_capacity(def.fields.len() + def.functions.len());
        for field in &def.fields {
            let value = match &field.init {
                FieldInit::Expr(node) => self.eval(node)?,
                FieldInit::Const(value) => value.clone(),
            };
            slots.push(Slot::Field {
                name: field.name.clone(),
                value,
                access: field.access,
            });
        }
        for method in &def.functions {
            slots.push(Slot::Function {
                def: method.function.clone(),
                access: method.access,
                env: MethodEnv::default(),
            });
        }

        debug!(refbox = name, "create instance");
        Ok(Rc::new(RefCell::new(Instance {
            definition: def.name.clone(),
            slots,
        })))
    }

    fn instance_in(&self, variable: &str) -> InterpResult<InstanceRef> {
        Ok(self.lookup(variable)?.as_object()?.clone())
    }

    /// `instance.field` from outside the instance
    pub(super) fn field_access(&self, variable: &str, field: &str) -> InterpResult<Value> {
        let instance = self.instance_in(variable)?;
        let instance = instance.borrow();
        match instance.field(field) {
            Some((value, Access::Exposed)) => Ok(value.clone()),
            Some((_, Access::Guarded)) => Err(RuntimeError::access_denied(format!(
                "cannot access guarded field '{field}'"
            ))),
            None => Err(undefined_field(field, &instance.definition)),
        }
    }

    /// `instance.field = value` from outside the instance
    pub(super) fn field_assign(&mut self, variable: &str, field: &str, value: &Node) -> InterpResult<()> {
        let instance = self.instance_in(variable)?;
        match instance.borrow().field(field) {
            Some((_, Access::Exposed)) => {}
            Some((_, Access::Guarded)) => {
                return Err(RuntimeError::access_denied(format!(
                    "cannot set guarded field '{field}'"
                )));
            }
            None => return Err(undefined_field(field, &instance.borrow().definition)),
        }
        let value = self.eval(value)?;
        instance.borrow_mut().set_field(field, value);
        Ok(())
    }

    /// `receiver.name(args)`
    pub(super) fn call_method(&mut self, call: &MethodCall) -> InterpResult<Value> {
        let instance = match &call.receiver {
            Receiver::Named(variable) => self.instance_in(variable)?,
            Receiver::Anonymous(refbox) => self.instantiate(refbox)?,
            Receiver::Chained(_) => return self.call_chain(call),
        };
        self.dispatch_method(&instance, &call.name, &call.args)
    }

    /// `a.f().g().h()`: every intermediate instance is re-materialized
    /// through a throwaway definition before the next call
    fn call_chain(&mut self, last: &MethodCall) -> InterpResult<Value> {
        let mut calls = vec![last];
        let mut current = last;
        while let Receiver::Chained(previous) = &current.receiver {
            current = previous.as_ref();
            calls.push(current);
        }
        calls.reverse();

        let mut guard = ChainGuard {
            boxes: self.state.boxes.clone(),
            names: Vec::new(),
        };
        let (first, rest) = calls
            .split_first()
            .ok_or_else(|| RuntimeError::argument("empty method chain"))?;
        let mut result = self.call_method(first)?;
        for call in rest {
            let Value::Object(previous) = &result else {
                return Err(RuntimeError::type_mismatch("RefBox", result.kind_name()));
            };
            let name = format!("anonymous_{}", self.anonymous_count);
            self.anonymous_count += 1;
            let definition = anonymous_definition(name.clone(), &previous.borrow());
            guard.names.push(name.clone());
            self.register_box(definition)?;
            let instance = self.instantiate(&name)?;
            result = self.dispatch_method(&instance, &call.name, &call.args)?;
        }
        drop(guard);
        Ok(result)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(method = name, arity = args.len()))]
    fn dispatch_method(&mut self, instance: &InstanceRef, name: &str, args: &[Node]) -> InterpResult<Value> {
        let key = FunctionKey::new(name, args.len());
        let (def, env) = {
            let inst = instance.borrow();
            match inst.method(&key) {
                Some((_, Access::Guarded, _)) => {
                    return Err(RuntimeError::access_denied(format!(
                        "cannot call guarded function '{name}'"
                    )));
                }
                Some((def, Access::Exposed, env)) => (def.clone(), env.clone()),
                None => return Err(RuntimeError::undefined_function(name, args.len())),
            }
        };
        let args = self.eval_args(args)?;

        self.enter_call()?;
        let snapshot = self.state.clone();

        let mut functions = self.state.functions.borrow().clone();
        for slot in &instance.borrow().slots {
            if let Slot::Function { def, .. } = slot {
                functions.insert(FunctionKey::of(def), def.clone());
            }
        }

        let call_level = self.state.scope_level.max(env.level.get());
        let active = call_level + 1;
        let saved_env_level = env.level.replace(active);

        self.state.functions = Rc::new(RefCell::new(functions));
        self.state.variables = env.variables.clone();
        self.state.returns = env.returns.clone();
        self.state.scope_level = active;
        self.state.for_section = false;
        {
            let mut variables = env.variables.borrow_mut();
            for slot in &instance.borrow().slots {
                if let Slot::Field { name, value, .. } = slot {
                    variables.set(name, value.clone(), 0, true);
                }
            }
        }

        let result = self.run_body(&def, args);

        let cleared = env.variables.borrow_mut().clear(active);
        env.level.set(saved_env_level);
        self.state = snapshot;
        self.leave_call();
        {
            let variables = env.variables.borrow();
            let mut inst = instance.borrow_mut();
            for slot in inst.slots.iter_mut() {
                if let Slot::Field { name, value, .. } = slot {
                    if let Some(updated) = variables.lookup(name, 0) {
                        *value = updated.clone();
                    }
                }
            }
        }

        let value = result?;
        cleared?;
        Ok(value)
    }

    /// `isinstanceof(name)`
    pub(super) fn is_instance_of(&self, instance: &InstanceRef, refbox: &str) -> InterpResult<bool> {
        let def = self.box_definition(refbox)?;
        Ok(instance.borrow().matches_definition(&def))
    }
}

fn undefined_field(field: &str, refbox: &str) -> RuntimeError {
    RuntimeError::new(
        super::error::ErrorKind::UndefinedVariable,
        format!("field '{field}' not found in refbox '{refbox}'"),
    )
}

/// Definition reproducing an instance's current shape and field values
fn anonymous_definition(name: String, instance: &Instance) -> BoxDefinition {
    let mut fields = Vec::new();
    let mut functions = Vec::new();
    for slot in &instance.slots {
        match slot {
            Slot::Field {
                name,
                value,
                access,
            } if !value.is_void() => fields.push(FieldSpec {
                name: name.clone(),
                init: FieldInit::Const(value.clone()),
                access: *access,
            }),
            Slot::Field { .. } => {}
            Slot::Function { def, access, .. } => functions.push(MethodSpec {
                function: def.clone(),
                access: *access,
                is_abstract: false,
            }),
        }
    }
    BoxDefinition {
        name,
        base: None,
        is_abstract: false,
        is_const: false,
        fields,
        functions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;
    use crate::ScriptError;
    use std::io::Cursor;

    fn interp() -> (Interpreter, Rc<RefCell<Vec<u8>>>) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let input = Rc::new(RefCell::new(Cursor::new(Vec::new())));
        (Interpreter::with_io(buffer.clone(), input), buffer)
    }

    fn output(source: &str) -> String {
        let (mut interp, buffer) = interp();
        interp.run_source(source).expect("program should run");
        let out = String::from_utf8(buffer.borrow().clone()).unwrap();
        out
    }

    fn error_kind(source: &str) -> ErrorKind {
        let (mut interp, _) = interp();
        match interp.run_source(source) {
            Err(ScriptError::Runtime(e)) => e.kind,
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    const COUNTER: &str = "
        refbox Counter
            value = 0
            guarded step = 1
            function inc() value = value + step return value
            guarded function secret() return 42
            function reveal() return secret()
        end
    ";

    #[test]
    fn test_counter_accumulates() {
        let out = output(&format!("{COUNTER} c = create Counter c.inc() c.inc() print c.value"));
        assert_eq!(out, "2\n");
    }

    #[test]
    fn test_instances_are_isolated() {
        let out = output(&format!(
            "{COUNTER} a = create Counter b = create Counter a.inc() a.inc() b.inc() print a.value print b.value"
        ));
        assert_eq!(out, "2\n1\n");
    }

    #[test]
    fn test_guarded_members_denied_outside() {
        assert_eq!(
            error_kind(&format!("{COUNTER} c = create Counter print c.step")),
            ErrorKind::AccessDenied
        );
        assert_eq!(
            error_kind(&format!("{COUNTER} c = create Counter c.step = 3")),
            ErrorKind::AccessDenied
        );
        assert_eq!(
            error_kind(&format!("{COUNTER} c = create Counter c.secret()")),
            ErrorKind::AccessDenied
        );
    }

    #[test]
    fn test_guarded_members_allowed_inside() {
        let out = output(&format!("{COUNTER} c = create Counter print c.reveal()"));
        assert_eq!(out, "42\n");
    }

    #[test]
    fn test_field_assign_from_outside() {
        let out = output(&format!("{COUNTER} c = create Counter c.value = 10 c.inc() print c.value"));
        assert_eq!(out, "11\n");
    }

    #[test]
    fn test_inheritance_copies_base_members() {
        let (mut interp, _) = interp();
        interp
            .run_source("refbox Base x = 1 function get() return x end refbox Derived : Base end")
            .unwrap();
        let base = interp.box_definition("Base").unwrap();
        let derived = interp.box_definition("Derived").unwrap();
        assert_eq!(derived.field_names(), base.field_names());
        assert_eq!(derived.function_keys(), base.function_keys());
    }

    #[test]
    fn test_override_replaces_not_duplicates() {
        let (mut interp, buffer) = interp();
        interp
            .run_source(
                "refbox Base function name() return \"base\" end
                 refbox Derived : Base function name() return \"derived\" end
                 d = create Derived print d.name()",
            )
            .unwrap();
        assert_eq!(interp.box_definition("Derived").unwrap().functions.len(), 1);
        assert_eq!(String::from_utf8(buffer.borrow().clone()).unwrap(), "derived\n");
    }

    #[test]
    fn test_definition_errors() {
        assert_eq!(error_kind("refbox A x = 1 x = 2 end"), ErrorKind::DefinitionError);
        assert_eq!(
            error_kind("refbox A function f() return 1 function f() return 2 end"),
            ErrorKind::DefinitionError
        );
        assert_eq!(error_kind("refbox A : Missing end"), ErrorKind::DefinitionError);
        assert_eq!(
            error_kind("abstract refbox S abstract function area() end refbox Q : S end"),
            ErrorKind::DefinitionError
        );
        assert_eq!(
            error_kind("abstract refbox S end s = create S"),
            ErrorKind::DefinitionError
        );
        assert_eq!(
            error_kind("const refbox K end refbox K end"),
            ErrorKind::DefinitionError
        );
    }

    #[test]
    fn test_unknown_method() {
        assert_eq!(
            error_kind(&format!("{COUNTER} c = create Counter c.inc(1)")),
            ErrorKind::UndefinedFunction
        );
    }

    #[test]
    fn test_method_failure_restores_state() {
        let (mut interp, _) = interp();
        let result = interp.run_source(
            "refbox Bad function boom() throw \"inside\" end end
             keep = 7
             b = create Bad
             b.boom()",
        );
        assert!(result.is_err());
        assert_eq!(interp.state.scope_level, 0);
        assert_eq!(interp.global("keep"), Some(Value::Int(7)));
        assert!(interp.state.returns.borrow().is_empty());
    }

    #[test]
    fn test_anonymous_receiver() {
        assert_eq!(output(&format!("{COUNTER} print create Counter.inc()")), "1\n");
    }

    #[test]
    fn test_chain_materializes_and_cleans_up() {
        let (mut interp, buffer) = interp();
        interp
            .run_source(
                "refbox Builder
                    total = 0
                    function add(n)
                        next = create Builder
                        next.total = total + n
                        return next
                    function sum() return total
                 end
                 b = create Builder
                 print b.add(1).add(2).sum()",
            )
            .unwrap();
        assert!(interp
            .state
            .boxes
            .borrow()
            .keys()
            .all(|name| !name.starts_with("anonymous_")));
        assert_eq!(String::from_utf8(buffer.borrow().clone()).unwrap(), "3\n");
    }

    #[test]
    fn test_chain_on_non_instance_fails_and_cleans_up() {
        let (mut interp, _) = interp();
        let err = interp
            .run_source(&format!("{COUNTER} c = create Counter c.inc().inc()"))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(ref e) if e.kind == ErrorKind::TypeMismatch));
        assert!(interp.state.boxes.borrow().len() == 1);
    }

    #[test]
    fn test_member_summary() {
        let (mut interp, _) = interp();
        interp.run_source(COUNTER).unwrap();
        insta::assert_snapshot!(
            interp.box_definition("Counter").unwrap().member_summary(),
            @"[Exposed] value, [Guarded] step, [Exposed] inc <- (), [Guarded] secret <- (), [Exposed] reveal <- ()"
        );
    }
}
