//! Engine runtime state
//!
//! Every table lives behind its own `Rc<RefCell<..>>` handle so that a
//! snapshot is a cheap handle copy. Method calls swap handles in and out;
//! imports run against a deep [`EngineState::fork`] and are folded back with
//! [`EngineState::merge_from`].

use super::boxes::BoxDefinition;
use super::ext::UserExtension;
use super::scope::ScopeStack;
use super::Value;
use crate::ast::FunctionDef;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Shared variable store
pub type ScopeRef = Rc<RefCell<ScopeStack>>;
/// Pending return signals; `Value::Void` marks `return void`
pub type ReturnStack = Rc<RefCell<Vec<Value>>>;
pub type FunctionTable = Rc<RefCell<BTreeMap<FunctionKey, Rc<FunctionDef>>>>;
pub type BoxTable = Rc<RefCell<BTreeMap<String, Rc<BoxDefinition>>>>;
pub type ExtensionTable = Rc<RefCell<BTreeMap<String, UserExtension>>>;

/// Function identity: name plus parameter count
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionKey {
    pub name: String,
    pub arity: usize,
}

impl FunctionKey {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        FunctionKey {
            name: name.into(),
            arity,
        }
    }

    pub fn of(def: &FunctionDef) -> Self {
        Self::new(def.name.clone(), def.params.len())
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// Full interpreter state. `Clone` is a shallow snapshot.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub variables: ScopeRef,
    pub functions: FunctionTable,
    pub boxes: BoxTable,
    pub returns: ReturnStack,
    pub extensions: ExtensionTable,
    pub scope_level: usize,
    /// Inside a `for` init/increment clause
    pub for_section: bool,
}

fn shared<T>(value: T) -> Rc<RefCell<T>> {
    Rc::new(RefCell::new(value))
}

impl EngineState {
    pub fn new() -> Self {
        EngineState {
            variables: shared(ScopeStack::new()),
            functions: shared(BTreeMap::new()),
            boxes: shared(BTreeMap::new()),
            returns: shared(Vec::new()),
            extensions: shared(BTreeMap::new()),
            scope_level: 0,
            for_section: false,
        }
    }

    /// Independent copy of every table
    pub fn fork(&self) -> Self {
        EngineState {
            variables: shared(self.variables.borrow().clone()),
            functions: shared(self.functions.borrow().clone()),
            boxes: shared(self.boxes.borrow().clone()),
            returns: shared(self.returns.borrow().clone()),
            extensions: shared(self.extensions.borrow().clone()),
            scope_level: self.scope_level,
            for_section: self.for_section,
        }
    }

    /// Fold a forked state back in.
    ///
    /// Names already present here win. Return signals raised by the fork
    /// beyond the `inherited_returns` it started with are appended.
    pub fn merge_from(&self, sub: &EngineState, inherited_returns: usize) -> Self {
        if !Rc::ptr_eq(&self.variables, &sub.variables) {
            self.variables.borrow_mut().absorb(&sub.variables.borrow());
        }
        merge_missing(&self.functions, &sub.functions);
        merge_missing(&self.boxes, &sub.boxes);
        merge_missing(&self.extensions, &sub.extensions);
        if !Rc::ptr_eq(&self.returns, &sub.returns) {
            let sub_returns = sub.returns.borrow();
            let start = inherited_returns.min(sub_returns.len());
            self.returns
                .borrow_mut()
                .extend(sub_returns[start..].iter().cloned());
        }
        EngineState {
            scope_level: sub.scope_level,
            for_section: sub.for_section,
            ..self.clone()
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_missing<K: Ord + Clone, V: Clone>(
    target: &Rc<RefCell<BTreeMap<K, V>>>,
    source: &Rc<RefCell<BTreeMap<K, V>>>,
) {
    if Rc::ptr_eq(target, source) {
        return;
    }
    let mut target = target.borrow_mut();
    for (key, value) in source.borrow().iter() {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}
