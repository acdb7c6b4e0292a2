//! Numbered-scope variable store
//!
//! Scopes are keyed by level; level 0 is global and is never cleared.
//! Lookups at level L scan L, L-1, ..., 0. Unlike a push/pop stack, the
//! levels are addressed explicitly so a method environment can keep its
//! own numbering across calls.

use super::error::{InterpResult, RuntimeError};
use super::Value;
use std::collections::BTreeMap;

/// Variable bindings grouped by scope level
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    scopes: BTreeMap<usize, BTreeMap<String, Value>>,
}

impl ScopeStack {
    /// Create an empty store with only the global scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`.
    ///
    /// Parameter bindings always write at `level`. Other bindings overwrite
    /// the nearest existing binding visible from `level`, or create one at
    /// `level` when the name is unbound.
    pub fn set(&mut self, name: &str, value: Value, level: usize, is_param: bool) {
        if !is_param {
            for (_, scope) in self.scopes.range_mut(..=level).rev() {
                if let Some(slot) = scope.get_mut(name) {
                    *slot = value;
                    return;
                }
            }
        }
        self.scopes
            .entry(level)
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Nearest binding visible from `level`
    pub fn lookup(&self, name: &str, level: usize) -> Option<&Value> {
        self.scopes
            .range(..=level)
            .rev()
            .find_map(|(_, scope)| scope.get(name))
    }

    /// Look up a variable, searching from `level` down to global
    pub fn get(&self, name: &str, level: usize) -> InterpResult<Value> {
        self.lookup(name, level)
            .cloned()
            .ok_or_else(|| RuntimeError::undefined_variable(name))
    }

    /// Drop every binding at `level` and above
    pub fn clear(&mut self, level: usize) -> InterpResult<()> {
        if level == 0 {
            return Err(RuntimeError::argument("cannot clear the global scope"));
        }
        self.scopes.split_off(&level);
        Ok(())
    }

    /// Bindings at exactly `level`, in name order
    pub fn variables_at(&self, level: usize) -> impl Iterator<Item = (&String, &Value)> {
        self.scopes.get(&level).into_iter().flatten()
    }

    /// Non-empty levels in ascending order
    pub fn levels(&self) -> impl Iterator<Item = (usize, &BTreeMap<String, Value>)> {
        self.scopes
            .iter()
            .filter(|(_, scope)| !scope.is_empty())
            .map(|(level, scope)| (*level, scope))
    }

    /// Copy in bindings from `other` level by level; existing names win
    pub fn absorb(&mut self, other: &ScopeStack) {
        for (level, scope) in &other.scopes {
            let target = self.scopes.entry(*level).or_default();
            for (name, value) in scope {
                target
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;

    #[test]
    fn test_basic_set_get() {
        let mut scopes = ScopeStack::new();
        scopes.set("x", Value::Int(42), 0, false);
        assert_eq!(scopes.get("x", 0), Ok(Value::Int(42)));
    }

    #[test]
    fn test_missing_is_undefined_variable() {
        let scopes = ScopeStack::new();
        let err = scopes.get("nope", 3).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_lookup_scans_down_not_up() {
        let mut scopes = ScopeStack::new();
        scopes.set("inner", Value::Int(1), 2, false);
        assert!(scopes.lookup("inner", 1).is_none());
        assert_eq!(scopes.lookup("inner", 5), Some(&Value::Int(1)));
    }

    #[test]
    fn test_assignment_rewrites_outer_binding() {
        let mut scopes = ScopeStack::new();
        scopes.set("x", Value::Int(1), 0, false);
        scopes.set("x", Value::Int(2), 3, false);
        assert_eq!(scopes.variables_at(3).count(), 0);
        assert_eq!(scopes.get("x", 0), Ok(Value::Int(2)));
    }

    #[test]
    fn test_parameter_binding_shadows() {
        let mut scopes = ScopeStack::new();
        scopes.set("x", Value::Int(1), 0, false);
        scopes.set("x", Value::Int(9), 1, true);
        assert_eq!(scopes.get("x", 1), Ok(Value::Int(9)));
        assert_eq!(scopes.get("x", 0), Ok(Value::Int(1)));
    }

    #[test]
    fn test_clear_drops_level_and_above() {
        let mut scopes = ScopeStack::new();
        scopes.set("g", Value::Int(0), 0, false);
        scopes.set("a", Value::Int(1), 1, false);
        scopes.set("b", Value::Int(2), 2, false);
        scopes.clear(1).unwrap();
        assert!(scopes.lookup("a", 2).is_none());
        assert!(scopes.lookup("b", 2).is_none());
        assert_eq!(scopes.get("g", 2), Ok(Value::Int(0)));
    }

    #[test]
    fn test_clear_global_rejected() {
        let mut scopes = ScopeStack::new();
        scopes.set("g", Value::Int(0), 0, false);
        assert!(scopes.clear(0).is_err());
        assert!(scopes.lookup("g", 0).is_some());
    }

    #[test]
    fn test_levels_lists_only_bound_scopes() {
        let mut scopes = ScopeStack::new();
        scopes.set("a", Value::Int(1), 0, false);
        scopes.set("b", Value::Int(2), 4, false);
        let levels: Vec<usize> = scopes.levels().map(|(level, _)| level).collect();
        assert_eq!(levels, vec![0, 4]);
        scopes.clear(4).unwrap();
        assert_eq!(scopes.levels().count(), 1);
        assert_eq!(scopes.variables_at(4).count(), 0);
    }

    #[test]
    fn test_absorb_keeps_existing() {
        let mut caller = ScopeStack::new();
        caller.set("x", Value::Int(1), 0, false);
        let mut imported = ScopeStack::new();
        imported.set("x", Value::Int(2), 0, false);
        imported.set("y", Value::Int(3), 0, false);
        caller.absorb(&imported);
        assert_eq!(caller.get("x", 0), Ok(Value::Int(1)));
        assert_eq!(caller.get("y", 0), Ok(Value::Int(3)));
    }
}
