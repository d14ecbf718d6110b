//! Unified call-argument map handed to functions.
//!
//! Positional and named arguments are merged into one structure: positional
//! slots are addressed by index, named arguments by name, and every accessor
//! takes both so a builtin's parameters can be supplied either way. Script
//! function calls bind positional values to parameter names in order and
//! then let named arguments overwrite.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    error::{RunError, RunResult},
    value::{ArrayRef, Function, ObjectRef, Value},
};

/// Merged positional + named arguments for one call.
#[derive(Default)]
pub struct ArgMap {
    positional: Vec<Value>,
    named: IndexMap<String, Value>,
}

impl ArgMap {
    pub(crate) fn new(positional: Vec<Value>, named: IndexMap<String, Value>) -> Self {
        Self { positional, named }
    }

    pub(crate) fn from_positional(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    #[must_use]
    pub fn named(&self) -> &IndexMap<String, Value> {
        &self.named
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Looks an argument up by positional index, falling back to its name.
    #[must_use]
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.named.get(name))
    }

    /// A required argument; missing produces an arity error.
    pub fn required(&self, func: &str, index: usize, name: &str) -> RunResult<Value> {
        self.get(index, name).cloned().ok_or_else(|| {
            RunError::arity_error(format!("{func}() missing required argument '{name}'"))
        })
    }

    #[must_use]
    pub fn optional(&self, index: usize, name: &str) -> Option<Value> {
        self.get(index, name).cloned()
    }

    /// A named-only argument (no positional slot).
    #[must_use]
    pub fn named_value(&self, name: &str) -> Option<Value> {
        self.named.get(name).cloned()
    }

    pub fn number(&self, func: &str, index: usize, name: &str) -> RunResult<f64> {
        match self.required(func, index, name)? {
            Value::Number(n) => Ok(n),
            other => Err(type_mismatch(func, name, "a number", &other)),
        }
    }

    pub fn integer(&self, func: &str, index: usize, name: &str) -> RunResult<i64> {
        let value = self.required(func, index, name)?;
        value
            .integer()
            .ok_or_else(|| type_mismatch(func, name, "an integer", &value))
    }

    pub fn string(&self, func: &str, index: usize, name: &str) -> RunResult<Arc<str>> {
        match self.required(func, index, name)? {
            Value::Str(s) => Ok(s),
            other => Err(type_mismatch(func, name, "a string", &other)),
        }
    }

    pub fn array(&self, func: &str, index: usize, name: &str) -> RunResult<ArrayRef> {
        match self.required(func, index, name)? {
            Value::Array(items) => Ok(items),
            other => Err(type_mismatch(func, name, "an array", &other)),
        }
    }

    pub fn object(&self, func: &str, index: usize, name: &str) -> RunResult<ObjectRef> {
        match self.required(func, index, name)? {
            Value::Object(entries) => Ok(entries),
            other => Err(type_mismatch(func, name, "an object", &other)),
        }
    }

    pub fn function(&self, func: &str, index: usize, name: &str) -> RunResult<Arc<Function>> {
        match self.required(func, index, name)? {
            Value::Function(f) => Ok(f),
            other => Err(type_mismatch(func, name, "a function", &other)),
        }
    }

    pub fn optional_number(&self, func: &str, index: usize, name: &str) -> RunResult<Option<f64>> {
        match self.get(index, name) {
            None | Some(Value::Nil) => Ok(None),
            Some(Value::Number(n)) => Ok(Some(*n)),
            Some(other) => Err(type_mismatch(func, name, "a number", other)),
        }
    }

    pub fn optional_integer(&self, func: &str, index: usize, name: &str) -> RunResult<Option<i64>> {
        match self.get(index, name) {
            None | Some(Value::Nil) => Ok(None),
            Some(value) => value
                .integer()
                .map(Some)
                .ok_or_else(|| type_mismatch(func, name, "an integer", value)),
        }
    }

    pub fn optional_string(&self, func: &str, index: usize, name: &str) -> RunResult<Option<Arc<str>>> {
        match self.get(index, name) {
            None | Some(Value::Nil) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(other) => Err(type_mismatch(func, name, "a string", other)),
        }
    }

    pub fn optional_function(&self, func: &str, index: usize, name: &str) -> RunResult<Option<Arc<Function>>> {
        match self.get(index, name) {
            None | Some(Value::Nil) => Ok(None),
            Some(Value::Function(f)) => Ok(Some(f.clone())),
            Some(other) => Err(type_mismatch(func, name, "a function", other)),
        }
    }

    /// A named boolean flag; absent means `default`, present means the
    /// argument's truthiness.
    #[must_use]
    pub fn flag(&self, index: usize, name: &str, default: bool) -> bool {
        self.get(index, name).map_or(default, Value::truthy)
    }

    /// Binds this map to a script function's parameter list: positional in
    /// order, then named overwrites, unbound parameters nil.
    #[must_use]
    pub(crate) fn bind_params(&self, params: &[String]) -> Vec<(String, Value)> {
        let mut bound: Vec<(String, Value)> = params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                (
                    param.clone(),
                    self.positional.get(i).cloned().unwrap_or(Value::Nil),
                )
            })
            .collect();
        for (name, value) in &self.named {
            if let Some(slot) = bound.iter_mut().find(|(param, _)| param == name) {
                slot.1 = value.clone();
            }
        }
        bound
    }
}

fn type_mismatch(func: &str, name: &str, expected: &str, got: &Value) -> RunError {
    RunError::type_error(format!(
        "{func}() argument '{name}' must be {expected}, got {}",
        got.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_then_named_lookup() {
        let mut named = IndexMap::new();
        named.insert("sep".to_owned(), Value::string(","));
        let args = ArgMap::new(vec![Value::Number(1.0)], named);
        assert_eq!(args.get(0, "value"), Some(&Value::Number(1.0)));
        assert_eq!(args.get(1, "sep"), Some(&Value::string(",")));
        assert_eq!(args.get(1, "missing"), None);
    }

    #[test]
    fn bind_params_named_overwrites_positional() {
        let mut named = IndexMap::new();
        named.insert("b".to_owned(), Value::Number(9.0));
        let args = ArgMap::new(vec![Value::Number(1.0), Value::Number(2.0)], named);
        let bound = args.bind_params(&["a".to_owned(), "b".to_owned(), "c".to_owned()]);
        assert_eq!(bound[0].1, Value::Number(1.0));
        assert_eq!(bound[1].1, Value::Number(9.0));
        assert_eq!(bound[2].1, Value::Nil);
    }

    #[test]
    fn missing_required_argument_is_arity_error() {
        let args = ArgMap::from_positional(vec![]);
        assert!(args.required("length", 0, "value").is_err());
    }
}
