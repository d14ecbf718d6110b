//! Runtime value representation.
//!
//! Duso values are `Send + Sync`: containers are `Arc` + `parking_lot::RwLock`
//! so reference semantics inside a task come for free and the datastore's
//! deep-copy contract (not the type system) is what isolates tasks from one
//! another. `IndexMap` keeps object key insertion order observable through
//! every operation.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{
    args::ArgMap,
    ast::Block,
    error::{ErrorValue, RunError, RunResult},
    eval::Evaluator,
    scope::Scope,
};

/// Shared, mutable array storage.
pub type ArrayRef = Arc<RwLock<Vec<Value>>>;
/// Shared, mutable object storage. Also used verbatim as a scope frame's
/// variable map, which is what lets an object act as a method-call frame.
pub type ObjectRef = Arc<RwLock<IndexMap<String, Value>>>;

/// Signature of a native (builtin) function: the evaluator for recursive
/// calls, plus the unified positional/named argument map.
pub type NativeFn = Arc<dyn Fn(&mut Evaluator, ArgMap) -> RunResult<Value> + Send + Sync>;

/// A function value: a capturing script closure or a native function.
pub enum Function {
    Script(ScriptFunction),
    Native(NativeFunction),
}

/// A script closure. `env` is the environment active at the definition site;
/// the reference is live, so mutations through it are observed by every
/// holder of the closure.
pub struct ScriptFunction {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Arc<Block>,
    pub env: Scope,
}

pub struct NativeFunction {
    pub name: String,
    pub func: NativeFn,
}

impl NativeFunction {
    pub(crate) fn value(
        name: impl Into<String>,
        func: impl Fn(&mut Evaluator, ArgMap) -> RunResult<Value> + Send + Sync + 'static,
    ) -> Value {
        Value::Function(Arc::new(Function::Native(Self {
            name: name.into(),
            func: Arc::new(func),
        })))
    }
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Script(f) => f.name.as_deref(),
            Self::Native(f) => Some(f.name.as_str()),
        }
    }
}

/// A pre-parsed program: AST plus source text plus optional metadata.
///
/// `Code` values hold no environment reference, so they are safe to hand to
/// other tasks or store in the datastore.
pub struct CodeValue {
    pub source: Arc<str>,
    pub program: Arc<Block>,
    /// Display name used in traces (a path for file-backed code).
    pub name: Option<String>,
    /// Optional metadata supplied when the code value was created.
    pub meta: Option<Value>,
}

/// Primary runtime value type.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Arc<Function>),
    Code(Arc<CodeValue>),
    Error(Arc<ErrorValue>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::Str(Arc::from(s.into().into_boxed_str()))
    }

    pub fn array(items: Vec<Self>) -> Self {
        Self::Array(Arc::new(RwLock::new(items)))
    }

    pub fn object(entries: IndexMap<String, Self>) -> Self {
        Self::Object(Arc::new(RwLock::new(entries)))
    }

    /// The `type()` name of this value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
            Self::Code(_) => "code",
            Self::Error(_) => "error",
        }
    }

    /// Falsy values: nil, false, 0, empty string, empty array, empty object.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Array(items) => !items.read().is_empty(),
            Self::Object(entries) => !entries.read().is_empty(),
            Self::Function(_) | Self::Code(_) | Self::Error(_) => true,
        }
    }

    /// The number behind this value, if it is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer view of a number: requires a zero fractional part.
    #[must_use]
    pub fn integer(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 => {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Structural equality.
    ///
    /// Containers compare element-wise (shared identity short-circuits);
    /// functions and code compare by identity; errors by kind and message.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Self::Object(a), Self::Object(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| value.equals(other)))
            }
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::Code(a), Self::Code(b)) => Arc::ptr_eq(a, b),
            (Self::Error(a), Self::Error(b)) => a.kind == b.kind && a.message == b.message,
            _ => false,
        }
    }

    /// Recursively copies arrays and objects, dropping function values
    /// (array entries are elided, object keys omitted).
    ///
    /// Functions are dropped because closures capture an environment whose
    /// lifetime cannot transfer across task or store boundaries; `Code`
    /// values are self-contained and survive the copy. Errors with kind
    /// `Cycle` are returned for self-referential containers.
    pub fn deep_copy(&self) -> RunResult<Self> {
        let mut seen = Vec::new();
        self.deep_copy_inner(&mut seen)
    }

    fn deep_copy_inner(&self, seen: &mut Vec<usize>) -> RunResult<Self> {
        match self {
            Self::Array(items) => {
                let marker = Arc::as_ptr(items) as usize;
                if seen.contains(&marker) {
                    return Err(RunError::cycle_error("cannot deep-copy a cyclic array"));
                }
                seen.push(marker);
                let mut copied = Vec::new();
                for item in items.read().iter() {
                    if matches!(item, Self::Function(_)) {
                        continue;
                    }
                    copied.push(item.deep_copy_inner(seen)?);
                }
                seen.pop();
                Ok(Self::array(copied))
            }
            Self::Object(entries) => {
                let marker = Arc::as_ptr(entries) as usize;
                if seen.contains(&marker) {
                    return Err(RunError::cycle_error("cannot deep-copy a cyclic object"));
                }
                seen.push(marker);
                let mut copied = IndexMap::new();
                for (key, value) in entries.read().iter() {
                    if matches!(value, Self::Function(_)) {
                        continue;
                    }
                    copied.insert(key.clone(), value.deep_copy_inner(seen)?);
                }
                seen.pop();
                Ok(Self::object(copied))
            }
            Self::Function(_) => Ok(Self::Nil),
            other => Ok(other.clone()),
        }
    }

    /// Display form used by `print` and string coercion: strings render raw
    /// at the top level but quoted inside containers.
    #[must_use]
    pub fn display(&self) -> String {
        let mut out = String::new();
        let mut seen = Vec::new();
        self.write_display(&mut out, false, &mut seen);
        out
    }

    fn write_display(&self, out: &mut String, quoted: bool, seen: &mut Vec<usize>) {
        match self {
            Self::Nil => out.push_str("nil"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Number(n) => out.push_str(&format_number(*n)),
            Self::Str(s) => {
                if quoted {
                    out.push('"');
                    out.push_str(s);
                    out.push('"');
                } else {
                    out.push_str(s);
                }
            }
            Self::Array(items) => {
                let marker = Arc::as_ptr(items) as usize;
                if seen.contains(&marker) {
                    out.push_str("[...]");
                    return;
                }
                seen.push(marker);
                out.push('[');
                for (i, item) in items.read().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_display(out, true, seen);
                }
                out.push(']');
                seen.pop();
            }
            Self::Object(entries) => {
                let marker = Arc::as_ptr(entries) as usize;
                if seen.contains(&marker) {
                    out.push_str("{...}");
                    return;
                }
                seen.push(marker);
                out.push('{');
                for (i, (key, value)) in entries.read().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(key);
                    out.push_str(" = ");
                    value.write_display(out, true, seen);
                }
                out.push('}');
                seen.pop();
            }
            Self::Function(function) => match function.name() {
                Some(name) => {
                    out.push_str("<function ");
                    out.push_str(name);
                    out.push('>');
                }
                None => out.push_str("<function>"),
            },
            Self::Code(code) => match &code.name {
                Some(name) => {
                    out.push_str("<code ");
                    out.push_str(name);
                    out.push('>');
                }
                None => out.push_str("<code>"),
            },
            Self::Error(err) => {
                out.push_str("error: ");
                out.push_str(&err.message);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        let mut seen = Vec::new();
        self.write_display(&mut out, true, &mut seen);
        f.write_str(&out)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::string(v)
    }
}

impl From<Vec<Self>> for Value {
    fn from(v: Vec<Self>) -> Self {
        Self::array(v)
    }
}

impl From<IndexMap<String, Self>> for Value {
    fn from(v: IndexMap<String, Self>) -> Self {
        Self::object(v)
    }
}

/// Renders a number the way scripts see it: integer-valued doubles print
/// without a decimal point, everything else uses the shortest round-trip
/// representation.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let mut buffer = ryu::Buffer::new();
        buffer.format(n).to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_numbers_print_without_decimal() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(1.5e2), "150");
    }

    #[test]
    fn truthiness_of_empty_containers() {
        assert!(!Value::array(vec![]).truthy());
        assert!(!Value::object(IndexMap::new()).truthy());
        assert!(Value::array(vec![Value::Nil]).truthy());
        assert!(!Value::string("").truthy());
        assert!(!Value::Number(0.0).truthy());
    }

    #[test]
    fn deep_copy_drops_functions_and_keeps_structure() {
        let f = NativeFunction::value("noop", |_, _| Ok(Value::Nil));
        let mut entries = IndexMap::new();
        entries.insert("n".to_owned(), Value::Number(1.0));
        entries.insert("f".to_owned(), f.clone());
        let original = Value::object(entries);
        let copy = original.deep_copy().unwrap();
        let Value::Object(copied) = &copy else { panic!() };
        let copied = copied.read();
        assert_eq!(copied.len(), 1);
        assert!(copied.contains_key("n"));

        let arr = Value::array(vec![Value::Number(1.0), f, Value::Number(2.0)]);
        let Value::Array(copied) = arr.deep_copy().unwrap() else {
            panic!()
        };
        assert_eq!(copied.read().len(), 2);
    }

    #[test]
    fn deep_copy_detects_cycles() {
        let inner = Value::array(vec![]);
        if let Value::Array(items) = &inner {
            items.write().push(inner.clone());
        }
        assert!(inner.deep_copy().is_err());
    }

    #[test]
    fn structural_equality_on_objects_is_order_insensitive() {
        let mut a = IndexMap::new();
        a.insert("x".to_owned(), Value::Number(1.0));
        a.insert("y".to_owned(), Value::Number(2.0));
        let mut b = IndexMap::new();
        b.insert("y".to_owned(), Value::Number(2.0));
        b.insert("x".to_owned(), Value::Number(1.0));
        assert!(Value::object(a).equals(&Value::object(b)));
    }

    #[test]
    fn display_quotes_strings_inside_containers_only() {
        let v = Value::array(vec![Value::string("a"), Value::Number(1.0)]);
        assert_eq!(v.display(), "[\"a\", 1]");
        assert_eq!(Value::string("a").display(), "a");
    }
}
