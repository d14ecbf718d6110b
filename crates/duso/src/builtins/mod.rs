//! Builtin functions and their registry.
//!
//! The registry maps names to native functions receiving the unified
//! positional+named argument map. It is populated once at engine
//! construction — embedders may add their own builtins through the engine
//! builder — and is immutable afterwards; each unit's root scope is seeded
//! from it, so scripts can shadow a builtin without affecting other units.

pub(crate) mod collections;
pub(crate) mod concurrency;
pub(crate) mod control;
pub(crate) mod convert;
pub(crate) mod http;
pub(crate) mod json;
pub(crate) mod math;
pub(crate) mod text;
pub(crate) mod time;

use indexmap::IndexMap;

use crate::{
    args::ArgMap,
    error::RunResult,
    eval::Evaluator,
    modules,
    scope::Scope,
    value::{NativeFunction, Value},
};

/// Name → native-function table attached to every root environment.
pub struct Builtins {
    entries: IndexMap<String, Value>,
}

impl Builtins {
    /// The standard library: every builtin the language specifies.
    #[must_use]
    pub fn standard() -> Self {
        let mut builtins = Self {
            entries: IndexMap::new(),
        };
        text::register(&mut builtins);
        collections::register(&mut builtins);
        math::register(&mut builtins);
        json::register(&mut builtins);
        convert::register(&mut builtins);
        time::register(&mut builtins);
        control::register(&mut builtins);
        concurrency::register(&mut builtins);
        http::register(&mut builtins);
        builtins.register("require", |evaluator, args| {
            let name = args.string("require", 0, "name")?;
            modules::require(evaluator, &name)
        });
        builtins
    }

    /// Registers (or replaces) a builtin under `name`.
    pub fn register(
        &mut self,
        name: &str,
        func: impl Fn(&mut Evaluator, ArgMap) -> RunResult<Value> + Send + Sync + 'static,
    ) {
        self.entries.insert(name.to_owned(), NativeFunction::value(name, func));
    }

    /// Seeds every builtin into a fresh root scope.
    pub(crate) fn seed(&self, root: &Scope) {
        for (name, value) in &self.entries {
            root.declare(name, value.clone());
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}
