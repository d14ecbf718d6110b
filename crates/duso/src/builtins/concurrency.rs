//! Concurrency and coordination builtins: `run`, `spawn`, `parallel`,
//! `context`, `datastore`.
//!
//! The datastore builtin returns a handle object whose entries are native
//! closures bound to the named namespace, so `s.set(...)`/`s.wait(...)` read
//! naturally while every operation goes through the namespace's atomic
//! contract.

use std::{path::PathBuf, sync::Arc, time::Duration};

use indexmap::IndexMap;

use crate::{
    args::ArgMap,
    context::current_context,
    datastore::{Namespace, PersistConfig},
    error::{RunError, RunResult},
    eval::Evaluator,
    tasks,
    value::{NativeFunction, Value},
};

use super::Builtins;

/// Snapshot interval applied when persistence is configured without one.
const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(5);

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("run", |evaluator, args| tasks::run(evaluator, &args));
    builtins.register("spawn", |evaluator, args| tasks::spawn(evaluator, &args));
    builtins.register("parallel", |evaluator, args| tasks::parallel(evaluator, &args));
    builtins.register("context", |_, _| Ok(context_value()));
    builtins.register("datastore", datastore);
}

/// `context()` — nil outside dispatched units, else a handle exposing
/// `request`, `callstack`, and `response`.
fn context_value() -> Value {
    let Some(ctx) = current_context() else {
        return Value::Nil;
    };

    let mut entries = IndexMap::new();
    entries.insert("kind".to_owned(), Value::string(ctx.kind.to_string()));

    let payload = ctx.payload.clone();
    entries.insert(
        "request".to_owned(),
        NativeFunction::value("request", move |_, _| Ok(payload.clone())),
    );

    let chain = ctx.chain.clone();
    entries.insert(
        "callstack".to_owned(),
        NativeFunction::value("callstack", move |_, _| {
            let frames = chain
                .iter()
                .map(|frame| {
                    let mut entry = IndexMap::new();
                    entry.insert(
                        "path".to_owned(),
                        frame.path.clone().map_or(Value::Nil, Value::string),
                    );
                    entry.insert("line".to_owned(), Value::Number(f64::from(frame.line)));
                    entry.insert("kind".to_owned(), Value::string(frame.kind.to_string()));
                    Value::object(entry)
                })
                .collect();
            Ok(Value::array(frames))
        }),
    );

    // Responding to an HTTP dispatch is exiting with the response object.
    entries.insert(
        "response".to_owned(),
        NativeFunction::value("response", move |_, args: ArgMap| {
            let response = args.required("response", 0, "response")?;
            Err(RunError::Exit(response))
        }),
    );

    Value::object(entries)
}

/// `datastore(name[, file=…, interval_s=…])` — namespace handle, optionally
/// attaching snapshot persistence.
fn datastore(evaluator: &mut Evaluator, args: ArgMap) -> RunResult<Value> {
    let name = args.string("datastore", 0, "name")?;
    let namespace = evaluator.runtime.datastores.namespace(&name);

    if let Some(file) = args.optional_string("datastore", 1, "file")? {
        evaluator.runtime.policy.check_files("datastore persistence")?;
        let interval = args
            .optional_number("datastore", 2, "interval_s")?
            .map_or(DEFAULT_PERSIST_INTERVAL, Duration::from_secs_f64);
        evaluator.runtime.datastores.configure_persistence(
            &name,
            PersistConfig {
                path: PathBuf::from(file.as_ref()),
                interval,
            },
        )?;
    }

    Ok(handle_value(&namespace))
}

fn handle_value(namespace: &Arc<Namespace>) -> Value {
    let mut entries = IndexMap::new();
    entries.insert("name".to_owned(), Value::string(namespace.name()));

    let ns = namespace.clone();
    entries.insert(
        "set".to_owned(),
        NativeFunction::value("set", move |_, args: ArgMap| {
            let key = args.string("set", 0, "key")?;
            let value = args.required("set", 1, "value")?;
            ns.set(&key, &value)?;
            Ok(Value::Nil)
        }),
    );

    let ns = namespace.clone();
    entries.insert(
        "get".to_owned(),
        NativeFunction::value("get", move |_, args: ArgMap| {
            let key = args.string("get", 0, "key")?;
            ns.get(&key)
        }),
    );

    let ns = namespace.clone();
    entries.insert(
        "increment".to_owned(),
        NativeFunction::value("increment", move |_, args: ArgMap| {
            let key = args.string("increment", 0, "key")?;
            let delta = args.optional_number("increment", 1, "delta")?.unwrap_or(1.0);
            ns.increment(&key, delta).map(Value::Number)
        }),
    );

    let ns = namespace.clone();
    entries.insert(
        "push".to_owned(),
        NativeFunction::value("push", move |_, args: ArgMap| {
            let key = args.string("push", 0, "key")?;
            let value = args.required("push", 1, "value")?;
            ns.push(&key, &value).map(Value::from)
        }),
    );

    let ns = namespace.clone();
    entries.insert(
        "delete".to_owned(),
        NativeFunction::value("delete", move |_, args: ArgMap| {
            let key = args.string("delete", 0, "key")?;
            Ok(Value::Bool(ns.delete(&key)))
        }),
    );

    let ns = namespace.clone();
    entries.insert(
        "clear".to_owned(),
        NativeFunction::value("clear", move |_, _| {
            ns.clear();
            Ok(Value::Nil)
        }),
    );

    let ns = namespace.clone();
    entries.insert(
        "wait".to_owned(),
        NativeFunction::value("wait", move |evaluator: &mut Evaluator, args: ArgMap| {
            let key = args.string("wait", 0, "key")?;
            let target = args.required("wait", 1, "target")?;
            let timeout = args
                .optional_number("wait", 2, "timeout")?
                .map(Duration::from_secs_f64);
            ns.wait(&key, &target, timeout, evaluator.cancel_token())
                .map(Value::Bool)
        }),
    );

    let ns = namespace.clone();
    entries.insert(
        "wait_for".to_owned(),
        NativeFunction::value("wait_for", move |evaluator: &mut Evaluator, args: ArgMap| {
            let key = args.string("wait_for", 0, "key")?;
            let predicate = args.function("wait_for", 1, "predicate")?;
            let timeout = args
                .optional_number("wait_for", 2, "timeout")?
                .map(Duration::from_secs_f64);
            let callee = Value::Function(predicate);
            let cancel = evaluator.cancel_token().clone();
            ns.wait_for(&key, timeout, &cancel, |current| {
                evaluator
                    .call_function(&callee, ArgMap::from_positional(vec![current]))
                    .map(|verdict| verdict.truthy())
            })
            .map(Value::Bool)
        }),
    );

    Value::object(entries)
}
