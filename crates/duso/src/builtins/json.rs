//! JSON builtins and the conversion shared with datastore snapshots.
//!
//! `json_parse` is strict; `json_format` renders nil as null, errors on
//! cycles (kind `Cycle`), and refuses functions, code, and error values —
//! none of which have a JSON form.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::{
    error::{RunError, RunResult},
    value::Value,
};

use super::Builtins;

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("json_parse", |_, args| {
        let text = args.string("json_parse", 0, "text")?;
        from_json_str(&text)
    });

    builtins.register("json_format", |_, args| {
        let value = args.required("json_format", 0, "value")?;
        let indent = args.optional_integer("json_format", 1, "indent")?;
        let indent = match indent {
            Some(n) if n > 0 => Some(n as usize),
            _ => None,
        };
        Ok(Value::string(to_json_string(&value, indent)?))
    });
}

/// Renders a value tree as JSON, optionally pretty-printed with `indent`
/// spaces.
pub(crate) fn to_json_string(value: &Value, indent: Option<usize>) -> RunResult<String> {
    let format_error = |err: serde_json::Error| RunError::type_error(format!("cannot format JSON: {err}"));
    let json = to_json(value, &mut Vec::new())?;
    match indent {
        None => serde_json::to_string(&json).map_err(format_error),
        Some(width) => {
            let indent_bytes = vec![b' '; width];
            let mut out = Vec::new();
            {
                let formatter = PrettyFormatter::with_indent(&indent_bytes);
                let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
                json.serialize(&mut serializer).map_err(format_error)?;
            }
            Ok(String::from_utf8(out).expect("serde_json emits UTF-8"))
        }
    }
}

fn to_json(value: &Value, seen: &mut Vec<usize>) -> RunResult<serde_json::Value> {
    match value {
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => {
            // Integer-valued doubles serialize without a decimal point.
            if let Some(i) = value.integer() {
                Ok(serde_json::Value::Number(i.into()))
            } else {
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| RunError::type_error(format!("{n} has no JSON representation")))
            }
        }
        Value::Str(s) => Ok(serde_json::Value::String(s.to_string())),
        Value::Array(items) => {
            let marker = std::sync::Arc::as_ptr(items) as usize;
            if seen.contains(&marker) {
                return Err(RunError::cycle_error("cannot serialize a cyclic array"));
            }
            seen.push(marker);
            let mut out = Vec::new();
            for item in items.read().iter() {
                out.push(to_json(item, seen)?);
            }
            seen.pop();
            Ok(serde_json::Value::Array(out))
        }
        Value::Object(entries) => {
            let marker = std::sync::Arc::as_ptr(entries) as usize;
            if seen.contains(&marker) {
                return Err(RunError::cycle_error("cannot serialize a cyclic object"));
            }
            seen.push(marker);
            let mut out = serde_json::Map::new();
            for (key, entry) in entries.read().iter() {
                out.insert(key.clone(), to_json(entry, seen)?);
            }
            seen.pop();
            Ok(serde_json::Value::Object(out))
        }
        Value::Function(_) | Value::Code(_) | Value::Error(_) => Err(RunError::type_error(format!(
            "{} values are not JSON-serializable",
            value.type_name()
        ))),
    }
}

/// Strict JSON → value tree; object key order is preserved.
pub(crate) fn from_json_str(text: &str) -> RunResult<Value> {
    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|err| RunError::type_error(format!("invalid JSON: {err}")))?;
    Ok(from_json(parsed))
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => Value::array(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(entries) => {
            let mut out = indexmap::IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                out.insert(key, from_json(value));
            }
            Value::object(out)
        }
    }
}
