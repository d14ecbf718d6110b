//! Text builtins: case conversion, slicing, search, replace, templates.
//!
//! Positions and lengths are character offsets, not bytes. `contains` is
//! case-insensitive unless `case_sensitive` is set; `replace` and `find`
//! take literal patterns by default and regular expressions with
//! `regex = true`.

use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;

use crate::{
    args::ArgMap,
    error::{RunError, RunResult},
    eval::Evaluator,
    value::{NativeFunction, Value},
};

use super::Builtins;

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("length", |_, args| {
        let value = args.required("length", 0, "value")?;
        let length = match &value {
            Value::Str(s) => s.chars().count(),
            Value::Array(items) => items.read().len(),
            Value::Object(entries) => entries.read().len(),
            other => {
                return Err(RunError::type_error(format!(
                    "length() argument must be a string, array or object, got {}",
                    other.type_name()
                )));
            }
        };
        Ok(Value::from(length))
    });

    builtins.register("upper", |_, args| {
        let s = args.string("upper", 0, "value")?;
        Ok(Value::string(s.to_uppercase()))
    });

    builtins.register("lower", |_, args| {
        let s = args.string("lower", 0, "value")?;
        Ok(Value::string(s.to_lowercase()))
    });

    builtins.register("trim", |_, args| {
        let s = args.string("trim", 0, "value")?;
        Ok(Value::string(s.trim()))
    });

    builtins.register("substring", |_, args| {
        let s = args.string("substring", 0, "value")?;
        let start = args.integer("substring", 1, "start")?;
        let end = args.optional_integer("substring", 2, "end")?;
        Ok(Value::string(substring(&s, start, end)))
    });

    builtins.register("split", |_, args| {
        let s = args.string("split", 0, "value")?;
        let sep = args.string("split", 1, "separator")?;
        let parts: Vec<Value> = if sep.is_empty() {
            s.chars().map(|c| Value::string(c.to_string())).collect()
        } else {
            s.split(sep.as_ref()).map(Value::string).collect()
        };
        Ok(Value::array(parts))
    });

    builtins.register("join", |_, args| {
        let items = args.array("join", 0, "values")?;
        let sep = args.optional_string("join", 1, "separator")?.unwrap_or_else(|| "".into());
        let joined = items
            .read()
            .iter()
            .map(Value::display)
            .collect::<Vec<_>>()
            .join(&sep);
        Ok(Value::string(joined))
    });

    builtins.register("contains", |_, args| {
        let s = args.string("contains", 0, "value")?;
        let needle = args.string("contains", 1, "needle")?;
        let found = if args.flag(2, "case_sensitive", false) {
            s.contains(needle.as_ref())
        } else {
            s.to_lowercase().contains(&needle.to_lowercase())
        };
        Ok(Value::Bool(found))
    });

    builtins.register("replace", replace);
    builtins.register("find", find);
    builtins.register("template", template);
}

/// Character-offset substring with negative indices counting from the end.
fn substring(s: &str, start: i64, end: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let resolve = |i: i64| -> usize {
        let i = if i < 0 { len + i } else { i };
        i.clamp(0, len) as usize
    };
    let start = resolve(start);
    let end = resolve(end.unwrap_or(len));
    if start >= end {
        return String::new();
    }
    chars[start..end].iter().collect()
}

/// One match: character position, character length, matched text.
struct Match {
    byte_start: usize,
    byte_end: usize,
    text: String,
}

fn collect_matches(s: &str, pattern: &str, regex_mode: bool) -> RunResult<Vec<Match>> {
    if regex_mode {
        let re = Regex::new(pattern)
            .map_err(|err| RunError::type_error(format!("invalid pattern: {err}")))?;
        Ok(re
            .find_iter(s)
            .map(|m| Match {
                byte_start: m.start(),
                byte_end: m.end(),
                text: m.as_str().to_owned(),
            })
            .collect())
    } else if pattern.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(s.match_indices(pattern)
            .map(|(start, text)| Match {
                byte_start: start,
                byte_end: start + text.len(),
                text: text.to_owned(),
            })
            .collect())
    }
}

/// `replace(s, pattern, replacement, regex=false)` — the replacement may be
/// a string or a function receiving the matched text.
fn replace(evaluator: &mut Evaluator, args: ArgMap) -> RunResult<Value> {
    let s = args.string("replace", 0, "value")?;
    let pattern = args.string("replace", 1, "pattern")?;
    let replacement = args.required("replace", 2, "replacement")?;
    let regex_mode = args.flag(3, "regex", false);

    let matches = collect_matches(&s, &pattern, regex_mode)?;
    let mut out = String::with_capacity(s.len());
    let mut cursor = 0;
    for m in matches {
        out.push_str(&s[cursor..m.byte_start]);
        match &replacement {
            Value::Function(_) => {
                let replaced = evaluator
                    .call_function(&replacement, ArgMap::from_positional(vec![Value::string(m.text)]))?;
                out.push_str(&replaced.display());
            }
            other => out.push_str(&other.display()),
        }
        cursor = m.byte_end;
    }
    out.push_str(&s[cursor..]);
    Ok(Value::string(out))
}

/// `find(s, pattern, regex=false)` — returns `[{text, position, length}]`
/// with character offsets.
fn find(_evaluator: &mut Evaluator, args: ArgMap) -> RunResult<Value> {
    let s = args.string("find", 0, "value")?;
    let pattern = args.string("find", 1, "pattern")?;
    let regex_mode = args.flag(2, "regex", false);

    let matches = collect_matches(&s, &pattern, regex_mode)?;
    let descriptors = matches
        .into_iter()
        .map(|m| {
            let mut entry = IndexMap::new();
            let position = s[..m.byte_start].chars().count();
            let length = m.text.chars().count();
            entry.insert("text".to_owned(), Value::string(m.text));
            entry.insert("position".to_owned(), Value::from(position));
            entry.insert("length".to_owned(), Value::from(length));
            Value::object(entry)
        })
        .collect();
    Ok(Value::array(descriptors))
}

enum Segment {
    Text(String),
    Slot(String),
}

/// `template(s)` — compiles `{{name}}` placeholders (dotted paths allowed)
/// into a function of one object argument. Unbound names render empty.
fn template(_evaluator: &mut Evaluator, args: ArgMap) -> RunResult<Value> {
    let source = args.string("template", 0, "value")?;
    let mut segments = Vec::new();
    let mut rest: &str = &source;
    while let Some(open) = rest.find("{{") {
        if !rest[..open].is_empty() {
            segments.push(Segment::Text(rest[..open].to_owned()));
        }
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(RunError::type_error("template() placeholder is missing '}}'"));
        };
        segments.push(Segment::Slot(after[..close].trim().to_owned()));
        rest = &after[close + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_owned()));
    }

    let segments = Arc::new(segments);
    Ok(NativeFunction::value("template", move |_, args: ArgMap| {
        let bindings = args.optional(0, "values").unwrap_or(Value::Nil);
        let mut out = String::new();
        for segment in segments.iter() {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(path) => {
                    if let Some(value) = lookup_path(&bindings, path) {
                        out.push_str(&value.display());
                    }
                }
            }
        }
        Ok(Value::string(out))
    }))
}

fn lookup_path(bindings: &Value, path: &str) -> Option<Value> {
    let mut current = bindings.clone();
    for part in path.split('.') {
        let Value::Object(entries) = &current else {
            return None;
        };
        let next = entries.read().get(part).cloned()?;
        current = next;
    }
    match current {
        Value::Nil => None,
        value => Some(value),
    }
}
