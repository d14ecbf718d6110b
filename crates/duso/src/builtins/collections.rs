//! Collection builtins.
//!
//! `push`/`pop`/`shift`/`unshift` mutate the array in place; `sort`, `map`,
//! `filter`, and `reduce` are non-mutating and return new arrays. `sort` is a
//! stable merge sort so a comparator error can propagate cleanly mid-sort.

use crate::{
    args::ArgMap,
    ast::Pos,
    error::{RunError, RunResult},
    eval::{Evaluator, compare_values},
    value::Value,
};

use super::Builtins;

/// Upper bound on `range()` output; anything larger is a programming error.
const MAX_RANGE_ITEMS: i64 = 10_000_000;

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("push", |_, args| {
        let items = args.array("push", 0, "array")?;
        let value = args.required("push", 1, "value")?;
        let mut items = items.write();
        items.push(value);
        Ok(Value::from(items.len()))
    });

    builtins.register("pop", |_, args| {
        let items = args.array("pop", 0, "array")?;
        Ok(items.write().pop().unwrap_or(Value::Nil))
    });

    builtins.register("shift", |_, args| {
        let items = args.array("shift", 0, "array")?;
        let mut items = items.write();
        if items.is_empty() {
            Ok(Value::Nil)
        } else {
            Ok(items.remove(0))
        }
    });

    builtins.register("unshift", |_, args| {
        let items = args.array("unshift", 0, "array")?;
        let value = args.required("unshift", 1, "value")?;
        let mut items = items.write();
        items.insert(0, value);
        Ok(Value::from(items.len()))
    });

    builtins.register("keys", |_, args| {
        let value = args.required("keys", 0, "value")?;
        match &value {
            Value::Object(entries) => Ok(Value::array(
                entries.read().keys().map(|k| Value::string(k.clone())).collect(),
            )),
            Value::Array(items) => Ok(Value::array((0..items.read().len()).map(Value::from).collect())),
            other => Err(RunError::type_error(format!(
                "keys() argument must be an object or array, got {}",
                other.type_name()
            ))),
        }
    });

    builtins.register("values", |_, args| {
        let value = args.required("values", 0, "value")?;
        match &value {
            Value::Object(entries) => Ok(Value::array(entries.read().values().cloned().collect())),
            Value::Array(items) => Ok(Value::array(items.read().clone())),
            other => Err(RunError::type_error(format!(
                "values() argument must be an object or array, got {}",
                other.type_name()
            ))),
        }
    });

    builtins.register("sort", sort);
    builtins.register("map", map);
    builtins.register("filter", filter);
    builtins.register("reduce", reduce);
    builtins.register("range", range);

    builtins.register("deep_copy", |_, args| {
        let value = args.required("deep_copy", 0, "value")?;
        value.deep_copy()
    });
}

/// `sort(arr[, comparator])` — stable, non-mutating. The comparator returns
/// truthy when its first argument sorts before the second.
fn sort(evaluator: &mut Evaluator, args: ArgMap) -> RunResult<Value> {
    let items = args.array("sort", 0, "array")?;
    let comparator = args.optional_function("sort", 1, "comparator")?;
    let snapshot = items.read().clone();

    let mut before = |evaluator: &mut Evaluator, a: &Value, b: &Value| -> RunResult<bool> {
        match &comparator {
            Some(f) => {
                let callee = Value::Function(f.clone());
                let verdict = evaluator
                    .call_function(&callee, ArgMap::from_positional(vec![a.clone(), b.clone()]))?;
                Ok(verdict.truthy())
            }
            None => Ok(compare_values(a, b, Pos::default())? == std::cmp::Ordering::Less),
        }
    };
    let sorted = merge_sort(evaluator, snapshot, &mut before)?;
    Ok(Value::array(sorted))
}

fn merge_sort(
    evaluator: &mut Evaluator,
    items: Vec<Value>,
    before: &mut impl FnMut(&mut Evaluator, &Value, &Value) -> RunResult<bool>,
) -> RunResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut items = items;
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(evaluator, items, before)?;
    let right = merge_sort(evaluator, right, before)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        // Stability: take from the left unless the right strictly sorts first.
        if before(evaluator, b, a)? {
            merged.push(right.next().expect("peeked"));
        } else {
            merged.push(left.next().expect("peeked"));
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

fn map(evaluator: &mut Evaluator, args: ArgMap) -> RunResult<Value> {
    let items = args.array("map", 0, "array")?;
    let f = args.function("map", 1, "function")?;
    let callee = Value::Function(f);
    let snapshot = items.read().clone();
    let mut mapped = Vec::with_capacity(snapshot.len());
    for (index, item) in snapshot.into_iter().enumerate() {
        let value =
            evaluator.call_function(&callee, ArgMap::from_positional(vec![item, Value::from(index)]))?;
        mapped.push(value);
    }
    Ok(Value::array(mapped))
}

fn filter(evaluator: &mut Evaluator, args: ArgMap) -> RunResult<Value> {
    let items = args.array("filter", 0, "array")?;
    let f = args.function("filter", 1, "function")?;
    let callee = Value::Function(f);
    let snapshot = items.read().clone();
    let mut kept = Vec::new();
    for (index, item) in snapshot.into_iter().enumerate() {
        let verdict = evaluator.call_function(
            &callee,
            ArgMap::from_positional(vec![item.clone(), Value::from(index)]),
        )?;
        if verdict.truthy() {
            kept.push(item);
        }
    }
    Ok(Value::array(kept))
}

fn reduce(evaluator: &mut Evaluator, args: ArgMap) -> RunResult<Value> {
    let items = args.array("reduce", 0, "array")?;
    let f = args.function("reduce", 1, "function")?;
    let callee = Value::Function(f);
    let snapshot = items.read().clone();

    let mut iter = snapshot.into_iter().enumerate();
    let mut acc = match args.optional(2, "initial") {
        Some(initial) => initial,
        None => match iter.next() {
            Some((_, first)) => first,
            None => return Ok(Value::Nil),
        },
    };
    for (index, item) in iter {
        acc = evaluator.call_function(
            &callee,
            ArgMap::from_positional(vec![acc, item, Value::from(index)]),
        )?;
    }
    Ok(acc)
}

/// `range(end)` or `range(start, end[, step])` — half-open, integer steps.
fn range(_evaluator: &mut Evaluator, args: ArgMap) -> RunResult<Value> {
    let first = args.integer("range", 0, "start")?;
    let (start, end) = match args.optional_integer("range", 1, "end")? {
        Some(end) => (first, end),
        None => (0, first),
    };
    let step = args.optional_integer("range", 2, "step")?.unwrap_or(1);
    if step == 0 {
        return Err(RunError::bounds_error("range() step must not be zero"));
    }
    let count = if (step > 0 && start >= end) || (step < 0 && start <= end) {
        0
    } else {
        let span = (i128::from(end) - i128::from(start)).abs();
        let step_size = i128::from(step.abs());
        (span + step_size - 1) / step_size
    };
    if count > i128::from(MAX_RANGE_ITEMS) {
        return Err(RunError::bounds_error(format!(
            "range() would produce {count} items (limit {MAX_RANGE_ITEMS})"
        )));
    }
    let mut items = Vec::with_capacity(count as usize);
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        items.push(Value::Number(i as f64));
        i += step;
    }
    Ok(Value::array(items))
}
