//! Math builtins.
//!
//! `round` is half-away-from-zero; domain violations (square root of a
//! negative, log of a non-positive) raise arithmetic errors instead of
//! producing NaN, which would poison later comparisons.

use crate::{
    error::{RunError, RunResult},
    value::Value,
};

use super::Builtins;

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("abs", |_, args| Ok(Value::Number(args.number("abs", 0, "value")?.abs())));
    builtins.register("floor", |_, args| {
        Ok(Value::Number(args.number("floor", 0, "value")?.floor()))
    });
    builtins.register("ceil", |_, args| {
        Ok(Value::Number(args.number("ceil", 0, "value")?.ceil()))
    });
    builtins.register("round", |_, args| {
        Ok(Value::Number(args.number("round", 0, "value")?.round()))
    });

    builtins.register("sqrt", |_, args| {
        let n = args.number("sqrt", 0, "value")?;
        if n < 0.0 {
            return Err(RunError::arithmetic_error("sqrt() of a negative number"));
        }
        Ok(Value::Number(n.sqrt()))
    });

    builtins.register("pow", |_, args| {
        let base = args.number("pow", 0, "base")?;
        let exponent = args.number("pow", 1, "exponent")?;
        Ok(Value::Number(base.powf(exponent)))
    });

    builtins.register("min", |_, args| variadic_fold("min", args.positional(), f64::min));
    builtins.register("max", |_, args| variadic_fold("max", args.positional(), f64::max));

    builtins.register("clamp", |_, args| {
        let value = args.number("clamp", 0, "value")?;
        let low = args.number("clamp", 1, "low")?;
        let high = args.number("clamp", 2, "high")?;
        if low > high {
            return Err(RunError::arithmetic_error("clamp() low bound exceeds high bound"));
        }
        Ok(Value::Number(value.clamp(low, high)))
    });

    builtins.register("sin", |_, args| Ok(Value::Number(args.number("sin", 0, "value")?.sin())));
    builtins.register("cos", |_, args| Ok(Value::Number(args.number("cos", 0, "value")?.cos())));
    builtins.register("tan", |_, args| Ok(Value::Number(args.number("tan", 0, "value")?.tan())));
    builtins.register("asin", |_, args| inverse_trig("asin", args.number("asin", 0, "value")?, f64::asin));
    builtins.register("acos", |_, args| inverse_trig("acos", args.number("acos", 0, "value")?, f64::acos));
    builtins.register("atan", |_, args| Ok(Value::Number(args.number("atan", 0, "value")?.atan())));

    builtins.register("exp", |_, args| Ok(Value::Number(args.number("exp", 0, "value")?.exp())));

    builtins.register("ln", |_, args| {
        let n = args.number("ln", 0, "value")?;
        if n <= 0.0 {
            return Err(RunError::arithmetic_error("ln() of a non-positive number"));
        }
        Ok(Value::Number(n.ln()))
    });

    builtins.register("log", |_, args| {
        let n = args.number("log", 0, "value")?;
        let base = args.optional_number("log", 1, "base")?.unwrap_or(10.0);
        if n <= 0.0 || base <= 0.0 || base == 1.0 {
            return Err(RunError::arithmetic_error("log() domain error"));
        }
        Ok(Value::Number(n.log(base)))
    });

    builtins.register("pi", |_, _| Ok(Value::Number(std::f64::consts::PI)));

    builtins.register("random", |_, _| Ok(Value::Number(rand::random::<f64>())));
}

fn variadic_fold(func: &str, values: &[Value], fold: impl Fn(f64, f64) -> f64) -> RunResult<Value> {
    let mut numbers = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::Number(n) => numbers.push(*n),
            other => {
                return Err(RunError::type_error(format!(
                    "{func}() arguments must be numbers, got {}",
                    other.type_name()
                )));
            }
        }
    }
    let Some(first) = numbers.first().copied() else {
        return Err(RunError::arity_error(format!("{func}() requires at least one argument")));
    };
    Ok(Value::Number(numbers.into_iter().skip(1).fold(first, fold)))
}

fn inverse_trig(func: &str, n: f64, op: impl FnOnce(f64) -> f64) -> RunResult<Value> {
    if !(-1.0..=1.0).contains(&n) {
        return Err(RunError::arithmetic_error(format!("{func}() argument out of [-1, 1]")));
    }
    Ok(Value::Number(op(n)))
}
