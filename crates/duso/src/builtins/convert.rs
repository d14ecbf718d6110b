//! Type inspection and conversion builtins.

use crate::value::Value;

use super::Builtins;

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("type", |_, args| {
        let value = args.required("type", 0, "value")?;
        Ok(Value::string(value.type_name()))
    });

    builtins.register("tonumber", |_, args| {
        let value = args.required("tonumber", 0, "value")?;
        let number = match &value {
            Value::Number(n) => Some(*n),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        };
        Ok(number.map_or(Value::Nil, Value::Number))
    });

    builtins.register("tostring", |_, args| {
        let value = args.required("tostring", 0, "value")?;
        Ok(Value::string(value.display()))
    });

    builtins.register("tobool", |_, args| {
        let value = args.required("tobool", 0, "value")?;
        Ok(Value::Bool(value.truthy()))
    });
}
