//! Control and miscellaneous builtins: `exit`, `throw`, `parse`, `print`,
//! `input`, `uuid`, `env`.

use std::sync::Arc;

use crate::{
    error::{ErrorKind, ErrorValue, RunError},
    parse::parse_program,
    value::{CodeValue, Value},
};

use super::Builtins;

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("exit", |_, args| {
        Err(RunError::Exit(args.optional(0, "value").unwrap_or(Value::Nil)))
    });

    builtins.register("throw", |_, args| {
        let value = args.required("throw", 0, "value")?;
        match value {
            // Re-raising an error value preserves its kind and payload.
            Value::Error(err) => Err(RunError::Raise(Box::new(err.as_ref().clone()))),
            Value::Str(message) => Err(RunError::raise(ErrorKind::UserThrown, message.to_string())),
            other => {
                let mut err = ErrorValue::new(ErrorKind::UserThrown, other.display());
                err.payload = Some(other);
                Err(RunError::Raise(Box::new(err)))
            }
        }
    });

    // `parse` never raises: failures come back as an error value.
    builtins.register("parse", |_, args| {
        let source = args.string("parse", 0, "source")?;
        let name = args.optional_string("parse", 1, "name")?;
        // Metadata is deep-copied so the code value stays self-contained.
        let meta = match args.named_value("meta") {
            None | Some(Value::Nil) => None,
            Some(meta) => Some(meta.deep_copy()?),
        };
        match parse_program(&source) {
            Ok(program) => Ok(Value::Code(Arc::new(CodeValue {
                source,
                program: Arc::new(program),
                name: name.map(|n| n.to_string()),
                meta,
            }))),
            Err(err) => {
                let mut value = ErrorValue::new(ErrorKind::Parse, err.message);
                value.pos = Some(err.pos);
                Ok(Value::Error(Arc::new(value)))
            }
        }
    });

    builtins.register("print", |evaluator, args| {
        let mut print = evaluator.runtime.print.lock();
        for (i, value) in args.positional().iter().enumerate() {
            if i > 0 {
                print.push(' ');
            }
            print.write(value.display().into());
        }
        print.push('\n');
        Ok(Value::Nil)
    });

    builtins.register("input", |evaluator, args| {
        if let Some(prompt) = args.optional_string("input", 0, "prompt")? {
            let mut print = evaluator.runtime.print.lock();
            print.write(prompt.to_string().into());
        }
        let Some(reader) = evaluator.runtime.input.clone() else {
            return Err(RunError::capability_error("no input capability configured"));
        };
        let line = reader
            .read_line()
            .map_err(|err| RunError::capability_error(format!("input failed: {err}")))?;
        Ok(Value::string(line))
    });

    builtins.register("uuid", |_, _| Ok(Value::string(uuid::Uuid::new_v4().to_string())));

    builtins.register("env", |_, args| {
        let name = args.string("env", 0, "name")?;
        Ok(std::env::var(name.as_ref()).map_or(Value::Nil, Value::string))
    });
}
