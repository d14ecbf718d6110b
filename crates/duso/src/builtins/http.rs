//! The `http` builtin, delegating to the host's HTTP-client capability.

use indexmap::IndexMap;

use crate::{
    error::{RunError, RunResult},
    http::HttpRequest,
    value::Value,
};

use super::Builtins;

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("http", |evaluator, args| {
        let url = args.string("http", 0, "url")?;
        let method = args
            .optional_string("http", 1, "method")?
            .map_or_else(|| "GET".to_owned(), |m| m.to_uppercase());
        let headers = string_map(args.named_value("headers"))?;
        let query = string_map(args.named_value("query"))?;
        let body = match args.named_value("body") {
            None | Some(Value::Nil) => None,
            Some(Value::Str(s)) => Some(s.to_string()),
            Some(other) => Some(super::json::to_json_string(&other, None)?),
        };

        let Some(client) = evaluator.runtime.http.clone() else {
            return Err(RunError::capability_error("no HTTP client capability configured"));
        };
        if evaluator.cancel_token().is_cancelled() {
            return Err(RunError::cancelled());
        }
        let response = client
            .send(HttpRequest {
                method,
                path: url.to_string(),
                query,
                headers,
                body,
            })
            .map_err(|err| RunError::capability_error(format!("http request failed: {err}")))?;
        if evaluator.cancel_token().is_cancelled() {
            return Err(RunError::cancelled());
        }
        Ok(response.to_value())
    });
}

fn string_map(value: Option<Value>) -> RunResult<IndexMap<String, String>> {
    let mut out = IndexMap::new();
    match value {
        None | Some(Value::Nil) => {}
        Some(Value::Object(entries)) => {
            for (key, entry) in entries.read().iter() {
                out.insert(key.clone(), entry.display());
            }
        }
        Some(other) => {
            return Err(RunError::type_error(format!(
                "http() headers/query must be objects, got {}",
                other.type_name()
            )));
        }
    }
    Ok(out)
}
