//! HTTP interface shapes.
//!
//! The HTTP server and client live outside the core; this module fixes the
//! value shapes exchanged with them. Requests arrive as objects with
//! `{method, path, query, headers, body}`, responses leave as objects with
//! `{status, headers, body}`. The `http(...)` builtin delegates to the
//! [`HttpClient`] hook when the embedder provides one.

use indexmap::IndexMap;

use crate::{
    error::{RunError, RunResult},
    value::Value,
};

/// An outbound request handed to the host's HTTP client hook, or an inbound
/// request delivered to a handler script.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    /// Target URL for outbound calls, request path for inbound dispatch.
    pub path: String,
    pub query: IndexMap<String, String>,
    pub headers: IndexMap<String, String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
}

/// Host hook performing outbound HTTP calls on behalf of scripts.
pub trait HttpClient: Send + Sync {
    /// Sends the request and blocks until a response or transport error.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

impl HttpRequest {
    /// The request as the `{method, path, query, headers, body}` object a
    /// handler script receives via `context().request()`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut entries = IndexMap::new();
        entries.insert("method".to_owned(), Value::string(self.method.clone()));
        entries.insert("path".to_owned(), Value::string(self.path.clone()));
        entries.insert("query".to_owned(), string_map_value(&self.query));
        entries.insert("headers".to_owned(), string_map_value(&self.headers));
        entries.insert(
            "body".to_owned(),
            self.body.clone().map_or(Value::Nil, Value::string),
        );
        Value::object(entries)
    }
}

impl HttpResponse {
    /// The response as the `{status, headers, body}` object scripts see from
    /// the `http` builtin.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut entries = IndexMap::new();
        entries.insert("status".to_owned(), Value::Number(f64::from(self.status)));
        entries.insert("headers".to_owned(), string_map_value(&self.headers));
        entries.insert("body".to_owned(), Value::string(self.body.clone()));
        Value::object(entries)
    }

    /// Parses a handler's `{status, headers, body}` terminal value. A string
    /// body passes through; any other value is serialized as JSON.
    pub fn from_value(value: &Value) -> RunResult<Self> {
        let Value::Object(entries) = value else {
            return Err(RunError::type_error(format!(
                "http response must be an object, got {}",
                value.type_name()
            )));
        };
        let entries = entries.read();
        let status = match entries.get("status") {
            None => 200,
            Some(value) => value
                .integer()
                .and_then(|status| u16::try_from(status).ok())
                .ok_or_else(|| RunError::type_error("http response 'status' must be an integer"))?,
        };
        let mut headers = IndexMap::new();
        if let Some(Value::Object(header_entries)) = entries.get("headers") {
            for (key, value) in header_entries.read().iter() {
                headers.insert(key.clone(), value.display());
            }
        }
        let body = match entries.get("body") {
            None | Some(Value::Nil) => String::new(),
            Some(Value::Str(s)) => s.to_string(),
            Some(other) => crate::builtins::json::to_json_string(other, None)?,
        };
        Ok(Self { status, headers, body })
    }
}

fn string_map_value(map: &IndexMap<String, String>) -> Value {
    let mut entries = IndexMap::new();
    for (key, value) in map {
        entries.insert(key.clone(), Value::string(value.clone()));
    }
    Value::object(entries)
}
