//! HTTP interface tests: request dispatch into handler scripts and the
//! outbound client capability.

use duso::{CollectStringPrint, Engine, HttpClient, HttpRequest, HttpResponse};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;

fn request(method: &str, path: &str, body: Option<&str>) -> HttpRequest {
    HttpRequest {
        method: method.to_owned(),
        path: path.to_owned(),
        query: IndexMap::new(),
        headers: IndexMap::new(),
        body: body.map(str::to_owned),
    }
}

#[test]
fn handler_response_comes_from_context_response() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("handler.duso"),
        "req = context().request()
         context().response({status = 201, body = 'saw ' + req.method + ' ' + req.path})",
    )
    .unwrap();
    let engine = Engine::builder().search_path(dir.path()).build();

    let response = engine
        .handle_http("handler", &request("POST", "/jobs", None))
        .unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(response.body, "saw POST /jobs");
}

#[test]
fn handler_exit_is_equivalent_to_response() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("handler.duso"),
        "exit({status = 404, body = 'missing'})",
    )
    .unwrap();
    let engine = Engine::builder().search_path(dir.path()).build();

    let response = engine.handle_http("handler", &request("GET", "/x", None)).unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.body, "missing");
}

#[test]
fn non_string_bodies_are_serialized_as_json() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("handler.duso"),
        "exit({status = 200, body = {ok = true, items = [1, 2]}})",
    )
    .unwrap();
    let engine = Engine::builder().search_path(dir.path()).build();

    let response = engine.handle_http("handler", &request("GET", "/", None)).unwrap();
    assert_eq!(response.body, "{\"ok\":true,\"items\":[1,2]}");
}

struct CannedClient;

impl HttpClient for CannedClient {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let mut headers = IndexMap::new();
        headers.insert("x-echo-method".to_owned(), request.method);
        Ok(HttpResponse {
            status: 200,
            headers,
            body: format!("fetched {}", request.path),
        })
    }
}

#[test]
fn http_builtin_uses_the_client_capability() {
    let output = CollectStringPrint::new();
    let engine = Engine::builder()
        .http_client(CannedClient)
        .print_writer(output.clone())
        .build();
    engine
        .eval(
            "r = http('https://example.com/data', 'post')
             print(r.status, r.body, r.headers['x-echo-method'])",
        )
        .unwrap();
    assert_eq!(output.output(), "200 fetched https://example.com/data POST\n");
}

#[test]
fn request_payload_shape_matches_the_contract() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("handler.duso"),
        "req = context().request()
         exit({status = 200, body = req.method + '|' + req.body + '|' + req.headers.accept})",
    )
    .unwrap();
    let engine = Engine::builder().search_path(dir.path()).build();

    let mut req = request("PUT", "/thing", Some("payload"));
    req.headers.insert("accept".to_owned(), "text/plain".to_owned());
    let response = engine.handle_http("handler", &req).unwrap();
    assert_eq!(response.body, "PUT|payload|text/plain");
}
