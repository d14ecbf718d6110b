//! Module resolution, caching, circular detection, and layered sources.

use std::time::{Duration, SystemTime};

use duso::{CollectStringPrint, Engine, ErrorKind, Value};
use pretty_assertions::assert_eq;

fn write(dir: &std::path::Path, name: &str, source: &str) {
    std::fs::write(dir.join(name), source).unwrap();
}

fn engine_in(dir: &std::path::Path) -> (Engine, CollectStringPrint) {
    let output = CollectStringPrint::new();
    let engine = Engine::builder()
        .search_path(dir)
        .print_writer(output.clone())
        .build();
    (engine, output)
}

#[test]
fn require_caches_the_exported_value() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "m.duso",
        "var ctr = datastore('t')
         ctr.increment('n', 1)
         return 42",
    );
    let (engine, output) = engine_in(dir.path());
    engine
        .eval(
            "a = require('m')
             b = require('m')
             print(a, b, datastore('t').get('n'))",
        )
        .unwrap();
    assert_eq!(output.output(), "42 42 1\n");
}

#[test]
fn circular_requires_are_rejected_with_both_paths() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.duso", "require('b')");
    write(dir.path(), "b.duso", "require('a')");
    let (engine, _) = engine_in(dir.path());
    let err = engine.eval("require('a')").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cycle);
    assert!(err.message().contains("a.duso"));
    assert!(err.message().contains("b.duso"));
}

#[test]
fn require_runs_in_an_isolated_scope() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "leaky.duso", "var private = 99 return 1");
    let (engine, _) = engine_in(dir.path());
    let err = engine.eval("require('leaky') print(private)").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameResolution);
}

#[test]
fn include_executes_in_the_caller_environment_every_time() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "inc.duso", "hits = hits + 1 var local_name = 'seen'");
    let (engine, output) = engine_in(dir.path());
    engine
        .eval(
            "hits = 0
             include('inc')
             include('inc')
             print(hits, local_name)",
        )
        .unwrap();
    assert_eq!(output.output(), "2 seen\n");
}

#[test]
fn relative_requires_resolve_against_the_requiring_script() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("lib")).unwrap();
    write(dir.path(), "lib/helper.duso", "return 'helped'");
    write(dir.path(), "lib/entry.duso", "return require('helper')");
    let (engine, output) = engine_in(dir.path());
    engine.eval("print(require('lib/entry'))").unwrap();
    assert_eq!(output.output(), "helped\n");
}

#[test]
fn editing_a_source_file_invalidates_the_parse_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("m.duso");
    write(dir.path(), "m.duso", "return 1");
    let (engine, _) = engine_in(dir.path());
    assert_eq!(engine.eval("require('m')").unwrap(), Value::Number(1.0));

    std::fs::write(&path, "return 2").unwrap();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();

    engine.clear_module_cache();
    assert_eq!(engine.eval("require('m')").unwrap(), Value::Number(2.0));
}

#[test]
fn embedded_modules_resolve_through_the_embed_prefix() {
    let engine = Engine::builder().embed("lib/util.duso", "return 5").build();
    assert_eq!(engine.eval("require('EMBED/lib/util')").unwrap(), Value::Number(5.0));
}

#[test]
fn store_modules_come_from_the_vfs_namespace() {
    let engine = Engine::builder().build();
    engine
        .datastore("vfs")
        .set("mod.duso", &Value::string("return 7"))
        .unwrap();
    assert_eq!(engine.eval("require('STORE/mod')").unwrap(), Value::Number(7.0));
}

#[test]
fn vfs_writes_invalidate_store_parse_cache_entries() {
    let engine = Engine::builder().build();
    let vfs = engine.datastore("vfs");
    vfs.set("mod.duso", &Value::string("return 1")).unwrap();
    assert_eq!(engine.eval("require('STORE/mod')").unwrap(), Value::Number(1.0));

    vfs.set("mod.duso", &Value::string("return 2")).unwrap();
    engine.clear_module_cache();
    assert_eq!(engine.eval("require('STORE/mod')").unwrap(), Value::Number(2.0));
}

#[test]
fn missing_modules_are_name_errors() {
    let engine = Engine::builder().build();
    let err = engine.eval("require('does-not-exist')").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameResolution);
    assert!(err.message().contains("not found"));
}

#[test]
fn no_files_policy_denies_filesystem_resolution_but_keeps_virtual_sources() {
    let engine = Engine::builder()
        .no_files()
        .embed("safe.duso", "return 'embedded'")
        .build();
    assert_eq!(
        engine.eval("require('EMBED/safe')").unwrap(),
        Value::string("embedded")
    );
    let err = engine.eval("require('anything')").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HostCapability);
}

#[test]
fn run_resolves_script_paths_like_modules() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "worker.duso", "exit(context().request() + 1)");
    let (engine, output) = engine_in(dir.path());
    engine.eval("print(run('worker', 41))").unwrap();
    assert_eq!(output.output(), "42\n");
}

#[test]
fn run_path_executes_a_script_with_payload() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.duso", "exit(context().request().x * 2)");
    let (engine, _) = engine_in(dir.path());
    let mut payload = indexmap::IndexMap::new();
    payload.insert("x".to_owned(), Value::Number(21.0));
    let result = engine.run_path("main", Some(Value::object(payload))).unwrap();
    assert_eq!(result, Value::Number(42.0));
}
