//! Coordination-store tests: isolation, atomicity, waits, and the spawn
//! worker-barrier pattern.

use std::time::Duration;

use duso::{CollectStringPrint, Engine, Value};
use pretty_assertions::assert_eq;

fn engine_with_output() -> (Engine, CollectStringPrint) {
    let output = CollectStringPrint::new();
    let engine = Engine::builder().print_writer(output.clone()).build();
    (engine, output)
}

#[test]
fn worker_barrier_with_spawned_units() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "s = datastore('t')
             s.set('done', 0)
             for i = 1, 5 do
                 spawn(parse(\"datastore('t').increment('done', 1)\"), nil)
             end
             s.wait('done', 5)
             print(s.get('done'))",
        )
        .unwrap();
    assert_eq!(output.output(), "5\n");
}

#[test]
fn stored_values_are_isolated_from_script_mutations() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "s = datastore('iso')
             a = [1, 2]
             s.set('k', a)
             push(a, 3)
             got = s.get('k')
             push(got, 99)
             print(length(s.get('k')), length(a), length(got))",
        )
        .unwrap();
    assert_eq!(output.output(), "2 3 3\n");
}

#[test]
fn host_side_concurrent_increments_serialize() {
    let engine = Engine::builder().build();
    let store = engine.datastore("counters");
    std::thread::scope(|scope| {
        for _ in 0..8 {
            let store = engine.datastore("counters");
            scope.spawn(move || {
                for _ in 0..50 {
                    store.increment("n", 1.0).unwrap();
                }
            });
        }
    });
    assert_eq!(store.get("n").unwrap(), Value::Number(400.0));
}

#[test]
fn wait_issued_before_set_unblocks() {
    let engine = Engine::builder().build();
    let store = engine.datastore("signals");
    std::thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            let engine = &engine;
            engine
                .datastore("signals")
                .wait("go", &Value::Bool(true), Some(Duration::from_secs(5)))
        });
        std::thread::sleep(Duration::from_millis(50));
        store.set("go", &Value::Bool(true)).unwrap();
        assert!(waiter.join().unwrap().unwrap());
    });
}

#[test]
fn wait_times_out_without_a_matching_set() {
    let engine = Engine::builder().build();
    let store = engine.datastore("signals");
    let start = std::time::Instant::now();
    let satisfied = store
        .wait("missing", &Value::Number(1.0), Some(Duration::from_millis(80)))
        .unwrap();
    assert!(!satisfied);
    assert!(start.elapsed() >= Duration::from_millis(80));
}

#[test]
fn script_wait_returns_immediately_when_already_satisfied() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "s = datastore('w')
             s.set('k', 'ready')
             print(s.wait('k', 'ready'), s.wait('k', 'other', 0.05))",
        )
        .unwrap();
    assert_eq!(output.output(), "true false\n");
}

#[test]
fn wait_for_predicate_sees_updates() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "s = datastore('p')
             s.set('level', 0)
             spawn(parse(\"sleep(0.05) datastore('p').set('level', 9)\"), nil)
             ok = s.wait_for('level', function(v) return v > 5 end, 5)
             print(ok, s.get('level'))",
        )
        .unwrap();
    assert_eq!(output.output(), "true 9\n");
}

#[test]
fn increment_and_push_are_atomic_from_scripts() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "s = datastore('log')
             for i = 1, 4 do
                 spawn(parse(\"datastore('log').push('events', 'x') datastore('log').increment('count', 1)\"), nil)
             end
             s.wait('count', 4)
             print(length(s.get('events')))",
        )
        .unwrap();
    assert_eq!(output.output(), "4\n");
}

#[test]
fn functions_do_not_cross_the_store() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "s = datastore('fns')
             s.set('obj', {n = 1, f = function() return 2 end})
             got = s.get('obj')
             print(got.n, got.f == nil)",
        )
        .unwrap();
    assert_eq!(output.output(), "1 true\n");
}

#[test]
fn delete_and_clear_remove_keys() {
    let engine = Engine::builder().build();
    let store = engine.datastore("d");
    store.set("a", &Value::Number(1.0)).unwrap();
    store.set("b", &Value::Number(2.0)).unwrap();
    assert!(store.delete("a"));
    assert!(!store.delete("a"));
    assert_eq!(store.get("a").unwrap(), Value::Nil);
    store.clear();
    assert_eq!(store.get("b").unwrap(), Value::Nil);
}

#[test]
fn snapshot_persistence_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    {
        let engine = Engine::builder().build();
        engine
            .persist_namespace("saved", &path, Duration::from_secs(60))
            .unwrap();
        let store = engine.datastore("saved");
        store.set("answer", &Value::Number(42.0)).unwrap();
        store.set("tags", &Value::array(vec![Value::string("a")])).unwrap();
        engine.shutdown(None);
    }
    assert!(path.exists());

    let engine = Engine::builder().build();
    engine
        .persist_namespace("saved", &path, Duration::from_secs(60))
        .unwrap();
    let store = engine.datastore("saved");
    assert_eq!(store.get("answer").unwrap(), Value::Number(42.0));
    assert_eq!(store.get("tags").unwrap(), Value::array(vec![Value::string("a")]));
}
