//! `parallel`, `run`, `spawn`, and request-context tests.

use duso::{CollectStringPrint, Engine, ErrorKind, Value};
use pretty_assertions::assert_eq;

fn engine_with_output() -> (Engine, CollectStringPrint) {
    let output = CollectStringPrint::new();
    let engine = Engine::builder().print_writer(output.clone()).build();
    (engine, output)
}

#[test]
fn parallel_fan_out_preserves_order() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "r = parallel([function() return 1 end, function() return 2 end, function() return 3 end]) ; \
             print(r[0], r[1], r[2])",
        )
        .unwrap();
    assert_eq!(output.output(), "1 2 3\n");
}

#[test]
fn parallel_result_matches_input_shape_for_objects() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "r = parallel({a = function() return 10 end, b = function() return 20 end})
             print(r.a, r.b, keys(r))",
        )
        .unwrap();
    assert_eq!(output.output(), "10 20 [\"a\", \"b\"]\n");
}

#[test]
fn erroring_slot_becomes_nil_without_failing_the_call() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "r = parallel([function() return 1 end, function() throw('bad') end, function() return 3 end])
             print(r[0], r[1] == nil, r[2], length(r))",
        )
        .unwrap();
    assert_eq!(output.output(), "1 true 3 3\n");
}

#[test]
fn parallel_children_read_through_but_do_not_write_back() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "x = 10
             r = parallel([function() x = 99 return x end, function() return x end])
             print(r[0], x)",
        )
        .unwrap();
    assert_eq!(output.output(), "99 10\n");
}

#[test]
fn parallel_slots_may_exit_with_a_value() {
    let (engine, output) = engine_with_output();
    engine
        .eval("r = parallel([function() exit(5) end]) print(r[0])")
        .unwrap();
    assert_eq!(output.output(), "5\n");
}

#[test]
fn parallel_rejects_non_function_slots() {
    let engine = Engine::builder().build();
    let err = engine.eval("parallel([1])").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn run_returns_the_child_terminal_value() {
    let (engine, output) = engine_with_output();
    engine
        .eval("print(run(parse('10 + 32'), nil))")
        .unwrap();
    assert_eq!(output.output(), "42\n");
}

#[test]
fn run_child_sees_its_payload_via_context() {
    let (engine, output) = engine_with_output();
    engine
        .eval("run(parse('print(context().request())'), 'hello')")
        .unwrap();
    assert_eq!(output.output(), "hello\n");
}

#[test]
fn run_payload_is_deep_copied() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "a = [1]
             run(parse('push(context().request(), 2)'), a)
             print(length(a))",
        )
        .unwrap();
    assert_eq!(output.output(), "1\n");
}

#[test]
fn child_errors_surface_in_the_caller_and_are_catchable() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "try
                 run(parse(\"throw('child failed')\"), nil)
             catch msg, e
                 print(msg, e.kind)
             end",
        )
        .unwrap();
    assert_eq!(output.output(), "child failed thrown\n");
}

#[test]
fn run_timeout_raises_a_timeout_error() {
    let (engine, output) = engine_with_output();
    let start = std::time::Instant::now();
    engine
        .eval(
            "try
                 run(parse('sleep(10)'), nil, 0.2)
             catch msg, e
                 print(e.kind)
             end",
        )
        .unwrap();
    assert_eq!(output.output(), "timeout\n");
    assert!(start.elapsed() < std::time::Duration::from_secs(5));
}

#[test]
fn context_is_nil_outside_dispatched_units() {
    let engine = Engine::builder().build();
    assert_eq!(engine.eval("context() == nil").unwrap(), Value::Bool(true));
}

#[test]
fn callstack_records_the_dispatch_kind() {
    let (engine, output) = engine_with_output();
    engine
        .eval("run(parse('print(context().callstack()[0].kind)'), nil)")
        .unwrap();
    assert_eq!(output.output(), "run\n");
}

#[test]
fn nested_run_extends_the_dispatch_chain() {
    let (engine, output) = engine_with_output();
    engine
        .eval("run(parse(\"run(parse('print(length(context().callstack()))'), nil)\"), nil)")
        .unwrap();
    assert_eq!(output.output(), "2\n");
}

#[test]
fn spawn_returns_monotonic_pids() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "a = spawn(parse('1'), nil)
             b = spawn(parse('1'), nil)
             print(type(a), b > a)",
        )
        .unwrap();
    assert_eq!(output.output(), "number true\n");
}

#[test]
fn spawned_units_do_not_deliver_errors_to_the_parent() {
    let (engine, output) = engine_with_output();
    engine
        .eval(
            "s = datastore('bg')
             spawn(parse(\"datastore('bg').set('ran', true) throw('ignored')\"), nil)
             s.wait('ran', true)
             print('parent alive')",
        )
        .unwrap();
    assert_eq!(output.output(), "parent alive\n");
}
