//! Language-semantics tests: scoping, closures, control flow, the
//! constructor pattern, and object-method binding.

use duso::{CollectStringPrint, Engine, ErrorKind, Value};
use pretty_assertions::assert_eq;

fn run(source: &str) -> (Value, String) {
    let output = CollectStringPrint::new();
    let engine = Engine::builder().print_writer(output.clone()).build();
    let value = engine.eval(source).unwrap();
    (value, output.output())
}

fn run_err(source: &str) -> duso::ScriptError {
    Engine::builder().build().eval(source).unwrap_err()
}

#[test]
fn closure_counter() {
    let (_, output) = run(
        "c = (function() var n = 0 return function() n = n + 1 return n end end)() ; \
         print(c()); print(c()); print(c())",
    );
    assert_eq!(output, "1\n2\n3\n");
}

#[test]
fn constructor_override() {
    let (_, output) = run(
        "C = {timeout = 30, retries = 3} ; c = C(timeout = 60) ; print(c.timeout, c.retries, C.timeout)",
    );
    assert_eq!(output, "60 3 30\n");
}

#[test]
fn constructor_preserves_key_order_and_appends_new_keys() {
    let (_, output) = run("C = {z = 1, a = 2} ; c = C(z = 9, extra = 7) ; print(keys(c))");
    assert_eq!(output, "[\"z\", \"a\", \"extra\"]\n");
}

#[test]
fn assignment_updates_ancestor_binding() {
    let (_, output) = run(
        "total = 0
         function add(n)
             total = total + n
         end
         add(2) add(3)
         print(total)",
    );
    assert_eq!(output, "5\n");
}

#[test]
fn var_shadows_without_touching_outer() {
    let (_, output) = run(
        "x = 1
         function f()
             var x = 99
             print(x)
         end
         f()
         print(x)",
    );
    assert_eq!(output, "99\n1\n");
}

#[test]
fn closure_observes_current_bindings_at_call_time() {
    let (_, output) = run(
        "n = 1
         f = function() return n end
         n = 2
         print(f())",
    );
    assert_eq!(output, "2\n");
}

#[test]
fn object_method_binding_writes_back() {
    let (_, output) = run(
        "counter = {count = 0, bump = function() count = count + 1 return count end}
         print(counter.bump(), counter.bump(), counter.count)",
    );
    assert_eq!(output, "1 2 2\n");
}

#[test]
fn extracted_method_loses_ambient_binding() {
    let err = run_err(
        "counter = {count = 0, bump = function() count = count + 1 return count end}
         f = counter.bump
         f()",
    );
    assert_eq!(err.kind(), ErrorKind::NameResolution);
}

#[test]
fn truthiness_of_empty_containers() {
    let (_, output) = run(
        "print(0 ? 'y' : 'n', '' ? 'y' : 'n', [] ? 'y' : 'n', {} ? 'y' : 'n', nil ? 'y' : 'n', 1 ? 'y' : 'n')",
    );
    assert_eq!(output, "n n n n n y\n");
}

#[test]
fn logical_operators_return_the_deciding_operand() {
    let (_, output) = run("print(nil or 'fallback', 5 and 'right', 0 and 'x', 'left' or 'y')");
    assert_eq!(output, "fallback right 0 left\n");
}

#[test]
fn ternary_binds_below_comparison() {
    let (_, output) = run("print(1 < 2 ? 'a' : 'b', 2 < 1 ? 'a' : 'b')");
    assert_eq!(output, "a b\n");
}

#[test]
fn ternary_evaluates_only_selected_branch() {
    let (_, output) = run(
        "hit = 0
         function bump() hit = hit + 1 return hit end
         x = true ? 'ok' : bump()
         print(x, hit)",
    );
    assert_eq!(output, "ok 0\n");
}

#[test]
fn for_range_defaults_and_negative_step() {
    let (_, output) = run("for i = 1, 3 do print(i) end for i = 2, 0 do print(i) end");
    assert_eq!(output, "1\n2\n3\n2\n1\n0\n");
}

#[test]
fn for_range_rejects_fractional_bounds() {
    let err = run_err("for i = 0, 1.5 do end");
    assert_eq!(err.kind(), ErrorKind::Bounds);
}

#[test]
fn for_in_yields_object_keys_in_insertion_order() {
    let (_, output) = run(
        "o = {b = 1, a = 2}
         o.c = 3
         for k in o do print(k) end",
    );
    assert_eq!(output, "b\na\nc\n");
}

#[test]
fn for_in_iterates_string_characters() {
    let (_, output) = run("for c in 'abc' do print(c) end");
    assert_eq!(output, "a\nb\nc\n");
}

#[test]
fn break_and_continue_in_loops() {
    let (_, output) = run(
        "for i = 1, 10 do
             if i == 3 then continue end
             if i == 5 then break end
             print(i)
         end",
    );
    assert_eq!(output, "1\n2\n4\n");
}

#[test]
fn while_loop_runs_until_condition_fails() {
    let (_, output) = run("n = 0 while n < 3 do n = n + 1 end print(n)");
    assert_eq!(output, "3\n");
}

#[test]
fn array_constructor_appends_positionally() {
    let (_, output) = run("a = [1, 2] ; b = a(3, 4) ; print(b, length(a))");
    assert_eq!(output, "[1, 2, 3, 4] 2\n");
}

#[test]
fn arrays_share_references_until_deep_copied() {
    let (_, output) = run(
        "a = [1]
         b = a
         push(a, 2)
         print(b[1])
         d = deep_copy(a)
         push(a, 3)
         print(length(d), length(a))",
    );
    assert_eq!(output, "2\n2 3\n");
}

#[test]
fn string_concatenation_coerces_either_side() {
    let (_, output) = run("print('a' + 1, 2 + 'b', 'x' + nil)");
    assert_eq!(output, "a1 2b xnil\n");
}

#[test]
fn mixed_comparison_parses_numeric_strings() {
    let (_, output) = run("print(5 < '10', 'abc' < 'abd')");
    assert_eq!(output, "true true\n");
}

#[test]
fn mixed_comparison_with_non_numeric_string_errors() {
    let err = run_err("x = 5 < 'banana'");
    assert_eq!(err.kind(), ErrorKind::Arithmetic);
}

#[test]
fn division_by_zero_is_an_arithmetic_error() {
    let err = run_err("x = 1 / 0");
    assert_eq!(err.kind(), ErrorKind::Arithmetic);
}

#[test]
fn undefined_name_is_a_name_error() {
    let err = run_err("print(missing)");
    assert_eq!(err.kind(), ErrorKind::NameResolution);
}

#[test]
fn array_index_out_of_range_is_a_bounds_error() {
    let err = run_err("a = [1] print(a[5])");
    assert_eq!(err.kind(), ErrorKind::Bounds);
}

#[test]
fn try_catch_binds_message_and_error_value() {
    let (_, output) = run(
        "try
             throw('boom')
         catch msg, e
             print(msg, e.kind)
         end",
    );
    assert_eq!(output, "boom thrown\n");
}

#[test]
fn try_does_not_catch_return() {
    let (_, output) = run(
        "function f()
             try
                 return 'early'
             catch e
                 print('caught')
             end
             return 'late'
         end
         print(f())",
    );
    assert_eq!(output, "early\n");
}

#[test]
fn exit_passes_through_try_and_sets_terminal_value() {
    let output = CollectStringPrint::new();
    let engine = Engine::builder().print_writer(output.clone()).build();
    let value = engine
        .eval("try exit(7) catch e print('caught') end print('after')")
        .unwrap();
    assert_eq!(value, Value::Number(7.0));
    assert_eq!(output.output(), "");
}

#[test]
fn terminal_value_is_last_top_level_expression() {
    let engine = Engine::builder().build();
    assert_eq!(engine.eval("1 + 1 ; 40 + 2").unwrap(), Value::Number(42.0));
    assert_eq!(engine.eval("x = 5").unwrap(), Value::Nil);
}

#[test]
fn thrown_object_carries_payload() {
    let (_, output) = run(
        "try
             throw({code = 42})
         catch msg, e
             print(e.payload.code)
         end",
    );
    assert_eq!(output, "42\n");
}

#[test]
fn error_stack_names_the_failing_function() {
    let err = run_err(
        "function inner() return 1 / 0 end
         function outer() return inner() end
         outer()",
    );
    let names: Vec<&str> = err.frames().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["inner", "outer"]);
}

#[test]
fn deep_recursion_is_reported_not_crashed() {
    let err = run_err("function f() return f() end f()");
    assert!(err.message().contains("call depth"));
}
