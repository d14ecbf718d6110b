//! Builtin-surface tests: text, collections, math, JSON, conversion, time,
//! templates, and host-extension builtins.

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
fn text_basics() {
    let (_, output) = run(
        "print(length('héllo'), upper('abc'), lower('ABC'), trim('  x  '))
         print(substring('hello', 1, 3), substring('hello', -3))
         print(split('a,b,c', ','), join(['a', 'b'], '-'))",
    );
    assert_eq!(output, "5 ABC abc x\nel llo\n[\"a\", \"b\", \"c\"] a-b\n");
}

#[test]
fn contains_is_case_insensitive_by_default() {
    let (_, output) = run(
        "print(contains('Hello World', 'hello'), contains('Hello', 'hello', case_sensitive = true))",
    );
    assert_eq!(output, "true false\n");
}

#[test]
fn replace_literal_and_regex() {
    let (_, output) = run(
        "print(replace('a-b-c', '-', '+'))
         print(replace('a1b22c', '[0-9]+', '#', regex = true))",
    );
    assert_eq!(output, "a+b+c\na#b#c\n");
}

#[test]
fn replace_with_a_function_receives_the_match() {
    let (_, output) = run(
        "print(replace('a1b2', '[0-9]', function(m) return '<' + m + '>' end, regex = true))",
    );
    assert_eq!(output, "a<1>b<2>\n");
}

#[test]
fn find_reports_character_positions() {
    let (_, output) = run(
        "r = find('héllo héllo', 'héllo')
         print(length(r), r[0].position, r[1].position, r[0].length)",
    );
    assert_eq!(output, "2 0 6 5\n");
}

#[test]
fn template_compiles_once_and_is_idempotent() {
    let (_, output) = run(
        "t = template('Hello {{user.name}}, {{missing}}count={{count}}')
         vars = {user = {name = 'Ada'}, count = 3}
         print(t(vars))
         print(t(vars))",
    );
    assert_eq!(output, "Hello Ada, count=3\nHello Ada, count=3\n");
}

#[test]
fn collection_mutators_and_accessors() {
    let (_, output) = run(
        "a = [2, 3]
         print(push(a, 4), unshift(a, 1), a)
         print(pop(a), shift(a), a)
         print(keys({x = 1, y = 2}), values({x = 1, y = 2}))",
    );
    assert_eq!(
        output,
        "3 4 [1, 2, 3, 4]\n4 1 [2, 3]\n[\"x\", \"y\"] [1, 2]\n"
    );
}

#[test]
fn sort_is_stable_and_accepts_a_comparator() {
    let (_, output) = run(
        "print(sort([3, 1, 2]))
         print(sort(['b', 'a']))
         print(sort([3, 1, 2], function(a, b) return a > b end))",
    );
    assert_eq!(output, "[1, 2, 3]\n[\"a\", \"b\"]\n[3, 2, 1]\n");
}

#[test]
fn sort_does_not_mutate_its_input() {
    let (_, output) = run("a = [2, 1] b = sort(a) print(a, b)");
    assert_eq!(output, "[2, 1] [1, 2]\n");
}

#[test]
fn map_filter_reduce() {
    let (_, output) = run(
        "n = [1, 2, 3, 4]
         print(map(n, function(x) return x * 2 end))
         print(filter(n, function(x) return x % 2 == 0 end))
         print(reduce(n, function(acc, x) return acc + x end))
         print(reduce(n, function(acc, x) return acc + x end, 100))",
    );
    assert_eq!(output, "[2, 4, 6, 8]\n[2, 4]\n10\n110\n");
}

#[test]
fn range_variants() {
    let (_, output) = run("print(range(3), range(2, 5), range(6, 0, -2))");
    assert_eq!(output, "[0, 1, 2] [2, 3, 4] [6, 4, 2]\n");
}

#[test]
fn math_basics() {
    let (_, output) = run(
        "print(abs(-2), floor(1.7), ceil(1.2), round(2.5), round(-2.5))
         print(min(3, 1, 2), max(3, 1, 2), clamp(15, 0, 10), sqrt(9), pow(2, 10))",
    );
    assert_eq!(output, "2 1 2 3 -3\n1 3 10 3 1024\n");
}

#[test]
fn math_domain_violations_raise_arithmetic_errors() {
    assert_eq!(run_err("sqrt(-1)").kind(), ErrorKind::Arithmetic);
    assert_eq!(run_err("ln(0)").kind(), ErrorKind::Arithmetic);
    assert_eq!(run_err("asin(2)").kind(), ErrorKind::Arithmetic);
}

#[test]
fn json_round_trip_preserves_structure_and_order() {
    let (_, output) = run(
        "v = json_parse('{\"b\": [1, 2.5, null], \"a\": {\"x\": true}}')
         print(keys(v))
         print(json_format(v))",
    );
    assert_eq!(output, "[\"b\", \"a\"]\n{\"b\":[1,2.5,null],\"a\":{\"x\":true}}\n");
}

#[test]
fn json_round_trip_equality() {
    let engine = Engine::builder().build();
    let original = engine
        .eval("x = {name = 'duso', tags = ['a', 'b'], depth = 2.5, ok = true, gone = nil} x")
        .unwrap();
    let round_tripped = engine
        .eval("json_parse(json_format({name = 'duso', tags = ['a', 'b'], depth = 2.5, ok = true, gone = nil}))")
        .unwrap();
    assert_eq!(original, round_tripped);
}

#[test]
fn json_format_rejects_functions_and_detects_cycles() {
    assert_eq!(run_err("json_format(function() end)").kind(), ErrorKind::Type);
    assert_eq!(
        run_err("a = [1] push(a, a) json_format(a)").kind(),
        ErrorKind::Cycle
    );
}

#[test]
fn json_format_with_indent() {
    let (_, output) = run("print(json_format({a = 1}, 2))");
    assert_eq!(output, "{\n  \"a\": 1\n}\n");
}

#[test]
fn type_and_conversions() {
    let (_, output) = run(
        "print(type(nil), type(1), type('s'), type(true), type([]), type({}), type(print))
         print(tonumber('42'), tonumber('x') == nil, tonumber(true))
         print(tostring(1.5), tostring(nil), tobool(0), tobool('x'))",
    );
    assert_eq!(
        output,
        "nil number string boolean array object function\n42 true 1\n1.5 nil false true\n"
    );
}

#[test]
fn code_values_report_their_type_and_members() {
    let (_, output) = run(
        "c = parse('1 + 1', 'snippet', meta = {origin = 'test'})
         print(type(c), c.name, c.meta.origin, run(c, nil))",
    );
    assert_eq!(output, "code snippet test 2\n");
}

#[test]
fn parse_returns_an_error_value_instead_of_raising() {
    let (_, output) = run(
        "c = parse('1 +')
         print(type(c), c.kind)",
    );
    assert_eq!(output, "error parse\n");
}

#[test]
fn time_formatting_and_parsing() {
    let (_, output) = run(
        "print(format_time(0, 'date'), format_time(0, 'iso'))
         print(format_time(0, 'YYYY/MM/DD HH:mm:ss'))
         print(parse_time('1970-01-02', 'date'), parse_time('1970-01-01T00:01:00Z'))",
    );
    assert_eq!(
        output,
        "1970-01-01 1970-01-01T00:00:00Z\n1970/01/01 00:00:00\n86400 60\n"
    );
}

#[test]
fn now_and_sleep() {
    let (_, output) = run(
        "before = now()
         sleep(0.05)
         print(now() >= before, type(before))",
    );
    assert_eq!(output, "true number\n");
}

#[test]
fn uuid_is_unique_and_env_reads_the_process_environment() {
    let (_, output) = run("print(uuid() != uuid(), length(uuid()), env('DUSO_UNSET_VAR_X') == nil)");
    assert_eq!(output, "true 36 true\n");
}

#[test]
fn deep_copy_drops_functions_recursively() {
    let (_, output) = run(
        "o = {n = 1, f = function() end, inner = {g = function() end, k = 2}}
         c = deep_copy(o)
         print(length(keys(c)), length(keys(c.inner)), c.inner.k)",
    );
    assert_eq!(output, "2 1 2\n");
}

#[test]
fn host_registered_builtins_are_callable() {
    let output = CollectStringPrint::new();
    let engine = Engine::builder()
        .print_writer(output.clone())
        .builtin("double", |_, args| {
            let n = args.number("double", 0, "value")?;
            Ok(Value::Number(n * 2.0))
        })
        .build();
    engine.eval("print(double(21))").unwrap();
    assert_eq!(output.output(), "42\n");
}

#[test]
fn http_without_a_client_is_a_capability_error() {
    assert_eq!(
        run_err("http('https://example.com')").kind(),
        ErrorKind::HostCapability
    );
}

#[test]
fn missing_required_arguments_are_arity_errors() {
    assert_eq!(run_err("substring('x')").kind(), ErrorKind::Arity);
    assert_eq!(run_err("length()").kind(), ErrorKind::Arity);
}
