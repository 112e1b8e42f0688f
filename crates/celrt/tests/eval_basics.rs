//! End-to-end evaluation of operators, literals, and error surfacing.

use celrt::{ops, AstBuilder, ErrorKind, EvalOptions, Expr, Program, Value};
use pretty_assertions::assert_eq;

fn program(build: impl FnOnce(&mut AstBuilder) -> Expr) -> Program {
    program_with(EvalOptions::default(), build)
}

fn program_with(options: EvalOptions, build: impl FnOnce(&mut AstBuilder) -> Expr) -> Program {
    let mut b = AstBuilder::new();
    let root = build(&mut b);
    Program::new(b.build(root), options).unwrap()
}

#[test]
fn arithmetic_precedence_chain() {
    // 1 + 2 * 3
    let p = program(|b| {
        let one = b.int(1);
        let two = b.int(2);
        let three = b.int(3);
        let product = b.global_call(ops::MULTIPLY, vec![two, three]);
        b.global_call(ops::ADD, vec![one, product])
    });
    assert_eq!(p.eval().unwrap(), Value::Int(7));
}

#[test]
fn string_concatenation() {
    let p = program(|b| {
        let hello = b.string("hello ");
        let world = b.string("world");
        b.global_call(ops::ADD, vec![hello, world])
    });
    assert_eq!(p.eval().unwrap(), Value::from("hello world"));
}

#[test]
fn size_of_list_variable() {
    let p = program(|b| {
        let items = b.ident("items");
        b.global_call("size", vec![items])
    });
    let items = Value::from(vec![Value::from("a"), Value::from("b"), Value::from("c")]);
    let result = p.eval_map([("items".to_owned(), items)]).unwrap();
    assert_eq!(result, Value::Int(3));
}

#[test]
fn member_size_call() {
    let p = program(|b| {
        let s = b.string("héllo");
        b.member_call(s, "size", vec![])
    });
    // Code points, not bytes.
    assert_eq!(p.eval().unwrap(), Value::Int(5));
}

#[test]
fn conditional_picks_one_branch() {
    let p = program(|b| {
        let cond = b.boolean(true);
        let then = b.int(1);
        // The untaken branch would fail if evaluated.
        let zero = b.int(0);
        let one = b.int(1);
        let bad = b.global_call(ops::DIVIDE, vec![one, zero]);
        b.global_call(ops::CONDITIONAL, vec![cond, then, bad])
    });
    assert_eq!(p.eval().unwrap(), Value::Int(1));
}

#[test]
fn divide_by_zero_is_an_error() {
    let p = program(|b| {
        let one = b.int(1);
        let zero = b.int(0);
        b.global_call(ops::DIVIDE, vec![one, zero])
    });
    let err = p.eval().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DivideByZero);
}

#[test]
fn modulo_by_zero_is_an_error() {
    let p = program(|b| {
        let one = b.int(1);
        let zero = b.int(0);
        b.global_call(ops::MODULO, vec![one, zero])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::DivideByZero);
}

#[test]
fn int_overflow_checked_fails() {
    let p = program(|b| {
        let max = b.int(i64::MAX);
        let one = b.int(1);
        b.global_call(ops::ADD, vec![max, one])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::Overflow);
}

#[test]
fn int_overflow_unchecked_wraps() {
    let options = EvalOptions {
        overflow_checks: false,
        ..EvalOptions::default()
    };
    let p = program_with(options, |b| {
        let max = b.int(i64::MAX);
        let one = b.int(1);
        b.global_call(ops::ADD, vec![max, one])
    });
    assert_eq!(p.eval().unwrap(), Value::Int(i64::MIN));
}

#[test]
fn uint_overflow_checked_fails() {
    let p = program(|b| {
        let max = b.uint(u64::MAX);
        let one = b.uint(1);
        b.global_call(ops::ADD, vec![max, one])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::Overflow);
}

#[test]
fn uint_subtraction_underflow_fails() {
    let p = program(|b| {
        let zero = b.uint(0);
        let one = b.uint(1);
        b.global_call(ops::SUBTRACT, vec![zero, one])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::Overflow);
}

#[test]
fn min_divided_by_negative_one_overflows() {
    let p = program(|b| {
        let min = b.int(i64::MIN);
        let neg_one = b.int(-1);
        b.global_call(ops::DIVIDE, vec![min, neg_one])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::Overflow);
}

#[test]
fn double_division_by_zero_is_infinity() {
    let p = program(|b| {
        let one = b.double(1.0);
        let zero = b.double(0.0);
        b.global_call(ops::DIVIDE, vec![one, zero])
    });
    assert_eq!(p.eval().unwrap(), Value::Double(f64::INFINITY));
}

#[test]
fn negate_min_int_overflows() {
    let p = program(|b| {
        let min = b.int(i64::MIN);
        b.global_call(ops::NEGATE, vec![min])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::Overflow);
}

#[test]
fn logical_not() {
    let p = program(|b| {
        let t = b.boolean(true);
        b.global_call(ops::LOGICAL_NOT, vec![t])
    });
    assert_eq!(p.eval().unwrap(), Value::Bool(false));
}

#[test]
fn list_indexing() {
    let p = program(|b| {
        let ten = b.int(10);
        let twenty = b.int(20);
        let list = b.list(vec![ten, twenty]);
        let idx = b.int(1);
        b.global_call(ops::INDEX, vec![list, idx])
    });
    assert_eq!(p.eval().unwrap(), Value::Int(20));
}

#[test]
fn list_index_accepts_exact_double() {
    let p = program(|b| {
        let ten = b.int(10);
        let twenty = b.int(20);
        let list = b.list(vec![ten, twenty]);
        let idx = b.double(1.0);
        b.global_call(ops::INDEX, vec![list, idx])
    });
    assert_eq!(p.eval().unwrap(), Value::Int(20));
}

#[test]
fn list_index_rejects_fractional_double() {
    let p = program(|b| {
        let ten = b.int(10);
        let list = b.list(vec![ten]);
        let idx = b.double(0.5);
        b.global_call(ops::INDEX, vec![list, idx])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn list_index_out_of_range() {
    let p = program(|b| {
        let ten = b.int(10);
        let list = b.list(vec![ten]);
        let idx = b.int(3);
        b.global_call(ops::INDEX, vec![list, idx])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
}

#[test]
fn negative_list_index_is_out_of_range() {
    let p = program(|b| {
        let ten = b.int(10);
        let list = b.list(vec![ten]);
        let idx = b.int(-1);
        b.global_call(ops::INDEX, vec![list, idx])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
}

#[test]
fn map_select_and_missing_key() {
    let p = program(|b| {
        let request = b.ident("request");
        b.select(request, "user")
    });
    let request = map_value([(Value::from("user"), Value::from("alice"))]);
    assert_eq!(
        p.eval_map([("request".to_owned(), request)]).unwrap(),
        Value::from("alice")
    );

    let empty = map_value([]);
    let err = p.eval_map([("request".to_owned(), empty)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchAttribute);
}

#[test]
fn has_short_circuits_missing_field() {
    // has(request.user) && request.user == "alice"
    let p = program(|b| {
        let request1 = b.ident("request");
        let has = b.test(request1, "user");
        let request2 = b.ident("request");
        let user = b.select(request2, "user");
        let alice = b.string("alice");
        let eq = b.global_call(ops::EQUALS, vec![user, alice]);
        b.global_call(ops::LOGICAL_AND, vec![has, eq])
    });

    let present = map_value([(Value::from("user"), Value::from("alice"))]);
    assert_eq!(p.eval_map([("request".to_owned(), present)]).unwrap(), Value::Bool(true));

    let absent = map_value([]);
    assert_eq!(p.eval_map([("request".to_owned(), absent)]).unwrap(), Value::Bool(false));
}

#[test]
fn in_operator() {
    let p = program(|b| {
        let needle = b.int(2);
        let one = b.int(1);
        let two = b.int(2);
        let list = b.list(vec![one, two]);
        b.global_call(ops::IN, vec![needle, list])
    });
    assert_eq!(p.eval().unwrap(), Value::Bool(true));
}

#[test]
fn heterogeneous_comparison_enabled_by_default() {
    let p = program(|b| {
        let one = b.int(1);
        let two = b.uint(2);
        b.global_call(ops::LESS, vec![one, two])
    });
    assert_eq!(p.eval().unwrap(), Value::Bool(true));
}

#[test]
fn heterogeneous_comparison_can_be_disabled() {
    let options = EvalOptions {
        heterogeneous_comparisons: false,
        ..EvalOptions::default()
    };
    let p = program_with(options, |b| {
        let one = b.int(1);
        let two = b.uint(2);
        b.global_call(ops::LESS, vec![one, two])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::NoSuchOverload);
}

#[test]
fn nan_is_incomparable() {
    let p = program(|b| {
        let nan = b.double(f64::NAN);
        let one = b.double(1.0);
        b.global_call(ops::LESS, vec![nan, one])
    });
    assert_eq!(p.eval().unwrap(), Value::Bool(false));

    let p = program(|b| {
        let nan = b.double(f64::NAN);
        let other = b.double(f64::NAN);
        b.global_call(ops::EQUALS, vec![nan, other])
    });
    assert_eq!(p.eval().unwrap(), Value::Bool(false));
}

#[test]
fn string_functions() {
    let p = program(|b| {
        let s = b.string("hello world");
        let prefix = b.string("hello");
        b.member_call(s, "startsWith", vec![prefix])
    });
    assert_eq!(p.eval().unwrap(), Value::Bool(true));

    let p = program(|b| {
        let s = b.string("hello world");
        let re = b.string("^h.*d$");
        b.member_call(s, "matches", vec![re])
    });
    assert_eq!(p.eval().unwrap(), Value::Bool(true));
}

#[test]
fn invalid_regex_is_an_argument_error() {
    let p = program(|b| {
        let s = b.string("x");
        let re = b.string("(unclosed");
        b.member_call(s, "matches", vec![re])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn type_of_int_is_the_int_type_literal() {
    let p = program(|b| {
        let one = b.int(1);
        let ty = b.global_call("type", vec![one]);
        let int_literal = b.ident("int");
        b.global_call(ops::EQUALS, vec![ty, int_literal])
    });
    assert_eq!(p.eval().unwrap(), Value::Bool(true));
}

#[test]
fn duration_and_timestamp_arithmetic() {
    let p = program(|b| {
        let ts = b.timestamp(1_700_000_000, 0);
        let d = b.duration(3600, 0);
        b.global_call(ops::ADD, vec![ts, d])
    });
    let result = p.eval().unwrap();
    match result {
        Value::Timestamp(t) => assert_eq!(t.timestamp(), 1_700_003_600),
        other => panic!("expected timestamp, got {other}"),
    }

    let p = program(|b| {
        let a = b.timestamp(1_700_000_100, 0);
        let z = b.timestamp(1_700_000_000, 0);
        let diff = b.global_call(ops::SUBTRACT, vec![a, z]);
        let expected = b.duration(100, 0);
        b.global_call(ops::EQUALS, vec![diff, expected])
    });
    assert_eq!(p.eval().unwrap(), Value::Bool(true));
}

#[test]
fn duration_addition_overflows_at_range_limit() {
    let p = program(|b| {
        let near_max = b.duration(3_652_500 * 86_400, 0);
        let one = b.duration(1, 0);
        b.global_call(ops::ADD, vec![near_max, one])
    });
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::Overflow);
}

#[test]
fn errors_carry_source_locations() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let zero = b.int(0);
    let div = b.global_call(ops::DIVIDE, vec![one, zero]);
    b.set_source("test.cel");
    b.set_offset(div.id, 4);
    let p = Program::new(b.build(div), EvalOptions::default()).unwrap();

    let err = p.eval().unwrap_err();
    assert_eq!(err.to_string(), "evaluation error at test.cel:4: divide by zero");
}

#[test]
fn no_such_overload_reports_argument_kinds() {
    let p = program(|b| {
        let one = b.int(1);
        let s = b.string("x");
        b.global_call(ops::ADD, vec![one, s])
    });
    let err = p.eval().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchOverload);
    assert!(err.message().contains("int, string"), "message: {}", err.message());
}

fn map_value(entries: impl IntoIterator<Item = (Value, Value)>) -> Value {
    Value::Map(std::sync::Arc::new(celrt::MapValue::from_entries(entries).unwrap()))
}
