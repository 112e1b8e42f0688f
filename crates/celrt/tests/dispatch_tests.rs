//! Overload registration, resolution, ambiguity, and late binding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use celrt::{
    ops, Activation, ArgType, AstBuilder, Dispatcher, ErrorKind, EvalOptions, Expr, FunctionBinding, Kind,
    Program, Value,
};
use pretty_assertions::assert_eq;

fn ast(build: impl FnOnce(&mut AstBuilder) -> Expr) -> celrt::CheckedAst {
    let mut b = AstBuilder::new();
    let root = build(&mut b);
    b.build(root)
}

#[test]
fn custom_global_function() {
    let ast = ast(|b| {
        let name = b.string("world");
        b.global_call("greet", vec![name])
    });
    let greet = FunctionBinding::new("greet_string", vec![ArgType::Kind(Kind::String)], |args| {
        match args {
            [Value::String(name)] => Value::string(format!("hello {name}")),
            _ => Value::Null,
        }
    })
    .with_function("greet");
    let p = Program::with_functions(ast, EvalOptions::default(), vec![greet]).unwrap();
    assert_eq!(p.eval().unwrap(), Value::from("hello world"));
}

#[test]
fn overload_ids_from_the_reference_map_win() {
    let mut b = AstBuilder::new();
    let arg = b.int(1);
    let call = b.global_call("describe", vec![arg]);
    b.set_candidates(call.id, ["describe_int"]);
    let ast = b.build(call);

    // A greedy Any-typed overload under the same name would be ambiguous via
    // dynamic dispatch; the candidate list keeps resolution deterministic.
    let by_id = FunctionBinding::new("describe_int", vec![ArgType::Kind(Kind::Int)], |_| Value::from("int"))
        .with_function("describe");
    let greedy = FunctionBinding::new("describe_any", vec![ArgType::Any], |_| Value::from("any"))
        .with_function("describe");
    let p = Program::with_functions(ast, EvalOptions::default(), vec![by_id, greedy]).unwrap();
    assert_eq!(p.eval().unwrap(), Value::from("int"));
}

#[test]
fn ambiguous_dynamic_dispatch_is_an_error() {
    let ast = ast(|b| {
        let arg = b.int(1);
        b.global_call("describe", vec![arg])
    });
    let by_kind = FunctionBinding::new("describe_int", vec![ArgType::Kind(Kind::Int)], |_| Value::from("int"))
        .with_function("describe");
    let greedy = FunctionBinding::new("describe_any", vec![ArgType::Any], |_| Value::from("any"))
        .with_function("describe");
    let p = Program::with_functions(ast, EvalOptions::default(), vec![by_kind, greedy]).unwrap();

    let err = p.eval().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousOverload);
    assert!(err.message().contains("describe_int"), "message: {}", err.message());
    assert!(err.message().contains("describe_any"), "message: {}", err.message());
}

#[test]
fn unregistered_function_is_no_such_overload() {
    let ast = ast(|b| {
        let arg = b.int(1);
        b.global_call("nope", vec![arg])
    });
    let p = Program::new(ast, EvalOptions::default()).unwrap();
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::NoSuchOverload);
}

#[test]
fn arity_mismatch_is_no_such_overload() {
    let ast = ast(|b| {
        let a = b.int(1);
        let c = b.int(2);
        b.global_call("describe", vec![a, c])
    });
    let unary = FunctionBinding::new("describe_int", vec![ArgType::Kind(Kind::Int)], |_| Value::from("int"))
        .with_function("describe");
    let p = Program::with_functions(ast, EvalOptions::default(), vec![unary]).unwrap();
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::NoSuchOverload);
}

#[test]
fn late_bound_functions_fill_resolution_gaps() {
    let ast = ast(|b| {
        let arg = b.int(21);
        b.global_call("fetch", vec![arg])
    });
    let p = Program::new(ast, EvalOptions::default()).unwrap();

    // Without the late-bound table the call cannot resolve.
    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::NoSuchOverload);

    let late = Dispatcher::from_bindings([FunctionBinding::new(
        "fetch_int",
        vec![ArgType::Kind(Kind::Int)],
        |args| match args {
            [Value::Int(n)] => Value::Int(n * 2),
            _ => Value::Null,
        },
    )
    .with_function("fetch")])
    .unwrap();
    let result = p.eval_with_functions(&Activation::empty(), &late).unwrap();
    assert_eq!(result, Value::Int(42));
}

#[test]
fn strict_functions_propagate_argument_errors() {
    // greet(1 / 0) never invokes greet.
    let ast = ast(|b| {
        let one = b.int(1);
        let zero = b.int(0);
        let bad = b.global_call(ops::DIVIDE, vec![one, zero]);
        b.global_call("greet", vec![bad])
    });
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let greet = FunctionBinding::new("greet_any", vec![ArgType::Any], move |_| {
        seen.fetch_add(1, Ordering::Relaxed);
        Value::Null
    })
    .with_function("greet");
    let p = Program::with_functions(ast, EvalOptions::default(), vec![greet]).unwrap();

    assert_eq!(p.eval().unwrap_err().kind(), ErrorKind::DivideByZero);
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn non_strict_functions_observe_argument_errors() {
    let ast = ast(|b| {
        let one = b.int(1);
        let zero = b.int(0);
        let bad = b.global_call(ops::DIVIDE, vec![one, zero]);
        b.global_call("isError", vec![bad])
    });
    let is_error = FunctionBinding::new("is_error_any", vec![ArgType::Any], |args| match args {
        [value] => Value::Bool(value.is_error()),
        _ => Value::Null,
    })
    .with_function("isError")
    .non_strict();
    let p = Program::with_functions(ast, EvalOptions::default(), vec![is_error]).unwrap();
    assert_eq!(p.eval().unwrap(), Value::Bool(true));
}

#[test]
fn null_matches_only_any_typed_parameters() {
    let ast = ast(|b| {
        let n = b.null();
        b.global_call("describe", vec![n])
    });
    let stringly = FunctionBinding::new("describe_string", vec![ArgType::Kind(Kind::String)], |_| {
        Value::from("string")
    })
    .with_function("describe");
    let any = FunctionBinding::new("describe_any", vec![ArgType::Any], |_| Value::from("any"))
        .with_function("describe");
    let p = Program::with_functions(ast, EvalOptions::default(), vec![stringly, any]).unwrap();
    assert_eq!(p.eval().unwrap(), Value::from("any"));
}

#[test]
fn duplicate_registration_fails_at_build_time() {
    let ast = ast(|b| b.int(1));
    let first = FunctionBinding::new("f_int", vec![ArgType::Kind(Kind::Int)], |_| Value::Null);
    let second = FunctionBinding::new("f_int", vec![ArgType::Kind(Kind::Int)], |_| Value::Null);
    let err = Program::with_functions(ast, EvalOptions::default(), vec![first, second]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn struct_typed_parameters_match_by_type_name() {
    let ast = ast(|b| {
        let name = b.string("alice");
        let user = b.struct_("acme.User", vec![("name".to_owned(), name)]);
        b.global_call("describe", vec![user])
    });
    let for_user = FunctionBinding::new("describe_user", vec![ArgType::Struct(Arc::from("acme.User"))], |_| {
        Value::from("user")
    })
    .with_function("describe");
    let p = Program::with_functions(ast, EvalOptions::default(), vec![for_user]).unwrap();
    assert_eq!(p.eval().unwrap(), Value::from("user"));
}
