//! Unknown tracking: attribute patterns, the tri-valued algebra, and
//! iterative re-evaluation.

use std::sync::Arc;

use celrt::{
    ops, Activation, AstBuilder, AttributePattern, ErrorKind, EvalOptions, Expr, Program, Qualifier,
    ResolvableAttributePattern, UnknownContext, Value,
};
use pretty_assertions::assert_eq;

fn program(build: impl FnOnce(&mut AstBuilder) -> Expr) -> Program {
    let mut b = AstBuilder::new();
    let root = build(&mut b);
    Program::new(b.build(root), EvalOptions::with_unknown_tracking()).unwrap()
}

fn or_program() -> Program {
    program(|b| {
        let a = b.ident("a");
        let bb = b.ident("b");
        b.global_call(ops::LOGICAL_OR, vec![a, bb])
    })
}

fn unknown_attrs(value: &Value) -> Vec<String> {
    match value {
        Value::Unknown(set) => set.attributes().iter().map(ToString::to_string).collect(),
        other => panic!("expected unknown, got {other}"),
    }
}

#[test]
fn unknown_or_true_is_true() {
    let p = or_program();
    let patterns = [AttributePattern::root("a").unwrap()];
    let resolver = Activation::bind("b", Value::Bool(true));
    assert_eq!(p.eval_partial(&resolver, &patterns).unwrap(), Value::Bool(true));
}

#[test]
fn unknown_or_false_is_the_unknown() {
    let p = or_program();
    let patterns = [AttributePattern::root("a").unwrap()];
    let resolver = Activation::bind("b", Value::Bool(false));
    let result = p.eval_partial(&resolver, &patterns).unwrap();
    assert_eq!(unknown_attrs(&result), vec!["a".to_owned()]);
}

#[test]
fn short_circuit_beats_unknown_and_error() {
    // false && <unknown> is false; true || <error> is true.
    let p = program(|b| {
        let f = b.boolean(false);
        let a = b.ident("a");
        b.global_call(ops::LOGICAL_AND, vec![f, a])
    });
    let patterns = [AttributePattern::root("a").unwrap()];
    assert_eq!(
        p.eval_partial(&Activation::empty(), &patterns).unwrap(),
        Value::Bool(false)
    );

    let p = program(|b| {
        let t = b.boolean(true);
        let one = b.int(1);
        let zero = b.int(0);
        let bad = b.global_call(ops::DIVIDE, vec![one, zero]);
        b.global_call(ops::LOGICAL_OR, vec![t, bad])
    });
    assert_eq!(p.eval().unwrap(), Value::Bool(true));
}

#[test]
fn unknown_and_false_is_false() {
    let p = program(|b| {
        let a = b.ident("a");
        let f = b.boolean(false);
        b.global_call(ops::LOGICAL_AND, vec![a, f])
    });
    let patterns = [AttributePattern::root("a").unwrap()];
    assert_eq!(
        p.eval_partial(&Activation::empty(), &patterns).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn unknown_and_true_is_the_unknown() {
    let p = program(|b| {
        let a = b.ident("a");
        let t = b.boolean(true);
        b.global_call(ops::LOGICAL_AND, vec![a, t])
    });
    let patterns = [AttributePattern::root("a").unwrap()];
    let result = p.eval_partial(&Activation::empty(), &patterns).unwrap();
    assert_eq!(unknown_attrs(&result), vec!["a".to_owned()]);
}

#[test]
fn unknown_wins_over_error() {
    // a && (1/0 == 1): the unknown side dominates the error side.
    let p = program(|b| {
        let a = b.ident("a");
        let one = b.int(1);
        let zero = b.int(0);
        let bad = b.global_call(ops::DIVIDE, vec![one, zero]);
        let one_again = b.int(1);
        let cmp = b.global_call(ops::EQUALS, vec![bad, one_again]);
        b.global_call(ops::LOGICAL_AND, vec![a, cmp])
    });
    let patterns = [AttributePattern::root("a").unwrap()];
    let result = p.eval_partial(&Activation::empty(), &patterns).unwrap();
    assert_eq!(unknown_attrs(&result), vec!["a".to_owned()]);
}

#[test]
fn two_unknowns_union() {
    let p = program(|b| {
        let a = b.ident("a");
        let bb = b.ident("b");
        b.global_call(ops::LOGICAL_AND, vec![a, bb])
    });
    let patterns = [
        AttributePattern::root("a").unwrap(),
        AttributePattern::root("b").unwrap(),
    ];
    let result = p.eval_partial(&Activation::empty(), &patterns).unwrap();
    assert_eq!(unknown_attrs(&result), vec!["a".to_owned(), "b".to_owned()]);
}

#[test]
fn strict_calls_union_unknown_arguments() {
    let p = program(|b| {
        let a = b.ident("a");
        let bb = b.ident("b");
        b.global_call(ops::ADD, vec![a, bb])
    });
    let patterns = [
        AttributePattern::root("a").unwrap(),
        AttributePattern::root("b").unwrap(),
    ];
    let result = p.eval_partial(&Activation::empty(), &patterns).unwrap();
    assert_eq!(unknown_attrs(&result), vec!["a".to_owned(), "b".to_owned()]);
}

#[test]
fn missing_variable_is_an_expression_id_unknown() {
    let p = program(|b| b.ident("x"));
    let result = p.eval().unwrap();
    match result {
        Value::Unknown(set) => {
            assert!(set.attributes().is_empty());
            assert_eq!(set.expr_ids().len(), 1);
        }
        other => panic!("expected unknown, got {other}"),
    }
}

#[test]
fn qualified_pattern_leaves_siblings_concrete() {
    // Pattern request.user: request.id stays resolvable.
    let request = Value::Map(Arc::new(
        celrt::MapValue::from_entries([
            (Value::from("user"), Value::from("bob")),
            (Value::from("id"), Value::Int(7)),
        ])
        .unwrap(),
    ));
    let patterns = [AttributePattern::from_qualified_identifier("request.user").unwrap()];
    let resolver = Activation::bind("request", request);

    let p = program(|b| {
        let r = b.ident("request");
        b.select(r, "id")
    });
    assert_eq!(p.eval_partial(&resolver, &patterns).unwrap(), Value::Int(7));

    let p = program(|b| {
        let r = b.ident("request");
        b.select(r, "user")
    });
    let result = p.eval_partial(&resolver, &patterns).unwrap();
    assert_eq!(unknown_attrs(&result), vec!["request.user".to_owned()]);
}

#[test]
fn wildcard_pattern_matches_index_access() {
    let m = Value::Map(Arc::new(
        celrt::MapValue::from_entries([(Value::Int(1), Value::from("x"))]).unwrap(),
    ));
    let patterns = [AttributePattern::root("m").unwrap().wildcard()];
    let resolver = Activation::bind("m", m);

    let p = program(|b| {
        let m = b.ident("m");
        let idx = b.int(1);
        b.global_call(ops::INDEX, vec![m, idx])
    });
    let result = p.eval_partial(&resolver, &patterns).unwrap();
    assert_eq!(unknown_attrs(&result), vec!["m[1]".to_owned()]);
}

#[test]
fn iterative_evaluation_converges() {
    // a + b, resolving both unknowns through callbacks across rounds.
    let p = program(|b| {
        let a = b.ident("a");
        let bb = b.ident("b");
        b.global_call(ops::ADD, vec![a, bb])
    });
    let context = UnknownContext::new(
        Arc::new(Activation::empty()),
        vec![
            ResolvableAttributePattern::new(AttributePattern::root("a").unwrap(), || Value::Int(2)),
            ResolvableAttributePattern::new(AttributePattern::root("b").unwrap(), || Value::Int(40)),
        ],
    );

    let first = p.advance_evaluation(&context).unwrap();
    let Value::Unknown(pending) = &first else {
        panic!("expected unknown, got {first}");
    };
    assert_eq!(pending.attributes().len(), 2);

    let context = context.resolve_pending(pending).expect("both attributes are resolvable");
    assert_eq!(p.advance_evaluation(&context).unwrap(), Value::Int(42));
}

#[test]
fn partial_resolution_strictly_shrinks_the_unknown_set() {
    let p = program(|b| {
        let a = b.ident("a");
        let bb = b.ident("b");
        b.global_call(ops::ADD, vec![a, bb])
    });
    let context = UnknownContext::new(
        Arc::new(Activation::empty()),
        vec![
            ResolvableAttributePattern::new(AttributePattern::root("a").unwrap(), || Value::Int(2)),
            ResolvableAttributePattern::new(AttributePattern::root("b").unwrap(), || Value::Int(40)),
        ],
    );

    let context = context.with_resolved_attributes([(celrt::Attribute::root("a").unwrap(), Value::Int(2))]);
    let result = p.advance_evaluation(&context).unwrap();
    assert_eq!(unknown_attrs(&result), vec!["b".to_owned()]);
}

#[test]
fn resolved_attribute_overrides_container_contents() {
    // Even though the map holds "bob", the resolved attribute wins.
    let request = Value::Map(Arc::new(
        celrt::MapValue::from_entries([(Value::from("user"), Value::from("bob"))]).unwrap(),
    ));
    let p = program(|b| {
        let r = b.ident("request");
        b.select(r, "user")
    });
    let context = UnknownContext::new(
        Arc::new(Activation::bind("request", request)),
        vec![ResolvableAttributePattern::new(
            AttributePattern::from_qualified_identifier("request.user").unwrap(),
            || Value::from("alice"),
        )],
    )
    .with_resolved_attributes([(
        celrt::Attribute::root("request").unwrap().qualify(Qualifier::from("user")),
        Value::from("alice"),
    )]);
    assert_eq!(p.advance_evaluation(&context).unwrap(), Value::from("alice"));
}

#[test]
fn unknown_overflow_respects_the_entry_cap() {
    let mut b = AstBuilder::new();
    let a = b.ident("a");
    let bb = b.ident("b");
    let root = b.global_call(ops::ADD, vec![a, bb]);
    let options = EvalOptions {
        max_unknown_entries: 1,
        ..EvalOptions::with_unknown_tracking()
    };
    let p = Program::new(b.build(root), options).unwrap();
    let patterns = [
        AttributePattern::root("a").unwrap(),
        AttributePattern::root("b").unwrap(),
    ];
    let err = p.eval_partial(&Activation::empty(), &patterns).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Overflow);
}
