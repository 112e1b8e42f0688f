//! Standard operator and builtin overloads.
//!
//! Registered into every program's dispatcher through the same public
//! [`FunctionBinding`] path user functions use, so nothing here is special
//! to the driver except the short-circuit operators it never dispatches
//! (`_&&_`, `_||_`, `_?_:_`, and `_[_]`). Overload ids follow the CEL
//! naming convention (`add_int64`, `less_int64_uint64`, …) but are opaque
//! strings to the dispatcher.

use std::cmp::Ordering;

use regex::RegexBuilder;

use crate::{
    arith,
    ast::ops,
    dispatch::{ArgType, DispatcherBuilder, FunctionBinding},
    error::{EvalError, EvalResult},
    options::EvalOptions,
    types,
    value::{Kind, Value},
};

/// Registers the standard library into a dispatcher builder.
///
/// The heterogeneous numeric ordering overloads are registered only when the
/// options enable them; overflow checking is captured into the arithmetic
/// closures at registration time.
pub(crate) fn register_standard(builder: &mut DispatcherBuilder, options: &EvalOptions) -> EvalResult<()> {
    register_equality(builder)?;
    register_ordering(builder, options.heterogeneous_comparisons)?;
    register_arithmetic(builder, options.overflow_checks)?;
    register_logic(builder)?;
    register_collections(builder)?;
    register_type_fns(builder)?;
    register_strings(builder, options.regex_size_limit)?;
    Ok(())
}

/// Unwraps an arithmetic result into a value or error carrier.
fn lift(result: EvalResult<Value>) -> Value {
    result.unwrap_or_else(Value::error)
}

/// Guard for argument shapes the dispatcher should have made impossible.
fn invoked_badly(overload_id: &str) -> Value {
    Value::error(EvalError::internal(format!(
        "overload '{overload_id}' invoked with mismatched arguments"
    )))
}

fn register_equality(builder: &mut DispatcherBuilder) -> EvalResult<()> {
    builder.register(
        FunctionBinding::new("equals", vec![ArgType::Any, ArgType::Any], |args| match args {
            [a, b] => Value::Bool(a.equals(b)),
            _ => invoked_badly("equals"),
        })
        .with_function(ops::EQUALS),
    )?;
    builder.register(
        FunctionBinding::new("not_equals", vec![ArgType::Any, ArgType::Any], |args| match args {
            [a, b] => Value::Bool(!a.equals(b)),
            _ => invoked_badly("not_equals"),
        })
        .with_function(ops::NOT_EQUALS),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum OrdOp {
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
}

impl OrdOp {
    fn holds(self, ord: Option<Ordering>) -> bool {
        // NaN compares as None and therefore fails every ordered comparison.
        match self {
            Self::Less => ord == Some(Ordering::Less),
            Self::LessEquals => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            Self::Greater => ord == Some(Ordering::Greater),
            Self::GreaterEquals => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Less => "less",
            Self::LessEquals => "less_equals",
            Self::Greater => "greater",
            Self::GreaterEquals => "greater_equals",
        }
    }

    fn function(self) -> &'static str {
        match self {
            Self::Less => ops::LESS,
            Self::LessEquals => ops::LESS_EQUALS,
            Self::Greater => ops::GREATER,
            Self::GreaterEquals => ops::GREATER_EQUALS,
        }
    }
}

const ORDERED_KINDS: [(&str, Kind); 8] = [
    ("bool", Kind::Bool),
    ("int64", Kind::Int),
    ("uint64", Kind::Uint),
    ("double", Kind::Double),
    ("string", Kind::String),
    ("bytes", Kind::Bytes),
    ("timestamp", Kind::Timestamp),
    ("duration", Kind::Duration),
];

const NUMERIC_PAIRS: [(&str, Kind, Kind); 6] = [
    ("int64_uint64", Kind::Int, Kind::Uint),
    ("int64_double", Kind::Int, Kind::Double),
    ("uint64_int64", Kind::Uint, Kind::Int),
    ("uint64_double", Kind::Uint, Kind::Double),
    ("double_int64", Kind::Double, Kind::Int),
    ("double_uint64", Kind::Double, Kind::Uint),
];

fn register_ordering(builder: &mut DispatcherBuilder, heterogeneous: bool) -> EvalResult<()> {
    for op in [OrdOp::Less, OrdOp::LessEquals, OrdOp::Greater, OrdOp::GreaterEquals] {
        for (suffix, kind) in ORDERED_KINDS {
            register_comparison(builder, op, suffix, kind, kind)?;
        }
        if heterogeneous {
            for (suffix, left, right) in NUMERIC_PAIRS {
                register_comparison(builder, op, suffix, left, right)?;
            }
        }
    }
    Ok(())
}

fn register_comparison(
    builder: &mut DispatcherBuilder,
    op: OrdOp,
    suffix: &str,
    left: Kind,
    right: Kind,
) -> EvalResult<()> {
    let overload_id = format!("{}_{suffix}", op.prefix());
    let diag_id = overload_id.clone();
    builder.register(
        FunctionBinding::new(
            overload_id,
            vec![ArgType::Kind(left), ArgType::Kind(right)],
            move |args| match args {
                [a, b] => Value::Bool(op.holds(a.compare(b))),
                _ => invoked_badly(&diag_id),
            },
        )
        .with_function(op.function()),
    )
}

fn register_arithmetic(builder: &mut DispatcherBuilder, checked: bool) -> EvalResult<()> {
    let int2 = || vec![ArgType::Kind(Kind::Int), ArgType::Kind(Kind::Int)];
    let uint2 = || vec![ArgType::Kind(Kind::Uint), ArgType::Kind(Kind::Uint)];
    let double2 = || vec![ArgType::Kind(Kind::Double), ArgType::Kind(Kind::Double)];

    builder.register(
        FunctionBinding::new("add_int64", int2(), move |args| match args {
            [Value::Int(a), Value::Int(b)] => lift(arith::int_add(*a, *b, checked)),
            _ => invoked_badly("add_int64"),
        })
        .with_function(ops::ADD),
    )?;
    builder.register(
        FunctionBinding::new("add_uint64", uint2(), move |args| match args {
            [Value::Uint(a), Value::Uint(b)] => lift(arith::uint_add(*a, *b, checked)),
            _ => invoked_badly("add_uint64"),
        })
        .with_function(ops::ADD),
    )?;
    builder.register(
        FunctionBinding::new("add_double", double2(), |args| match args {
            [Value::Double(a), Value::Double(b)] => Value::Double(a + b),
            _ => invoked_badly("add_double"),
        })
        .with_function(ops::ADD),
    )?;
    builder.register(
        FunctionBinding::new(
            "add_string",
            vec![ArgType::Kind(Kind::String), ArgType::Kind(Kind::String)],
            |args| match args {
                [Value::String(a), Value::String(b)] => {
                    let mut joined = String::with_capacity(a.len() + b.len());
                    joined.push_str(a);
                    joined.push_str(b);
                    Value::string(joined)
                }
                _ => invoked_badly("add_string"),
            },
        )
        .with_function(ops::ADD),
    )?;
    builder.register(
        FunctionBinding::new(
            "add_bytes",
            vec![ArgType::Kind(Kind::Bytes), ArgType::Kind(Kind::Bytes)],
            |args| match args {
                [Value::Bytes(a), Value::Bytes(b)] => {
                    let mut joined = Vec::with_capacity(a.len() + b.len());
                    joined.extend_from_slice(a);
                    joined.extend_from_slice(b);
                    Value::bytes(joined)
                }
                _ => invoked_badly("add_bytes"),
            },
        )
        .with_function(ops::ADD),
    )?;
    builder.register(
        FunctionBinding::new(
            "add_list",
            vec![ArgType::Kind(Kind::List), ArgType::Kind(Kind::List)],
            |args| match args {
                [Value::List(a), Value::List(b)] => {
                    Value::from(a.iter().chain(b.iter()).cloned().collect::<Vec<_>>())
                }
                _ => invoked_badly("add_list"),
            },
        )
        .with_function(ops::ADD),
    )?;
    builder.register(
        FunctionBinding::new(
            "add_duration_duration",
            vec![ArgType::Kind(Kind::Duration), ArgType::Kind(Kind::Duration)],
            |args| match args {
                [Value::Duration(a), Value::Duration(b)] => lift(arith::duration_add(*a, *b)),
                _ => invoked_badly("add_duration_duration"),
            },
        )
        .with_function(ops::ADD),
    )?;
    builder.register(
        FunctionBinding::new(
            "add_timestamp_duration",
            vec![ArgType::Kind(Kind::Timestamp), ArgType::Kind(Kind::Duration)],
            |args| match args {
                [Value::Timestamp(t), Value::Duration(d)] => lift(arith::timestamp_add_duration(*t, *d)),
                _ => invoked_badly("add_timestamp_duration"),
            },
        )
        .with_function(ops::ADD),
    )?;
    builder.register(
        FunctionBinding::new(
            "add_duration_timestamp",
            vec![ArgType::Kind(Kind::Duration), ArgType::Kind(Kind::Timestamp)],
            |args| match args {
                [Value::Duration(d), Value::Timestamp(t)] => lift(arith::timestamp_add_duration(*t, *d)),
                _ => invoked_badly("add_duration_timestamp"),
            },
        )
        .with_function(ops::ADD),
    )?;

    builder.register(
        FunctionBinding::new("subtract_int64", int2(), move |args| match args {
            [Value::Int(a), Value::Int(b)] => lift(arith::int_sub(*a, *b, checked)),
            _ => invoked_badly("subtract_int64"),
        })
        .with_function(ops::SUBTRACT),
    )?;
    builder.register(
        FunctionBinding::new("subtract_uint64", uint2(), move |args| match args {
            [Value::Uint(a), Value::Uint(b)] => lift(arith::uint_sub(*a, *b, checked)),
            _ => invoked_badly("subtract_uint64"),
        })
        .with_function(ops::SUBTRACT),
    )?;
    builder.register(
        FunctionBinding::new("subtract_double", double2(), |args| match args {
            [Value::Double(a), Value::Double(b)] => Value::Double(a - b),
            _ => invoked_badly("subtract_double"),
        })
        .with_function(ops::SUBTRACT),
    )?;
    builder.register(
        FunctionBinding::new(
            "subtract_duration_duration",
            vec![ArgType::Kind(Kind::Duration), ArgType::Kind(Kind::Duration)],
            |args| match args {
                [Value::Duration(a), Value::Duration(b)] => lift(arith::duration_sub(*a, *b)),
                _ => invoked_badly("subtract_duration_duration"),
            },
        )
        .with_function(ops::SUBTRACT),
    )?;
    builder.register(
        FunctionBinding::new(
            "subtract_timestamp_duration",
            vec![ArgType::Kind(Kind::Timestamp), ArgType::Kind(Kind::Duration)],
            |args| match args {
                [Value::Timestamp(t), Value::Duration(d)] => lift(arith::timestamp_sub_duration(*t, *d)),
                _ => invoked_badly("subtract_timestamp_duration"),
            },
        )
        .with_function(ops::SUBTRACT),
    )?;
    builder.register(
        FunctionBinding::new(
            "subtract_timestamp_timestamp",
            vec![ArgType::Kind(Kind::Timestamp), ArgType::Kind(Kind::Timestamp)],
            |args| match args {
                [Value::Timestamp(a), Value::Timestamp(b)] => lift(arith::timestamp_sub_timestamp(*a, *b)),
                _ => invoked_badly("subtract_timestamp_timestamp"),
            },
        )
        .with_function(ops::SUBTRACT),
    )?;

    builder.register(
        FunctionBinding::new("multiply_int64", int2(), move |args| match args {
            [Value::Int(a), Value::Int(b)] => lift(arith::int_mul(*a, *b, checked)),
            _ => invoked_badly("multiply_int64"),
        })
        .with_function(ops::MULTIPLY),
    )?;
    builder.register(
        FunctionBinding::new("multiply_uint64", uint2(), move |args| match args {
            [Value::Uint(a), Value::Uint(b)] => lift(arith::uint_mul(*a, *b, checked)),
            _ => invoked_badly("multiply_uint64"),
        })
        .with_function(ops::MULTIPLY),
    )?;
    builder.register(
        FunctionBinding::new("multiply_double", double2(), |args| match args {
            [Value::Double(a), Value::Double(b)] => Value::Double(a * b),
            _ => invoked_badly("multiply_double"),
        })
        .with_function(ops::MULTIPLY),
    )?;

    builder.register(
        FunctionBinding::new("divide_int64", int2(), move |args| match args {
            [Value::Int(a), Value::Int(b)] => lift(arith::int_div(*a, *b, checked)),
            _ => invoked_badly("divide_int64"),
        })
        .with_function(ops::DIVIDE),
    )?;
    builder.register(
        FunctionBinding::new("divide_uint64", uint2(), |args| match args {
            [Value::Uint(a), Value::Uint(b)] => lift(arith::uint_div(*a, *b)),
            _ => invoked_badly("divide_uint64"),
        })
        .with_function(ops::DIVIDE),
    )?;
    builder.register(
        FunctionBinding::new("divide_double", double2(), |args| match args {
            // IEEE 754: x / 0.0 is an infinity, not an error.
            [Value::Double(a), Value::Double(b)] => Value::Double(a / b),
            _ => invoked_badly("divide_double"),
        })
        .with_function(ops::DIVIDE),
    )?;

    builder.register(
        FunctionBinding::new("modulo_int64", int2(), |args| match args {
            [Value::Int(a), Value::Int(b)] => lift(arith::int_rem(*a, *b)),
            _ => invoked_badly("modulo_int64"),
        })
        .with_function(ops::MODULO),
    )?;
    builder.register(
        FunctionBinding::new("modulo_uint64", uint2(), |args| match args {
            [Value::Uint(a), Value::Uint(b)] => lift(arith::uint_rem(*a, *b)),
            _ => invoked_badly("modulo_uint64"),
        })
        .with_function(ops::MODULO),
    )?;

    builder.register(
        FunctionBinding::new("negate_int64", vec![ArgType::Kind(Kind::Int)], move |args| match args {
            [Value::Int(a)] => lift(arith::int_neg(*a, checked)),
            _ => invoked_badly("negate_int64"),
        })
        .with_function(ops::NEGATE),
    )?;
    builder.register(
        FunctionBinding::new("negate_double", vec![ArgType::Kind(Kind::Double)], |args| match args {
            [Value::Double(a)] => Value::Double(-a),
            _ => invoked_badly("negate_double"),
        })
        .with_function(ops::NEGATE),
    )?;
    Ok(())
}

fn register_logic(builder: &mut DispatcherBuilder) -> EvalResult<()> {
    builder.register(
        FunctionBinding::new("logical_not", vec![ArgType::Kind(Kind::Bool)], |args| match args {
            [Value::Bool(b)] => Value::Bool(!b),
            _ => invoked_badly("logical_not"),
        })
        .with_function(ops::LOGICAL_NOT),
    )?;
    // The comprehension gate: false stays false, everything else (including
    // errors and unknowns, hence non-strict) is treated as true.
    builder.register(
        FunctionBinding::new("not_strictly_false", vec![ArgType::Any], |args| match args {
            [Value::Bool(b)] => Value::Bool(*b),
            [_] => Value::Bool(true),
            _ => invoked_badly("not_strictly_false"),
        })
        .with_function(ops::NOT_STRICTLY_FALSE)
        .non_strict(),
    )?;
    Ok(())
}

fn register_collections(builder: &mut DispatcherBuilder) -> EvalResult<()> {
    builder.register(
        FunctionBinding::new("size_string", vec![ArgType::Kind(Kind::String)], |args| match args {
            // Unicode code points, not bytes.
            [Value::String(s)] => Value::Int(s.chars().count() as i64),
            _ => invoked_badly("size_string"),
        })
        .with_function("size"),
    )?;
    builder.register(
        FunctionBinding::new("size_bytes", vec![ArgType::Kind(Kind::Bytes)], |args| match args {
            [Value::Bytes(b)] => Value::Int(b.len() as i64),
            _ => invoked_badly("size_bytes"),
        })
        .with_function("size"),
    )?;
    builder.register(
        FunctionBinding::new("size_list", vec![ArgType::Kind(Kind::List)], |args| match args {
            [Value::List(items)] => Value::Int(items.len() as i64),
            _ => invoked_badly("size_list"),
        })
        .with_function("size"),
    )?;
    builder.register(
        FunctionBinding::new("size_map", vec![ArgType::Kind(Kind::Map)], |args| match args {
            [Value::Map(map)] => Value::Int(map.len() as i64),
            _ => invoked_badly("size_map"),
        })
        .with_function("size"),
    )?;
    builder.register(
        FunctionBinding::new("in_list", vec![ArgType::Any, ArgType::Kind(Kind::List)], |args| {
            match args {
                [needle, Value::List(items)] => Value::Bool(items.iter().any(|item| item.equals(needle))),
                _ => invoked_badly("in_list"),
            }
        })
        .with_function(ops::IN),
    )?;
    builder.register(
        FunctionBinding::new("in_map", vec![ArgType::Any, ArgType::Kind(Kind::Map)], |args| match args {
            [key, Value::Map(map)] => Value::Bool(map.contains_key(key)),
            _ => invoked_badly("in_map"),
        })
        .with_function(ops::IN),
    )?;
    Ok(())
}

fn register_type_fns(builder: &mut DispatcherBuilder) -> EvalResult<()> {
    builder.register(
        FunctionBinding::new("type", vec![ArgType::Any], |args| match args {
            [value] => match types::type_of(value) {
                Some(t) => Value::Type(t),
                // Strict dispatch keeps errors/unknowns out; reaching this
                // arm means the dispatcher invariant broke.
                None => Value::error(EvalError::internal("type() applied to a non-concrete value")),
            },
            _ => invoked_badly("type"),
        })
        .with_function("type"),
    )?;
    builder.register(
        FunctionBinding::new("to_dyn", vec![ArgType::Any], |args| match args {
            [value] => value.clone(),
            _ => invoked_badly("to_dyn"),
        })
        .with_function("dyn"),
    )?;
    Ok(())
}

fn register_strings(builder: &mut DispatcherBuilder, regex_size_limit: usize) -> EvalResult<()> {
    let string2 = vec![ArgType::Kind(Kind::String), ArgType::Kind(Kind::String)];
    builder.register(
        FunctionBinding::new("matches_string", string2.clone(), move |args| match args {
            [Value::String(subject), Value::String(pattern)] => {
                match RegexBuilder::new(pattern).size_limit(regex_size_limit).build() {
                    Ok(re) => Value::Bool(re.is_match(subject)),
                    Err(err) => Value::error(EvalError::invalid_argument(format!("invalid regex: {err}"))),
                }
            }
            _ => invoked_badly("matches_string"),
        })
        .with_function("matches"),
    )?;
    builder.register(
        FunctionBinding::new("contains_string", string2.clone(), |args| match args {
            [Value::String(subject), Value::String(needle)] => Value::Bool(subject.contains(needle.as_ref())),
            _ => invoked_badly("contains_string"),
        })
        .with_function("contains"),
    )?;
    builder.register(
        FunctionBinding::new("starts_with_string", string2.clone(), |args| match args {
            [Value::String(subject), Value::String(prefix)] => Value::Bool(subject.starts_with(prefix.as_ref())),
            _ => invoked_badly("starts_with_string"),
        })
        .with_function("startsWith"),
    )?;
    builder.register(
        FunctionBinding::new("ends_with_string", string2, |args| match args {
            [Value::String(subject), Value::String(suffix)] => Value::Bool(subject.ends_with(suffix.as_ref())),
            _ => invoked_badly("ends_with_string"),
        })
        .with_function("endsWith"),
    )?;
    Ok(())
}
