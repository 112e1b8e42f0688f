#![doc = include_str!("../../../README.md")]
#![expect(clippy::float_cmp, reason = "lossless numeric semantics require exact float comparison")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is range-checked first")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts follow explicit sign checks")]
#![expect(clippy::cast_possible_wrap, reason = "length-to-int casts stay far below i64::MAX")]

mod activation;
mod arith;
mod ast;
mod attribute;
mod dispatch;
mod error;
mod interp;
mod listener;
mod numeric;
mod options;
mod program;
mod scope;
mod stdlib;
mod types;
mod unknown;
mod value;

pub use crate::{
    activation::{Activation, VariableResolver},
    ast::{
        AstBuilder, CheckedAst, Constant, Expr, ExprId, ExprKind, MapEntryExpr, Reference, ReferenceMap,
        SourceInfo, StructFieldExpr, ops,
    },
    attribute::{Attribute, AttributePattern, PatternQualifier, Qualifier},
    dispatch::{ArgType, Dispatcher, DispatcherBuilder, FunctionBinding},
    error::{ErrorKind, EvalError, EvalResult},
    listener::{EvalListener, NoopListener, RecordingListener, StderrListener},
    options::{DEFAULT_MAX_UNKNOWN_ENTRIES, DEFAULT_REGEX_SIZE_LIMIT, EvalOptions},
    program::{Program, ResolvableAttributePattern, UnknownContext},
    types::{CelType, DynProvider, DynStruct, StructValue, TypeProvider, ValueProvider},
    unknown::UnknownSet,
    value::{Kind, MapKey, MapValue, OptionalValue, Value},
};
