//! Bounded arithmetic for the standard operator overloads.
//!
//! With overflow checking enabled (the default) signed/unsigned overflow,
//! unsigned underflow, and `i64::MIN / -1` fail with `Overflow`, and any
//! division or modulo by zero fails with `DivideByZero`. With checking
//! disabled the integer operations wrap. Double arithmetic is IEEE 754
//! throughout: division by zero yields an infinity, never an error.

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    error::{EvalError, EvalResult},
    value::Value,
};

pub(crate) fn int_add(a: i64, b: i64, checked: bool) -> EvalResult<Value> {
    if checked {
        a.checked_add(b).map(Value::Int).ok_or_else(|| EvalError::overflow("addition"))
    } else {
        Ok(Value::Int(a.wrapping_add(b)))
    }
}

pub(crate) fn int_sub(a: i64, b: i64, checked: bool) -> EvalResult<Value> {
    if checked {
        a.checked_sub(b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("subtraction"))
    } else {
        Ok(Value::Int(a.wrapping_sub(b)))
    }
}

pub(crate) fn int_mul(a: i64, b: i64, checked: bool) -> EvalResult<Value> {
    if checked {
        a.checked_mul(b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("multiplication"))
    } else {
        Ok(Value::Int(a.wrapping_mul(b)))
    }
}

/// Signed division. `MIN / -1` is an overflow when checking is enabled.
pub(crate) fn int_div(a: i64, b: i64, checked: bool) -> EvalResult<Value> {
    if b == 0 {
        return Err(EvalError::divide_by_zero());
    }
    if checked {
        a.checked_div(b).map(Value::Int).ok_or_else(|| EvalError::overflow("division"))
    } else {
        Ok(Value::Int(a.wrapping_div(b)))
    }
}

/// Signed modulo. `MIN % -1` is mathematically 0, so it never overflows.
pub(crate) fn int_rem(a: i64, b: i64) -> EvalResult<Value> {
    if b == 0 {
        return Err(EvalError::modulus_by_zero());
    }
    Ok(Value::Int(a.wrapping_rem(b)))
}

pub(crate) fn int_neg(a: i64, checked: bool) -> EvalResult<Value> {
    if checked {
        a.checked_neg().map(Value::Int).ok_or_else(|| EvalError::overflow("negation"))
    } else {
        Ok(Value::Int(a.wrapping_neg()))
    }
}

pub(crate) fn uint_add(a: u64, b: u64, checked: bool) -> EvalResult<Value> {
    if checked {
        a.checked_add(b)
            .map(Value::Uint)
            .ok_or_else(|| EvalError::overflow("unsigned addition"))
    } else {
        Ok(Value::Uint(a.wrapping_add(b)))
    }
}

/// Unsigned subtraction. Underflow fails explicitly even though the wrapped
/// result would be representable.
pub(crate) fn uint_sub(a: u64, b: u64, checked: bool) -> EvalResult<Value> {
    if checked {
        a.checked_sub(b)
            .map(Value::Uint)
            .ok_or_else(|| EvalError::overflow("unsigned subtraction"))
    } else {
        Ok(Value::Uint(a.wrapping_sub(b)))
    }
}

pub(crate) fn uint_mul(a: u64, b: u64, checked: bool) -> EvalResult<Value> {
    if checked {
        a.checked_mul(b)
            .map(Value::Uint)
            .ok_or_else(|| EvalError::overflow("unsigned multiplication"))
    } else {
        Ok(Value::Uint(a.wrapping_mul(b)))
    }
}

pub(crate) fn uint_div(a: u64, b: u64) -> EvalResult<Value> {
    if b == 0 {
        return Err(EvalError::divide_by_zero());
    }
    Ok(Value::Uint(a / b))
}

pub(crate) fn uint_rem(a: u64, b: u64) -> EvalResult<Value> {
    if b == 0 {
        return Err(EvalError::modulus_by_zero());
    }
    Ok(Value::Uint(a % b))
}

pub(crate) fn duration_add(a: TimeDelta, b: TimeDelta) -> EvalResult<Value> {
    match a.checked_add(&b) {
        Some(sum) => Value::duration(sum),
        None => Err(EvalError::overflow("duration addition")),
    }
}

pub(crate) fn duration_sub(a: TimeDelta, b: TimeDelta) -> EvalResult<Value> {
    match a.checked_sub(&b) {
        Some(diff) => Value::duration(diff),
        None => Err(EvalError::overflow("duration subtraction")),
    }
}

pub(crate) fn timestamp_add_duration(t: DateTime<Utc>, d: TimeDelta) -> EvalResult<Value> {
    t.checked_add_signed(d)
        .map(Value::Timestamp)
        .ok_or_else(|| EvalError::overflow("timestamp addition"))
}

pub(crate) fn timestamp_sub_duration(t: DateTime<Utc>, d: TimeDelta) -> EvalResult<Value> {
    t.checked_sub_signed(d)
        .map(Value::Timestamp)
        .ok_or_else(|| EvalError::overflow("timestamp subtraction"))
}

pub(crate) fn timestamp_sub_timestamp(a: DateTime<Utc>, b: DateTime<Utc>) -> EvalResult<Value> {
    Value::duration(a.signed_duration_since(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn checked_overflow_fails_unchecked_wraps() {
        assert_eq!(int_add(i64::MAX, 1, true).unwrap_err().kind(), ErrorKind::Overflow);
        assert_eq!(int_add(i64::MAX, 1, false).unwrap(), Value::Int(i64::MIN));
        assert_eq!(uint_add(u64::MAX, 1, true).unwrap_err().kind(), ErrorKind::Overflow);
        assert_eq!(uint_sub(0, 1, true).unwrap_err().kind(), ErrorKind::Overflow);
    }

    #[test]
    fn min_div_negative_one() {
        assert_eq!(int_div(i64::MIN, -1, true).unwrap_err().kind(), ErrorKind::Overflow);
        assert_eq!(int_div(i64::MIN, -1, false).unwrap(), Value::Int(i64::MIN));
        assert_eq!(int_rem(i64::MIN, -1).unwrap(), Value::Int(0));
    }

    #[test]
    fn zero_divisors() {
        assert_eq!(int_div(1, 0, true).unwrap_err().kind(), ErrorKind::DivideByZero);
        assert_eq!(uint_rem(1, 0).unwrap_err().kind(), ErrorKind::DivideByZero);
    }
}
