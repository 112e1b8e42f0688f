//! Lossless cross-kind numeric comparison and map-key normalization.
//!
//! CEL keeps `int`, `uint`, and `double` distinct at the type level but
//! compares them numerically: `1 == 1u == 1.0` holds while `1.5 == 1` does
//! not, and `(-1) == 1u` is false because there is no common value. Naive
//! `as f64` casts lose precision above 2^53, so every comparison here goes
//! through exact integer/fraction reasoning instead of widening both sides.
//!
//! ## Cross-kind hash invariant
//!
//! Map lookup must agree with equality: a map storing `{1u: "a"}` answers
//! `m[1]` and `m[1.0]` with `"a"`. That is achieved by normalizing every
//! numeric key to a canonical integer form before hashing — any value
//! representable as `i64` normalizes to the signed form, values above
//! `i64::MAX` stay unsigned, and non-integral doubles have no key form at
//! all.

use std::cmp::Ordering;

/// 2^63 as f64, the first double >= every i64.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
/// 2^64 as f64, the first double >= every u64.
const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

/// Compares a signed and an unsigned integer numerically.
#[must_use]
pub(crate) fn cmp_int_uint(i: i64, u: u64) -> Ordering {
    if i < 0 {
        Ordering::Less
    } else {
        (i as u64).cmp(&u)
    }
}

/// Compares a signed integer and a double numerically, without precision loss.
///
/// Returns `None` when the double is NaN.
#[must_use]
pub(crate) fn cmp_int_double(i: i64, d: f64) -> Option<Ordering> {
    if d.is_nan() {
        return None;
    }
    if d >= TWO_POW_63 {
        return Some(Ordering::Less);
    }
    if d < -TWO_POW_63 {
        return Some(Ordering::Greater);
    }
    // Within [-2^63, 2^63) every truncated double is exactly representable
    // as i64, so the integer parts compare exactly.
    let trunc = d.trunc() as i64;
    match i.cmp(&trunc) {
        Ordering::Equal => {
            let fract = d - d.trunc();
            Some(if fract > 0.0 {
                Ordering::Less
            } else if fract < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            })
        }
        other => Some(other),
    }
}

/// Compares an unsigned integer and a double numerically, without precision loss.
///
/// Returns `None` when the double is NaN.
#[must_use]
pub(crate) fn cmp_uint_double(u: u64, d: f64) -> Option<Ordering> {
    if d.is_nan() {
        return None;
    }
    if d >= TWO_POW_64 {
        return Some(Ordering::Less);
    }
    if d < 0.0 {
        return Some(Ordering::Greater);
    }
    let trunc = d.trunc() as u64;
    match u.cmp(&trunc) {
        Ordering::Equal => {
            let fract = d - d.trunc();
            Some(if fract > 0.0 { Ordering::Less } else { Ordering::Equal })
        }
        other => Some(other),
    }
}

/// Returns the exact `i64` form of a double, or `None` if the double is not
/// an integral value in `i64` range.
#[must_use]
pub(crate) fn exact_i64(d: f64) -> Option<i64> {
    if d.is_finite() && d.trunc() == d && d >= -TWO_POW_63 && d < TWO_POW_63 {
        Some(d as i64)
    } else {
        None
    }
}

/// Returns the exact `u64` form of a double, or `None` if the double is not
/// an integral value in `u64` range.
#[must_use]
pub(crate) fn exact_u64(d: f64) -> Option<u64> {
    if d.is_finite() && d.trunc() == d && d >= 0.0 && d < TWO_POW_64 {
        Some(d as u64)
    } else {
        None
    }
}

/// Canonical integer form shared by all numeric map keys.
///
/// Values representable as `i64` normalize to `Signed`; only unsigned values
/// above `i64::MAX` stay `Unsigned`. Equal numbers across kinds therefore
/// produce identical canonical forms, which makes derived `Hash`/`Eq` on the
/// key type agree with CEL numeric equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum CanonicalInt {
    Signed(i64),
    Unsigned(u64),
}

impl CanonicalInt {
    pub(crate) fn from_i64(i: i64) -> Self {
        Self::Signed(i)
    }

    pub(crate) fn from_u64(u: u64) -> Self {
        match i64::try_from(u) {
            Ok(i) => Self::Signed(i),
            Err(_) => Self::Unsigned(u),
        }
    }

    /// Normalizes a double key; non-integral and NaN doubles have no form.
    pub(crate) fn from_f64(d: f64) -> Option<Self> {
        if let Some(i) = exact_i64(d) {
            Some(Self::Signed(i))
        } else {
            exact_u64(d).map(Self::Unsigned)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_uint_agree_on_shared_values() {
        assert_eq!(cmp_int_uint(1, 1), Ordering::Equal);
        assert_eq!(cmp_int_uint(-1, 1), Ordering::Less);
        assert_eq!(cmp_int_uint(i64::MAX, i64::MAX as u64), Ordering::Equal);
        assert_eq!(cmp_int_uint(i64::MAX, u64::MAX), Ordering::Less);
    }

    #[test]
    fn int_double_is_lossless_near_i64_max() {
        // 2^63 - 1 is not representable as f64; the nearest double is 2^63,
        // which must compare strictly greater.
        assert_eq!(cmp_int_double(i64::MAX, TWO_POW_63), Some(Ordering::Less));
        assert_eq!(cmp_int_double(i64::MIN, -TWO_POW_63), Some(Ordering::Equal));
        assert_eq!(cmp_int_double(1, 1.5), Some(Ordering::Less));
        assert_eq!(cmp_int_double(2, 1.5), Some(Ordering::Greater));
        assert_eq!(cmp_int_double(0, f64::NAN), None);
    }

    #[test]
    fn uint_double_edges() {
        assert_eq!(cmp_uint_double(0, -0.5), Some(Ordering::Greater));
        assert_eq!(cmp_uint_double(u64::MAX, TWO_POW_64), Some(Ordering::Less));
        assert_eq!(cmp_uint_double(5, 5.0), Some(Ordering::Equal));
    }

    #[test]
    fn canonical_forms_collide_exactly_when_equal() {
        assert_eq!(CanonicalInt::from_i64(1), CanonicalInt::from_u64(1));
        assert_eq!(CanonicalInt::from_i64(1), CanonicalInt::from_f64(1.0).unwrap());
        assert_eq!(CanonicalInt::from_f64(1.5), None);
        assert_eq!(CanonicalInt::from_f64(f64::NAN), None);
        assert_ne!(CanonicalInt::from_i64(-1), CanonicalInt::from_u64(u64::MAX));
        // 2^63 fits u64 but not i64, so it stays unsigned.
        assert_eq!(
            CanonicalInt::from_u64(1 << 63),
            CanonicalInt::from_f64(TWO_POW_63).unwrap()
        );
    }
}
