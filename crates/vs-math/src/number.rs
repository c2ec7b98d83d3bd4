//! Numeric leaves of the expression tree
//!
//! A [`Number`] lives in one of three domains:
//! - `Rational`: exact, unbounded rationals
//! - `Float`: IEEE-754 doubles
//! - `Precise`: rationals rounded to a fixed count of decimal digits
//!
//! Mixed arithmetic promotes toward the least exact operand
//! (`Rational` < `Precise` < `Float`).

use crate::error::{MathError, MathResult};
use crate::precise;
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Largest integer exponent evaluated exactly
pub const MAX_EXACT_EXPONENT: i64 = 10_000;

/// Largest result size, in bits, an exact power may produce
const MAX_EXACT_BITS: u64 = 4_000_000;

/// Extra decimal digits carried by `Precise` arithmetic
pub const GUARD_DIGITS: u32 = 10;

/// Numeric domain a computation runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum NumericMode {
    /// Exact rationals and symbolic closed forms
    Exact,
    /// Machine floating point
    Float,
    /// Arbitrary precision with the given number of decimal digits
    Precise {
        /// Decimal digits kept in results
        digits: u32,
    },
}

impl NumericMode {
    /// Whether numbers stay exact in this mode
    #[inline]
    #[must_use]
    pub fn is_exact(self) -> bool {
        matches!(self, Self::Exact)
    }

    /// Closest approximate mode (`Exact` maps to `Float`)
    #[inline]
    #[must_use]
    pub fn approximate(self) -> Self {
        match self {
            Self::Exact => Self::Float,
            other => other,
        }
    }
}

impl fmt::Display for NumericMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Float => write!(f, "float64"),
            Self::Precise { digits } => write!(f, "precise({digits})"),
        }
    }
}

/// A number in one of the three domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Number {
    /// Exact rational
    Rational(BigRational),
    /// Machine double
    Float(f64),
    /// Decimal-rounded rational
    Precise {
        /// Rounded value
        value: BigRational,
        /// Significant decimal digits after the point
        digits: u32,
    },
}

impl Number {
    /// Exact integer
    #[must_use]
    pub fn integer(value: i64) -> Self {
        Self::Rational(BigRational::from_integer(BigInt::from(value)))
    }

    /// Exact integer from a big integer
    #[must_use]
    pub fn from_bigint(value: BigInt) -> Self {
        Self::Rational(BigRational::from_integer(value))
    }

    /// Exact ratio `numer / denom`
    pub fn ratio(numer: i64, denom: i64) -> MathResult<Self> {
        if denom == 0 {
            return Err(MathError::DivisionByZero);
        }
        Ok(Self::Rational(BigRational::new(numer.into(), denom.into())))
    }

    /// Exact zero
    #[must_use]
    pub fn zero() -> Self {
        Self::integer(0)
    }

    /// Exact one
    #[must_use]
    pub fn one() -> Self {
        Self::integer(1)
    }

    /// Precise number, rounded to `digits` plus guard digits
    #[must_use]
    pub fn precise(value: &BigRational, digits: u32) -> Self {
        Self::Precise {
            value: precise::round(value, digits + GUARD_DIGITS),
            digits,
        }
    }

    /// Parse a Python numeric literal into the mode's domain.
    ///
    /// Decimal literals are read exactly in `Exact` mode (`0.1` is `1/10`).
    pub fn parse_literal(text: &str, mode: NumericMode) -> MathResult<Self> {
        let cleaned: String = text.chars().filter(|c| *c != '_').collect();
        let lowered = cleaned.to_ascii_lowercase();
        if lowered.ends_with('j') {
            return Err(MathError::Unsupported(format!(
                "imaginary literal '{text}' (use I)"
            )));
        }
        let exact = parse_exact(&lowered)
            .ok_or_else(|| MathError::Domain(format!("invalid numeric literal '{text}'")))?;
        Ok(match mode {
            NumericMode::Exact => Self::Rational(exact),
            NumericMode::Float => Self::Float(ratio_to_f64(&exact)),
            NumericMode::Precise { digits } => Self::precise(&exact, digits),
        })
    }

    /// Convert into the given mode's domain (`Exact` leaves the number untouched)
    #[must_use]
    pub fn in_mode(&self, mode: NumericMode) -> Self {
        match mode {
            NumericMode::Exact => self.clone(),
            NumericMode::Float => Self::Float(self.to_f64()),
            NumericMode::Precise { digits } => match self.to_rational() {
                Some(value) => Self::precise(&value, digits),
                None => Self::Float(self.to_f64()),
            },
        }
    }

    /// Zero in this number's domain
    #[must_use]
    pub fn zero_like(&self) -> Self {
        match self {
            Self::Rational(_) => Self::zero(),
            Self::Float(_) => Self::Float(0.0),
            Self::Precise { digits, .. } => Self::precise(&BigRational::zero(), *digits),
        }
    }

    /// One in this number's domain
    #[must_use]
    pub fn one_like(&self) -> Self {
        match self {
            Self::Rational(_) => Self::one(),
            Self::Float(_) => Self::Float(1.0),
            Self::Precise { digits, .. } => Self::precise(&BigRational::one(), *digits),
        }
    }

    /// Whether the value is exactly zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Rational(r) | Self::Precise { value: r, .. } => r.is_zero(),
            Self::Float(f) => *f == 0.0,
        }
    }

    /// Whether the value is exactly one
    #[must_use]
    pub fn is_one(&self) -> bool {
        match self {
            Self::Rational(r) | Self::Precise { value: r, .. } => r.is_one(),
            #[allow(clippy::float_cmp)]
            Self::Float(f) => *f == 1.0,
        }
    }

    /// Whether the value is exactly one half
    #[must_use]
    pub fn is_one_half(&self) -> bool {
        match self {
            Self::Rational(r) | Self::Precise { value: r, .. } => {
                *r == BigRational::new(BigInt::one(), BigInt::from(2))
            }
            #[allow(clippy::float_cmp)]
            Self::Float(f) => *f == 0.5,
        }
    }

    /// Strictly below zero
    #[must_use]
    pub fn is_negative(&self) -> bool {
        match self {
            Self::Rational(r) | Self::Precise { value: r, .. } => r.is_negative(),
            Self::Float(f) => *f < 0.0,
        }
    }

    /// Whether this number is an exact rational
    #[inline]
    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Rational(_))
    }

    /// Whether the value is integral
    #[must_use]
    pub fn is_integer(&self) -> bool {
        match self {
            Self::Rational(r) | Self::Precise { value: r, .. } => r.is_integer(),
            Self::Float(f) => f.is_finite() && f.fract() == 0.0,
        }
    }

    /// Integral value as a big integer
    #[must_use]
    pub fn to_bigint(&self) -> Option<BigInt> {
        if !self.is_integer() {
            return None;
        }
        match self {
            Self::Rational(r) | Self::Precise { value: r, .. } => Some(r.to_integer()),
            Self::Float(f) => BigInt::from_f64(*f),
        }
    }

    /// Integral value as `i64`
    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        self.to_bigint()?.to_i64()
    }

    /// Nearest double
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        match self {
            Self::Rational(r) | Self::Precise { value: r, .. } => ratio_to_f64(r),
            Self::Float(f) => *f,
        }
    }

    /// Value as a rational (`None` for non-finite floats)
    #[must_use]
    pub fn to_rational(&self) -> Option<BigRational> {
        match self {
            Self::Rational(r) | Self::Precise { value: r, .. } => Some(r.clone()),
            Self::Float(f) => BigRational::from_float(*f),
        }
    }

    fn precise_digits(&self, other: &Self) -> u32 {
        let digits = |n: &Self| match n {
            Self::Precise { digits, .. } => *digits,
            _ => 0,
        };
        digits(self).max(digits(other))
    }

    fn combine(
        &self,
        other: &Self,
        exact: impl Fn(&BigRational, &BigRational) -> BigRational,
        float: impl Fn(f64, f64) -> f64,
    ) -> Self {
        match (self, other) {
            (Self::Rational(a), Self::Rational(b)) => Self::Rational(exact(a, b)),
            (Self::Float(_), _) | (_, Self::Float(_)) => {
                Self::Float(float(self.to_f64(), other.to_f64()))
            }
            _ => {
                let digits = self.precise_digits(other);
                match (self.to_rational(), other.to_rational()) {
                    (Some(a), Some(b)) => Self::precise(&exact(&a, &b), digits),
                    _ => Self::Float(float(self.to_f64(), other.to_f64())),
                }
            }
        }
    }

    /// Sum
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a + b, |a, b| a + b)
    }

    /// Difference
    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a - b, |a, b| a - b)
    }

    /// Product
    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a * b, |a, b| a * b)
    }

    /// Quotient
    pub fn div(&self, other: &Self) -> MathResult<Self> {
        if other.is_zero() {
            return Err(MathError::DivisionByZero);
        }
        Ok(self.combine(other, |a, b| a / b, |a, b| a / b))
    }

    /// Negation
    #[must_use]
    pub fn neg(&self) -> Self {
        match self {
            Self::Rational(r) => Self::Rational(-r),
            Self::Float(f) => Self::Float(-f),
            Self::Precise { value, digits } => Self::Precise {
                value: -value,
                digits: *digits,
            },
        }
    }

    /// Absolute value
    #[must_use]
    pub fn abs(&self) -> Self {
        if self.is_negative() {
            self.neg()
        } else {
            self.clone()
        }
    }

    /// Largest integer not above the value, in the same domain
    #[must_use]
    pub fn floor(&self) -> Self {
        match self {
            Self::Rational(r) => Self::Rational(r.floor()),
            Self::Float(f) => Self::Float(f.floor()),
            Self::Precise { value, digits } => Self::Precise {
                value: value.floor(),
                digits: *digits,
            },
        }
    }

    /// Floor division (`//`)
    pub fn floor_div(&self, other: &Self) -> MathResult<Self> {
        Ok(self.div(other)?.floor())
    }

    /// Python modulo: result takes the sign of the divisor
    pub fn modulo(&self, other: &Self) -> MathResult<Self> {
        let quotient = self.floor_div(other)?;
        Ok(self.sub(&other.mul(&quotient)))
    }

    /// Ordering by value across domains
    #[must_use]
    pub fn cmp_value(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Float(_), _) | (_, Self::Float(_)) => self.to_f64().partial_cmp(&other.to_f64()),
            _ => match (self.to_rational(), other.to_rational()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
        }
    }

    /// Power.
    ///
    /// `Ok(None)` means the exact result is irrational and the caller
    /// should keep the power symbolic.
    pub fn pow(&self, exponent: &Self) -> MathResult<Option<Self>> {
        if exponent.is_zero() {
            return Ok(Some(self.one_like()));
        }
        if self.is_zero() {
            if exponent.is_negative() {
                return Err(MathError::DivisionByZero);
            }
            return Ok(Some(self.clone()));
        }
        match (self, exponent) {
            (Self::Float(_), _) | (_, Self::Float(_)) => {
                let value = match exponent.to_i64() {
                    Some(n) if n.abs() <= i64::from(i32::MAX) => {
                        #[allow(clippy::cast_possible_truncation)]
                        self.to_f64().powi(n as i32)
                    }
                    _ => self.to_f64().powf(exponent.to_f64()),
                };
                if value.is_nan() {
                    return Err(MathError::Domain(format!(
                        "{self} ** {exponent} is not a real number"
                    )));
                }
                if value.is_infinite() {
                    return Err(MathError::Overflow(format!("{self} ** {exponent}")));
                }
                Ok(Some(Self::Float(value)))
            }
            (Self::Rational(base), Self::Rational(exp)) => exact_pow(base, exp),
            _ => {
                let digits = self.precise_digits(exponent);
                precise_pow(self, exponent, digits).map(Some)
            }
        }
    }

    /// Render with at most `places` digits after the decimal point
    #[must_use]
    pub fn to_decimal_string(&self, places: u32) -> String {
        match self.to_rational() {
            Some(r) => precise::format_decimal(&r, places),
            None => format!("{}", self.to_f64()),
        }
    }
}

fn checked_exponent(exp: &BigRational) -> MathResult<i64> {
    let n = exp
        .to_integer()
        .to_i64()
        .filter(|n| n.abs() <= MAX_EXACT_EXPONENT)
        .ok_or_else(|| MathError::ExponentTooLarge(exp.to_string()))?;
    Ok(n)
}

fn int_pow(base: &BigRational, n: i64) -> MathResult<BigRational> {
    let magnitude = n.unsigned_abs();
    let bits = base.numer().bits().max(base.denom().bits());
    if bits.saturating_mul(magnitude) > MAX_EXACT_BITS {
        return Err(MathError::ExponentTooLarge(n.to_string()));
    }
    #[allow(clippy::cast_possible_truncation)]
    let m = magnitude as u32;
    let numer = base.numer().pow(m);
    let denom = base.denom().pow(m);
    if n >= 0 {
        Ok(BigRational::new(numer, denom))
    } else if numer.is_zero() {
        Err(MathError::DivisionByZero)
    } else {
        Ok(BigRational::new(denom, numer))
    }
}

fn exact_pow(base: &BigRational, exp: &BigRational) -> MathResult<Option<Number>> {
    if exp.is_integer() {
        let n = checked_exponent(exp)?;
        return int_pow(base, n).map(|r| Some(Number::Rational(r)));
    }
    if base.is_negative() {
        return Ok(None);
    }
    let Some(q) = exp.denom().to_u32().filter(|q| *q <= 64) else {
        return Ok(None);
    };
    let root_numer = base.numer().nth_root(q);
    let root_denom = base.denom().nth_root(q);
    if root_numer.pow(q) != *base.numer() || root_denom.pow(q) != *base.denom() {
        return Ok(None);
    }
    let root = BigRational::new(root_numer, root_denom);
    let p = checked_exponent(&BigRational::from_integer(exp.numer().clone()))?;
    int_pow(&root, p).map(|r| Some(Number::Rational(r)))
}

fn precise_pow(base: &Number, exp: &Number, digits: u32) -> MathResult<Number> {
    let working = digits + GUARD_DIGITS;
    let (Some(b), Some(e)) = (base.to_rational(), exp.to_rational()) else {
        return Err(MathError::Overflow("non-finite operand".into()));
    };
    if e.is_integer() {
        if let Ok(n) = checked_exponent(&e) {
            return Ok(Number::precise(&int_pow(&b, n)?, digits));
        }
    }
    if b.is_negative() {
        return Err(MathError::Domain(format!(
            "{base} ** {exp} is not a real number"
        )));
    }
    let log = precise::ln(&b, working)?;
    let value = precise::exp(&(log * e), working)?;
    Ok(Number::precise(&value, digits))
}

/// Exact value of a decimal, hex, octal or binary literal
fn parse_exact(text: &str) -> Option<BigRational> {
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if let Some(digits) = text.strip_prefix(prefix) {
            return BigInt::parse_bytes(digits.as_bytes(), radix).map(BigRational::from_integer);
        }
    }
    let (mantissa, exponent) = match text.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().ok()?),
        None => (text, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    let digits = format!("{whole}{fraction}");
    let numer = BigInt::parse_bytes(digits.as_bytes(), 10)?;
    let scale = i32::try_from(fraction.len()).ok()? - exponent;
    let ten = BigInt::from(10);
    Some(if scale >= 0 {
        BigRational::new(numer, ten.pow(scale.unsigned_abs()))
    } else {
        BigRational::from_integer(numer * ten.pow(scale.unsigned_abs()))
    })
}

/// Nearest double to a rational, robust to operands beyond `f64` range
pub(crate) fn ratio_to_f64(r: &BigRational) -> f64 {
    let (numer, denom) = (r.numer(), r.denom());
    if let (Some(a), Some(b)) = (numer.to_f64(), denom.to_f64()) {
        if a.is_finite() && b.is_finite() {
            return a / b;
        }
    }
    let shift_n = numer.bits().saturating_sub(960);
    let shift_d = denom.bits().saturating_sub(960);
    #[allow(clippy::cast_possible_truncation)]
    let (a, b) = (
        (numer >> (shift_n as usize)).to_f64().unwrap_or(f64::NAN),
        (denom >> (shift_d as usize)).to_f64().unwrap_or(f64::NAN),
    );
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let scale = (shift_n as i64 - shift_d as i64).clamp(-2000, 2000) as i32;
    (a / b) * 2f64.powi(scale)
}

/// Greatest common divisor of two integers
#[must_use]
pub fn gcd(a: &BigInt, b: &BigInt) -> BigInt {
    a.gcd(b)
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rational(r) => {
                if r.is_integer() {
                    write!(f, "{}", r.numer())
                } else {
                    write!(f, "{}/{}", r.numer(), r.denom())
                }
            }
            Self::Float(x) => {
                if x.is_infinite() {
                    write!(f, "{}", if *x > 0.0 { "inf" } else { "-inf" })
                } else {
                    write!(f, "{x:?}")
                }
            }
            Self::Precise { value, digits } => {
                write!(f, "{}", precise::format_decimal(value, *digits))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exact_literals_are_rational() {
        let n = Number::parse_literal("0.1", NumericMode::Exact).unwrap();
        assert_eq!(n, Number::ratio(1, 10).unwrap());
        let n = Number::parse_literal("2.5e-1", NumericMode::Exact).unwrap();
        assert_eq!(n, Number::ratio(1, 4).unwrap());
        let n = Number::parse_literal("1_000", NumericMode::Exact).unwrap();
        assert_eq!(n, Number::integer(1000));
    }

    #[test]
    fn test_float_literal_mode() {
        let n = Number::parse_literal("0.1", NumericMode::Float).unwrap();
        assert_eq!(n, Number::Float(0.1));
    }

    #[test]
    fn test_imaginary_literal_rejected() {
        assert!(Number::parse_literal("2j", NumericMode::Exact).is_err());
    }

    #[test]
    fn test_promotion() {
        let third = Number::ratio(1, 3).unwrap();
        assert!(third.add(&third).is_exact());
        assert!(matches!(third.add(&Number::Float(1.0)), Number::Float(_)));
        let p = Number::precise(&BigRational::one(), 30);
        assert!(matches!(third.mul(&p), Number::Precise { digits: 30, .. }));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            Number::one().div(&Number::zero()),
            Err(MathError::DivisionByZero)
        );
        assert_eq!(
            Number::Float(1.0).div(&Number::Float(0.0)),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn test_exact_roots() {
        let eight = Number::integer(8);
        let third = Number::ratio(1, 3).unwrap();
        assert_eq!(eight.pow(&third).unwrap(), Some(Number::integer(2)));
        let two = Number::integer(2);
        let half = Number::ratio(1, 2).unwrap();
        assert_eq!(two.pow(&half).unwrap(), None);
        assert_eq!(
            two.pow(&Number::integer(-2)).unwrap(),
            Some(Number::ratio(1, 4).unwrap())
        );
    }

    #[test]
    fn test_exponent_limit() {
        let result = Number::integer(3).pow(&Number::integer(MAX_EXACT_EXPONENT + 1));
        assert!(matches!(result, Err(MathError::ExponentTooLarge(_))));
    }

    #[test]
    fn test_python_modulo() {
        let r = Number::integer(-7).modulo(&Number::integer(3)).unwrap();
        assert_eq!(r, Number::integer(2));
        let q = Number::integer(-7).floor_div(&Number::integer(2)).unwrap();
        assert_eq!(q, Number::integer(-4));
    }

    #[test]
    fn test_display() {
        assert_eq!(Number::ratio(-2, 6).unwrap().to_string(), "-1/3");
        assert_eq!(Number::Float(4.0).to_string(), "4.0");
        let p = Number::parse_literal("0.125", NumericMode::Precise { digits: 5 }).unwrap();
        assert_eq!(p.to_string(), "0.125");
    }

    #[test]
    fn test_precise_fractional_power() {
        let two = Number::precise(&BigRational::from_integer(2.into()), 40);
        let half = Number::precise(&BigRational::new(1.into(), 2.into()), 40);
        let root = two.pow(&half).unwrap().unwrap();
        assert!((root.to_f64() - std::f64::consts::SQRT_2).abs() < 1e-15);
    }

    #[test]
    fn test_huge_ratio_to_f64() {
        let big = BigInt::from(10).pow(400);
        let r = BigRational::new(big.clone() * 3, big);
        assert!((ratio_to_f64(&r) - 3.0).abs() < 1e-12);
    }
}
