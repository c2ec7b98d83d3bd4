//! Arbitrary-precision elementary functions over rationals
//!
//! Every routine takes a working precision in decimal digits and rounds
//! intermediate values to it, so denominators stay bounded.

use crate::error::{MathError, MathResult};
use crate::number::ratio_to_f64;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

const MAX_SERIES_TERMS: usize = 10_000;

fn ten_pow(digits: u32) -> BigInt {
    BigInt::from(10).pow(digits)
}

fn epsilon(digits: u32) -> BigRational {
    BigRational::new(BigInt::one(), ten_pow(digits))
}

fn int(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

/// Round to `digits` decimal places, half away from zero
pub(crate) fn round(value: &BigRational, digits: u32) -> BigRational {
    let scale = BigRational::from_integer(ten_pow(digits));
    (value * &scale).round() / scale
}

/// Decimal rendering with up to `places` digits after the point, trailing zeros trimmed
pub(crate) fn format_decimal(value: &BigRational, places: u32) -> String {
    let scaled = (value.abs() * BigRational::from_integer(ten_pow(places)))
        .round()
        .to_integer();
    let mut digits = scaled.to_string();
    let width = places as usize + 1;
    if digits.len() < width {
        digits = format!("{}{digits}", "0".repeat(width - digits.len()));
    }
    let split = digits.len() - places as usize;
    let (whole, fraction) = digits.split_at(split);
    let fraction = fraction.trim_end_matches('0');
    let sign = if value.is_negative() && !scaled.is_zero() { "-" } else { "" };
    if fraction.is_empty() {
        format!("{sign}{whole}.0")
    } else {
        format!("{sign}{whole}.{fraction}")
    }
}

/// π by Machin's formula
pub(crate) fn pi(digits: u32) -> BigRational {
    let working = digits + 5;
    let value = int(16) * atan_inverse(5, working) - int(4) * atan_inverse(239, working);
    round(&value, digits)
}

/// atan(1/n) for integer n > 1
fn atan_inverse(n: i64, digits: u32) -> BigRational {
    let eps = epsilon(digits);
    let n_big = BigInt::from(n);
    let n_squared = &n_big * &n_big;
    let mut power = n_big;
    let mut sum = BigRational::zero();
    for k in 0..MAX_SERIES_TERMS {
        let odd = BigInt::from(2 * k + 1);
        let term = BigRational::new(BigInt::one(), &odd * &power);
        if term < eps {
            break;
        }
        if k % 2 == 0 {
            sum += term;
        } else {
            sum -= term;
        }
        power *= &n_squared;
    }
    round(&sum, digits)
}

/// Square root by Newton iteration
pub(crate) fn sqrt(x: &BigRational, digits: u32) -> MathResult<BigRational> {
    if x.is_negative() {
        return Err(MathError::Domain("square root of a negative number".into()));
    }
    if x.is_zero() {
        return Ok(BigRational::zero());
    }
    let eps = epsilon(digits + 2);
    let estimate = ratio_to_f64(x).sqrt();
    let mut guess = if estimate.is_finite() && estimate > 0.0 {
        BigRational::from_float(estimate).unwrap_or_else(BigRational::one)
    } else {
        x.clone()
    };
    let two = int(2);
    for _ in 0..200 {
        let next = round(&((&guess + x / &guess) / &two), digits + 4);
        let delta = (&next - &guess).abs();
        guess = next;
        if delta < eps {
            return Ok(round(&guess, digits));
        }
    }
    Err(MathError::NoConvergence("square root".into()))
}

/// e^x with argument halving and Taylor series
pub(crate) fn exp(x: &BigRational, digits: u32) -> MathResult<BigRational> {
    if x.is_zero() {
        return Ok(BigRational::one());
    }
    if x.abs() > int(100_000) {
        return Err(MathError::Overflow(format!("exp({})", ratio_to_f64(x))));
    }
    let half = BigRational::new(BigInt::one(), BigInt::from(2));
    let mut reduced = x.clone();
    let mut halvings = 0u32;
    while reduced.abs() > half {
        reduced /= int(2);
        halvings += 1;
    }
    let working = digits + halvings / 3 + 4;
    let eps = epsilon(working);
    let mut term = BigRational::one();
    let mut sum = BigRational::one();
    for n in 1..MAX_SERIES_TERMS {
        term = round(&(term * &reduced / int(n as i64)), working);
        if term.abs() < eps {
            break;
        }
        sum += &term;
    }
    for _ in 0..halvings {
        sum = round(&(&sum * &sum), working);
    }
    Ok(round(&sum, digits))
}

/// atanh(z) for |z| < 1 by its odd power series
fn atanh_series(z: &BigRational, digits: u32) -> BigRational {
    let eps = epsilon(digits);
    let z_squared = z * z;
    let mut power = z.clone();
    let mut sum = BigRational::zero();
    for k in 0..MAX_SERIES_TERMS {
        let term = round(&(&power / int(2 * k as i64 + 1)), digits);
        if term.abs() < eps {
            break;
        }
        sum += term;
        power = round(&(power * &z_squared), digits);
    }
    sum
}

/// Natural logarithm
pub(crate) fn ln(x: &BigRational, digits: u32) -> MathResult<BigRational> {
    if !x.is_positive() {
        return Err(MathError::Domain("logarithm of a non-positive number".into()));
    }
    let working = digits + 6;
    let two = int(2);
    let half = BigRational::new(BigInt::one(), two.to_integer());
    #[allow(clippy::cast_possible_wrap)]
    let mut k = x.numer().bits() as i64 - x.denom().bits() as i64;
    let mut m = if k >= 0 {
        x / BigRational::from_integer(two.to_integer().pow(k.unsigned_abs() as u32))
    } else {
        x * BigRational::from_integer(two.to_integer().pow(k.unsigned_abs() as u32))
    };
    while m > BigRational::one() {
        m /= &two;
        k += 1;
    }
    while m < half {
        m *= &two;
        k -= 1;
    }
    let one = BigRational::one();
    let z = (&m - &one) / (&m + &one);
    let ln_m = atanh_series(&z, working) * &two;
    let ln_two = atanh_series(&BigRational::new(BigInt::one(), BigInt::from(3)), working) * &two;
    Ok(round(&(ln_m + ln_two * int(k)), digits))
}

/// Reduce x into [-π, π]
fn reduce_angle(x: &BigRational, digits: u32) -> BigRational {
    let magnitude = ratio_to_f64(x).abs().max(1.0).log10().ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let extra = if magnitude.is_finite() { magnitude as u32 } else { 0 };
    let two_pi = pi(digits + extra + 4) * int(2);
    let turns = (x / &two_pi).round();
    x - turns * two_pi
}

fn taylor_trig(x: &BigRational, digits: u32, start_with_one: bool) -> BigRational {
    let eps = epsilon(digits);
    let x_squared = x * x;
    let (mut term, first) = if start_with_one {
        (BigRational::one(), 0i64)
    } else {
        (x.clone(), 1i64)
    };
    let mut sum = term.clone();
    let mut n = first;
    for _ in 0..MAX_SERIES_TERMS {
        let denom = int((n + 1) * (n + 2));
        term = round(&(-term * &x_squared / denom), digits);
        if term.abs() < eps {
            break;
        }
        sum += &term;
        n += 2;
    }
    sum
}

/// Sine
pub(crate) fn sin(x: &BigRational, digits: u32) -> BigRational {
    let working = digits + 4;
    let r = reduce_angle(x, working);
    round(&taylor_trig(&r, working, false), digits)
}

/// Cosine
pub(crate) fn cos(x: &BigRational, digits: u32) -> BigRational {
    let working = digits + 4;
    let r = reduce_angle(x, working);
    round(&taylor_trig(&r, working, true), digits)
}

/// Arc tangent
pub(crate) fn atan(x: &BigRational, digits: u32) -> MathResult<BigRational> {
    let working = digits + 6;
    let one = BigRational::one();
    if x.abs() > one {
        let half_pi = pi(working) / int(2);
        let inner = atan(&x.recip(), working)?;
        let value = if x.is_negative() {
            -half_pi - inner
        } else {
            half_pi - inner
        };
        return Ok(round(&value, digits));
    }
    let mut reduced = x.clone();
    let mut doublings = 0u32;
    let threshold = BigRational::new(BigInt::from(2), BigInt::from(5));
    while reduced.abs() > threshold {
        let root = sqrt(&(&one + &reduced * &reduced), working)?;
        reduced = round(&(&reduced / (&one + root)), working);
        doublings += 1;
    }
    let eps = epsilon(working);
    let x_squared = &reduced * &reduced;
    let mut power = reduced.clone();
    let mut sum = BigRational::zero();
    for k in 0..MAX_SERIES_TERMS {
        let term = round(&(&power / int(2 * k as i64 + 1)), working);
        if term.abs() < eps {
            break;
        }
        if k % 2 == 0 {
            sum += term;
        } else {
            sum -= term;
        }
        power = round(&(power * &x_squared), working);
    }
    let scale = BigRational::from_integer(BigInt::from(2).pow(doublings));
    Ok(round(&(sum * scale), digits))
}

/// Arc sine
pub(crate) fn asin(x: &BigRational, digits: u32) -> MathResult<BigRational> {
    let one = BigRational::one();
    if x.abs() > one {
        return Err(MathError::Domain("asin argument outside [-1, 1]".into()));
    }
    if x.abs() == one {
        let half_pi = pi(digits) / int(2);
        return Ok(if x.is_negative() { -half_pi } else { half_pi });
    }
    let root = sqrt(&(&one - x * x), digits + 4)?;
    atan(&(x / root), digits)
}

/// Arc cosine
pub(crate) fn acos(x: &BigRational, digits: u32) -> MathResult<BigRational> {
    let half_pi = pi(digits + 4) / int(2);
    Ok(round(&(half_pi - asin(x, digits + 4)?), digits))
}

/// Tangent
pub(crate) fn tan(x: &BigRational, digits: u32) -> MathResult<BigRational> {
    let c = cos(x, digits + 4);
    if c.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    Ok(round(&(sin(x, digits + 4) / c), digits))
}

/// Euler's number
pub(crate) fn e(digits: u32) -> BigRational {
    exp(&BigRational::one(), digits).unwrap_or_else(|_| BigRational::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(value: &BigRational, expected: f64) -> bool {
        (ratio_to_f64(value) - expected).abs() < 1e-14
    }

    #[test]
    fn test_pi_digits() {
        let p = pi(40);
        assert_eq!(
            format_decimal(&p, 30),
            "3.14159265358979323846264338328"
        );
    }

    #[test]
    fn test_elementary_functions() {
        let one = BigRational::one();
        assert!(close(&exp(&one, 30).unwrap(), std::f64::consts::E));
        assert!(close(&ln(&int(10), 30).unwrap(), std::f64::consts::LN_10));
        assert!(close(&sqrt(&int(2), 30).unwrap(), std::f64::consts::SQRT_2));
        assert!(close(&sin(&one, 30), 1f64.sin()));
        assert!(close(&cos(&int(10), 30), 10f64.cos()));
        assert!(close(&atan(&int(3), 30).unwrap(), 3f64.atan()));
        let half = BigRational::new(BigInt::one(), BigInt::from(2));
        assert!(close(&asin(&half, 30).unwrap(), 0.5f64.asin()));
    }

    #[test]
    fn test_domain_errors() {
        assert!(ln(&BigRational::zero(), 20).is_err());
        assert!(sqrt(&int(-1), 20).is_err());
        assert!(asin(&int(2), 20).is_err());
    }

    #[test]
    fn test_format_decimal() {
        let v = BigRational::new(BigInt::from(-1), BigInt::from(8));
        assert_eq!(format_decimal(&v, 10), "-0.125");
        assert_eq!(format_decimal(&int(3), 10), "3.0");
    }
}
