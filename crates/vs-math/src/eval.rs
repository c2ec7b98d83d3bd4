//! Numeric evaluation of expressions
//!
//! - [`eval_number`]: real evaluation in an approximate [`NumericMode`]
//! - [`eval_complex`]: `f64` complex evaluation, used to compare results
//!   produced in different domains
//! - [`to_mode`] / [`evalf`]: push every numeric leaf into a domain while
//!   keeping free symbols

use crate::error::{MathError, MathResult};
use crate::expr::{Constant, Expr, Func};
use crate::number::{Number, NumericMode, GUARD_DIGITS};
use crate::precise;
use num_complex::Complex64;
use std::collections::BTreeMap;

/// Value of a named constant in an approximate mode
pub fn constant_value(constant: Constant, mode: NumericMode) -> MathResult<Number> {
    match (constant, mode.approximate()) {
        (Constant::Pi, NumericMode::Precise { digits }) => {
            Ok(Number::precise(&precise::pi(digits + GUARD_DIGITS), digits))
        }
        (Constant::E, NumericMode::Precise { digits }) => {
            Ok(Number::precise(&precise::e(digits + GUARD_DIGITS), digits))
        }
        (Constant::Pi, _) => Ok(Number::Float(std::f64::consts::PI)),
        (Constant::E, _) => Ok(Number::Float(std::f64::consts::E)),
        (Constant::Infinity, NumericMode::Float) => Ok(Number::Float(f64::INFINITY)),
        (Constant::Infinity, _) => Err(MathError::Overflow("infinity has no finite value".into())),
        (Constant::I, _) => Err(MathError::Domain("value is complex".into())),
    }
}

/// Apply an elementary function to an approximate number in its own domain
pub(crate) fn real_function(func: Func, x: &Number) -> MathResult<Number> {
    match x {
        Number::Precise { value, digits } => {
            let working = digits + GUARD_DIGITS;
            let result = match func {
                Func::Sin => precise::sin(value, working),
                Func::Cos => precise::cos(value, working),
                Func::Tan => precise::tan(value, working)?,
                Func::Asin => precise::asin(value, working)?,
                Func::Acos => precise::acos(value, working)?,
                Func::Atan => precise::atan(value, working)?,
                Func::Exp => precise::exp(value, working)?,
                Func::Log => precise::ln(value, working)?,
                Func::Abs => return Ok(x.abs()),
            };
            Ok(Number::precise(&result, *digits))
        }
        _ => float_function(func, x.to_f64()).map(Number::Float),
    }
}

fn float_function(func: Func, v: f64) -> MathResult<f64> {
    let result = match func {
        Func::Sin => v.sin(),
        Func::Cos => v.cos(),
        Func::Tan => v.tan(),
        Func::Asin | Func::Acos if v.abs() > 1.0 => {
            return Err(MathError::Domain(format!("{}({v}) is outside [-1, 1]", func.name())));
        }
        Func::Asin => v.asin(),
        Func::Acos => v.acos(),
        Func::Atan => v.atan(),
        Func::Exp => v.exp(),
        Func::Log if v <= 0.0 => {
            return Err(MathError::Domain(format!("log({v}) is undefined over the reals")));
        }
        Func::Log => v.ln(),
        Func::Abs => v.abs(),
    };
    if result.is_nan() {
        return Err(MathError::Domain(format!("{}({v})", func.name())));
    }
    if result.is_infinite() && v.is_finite() {
        return Err(MathError::Overflow(format!("{}({v})", func.name())));
    }
    Ok(result)
}

/// Evaluate to a real number in `mode` (`Exact` evaluates as `Float`)
pub fn eval_number(
    expr: &Expr,
    env: &BTreeMap<String, Number>,
    mode: NumericMode,
) -> MathResult<Number> {
    let mode = mode.approximate();
    match expr {
        Expr::Num(n) => Ok(n.in_mode(mode)),
        Expr::Sym(name) => env
            .get(name)
            .map(|n| n.in_mode(mode))
            .ok_or_else(|| MathError::FreeSymbol(name.clone())),
        Expr::Const(c) => constant_value(*c, mode),
        Expr::Add(terms) => {
            let mut total = Number::zero().in_mode(mode);
            for term in terms {
                total = total.add(&eval_number(term, env, mode)?);
            }
            Ok(total)
        }
        Expr::Mul(factors) => {
            let mut total = Number::one().in_mode(mode);
            for factor in factors {
                total = total.mul(&eval_number(factor, env, mode)?);
            }
            Ok(total)
        }
        Expr::Pow(base, exp) => {
            let b = eval_number(base, env, mode)?;
            let e = eval_number(exp, env, mode)?;
            match b.pow(&e)? {
                Some(n) => Ok(n),
                None => Number::Float(b.to_f64())
                    .pow(&Number::Float(e.to_f64()))?
                    .ok_or_else(|| MathError::Domain(format!("{b} ** {e}"))),
            }
        }
        Expr::Func(func, arg) => real_function(*func, &eval_number(arg, env, mode)?),
    }
}

/// Evaluate to a complex double
pub fn eval_complex(expr: &Expr, env: &BTreeMap<String, Complex64>) -> MathResult<Complex64> {
    let value = match expr {
        Expr::Num(n) => Complex64::new(n.to_f64(), 0.0),
        Expr::Sym(name) => *env
            .get(name)
            .ok_or_else(|| MathError::FreeSymbol(name.clone()))?,
        Expr::Const(Constant::Pi) => Complex64::new(std::f64::consts::PI, 0.0),
        Expr::Const(Constant::E) => Complex64::new(std::f64::consts::E, 0.0),
        Expr::Const(Constant::I) => Complex64::new(0.0, 1.0),
        Expr::Const(Constant::Infinity) => {
            return Err(MathError::Overflow("infinity has no finite value".into()));
        }
        Expr::Add(terms) => {
            let mut total = Complex64::new(0.0, 0.0);
            for term in terms {
                total += eval_complex(term, env)?;
            }
            total
        }
        Expr::Mul(factors) => {
            let mut total = Complex64::new(1.0, 0.0);
            for factor in factors {
                total *= eval_complex(factor, env)?;
            }
            total
        }
        Expr::Pow(base, exp) => complex_power(eval_complex(base, env)?, eval_complex(exp, env)?)?,
        Expr::Func(func, arg) => {
            let z = eval_complex(arg, env)?;
            match func {
                Func::Sin => z.sin(),
                Func::Cos => z.cos(),
                Func::Tan => z.tan(),
                Func::Asin => z.asin(),
                Func::Acos => z.acos(),
                Func::Atan => z.atan(),
                Func::Exp => z.exp(),
                Func::Log if z.norm() == 0.0 => {
                    return Err(MathError::Domain("log(0)".into()));
                }
                Func::Log => z.ln(),
                Func::Abs => Complex64::new(z.norm(), 0.0),
            }
        }
    };
    if !value.re.is_finite() || !value.im.is_finite() {
        return Err(MathError::Overflow(format!("non-finite value while evaluating {expr}")));
    }
    Ok(value)
}

fn complex_power(base: Complex64, exp: Complex64) -> MathResult<Complex64> {
    let integral = exp.im == 0.0 && exp.re.fract() == 0.0 && exp.re.abs() < f64::from(i32::MAX);
    if base.norm() == 0.0 {
        return if exp.re > 0.0 {
            Ok(Complex64::new(0.0, 0.0))
        } else {
            Err(MathError::DivisionByZero)
        };
    }
    if integral {
        #[allow(clippy::cast_possible_truncation)]
        return Ok(base.powi(exp.re as i32));
    }
    Ok(base.powc(exp))
}

/// Push numeric leaves and `pi`/`E` into `mode`; free symbols stay
pub fn to_mode(expr: &Expr, mode: NumericMode) -> MathResult<Expr> {
    if mode.is_exact() {
        return Ok(expr.clone());
    }
    expr.rebuild(&|e| match e {
        Expr::Num(n) => Some(Expr::Num(n.in_mode(mode))),
        Expr::Const(c @ (Constant::Pi | Constant::E)) => {
            constant_value(*c, mode).ok().map(Expr::Num)
        }
        _ => None,
    })
}

/// Approximate evaluation keeping free symbols (`N()` / `.evalf()`)
pub fn evalf(expr: &Expr, mode: NumericMode) -> MathResult<Expr> {
    to_mode(expr, mode.approximate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::NumericMode;

    #[test]
    fn test_eval_number_float() {
        let e = Expr::sqrt(Expr::int(2)).unwrap();
        let v = eval_number(&e, &BTreeMap::new(), NumericMode::Float).unwrap();
        assert!((v.to_f64() - std::f64::consts::SQRT_2).abs() < 1e-15);
    }

    #[test]
    fn test_eval_number_with_env() {
        let x = Expr::symbol("x");
        let e = x.pow(&Expr::int(2)).unwrap().add(&Expr::one());
        let mut env = BTreeMap::new();
        env.insert("x".to_string(), Number::integer(3));
        let v = eval_number(&e, &env, NumericMode::Precise { digits: 30 }).unwrap();
        assert!(matches!(v, Number::Precise { .. }));
        assert!((v.to_f64() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_free_symbol_error() {
        let e = Expr::symbol("t");
        assert_eq!(
            eval_number(&e, &BTreeMap::new(), NumericMode::Float),
            Err(MathError::FreeSymbol("t".into()))
        );
    }

    #[test]
    fn test_eval_complex_imaginary() {
        let root = Expr::sqrt(Expr::int(-9)).unwrap();
        let z = eval_complex(&root, &BTreeMap::new()).unwrap();
        assert!((z.im - 3.0).abs() < 1e-15);
        assert!(z.re.abs() < 1e-15);
    }

    #[test]
    fn test_to_mode_float() {
        let quarter_pi = Expr::Const(Constant::Pi).div(&Expr::int(4)).unwrap();
        let sine = Expr::apply(Func::Sin, quarter_pi).unwrap();
        let v = to_mode(&sine, NumericMode::Float).unwrap();
        let n = v.as_number().unwrap().to_f64();
        assert!((n - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-15);
    }

    #[test]
    fn test_precise_pi() {
        let v = constant_value(Constant::Pi, NumericMode::Precise { digits: 50 }).unwrap();
        assert_eq!(
            v.to_decimal_string(20),
            "3.14159265358979323846"
        );
    }
}
