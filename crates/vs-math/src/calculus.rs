//! Differentiation, integration, limits and finite sums
//!
//! Symbolic rules run in every mode. Where a closed form is not needed
//! (definite integrals and limits in approximate modes) the numeric path
//! is used instead, evaluated in the mode's own number domain.

use crate::error::{MathError, MathResult};
use crate::eval::eval_number;
use crate::expr::{Expr, Func};
use crate::number::{Number, NumericMode};
use crate::poly::expand;
use std::collections::BTreeMap;

/// Maximum L'Hôpital rewrites for an exact limit
const MAX_LHOPITAL_DEPTH: usize = 6;

/// Maximum number of terms in a finite summation
const MAX_SUMMATION_TERMS: i64 = 100_000;

/// Side from which a limit is approached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Both sides must agree
    Both,
    /// From above (`+`)
    Plus,
    /// From below (`-`)
    Minus,
}

impl Direction {
    /// Parse the `dir` keyword (`"+"`, `"-"`, `"+-"`)
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "+" => Some(Self::Plus),
            "-" => Some(Self::Minus),
            "+-" | "-+" => Some(Self::Both),
            _ => None,
        }
    }
}

/// Derivative of `expr` with respect to `var`
pub fn diff(expr: &Expr, var: &str) -> MathResult<Expr> {
    if !expr.has_symbol(var) {
        return Ok(Expr::zero());
    }
    match expr {
        Expr::Num(_) | Expr::Const(_) => Ok(Expr::zero()),
        Expr::Sym(s) => Ok(if s == var { Expr::one() } else { Expr::zero() }),
        Expr::Add(terms) => Ok(Expr::sum(
            terms
                .iter()
                .map(|t| diff(t, var))
                .collect::<MathResult<Vec<_>>>()?,
        )),
        Expr::Mul(factors) => {
            let mut terms = Vec::with_capacity(factors.len());
            for (i, factor) in factors.iter().enumerate() {
                let d = diff(factor, var)?;
                if d.is_zero() {
                    continue;
                }
                let mut product: Vec<Expr> = factors
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, f)| f.clone())
                    .collect();
                product.push(d);
                terms.push(Expr::product(product)?);
            }
            Ok(Expr::sum(terms))
        }
        Expr::Pow(base, exp) => {
            let (b, e) = (&**base, &**exp);
            if !e.has_symbol(var) {
                let lowered = Expr::power(b.clone(), e.sub(&Expr::one()))?;
                Expr::product(vec![e.clone(), lowered, diff(b, var)?])
            } else if !b.has_symbol(var) {
                let log = Expr::apply(Func::Log, b.clone())?;
                Expr::product(vec![expr.clone(), log, diff(e, var)?])
            } else {
                let log = Expr::apply(Func::Log, b.clone())?;
                let inner = Expr::sum(vec![
                    diff(e, var)?.mul(&log)?,
                    e.mul(&diff(b, var)?)?.div(b)?,
                ]);
                expr.mul(&inner)
            }
        }
        Expr::Func(func, arg) => {
            let inner = diff(arg, var)?;
            let a = (**arg).clone();
            let outer = match func {
                Func::Sin => Expr::apply(Func::Cos, a)?,
                Func::Cos => Expr::apply(Func::Sin, a)?.neg(),
                Func::Tan => Expr::sum(vec![
                    Expr::apply(Func::Tan, a)?.pow(&Expr::int(2))?,
                    Expr::one(),
                ]),
                Func::Asin => Expr::power(
                    Expr::one().sub(&a.pow(&Expr::int(2))?),
                    Expr::rational(-1, 2)?,
                )?,
                Func::Acos => Expr::power(
                    Expr::one().sub(&a.pow(&Expr::int(2))?),
                    Expr::rational(-1, 2)?,
                )?
                .neg(),
                Func::Atan => Expr::power(
                    Expr::one().add(&a.pow(&Expr::int(2))?),
                    Expr::int(-1),
                )?,
                Func::Exp => expr.clone(),
                Func::Log => Expr::power(a, Expr::int(-1))?,
                Func::Abs => a.div(expr)?,
            };
            outer.mul(&inner)
        }
    }
}

/// `(a, b)` such that `expr == a*var + b` with `a` free of `var`
fn as_linear(expr: &Expr, var: &str) -> MathResult<Option<(Expr, Expr)>> {
    let slope = diff(expr, var)?;
    if slope.has_symbol(var) || slope.is_zero() {
        return Ok(None);
    }
    let intercept = expr.subs(var, &Expr::zero())?;
    Ok(Some((slope, intercept)))
}

fn unsupported_integral(expr: &Expr) -> MathError {
    MathError::Unsupported(format!("no closed-form antiderivative found for {expr}"))
}

/// Indefinite integral of `expr` with respect to `var`
pub fn integrate(expr: &Expr, var: &str) -> MathResult<Expr> {
    let x = Expr::symbol(var);
    if !expr.has_symbol(var) {
        return expr.mul(&x);
    }
    if let Some(result) = integrate_atom(expr, var)? {
        return Ok(result);
    }
    let expanded = expand(expr)?;
    if let Expr::Add(terms) = &expanded {
        let parts = terms
            .iter()
            .map(|t| integrate(t, var))
            .collect::<MathResult<Vec<_>>>()?;
        return Ok(Expr::sum(parts));
    }
    if let Expr::Mul(factors) = &expanded {
        let (constant, dependent): (Vec<Expr>, Vec<Expr>) =
            factors.iter().cloned().partition(|f| !f.has_symbol(var));
        if !constant.is_empty() {
            let rest = Expr::product(dependent)?;
            let inner = integrate(&rest, var)?;
            let mut all = constant;
            all.push(inner);
            return Expr::product(all);
        }
        if let Some(result) = integrate_by_parts(&dependent, var)? {
            return Ok(result);
        }
    } else if let Some(result) = integrate_atom(&expanded, var)? {
        return Ok(result);
    }
    Err(unsupported_integral(expr))
}

/// Table integrals of a single factor whose argument is linear in `var`
fn integrate_atom(expr: &Expr, var: &str) -> MathResult<Option<Expr>> {
    match expr {
        Expr::Sym(s) if s == var => {
            let square = expr.pow(&Expr::int(2))?;
            Ok(Some(square.div(&Expr::int(2))?))
        }
        Expr::Pow(base, exp) if !exp.has_symbol(var) => {
            let Some((a, _)) = as_linear(base, var)? else {
                return Ok(None);
            };
            if exp.as_number().is_some_and(|n| n.is_negative() && n.abs().is_one()) {
                let log = Expr::apply(Func::Log, (**base).clone())?;
                return Ok(Some(log.div(&a)?));
            }
            let raised = exp.add(&Expr::one());
            let numer = Expr::power((**base).clone(), raised.clone())?;
            Ok(Some(numer.div(&a.mul(&raised)?)?))
        }
        Expr::Pow(base, exp) if !base.has_symbol(var) => {
            let Some((a, _)) = as_linear(exp, var)? else {
                return Ok(None);
            };
            let log = Expr::apply(Func::Log, (**base).clone())?;
            Ok(Some(expr.div(&a.mul(&log)?)?))
        }
        Expr::Func(func, arg) => {
            let Some((a, _)) = as_linear(arg, var)? else {
                return Ok(None);
            };
            let u = (**arg).clone();
            let antiderivative = match func {
                Func::Sin => Expr::apply(Func::Cos, u)?.neg(),
                Func::Cos => Expr::apply(Func::Sin, u)?,
                Func::Exp => expr.clone(),
                Func::Tan => Expr::apply(Func::Log, Expr::apply(Func::Cos, u)?)?.neg(),
                Func::Log => {
                    let log = Expr::apply(Func::Log, u.clone())?;
                    u.mul(&log)?.sub(&u)
                }
                Func::Atan => {
                    let atan = Expr::apply(Func::Atan, u.clone())?;
                    let square = Expr::one().add(&u.pow(&Expr::int(2))?);
                    let half_log = Expr::apply(Func::Log, square)?.div(&Expr::int(2))?;
                    u.mul(&atan)?.sub(&half_log)
                }
                _ => return Ok(None),
            };
            Ok(Some(antiderivative.div(&a)?))
        }
        _ => Ok(None),
    }
}

/// `∫ x**n * f(a*x + b)` for a non-negative integer `n` and `f` in sin, cos, exp
fn integrate_by_parts(factors: &[Expr], var: &str) -> MathResult<Option<Expr>> {
    if factors.len() != 2 {
        return Ok(None);
    }
    let (monomial, other) = if is_monomial(&factors[0], var) {
        (&factors[0], &factors[1])
    } else if is_monomial(&factors[1], var) {
        (&factors[1], &factors[0])
    } else {
        return Ok(None);
    };
    if !matches!(other, Expr::Func(Func::Sin | Func::Cos | Func::Exp, _)) {
        return Ok(None);
    }
    let Some(antiderivative) = integrate_atom(other, var)? else {
        return Ok(None);
    };
    let derivative = diff(monomial, var)?;
    let remainder = if derivative.is_zero() {
        Expr::zero()
    } else {
        integrate(&derivative.mul(&antiderivative)?, var)?
    };
    Ok(Some(monomial.mul(&antiderivative)?.sub(&remainder)))
}

fn is_monomial(e: &Expr, var: &str) -> bool {
    match e {
        Expr::Sym(s) => s == var,
        Expr::Pow(base, exp) => {
            base.is_symbol(var)
                && exp
                    .as_number()
                    .is_some_and(|n| n.is_integer() && !n.is_negative() && n.to_i64().is_some_and(|k| k <= 8))
        }
        _ => false,
    }
}

/// Definite integral over `[lower, upper]`.
///
/// Exact mode evaluates the antiderivative at the bounds; approximate
/// modes use open Romberg quadrature in the mode's domain.
pub fn integrate_definite(
    expr: &Expr,
    var: &str,
    lower: &Expr,
    upper: &Expr,
    mode: NumericMode,
) -> MathResult<Expr> {
    if mode.is_exact() {
        if lower.is_infinite() || upper.is_infinite() {
            return Err(MathError::Unsupported(
                "improper integrals need a numeric mode".into(),
            ));
        }
        let antiderivative = integrate(expr, var)?;
        let high = antiderivative.subs(var, upper)?;
        let low = antiderivative.subs(var, lower)?;
        return Ok(high.sub(&low));
    }
    let free: Vec<String> = expr
        .free_symbols()
        .into_iter()
        .filter(|s| s != var)
        .collect();
    if let Some(symbol) = free.first() {
        return Err(MathError::FreeSymbol(symbol.clone()));
    }
    quadrature::romberg(expr, var, lower, upper, mode).map(Expr::Num)
}

/// Limit of `expr` as `var` approaches `point`
pub fn limit(
    expr: &Expr,
    var: &str,
    point: &Expr,
    direction: Direction,
    mode: NumericMode,
) -> MathResult<Expr> {
    if mode.is_exact() {
        if point.is_infinite() {
            return Err(MathError::Unsupported(
                "limits at infinity need a numeric mode".into(),
            ));
        }
        return exact_limit(expr, var, point, 0);
    }
    extrapolation::limit(expr, var, point, direction, mode).map(Expr::Num)
}

fn exact_limit(expr: &Expr, var: &str, point: &Expr, depth: usize) -> MathResult<Expr> {
    match expr.subs(var, point) {
        Ok(value) => return Ok(value),
        Err(MathError::DivisionByZero | MathError::Domain(_)) => {}
        Err(other) => return Err(other),
    }
    if depth >= MAX_LHOPITAL_DEPTH {
        return Err(MathError::Unsupported(format!("limit of {expr}")));
    }
    let (numer, denom) = expr.as_numer_denom();
    if denom.is_one() {
        return Err(MathError::Unsupported(format!("limit of {expr}")));
    }
    let n0 = numer.subs(var, point)?;
    let d0 = denom.subs(var, point)?;
    if !d0.is_zero() {
        return n0.div(&d0);
    }
    if !n0.is_zero() {
        return Err(MathError::Unsupported(format!(
            "limit of {expr} diverges at {point}"
        )));
    }
    let quotient = diff(&numer, var)?.div(&diff(&denom, var)?)?;
    exact_limit(&quotient, var, point, depth + 1)
}

/// Sum of `expr` for `var` from `lower` to `upper` inclusive
pub fn summation(expr: &Expr, var: &str, lower: &Expr, upper: &Expr) -> MathResult<Expr> {
    let bound = |e: &Expr| {
        e.as_number()
            .and_then(Number::to_i64)
            .ok_or_else(|| MathError::Unsupported(format!("summation bound {e} must be an integer")))
    };
    let (lo, hi) = (bound(lower)?, bound(upper)?);
    if hi.saturating_sub(lo) > MAX_SUMMATION_TERMS {
        return Err(MathError::Unsupported("summation range too large".into()));
    }
    let terms = (lo..=hi)
        .map(|k| expr.subs(var, &Expr::int(k)))
        .collect::<MathResult<Vec<_>>>()?;
    Ok(Expr::sum(terms))
}

fn evaluate_at(expr: &Expr, var: &str, at: &Number, mode: NumericMode) -> MathResult<Number> {
    let mut env = BTreeMap::new();
    env.insert(var.to_string(), at.clone());
    eval_number(expr, &env, mode)
}

fn mode_tolerance(mode: NumericMode) -> f64 {
    match mode {
        NumericMode::Precise { digits } if digits >= 20 => 1e-18,
        _ => 1e-12,
    }
}

mod quadrature {
    //! Open Romberg quadrature on the midpoint rule with tripling

    use super::{evaluate_at, mode_tolerance};
    use crate::error::{MathError, MathResult};
    use crate::eval::eval_number;
    use crate::expr::Expr;
    use crate::number::{Number, NumericMode};
    use std::collections::BTreeMap;

    /// Finite interval image of the integration variable
    enum Mapping {
        Finite { a: Number, width: Number },
        UpperInfinite { a: Number },
        LowerInfinite { b: Number },
        Whole,
    }

    fn levels(mode: NumericMode) -> usize {
        match mode {
            NumericMode::Precise { .. } => 7,
            _ => 10,
        }
    }

    pub(super) fn romberg(
        expr: &Expr,
        var: &str,
        lower: &Expr,
        upper: &Expr,
        mode: NumericMode,
    ) -> MathResult<Number> {
        let env = BTreeMap::new();
        let bound = |e: &Expr| eval_number(e, &env, mode);
        let mapping = match (lower.infinity_sign(), upper.infinity_sign()) {
            (None, None) => {
                let (a, b) = (bound(lower)?, bound(upper)?);
                let width = b.sub(&a);
                Mapping::Finite { a, width }
            }
            (None, Some(true)) => Mapping::UpperInfinite { a: bound(lower)? },
            (Some(false), None) => Mapping::LowerInfinite { b: bound(upper)? },
            (Some(false), Some(true)) => Mapping::Whole,
            _ => {
                return Err(MathError::Unsupported(
                    "integration bounds in reversed infinite order".into(),
                ));
            }
        };

        let one = Number::one().in_mode(mode);
        // value of the transformed integrand at t in (0, 1)
        let g = |t: &Number| -> MathResult<Number> {
            match &mapping {
                Mapping::Finite { a, width } => {
                    let x = a.add(&width.mul(t));
                    Ok(evaluate_at(expr, var, &x, mode)?.mul(width))
                }
                Mapping::UpperInfinite { a } => {
                    let rest = one.sub(t);
                    let x = a.add(&t.div(&rest)?);
                    let jacobian = one.div(&rest.mul(&rest))?;
                    Ok(evaluate_at(expr, var, &x, mode)?.mul(&jacobian))
                }
                Mapping::LowerInfinite { b } => {
                    let rest = one.sub(t);
                    let x = b.sub(&t.div(&rest)?);
                    let jacobian = one.div(&rest.mul(&rest))?;
                    Ok(evaluate_at(expr, var, &x, mode)?.mul(&jacobian))
                }
                Mapping::Whole => {
                    // x = (2t - 1) / (t (1 - t))
                    let rest = one.sub(t);
                    let denom = t.mul(&rest);
                    let two = Number::integer(2).in_mode(mode);
                    let x = two.mul(t).sub(&one).div(&denom)?;
                    let t_squared = t.mul(t);
                    let jacobian = t_squared
                        .add(&rest.mul(&rest))
                        .div(&denom.mul(&denom))?;
                    Ok(evaluate_at(expr, var, &x, mode)?.mul(&jacobian))
                }
            }
        };

        let tolerance = mode_tolerance(mode);
        let mut table: Vec<Vec<Number>> = Vec::new();
        let mut panels: i64 = 1;
        for level in 0..levels(mode) {
            let h = one.div(&Number::integer(panels).in_mode(mode))?;
            let half = Number::ratio(1, 2)?.in_mode(mode);
            let mut total = Number::zero().in_mode(mode);
            for i in 0..panels {
                let t = Number::integer(i).in_mode(mode).add(&half).mul(&h);
                total = total.add(&g(&t)?);
            }
            let mut row = vec![total.mul(&h)];
            let mut factor = Number::integer(1).in_mode(mode);
            for j in 1..=level {
                factor = factor.mul(&Number::integer(9).in_mode(mode));
                let previous = &table[level - 1][j - 1];
                let current = &row[j - 1];
                let improved = current.add(&current.sub(previous).div(&factor.sub(&one))?);
                row.push(improved);
            }
            if level > 0 {
                let last = &row[level];
                let prior = &table[level - 1][level - 1];
                let delta = last.sub(prior).abs().to_f64();
                let scale = last.abs().to_f64().max(1.0);
                if delta <= tolerance * scale {
                    return Ok(last.clone());
                }
            }
            table.push(row);
            panels *= 3;
        }
        let best = table
            .last()
            .and_then(|row| row.last())
            .cloned()
            .ok_or_else(|| MathError::NoConvergence("quadrature".into()))?;
        let previous = table
            .get(table.len().saturating_sub(2))
            .and_then(|row| row.last())
            .cloned()
            .unwrap_or_else(|| best.clone());
        let delta = best.sub(&previous).abs().to_f64();
        if delta <= 1e-9 * best.abs().to_f64().max(1.0) {
            Ok(best)
        } else {
            Err(MathError::NoConvergence(format!(
                "quadrature of {expr} (last change {delta:e})"
            )))
        }
    }
}

mod extrapolation {
    //! Numeric limits by Neville extrapolation toward the limit point

    use super::{evaluate_at, mode_tolerance, Direction};
    use crate::error::{MathError, MathResult};
    use crate::eval::eval_number;
    use crate::expr::Expr;
    use crate::number::{Number, NumericMode};
    use std::collections::BTreeMap;

    fn sample_count(mode: NumericMode) -> usize {
        match mode {
            NumericMode::Precise { .. } => 14,
            _ => 8,
        }
    }

    /// Extrapolate `f(h)` to `h = 0` from samples at `h0 / 2^k`
    fn extrapolate(f: &dyn Fn(&Number) -> MathResult<Number>, mode: NumericMode) -> MathResult<(Number, f64)> {
        let count = sample_count(mode);
        let mut hs = Vec::with_capacity(count);
        let mut values = Vec::with_capacity(count);
        let mut h = Number::ratio(1, 16)?.in_mode(mode);
        let half = Number::ratio(1, 2)?.in_mode(mode);
        for _ in 0..count {
            values.push(f(&h)?);
            hs.push(h.clone());
            h = h.mul(&half);
        }
        let mut estimates = values;
        let mut previous_best = estimates[0].clone();
        let mut change = f64::INFINITY;
        for m in 1..count {
            for i in 0..count - m {
                let numer = hs[i + m].mul(&estimates[i]).sub(&hs[i].mul(&estimates[i + 1]));
                estimates[i] = numer.div(&hs[i + m].sub(&hs[i]))?;
            }
            change = estimates[0].sub(&previous_best).abs().to_f64();
            previous_best = estimates[0].clone();
        }
        Ok((estimates[0].clone(), change))
    }

    pub(super) fn limit(
        expr: &Expr,
        var: &str,
        point: &Expr,
        direction: Direction,
        mode: NumericMode,
    ) -> MathResult<Number> {
        let one = Number::one().in_mode(mode);
        let side = |sign: i64| -> MathResult<(Number, f64)> {
            if let Some(positive) = point.infinity_sign() {
                let orientation = if positive { one.clone() } else { one.neg() };
                let f = |t: &Number| -> MathResult<Number> {
                    let x = orientation.div(t)?;
                    evaluate_at(expr, var, &x, mode)
                };
                extrapolate(&f, mode)
            } else {
                let p = eval_number(point, &BTreeMap::new(), mode)?;
                let s = Number::integer(sign).in_mode(mode);
                let f = |h: &Number| -> MathResult<Number> {
                    let x = p.add(&s.mul(h));
                    evaluate_at(expr, var, &x, mode)
                };
                extrapolate(&f, mode)
            }
        };

        let tolerance = mode_tolerance(mode).max(1e-9);
        let accept = |(value, change): (Number, f64)| -> MathResult<Number> {
            let scale = value.abs().to_f64().max(1.0);
            if change.is_finite() && change <= 1e-6 * scale {
                Ok(value)
            } else {
                Err(MathError::NoConvergence(format!("limit of {expr} at {point}")))
            }
        };

        if point.is_infinite() {
            return accept(side(1)?);
        }
        match direction {
            Direction::Plus => accept(side(1)?),
            Direction::Minus => accept(side(-1)?),
            Direction::Both => {
                let above = accept(side(1)?)?;
                let below = accept(side(-1)?)?;
                let gap = above.sub(&below).abs().to_f64();
                if gap <= tolerance.max(1e-7) * above.abs().to_f64().max(1.0) {
                    Ok(above)
                } else {
                    Err(MathError::Domain(format!(
                        "one-sided limits of {expr} at {point} differ"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::eval_complex;
    use crate::expr::Constant;
    use pretty_assertions::assert_eq;

    fn x() -> Expr {
        Expr::symbol("x")
    }

    fn square() -> Expr {
        x().pow(&Expr::int(2)).unwrap()
    }

    #[test]
    fn test_power_rule() {
        let d = diff(&square(), "x").unwrap();
        assert_eq!(d, Expr::int(2).mul(&x()).unwrap());
    }

    #[test]
    fn test_chain_rule() {
        let inner = Expr::int(3).mul(&x()).unwrap();
        let e = Expr::apply(Func::Sin, inner.clone()).unwrap();
        let d = diff(&e, "x").unwrap();
        let expected = Expr::int(3).mul(&Expr::apply(Func::Cos, inner).unwrap()).unwrap();
        assert_eq!(d, expected);
    }

    #[test]
    fn test_indefinite_polynomial() {
        let f = integrate(&square(), "x").unwrap();
        let expected = x().pow(&Expr::int(3)).unwrap().div(&Expr::int(3)).unwrap();
        assert_eq!(f, expected);
    }

    #[test]
    fn test_integral_of_reciprocal() {
        let e = x().pow(&Expr::int(-1)).unwrap();
        let f = integrate(&e, "x").unwrap();
        assert_eq!(f, Expr::apply(Func::Log, x()).unwrap());
    }

    #[test]
    fn test_integration_by_parts() {
        let e = x().mul(&Expr::apply(Func::Exp, x()).unwrap()).unwrap();
        let f = integrate(&e, "x").unwrap();
        // derivative of the antiderivative recovers the integrand
        let back = expand(&diff(&f, "x").unwrap()).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_definite_exact() {
        let v = integrate_definite(&square(), "x", &Expr::zero(), &Expr::one(), NumericMode::Exact)
            .unwrap();
        assert_eq!(v, Expr::rational(1, 3).unwrap());
    }

    #[test]
    fn test_definite_float() {
        let v = integrate_definite(&square(), "x", &Expr::zero(), &Expr::one(), NumericMode::Float)
            .unwrap();
        let n = v.as_number().unwrap().to_f64();
        assert!((n - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_definite_precise_sine() {
        let e = Expr::apply(Func::Sin, x()).unwrap();
        let v = integrate_definite(
            &e,
            "x",
            &Expr::zero(),
            &Expr::Const(Constant::Pi),
            NumericMode::Precise { digits: 30 },
        )
        .unwrap();
        assert!((v.as_number().unwrap().to_f64() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_improper_integral_float() {
        let e = Expr::apply(Func::Exp, x().neg()).unwrap();
        let v = integrate_definite(
            &e,
            "x",
            &Expr::zero(),
            &Expr::Const(Constant::Infinity),
            NumericMode::Float,
        )
        .unwrap();
        assert!((v.as_number().unwrap().to_f64() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_exact_limit_lhopital() {
        let e = Expr::apply(Func::Sin, x()).unwrap().div(&x()).unwrap();
        let l = limit(&e, "x", &Expr::zero(), Direction::Both, NumericMode::Exact).unwrap();
        assert_eq!(l, Expr::one());
    }

    #[test]
    fn test_numeric_limit() {
        let numer = square().sub(&Expr::one());
        let e = numer.div(&x().sub(&Expr::one())).unwrap();
        let l = limit(&e, "x", &Expr::one(), Direction::Both, NumericMode::Float).unwrap();
        let v = eval_complex(&l, &BTreeMap::new()).unwrap();
        assert!((v.re - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_limit_at_infinity_float() {
        let numer = Expr::int(2).mul(&x()).unwrap().add(&Expr::one());
        let e = numer.div(&x().add(&Expr::int(3))).unwrap();
        let l = limit(
            &e,
            "x",
            &Expr::Const(Constant::Infinity),
            Direction::Both,
            NumericMode::Float,
        )
        .unwrap();
        assert!((l.as_number().unwrap().to_f64() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_summation() {
        let s = summation(&square(), "x", &Expr::one(), &Expr::int(10)).unwrap();
        assert_eq!(s, Expr::int(385));
    }
}
