//! Polynomial expansion, factoring and equation solving

use crate::error::{MathError, MathResult};
use crate::eval::eval_complex;
use crate::expr::{canonical_cmp, Constant, Expr};
use crate::number::{Number, NumericMode};
use num_bigint::BigInt;
use num_complex::Complex64;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Largest term count an expansion may produce
const MAX_EXPANDED_TERMS: usize = 10_000;

/// Largest integer power of a sum that is multiplied out
const MAX_EXPAND_POWER: i64 = 64;

/// Highest polynomial degree the solver accepts
const MAX_DEGREE: usize = 64;

/// Largest coefficient magnitude searched for rational roots
const MAX_ROOT_SEARCH: u64 = 1_000_000_000_000;

/// Multiply out products and integer powers of sums
pub fn expand(expr: &Expr) -> MathResult<Expr> {
    match expr {
        Expr::Add(terms) => Ok(Expr::sum(
            terms.iter().map(expand).collect::<MathResult<Vec<_>>>()?,
        )),
        Expr::Mul(factors) => {
            let expanded = factors.iter().map(expand).collect::<MathResult<Vec<_>>>()?;
            distribute(&expanded)
        }
        Expr::Pow(base, exp) => {
            let b = expand(base)?;
            let power = exp
                .as_number()
                .filter(|n| n.is_integer())
                .and_then(Number::to_i64);
            match (&b, power) {
                (Expr::Add(_), Some(n)) if (2..=MAX_EXPAND_POWER).contains(&n) => {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let copies = vec![b.clone(); n as usize];
                    distribute(&copies)
                }
                _ => Expr::power(b, (**exp).clone()),
            }
        }
        Expr::Func(func, arg) => Expr::apply(*func, expand(arg)?),
        _ => Ok(expr.clone()),
    }
}

fn distribute(factors: &[Expr]) -> MathResult<Expr> {
    let mut terms = vec![Expr::one()];
    for factor in factors {
        let parts: Vec<Expr> = match factor {
            Expr::Add(items) => items.clone(),
            other => vec![other.clone()],
        };
        if terms.len().saturating_mul(parts.len()) > MAX_EXPANDED_TERMS {
            return Err(MathError::Unsupported("expansion produces too many terms".into()));
        }
        let mut next = Vec::with_capacity(terms.len() * parts.len());
        for term in &terms {
            for part in &parts {
                next.push(term.mul(part)?);
            }
        }
        terms = next;
    }
    Ok(Expr::sum(terms))
}

/// Coefficients of `expr` as a polynomial in `var`, lowest degree first.
///
/// `None` when `expr` is not polynomial in `var`.
pub fn coefficients(expr: &Expr, var: &str) -> MathResult<Option<Vec<Expr>>> {
    let expanded = expand(expr)?;
    let terms = match expanded {
        Expr::Add(items) => items,
        other => vec![other],
    };
    let mut buckets: Vec<Vec<Expr>> = Vec::new();
    for term in terms {
        let Some((degree, coeff)) = monomial(&term, var)? else {
            return Ok(None);
        };
        if degree > MAX_DEGREE {
            return Ok(None);
        }
        if buckets.len() <= degree {
            buckets.resize(degree + 1, Vec::new());
        }
        buckets[degree].push(coeff);
    }
    let mut coeffs: Vec<Expr> = buckets.into_iter().map(Expr::sum).collect();
    while coeffs.len() > 1 && coeffs.last().is_some_and(Expr::is_zero) {
        coeffs.pop();
    }
    if coeffs.is_empty() {
        coeffs.push(Expr::zero());
    }
    Ok(Some(coeffs))
}

fn monomial(term: &Expr, var: &str) -> MathResult<Option<(usize, Expr)>> {
    if !term.has_symbol(var) {
        return Ok(Some((0, term.clone())));
    }
    match term {
        Expr::Sym(_) => Ok(Some((1, Expr::one()))),
        Expr::Pow(base, exp) if base.is_symbol(var) => Ok(exp
            .as_number()
            .filter(|n| n.is_integer() && !n.is_negative())
            .and_then(Number::to_i64)
            .and_then(|n| usize::try_from(n).ok())
            .map(|n| (n, Expr::one()))),
        Expr::Mul(factors) => {
            let mut degree = 0;
            let mut rest = Vec::new();
            for factor in factors {
                if factor.has_symbol(var) {
                    match monomial(factor, var)? {
                        Some((d, c)) if c.is_one() => degree += d,
                        _ => return Ok(None),
                    }
                } else {
                    rest.push(factor.clone());
                }
            }
            Ok(Some((degree, Expr::product(rest)?)))
        }
        _ => Ok(None),
    }
}

/// Roots of `expr == 0` in `var`, sorted by real then imaginary part
pub fn solve(expr: &Expr, var: &str, mode: NumericMode) -> MathResult<Vec<Expr>> {
    let mut roots = match coefficients(expr, var)? {
        Some(coeffs) => poly_roots(&coeffs, mode)?,
        None => {
            let (numer, denom) = expr.as_numer_denom();
            let coeffs = match (denom.is_one(), coefficients(&numer, var)?) {
                (false, Some(coeffs)) => coeffs,
                _ => {
                    return Err(MathError::Unsupported(format!(
                        "cannot solve {expr} = 0 for {var}: not a polynomial equation"
                    )));
                }
            };
            poly_roots(&coeffs, mode)?
                .into_iter()
                .filter(|r| denom.subs(var, r).is_ok_and(|d| !d.is_zero()))
                .collect()
        }
    };
    sort_roots(&mut roots);
    roots.dedup();
    Ok(roots)
}

fn poly_roots(coeffs: &[Expr], mode: NumericMode) -> MathResult<Vec<Expr>> {
    match coeffs.len() {
        0 | 1 => {
            if coeffs.first().map_or(true, Expr::is_zero) {
                Err(MathError::Unsupported("equation holds for every value".into()))
            } else {
                Ok(Vec::new())
            }
        }
        2 => Ok(vec![coeffs[0].neg().div(&coeffs[1])?]),
        3 => quadratic(&coeffs[2], &coeffs[1], &coeffs[0]),
        _ => {
            if mode.is_exact() {
                let rationals = rational_coefficients(coeffs).ok_or_else(|| {
                    MathError::Unsupported("degree above 2 with symbolic coefficients".into())
                })?;
                exact_roots(rationals)
            } else {
                let floats = coeffs
                    .iter()
                    .map(|c| c.as_number().map(Number::to_f64))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        MathError::Unsupported("degree above 2 with symbolic coefficients".into())
                    })?;
                numeric_roots(&floats, mode)
            }
        }
    }
}

fn quadratic(a: &Expr, b: &Expr, c: &Expr) -> MathResult<Vec<Expr>> {
    let disc = b.pow(&Expr::int(2))?.sub(&Expr::int(4).mul(a)?.mul(c)?);
    let two_a = Expr::int(2).mul(a)?;
    if disc.is_zero() {
        return Ok(vec![b.neg().div(&two_a)?]);
    }
    let root = Expr::sqrt(disc)?;
    Ok(vec![
        b.neg().sub(&root).div(&two_a)?,
        b.neg().add(&root).div(&two_a)?,
    ])
}

fn rational_coefficients(coeffs: &[Expr]) -> Option<Vec<BigRational>> {
    coeffs
        .iter()
        .map(|c| match c {
            Expr::Num(Number::Rational(r)) => Some(r.clone()),
            _ => None,
        })
        .collect()
}

fn horner(coeffs: &[BigRational], x: &BigRational) -> BigRational {
    coeffs
        .iter()
        .rev()
        .fold(BigRational::zero(), |acc, c| acc * x + c)
}

/// Divide by `(x - r)`, dropping the remainder
fn deflate(coeffs: &[BigRational], r: &BigRational) -> Vec<BigRational> {
    let n = coeffs.len() - 1;
    let mut out = vec![BigRational::zero(); n];
    let mut carry = BigRational::zero();
    for i in (1..=n).rev() {
        carry = &coeffs[i] + &carry * r;
        out[i - 1] = carry.clone();
    }
    out
}

fn divisors(n: &BigInt) -> MathResult<Vec<BigInt>> {
    let magnitude = n
        .abs()
        .to_u64()
        .filter(|m| *m <= MAX_ROOT_SEARCH)
        .ok_or_else(|| MathError::Unsupported("coefficients too large for rational root search".into()))?;
    let mut small = Vec::new();
    let mut large = Vec::new();
    let mut d = 1u64;
    while d * d <= magnitude {
        if magnitude % d == 0 {
            small.push(BigInt::from(d));
            if d * d != magnitude {
                large.push(BigInt::from(magnitude / d));
            }
        }
        d += 1;
    }
    small.extend(large.into_iter().rev());
    Ok(small)
}

fn find_rational_root(coeffs: &[BigRational]) -> MathResult<Option<BigRational>> {
    let lcm = coeffs
        .iter()
        .fold(BigInt::one(), |acc, c| acc.lcm(c.denom()));
    let scaled: Vec<BigInt> = coeffs
        .iter()
        .map(|c| (c * BigRational::from_integer(lcm.clone())).to_integer())
        .collect();
    let (Some(constant), Some(leading)) = (scaled.first(), scaled.last()) else {
        return Ok(None);
    };
    if constant.is_zero() {
        return Ok(Some(BigRational::zero()));
    }
    let mut candidates = Vec::new();
    for p in divisors(constant)? {
        for q in divisors(leading)? {
            let r = BigRational::new(p.clone(), q);
            candidates.push(r.clone());
            candidates.push(-r);
        }
    }
    candidates.sort();
    candidates.dedup();
    Ok(candidates.into_iter().find(|r| horner(coeffs, r).is_zero()))
}

fn exact_roots(mut poly: Vec<BigRational>) -> MathResult<Vec<Expr>> {
    let mut roots = Vec::new();
    while poly.len() > 3 {
        let root = find_rational_root(&poly)?.ok_or_else(|| {
            MathError::Unsupported("polynomial has no rational roots to reduce its degree".into())
        })?;
        poly = deflate(&poly, &root);
        roots.push(Expr::Num(Number::Rational(root)));
    }
    let rest: Vec<Expr> = poly
        .into_iter()
        .map(|c| Expr::Num(Number::Rational(c)))
        .collect();
    roots.extend(poly_roots(&rest, NumericMode::Exact)?);
    Ok(roots)
}

fn numeric_roots(coeffs: &[f64], mode: NumericMode) -> MathResult<Vec<Expr>> {
    let n = coeffs.len() - 1;
    let lead = coeffs[n];
    let monic: Vec<Complex64> = coeffs.iter().map(|c| Complex64::new(c / lead, 0.0)).collect();
    let eval = |z: Complex64| monic.iter().rev().fold(Complex64::new(0.0, 0.0), |acc, c| acc * z + c);
    let seed = Complex64::new(0.4, 0.9);
    #[allow(clippy::cast_possible_truncation)]
    let mut z: Vec<Complex64> = (0..n).map(|k| seed.powu(k as u32 + 1)).collect();
    let mut converged = false;
    for _ in 0..1000 {
        let mut max_delta: f64 = 0.0;
        for i in 0..n {
            let zi = z[i];
            let mut denom = Complex64::new(1.0, 0.0);
            for (j, zj) in z.iter().enumerate() {
                if j != i {
                    denom *= zi - zj;
                }
            }
            if denom.norm() == 0.0 {
                denom = Complex64::new(1e-12, 0.0);
            }
            let delta = eval(zi) / denom;
            z[i] = zi - delta;
            max_delta = max_delta.max(delta.norm());
        }
        if max_delta < 1e-15 {
            converged = true;
            break;
        }
    }
    if !converged && z.iter().any(|zi| eval(*zi).norm() > 1e-8) {
        return Err(MathError::NoConvergence("polynomial roots".into()));
    }
    let derivative: Vec<Complex64> = monic
        .iter()
        .enumerate()
        .skip(1)
        .map(|(k, c)| c * f64::from(u32::try_from(k).unwrap_or(u32::MAX)))
        .collect();
    let eval_derivative =
        |w: Complex64| derivative.iter().rev().fold(Complex64::new(0.0, 0.0), |acc, c| acc * w + c);
    let mut out = Vec::with_capacity(n);
    for mut root in z {
        for _ in 0..3 {
            let slope = eval_derivative(root);
            if slope.norm() == 0.0 {
                break;
            }
            root -= eval(root) / slope;
        }
        let scale = root.norm().max(1.0);
        let re = Expr::Num(Number::Float(root.re).in_mode(mode));
        if root.im.abs() <= 1e-10 * scale {
            out.push(re);
        } else {
            let im = Expr::Num(Number::Float(root.im).in_mode(mode));
            out.push(re.add(&im.mul(&Expr::Const(Constant::I))?));
        }
    }
    Ok(out)
}

fn root_key(root: &Expr) -> Option<(f64, f64)> {
    eval_complex(root, &BTreeMap::new())
        .ok()
        .map(|z| (z.re, z.im))
}

fn root_order(a: &Expr, b: &Expr) -> Ordering {
    match (root_key(a), root_key(b)) {
        (Some((ar, ai)), Some((br, bi))) => ar.total_cmp(&br).then(ai.total_cmp(&bi)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => canonical_cmp(a, b),
    }
}

/// Sort roots by real part, then imaginary part; symbolic roots last
pub fn sort_roots(roots: &mut [Expr]) {
    roots.sort_by(root_order);
}

fn negligible(e: &Expr) -> bool {
    match e.as_number() {
        Some(Number::Float(f)) => f.abs() < 1e-13,
        _ => e.is_zero(),
    }
}

/// Solve a linear system; each equation is an expression equal to zero.
///
/// Returns an empty list when the system is inconsistent.
pub fn solve_linear_system(equations: &[Expr], vars: &[String]) -> MathResult<Vec<(String, Expr)>> {
    let n = vars.len();
    let mut rows: Vec<Vec<Expr>> = Vec::with_capacity(equations.len());
    for equation in equations {
        let mut row = vec![Expr::zero(); n + 1];
        let expanded = expand(equation)?;
        let terms = match expanded {
            Expr::Add(items) => items,
            other => vec![other],
        };
        for term in terms {
            let present: Vec<usize> = (0..n).filter(|i| term.has_symbol(&vars[*i])).collect();
            match present.as_slice() {
                [] => row[n] = row[n].sub(&term),
                [i] => match monomial(&term, &vars[*i])? {
                    Some((1, coeff)) if !coeff.has_symbol(&vars[*i]) => {
                        row[*i] = row[*i].add(&coeff);
                    }
                    _ => {
                        return Err(MathError::Unsupported(format!(
                            "term {term} is not linear in {}",
                            vars[*i]
                        )));
                    }
                },
                _ => {
                    return Err(MathError::Unsupported(format!(
                        "term {term} couples several unknowns"
                    )));
                }
            }
        }
        rows.push(row);
    }

    let mut pivot_row = 0;
    for col in 0..n {
        let Some(found) = (pivot_row..rows.len()).find(|r| !negligible(&rows[*r][col])) else {
            return Err(MathError::Unsupported(
                "system is singular or underdetermined".into(),
            ));
        };
        rows.swap(pivot_row, found);
        let pivot = rows[pivot_row][col].clone();
        for entry in &mut rows[pivot_row] {
            *entry = entry.div(&pivot)?;
        }
        for r in 0..rows.len() {
            if r == pivot_row || negligible(&rows[r][col]) {
                continue;
            }
            let factor = rows[r][col].clone();
            for c in 0..=n {
                let scaled = factor.mul(&rows[pivot_row][c])?;
                rows[r][c] = expand(&rows[r][c].sub(&scaled))?;
            }
        }
        pivot_row += 1;
    }
    if rows[pivot_row..].iter().any(|row| !negligible(&row[n])) {
        return Ok(Vec::new());
    }
    Ok(vars
        .iter()
        .enumerate()
        .map(|(i, v)| (v.clone(), rows[i][n].clone()))
        .collect())
}

/// Factor a univariate polynomial over the rationals.
///
/// Anything else is returned unchanged.
pub fn factor(expr: &Expr) -> MathResult<Expr> {
    let symbols = expr.free_symbols();
    let Some(var) = symbols.iter().next().filter(|_| symbols.len() == 1) else {
        return Ok(expr.clone());
    };
    let Some(coeffs) = coefficients(expr, var)? else {
        return Ok(expr.clone());
    };
    let Some(rationals) = rational_coefficients(&coeffs) else {
        return Ok(expr.clone());
    };
    if rationals.len() < 3 {
        return expand(expr);
    }
    let lead = rationals[rationals.len() - 1].clone();
    let mut remaining: Vec<BigRational> = rationals.iter().map(|c| c / &lead).collect();
    let x = Expr::symbol(var.clone());
    let mut factors = vec![Expr::Num(Number::Rational(lead))];
    while remaining.len() > 2 {
        let Ok(Some(root)) = find_rational_root(&remaining) else {
            break;
        };
        remaining = deflate(&remaining, &root);
        factors.push(x.sub(&Expr::Num(Number::Rational(root))));
    }
    let rest = remaining
        .iter()
        .enumerate()
        .map(|(k, c)| {
            let power = x.pow(&Expr::int(i64::try_from(k).unwrap_or(i64::MAX)))?;
            Expr::Num(Number::Rational(c.clone())).mul(&power)
        })
        .collect::<MathResult<Vec<_>>>()?;
    factors.push(Expr::sum(rest));
    Expr::product(factors)
}

/// Roots of a univariate polynomial as `(root, multiplicity)` pairs
pub fn factor_roots(expr: &Expr, var: &str, mode: NumericMode) -> MathResult<Vec<(Expr, usize)>> {
    let coeffs = coefficients(expr, var)?.ok_or_else(|| {
        MathError::Unsupported(format!("{expr} is not a polynomial in {var}"))
    })?;
    let mut counted: Vec<(Expr, usize)> = Vec::new();
    if let (true, Some(mut remaining)) = (mode.is_exact(), rational_coefficients(&coeffs)) {
        while remaining.len() > 1 {
            let Ok(Some(root)) = find_rational_root(&remaining) else {
                break;
            };
            remaining = deflate(&remaining, &root);
            let root = Expr::Num(Number::Rational(root));
            match counted.iter_mut().find(|(r, _)| *r == root) {
                Some(slot) => slot.1 += 1,
                None => counted.push((root, 1)),
            }
        }
        if remaining.len() > 1 {
            let rest: Vec<Expr> = remaining
                .into_iter()
                .map(|c| Expr::Num(Number::Rational(c)))
                .collect();
            for root in poly_roots(&rest, mode)? {
                counted.push((root, 1));
            }
        }
    } else {
        for root in poly_roots(&coeffs, mode)? {
            counted.push((root, 1));
        }
    }
    counted.sort_by(|a, b| root_order(&a.0, &b.0));
    Ok(counted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn x() -> Expr {
        Expr::symbol("x")
    }

    fn poly(coeffs: &[i64]) -> Expr {
        Expr::sum(
            coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| {
                    Expr::int(*c)
                        .mul(&x().pow(&Expr::int(k as i64)).unwrap())
                        .unwrap()
                })
                .collect(),
        )
    }

    #[test]
    fn test_expand_square() {
        let e = x().add(&Expr::one()).pow(&Expr::int(2)).unwrap();
        assert_eq!(expand(&e).unwrap(), poly(&[1, 2, 1]));
    }

    #[test]
    fn test_coefficients() {
        let c = coefficients(&poly(&[3, 0, 5]), "x").unwrap().unwrap();
        assert_eq!(c, vec![Expr::int(3), Expr::zero(), Expr::int(5)]);
        let s = Expr::apply(crate::expr::Func::Sin, x()).unwrap();
        assert_eq!(coefficients(&s, "x").unwrap(), None);
    }

    #[test]
    fn test_solve_quadratic_exact() {
        let roots = solve(&poly(&[-2, 0, 1]), "x", NumericMode::Exact).unwrap();
        let root2 = Expr::sqrt(Expr::int(2)).unwrap();
        assert_eq!(roots, vec![root2.neg(), root2]);
    }

    #[test]
    fn test_solve_complex_roots() {
        let roots = solve(&poly(&[1, 0, 1]), "x", NumericMode::Exact).unwrap();
        let i = Expr::Const(Constant::I);
        assert_eq!(roots, vec![i.neg(), i]);
    }

    #[test]
    fn test_solve_cubic_rational() {
        // (x - 1)(x - 2)(x + 3) = x^3 - 7x + 6
        let roots = solve(&poly(&[6, -7, 0, 1]), "x", NumericMode::Exact).unwrap();
        assert_eq!(roots, vec![Expr::int(-3), Expr::int(1), Expr::int(2)]);
    }

    #[test]
    fn test_solve_cubic_numeric() {
        let roots = solve(&poly(&[6, -7, 0, 1]), "x", NumericMode::Float).unwrap();
        let values: Vec<f64> = roots
            .iter()
            .map(|r| r.as_number().unwrap().to_f64())
            .collect();
        for (got, want) in values.iter().zip([-3.0, 1.0, 2.0]) {
            assert!((got - want).abs() < 1e-10, "{got} vs {want}");
        }
    }

    #[test]
    fn test_solve_rational_expression() {
        // (x^2 - 1) / (x + 1) = 0 only at x = 1
        let e = poly(&[-1, 0, 1]).div(&x().add(&Expr::one())).unwrap();
        let roots = solve(&e, "x", NumericMode::Exact).unwrap();
        assert_eq!(roots, vec![Expr::one()]);
    }

    #[test]
    fn test_linear_system() {
        let y = Expr::symbol("y");
        // x + y = 3, x - y = 1
        let e1 = x().add(&y).sub(&Expr::int(3));
        let e2 = x().sub(&y).sub(&Expr::one());
        let solution =
            solve_linear_system(&[e1, e2], &["x".to_string(), "y".to_string()]).unwrap();
        assert_eq!(
            solution,
            vec![("x".to_string(), Expr::int(2)), ("y".to_string(), Expr::one())]
        );
    }

    #[test]
    fn test_factor_difference_of_squares() {
        let f = factor(&poly(&[-1, 0, 1])).unwrap();
        assert_eq!(f.to_string(), "(x - 1)*(x + 1)");
    }

    #[test]
    fn test_factor_roots_multiplicity() {
        let roots = factor_roots(&poly(&[1, -2, 1]), "x", NumericMode::Exact).unwrap();
        assert_eq!(roots, vec![(Expr::one(), 2)]);
    }
}
