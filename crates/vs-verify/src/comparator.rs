//! Kind-aware result comparison
//!
//! Two results match when they have the same shape and every component
//! agrees:
//! - booleans, text and `None` by equality
//! - sequences element-wise, mappings key by key, matrices entry by entry
//! - two exact expressions only when their difference vanishes exactly
//! - anything approximate numerically within a [`Tolerance`]
//!
//! Approximate numbers are compared as complex doubles, real and imaginary
//! parts separately. Exact forms whose difference does not simplify to zero
//! are evaluated at [`EXACT_DIGITS`] decimal places and must agree to
//! [`EXACT_RESIDUE`]; the configured tolerance never applies to them.
//! Expressions with free symbols are evaluated at fixed sample points; at
//! least one point must evaluate on both sides.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use vs_math::{eval_complex, eval_number, expand, Expr, Matrix, Number, NumericMode};
use vs_sandbox::StructuredValue;

/// Sample coordinates for expressions with free symbols, in hundredths;
/// chosen away from the usual poles and branch cuts at 0, ±1 and
/// multiples of π/2
const SAMPLE_HUNDREDTHS: [i64; 6] = [37, 173, 241, -61, 329, -217];

/// Decimal places used to evaluate exact forms
pub const EXACT_DIGITS: u32 = 50;

/// Largest residue two exact forms may leave at a sample point
pub const EXACT_RESIDUE: &str = "1e-40";

/// Relative and absolute closeness bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    pub relative: f64,
    pub absolute: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            relative: 1e-9,
            absolute: 1e-12,
        }
    }
}

impl Tolerance {
    /// Relative-only tolerance
    #[must_use]
    pub fn relative(relative: f64) -> Self {
        Self {
            relative,
            absolute: 0.0,
        }
    }

    /// `|a - b| <= max(absolute, relative * max(|a|, |b|))`
    #[must_use]
    pub fn close(self, a: f64, b: f64) -> bool {
        if a.is_infinite() || b.is_infinite() {
            return a == b;
        }
        let bound = self.absolute.max(self.relative * a.abs().max(b.abs()));
        (a - b).abs() <= bound
    }

    fn close_complex(self, a: Complex64, b: Complex64) -> bool {
        self.close(a.re, b.re) && self.close(a.im, b.im)
    }
}

/// Compares a primary result with a recomputed one
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparator {
    tolerance: Tolerance,
}

impl Comparator {
    #[must_use]
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    #[must_use]
    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Whether `a` and `b` agree
    #[must_use]
    pub fn matches(&self, a: &StructuredValue, b: &StructuredValue) -> bool {
        use StructuredValue as V;
        match (a, b) {
            (V::Null, V::Null) => true,
            (V::Boolean(x), V::Boolean(y)) => x == y,
            (V::Text(x), V::Text(y)) => normalize_text(x) == normalize_text(y),
            (V::Expression(x), V::Expression(y)) => self.exprs_match(x, y),
            (V::Equation { lhs: l1, rhs: r1 }, V::Equation { lhs: l2, rhs: r2 }) => {
                self.exprs_match(l1, l2) && self.exprs_match(r1, r2)
            }
            (V::Sequence(xs), V::Sequence(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.matches(x, y))
            }
            (V::Mapping(xs), V::Mapping(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().all(|(key, value)| {
                        ys.iter()
                            .find(|(other, _)| self.matches(key, other))
                            .is_some_and(|(_, other)| self.matches(value, other))
                    })
            }
            (V::Matrix(x), V::Matrix(y)) => self.matrices_match(x, y),
            _ => false,
        }
    }

    fn matrices_match(&self, a: &Matrix, b: &Matrix) -> bool {
        a.rows() == b.rows()
            && a.cols() == b.cols()
            && a
                .entries()
                .iter()
                .zip(b.entries())
                .all(|(x, y)| self.exprs_match(x, y))
    }

    /// Structural equality first; then exact agreement when both sides
    /// are exact, numeric closeness otherwise
    #[must_use]
    pub fn exprs_match(&self, a: &Expr, b: &Expr) -> bool {
        if a == b {
            return true;
        }
        if a.is_infinite() || b.is_infinite() {
            return a.infinity_sign().is_some() && a.infinity_sign() == b.infinity_sign();
        }
        if a.is_exact() && b.is_exact() {
            return exact_forms_match(a, b);
        }
        let symbols: Vec<String> = a.free_symbols().union(&b.free_symbols()).cloned().collect();
        if symbols.is_empty() {
            return match (eval_complex(a, &BTreeMap::new()), eval_complex(b, &BTreeMap::new())) {
                (Ok(x), Ok(y)) => self.tolerance.close_complex(x, y),
                _ => false,
            };
        }
        let mut compared = 0;
        for point in 0..SAMPLE_HUNDREDTHS.len() {
            let env: BTreeMap<String, Complex64> = symbols
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    #[allow(clippy::cast_precision_loss)]
                    let coordinate = sample(point, i) as f64 / 100.0;
                    (name.clone(), Complex64::new(coordinate, 0.0))
                })
                .collect();
            match (eval_complex(a, &env), eval_complex(b, &env)) {
                (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => {
                    if !self.tolerance.close_complex(x, y) {
                        return false;
                    }
                    compared += 1;
                }
                _ => {}
            }
        }
        compared > 0
    }
}

fn sample(point: usize, symbol: usize) -> i64 {
    SAMPLE_HUNDREDTHS[(point + symbol) % SAMPLE_HUNDREDTHS.len()]
}

/// `a - b` is zero after expansion, or vanishes to [`EXACT_RESIDUE`] at
/// every sample point where it evaluates
fn exact_forms_match(a: &Expr, b: &Expr) -> bool {
    let raw = a.sub(b);
    let diff = expand(&raw).unwrap_or(raw);
    if diff.is_zero() {
        return true;
    }
    if diff.as_number().is_some() {
        return false;
    }
    let Ok(residue) = Number::parse_literal(EXACT_RESIDUE, NumericMode::Exact) else {
        return false;
    };
    let mode = NumericMode::Precise {
        digits: EXACT_DIGITS,
    };
    let symbols: Vec<String> = diff.free_symbols().into_iter().collect();
    let points = if symbols.is_empty() {
        1
    } else {
        SAMPLE_HUNDREDTHS.len()
    };
    let mut compared = 0;
    for point in 0..points {
        let mut env = BTreeMap::new();
        for (i, name) in symbols.iter().enumerate() {
            match Number::ratio(sample(point, i), 100) {
                Ok(value) => env.insert(name.clone(), value),
                Err(_) => return false,
            };
        }
        if let Ok(value) = eval_number(&diff, &env, mode) {
            if value.abs().cmp_value(&residue) == Some(Ordering::Greater) {
                return false;
            }
            compared += 1;
        }
    }
    compared > 0
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vs_math::{Constant, Func, Number};

    fn num(value: f64) -> StructuredValue {
        StructuredValue::Expression(Expr::Num(Number::Float(value)))
    }

    fn exact(p: i64, q: i64) -> StructuredValue {
        StructuredValue::Expression(Expr::rational(p, q).unwrap())
    }

    #[test]
    fn exact_against_float() {
        let cmp = Comparator::default();
        assert!(cmp.matches(&exact(1, 3), &num(1.0 / 3.0)));
        assert!(!cmp.matches(&exact(1, 3), &num(0.3333)));
    }

    #[test]
    fn exact_results_must_agree_exactly() {
        let cmp = Comparator::default();
        let big = |n: i64| StructuredValue::Expression(Expr::int(n));
        assert!(!cmp.matches(&big(1_000_000_000_001), &big(1_000_000_000_000)));
        assert!(!cmp.matches(&exact(1, 3), &exact(333_333_333_333, 1_000_000_000_000)));
        assert!(cmp.matches(&exact(2, 6), &exact(1, 3)));

        let loose = Comparator::new(Tolerance::relative(1e-3));
        assert!(!loose.matches(&big(1001), &big(1000)));
        assert!(loose.matches(&big(1001), &num(1000.0)));
    }

    #[test]
    fn exact_closed_forms_compare_by_value() {
        let cmp = Comparator::default();
        let two = Expr::sqrt(Expr::int(2)).unwrap();
        let three = Expr::sqrt(Expr::int(3)).unwrap();
        let six = Expr::sqrt(Expr::int(6)).unwrap();
        assert!(cmp.exprs_match(&two.mul(&three).unwrap(), &six));
        assert!(!cmp.exprs_match(&two, &three));
        let near = two.add(&Expr::rational(1, 1_000_000_000_000_000).unwrap());
        assert!(!cmp.exprs_match(&two, &near));
    }

    #[test]
    fn tolerance_bounds_the_gap() {
        let cmp = Comparator::new(Tolerance::relative(1e-6));
        assert!(!cmp.matches(&exact(4, 1), &num(4.0001)));
        assert!(cmp.matches(&exact(4, 1), &num(4.000_000_1)));
    }

    #[test]
    fn symbolic_forms_compare_by_sampling() {
        let x = Expr::symbol("x");
        let squared = x.pow(&Expr::int(2)).unwrap();
        let expanded = x.mul(&x).unwrap();
        let cmp = Comparator::default();
        assert!(cmp.exprs_match(&squared, &expanded));
        assert!(!cmp.exprs_match(&squared, &x));

        let sin_sq = Expr::apply(Func::Sin, x.clone()).unwrap().pow(&Expr::int(2)).unwrap();
        let cos_sq = Expr::apply(Func::Cos, x).unwrap().pow(&Expr::int(2)).unwrap();
        let identity = sin_sq.add(&cos_sq);
        assert!(cmp.exprs_match(&identity, &Expr::one()));
    }

    #[test]
    fn constants_evaluate() {
        let cmp = Comparator::default();
        let pi = StructuredValue::Expression(Expr::Const(Constant::Pi));
        assert!(cmp.matches(&pi, &num(std::f64::consts::PI)));
        let inf = StructuredValue::Expression(Expr::Const(Constant::Infinity));
        assert!(cmp.matches(&inf, &num(f64::INFINITY)));
        assert!(!cmp.matches(&inf, &num(f64::NEG_INFINITY)));
    }

    #[test]
    fn shapes_must_agree() {
        let cmp = Comparator::default();
        let seq = |items: Vec<StructuredValue>| StructuredValue::Sequence(items);
        assert!(cmp.matches(&seq(vec![exact(1, 2), exact(2, 1)]), &seq(vec![num(0.5), num(2.0)])));
        assert!(!cmp.matches(&seq(vec![exact(1, 2)]), &seq(vec![num(0.5), num(2.0)])));
        assert!(!cmp.matches(&exact(1, 2), &seq(vec![num(0.5)])));
        assert!(cmp.matches(
            &StructuredValue::Text("x  = 2".into()),
            &StructuredValue::Text(" x = 2".into())
        ));
    }

    #[test]
    fn matrices_compare_component_wise() {
        let cmp = Comparator::default();
        let a = Matrix::from_rows(vec![vec![Expr::int(1), Expr::rational(1, 2).unwrap()]]).unwrap();
        let b = Matrix::from_rows(vec![vec![Expr::Num(Number::Float(1.0)), Expr::Num(Number::Float(0.5))]]).unwrap();
        let c = Matrix::from_rows(vec![vec![Expr::int(1)], vec![Expr::rational(1, 2).unwrap()]]).unwrap();
        assert!(cmp.matches(&StructuredValue::Matrix(a.clone()), &StructuredValue::Matrix(b)));
        assert!(!cmp.matches(&StructuredValue::Matrix(a), &StructuredValue::Matrix(c)));
    }

    proptest! {
        #[test]
        fn matching_is_symmetric(a in -1e6f64..1e6, b in -1e6f64..1e6) {
            let cmp = Comparator::default();
            prop_assert_eq!(cmp.matches(&num(a), &num(b)), cmp.matches(&num(b), &num(a)));
        }

        #[test]
        fn tiny_relative_error_is_absorbed(a in -1e6f64..1e6) {
            let cmp = Comparator::default();
            prop_assert!(cmp.matches(&num(a), &num(a * (1.0 + 1e-12))));
        }
    }
}
