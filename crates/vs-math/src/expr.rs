//! Symbolic expressions
//!
//! Expressions are built only through the canonicalising constructors
//! [`Expr::sum`], [`Expr::product`], [`Expr::power`] and [`Expr::apply`],
//! which keep the tree in a normal form:
//! - nested sums and products are flattened
//! - numeric parts are folded into a single leading coefficient
//! - like terms and equal bases are collected
//! - operands are sorted by [`canonical_cmp`]
//!
//! Two expressions produced this way compare equal structurally when they
//! are equal after these rewrites.

use crate::error::{MathError, MathResult};
use crate::eval;
use crate::number::Number;
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Named mathematical constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    /// π
    Pi,
    /// Euler's number
    E,
    /// Imaginary unit
    I,
    /// Positive infinity
    Infinity,
}

/// Elementary functions of one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Func {
    /// Sine
    Sin,
    /// Cosine
    Cos,
    /// Tangent
    Tan,
    /// Arc sine
    Asin,
    /// Arc cosine
    Acos,
    /// Arc tangent
    Atan,
    /// Exponential
    Exp,
    /// Natural logarithm
    Log,
    /// Absolute value
    Abs,
}

impl Func {
    /// Name used by the text renderer
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Abs => "Abs",
        }
    }
}

/// A symbolic expression in canonical form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", content = "args", rename_all = "snake_case")]
pub enum Expr {
    /// Numeric leaf
    Num(Number),
    /// Free symbol
    Sym(String),
    /// Named constant
    Const(Constant),
    /// Sum of two or more terms
    Add(Vec<Expr>),
    /// Product of two or more factors, numeric coefficient first
    Mul(Vec<Expr>),
    /// Power
    Pow(Box<Expr>, Box<Expr>),
    /// Function application
    Func(Func, Box<Expr>),
}

impl From<Number> for Expr {
    fn from(value: Number) -> Self {
        Self::Num(value)
    }
}

impl Expr {
    /// Exact integer
    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::Num(Number::integer(value))
    }

    /// Exact zero
    #[must_use]
    pub fn zero() -> Self {
        Self::int(0)
    }

    /// Exact one
    #[must_use]
    pub fn one() -> Self {
        Self::int(1)
    }

    /// Exact rational `numer / denom`
    pub fn rational(numer: i64, denom: i64) -> MathResult<Self> {
        Number::ratio(numer, denom).map(Self::Num)
    }

    /// Free symbol
    #[must_use]
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Sym(name.into())
    }

    /// Numeric value if this is a bare number
    #[must_use]
    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Self::Num(n) => Some(n),
            _ => None,
        }
    }

    /// Literal zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        matches!(self, Self::Num(n) if n.is_zero())
    }

    /// Literal one
    #[must_use]
    pub fn is_one(&self) -> bool {
        matches!(self, Self::Num(n) if n.is_one())
    }

    /// Whether this is the symbol `name`
    #[must_use]
    pub fn is_symbol(&self, name: &str) -> bool {
        matches!(self, Self::Sym(s) if s == name)
    }

    /// Positive or negative infinity
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        match self {
            Self::Const(Constant::Infinity) => true,
            Self::Num(Number::Float(f)) => f.is_infinite(),
            Self::Mul(factors) => {
                factors.len() == 2
                    && matches!(&factors[0], Self::Num(n) if n.is_negative())
                    && matches!(&factors[1], Self::Const(Constant::Infinity))
            }
            _ => false,
        }
    }

    /// Sign of an infinite value (`Some(true)` for +∞)
    #[must_use]
    pub fn infinity_sign(&self) -> Option<bool> {
        match self {
            Self::Const(Constant::Infinity) => Some(true),
            Self::Num(Number::Float(f)) if f.is_infinite() => Some(*f > 0.0),
            Self::Mul(_) if self.is_infinite() => Some(false),
            _ => None,
        }
    }

    /// Free symbols in sorted order
    #[must_use]
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Sym(name) => {
                out.insert(name.clone());
            }
            Self::Num(_) | Self::Const(_) => {}
            Self::Add(items) | Self::Mul(items) => {
                for item in items {
                    item.collect_symbols(out);
                }
            }
            Self::Pow(base, exp) => {
                base.collect_symbols(out);
                exp.collect_symbols(out);
            }
            Self::Func(_, arg) => arg.collect_symbols(out),
        }
    }

    /// Whether `name` occurs in the expression
    #[must_use]
    pub fn has_symbol(&self, name: &str) -> bool {
        match self {
            Self::Sym(s) => s == name,
            Self::Num(_) | Self::Const(_) => false,
            Self::Add(items) | Self::Mul(items) => items.iter().any(|i| i.has_symbol(name)),
            Self::Pow(base, exp) => base.has_symbol(name) || exp.has_symbol(name),
            Self::Func(_, arg) => arg.has_symbol(name),
        }
    }

    /// No free symbols
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.free_symbols().is_empty()
    }

    /// Every numeric leaf is an exact rational
    #[must_use]
    pub fn is_exact(&self) -> bool {
        match self {
            Self::Num(n) => n.is_exact(),
            Self::Sym(_) | Self::Const(_) => true,
            Self::Add(items) | Self::Mul(items) => items.iter().all(Self::is_exact),
            Self::Pow(base, exp) => base.is_exact() && exp.is_exact(),
            Self::Func(_, arg) => arg.is_exact(),
        }
    }

    /// Split a term into numeric coefficient and remainder
    #[must_use]
    pub fn split_coefficient(&self) -> (Number, Self) {
        match self {
            Self::Num(n) => (n.clone(), Self::one()),
            Self::Mul(factors) => match factors.first() {
                Some(Self::Num(c)) => {
                    let rest = &factors[1..];
                    let rest = if rest.len() == 1 {
                        rest[0].clone()
                    } else {
                        Self::Mul(rest.to_vec())
                    };
                    (c.clone(), rest)
                }
                _ => (Number::one(), self.clone()),
            },
            _ => (Number::one(), self.clone()),
        }
    }

    /// Split a factor into base and exponent
    #[must_use]
    pub fn split_power(&self) -> (Self, Self) {
        match self {
            Self::Pow(base, exp) => ((**base).clone(), (**exp).clone()),
            _ => (self.clone(), Self::one()),
        }
    }

    /// Whether the leading coefficient is negative
    #[must_use]
    pub fn has_negative_sign(&self) -> bool {
        match self {
            Self::Num(n) => n.is_negative(),
            Self::Mul(factors) => matches!(factors.first(), Some(Self::Num(n)) if n.is_negative()),
            _ => false,
        }
    }

    /// Multiply by a numeric coefficient without re-canonicalising
    #[must_use]
    pub fn scale(&self, coeff: &Number) -> Self {
        if coeff.is_zero() {
            return Self::Num(coeff.clone());
        }
        if coeff.is_one() {
            return self.clone();
        }
        match self {
            Self::Num(n) => Self::Num(n.mul(coeff)),
            Self::Add(terms) => Self::sum(terms.iter().map(|t| t.scale(coeff)).collect()),
            _ => {
                let (c, rest) = self.split_coefficient();
                with_coefficient(c.mul(coeff), rest)
            }
        }
    }

    /// Negation
    #[must_use]
    pub fn neg(&self) -> Self {
        self.scale(&Number::integer(-1))
    }

    /// `self + other`
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        Self::sum(vec![self.clone(), other.clone()])
    }

    /// `self - other`
    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        Self::sum(vec![self.clone(), other.neg()])
    }

    /// `self * other`
    pub fn mul(&self, other: &Self) -> MathResult<Self> {
        Self::product(vec![self.clone(), other.clone()])
    }

    /// `self / other`
    pub fn div(&self, other: &Self) -> MathResult<Self> {
        if other.is_zero() {
            return Err(MathError::DivisionByZero);
        }
        let inverse = Self::power(other.clone(), Self::int(-1))?;
        Self::product(vec![self.clone(), inverse])
    }

    /// `self ** other`
    pub fn pow(&self, other: &Self) -> MathResult<Self> {
        Self::power(self.clone(), other.clone())
    }

    /// Square root
    pub fn sqrt(arg: Self) -> MathResult<Self> {
        let half = match &arg {
            Self::Num(n) if !n.is_exact() => Number::Float(0.5).in_mode(approximate_mode(n)),
            _ => Number::ratio(1, 2)?,
        };
        Self::power(arg, Self::Num(half))
    }

    /// Canonical sum
    #[must_use]
    pub fn sum(terms: Vec<Self>) -> Self {
        let mut flat = Vec::with_capacity(terms.len());
        flatten(terms, &mut flat, |e| match e {
            Self::Add(inner) => Ok(inner),
            other => Err(other),
        });

        let mut constant: Option<Number> = None;
        let mut collected: Vec<(Self, Number)> = Vec::new();
        for term in flat {
            match term {
                Self::Num(n) => {
                    constant = Some(match constant {
                        Some(c) => c.add(&n),
                        None => n,
                    });
                }
                other => {
                    let (coeff, rest) = other.split_coefficient();
                    if let Some(slot) = collected.iter_mut().find(|(t, _)| *t == rest) {
                        slot.1 = slot.1.add(&coeff);
                    } else {
                        collected.push((rest, coeff));
                    }
                }
            }
        }

        let mut out: Vec<Self> = collected
            .into_iter()
            .filter(|(_, c)| !c.is_zero())
            .map(|(rest, c)| with_coefficient(c, rest))
            .collect();
        if let Some(c) = constant {
            if !c.is_zero() || out.is_empty() {
                out.push(Self::Num(c));
            }
        }
        match out.len() {
            0 => Self::zero(),
            1 => out.remove(0),
            _ => {
                out.sort_by(canonical_cmp);
                Self::Add(out)
            }
        }
    }

    /// Canonical product
    pub fn product(factors: Vec<Self>) -> MathResult<Self> {
        let mut flat = Vec::with_capacity(factors.len());
        flatten(factors, &mut flat, |e| match e {
            Self::Mul(inner) => Ok(inner),
            other => Err(other),
        });

        let mut coeff = Number::one();
        let mut powers: Vec<(Self, Self)> = Vec::new();
        for factor in flat {
            match factor {
                Self::Num(n) => coeff = coeff.mul(&n),
                other => {
                    let (base, exp) = other.split_power();
                    if let Some(slot) = powers.iter_mut().find(|(b, _)| *b == base) {
                        slot.1 = slot.1.add(&exp);
                    } else {
                        powers.push((base, exp));
                    }
                }
            }
        }
        if coeff.is_zero() {
            return Ok(Self::Num(coeff));
        }

        let mut rest = Vec::with_capacity(powers.len());
        for (base, exp) in powers {
            match Self::power(base, exp)? {
                Self::Num(n) => coeff = coeff.mul(&n),
                Self::Mul(inner) => {
                    for g in inner {
                        match g {
                            Self::Num(n) => coeff = coeff.mul(&n),
                            other => rest.push(other),
                        }
                    }
                }
                other => rest.push(other),
            }
        }
        if coeff.is_zero() {
            return Ok(Self::Num(coeff));
        }
        if has_duplicate_bases(&rest) {
            let mut again = rest;
            again.push(Self::Num(coeff));
            return Self::product(again);
        }
        rest.sort_by(canonical_cmp);

        if rest.len() == 1 {
            if let Self::Add(terms) = &rest[0] {
                if !coeff.is_one() {
                    return Ok(Self::sum(terms.iter().map(|t| t.scale(&coeff)).collect()));
                }
            }
        }
        Ok(match (rest.len(), coeff.is_one()) {
            (0, _) => Self::Num(coeff),
            (1, true) => rest.remove(0),
            (_, true) => Self::Mul(rest),
            _ => {
                rest.insert(0, Self::Num(coeff));
                Self::Mul(rest)
            }
        })
    }

    /// Canonical power
    pub fn power(base: Self, exp: Self) -> MathResult<Self> {
        if exp.is_zero() {
            return Ok(match &base {
                Self::Num(n) => Self::Num(n.one_like()),
                _ => Self::one(),
            });
        }
        if exp.is_one() || base.is_one() {
            return Ok(base);
        }
        match (&base, &exp) {
            (Self::Num(b), Self::Num(e)) => return numeric_power(b, e),
            (Self::Const(Constant::I), Self::Num(e)) if e.is_integer() => {
                let n = e.to_bigint().unwrap_or_default();
                let k = n.mod_floor(&BigInt::from(4)).to_u8().unwrap_or(0);
                return Ok(match k {
                    0 => Self::one(),
                    1 => Self::Const(Constant::I),
                    2 => Self::int(-1),
                    _ => Self::Mul(vec![Self::int(-1), Self::Const(Constant::I)]),
                });
            }
            (Self::Const(Constant::E), _) => return Self::apply(Func::Exp, exp),
            (Self::Pow(inner_base, inner_exp), Self::Num(e)) if e.is_integer() => {
                let combined = inner_exp.mul(&exp)?;
                return Self::power((**inner_base).clone(), combined);
            }
            (Self::Mul(factors), Self::Num(e)) if e.is_integer() => {
                let raised = factors
                    .iter()
                    .map(|f| Self::power(f.clone(), exp.clone()))
                    .collect::<MathResult<Vec<_>>>()?;
                return Self::product(raised);
            }
            (Self::Func(Func::Exp, arg), _) => {
                return Self::apply(Func::Exp, arg.mul(&exp)?);
            }
            _ => {}
        }
        Ok(Self::Pow(Box::new(base), Box::new(exp)))
    }

    /// Canonical function application with exact special values
    pub fn apply(func: Func, arg: Self) -> MathResult<Self> {
        if let Self::Num(n) = &arg {
            if !n.is_exact() {
                return eval::real_function(func, n).map(Self::Num);
            }
            if let Some(value) = exact_special_value(func, n)? {
                return Ok(value);
            }
        }
        match (func, &arg) {
            (Func::Exp, Self::Func(Func::Log, inner)) | (Func::Log, Self::Func(Func::Exp, inner)) => {
                return Ok((**inner).clone());
            }
            (Func::Log, Self::Const(Constant::E)) => return Ok(Self::one()),
            (Func::Abs, Self::Func(Func::Abs, _) | Self::Const(Constant::Pi | Constant::E)) => {
                return Ok(arg);
            }
            (Func::Sin | Func::Cos | Func::Tan, _) => {
                if let Some(k) = pi_multiple(&arg) {
                    if let Some(value) = trig_at_pi_multiple(func, &k)? {
                        return Ok(value);
                    }
                }
            }
            _ => {}
        }
        Ok(Self::Func(func, Box::new(arg)))
    }

    /// Substitute `value` for every occurrence of symbol `var`
    pub fn subs(&self, var: &str, value: &Self) -> MathResult<Self> {
        if !self.has_symbol(var) {
            return Ok(self.clone());
        }
        self.rebuild(&|e| match e {
            Self::Sym(s) if s == var => Some(value.clone()),
            _ => None,
        })
    }

    /// Rebuild bottom-up through the canonical constructors, replacing
    /// leaves for which `leaf` returns a value
    pub fn rebuild(&self, leaf: &dyn Fn(&Self) -> Option<Self>) -> MathResult<Self> {
        if let Some(replacement) = leaf(self) {
            return Ok(replacement);
        }
        match self {
            Self::Num(_) | Self::Sym(_) | Self::Const(_) => Ok(self.clone()),
            Self::Add(terms) => Ok(Self::sum(
                terms
                    .iter()
                    .map(|t| t.rebuild(leaf))
                    .collect::<MathResult<Vec<_>>>()?,
            )),
            Self::Mul(factors) => Self::product(
                factors
                    .iter()
                    .map(|f| f.rebuild(leaf))
                    .collect::<MathResult<Vec<_>>>()?,
            ),
            Self::Pow(base, exp) => Self::power(base.rebuild(leaf)?, exp.rebuild(leaf)?),
            Self::Func(func, arg) => Self::apply(*func, arg.rebuild(leaf)?),
        }
    }

    /// Split into numerator and denominator
    #[must_use]
    pub fn as_numer_denom(&self) -> (Self, Self) {
        let factors: Vec<Self> = match self {
            Self::Mul(factors) => factors.clone(),
            other => vec![other.clone()],
        };
        let mut numer = Vec::new();
        let mut denom = Vec::new();
        for factor in factors {
            match &factor {
                Self::Pow(base, exp) if exp.has_negative_sign() => {
                    let positive = exp.neg();
                    match Self::power((**base).clone(), positive) {
                        Ok(d) => denom.push(d),
                        Err(_) => numer.push(factor.clone()),
                    }
                }
                Self::Num(Number::Rational(r)) if !r.is_integer() => {
                    numer.push(Self::Num(Number::Rational(BigRational::from_integer(
                        r.numer().clone(),
                    ))));
                    denom.push(Self::Num(Number::Rational(BigRational::from_integer(
                        r.denom().clone(),
                    ))));
                }
                _ => numer.push(factor),
            }
        }
        let build = |items: Vec<Self>| match items.len() {
            0 => Self::one(),
            1 => items.into_iter().next().unwrap_or_else(Self::one),
            _ => Self::product(items.clone()).unwrap_or(Self::Mul(items)),
        };
        (build(numer), build(denom))
    }
}

fn approximate_mode(n: &Number) -> crate::number::NumericMode {
    match n {
        Number::Precise { digits, .. } => crate::number::NumericMode::Precise { digits: *digits },
        _ => crate::number::NumericMode::Float,
    }
}

fn flatten(
    items: Vec<Expr>,
    out: &mut Vec<Expr>,
    open: impl Fn(Expr) -> Result<Vec<Expr>, Expr> + Copy,
) {
    for item in items {
        match open(item) {
            Ok(inner) => flatten(inner, out, open),
            Err(leaf) => out.push(leaf),
        }
    }
}

fn with_coefficient(coeff: Number, rest: Expr) -> Expr {
    if coeff.is_zero() {
        return Expr::Num(coeff);
    }
    if rest.is_one() {
        return Expr::Num(coeff);
    }
    if coeff.is_one() {
        return rest;
    }
    match rest {
        Expr::Mul(mut factors) => {
            factors.insert(0, Expr::Num(coeff));
            Expr::Mul(factors)
        }
        Expr::Add(terms) => Expr::sum(terms.iter().map(|t| t.scale(&coeff)).collect()),
        other => Expr::Mul(vec![Expr::Num(coeff), other]),
    }
}

fn has_duplicate_bases(factors: &[Expr]) -> bool {
    let bases: Vec<Expr> = factors.iter().map(|f| f.split_power().0).collect();
    bases
        .iter()
        .enumerate()
        .any(|(i, b)| bases[i + 1..].contains(b))
}

fn numeric_power(b: &Number, e: &Number) -> MathResult<Expr> {
    if b.is_negative() && !e.is_integer() {
        if e.is_one_half() {
            let magnitude = numeric_power(&b.neg(), e)?;
            return Expr::product(vec![Expr::Const(Constant::I), magnitude]);
        }
        if !b.is_exact() || !e.is_exact() {
            return Err(MathError::Domain(format!(
                "{b} ** {e} is not a real number"
            )));
        }
        return Ok(Expr::Pow(Box::new(Expr::Num(b.clone())), Box::new(Expr::Num(e.clone()))));
    }
    if let Some(n) = b.pow(e)? {
        return Ok(Expr::Num(n));
    }
    if e.is_one_half() {
        if let Some(extracted) = extract_square_factor(b) {
            return Ok(extracted);
        }
    }
    Ok(Expr::Pow(Box::new(Expr::Num(b.clone())), Box::new(Expr::Num(e.clone()))))
}

/// `sqrt(n/d)` as `(k/d) * sqrt(r)` with `r` square-free over small primes
fn extract_square_factor(b: &Number) -> Option<Expr> {
    let Number::Rational(r) = b else {
        return None;
    };
    let mut m = r.numer() * r.denom();
    let mut k = BigInt::one();
    let mut p = BigInt::from(2);
    let limit = BigInt::from(10_000);
    while &p * &p <= m && p <= limit {
        let square = &p * &p;
        while (&m % &square).is_zero() {
            m /= &square;
            k *= &p;
        }
        p += 1;
    }
    if k.is_one() && r.denom().is_one() {
        return None;
    }
    let coeff = Number::Rational(BigRational::new(k, r.denom().clone()));
    let half = Number::ratio(1, 2).ok()?;
    let root = if m.is_one() {
        return Some(Expr::Num(coeff));
    } else {
        Expr::Pow(
            Box::new(Expr::Num(Number::Rational(BigRational::from_integer(m)))),
            Box::new(Expr::Num(half)),
        )
    };
    Some(with_coefficient(coeff, root))
}

fn exact_special_value(func: Func, n: &Number) -> MathResult<Option<Expr>> {
    let zero = n.is_zero();
    let one = n.is_one();
    let minus_one = n.is_negative() && n.abs().is_one();
    Ok(match func {
        Func::Sin | Func::Tan | Func::Asin | Func::Atan if zero => Some(Expr::zero()),
        Func::Cos | Func::Exp if zero => Some(Expr::one()),
        Func::Acos if one => Some(Expr::zero()),
        Func::Log if one => Some(Expr::zero()),
        Func::Log if zero || n.is_negative() => {
            return Err(MathError::Domain(format!("log({n}) is undefined over the reals")));
        }
        Func::Asin | Func::Acos if n.abs().cmp_value(&Number::one()) == Some(Ordering::Greater) => {
            return Err(MathError::Domain(format!("{}({n}) is outside [-1, 1]", func.name())));
        }
        Func::Asin if one || minus_one => {
            let half_pi = Expr::Mul(vec![Expr::Num(Number::ratio(1, 2)?), Expr::Const(Constant::Pi)]);
            Some(if one { half_pi } else { half_pi.neg() })
        }
        Func::Acos if minus_one => Some(Expr::Const(Constant::Pi)),
        Func::Atan if one || minus_one => {
            let quarter_pi = Expr::Mul(vec![Expr::Num(Number::ratio(1, 4)?), Expr::Const(Constant::Pi)]);
            Some(if one { quarter_pi } else { quarter_pi.neg() })
        }
        Func::Abs => Some(Expr::Num(n.abs())),
        _ => None,
    })
}

/// Rational k with `arg == k*pi`
fn pi_multiple(arg: &Expr) -> Option<BigRational> {
    match arg {
        Expr::Const(Constant::Pi) => Some(BigRational::one()),
        Expr::Mul(factors) if factors.len() == 2 => match (&factors[0], &factors[1]) {
            (Expr::Num(Number::Rational(k)), Expr::Const(Constant::Pi)) => Some(k.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn trig_at_pi_multiple(func: Func, k: &BigRational) -> MathResult<Option<Expr>> {
    let two = BigRational::from_integer(BigInt::from(2));
    let reduced = k - (k / &two).floor() * &two;
    let half = BigRational::new(BigInt::one(), BigInt::from(2));
    let three_halves = BigRational::new(BigInt::from(3), BigInt::from(2));
    let value = if reduced.is_zero() {
        match func {
            Func::Sin | Func::Tan => Some(0),
            _ => Some(1),
        }
    } else if reduced.is_one() {
        match func {
            Func::Sin | Func::Tan => Some(0),
            _ => Some(-1),
        }
    } else if reduced == half {
        match func {
            Func::Sin => Some(1),
            Func::Cos => Some(0),
            _ => return Err(MathError::DivisionByZero),
        }
    } else if reduced == three_halves {
        match func {
            Func::Sin => Some(-1),
            Func::Cos => Some(0),
            _ => return Err(MathError::DivisionByZero),
        }
    } else {
        None
    };
    Ok(value.map(Expr::int))
}

fn rank(e: &Expr) -> u8 {
    match e {
        Expr::Num(_) => 0,
        Expr::Const(_) => 1,
        Expr::Sym(_) => 2,
        Expr::Pow(..) => 3,
        Expr::Func(..) => 4,
        Expr::Mul(_) => 5,
        Expr::Add(_) => 6,
    }
}

fn variant_index(n: &Number) -> u8 {
    match n {
        Number::Rational(_) => 0,
        Number::Precise { .. } => 1,
        Number::Float(_) => 2,
    }
}

/// Total order used to sort operands of sums and products
#[must_use]
pub fn canonical_cmp(a: &Expr, b: &Expr) -> Ordering {
    match (a, b) {
        (Expr::Num(x), Expr::Num(y)) => variant_index(x)
            .cmp(&variant_index(y))
            .then_with(|| match (x, y) {
                (Number::Float(p), Number::Float(q)) => p.total_cmp(q),
                (
                    Number::Rational(p) | Number::Precise { value: p, .. },
                    Number::Rational(q) | Number::Precise { value: q, .. },
                ) => p.cmp(q),
                _ => Ordering::Equal,
            }),
        (Expr::Const(x), Expr::Const(y)) => x.cmp(y),
        (Expr::Sym(x), Expr::Sym(y)) => x.cmp(y),
        (Expr::Pow(xb, xe), Expr::Pow(yb, ye)) => {
            canonical_cmp(xb, yb).then_with(|| canonical_cmp(xe, ye))
        }
        (Expr::Func(f, x), Expr::Func(g, y)) => f.cmp(g).then_with(|| canonical_cmp(x, y)),
        (Expr::Add(xs), Expr::Add(ys)) | (Expr::Mul(xs), Expr::Mul(ys)) => {
            for (x, y) in xs.iter().zip(ys) {
                let ord = canonical_cmp(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Total degree used to order terms for display (higher first)
#[must_use]
pub fn display_degree(e: &Expr) -> f64 {
    match e {
        Expr::Sym(_) => 1.0,
        Expr::Pow(base, exp) => match exp.as_number() {
            Some(n) => display_degree(base) * n.to_f64(),
            None => display_degree(base),
        },
        Expr::Mul(factors) => factors.iter().map(display_degree).sum(),
        Expr::Add(terms) => terms.iter().map(display_degree).fold(0.0, f64::max),
        Expr::Func(..) => 0.5,
        Expr::Num(_) | Expr::Const(_) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn x() -> Expr {
        Expr::symbol("x")
    }

    fn y() -> Expr {
        Expr::symbol("y")
    }

    #[test]
    fn test_like_terms_collect() {
        let e = Expr::sum(vec![x(), x(), Expr::int(3), Expr::int(-3)]);
        assert_eq!(e, Expr::Mul(vec![Expr::int(2), x()]));
        assert_eq!(x().sub(&x()), Expr::zero());
    }

    #[test]
    fn test_powers_collect() {
        let e = Expr::product(vec![x(), x(), x()]).unwrap();
        assert_eq!(e, Expr::Pow(Box::new(x()), Box::new(Expr::int(3))));
        let cancel = x().div(&x()).unwrap();
        assert_eq!(cancel, Expr::one());
    }

    #[test]
    fn test_sum_is_order_independent() {
        let a = Expr::sum(vec![x(), y(), Expr::int(1)]);
        let b = Expr::sum(vec![Expr::int(1), y(), x()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_coefficient_distributes_over_sum() {
        let e = Expr::int(2).mul(&x().add(&Expr::one())).unwrap();
        assert_eq!(
            e,
            Expr::sum(vec![Expr::Mul(vec![Expr::int(2), x()]), Expr::int(2)])
        );
    }

    #[test]
    fn test_square_root_simplification() {
        let root = Expr::sqrt(Expr::int(8)).unwrap();
        let expected = Expr::Mul(vec![
            Expr::int(2),
            Expr::Pow(Box::new(Expr::int(2)), Box::new(Expr::rational(1, 2).unwrap())),
        ]);
        assert_eq!(root, expected);
        let squared = root.pow(&Expr::int(2)).unwrap();
        assert_eq!(squared, Expr::int(8));
    }

    #[test]
    fn test_negative_square_root_is_imaginary() {
        let root = Expr::sqrt(Expr::int(-4)).unwrap();
        assert_eq!(root, Expr::Mul(vec![Expr::int(2), Expr::Const(Constant::I)]));
        let unit = Expr::Const(Constant::I).pow(&Expr::int(2)).unwrap();
        assert_eq!(unit, Expr::int(-1));
    }

    #[test]
    fn test_special_values() {
        assert_eq!(Expr::apply(Func::Sin, Expr::Const(Constant::Pi)).unwrap(), Expr::zero());
        assert_eq!(Expr::apply(Func::Cos, Expr::zero()).unwrap(), Expr::one());
        let exp_log = Expr::apply(Func::Exp, Expr::apply(Func::Log, x()).unwrap()).unwrap();
        assert_eq!(exp_log, x());
        assert!(Expr::apply(Func::Log, Expr::zero()).is_err());
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(x().div(&Expr::zero()), Err(MathError::DivisionByZero));
        assert_eq!(
            Expr::power(Expr::zero(), Expr::int(-1)),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn test_subs() {
        let e = x().pow(&Expr::int(2)).unwrap().add(&y());
        let v = e.subs("x", &Expr::int(3)).unwrap();
        assert_eq!(v, Expr::sum(vec![Expr::int(9), y()]));
        assert_eq!(v.free_symbols().into_iter().collect::<Vec<_>>(), vec!["y".to_string()]);
    }

    #[test]
    fn test_numer_denom() {
        let e = Expr::apply(Func::Sin, x()).unwrap().div(&x()).unwrap();
        let (n, d) = e.as_numer_denom();
        assert_eq!(n, Expr::apply(Func::Sin, x()).unwrap());
        assert_eq!(d, x());
    }

    #[test]
    fn test_float_coefficients_fold() {
        let e = Expr::Num(Number::Float(1.5)).mul(&x()).unwrap().add(&x());
        assert_eq!(e, Expr::Mul(vec![Expr::Num(Number::Float(2.5)), x()]));
    }
}
