//! Text and LaTeX rendering
//!
//! The text form follows the conventions of common computer algebra
//! systems (`x**2 + 2*x + 1`, `sqrt(2)/2`); the LaTeX form is what the
//! pipeline shows next to each step.

use crate::expr::{canonical_cmp, display_degree, Constant, Expr, Func};
use crate::number::Number;
use std::cmp::Ordering;
use std::fmt;

fn display_terms(terms: &[Expr]) -> Vec<&Expr> {
    let mut ordered: Vec<&Expr> = terms.iter().collect();
    ordered.sort_by(|a, b| {
        display_degree(b)
            .partial_cmp(&display_degree(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| canonical_cmp(a, b))
    });
    ordered
}

fn factor_key(e: &Expr) -> (u8, String) {
    let base = e.split_power().0;
    match base {
        Expr::Const(_) => (0, String::new()),
        Expr::Sym(name) => (1, name),
        Expr::Func(..) => (3, String::new()),
        _ => (2, String::new()),
    }
}

/// Numerator and denominator factor lists with the coefficient pulled out
struct Fraction<'a> {
    negative: bool,
    coeff_numer: Option<String>,
    coeff_denom: Option<String>,
    numer: Vec<&'a Expr>,
    denom: Vec<Expr>,
}

fn split_fraction(factors: &[Expr]) -> Fraction<'_> {
    let mut fraction = Fraction {
        negative: false,
        coeff_numer: None,
        coeff_denom: None,
        numer: Vec::new(),
        denom: Vec::new(),
    };
    for factor in factors {
        match factor {
            Expr::Num(n) => {
                fraction.negative = n.is_negative();
                let magnitude = n.abs();
                match &magnitude {
                    Number::Rational(r) if !r.is_integer() => {
                        if r.numer().to_string() != "1" {
                            fraction.coeff_numer = Some(r.numer().to_string());
                        }
                        fraction.coeff_denom = Some(r.denom().to_string());
                    }
                    other if !other.is_one() => fraction.coeff_numer = Some(other.to_string()),
                    _ => {}
                }
            }
            Expr::Pow(base, exp) if exp.has_negative_sign() => {
                let positive = exp.neg();
                if positive.is_one() {
                    fraction.denom.push((**base).clone());
                } else {
                    fraction
                        .denom
                        .push(Expr::Pow(base.clone(), Box::new(positive)));
                }
            }
            other => fraction.numer.push(other),
        }
    }
    fraction.numer.sort_by_key(|f| factor_key(f));
    fraction
}

fn needs_parens_as_factor(e: &Expr) -> bool {
    matches!(e, Expr::Add(_))
}

fn needs_parens_as_base(e: &Expr) -> bool {
    match e {
        Expr::Add(_) | Expr::Mul(_) | Expr::Pow(..) => true,
        Expr::Num(n) => n.is_negative() || !n.is_integer(),
        _ => false,
    }
}

fn text_factor(e: &Expr) -> String {
    if needs_parens_as_factor(e) {
        format!("({e})")
    } else {
        e.to_string()
    }
}

fn text_product(items: &[String]) -> String {
    items.join("*")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Sym(name) => write!(f, "{name}"),
            Self::Const(c) => write!(
                f,
                "{}",
                match c {
                    Constant::Pi => "pi",
                    Constant::E => "E",
                    Constant::I => "I",
                    Constant::Infinity => "oo",
                }
            ),
            Self::Add(terms) => {
                for (i, term) in display_terms(terms).into_iter().enumerate() {
                    if i == 0 {
                        write!(f, "{term}")?;
                    } else if term.has_negative_sign() {
                        write!(f, " - {}", term.neg())?;
                    } else {
                        write!(f, " + {term}")?;
                    }
                }
                Ok(())
            }
            Self::Mul(factors) => {
                let fraction = split_fraction(factors);
                let mut numer: Vec<String> = fraction.coeff_numer.into_iter().collect();
                numer.extend(fraction.numer.iter().map(|e| text_factor(e)));
                let numer = if numer.is_empty() {
                    "1".to_string()
                } else {
                    text_product(&numer)
                };
                let mut denom: Vec<String> = fraction.coeff_denom.into_iter().collect();
                denom.extend(fraction.denom.iter().map(text_factor));
                let sign = if fraction.negative { "-" } else { "" };
                match denom.len() {
                    0 => write!(f, "{sign}{numer}"),
                    1 => {
                        let single = &fraction.denom;
                        let d = &denom[0];
                        if single.len() == 1 && matches!(single[0], Expr::Mul(_)) {
                            write!(f, "{sign}{numer}/({d})")
                        } else {
                            write!(f, "{sign}{numer}/{d}")
                        }
                    }
                    _ => write!(f, "{sign}{numer}/({})", text_product(&denom)),
                }
            }
            Self::Pow(base, exp) => {
                if exp.as_number().is_some_and(Number::is_one_half) {
                    return write!(f, "sqrt({base})");
                }
                if exp.has_negative_sign() {
                    let positive = exp.neg();
                    if positive.is_one() {
                        return if needs_parens_as_base(base) {
                            write!(f, "1/({base})")
                        } else {
                            write!(f, "1/{base}")
                        };
                    }
                    return write!(f, "1/{}", Self::Pow(base.clone(), Box::new(positive)));
                }
                let b = if needs_parens_as_base(base) {
                    format!("({base})")
                } else {
                    base.to_string()
                };
                let e = match &**exp {
                    Self::Sym(_) | Self::Const(_) => exp.to_string(),
                    Self::Num(n) if n.is_integer() && !n.is_negative() => exp.to_string(),
                    _ => format!("({exp})"),
                };
                write!(f, "{b}**{e}")
            }
            Self::Func(func, arg) => write!(f, "{}({arg})", func.name()),
        }
    }
}

impl Expr {
    /// LaTeX rendering
    #[must_use]
    pub fn to_latex(&self) -> String {
        match self {
            Self::Num(n) => latex_number(n),
            Self::Sym(name) => latex_symbol(name),
            Self::Const(c) => match c {
                Constant::Pi => "\\pi".to_string(),
                Constant::E => "e".to_string(),
                Constant::I => "i".to_string(),
                Constant::Infinity => "\\infty".to_string(),
            },
            Self::Add(terms) => {
                let mut out = String::new();
                for (i, term) in display_terms(terms).into_iter().enumerate() {
                    if i == 0 {
                        out.push_str(&term.to_latex());
                    } else if term.has_negative_sign() {
                        out.push_str(" - ");
                        out.push_str(&term.neg().to_latex());
                    } else {
                        out.push_str(" + ");
                        out.push_str(&term.to_latex());
                    }
                }
                out
            }
            Self::Mul(factors) => {
                let fraction = split_fraction(factors);
                let mut numer: Vec<String> = fraction.coeff_numer.into_iter().collect();
                numer.extend(fraction.numer.iter().map(|e| latex_factor(e)));
                let numer = if numer.is_empty() {
                    "1".to_string()
                } else {
                    numer.join(" ")
                };
                let mut denom: Vec<String> = fraction.coeff_denom.into_iter().collect();
                denom.extend(fraction.denom.iter().map(latex_factor));
                let sign = if fraction.negative { "- " } else { "" };
                if denom.is_empty() {
                    format!("{sign}{numer}")
                } else {
                    format!("{sign}\\frac{{{numer}}}{{{}}}", denom.join(" "))
                }
            }
            Self::Pow(base, exp) => {
                if let Some(n) = exp.as_number() {
                    if n.is_one_half() {
                        return format!("\\sqrt{{{}}}", base.to_latex());
                    }
                    if n.is_negative() {
                        let positive = Self::Pow(base.clone(), Box::new(exp.neg()));
                        let inner = if exp.neg().is_one() {
                            base.to_latex()
                        } else {
                            positive.to_latex()
                        };
                        return format!("\\frac{{1}}{{{inner}}}");
                    }
                }
                let b = if needs_parens_as_base(base) || matches!(**base, Self::Func(..)) {
                    format!("\\left({}\\right)", base.to_latex())
                } else {
                    base.to_latex()
                };
                format!("{b}^{{{}}}", exp.to_latex())
            }
            Self::Func(func, arg) => {
                let inner = arg.to_latex();
                match func {
                    Func::Exp => format!("e^{{{inner}}}"),
                    Func::Abs => format!("\\left|{{{inner}}}\\right|"),
                    Func::Asin | Func::Acos | Func::Atan => {
                        format!("\\operatorname{{{}}}{{\\left({inner} \\right)}}", func.name())
                    }
                    _ => format!("\\{}{{\\left({inner} \\right)}}", func.name()),
                }
            }
        }
    }
}

fn latex_factor(e: &Expr) -> String {
    if needs_parens_as_factor(e) {
        format!("\\left({}\\right)", e.to_latex())
    } else {
        e.to_latex()
    }
}

fn latex_number(n: &Number) -> String {
    match n {
        Number::Rational(r) if !r.is_integer() => {
            let sign = if n.is_negative() { "-" } else { "" };
            let magnitude = n.abs();
            match magnitude {
                Number::Rational(m) => format!("{sign}\\frac{{{}}}{{{}}}", m.numer(), m.denom()),
                other => other.to_string(),
            }
        }
        other => other.to_string(),
    }
}

const GREEK: [&str; 16] = [
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "lambda", "mu", "nu",
    "xi", "rho", "sigma", "tau", "omega",
];

fn latex_symbol(name: &str) -> String {
    if GREEK.contains(&name) {
        return format!("\\{name}");
    }
    match name.split_once('_') {
        Some((head, tail)) if !head.is_empty() && !tail.is_empty() => {
            format!("{}_{{{tail}}}", latex_symbol(head))
        }
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn x() -> Expr {
        Expr::symbol("x")
    }

    fn poly() -> Expr {
        let square = x().pow(&Expr::int(2)).unwrap();
        let double = Expr::int(2).mul(&x()).unwrap();
        Expr::sum(vec![Expr::one(), double, square])
    }

    #[test]
    fn test_polynomial_text() {
        assert_eq!(poly().to_string(), "x**2 + 2*x + 1");
    }

    #[test]
    fn test_subtraction_text() {
        let e = x().sub(&Expr::int(3));
        assert_eq!(e.to_string(), "x - 3");
    }

    #[test]
    fn test_fraction_text() {
        let cube = x().pow(&Expr::int(3)).unwrap();
        let e = cube.div(&Expr::int(3)).unwrap();
        assert_eq!(e.to_string(), "x**3/3");
        let e = Expr::apply(Func::Sin, x()).unwrap().div(&x()).unwrap();
        assert_eq!(e.to_string(), "sin(x)/x");
        assert_eq!(Expr::rational(1, 3).unwrap().to_string(), "1/3");
    }

    #[test]
    fn test_sqrt_text() {
        let e = Expr::sqrt(Expr::int(2)).unwrap();
        assert_eq!(e.to_string(), "sqrt(2)");
    }

    #[test]
    fn test_latex() {
        assert_eq!(poly().to_latex(), "x^{2} + 2 x + 1");
        assert_eq!(Expr::rational(1, 3).unwrap().to_latex(), "\\frac{1}{3}");
        let e = Expr::apply(Func::Sin, x()).unwrap();
        assert_eq!(e.to_latex(), "\\sin{\\left(x \\right)}");
        assert_eq!(Expr::sqrt(x()).unwrap().to_latex(), "\\sqrt{x}");
        assert_eq!(Expr::symbol("theta").to_latex(), "\\theta");
    }
}
