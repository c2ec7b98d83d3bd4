use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::cmp::Ordering;
use vs_math::{Number, NumericMode};

fn parse_decimal(text: &str) -> Number {
    match text.strip_prefix('-') {
        Some(rest) => Number::parse_literal(rest, NumericMode::Exact).unwrap().neg(),
        None => Number::parse_literal(text, NumericMode::Exact).unwrap(),
    }
}

#[test]
fn numbers_survive_json() {
    for n in [
        Number::ratio(-7, 3).unwrap(),
        Number::Float(0.25),
        Number::precise(&Number::ratio(1, 3).unwrap().to_rational().unwrap(), 20),
    ] {
        let json = serde_json::to_string(&n).unwrap();
        let back: Number = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }
}

proptest! {
    #[test]
    fn exact_add_then_sub_is_identity(
        a in -10_000i64..10_000,
        b in 1i64..10_000,
        c in -10_000i64..10_000,
        d in 1i64..10_000,
    ) {
        let x = Number::ratio(a, b).unwrap();
        let y = Number::ratio(c, d).unwrap();
        let back = x.add(&y).sub(&y);
        prop_assert!(back.is_exact());
        prop_assert_eq!(back, x);
    }

    #[test]
    fn decimal_rendering_is_within_half_a_unit(
        a in -1_000_000i64..1_000_000,
        b in 1i64..1_000,
        places in 0u32..12,
    ) {
        let x = Number::ratio(a, b).unwrap();
        let rendered = parse_decimal(&x.to_decimal_string(places));
        let error = rendered.sub(&x).abs();
        let half_unit = Number::ratio(1, 2 * 10i64.pow(places)).unwrap();
        prop_assert_ne!(error.cmp_value(&half_unit), Some(Ordering::Greater));
    }
}
