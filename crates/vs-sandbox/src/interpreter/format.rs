//! String formatting: format specs, `str.format` and `%`

use super::builtins::{power_of_ten, round_half_even, truncate};
use crate::error::{RunResult, RuntimeError};
use crate::value::Value;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use vs_math::Number;

/// Parsed `[[fill]align][sign][#][0][width][,][.precision][type]`
#[derive(Debug, Clone, PartialEq)]
struct Spec {
    fill: char,
    align: Option<char>,
    sign: char,
    alternate: bool,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

impl Spec {
    /// Parse `text`, rejecting widths and precisions above `max_width`
    /// before anything is allocated for them
    fn parse(text: &str, max_width: usize) -> RunResult<Self> {
        let chars: Vec<char> = text.chars().collect();
        let invalid = || RuntimeError::value_error(format!("invalid format specifier '{text}'"));
        let mut spec = Self {
            fill: ' ',
            align: None,
            sign: '-',
            alternate: false,
            width: 0,
            grouping: false,
            precision: None,
            kind: None,
        };
        let mut i = 0;
        let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
        if chars.len() >= 2 && is_align(chars[1]) {
            spec.fill = chars[0];
            spec.align = Some(chars[1]);
            i = 2;
        } else if chars.first().copied().is_some_and(is_align) {
            spec.align = Some(chars[0]);
            i = 1;
        }
        if let Some(&c @ ('+' | '-' | ' ')) = chars.get(i) {
            spec.sign = c;
            i += 1;
        }
        if chars.get(i) == Some(&'#') {
            spec.alternate = true;
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            if spec.align.is_none() {
                spec.fill = '0';
                spec.align = Some('=');
            }
            i += 1;
        }
        let digits = |i: &mut usize, what: &str| -> RunResult<Option<usize>> {
            let start = *i;
            while chars.get(*i).is_some_and(char::is_ascii_digit) {
                *i += 1;
            }
            if start == *i {
                return Ok(None);
            }
            let text: String = chars[start..*i].iter().collect();
            match text.parse::<usize>() {
                Ok(n) if n <= max_width => Ok(Some(n)),
                _ => Err(RuntimeError::limit(format!(
                    "format {what} {text} exceeds {max_width}"
                ))),
            }
        };
        spec.width = digits(&mut i, "width")?.unwrap_or(0);
        if matches!(chars.get(i), Some(',' | '_')) {
            spec.grouping = true;
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            spec.precision = Some(digits(&mut i, "precision")?.ok_or_else(invalid)?);
        }
        match &chars[i.min(chars.len())..] {
            [] => {}
            [kind] if "bcdeEfFgGnosxX%".contains(*kind) => spec.kind = Some(*kind),
            _ => return Err(invalid()),
        }
        Ok(spec)
    }
}

/// `format(value, spec)`; `max_width` bounds the spec's width and precision
pub(crate) fn format_value(value: &Value, spec: &str, max_width: usize) -> RunResult<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    let spec = Spec::parse(spec, max_width)?;
    let numeric = !matches!(value, Value::Str(_));
    let body = match (spec.kind, numeric) {
        (Some('s') | None, false) => {
            let text = value.to_str();
            match spec.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            }
        }
        (None, true) if spec.precision.is_none() => value.to_str(),
        (Some('s'), true) => value.to_str(),
        (_, false) => {
            return Err(RuntimeError::value_error(
                "unknown format code for object of type 'str'",
            ));
        }
        (kind, true) => {
            let number = value.as_number().ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "unsupported format string passed to {}.__format__",
                    value.type_name()
                ))
            })?;
            return Ok(pad(&spec, &format_number(&number, &spec, kind)?, true));
        }
    };
    Ok(pad(&spec, &body, false))
}

fn format_number(number: &Number, spec: &Spec, kind: Option<char>) -> RunResult<String> {
    let Some(r) = number.to_rational() else {
        let f = number.to_f64();
        let text = if f.is_nan() { "nan" } else { "inf" };
        let sign = if f.is_sign_negative() && !f.is_nan() { "-" } else { sign_prefix(spec.sign) };
        return Ok(format!("{sign}{text}"));
    };
    let negative = r.is_negative();
    let magnitude = r.abs();
    let digits = match kind {
        Some('d' | 'n') if number.is_integer() => group(&magnitude.to_integer().to_string(), spec.grouping),
        Some('d') => {
            return Err(RuntimeError::value_error(
                "unknown format code 'd' for a non-integer value",
            ));
        }
        Some('f' | 'F') => fixed_grouped(&magnitude, spec.precision.unwrap_or(6), spec.grouping),
        Some('%') => {
            let percent = magnitude * BigRational::from_integer(BigInt::from(100));
            format!("{}%", fixed_grouped(&percent, spec.precision.unwrap_or(6), spec.grouping))
        }
        Some('e' | 'E') => {
            let text = scientific(&magnitude, spec.precision.unwrap_or(6));
            if kind == Some('E') { text.to_uppercase() } else { text }
        }
        Some('g' | 'G') | None => {
            let text = general(&magnitude, spec.precision.unwrap_or(6), spec.alternate, spec.grouping);
            if kind == Some('G') { text.to_uppercase() } else { text }
        }
        Some(other) => {
            return Err(RuntimeError::value_error(format!(
                "unknown format code '{other}' for a number"
            )));
        }
    };
    let sign = if negative { "-" } else { sign_prefix(spec.sign) };
    Ok(format!("{sign}{digits}"))
}

fn sign_prefix(sign: char) -> &'static str {
    match sign {
        '+' => "+",
        ' ' => " ",
        _ => "",
    }
}

/// Fixed-point rendering of a non-negative rational, ties to even
fn fixed(value: &BigRational, places: usize) -> String {
    let places_i = i64::try_from(places).unwrap_or(i64::MAX);
    let scaled = round_half_even(&(value * power_of_ten(places_i))).to_string();
    if places == 0 {
        return scaled;
    }
    let padded = format!("{scaled:0>width$}", width = places + 1);
    let (int, frac) = padded.split_at(padded.len() - places);
    format!("{int}.{frac}")
}

fn fixed_grouped(value: &BigRational, places: usize, grouping: bool) -> String {
    let text = fixed(value, places);
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{frac}", group(int, grouping)),
        None => group(&text, grouping),
    }
}

fn group(int: &str, grouping: bool) -> String {
    if !grouping || int.len() <= 3 {
        return int.to_string();
    }
    let mut out = String::with_capacity(int.len() + int.len() / 3);
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Decimal exponent and `places + 1` rounded significant digits
fn significant(value: &BigRational, places: usize) -> (i64, String) {
    if value.is_zero() {
        return (0, "0".repeat(places + 1));
    }
    let estimate = Number::Rational(value.clone()).to_f64().log10().floor();
    #[allow(clippy::cast_possible_truncation)]
    let mut exp = if estimate.is_finite() { estimate as i64 } else { 0 };
    let ten = BigRational::from_integer(BigInt::from(10));
    let one = BigRational::from_integer(BigInt::from(1));
    let mut mantissa = value * power_of_ten(-exp);
    while mantissa >= ten {
        mantissa /= &ten;
        exp += 1;
    }
    while mantissa < one {
        mantissa *= &ten;
        exp -= 1;
    }
    let places_i = i64::try_from(places).unwrap_or(i64::MAX);
    let mut digits = round_half_even(&(mantissa * power_of_ten(places_i))).to_string();
    if digits.len() > places + 1 {
        digits.truncate(places + 1);
        exp += 1;
    }
    (exp, digits)
}

fn scientific(value: &BigRational, places: usize) -> String {
    let (exp, digits) = significant(value, places);
    let (head, tail) = digits.split_at(1);
    let mantissa = if tail.is_empty() {
        head.to_string()
    } else {
        format!("{head}.{tail}")
    };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exp.abs())
}

fn general(value: &BigRational, precision: usize, alternate: bool, grouping: bool) -> String {
    let precision = precision.max(1);
    let (exp, _) = significant(value, precision - 1);
    let precision_i = i64::try_from(precision).unwrap_or(i64::MAX);
    let text = if (-4..precision_i).contains(&exp) {
        let places = usize::try_from(precision_i - 1 - exp).unwrap_or(0);
        fixed_grouped(value, places, grouping)
    } else {
        scientific(value, precision - 1)
    };
    if alternate {
        return text;
    }
    strip_zeros(&text)
}

fn strip_zeros(text: &str) -> String {
    let (mantissa, exponent) = match text.find('e') {
        Some(at) => text.split_at(at),
        None => (text, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{mantissa}{exponent}")
}

fn pad(spec: &Spec, body: &str, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body.to_string();
    }
    let fill = spec.fill.to_string().repeat(spec.width - len);
    let align = spec.align.unwrap_or(if numeric { '>' } else { '<' });
    match align {
        '<' => format!("{body}{fill}"),
        '^' => {
            let left = (spec.width - len) / 2;
            let right = spec.width - len - left;
            let fill_char = spec.fill.to_string();
            format!("{}{body}{}", fill_char.repeat(left), fill_char.repeat(right))
        }
        '=' if numeric => {
            let split = body
                .char_indices()
                .find(|(_, c)| !matches!(c, '+' | '-' | ' '))
                .map_or(0, |(i, _)| i);
            let (sign, digits) = body.split_at(split);
            format!("{sign}{fill}{digits}")
        }
        _ => format!("{fill}{body}"),
    }
}

/// `template.format(*args, **kwargs)`
pub(crate) fn str_format(
    template: &str,
    positional: &[Value],
    keywords: &[(String, Value)],
    max_width: usize,
) -> RunResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return Err(RuntimeError::value_error("unmatched '{' in format string")),
                    }
                }
                let (head, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let (name, conversion) = match head.split_once('!') {
                    Some((name, conv)) => (name, Some(conv)),
                    None => (head, None),
                };
                let value = if name.is_empty() {
                    auto += 1;
                    positional.get(auto - 1)
                } else if let Ok(index) = name.parse::<usize>() {
                    positional.get(index)
                } else {
                    keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v)
                }
                .ok_or_else(|| RuntimeError::Index(format!("replacement field '{{{name}}}' has no value")))?;
                let rendered = match conversion {
                    Some("r") => Value::from(value.repr()),
                    Some("s") => Value::from(value.to_str()),
                    Some(other) => {
                        return Err(RuntimeError::value_error(format!("unknown conversion specifier {other}")));
                    }
                    None => value.clone(),
                };
                out.push_str(&format_value(&rendered, spec, max_width)?);
            }
            '}' => return Err(RuntimeError::value_error("single '}' encountered in format string")),
            other => out.push(other),
        }
    }
    Ok(out)
}

/// `template % args`
pub(crate) fn percent_format(template: &str, args: &[Value], max_width: usize) -> RunResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next = args.iter();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut flags = String::new();
        while let Some(&f @ ('-' | '+' | ' ' | '0' | '#')) = chars.peek() {
            flags.push(f);
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|c| c.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = String::new();
            while let Some(&d) = chars.peek().filter(|c| c.is_ascii_digit()) {
                p.push(d);
                chars.next();
            }
            precision = Some(p);
        }
        let Some(kind) = chars.next() else {
            return Err(RuntimeError::value_error("incomplete format"));
        };
        if kind == '%' {
            out.push('%');
            continue;
        }
        let value = next
            .next()
            .ok_or_else(|| RuntimeError::type_error("not enough arguments for format string"))?;
        let mut spec = String::new();
        if flags.contains('-') {
            spec.push('<');
        }
        if flags.contains('+') {
            spec.push('+');
        } else if flags.contains(' ') {
            spec.push(' ');
        }
        if flags.contains('0') && !flags.contains('-') {
            spec.push('0');
        }
        spec.push_str(&width);
        if let Some(p) = &precision {
            spec.push('.');
            spec.push_str(if p.is_empty() { "0" } else { p });
        }
        let rendered = match kind {
            's' => format_value(&Value::from(value.to_str()), &spec, max_width)?,
            'r' => format_value(&Value::from(value.repr()), &spec, max_width)?,
            'd' | 'i' | 'u' => {
                let n = value
                    .as_number()
                    .ok_or_else(|| RuntimeError::type_error("%d format: a real number is required"))?;
                spec.push('d');
                format_value(&Value::from(truncate(&n)?), &spec, max_width)?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                spec.push(kind);
                format_value(value, &spec, max_width)?
            }
            other => {
                return Err(RuntimeError::value_error(format!(
                    "unsupported format character '{other}'"
                )));
            }
        };
        out.push_str(&rendered);
    }
    if next.next().is_some() {
        return Err(RuntimeError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vs_math::Expr;

    const WIDTH: usize = 100_000;

    fn float(x: f64) -> Value {
        Value::from(Number::Float(x))
    }

    #[test]
    fn fixed_and_percent() {
        assert_eq!(format_value(&float(3.14159), ".2f", WIDTH).unwrap(), "3.14");
        assert_eq!(format_value(&float(2.5), ".0f", WIDTH).unwrap(), "2");
        assert_eq!(format_value(&float(0.125), ".1%", WIDTH).unwrap(), "12.5%");
        assert_eq!(format_value(&float(-1.5), "8.3f", WIDTH).unwrap(), "  -1.500");
        assert_eq!(format_value(&Value::Expr(Expr::rational(1, 3).unwrap()), ".4f", WIDTH).unwrap(), "0.3333");
    }

    #[test]
    fn general_and_scientific() {
        assert_eq!(format_value(&float(0.000_123_4), ".3g", WIDTH).unwrap(), "0.000123");
        assert_eq!(format_value(&float(1_234_567.0), ".3g", WIDTH).unwrap(), "1.23e+06");
        assert_eq!(format_value(&float(1.0), "g", WIDTH).unwrap(), "1");
        assert_eq!(format_value(&float(12345.678), ".2e", WIDTH).unwrap(), "1.23e+04");
        assert_eq!(format_value(&float(9.999), ".2e", WIDTH).unwrap(), "1.00e+01");
    }

    #[test]
    fn integers_and_alignment() {
        assert_eq!(format_value(&Value::int(1_234_567), ",d", WIDTH).unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::int(42), "05d", WIDTH).unwrap(), "00042");
        assert_eq!(format_value(&Value::int(-42), "06d", WIDTH).unwrap(), "-00042");
        assert_eq!(format_value(&Value::from("ab"), "^6", WIDTH).unwrap(), "  ab  ");
        assert_eq!(format_value(&Value::from("ab"), "*>4", WIDTH).unwrap(), "**ab");
    }

    #[test]
    fn format_method_and_percent() {
        let args = [Value::int(1), float(0.5)];
        let kwargs = [("name".to_string(), Value::from("x"))];
        assert_eq!(
            str_format("{} + {:.2f} = {name}{{!}}", &args, &kwargs, WIDTH).unwrap(),
            "1 + 0.50 = x{!}"
        );
        assert_eq!(percent_format("%d of %.1f%%", &args, WIDTH).unwrap(), "1 of 0.5%");
        assert!(percent_format("%d %d", &args[..1], WIDTH).is_err());
    }

    #[test]
    fn oversized_width_and_precision_are_rejected() {
        let err = format_value(&Value::int(1), ">1000000000000", WIDTH).unwrap_err();
        assert!(matches!(err, RuntimeError::Limit(_)), "{err}");
        let err = format_value(&float(1.0), ".200000f", WIDTH).unwrap_err();
        assert!(matches!(err, RuntimeError::Limit(_)), "{err}");
        // wider than usize
        let err = format_value(&Value::int(1), "99999999999999999999999", WIDTH).unwrap_err();
        assert!(matches!(err, RuntimeError::Limit(_)), "{err}");
        assert!(str_format("{:>200000}", &[Value::int(1)], &[], WIDTH).is_err());
        assert!(percent_format("%200000d", &[Value::int(1)], WIDTH).is_err());
        assert_eq!(format_value(&Value::int(7), ">3", WIDTH).unwrap(), "  7");
    }
}
