//! Attributes and methods of runtime values

use super::builtins::simplify;
use super::ops::{dict_get, dict_insert, wrap_index};
use super::{format, Args, Interpreter};
use crate::error::{RunResult, RuntimeError};
use crate::value::{values_equal, BoundMethod, Native, Value};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;
use vs_math::{Expr, Matrix, Number};

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "index", "count", "copy", "reverse", "sort", "clear",
];
const DICT_METHODS: &[&str] = &["get", "keys", "values", "items", "copy", "update", "pop", "setdefault"];
const STR_METHODS: &[&str] = &[
    "join", "upper", "lower", "strip", "lstrip", "rstrip", "split", "replace", "startswith",
    "endswith", "find", "count", "format", "title", "capitalize", "isdigit",
];
const TUPLE_METHODS: &[&str] = &["index", "count"];
const EXPR_METHODS: &[&str] = &[
    "subs", "evalf", "n", "simplify", "expand", "factor", "diff", "integrate", "limit", "doit",
    "as_numer_denom",
];
const MATRIX_METHODS: &[&str] = &[
    "det", "inv", "transpose", "subs", "evalf", "n", "applyfunc", "tolist", "simplify", "expand",
    "factor", "diff", "dot", "copy",
];
const ARRAY_METHODS: &[&str] = &["tolist", "sum", "mean", "max", "min", "copy"];
const EQUATION_METHODS: &[&str] = &["subs", "simplify", "evalf", "n", "doit"];

fn methods_of(value: &Value) -> &'static [&'static str] {
    match value {
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Str(_) => STR_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        Value::Expr(_) => EXPR_METHODS,
        Value::Matrix(_) => MATRIX_METHODS,
        Value::Array(_) => ARRAY_METHODS,
        Value::Equation { .. } => EQUATION_METHODS,
        _ => &[],
    }
}

fn count(n: usize) -> Value {
    Value::int(i64::try_from(n).unwrap_or(i64::MAX))
}

impl Interpreter {
    /// `object.name`
    pub(super) fn attribute(&mut self, object: Value, name: &str) -> RunResult<Value> {
        if let Value::Module(path) = &object {
            return self.module_attr(path, name);
        }
        if self.policy.denied_kind(name).is_some() {
            return Err(RuntimeError::Attribute(format!("attribute '{name}' is not permitted")));
        }
        let value = match (&object, name) {
            (Value::Matrix(m), "T") => Value::from(m.transpose()),
            (Value::Matrix(m), "shape") => Value::tuple(vec![count(m.rows()), count(m.cols())]),
            (Value::Matrix(m), "rows") => count(m.rows()),
            (Value::Matrix(m), "cols") => count(m.cols()),
            (Value::Array(_), "T") => object.clone(),
            (Value::Array(items), "shape") => Value::tuple(vec![count(items.len())]),
            (Value::Array(items), "size") => count(items.len()),
            (Value::Equation { lhs, .. }, "lhs") => Value::Expr(lhs.clone()),
            (Value::Equation { rhs, .. }, "rhs") => Value::Expr(rhs.clone()),
            (Value::Expr(e), "free_symbols") => Value::list(
                e.free_symbols()
                    .into_iter()
                    .map(|s| Value::Expr(Expr::symbol(s)))
                    .collect(),
            ),
            (Value::Expr(e), "is_number") => Value::Bool(e.is_closed()),
            (Value::Expr(e), "is_integer") => {
                Value::Bool(e.as_number().is_some_and(Number::is_integer))
            }
            (Value::Expr(Expr::Num(n)), "p" | "numerator" | "q" | "denominator") => {
                let ratio = n.to_rational().ok_or_else(|| {
                    RuntimeError::value_error("cannot take the numerator of a non-finite number")
                })?;
                let part: BigInt = if matches!(name, "p" | "numerator") {
                    ratio.numer().clone()
                } else {
                    ratio.denom().clone()
                };
                Value::from(Number::from_bigint(part))
            }
            (Value::Expr(Expr::Num(_)), "real") => object.clone(),
            (Value::Expr(Expr::Num(_)), "imag") => Value::int(0),
            _ if methods_of(&object).contains(&name) => Value::Method(Rc::new(BoundMethod {
                receiver: object.clone(),
                name: name.to_string(),
            })),
            _ => {
                return Err(RuntimeError::Attribute(format!(
                    "'{}' object has no attribute '{name}'",
                    object.type_name()
                )));
            }
        };
        Ok(value)
    }

    /// `receiver.name(args)`
    pub(super) fn call_method(&mut self, receiver: &Value, name: &str, args: Args) -> RunResult<Value> {
        match receiver {
            Value::List(items) => self.list_method(items, name, args),
            Value::Dict(pairs) => self.dict_method(pairs, name, args),
            Value::Str(text) => self.str_method(text, name, args),
            Value::Tuple(items) => sequence_method(items, name, args),
            Value::Expr(e) => self.expr_method(e, receiver, name, args),
            Value::Matrix(m) => self.matrix_method(m, receiver, name, args),
            Value::Array(items) => self.array_method(items, receiver, name, args),
            Value::Equation { lhs, rhs } => match name {
                "subs" => {
                    let subs = self.substitutions(args)?;
                    Ok(Value::Equation {
                        lhs: self.substitute(lhs, &subs)?,
                        rhs: self.substitute(rhs, &subs)?,
                    })
                }
                "doit" => {
                    args.finish()?;
                    Ok(receiver.clone())
                }
                _ => self.delegate(receiver, name, args),
            },
            other => Err(no_method(other, name)),
        }
    }

    /// Method that behaves like the module-level function of the same name
    fn delegate(&mut self, receiver: &Value, name: &str, args: Args) -> RunResult<Value> {
        let native = match name {
            "evalf" | "n" => Native::Evalf,
            "simplify" => Native::Simplify,
            "expand" => Native::Expand,
            "factor" => Native::Factor,
            "diff" => Native::Diff,
            "integrate" => Native::Integrate,
            "limit" => Native::Limit,
            "sum" => Native::ArraySum,
            "mean" => Native::Mean,
            "max" => Native::Max,
            "min" => Native::Min,
            _ => return Err(no_method(receiver, name)),
        };
        self.call_native(native, args.prepend(name, receiver.clone()))
    }

    fn list_method(
        &mut self,
        items: &Rc<RefCell<Vec<Value>>>,
        name: &str,
        mut args: Args,
    ) -> RunResult<Value> {
        match name {
            "append" => {
                let item = args.required(0, "object")?;
                args.finish()?;
                self.meter.check_len(items.borrow().len() + 1)?;
                items.borrow_mut().push(item);
                Ok(Value::None)
            }
            "extend" => {
                let source = args.required(0, "iterable")?;
                args.finish()?;
                let extra = self.iter_values(&source)?;
                self.meter.check_len(items.borrow().len() + extra.len())?;
                items.borrow_mut().extend(extra);
                Ok(Value::None)
            }
            "pop" => {
                let index = args.optional(0, "index").unwrap_or_else(|| Value::int(-1));
                args.finish()?;
                let len = items.borrow().len();
                if len == 0 {
                    return Err(RuntimeError::Index("pop from empty list".into()));
                }
                let at = wrap_index(len, &index)?;
                Ok(items.borrow_mut().remove(at))
            }
            "insert" => {
                let index = args.required(0, "index")?.expect_i64("index")?;
                let item = args.required(1, "object")?;
                args.finish()?;
                let len = items.borrow().len();
                self.meter.check_len(len + 1)?;
                let len_i = i64::try_from(len).unwrap_or(i64::MAX);
                let at = (if index < 0 { index + len_i } else { index }).clamp(0, len_i);
                items
                    .borrow_mut()
                    .insert(usize::try_from(at).unwrap_or(len), item);
                Ok(Value::None)
            }
            "copy" => {
                args.finish()?;
                Ok(Value::list(items.borrow().clone()))
            }
            "reverse" => {
                args.finish()?;
                items.borrow_mut().reverse();
                Ok(Value::None)
            }
            "sort" => {
                let key = args.keyword("key").filter(|k| !k.is_none());
                let reverse = match args.keyword("reverse") {
                    Some(flag) => flag.truthy()?,
                    None => false,
                };
                args.finish()?;
                let current = items.borrow().clone();
                let sorted = self.sorted(current, key, reverse)?;
                *items.borrow_mut() = sorted;
                Ok(Value::None)
            }
            "clear" => {
                args.finish()?;
                items.borrow_mut().clear();
                Ok(Value::None)
            }
            _ => {
                let snapshot = items.borrow().clone();
                sequence_method(&snapshot, name, args)
            }
        }
    }

    fn dict_method(
        &mut self,
        pairs: &Rc<RefCell<Vec<(Value, Value)>>>,
        name: &str,
        mut args: Args,
    ) -> RunResult<Value> {
        match name {
            "get" => {
                let key = args.required(0, "key")?;
                let default = args.optional(1, "default").unwrap_or(Value::None);
                args.finish()?;
                Ok(dict_get(&pairs.borrow(), &key).unwrap_or(default))
            }
            "keys" | "values" | "items" => {
                args.finish()?;
                let out = pairs
                    .borrow()
                    .iter()
                    .map(|(k, v)| match name {
                        "keys" => k.clone(),
                        "values" => v.clone(),
                        _ => Value::tuple(vec![k.clone(), v.clone()]),
                    })
                    .collect();
                Ok(Value::list(out))
            }
            "copy" => {
                args.finish()?;
                Ok(Value::dict(pairs.borrow().clone()))
            }
            "update" => {
                let mut incoming = match args.optional(0, "other") {
                    None => Vec::new(),
                    Some(Value::Dict(other)) => other.borrow().clone(),
                    Some(other) => self
                        .iter_values(&other)?
                        .iter()
                        .map(|pair| self.pair_of(pair))
                        .collect::<RunResult<Vec<_>>>()?,
                };
                while let Some((key, value)) = args.take_keyword() {
                    incoming.push((Value::from(key), value));
                }
                args.finish()?;
                let mut target = pairs.borrow_mut();
                for (key, value) in incoming {
                    dict_insert(&mut target, key, value);
                }
                self.meter.check_len(target.len())?;
                Ok(Value::None)
            }
            "pop" => {
                let key = args.required(0, "key")?;
                let default = args.optional(1, "default");
                args.finish()?;
                let position = pairs.borrow().iter().position(|(k, _)| values_equal(k, &key));
                match (position, default) {
                    (Some(at), _) => Ok(pairs.borrow_mut().remove(at).1),
                    (None, Some(default)) => Ok(default),
                    (None, None) => Err(RuntimeError::Key(key.repr())),
                }
            }
            "setdefault" => {
                let key = args.required(0, "key")?;
                let default = args.optional(1, "default").unwrap_or(Value::None);
                args.finish()?;
                if let Some(existing) = dict_get(&pairs.borrow(), &key) {
                    return Ok(existing);
                }
                self.meter.check_len(pairs.borrow().len() + 1)?;
                pairs.borrow_mut().push((key, default.clone()));
                Ok(default)
            }
            _ => Err(no_method(&Value::Dict(Rc::clone(pairs)), name)),
        }
    }

    fn str_method(&mut self, text: &Rc<str>, name: &str, mut args: Args) -> RunResult<Value> {
        let text: &str = text;
        let out = match name {
            "format" => {
                let positional = args.rest(0);
                let mut keywords = Vec::new();
                while let Some(pair) = args.take_keyword() {
                    keywords.push(pair);
                }
                let max_width = self.meter.limits().max_collection_len;
                let formatted = format::str_format(text, &positional, &keywords, max_width)?;
                self.meter.check_len(formatted.len())?;
                return Ok(Value::from(formatted));
            }
            "join" => {
                let items = self.iter_values(&args.required(0, "iterable")?)?;
                let parts = items
                    .iter()
                    .map(|v| v.expect_str("sequence item").map(|s| s.to_string()))
                    .collect::<RunResult<Vec<_>>>()?;
                let joined = parts.join(text);
                self.meter.check_len(joined.len())?;
                Value::from(joined)
            }
            "upper" => Value::from(text.to_uppercase()),
            "lower" => Value::from(text.to_lowercase()),
            "title" => Value::from(title_case(text)),
            "capitalize" => {
                let mut chars = text.chars();
                let capitalized: String = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                    None => String::new(),
                };
                Value::from(capitalized)
            }
            "isdigit" => Value::Bool(!text.is_empty() && text.chars().all(|c| c.is_ascii_digit())),
            "strip" | "lstrip" | "rstrip" => {
                let chars = match args.optional(0, "chars") {
                    None | Some(Value::None) => None,
                    Some(other) => Some(other.expect_str("strip chars")?),
                };
                let is_stripped = |c: char| match &chars {
                    Some(set) => set.contains(c),
                    None => c.is_whitespace(),
                };
                Value::from(match name {
                    "strip" => text.trim_matches(is_stripped),
                    "lstrip" => text.trim_start_matches(is_stripped),
                    _ => text.trim_end_matches(is_stripped),
                })
            }
            "split" => {
                let sep = match args.optional(0, "sep") {
                    None | Some(Value::None) => None,
                    Some(other) => Some(other.expect_str("separator")?),
                };
                let maxsplit = match args.optional(1, "maxsplit") {
                    Some(n) => n.expect_i64("maxsplit")?,
                    None => -1,
                };
                let parts = split(text, sep.as_deref(), maxsplit)?;
                self.meter.check_len(parts.len())?;
                Value::list(parts.into_iter().map(Value::from).collect())
            }
            "replace" => {
                let old = args.required(0, "old")?.expect_str("old")?;
                let new = args.required(1, "new")?.expect_str("new")?;
                let replaced = text.replace(&*old, &new);
                self.meter.check_len(replaced.len())?;
                Value::from(replaced)
            }
            "startswith" | "endswith" => {
                let affixes = match args.required(0, "prefix")? {
                    Value::Tuple(items) => items
                        .iter()
                        .map(|v| v.expect_str("prefix"))
                        .collect::<RunResult<Vec<_>>>()?,
                    other => vec![other.expect_str("prefix")?],
                };
                let hit = affixes.iter().any(|a| {
                    if name == "startswith" {
                        text.starts_with(&**a)
                    } else {
                        text.ends_with(&**a)
                    }
                });
                Value::Bool(hit)
            }
            "find" => {
                let needle = args.required(0, "sub")?.expect_str("substring")?;
                match text.find(&*needle) {
                    Some(byte) => count(text[..byte].chars().count()),
                    None => Value::int(-1),
                }
            }
            "count" => {
                let needle = args.required(0, "sub")?.expect_str("substring")?;
                if needle.is_empty() {
                    count(text.chars().count() + 1)
                } else {
                    count(text.matches(&*needle).count())
                }
            }
            _ => return Err(no_method(&Value::from(text), name)),
        };
        args.finish()?;
        Ok(out)
    }

    fn expr_method(&mut self, expr: &Expr, receiver: &Value, name: &str, args: Args) -> RunResult<Value> {
        match name {
            "subs" => {
                let subs = self.substitutions(args)?;
                self.substitute(expr, &subs).map(Value::Expr)
            }
            "doit" => {
                args.finish()?;
                Ok(receiver.clone())
            }
            "as_numer_denom" => {
                args.finish()?;
                let (numer, denom) = expr.as_numer_denom();
                Ok(Value::tuple(vec![Value::Expr(numer), Value::Expr(denom)]))
            }
            "simplify" => {
                args.ignore_rest();
                simplify(expr).map(Value::Expr)
            }
            _ => self.delegate(receiver, name, args),
        }
    }

    fn matrix_method(&mut self, m: &Rc<Matrix>, receiver: &Value, name: &str, mut args: Args) -> RunResult<Value> {
        match name {
            "det" => {
                args.ignore_rest();
                let det = m.det()?;
                self.lift(det).map(Value::Expr)
            }
            "inv" => {
                args.ignore_rest();
                let inverse = m.inverse()?;
                self.lift_value(Value::from(inverse))
            }
            "transpose" => {
                args.finish()?;
                Ok(Value::from(m.transpose()))
            }
            "copy" => {
                args.finish()?;
                Ok(receiver.clone())
            }
            "subs" => {
                let subs = self.substitutions(args)?;
                let mut entries = Vec::with_capacity(m.entries().len());
                for entry in m.entries() {
                    entries.push(self.substitute(entry, &subs)?);
                }
                Ok(Value::from(Matrix::new(m.rows(), m.cols(), entries)?))
            }
            "applyfunc" => {
                let func = args.required(0, "f")?;
                args.finish()?;
                let mut entries = Vec::with_capacity(m.entries().len());
                for entry in m.entries() {
                    let mapped = self.call(func.clone(), vec![Value::Expr(entry.clone())], Vec::new())?;
                    entries.push(mapped.expect_expr("applyfunc result")?);
                }
                Ok(Value::from(Matrix::new(m.rows(), m.cols(), entries)?))
            }
            "tolist" => {
                args.finish()?;
                Ok(Value::list(
                    m.to_rows()
                        .into_iter()
                        .map(|row| Value::list(row.into_iter().map(Value::Expr).collect()))
                        .collect(),
                ))
            }
            "dot" => {
                let other = match args.required(0, "b")? {
                    Value::Matrix(other) => other,
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "dot expects a Matrix, not {}",
                            other.type_name()
                        )));
                    }
                };
                args.finish()?;
                let is_vector = |x: &Matrix| x.rows() == 1 || x.cols() == 1;
                if is_vector(m) && is_vector(&other) {
                    if m.entries().len() != other.entries().len() {
                        return Err(RuntimeError::Math(vs_math::MathError::Shape(format!(
                            "dot of vectors of lengths {} and {}",
                            m.entries().len(),
                            other.entries().len()
                        ))));
                    }
                    let mut total = Expr::zero();
                    for (a, b) in m.entries().iter().zip(other.entries()) {
                        total = total.add(&a.mul(b)?);
                    }
                    return self.lift(total).map(Value::Expr);
                }
                Ok(Value::from(m.matmul(&other)?))
            }
            _ => self.delegate(receiver, name, args),
        }
    }

    fn array_method(&mut self, items: &Rc<Vec<Expr>>, receiver: &Value, name: &str, args: Args) -> RunResult<Value> {
        match name {
            "tolist" => {
                args.finish()?;
                Ok(Value::list(items.iter().cloned().map(Value::Expr).collect()))
            }
            "copy" => {
                args.finish()?;
                Ok(Value::Array(Rc::new(items.to_vec())))
            }
            _ => self.delegate(receiver, name, args),
        }
    }

    /// Pairs accepted by `subs`: `(old, new)`, a dict, or a list of pairs
    fn substitutions(&self, mut args: Args) -> RunResult<Vec<(String, Expr)>> {
        let first = args.required(0, "old")?;
        let second = args.optional(1, "new");
        args.finish()?;
        let pairs = match (second, &first) {
            (Some(new), _) => vec![(first.clone(), new)],
            (None, Value::Dict(pairs)) => pairs.borrow().clone(),
            (None, other) => self
                .iter_values(other)?
                .iter()
                .map(|pair| self.pair_of(pair))
                .collect::<RunResult<Vec<_>>>()?,
        };
        pairs
            .into_iter()
            .map(|(old, new)| {
                Ok((
                    old.expect_symbol("substitution target")?,
                    new.expect_expr("substitution value")?,
                ))
            })
            .collect()
    }

    fn substitute(&self, expr: &Expr, subs: &[(String, Expr)]) -> RunResult<Expr> {
        let mut out = expr.clone();
        for (var, value) in subs {
            out = out.subs(var, value)?;
        }
        self.lift(out)
    }

    fn pair_of(&self, value: &Value) -> RunResult<(Value, Value)> {
        match self.iter_values(value)?.as_slice() {
            [key, value] => Ok((key.clone(), value.clone())),
            other => Err(RuntimeError::value_error(format!(
                "expected a pair, got a sequence of length {}",
                other.len()
            ))),
        }
    }
}

/// `index` and `count`, shared by lists and tuples
fn sequence_method(items: &[Value], name: &str, mut args: Args) -> RunResult<Value> {
    let target = args.required(0, "value")?;
    args.finish()?;
    match name {
        "index" => items
            .iter()
            .position(|v| values_equal(v, &target))
            .map(count)
            .ok_or_else(|| RuntimeError::value_error(format!("{} is not in sequence", target.repr()))),
        "count" => Ok(count(items.iter().filter(|v| values_equal(v, &target)).count())),
        _ => Err(no_method(&Value::tuple(items.to_vec()), name)),
    }
}

fn no_method(receiver: &Value, name: &str) -> RuntimeError {
    RuntimeError::Attribute(format!(
        "'{}' object has no attribute '{name}'",
        receiver.type_name()
    ))
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// `str.split` with Python's whitespace and `maxsplit` rules
fn split(text: &str, sep: Option<&str>, maxsplit: i64) -> RunResult<Vec<String>> {
    let limit = usize::try_from(maxsplit).ok();
    match sep {
        Some("") => Err(RuntimeError::value_error("empty separator")),
        Some(sep) => Ok(match limit {
            Some(n) => text.splitn(n + 1, sep).map(String::from).collect(),
            None => text.split(sep).map(String::from).collect(),
        }),
        None => {
            let mut parts = Vec::new();
            let mut rest = text.trim_start();
            while !rest.is_empty() {
                if limit.is_some_and(|n| parts.len() >= n) {
                    parts.push(rest.to_string());
                    break;
                }
                match rest.find(char::is_whitespace) {
                    Some(end) => {
                        parts.push(rest[..end].to_string());
                        rest = rest[end..].trim_start();
                    }
                    None => {
                        parts.push(rest.to_string());
                        break;
                    }
                }
            }
            Ok(parts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{AbortSignal, ExecutionLimits};
    use crate::outcome::ExecutionOutcome;
    use crate::parser::parse_program;
    use crate::policy::CapabilityPolicy;
    use pretty_assertions::assert_eq;
    use vs_math::NumericMode;

    fn result_text(source: &str) -> String {
        let program = parse_program(source).unwrap();
        let outcome = super::super::execute(
            &program,
            CapabilityPolicy::shared_mathematics(),
            NumericMode::Exact,
            ExecutionLimits::default(),
            AbortSignal::new(),
        );
        match outcome {
            ExecutionOutcome::Success(s) => s.result.to_text(),
            ExecutionOutcome::Failure(f) => panic!("run failed: {}", f.message),
        }
    }

    #[test]
    fn whitespace_split_follows_python() {
        assert_eq!(split("  a b  c ", None, -1).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split("a b  c ", None, 1).unwrap(), vec!["a", "b  c "]);
        assert_eq!(split("a,b,,c", Some(","), -1).unwrap(), vec!["a", "b", "", "c"]);
        assert_eq!(split("a,b,c", Some(","), 1).unwrap(), vec!["a", "b,c"]);
        assert!(split("abc", Some(""), -1).is_err());
    }

    #[test]
    fn titles() {
        assert_eq!(title_case("hello wORLD-x"), "Hello World-X");
    }

    #[test]
    fn list_methods_mutate_in_place() {
        let source = "\
xs = [3, 1, 2]
xs.append(5)
xs.sort(reverse=True)
last = xs.pop()
xs.insert(0, 9)
set_result([xs, last, xs.index(2)])
";
        assert_eq!(result_text(source), "[[9, 5, 3, 2], 1, 3]");
    }

    #[test]
    fn dict_and_str_methods() {
        let source = "\
d = {'a': 1}
d.update(b=2)
words = ' x  y '.split()
set_result([sorted(d.keys()), d.get('c', 0), '-'.join(words), 'v={}'.format(3)])
";
        assert_eq!(result_text(source), "[[a, b], 0, x-y, v=3]");
    }

    #[test]
    fn expression_methods() {
        let source = "\
x = symbols('x')
f = x**2 + 1
set_result([f.subs(x, 2), f.diff(x), (x**2).integrate((x, 0, 3))])
";
        assert_eq!(result_text(source), "[5, 2*x, 9]");
    }

    #[test]
    fn matrix_attributes() {
        let source = "\
M = Matrix([[1, 2], [3, 4]])
set_result([M.det(), M.shape, M.T[0, 1]])
";
        assert_eq!(result_text(source), "[-2, [2, 2], 3]");
    }
}
