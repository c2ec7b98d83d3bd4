//! Operators, comparisons and subscripts

use super::{format, Interpreter};
use crate::ast::{BinOp, CmpOp};
use crate::error::{RunResult, RuntimeError};
use crate::value::{range_items, range_len, values_equal, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;
use vs_math::{eval_number, Expr, Matrix, Number, NumericMode};

impl Interpreter {
    pub(super) fn binary(&mut self, op: BinOp, left: Value, right: Value) -> RunResult<Value> {
        match (op, &left, &right) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                self.meter.check_len(a.len() + b.len())?;
                Ok(Value::from(format!("{a}{b}")))
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                self.meter.check_len(items.len())?;
                Ok(Value::list(items))
            }
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                let items: Vec<Value> = a.iter().chain(b.iter()).cloned().collect();
                self.meter.check_len(items.len())?;
                Ok(Value::tuple(items))
            }
            (BinOp::Mul, Value::Str(_) | Value::List(_) | Value::Tuple(_), count)
                if count.as_i64().is_some() =>
            {
                self.repeat(&left, count.as_i64().unwrap_or(0))
            }
            (BinOp::Mul, count, Value::Str(_) | Value::List(_) | Value::Tuple(_))
                if count.as_i64().is_some() =>
            {
                self.repeat(&right, count.as_i64().unwrap_or(0))
            }
            (BinOp::Mod, Value::Str(template), args) => {
                let args = match args {
                    Value::Tuple(items) => items.to_vec(),
                    single => vec![single.clone()],
                };
                let max_width = self.meter.limits().max_collection_len;
                let formatted = format::percent_format(template, &args, max_width)?;
                self.meter.check_len(formatted.len())?;
                Ok(Value::from(formatted))
            }
            (_, Value::Matrix(_), _) | (_, _, Value::Matrix(_)) => self.matrix_op(op, &left, &right),
            (_, Value::Array(_), _) | (_, _, Value::Array(_)) => self.array_op(op, &left, &right),
            _ => match (left.as_expr(), right.as_expr()) {
                (Some(a), Some(b)) => self.scalar_op(op, &a, &b).map(Value::Expr),
                _ => Err(unsupported_operands(op, &left, &right)),
            },
        }
    }

    fn repeat(&self, seq: &Value, count: i64) -> RunResult<Value> {
        let times = usize::try_from(count.max(0)).unwrap_or(0);
        match seq {
            Value::Str(s) => {
                self.meter.check_len(s.len().saturating_mul(times))?;
                Ok(Value::from(s.repeat(times)))
            }
            Value::List(items) => {
                let items = items.borrow();
                self.meter.check_len(items.len().saturating_mul(times))?;
                Ok(Value::list(items.iter().cloned().cycle().take(items.len() * times).collect()))
            }
            Value::Tuple(items) => {
                self.meter.check_len(items.len().saturating_mul(times))?;
                Ok(Value::tuple(items.iter().cloned().cycle().take(items.len() * times).collect()))
            }
            other => Err(RuntimeError::type_error(format!(
                "can't multiply sequence of type '{}'",
                other.type_name()
            ))),
        }
    }

    /// Arithmetic on numbers and expressions
    pub(super) fn scalar_op(&mut self, op: BinOp, a: &Expr, b: &Expr) -> RunResult<Expr> {
        match op {
            BinOp::Add => Ok(a.add(b)),
            BinOp::Sub => Ok(a.sub(b)),
            BinOp::Mul => {
                self.check_width(op, a, b)?;
                Ok(a.mul(b)?)
            }
            BinOp::Div => {
                self.check_width(op, a, b)?;
                self.lift(a.div(b)?)
            }
            BinOp::Pow => {
                self.check_exponent(a, b)?;
                self.check_width(op, a, b)?;
                self.lift(a.pow(b)?)
            }
            BinOp::FloorDiv | BinOp::Mod => {
                let (Some(x), Some(y)) = (a.as_number(), b.as_number()) else {
                    return Err(RuntimeError::type_error(format!(
                        "unsupported operand for {}: symbolic expression",
                        op.symbol()
                    )));
                };
                let result = if op == BinOp::FloorDiv {
                    x.floor_div(y)?
                } else {
                    x.modulo(y)?
                };
                Ok(Expr::Num(result))
            }
            BinOp::MatMul => Err(RuntimeError::type_error(
                "unsupported operand for @: scalar values",
            )),
        }
    }

    /// Reject exact products and powers whose result would exceed
    /// `max_integer_bits` before computing them
    fn check_width(&self, op: BinOp, a: &Expr, b: &Expr) -> RunResult<()> {
        let (Some(x), Some(y)) = (a.as_number(), b.as_number()) else {
            return Ok(());
        };
        let estimate = match op {
            BinOp::Pow => {
                let base = exact_bits(x);
                if base <= 1 || !y.is_exact() || !y.is_integer() {
                    return Ok(());
                }
                let exp = y.to_i64().map_or(u64::MAX, i64::unsigned_abs);
                base.saturating_mul(exp)
            }
            _ => exact_bits(x).saturating_add(exact_bits(y)),
        };
        let limit = self.meter.limits().max_integer_bits;
        if estimate > limit {
            return Err(RuntimeError::limit(format!(
                "exact result of about {estimate} bits exceeds {limit}"
            )));
        }
        Ok(())
    }

    fn check_exponent(&self, base: &Expr, exp: &Expr) -> RunResult<()> {
        let (Some(base), Some(exp)) = (base.as_number(), exp.as_number()) else {
            return Ok(());
        };
        if !base.is_exact() || !exp.is_exact() || base.is_zero() || base.is_one() {
            return Ok(());
        }
        if base.abs().is_one() {
            return Ok(());
        }
        let limit = self.meter.limits().max_exponent;
        let within = exp
            .to_i64()
            .is_some_and(|e| e.unsigned_abs() <= limit)
            || !exp.is_integer();
        if within {
            Ok(())
        } else {
            Err(RuntimeError::limit(format!("exponent {exp} exceeds {limit}")))
        }
    }

    fn matrix_op(&mut self, op: BinOp, left: &Value, right: &Value) -> RunResult<Value> {
        let result = match (op, left, right) {
            (BinOp::Add, Value::Matrix(a), Value::Matrix(b)) => a.add(b)?,
            (BinOp::Sub, Value::Matrix(a), Value::Matrix(b)) => a.sub(b)?,
            (BinOp::Mul | BinOp::MatMul, Value::Matrix(a), Value::Matrix(b)) => {
                self.meter.charge(cost(a.rows() * a.cols() * b.cols()))?;
                a.matmul(b)?
            }
            (BinOp::Mul, Value::Matrix(m), scalar) | (BinOp::Mul, scalar, Value::Matrix(m)) => {
                let factor = scalar.as_expr().ok_or_else(|| unsupported_operands(op, left, right))?;
                m.scale(&factor)?
            }
            (BinOp::Div, Value::Matrix(m), scalar) => {
                let divisor = scalar.as_expr().ok_or_else(|| unsupported_operands(op, left, right))?;
                let factor = self.lift(Expr::one().div(&divisor)?)?;
                m.scale(&factor)?
            }
            (BinOp::Pow, Value::Matrix(m), exp) => {
                let n = exp
                    .as_i64()
                    .ok_or_else(|| RuntimeError::type_error("matrix power must be an integer"))?;
                self.matrix_power(m, n)?
            }
            _ => return Err(unsupported_operands(op, left, right)),
        };
        Ok(Value::from(result))
    }

    fn matrix_power(&mut self, m: &Matrix, n: i64) -> RunResult<Matrix> {
        if !m.is_square() {
            return Err(RuntimeError::value_error("matrix power needs a square matrix"));
        }
        let limit = self.meter.limits().max_exponent;
        if n.unsigned_abs() > limit {
            return Err(RuntimeError::limit(format!("exponent {n} exceeds {limit}")));
        }
        let base = if n < 0 { m.inverse()? } else { m.clone() };
        let mut result = Matrix::identity(m.rows())?;
        for _ in 0..n.unsigned_abs() {
            self.meter.charge(cost(m.rows() * m.rows() * m.rows()))?;
            result = result.matmul(&base)?;
        }
        Ok(result)
    }

    fn array_op(&mut self, op: BinOp, left: &Value, right: &Value) -> RunResult<Value> {
        let expand = |v: &Value| -> Option<Vec<Expr>> {
            match v {
                Value::Array(items) => Some(items.to_vec()),
                Value::List(items) => items.borrow().iter().map(Value::as_expr).collect(),
                Value::Tuple(items) => items.iter().map(Value::as_expr).collect(),
                _ => None,
            }
        };
        let (a, b) = (expand(left), expand(right));
        let pairs: Vec<(Expr, Expr)> = match (a, b, left.as_expr(), right.as_expr()) {
            (Some(a), Some(b), _, _) => {
                if a.len() != b.len() {
                    return Err(RuntimeError::value_error(format!(
                        "operands could not be broadcast together with shapes ({},) ({},)",
                        a.len(),
                        b.len()
                    )));
                }
                a.into_iter().zip(b).collect()
            }
            (Some(a), None, _, Some(s)) => a.into_iter().map(|x| (x, s.clone())).collect(),
            (None, Some(b), Some(s), _) => b.into_iter().map(|y| (s.clone(), y)).collect(),
            _ => return Err(unsupported_operands(op, left, right)),
        };
        if op == BinOp::MatMul {
            let mut total = Expr::zero();
            for (x, y) in &pairs {
                total = total.add(&x.mul(y)?);
            }
            return Ok(Value::Expr(self.numeric(&total)?));
        }
        self.meter.charge(cost(pairs.len()))?;
        let mut out = Vec::with_capacity(pairs.len());
        for (x, y) in &pairs {
            let value = self.scalar_op(op, x, y)?;
            out.push(self.array_scalar(&value)?);
        }
        Ok(Value::Array(Rc::new(out)))
    }

    pub(super) fn compare(&mut self, op: CmpOp, left: &Value, right: &Value) -> RunResult<bool> {
        Ok(match op {
            CmpOp::Eq => values_equal(left, right),
            CmpOp::NotEq => !values_equal(left, right),
            CmpOp::In => self.contains(right, left)?,
            CmpOp::NotIn => !self.contains(right, left)?,
            CmpOp::Is => identical(left, right),
            CmpOp::IsNot => !identical(left, right),
            CmpOp::Lt => self.order(left, right)? == Some(Ordering::Less),
            CmpOp::LtE => matches!(self.order(left, right)?, Some(Ordering::Less | Ordering::Equal)),
            CmpOp::Gt => self.order(left, right)? == Some(Ordering::Greater),
            CmpOp::GtE => matches!(
                self.order(left, right)?,
                Some(Ordering::Greater | Ordering::Equal)
            ),
        })
    }

    fn contains(&self, container: &Value, item: &Value) -> RunResult<bool> {
        Ok(match container {
            Value::Str(haystack) => match item {
                Value::Str(needle) => haystack.contains(&**needle),
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "'in <string>' requires string as left operand, not {}",
                        other.type_name()
                    )));
                }
            },
            Value::Dict(pairs) => pairs.borrow().iter().any(|(k, _)| values_equal(k, item)),
            Value::Range { start, stop, step } => item.as_i64().is_some_and(|i| {
                let in_span = if *step > 0 {
                    i >= *start && i < *stop
                } else {
                    i <= *start && i > *stop
                };
                in_span && (i - start) % step == 0
            }),
            other => self
                .iter_values(other)?
                .iter()
                .any(|v| values_equal(v, item)),
        })
    }

    /// Python ordering; `None` when the values are unordered (NaN)
    pub(super) fn order(&self, left: &Value, right: &Value) -> RunResult<Option<Ordering>> {
        match (left, right) {
            (Value::Str(a), Value::Str(b)) => return Ok(Some(a.cmp(b))),
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                return self.order_seq(&a, &b);
            }
            (Value::Tuple(a), Value::Tuple(b)) => return self.order_seq(a, b),
            _ => {}
        }
        let (Some(a), Some(b)) = (left.as_expr(), right.as_expr()) else {
            return Err(RuntimeError::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            )));
        };
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return Ok(x.cmp_value(y));
        }
        if !a.is_closed() || !b.is_closed() {
            return Err(RuntimeError::type_error(
                "cannot determine truth value of Relational",
            ));
        }
        let env = BTreeMap::new();
        let x = eval_number(&a, &env, NumericMode::Float)?;
        let y = eval_number(&b, &env, NumericMode::Float)?;
        Ok(x.cmp_value(&y))
    }

    fn order_seq(&self, a: &[Value], b: &[Value]) -> RunResult<Option<Ordering>> {
        for (x, y) in a.iter().zip(b) {
            if values_equal(x, y) {
                continue;
            }
            return self.order(x, y);
        }
        Ok(Some(a.len().cmp(&b.len())))
    }

    pub(super) fn get_item(&self, object: &Value, index: &Value) -> RunResult<Value> {
        match object {
            Value::Dict(pairs) => dict_get(&pairs.borrow(), index)
                .ok_or_else(|| RuntimeError::Key(index.repr())),
            Value::Matrix(m) => self.matrix_item(m, index),
            Value::Range { start, stop, step } => {
                let i = wrap_index(range_len(*start, *stop, *step), index)?;
                Ok(range_items(*start, *stop, *step).nth(i).map_or(Value::None, Value::int))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = wrap_index(chars.len(), index)?;
                Ok(Value::from(chars[i].to_string()))
            }
            Value::List(items) => {
                let items = items.borrow();
                Ok(items[wrap_index(items.len(), index)?].clone())
            }
            Value::Tuple(items) => Ok(items[wrap_index(items.len(), index)?].clone()),
            Value::Array(items) => Ok(Value::Expr(items[wrap_index(items.len(), index)?].clone())),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn matrix_item(&self, m: &Matrix, index: &Value) -> RunResult<Value> {
        if let Value::Tuple(pair) = index {
            let [row, col] = pair.as_slice() else {
                return Err(RuntimeError::Index("matrix index must be a pair".into()));
            };
            let r = wrap_index(m.rows(), row)?;
            let c = wrap_index(m.cols(), col)?;
            return m
                .get(r, c)
                .cloned()
                .map(Value::Expr)
                .ok_or_else(|| RuntimeError::Index("matrix index out of range".into()));
        }
        let i = wrap_index(m.entries().len(), index)?;
        Ok(Value::Expr(m.entries()[i].clone()))
    }

    pub(super) fn set_item(&mut self, object: &Value, index: Value, value: Value) -> RunResult<()> {
        match object {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let i = wrap_index(items.len(), &index)?;
                items[i] = value;
                Ok(())
            }
            Value::Dict(pairs) => {
                let mut pairs = pairs.borrow_mut();
                dict_insert(&mut pairs, index, value);
                self.meter.check_len(pairs.len())
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    pub(super) fn slice(
        &self,
        object: &Value,
        lower: Option<i64>,
        upper: Option<i64>,
        step: Option<i64>,
    ) -> RunResult<Value> {
        match object {
            Value::List(items) => {
                let items = items.borrow();
                let picked = slice_indices(items.len(), lower, upper, step)?;
                Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Tuple(items) => {
                let picked = slice_indices(items.len(), lower, upper, step)?;
                Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = slice_indices(chars.len(), lower, upper, step)?;
                Ok(Value::from(picked.into_iter().map(|i| chars[i]).collect::<String>()))
            }
            Value::Array(items) => {
                let picked = slice_indices(items.len(), lower, upper, step)?;
                Ok(Value::Array(Rc::new(
                    picked.into_iter().map(|i| items[i].clone()).collect(),
                )))
            }
            Value::Range { .. } => {
                let items = self.iter_values(object)?;
                let picked = slice_indices(items.len(), lower, upper, step)?;
                Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not sliceable",
                other.type_name()
            ))),
        }
    }
}

fn cost(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX).max(1)
}

/// Bit width of the wider of numerator and denominator; zero for floats
fn exact_bits(n: &Number) -> u64 {
    match n {
        Number::Rational(r) | Number::Precise { value: r, .. } => r.numer().bits().max(r.denom().bits()),
        Number::Float(_) => 0,
    }
}

fn unsupported_operands(op: BinOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Native(x), Value::Native(y)) => x == y,
        _ => false,
    }
}

/// Resolve a possibly negative index against `len`
pub(super) fn wrap_index(len: usize, index: &Value) -> RunResult<usize> {
    let i = index.expect_i64("index")?;
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if i < 0 { i + len_i } else { i };
    if (0..len_i).contains(&resolved) {
        Ok(usize::try_from(resolved).unwrap_or(0))
    } else {
        Err(RuntimeError::Index(format!("index {i} out of range")))
    }
}

/// Positions selected by a slice, clamped the way Python clamps them
pub(super) fn slice_indices(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> RunResult<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeError::value_error("slice step cannot be zero"));
    }
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |bound: Option<i64>, default: i64, lo: i64, hi: i64| match bound {
        None => default,
        Some(v) => (if v < 0 { v + len } else { v }).clamp(lo, hi),
    };
    let mut out = Vec::new();
    if step > 0 {
        let start = clamp(lower, 0, 0, len);
        let stop = clamp(upper, len, 0, len);
        let mut i = start;
        while i < stop {
            out.push(usize::try_from(i).unwrap_or(0));
            i += step;
        }
    } else {
        let start = clamp(lower, len - 1, -1, len - 1);
        let stop = clamp(upper, -1, -1, len - 1);
        let mut i = start;
        while i > stop {
            out.push(usize::try_from(i).unwrap_or(0));
            i += step;
        }
    }
    Ok(out)
}

/// Insert or replace `key` keeping first-insertion order
pub(crate) fn dict_insert(pairs: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    if let Some(slot) = pairs.iter_mut().find(|(k, _)| values_equal(k, &key)) {
        slot.1 = value;
    } else {
        pairs.push((key, value));
    }
}

pub(crate) fn dict_get(pairs: &[(Value, Value)], key: &Value) -> Option<Value> {
    pairs
        .iter()
        .find(|(k, _)| values_equal(k, key))
        .map(|(_, v)| v.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn slices_clamp_like_python() {
        assert_eq!(slice_indices(5, Some(1), Some(3), None).unwrap(), vec![1, 2]);
        assert_eq!(slice_indices(5, None, None, Some(-1)).unwrap(), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_indices(5, Some(-2), None, None).unwrap(), vec![3, 4]);
        assert_eq!(slice_indices(3, Some(10), None, None).unwrap(), Vec::<usize>::new());
        assert!(slice_indices(3, None, None, Some(0)).is_err());
    }

    #[test]
    fn negative_indices_wrap() {
        assert_eq!(wrap_index(3, &Value::int(-1)).unwrap(), 2);
        assert!(wrap_index(3, &Value::int(3)).is_err());
        assert!(wrap_index(3, &Value::int(-4)).is_err());
    }

    #[test]
    fn exact_width_ignores_floats() {
        assert_eq!(exact_bits(&Number::Float(1e300)), 0);
        let big = Expr::int(1 << 40).as_number().cloned().unwrap();
        assert_eq!(exact_bits(&big), 41);
    }

    #[test]
    fn dict_keys_compare_by_value() {
        let mut pairs = Vec::new();
        dict_insert(&mut pairs, Value::int(1), Value::from("a"));
        dict_insert(&mut pairs, Value::Bool(true), Value::from("b"));
        assert_eq!(pairs.len(), 1);
        assert_eq!(dict_get(&pairs, &Value::int(1)).unwrap().to_str(), "b");
    }
}
