//! Native callables: Python builtins, symbolic algebra, numeric modules

use super::ops::dict_insert;
use super::{format, Args, Interpreter};
use crate::ast::BinOp;
use crate::error::{RunResult, RuntimeError};
use crate::value::{Flavor, Native, Value};
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{FromPrimitive, One, Signed, Zero};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;
use vs_math::{
    diff, eval_number, evalf, expand, factor, factor_roots, integrate, integrate_definite, limit,
    solve, solve_linear_system, summation, Direction, Expr, Func, MathError, Matrix, Number,
    NumericMode,
};

/// Largest `n` accepted by `factorial` and `comb`
const MAX_FACTORIAL: i64 = 5_000;

/// Denominator bound for `nsimplify`
const NSIMPLIFY_MAX_DENOM: i64 = 1_000_000;

/// Step used by numeric differentiation, relative to the point
const DIFF_STEP: f64 = 1e-5;

impl Interpreter {
    pub(super) fn call_native(&mut self, native: Native, mut args: Args) -> RunResult<Value> {
        match native {
            Native::RecordStep => self.record_step(args),
            Native::RecordPlot => self.record_plot(args),
            Native::SetResult => self.set_result(args),

            Native::Abs => {
                let x = args.required(0, "x")?;
                args.finish()?;
                match x.as_number() {
                    Some(n) => Ok(Value::from(n.abs())),
                    None if matches!(x, Value::Expr(_)) => {
                        self.elementary(Some(Func::Abs), Flavor::Symbolic, x)
                    }
                    None => self.elementary(Some(Func::Abs), Flavor::Elementwise, x),
                }
            }
            Native::Min | Native::Max => self.min_max(native == Native::Max, args),
            Native::Len => {
                let x = args.required(0, "obj")?;
                args.finish()?;
                let len = match &x {
                    Value::Str(s) => s.chars().count(),
                    Value::Dict(pairs) => pairs.borrow().len(),
                    Value::Range { start, stop, step } => crate::value::range_len(*start, *stop, *step),
                    Value::Matrix(m) => m.entries().len(),
                    other => self.iter_values(other)?.len(),
                };
                Ok(Value::int(i64::try_from(len).unwrap_or(i64::MAX)))
            }
            Native::Range => {
                let first = args.required(0, "stop")?.expect_i64("range bound")?;
                let second = args.optional(1, "stop").map(|v| v.expect_i64("range bound")).transpose()?;
                let step = args.optional(2, "step").map(|v| v.expect_i64("range step")).transpose()?;
                args.finish()?;
                let (start, stop) = match second {
                    Some(stop) => (first, stop),
                    None => (0, first),
                };
                let step = step.unwrap_or(1);
                if step == 0 {
                    return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
                }
                Ok(Value::Range { start, stop, step })
            }
            Native::Sum => {
                let items = args.required(0, "iterable")?;
                let start = args.optional(1, "start").unwrap_or_else(|| Value::int(0));
                args.finish()?;
                let mut total = start;
                for item in self.iter_values(&items)? {
                    self.meter.tick()?;
                    total = self.binary(BinOp::Add, total, item)?;
                }
                Ok(total)
            }
            Native::Round => {
                let x = args.required(0, "number")?;
                let digits = match args.optional(1, "ndigits") {
                    None | Some(Value::None) => None,
                    Some(d) => Some(d.expect_i64("ndigits")?),
                };
                args.finish()?;
                let n = self.real_number(&x)?;
                Ok(Value::from(round_number(&n, digits)?))
            }
            Native::Int => {
                let x = args.optional(0, "x").unwrap_or_else(|| Value::int(0));
                args.finish()?;
                match &x {
                    Value::Str(s) => s
                        .trim()
                        .replace('_', "")
                        .parse::<BigInt>()
                        .map(|n| Value::from(Number::from_bigint(n)))
                        .map_err(|_| RuntimeError::value_error(format!("invalid literal for int(): {}", x.repr()))),
                    other => {
                        let n = self.real_number(other)?;
                        Ok(Value::from(truncate(&n)?))
                    }
                }
            }
            Native::Float => {
                let x = args.optional(0, "x").unwrap_or_else(|| Value::int(0));
                args.finish()?;
                let n = match &x {
                    Value::Str(s) => parse_float(s)?,
                    other => self.real_number(other)?,
                };
                Ok(Value::from(n.in_mode(self.mode.approximate())))
            }
            Native::Str => {
                let x = args.optional(0, "object");
                args.finish()?;
                Ok(Value::from(x.map(|v| v.to_str()).unwrap_or_default()))
            }
            Native::Bool => {
                let x = args.optional(0, "x");
                args.finish()?;
                Ok(Value::Bool(match x {
                    Some(v) => v.truthy()?,
                    None => false,
                }))
            }
            Native::List | Native::Tuple => {
                let items = match args.optional(0, "iterable") {
                    Some(v) => self.iter_values(&v)?,
                    None => Vec::new(),
                };
                args.finish()?;
                Ok(if native == Native::List {
                    Value::list(items)
                } else {
                    Value::tuple(items)
                })
            }
            Native::Dict => self.dict(args),
            Native::Enumerate => {
                let items = args.required(0, "iterable")?;
                let start = args.optional(1, "start").map(|v| v.expect_i64("start")).transpose()?.unwrap_or(0);
                args.finish()?;
                let pairs = self
                    .iter_values(&items)?
                    .into_iter()
                    .zip(start..)
                    .map(|(v, i)| Value::tuple(vec![Value::int(i), v]))
                    .collect();
                Ok(Value::list(pairs))
            }
            Native::Zip => {
                let sources = args.rest(0);
                args.finish()?;
                let columns = sources
                    .iter()
                    .map(|s| self.iter_values(s))
                    .collect::<RunResult<Vec<_>>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                let rows = (0..len)
                    .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect();
                Ok(Value::list(rows))
            }
            Native::Sorted => {
                let items = args.required(0, "iterable")?;
                let key = args.keyword("key").filter(|k| !k.is_none());
                let reverse = args.keyword("reverse").map(|r| r.truthy()).transpose()?.unwrap_or(false);
                args.finish()?;
                let items = self.iter_values(&items)?;
                self.sorted(items, key, reverse).map(Value::list)
            }
            Native::Reversed => {
                let items = args.required(0, "sequence")?;
                args.finish()?;
                let mut items = self.iter_values(&items)?;
                items.reverse();
                Ok(Value::list(items))
            }
            Native::Print => {
                let items = args.rest(0);
                let sep = args.keyword("sep").map_or_else(|| " ".to_string(), |v| v.to_str());
                let end = args.keyword("end").map_or_else(|| "\n".to_string(), |v| v.to_str());
                args.finish()?;
                let line: Vec<String> = items.iter().map(Value::to_str).collect();
                let text = format!("{}{end}", line.join(sep.as_str()));
                self.write_stdout(&text);
                Ok(Value::None)
            }
            Native::IsInstance => {
                let object = args.required(0, "obj")?;
                let class = args.required(1, "class")?;
                args.finish()?;
                let classes = match class {
                    Value::Tuple(items) => items.to_vec(),
                    single => vec![single],
                };
                for class in classes {
                    if is_instance(&object, &class)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Native::All | Native::Any => {
                let items = args.required(0, "iterable")?;
                args.finish()?;
                let want = native == Native::Any;
                for item in self.iter_values(&items)? {
                    if item.truthy()? == want {
                        return Ok(Value::Bool(want));
                    }
                }
                Ok(Value::Bool(!want))
            }
            Native::Map => {
                let func = args.required(0, "function")?;
                let sources = args.rest(1);
                args.finish()?;
                let columns = sources
                    .iter()
                    .map(|s| self.iter_values(s))
                    .collect::<RunResult<Vec<_>>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                let mut out = Vec::with_capacity(len);
                for i in 0..len {
                    let call_args = columns.iter().map(|c| c[i].clone()).collect();
                    out.push(self.call(func.clone(), call_args, Vec::new())?);
                }
                Ok(Value::list(out))
            }
            Native::Filter => {
                let func = args.required(0, "function")?;
                let items = args.required(1, "iterable")?;
                args.finish()?;
                let mut out = Vec::new();
                for item in self.iter_values(&items)? {
                    let keep = if func.is_none() {
                        item.truthy()?
                    } else {
                        self.call(func.clone(), vec![item.clone()], Vec::new())?.truthy()?
                    };
                    if keep {
                        out.push(item);
                    }
                }
                Ok(Value::list(out))
            }
            Native::Pow => {
                let base = args.required(0, "base")?;
                let exp = args.required(1, "exp")?;
                let modulus = args.optional(2, "mod").filter(|m| !m.is_none());
                args.finish()?;
                match modulus {
                    None => self.binary(BinOp::Pow, base, exp),
                    Some(m) => modular_pow(&base, &exp, &m),
                }
            }

            Native::Elementary(func, flavor) => {
                let x = args.required(0, "x")?;
                args.finish()?;
                self.elementary(Some(func), flavor, x)
            }
            Native::Sqrt(flavor) => {
                let x = args.required(0, "x")?;
                args.finish()?;
                self.elementary(None, flavor, x)
            }

            Native::Symbol => {
                let name = args.required(0, "name")?.expect_str("symbol name")?;
                args.ignore_rest();
                Ok(Value::Expr(Expr::symbol(name.to_string())))
            }
            Native::Symbols => {
                let names = args.required(0, "names")?.expect_str("symbol names")?;
                args.ignore_rest();
                let parts: Vec<&str> = names
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .collect();
                if parts.len() == 1 && !names.contains(',') {
                    return Ok(Value::Expr(Expr::symbol(parts[0])));
                }
                Ok(Value::tuple(
                    parts.into_iter().map(|p| Value::Expr(Expr::symbol(p))).collect(),
                ))
            }
            Native::Rational => {
                let p = args.required(0, "p")?;
                let q = args.optional(1, "q");
                args.finish()?;
                let value = exact_ratio(&p, q.as_ref())?;
                self.lift(Expr::Num(value)).map(Value::Expr)
            }
            Native::Fraction => {
                let p = args.optional(0, "numerator").unwrap_or_else(|| Value::int(0));
                let q = args.optional(1, "denominator");
                args.finish()?;
                exact_ratio(&p, q.as_ref()).map(Value::from)
            }
            Native::Integer => {
                let x = args.required(0, "i")?;
                args.finish()?;
                let n = self.real_number(&x)?;
                truncate(&n).map(Value::from)
            }
            Native::SymFloat | Native::Mpf => {
                let x = args.required(0, "num")?;
                let digits = args.optional(1, "dps").filter(|d| !d.is_none());
                args.finish()?;
                let n = match &x {
                    Value::Str(s) => parse_decimal(s)?,
                    other => self.real_number(other)?,
                };
                let mode = match digits {
                    Some(d) => precise_mode(&d)?,
                    None => self.mode.approximate(),
                };
                Ok(Value::from(n.in_mode(mode)))
            }
            Native::MatrixNew => self.matrix_new(args),
            Native::Eye => {
                let n = args.required(0, "n")?.expect_i64("size")?;
                args.finish()?;
                Ok(Value::from(Matrix::identity(self.dimension(n)?)?))
            }
            Native::Zeros => {
                let rows = args.required(0, "rows")?.expect_i64("rows")?;
                let cols = args.optional(1, "cols").map(|v| v.expect_i64("cols")).transpose()?.unwrap_or(rows);
                args.finish()?;
                let (r, c) = (self.dimension(rows)?, self.dimension(cols)?);
                Ok(Value::from(Matrix::new(r, c, vec![Expr::zero(); r * c])?))
            }
            Native::Integrate => self.integrate(args),
            Native::Diff => {
                let f = args.required(0, "f")?;
                let rest = args.rest(1);
                args.finish()?;
                self.differentiate(f, rest)
            }
            Native::Limit => {
                let f = args.required(0, "e")?.expect_expr("limit expression")?;
                let var = args.required(1, "z")?.expect_symbol("limit variable")?;
                let point = args.required(2, "z0")?.expect_expr("limit point")?;
                let dir = args.optional(3, "dir").map(|d| d.expect_str("dir")).transpose()?;
                args.finish()?;
                let direction = match dir {
                    None => Direction::Plus,
                    Some(d) => Direction::parse(&d)
                        .ok_or_else(|| RuntimeError::value_error(format!("dir must be '+', '-' or '+-', not '{d}'")))?,
                };
                let value = self.with_fallback(|mode| limit(&f, &var, &point, direction, mode))?;
                self.lift(value).map(Value::Expr)
            }
            Native::Solve => self.solve(args),
            Native::Simplify => {
                let x = args.required(0, "expr")?;
                args.ignore_rest();
                self.map_symbolic(x, &simplify)
            }
            Native::Expand => {
                let x = args.required(0, "expr")?;
                args.ignore_rest();
                self.map_symbolic(x, &|e| Ok(expand(e)?))
            }
            Native::Factor => {
                let x = args.required(0, "expr")?;
                args.ignore_rest();
                self.map_symbolic(x, &|e| Ok(factor(e)?))
            }
            Native::Summation => {
                let f = args.required(0, "f")?.expect_expr("summand")?;
                let bounds = args.required(1, "limits")?;
                args.finish()?;
                let (var, lower, upper) = self.bounds(&bounds)?;
                let value = summation(&f, &var, &lower, &upper)?;
                self.lift(value).map(Value::Expr)
            }
            Native::Latex => {
                let x = args.required(0, "expr")?;
                args.ignore_rest();
                Ok(Value::from(x.to_structured()?.to_latex()))
            }
            Native::Evalf => {
                let x = args.required(0, "expr")?;
                let digits = args.optional(1, "n").filter(|d| !d.is_none());
                args.ignore_rest();
                let mode = match digits {
                    Some(d) => precise_mode(&d)?,
                    None => self.mode.approximate(),
                };
                self.evaluate_in(x, mode)
            }
            Native::Equation => {
                let lhs = args.required(0, "lhs")?.expect_expr("equation side")?;
                let rhs = args.optional(1, "rhs").map(|v| v.expect_expr("equation side")).transpose()?;
                args.finish()?;
                Ok(Value::Equation {
                    lhs,
                    rhs: rhs.unwrap_or_else(Expr::zero),
                })
            }
            Native::Roots => {
                let f = equation_expr(&args.required(0, "f")?)?;
                let var = args.optional(1, "x").map(|v| v.expect_symbol("variable")).transpose()?;
                args.ignore_rest();
                let var = sole_variable(&f, var)?;
                let mut pairs = Vec::new();
                for (root, multiplicity) in factor_roots(&f, &var, self.mode)? {
                    let m = i64::try_from(multiplicity).unwrap_or(i64::MAX);
                    dict_insert(&mut pairs, Value::Expr(root), Value::int(m));
                }
                Ok(Value::dict(pairs))
            }
            Native::Nsimplify => {
                let x = args.required(0, "expr")?.expect_expr("expr")?;
                args.ignore_rest();
                let value = x.rebuild(&|e| match e {
                    Expr::Num(n) if !n.is_exact() => Some(Expr::Num(rationalize(n.to_f64()))),
                    _ => None,
                })?;
                Ok(Value::Expr(value))
            }

            Native::Floor | Native::Ceil => {
                let x = args.required(0, "x")?;
                args.finish()?;
                let n = self.real_number(&x)?;
                let result = if native == Native::Floor {
                    n.floor()
                } else {
                    n.neg().floor().neg()
                };
                truncate(&result).map(Value::from)
            }
            Native::Factorial => {
                let n = args.required(0, "n")?.expect_i64("factorial argument")?;
                args.finish()?;
                if n < 0 {
                    return Err(RuntimeError::value_error("factorial() not defined for negative values"));
                }
                if n > MAX_FACTORIAL {
                    return Err(RuntimeError::limit(format!("factorial of {n} exceeds {MAX_FACTORIAL}")));
                }
                self.meter.charge(u64::try_from(n).unwrap_or(1))?;
                let product = (1..=n).fold(BigInt::one(), |acc, k| acc * k);
                Ok(Value::from(Number::from_bigint(product)))
            }
            Native::Comb => {
                let n = args.required(0, "n")?.expect_i64("n")?;
                let k = args.required(1, "k")?.expect_i64("k")?;
                args.finish()?;
                if n < 0 || k < 0 {
                    return Err(RuntimeError::value_error("comb() arguments must be non-negative"));
                }
                if n > MAX_FACTORIAL {
                    return Err(RuntimeError::limit(format!("comb of {n} exceeds {MAX_FACTORIAL}")));
                }
                if k > n {
                    return Ok(Value::int(0));
                }
                let k = k.min(n - k);
                let mut acc = BigInt::one();
                for i in 0..k {
                    acc = acc * (n - i) / (i + 1);
                }
                Ok(Value::from(Number::from_bigint(acc)))
            }
            Native::Gcd => {
                let values = args.rest(0);
                args.finish()?;
                let mut acc = BigInt::zero();
                for v in values {
                    let n = v
                        .as_number()
                        .and_then(|n| if n.is_exact() { n.to_bigint() } else { None })
                        .ok_or_else(|| RuntimeError::type_error("gcd() arguments must be integers"))?;
                    acc = acc.gcd(&n);
                }
                Ok(Value::from(Number::from_bigint(acc)))
            }
            Native::Hypot => {
                let values = args.rest(0);
                args.finish()?;
                let mut total = 0.0_f64;
                for v in &values {
                    let x = self.real_number(v)?.to_f64();
                    total += x * x;
                }
                Ok(Value::from(Number::Float(total.sqrt()).in_mode(self.mode.approximate())))
            }
            Native::Radians | Native::Degrees => {
                let x = args.required(0, "x")?.expect_expr("angle")?;
                args.finish()?;
                let pi = Expr::Const(vs_math::Constant::Pi);
                let factor = if native == Native::Radians {
                    pi.div(&Expr::int(180))?
                } else {
                    Expr::int(180).div(&pi)?
                };
                self.numeric(&x.mul(&factor)?).map(Value::Expr)
            }
            Native::IsClose => {
                let a = args.required(0, "a")?;
                let b = args.required(1, "b")?;
                let rel = args.keyword("rel_tol").or_else(|| args.keyword("rtol"));
                let abs = args.keyword("abs_tol").or_else(|| args.keyword("atol"));
                args.finish()?;
                let rel = rel.map(|v| self.real_number(&v).map(|n| n.to_f64())).transpose()?.unwrap_or(1e-9);
                let abs = abs.map(|v| self.real_number(&v).map(|n| n.to_f64())).transpose()?.unwrap_or(0.0);
                let (x, y) = (self.real_number(&a)?.to_f64(), self.real_number(&b)?.to_f64());
                #[allow(clippy::float_cmp)]
                let close = x == y || (x - y).abs() <= (rel * x.abs().max(y.abs())).max(abs);
                Ok(Value::Bool(close))
            }
            Native::Log10 | Native::Log2 => {
                let x = args.required(0, "x")?.expect_expr("x")?;
                args.finish()?;
                let base = Expr::int(if native == Native::Log10 { 10 } else { 2 });
                let value = Expr::apply(Func::Log, x)?.div(&Expr::apply(Func::Log, base)?)?;
                self.numeric(&value).map(Value::Expr)
            }

            Native::Array => {
                let data = args.required(0, "object")?;
                args.ignore_rest();
                self.array(&data)
            }
            Native::Linspace => {
                let start = self.real_number(&args.required(0, "start")?)?.to_f64();
                let stop = self.real_number(&args.required(1, "stop")?)?.to_f64();
                let num = args.optional(2, "num").map(|v| v.expect_i64("num")).transpose()?.unwrap_or(50);
                args.ignore_rest();
                let num = usize::try_from(num.max(0)).unwrap_or(0);
                self.meter.check_len(num)?;
                #[allow(clippy::cast_precision_loss)]
                let items = (0..num)
                    .map(|i| {
                        let t = if num > 1 { i as f64 / (num - 1) as f64 } else { 0.0 };
                        self.float_expr(start + (stop - start) * t)
                    })
                    .collect();
                Ok(Value::Array(Rc::new(items)))
            }
            Native::Arange => self.arange(args),
            Native::Dot => {
                let a = args.required(0, "a")?;
                let b = args.required(1, "b")?;
                args.finish()?;
                self.dot(&a, &b)
            }
            Native::ArrayZeros => {
                let shape = args.required(0, "shape")?;
                args.ignore_rest();
                let zero = self.float_expr(0.0);
                match &shape {
                    Value::Tuple(dims) if dims.len() == 2 => {
                        let r = self.dimension(dims[0].expect_i64("shape")?)?;
                        let c = self.dimension(dims[1].expect_i64("shape")?)?;
                        Ok(Value::from(Matrix::new(r, c, vec![zero; r * c])?))
                    }
                    other => {
                        let n = self.dimension(other.expect_i64("shape")?)?;
                        Ok(Value::Array(Rc::new(vec![zero; n])))
                    }
                }
            }
            Native::ArrayEye => {
                let n = args.required(0, "N")?.expect_i64("N")?;
                args.ignore_rest();
                let n = self.dimension(n)?;
                let identity = Matrix::identity(n)?;
                Ok(Value::from(identity.map(|e| Ok(self.float_expr(e.as_number().map_or(0.0, Number::to_f64))))?))
            }
            Native::ArraySum | Native::Mean => {
                let data = args.required(0, "a")?;
                args.ignore_rest();
                let items = self.numeric_items(&data)?;
                if native == Native::Mean && items.is_empty() {
                    return Err(RuntimeError::value_error("mean of empty array"));
                }
                let mut total = Expr::zero();
                for item in &items {
                    total = total.add(item);
                }
                if native == Native::Mean {
                    let count = i64::try_from(items.len()).unwrap_or(i64::MAX);
                    total = total.div(&Expr::int(count))?;
                    return self.numeric(&total).map(Value::Expr);
                }
                self.array_scalar(&total).map(Value::Expr)
            }
            Native::ArrayRound => {
                let data = args.required(0, "a")?;
                let decimals = args.optional(1, "decimals").map(|v| v.expect_i64("decimals")).transpose()?.unwrap_or(0);
                args.finish()?;
                let round = |n: &Number| -> RunResult<Number> {
                    Ok(round_number(n, Some(decimals))?.in_mode(self.mode.approximate()))
                };
                match &data {
                    Value::Array(items) => {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items.iter() {
                            out.push(Expr::Num(round(&self.closed_number(item)?)?));
                        }
                        Ok(Value::Array(Rc::new(out)))
                    }
                    Value::Matrix(m) => Ok(Value::from(m.map(|e| {
                        let n = self.closed_number(e).map_err(to_math)?;
                        round(&n).map(Expr::Num).map_err(to_math)
                    })?)),
                    other => Ok(Value::from(round(&self.real_number(other)?)?)),
                }
            }
            Native::Trapz => {
                let y = self.numeric_items(&args.required(0, "y")?)?;
                let x = args.optional(1, "x").filter(|v| !v.is_none());
                let dx = args.keyword("dx");
                args.finish()?;
                let ys: Vec<f64> = y.iter().map(|e| self.closed_number(e).map(|n| n.to_f64())).collect::<RunResult<_>>()?;
                let xs: Vec<f64> = match x {
                    Some(x) => self
                        .numeric_items(&x)?
                        .iter()
                        .map(|e| self.closed_number(e).map(|n| n.to_f64()))
                        .collect::<RunResult<_>>()?,
                    None => {
                        let dx = dx.map(|d| self.real_number(&d).map(|n| n.to_f64())).transpose()?.unwrap_or(1.0);
                        #[allow(clippy::cast_precision_loss)]
                        let grid: Vec<f64> = (0..ys.len()).map(|i| i as f64 * dx).collect();
                        grid
                    }
                };
                if xs.len() != ys.len() {
                    return Err(RuntimeError::value_error("x and y must have the same length"));
                }
                let area: f64 = xs
                    .windows(2)
                    .zip(ys.windows(2))
                    .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
                    .sum();
                Ok(Value::Expr(self.float_expr(area)))
            }
            Native::Det => {
                let m = self.numeric_matrix(&args.required(0, "a")?)?;
                args.finish()?;
                self.numeric(&m.det()?).map(Value::Expr)
            }
            Native::Inv => {
                let m = self.numeric_matrix(&args.required(0, "a")?)?;
                args.finish()?;
                let inverse = m.inverse()?;
                Ok(Value::from(inverse.map(|e| self.numeric(e).map_err(to_math))?))
            }
            Native::LinSolve => {
                let a = self.numeric_matrix(&args.required(0, "a")?)?;
                let b = self.numeric_items(&args.required(1, "b")?)?;
                args.finish()?;
                let column = Matrix::new(b.len(), 1, b)?;
                let solution = a.inverse()?.matmul(&column)?;
                let items = solution
                    .entries()
                    .iter()
                    .map(|e| self.numeric(e))
                    .collect::<RunResult<Vec<_>>>()?;
                Ok(Value::Array(Rc::new(items)))
            }
            Native::Norm => {
                let data = args.required(0, "x")?;
                args.ignore_rest();
                let items = match &data {
                    Value::Matrix(m) => m.entries().to_vec(),
                    other => self.numeric_items(other)?,
                };
                let mut total = 0.0;
                for item in &items {
                    let x = self.closed_number(item)?.to_f64();
                    total += x * x;
                }
                Ok(Value::Expr(self.float_expr(total.sqrt())))
            }

            Native::Quad => {
                let f = args.required(0, "f")?;
                let interval = args.required(1, "interval")?;
                args.ignore_rest();
                let (expr, var) = self.trace_callback(&f)?;
                let bounds = self.iter_values(&interval)?;
                let [lower, upper] = bounds.as_slice() else {
                    return Err(RuntimeError::value_error("quad interval must be [a, b]"));
                };
                let (lower, upper) = (lower.expect_expr("bound")?, upper.expect_expr("bound")?);
                let value = integrate_definite(&expr, &var, &lower, &upper, self.mode.approximate())?;
                Ok(Value::Expr(value))
            }
            Native::NumLimit => {
                let f = args.required(0, "f")?;
                let point = args.required(1, "x")?.expect_expr("limit point")?;
                args.ignore_rest();
                let (expr, var) = self.trace_callback(&f)?;
                let value = limit(&expr, &var, &point, Direction::Both, self.mode.approximate())?;
                Ok(Value::Expr(value))
            }
            Native::NumDiff => {
                let f = args.required(0, "f")?;
                let point = args.required(1, "x")?.expect_expr("point")?;
                let order = args.optional(2, "n").map(|v| v.expect_i64("n")).transpose()?.unwrap_or(1);
                args.ignore_rest();
                let (expr, var) = self.trace_callback(&f)?;
                let mut derivative = expr;
                for _ in 0..order.max(0) {
                    self.meter.tick()?;
                    derivative = diff(&derivative, &var)?;
                }
                let at = derivative.subs(&var, &point)?;
                match self.numeric(&at) {
                    Ok(value) => Ok(Value::Expr(value)),
                    Err(_) if order == 1 => self.central_difference(&f, &point).map(Value::Expr),
                    Err(err) => Err(err),
                }
            }
            Native::Nstr => {
                let x = args.required(0, "x")?;
                let digits = args.optional(1, "n").map(|v| v.expect_i64("n")).transpose()?.unwrap_or(6);
                args.ignore_rest();
                let x = match x.as_expr() {
                    Some(e) if e.is_closed() => Value::Expr(self.numeric(&e)?),
                    _ => x,
                };
                let max_width = self.meter.limits().max_collection_len;
                Ok(Value::from(format::format_value(&x, &format!(".{digits}g"), max_width)?))
            }
        }
    }

    // ---- numeric helpers -----------------------------------------------

    /// Real value of a numeric argument; closed expressions are evaluated
    pub(super) fn real_number(&self, value: &Value) -> RunResult<Number> {
        if let Some(n) = value.as_number() {
            return Ok(n);
        }
        let expr = value.as_expr().ok_or_else(|| {
            RuntimeError::type_error(format!("must be a real number, not {}", value.type_name()))
        })?;
        self.closed_number(&expr)
    }

    fn closed_number(&self, expr: &Expr) -> RunResult<Number> {
        if let Some(n) = expr.as_number() {
            return Ok(n.clone());
        }
        if !expr.is_closed() {
            return Err(RuntimeError::type_error(format!(
                "cannot convert expression {expr} to a number"
            )));
        }
        Ok(eval_number(expr, &BTreeMap::new(), self.mode.approximate())?)
    }

    fn float_expr(&self, value: f64) -> Expr {
        Expr::Num(Number::Float(value).in_mode(self.mode.approximate()))
    }

    fn dimension(&self, n: i64) -> RunResult<usize> {
        let n = usize::try_from(n).map_err(|_| RuntimeError::value_error("negative dimension"))?;
        self.meter.check_len(n.saturating_mul(n.max(1)))?;
        Ok(n)
    }

    /// Run `op` in the current mode; exact-mode gaps retry numerically
    fn with_fallback(&self, op: impl Fn(NumericMode) -> vs_math::MathResult<Expr>) -> RunResult<Expr> {
        match op(self.mode) {
            Err(MathError::Unsupported(_)) if self.mode.is_exact() => Ok(op(NumericMode::Float)?),
            other => Ok(other?),
        }
    }

    fn elementary(&mut self, func: Option<Func>, flavor: Flavor, arg: Value) -> RunResult<Value> {
        let apply = |e: Expr| -> vs_math::MathResult<Expr> {
            match func {
                Some(f) => Expr::apply(f, e),
                None => Expr::sqrt(e),
            }
        };
        match (&arg, flavor) {
            (Value::Array(_) | Value::List(_) | Value::Tuple(_), Flavor::Elementwise) => {
                let items = self.iter_values(&arg)?;
                self.meter.charge(u64::try_from(items.len()).unwrap_or(u64::MAX))?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.numeric(&apply(item.expect_expr("element")?)?)?);
                }
                Ok(Value::Array(Rc::new(out)))
            }
            (Value::Matrix(m), _) if func == Some(Func::Abs) => Ok(Value::from(m.map(|e| Expr::apply(Func::Abs, e.clone()))?)),
            (_, Flavor::Machine | Flavor::Elementwise) => {
                let e = arg.expect_expr("argument")?;
                self.numeric(&apply(e)?).map(Value::Expr)
            }
            (_, Flavor::Symbolic) => {
                let e = self.symbolic_arg(arg.expect_expr("argument")?)?;
                let value = apply(e)?;
                if !self.mode.is_exact() && value.is_closed() {
                    return self.numeric(&value).map(Value::Expr);
                }
                Ok(Value::Expr(value))
            }
        }
    }

    fn min_max(&mut self, want_max: bool, mut args: Args) -> RunResult<Value> {
        let key = args.keyword("key").filter(|k| !k.is_none());
        let default = args.keyword("default");
        let items = if args.len() == 1 {
            let source = args.required(0, "iterable")?;
            self.iter_values(&source)?
        } else {
            args.rest(0)
        };
        args.finish()?;
        let name = if want_max { "max" } else { "min" };
        let Some(first) = items.first().cloned() else {
            return default.ok_or_else(|| RuntimeError::value_error(format!("{name}() arg is an empty sequence")));
        };
        let mut best = first.clone();
        let mut best_key = self.sort_key(key.as_ref(), first)?;
        for item in items.into_iter().skip(1) {
            let k = self.sort_key(key.as_ref(), item.clone())?;
            let ord = self.order(&k, &best_key)?;
            let better = if want_max {
                ord == Some(Ordering::Greater)
            } else {
                ord == Some(Ordering::Less)
            };
            if better {
                best = item;
                best_key = k;
            }
        }
        Ok(best)
    }

    fn sort_key(&mut self, key: Option<&Value>, item: Value) -> RunResult<Value> {
        match key {
            Some(f) => self.call(f.clone(), vec![item], Vec::new()),
            None => Ok(item),
        }
    }

    pub(super) fn sorted(&mut self, items: Vec<Value>, key: Option<Value>, reverse: bool) -> RunResult<Vec<Value>> {
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let k = self.sort_key(key.as_ref(), item.clone())?;
            keyed.push((k, item));
        }
        self.meter.charge(u64::try_from(keyed.len()).unwrap_or(u64::MAX))?;
        let mut failure = None;
        keyed.sort_by(|(a, _), (b, _)| {
            let (x, y) = if reverse { (b, a) } else { (a, b) };
            match self.order(x, y) {
                Ok(ord) => ord.unwrap_or(Ordering::Equal),
                Err(err) => {
                    failure.get_or_insert(err);
                    Ordering::Equal
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(keyed.into_iter().map(|(_, v)| v).collect()),
        }
    }

    fn dict(&mut self, mut args: Args) -> RunResult<Value> {
        let mut pairs = Vec::new();
        if let Some(source) = args.optional(0, "") {
            let entries = match &source {
                Value::Dict(existing) => existing.borrow().clone(),
                other => self
                    .iter_values(other)?
                    .into_iter()
                    .map(|entry| match self.iter_values(&entry)?.as_slice() {
                        [k, v] => Ok((k.clone(), v.clone())),
                        _ => Err(RuntimeError::value_error("dictionary update sequence element must have length 2")),
                    })
                    .collect::<RunResult<Vec<_>>>()?,
            };
            for (k, v) in entries {
                dict_insert(&mut pairs, k, v);
            }
        }
        for name in args_keywords(&mut args) {
            dict_insert(&mut pairs, Value::from(name.0), name.1);
        }
        args.finish()?;
        self.meter.check_len(pairs.len())?;
        Ok(Value::dict(pairs))
    }

    // ---- symbolic algebra ----------------------------------------------

    fn matrix_new(&mut self, mut args: Args) -> RunResult<Value> {
        let first = args.required(0, "rows")?;
        let second = args.optional(1, "cols");
        let third = args.optional(2, "data");
        args.finish()?;
        let matrix = match (second, third) {
            (Some(cols), Some(data)) => {
                let r = self.dimension(first.expect_i64("rows")?)?;
                let c = self.dimension(cols.expect_i64("cols")?)?;
                let flat = self.expr_items(&data)?;
                Matrix::new(r, c, flat)?
            }
            (None, None) => {
                if let Value::Matrix(m) = &first {
                    return Ok(Value::Matrix(Rc::clone(m)));
                }
                let rows = self.iter_values(&first)?;
                let nested = rows
                    .iter()
                    .all(|r| matches!(r, Value::List(_) | Value::Tuple(_) | Value::Array(_)));
                if nested && !rows.is_empty() {
                    let rows = rows
                        .iter()
                        .map(|r| self.expr_items(r))
                        .collect::<RunResult<Vec<_>>>()?;
                    Matrix::from_rows(rows)?
                } else {
                    let column = self.expr_items(&first)?;
                    Matrix::new(column.len(), 1, column)?
                }
            }
            _ => return Err(RuntimeError::type_error("Matrix() takes rows or (rows, cols, data)")),
        };
        self.meter.check_len(matrix.entries().len())?;
        Ok(Value::from(matrix.map(|e| self.lift(e.clone()).map_err(to_math))?))
    }

    fn expr_items(&self, value: &Value) -> RunResult<Vec<Expr>> {
        self.iter_values(value)?
            .iter()
            .map(|v| v.expect_expr("matrix entry"))
            .collect()
    }

    /// Sole free symbol when the caller named none
    fn variable_of(&self, f: &Expr, given: Option<Value>) -> RunResult<String> {
        sole_variable(f, given.map(|v| v.expect_symbol("variable")).transpose()?)
    }

    fn integrate(&mut self, mut args: Args) -> RunResult<Value> {
        let f = args.required(0, "f")?.expect_expr("integrand")?;
        let spec = args.optional(1, "x");
        args.finish()?;
        let value = match spec {
            Some(bounds @ (Value::Tuple(_) | Value::List(_))) => {
                let (var, lower, upper) = self.bounds(&bounds)?;
                self.with_fallback(|mode| integrate_definite(&f, &var, &lower, &upper, mode))?
            }
            other => {
                let var = self.variable_of(&f, other)?;
                integrate(&f, &var)?
            }
        };
        self.lift(value).map(Value::Expr)
    }

    /// `(var, lower, upper)` triple of a definite operation
    fn bounds(&self, spec: &Value) -> RunResult<(String, Expr, Expr)> {
        match self.iter_values(spec)?.as_slice() {
            [var, lower, upper] => Ok((
                var.expect_symbol("variable")?,
                lower.expect_expr("lower bound")?,
                upper.expect_expr("upper bound")?,
            )),
            _ => Err(RuntimeError::value_error("bounds must be (variable, lower, upper)")),
        }
    }

    fn differentiate(&mut self, f: Value, rest: Vec<Value>) -> RunResult<Value> {
        if let Value::Matrix(m) = &f {
            let vars = rest;
            return Ok(Value::from(m.map(|e| {
                self.derivative(e.clone(), &vars).map_err(to_math)
            })?));
        }
        let expr = f.expect_expr("expression")?;
        self.derivative(expr, &rest).map(Value::Expr)
    }

    pub(super) fn derivative(&self, expr: Expr, spec: &[Value]) -> RunResult<Expr> {
        let mut plan: Vec<(String, i64)> = Vec::new();
        for item in spec {
            match item {
                Value::Expr(Expr::Sym(name)) => plan.push((name.clone(), 1)),
                count => {
                    let n = count.expect_i64("derivative order")?;
                    match plan.last_mut() {
                        Some(last) => last.1 = n,
                        None => return Err(RuntimeError::value_error("derivative order given before its variable")),
                    }
                }
            }
        }
        if plan.is_empty() {
            plan.push((sole_variable(&expr, None)?, 1));
        }
        let mut result = expr;
        for (var, times) in plan {
            for _ in 0..times.max(0) {
                result = diff(&result, &var)?;
            }
        }
        self.lift(result)
    }

    fn solve(&mut self, mut args: Args) -> RunResult<Value> {
        let target = args.required(0, "f")?;
        let symbols = args.rest(1);
        args.ignore_rest();
        let equations: Vec<Expr> = match &target {
            Value::List(_) | Value::Tuple(_) => self
                .iter_values(&target)?
                .iter()
                .map(equation_expr)
                .collect::<RunResult<_>>()?,
            single => vec![equation_expr(single)?],
        };
        let mut vars: Vec<String> = Vec::new();
        for s in &symbols {
            match s {
                Value::List(_) | Value::Tuple(_) => {
                    for v in self.iter_values(s)? {
                        vars.push(v.expect_symbol("unknown")?);
                    }
                }
                other => vars.push(other.expect_symbol("unknown")?),
            }
        }
        if vars.is_empty() {
            let mut free = std::collections::BTreeSet::new();
            for eq in &equations {
                free.extend(eq.free_symbols());
            }
            vars = free.into_iter().collect();
        }
        if equations.len() == 1 && vars.len() == 1 {
            let roots = solve(&equations[0], &vars[0], self.mode)?;
            let roots = roots
                .into_iter()
                .map(|r| self.lift(r).map(Value::Expr))
                .collect::<RunResult<Vec<_>>>()?;
            return Ok(Value::list(roots));
        }
        match solve_linear_system(&equations, &vars) {
            Ok(solution) => {
                let mut pairs = Vec::new();
                for (name, value) in solution {
                    dict_insert(&mut pairs, Value::Expr(Expr::symbol(name)), Value::Expr(self.lift(value)?));
                }
                Ok(Value::dict(pairs))
            }
            Err(MathError::Domain(_)) => Ok(Value::list(Vec::new())),
            Err(err) => Err(err.into()),
        }
    }

    pub(super) fn map_symbolic(&self, value: Value, op: &dyn Fn(&Expr) -> RunResult<Expr>) -> RunResult<Value> {
        match value {
            Value::Matrix(m) => Ok(Value::from(m.map(|e| op(e).map_err(to_math))?)),
            Value::Equation { lhs, rhs } => Ok(Value::Equation {
                lhs: op(&lhs)?,
                rhs: op(&rhs)?,
            }),
            other => op(&other.expect_expr("expression")?).map(Value::Expr),
        }
    }

    pub(super) fn evaluate_in(&self, value: Value, mode: NumericMode) -> RunResult<Value> {
        match value {
            Value::Matrix(m) => Ok(Value::from(m.map(|e| evalf(e, mode))?)),
            Value::Equation { lhs, rhs } => Ok(Value::Equation {
                lhs: evalf(&lhs, mode)?,
                rhs: evalf(&rhs, mode)?,
            }),
            Value::List(_) | Value::Tuple(_) => {
                let items = self
                    .iter_values(&value)?
                    .into_iter()
                    .map(|v| self.evaluate_in(v, mode))
                    .collect::<RunResult<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            other => {
                let e = other.expect_expr("expression")?;
                if e.is_closed() {
                    return Ok(Value::from(eval_number(&e, &BTreeMap::new(), mode)?));
                }
                Ok(Value::Expr(evalf(&e, mode)?))
            }
        }
    }

    // ---- arrays --------------------------------------------------------

    fn array(&self, data: &Value) -> RunResult<Value> {
        if let Value::Matrix(m) = data {
            return Ok(Value::from(m.map(|e| self.numeric(e).map_err(to_math))?));
        }
        let items = self.iter_values(data)?;
        let nested = !items.is_empty()
            && items
                .iter()
                .all(|r| matches!(r, Value::List(_) | Value::Tuple(_) | Value::Array(_)));
        if nested {
            let rows = items
                .iter()
                .map(|r| self.expr_items(r))
                .collect::<RunResult<Vec<_>>>()?;
            let m = Matrix::from_rows(rows)?;
            return Ok(Value::from(m.map(|e| self.numeric(e).map_err(to_math))?));
        }
        self.meter.check_len(items.len())?;
        let out = items
            .iter()
            .map(|v| self.array_entry(v))
            .collect::<RunResult<Vec<_>>>()?;
        Ok(Value::Array(Rc::new(out)))
    }

    /// Integers stay integral, everything else becomes a float
    fn array_entry(&self, value: &Value) -> RunResult<Expr> {
        self.array_scalar(&value.expect_expr("array element")?)
    }

    pub(super) fn array_scalar(&self, e: &Expr) -> RunResult<Expr> {
        match e.as_number() {
            Some(n) if n.is_exact() && n.is_integer() => Ok(e.clone()),
            _ => self.numeric(e),
        }
    }

    fn numeric_items(&self, value: &Value) -> RunResult<Vec<Expr>> {
        match value {
            Value::Array(items) => Ok(items.to_vec()),
            other => self
                .iter_values(other)?
                .iter()
                .map(|v| self.array_entry(v))
                .collect(),
        }
    }

    fn numeric_matrix(&self, value: &Value) -> RunResult<Matrix> {
        let m = match value {
            Value::Matrix(m) => (**m).clone(),
            other => {
                let rows = self
                    .iter_values(other)?
                    .iter()
                    .map(|r| self.expr_items(r))
                    .collect::<RunResult<Vec<_>>>()?;
                Matrix::from_rows(rows)?
            }
        };
        Ok(m.map(|e| self.numeric(e).map_err(to_math))?)
    }

    fn arange(&mut self, mut args: Args) -> RunResult<Value> {
        let first = self.real_number(&args.required(0, "start")?)?;
        let second = args.optional(1, "stop").map(|v| self.real_number(&v)).transpose()?;
        let step = args.optional(2, "step").map(|v| self.real_number(&v)).transpose()?;
        args.ignore_rest();
        let (start, stop) = match second {
            Some(stop) => (first, stop),
            None => (Number::zero(), first),
        };
        let step = step.unwrap_or_else(Number::one);
        if step.is_zero() {
            return Err(RuntimeError::value_error("arange step must not be zero"));
        }
        let integral = [&start, &stop, &step].iter().all(|n| n.is_exact() && n.is_integer());
        let span = stop.sub(&start).div(&step)?.to_f64().ceil().max(0.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = span as usize;
        self.meter.check_len(count)?;
        let mut out = Vec::with_capacity(count);
        let mut current = start;
        for _ in 0..count {
            out.push(if integral {
                Expr::Num(current.clone())
            } else {
                Expr::Num(current.in_mode(self.mode.approximate()))
            });
            current = current.add(&step);
        }
        Ok(Value::Array(Rc::new(out)))
    }

    fn dot(&mut self, a: &Value, b: &Value) -> RunResult<Value> {
        match (a, b) {
            (Value::Matrix(x), Value::Matrix(y)) => Ok(Value::from(x.matmul(y)?)),
            (Value::Matrix(x), vector) => {
                let items = self.numeric_items(vector)?;
                let column = Matrix::new(items.len(), 1, items)?;
                let product = x.matmul(&column)?;
                let out = product
                    .entries()
                    .iter()
                    .map(|e| self.numeric(e))
                    .collect::<RunResult<Vec<_>>>()?;
                Ok(Value::Array(Rc::new(out)))
            }
            _ => {
                let (x, y) = (self.numeric_items(a)?, self.numeric_items(b)?);
                if x.len() != y.len() {
                    return Err(RuntimeError::value_error(format!(
                        "shapes ({},) and ({},) not aligned",
                        x.len(),
                        y.len()
                    )));
                }
                let mut total = Expr::zero();
                for (p, q) in x.iter().zip(&y) {
                    total = total.add(&p.mul(q)?);
                }
                self.numeric(&total).map(Value::Expr)
            }
        }
    }

    /// Symmetric difference quotient for callbacks that do not trace
    fn central_difference(&mut self, f: &Value, point: &Expr) -> RunResult<Expr> {
        let x = self.closed_number(point)?.to_f64();
        let h = DIFF_STEP * x.abs().max(1.0);
        let mut sample = |at: f64| -> RunResult<f64> {
            let y = self.call(f.clone(), vec![Value::Expr(Expr::Num(Number::Float(at)))], Vec::new())?;
            Ok(self.real_number(&y)?.to_f64())
        };
        let slope = (sample(x + h)? - sample(x - h)?) / (2.0 * h);
        Ok(self.float_expr(slope))
    }
}

fn args_keywords(args: &mut Args) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    while let Some(pair) = args.take_keyword() {
        out.push(pair);
    }
    out
}

fn to_math(err: RuntimeError) -> MathError {
    match err {
        RuntimeError::Math(e) => e,
        other => MathError::Unsupported(other.to_string()),
    }
}

/// `lhs - rhs` of an equation, or the expression itself
pub(super) fn equation_expr(value: &Value) -> RunResult<Expr> {
    match value {
        Value::Equation { lhs, rhs } => Ok(lhs.sub(rhs)),
        other => other.expect_expr("equation"),
    }
}

fn sole_variable(expr: &Expr, given: Option<String>) -> RunResult<String> {
    if let Some(var) = given {
        return Ok(var);
    }
    let free = expr.free_symbols();
    match free.len() {
        1 => Ok(free.into_iter().next().unwrap_or_default()),
        0 => Ok("x".to_string()),
        _ => Err(RuntimeError::value_error(format!(
            "specify the variable: {expr} has several free symbols"
        ))),
    }
}

/// Shortest of the usual rewritings
pub(super) fn simplify(expr: &Expr) -> RunResult<Expr> {
    let mut best = expr.clone();
    let mut best_len = best.to_string().len();
    let (numer, denom) = expr.as_numer_denom();
    let mut candidates = vec![expand(expr), factor(expr)];
    if !denom.is_one() {
        let rational = factor(&numer).and_then(|n| factor(&denom).and_then(|d| n.div(&d)));
        candidates.push(rational);
        let cancelled = expand(&numer).and_then(|n| expand(&denom).and_then(|d| n.div(&d)));
        candidates.push(cancelled);
    }
    for candidate in candidates.into_iter().flatten() {
        let len = candidate.to_string().len();
        if len < best_len {
            best_len = len;
            best = candidate;
        }
    }
    Ok(best)
}

fn precise_mode(digits: &Value) -> RunResult<NumericMode> {
    let d = digits.expect_i64("digits")?;
    let digits = u32::try_from(d)
        .ok()
        .filter(|d| (1..=1_000).contains(d))
        .ok_or_else(|| RuntimeError::value_error(format!("precision {d} out of range")))?;
    Ok(NumericMode::Precise { digits })
}

fn parse_float(text: &str) -> RunResult<Number> {
    let cleaned = text.trim().replace('_', "").to_ascii_lowercase();
    let value = match cleaned.as_str() {
        "inf" | "+inf" | "infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        "nan" => f64::NAN,
        other => other
            .parse::<f64>()
            .map_err(|_| RuntimeError::value_error(format!("could not convert string to float: '{text}'")))?,
    };
    Ok(Number::Float(value))
}

/// Decimal or `p/q` string read exactly
fn parse_decimal(text: &str) -> RunResult<Number> {
    let cleaned = text.trim().replace('_', "");
    if let Some((p, q)) = cleaned.split_once('/') {
        let parse = |s: &str| {
            s.trim()
                .parse::<BigInt>()
                .map_err(|_| RuntimeError::value_error(format!("invalid rational literal '{text}'")))
        };
        let (p, q) = (parse(p)?, parse(q)?);
        if q.is_zero() {
            return Err(MathError::DivisionByZero.into());
        }
        return Ok(Number::Rational(BigRational::new(p, q)));
    }
    Number::parse_literal(&cleaned.to_ascii_lowercase(), NumericMode::Exact)
        .map_err(|_| RuntimeError::value_error(format!("invalid numeric literal '{text}'")))
}

/// Exact `p / q` from numbers or strings
fn exact_ratio(p: &Value, q: Option<&Value>) -> RunResult<Number> {
    let read = |v: &Value| -> RunResult<BigRational> {
        let n = match v {
            Value::Str(s) => parse_decimal(s)?,
            other => other.as_number().ok_or_else(|| {
                RuntimeError::type_error(format!("expected a rational number, not {}", other.type_name()))
            })?,
        };
        n.to_rational()
            .ok_or_else(|| RuntimeError::value_error("cannot convert a non-finite value to a ratio"))
    };
    let numer = read(p)?;
    let value = match q {
        None | Some(Value::None) => numer,
        Some(q) => {
            let denom = read(q)?;
            if denom.is_zero() {
                return Err(MathError::DivisionByZero.into());
            }
            numer / denom
        }
    };
    Ok(Number::Rational(value))
}

/// Integer part, rounding toward zero
pub(super) fn truncate(n: &Number) -> RunResult<Number> {
    n.to_rational()
        .map(|r| Number::from_bigint(r.trunc().to_integer()))
        .ok_or_else(|| RuntimeError::value_error("cannot convert a non-finite float to an integer"))
}

pub(super) fn round_half_even(q: &BigRational) -> BigInt {
    let floor = q.floor();
    let frac = q - &floor;
    let half = BigRational::new(BigInt::one(), BigInt::from(2));
    let base = floor.to_integer();
    match frac.cmp(&half) {
        Ordering::Less => base,
        Ordering::Greater => base + 1,
        Ordering::Equal if base.is_even() => base,
        Ordering::Equal => base + 1,
    }
}

pub(super) fn power_of_ten(exp: i64) -> BigRational {
    let magnitude = usize::try_from(exp.unsigned_abs().min(1_000)).unwrap_or(1_000);
    let scale = BigRational::from_integer(num_traits::pow(BigInt::from(10), magnitude));
    if exp < 0 {
        scale.recip()
    } else {
        scale
    }
}

/// Python `round` with ties to even
fn round_number(n: &Number, digits: Option<i64>) -> RunResult<Number> {
    match n {
        Number::Float(f) => {
            if !f.is_finite() {
                return match digits {
                    None => Err(RuntimeError::value_error("cannot round a non-finite float to an integer")),
                    Some(_) => Ok(n.clone()),
                };
            }
            match digits {
                None => BigInt::from_f64(f.round_ties_even())
                    .map(Number::from_bigint)
                    .ok_or_else(|| RuntimeError::value_error("float too large to round")),
                Some(d) => {
                    let d = i32::try_from(d.clamp(-308, 308)).unwrap_or(0);
                    let scale = 10f64.powi(d);
                    Ok(Number::Float((f * scale).round_ties_even() / scale))
                }
            }
        }
        other => {
            let r = other
                .to_rational()
                .ok_or_else(|| RuntimeError::value_error("cannot round this value"))?;
            let value = match digits {
                None => return Ok(Number::from_bigint(round_half_even(&r))),
                Some(d) => {
                    let scale = power_of_ten(d);
                    BigRational::from_integer(round_half_even(&(r * &scale))) / scale
                }
            };
            Ok(match other {
                Number::Precise { digits, .. } => Number::precise(&value, *digits),
                _ => Number::Rational(value),
            })
        }
    }
}

/// Closest simple fraction by continued-fraction expansion
fn rationalize(x: f64) -> Number {
    if !x.is_finite() {
        return Number::Float(x);
    }
    let target = BigRational::from_float(x).unwrap_or_else(BigRational::zero);
    let (mut h0, mut h1) = (BigInt::zero(), BigInt::one());
    let (mut k0, mut k1) = (BigInt::one(), BigInt::zero());
    let mut rest = target.clone();
    let mut best = BigRational::from_integer(target.floor().to_integer());
    for _ in 0..64 {
        let a = rest.floor().to_integer();
        let h2 = &a * &h1 + &h0;
        let k2 = &a * &k1 + &k0;
        if k2 > BigInt::from(NSIMPLIFY_MAX_DENOM) {
            break;
        }
        best = BigRational::new(h2.clone(), k2.clone());
        let error = (&best - &target).abs();
        if error.is_zero() || ratio_f64(&error) <= 1e-12 * x.abs().max(1.0) {
            break;
        }
        (h0, h1, k0, k1) = (h1, h2, k1, k2);
        let frac = &rest - BigRational::from_integer(a);
        if frac.is_zero() {
            break;
        }
        rest = frac.recip();
    }
    Number::Rational(best)
}

fn ratio_f64(r: &BigRational) -> f64 {
    Number::Rational(r.clone()).to_f64()
}

fn modular_pow(base: &Value, exp: &Value, modulus: &Value) -> RunResult<Value> {
    let int = |v: &Value| {
        v.as_number()
            .and_then(|n| if n.is_exact() { n.to_bigint() } else { None })
            .ok_or_else(|| RuntimeError::type_error("pow() 3rd argument not allowed unless all arguments are integers"))
    };
    let (b, e, m) = (int(base)?, int(exp)?, int(modulus)?);
    if m.is_zero() {
        return Err(RuntimeError::value_error("pow() 3rd argument cannot be 0"));
    }
    if e.is_negative() {
        return Err(RuntimeError::value_error("pow() negative exponent with modulus is not supported"));
    }
    let r = b.modpow(&e, &m);
    let r = if !r.is_zero() && r.is_negative() != m.is_negative() { r + &m } else { r };
    Ok(Value::from(Number::from_bigint(r)))
}

fn is_instance(object: &Value, class: &Value) -> RunResult<bool> {
    let Value::Native(native) = class else {
        return Err(RuntimeError::type_error("isinstance() arg 2 must be a type"));
    };
    let number = object.as_number();
    Ok(match native {
        Native::Int | Native::Integer => {
            matches!(object, Value::Bool(_)) || number.is_some_and(|n| n.is_exact() && n.is_integer())
        }
        Native::Float | Native::SymFloat | Native::Mpf => {
            matches!(object, Value::Expr(Expr::Num(n)) if !n.is_exact())
        }
        Native::Rational | Native::Fraction => {
            matches!(object, Value::Expr(Expr::Num(n)) if n.is_exact())
        }
        Native::Bool => matches!(object, Value::Bool(_)),
        Native::Str => matches!(object, Value::Str(_)),
        Native::List => matches!(object, Value::List(_)),
        Native::Tuple => matches!(object, Value::Tuple(_)),
        Native::Dict => matches!(object, Value::Dict(_)),
        Native::MatrixNew => matches!(object, Value::Matrix(_)),
        Native::Symbol => matches!(object, Value::Expr(Expr::Sym(_))),
        Native::Array => matches!(object, Value::Array(_)),
        other => {
            return Err(RuntimeError::type_error(format!(
                "isinstance() arg 2 must be a type, not {}",
                other.name()
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rational(p: i64, q: i64) -> Number {
        Number::ratio(p, q).unwrap()
    }

    #[test]
    fn rounding_ties_to_even() {
        assert_eq!(round_number(&rational(5, 2), None).unwrap(), Number::integer(2));
        assert_eq!(round_number(&rational(7, 2), None).unwrap(), Number::integer(4));
        assert_eq!(round_number(&rational(1, 3), Some(2)).unwrap(), rational(33, 100));
        assert_eq!(round_number(&Number::Float(2.5), None).unwrap(), Number::integer(2));
        assert_eq!(round_number(&Number::Float(1.2345), Some(2)).unwrap(), Number::Float(1.23));
    }

    #[test]
    fn truncation_goes_toward_zero() {
        assert_eq!(truncate(&Number::Float(-2.7)).unwrap(), Number::integer(-2));
        assert_eq!(truncate(&rational(7, 2)).unwrap(), Number::integer(3));
        assert!(truncate(&Number::Float(f64::INFINITY)).is_err());
    }

    #[test]
    fn continued_fractions_recover_simple_ratios() {
        assert_eq!(rationalize(0.25), rational(1, 4));
        assert_eq!(rationalize(1.0 / 3.0), rational(1, 3));
        assert_eq!(rationalize(-1.5), rational(-3, 2));
    }

    #[test]
    fn modular_power_matches_python() {
        let v = modular_pow(&Value::int(3), &Value::int(4), &Value::int(5)).unwrap();
        assert_eq!(v.as_i64(), Some(1));
        let v = modular_pow(&Value::int(-3), &Value::int(3), &Value::int(5)).unwrap();
        assert_eq!(v.as_i64(), Some(3));
    }

    #[test]
    fn exact_ratios_from_strings() {
        assert_eq!(exact_ratio(&Value::from("3/6"), None).unwrap(), rational(1, 2));
        assert_eq!(exact_ratio(&Value::from("0.1"), None).unwrap(), rational(1, 10));
        assert!(exact_ratio(&Value::int(1), Some(&Value::int(0))).is_err());
    }
}
