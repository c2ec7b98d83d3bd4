//! Interpreter values
//!
//! Values live only on the thread that runs the interpreter, so shared
//! containers use `Rc<RefCell<…>>`. Anything that leaves the run is first
//! converted into a [`StructuredValue`].

use crate::ast::{Expression, FunctionDef, Param};
use crate::error::{RunResult, RuntimeError};
use crate::outcome::StructuredValue;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::rc::Rc;
use std::sync::Arc;
use vs_math::{Expr, Func, Matrix, Number};

/// One frame of variables; closures keep their defining frame alive
#[derive(Default)]
pub(crate) struct Frame {
    pub(crate) vars: IndexMap<String, Value>,
    pub(crate) parent: Option<Scope>,
}

pub(crate) type Scope = Rc<RefCell<Frame>>;

/// How an elementary function treats its argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flavor {
    /// Keeps exact arguments symbolic (`sympy`, prelude)
    Symbolic,
    /// Evaluates closed arguments numerically (`math`, `mpmath`)
    Machine,
    /// Like `Machine`, mapped over arrays (`numpy`)
    Elementwise,
}

/// Natively implemented callables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Native {
    // result contract
    RecordStep,
    RecordPlot,
    SetResult,
    // builtins
    Abs,
    Min,
    Max,
    Len,
    Range,
    Sum,
    Round,
    Int,
    Float,
    Str,
    Bool,
    List,
    Tuple,
    Dict,
    Enumerate,
    Zip,
    Sorted,
    Reversed,
    Print,
    IsInstance,
    All,
    Any,
    Map,
    Filter,
    Pow,
    // elementary functions
    Elementary(Func, Flavor),
    Sqrt(Flavor),
    // symbolic algebra
    Symbol,
    Symbols,
    Rational,
    Integer,
    SymFloat,
    MatrixNew,
    Eye,
    Zeros,
    Integrate,
    Diff,
    Limit,
    Solve,
    Simplify,
    Expand,
    Factor,
    Summation,
    Latex,
    Evalf,
    Equation,
    Roots,
    Nsimplify,
    // scalar helpers from `math`
    Floor,
    Ceil,
    Factorial,
    Gcd,
    Hypot,
    Radians,
    Degrees,
    IsClose,
    Log10,
    Log2,
    Comb,
    // arrays
    Array,
    Linspace,
    Arange,
    Dot,
    ArrayZeros,
    ArrayEye,
    ArraySum,
    Mean,
    ArrayRound,
    Trapz,
    Det,
    Inv,
    LinSolve,
    Norm,
    // arbitrary precision
    Mpf,
    Quad,
    NumLimit,
    NumDiff,
    Nstr,
    Fraction,
}

impl Native {
    /// Builtin bound in every namespace under `name`
    pub(crate) fn builtin(name: &str) -> Option<Self> {
        Some(match name {
            "record_step" => Self::RecordStep,
            "record_plot" => Self::RecordPlot,
            "set_result" => Self::SetResult,
            "abs" => Self::Abs,
            "min" => Self::Min,
            "max" => Self::Max,
            "len" => Self::Len,
            "range" => Self::Range,
            "sum" => Self::Sum,
            "round" => Self::Round,
            "int" => Self::Int,
            "float" => Self::Float,
            "str" => Self::Str,
            "bool" => Self::Bool,
            "list" => Self::List,
            "tuple" => Self::Tuple,
            "dict" => Self::Dict,
            "enumerate" => Self::Enumerate,
            "zip" => Self::Zip,
            "sorted" => Self::Sorted,
            "reversed" => Self::Reversed,
            "print" => Self::Print,
            "isinstance" => Self::IsInstance,
            "all" => Self::All,
            "any" => Self::Any,
            "map" => Self::Map,
            "filter" => Self::Filter,
            "pow" => Self::Pow,
            _ => return None,
        })
    }

    /// Callable exported by module `path` under `name`
    pub(crate) fn from_module(path: &str, name: &str) -> Option<Self> {
        let flavor = match path {
            "sympy" => Flavor::Symbolic,
            "numpy" => Flavor::Elementwise,
            _ => Flavor::Machine,
        };
        if let Some(func) = elementary(name) {
            return Some(Self::Elementary(func, flavor));
        }
        if name == "sqrt" {
            return Some(Self::Sqrt(flavor));
        }
        Some(match (path, name) {
            ("sympy", other) => return Self::symbolic(other),
            ("math", "fabs") => Self::Elementary(Func::Abs, Flavor::Machine),
            ("math", "floor") => Self::Floor,
            ("math", "ceil") => Self::Ceil,
            ("math", "factorial") => Self::Factorial,
            ("math", "gcd") => Self::Gcd,
            ("math", "hypot") => Self::Hypot,
            ("math", "pow") => Self::Pow,
            ("math", "radians") => Self::Radians,
            ("math", "degrees") => Self::Degrees,
            ("math" | "numpy", "isclose") => Self::IsClose,
            ("math", "log10") => Self::Log10,
            ("math", "log2") => Self::Log2,
            ("math", "comb") => Self::Comb,
            ("numpy", "abs") => Self::Elementary(Func::Abs, Flavor::Elementwise),
            ("numpy", "array") => Self::Array,
            ("numpy", "linspace") => Self::Linspace,
            ("numpy", "arange") => Self::Arange,
            ("numpy", "dot") => Self::Dot,
            ("numpy", "zeros") => Self::ArrayZeros,
            ("numpy", "eye") => Self::ArrayEye,
            ("numpy", "sum") => Self::ArraySum,
            ("numpy", "mean") => Self::Mean,
            ("numpy", "round") => Self::ArrayRound,
            ("numpy", "trapz") => Self::Trapz,
            ("numpy.linalg", "det") => Self::Det,
            ("numpy.linalg", "inv") => Self::Inv,
            ("numpy.linalg", "solve") => Self::LinSolve,
            ("numpy.linalg", "norm") => Self::Norm,
            ("mpmath", "mpf") => Self::Mpf,
            ("mpmath", "quad") => Self::Quad,
            ("mpmath", "limit") => Self::NumLimit,
            ("mpmath", "diff") => Self::NumDiff,
            ("mpmath", "nstr") => Self::Nstr,
            ("fractions", "Fraction") => Self::Fraction,
            _ => return None,
        })
    }

    /// Symbolic-algebra callables, also used for the prelude
    pub(crate) fn symbolic(name: &str) -> Option<Self> {
        if let Some(func) = elementary(name) {
            return Some(Self::Elementary(func, Flavor::Symbolic));
        }
        Some(match name {
            "sqrt" => Self::Sqrt(Flavor::Symbolic),
            "Abs" => Self::Elementary(Func::Abs, Flavor::Symbolic),
            "Symbol" => Self::Symbol,
            "symbols" => Self::Symbols,
            "Rational" => Self::Rational,
            "Integer" => Self::Integer,
            "Float" => Self::SymFloat,
            "Matrix" => Self::MatrixNew,
            "eye" => Self::Eye,
            "zeros" => Self::Zeros,
            "integrate" => Self::Integrate,
            "diff" => Self::Diff,
            "limit" => Self::Limit,
            "solve" => Self::Solve,
            "simplify" => Self::Simplify,
            "expand" => Self::Expand,
            "factor" => Self::Factor,
            "summation" => Self::Summation,
            "latex" => Self::Latex,
            "N" => Self::Evalf,
            "Eq" => Self::Equation,
            "roots" => Self::Roots,
            "nsimplify" => Self::Nsimplify,
            _ => return None,
        })
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::RecordStep => "record_step",
            Self::RecordPlot => "record_plot",
            Self::SetResult => "set_result",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Len => "len",
            Self::Range => "range",
            Self::Sum | Self::ArraySum => "sum",
            Self::Round | Self::ArrayRound => "round",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::Enumerate => "enumerate",
            Self::Zip => "zip",
            Self::Sorted => "sorted",
            Self::Reversed => "reversed",
            Self::Print => "print",
            Self::IsInstance => "isinstance",
            Self::All => "all",
            Self::Any => "any",
            Self::Map => "map",
            Self::Filter => "filter",
            Self::Pow => "pow",
            Self::Elementary(func, _) => func.name(),
            Self::Sqrt(_) => "sqrt",
            Self::Symbol => "Symbol",
            Self::Symbols => "symbols",
            Self::Rational => "Rational",
            Self::Integer => "Integer",
            Self::SymFloat => "Float",
            Self::MatrixNew => "Matrix",
            Self::Eye | Self::ArrayEye => "eye",
            Self::Zeros | Self::ArrayZeros => "zeros",
            Self::Integrate => "integrate",
            Self::Diff | Self::NumDiff => "diff",
            Self::Limit | Self::NumLimit => "limit",
            Self::Solve | Self::LinSolve => "solve",
            Self::Simplify => "simplify",
            Self::Expand => "expand",
            Self::Factor => "factor",
            Self::Summation => "summation",
            Self::Latex => "latex",
            Self::Evalf => "N",
            Self::Equation => "Eq",
            Self::Roots => "roots",
            Self::Nsimplify => "nsimplify",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Factorial => "factorial",
            Self::Gcd => "gcd",
            Self::Hypot => "hypot",
            Self::Radians => "radians",
            Self::Degrees => "degrees",
            Self::IsClose => "isclose",
            Self::Log10 => "log10",
            Self::Log2 => "log2",
            Self::Comb => "comb",
            Self::Array => "array",
            Self::Linspace => "linspace",
            Self::Arange => "arange",
            Self::Dot => "dot",
            Self::Mean => "mean",
            Self::Trapz => "trapz",
            Self::Det => "det",
            Self::Inv => "inv",
            Self::Norm => "norm",
            Self::Mpf => "mpf",
            Self::Quad => "quad",
            Self::Nstr => "nstr",
            Self::Fraction => "Fraction",
        }
    }
}

fn elementary(name: &str) -> Option<Func> {
    Some(match name {
        "sin" => Func::Sin,
        "cos" => Func::Cos,
        "tan" => Func::Tan,
        "asin" => Func::Asin,
        "acos" => Func::Acos,
        "atan" => Func::Atan,
        "exp" => Func::Exp,
        "log" => Func::Log,
        _ => return None,
    })
}

/// User-defined callable and the frame it closes over
pub(crate) struct Closure {
    pub(crate) body: Callable,
    pub(crate) scope: Scope,
}

pub(crate) enum Callable {
    Def(Arc<FunctionDef>),
    Lambda {
        params: Vec<Param>,
        body: Arc<Expression>,
    },
}

impl Closure {
    pub(crate) fn name(&self) -> &str {
        match &self.body {
            Callable::Def(def) => &def.name,
            Callable::Lambda { .. } => "<lambda>",
        }
    }

    pub(crate) fn params(&self) -> &[Param] {
        match &self.body {
            Callable::Def(def) => &def.params,
            Callable::Lambda { params, .. } => params,
        }
    }
}

/// Method looked up on a value, waiting to be called
pub(crate) struct BoundMethod {
    pub(crate) receiver: Value,
    pub(crate) name: String,
}

/// A runtime value
#[derive(Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    /// Integers, rationals, floats and symbolic expressions
    Expr(Expr),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    /// Insertion-ordered pairs; keys compared with `==`
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    /// Lazy integer range
    Range { start: i64, stop: i64, step: i64 },
    /// One-dimensional numeric array
    Array(Rc<Vec<Expr>>),
    Matrix(Rc<Matrix>),
    Equation { lhs: Expr, rhs: Expr },
    Function(Rc<Closure>),
    Native(Native),
    Module(Rc<str>),
    Method(Rc<BoundMethod>),
}

impl From<Expr> for Value {
    fn from(value: Expr) -> Self {
        Self::Expr(value)
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Self::Expr(Expr::Num(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

impl From<Matrix> for Value {
    fn from(value: Matrix) -> Self {
        Self::Matrix(Rc::new(value))
    }
}

impl Value {
    pub(crate) fn int(value: i64) -> Self {
        Self::Expr(Expr::int(value))
    }

    pub(crate) fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub(crate) fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    pub(crate) fn dict(pairs: Vec<(Value, Value)>) -> Self {
        Self::Dict(Rc::new(RefCell::new(pairs)))
    }

    /// Python type name, for error messages
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Expr(Expr::Num(n)) if n.is_exact() && n.is_integer() => "int",
            Self::Expr(Expr::Num(Number::Rational(_))) => "Rational",
            Self::Expr(Expr::Num(_)) => "float",
            Self::Expr(_) => "Expr",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Range { .. } => "range",
            Self::Array(_) => "ndarray",
            Self::Matrix(_) => "Matrix",
            Self::Equation { .. } => "Equality",
            Self::Function(_) => "function",
            Self::Native(_) | Self::Method(_) => "builtin_function_or_method",
            Self::Module(_) => "module",
        }
    }

    /// Expression view; booleans count as 0 and 1
    pub(crate) fn as_expr(&self) -> Option<Expr> {
        match self {
            Self::Expr(e) => Some(e.clone()),
            Self::Bool(b) => Some(Expr::int(i64::from(*b))),
            _ => None,
        }
    }

    pub(crate) fn expect_expr(&self, what: &str) -> RunResult<Expr> {
        self.as_expr().ok_or_else(|| {
            RuntimeError::type_error(format!("{what} must be a number or expression, not {}", self.type_name()))
        })
    }

    pub(crate) fn as_number(&self) -> Option<Number> {
        match self {
            Self::Expr(Expr::Num(n)) => Some(n.clone()),
            Self::Bool(b) => Some(Number::integer(i64::from(*b))),
            _ => None,
        }
    }

    /// Exact or integral-float integer value
    pub(crate) fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(|n| n.to_i64())
    }

    pub(crate) fn expect_i64(&self, what: &str) -> RunResult<i64> {
        self.as_i64().ok_or_else(|| {
            RuntimeError::type_error(format!("{what} must be an integer, not {}", self.type_name()))
        })
    }

    pub(crate) fn expect_str(&self, what: &str) -> RunResult<Rc<str>> {
        match self {
            Self::Str(s) => Ok(Rc::clone(s)),
            other => Err(RuntimeError::type_error(format!(
                "{what} must be a string, not {}",
                other.type_name()
            ))),
        }
    }

    /// Name of a symbol value
    pub(crate) fn expect_symbol(&self, what: &str) -> RunResult<String> {
        match self {
            Self::Expr(Expr::Sym(name)) => Ok(name.clone()),
            other => Err(RuntimeError::type_error(format!(
                "{what} must be a Symbol, not {}",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Python truthiness
    pub(crate) fn truthy(&self) -> RunResult<bool> {
        Ok(match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Expr(Expr::Num(n)) => !n.is_zero(),
            Self::Expr(_) | Self::Matrix(_) => true,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(pairs) => !pairs.borrow().is_empty(),
            Self::Range { start, stop, step } => range_len(*start, *stop, *step) > 0,
            Self::Array(items) => match items.as_slice() {
                [single] => !single.is_zero(),
                _ => {
                    return Err(RuntimeError::value_error(
                        "the truth value of an array with more than one element is ambiguous",
                    ));
                }
            },
            Self::Equation { lhs, rhs } => match equation_truth(lhs, rhs) {
                Some(b) => b,
                None => {
                    return Err(RuntimeError::type_error(
                        "cannot determine truth value of Relational",
                    ));
                }
            },
            Self::Function(_) | Self::Native(_) | Self::Module(_) | Self::Method(_) => true,
        })
    }

    /// Host-side copy for steps and results
    pub(crate) fn to_structured(&self) -> RunResult<StructuredValue> {
        Ok(match self {
            Self::None => StructuredValue::Null,
            Self::Bool(b) => StructuredValue::Boolean(*b),
            Self::Expr(e) => StructuredValue::Expression(e.clone()),
            Self::Str(s) => StructuredValue::Text(s.to_string()),
            Self::List(items) => StructuredValue::Sequence(
                items
                    .borrow()
                    .iter()
                    .map(Self::to_structured)
                    .collect::<RunResult<_>>()?,
            ),
            Self::Tuple(items) => StructuredValue::Sequence(
                items.iter().map(Self::to_structured).collect::<RunResult<_>>()?,
            ),
            Self::Dict(pairs) => StructuredValue::Mapping(
                pairs
                    .borrow()
                    .iter()
                    .map(|(k, v)| Ok((k.to_structured()?, v.to_structured()?)))
                    .collect::<RunResult<_>>()?,
            ),
            Self::Range { start, stop, step } => StructuredValue::Sequence(
                range_items(*start, *stop, *step)
                    .map(|i| StructuredValue::Expression(Expr::int(i)))
                    .collect(),
            ),
            Self::Array(items) => StructuredValue::Sequence(
                items
                    .iter()
                    .map(|e| StructuredValue::Expression(e.clone()))
                    .collect(),
            ),
            Self::Matrix(m) => StructuredValue::Matrix((**m).clone()),
            Self::Equation { lhs, rhs } => StructuredValue::Equation {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            },
            other => {
                return Err(RuntimeError::type_error(format!(
                    "cannot record a value of type {}",
                    other.type_name()
                )));
            }
        })
    }

    /// `str(value)`
    pub(crate) fn to_str(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            other => other.repr(),
        }
    }

    /// `repr(value)`
    pub(crate) fn repr(&self) -> String {
        match self {
            Self::None => "None".into(),
            Self::Bool(b) => String::from(if *b { "True" } else { "False" }),
            Self::Expr(e) => e.to_string(),
            Self::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::List(items) => join_repr("[", &items.borrow(), "]"),
            Self::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Self::Tuple(items) => join_repr("(", items, ")"),
            Self::Dict(pairs) => {
                let mut out = String::from("{");
                for (i, (k, v)) in pairs.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}: {}", k.repr(), v.repr());
                }
                out.push('}');
                out
            }
            Self::Range { start, stop, step } if *step == 1 => format!("range({start}, {stop})"),
            Self::Range { start, stop, step } => format!("range({start}, {stop}, {step})"),
            Self::Array(items) => {
                let inner: Vec<String> = items.iter().map(ToString::to_string).collect();
                format!("[{}]", inner.join(" "))
            }
            Self::Matrix(m) => m.to_string(),
            Self::Equation { lhs, rhs } => format!("Eq({lhs}, {rhs})"),
            Self::Function(f) => format!("<function {}>", f.name()),
            Self::Native(n) => format!("<built-in function {}>", n.name()),
            Self::Module(path) => format!("<module '{path}'>"),
            Self::Method(m) => format!("<method {} of {}>", m.name, m.receiver.type_name()),
        }
    }
}

fn join_repr(open: &str, items: &[Value], close: &str) -> String {
    let inner: Vec<String> = items.iter().map(Value::repr).collect();
    format!("{open}{}{close}", inner.join(", "))
}

fn equation_truth(lhs: &Expr, rhs: &Expr) -> Option<bool> {
    if lhs == rhs {
        return Some(true);
    }
    match (lhs.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => Some(a.cmp_value(b) == Some(Ordering::Equal)),
        _ => None,
    }
}

pub(crate) fn range_len(start: i64, stop: i64, step: i64) -> usize {
    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    if span <= 0 || step == 0 {
        return 0;
    }
    let step = i128::from(step).abs();
    usize::try_from((span + step - 1) / step).unwrap_or(usize::MAX)
}

pub(crate) fn range_items(start: i64, stop: i64, step: i64) -> impl Iterator<Item = i64> {
    let len = range_len(start, stop, step);
    (0..len).map(move |i| start + step * i64::try_from(i).unwrap_or(i64::MAX))
}

/// Python `==`
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => seq_equal(&x.borrow(), &y.borrow()),
        (Value::Tuple(x), Value::Tuple(y)) => seq_equal(x, y),
        (Value::Dict(x), Value::Dict(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter().all(|(k, v)| {
                    y.iter()
                        .any(|(k2, v2)| values_equal(k, k2) && values_equal(v, v2))
                })
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| exprs_equal(p, q))
        }
        (Value::Matrix(x), Value::Matrix(y)) => {
            x.rows() == y.rows()
                && x.cols() == y.cols()
                && x.entries().iter().zip(y.entries()).all(|(p, q)| exprs_equal(p, q))
        }
        (Value::Equation { lhs: l1, rhs: r1 }, Value::Equation { lhs: l2, rhs: r2 }) => {
            l1 == l2 && r1 == r2
        }
        (
            Value::Range { start, stop, step },
            Value::Range {
                start: s2,
                stop: e2,
                step: t2,
            },
        ) => start == s2 && stop == e2 && step == t2,
        (Value::Native(x), Value::Native(y)) => x == y,
        (Value::Module(x), Value::Module(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        _ => match (a.as_expr(), b.as_expr()) {
            (Some(x), Some(y)) => exprs_equal(&x, &y),
            _ => false,
        },
    }
}

fn seq_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

/// Structural equality, with numbers compared by value
pub(crate) fn exprs_equal(a: &Expr, b: &Expr) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.cmp_value(y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn repr_matches_python() {
        let v = Value::list(vec![
            Value::int(1),
            Value::from("a"),
            Value::tuple(vec![Value::None]),
        ]);
        assert_eq!(v.repr(), "[1, 'a', (None,)]");
        assert_eq!(Value::from("a").to_str(), "a");
        assert_eq!(Value::Bool(true).repr(), "True");
    }

    #[test]
    fn numbers_compare_by_value() {
        let one = Value::int(1);
        let float_one = Value::from(Number::Float(1.0));
        assert!(values_equal(&one, &float_one));
        assert!(values_equal(&Value::Bool(true), &one));
        assert!(!values_equal(&one, &Value::from("1")));
    }

    #[test]
    fn range_lengths() {
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(5, 0, -1), 5);
        assert_eq!(range_len(0, 0, 1), 0);
        assert_eq!(range_items(0, 6, 2).collect::<Vec<_>>(), vec![0, 2, 4]);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::int(0).truthy().unwrap());
        assert!(Value::Expr(Expr::symbol("x")).truthy().unwrap());
        assert!(!Value::list(Vec::new()).truthy().unwrap());
        let undecided = Value::Equation {
            lhs: Expr::symbol("x"),
            rhs: Expr::int(1),
        };
        assert!(undecided.truthy().is_err());
    }

    #[test]
    fn module_exports() {
        assert_eq!(
            Native::from_module("math", "sin"),
            Some(Native::Elementary(Func::Sin, Flavor::Machine))
        );
        assert_eq!(Native::from_module("numpy.linalg", "det"), Some(Native::Det));
        assert_eq!(Native::from_module("sympy", "integrate"), Some(Native::Integrate));
        assert_eq!(Native::from_module("math", "frexp"), None);
    }
}
