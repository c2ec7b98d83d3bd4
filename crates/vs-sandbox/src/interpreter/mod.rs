//! Tree-walking interpreter for validated programs
//!
//! Runs on a single thread with:
//! - a [`ResourceMeter`] ticked on every statement, expression, loop
//!   iteration and call
//! - namespaces holding only what the policy allows (builtins, prelude,
//!   imported modules)
//! - the result contract (`record_step`, `record_plot`, `set_result`)
//!   writing into the run's trace
//!
//! Numbers follow the run's [`NumericMode`]: integers stay exact in every
//! mode, while non-integral literals, true division and elementary
//! functions produce values in the mode's domain.

mod args;
mod builtins;
mod format;
mod methods;
mod ops;

use crate::ast::{BinOp, Clause, ExprKind, Expression, FPart, Program, Stmt, StmtKind, Target, UnaryOp};
use crate::error::{RunResult, RuntimeError};
use crate::limits::{AbortSignal, ExecutionLimits, ResourceMeter};
use crate::outcome::{
    ExecutionOutcome, ExecutionSuccess, FailureKind, PlotHandle, StepRecord, StructuredValue,
};
use crate::policy::{CapabilityPolicy, Decision};
use crate::value::{BoundMethod, Callable, Closure, Frame, Native, Scope, Value};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::trace;
use vs_math::eval::constant_value;
use vs_math::{eval_number, Constant, Expr, Number, NumericMode};

pub(crate) use args::Args;

/// Frames registered before dead entries are pruned
const FRAME_PRUNE_FLOOR: usize = 1_024;

/// Placeholder symbol used to trace numeric callbacks into expressions
const TRACE_SYMBOL: &str = "_trace_";

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Run `program` to completion and package the outcome
pub(crate) fn execute(
    program: &Program,
    policy: Arc<CapabilityPolicy>,
    mode: NumericMode,
    limits: ExecutionLimits,
    signal: AbortSignal,
) -> ExecutionOutcome {
    let mut interpreter = Interpreter::new(policy, mode, ResourceMeter::new(limits, signal));
    let globals = Rc::clone(&interpreter.globals);
    let status = interpreter.block(&program.body, &globals).map(|_| ());
    interpreter.finish(status)
}

pub(crate) struct Interpreter {
    policy: Arc<CapabilityPolicy>,
    mode: NumericMode,
    meter: ResourceMeter,
    globals: Scope,
    /// Every frame created, cleared on drop so closures cannot leak cycles
    frames: Vec<Weak<RefCell<Frame>>>,
    prune_at: usize,
    depth: usize,
    line: usize,
    stdout: String,
    stdout_truncated: bool,
    steps: Vec<StepRecord>,
    plots: Vec<PlotHandle>,
    result: Option<(StructuredValue, Option<String>)>,
}

impl Interpreter {
    fn new(policy: Arc<CapabilityPolicy>, mode: NumericMode, meter: ResourceMeter) -> Self {
        let globals: Scope = Rc::new(RefCell::new(Frame::default()));
        Self {
            policy,
            mode,
            meter,
            frames: vec![Rc::downgrade(&globals)],
            globals,
            prune_at: FRAME_PRUNE_FLOOR,
            depth: 0,
            line: 0,
            stdout: String::new(),
            stdout_truncated: false,
            steps: Vec::new(),
            plots: Vec::new(),
            result: None,
        }
    }

    fn finish(mut self, status: RunResult<()>) -> ExecutionOutcome {
        if let Err(err) = status {
            let message = match err {
                RuntimeError::Deadline | RuntimeError::BudgetExhausted(_) | RuntimeError::Cancelled => {
                    err.to_string()
                }
                _ => format!("line {}: {err}", self.line),
            };
            trace!(kind = %err.failure_kind(), %message, "program failed");
            return ExecutionOutcome::failure(err.failure_kind(), message);
        }
        let Some((result, latex)) = self.result.take() else {
            return ExecutionOutcome::failure(
                FailureKind::MissingResult,
                "program finished without calling set_result",
            );
        };
        if self.stdout_truncated {
            self.stdout.push_str("\n[output truncated]");
        }
        let result_latex = latex.unwrap_or_else(|| result.to_latex());
        ExecutionOutcome::Success(ExecutionSuccess {
            result,
            result_latex,
            steps: std::mem::take(&mut self.steps),
            plots: std::mem::take(&mut self.plots),
            stdout: std::mem::take(&mut self.stdout),
            elapsed: self.meter.elapsed(),
            operations: self.meter.operations(),
        })
    }

    fn new_frame(&mut self, parent: Option<Scope>) -> Scope {
        let frame = Rc::new(RefCell::new(Frame {
            vars: indexmap::IndexMap::new(),
            parent,
        }));
        if self.frames.len() >= self.prune_at {
            self.frames.retain(|w| w.strong_count() > 0);
            self.prune_at = (self.frames.len() * 2).max(FRAME_PRUNE_FLOOR);
        }
        self.frames.push(Rc::downgrade(&frame));
        frame
    }

    // ---- numbers -------------------------------------------------------

    /// Push non-integral exact numbers and `pi`/`E` into the run's mode
    fn lift(&self, expr: Expr) -> RunResult<Expr> {
        if self.mode.is_exact() {
            return Ok(expr);
        }
        let mode = self.mode;
        Ok(expr.rebuild(&|e| match e {
            Expr::Num(n) if n.is_exact() && !n.is_integer() => Some(Expr::Num(n.in_mode(mode))),
            Expr::Const(c @ (Constant::Pi | Constant::E)) => {
                constant_value(*c, mode).ok().map(Expr::Num)
            }
            _ => None,
        })?)
    }

    fn lift_value(&self, value: Value) -> RunResult<Value> {
        match value {
            Value::Expr(e) => self.lift(e).map(Value::Expr),
            Value::Matrix(m) => Ok(Value::from(m.map(|e| self.lift(e.clone()).map_err(math_of))?)),
            Value::List(items) => {
                let lifted = items
                    .borrow()
                    .iter()
                    .map(|v| self.lift_value(v.clone()))
                    .collect::<RunResult<Vec<_>>>()?;
                Ok(Value::list(lifted))
            }
            Value::Tuple(items) => Ok(Value::tuple(
                items
                    .iter()
                    .map(|v| self.lift_value(v.clone()))
                    .collect::<RunResult<Vec<_>>>()?,
            )),
            Value::Equation { lhs, rhs } => Ok(Value::Equation {
                lhs: self.lift(lhs)?,
                rhs: self.lift(rhs)?,
            }),
            other => Ok(other),
        }
    }

    /// Numeric value in the closest approximate mode when the expression
    /// is closed; otherwise lifted but kept symbolic
    fn numeric(&self, expr: &Expr) -> RunResult<Expr> {
        if expr.is_closed() {
            let value = eval_number(expr, &BTreeMap::new(), self.mode.approximate())?;
            return Ok(Expr::Num(value));
        }
        let lifted = self.lift(expr.clone())?;
        if self.mode.is_exact() {
            let mode = NumericMode::Float;
            return Ok(lifted.rebuild(&|e| match e {
                Expr::Num(n) if !n.is_integer() => Some(Expr::Num(n.in_mode(mode))),
                _ => None,
            })?);
        }
        Ok(lifted)
    }

    /// Argument prepared for a symbolic function: closed arguments are
    /// evaluated in approximate modes
    fn symbolic_arg(&self, expr: Expr) -> RunResult<Expr> {
        if self.mode.is_exact() {
            return Ok(expr);
        }
        if expr.is_closed() {
            if let Ok(value) = eval_number(&expr, &BTreeMap::new(), self.mode) {
                return Ok(Expr::Num(value));
            }
        }
        self.lift(expr)
    }

    fn constant(&self, constant: Constant, mode: NumericMode) -> Value {
        match constant {
            Constant::Pi | Constant::E if !mode.is_exact() => constant_value(constant, mode)
                .map_or(Value::Expr(Expr::Const(constant)), Value::from),
            _ => Value::Expr(Expr::Const(constant)),
        }
    }

    fn literal(&self, text: &str) -> RunResult<Value> {
        let cleaned = text.replace('_', "").to_ascii_lowercase();
        if let Some(imaginary) = cleaned.strip_suffix('j') {
            let magnitude = Expr::Num(self.literal_number(imaginary)?);
            return Ok(Value::Expr(magnitude.mul(&Expr::Const(Constant::I))?));
        }
        self.literal_number(&cleaned).map(Value::from)
    }

    fn literal_number(&self, text: &str) -> RunResult<Number> {
        for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
            if let Some(digits) = text.strip_prefix(prefix) {
                return BigInt::parse_bytes(digits.as_bytes(), radix)
                    .map(Number::from_bigint)
                    .ok_or_else(|| RuntimeError::value_error(format!("invalid literal '{text}'")));
            }
        }
        let integral = !text.contains(['.', 'e']);
        let mode = if integral { NumericMode::Exact } else { self.mode };
        Ok(Number::parse_literal(text, mode)?)
    }

    // ---- output --------------------------------------------------------

    fn write_stdout(&mut self, text: &str) {
        let limit = self.meter.limits().max_output_bytes;
        let room = limit.saturating_sub(self.stdout.len());
        if text.len() <= room {
            self.stdout.push_str(text);
            return;
        }
        let mut cut = room;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.stdout.push_str(&text[..cut]);
        self.stdout_truncated = true;
    }

    // ---- statements ----------------------------------------------------

    fn block(&mut self, stmts: &[Stmt], scope: &Scope) -> RunResult<Flow> {
        for stmt in stmts {
            match self.stmt(stmt, scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn stmt(&mut self, stmt: &Stmt, scope: &Scope) -> RunResult<Flow> {
        self.line = stmt.at.line;
        self.meter.tick()?;
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.eval(e, scope)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.read_target(target, scope)?;
                let rhs = self.eval(value, scope)?;
                if let (BinOp::Add, Value::List(items)) = (op, &current) {
                    let extra = self.iter_values(&rhs)?;
                    let mut items = items.borrow_mut();
                    items.extend(extra);
                    self.meter.check_len(items.len())?;
                    return Ok(Flow::Normal);
                }
                let combined = self.binary(*op, current, rhs)?;
                self.assign(target, combined, scope)?;
            }
            StmtKind::Import { module, alias } => {
                self.check_import(module)?;
                let (name, path) = match alias {
                    Some(alias) => (alias.clone(), module.clone()),
                    None => {
                        let head = module.split('.').next().unwrap_or(module).to_string();
                        (head.clone(), head)
                    }
                };
                scope.borrow_mut().vars.insert(name, Value::Module(path.into()));
            }
            StmtKind::ImportFrom {
                module,
                names,
                star,
            } => {
                self.check_import(module)?;
                let bindings: Vec<(String, String)> = if *star {
                    self.policy
                        .modules
                        .get(module)
                        .map(|rule| rule.symbols.iter().map(|s| (s.clone(), s.clone())).collect())
                        .unwrap_or_default()
                } else {
                    names
                        .iter()
                        .map(|(name, alias)| (name.clone(), alias.clone().unwrap_or_else(|| name.clone())))
                        .collect()
                };
                for (name, local) in bindings {
                    let value = self.module_attr(module, &name)?;
                    scope.borrow_mut().vars.insert(local, value);
                }
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test, scope)?.truthy()? {
                        return self.block(body, scope);
                    }
                }
                return self.block(orelse, scope);
            }
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter, scope)?;
                for item in self.iterate(&iterable)? {
                    self.meter.tick()?;
                    self.assign(target, item, scope)?;
                    match self.block(body, scope)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            StmtKind::While { test, body } => loop {
                self.meter.tick()?;
                if !self.eval(test, scope)?.truthy()? {
                    break;
                }
                match self.block(body, scope)? {
                    Flow::Break => break,
                    Flow::Normal | Flow::Continue => {}
                    ret @ Flow::Return(_) => return Ok(ret),
                }
            },
            StmtKind::FunctionDef(def) => {
                let closure = Closure {
                    body: Callable::Def(Arc::clone(def)),
                    scope: Rc::clone(scope),
                };
                scope
                    .borrow_mut()
                    .vars
                    .insert(def.name.clone(), Value::Function(Rc::new(closure)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(e) => self.eval(e, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Unsupported { construct } => {
                return Err(RuntimeError::type_error(format!("unsupported construct: {construct}")));
            }
        }
        Ok(Flow::Normal)
    }

    fn check_import(&self, module: &str) -> RunResult<()> {
        match self.policy.check_module(module) {
            Decision::Allowed => Ok(()),
            Decision::Denied(kind) => Err(RuntimeError::Import(format!(
                "import of '{module}' is not permitted ({kind})"
            ))),
        }
    }

    fn assign(&mut self, target: &Target, value: Value, scope: &Scope) -> RunResult<()> {
        match target {
            Target::Name(name, _) => {
                scope.borrow_mut().vars.insert(name.clone(), value);
                Ok(())
            }
            Target::Unpack(targets) => {
                let items = self.iter_values(&value)?;
                if items.len() != targets.len() {
                    return Err(RuntimeError::value_error(format!(
                        "expected {} values to unpack, got {}",
                        targets.len(),
                        items.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, scope)?;
                }
                Ok(())
            }
            Target::Subscript { object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                self.set_item(&object, index, value)
            }
        }
    }

    fn read_target(&mut self, target: &Target, scope: &Scope) -> RunResult<Value> {
        match target {
            Target::Name(name, _) => self.lookup(name, scope),
            Target::Subscript { object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                self.get_item(&object, &index)
            }
            Target::Unpack(_) => Err(RuntimeError::type_error(
                "illegal expression for augmented assignment",
            )),
        }
    }

    // ---- names ---------------------------------------------------------

    fn lookup(&self, name: &str, scope: &Scope) -> RunResult<Value> {
        let mut current = Rc::clone(scope);
        loop {
            let parent = {
                let frame = current.borrow();
                if let Some(value) = frame.vars.get(name) {
                    return Ok(value.clone());
                }
                frame.parent.clone()
            };
            match parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        self.builtin_value(name)
            .ok_or_else(|| RuntimeError::Name(name.to_string()))
    }

    /// Builtin or prelude binding for a free name
    fn builtin_value(&self, name: &str) -> Option<Value> {
        if self.policy.denied_kind(name).is_some() {
            return None;
        }
        if self.policy.allows_builtin(name) {
            if let Some(native) = Native::builtin(name) {
                return Some(Value::Native(native));
            }
        }
        if self.policy.allows_prelude(name) {
            return self.sympy_attr(name);
        }
        None
    }

    fn sympy_attr(&self, name: &str) -> Option<Value> {
        let constant = match name {
            "pi" => Constant::Pi,
            "E" => Constant::E,
            "I" => Constant::I,
            "oo" => Constant::Infinity,
            other => return Native::symbolic(other).map(Value::Native),
        };
        Some(self.constant(constant, self.mode))
    }

    fn module_attr(&self, path: &str, name: &str) -> RunResult<Value> {
        if let Decision::Denied(kind) = self.policy.check_module_symbol(path, name) {
            return Err(RuntimeError::Attribute(format!(
                "module '{path}' attribute '{name}' is not permitted ({kind})"
            )));
        }
        let nested = format!("{path}.{name}");
        if self.policy.check_module(&nested).is_allowed() {
            return Ok(Value::Module(nested.into()));
        }
        let numeric = self.mode.approximate();
        let value = match (path, name) {
            ("sympy", _) => self.sympy_attr(name),
            (_, "pi") => Some(self.constant(Constant::Pi, numeric)),
            (_, "e") => Some(self.constant(Constant::E, numeric)),
            (_, "inf") => Some(Value::from(Number::Float(f64::INFINITY))),
            _ => Native::from_module(path, name).map(Value::Native),
        };
        value.ok_or_else(|| RuntimeError::Attribute(format!("module '{path}' has no attribute '{name}'")))
    }

    // ---- expressions ---------------------------------------------------

    fn eval(&mut self, expr: &Expression, scope: &Scope) -> RunResult<Value> {
        self.meter.tick()?;
        match &expr.kind {
            ExprKind::Number(text) => self.literal(text),
            ExprKind::Str(text) => Ok(Value::from(text.as_str())),
            ExprKind::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FPart::Literal(text) => out.push_str(text),
                        FPart::Value { expr, spec } => {
                            let value = self.eval(expr, scope)?;
                            let max_width = self.meter.limits().max_collection_len;
                            out.push_str(&format::format_value(
                                &value,
                                spec.as_deref().unwrap_or(""),
                                max_width,
                            )?);
                        }
                    }
                    self.meter.check_len(out.len())?;
                }
                Ok(Value::from(out))
            }
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::None => Ok(Value::None),
            ExprKind::Name(name) => self.lookup(name, scope),
            ExprKind::Attribute { object, name } => {
                let object = self.eval(object, scope)?;
                self.attribute(object, name)
            }
            ExprKind::Subscript { object, index } => {
                let object = self.eval(object, scope)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let mut bound = |e: &Option<Box<Expression>>| -> RunResult<Option<i64>> {
                        match e {
                            None => Ok(None),
                            Some(e) => {
                                let v = self.eval(e, scope)?;
                                if v.is_none() {
                                    Ok(None)
                                } else {
                                    v.expect_i64("slice index").map(Some)
                                }
                            }
                        }
                    };
                    let (lower, upper, step) = (bound(lower)?, bound(upper)?, bound(step)?);
                    return self.slice(&object, lower, upper, step);
                }
                let index = self.eval(index, scope)?;
                self.get_item(&object, &index)
            }
            ExprKind::Slice { .. } => Err(RuntimeError::type_error(
                "slices are only supported as a single subscript",
            )),
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                let func = self.eval(func, scope)?;
                let mut positional = Vec::with_capacity(args.len());
                for arg in args {
                    positional.push(self.eval(arg, scope)?);
                }
                let mut named = Vec::with_capacity(keywords.len());
                for (name, arg) in keywords {
                    named.push((name.clone(), self.eval(arg, scope)?));
                }
                self.call(func, positional, named)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy()?)),
                    UnaryOp::Neg => self.negate(value),
                    UnaryOp::Pos => match value {
                        Value::Bool(b) => Ok(Value::int(i64::from(b))),
                        v @ (Value::Expr(_) | Value::Array(_) | Value::Matrix(_)) => Ok(v),
                        other => Err(RuntimeError::type_error(format!(
                            "bad operand type for unary +: '{}'",
                            other.type_name()
                        ))),
                    },
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary(*op, left, right)
            }
            ExprKind::Logical { and, left, right } => {
                let left = self.eval(left, scope)?;
                if left.truthy()? != *and {
                    return Ok(left);
                }
                self.eval(right, scope)
            }
            ExprKind::Compare { left, rest } => {
                let mut lhs = self.eval(left, scope)?;
                for (op, right) in rest {
                    let rhs = self.eval(right, scope)?;
                    if !self.compare(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { body, test, orelse } => {
                if self.eval(test, scope)?.truthy()? {
                    self.eval(body, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                self.meter.check_len(items.len())?;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, scope)?);
                }
                Ok(if matches!(expr.kind, ExprKind::List(_)) {
                    Value::list(values)
                } else {
                    Value::tuple(values)
                })
            }
            ExprKind::Dict(pairs) => {
                let mut out: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.eval(key, scope)?;
                    let value = self.eval(value, scope)?;
                    ops::dict_insert(&mut out, key, value);
                }
                Ok(Value::dict(out))
            }
            ExprKind::Comprehension { element, clauses } => {
                let frame = self.new_frame(Some(Rc::clone(scope)));
                let mut out = Vec::new();
                self.comprehend(element, clauses, &frame, &mut out)?;
                Ok(Value::list(out))
            }
            ExprKind::Lambda { params, body } => Ok(Value::Function(Rc::new(Closure {
                body: Callable::Lambda {
                    params: params.clone(),
                    body: Arc::clone(body),
                },
                scope: Rc::clone(scope),
            }))),
            ExprKind::Unsupported { construct } => Err(RuntimeError::type_error(format!(
                "unsupported construct: {construct}"
            ))),
        }
    }

    fn comprehend(
        &mut self,
        element: &Expression,
        clauses: &[Clause],
        scope: &Scope,
        out: &mut Vec<Value>,
    ) -> RunResult<()> {
        match clauses.split_first() {
            None => {
                let value = self.eval(element, scope)?;
                out.push(value);
                self.meter.check_len(out.len())
            }
            Some((Clause::If(test), rest)) => {
                if self.eval(test, scope)?.truthy()? {
                    self.comprehend(element, rest, scope, out)
                } else {
                    Ok(())
                }
            }
            Some((Clause::For { target, iter }, rest)) => {
                let iterable = self.eval(iter, scope)?;
                for item in self.iterate(&iterable)? {
                    self.meter.tick()?;
                    self.assign(target, item, scope)?;
                    self.comprehend(element, rest, scope, out)?;
                }
                Ok(())
            }
        }
    }

    fn negate(&self, value: Value) -> RunResult<Value> {
        match value {
            Value::Bool(b) => Ok(Value::int(-i64::from(b))),
            Value::Expr(e) => Ok(Value::Expr(e.neg())),
            Value::Array(items) => Ok(Value::Array(Rc::new(items.iter().map(Expr::neg).collect()))),
            Value::Matrix(m) => Ok(Value::from(m.scale(&Expr::int(-1))?)),
            other => Err(RuntimeError::type_error(format!(
                "bad operand type for unary -: '{}'",
                other.type_name()
            ))),
        }
    }

    // ---- calls ---------------------------------------------------------

    pub(crate) fn call(
        &mut self,
        func: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<Value> {
        self.meter.tick()?;
        match func {
            Value::Function(closure) => self.call_closure(&closure, args, kwargs),
            Value::Native(native) => self.call_native(native, Args::new(native.name(), args, kwargs)),
            Value::Method(method) => {
                let BoundMethod { receiver, name } = &*method;
                self.call_method(receiver, name, Args::new(name.as_str(), args, kwargs))
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_closure(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<Value> {
        let max_depth = self.meter.limits().max_call_depth;
        if self.depth >= max_depth {
            return Err(RuntimeError::Recursion(max_depth));
        }
        let params = closure.params();
        let name = closure.name();
        if args.len() > params.len() {
            return Err(RuntimeError::type_error(format!(
                "{name}() takes {} positional arguments but {} were given",
                params.len(),
                args.len()
            )));
        }
        let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        slots.resize(params.len(), None);
        for (key, value) in kwargs {
            let Some(index) = params.iter().position(|p| p.name == key) else {
                return Err(RuntimeError::type_error(format!(
                    "{name}() got an unexpected keyword argument '{key}'"
                )));
            };
            if slots[index].is_some() {
                return Err(RuntimeError::type_error(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            slots[index] = Some(value);
        }
        let frame = self.new_frame(Some(Rc::clone(&closure.scope)));
        for (param, slot) in params.iter().zip(slots) {
            let value = match (slot, &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval(default, &closure.scope)?,
                (None, None) => {
                    return Err(RuntimeError::type_error(format!(
                        "{name}() missing required argument: '{}'",
                        param.name
                    )));
                }
            };
            frame.borrow_mut().vars.insert(param.name.clone(), value);
        }
        self.depth += 1;
        let result = match &closure.body {
            Callable::Def(def) => self.block(&def.body, &frame).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Value::None,
            }),
            Callable::Lambda { body, .. } => self.eval(body, &frame),
        };
        self.depth -= 1;
        result
    }

    /// Call `func` on a placeholder symbol to turn a numeric callback into
    /// an expression of one variable
    fn trace_callback(&mut self, func: &Value) -> RunResult<(Expr, String)> {
        match func {
            Value::Expr(e) => {
                let vars = e.free_symbols();
                let var = vars.into_iter().next().unwrap_or_else(|| TRACE_SYMBOL.to_string());
                Ok((e.clone(), var))
            }
            callable => {
                let traced = self.call(
                    callable.clone(),
                    vec![Value::Expr(Expr::symbol(TRACE_SYMBOL))],
                    Vec::new(),
                )?;
                Ok((traced.expect_expr("callback result")?, TRACE_SYMBOL.to_string()))
            }
        }
    }

    // ---- iteration -----------------------------------------------------

    fn iterate(&self, value: &Value) -> RunResult<Box<dyn Iterator<Item = Value>>> {
        if let Value::Range { start, stop, step } = *value {
            return Ok(Box::new(
                crate::value::range_items(start, stop, step).map(Value::int),
            ));
        }
        Ok(Box::new(self.iter_values(value)?.into_iter()))
    }

    /// Materialised items of an iterable
    fn iter_values(&self, value: &Value) -> RunResult<Vec<Value>> {
        Ok(match value {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.to_vec(),
            Value::Dict(pairs) => pairs.borrow().iter().map(|(k, _)| k.clone()).collect(),
            Value::Str(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
            Value::Range { start, stop, step } => {
                self.meter
                    .check_len(crate::value::range_len(*start, *stop, *step))?;
                crate::value::range_items(*start, *stop, *step)
                    .map(Value::int)
                    .collect()
            }
            Value::Array(items) => items.iter().cloned().map(Value::Expr).collect(),
            Value::Matrix(m) => m.entries().iter().cloned().map(Value::Expr).collect(),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )));
            }
        })
    }

    // ---- result contract -----------------------------------------------

    fn optional_text(value: Option<Value>, what: &str) -> RunResult<Option<String>> {
        match value {
            None | Some(Value::None) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.to_string())),
            Some(other) => Err(RuntimeError::type_error(format!(
                "{what} must be a string, not {}",
                other.type_name()
            ))),
        }
    }

    fn record_step(&mut self, mut args: Args) -> RunResult<Value> {
        let value = args.required(0, "value")?;
        let latex = Self::optional_text(args.optional(1, "latex"), "latex")?;
        let description = Self::optional_text(args.optional(2, "description"), "description")?;
        args.finish()?;
        self.meter.check_len(self.steps.len() + 1)?;
        let record = StepRecord {
            index: self.steps.len(),
            value: value.to_structured()?,
            latex,
            description,
        };
        trace!(index = record.index, kind = record.value.kind_name(), "step recorded");
        self.steps.push(record);
        Ok(Value::None)
    }

    fn record_plot(&mut self, mut args: Args) -> RunResult<Value> {
        let kind = args.required(0, "kind")?.expect_str("plot kind")?;
        let data = args.required(1, "expr")?.to_structured()?;
        let variable = match args.optional(2, "var") {
            None | Some(Value::None) => None,
            Some(Value::Expr(Expr::Sym(name))) => Some(name),
            Some(Value::Str(s)) => Some(s.to_string()),
            Some(other) => {
                return Err(RuntimeError::type_error(format!(
                    "plot variable must be a Symbol, not {}",
                    other.type_name()
                )));
            }
        };
        let domain = match args.optional(3, "domain") {
            None | Some(Value::None) => None,
            Some(bounds) => match self.iter_values(&bounds)?.as_slice() {
                [lo, hi] => Some((self.to_f64(lo)?, self.to_f64(hi)?)),
                _ => return Err(RuntimeError::value_error("plot domain must be a pair")),
            },
        };
        let title = Self::optional_text(args.optional(4, "title"), "title")?;
        args.finish()?;
        self.meter.check_len(self.plots.len() + 1)?;
        self.plots.push(PlotHandle {
            index: self.plots.len(),
            kind: kind.to_string(),
            data,
            variable,
            domain,
            title,
        });
        Ok(Value::None)
    }

    fn set_result(&mut self, mut args: Args) -> RunResult<Value> {
        let value = args.required(0, "value")?;
        let latex = Self::optional_text(args.optional(1, "latex"), "latex")?;
        args.finish()?;
        if self.result.is_some() {
            return Err(RuntimeError::ResultAlreadySet);
        }
        self.result = Some((value.to_structured()?, latex));
        Ok(Value::None)
    }

    /// Real value of a closed numeric value
    fn to_f64(&self, value: &Value) -> RunResult<f64> {
        let expr = value.expect_expr("value")?;
        Ok(eval_number(&expr, &BTreeMap::new(), NumericMode::Float)?.to_f64())
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        for frame in self.frames.drain(..).filter_map(|w| w.upgrade()) {
            let vars = std::mem::take(&mut frame.borrow_mut().vars);
            drop(vars);
        }
    }
}

fn math_of(err: RuntimeError) -> vs_math::MathError {
    match err {
        RuntimeError::Math(e) => e,
        other => vs_math::MathError::Unsupported(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::StructuredValue;
    use crate::parser::parse_program;
    use pretty_assertions::assert_eq;

    fn run_in(source: &str, mode: NumericMode) -> ExecutionOutcome {
        let program = parse_program(source).unwrap();
        execute(
            &program,
            CapabilityPolicy::shared_mathematics(),
            mode,
            ExecutionLimits::default(),
            AbortSignal::new(),
        )
    }

    fn run(source: &str) -> ExecutionOutcome {
        run_in(source, NumericMode::Exact)
    }

    fn result_text(source: &str) -> String {
        match run(source) {
            ExecutionOutcome::Success(s) => s.result.to_text(),
            ExecutionOutcome::Failure(f) => panic!("run failed: {}", f.message),
        }
    }

    fn failure(source: &str) -> (FailureKind, String) {
        match run(source) {
            ExecutionOutcome::Failure(f) => (f.kind, f.message),
            ExecutionOutcome::Success(s) => panic!("expected failure, got {}", s.result),
        }
    }

    #[test]
    fn arithmetic_stays_exact() {
        assert_eq!(result_text("set_result(1/3 + 1/6)"), "1/2");
        assert_eq!(result_text("set_result(2**10 // 3 % 7)"), "5");
        assert_eq!(result_text("set_result(0.1 + 0.2)"), "3/10");
    }

    #[test]
    fn float_mode_divides_numerically() {
        let ExecutionOutcome::Success(s) = run_in("set_result(1/4)", NumericMode::Float) else {
            panic!("expected success");
        };
        assert_eq!(s.result, StructuredValue::Expression(Expr::Num(Number::Float(0.25))));
    }

    #[test]
    fn functions_closures_and_loops() {
        let source = "\
def make_adder(n):
    return lambda v: v + n
add3 = make_adder(3)
total = 0
for k in range(5):
    if k == 3:
        continue
    total += add3(k)
squares = [k * k for k in range(4) if k % 2 == 0]
set_result((total, squares))
";
        assert_eq!(result_text(source), "[19, [0, 4]]");
    }

    #[test]
    fn steps_preserve_order() {
        let source = "\
for k in range(3):
    record_step(k, description=f'step {k}')
set_result('done')
";
        let ExecutionOutcome::Success(s) = run(source) else {
            panic!("expected success");
        };
        let indices: Vec<usize> = s.steps.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(s.steps[2].description.as_deref(), Some("step 2"));
    }

    #[test]
    fn result_is_write_once() {
        let (kind, message) = failure("set_result(1)\nset_result(2)\n");
        assert_eq!(kind, FailureKind::Runtime);
        assert!(message.starts_with("line 2:"), "{message}");
    }

    #[test]
    fn missing_result() {
        let (kind, _) = failure("x = 1\n");
        assert_eq!(kind, FailureKind::MissingResult);
    }

    #[test]
    fn runtime_errors_carry_line() {
        let (kind, message) = failure("x = 1\ny = x / 0\nset_result(y)\n");
        assert_eq!(kind, FailureKind::Runtime);
        assert!(message.contains("line 2"), "{message}");
        assert!(message.contains("ZeroDivisionError"), "{message}");
    }

    #[test]
    fn infinite_loop_exhausts_budget() {
        let program = parse_program("while True:\n    pass\n").unwrap();
        let outcome = execute(
            &program,
            CapabilityPolicy::shared_mathematics(),
            NumericMode::Exact,
            ExecutionLimits::default().with_max_operations(10_000),
            AbortSignal::new(),
        );
        assert_eq!(outcome.failure_info().map(|f| f.kind), Some(FailureKind::Timeout));
    }

    #[test]
    fn recursion_is_bounded() {
        let (kind, message) = failure("def f(n):\n    return f(n + 1)\nset_result(f(0))\n");
        assert_eq!(kind, FailureKind::Runtime);
        assert!(message.contains("RecursionError"), "{message}");
    }

    #[test]
    fn print_is_captured() {
        let ExecutionOutcome::Success(s) = run("print('a', 1, sep='-')\nset_result(None)\n") else {
            panic!("expected success");
        };
        assert_eq!(s.stdout, "a-1\n");
    }

    #[test]
    fn module_aliases_resolve() {
        let source = "\
import math
import numpy as np
from sympy import Rational as R
set_result([math.floor(2.5), np.sum([1, 2, 3]), R(2, 4)])
";
        assert_eq!(result_text(source), "[2, 6, 1/2]");
    }
}
