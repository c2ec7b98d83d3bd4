//! Static validation of candidate programs
//!
//! The validator parses a [`CandidateSource`] and walks the tree before
//! anything runs, rejecting the first construct (in source order) that:
//! - imports a module outside the allow-list
//! - references a denied builtin, directly, through an attribute or via
//!   an alias
//! - evaluates strings as code or computes an import
//! - touches files, sockets or processes
//! - uses a language feature the interpreter does not execute
//!
//! Free names must resolve to something the program binds or to an
//! allowed builtin; anything else is rejected.
//!
//! Only [`StaticValidator`] can mint a [`ValidatedSource`], and only a
//! `ValidatedSource` can be run.

use crate::ast::{Clause, ExprKind, Expression, FPart, Location, Program, Stmt, StmtKind, Target};
use crate::parser::parse_program;
use crate::policy::{CapabilityPolicy, Decision, ViolationKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// blake3 digest of a candidate's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash source text
    #[must_use]
    pub fn of(text: &str) -> Self {
        Self(*blake3::hash(text.as_bytes()).as_bytes())
    }

    /// Raw digest bytes
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 12 hex digits, for logs
    #[must_use]
    pub fn short(&self) -> String {
        self.0[..6].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Program text proposed for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSource {
    text: Arc<str>,
    fingerprint: Fingerprint,
}

impl CandidateSource {
    /// Wrap source text
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text: String = text.into();
        let fingerprint = Fingerprint::of(&text);
        Self {
            text: text.into(),
            fingerprint,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Candidate that passed validation; the only input the runner accepts
#[derive(Debug, Clone)]
pub struct ValidatedSource {
    source: CandidateSource,
    program: Arc<Program>,
}

impl ValidatedSource {
    #[inline]
    #[must_use]
    pub fn source(&self) -> &CandidateSource {
        &self.source
    }

    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.source.fingerprint
    }

    pub(crate) fn program(&self) -> Arc<Program> {
        Arc::clone(&self.program)
    }
}

impl PartialEq for ValidatedSource {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Why and where a candidate was rejected
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: ViolationKind,
    /// Offending name, module or construct
    pub construct: String,
    pub at: Location,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' at {}", self.kind, self.construct, self.at)
    }
}

/// Result of validating one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationVerdict {
    Accepted(ValidatedSource),
    Rejected(Rejection),
}

impl ValidationVerdict {
    #[inline]
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Rejection details, if rejected
    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(r) => Some(r),
        }
    }
}

/// Parses and checks candidates against a [`CapabilityPolicy`]
#[derive(Debug, Clone)]
pub struct StaticValidator {
    policy: Arc<CapabilityPolicy>,
}

impl StaticValidator {
    /// Create validator for policy
    #[inline]
    #[must_use]
    pub fn new(policy: Arc<CapabilityPolicy>) -> Self {
        Self { policy }
    }

    #[inline]
    #[must_use]
    pub fn policy(&self) -> &Arc<CapabilityPolicy> {
        &self.policy
    }

    /// Validate a candidate; pure function of policy and text
    #[must_use]
    pub fn validate(&self, candidate: &CandidateSource) -> ValidationVerdict {
        let program = match parse_program(candidate.as_str()) {
            Ok(program) => program,
            Err(issue) => {
                return ValidationVerdict::Rejected(Rejection {
                    kind: ViolationKind::SyntaxError,
                    construct: issue.construct,
                    at: issue.at,
                });
            }
        };
        let mut scan = Scan::new(&self.policy, &program);
        match scan.block(&program.body) {
            Ok(()) => {
                debug!(fingerprint = %candidate.fingerprint().short(), "candidate accepted");
                ValidationVerdict::Accepted(ValidatedSource {
                    source: candidate.clone(),
                    program: Arc::new(program),
                })
            }
            Err(rejection) => {
                debug!(
                    fingerprint = %candidate.fingerprint().short(),
                    kind = %rejection.kind,
                    construct = %rejection.construct,
                    "candidate rejected"
                );
                ValidationVerdict::Rejected(rejection)
            }
        }
    }
}

type Checked = Result<(), Rejection>;

fn reject(kind: ViolationKind, construct: impl Into<String>, at: Location) -> Checked {
    Err(Rejection {
        kind,
        construct: construct.into(),
        at,
    })
}

/// Walks a program in source order
struct Scan<'a> {
    policy: &'a CapabilityPolicy,
    /// Every name the program binds anywhere
    bound: HashSet<String>,
    /// Local alias -> module path, for names bound by imports
    modules: HashMap<String, String>,
}

impl<'a> Scan<'a> {
    fn new(policy: &'a CapabilityPolicy, program: &Program) -> Self {
        let mut bound = HashSet::new();
        collect_block(&program.body, &mut bound);
        Self {
            policy,
            bound,
            modules: HashMap::new(),
        }
    }

    fn binding(&self, name: &str, at: Location) -> Checked {
        match self.policy.denied_kind(name) {
            Some(kind) => reject(kind, name, at),
            None => Ok(()),
        }
    }

    fn block(&mut self, stmts: &[Stmt]) -> Checked {
        stmts.iter().try_for_each(|s| self.stmt(s))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Checked {
        let at = stmt.at;
        match &stmt.kind {
            StmtKind::Expr(e) => self.expr(e),
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    self.target(target)?;
                }
                self.expr(value)
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.target(target)?;
                self.expr(value)
            }
            StmtKind::Import { module, alias } => {
                if let Decision::Denied(kind) = self.policy.check_module(module) {
                    return reject(kind, module, at);
                }
                match alias {
                    Some(alias) => {
                        self.binding(alias, at)?;
                        self.modules.insert(alias.clone(), module.clone());
                    }
                    None => {
                        let head = module.split('.').next().unwrap_or(module);
                        self.modules.insert(head.to_string(), head.to_string());
                    }
                }
                Ok(())
            }
            StmtKind::ImportFrom {
                module,
                names,
                star,
            } => {
                if let Decision::Denied(kind) = self.policy.check_module(module) {
                    return reject(kind, module, at);
                }
                if *star {
                    let symbols = self
                        .policy
                        .modules
                        .get(module)
                        .map(|rule| rule.symbols.iter().cloned().collect::<Vec<_>>())
                        .unwrap_or_default();
                    for name in symbols {
                        let path = format!("{module}.{name}");
                        if self.policy.check_module(&path).is_allowed() {
                            self.modules.insert(name.clone(), path);
                        }
                        self.bound.insert(name);
                    }
                    return Ok(());
                }
                for (name, alias) in names {
                    if let Decision::Denied(kind) = self.policy.check_module_symbol(module, name) {
                        return reject(kind, format!("{module}.{name}"), at);
                    }
                    let local = alias.as_ref().unwrap_or(name);
                    self.binding(local, at)?;
                    let path = format!("{module}.{name}");
                    if self.policy.check_module(&path).is_allowed() {
                        self.modules.insert(local.clone(), path);
                    }
                }
                Ok(())
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    self.expr(test)?;
                    self.block(body)?;
                }
                self.block(orelse)
            }
            StmtKind::For { target, iter, body } => {
                self.target(target)?;
                self.expr(iter)?;
                self.block(body)
            }
            StmtKind::While { test, body } => {
                self.expr(test)?;
                self.block(body)
            }
            StmtKind::FunctionDef(def) => {
                self.binding(&def.name, at)?;
                for param in &def.params {
                    self.binding(&param.name, param.at)?;
                    if let Some(default) = &param.default {
                        self.expr(default)?;
                    }
                }
                self.block(&def.body)
            }
            StmtKind::Return(value) => value.as_ref().map_or(Ok(()), |v| self.expr(v)),
            StmtKind::Break | StmtKind::Continue | StmtKind::Pass => Ok(()),
            StmtKind::Unsupported { construct } => {
                reject(ViolationKind::UnsupportedConstruct, construct, at)
            }
        }
    }

    fn target(&mut self, target: &Target) -> Checked {
        match target {
            Target::Name(name, at) => self.binding(name, *at),
            Target::Unpack(items) => items.iter().try_for_each(|t| self.target(t)),
            Target::Subscript { object, index } => {
                self.expr(object)?;
                self.expr(index)
            }
        }
    }

    /// Module path an expression denotes, when it is an import alias chain
    fn module_path(&self, expr: &Expression) -> Option<String> {
        match &expr.kind {
            ExprKind::Name(name) => self.modules.get(name).cloned(),
            ExprKind::Attribute { object, name } => {
                let path = format!("{}.{name}", self.module_path(object)?);
                self.policy.check_module(&path).is_allowed().then_some(path)
            }
            _ => None,
        }
    }

    fn name(&self, name: &str, at: Location) -> Checked {
        if let Some(kind) = self.policy.denied_kind(name) {
            return reject(kind, name, at);
        }
        if self.bound.contains(name) || self.modules.contains_key(name) {
            return Ok(());
        }
        match self.policy.check_name(name) {
            Decision::Allowed => Ok(()),
            Decision::Denied(kind) => reject(kind, name, at),
        }
    }

    fn expr(&mut self, expr: &Expression) -> Checked {
        let at = expr.at;
        match &expr.kind {
            ExprKind::Number(_) | ExprKind::Str(_) | ExprKind::Bool(_) | ExprKind::None => Ok(()),
            ExprKind::FString(parts) => parts.iter().try_for_each(|p| match p {
                FPart::Literal(_) => Ok(()),
                FPart::Value { expr, .. } => self.expr(expr),
            }),
            ExprKind::Name(name) => self.name(name, at),
            ExprKind::Attribute { object, name } => {
                self.expr(object)?;
                if let Some(kind) = self.policy.denied_kind(name) {
                    return reject(kind, name, at);
                }
                if let Some(path) = self.module_path(object) {
                    if let Decision::Denied(kind) = self.policy.check_module_symbol(&path, name) {
                        return reject(kind, format!("{path}.{name}"), at);
                    }
                }
                Ok(())
            }
            ExprKind::Subscript { object, index } => {
                self.expr(object)?;
                self.expr(index)
            }
            ExprKind::Slice { lower, upper, step } => [lower, upper, step]
                .into_iter()
                .flatten()
                .try_for_each(|e| self.expr(e)),
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                self.expr(func)?;
                for arg in args {
                    self.expr(arg)?;
                }
                for (_, value) in keywords {
                    self.expr(value)?;
                }
                Ok(())
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            ExprKind::Compare { left, rest } => {
                self.expr(left)?;
                rest.iter().try_for_each(|(_, e)| self.expr(e))
            }
            ExprKind::IfExp { body, test, orelse } => {
                self.expr(body)?;
                self.expr(test)?;
                self.expr(orelse)
            }
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                items.iter().try_for_each(|e| self.expr(e))
            }
            ExprKind::Dict(pairs) => pairs.iter().try_for_each(|(k, v)| {
                self.expr(k)?;
                self.expr(v)
            }),
            ExprKind::Comprehension { element, clauses } => {
                // clauses precede the element in evaluation order
                for clause in clauses {
                    match clause {
                        Clause::For { target, iter } => {
                            self.expr(iter)?;
                            self.target(target)?;
                        }
                        Clause::If(test) => self.expr(test)?,
                    }
                }
                self.expr(element)
            }
            ExprKind::Lambda { params, body } => {
                for param in params {
                    self.binding(&param.name, param.at)?;
                    if let Some(default) = &param.default {
                        self.expr(default)?;
                    }
                }
                self.expr(body)
            }
            ExprKind::Unsupported { construct } => {
                reject(ViolationKind::UnsupportedConstruct, construct, at)
            }
        }
    }
}

fn collect_block(stmts: &[Stmt], out: &mut HashSet<String>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    collect_target(target, out);
                }
                collect_expr(value, out);
            }
            StmtKind::AugAssign { target, value, .. } => {
                collect_target(target, out);
                collect_expr(value, out);
            }
            StmtKind::ImportFrom { names, .. } => {
                for (name, alias) in names {
                    out.insert(alias.clone().unwrap_or_else(|| name.clone()));
                }
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    collect_expr(test, out);
                    collect_block(body, out);
                }
                collect_block(orelse, out);
            }
            StmtKind::For { target, iter, body } => {
                collect_target(target, out);
                collect_expr(iter, out);
                collect_block(body, out);
            }
            StmtKind::While { test, body } => {
                collect_expr(test, out);
                collect_block(body, out);
            }
            StmtKind::FunctionDef(def) => {
                out.insert(def.name.clone());
                for param in &def.params {
                    out.insert(param.name.clone());
                }
                collect_block(&def.body, out);
            }
            StmtKind::Expr(e) | StmtKind::Return(Some(e)) => collect_expr(e, out),
            _ => {}
        }
    }
}

fn collect_target(target: &Target, out: &mut HashSet<String>) {
    let mut names = Vec::new();
    target.bound_names(&mut names);
    out.extend(names.into_iter().map(|(n, _)| n));
}

/// Names bound inside expressions (comprehension variables, lambda params)
fn collect_expr(expr: &Expression, out: &mut HashSet<String>) {
    match &expr.kind {
        ExprKind::Comprehension { element, clauses } => {
            for clause in clauses {
                match clause {
                    Clause::For { target, iter } => {
                        collect_target(target, out);
                        collect_expr(iter, out);
                    }
                    Clause::If(test) => collect_expr(test, out),
                }
            }
            collect_expr(element, out);
        }
        ExprKind::Lambda { params, body } => {
            out.extend(params.iter().map(|p| p.name.clone()));
            collect_expr(body, out);
        }
        ExprKind::Call { func, args, keywords } => {
            collect_expr(func, out);
            args.iter().for_each(|a| collect_expr(a, out));
            keywords.iter().for_each(|(_, v)| collect_expr(v, out));
        }
        ExprKind::Attribute { object, .. } => collect_expr(object, out),
        ExprKind::Subscript { object, index } => {
            collect_expr(object, out);
            collect_expr(index, out);
        }
        ExprKind::Unary { operand, .. } => collect_expr(operand, out),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            collect_expr(left, out);
            collect_expr(right, out);
        }
        ExprKind::Compare { left, rest } => {
            collect_expr(left, out);
            rest.iter().for_each(|(_, e)| collect_expr(e, out));
        }
        ExprKind::IfExp { body, test, orelse } => {
            collect_expr(body, out);
            collect_expr(test, out);
            collect_expr(orelse, out);
        }
        ExprKind::List(items) | ExprKind::Tuple(items) => {
            items.iter().for_each(|e| collect_expr(e, out));
        }
        ExprKind::Dict(pairs) => pairs.iter().for_each(|(k, v)| {
            collect_expr(k, out);
            collect_expr(v, out);
        }),
        ExprKind::FString(parts) => {
            for part in parts {
                if let FPart::Value { expr, .. } = part {
                    collect_expr(expr, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validate(source: &str) -> ValidationVerdict {
        StaticValidator::new(CapabilityPolicy::shared_mathematics())
            .validate(&CandidateSource::new(source))
    }

    fn rejected(source: &str) -> Rejection {
        match validate(source) {
            ValidationVerdict::Rejected(r) => r,
            ValidationVerdict::Accepted(_) => panic!("expected rejection for {source:?}"),
        }
    }

    #[test]
    fn accepts_plain_solver() {
        let source = "\
from sympy import Symbol, integrate
x = Symbol('x')
area = integrate(x**2, (x, 0, 1))
record_step(area)
set_result(area)
";
        assert!(validate(source).is_accepted());
    }

    #[test]
    fn rejects_disallowed_import() {
        let r = rejected("import os\nset_result(1)\n");
        assert_eq!(r.kind, ViolationKind::DisallowedImport);
        assert_eq!(r.construct, "os");
        assert_eq!(r.at, Location { line: 1, column: 8 });
    }

    #[test]
    fn rejects_denied_builtin_through_alias() {
        let r = rejected("f = eval\nset_result(f('1+1'))\n");
        assert_eq!(r.kind, ViolationKind::DynamicEvaluation);
        assert_eq!(r.at.line, 1);
    }

    #[test]
    fn rejects_denied_module_symbol() {
        let r = rejected("import sympy as sp\nv = sp.sympify('x')\n");
        assert_eq!(r.kind, ViolationKind::DynamicEvaluation);
        assert_eq!(r.construct, "sympify");
        let r = rejected("from sympy import parse_expr\n");
        assert_eq!(r.kind, ViolationKind::DynamicEvaluation);
    }

    #[test]
    fn rejects_unlisted_module_symbol() {
        let r = rejected("import math\nv = math.frexp(2.0)\n");
        assert_eq!(r.kind, ViolationKind::UnlistedSymbol);
        assert_eq!(r.construct, "math.frexp");
    }

    #[test]
    fn rejects_reflection() {
        let r = rejected("x = (1).__class__\n");
        assert_eq!(r.kind, ViolationKind::Reflection);
        let r = rejected("g = globals()\n");
        assert_eq!(r.kind, ViolationKind::Reflection);
    }

    #[test]
    fn rejects_file_and_process_access() {
        assert_eq!(rejected("open('x.txt')").kind, ViolationKind::FilesystemAccess);
        assert_eq!(rejected("exit(0)").kind, ViolationKind::ProcessAccess);
        assert_eq!(
            rejected("import numpy as np\nnp.load('a.npy')\n").kind,
            ViolationKind::FilesystemAccess
        );
    }

    #[test]
    fn rejects_computed_import() {
        let r = rejected("m = __import__('os')\n");
        assert_eq!(r.kind, ViolationKind::DynamicEvaluation);
        let r = rejected("import importlib\n");
        assert_eq!(r.kind, ViolationKind::ComputedImport);
    }

    #[test]
    fn rejects_unknown_free_names() {
        let r = rejected("set_result(frozenset([1]))\n");
        assert_eq!(r.kind, ViolationKind::UnlistedSymbol);
        assert_eq!(r.construct, "frozenset");
    }

    #[test]
    fn first_violation_in_source_order() {
        let r = rejected("import os\nclass A:\n    pass\n");
        assert_eq!(r.kind, ViolationKind::DisallowedImport);
        let r = rejected("class A:\n    pass\nimport os\n");
        assert_eq!(r.kind, ViolationKind::UnsupportedConstruct);
    }

    #[test]
    fn syntax_errors_are_rejections() {
        assert_eq!(rejected("def f(:\n").kind, ViolationKind::SyntaxError);
    }

    #[test]
    fn names_bound_later_are_not_free() {
        let source = "\
def square(v):
    return v * v
total = 0
for k in range(3):
    total += square(k)
set_result(total)
";
        assert!(validate(source).is_accepted());
    }

    #[test]
    fn star_import_binds_the_allowed_symbols() {
        assert!(validate("from sympy import *\nset_result(Integer(3))\n").is_accepted());
        let r = rejected("from math import *\nset_result(frexp(2.0))\n");
        assert_eq!(r.kind, ViolationKind::UnlistedSymbol);
        assert_eq!(r.construct, "frexp");
    }

    #[test]
    fn validation_is_deterministic() {
        let source = "import socket\n";
        assert_eq!(validate(source), validate(source));
    }
}
