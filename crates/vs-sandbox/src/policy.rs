//! Capability policy
//!
//! Declarative allow/deny rules answering whether a candidate program may
//! reference a module, a module symbol or a bare name:
//! - modules and their symbols are allow-listed explicitly
//! - process-affecting names are deny-listed with the kind of violation
//! - anything not explicitly allowed is denied
//!
//! The policy is plain data. It is shared read-only behind an `Arc` by the
//! validator and the interpreter.

use crate::error::PolicyError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Why a construct is not allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Source does not parse
    SyntaxError,
    /// Import of a module outside the allow-list
    DisallowedImport,
    /// Reference to a builtin the policy denies
    DeniedBuiltin,
    /// Compiling or evaluating strings as code
    DynamicEvaluation,
    /// Opening or touching files
    FilesystemAccess,
    /// Opening sockets or URLs
    NetworkAccess,
    /// Spawning, signalling or exiting processes
    ProcessAccess,
    /// Introspection that could reach interpreter internals
    Reflection,
    /// Name or module symbol absent from every allow-list
    UnlistedSymbol,
    /// Language construct the sandbox does not execute
    UnsupportedConstruct,
    /// Import through a computed module name
    ComputedImport,
}

impl ViolationKind {
    /// Stable snake-case label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SyntaxError => "syntax_error",
            Self::DisallowedImport => "disallowed_import",
            Self::DeniedBuiltin => "denied_builtin",
            Self::DynamicEvaluation => "dynamic_evaluation",
            Self::FilesystemAccess => "filesystem_access",
            Self::NetworkAccess => "network_access",
            Self::ProcessAccess => "process_access",
            Self::Reflection => "reflection",
            Self::UnlistedSymbol => "unlisted_symbol",
            Self::UnsupportedConstruct => "unsupported_construct",
            Self::ComputedImport => "computed_import",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a policy lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Reference may appear in the program
    Allowed,
    /// Reference is rejected for the given reason
    Denied(ViolationKind),
}

impl Decision {
    #[inline]
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Symbols importable from one module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRule {
    /// Attribute names the program may reference on the module
    #[serde(default)]
    pub symbols: BTreeSet<String>,
}

impl ModuleRule {
    fn of(symbols: &[&str]) -> Self {
        Self {
            symbols: symbols.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Allow/deny rules for candidate programs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityPolicy {
    /// Importable modules keyed by dotted path
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleRule>,
    /// Builtins bound in every program's namespace
    #[serde(default)]
    pub builtins: BTreeSet<String>,
    /// Mathematics names pre-bound without an import
    #[serde(default)]
    pub prelude: BTreeSet<String>,
    /// Names rejected wherever they appear, with the violation they raise
    #[serde(default)]
    pub denied: BTreeMap<String, ViolationKind>,
}

/// Names a sandboxed program may use to report its work
pub const CONTRACT_BUILTINS: [&str; 3] = ["record_step", "record_plot", "set_result"];

const ELEMENTARY: [&str; 9] = ["sqrt", "sin", "cos", "tan", "asin", "acos", "atan", "exp", "log"];

const DYNAMIC_EVALUATION: [&str; 9] = [
    "eval", "exec", "compile", "sympify", "parse_expr", "lambdify", "__import__", "execfile",
    "runpy",
];

const FILESYSTEM_ACCESS: [&str; 22] = [
    "open", "file", "remove", "unlink", "rmdir", "mkdir", "makedirs", "listdir", "scandir",
    "walk", "rename", "chmod", "read_text", "write_text", "read_bytes", "write_bytes", "load",
    "save", "loadtxt", "savetxt", "fromfile", "tofile",
];

const NETWORK_ACCESS: [&str; 7] = [
    "socket", "urlopen", "request", "connect", "create_connection", "urlretrieve", "http",
];

const PROCESS_ACCESS: [&str; 13] = [
    "os", "sys", "subprocess", "system", "popen", "spawn", "fork", "kill", "exit", "quit",
    "input", "breakpoint", "signal",
];

const REFLECTION: [&str; 12] = [
    "getattr", "setattr", "delattr", "hasattr", "globals", "locals", "vars", "type", "dir",
    "object", "inspect", "builtins",
];

const COMPUTED_IMPORT: [&str; 4] = ["importlib", "import_module", "find_spec", "load_module"];

const DENIED_BUILTINS: [&str; 9] = [
    "help", "memoryview", "bytearray", "classmethod", "staticmethod", "property", "super", "id",
    "open_code",
];

static MATHEMATICS: Lazy<Arc<CapabilityPolicy>> =
    Lazy::new(|| Arc::new(CapabilityPolicy::mathematics()));

impl CapabilityPolicy {
    /// Built-in policy for mathematics solvers
    #[must_use]
    pub fn mathematics() -> Self {
        let mut modules = BTreeMap::new();
        let mut math: Vec<&str> = ELEMENTARY.to_vec();
        math.extend([
            "pi", "e", "inf", "fabs", "floor", "ceil", "factorial", "gcd", "hypot", "pow",
            "radians", "degrees", "isclose", "log10", "log2", "comb",
        ]);
        modules.insert("math".to_string(), ModuleRule::of(&math));

        let mut sympy: Vec<&str> = ELEMENTARY.to_vec();
        sympy.extend([
            "Symbol", "symbols", "Rational", "Integer", "Float", "Abs", "pi", "E", "I", "oo",
            "Matrix", "eye", "zeros", "integrate", "diff", "limit", "solve", "simplify",
            "expand", "factor", "summation", "latex", "N", "Eq", "roots", "nsimplify",
        ]);
        modules.insert("sympy".to_string(), ModuleRule::of(&sympy));

        let mut numpy: Vec<&str> = ELEMENTARY.to_vec();
        numpy.extend([
            "array", "pi", "e", "abs", "linspace", "arange", "dot", "zeros", "eye", "sum",
            "mean", "isclose", "round", "linalg", "trapz",
        ]);
        modules.insert("numpy".to_string(), ModuleRule::of(&numpy));
        modules.insert(
            "numpy.linalg".to_string(),
            ModuleRule::of(&["det", "inv", "solve", "norm"]),
        );

        let mut mpmath: Vec<&str> = ELEMENTARY.to_vec();
        mpmath.extend(["mpf", "pi", "e", "quad", "limit", "diff", "nstr"]);
        modules.insert("mpmath".to_string(), ModuleRule::of(&mpmath));

        modules.insert("fractions".to_string(), ModuleRule::of(&["Fraction"]));

        let builtins = [
            "abs", "min", "max", "len", "range", "sum", "round", "int", "float", "str", "bool",
            "list", "tuple", "dict", "enumerate", "zip", "sorted", "reversed", "print",
            "isinstance", "all", "any", "map", "filter", "pow",
        ]
        .iter()
        .chain(CONTRACT_BUILTINS.iter())
        .map(|s| (*s).to_string())
        .collect();

        let mut prelude: Vec<&str> = ELEMENTARY.to_vec();
        prelude.extend([
            "Rational", "Symbol", "symbols", "pi", "E", "I", "oo", "Matrix", "integrate", "diff",
            "limit", "solve", "simplify", "expand", "factor", "summation", "latex", "N", "Eq",
            "Abs",
        ]);
        let prelude = prelude.into_iter().map(str::to_string).collect();

        let mut denied = BTreeMap::new();
        let groups: [(&[&str], ViolationKind); 7] = [
            (&DYNAMIC_EVALUATION, ViolationKind::DynamicEvaluation),
            (&FILESYSTEM_ACCESS, ViolationKind::FilesystemAccess),
            (&NETWORK_ACCESS, ViolationKind::NetworkAccess),
            (&PROCESS_ACCESS, ViolationKind::ProcessAccess),
            (&REFLECTION, ViolationKind::Reflection),
            (&COMPUTED_IMPORT, ViolationKind::ComputedImport),
            (&DENIED_BUILTINS, ViolationKind::DeniedBuiltin),
        ];
        for (names, kind) in groups {
            for name in names {
                denied.insert((*name).to_string(), kind);
            }
        }

        Self {
            modules,
            builtins,
            prelude,
            denied,
        }
    }

    /// Process-wide shared copy of [`CapabilityPolicy::mathematics`]
    #[must_use]
    pub fn shared_mathematics() -> Arc<Self> {
        Arc::clone(&MATHEMATICS)
    }

    /// Load a policy from TOML and check it for contradictions
    pub fn from_toml_str(text: &str) -> Result<Self, PolicyError> {
        let policy: Self = toml::from_str(text)?;
        policy.check()?;
        Ok(policy)
    }

    /// Reject policies that allow and deny the same name
    pub fn check(&self) -> Result<(), PolicyError> {
        for path in self.modules.keys() {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(PolicyError::InvalidModule(path.clone()));
            }
        }
        let allowed = self
            .builtins
            .iter()
            .chain(&self.prelude)
            .chain(self.modules.values().flat_map(|rule| &rule.symbols));
        for name in allowed {
            if self.denied.contains_key(name) {
                return Err(PolicyError::Contradiction(name.clone()));
            }
        }
        Ok(())
    }

    /// Violation raised by `name` wherever it appears, if any.
    ///
    /// Dunder names are always reflection.
    #[must_use]
    pub fn denied_kind(&self, name: &str) -> Option<ViolationKind> {
        if let Some(kind) = self.denied.get(name) {
            return Some(*kind);
        }
        (name.len() > 4 && name.starts_with("__") && name.ends_with("__"))
            .then_some(ViolationKind::Reflection)
    }

    /// Whether `path` is an importable module
    #[must_use]
    pub fn check_module(&self, path: &str) -> Decision {
        if let Some(kind) = path.split('.').find_map(|part| self.denied_kind(part)) {
            return Decision::Denied(if kind == ViolationKind::ProcessAccess {
                ViolationKind::DisallowedImport
            } else {
                kind
            });
        }
        if self.modules.contains_key(path) {
            Decision::Allowed
        } else {
            Decision::Denied(ViolationKind::DisallowedImport)
        }
    }

    /// Whether `symbol` may be referenced on module `path`
    #[must_use]
    pub fn check_module_symbol(&self, path: &str, symbol: &str) -> Decision {
        if let Some(kind) = self.denied_kind(symbol) {
            return Decision::Denied(kind);
        }
        match self.modules.get(path) {
            Some(rule) if rule.symbols.contains(symbol) => Decision::Allowed,
            Some(_) => Decision::Denied(ViolationKind::UnlistedSymbol),
            None => Decision::Denied(ViolationKind::DisallowedImport),
        }
    }

    /// Whether a free name (not bound by the program) may be referenced
    #[must_use]
    pub fn check_name(&self, name: &str) -> Decision {
        if let Some(kind) = self.denied_kind(name) {
            return Decision::Denied(kind);
        }
        if self.builtins.contains(name) || self.prelude.contains(name) {
            Decision::Allowed
        } else {
            Decision::Denied(ViolationKind::UnlistedSymbol)
        }
    }

    /// Whether `name` is an allowed builtin
    #[inline]
    #[must_use]
    pub fn allows_builtin(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }

    /// Whether `name` is pre-bound from the mathematics prelude
    #[inline]
    #[must_use]
    pub fn allows_prelude(&self, name: &str) -> bool {
        self.prelude.contains(name)
    }
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self::mathematics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_policy_is_consistent() {
        assert!(CapabilityPolicy::mathematics().check().is_ok());
    }

    #[test]
    fn modules_are_fail_closed() {
        let policy = CapabilityPolicy::mathematics();
        assert_eq!(policy.check_module("sympy"), Decision::Allowed);
        assert_eq!(policy.check_module("numpy.linalg"), Decision::Allowed);
        assert_eq!(
            policy.check_module("os"),
            Decision::Denied(ViolationKind::DisallowedImport)
        );
        assert_eq!(
            policy.check_module("pandas"),
            Decision::Denied(ViolationKind::DisallowedImport)
        );
        assert_eq!(
            policy.check_module("importlib"),
            Decision::Denied(ViolationKind::ComputedImport)
        );
    }

    #[test]
    fn module_symbols() {
        let policy = CapabilityPolicy::mathematics();
        assert!(policy.check_module_symbol("math", "sqrt").is_allowed());
        assert_eq!(
            policy.check_module_symbol("sympy", "sympify"),
            Decision::Denied(ViolationKind::DynamicEvaluation)
        );
        assert_eq!(
            policy.check_module_symbol("numpy", "load"),
            Decision::Denied(ViolationKind::FilesystemAccess)
        );
        assert_eq!(
            policy.check_module_symbol("math", "frexp"),
            Decision::Denied(ViolationKind::UnlistedSymbol)
        );
    }

    #[test]
    fn names() {
        let policy = CapabilityPolicy::mathematics();
        assert!(policy.check_name("range").is_allowed());
        assert!(policy.check_name("set_result").is_allowed());
        assert!(policy.check_name("integrate").is_allowed());
        assert_eq!(
            policy.check_name("eval"),
            Decision::Denied(ViolationKind::DynamicEvaluation)
        );
        assert_eq!(
            policy.check_name("__builtins__"),
            Decision::Denied(ViolationKind::Reflection)
        );
        assert_eq!(
            policy.check_name("frozenset"),
            Decision::Denied(ViolationKind::UnlistedSymbol)
        );
    }

    #[test]
    fn toml_round_trip_and_contradictions() {
        let text = r#"
            builtins = ["len", "print"]
            prelude = []

            [modules.math]
            symbols = ["sqrt"]

            [denied]
            eval = "dynamic_evaluation"
        "#;
        let policy = CapabilityPolicy::from_toml_str(text).unwrap();
        assert!(policy.check_module_symbol("math", "sqrt").is_allowed());
        assert!(!policy.allows_builtin("range"));

        let contradictory = r#"
            builtins = ["eval"]
            [denied]
            eval = "dynamic_evaluation"
        "#;
        assert!(matches!(
            CapabilityPolicy::from_toml_str(contradictory),
            Err(PolicyError::Contradiction(name)) if name == "eval"
        ));
    }
}
