//! Tree-sitter front end
//!
//! Parses candidate source with `tree-sitter-python` and lowers the concrete
//! tree into [`crate::ast`]. Nothing here evaluates code.

use crate::ast::{
    BinOp, Clause, CmpOp, ExprKind, Expression, FPart, FunctionDef, Location, Param, Program,
    Stmt, StmtKind, Target, UnaryOp,
};
use std::sync::Arc;
use tree_sitter::{Node, Parser};

/// Source that does not parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    /// Offending text, truncated
    pub construct: String,
    /// Where the parser gave up
    pub at: Location,
}

const SNIPPET_CHARS: usize = 60;

fn truncate(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > SNIPPET_CHARS {
        let cut: String = line.chars().take(SNIPPET_CHARS).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

/// Parse and lower a program
pub fn parse_program(source: &str) -> Result<Program, SyntaxIssue> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| SyntaxIssue {
            construct: format!("grammar unavailable: {e}"),
            at: Location::default(),
        })?;
    let tree = parser.parse(source, None).ok_or_else(|| SyntaxIssue {
        construct: "parser produced no tree".into(),
        at: Location::default(),
    })?;
    let root = tree.root_node();
    let lower = Lowering {
        source: source.as_bytes(),
    };
    if root.has_error() {
        let bad = first_error(root).unwrap_or(root);
        let construct = if bad.is_missing() {
            format!("missing {}", bad.kind())
        } else {
            truncate(&lower.text(bad))
        };
        return Err(SyntaxIssue {
            construct,
            at: location(bad),
        });
    }
    Ok(Program {
        body: lower.block(root),
    })
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let children: Vec<Node<'_>> = node.children(&mut node.walk()).collect();
    children.into_iter().find_map(first_error)
}

fn location(node: Node<'_>) -> Location {
    let point = node.start_position();
    Location {
        line: point.row + 1,
        column: point.column + 1,
    }
}

/// Named children, skipping comments
fn named(node: Node<'_>) -> Vec<Node<'_>> {
    node.named_children(&mut node.walk())
        .filter(|c| c.kind() != "comment")
        .collect()
}

fn field<'t>(node: Node<'t>, name: &str) -> Option<Node<'t>> {
    node.child_by_field_name(name)
}

fn fields<'t>(node: Node<'t>, name: &str) -> Vec<Node<'t>> {
    node.children_by_field_name(name, &mut node.walk()).collect()
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    node.children(&mut node.walk())
        .any(|c| !c.is_named() && c.kind() == token)
}

struct Lowering<'s> {
    source: &'s [u8],
}

impl Lowering<'_> {
    fn text(&self, node: Node<'_>) -> String {
        node.utf8_text(self.source).unwrap_or_default().to_string()
    }

    fn unsupported_stmt(&self, node: Node<'_>, construct: impl Into<String>) -> Stmt {
        Stmt {
            kind: StmtKind::Unsupported {
                construct: construct.into(),
            },
            at: location(node),
        }
    }

    fn unsupported(&self, node: Node<'_>, construct: impl Into<String>) -> Expression {
        Expression {
            kind: ExprKind::Unsupported {
                construct: construct.into(),
            },
            at: location(node),
        }
    }

    fn block(&self, node: Node<'_>) -> Vec<Stmt> {
        let mut out = Vec::new();
        for child in named(node) {
            self.statement(child, &mut out);
        }
        out
    }

    fn body(&self, node: Node<'_>, name: &str) -> Vec<Stmt> {
        field(node, name).map(|b| self.block(b)).unwrap_or_default()
    }

    fn statement(&self, node: Node<'_>, out: &mut Vec<Stmt>) {
        let at = location(node);
        let stmt = |kind| Stmt { kind, at };
        match node.kind() {
            "expression_statement" => {
                let children = named(node);
                match children.as_slice() {
                    [single] if single.kind() == "assignment" => out.push(self.assignment(*single)),
                    [single] if single.kind() == "augmented_assignment" => {
                        out.push(self.augmented(*single));
                    }
                    [single] => out.push(stmt(StmtKind::Expr(self.expr(*single)))),
                    many => {
                        let items = many.iter().map(|c| self.expr(*c)).collect();
                        out.push(stmt(StmtKind::Expr(Expression {
                            kind: ExprKind::Tuple(items),
                            at,
                        })));
                    }
                }
            }
            "import_statement" => {
                for name in fields(node, "name") {
                    let (module, alias) = self.aliased(name);
                    out.push(Stmt {
                        kind: StmtKind::Import { module, alias },
                        at: location(name),
                    });
                }
            }
            "import_from_statement" => out.push(self.import_from(node)),
            "if_statement" => {
                let mut branches = Vec::new();
                let mut orelse = Vec::new();
                if let Some(test) = field(node, "condition") {
                    branches.push((self.expr(test), self.body(node, "consequence")));
                }
                for alt in fields(node, "alternative") {
                    match alt.kind() {
                        "elif_clause" => {
                            if let Some(test) = field(alt, "condition") {
                                branches.push((self.expr(test), self.body(alt, "consequence")));
                            }
                        }
                        _ => orelse = self.body(alt, "body"),
                    }
                }
                out.push(stmt(StmtKind::If { branches, orelse }));
            }
            "for_statement" => {
                if has_token(node, "async") {
                    out.push(self.unsupported_stmt(node, "async for"));
                } else if field(node, "alternative").is_some() {
                    out.push(self.unsupported_stmt(node, "for-else"));
                } else {
                    let (Some(left), Some(right)) = (field(node, "left"), field(node, "right"))
                    else {
                        out.push(self.unsupported_stmt(node, "for"));
                        return;
                    };
                    match self.target(left) {
                        Ok(target) => out.push(stmt(StmtKind::For {
                            target,
                            iter: self.expr(right),
                            body: self.body(node, "body"),
                        })),
                        Err(construct) => out.push(self.unsupported_stmt(left, construct)),
                    }
                }
            }
            "while_statement" => {
                if field(node, "alternative").is_some() {
                    out.push(self.unsupported_stmt(node, "while-else"));
                } else if let Some(test) = field(node, "condition") {
                    out.push(stmt(StmtKind::While {
                        test: self.expr(test),
                        body: self.body(node, "body"),
                    }));
                }
            }
            "function_definition" => out.push(self.function(node)),
            "return_statement" => {
                let value = named(node).first().map(|v| self.expr(*v));
                out.push(stmt(StmtKind::Return(value)));
            }
            "pass_statement" => out.push(stmt(StmtKind::Pass)),
            "break_statement" => out.push(stmt(StmtKind::Break)),
            "continue_statement" => out.push(stmt(StmtKind::Continue)),
            "future_import_statement" => out.push(self.unsupported_stmt(node, "__future__ import")),
            "decorated_definition" => out.push(self.unsupported_stmt(node, "decorator")),
            "class_definition" => out.push(self.unsupported_stmt(node, "class")),
            other => {
                let construct = other.trim_end_matches("_statement").replace('_', " ");
                out.push(self.unsupported_stmt(node, construct));
            }
        }
    }

    fn aliased(&self, node: Node<'_>) -> (String, Option<String>) {
        if node.kind() == "aliased_import" {
            let module = field(node, "name").map(|n| self.text(n)).unwrap_or_default();
            let alias = field(node, "alias").map(|n| self.text(n));
            (module, alias)
        } else {
            (self.text(node), None)
        }
    }

    fn import_from(&self, node: Node<'_>) -> Stmt {
        let at = location(node);
        let Some(module_node) = field(node, "module_name") else {
            return self.unsupported_stmt(node, "import");
        };
        if module_node.kind() == "relative_import" {
            return self.unsupported_stmt(module_node, "relative import");
        }
        let star = named(node).iter().any(|c| c.kind() == "wildcard_import");
        let names = fields(node, "name").into_iter().map(|n| self.aliased(n)).collect();
        Stmt {
            kind: StmtKind::ImportFrom {
                module: self.text(module_node),
                names,
                star,
            },
            at,
        }
    }

    fn assignment(&self, node: Node<'_>) -> Stmt {
        let at = location(node);
        if field(node, "type").is_some() {
            return self.unsupported_stmt(node, "annotated assignment");
        }
        let mut targets = Vec::new();
        let mut current = node;
        loop {
            let Some(left) = field(current, "left") else {
                return self.unsupported_stmt(current, "assignment");
            };
            match self.target(left) {
                Ok(target) => targets.push(target),
                Err(construct) => return self.unsupported_stmt(left, construct),
            }
            match field(current, "right") {
                Some(right) if right.kind() == "assignment" => current = right,
                Some(right) => {
                    return Stmt {
                        kind: StmtKind::Assign {
                            targets,
                            value: self.expr(right),
                        },
                        at,
                    };
                }
                None => return self.unsupported_stmt(current, "annotated assignment"),
            }
        }
    }

    fn augmented(&self, node: Node<'_>) -> Stmt {
        let (Some(left), Some(op), Some(right)) = (
            field(node, "left"),
            field(node, "operator"),
            field(node, "right"),
        ) else {
            return self.unsupported_stmt(node, "augmented assignment");
        };
        let token = self.text(op);
        let Some(op) = BinOp::from_token(&token) else {
            return self.unsupported_stmt(node, format!("operator {token}"));
        };
        match self.target(left) {
            Ok(target) => Stmt {
                kind: StmtKind::AugAssign {
                    target,
                    op,
                    value: self.expr(right),
                },
                at: location(node),
            },
            Err(construct) => self.unsupported_stmt(left, construct),
        }
    }

    fn target(&self, node: Node<'_>) -> Result<Target, String> {
        match node.kind() {
            "identifier" => Ok(Target::Name(self.text(node), location(node))),
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "expression_list" => Ok(Target::Unpack(
                named(node)
                    .into_iter()
                    .map(|c| self.target(c))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            "parenthesized_expression" => match named(node).first() {
                Some(inner) => self.target(*inner),
                None => Err("empty target".into()),
            },
            "subscript" => {
                let object = field(node, "value").ok_or("subscript target")?;
                Ok(Target::Subscript {
                    object: Box::new(self.expr(object)),
                    index: Box::new(self.subscript_index(node)),
                })
            }
            "attribute" => Err("attribute assignment".into()),
            "list_splat_pattern" => Err("starred assignment".into()),
            other => Err(format!("assignment to {}", other.replace('_', " "))),
        }
    }

    fn params(&self, node: Option<Node<'_>>) -> Result<Vec<Param>, (Location, String)> {
        let Some(node) = node else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for p in named(node) {
            let at = location(p);
            match p.kind() {
                "identifier" => out.push(Param {
                    name: self.text(p),
                    default: None,
                    at,
                }),
                "typed_parameter" => {
                    let name = named(p)
                        .into_iter()
                        .find(|c| c.kind() == "identifier")
                        .map(|c| self.text(c))
                        .ok_or_else(|| (at, "typed parameter".to_string()))?;
                    out.push(Param {
                        name,
                        default: None,
                        at,
                    });
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = field(p, "name").map(|n| self.text(n));
                    let value = field(p, "value").map(|v| self.expr(v));
                    match (name, value) {
                        (Some(name), Some(value)) => out.push(Param {
                            name,
                            default: Some(value),
                            at,
                        }),
                        _ => return Err((at, "parameter".into())),
                    }
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    return Err((at, "variadic parameter".into()));
                }
                other => return Err((at, other.replace('_', " "))),
            }
        }
        Ok(out)
    }

    fn function(&self, node: Node<'_>) -> Stmt {
        if has_token(node, "async") {
            return self.unsupported_stmt(node, "async def");
        }
        let Some(name) = field(node, "name") else {
            return self.unsupported_stmt(node, "def");
        };
        let params = match self.params(field(node, "parameters")) {
            Ok(params) => params,
            Err((at, construct)) => {
                return Stmt {
                    kind: StmtKind::Unsupported { construct },
                    at,
                };
            }
        };
        Stmt {
            kind: StmtKind::FunctionDef(Arc::new(FunctionDef {
                name: self.text(name),
                params,
                body: self.body(node, "body"),
            })),
            at: location(node),
        }
    }

    fn boxed(&self, node: Option<Node<'_>>, parent: Node<'_>) -> Box<Expression> {
        Box::new(match node {
            Some(n) => self.expr(n),
            None => self.unsupported(parent, parent.kind().replace('_', " ")),
        })
    }

    fn subscript_index(&self, node: Node<'_>) -> Expression {
        let parts = fields(node, "subscript");
        match parts.as_slice() {
            [single] => self.expr(*single),
            many => Expression {
                kind: ExprKind::Tuple(many.iter().map(|p| self.expr(*p)).collect()),
                at: location(node),
            },
        }
    }

    fn slice(&self, node: Node<'_>) -> Expression {
        let mut segments: [Option<Box<Expression>>; 3] = [None, None, None];
        let mut index = 0;
        for child in node.children(&mut node.walk()) {
            if !child.is_named() && child.kind() == ":" {
                index += 1;
            } else if child.is_named() && child.kind() != "comment" && index < 3 {
                segments[index] = Some(Box::new(self.expr(child)));
            }
        }
        let [lower, upper, step] = segments;
        Expression {
            kind: ExprKind::Slice { lower, upper, step },
            at: location(node),
        }
    }

    fn call(&self, node: Node<'_>) -> Expression {
        let at = location(node);
        let func = self.boxed(field(node, "function"), node);
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if let Some(arguments) = field(node, "arguments") {
            if arguments.kind() == "generator_expression" {
                args.push(self.expr(arguments));
            } else {
                for arg in named(arguments) {
                    match arg.kind() {
                        "keyword_argument" => {
                            let name = field(arg, "name").map(|n| self.text(n)).unwrap_or_default();
                            keywords.push((name, *self.boxed(field(arg, "value"), arg)));
                        }
                        "list_splat" | "dictionary_splat" => {
                            return self.unsupported(arg, "argument unpacking");
                        }
                        _ => args.push(self.expr(arg)),
                    }
                }
            }
        }
        Expression {
            kind: ExprKind::Call {
                func,
                args,
                keywords,
            },
            at,
        }
    }

    fn comprehension(&self, node: Node<'_>) -> Expression {
        let element = self.boxed(field(node, "body"), node);
        let mut clauses = Vec::new();
        for child in named(node) {
            match child.kind() {
                "for_in_clause" => {
                    if has_token(child, "async") {
                        return self.unsupported(child, "async comprehension");
                    }
                    let (Some(left), Some(right)) = (field(child, "left"), field(child, "right"))
                    else {
                        return self.unsupported(child, "comprehension");
                    };
                    match self.target(left) {
                        Ok(target) => clauses.push(Clause::For {
                            target,
                            iter: self.expr(right),
                        }),
                        Err(construct) => return self.unsupported(left, construct),
                    }
                }
                "if_clause" => {
                    if let Some(test) = named(child).first() {
                        clauses.push(Clause::If(self.expr(*test)));
                    }
                }
                _ => {}
            }
        }
        Expression {
            kind: ExprKind::Comprehension { element, clauses },
            at: location(node),
        }
    }

    fn string(&self, node: Node<'_>) -> Expression {
        let at = location(node);
        let mut prefix = String::new();
        let mut parts: Vec<FPart> = Vec::new();
        let mut literal = String::new();
        for child in node.children(&mut node.walk()) {
            match child.kind() {
                "string_start" => {
                    prefix = self
                        .text(child)
                        .trim_end_matches(['"', '\''])
                        .to_ascii_lowercase();
                    if prefix.contains('b') {
                        return self.unsupported(node, "bytes literal");
                    }
                }
                "string_content" | "escape_sequence" | "escape_interpolation" => {
                    let raw = self.text(child);
                    let raw = if prefix.contains('f') {
                        raw.replace("{{", "{").replace("}}", "}")
                    } else {
                        raw
                    };
                    if prefix.contains('r') {
                        literal.push_str(&raw);
                    } else {
                        literal.push_str(&unescape(&raw));
                    }
                }
                "interpolation" => {
                    if !literal.is_empty() {
                        parts.push(FPart::Literal(std::mem::take(&mut literal)));
                    }
                    let Some(expr) = field(child, "expression") else {
                        return self.unsupported(child, "interpolation");
                    };
                    let spec = field(child, "format_specifier")
                        .map(|s| self.text(s).trim_start_matches(':').to_string());
                    parts.push(FPart::Value {
                        expr: self.expr(expr),
                        spec,
                    });
                }
                _ => {}
            }
        }
        if prefix.contains('f') {
            if !literal.is_empty() {
                parts.push(FPart::Literal(literal));
            }
            Expression {
                kind: ExprKind::FString(parts),
                at,
            }
        } else {
            Expression {
                kind: ExprKind::Str(literal),
                at,
            }
        }
    }

    fn concatenated(&self, node: Node<'_>) -> Expression {
        let mut parts = Vec::new();
        let mut formatted = false;
        for child in named(node) {
            let piece = self.string(child);
            match piece.kind {
                ExprKind::Str(text) => parts.push(FPart::Literal(text)),
                ExprKind::FString(inner) => {
                    formatted = true;
                    parts.extend(inner);
                }
                _ => return piece,
            }
        }
        let at = location(node);
        if formatted {
            return Expression {
                kind: ExprKind::FString(parts),
                at,
            };
        }
        let text = parts
            .into_iter()
            .map(|p| match p {
                FPart::Literal(text) => text,
                FPart::Value { .. } => String::new(),
            })
            .collect();
        Expression {
            kind: ExprKind::Str(text),
            at,
        }
    }

    fn expr(&self, node: Node<'_>) -> Expression {
        let at = location(node);
        let make = |kind| Expression { kind, at };
        match node.kind() {
            "identifier" => make(ExprKind::Name(self.text(node))),
            "integer" | "float" => make(ExprKind::Number(self.text(node))),
            "true" => make(ExprKind::Bool(true)),
            "false" => make(ExprKind::Bool(false)),
            "none" => make(ExprKind::None),
            "string" => self.string(node),
            "concatenated_string" => self.concatenated(node),
            "attribute" => {
                let name = field(node, "attribute").map(|n| self.text(n)).unwrap_or_default();
                make(ExprKind::Attribute {
                    object: self.boxed(field(node, "object"), node),
                    name,
                })
            }
            "subscript" => make(ExprKind::Subscript {
                object: self.boxed(field(node, "value"), node),
                index: Box::new(self.subscript_index(node)),
            }),
            "slice" => self.slice(node),
            "call" => self.call(node),
            "unary_operator" => {
                let token = field(node, "operator").map(|o| self.text(o)).unwrap_or_default();
                let op = match token.as_str() {
                    "-" => UnaryOp::Neg,
                    "+" => UnaryOp::Pos,
                    _ => return self.unsupported(node, format!("operator {token}")),
                };
                make(ExprKind::Unary {
                    op,
                    operand: self.boxed(field(node, "argument"), node),
                })
            }
            "not_operator" => make(ExprKind::Unary {
                op: UnaryOp::Not,
                operand: self.boxed(field(node, "argument"), node),
            }),
            "binary_operator" => {
                let token = field(node, "operator").map(|o| self.text(o)).unwrap_or_default();
                let Some(op) = BinOp::from_token(&token) else {
                    return self.unsupported(node, format!("operator {token}"));
                };
                make(ExprKind::Binary {
                    op,
                    left: self.boxed(field(node, "left"), node),
                    right: self.boxed(field(node, "right"), node),
                })
            }
            "boolean_operator" => {
                let token = field(node, "operator").map(|o| self.text(o)).unwrap_or_default();
                make(ExprKind::Logical {
                    and: token == "and",
                    left: self.boxed(field(node, "left"), node),
                    right: self.boxed(field(node, "right"), node),
                })
            }
            "comparison_operator" => {
                let mut operands = Vec::new();
                let mut ops = Vec::new();
                for child in node.children(&mut node.walk()) {
                    if child.is_named() {
                        if child.kind() != "comment" {
                            operands.push(self.expr(child));
                        }
                    } else if let Some(op) = CmpOp::from_token(child.kind()) {
                        ops.push(op);
                    }
                }
                if operands.len() != ops.len() + 1 {
                    return self.unsupported(node, "comparison");
                }
                let mut operands = operands.into_iter();
                let Some(left) = operands.next() else {
                    return self.unsupported(node, "comparison");
                };
                make(ExprKind::Compare {
                    left: Box::new(left),
                    rest: ops.into_iter().zip(operands).collect(),
                })
            }
            "conditional_expression" => {
                let parts = named(node);
                match parts.as_slice() {
                    [body, test, orelse] => make(ExprKind::IfExp {
                        body: Box::new(self.expr(*body)),
                        test: Box::new(self.expr(*test)),
                        orelse: Box::new(self.expr(*orelse)),
                    }),
                    _ => self.unsupported(node, "conditional expression"),
                }
            }
            "parenthesized_expression" => match named(node).first() {
                Some(inner) => self.expr(*inner),
                None => make(ExprKind::Tuple(Vec::new())),
            },
            "list" | "tuple" | "expression_list" => {
                let mut items = Vec::new();
                for child in named(node) {
                    if child.kind() == "list_splat" {
                        return self.unsupported(child, "starred expression");
                    }
                    items.push(self.expr(child));
                }
                make(if node.kind() == "list" {
                    ExprKind::List(items)
                } else {
                    ExprKind::Tuple(items)
                })
            }
            "dictionary" => {
                let mut pairs = Vec::new();
                for child in named(node) {
                    if child.kind() != "pair" {
                        return self.unsupported(child, "dictionary unpacking");
                    }
                    pairs.push((
                        *self.boxed(field(child, "key"), child),
                        *self.boxed(field(child, "value"), child),
                    ));
                }
                make(ExprKind::Dict(pairs))
            }
            "list_comprehension" | "generator_expression" => self.comprehension(node),
            "lambda" => match self.params(field(node, "parameters")) {
                Ok(params) => make(ExprKind::Lambda {
                    params,
                    body: Arc::new(*self.boxed(field(node, "body"), node)),
                }),
                Err((_, construct)) => self.unsupported(node, construct),
            },
            "named_expression" => self.unsupported(node, "assignment expression"),
            "set" | "set_comprehension" => self.unsupported(node, "set"),
            "dictionary_comprehension" => self.unsupported(node, "dictionary comprehension"),
            other => self.unsupported(node, other.replace('_', " ")),
        }
    }
}

/// Resolve backslash escapes in a non-raw string literal
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(kind @ ('x' | 'u')) => {
                let width = if kind == 'x' { 2 } else { 4 };
                let digits: String = (0..width).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push('\\');
                        out.push(kind);
                        out.push_str(&digits);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn body(source: &str) -> Vec<Stmt> {
        parse_program(source).unwrap().body
    }

    #[test]
    fn syntax_error_location() {
        let err = parse_program("x = 1\ny = (2 +\n").unwrap_err();
        assert!(err.at.line >= 2, "reported at {}", err.at);
    }

    #[test]
    fn lowers_assignment_chain() {
        let stmts = body("a = b = 1");
        let StmtKind::Assign { targets, value } = &stmts[0].kind else {
            panic!("expected assignment, got {:?}", stmts[0].kind);
        };
        assert_eq!(targets.len(), 2);
        assert_eq!(value.kind, ExprKind::Number("1".into()));
    }

    #[test]
    fn lowers_imports() {
        let stmts = body("import numpy as np\nfrom sympy import Symbol, sqrt as root\n");
        assert_eq!(
            stmts[0].kind,
            StmtKind::Import {
                module: "numpy".into(),
                alias: Some("np".into())
            }
        );
        assert_eq!(
            stmts[1].kind,
            StmtKind::ImportFrom {
                module: "sympy".into(),
                names: vec![("Symbol".into(), None), ("sqrt".into(), Some("root".into()))],
                star: false,
            }
        );
    }

    #[test]
    fn marks_unsupported_constructs() {
        let stmts = body("class A:\n    pass\n");
        assert!(matches!(&stmts[0].kind, StmtKind::Unsupported { construct } if construct == "class"));
        let stmts = body("try:\n    x = 1\nexcept Exception:\n    pass\n");
        assert!(matches!(&stmts[0].kind, StmtKind::Unsupported { construct } if construct == "try"));
    }

    #[test]
    fn comments_are_ignored() {
        let stmts = body("# leading\nx = [1, # inline\n 2]\n");
        assert_eq!(stmts.len(), 1);
        let StmtKind::Assign { value, .. } = &stmts[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(&value.kind, ExprKind::List(items) if items.len() == 2));
    }

    #[test]
    fn strings_and_fstrings() {
        let stmts = body("s = 'a\\tb'\nt = f\"v={x:.2f}!\"\n");
        let StmtKind::Assign { value, .. } = &stmts[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(value.kind, ExprKind::Str("a\tb".into()));
        let StmtKind::Assign { value, .. } = &stmts[1].kind else {
            panic!("expected assignment");
        };
        let ExprKind::FString(parts) = &value.kind else {
            panic!("expected f-string, got {:?}", value.kind);
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[1], FPart::Value { spec: Some(s), .. } if s == ".2f"));
    }

    #[test]
    fn chained_comparison() {
        let stmts = body("ok = 0 < x <= 1");
        let StmtKind::Assign { value, .. } = &stmts[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Compare { rest, .. } = &value.kind else {
            panic!("expected comparison");
        };
        let ops: Vec<CmpOp> = rest.iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, vec![CmpOp::Lt, CmpOp::LtE]);
    }

    #[test]
    fn unescape_sequences() {
        assert_eq!(unescape("a\\nb"), "a\nb");
        assert_eq!(unescape("\\x41"), "A");
        assert_eq!(unescape("\\q"), "\\q");
    }
}
