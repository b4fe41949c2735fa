//! Identifier rewriting for template expressions.
//!
//! Two strategies run as a pipeline: [`AstStrategy`] parses the expression with oxc and
//! rewrites exactly the identifier references that resolve to instance state, and
//! [`PatternStrategy`] is a lexical fallback used only when the source does not parse.
//! If neither succeeds the expression is emitted unmodified.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrowFunctionExpression, AwaitExpression, BindingIdentifier, CatchClause, Class, Expression,
    Function, FunctionType, IdentifierReference, ObjectProperty,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::scope::ScopeFlags;
use regex::Regex;
use std::collections::HashSet;

use crate::context::Context;

lazy_static! {
    static ref PATH_RE: Regex =
        Regex::new(r"\.?[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*").unwrap();
    static ref NAME_RE: Regex = Regex::new(r"[A-Za-z_$][\w$]*").unwrap();
}

pub trait RewriteStrategy {
    fn name(&self) -> &'static str;

    /// Returns `None` when the strategy cannot handle `source`.
    fn rewrite(&self, source: &str, ctx: &Context) -> Option<String>;
}

pub fn rewrite(source: &str, ctx: &Context) -> String {
    let strategies: [&dyn RewriteStrategy; 2] = [&AstStrategy, &PatternStrategy];
    for strategy in strategies {
        if let Some(out) = strategy.rewrite(source, ctx) {
            return out;
        }
        tracing::debug!(strategy = strategy.name(), source, "expression rewrite strategy declined");
    }
    source.to_string()
}

fn source_type() -> SourceType {
    SourceType::default().with_module(true)
}

// ═══════════════════════════════════════════════════════════════════════════════
// AST STRATEGY
// ═══════════════════════════════════════════════════════════════════════════════

pub struct AstStrategy;

impl RewriteStrategy for AstStrategy {
    fn name(&self) -> &'static str {
        "ast"
    }

    fn rewrite(&self, source: &str, ctx: &Context) -> Option<String> {
        if source.trim().is_empty() {
            return Some(source.to_string());
        }
        let allocator = Allocator::default();

        // As an expression first; handler bodies such as `a = 1; save()` are statements.
        let wrapped = format!("({})", source);
        if let Ok(expr) = Parser::new(&allocator, &wrapped, source_type()).parse_expression() {
            let mut rewriter = Rewriter::new(ctx, Vec::new());
            rewriter.visit_expression(&expr);
            return Some(rewriter.apply(&wrapped, 1, source.len()));
        }

        let ret = Parser::new(&allocator, source, source_type()).parse();
        if ret.panicked || !ret.errors.is_empty() {
            return None;
        }
        let mut top = HashSet::new();
        let mut declarations = DeclarationCollector { names: &mut top };
        for stmt in &ret.program.body {
            declarations.visit_statement(stmt);
        }
        let mut rewriter = Rewriter::new(ctx, vec![top]);
        for stmt in &ret.program.body {
            rewriter.visit_statement(stmt);
        }
        Some(rewriter.apply(source, 0, source.len()))
    }
}

struct Rewriter<'c> {
    ctx: &'c Context,
    frames: Vec<HashSet<String>>,
    edits: Vec<(u32, u32, String)>,
}

impl<'c> Rewriter<'c> {
    fn new(ctx: &'c Context, frames: Vec<HashSet<String>>) -> Self {
        Self {
            ctx,
            frames,
            edits: Vec::new(),
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.frames.iter().rev().any(|f| f.contains(name))
    }

    fn resolve(&self, name: &str) -> Option<String> {
        if self.is_bound(name) {
            return None;
        }
        self.ctx.qualify(name)
    }

    /// Splices the collected edits into `text` and returns `text[offset..offset + len]`.
    fn apply(mut self, text: &str, offset: usize, len: usize) -> String {
        self.edits.sort_by(|a, b| b.0.cmp(&a.0));
        let mut out = text.to_string();
        for (start, end, replacement) in &self.edits {
            out.replace_range(*start as usize..*end as usize, replacement);
        }
        let tail = text.len() - offset - len;
        out[offset..out.len() - tail].to_string()
    }

    fn with_frame(&mut self, frame: HashSet<String>, f: impl FnOnce(&mut Self)) {
        self.frames.push(frame);
        f(self);
        self.frames.pop();
    }
}

impl<'a, 'c> Visit<'a> for Rewriter<'c> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(replacement) = self.resolve(ident.name.as_str()) {
            self.edits.push((ident.span.start, ident.span.end, replacement));
        }
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                if let Some(replacement) = self.resolve(ident.name.as_str()) {
                    self.edits.push((
                        prop.span.start,
                        prop.span.end,
                        format!("{}: {}", ident.name, replacement),
                    ));
                }
                return;
            }
        }
        walk::walk_object_property(self, prop);
    }

    fn visit_arrow_function_expression(&mut self, arrow: &ArrowFunctionExpression<'a>) {
        let mut frame = HashSet::new();
        BindingNames { names: &mut frame }.visit_formal_parameters(&arrow.params);
        DeclarationCollector { names: &mut frame }.visit_function_body(&arrow.body);
        self.with_frame(frame, |this| walk::walk_arrow_function_expression(this, arrow));
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let mut frame = HashSet::new();
        if let Some(id) = &func.id {
            frame.insert(id.name.to_string());
        }
        BindingNames { names: &mut frame }.visit_formal_parameters(&func.params);
        if let Some(body) = &func.body {
            DeclarationCollector { names: &mut frame }.visit_function_body(body);
        }
        self.with_frame(frame, |this| walk::walk_function(this, func, flags));
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause<'a>) {
        let mut frame = HashSet::new();
        if let Some(param) = &clause.param {
            BindingNames { names: &mut frame }.visit_binding_pattern(&param.pattern);
        }
        self.with_frame(frame, |this| walk::walk_catch_clause(this, clause));
    }

    fn visit_await_expression(&mut self, expr: &AwaitExpression<'a>) {
        self.ctx.hook("await");
        walk::walk_await_expression(self, expr);
    }
}

/// Every binding identifier under a pattern or parameter list.
struct BindingNames<'n> {
    names: &'n mut HashSet<String>,
}

impl<'a, 'n> Visit<'a> for BindingNames<'n> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.names.insert(ident.name.to_string());
    }

    // Default values may contain nested functions whose parameters are not ours.
    fn visit_arrow_function_expression(&mut self, _arrow: &ArrowFunctionExpression<'a>) {}

    fn visit_function(&mut self, _func: &Function<'a>, _flags: ScopeFlags) {}
}

/// Names declared directly in a statement list, not descending into nested functions.
struct DeclarationCollector<'n> {
    names: &'n mut HashSet<String>,
}

impl<'a, 'n> Visit<'a> for DeclarationCollector<'n> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.names.insert(ident.name.to_string());
    }

    fn visit_function(&mut self, func: &Function<'a>, _flags: ScopeFlags) {
        if matches!(func.r#type, FunctionType::FunctionDeclaration) {
            if let Some(id) = &func.id {
                self.names.insert(id.name.to_string());
            }
        }
    }

    fn visit_arrow_function_expression(&mut self, _arrow: &ArrowFunctionExpression<'a>) {}

    fn visit_class(&mut self, class: &Class<'a>) {
        if let Some(id) = &class.id {
            self.names.insert(id.name.to_string());
        }
    }

    fn visit_catch_clause(&mut self, _clause: &CatchClause<'a>) {}
}

// ═══════════════════════════════════════════════════════════════════════════════
// PATTERN STRATEGY
// ═══════════════════════════════════════════════════════════════════════════════

/// Lexical fallback: rewrites dotted identifier paths outside string literals.
pub struct PatternStrategy;

impl RewriteStrategy for PatternStrategy {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn rewrite(&self, source: &str, ctx: &Context) -> Option<String> {
        let mut out = String::with_capacity(source.len() + 16);
        for (segment, is_string) in split_strings(source) {
            if is_string {
                out.push_str(segment);
            } else {
                out.push_str(&rewrite_segment(segment, ctx));
            }
        }
        Some(out)
    }
}

/// Splits `source` into alternating code and quoted-literal segments.
fn split_strings(source: &str) -> Vec<(&str, bool)> {
    let bytes = source.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if matches!(b, b'\'' | b'"' | b'`') {
            if i > start {
                parts.push((&source[start..i], false));
            }
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] != b {
                j += if bytes[j] == b'\\' { 2 } else { 1 };
            }
            let end = (j + 1).min(bytes.len());
            parts.push((&source[i..end], true));
            start = end;
            i = end;
        } else {
            i += 1;
        }
    }
    if start < bytes.len() {
        parts.push((&source[start..], false));
    }
    parts
}

fn rewrite_segment(segment: &str, ctx: &Context) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(segment.len());
    let mut last = 0;

    for m in PATH_RE.find_iter(segment) {
        let path = m.as_str();
        let preceded_by_word = m.start() > 0 && {
            let prev = bytes[m.start() - 1];
            prev.is_ascii_alphanumeric() || prev == b'_' || prev == b'$'
        };
        if path.starts_with('.') || preceded_by_word || is_object_key(segment, m.start(), m.end()) {
            continue;
        }

        let (root, rest) = match path.find('.') {
            Some(dot) => (&path[..dot], &path[dot..]),
            None => (path, ""),
        };
        if let Some(replacement) = ctx.qualify(root) {
            out.push_str(&segment[last..m.start()]);
            out.push_str(&replacement);
            out.push_str(rest);
            last = m.end();
        }
    }
    out.push_str(&segment[last..]);
    out
}

/// `{ key: …` or `, key: …`
fn is_object_key(segment: &str, start: usize, end: usize) -> bool {
    let followed_by_colon = segment[end..].trim_start().starts_with(':');
    let before = segment[..start].trim_end();
    followed_by_colon && (before.ends_with('{') || before.ends_with(','))
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDING PATTERNS
// ═══════════════════════════════════════════════════════════════════════════════

/// Names bound by a loop or slot pattern such as `(item, index)` or `{ user, id }`.
pub fn pattern_bindings(pattern: &str) -> Vec<String> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Vec::new();
    }
    let source = if pattern.starts_with('(') {
        format!("{} => 0", pattern)
    } else {
        format!("({}) => 0", pattern)
    };

    let allocator = Allocator::default();
    if let Ok(Expression::ArrowFunctionExpression(arrow)) =
        Parser::new(&allocator, &source, source_type()).parse_expression()
    {
        let mut names = HashSet::new();
        BindingNames { names: &mut names }.visit_formal_parameters(&arrow.params);
        let mut ordered: Vec<String> = NAME_RE
            .find_iter(pattern)
            .map(|m| m.as_str().to_string())
            .filter(|n| names.contains(n))
            .collect();
        ordered.dedup();
        return ordered;
    }

    NAME_RE
        .find_iter(pattern)
        .map(|m| m.as_str().to_string())
        .collect()
}
