//! Expression scoping context.
//!
//! A [`Context`] is threaded through the whole render pass. Cloning it is cheap: scope
//! frames and the declared prop set are shared, and the component/directive alias table
//! is shared between every clone created during one render so aliases stay stable.

use lazy_static::lazy_static;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::component::{ComponentDefinition, ComponentRegistry};
use crate::expression;
use crate::options::DEFAULT_RUNTIME_NAMESPACE;

pub const DEBUG_SENTINEL: &str = "$debug";

lazy_static! {
    /// Names that are never instance state: keywords the pattern rewrite can trip
    /// over, handler arguments and the browser globals expressions may reference.
    static ref BASE_SCOPE: Vec<String> = [
        "$event", "debugger", "new", "true", "const", "let", "var", "false", "null",
        "await", "typeof", "instanceof", "if", "else", "while", "break", "for", "this",
        "arguments", "return", "in", "of", "void", "delete", "async", "function",
        // globals
        "console", "Date", "RegExp", "Math", "JSON", "String", "Number", "Boolean",
        "Array", "Object", "Promise", "Map", "Set", "Error", "undefined", "NaN",
        "Infinity", "parseInt", "parseFloat", "window", "document",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    /// `$`-prefixed aliases resolved to the unprefixed global.
    static ref GLOBAL_ALIASES: HashSet<&'static str> = ["$window", "$document"].into_iter().collect();
}

pub type IdentifierHook = Rc<dyn Fn(&str) -> String>;

/// Per-render registry of short aliases (`c_0`, `d_0`) in registration order.
#[derive(Debug, Default)]
pub struct AliasTable {
    components: Vec<(String, String)>,
    directives: Vec<(String, String)>,
}

impl AliasTable {
    fn resolve(entries: &mut Vec<(String, String)>, prefix: &str, name: String) -> String {
        if let Some((_, alias)) = entries.iter().find(|(n, _)| *n == name) {
            return alias.clone();
        }
        let alias = format!("{}_{}", prefix, entries.len());
        entries.push((name, alias.clone()));
        alias
    }

    pub fn components(&self) -> &[(String, String)] {
        &self.components
    }

    pub fn directives(&self) -> &[(String, String)] {
        &self.directives
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.directives.is_empty()
    }
}

#[derive(Clone)]
pub struct Context {
    scopes: Vec<Rc<Vec<String>>>,
    props: Rc<HashSet<String>>,
    registry: Option<Arc<dyn ComponentRegistry>>,
    aliases: Rc<RefCell<AliasTable>>,
    runtime: Rc<str>,
    new_block: bool,
    identifier_hook: Option<IdentifierHook>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("scopes", &self.scopes.len())
            .field("props", &self.props)
            .field("runtime", &self.runtime)
            .field("new_block", &self.new_block)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            scopes: vec![Rc::new(BASE_SCOPE.clone())],
            props: Rc::new(HashSet::new()),
            registry: None,
            aliases: Rc::new(RefCell::new(AliasTable::default())),
            runtime: Rc::from(DEFAULT_RUNTIME_NAMESPACE),
            new_block: false,
            identifier_hook: None,
        }
    }

    /// Context whose prop-access rewriting follows the component's declared props.
    pub fn for_component(definition: &ComponentDefinition) -> Self {
        let mut ctx = Self::new();
        ctx.props = Rc::new(definition.props.iter().cloned().collect());
        ctx
    }

    pub fn with_registry(mut self, registry: Arc<dyn ComponentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_runtime(mut self, namespace: &str) -> Self {
        self.runtime = Rc::from(namespace);
        self
    }

    /// Runtime helper namespace, `v` unless configured otherwise.
    pub fn rt(&self) -> &str {
        &self.runtime
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SCOPES & BLOCKS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn add_scope<I, S>(&self, names: I) -> Context
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ctx = self.clone();
        ctx.scopes
            .push(Rc::new(names.into_iter().map(Into::into).collect()));
        ctx
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|frame| frame.iter().any(|n| n == name))
    }

    pub fn is_prop(&self, name: &str) -> bool {
        self.props.contains(name)
    }

    pub fn new_block(&self) -> bool {
        self.new_block
    }

    pub fn with_new_block(&self) -> Context {
        let mut ctx = self.clone();
        ctx.new_block = true;
        ctx
    }

    pub fn without_new_block(&self) -> Context {
        if !self.new_block {
            return self.clone();
        }
        let mut ctx = self.clone();
        ctx.new_block = false;
        ctx
    }

    pub fn with_identifier_hook(&self, hook: IdentifierHook) -> Context {
        let mut ctx = self.clone();
        ctx.identifier_hook = Some(hook);
        ctx
    }

    /// Runs the identifier hook, if any, over a root identifier.
    pub fn hook(&self, name: &str) -> String {
        match &self.identifier_hook {
            Some(hook) => hook(name),
            None => name.to_string(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // IDENTIFIER RESOLUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Resolves a bare root identifier. `None` leaves it untouched.
    pub fn qualify(&self, name: &str) -> Option<String> {
        let root = self.hook(name);

        if root == DEBUG_SENTINEL {
            return Some("(()=>{debugger})()".to_string());
        }
        if GLOBAL_ALIASES.contains(root.as_str()) {
            return Some(root[1..].to_string());
        }
        if self.is_prop(&root) {
            return Some(format!("this.$props.{}", root));
        }
        if self.is_local(&root) {
            return (root != name).then_some(root);
        }
        Some(format!("this.{}", root))
    }

    /// Rewrites every instance-state identifier in `source`.
    pub fn rewrite_expression(&self, source: &str) -> String {
        expression::rewrite(source, self)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ALIASES
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn resolve_component(&self, name: &str) -> String {
        let display = self
            .registry
            .as_ref()
            .and_then(|r| r.component_definition(name))
            .map(|d| d.name)
            .unwrap_or_else(|| name.to_string());
        let mut aliases = self.aliases.borrow_mut();
        AliasTable::resolve(&mut aliases.components, "c", display)
    }

    pub fn resolve_directive(&self, name: &str) -> String {
        let display = self
            .registry
            .as_ref()
            .and_then(|r| r.directive_name(name))
            .unwrap_or_else(|| name.to_string());
        let mut aliases = self.aliases.borrow_mut();
        AliasTable::resolve(&mut aliases.directives, "d", display)
    }

    /// `const c_0 = v.resolveComponent("X"),d_0 = v.resolveDirective("y")`, or
    /// `None` when nothing was resolved.
    pub fn prelude(&self) -> Option<String> {
        let aliases = self.aliases.borrow();
        if aliases.is_empty() {
            return None;
        }
        let rt = self.rt();
        let assignments: Vec<String> = aliases
            .components()
            .iter()
            .map(|(name, alias)| format!("{} = {}.resolveComponent({})", alias, rt, json_string(name)))
            .chain(aliases.directives().iter().map(|(name, alias)| {
                format!("{} = {}.resolveDirective({})", alias, rt, json_string(name))
            }))
            .collect();
        Some(format!("const {}", assignments.join(",")))
    }
}

pub(crate) fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
