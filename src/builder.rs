//! Compile pass: generic DOM tree to [`Node`] tree.
//!
//! Attributes are interpreted in document order. Directive handling mirrors the
//! template dialect: `v-slot`/`#`, `:prop`/`v-bind`, `v-on`/`@` with compiler and
//! runtime modifiers, `v-if` chains, `v-for`, `v-html`, `v-model`, `v-show` and custom
//! directives. Everything else is a static prop.

use lazy_static::lazy_static;
use std::collections::HashSet;

use crate::error::CompileError;
use crate::expression::pattern_bindings;
use crate::node::{
    ComponentRef, Conditional, Directive, Element, EventBinding, Expression, Fragment, Handler,
    Loop, Node, PathFlags, PropValue, Props, SlotOutlet, SlotTemplate, Text,
};
use crate::parse::DomNode;
use crate::preprocess::{DEFAULT_VALUE, V_ON, V_SLOT};

const V_SLOT_BARE: &str = "v-slot";
const V_MODEL: &str = "v-model";
const V_BIND: &str = "v-bind";
const DEFAULT_MODEL_PROP: &str = "modelValue";

lazy_static! {
    static ref HTML_TAGS: HashSet<&'static str> = [
        "a", "abbr", "address", "area", "article", "aside", "audio", "b", "base", "bdi", "bdo",
        "blockquote", "body", "br", "button", "canvas", "caption", "cite", "code", "col",
        "colgroup", "data", "datalist", "dd", "del", "details", "dfn", "dialog", "div", "dl",
        "dt", "em", "embed", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2",
        "h3", "h4", "h5", "h6", "head", "header", "hgroup", "hr", "html", "i", "iframe", "img",
        "input", "ins", "kbd", "label", "legend", "li", "link", "main", "map", "mark", "menu",
        "meta", "meter", "nav", "noscript", "object", "ol", "optgroup", "option", "output", "p",
        "param", "picture", "pre", "progress", "q", "rp", "rt", "ruby", "s", "samp", "section",
        "select", "small", "source", "span", "strong", "sub", "summary", "sup", "table", "tbody",
        "td", "textarea", "tfoot", "th", "thead", "time", "title", "tr", "track", "u", "ul",
        "var", "video", "wbr", "svg", "path", "g", "circle", "rect", "line", "polyline",
        "polygon", "ellipse", "defs", "use", "symbol", "text", "tspan", "mask", "pattern",
        "clipPath", "linearGradient", "radialGradient", "stop", "filter", "foreignObject",
    ]
    .into_iter()
    .collect();
}

pub fn is_html_tag(tag: &str) -> bool {
    HTML_TAGS.contains(tag)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Html,
    Component,
    DynamicComponent,
    Template,
    Slot,
}

impl TagKind {
    fn of(tag: &str) -> Self {
        match tag {
            "template" => TagKind::Template,
            "slot" => TagKind::Slot,
            "component" => TagKind::DynamicComponent,
            t if is_html_tag(t) => TagKind::Html,
            _ => TagKind::Component,
        }
    }

    fn is_component(self) -> bool {
        matches!(self, TagKind::Component | TagKind::DynamicComponent)
    }
}

/// A compiled child: either a standalone node or an else branch that must be linked
/// to the preceding conditional sibling.
enum Built {
    Node(Node),
    Else { directive: String, node: Node },
}

/// Builds the template root. The result is always a root [`Fragment`].
pub fn build_root(dom: &DomNode) -> Result<Node, CompileError> {
    let node = match build_node(dom)? {
        Built::Node(node) => node,
        Built::Else { directive, .. } => return Err(CompileError::UnexpectedElse { directive }),
    };
    Ok(match node {
        Node::Fragment(mut fragment) => {
            fragment.is_root = true;
            Node::Fragment(fragment)
        }
        other => Node::Fragment(Fragment {
            children: vec![other],
            path_flags: PathFlags::STABLE_FRAGMENT,
            is_root: true,
        }),
    })
}

/// Puts the scope attribute on the single HTML element the root resolves to.
pub fn inject_scope(node: &mut Node, attribute: &str, id: &str) -> Result<(), CompileError> {
    match node {
        Node::Element(element) => {
            element
                .props
                .insert(attribute, PropValue::Static(id.to_string()));
            Ok(())
        }
        Node::Fragment(fragment) if fragment.children.len() == 1 => {
            inject_scope(&mut fragment.children[0], attribute, id)
        }
        _ => Err(CompileError::ScopedStyleRoot),
    }
}

fn build_node(dom: &DomNode) -> Result<Built, CompileError> {
    match dom {
        DomNode::Text(text) => Ok(Built::Node(Node::Text(Text {
            literal: text.clone(),
        }))),
        DomNode::Interpolation(code) => Ok(Built::Node(Node::Expression(Expression::text(
            code.trim(),
        )))),
        DomNode::Element {
            name,
            attrs,
            children,
        } => ElementBuilder::new(name).build(attrs, children),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENT BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

struct ElementBuilder<'t> {
    tag: &'t str,
    kind: TagKind,
    props: Props,
    dynamic_props: Vec<String>,
    path_flags: PathFlags,
    directives: Vec<Directive>,
    spreads: Vec<Expression>,
    is: Option<PropValue>,
    slot_name: Option<String>,
    slot_props: Option<String>,
    if_test: Option<String>,
    else_directive: Option<String>,
    for_clause: Option<(String, String)>,
}

impl<'t> ElementBuilder<'t> {
    fn new(tag: &'t str) -> Self {
        Self {
            tag,
            kind: TagKind::of(tag),
            props: Props::default(),
            dynamic_props: Vec::new(),
            path_flags: PathFlags::empty(),
            directives: Vec::new(),
            spreads: Vec::new(),
            is: None,
            slot_name: None,
            slot_props: None,
            if_test: None,
            else_directive: None,
            for_clause: None,
        }
    }

    fn build(mut self, attrs: &[(String, String)], children: &[DomNode]) -> Result<Built, CompileError> {
        for (name, value) in attrs {
            self.attribute(name, value)?;
        }

        let structural = self.if_test.is_some() || self.for_clause.is_some();
        let (children, child_flags) = build_children(children, structural)?;
        self.path_flags |= child_flags;

        let if_test = self.if_test.take();
        let for_clause = self.for_clause.take();
        let else_directive = self.else_directive.take();
        let keyed = self.props.contains("key");

        let mut node = self.assemble(children);

        if let Some(test) = if_test {
            node = Node::Conditional(Conditional {
                test: Expression::new(test),
                consequent: Box::new(node),
                alternate: None,
            });
        }

        if let Some((pattern, iterable)) = for_clause {
            node = Node::Loop(Loop {
                pattern,
                iterable: Expression::new(iterable),
                body: Box::new(node),
                keyed,
            });
        }

        Ok(match else_directive {
            Some(directive) => Built::Else { directive, node },
            None => Built::Node(node),
        })
    }

    fn assemble(self, children: Vec<Node>) -> Node {
        match self.kind {
            TagKind::Html => Node::Element(Element {
                tag: self.tag.to_string(),
                props: self.props,
                children,
                directives: self.directives,
                path_flags: self.path_flags,
                dynamic_props: self.dynamic_props,
                spreads: self.spreads,
            }),
            TagKind::Component | TagKind::DynamicComponent => Node::Component(ComponentRef {
                name: self.tag.to_string(),
                is: self.is,
                props: self.props,
                children,
                directives: self.directives,
                path_flags: self.path_flags,
                dynamic_props: self.dynamic_props,
                spreads: self.spreads,
                slot_props: self.slot_props,
            }),
            TagKind::Template => match self.slot_name {
                Some(name) => Node::SlotTemplate(SlotTemplate {
                    name,
                    props_pattern: self.slot_props,
                    children,
                }),
                None => Node::Fragment(Fragment {
                    children,
                    path_flags: PathFlags::STABLE_FRAGMENT,
                    is_root: false,
                }),
            },
            TagKind::Slot => {
                let mut props = self.props;
                let name = props.remove("name");
                Node::SlotOutlet(SlotOutlet {
                    name,
                    props,
                    children,
                })
            }
        }
    }

    fn attribute(&mut self, name: &str, value: &str) -> Result<(), CompileError> {
        if name == V_SLOT_BARE || name.starts_with(V_SLOT) {
            return self.slot_directive(name, value);
        }
        if let Some(prop) = name.strip_prefix(':') {
            self.bind(prop, value);
            return Ok(());
        }
        if let Some(prop) = name.strip_prefix("v-bind:") {
            self.bind(prop, value);
            return Ok(());
        }
        if name == V_BIND {
            self.spreads.push(Expression::new(value));
            self.path_flags |= PathFlags::FULL_PROPS;
            return Ok(());
        }
        if name.starts_with(V_ON) {
            return self.event(name, value);
        }

        match name {
            "v-if" => self.if_test = Some(value.to_string()),
            "v-else-if" | "v-elseif" => {
                self.if_test = Some(value.to_string());
                self.else_directive = Some(name.to_string());
            }
            "v-else" => self.else_directive = Some(name.to_string()),
            "v-for" => self.for_clause = Some(parse_for(value)?),
            "v-html" => {
                self.props
                    .insert("innerHTML", PropValue::Dynamic(Expression::new(value)));
                self.dynamic_props.push("innerHTML".to_string());
                self.path_flags |= PathFlags::PROPS;
            }
            _ if name == V_MODEL || name.starts_with("v-model:") || name.starts_with("v-model.") => {
                self.model(name, value)?
            }
            _ if name.starts_with("v-") => self.directives.push(parse_directive(name, value)),
            _ => self.plain(name, value),
        }
        Ok(())
    }

    fn slot_directive(&mut self, name: &str, value: &str) -> Result<(), CompileError> {
        let slot = name
            .strip_prefix(V_SLOT)
            .filter(|s| !s.is_empty())
            .unwrap_or("default")
            .to_string();
        let pattern = Some(value.trim())
            .filter(|v| !v.is_empty() && *v != DEFAULT_VALUE)
            .map(str::to_string);

        match self.kind {
            TagKind::Template => {
                self.slot_name = Some(slot);
                self.slot_props = pattern;
            }
            TagKind::Component | TagKind::DynamicComponent => {
                if slot != "default" {
                    return Err(CompileError::NamedSlotOnComponent {
                        slot,
                        component: self.tag.to_string(),
                    });
                }
                self.slot_props = pattern;
            }
            TagKind::Html | TagKind::Slot => {
                tracing::warn!(tag = self.tag, slot = %slot, "v-slot ignored on non-component element");
            }
        }
        Ok(())
    }

    fn bind(&mut self, prop: &str, value: &str) {
        let code = if value == DEFAULT_VALUE { "true" } else { value };
        let expression = Expression::new(code);

        if self.kind == TagKind::DynamicComponent && prop == "is" {
            self.is = Some(PropValue::Dynamic(expression));
            return;
        }

        self.path_flags |= PathFlags::PROPS;
        self.dynamic_props.push(prop.to_string());
        if prop == "class" {
            self.props.add_class(PropValue::Dynamic(expression));
        } else {
            self.props.insert(prop, PropValue::Dynamic(expression));
        }
    }

    fn plain(&mut self, name: &str, value: &str) {
        let value = if value == DEFAULT_VALUE {
            if self.kind.is_component() {
                PropValue::Dynamic(Expression::new("true"))
            } else {
                PropValue::Static(String::new())
            }
        } else {
            PropValue::Static(value.to_string())
        };

        if self.kind == TagKind::DynamicComponent && name == "is" {
            self.is = Some(value);
        } else if name == "class" {
            self.props.add_class(value);
        } else {
            self.props.insert(name, value);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EVENTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn event(&mut self, name: &str, value: &str) -> Result<(), CompileError> {
        let mut parts = name[V_ON.len()..].split('.');
        let event = parts.next().unwrap_or_default().to_string();
        let (compiler, client): (Vec<&str>, Vec<&str>) = parts.partition(|m| is_compiler_modifier(m));

        let mut handler = Handler {
            code: value.to_string(),
            modifiers: client.iter().map(|m| m.to_string()).collect(),
            is_function: false,
        };
        for modifier in compiler {
            apply_compiler_modifier(&mut handler, modifier)?;
        }
        self.add_handler(&event, handler);
        Ok(())
    }

    fn model(&mut self, name: &str, value: &str) -> Result<(), CompileError> {
        let mut parts = name.split('.');
        let head = parts.next().unwrap_or(V_MODEL);
        let prop = head
            .split_once(':')
            .map(|(_, p)| p)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_MODEL_PROP)
            .to_string();
        let (invokes, client): (Vec<&str>, Vec<&str>) =
            parts.partition(|m| m.starts_with("invoke:"));
        let modifiers: Vec<String> = client.iter().map(|m| m.to_string()).collect();

        self.path_flags |= PathFlags::PROPS;
        self.dynamic_props.push(prop.clone());
        self.props
            .insert(prop.as_str(), PropValue::Dynamic(Expression::new(value)));

        let event = format!("update:{}", prop);
        self.add_handler(
            &event,
            Handler {
                code: format!("{}=$event;", value),
                modifiers: modifiers.clone(),
                is_function: false,
            },
        );
        for modifier in invokes {
            let (action, args) = invoke_parts(modifier)?;
            self.add_handler(
                &event,
                Handler {
                    code: format!("await invoke('{}',[{}]);", action, args),
                    modifiers: modifiers.clone(),
                    is_function: false,
                },
            );
        }
        Ok(())
    }

    fn add_handler(&mut self, event: &str, handler: Handler) {
        let prop = EventBinding::prop_name(event);
        match self.props.get_mut(&prop) {
            Some(PropValue::Event(binding)) => binding.handlers.push(handler),
            _ => {
                self.props.insert(
                    prop.as_str(),
                    PropValue::Event(EventBinding {
                        event: event.to_string(),
                        handlers: vec![handler],
                    }),
                );
                self.dynamic_props.push(prop);
            }
        }
    }
}

fn build_children(
    children: &[DomNode],
    structural_parent: bool,
) -> Result<(Vec<Node>, PathFlags), CompileError> {
    let mut nodes: Vec<Node> = Vec::with_capacity(children.len());
    let mut flags = PathFlags::empty();

    for child in children {
        match build_node(child)? {
            Built::Node(node) => {
                match &node {
                    Node::Expression(_) => flags |= PathFlags::DYNAMIC_SLOTS,
                    Node::SlotOutlet(_) if structural_parent => flags |= PathFlags::DYNAMIC_SLOTS,
                    _ => {}
                }
                nodes.push(node);
            }
            Built::Else { directive, node } => match nodes.last_mut() {
                Some(Node::Conditional(conditional)) => conditional
                    .attach_alternate(node)
                    .map_err(|_| CompileError::UnexpectedElse {
                        directive: directive.clone(),
                    })?,
                _ => return Err(CompileError::UnexpectedElse { directive }),
            },
        }
    }

    Ok((nodes, flags))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTIVE VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// Splits `pattern in iterable` (or `of`).
fn parse_for(value: &str) -> Result<(String, String), CompileError> {
    let (pattern, iterable) = value
        .split_once(" in ")
        .or_else(|| value.split_once(" of "))
        .ok_or_else(|| CompileError::InvalidLoop(value.to_string()))?;
    let (pattern, iterable) = (pattern.trim(), iterable.trim());
    if iterable.is_empty() || pattern_bindings(pattern).is_empty() {
        return Err(CompileError::InvalidLoop(value.to_string()));
    }
    Ok((pattern.to_string(), iterable.to_string()))
}

/// `v-name:arg.mod1.mod2` or `v-name.mod`.
fn parse_directive(name: &str, value: &str) -> Directive {
    let body = &name[2..];
    let (head, arg_part) = match body.split_once(':') {
        Some((head, rest)) => (head, Some(rest)),
        None => (body, None),
    };

    let (directive, arg, modifiers) = match arg_part {
        Some(rest) => {
            let mut segments = rest.split('.');
            let arg = segments.next().filter(|a| !a.is_empty()).map(str::to_string);
            (head.to_string(), arg, segments.map(str::to_string).collect())
        }
        None => {
            let mut segments = head.split('.');
            let directive = segments.next().unwrap_or_default().to_string();
            (directive, None, segments.map(str::to_string).collect())
        }
    };

    let value = Some(value.trim())
        .filter(|v| !v.is_empty() && *v != DEFAULT_VALUE)
        .map(Expression::new);

    Directive {
        name: directive,
        arg,
        modifiers,
        value,
    }
}

fn is_compiler_modifier(modifier: &str) -> bool {
    modifier.starts_with("invoke:")
        || modifier.starts_with("throttle:")
        || modifier.starts_with("debounce:")
}

fn apply_compiler_modifier(handler: &mut Handler, modifier: &str) -> Result<(), CompileError> {
    if modifier.starts_with("invoke:") {
        let (action, args) = invoke_parts(modifier)?;
        handler.code = format!("{};await invoke('{}',[{}]);", handler.code, action, args);
        return Ok(());
    }

    let (helper, amount) = modifier.split_once(':').unwrap_or((modifier, ""));
    let ms: String = amount.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    let ms = if ms.is_empty() { "0".to_string() } else { ms };
    handler.code = format!("$flow.{}(($event)=>{{{}}},{})", helper, handler.code, ms);
    handler.is_function = true;
    Ok(())
}

/// `invoke:action:arg1:arg2`: arguments are trimmed and an unquoted `@` stands for `.`.
fn invoke_parts(modifier: &str) -> Result<(String, String), CompileError> {
    let mut parts = modifier.split(':').skip(1);
    let action = parts
        .next()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| CompileError::InvalidDirective {
            directive: modifier.to_string(),
            reason: "invoke modifier requires an action name".to_string(),
        })?;
    let args: Vec<String> = parts
        .map(|arg| {
            let arg = arg.trim();
            if arg.starts_with('\'') || arg.starts_with('"') {
                arg.to_string()
            } else {
                arg.replace('@', ".")
            }
        })
        .collect();
    Ok((action.to_string(), args.join(",")))
}
