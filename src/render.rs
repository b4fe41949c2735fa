//! Render emission: [`Node`] tree to render-function body.
//!
//! Every node kind renders to a single JavaScript expression built from the runtime
//! helper namespace (`v` by default). The root fragment additionally emits the alias
//! prelude and the `return`.

use lazy_static::lazy_static;
use regex::Regex;
use std::cell::Cell;
use std::rc::Rc;

use crate::context::{json_string, Context};
use crate::expression::pattern_bindings;
use crate::node::{
    ComponentRef, Conditional, Directive, Element, EventBinding, Expression, Fragment, Handler,
    Loop, Node, PathFlags, PropValue, Props, SlotOutlet, SlotTemplate,
};

/// Modifiers applied through `withModifiers`; everything else goes to `withKeys`.
const EVENT_MODIFIERS: &[&str] = &["stop", "prevent", "self", "capture", "once", "passive"];

const RESERVED_WORDS: &[&str] = &[
    "abstract", "arguments", "await", "boolean", "break", "byte", "case", "catch", "char",
    "class", "const", "continue", "debugger", "default", "delete", "do", "double", "else",
    "enum", "eval", "export", "extends", "false", "final", "finally", "float", "for",
    "function", "goto", "if", "implements", "import", "in", "instanceof", "int", "interface",
    "let", "long", "native", "new", "null", "package", "private", "protected", "public",
    "return", "short", "static", "super", "switch", "synchronized", "this", "throw", "throws",
    "transient", "true", "try", "typeof", "var", "void", "volatile", "while", "with", "yield",
];

lazy_static! {
    static ref JS_NAME_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

/// Renders any node to a JavaScript expression (or, for the root fragment, a function body).
pub fn render_node(node: &Node, ctx: &Context) -> String {
    match node {
        Node::Element(element) => render_element(element, ctx),
        Node::Component(component) => render_component(component, ctx),
        Node::Conditional(conditional) => render_conditional(conditional, ctx),
        Node::Loop(lp) => render_loop(lp, ctx),
        Node::SlotTemplate(template) => render_loose_template(template, ctx),
        Node::SlotOutlet(outlet) => render_slot_outlet(outlet, ctx),
        Node::Text(text) => format!("{}.createTextVNode({})", ctx.rt(), json_string(&text.literal)),
        Node::Expression(expression) => {
            let code = ctx.rewrite_expression(&expression.code);
            if expression.is_text {
                format!("{0}.createTextVNode({0}.toDisplayString({1}))", ctx.rt(), code)
            } else {
                code
            }
        }
        Node::Fragment(fragment) => render_fragment(fragment, ctx),
    }
}

fn render_children(children: &[Node], ctx: &Context) -> String {
    let ctx = ctx.without_new_block();
    children
        .iter()
        .map(|child| render_node(child, &ctx))
        .collect::<Vec<_>>()
        .join(",")
}

fn json_array(items: &[String]) -> String {
    serde_json::Value::from(items.to_vec()).to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENTS & COMPONENTS
// ═══════════════════════════════════════════════════════════════════════════════

fn render_element(element: &Element, ctx: &Context) -> String {
    let rt = ctx.rt();
    let props = render_props(&element.props, &element.spreads, ctx);
    let children = render_children(&element.children, ctx);

    let mut args = format!("{},{},[{}]", json_string(&element.tag), props, children);
    if !element.path_flags.is_empty() || !element.dynamic_props.is_empty() {
        args.push_str(&format!(",{}", element.path_flags.bits()));
    }
    if !element.dynamic_props.is_empty() {
        args.push_str(&format!(",{}", json_array(&element.dynamic_props)));
    }

    let vnode = if ctx.new_block() {
        format!("({0}.openBlock(),{0}.createElementBlock({1}))", rt, args)
    } else {
        format!("{}.createElementVNode({})", rt, args)
    };
    with_directives(vnode, &element.directives, ctx)
}

fn render_component(component: &ComponentRef, ctx: &Context) -> String {
    let rt = ctx.rt();
    let tag = match (&component.is, component.name.as_str()) {
        (Some(is), "component") => format!(
            "{}.resolveDynamicComponent({})",
            rt,
            render_value(is, ctx)
        ),
        _ => ctx.resolve_component(&component.name),
    };
    let props = render_props(&component.props, &component.spreads, ctx);
    let slots = component
        .slot_templates()
        .iter()
        .map(|slot| render_slot_closure(slot, ctx))
        .collect::<Vec<_>>()
        .join(",");

    let args = format!(
        "{},{},{{{}}},{},{}",
        tag,
        props,
        slots,
        component.path_flags.bits(),
        json_array(&component.dynamic_props)
    );
    let vnode = if ctx.new_block() {
        format!("({0}.openBlock(),{0}.createBlock({1}))", rt, args)
    } else {
        format!("{}.createVNode({})", rt, args)
    };
    with_directives(vnode, &component.directives, ctx)
}

/// `"name":v.withCtx((pattern)=>{return [..];})`; pattern bindings are local inside.
fn render_slot_closure(slot: &SlotTemplate, ctx: &Context) -> String {
    let pattern = slot.props_pattern.as_deref().unwrap_or("");
    let scope = if pattern.is_empty() {
        ctx.clone()
    } else {
        ctx.add_scope(pattern_bindings(pattern))
    };
    format!(
        "{}:{}.withCtx(({})=>{{return [{}];}})",
        json_string(&slot.name),
        ctx.rt(),
        pattern,
        render_children(&slot.children, &scope)
    )
}

/// A named template outside a component has no slot to fill: its children render inline.
fn render_loose_template(template: &SlotTemplate, ctx: &Context) -> String {
    render_fragment(
        &Fragment {
            children: template.children.clone(),
            path_flags: PathFlags::STABLE_FRAGMENT,
            is_root: false,
        },
        ctx,
    )
}

fn render_slot_outlet(outlet: &SlotOutlet, ctx: &Context) -> String {
    let name = match &outlet.name {
        Some(value) => render_value(value, ctx),
        None => json_string("default"),
    };
    let props = render_props(&outlet.props, &[], ctx);
    if outlet.children.is_empty() {
        format!("{}.renderSlot(this.$slots,{},{})", ctx.rt(), name, props)
    } else {
        format!(
            "{}.renderSlot(this.$slots,{},{},()=>[{}])",
            ctx.rt(),
            name,
            props,
            render_children(&outlet.children, ctx)
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPS & DIRECTIVES
// ═══════════════════════════════════════════════════════════════════════════════

fn render_props(props: &Props, spreads: &[Expression], ctx: &Context) -> String {
    let entries: Vec<String> = props
        .iter()
        .map(|(name, value)| {
            let rendered = match (name, value) {
                ("class", value) => render_class(value, ctx),
                (_, PropValue::Event(binding)) => render_event(binding, ctx),
                (_, value) => render_value(value, ctx),
            };
            format!("{}:{}", json_string(name), rendered)
        })
        .collect();
    let object = format!("{{{}}}", entries.join(","));

    if spreads.is_empty() {
        return object;
    }
    let sources: Vec<String> = spreads
        .iter()
        .map(|spread| ctx.rewrite_expression(&spread.code))
        .collect();
    format!("{}.mergeProps({},{})", ctx.rt(), object, sources.join(","))
}

fn render_value(value: &PropValue, ctx: &Context) -> String {
    match value {
        PropValue::Static(text) => json_string(text),
        PropValue::Dynamic(expression) => ctx.rewrite_expression(&expression.code),
        PropValue::Class(_) => render_class(value, ctx),
        PropValue::Event(binding) => render_event(binding, ctx),
    }
}

fn render_class(value: &PropValue, ctx: &Context) -> String {
    match value {
        PropValue::Static(text) => json_string(text),
        PropValue::Class(sources) => {
            let items: Vec<String> = sources.iter().map(|s| render_value(s, ctx)).collect();
            format!("{}.normalizeClass([{}])", ctx.rt(), items.join(","))
        }
        other => format!("{}.normalizeClass({})", ctx.rt(), render_value(other, ctx)),
    }
}

fn with_directives(vnode: String, directives: &[Directive], ctx: &Context) -> String {
    if directives.is_empty() {
        return vnode;
    }
    let entries: Vec<String> = directives
        .iter()
        .map(|directive| {
            let alias = ctx.resolve_directive(&directive.name);
            let value = directive
                .value
                .as_ref()
                .map(|v| ctx.rewrite_expression(&v.code))
                .unwrap_or_else(|| "void 0".to_string());
            let arg = directive
                .arg
                .as_deref()
                .map(json_string)
                .unwrap_or_else(|| "void 0".to_string());
            let modifiers: serde_json::Map<String, serde_json::Value> = directive
                .modifiers
                .iter()
                .map(|m| (m.clone(), serde_json::Value::Bool(true)))
                .collect();
            format!(
                "[{},{},{},{}]",
                alias,
                value,
                arg,
                serde_json::Value::Object(modifiers)
            )
        })
        .collect();
    format!("{}.withDirectives({},[{}])", ctx.rt(), vnode, entries.join(","))
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

fn is_valid_js_name(name: &str) -> bool {
    JS_NAME_RE.is_match(name) && !RESERVED_WORDS.contains(&name.to_lowercase().as_str())
}

fn render_event(binding: &EventBinding, ctx: &Context) -> String {
    let scope = ctx.add_scope(["$args"]);
    let handlers: Vec<String> = binding
        .handlers
        .iter()
        .map(|handler| render_handler(handler, &scope))
        .collect();

    if handlers.len() == 1 {
        handlers.into_iter().next().unwrap_or_default()
    } else {
        format!("[{}]", handlers.join(","))
    }
}

fn render_handler(handler: &Handler, scope: &Context) -> String {
    let is_async = Rc::new(Cell::new(false));
    let seen = Rc::clone(&is_async);
    let ctx = scope.with_identifier_hook(Rc::new(move |name: &str| {
        if name == "await" {
            seen.set(true);
        }
        name.to_string()
    }));
    let body = ctx.rewrite_expression(&handler.code);

    let mut js = if handler.is_function {
        format!("{}.bind(this)", body)
    } else if is_valid_js_name(handler.code.trim()) {
        format!("{0} && {0}.bind(this)", body)
    } else {
        let prefix = if is_async.get() { "async " } else { "" };
        format!("{}($event,...$args) => {{ {} }}", prefix, body)
    };

    let (event_mods, key_mods): (Vec<String>, Vec<String>) = handler
        .modifiers
        .iter()
        .cloned()
        .partition(|m| EVENT_MODIFIERS.contains(&m.as_str()));
    if !event_mods.is_empty() {
        js = format!("{}.withModifiers({},{})", ctx.rt(), js, json_array(&event_mods));
    }
    if !key_mods.is_empty() {
        js = format!("{}.withKeys({},{})", ctx.rt(), js, json_array(&key_mods));
    }
    js
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROL FLOW
// ═══════════════════════════════════════════════════════════════════════════════

fn render_conditional(conditional: &Conditional, ctx: &Context) -> String {
    let test = ctx.rewrite_expression(&conditional.test.code);
    let branch_ctx = ctx.with_new_block();
    let consequent = render_node(&conditional.consequent, &branch_ctx);
    let alternate = match &conditional.alternate {
        Some(alternate) => render_node(alternate, &branch_ctx),
        None => format!("{}.createCommentVNode(\"v-if\", true)", ctx.rt()),
    };
    format!("({}?{}:{})", test, consequent, alternate)
}

fn render_loop(lp: &Loop, ctx: &Context) -> String {
    let iterable = ctx.rewrite_expression(&lp.iterable.code);
    let scope = ctx.add_scope(pattern_bindings(&lp.pattern));
    let pattern = lp.pattern.trim();
    let pattern = if pattern.starts_with('{') || pattern.starts_with('[') {
        format!("({})", pattern)
    } else {
        pattern.to_string()
    };
    let body_ctx = if lp.keyed {
        scope.without_new_block()
    } else {
        scope.with_new_block()
    };
    format!(
        "({}.renderList({},{} => {}))",
        ctx.rt(),
        iterable,
        pattern,
        render_node(&lp.body, &body_ctx)
    )
}

fn render_fragment(fragment: &Fragment, ctx: &Context) -> String {
    let body = if fragment.children.len() == 1 {
        let child_ctx = if fragment.is_root {
            ctx.with_new_block()
        } else {
            ctx.clone()
        };
        render_node(&fragment.children[0], &child_ctx)
    } else {
        format!(
            "({0}.openBlock(),{0}.createElementBlock({0}.Fragment,null,[{1}],{2}))",
            ctx.rt(),
            render_children(&fragment.children, ctx),
            fragment.path_flags.bits()
        )
    };

    if !fragment.is_root {
        return body;
    }
    match ctx.prelude() {
        Some(prelude) => format!("{}; return {};", prelude, body),
        None => format!("return {};", body),
    }
}
