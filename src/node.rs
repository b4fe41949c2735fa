//! Node/element model produced by the compile pass and consumed by the renderer.

use bitflags::bitflags;

bitflags! {
    /// Optimization hints for the runtime differ. Values match the runtime's patch flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PathFlags: u32 {
        const TEXT = 1;
        const CLASS = 1 << 1;
        const STYLE = 1 << 2;
        const PROPS = 1 << 3;
        const FULL_PROPS = 1 << 4;
        const NEED_HYDRATION = 1 << 5;
        const STABLE_FRAGMENT = 1 << 6;
        const KEYED_FRAGMENT = 1 << 7;
        const UNKEYED_FRAGMENT = 1 << 8;
        const NEED_PATCH = 1 << 9;
        const DYNAMIC_SLOTS = 1 << 10;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Component(ComponentRef),
    Conditional(Conditional),
    Loop(Loop),
    SlotTemplate(SlotTemplate),
    SlotOutlet(SlotOutlet),
    Text(Text),
    Expression(Expression),
    Fragment(Fragment),
}

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Element(_) => "element",
            Node::Component(_) => "component",
            Node::Conditional(_) => "conditional",
            Node::Loop(_) => "loop",
            Node::SlotTemplate(_) => "slot-template",
            Node::SlotOutlet(_) => "slot-outlet",
            Node::Text(_) => "text",
            Node::Expression(_) => "expression",
            Node::Fragment(_) => "fragment",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Static(String),
    Dynamic(Expression),
    /// Several `class` sources normalized together.
    Class(Vec<PropValue>),
    Event(EventBinding),
}

/// Insertion-ordered property map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props(Vec<(String, PropValue)>);

impl Props {
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PropValue> {
        self.0.iter_mut().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: PropValue) {
        let name = name.into();
        match self.get_mut(&name) {
            Some(slot) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<PropValue> {
        let index = self.0.iter().position(|(k, _)| k == name)?;
        Some(self.0.remove(index).1)
    }

    /// Adds a `class` source, merging with an existing one.
    pub fn add_class(&mut self, value: PropValue) {
        match self.get_mut("class") {
            Some(PropValue::Class(list)) => list.push(value),
            Some(existing) => {
                let first = std::mem::replace(existing, PropValue::Class(Vec::new()));
                *existing = PropValue::Class(vec![first, value]);
            }
            None => self.0.push(("class".to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub arg: Option<String>,
    pub modifiers: Vec<String>,
    pub value: Option<Expression>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE VARIANTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub tag: String,
    pub props: Props,
    pub children: Vec<Node>,
    pub directives: Vec<Directive>,
    pub path_flags: PathFlags,
    pub dynamic_props: Vec<String>,
    /// `v-bind="obj"` sources merged over the props object.
    pub spreads: Vec<Expression>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentRef {
    pub name: String,
    /// Target of `<component :is="…">`.
    pub is: Option<PropValue>,
    pub props: Props,
    pub children: Vec<Node>,
    pub directives: Vec<Directive>,
    pub path_flags: PathFlags,
    pub dynamic_props: Vec<String>,
    pub spreads: Vec<Expression>,
    /// Destructure pattern of `v-slot` placed on the component tag itself.
    pub slot_props: Option<String>,
}

impl ComponentRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Groups children into slot templates: named templates merge by name, anything
    /// else lands in `default`, which carries the component-level slot pattern.
    pub fn slot_templates(&self) -> Vec<SlotTemplate> {
        let mut slots: Vec<SlotTemplate> = Vec::new();
        let mut loose = Vec::new();

        for child in &self.children {
            match child {
                Node::SlotTemplate(template) => {
                    match slots.iter_mut().find(|s| s.name == template.name) {
                        Some(existing) => existing.children.extend(template.children.iter().cloned()),
                        None => slots.push(template.clone()),
                    }
                }
                other => loose.push(other.clone()),
            }
        }

        if !loose.is_empty() {
            match slots.iter_mut().find(|s| s.name == "default") {
                Some(default) => default.children.extend(loose),
                None => slots.push(SlotTemplate {
                    name: "default".to_string(),
                    props_pattern: self.slot_props.clone(),
                    children: loose,
                }),
            }
        }

        slots
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub test: Expression,
    pub consequent: Box<Node>,
    pub alternate: Option<Box<Node>>,
}

impl Conditional {
    /// Links an else/else-if branch at the end of the chain. Returns the node back
    /// when the chain already ends in a plain `v-else`.
    pub fn attach_alternate(&mut self, node: Node) -> Result<(), Node> {
        match &mut self.alternate {
            None => {
                self.alternate = Some(Box::new(node));
                Ok(())
            }
            Some(alternate) => match alternate.as_mut() {
                Node::Conditional(next) => next.attach_alternate(node),
                _ => Err(node),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    /// Item pattern exactly as written, e.g. `(item, index)`.
    pub pattern: String,
    pub iterable: Expression,
    pub body: Box<Node>,
    /// Body carries a `key` prop; keyed bodies render without opening a block.
    pub keyed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotTemplate {
    pub name: String,
    pub props_pattern: Option<String>,
    pub children: Vec<Node>,
}

/// `<slot>` placeholder rendered by a component for its caller's content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotOutlet {
    pub name: Option<PropValue>,
    pub props: Props,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    pub literal: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expression {
    pub code: String,
    /// Rendered as a text node rather than a bare value.
    pub is_text: bool,
}

impl Expression {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            is_text: false,
        }
    }

    pub fn text(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            is_text: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    pub code: String,
    pub modifiers: Vec<String>,
    /// The code already evaluates to a function (debounce/throttle wrappers).
    pub is_function: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBinding {
    pub event: String,
    pub handlers: Vec<Handler>,
}

impl EventBinding {
    pub fn prop_name(event: &str) -> String {
        let mut chars = event.chars();
        match chars.next() {
            Some(first) => format!("on{}{}", first.to_uppercase(), chars.as_str()),
            None => "on".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub children: Vec<Node>,
    pub path_flags: PathFlags,
    /// Template root: renders the alias prelude and the `return`.
    pub is_root: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Node {
        Node::Text(Text {
            literal: s.to_string(),
        })
    }

    #[test]
    fn test_class_sources_accumulate() {
        let mut props = Props::default();
        props.add_class(PropValue::Static("a".to_string()));
        props.add_class(PropValue::Dynamic(Expression::new("b")));
        props.add_class(PropValue::Dynamic(Expression::new("c")));
        match props.get("class") {
            Some(PropValue::Class(list)) => assert_eq!(list.len(), 3),
            other => panic!("unexpected class value: {:?}", other),
        }
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn test_else_if_chain_links_through_alternates() {
        let mut cond = Conditional {
            test: Expression::new("a"),
            consequent: Box::new(text("A")),
            alternate: None,
        };
        let else_if = Node::Conditional(Conditional {
            test: Expression::new("b"),
            consequent: Box::new(text("B")),
            alternate: None,
        });
        assert!(cond.attach_alternate(else_if).is_ok());
        assert!(cond.attach_alternate(text("C")).is_ok());
        assert!(cond.attach_alternate(text("D")).is_err());

        match cond.alternate.as_deref() {
            Some(Node::Conditional(inner)) => {
                assert_eq!(inner.alternate.as_deref(), Some(&text("C")));
            }
            other => panic!("expected nested conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_slot_templates_group_default_content() {
        let mut component = ComponentRef::new("Card");
        component.slot_props = Some("{ open }".to_string());
        component.children = vec![
            Node::SlotTemplate(SlotTemplate {
                name: "header".to_string(),
                props_pattern: None,
                children: vec![text("H")],
            }),
            text("body"),
            Node::SlotTemplate(SlotTemplate {
                name: "header".to_string(),
                props_pattern: None,
                children: vec![text("H2")],
            }),
        ];

        let slots = component.slot_templates();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].name, "header");
        assert_eq!(slots[0].children.len(), 2);
        assert_eq!(slots[1].name, "default");
        assert_eq!(slots[1].props_pattern.as_deref(), Some("{ open }"));
    }

    #[test]
    fn test_event_prop_name() {
        assert_eq!(EventBinding::prop_name("click"), "onClick");
        assert_eq!(EventBinding::prop_name("update:modelValue"), "onUpdate:modelValue");
    }
}
