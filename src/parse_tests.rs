#[cfg(test)]
mod tests {
    use crate::builder::build_root;
    use crate::error::CompileError;
    use crate::node::{Node, PathFlags, PropValue};
    use crate::parse::{parse_root, DomNode};
    use crate::preprocess::preprocess;

    fn dom(template: &str) -> Result<DomNode, CompileError> {
        parse_root(&preprocess(template))
    }

    fn build(template: &str) -> Result<Node, CompileError> {
        build_root(&dom(template)?)
    }

    /// The single node under the root fragment.
    fn top(template: &str) -> Node {
        match build(template).unwrap() {
            Node::Fragment(fragment) => {
                assert!(fragment.is_root);
                assert_eq!(fragment.children.len(), 1);
                fragment.children.into_iter().next().unwrap()
            }
            other => panic!("expected root fragment, got {}", other.kind()),
        }
    }

    fn children(node: &Node) -> &[Node] {
        match node {
            Node::Element(el) => &el.children,
            Node::Component(c) => &c.children,
            Node::Fragment(f) => &f.children,
            other => panic!("{} has no children", other.kind()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STRUCTURAL PARSER
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_names_survive_html_parsing() {
        let root = dom(r#"<UserCard :userName="name" v-on:click.stop="go"><template #footer>x</template></UserCard>"#)
            .unwrap();
        match root {
            DomNode::Element {
                name,
                attrs,
                children,
            } => {
                assert_eq!(name, "UserCard");
                assert_eq!(
                    attrs,
                    vec![
                        (":userName".to_string(), "name".to_string()),
                        ("v-on:click.stop".to_string(), "go".to_string()),
                    ]
                );
                assert_eq!(children[0].element_name(), Some("template"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_whitespace_and_comments_are_dropped() {
        let root = dom("\n  <!-- header -->\n  <div>\n    <!-- c -->\n    <span>a</span>\n  </div>\n").unwrap();
        match root {
            DomNode::Element { children, .. } => {
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].element_name(), Some("span"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_root_count_is_enforced() {
        assert_eq!(dom("<p>a</p><p>b</p>").unwrap_err(), CompileError::MultipleRoots);
        assert_eq!(dom("  <!-- nothing -->  ").unwrap_err(), CompileError::EmptyTemplate);
    }

    #[test]
    fn test_interpolation_is_decoded() {
        let root = dom("<p>Total: {{ price * qty }}</p>").unwrap();
        match root {
            DomNode::Element { children, .. } => {
                assert_eq!(children[0], DomNode::Text("Total: ".to_string()));
                assert_eq!(
                    children[1],
                    DomNode::Interpolation(" price * qty ".to_string())
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONDITIONALS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_else_if_chain_links_through_alternate() {
        let div = top(r#"<div><p v-if="a">A</p><p v-else-if="b">B</p><p v-elseif="c">C</p><p v-else>D</p></div>"#);
        let kids = children(&div);
        assert_eq!(kids.len(), 1);

        let Node::Conditional(first) = &kids[0] else { panic!("expected conditional") };
        assert_eq!(first.test.code, "a");
        let Some(Node::Conditional(second)) = first.alternate.as_deref() else { panic!() };
        assert_eq!(second.test.code, "b");
        let Some(Node::Conditional(third)) = second.alternate.as_deref() else { panic!() };
        assert_eq!(third.test.code, "c");
        assert!(matches!(third.alternate.as_deref(), Some(Node::Element(_))));
    }

    #[test]
    fn test_else_without_conditional_fails() {
        assert_eq!(
            build(r#"<div><span></span><p v-else>x</p></div>"#).unwrap_err(),
            CompileError::UnexpectedElse {
                directive: "v-else".to_string()
            }
        );
        assert_eq!(
            build(r#"<div><p v-if="a"></p><p v-else></p><p v-else-if="b"></p></div>"#).unwrap_err(),
            CompileError::UnexpectedElse {
                directive: "v-else-if".to_string()
            }
        );
        assert_eq!(
            build(r#"<p v-else>x</p>"#).unwrap_err().to_string(),
            "unexpected v-else"
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOOPS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_keyed_loop() {
        let ul = top(r#"<ul><li v-for="(item, i) in items" :key="item.id">{{ item.label }}</li></ul>"#);
        let Node::Loop(lp) = &children(&ul)[0] else { panic!("expected loop") };
        assert_eq!(lp.pattern, "(item, i)");
        assert_eq!(lp.iterable.code, "items");
        assert!(lp.keyed);

        let Node::Element(li) = lp.body.as_ref() else { panic!("expected element body") };
        assert!(li.path_flags.contains(PathFlags::DYNAMIC_SLOTS));
        assert!(li.props.contains("key"));
    }

    #[test]
    fn test_loop_wraps_conditional() {
        let ul = top(r#"<ul><li v-for="row of rows" v-if="row.visible">x</li></ul>"#);
        let Node::Loop(lp) = &children(&ul)[0] else { panic!("expected loop") };
        assert!(!lp.keyed);
        assert!(matches!(lp.body.as_ref(), Node::Conditional(_)));
    }

    #[test]
    fn test_malformed_loop_fails() {
        assert_eq!(
            build(r#"<ul><li v-for="items">x</li></ul>"#).unwrap_err(),
            CompileError::InvalidLoop("items".to_string())
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SLOTS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_component_level_slot_pattern() {
        let card = top(r#"<Card v-slot="{ open }"><p>{{ open }}</p><span>more</span></Card>"#);
        let Node::Component(card) = card else { panic!("expected component") };
        let slots = card.slot_templates();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].name, "default");
        assert_eq!(slots[0].props_pattern.as_deref(), Some("{ open }"));
        assert_eq!(slots[0].children.len(), 2);
    }

    #[test]
    fn test_named_slot_on_component_fails() {
        let err = build(r#"<Card #header="h"></Card>"#).unwrap_err();
        assert_eq!(
            err,
            CompileError::NamedSlotOnComponent {
                slot: "header".to_string(),
                component: "Card".to_string()
            }
        );
        assert_eq!(
            err.to_string(),
            "Named slot \"header\" cannot be declared on component <Card>; use <template v-slot:header> instead"
        );
    }

    #[test]
    fn test_template_slots_group_by_name() {
        let card = top(
            r#"<Card><template v-slot="{ user }">{{ user.name }}</template><template #footer>a</template><template #footer>b</template></Card>"#,
        );
        let Node::Component(card) = card else { panic!("expected component") };
        let slots = card.slot_templates();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].name, "default");
        assert_eq!(slots[0].props_pattern.as_deref(), Some("{ user }"));
        assert_eq!(slots[1].name, "footer");
        assert_eq!(slots[1].props_pattern, None);
        assert_eq!(slots[1].children.len(), 2);
    }

    #[test]
    fn test_slot_outlet_and_unnamed_template() {
        let div = top(r#"<div><slot name="actions" :item="row">fallback</slot><template><b>1</b><i>2</i></template></div>"#);
        let kids = children(&div);

        let Node::SlotOutlet(outlet) = &kids[0] else { panic!("expected slot outlet") };
        assert_eq!(outlet.name, Some(PropValue::Static("actions".to_string())));
        assert!(outlet.props.contains("item"));
        assert!(!outlet.props.contains("name"));
        assert_eq!(outlet.children.len(), 1);

        let Node::Fragment(fragment) = &kids[1] else { panic!("expected fragment") };
        assert!(!fragment.is_root);
        assert_eq!(fragment.children.len(), 2);
        assert_eq!(fragment.path_flags, PathFlags::STABLE_FRAGMENT);
    }

    #[test]
    fn test_unnamed_template_root_becomes_root_fragment() {
        let root = build("<template><p>a</p><p>b</p></template>").unwrap();
        let Node::Fragment(fragment) = root else { panic!("expected fragment") };
        assert!(fragment.is_root);
        assert_eq!(fragment.children.len(), 2);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ATTRIBUTES
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_valueless_attributes_depend_on_tag_kind() {
        let div = top(r#"<div><input disabled><Toggle checked></Toggle></div>"#);
        let kids = children(&div);

        let Node::Element(input) = &kids[0] else { panic!("expected element") };
        assert_eq!(input.props.get("disabled"), Some(&PropValue::Static(String::new())));

        let Node::Component(toggle) = &kids[1] else { panic!("expected component") };
        let Some(PropValue::Dynamic(value)) = toggle.props.get("checked") else { panic!() };
        assert_eq!(value.code, "true");
    }

    #[test]
    fn test_class_sources_accumulate() {
        let div = top(r#"<div class="card" :class="{ active: on }"></div>"#);
        let Node::Element(div) = div else { panic!("expected element") };
        let Some(PropValue::Class(sources)) = div.props.get("class") else { panic!("expected class list") };
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0], PropValue::Static("card".to_string()));
        assert!(div.path_flags.contains(PathFlags::PROPS));
    }

    #[test]
    fn test_v_html_is_a_dynamic_prop() {
        let div = top(r#"<div v-html="htmlContent"></div>"#);
        let Node::Element(div) = div else { panic!("expected element") };
        let Some(PropValue::Dynamic(value)) = div.props.get("innerHTML") else { panic!() };
        assert_eq!(value.code, "htmlContent");
        assert!(div.path_flags.contains(PathFlags::PROPS));
        assert_eq!(div.dynamic_props, vec!["innerHTML"]);
        assert!(div.directives.is_empty());
    }

    #[test]
    fn test_event_handlers_accumulate() {
        let button = top(r#"<button @click.prevent="save" v-on:click="log($event)">Go</button>"#);
        let Node::Element(button) = button else { panic!("expected element") };
        let Some(PropValue::Event(binding)) = button.props.get("onClick") else { panic!() };
        assert_eq!(binding.event, "click");
        assert_eq!(binding.handlers.len(), 2);
        assert_eq!(binding.handlers[0].modifiers, vec!["prevent"]);
        assert_eq!(binding.handlers[1].code, "log($event)");
        assert_eq!(button.dynamic_props, vec!["onClick"]);
    }

    #[test]
    fn test_compiler_modifiers_rewrite_handler() {
        let form = top(
            r#"<form @submit.prevent.invoke:save:item@id:'a@b'="busy = true" @input.debounce:250="search()"></form>"#,
        );
        let Node::Element(form) = form else { panic!("expected element") };

        let Some(PropValue::Event(submit)) = form.props.get("onSubmit") else { panic!() };
        assert_eq!(
            submit.handlers[0].code,
            "busy = true;await invoke('save',[item.id,'a@b']);"
        );
        assert_eq!(submit.handlers[0].modifiers, vec!["prevent"]);

        let Some(PropValue::Event(input)) = form.props.get("onInput") else { panic!() };
        assert_eq!(input.handlers[0].code, "$flow.debounce(($event)=>{search()},250)");
        assert!(input.handlers[0].is_function);
    }

    #[test]
    fn test_v_model_expands_to_prop_and_update_handler() {
        let field = top(r#"<TextField v-model:title.trim.invoke:rename:id="draft.title"></TextField>"#);
        let Node::Component(field) = field else { panic!("expected component") };

        let Some(PropValue::Dynamic(value)) = field.props.get("title") else { panic!() };
        assert_eq!(value.code, "draft.title");

        let Some(PropValue::Event(update)) = field.props.get("onUpdate:title") else { panic!() };
        assert_eq!(update.handlers.len(), 2);
        assert_eq!(update.handlers[0].code, "draft.title=$event;");
        assert_eq!(update.handlers[0].modifiers, vec!["trim"]);
        assert_eq!(update.handlers[1].code, "await invoke('rename',[id]);");
        assert_eq!(field.dynamic_props, vec!["title", "onUpdate:title"]);
    }

    #[test]
    fn test_custom_directives_and_spreads() {
        let div = top(r#"<div v-tooltip:top.lazy="hint" v-show="visible" v-bind="attrs"></div>"#);
        let Node::Element(div) = div else { panic!("expected element") };
        assert_eq!(div.directives.len(), 2);
        assert_eq!(div.directives[0].name, "tooltip");
        assert_eq!(div.directives[0].arg.as_deref(), Some("top"));
        assert_eq!(div.directives[1].name, "show");
        assert_eq!(div.spreads.len(), 1);
        assert!(div.path_flags.contains(PathFlags::FULL_PROPS));
    }

    #[test]
    fn test_dynamic_component_is() {
        let node = top(r#"<component :is="current" :size="2"></component>"#);
        let Node::Component(c) = node else { panic!("expected component") };
        assert!(matches!(c.is, Some(PropValue::Dynamic(_))));
        assert!(!c.props.contains("is"));
        assert!(c.props.contains("size"));
    }
}
