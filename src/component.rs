use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::error::CompileError;

/// What the surrounding runtime knows about a component. Only `props` influences
/// compilation: identifiers naming a declared prop are rewritten to props access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    pub name: String,
    #[serde(default)]
    pub props: Vec<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

impl ComponentDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_props<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.props = props.into_iter().map(Into::into).collect();
        self
    }

    /// Inline template if present, otherwise the contents of `template_path`.
    pub fn template_source(&self) -> Result<String, CompileError> {
        if let Some(template) = &self.template {
            return Ok(template.clone());
        }
        match &self.template_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| CompileError::io(path, e)),
            None => Err(CompileError::Config(format!(
                "component \"{}\" has neither a template nor a template path",
                self.name
            ))),
        }
    }
}

/// Lookup service supplied by the host runtime.
pub trait ComponentRegistry: Send + Sync {
    fn component_definition(&self, name: &str) -> Option<ComponentDefinition>;

    /// Display name registered for a custom directive, if any.
    fn directive_name(&self, _name: &str) -> Option<String> {
        None
    }

    /// Stable digest of everything this registry can contribute to render output.
    /// It is part of the compile cache key; a registry returning `None` must not
    /// share a cache with compilers that use a different registry.
    fn fingerprint(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    components: HashMap<String, ComponentDefinition>,
    directives: HashMap<String, String>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ComponentDefinition) {
        self.components.insert(definition.name.clone(), definition);
    }

    pub fn register_directive(&mut self, name: impl Into<String>, display: impl Into<String>) {
        self.directives.insert(name.into(), display.into());
    }
}

impl ComponentRegistry for StaticRegistry {
    fn component_definition(&self, name: &str) -> Option<ComponentDefinition> {
        self.components.get(name).cloned()
    }

    fn directive_name(&self, name: &str) -> Option<String> {
        self.directives.get(name).cloned()
    }

    fn fingerprint(&self) -> Option<String> {
        let components: BTreeMap<&str, &str> = self
            .components
            .iter()
            .map(|(key, def)| (key.as_str(), def.name.as_str()))
            .collect();
        let directives: BTreeMap<&str, &str> = self
            .directives
            .iter()
            .map(|(key, display)| (key.as_str(), display.as_str()))
            .collect();
        serde_json::to_string(&(components, directives)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_tracks_registrations() {
        let mut a = StaticRegistry::new();
        a.register_directive("tip", "Tooltip");
        let mut b = StaticRegistry::new();
        b.register_directive("tip", "Hint");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn test_definition_from_json_defaults() {
        let def: ComponentDefinition =
            serde_json::from_str(r#"{"name":"Counter","props":["start"]}"#).unwrap();
        assert_eq!(def.props, vec!["start".to_string()]);
        assert!(def.template.is_none());
    }

    #[test]
    fn test_template_source_prefers_inline() {
        let mut def = ComponentDefinition::new("A");
        def.template = Some("<div></div>".to_string());
        def.template_path = Some(PathBuf::from("/does/not/exist.html"));
        assert_eq!(def.template_source().unwrap(), "<div></div>");
    }

    #[test]
    fn test_template_source_missing_file_is_io_error() {
        let mut def = ComponentDefinition::new("A");
        def.template_path = Some(PathBuf::from("/does/not/exist.html"));
        assert!(matches!(def.template_source(), Err(CompileError::Io { .. })));
    }

    #[test]
    fn test_static_registry_lookups() {
        let mut registry = StaticRegistry::new();
        registry.register(ComponentDefinition::new("Card").with_props(["title"]));
        registry.register_directive("tooltip", "Tooltip");
        assert_eq!(
            registry.component_definition("Card").map(|d| d.props),
            Some(vec!["title".to_string()])
        );
        assert_eq!(registry.directive_name("tooltip").as_deref(), Some("Tooltip"));
        assert!(registry.component_definition("Missing").is_none());
    }
}
