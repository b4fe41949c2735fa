//! Compile orchestration.
//!
//! `extract → preprocess → parse → build → scope injection → render`, plus the client
//! script transform and the optional compile cache around the whole pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::builder::{build_root, inject_scope};
use crate::cache::{cache_key, CompileCache, DiskCache};
use crate::component::{ComponentDefinition, ComponentRegistry};
use crate::context::Context;
use crate::error::CompileError;
use crate::extract::extract;
use crate::node::Node;
use crate::options::CompilerOptions;
use crate::parse::parse_root;
use crate::preprocess::preprocess;
use crate::render::render_node;
use crate::script::transform_script;
use crate::style::{build_records, StyleRecord};

/// A parsed template: node tree plus side-channel data, before rendering.
#[derive(Debug, Clone)]
pub struct Template {
    pub root: Node,
    /// Raw script block, trimmed.
    pub script: Option<String>,
    pub styles: Vec<StyleRecord>,
    pub scope_id: Option<String>,
}

impl Template {
    /// Render-function body for this template.
    pub fn render(&self, ctx: &Context) -> String {
        render_node(&self.root, ctx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledTemplate {
    pub hash: String,
    pub render: String,
    /// Transformed client script body.
    pub script: Option<String>,
    pub styles: Vec<StyleRecord>,
}

pub struct Compiler {
    options: CompilerOptions,
    registry: Option<Arc<dyn ComponentRegistry>>,
    cache: Option<Arc<dyn CompileCache>>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            registry: None,
            cache: None,
        }
    }

    /// Builds a compiler from options, opening a disk cache when `cache_dir` is set.
    pub fn from_options(options: CompilerOptions) -> Result<Self, CompileError> {
        let cache: Option<Arc<dyn CompileCache>> = match &options.cache_dir {
            Some(dir) => Some(Arc::new(DiskCache::new(dir.clone())?)),
            None => None,
        };
        Ok(Self {
            options,
            registry: None,
            cache,
        })
    }

    pub fn with_registry(mut self, registry: Arc<dyn ComponentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CompileCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Runs every stage up to, but not including, rendering.
    pub fn parse(&self, template: &str) -> Result<Template, CompileError> {
        let extracted = extract(template)?;
        tracing::debug!(
            styles = extracted.styles.len(),
            has_script = extracted.script.is_some(),
            "extracted template blocks"
        );

        let preprocessed = preprocess(&extracted.template);
        let dom = parse_root(&preprocessed)?;
        let mut root = build_root(&dom)?;

        let (styles, scope_id) = build_records(extracted.styles, &self.options.scope_attribute);
        if let Some(id) = &scope_id {
            inject_scope(&mut root, &self.options.scope_attribute, id)?;
        }

        Ok(Template {
            root,
            script: extracted
                .script
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            styles,
            scope_id,
        })
    }

    /// Fresh render context for one compile.
    pub fn context(&self, definition: Option<&ComponentDefinition>) -> Context {
        let mut ctx = match definition {
            Some(definition) => Context::for_component(definition),
            None => Context::new(),
        }
        .with_runtime(&self.options.runtime_namespace);
        if let Some(registry) = &self.registry {
            ctx = ctx.with_registry(Arc::clone(registry));
        }
        ctx
    }

    /// Compiler settings that change render output, folded into every cache key.
    fn settings_fingerprint(&self) -> String {
        let registry = self
            .registry
            .as_ref()
            .and_then(|r| r.fingerprint())
            .unwrap_or_default();
        format!(
            "{}\0{}\0{}",
            self.options.runtime_namespace, self.options.scope_attribute, registry
        )
    }

    pub fn compile(
        &self,
        template: &str,
        definition: Option<&ComponentDefinition>,
    ) -> Result<CompiledTemplate, CompileError> {
        let key = cache_key(
            template,
            definition.map(|d| d.name.as_str()),
            definition.map(|d| d.props.as_slice()).unwrap_or(&[]),
            &self.settings_fingerprint(),
        );

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                tracing::debug!(key = %key, "compile cache hit");
                return Ok(hit);
            }
            tracing::debug!(key = %key, "compile cache miss");
        }

        let parsed = self.parse(template)?;
        let render = parsed.render(&self.context(definition));
        let script = match &parsed.script {
            Some(source) => Some(transform_script(source)?).filter(|s| !s.is_empty()),
            None => None,
        };

        let compiled = CompiledTemplate {
            hash: key,
            render,
            script,
            styles: parsed.styles,
        };
        if let Some(cache) = &self.cache {
            cache.put(&compiled.hash, &compiled);
        }
        tracing::debug!(
            component = definition.map(|d| d.name.as_str()).unwrap_or("<anonymous>"),
            bytes = compiled.render.len(),
            "compiled template"
        );
        Ok(compiled)
    }

    pub fn compile_file(
        &self,
        path: &Path,
        definition: Option<&ComponentDefinition>,
    ) -> Result<CompiledTemplate, CompileError> {
        let source = std::fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
        self.compile(&source, definition)
    }

    /// Compiles the template a component definition carries or points to.
    pub fn compile_component(
        &self,
        definition: &ComponentDefinition,
    ) -> Result<CompiledTemplate, CompileError> {
        let source = definition.template_source()?;
        self.compile(&source, Some(definition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn test_cache_hit_skips_recompile() {
        let cache = Arc::new(MemoryCache::new());
        let compiler = Compiler::default().with_cache(cache.clone());
        let first = compiler.compile("<div>{{ a }}</div>", None).unwrap();
        assert_eq!(cache.len(), 1);
        let second = compiler.compile("<div>{{ a }}</div>", None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_shared_cache_keeps_settings_apart() {
        let cache = Arc::new(MemoryCache::new());
        let template = "<div>{{ a }}</div>";
        let plain = Compiler::default().with_cache(cache.clone());
        let options = CompilerOptions {
            runtime_namespace: "Vue".to_string(),
            ..CompilerOptions::default()
        };
        let vue = Compiler::new(options).with_cache(cache.clone());

        let first = plain.compile(template, None).unwrap();
        let second = vue.compile(template, None).unwrap();
        assert!(first.render.starts_with("return (v.openBlock(),"));
        assert!(second.render.starts_with("return (Vue.openBlock(),"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_shared_cache_keeps_scope_attributes_apart() {
        let cache = Arc::new(MemoryCache::new());
        let template = "<div></div><style scoped>p{}</style>";
        let options = CompilerOptions {
            scope_attribute: "data-s".to_string(),
            ..CompilerOptions::default()
        };
        let default = Compiler::default().with_cache(cache.clone());
        let custom = Compiler::new(options).with_cache(cache.clone());

        assert!(default.compile(template, None).unwrap().render.contains("data-flow-scope"));
        assert!(custom.compile(template, None).unwrap().render.contains("\"data-s\""));
    }

    #[test]
    fn test_shared_cache_keeps_registries_apart() {
        use crate::component::StaticRegistry;

        let cache = Arc::new(MemoryCache::new());
        let template = r#"<div v-tip="hint"></div>"#;
        let mut registry = StaticRegistry::new();
        registry.register_directive("tip", "Tooltip");

        let bare = Compiler::default().with_cache(cache.clone());
        let aliased = Compiler::default()
            .with_cache(cache.clone())
            .with_registry(Arc::new(registry));

        assert!(bare.compile(template, None).unwrap().render.contains("resolveDirective(\"tip\")"));
        assert!(aliased
            .compile(template, None)
            .unwrap()
            .render
            .contains("resolveDirective(\"Tooltip\")"));
    }

    #[test]
    fn test_props_change_the_output() {
        let compiler = Compiler::default();
        let template = "<p>{{ title }}</p>";
        let plain = compiler.compile(template, None).unwrap();
        let def = ComponentDefinition::new("Card").with_props(["title"]);
        let with_props = compiler.compile(template, Some(&def)).unwrap();
        assert!(plain.render.contains("this.title"));
        assert!(with_props.render.contains("this.$props.title"));
        assert_ne!(plain.hash, with_props.hash);
    }

    #[test]
    fn test_compile_component_uses_inline_template() {
        let mut def = ComponentDefinition::new("Inline");
        def.template = Some("<span>x</span>".to_string());
        let out = Compiler::default().compile_component(&def).unwrap();
        assert!(out.render.contains("\"span\""));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Compiler::default()
            .compile_file(Path::new("/definitely/not/here.html"), None)
            .unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }
}
