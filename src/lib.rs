//! # Flow template compiler
//!
//! Compiles an HTML-like template dialect into the body of a render function for a
//! virtual-DOM runtime.
//!
//! ## Pipeline
//!
//! 1. **Extract**: root-level `<script>` and `<style>` blocks are split off.
//! 2. **Preprocess**: a byte-level state machine interns tag/attribute names, expands
//!    directive shorthands, closes void and self-closing tags and turns `{{ }}`
//!    interpolations into marker elements.
//! 3. **Parse**: html5ever builds a DOM from the preprocessed markup; names are restored.
//! 4. **Build**: the DOM becomes a typed [`node::Node`] tree (directives, slots, loops,
//!    conditionals, events, path flags).
//! 5. **Render**: every node emits runtime calls; expressions are scoped through a
//!    [`Context`], rewriting instance state to `this.x` and props to `this.$props.x`.
//!
//! Scoped styles are rewritten under one `[data-flow-scope="id"]` selector and the same
//! attribute is injected on the root element. The client script must be a single
//! `export default { … }` object and is turned into a function body.
//!
//! ## Identifier Resolution Order
//!
//! 1. The identifier hook, if one is installed (used to detect `await` in handlers)
//! 2. `$debug` becomes a `debugger` trigger
//! 3. `$window` / `$document` lose their `$`
//! 4. Declared component props → `this.$props.name`
//! 5. Lexically bound names (loop patterns, slot props, parameters, globals) stay untouched
//! 6. Everything else → `this.name`

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod builder;
pub mod cache;
pub mod compile;
pub mod component;
pub mod context;
pub mod discovery;
pub mod error;
pub mod expression;
pub mod extract;
pub mod node;
pub mod options;
pub mod parse;
pub mod preprocess;
pub mod render;
pub mod script;
pub mod style;

#[cfg(test)]
mod parse_tests;

pub use cache::{CompileCache, DiskCache, MemoryCache};
pub use compile::{CompiledTemplate, Compiler, Template};
pub use component::{ComponentDefinition, ComponentRegistry, StaticRegistry};
pub use context::Context;
pub use discovery::{discover_templates, warm_cache, WarmReport};
pub use error::{CompileError, ErrorKind};
pub use options::CompilerOptions;
pub use script::transform_script;
pub use style::StyleRecord;

/// Compiles one template with default options.
pub fn compile_template(
    template: &str,
    definition: Option<&ComponentDefinition>,
) -> Result<CompiledTemplate, CompileError> {
    Compiler::default().compile(template, definition)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn to_napi_error(err: CompileError) -> napi::Error {
    napi::Error::from_reason(format!("[{}] {}", err.code(), err))
}

/// Compile a template and return the `CompiledTemplate` as JSON.
#[cfg(feature = "napi")]
#[napi]
pub fn compile_template_native(
    template: String,
    options_json: Option<String>,
    definition_json: Option<String>,
) -> napi::Result<String> {
    let options = CompilerOptions::from_json(options_json.as_deref().unwrap_or(""))
        .map_err(to_napi_error)?;
    let definition: Option<ComponentDefinition> = match definition_json {
        Some(json) if !json.trim().is_empty() => Some(
            serde_json::from_str(&json)
                .map_err(|e| napi::Error::from_reason(format!("Definition parse error: {}", e)))?,
        ),
        _ => None,
    };

    let compiler = Compiler::from_options(options).map_err(to_napi_error)?;
    let compiled = compiler
        .compile(&template, definition.as_ref())
        .map_err(to_napi_error)?;
    serde_json::to_string(&compiled).map_err(|e| napi::Error::from_reason(e.to_string()))
}

/// Compile every template under `dir` into the configured cache. Returns
/// `{ compiled, failed: [[path, message]] }` as JSON.
#[cfg(feature = "napi")]
#[napi]
pub fn warm_cache_native(dir: String, options_json: Option<String>) -> napi::Result<String> {
    let options = CompilerOptions::from_json(options_json.as_deref().unwrap_or(""))
        .map_err(to_napi_error)?;
    let compiler = Compiler::from_options(options).map_err(to_napi_error)?;
    let report = warm_cache(&compiler, std::path::Path::new(&dir));

    let failed: Vec<serde_json::Value> = report
        .failed
        .iter()
        .map(|(path, message)| serde_json::json!([path.to_string_lossy(), message]))
        .collect();
    Ok(serde_json::json!({ "compiled": report.compiled, "failed": failed }).to_string())
}
