use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::CompileError;

pub const DEFAULT_SCOPE_ATTRIBUTE: &str = "data-flow-scope";
pub const DEFAULT_RUNTIME_NAMESPACE: &str = "v";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerOptions {
    /// Attribute injected on the root element when scoped styles are present.
    pub scope_attribute: String,
    /// Name of the runtime helper namespace referenced by generated code.
    pub runtime_namespace: String,
    /// Enables the on-disk compile cache when set.
    pub cache_dir: Option<PathBuf>,
    /// Extension of template files picked up by cache warm-up.
    pub template_extension: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            scope_attribute: DEFAULT_SCOPE_ATTRIBUTE.to_string(),
            runtime_namespace: DEFAULT_RUNTIME_NAMESPACE.to_string(),
            cache_dir: None,
            template_extension: "html".to_string(),
        }
    }
}

impl CompilerOptions {
    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let options: CompilerOptions =
            serde_json::from_str(json).map_err(|e| CompileError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<(), CompileError> {
        if self.scope_attribute.trim().is_empty() {
            return Err(CompileError::Config(
                "scopeAttribute must not be empty".to_string(),
            ));
        }
        let ns = &self.runtime_namespace;
        let valid_ns = ns
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_' || c == '$')
            && ns.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if !valid_ns {
            return Err(CompileError::Config(format!(
                "runtimeNamespace \"{}\" is not a valid identifier",
                ns
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let options = CompilerOptions::from_json(r#"{"runtimeNamespace":"Vue"}"#).unwrap();
        assert_eq!(options.runtime_namespace, "Vue");
        assert_eq!(options.scope_attribute, DEFAULT_SCOPE_ATTRIBUTE);
        assert!(options.cache_dir.is_none());
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(CompilerOptions::from_json("").unwrap(), CompilerOptions::default());
    }

    #[test]
    fn test_rejects_bad_namespace() {
        let err = CompilerOptions::from_json(r#"{"runtimeNamespace":"1abc"}"#).unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));
    }
}
