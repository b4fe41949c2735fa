//! Client script validation and transform.
//!
//! The script block of a template must be a module with a single `export default`
//! object literal restricted to a fixed set of keys. The transform turns it into a
//! function body the client can evaluate directly.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrowFunctionExpression, Expression, Function, ObjectExpression, ObjectPropertyKind,
    PropertyKey, ReturnStatement, Statement,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::scope::ScopeFlags;

use crate::error::CompileError;

pub const LIFECYCLE_KEYS: &[&str] = &[
    "beforeCreate",
    "created",
    "beforeMount",
    "mounted",
    "beforeUpdate",
    "updated",
    "beforeUnmount",
    "unmounted",
    "activated",
    "deactivated",
    "errorCaptured",
    "renderTracked",
    "renderTriggered",
    "beforeRouteEnter",
    "beforeRouteUpdate",
    "beforeRouteLeave",
];

const SECTION_KEYS: &[&str] = &["methods", "computed", "watch"];

const EXPORT_BINDING: &str = "_export";

pub fn is_supported_key(key: &str) -> bool {
    key == "data" || SECTION_KEYS.contains(&key) || LIFECYCLE_KEYS.contains(&key)
}

/// Validates `source` and rewrites it into a client-evaluable function body.
/// Blank input yields an empty string.
pub fn transform_script(source: &str) -> Result<String, CompileError> {
    if source.trim().is_empty() {
        return Ok(String::new());
    }

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::default().with_module(true)).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "parser aborted".to_string());
        return Err(CompileError::ScriptParse(message));
    }

    let mut exports = ret.program.body.iter().filter_map(|stmt| match stmt {
        Statement::ExportDefaultDeclaration(decl) => Some(decl),
        _ => None,
    });
    let export = exports.next().ok_or(CompileError::MissingDefaultExport)?;
    if exports.next().is_some() {
        return Err(CompileError::MultipleDefaultExports);
    }

    let object = match export
        .declaration
        .as_expression()
        .map(Expression::without_parentheses)
    {
        Some(Expression::ObjectExpression(object)) => object,
        _ => return Err(CompileError::DefaultExportNotObject),
    };
    validate_export_object(object)?;

    let keyword_start = export.span.start as usize;
    let value_start = export.declaration.span().start as usize;

    let mut out = String::with_capacity(source.len() + 32);
    out.push_str(&source[..keyword_start]);
    out.push_str("var ");
    out.push_str(EXPORT_BINDING);
    out.push_str(" = ");
    out.push_str(&source[value_start..]);

    let mut out = out.trim_end().to_string();
    if !out.ends_with(';') {
        out.push(';');
    }
    out.push_str("\nreturn ");
    out.push_str(EXPORT_BINDING);
    out.push_str("||{};");

    tracing::debug!(bytes = out.len(), "transformed client script");
    Ok(out)
}

fn validate_export_object(object: &ObjectExpression<'_>) -> Result<(), CompileError> {
    for property in &object.properties {
        let property = match property {
            ObjectPropertyKind::ObjectProperty(p) => p,
            ObjectPropertyKind::SpreadProperty(_) => {
                return Err(CompileError::UnsupportedPropertyName)
            }
        };

        let key = property_key(&property.key)?;
        if !is_supported_key(&key) {
            return Err(CompileError::UnsupportedKey(key));
        }

        let value = property.value.without_parentheses();
        if SECTION_KEYS.contains(&key.as_str()) {
            if !matches!(value, Expression::ObjectExpression(_)) {
                return Err(CompileError::SectionNotObject(key));
            }
        } else if key == "data" {
            validate_data(value)?;
        } else if !is_function(value) {
            return Err(CompileError::LifecycleNotFunction(key));
        }
    }
    Ok(())
}

fn property_key(key: &PropertyKey<'_>) -> Result<String, CompileError> {
    match key {
        PropertyKey::StaticIdentifier(id) => Ok(id.name.to_string()),
        PropertyKey::StringLiteral(lit) => Ok(lit.value.to_string()),
        PropertyKey::NumericLiteral(lit) => Ok(lit.value.to_string()),
        _ => Err(CompileError::UnsupportedPropertyName),
    }
}

fn is_function(value: &Expression<'_>) -> bool {
    matches!(
        value,
        Expression::FunctionExpression(_) | Expression::ArrowFunctionExpression(_)
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// DATA SECTION
// ═══════════════════════════════════════════════════════════════════════════════

fn validate_data(value: &Expression<'_>) -> Result<(), CompileError> {
    let returns_object = match value {
        Expression::FunctionExpression(func) => match &func.body {
            Some(body) => all_returns_are_objects(&body.statements),
            None => false,
        },
        Expression::ArrowFunctionExpression(arrow) if arrow.expression => {
            match arrow.body.statements.first() {
                Some(Statement::ExpressionStatement(stmt)) => matches!(
                    stmt.expression.without_parentheses(),
                    Expression::ObjectExpression(_)
                ),
                _ => false,
            }
        }
        Expression::ArrowFunctionExpression(arrow) => {
            all_returns_are_objects(&arrow.body.statements)
        }
        _ => return Err(CompileError::DataNotFunction),
    };

    if returns_object {
        Ok(())
    } else {
        Err(CompileError::DataNotReturningObject)
    }
}

/// True when there is at least one `return` and every one of them returns an object
/// literal. Nested functions are not inspected.
fn all_returns_are_objects(statements: &[Statement<'_>]) -> bool {
    let mut collector = ReturnCollector::default();
    for stmt in statements {
        collector.visit_statement(stmt);
    }
    collector.total > 0 && collector.total == collector.objects
}

#[derive(Default)]
struct ReturnCollector {
    total: usize,
    objects: usize,
}

impl<'a> Visit<'a> for ReturnCollector {
    fn visit_return_statement(&mut self, stmt: &ReturnStatement<'a>) {
        self.total += 1;
        if let Some(argument) = &stmt.argument {
            if matches!(argument.without_parentheses(), Expression::ObjectExpression(_)) {
                self.objects += 1;
            }
        }
    }

    fn visit_function(&mut self, _func: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _arrow: &ArrowFunctionExpression<'a>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_returned_empty() {
        assert_eq!(transform_script("").unwrap(), "");
        assert_eq!(transform_script("  \n ").unwrap(), "");
    }

    #[test]
    fn test_export_becomes_local_assignment() {
        let out = transform_script("export default {\n  methods: { go() { return 1; } }\n}\n").unwrap();
        assert!(out.starts_with("var _export = {"));
        assert!(!out.contains("export default"));
        assert!(out.ends_with("};\nreturn _export||{};"));
    }

    #[test]
    fn test_code_before_export_is_kept() {
        let out = transform_script("const n = 1;\nexport default { data: () => ({ n }) };").unwrap();
        assert_eq!(
            out,
            "const n = 1;\nvar _export = { data: () => ({ n }) };\nreturn _export||{};"
        );
    }

    #[test]
    fn test_data_returning_array_is_rejected() {
        let err = transform_script("export default { data() { return []; } }").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Client script \"data\" function must return an object literal"
        );
    }

    #[test]
    fn test_data_returning_object_on_every_path() {
        assert!(transform_script(
            "export default { data() { if (x) { return { a: 1 }; } return { a: 2 }; } }"
        )
        .is_ok());
        assert_eq!(
            transform_script("export default { data() { if (x) { return { a: 1 }; } return null; } }")
                .unwrap_err(),
            CompileError::DataNotReturningObject
        );
        assert_eq!(
            transform_script("export default { data() { const f = () => { return {}; }; } }")
                .unwrap_err(),
            CompileError::DataNotReturningObject
        );
    }

    #[test]
    fn test_data_must_be_function() {
        assert_eq!(
            transform_script("export default { data: { a: 1 } }").unwrap_err(),
            CompileError::DataNotFunction
        );
    }

    #[test]
    fn test_export_shape_errors() {
        assert_eq!(
            transform_script("const a = 1;").unwrap_err(),
            CompileError::MissingDefaultExport
        );
        assert_eq!(
            transform_script("export default [];").unwrap_err(),
            CompileError::DefaultExportNotObject
        );
        assert_eq!(
            transform_script("export default { props: [] }").unwrap_err(),
            CompileError::UnsupportedKey("props".to_string())
        );
        assert_eq!(
            transform_script("export default { [name]: 1 }").unwrap_err(),
            CompileError::UnsupportedPropertyName
        );
        assert_eq!(
            transform_script("export default { methods: [] }").unwrap_err(),
            CompileError::SectionNotObject("methods".to_string())
        );
        assert_eq!(
            transform_script("export default { mounted: 1 }").unwrap_err(),
            CompileError::LifecycleNotFunction("mounted".to_string())
        );
    }

    #[test]
    fn test_parse_failure_is_reported() {
        assert!(matches!(
            transform_script("export default {"),
            Err(CompileError::ScriptParse(_))
        ));
    }

    #[test]
    fn test_lifecycle_and_string_keys() {
        assert!(transform_script(
            "export default { 'computed': {}, mounted() {}, beforeRouteLeave: () => {} }"
        )
        .is_ok());
    }
}
