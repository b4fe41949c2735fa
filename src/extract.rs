//! Script and style block extraction.
//!
//! Blocks are located with regexes and removed from the template. Whether they sit at
//! the template root is decided with a secondary, lenient html5ever parse of the raw
//! template so that nesting is judged by a real tree builder instead of indentation.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use std::collections::BTreeMap;

use crate::error::CompileError;
use crate::preprocess::is_void_tag;

lazy_static! {
    static ref SCRIPT_RE: Regex = Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").unwrap();
    static ref STYLE_RE: Regex = Regex::new(r"(?is)<style\b([^>]*)>(.*?)</style\s*>").unwrap();
    static ref ATTR_RE: Regex = Regex::new(
        r#"([A-Za-z_:@][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#
    )
    .unwrap();
    static ref SELF_CLOSING_RE: Regex = Regex::new(
        r#"(?s)<!--.*?-->|<([A-Za-z][-A-Za-z0-9_:.]*)((?:[^>"']|"[^"]*"|'[^']*')*?)\s*/>"#
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStyle {
    pub content: String,
    pub scoped: bool,
    /// Attributes of the `<style>` tag, `scoped` excluded.
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub template: String,
    pub script: Option<String>,
    pub styles: Vec<RawStyle>,
}

pub fn extract(template: &str) -> Result<Extracted, CompileError> {
    let script_count = SCRIPT_RE.find_iter(template).count();
    if script_count > 1 {
        return Err(CompileError::MultipleScripts);
    }
    let has_style = STYLE_RE.is_match(template);

    if script_count == 0 && !has_style {
        return Ok(Extracted {
            template: template.to_string(),
            script: None,
            styles: Vec::new(),
        });
    }

    assert_root_level(template)?;

    let script = SCRIPT_RE
        .captures(template)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());

    let styles: Vec<RawStyle> = STYLE_RE
        .captures_iter(template)
        .map(|caps| {
            let attr_source = caps.get(1).map_or("", |m| m.as_str());
            let mut attributes = parse_attributes(attr_source);
            let scoped = attributes.remove("scoped").is_some();
            RawStyle {
                content: caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
                scoped,
                attributes,
            }
        })
        .collect();

    let without_script = SCRIPT_RE.replace_all(template, "");
    let cleaned = STYLE_RE.replace_all(&without_script, "");

    tracing::debug!(
        has_script = script.is_some(),
        styles = styles.len(),
        "extracted root-level blocks"
    );

    Ok(Extracted {
        template: cleaned.trim().to_string(),
        script,
        styles,
    })
}

fn parse_attributes(source: &str) -> BTreeMap<String, String> {
    ATTR_RE
        .captures_iter(source)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROOT-LEVEL CHECK
// ═══════════════════════════════════════════════════════════════════════════════

/// Expands `<X .../>` to `<X ...></X>` for non-void tags and drops comments, so the
/// HTML tree builder does not treat a self-closing component as an open container.
fn expand_self_closing(template: &str) -> String {
    SELF_CLOSING_RE
        .replace_all(template, |caps: &regex::Captures<'_>| match caps.get(1) {
            None => String::new(),
            Some(name) if is_void_tag(name.as_str()) => caps[0].to_string(),
            Some(name) => format!(
                "<{0}{1}></{0}>",
                name.as_str(),
                caps.get(2).map_or("", |m| m.as_str())
            ),
        })
        .into_owned()
}

fn assert_root_level(template: &str) -> Result<(), CompileError> {
    let document = format!(
        "<!DOCTYPE html><html><body>{}</body></html>",
        expand_self_closing(template)
    );
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut document.as_bytes())
        .map_err(|e| CompileError::Parse(e.to_string()))?;

    match find_body(&dom.document) {
        Some(body) => check_children(&body, true),
        None => Ok(()),
    }
}

fn find_body(handle: &Handle) -> Option<Handle> {
    if let NodeData::Element { name, .. } = &handle.data {
        if &*name.local == "body" {
            return Some(handle.clone());
        }
    }
    handle.children.borrow().iter().find_map(find_body)
}

fn check_children(parent: &Handle, at_root: bool) -> Result<(), CompileError> {
    for child in parent.children.borrow().iter() {
        if let NodeData::Element {
            name,
            template_contents,
            ..
        } = &child.data
        {
            let tag = &*name.local;
            if !at_root && (tag == "script" || tag == "style") {
                return Err(CompileError::NotAtRootLevel {
                    tag: tag.to_string(),
                });
            }
            if let Some(contents) = template_contents.borrow().as_ref() {
                check_children(contents, false)?;
            }
            check_children(child, false)?;
        }
    }
    Ok(())
}
