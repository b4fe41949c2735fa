//! Style records and scoped CSS rewriting.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::extract::RawStyle;

/// At-rules whose block holds ordinary style rules that must be scoped too.
const NESTING_AT_RULES: &[&str] = &["media", "supports", "container", "layer", "document"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleRecord {
    pub content: String,
    pub scoped: bool,
    pub attributes: BTreeMap<String, String>,
    pub scope_id: Option<String>,
    /// SHA-256 of the original block content.
    pub hash: String,
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One id shared by every scoped block of a template: the first eight hex digits of
/// the hash over their concatenated contents.
pub fn scope_id(styles: &[RawStyle]) -> Option<String> {
    let scoped: String = styles
        .iter()
        .filter(|s| s.scoped)
        .map(|s| s.content.as_str())
        .collect();
    if !styles.iter().any(|s| s.scoped) {
        return None;
    }
    Some(sha256_hex(&scoped)[..8].to_string())
}

/// Builds the style records, rewriting scoped blocks under `[attribute="id"]`.
pub fn build_records(styles: Vec<RawStyle>, attribute: &str) -> (Vec<StyleRecord>, Option<String>) {
    let id = scope_id(&styles);
    let records = styles
        .into_iter()
        .map(|style| {
            let hash = sha256_hex(&style.content);
            match (&id, style.scoped) {
                (Some(id), true) => StyleRecord {
                    content: apply_scoped_css(&style.content, attribute, id),
                    scoped: true,
                    attributes: style.attributes,
                    scope_id: Some(id.clone()),
                    hash,
                },
                _ => StyleRecord {
                    content: style.content,
                    scoped: false,
                    attributes: style.attributes,
                    scope_id: None,
                    hash,
                },
            }
        })
        .collect();
    (records, id)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPED CSS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn apply_scoped_css(css: &str, attribute: &str, id: &str) -> String {
    let prefix = format!("[{}=\"{}\"]", attribute, id);
    scope_rules(css, &prefix)
}

fn scope_rules(css: &str, prefix: &str) -> String {
    let bytes = css.as_bytes();
    let mut out = String::with_capacity(css.len() + css.len() / 2);
    let mut prelude_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = css[i + 2..].find("*/").map_or(css.len(), |p| i + 2 + p + 2);
                if css[prelude_start..i].trim().is_empty() {
                    out.push_str(&css[prelude_start..end]);
                    prelude_start = end;
                }
                i = end;
            }
            b'"' | b'\'' => i = skip_string(bytes, i),
            b';' if css[prelude_start..i].trim_start().starts_with('@') => {
                // statement at-rule such as @import or @charset
                out.push_str(&css[prelude_start..=i]);
                i += 1;
                prelude_start = i;
            }
            b'{' => {
                let close = matching_brace(bytes, i);
                let prelude = &css[prelude_start..i];
                let inner = &css[i + 1..close.min(css.len())];
                let leading = &prelude[..prelude.len() - prelude.trim_start().len()];
                out.push_str(leading);

                let head = prelude.trim();
                if let Some(at_rule) = head.strip_prefix('@') {
                    let name: String = at_rule
                        .chars()
                        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                        .collect();
                    out.push_str(head);
                    out.push_str(" {");
                    if NESTING_AT_RULES.contains(&name.as_str()) {
                        out.push_str(&scope_rules(inner, prefix));
                    } else {
                        out.push_str(inner);
                    }
                } else {
                    out.push_str(&scope_selector(head, prefix));
                    out.push_str(" {");
                    out.push_str(inner);
                }
                out.push('}');

                i = (close + 1).min(css.len());
                prelude_start = i;
            }
            _ => i += 1,
        }
    }
    out.push_str(&css[prelude_start..]);
    out
}

fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() && bytes[i] != quote {
        i += if bytes[i] == b'\\' { 2 } else { 1 };
    }
    (i + 1).min(bytes.len())
}

/// Index of the `}` closing the block opened at `open`, or the input length.
fn matching_brace(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |p| p + 2);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn find_from(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Prefixes every selector of a comma separated list; `:global(…)` opts out.
fn scope_selector(selector: &str, prefix: &str) -> String {
    split_selector_list(selector)
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match unwrap_global(s) {
            Some(global) => global,
            None => format!("{} {}", prefix, s),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn split_selector_list(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&selector[start..]);
    parts
}

fn unwrap_global(selector: &str) -> Option<String> {
    let start = selector.find(":global(")?;
    let after = &selector[start + 8..];
    let end = after.rfind(')')?;
    Some(format!("{}{}{}", &selector[..start], &after[..end], &after[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTR: &str = "data-flow-scope";

    fn raw(content: &str, scoped: bool) -> RawStyle {
        RawStyle {
            content: content.to_string(),
            scoped,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_simple_rules_are_prefixed() {
        let out = apply_scoped_css(".a { color: red; }\n.b, .c > p { margin: 0 }", ATTR, "abc");
        assert_eq!(
            out,
            "[data-flow-scope=\"abc\"] .a { color: red; }\n[data-flow-scope=\"abc\"] .b, [data-flow-scope=\"abc\"] .c > p { margin: 0 }"
        );
    }

    #[test]
    fn test_media_rules_scope_inner_selectors() {
        let out = apply_scoped_css("@media (max-width: 600px) { .a { color: red; } }", ATTR, "x");
        assert!(out.starts_with("@media (max-width: 600px) {"));
        assert!(out.contains("[data-flow-scope=\"x\"] .a {"));
        assert!(!out.contains("\"] @media"));
    }

    #[test]
    fn test_keyframes_are_left_alone() {
        let css = "@keyframes spin { from { opacity: 0; } to { opacity: 1; } }";
        let out = apply_scoped_css(css, ATTR, "x");
        assert!(!out.contains("data-flow-scope"));
        assert!(out.contains("from { opacity: 0; }"));
    }

    #[test]
    fn test_global_and_strings_and_comments() {
        let out = apply_scoped_css(
            "/* c { } */ :global(.app) .x { content: \"{\"; } @import 'a.css';",
            ATTR,
            "x",
        );
        assert!(out.starts_with("/* c { } */"));
        assert!(out.contains(".app .x { content: \"{\"; }"));
        assert!(out.contains("@import 'a.css';"));
    }

    #[test]
    fn test_records_share_one_scope_id() {
        let (records, id) = build_records(
            vec![raw(".a{}", true), raw(".b{}", false), raw(".c{}", true)],
            ATTR,
        );
        let id = id.unwrap();
        assert_eq!(id.len(), 8);
        assert_eq!(id, sha256_hex(".a{}.c{}")[..8]);
        assert_eq!(records[0].scope_id.as_deref(), Some(id.as_str()));
        assert_eq!(records[1].scope_id, None);
        assert_eq!(records[1].content, ".b{}");
        assert_eq!(records[2].scope_id.as_deref(), Some(id.as_str()));
        assert_eq!(records[0].hash, sha256_hex(".a{}"));
    }

    #[test]
    fn test_no_scoped_blocks_no_id() {
        assert!(scope_id(&[raw(".a{}", false)]).is_none());
    }
}
