//! Template preprocessor.
//!
//! A single left-to-right scan over the raw template bytes driven by an explicit
//! [`State`] value. Every transition is a pure function of `(state, bytes, position)`
//! returning the next state, how far to move and an optional [`Edit`]. Edits refer to
//! positions of the *original* text and are collected in scan order, then replayed once
//! to build the output. Nothing is spliced while scanning.
//!
//! The output is plain markup a generic HTML tree builder accepts:
//! - tag and attribute identifiers are replaced by short ids (`i0`, `i1`, …) so that
//!   case, `:`/`@`/`#` punctuation and HTML-specific tree construction rules never
//!   touch them;
//! - `{{ expr }}` becomes `<flow-expression>BASE64</flow-expression>`;
//! - valueless plain attributes receive an explicit default marker value;
//! - `#name` and `@event` shorthands are spelled out as `v-slot:name` / `v-on:event`;
//! - self-closing tags and void HTML elements get an explicit closing tag.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

use crate::error::CompileError;

pub const V_ON: &str = "v-on:";
pub const V_SLOT: &str = "v-slot:";
pub const DEFAULT_VALUE: &str = "____DEF____";
pub const EXPRESSION_TAG: &str = "flow-expression";

lazy_static! {
    static ref VOID_TAGS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
        "track", "wbr",
    ]
    .into_iter()
    .collect();
}

pub(crate) fn is_void_tag(name: &str) -> bool {
    VOID_TAGS.contains(name.to_ascii_lowercase().as_str())
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAME TABLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Bidirectional mapping between original identifiers and their short ids.
/// Ids are allocated in first-seen order and reused for repeated names.
#[derive(Debug, Default, Clone)]
pub struct NameTable {
    id_to_name: Vec<String>,
    name_to_id: HashMap<String, String>,
}

impl NameTable {
    pub fn intern(&mut self, name: &str) -> String {
        if let Some(id) = self.name_to_id.get(name) {
            return id.clone();
        }
        let id = format!("i{}", self.id_to_name.len());
        self.id_to_name.push(name.to_string());
        self.name_to_id.insert(name.to_string(), id.clone());
        id
    }

    pub fn name_of(&self, id: &str) -> Option<&str> {
        let index: usize = id.strip_prefix('i')?.parse().ok()?;
        if format!("i{}", index) != id {
            return None;
        }
        self.id_to_name.get(index).map(String::as_str)
    }

    #[cfg(test)]
    fn id_of(&self, name: &str) -> Option<&str> {
        self.name_to_id.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_name.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNER STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shorthand {
    Slot,
    On,
}

impl Shorthand {
    pub fn prefix(self) -> &'static str {
        match self {
            Shorthand::Slot => V_SLOT,
            Shorthand::On => V_ON,
        }
    }
}

/// Tag currently being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenTag {
    pub name: Span,
    pub void: bool,
}

/// State resumed once a whitespace run inside a tag ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    AttributeName,
    Equal { directive: bool, name_end: usize },
    AttributeValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Text,
    Comment,
    Expression {
        open: usize,
        quote: Option<u8>,
    },
    TagName {
        start: usize,
    },
    TagNameClosing {
        start: usize,
    },
    AttributeName {
        tag: OpenTag,
        start: usize,
        shorthand: Option<Shorthand>,
    },
    Equal {
        tag: OpenTag,
        directive: bool,
        name_end: usize,
    },
    AttributeValue {
        tag: OpenTag,
        quote: Option<u8>,
        started: bool,
    },
    Whitespace {
        tag: OpenTag,
        resume: Resume,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Identifier to replace by its id. With a shorthand, the first byte of
    /// the span is the `#`/`@` punctuation.
    Name {
        span: Span,
        shorthand: Option<Shorthand>,
    },
    /// Whole `{{ … }}` span, delimiters included.
    Interpolation { span: Span },
    /// Insert `="____DEF____"` after a valueless attribute.
    DefaultValue { at: usize },
    /// Replace `span` (the `/>` or `>` ending a tag) by `></id>`.
    Close { span: Span, tag: Span },
}

impl Edit {
    fn span(&self) -> Span {
        match self {
            Edit::Name { span, .. } | Edit::Interpolation { span } | Edit::Close { span, .. } => {
                *span
            }
            Edit::DefaultValue { at } => Span::new(*at, *at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: State,
    pub edit: Option<Edit>,
    /// Bytes consumed; zero re-examines the same byte in `next`.
    pub advance: usize,
}

impl Transition {
    fn to(next: State, advance: usize) -> Self {
        Self {
            next,
            edit: None,
            advance,
        }
    }

    fn with_edit(next: State, edit: Edit, advance: usize) -> Self {
        Self {
            next,
            edit: Some(edit),
            advance,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSITIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\n' | b'\t' | b'\r')
}

fn starts_with_at(bytes: &[u8], pos: usize, needle: &[u8]) -> bool {
    bytes.get(pos..pos + needle.len()) == Some(needle)
}

fn name_edit(start: usize, end: usize, shorthand: Option<Shorthand>) -> Option<Edit> {
    (end > start).then_some(Edit::Name {
        span: Span::new(start, end),
        shorthand,
    })
}

/// Computes the transition for the byte at `pos`.
pub fn step(state: State, bytes: &[u8], pos: usize) -> Transition {
    let b = bytes[pos];
    match state {
        State::Text => {
            if b == b'<' {
                if starts_with_at(bytes, pos, b"<!--") {
                    Transition::to(State::Comment, 4)
                } else if bytes.get(pos + 1) == Some(&b'/') {
                    Transition::to(State::TagNameClosing { start: pos + 2 }, 2)
                } else {
                    Transition::to(State::TagName { start: pos + 1 }, 1)
                }
            } else if b == b'{' && bytes.get(pos + 1) == Some(&b'{') {
                Transition::to(
                    State::Expression {
                        open: pos,
                        quote: None,
                    },
                    2,
                )
            } else {
                Transition::to(State::Text, 1)
            }
        }

        State::Comment => {
            if starts_with_at(bytes, pos, b"-->") {
                Transition::to(State::Text, 3)
            } else {
                Transition::to(State::Comment, 1)
            }
        }

        State::Expression { open, quote } => match quote {
            Some(q) => {
                if b == b'\\' {
                    Transition::to(state, 2)
                } else if b == q {
                    Transition::to(State::Expression { open, quote: None }, 1)
                } else {
                    Transition::to(state, 1)
                }
            }
            None => {
                if matches!(b, b'\'' | b'"' | b'`') {
                    Transition::to(
                        State::Expression {
                            open,
                            quote: Some(b),
                        },
                        1,
                    )
                } else if b == b'}' && bytes.get(pos + 1) == Some(&b'}') {
                    Transition::with_edit(
                        State::Text,
                        Edit::Interpolation {
                            span: Span::new(open, pos + 2),
                        },
                        2,
                    )
                } else {
                    Transition::to(state, 1)
                }
            }
        },

        State::TagName { start } => {
            if pos == start && !b.is_ascii_alphabetic() {
                // `< b`, `<3`, `<!DOCTYPE`: not a tag
                return Transition::to(State::Text, 0);
            }
            if !(is_space(b) || b == b'>' || b == b'/') {
                return Transition::to(state, 1);
            }
            let tag = OpenTag {
                name: Span::new(start, pos),
                void: std::str::from_utf8(&bytes[start..pos])
                    .map_or(false, |name| VOID_TAGS.contains(name)),
            };
            let edit = name_edit(start, pos, None);
            let (next, advance) = if is_space(b) {
                (
                    State::Whitespace {
                        tag,
                        resume: Resume::AttributeName,
                    },
                    1,
                )
            } else {
                (
                    State::AttributeName {
                        tag,
                        start: pos,
                        shorthand: None,
                    },
                    0,
                )
            };
            Transition {
                next,
                edit,
                advance,
            }
        }

        State::TagNameClosing { start } => {
            if b == b'>' || is_space(b) {
                Transition {
                    next: State::Text,
                    edit: name_edit(start, pos, None),
                    advance: 1,
                }
            } else {
                Transition::to(state, 1)
            }
        }

        State::AttributeName {
            tag,
            start,
            shorthand,
        } => {
            if pos == start {
                return match b {
                    b'#' => Transition::to(
                        State::AttributeName {
                            tag,
                            start,
                            shorthand: Some(Shorthand::Slot),
                        },
                        1,
                    ),
                    b'@' => Transition::to(
                        State::AttributeName {
                            tag,
                            start,
                            shorthand: Some(Shorthand::On),
                        },
                        1,
                    ),
                    b'>' if tag.void => Transition::with_edit(
                        State::Text,
                        Edit::Close {
                            span: Span::new(pos, pos + 1),
                            tag: tag.name,
                        },
                        1,
                    ),
                    b'>' => Transition::to(State::Text, 1),
                    b'/' => {
                        let mut end = pos + 1;
                        while end < bytes.len() && is_space(bytes[end]) {
                            end += 1;
                        }
                        if bytes.get(end) == Some(&b'>') {
                            Transition::with_edit(
                                State::Text,
                                Edit::Close {
                                    span: Span::new(pos, end + 1),
                                    tag: tag.name,
                                },
                                end + 1 - pos,
                            )
                        } else {
                            Transition::to(
                                State::AttributeName {
                                    tag,
                                    start: pos + 1,
                                    shorthand: None,
                                },
                                1,
                            )
                        }
                    }
                    _ if is_space(b) || b == b'=' => Transition::to(
                        State::AttributeName {
                            tag,
                            start: pos + 1,
                            shorthand: None,
                        },
                        1,
                    ),
                    _ => Transition::to(state, 1),
                };
            }
            if b == b'=' || b == b'>' || b == b'/' || is_space(b) {
                let name_start = start + usize::from(shorthand.is_some());
                let directive = shorthand.is_some()
                    || bytes[name_start..pos].starts_with(b"v-");
                let equal = State::Equal {
                    tag,
                    directive,
                    name_end: pos,
                };
                let edit = name_edit(start, pos, shorthand);
                if is_space(b) {
                    Transition {
                        next: State::Whitespace {
                            tag,
                            resume: Resume::Equal {
                                directive,
                                name_end: pos,
                            },
                        },
                        edit,
                        advance: 1,
                    }
                } else {
                    Transition {
                        next: equal,
                        edit,
                        advance: 0,
                    }
                }
            } else {
                Transition::to(state, 1)
            }
        }

        State::Equal {
            tag,
            directive,
            name_end,
        } => {
            if b == b'=' {
                return Transition::to(
                    State::Whitespace {
                        tag,
                        resume: Resume::AttributeValue,
                    },
                    1,
                );
            }
            let next = State::AttributeName {
                tag,
                start: pos,
                shorthand: None,
            };
            if directive {
                Transition::to(next, 0)
            } else {
                Transition::with_edit(next, Edit::DefaultValue { at: name_end }, 0)
            }
        }

        State::AttributeValue {
            tag,
            quote,
            started,
        } => {
            let after_value = State::Whitespace {
                tag,
                resume: Resume::AttributeName,
            };
            if !started {
                return match b {
                    b'"' | b'\'' => Transition::to(
                        State::AttributeValue {
                            tag,
                            quote: Some(b),
                            started: true,
                        },
                        1,
                    ),
                    b'>' => Transition::to(
                        State::AttributeName {
                            tag,
                            start: pos,
                            shorthand: None,
                        },
                        0,
                    ),
                    _ => Transition::to(
                        State::AttributeValue {
                            tag,
                            quote: None,
                            started: true,
                        },
                        1,
                    ),
                };
            }
            match quote {
                Some(q) if b == q => Transition::to(after_value, 1),
                Some(_) => Transition::to(state, 1),
                None if is_space(b) => Transition::to(after_value, 1),
                None if b == b'>' => Transition::to(
                    State::AttributeName {
                        tag,
                        start: pos,
                        shorthand: None,
                    },
                    0,
                ),
                None => Transition::to(state, 1),
            }
        }

        State::Whitespace { tag, resume } => {
            if is_space(b) {
                return Transition::to(state, 1);
            }
            let next = match resume {
                Resume::AttributeName => State::AttributeName {
                    tag,
                    start: pos,
                    shorthand: None,
                },
                Resume::Equal {
                    directive,
                    name_end,
                } => State::Equal {
                    tag,
                    directive,
                    name_end,
                },
                Resume::AttributeValue => State::AttributeValue {
                    tag,
                    quote: None,
                    started: false,
                },
            };
            Transition::to(next, 0)
        }
    }
}

/// Runs the scanner to the end of input and returns the collected edits.
/// Unterminated constructs simply run out of input without producing an edit.
pub fn scan(template: &str) -> Vec<Edit> {
    let bytes = template.as_bytes();
    let mut state = State::Text;
    let mut pos = 0;
    let mut edits = Vec::new();

    while pos < bytes.len() {
        let transition = step(state, bytes, pos);
        if let Some(edit) = transition.edit {
            edits.push(edit);
        }
        state = transition.next;
        pos += transition.advance;
    }

    edits
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPLAY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub markup: String,
    pub names: NameTable,
}

fn slice(text: &str, start: usize, end: usize) -> &str {
    text.get(start..end).unwrap_or_default()
}

pub fn preprocess(template: &str) -> Preprocessed {
    let edits = scan(template);
    let mut names = NameTable::default();
    let mut markup = String::with_capacity(template.len() + template.len() / 4);
    let mut cursor = 0;

    for edit in &edits {
        let span = edit.span();
        if span.start < cursor {
            continue;
        }
        markup.push_str(slice(template, cursor, span.start));
        match edit {
            Edit::Name { span, shorthand } => {
                let name = match shorthand {
                    Some(s) => format!("{}{}", s.prefix(), slice(template, span.start + 1, span.end)),
                    None => slice(template, span.start, span.end).to_string(),
                };
                markup.push_str(&names.intern(&name));
            }
            Edit::Interpolation { span } => {
                let code = slice(template, span.start + 2, span.end - 2);
                markup.push('<');
                markup.push_str(EXPRESSION_TAG);
                markup.push('>');
                markup.push_str(&STANDARD.encode(code));
                markup.push_str("</");
                markup.push_str(EXPRESSION_TAG);
                markup.push('>');
            }
            Edit::DefaultValue { .. } => {
                markup.push_str("=\"");
                markup.push_str(DEFAULT_VALUE);
                markup.push('"');
            }
            Edit::Close { tag, .. } => {
                let id = names.intern(slice(template, tag.start, tag.end));
                markup.push_str("></");
                markup.push_str(&id);
                markup.push('>');
            }
        }
        cursor = span.end;
    }
    markup.push_str(slice(template, cursor, template.len()));

    tracing::debug!(
        names = names.len(),
        edits = edits.len(),
        "preprocessed template"
    );

    Preprocessed { markup, names }
}

/// Decodes the payload of an interpolation marker back into expression source.
pub fn decode_expression(payload: &str) -> Result<String, CompileError> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| CompileError::Parse(format!("malformed interpolation marker: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| CompileError::Parse(format!("malformed interpolation marker: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_first_seen_order() {
        let out = preprocess(r#"<div class="a"><span class="b"></span></div>"#);
        assert_eq!(out.markup, r#"<i0 i1="a"><i2 i1="b"></i2></i0>"#);
        assert_eq!(out.names.name_of("i0"), Some("div"));
        assert_eq!(out.names.name_of("i1"), Some("class"));
        assert_eq!(out.names.id_of("span"), Some("i2"));
        assert_eq!(out.names.name_of("i01"), None);
    }

    #[test]
    fn test_interpolation_becomes_marker() {
        let out = preprocess("<p>Hi {{ user.name }}!</p>");
        let encoded = STANDARD.encode(" user.name ");
        assert_eq!(
            out.markup,
            format!("<i0>Hi <flow-expression>{}</flow-expression>!</i0>", encoded)
        );
        assert_eq!(decode_expression(&encoded).unwrap(), " user.name ");
    }

    #[test]
    fn test_braces_inside_strings_do_not_close_interpolation() {
        let out = preprocess(r#"<p>{{ "}}" + 'a\'}}' }}</p>"#);
        let encoded = STANDARD.encode(r#" "}}" + 'a\'}}' "#);
        assert!(out.markup.contains(&encoded));
    }

    #[test]
    fn test_shorthands_are_spelled_out() {
        let out = preprocess(r#"<Comp @click="go" #header="{ a }"></Comp>"#);
        assert_eq!(out.names.name_of("i1"), Some("v-on:click"));
        assert_eq!(out.names.name_of("i2"), Some("v-slot:header"));
        assert_eq!(out.markup, r#"<i0 i1="go" i2="{ a }"></i0>"#);
    }

    #[test]
    fn test_valueless_attributes_get_default_marker() {
        let out = preprocess("<button disabled v-else :busy>Go</button>");
        assert_eq!(out.names.name_of("i1"), Some("disabled"));
        assert_eq!(out.names.name_of("i2"), Some("v-else"));
        assert_eq!(out.names.name_of("i3"), Some(":busy"));
        assert_eq!(
            out.markup,
            r#"<i0 i1="____DEF____" i2 i3="____DEF____">Go</i0>"#
        );
    }

    #[test]
    fn test_self_closing_and_void_tags_are_closed() {
        let out = preprocess(r#"<div><MyInput value="x" /><input disabled><br></div>"#);
        assert_eq!(
            out.markup,
            r#"<i0><i1 i2="x" ></i1><i3 i4="____DEF____"></i3><i5></i5></i0>"#
        );
    }

    #[test]
    fn test_comments_and_text_are_left_alone() {
        let out = preprocess("<div><!-- <span a> {{ x }} -->a < b</div>");
        assert_eq!(out.markup, "<i0><!-- <span a> {{ x }} -->a < b</i0>");
    }

    #[test]
    fn test_unterminated_interpolation_runs_to_end() {
        let out = preprocess("<p>{{ open");
        assert_eq!(out.markup, "<i0>{{ open");
    }

    #[test]
    fn test_single_transition_is_pure() {
        let bytes = b"<div>";
        let t = step(State::Text, bytes, 0);
        assert_eq!(t.next, State::TagName { start: 1 });
        assert_eq!(t.advance, 1);
        assert!(t.edit.is_none());

        let t2 = step(t.next, bytes, 4);
        assert_eq!(
            t2.edit,
            Some(Edit::Name {
                span: Span::new(1, 4),
                shorthand: None
            })
        );
        assert_eq!(t2.advance, 0);
    }
}
