//! Structural parser adapter.
//!
//! Feeds preprocessed markup, wrapped in a synthetic root element, to html5ever and
//! converts the resulting tree into [`DomNode`]s with the original tag and attribute
//! names restored from the preprocessor's [`NameTable`].

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::error::CompileError;
use crate::preprocess::{decode_expression, NameTable, Preprocessed, EXPRESSION_TAG};

pub const ROOT_TAG: &str = "flow-root";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomNode {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<DomNode>,
    },
    Text(String),
    /// Decoded `{{ }}` interpolation.
    Interpolation(String),
}

impl DomNode {
    #[cfg(test)]
    pub(crate) fn element_name(&self) -> Option<&str> {
        match self {
            DomNode::Element { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Parses preprocessed markup and returns its single root node.
pub fn parse_root(preprocessed: &Preprocessed) -> Result<DomNode, CompileError> {
    let document = format!("<{0}>{1}</{0}>", ROOT_TAG, preprocessed.markup);
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut document.as_bytes())
        .map_err(|e| CompileError::Parse(e.to_string()))?;

    let wrapper = find_element(&dom.document, ROOT_TAG)
        .ok_or_else(|| CompileError::Parse("synthetic root element missing".to_string()))?;

    let mut roots = convert_children(&wrapper, &preprocessed.names)?;
    match roots.len() {
        0 => Err(CompileError::EmptyTemplate),
        1 => Ok(roots.remove(0)),
        _ => Err(CompileError::MultipleRoots),
    }
}

fn find_element(handle: &Handle, tag: &str) -> Option<Handle> {
    if let NodeData::Element { name, .. } = &handle.data {
        if &*name.local == tag {
            return Some(handle.clone());
        }
    }
    handle
        .children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, tag))
}

/// Whitespace-only text and comments are dropped.
fn convert_children(parent: &Handle, names: &NameTable) -> Result<Vec<DomNode>, CompileError> {
    let mut nodes = Vec::new();
    for child in parent.children.borrow().iter() {
        if let Some(node) = convert_node(child, names)? {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

fn convert_node(handle: &Handle, names: &NameTable) -> Result<Option<DomNode>, CompileError> {
    match &handle.data {
        NodeData::Text { contents } => {
            let text = contents.borrow().to_string();
            if text.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(DomNode::Text(text)))
            }
        }
        NodeData::Element { name, attrs, .. } => {
            let local = &*name.local;
            if local == EXPRESSION_TAG {
                let payload: String = handle
                    .children
                    .borrow()
                    .iter()
                    .filter_map(|c| match &c.data {
                        NodeData::Text { contents } => Some(contents.borrow().to_string()),
                        _ => None,
                    })
                    .collect();
                return Ok(Some(DomNode::Interpolation(decode_expression(&payload)?)));
            }

            let attrs = attrs
                .borrow()
                .iter()
                .map(|attr| {
                    let id = &*attr.name.local;
                    let name = names.name_of(id).unwrap_or(id).to_string();
                    (name, attr.value.to_string())
                })
                .collect();

            Ok(Some(DomNode::Element {
                name: names.name_of(local).unwrap_or(local).to_string(),
                attrs,
                children: convert_children(handle, names)?,
            }))
        }
        NodeData::Comment { .. }
        | NodeData::Document
        | NodeData::Doctype { .. }
        | NodeData::ProcessingInstruction { .. } => Ok(None),
    }
}
