//! Dialect-independent definition tree.

use super::Dialect;
use crate::config::ParserConfig;
use std::collections::BTreeMap;

/// An element: local name, namespace, attributes, text and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Child elements with the given local name outside any namespace.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children
            .iter()
            .filter(move |c| c.namespace.is_none() && c.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children
            .iter()
            .find(|c| c.namespace.is_none() && c.name == name)
    }

    /// Trimmed, non-empty text of the first child called `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .and_then(|c| c.text.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    fn from_element(element: roxmltree::Node<'_, '_>) -> Self {
        let tag = element.tag_name();
        let attributes = element
            .attributes()
            .filter(|a| a.namespace().is_none())
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect();

        let text: String = element
            .children()
            .filter(|c| c.is_text())
            .filter_map(|c| c.text())
            .collect();
        let text = Some(text.trim().to_string()).filter(|t| !t.is_empty());

        let children = element
            .children()
            .filter(|c| c.is_element())
            .map(Node::from_element)
            .collect();

        Self {
            name: tag.name().to_string(),
            namespace: tag.namespace().map(str::to_string),
            attributes,
            text,
            children,
        }
    }
}

/// Normalized form of one candidate. Consumed by the model builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTree {
    pub root: Node,
    pub dialect: Dialect,
    /// Identity of the candidate the tree came from.
    pub source: String,
}

/// Parse XML text into a [`Node`] tree with the configured limits.
///
/// The parser is strict and namespace-aware; the roxmltree document is
/// dropped before returning, only the owned tree survives.
pub(crate) fn parse_xml(text: &str, config: &ParserConfig) -> Result<Node, roxmltree::Error> {
    let doc = roxmltree::Document::parse_with_options(text, config.parsing_options())?;
    Ok(Node::from_element(doc.root_element()))
}
