//! XML parser - parses documents into an addressable node arena

use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("Failed to parse XML: {0}")]
    ParseXml(#[from] roxmltree::Error),
}

/// Index of a node inside its owning [`Document`]
pub type NodeId = usize;

/// Kind of a stored node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node (parent of the root element)
    Root,
    Element,
    Text,
}

/// A node in the document arena
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Local element name (empty for root and text nodes)
    pub name: String,
    /// Attributes in source order, keyed by local name
    pub attributes: Vec<(String, String)>,
    /// Raw content for text nodes, trimmed direct text for elements
    pub text: Option<String>,
    /// Child node ids in document order
    pub children: Vec<NodeId>,
    /// Parent node id (None for the document node)
    pub parent: Option<NodeId>,
    /// Source location (1-based)
    pub line: usize,
    pub column: usize,
}

impl Node {
    fn new(kind: NodeKind, parent: Option<NodeId>, line: usize, column: usize) -> Self {
        Self {
            kind,
            name: String::new(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
            parent,
            line,
            column,
        }
    }

    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    /// Look up an attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A parsed XML document.
///
/// Nodes are stored in document order, so a node's id doubles as its
/// document-order position. Id 0 is always the document node.
/// Element names drop their namespace, which lets rules address a
/// default-namespace document with plain names.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Parse an XML file
    pub fn parse_file(path: &Path) -> Result<Self, ParseError> {
        let source = fs::read_to_string(path)?;
        Self::parse_str(&source)
    }

    /// Parse XML from a string
    pub fn parse_str(source: &str) -> Result<Self, ParseError> {
        let doc = roxmltree::Document::parse(source)?;
        let mut nodes = vec![Node::new(NodeKind::Root, None, 1, 1)];

        fn parse_node(node: roxmltree::Node, nodes: &mut Vec<Node>, parent: NodeId) {
            let pos = node.document().text_pos_at(node.range().start);
            let (line, column) = (pos.row as usize, pos.col as usize);

            if node.is_text() {
                let idx = nodes.len();
                let mut text = Node::new(NodeKind::Text, Some(parent), line, column);
                text.text = node.text().map(str::to_string);
                nodes.push(text);
                nodes[parent].children.push(idx);
                return;
            }

            if !node.is_element() {
                return;
            }

            let idx = nodes.len();
            let mut element = Node::new(NodeKind::Element, Some(parent), line, column);
            element.name = node.tag_name().name().to_string();
            element.attributes = node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect();

            let direct_text: String = node
                .children()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect();
            let direct_text = direct_text.trim();
            if !direct_text.is_empty() {
                element.text = Some(direct_text.to_string());
            }

            nodes.push(element);
            nodes[parent].children.push(idx);

            for child in node.children() {
                parse_node(child, nodes, idx);
            }
        }

        for child in doc.root().children() {
            parse_node(child, &mut nodes, 0);
        }

        Ok(Self { nodes })
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        0
    }

    /// The single top-level element, if the document has one
    pub fn root_element(&self) -> Option<NodeId> {
        self.nodes[0]
            .children
            .iter()
            .copied()
            .find(|&id| self.nodes[id].is_element())
    }

    /// Get node by id.
    ///
    /// Ids handed out by this document are always valid; passing an id
    /// from another document panics if it is out of range.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map_or(&[][..], |n| n.children.as_slice())
    }

    /// Child elements with the given name
    pub fn child_elements<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.nodes[c].is_element() && self.nodes[c].name == name)
    }

    /// Concatenated text of all descendant text nodes
    pub fn string_value(&self, id: NodeId) -> String {
        let node = &self.nodes[id];
        match node.kind {
            NodeKind::Text => node.text.clone().unwrap_or_default(),
            NodeKind::Root | NodeKind::Element => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in &self.nodes[id].children {
            let node = &self.nodes[child];
            match node.kind {
                NodeKind::Text => out.push_str(node.text.as_deref().unwrap_or("")),
                NodeKind::Element => self.collect_text(child, out),
                NodeKind::Root => {}
            }
        }
    }

    /// Iterate over all elements in document order
    pub fn elements(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().filter(|(_, n)| n.is_element())
    }
}
