//! XPath 1.0 subset evaluated over a parsed [`Document`]
//!
//! Rules are written as XPath selectors and predicates. Expressions are
//! compiled once into an [`XPath`] and then evaluated against any number
//! of context nodes.
//!
//! # Supported Expressions
//!
//! - Location paths: `/`, `//`, `.`, `..`, `@attr`, `*`, `text()`, `node()`
//!   and the axes `child`, `descendant`, `descendant-or-self`, `parent`,
//!   `ancestor`, `ancestor-or-self`, `self`, `attribute`,
//!   `following-sibling`, `preceding-sibling`
//! - Predicates, including positional predicates (`Wall[2]`)
//! - Operators: `or`, `and`, `=`, `!=`, `<`, `<=`, `>`, `>=`, `+`, `-`,
//!   `*`, `div`, `mod`, unary `-`, `|`
//! - The core function library (see [`Function`])
//!
//! # Limitations
//!
//! - No variables, namespaces axis, `comment()` or
//!   `processing-instruction()` tests
//! - Name tests compare local names; prefixes are ignored

mod ast;
mod eval;
mod functions;
mod lexer;
mod parser;

pub use functions::Function;

use crate::parser::{Document, NodeId, NodeKind};
use eval::Evaluator;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    #[error("syntax error at offset {position} in '{expr}': {message}")]
    Syntax {
        expr: String,
        position: usize,
        message: String,
    },
    #[error("unknown function '{name}()' in '{expr}'")]
    UnknownFunction { expr: String, name: String },
    #[error("function '{name}()' expects {expected} argument(s), got {found} in '{expr}'")]
    Arity {
        expr: String,
        name: &'static str,
        expected: String,
        found: usize,
    },
    #[error("expression does not evaluate to a node-set: {expr}")]
    NotANodeSet { expr: String },
}

/// A node reachable by an expression: a stored node or one of an
/// element's attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Node(NodeId),
    /// Element id and attribute index
    Attribute(NodeId, usize),
}

impl NodeRef {
    /// Sort key in document order; attributes follow their element and
    /// precede its children
    pub fn order_key(self) -> (NodeId, usize) {
        match self {
            NodeRef::Node(id) => (id, 0),
            NodeRef::Attribute(id, idx) => (id, idx + 1),
        }
    }

    /// The stored node this reference belongs to
    pub fn owner(self) -> NodeId {
        match self {
            NodeRef::Node(id) | NodeRef::Attribute(id, _) => id,
        }
    }

    pub fn string_value(self, doc: &Document) -> String {
        match self {
            NodeRef::Node(id) => doc.string_value(id),
            NodeRef::Attribute(id, idx) => doc
                .node(id)
                .attributes
                .get(idx)
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
        }
    }

    /// Element or attribute name; empty for other nodes
    pub fn name(self, doc: &Document) -> &str {
        match self {
            NodeRef::Node(id) => {
                let node = doc.node(id);
                match node.kind {
                    NodeKind::Element => &node.name,
                    NodeKind::Root | NodeKind::Text => "",
                }
            }
            NodeRef::Attribute(id, idx) => doc
                .node(id)
                .attributes
                .get(idx)
                .map_or("", |(n, _)| n.as_str()),
        }
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Node(id)
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Nodes in document order, without duplicates
    NodeSet(Vec<NodeRef>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// Coerce to boolean: a node-set is true iff non-empty, a number iff
    /// non-zero and not NaN, a string iff non-empty
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    pub fn to_number(&self, doc: &Document) -> f64 {
        match self {
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::NodeSet(_) => parse_number(&self.to_string_value(doc)),
        }
    }

    /// Coerce to string; a node-set yields the string-value of its first node
    pub fn to_string_value(&self, doc: &Document) -> String {
        match self {
            Value::NodeSet(nodes) => nodes
                .first()
                .map(|n| n.string_value(doc))
                .unwrap_or_default(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
        }
    }

    pub fn as_nodes(&self) -> Option<&[NodeRef]> {
        match self {
            Value::NodeSet(nodes) => Some(nodes),
            _ => None,
        }
    }
}

/// XPath `number()` conversion of a string: optional minus sign, digits
/// and at most one decimal point, surrounded by whitespace; anything else
/// is NaN
pub(crate) fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if !valid {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// XPath `string()` conversion of a number
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == n.trunc() && n.abs() < 1e15 {
        // Also maps -0 to "0"
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A compiled XPath expression
#[derive(Debug, Clone)]
pub struct XPath {
    source: String,
    expr: ast::Expr,
}

impl XPath {
    /// Parse an expression; unknown functions and wrong argument counts
    /// are rejected here rather than at evaluation time
    pub fn compile(source: &str) -> Result<Self, XPathError> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The expression text
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate relative to a context node
    pub fn evaluate(&self, doc: &Document, node: impl Into<NodeRef>) -> Result<Value, XPathError> {
        Evaluator::new(doc, &self.source).evaluate(&self.expr, node.into())
    }

    /// Evaluate and coerce the result to boolean
    pub fn test(&self, doc: &Document, node: impl Into<NodeRef>) -> Result<bool, XPathError> {
        Ok(self.evaluate(doc, node)?.to_boolean())
    }

    /// Evaluate as a node-set query
    pub fn select(
        &self,
        doc: &Document,
        node: impl Into<NodeRef>,
    ) -> Result<Vec<NodeRef>, XPathError> {
        match self.evaluate(doc, node)? {
            Value::NodeSet(nodes) => Ok(nodes),
            _ => Err(XPathError::NotANodeSet {
                expr: self.source.clone(),
            }),
        }
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compile and evaluate an expression in one step
pub fn evaluate(
    expression: &str,
    doc: &Document,
    node: impl Into<NodeRef>,
) -> Result<Value, XPathError> {
    XPath::compile(expression)?.evaluate(doc, node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), 42.0);
        assert_eq!(parse_number("  -1.5 "), -1.5);
        assert_eq!(parse_number(".5"), 0.5);
        assert!(parse_number("").is_nan());
        assert!(parse_number("1e3").is_nan());
        assert!(parse_number("+1").is_nan());
        assert!(parse_number("inf").is_nan());
        assert!(parse_number("1.2.3").is_nan());
        assert!(parse_number("-").is_nan());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_boolean_coercion() {
        assert!(!Value::NodeSet(vec![]).to_boolean());
        assert!(Value::NodeSet(vec![NodeRef::Node(1)]).to_boolean());
        assert!(!Value::Number(0.0).to_boolean());
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(Value::Number(-2.0).to_boolean());
        assert!(!Value::String(String::new()).to_boolean());
        assert!(Value::String("false".into()).to_boolean());
    }

    #[test]
    fn test_order_key() {
        assert!(NodeRef::Node(3).order_key() < NodeRef::Attribute(3, 0).order_key());
        assert!(NodeRef::Attribute(3, 5).order_key() < NodeRef::Node(4).order_key());
    }

    #[test]
    fn test_select_requires_node_set() {
        let doc = Document::parse_str("<a/>").unwrap();
        let xpath = XPath::compile("1 + 1").unwrap();
        assert!(matches!(
            xpath.select(&doc, doc.root()),
            Err(XPathError::NotANodeSet { .. })
        ));
    }

    #[test]
    fn test_display_is_source() {
        let xpath = XPath::compile("count(h:Wall) = 1").unwrap();
        assert_eq!(xpath.to_string(), "count(h:Wall) = 1");
        assert_eq!(xpath.as_str(), "count(h:Wall) = 1");
    }
}
