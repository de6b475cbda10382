//! Expression evaluation over the document arena

use super::ast::{ArithOp, Axis, CompareOp, Expr, NodeTest, Step};
use super::{parse_number, NodeRef, Value, XPathError};
use crate::parser::{Document, NodeKind};

/// Evaluation context: the context node with its proximity position
/// and the context size
#[derive(Debug, Clone, Copy)]
pub(super) struct Context {
    pub node: NodeRef,
    pub position: usize,
    pub size: usize,
}

/// Evaluates compiled expressions against one document
pub(super) struct Evaluator<'a> {
    doc: &'a Document,
    /// Expression text, for error messages
    source: &'a str,
}

impl<'a> Evaluator<'a> {
    pub fn new(doc: &'a Document, source: &'a str) -> Self {
        Self { doc, source }
    }

    pub fn doc(&self) -> &'a Document {
        self.doc
    }

    pub fn evaluate(&self, expr: &Expr, node: NodeRef) -> Result<Value, XPathError> {
        let ctx = Context {
            node,
            position: 1,
            size: 1,
        };
        self.eval(expr, &ctx)
    }

    fn not_a_node_set(&self) -> XPathError {
        XPathError::NotANodeSet {
            expr: self.source.to_string(),
        }
    }

    pub fn node_set_arg<'v>(&self, value: &'v Value) -> Result<&'v [NodeRef], XPathError> {
        value.as_nodes().ok_or_else(|| self.not_a_node_set())
    }

    fn eval(&self, expr: &Expr, ctx: &Context) -> Result<Value, XPathError> {
        match expr {
            Expr::Or(lhs, rhs) => Ok(Value::Boolean(
                self.eval(lhs, ctx)?.to_boolean() || self.eval(rhs, ctx)?.to_boolean(),
            )),
            Expr::And(lhs, rhs) => Ok(Value::Boolean(
                self.eval(lhs, ctx)?.to_boolean() && self.eval(rhs, ctx)?.to_boolean(),
            )),
            Expr::Compare(op, lhs, rhs) => {
                let lhs = self.eval(lhs, ctx)?;
                let rhs = self.eval(rhs, ctx)?;
                Ok(Value::Boolean(self.compare(*op, &lhs, &rhs)))
            }
            Expr::Arith(op, lhs, rhs) => {
                let a = self.eval(lhs, ctx)?.to_number(self.doc);
                let b = self.eval(rhs, ctx)?.to_number(self.doc);
                Ok(Value::Number(match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Mod => a % b,
                }))
            }
            Expr::Negate(inner) => Ok(Value::Number(-self.eval(inner, ctx)?.to_number(self.doc))),
            Expr::Union(lhs, rhs) => {
                let (Value::NodeSet(mut nodes), Value::NodeSet(other)) =
                    (self.eval(lhs, ctx)?, self.eval(rhs, ctx)?)
                else {
                    return Err(self.not_a_node_set());
                };
                nodes.extend(other);
                sort_document_order(&mut nodes);
                Ok(Value::NodeSet(nodes))
            }
            Expr::Literal(s) => Ok(Value::String(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Call(function, args) => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                function.call(self, ctx, values)
            }
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    NodeRef::Node(self.doc.root())
                } else {
                    ctx.node
                };
                Ok(Value::NodeSet(self.apply_steps(vec![start], steps)?))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let Value::NodeSet(nodes) = self.eval(primary, ctx)? else {
                    return Err(self.not_a_node_set());
                };
                let nodes = self.filter(nodes, predicates)?;
                Ok(Value::NodeSet(self.apply_steps(nodes, steps)?))
            }
        }
    }

    fn apply_steps(
        &self,
        mut nodes: Vec<NodeRef>,
        steps: &[Step],
    ) -> Result<Vec<NodeRef>, XPathError> {
        for step in steps {
            let mut next = Vec::new();
            for &node in &nodes {
                let candidates: Vec<NodeRef> = self
                    .axis(node, step.axis)
                    .into_iter()
                    .filter(|&n| self.matches(n, step.axis, &step.test))
                    .collect();
                next.extend(self.filter(candidates, &step.predicates)?);
            }
            sort_document_order(&mut next);
            nodes = next;
        }
        Ok(nodes)
    }

    /// Apply predicates in turn; `nodes` is in proximity order
    fn filter(
        &self,
        mut nodes: Vec<NodeRef>,
        predicates: &[Expr],
    ) -> Result<Vec<NodeRef>, XPathError> {
        for predicate in predicates {
            let size = nodes.len();
            let mut kept = Vec::with_capacity(size);
            for (i, &node) in nodes.iter().enumerate() {
                let ctx = Context {
                    node,
                    position: i + 1,
                    size,
                };
                let keep = match self.eval(predicate, &ctx)? {
                    Value::Number(n) => n == ctx.position as f64,
                    other => other.to_boolean(),
                };
                if keep {
                    kept.push(node);
                }
            }
            nodes = kept;
        }
        Ok(nodes)
    }

    /// Nodes along an axis, nearest first
    fn axis(&self, node: NodeRef, axis: Axis) -> Vec<NodeRef> {
        let doc = self.doc;
        match (axis, node) {
            (Axis::SelfAxis, n) => vec![n],
            (Axis::Parent, NodeRef::Attribute(owner, _)) => vec![NodeRef::Node(owner)],
            (Axis::Parent, NodeRef::Node(id)) => doc.parent(id).map(NodeRef::Node).into_iter().collect(),
            (Axis::Ancestor | Axis::AncestorOrSelf, n) => {
                let mut out = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    out.push(n);
                }
                let mut current = match n {
                    NodeRef::Attribute(owner, _) => Some(owner),
                    NodeRef::Node(id) => doc.parent(id),
                };
                while let Some(id) = current {
                    out.push(NodeRef::Node(id));
                    current = doc.parent(id);
                }
                out
            }
            (_, NodeRef::Attribute(..)) => {
                if axis == Axis::DescendantOrSelf {
                    vec![node]
                } else {
                    Vec::new()
                }
            }
            (Axis::Child, NodeRef::Node(id)) => {
                doc.children(id).iter().map(|&c| NodeRef::Node(c)).collect()
            }
            (Axis::Descendant | Axis::DescendantOrSelf, NodeRef::Node(id)) => {
                let mut out = Vec::new();
                if axis == Axis::DescendantOrSelf {
                    out.push(node);
                }
                self.collect_descendants(id, &mut out);
                out
            }
            (Axis::Attribute, NodeRef::Node(id)) => {
                let element = doc.node(id);
                if element.kind != NodeKind::Element {
                    return Vec::new();
                }
                (0..element.attributes.len())
                    .map(|i| NodeRef::Attribute(id, i))
                    .collect()
            }
            (Axis::FollowingSibling | Axis::PrecedingSibling, NodeRef::Node(id)) => {
                let Some(parent) = doc.parent(id) else {
                    return Vec::new();
                };
                let siblings = doc.children(parent);
                let Some(pos) = siblings.iter().position(|&s| s == id) else {
                    return Vec::new();
                };
                if axis == Axis::FollowingSibling {
                    siblings[pos + 1..].iter().map(|&s| NodeRef::Node(s)).collect()
                } else {
                    siblings[..pos].iter().rev().map(|&s| NodeRef::Node(s)).collect()
                }
            }
        }
    }

    fn collect_descendants(&self, id: usize, out: &mut Vec<NodeRef>) {
        for &child in self.doc.children(id) {
            out.push(NodeRef::Node(child));
            self.collect_descendants(child, out);
        }
    }

    fn matches(&self, node: NodeRef, axis: Axis, test: &NodeTest) -> bool {
        if *test == NodeTest::Node {
            return true;
        }
        match node {
            // Attributes are the principal node type only on the attribute axis
            NodeRef::Attribute(..) => {
                axis == Axis::Attribute
                    && match test {
                        NodeTest::Name(name) => node.name(self.doc) == name.as_str(),
                        NodeTest::Any => true,
                        NodeTest::Text | NodeTest::Node => false,
                    }
            }
            NodeRef::Node(id) => {
                let n = self.doc.node(id);
                match test {
                    NodeTest::Name(name) => n.kind == NodeKind::Element && n.name == *name,
                    NodeTest::Any => n.kind == NodeKind::Element,
                    NodeTest::Text => n.kind == NodeKind::Text,
                    NodeTest::Node => true,
                }
            }
        }
    }

    fn compare(&self, op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
        match (lhs, rhs) {
            (Value::NodeSet(a), Value::NodeSet(b)) => a.iter().any(|x| {
                let x = x.string_value(self.doc);
                b.iter().any(|y| {
                    let y = y.string_value(self.doc);
                    match op {
                        CompareOp::Eq => x == y,
                        CompareOp::NotEq => x != y,
                        _ => compare_numbers(op, parse_number(&x), parse_number(&y)),
                    }
                })
            }),
            (Value::NodeSet(nodes), scalar) => self.compare_node_set(op, nodes, scalar),
            (scalar, Value::NodeSet(nodes)) => self.compare_node_set(op.flipped(), nodes, scalar),
            (a, b) => self.compare_scalars(op, a, b),
        }
    }

    /// Node-set against a scalar: true if any node satisfies the comparison,
    /// except for booleans which compare against the set's truthiness
    fn compare_node_set(&self, op: CompareOp, nodes: &[NodeRef], scalar: &Value) -> bool {
        match scalar {
            Value::Boolean(_) => {
                self.compare_scalars(op, &Value::Boolean(!nodes.is_empty()), scalar)
            }
            Value::Number(n) => nodes
                .iter()
                .any(|x| compare_numbers(op, parse_number(&x.string_value(self.doc)), *n)),
            Value::String(_) => nodes.iter().any(|x| {
                self.compare_scalars(op, &Value::String(x.string_value(self.doc)), scalar)
            }),
            // Two node-sets are handled by `compare`
            Value::NodeSet(_) => false,
        }
    }

    fn compare_scalars(&self, op: CompareOp, a: &Value, b: &Value) -> bool {
        match op {
            CompareOp::Eq | CompareOp::NotEq => {
                let equal = match (a, b) {
                    (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
                        a.to_boolean() == b.to_boolean()
                    }
                    (Value::Number(_), _) | (_, Value::Number(_)) => {
                        a.to_number(self.doc) == b.to_number(self.doc)
                    }
                    _ => a.to_string_value(self.doc) == b.to_string_value(self.doc),
                };
                if op == CompareOp::Eq {
                    equal
                } else {
                    !equal
                }
            }
            _ => compare_numbers(op, a.to_number(self.doc), b.to_number(self.doc)),
        }
    }
}

fn compare_numbers(op: CompareOp, a: f64, b: f64) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::NotEq => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

fn sort_document_order(nodes: &mut Vec<NodeRef>) {
    nodes.sort_by_key(|n| n.order_key());
    nodes.dedup();
}

#[cfg(test)]
mod tests {
    use crate::parser::Document;
    use crate::xpath::{evaluate, NodeRef, Value, XPath};

    const HPXML: &str = r#"<?xml version="1.0"?>
<HPXML xmlns="http://hpxmlonline.com/2019/10" schemaVersion="3.0">
  <Building id="b1">
    <BuildingDetails>
      <Enclosure>
        <Walls>
          <Wall id="w1"><Area>100</Area><InteriorAdjacentTo>living space</InteriorAdjacentTo></Wall>
          <Wall id="w2"><Area>250.5</Area><InteriorAdjacentTo>garage</InteriorAdjacentTo></Wall>
          <Wall id="w3"><Area>foo</Area></Wall>
        </Walls>
      </Enclosure>
    </BuildingDetails>
  </Building>
</HPXML>"#;

    fn doc() -> Document {
        Document::parse_str(HPXML).unwrap()
    }

    fn eval(doc: &Document, expr: &str) -> Value {
        evaluate(expr, doc, doc.root()).unwrap()
    }

    fn test(doc: &Document, expr: &str) -> bool {
        eval(doc, expr).to_boolean()
    }

    fn number(doc: &Document, expr: &str) -> f64 {
        match eval(doc, expr) {
            Value::Number(n) => n,
            other => panic!("expected number, got {other:?}"),
        }
    }

    fn string(doc: &Document, expr: &str) -> String {
        match eval(doc, expr) {
            Value::String(s) => s,
            other => panic!("expected string, got {other:?}"),
        }
    }

    fn ids(doc: &Document, expr: &str) -> Vec<String> {
        XPath::compile(expr)
            .unwrap()
            .select(doc, doc.root())
            .unwrap()
            .into_iter()
            .map(|n| match n {
                NodeRef::Node(id) => doc.node(id).attr("id").unwrap_or("").to_string(),
                NodeRef::Attribute(..) => n.string_value(doc),
            })
            .collect()
    }

    #[test]
    fn test_absolute_and_descendant_paths() {
        let doc = doc();
        assert_eq!(ids(&doc, "/HPXML/Building"), vec!["b1"]);
        assert_eq!(ids(&doc, "//Wall"), vec!["w1", "w2", "w3"]);
        assert_eq!(ids(&doc, "/HPXML//Walls/Wall"), vec!["w1", "w2", "w3"]);
        assert!(ids(&doc, "/Building").is_empty());
    }

    #[test]
    fn test_root_path_selects_document_node() {
        let doc = doc();
        let nodes = XPath::compile("/").unwrap().select(&doc, doc.root()).unwrap();
        assert_eq!(nodes, vec![NodeRef::Node(doc.root())]);
        assert_eq!(string(&doc, "name(/*)"), "HPXML");
    }

    #[test]
    fn test_predicates() {
        let doc = doc();
        assert_eq!(ids(&doc, "//Wall[InteriorAdjacentTo='garage']"), vec!["w2"]);
        assert_eq!(ids(&doc, "//Wall[2]"), vec!["w2"]);
        assert_eq!(ids(&doc, "//Wall[last()]"), vec!["w3"]);
        assert_eq!(ids(&doc, "//Wall[position() > 1][1]"), vec!["w2"]);
        assert_eq!(ids(&doc, "//Wall[not(InteriorAdjacentTo)]"), vec!["w3"]);
    }

    #[test]
    fn test_attributes() {
        let doc = doc();
        assert_eq!(ids(&doc, "//Wall/@id"), vec!["w1", "w2", "w3"]);
        assert!(test(&doc, "/HPXML/@schemaVersion = '3.0'"));
        assert!(test(&doc, "/HPXML/@schemaVersion = 3"));
        assert!(!test(&doc, "/HPXML/@missing"));
        assert_eq!(number(&doc, "count(//@*)"), 5.0);
    }

    #[test]
    fn test_relative_evaluation() {
        let doc = doc();
        let (wall, _) = doc.elements().find(|(_, e)| e.name == "Wall").unwrap();
        let at = |expr: &str| XPath::compile(expr).unwrap().test(&doc, wall).unwrap();

        assert!(at("Area"));
        assert!(at("@id"));
        assert!(at("../../../../../Building"));
        assert!(at("ancestor::Building[@id='b1']"));
        assert!(at("following-sibling::Wall[1]/@id = 'w2'"));
        assert!(!at("preceding-sibling::Wall"));
        assert!(at("self::Wall"));
        assert!(!at("self::Floor"));
        assert!(at("count(.) = 1"));
    }

    #[test]
    fn test_text_nodes() {
        let doc = doc();
        assert!(test(&doc, "//Wall[1]/Area/text() = '100'"));
        assert!(test(
            &doc,
            r#"contains("_living space_ _garage_", concat("_", //Wall[2]/InteriorAdjacentTo/text(), "_"))"#
        ));
        assert!(!test(&doc, "//Wall[1]/@id/text()"));
    }

    #[test]
    fn test_count_comparisons() {
        let doc = doc();
        assert!(test(&doc, "count(//Wall) >= 1 and count(//Wall) <= 3"));
        assert!(!test(&doc, "count(//Wall) = 2"));
        assert!(test(&doc, "count(//Floor) = 0"));
    }

    #[test]
    fn test_node_set_number_comparison_is_existential() {
        let doc = doc();
        assert!(test(&doc, "//Area > 200"));
        assert!(test(&doc, "//Area < 200"));
        assert!(!test(&doc, "//Area > 1000"));
        // NaN never compares
        assert!(!test(&doc, "//Wall[3]/Area > 0"));
        assert!(!test(&doc, "//Wall[3]/Area <= 0"));
        // Operand order does not matter
        assert!(test(&doc, "200 < //Area"));
    }

    #[test]
    fn test_node_set_against_node_set() {
        let doc = doc();
        assert!(test(&doc, "//Wall/@id = //Wall[2]/@id"));
        assert!(test(&doc, "//Wall/@id != //Wall[2]/@id"));
        assert!(!test(&doc, "//Wall/@id = //Building/@id"));
    }

    #[test]
    fn test_node_set_against_boolean() {
        let doc = doc();
        assert!(test(&doc, "//Wall = true()"));
        assert!(test(&doc, "//Floor = false()"));
    }

    #[test]
    fn test_scalar_comparisons() {
        let doc = doc();
        assert!(test(&doc, "1 = 1.0"));
        assert!(test(&doc, "'1' = 1"));
        assert!(test(&doc, "'abc' != 'abd'"));
        assert!(test(&doc, "true() = 'x'"));
        assert!(test(&doc, "'10' > '9'"));
    }

    #[test]
    fn test_arithmetic() {
        let doc = doc();
        assert_eq!(number(&doc, "1 + 2 * 3"), 7.0);
        assert_eq!(number(&doc, "(1 + 2) * 3"), 9.0);
        assert_eq!(number(&doc, "7 mod 3"), 1.0);
        assert_eq!(number(&doc, "-7 mod 3"), -1.0);
        assert_eq!(number(&doc, "9 div 2"), 4.5);
        assert_eq!(number(&doc, "- - 2"), 2.0);
        assert_eq!(number(&doc, "sum(//Wall[position() < 3]/Area)"), 350.5);
        assert!(number(&doc, "sum(//Area)").is_nan());
        assert!(number(&doc, "1 div 0").is_infinite());
    }

    #[test]
    fn test_union() {
        let doc = doc();
        assert_eq!(ids(&doc, "//Wall[3] | //Wall[1] | //Wall[1]"), vec!["w1", "w3"]);
        assert_eq!(ids(&doc, "(//Wall[3] | //Wall[1])[1]"), vec!["w1"]);
        assert!(evaluate("//Wall | 1", &doc, doc.root()).is_err());
    }

    #[test]
    fn test_string_functions() {
        let doc = doc();
        assert_eq!(string(&doc, "concat('a', 1, true())"), "a1true");
        assert_eq!(string(&doc, "normalize-space('  a   b ')"), "a b");
        assert_eq!(string(&doc, "substring-before('living space', ' ')"), "living");
        assert_eq!(string(&doc, "substring-after('living space', ' ')"), "space");
        assert_eq!(string(&doc, "substring('abcdef', 2, 3)"), "bcd");
        assert_eq!(string(&doc, "translate('abc', 'b', 'B')"), "aBc");
        assert_eq!(string(&doc, "string(//Wall[2]/Area)"), "250.5");
        assert_eq!(string(&doc, "string(2 div 4)"), "0.5");
        assert_eq!(string(&doc, "local-name(//Wall[1]/@id)"), "id");
        assert_eq!(number(&doc, "string-length('héllo')"), 5.0);
        assert!(test(&doc, "starts-with(//Wall[1]/InteriorAdjacentTo, 'living')"));
    }

    #[test]
    fn test_number_functions() {
        let doc = doc();
        assert_eq!(number(&doc, "number(//Wall[1]/Area)"), 100.0);
        assert!(number(&doc, "number('abc')").is_nan());
        assert_eq!(number(&doc, "floor(2.7)"), 2.0);
        assert_eq!(number(&doc, "ceiling(2.1)"), 3.0);
        assert_eq!(number(&doc, "round(2.5)"), 3.0);
    }

    #[test]
    fn test_count_requires_node_set() {
        let doc = doc();
        assert!(evaluate("count(1)", &doc, doc.root()).is_err());
        assert!(evaluate("'a'/b", &doc, doc.root()).is_err());
    }

    #[test]
    fn test_short_circuit() {
        let doc = doc();
        // The right-hand side would fail if it were evaluated
        assert!(test(&doc, "true() or count(1)"));
        assert!(!test(&doc, "false() and count(1)"));
    }
}
