//! Rule loader - loads Schematron rule documents into a [`RuleSet`]

use crate::config::DEFAULT_ROOT_PATH;
use crate::parser::{Document, NodeId, ParseError};
use crate::rules::{Constraint, ConstraintKind, Pattern, Rule, RuleSet};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Selector that denotes the document's top-level element
const ROOT_SELECTOR: &str = "/*";

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to load rule document: {0}")]
    Parse(#[from] ParseError),
    #[error("Not a Schematron document: expected <schema> root element, found <{0}>")]
    NotSchematron(String),
    #[error("Rule {rule} of pattern {pattern} (line {line}) has no context attribute")]
    MissingContext {
        pattern: usize,
        rule: usize,
        line: usize,
    },
    #[error("<{kind}> in rule '{context}' (line {line}) has no test attribute")]
    MissingTest {
        kind: &'static str,
        context: String,
        line: usize,
    },
    #[error("Rule '{context}' extends unknown abstract rule '{id}'")]
    UnknownAbstractRule { id: String, context: String },
    #[error("Invalid namespace prefix list: {0}")]
    Prefix(#[from] regex::Error),
}

/// Namespace prefix of HPXML rule documents
const DEFAULT_PREFIX: &str = "h";

static DEFAULT_STRIPPER: Lazy<PrefixStripper> = Lazy::new(|| {
    PrefixStripper::new(&[DEFAULT_PREFIX.to_string()]).expect("default prefix pattern is valid")
});

/// Removes namespace prefixes from the start of name tokens
#[derive(Debug, Clone)]
pub struct PrefixStripper {
    pattern: Option<Regex>,
}

impl PrefixStripper {
    pub fn new(prefixes: &[String]) -> Result<Self, regex::Error> {
        if prefixes.is_empty() {
            return Ok(Self { pattern: None });
        }
        let alternatives: Vec<String> = prefixes.iter().map(|p| regex::escape(p)).collect();
        // A name token starts at the beginning, after an axis `::`, or after
        // any character that cannot be part of a QName
        let pattern = Regex::new(&format!(
            r"(^|::|[^\w.:\-])(?:{}):([\w*])",
            alternatives.join("|")
        ))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn strip(&self, expression: &str) -> String {
        match &self.pattern {
            Some(re) => re.replace_all(expression, "$1$2").into_owned(),
            None => expression.to_string(),
        }
    }
}

/// Loads Schematron rule documents
#[derive(Debug, Clone)]
pub struct RuleLoader {
    /// Replacement for the `/*` root selector
    root_path: String,
    /// Prefixes stripped when the document declares no `<ns>`
    default_prefixes: Vec<String>,
    /// Prefixes stripped in addition to the declared ones
    extra_prefixes: Vec<String>,
}

impl Default for RuleLoader {
    fn default() -> Self {
        Self {
            root_path: DEFAULT_ROOT_PATH.to_string(),
            default_prefixes: vec![DEFAULT_PREFIX.to_string()],
            extra_prefixes: Vec::new(),
        }
    }
}

impl RuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn with_default_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.default_prefixes = prefixes;
        self
    }

    pub fn with_extra_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.extra_prefixes = prefixes;
        self
    }

    /// Load rules from a Schematron file
    pub fn load_file(&self, path: &Path) -> Result<RuleSet, LoaderError> {
        debug!("Loading rules from {}", path.display());
        let doc = Document::parse_file(path)?;
        self.load_document(&doc)
    }

    /// Load rules from Schematron source text
    pub fn load_str(&self, source: &str) -> Result<RuleSet, LoaderError> {
        let doc = Document::parse_str(source)?;
        self.load_document(&doc)
    }

    fn load_document(&self, doc: &Document) -> Result<RuleSet, LoaderError> {
        let schema = doc
            .root_element()
            .ok_or_else(|| LoaderError::NotSchematron(String::new()))?;
        let schema_name = &doc.node(schema).name;
        if schema_name != "schema" {
            return Err(LoaderError::NotSchematron(schema_name.clone()));
        }

        let prefixes = self.prefixes(doc, schema);
        let stripper = if prefixes == [DEFAULT_PREFIX] {
            Cow::Borrowed(&*DEFAULT_STRIPPER)
        } else {
            Cow::Owned(PrefixStripper::new(&prefixes)?)
        };
        let builder = Builder {
            doc,
            stripper: &stripper,
        };

        let abstracts = builder.abstract_rules(schema)?;

        let mut patterns = Vec::new();
        for (p_idx, pattern) in doc.child_elements(schema, "pattern").enumerate() {
            let mut rules = Vec::new();
            for (r_idx, rule) in doc.child_elements(pattern, "rule").enumerate() {
                let node = doc.node(rule);
                if is_abstract(doc, rule) {
                    continue;
                }
                let raw_context = node
                    .attr("context")
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or(LoaderError::MissingContext {
                        pattern: p_idx + 1,
                        rule: r_idx + 1,
                        line: node.line,
                    })?;

                let is_root = raw_context == ROOT_SELECTOR;
                let context = if is_root {
                    stripper.strip(&self.root_path)
                } else {
                    stripper.strip(raw_context)
                };
                let constraints = builder.constraints(rule, raw_context, &abstracts)?;

                rules.push(Rule {
                    id: node.attr("id").map(str::to_string),
                    context,
                    is_root,
                    constraints,
                });
            }
            patterns.push(Pattern {
                id: doc.node(pattern).attr("id").map(str::to_string),
                rules,
            });
        }

        let rule_set = RuleSet { patterns, prefixes };
        debug!(
            "Loaded {} rules ({} constraints) in {} patterns, {} abstract",
            rule_set.rule_count(),
            rule_set.constraint_count(),
            rule_set.patterns.len(),
            abstracts.len()
        );
        Ok(rule_set)
    }

    /// Declared `<ns>` prefixes, or the defaults, plus the extras
    fn prefixes(&self, doc: &Document, schema: NodeId) -> Vec<String> {
        let declared: Vec<String> = doc
            .child_elements(schema, "ns")
            .filter_map(|ns| doc.node(ns).attr("prefix"))
            .map(str::to_string)
            .collect();

        let base = if declared.is_empty() {
            self.default_prefixes.clone()
        } else {
            declared
        };

        let mut prefixes = Vec::new();
        for prefix in base.into_iter().chain(self.extra_prefixes.iter().cloned()) {
            if !prefix.is_empty() && !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
        prefixes
    }
}

fn is_abstract(doc: &Document, rule: NodeId) -> bool {
    doc.node(rule).attr("abstract") == Some("true")
}

/// Per-document state while building a rule set
struct Builder<'a> {
    doc: &'a Document,
    stripper: &'a PrefixStripper,
}

impl Builder<'_> {
    /// Constraints of every abstract rule, keyed by id. An abstract rule
    /// may extend abstract rules declared before it.
    fn abstract_rules(
        &self,
        schema: NodeId,
    ) -> Result<HashMap<String, Vec<Constraint>>, LoaderError> {
        let mut abstracts = HashMap::new();
        for pattern in self.doc.child_elements(schema, "pattern") {
            for rule in self.doc.child_elements(pattern, "rule") {
                if !is_abstract(self.doc, rule) {
                    continue;
                }
                let Some(id) = self.doc.node(rule).attr("id") else {
                    debug!("Ignoring abstract rule without id at line {}", self.doc.node(rule).line);
                    continue;
                };
                let constraints = self.constraints(rule, id, &abstracts)?;
                abstracts.insert(id.to_string(), constraints);
            }
        }
        Ok(abstracts)
    }

    /// Constraints of a rule in declared order; `extends` splices in the
    /// abstract rule's constraints at its position
    fn constraints(
        &self,
        rule: NodeId,
        context: &str,
        abstracts: &HashMap<String, Vec<Constraint>>,
    ) -> Result<Vec<Constraint>, LoaderError> {
        let mut constraints = Vec::new();
        for &child in self.doc.children(rule) {
            let node = self.doc.node(child);
            if !node.is_element() {
                continue;
            }

            if node.name == "extends" {
                let Some(id) = node.attr("rule") else {
                    continue;
                };
                let inherited =
                    abstracts
                        .get(id)
                        .ok_or_else(|| LoaderError::UnknownAbstractRule {
                            id: id.to_string(),
                            context: context.to_string(),
                        })?;
                constraints.extend(inherited.iter().cloned());
                continue;
            }

            let Some(kind) = ConstraintKind::from_element_name(&node.name) else {
                continue;
            };
            let test = node.attr("test").ok_or_else(|| LoaderError::MissingTest {
                kind: kind.as_str(),
                context: context.to_string(),
                line: node.line,
            })?;

            constraints.push(Constraint {
                kind,
                test: self.stripper.strip(test),
                message: self.doc.string_value(child),
                role: node.attr("role").map(str::to_string),
            });
        }
        Ok(constraints)
    }
}
