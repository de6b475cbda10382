//! Validation engine - evaluates compiled rules against documents

use crate::diagnostics::{Diagnostic, Location, ValidationReport};
use crate::parser::{Document, ParseError};
use crate::rules::{Constraint, Rule, RuleSet};
use crate::xpath::{NodeRef, XPath, XPathError};
use log::{debug, trace};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("Invalid xpath: {expr}")]
    Expression {
        expr: String,
        #[source]
        source: XPathError,
    },
    #[error("Failed to parse document: {0}")]
    Parse(#[from] ParseError),
}

impl ValidateError {
    fn expression(xpath: &XPath, source: XPathError) -> Self {
        ValidateError::Expression {
            expr: xpath.as_str().to_string(),
            source,
        }
    }
}

/// Statistics about validation results
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationStatistics {
    pub files_validated: usize,
    pub files_with_errors: usize,
    pub error_count: usize,
    pub warning_count: usize,
}

impl ValidationStatistics {
    /// Record the report of one file
    pub fn record(&mut self, report: &ValidationReport) {
        self.files_validated += 1;
        if !report.is_valid() {
            self.files_with_errors += 1;
        }
        self.error_count += report.errors.len();
        self.warning_count += report.warnings.len();
    }
}

/// A rule with its selector and tests compiled
#[derive(Debug, Clone)]
struct CompiledRule {
    pattern_id: Option<String>,
    rule: Rule,
    context: XPath,
    /// One per constraint, same order
    tests: Vec<XPath>,
}

impl CompiledRule {
    fn compile(pattern_id: Option<&str>, rule: &Rule) -> Result<Self, ValidateError> {
        let compile = |source: &str| {
            XPath::compile(source).map_err(|source_err| ValidateError::Expression {
                expr: source.to_string(),
                source: source_err,
            })
        };
        let context = compile(&rule.context)?;
        let tests = rule
            .constraints
            .iter()
            .map(|c| compile(&c.test))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            pattern_id: pattern_id.map(str::to_string),
            rule: rule.clone(),
            context,
            tests,
        })
    }

    fn evaluate(&self, doc: &Document) -> Result<ValidationReport, ValidateError> {
        let contexts = self
            .context
            .select(doc, doc.root())
            .map_err(|e| ValidateError::expression(&self.context, e))?;

        if contexts.is_empty() {
            debug!("Rule '{}' matched no nodes, skipping", self.context);
            return Ok(ValidationReport::new());
        }
        trace!("Rule '{}' matched {} node(s)", self.context, contexts.len());

        contexts
            .iter()
            .try_fold(ValidationReport::new(), |report, &node| {
                self.rule.constraints.iter().zip(&self.tests).try_fold(
                    report,
                    |report, (constraint, test)| {
                        let result = test
                            .test(doc, node)
                            .map_err(|e| ValidateError::expression(test, e))?;
                        trace!("{} '{}' -> {}", constraint.kind.as_str(), test, result);

                        if constraint.kind.fires(result) {
                            Ok(report.with_diagnostic(self.diagnostic(doc, node, constraint)))
                        } else {
                            Ok(report)
                        }
                    },
                )
            })
    }

    fn diagnostic(&self, doc: &Document, node: NodeRef, constraint: &Constraint) -> Diagnostic {
        let owner = doc.node(node.owner());
        let location = Location {
            line: owner.line,
            column: owner.column,
        };
        Diagnostic::new(
            constraint.kind.severity(),
            self.rule.render_message(constraint),
            &self.rule.context,
            &constraint.test,
            location,
        )
        .with_rule_id(self.rule.id.as_deref())
        .with_pattern_id(self.pattern_id.as_deref())
        .with_role(constraint.role.as_deref())
    }
}

/// Validates documents against a compiled rule set.
///
/// Every selector and test is compiled up front, so a bad expression is
/// reported before any document is looked at. A validator holds no
/// mutable state and can be shared across threads.
#[derive(Debug, Clone)]
pub struct Validator {
    rules: Vec<CompiledRule>,
}

impl Validator {
    /// Compile a rule set
    pub fn new(rule_set: &RuleSet) -> Result<Self, ValidateError> {
        let rules = rule_set
            .rules()
            .map(|(pattern, rule)| CompiledRule::compile(pattern.id.as_deref(), rule))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "Compiled {} rules with {} constraints",
            rules.len(),
            rule_set.constraint_count()
        );
        Ok(Self { rules })
    }

    /// Validate a document: rules in pattern order, then context nodes in
    /// document order, then constraints in declared order
    pub fn validate(&self, doc: &Document) -> Result<ValidationReport, ValidateError> {
        self.rules
            .iter()
            .try_fold(ValidationReport::new(), |report, rule| {
                Ok(report.merge(rule.evaluate(doc)?))
            })
    }

    /// Parse and validate a file
    pub fn validate_file(&self, path: &Path) -> Result<ValidationReport, ValidateError> {
        let doc = Document::parse_file(path)?;
        self.validate(&doc)
    }

    /// Get count of compiled rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Validate a document against several rule sets in turn. The reports are
/// concatenated in the order the validators are given.
pub fn validate_all(
    validators: &[Validator],
    doc: &Document,
) -> Result<ValidationReport, ValidateError> {
    validators
        .iter()
        .try_fold(ValidationReport::new(), |report, validator| {
            Ok(report.merge(validator.validate(doc)?))
        })
}

/// Validate a document, returning the `(errors, warnings)` message lists
pub fn evaluate(
    doc: &Document,
    rule_set: &RuleSet,
) -> Result<(Vec<String>, Vec<String>), ValidateError> {
    Ok(Validator::new(rule_set)?.validate(doc)?.into_messages())
}
