//! schematron-lint: Schematron-style validation of XML documents
//!
//! Rule documents group `assert` and `report` constraints into rules,
//! each with an XPath context selector. Every constraint is evaluated
//! against every node its rule's selector matches; failed asserts become
//! errors and matched reports become warnings.

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod loader;
pub mod output;
pub mod parser;
pub mod rules;
pub mod xpath;

pub use config::{CliOptions, Config, ConfigError};
pub use diagnostics::{Diagnostic, Location, Severity, ValidationReport};
pub use engine::{evaluate, validate_all, ValidateError, ValidationStatistics, Validator};
pub use loader::{LoaderError, RuleLoader};
pub use parser::{Document, ParseError};
pub use rules::{annotate, Constraint, ConstraintKind, Pattern, Rule, RuleSet};
pub use xpath::{Value, XPath, XPathError};
