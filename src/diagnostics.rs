//! Diagnostic types for validation results

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Warning - a report whose test matched
    Warning,
    /// Error - an assert whose test failed
    Error,
}

impl Severity {
    /// Get display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }

    /// Get colored display name for terminal output
    pub fn colored(&self) -> String {
        match self {
            Severity::Error => "\x1b[1;31merror\x1b[0m".to_string(),
            Severity::Warning => "\x1b[1;33mwarning\x1b[0m".to_string(),
        }
    }
}

/// Source location of the matched context node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
}

/// A validation diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Rendered message
    pub message: String,
    /// Context selector of the rule that produced this diagnostic
    pub context: String,
    /// Test expression of the constraint
    pub test: String,
    pub rule_id: Option<String>,
    pub pattern_id: Option<String>,
    /// `role` attribute of the constraint
    pub role: Option<String>,
    pub location: Location,
}

impl Diagnostic {
    /// Create a new diagnostic
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        context: impl Into<String>,
        test: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            context: context.into(),
            test: test.into(),
            rule_id: None,
            pattern_id: None,
            role: None,
            location,
        }
    }

    pub fn with_rule_id(mut self, id: Option<&str>) -> Self {
        self.rule_id = id.map(str::to_string);
        self
    }

    pub fn with_pattern_id(mut self, id: Option<&str>) -> Self {
        self.pattern_id = id.map(str::to_string);
        self
    }

    pub fn with_role(mut self, role: Option<&str>) -> Self {
        self.role = role.map(str::to_string);
        self
    }
}

/// Errors and warnings of one validation run, in evaluation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(mut self, diagnostic: Diagnostic) -> Self {
        self.errors.push(diagnostic);
        self
    }

    pub fn with_warning(mut self, diagnostic: Diagnostic) -> Self {
        self.warnings.push(diagnostic);
        self
    }

    /// Append a diagnostic to the list matching its severity
    pub fn with_diagnostic(self, diagnostic: Diagnostic) -> Self {
        match diagnostic.severity {
            Severity::Error => self.with_error(diagnostic),
            Severity::Warning => self.with_warning(diagnostic),
        }
    }

    /// Append another report after this one
    pub fn merge(mut self, other: ValidationReport) -> Self {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }

    /// True when there are no errors; warnings do not count
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|d| d.message.clone()).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|d| d.message.clone()).collect()
    }

    /// The plain `(errors, warnings)` message lists
    pub fn into_messages(self) -> (Vec<String>, Vec<String>) {
        let errors = self.errors.into_iter().map(|d| d.message).collect();
        let warnings = self.warnings.into_iter().map(|d| d.message).collect();
        (errors, warnings)
    }
}
