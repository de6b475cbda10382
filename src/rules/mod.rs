//! Rule-set definitions and message templating

use crate::Severity;

/// A parsed rule document: patterns in source order
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub patterns: Vec<Pattern>,
    /// Namespace prefixes stripped from every expression
    pub prefixes: Vec<String>,
}

impl RuleSet {
    /// All concrete rules, pattern order then rule order
    pub fn rules(&self) -> impl Iterator<Item = (&Pattern, &Rule)> {
        self.patterns
            .iter()
            .flat_map(|p| p.rules.iter().map(move |r| (p, r)))
    }

    pub fn rule_count(&self) -> usize {
        self.patterns.iter().map(|p| p.rules.len()).sum()
    }

    pub fn constraint_count(&self) -> usize {
        self.rules().map(|(_, r)| r.constraints.len()).sum()
    }
}

/// A named group of rules
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub id: Option<String>,
    pub rules: Vec<Rule>,
}

/// A context selector with the constraints checked at every node it matches
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub id: Option<String>,
    /// Selector with namespace prefixes stripped and the root rewrite applied
    pub context: String,
    /// Whether the raw selector was `/*`
    pub is_root: bool,
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Fails (an error) when the test is false
    Assert,
    /// Fires (a warning) when the test is true
    Report,
}

impl ConstraintKind {
    /// Map a Schematron element local name to a constraint kind
    pub fn from_element_name(name: &str) -> Option<Self> {
        match name {
            "assert" => Some(ConstraintKind::Assert),
            "report" => Some(ConstraintKind::Report),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Assert => "assert",
            ConstraintKind::Report => "report",
        }
    }

    /// Severity of the diagnostic this kind produces
    pub fn severity(&self) -> Severity {
        match self {
            ConstraintKind::Assert => Severity::Error,
            ConstraintKind::Report => Severity::Warning,
        }
    }

    /// Whether a test result produces a diagnostic
    pub fn fires(&self, result: bool) -> bool {
        match self {
            ConstraintKind::Assert => !result,
            ConstraintKind::Report => result,
        }
    }
}

/// A single assert or report
#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    /// Predicate with namespace prefixes stripped
    pub test: String,
    /// Message template, trimmed body text of the element
    pub message: String,
    /// `role` attribute, kept as metadata
    pub role: Option<String>,
}

impl Rule {
    /// Render the message for a constraint of this rule.
    ///
    /// Failed asserts of non-root rules name the context selector;
    /// root rules and reports use the template verbatim.
    pub fn render_message(&self, constraint: &Constraint) -> String {
        match constraint.kind {
            ConstraintKind::Assert if !self.is_root => annotate(&constraint.message, &self.context),
            _ => constraint.message.clone(),
        }
    }
}

/// Insert the context path at the first `": "` of a template.
///
/// `"Expected 1 element: Area"` with `/HPXML/Building` becomes
/// `"Expected 1 element: /HPXML/Building: Area"`. A template without
/// `": "` is returned unchanged.
pub fn annotate(template: &str, context_path: &str) -> String {
    match template.split_once(": ") {
        Some((prefix, suffix)) => format!("{prefix}: {context_path}: {suffix}"),
        None => template.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rule(context: &str, is_root: bool) -> Rule {
        Rule {
            id: None,
            context: context.to_string(),
            is_root,
            constraints: Vec::new(),
        }
    }

    fn make_constraint(kind: ConstraintKind, message: &str) -> Constraint {
        Constraint {
            kind,
            test: "true()".to_string(),
            message: message.to_string(),
            role: None,
        }
    }

    #[test]
    fn test_annotate_inserts_context_path() {
        assert_eq!(
            annotate("Foo: bar baz", "/HPXML/Building"),
            "Foo: /HPXML/Building: bar baz"
        );
    }

    #[test]
    fn test_annotate_first_separator_only() {
        assert_eq!(
            annotate("Expected 1 element(s) for xpath: Area: in sq ft", "/HPXML/Wall"),
            "Expected 1 element(s) for xpath: /HPXML/Wall: Area: in sq ft"
        );
    }

    #[test]
    fn test_annotate_without_separator() {
        assert_eq!(annotate("Building must have an id", "/HPXML/Building"), "Building must have an id");
        // A colon without a following space is not a separator
        assert_eq!(annotate("Width:12", "/HPXML"), "Width:12");
    }

    #[test]
    fn test_annotate_edges() {
        assert_eq!(annotate(": tail", "/a"), ": /a: tail");
        assert_eq!(annotate("head: ", "/a"), "head: /a: ");
        assert_eq!(annotate("", "/a"), "");
    }

    #[test]
    fn test_render_message_assert() {
        let rule = make_rule("/HPXML/Building", false);
        let c = make_constraint(ConstraintKind::Assert, "Missing: zipcode required");
        assert_eq!(rule.render_message(&c), "Missing: /HPXML/Building: zipcode required");
    }

    #[test]
    fn test_render_message_root_is_verbatim() {
        let rule = make_rule("/HPXML", true);
        let c = make_constraint(ConstraintKind::Assert, "Expected 1 element(s): Building");
        assert_eq!(rule.render_message(&c), "Expected 1 element(s): Building");
    }

    #[test]
    fn test_render_message_report_is_verbatim() {
        let rule = make_rule("/HPXML/Building", false);
        let c = make_constraint(ConstraintKind::Report, "Warning: large area");
        assert_eq!(rule.render_message(&c), "Warning: large area");
    }

    #[test]
    fn test_constraint_kind() {
        assert_eq!(ConstraintKind::from_element_name("assert"), Some(ConstraintKind::Assert));
        assert_eq!(ConstraintKind::from_element_name("report"), Some(ConstraintKind::Report));
        assert_eq!(ConstraintKind::from_element_name("let"), None);

        assert!(ConstraintKind::Assert.fires(false));
        assert!(!ConstraintKind::Assert.fires(true));
        assert!(ConstraintKind::Report.fires(true));
        assert!(!ConstraintKind::Report.fires(false));

        assert_eq!(ConstraintKind::Assert.severity(), Severity::Error);
        assert_eq!(ConstraintKind::Report.severity(), Severity::Warning);
    }

    #[test]
    fn test_rule_set_counts() {
        let mut building = make_rule("/HPXML/Building", false);
        building.constraints = vec![
            make_constraint(ConstraintKind::Assert, "a"),
            make_constraint(ConstraintKind::Report, "b"),
        ];
        let mut root = make_rule("/HPXML", true);
        root.constraints = vec![make_constraint(ConstraintKind::Assert, "c")];

        let rule_set = RuleSet {
            patterns: vec![
                Pattern { id: Some("p1".into()), rules: vec![root] },
                Pattern { id: None, rules: vec![building] },
            ],
            prefixes: vec!["h".into()],
        };

        assert_eq!(rule_set.rule_count(), 2);
        assert_eq!(rule_set.constraint_count(), 3);
        let contexts: Vec<&str> = rule_set.rules().map(|(_, r)| r.context.as_str()).collect();
        assert_eq!(contexts, vec!["/HPXML", "/HPXML/Building"]);
    }
}
