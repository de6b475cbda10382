//! Integration tests for schematron-lint

use pretty_assertions::assert_eq;
use std::path::PathBuf;
use schematron_lint::{
    config::Config,
    diagnostics::Severity,
    engine::{evaluate, validate_all, ValidateError, Validator},
    loader::{LoaderError, RuleLoader},
    output::format_json,
    parser::Document,
    xpath::XPathError,
};

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_validator() -> Validator {
    load_validator_from("validator.xml")
}

fn load_validator_from(name: &str) -> Validator {
    let rule_set = RuleLoader::new()
        .load_file(&fixtures_path().join(name))
        .unwrap();
    Validator::new(&rule_set).unwrap()
}

const WALL_PATH: &str = "/HPXML/Building/BuildingDetails/Enclosure/Walls/Wall";

#[test]
fn test_load_fixture_rules() {
    let rule_set = RuleLoader::new()
        .load_file(&fixtures_path().join("validator.xml"))
        .unwrap();

    assert_eq!(rule_set.patterns.len(), 4);
    assert_eq!(rule_set.rule_count(), 4);
    assert_eq!(rule_set.prefixes, vec!["h"]);

    let wall = &rule_set.patterns[2].rules[0];
    assert_eq!(wall.context, WALL_PATH);
    assert_eq!(wall.constraints.len(), 5);
    assert_eq!(wall.constraints[0].test, "@id");
}

#[test]
fn test_valid_document_has_no_diagnostics() {
    let report = load_validator()
        .validate_file(&fixtures_path().join("valid.xml"))
        .unwrap();

    assert!(report.is_valid());
    assert!(report.is_empty(), "unexpected diagnostics: {:?}", report);
}

#[test]
fn test_invalid_document_errors_and_warnings() {
    let report = load_validator()
        .validate_file(&fixtures_path().join("invalid.xml"))
        .unwrap();

    assert_eq!(
        report.error_messages(),
        vec![
            "Expected schemaVersion attribute on the root element".to_string(),
            "Expected InteriorAdjacentTo to be 'living space' or 'garage' or 'attic - vented'"
                .to_string(),
            format!("Expected id attribute for xpath: {WALL_PATH}: @id"),
            "Expected Area to be greater than 0".to_string(),
        ]
    );
    assert_eq!(report.warning_messages(), vec!["Wall area is unusually large"]);
}

#[test]
fn test_multiple_rule_documents_in_order() {
    let doc = Document::parse_file(&fixtures_path().join("invalid.xml")).unwrap();
    let validators = vec![
        load_validator(),
        load_validator_from("extra-validator.xml"),
    ];

    let (errors, warnings) = validate_all(&validators, &doc).unwrap().into_messages();
    assert_eq!(
        errors,
        vec![
            "Expected schemaVersion attribute on the root element".to_string(),
            "Expected InteriorAdjacentTo to be 'living space' or 'garage' or 'attic - vented'"
                .to_string(),
            format!("Expected id attribute for xpath: {WALL_PATH}: @id"),
            "Expected Area to be greater than 0".to_string(),
            "Expected 1 element(s) for xpath: /HPXML/Building: ProjectStatus".to_string(),
        ]
    );
    assert_eq!(
        warnings,
        vec!["Wall area is unusually large", "More than two walls"]
    );
}

#[test]
fn test_diagnostics_carry_locations() {
    let report = load_validator()
        .validate_file(&fixtures_path().join("invalid.xml"))
        .unwrap();

    // Root rule reports at the root element
    assert_eq!(report.errors[0].location.line, 2);
    // The wall without an id
    assert_eq!(report.errors[2].location.line, 11);
    assert_eq!(report.errors[2].rule_id.as_deref(), Some("wall"));
    assert_eq!(report.errors[2].pattern_id.as_deref(), Some("walls"));
    assert_eq!(report.warnings[0].severity, Severity::Warning);
    assert_eq!(report.warnings[0].role.as_deref(), Some("WARN"));
}

#[test]
fn test_evaluate_returns_message_lists() {
    let rule_set = RuleLoader::new()
        .load_file(&fixtures_path().join("validator.xml"))
        .unwrap();
    let doc = Document::parse_file(&fixtures_path().join("invalid.xml")).unwrap();

    let (errors, warnings) = evaluate(&doc, &rule_set).unwrap();
    assert_eq!(errors.len(), 4);
    assert_eq!(warnings.len(), 1);
}

#[test]
fn test_end_to_end_example() {
    let doc = Document::parse_str(r#"<HPXML><Building id="b1"/></HPXML>"#).unwrap();

    let present = RuleLoader::new()
        .load_str(
            r#"<schema><pattern><rule context="/HPXML/Building">
                <assert test="@id">Building must have an id</assert>
            </rule></pattern></schema>"#,
        )
        .unwrap();
    assert_eq!(evaluate(&doc, &present).unwrap(), (vec![], vec![]));

    let missing = RuleLoader::new()
        .load_str(
            r#"<schema><pattern><rule context="/HPXML/Building">
                <assert test="@zipcode">Missing: zipcode required</assert>
            </rule></pattern></schema>"#,
        )
        .unwrap();
    let (errors, warnings) = evaluate(&doc, &missing).unwrap();
    assert_eq!(errors, vec!["Missing: /HPXML/Building: zipcode required"]);
    assert!(warnings.is_empty());
}

#[test]
fn test_bad_expression_is_fatal() {
    let rule_set = RuleLoader::new()
        .load_file(&fixtures_path().join("bad-expression.xml"))
        .unwrap();

    // The broken rule would match nothing, but compilation still fails
    let err = Validator::new(&rule_set).unwrap_err();
    match err {
        ValidateError::Expression { expr, source } => {
            assert_eq!(expr, "count(Wall");
            assert!(matches!(source, XPathError::Syntax { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    let doc = Document::parse_file(&fixtures_path().join("valid.xml")).unwrap();
    assert!(evaluate(&doc, &rule_set).is_err());
}

#[test]
fn test_malformed_document() {
    let result = load_validator().validate_file(&fixtures_path().join("malformed.xml"));
    assert!(matches!(result, Err(ValidateError::Parse(_))));
}

#[test]
fn test_document_is_not_rules() {
    let result = RuleLoader::new().load_file(&fixtures_path().join("valid.xml"));
    assert!(matches!(result, Err(LoaderError::NotSchematron(_))));
}

#[test]
fn test_validator_shared_across_threads() {
    let validator = load_validator();
    let paths = [fixtures_path().join("valid.xml"), fixtures_path().join("invalid.xml")];

    let counts: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = paths
            .iter()
            .map(|p| {
                let validator = &validator;
                s.spawn(move || validator.validate_file(p).unwrap().errors.len())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(counts, vec![0, 4]);
}

#[test]
fn test_json_output_format() {
    let validator = load_validator();
    let path = fixtures_path().join("invalid.xml");
    let report = validator.validate_file(&path).unwrap();

    let output = format_json(&[(path, report)], false);
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed["summary"]["errors"], 4);
    assert_eq!(parsed["summary"]["warnings"], 1);
    assert_eq!(parsed["files"][0]["valid"], false);
}

#[test]
fn test_config_root_path_and_loader() {
    let mut config = Config::default();
    config.root_path = "/Project".to_string();
    let rule_set = config
        .loader()
        .load_file(&fixtures_path().join("validator.xml"))
        .unwrap();
    let validator = Validator::new(&rule_set).unwrap();

    // With the root rewritten elsewhere, the root rule no longer matches
    let report = validator
        .validate_file(&fixtures_path().join("invalid.xml"))
        .unwrap();
    assert_eq!(report.errors.len(), 3);
}
