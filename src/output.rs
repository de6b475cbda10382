//! Output formatters for validation results

use crate::diagnostics::{Diagnostic, Severity, ValidationReport};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::PathBuf;

/// Format results in human-readable text.
///
/// `quiet` drops warnings; `color` enables ANSI escapes.
pub fn format_text(results: &[(PathBuf, ValidationReport)], quiet: bool, color: bool) -> String {
    let mut out = String::new();

    for (path, report) in results {
        let warnings: &[Diagnostic] = if quiet { &[] } else { &report.warnings };
        for diag in report.errors.iter().chain(warnings) {
            let severity = if color {
                diag.severity.colored()
            } else {
                diag.severity.as_str().to_string()
            };
            let arrow = if color { "\x1b[1;34m-->\x1b[0m" } else { "-->" };

            // severity: message
            let _ = writeln!(out, "{}: {}", severity, diag.message);
            let _ = writeln!(
                out,
                "  {} {}:{}:{}",
                arrow,
                path.display(),
                diag.location.line,
                diag.location.column
            );
            let _ = writeln!(out, "   = context: {}", diag.context);
            let _ = writeln!(out, "   = test: {}", diag.test);
            if let Some(ref id) = diag.rule_id {
                let _ = writeln!(out, "   = rule: {}", id);
            }
            let _ = writeln!(out);
        }
    }

    out
}

/// Print results in human-readable text format
pub fn print_text(results: &[(PathBuf, ValidationReport)], quiet: bool) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let _ = handle.write_all(format_text(results, quiet, true).as_bytes());
}

/// Format results one diagnostic per line as `path: message`, errors
/// before warnings for each file
pub fn format_compact(results: &[(PathBuf, ValidationReport)], quiet: bool) -> String {
    let mut out = String::new();

    for (path, report) in results {
        let warnings: &[Diagnostic] = if quiet { &[] } else { &report.warnings };
        for diag in report.errors.iter().chain(warnings) {
            let _ = writeln!(out, "{}: {}", path.display(), diag.message);
        }
    }

    out
}

/// Print results in compact format
pub fn print_compact(results: &[(PathBuf, ValidationReport)], quiet: bool) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let _ = handle.write_all(format_compact(results, quiet).as_bytes());
}

/// JSON output format
#[derive(Serialize)]
struct JsonOutput<'a> {
    files: Vec<JsonFile<'a>>,
    summary: JsonSummary,
}

#[derive(Serialize)]
struct JsonFile<'a> {
    file: String,
    valid: bool,
    errors: Vec<JsonDiagnostic<'a>>,
    warnings: Vec<JsonDiagnostic<'a>>,
}

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    severity: &'a str,
    message: &'a str,
    context: &'a str,
    test: &'a str,
    line: usize,
    column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pattern_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonSummary {
    files: usize,
    errors: usize,
    warnings: usize,
}

fn json_diagnostic(d: &Diagnostic) -> JsonDiagnostic<'_> {
    JsonDiagnostic {
        severity: d.severity.as_str(),
        message: &d.message,
        context: &d.context,
        test: &d.test,
        line: d.location.line,
        column: d.location.column,
        rule_id: d.rule_id.as_deref(),
        pattern_id: d.pattern_id.as_deref(),
        role: d.role.as_deref(),
    }
}

fn json_output(results: &[(PathBuf, ValidationReport)], quiet: bool) -> JsonOutput<'_> {
    let files: Vec<JsonFile> = results
        .iter()
        .map(|(path, report)| JsonFile {
            file: path.display().to_string(),
            valid: report.is_valid(),
            errors: report.errors.iter().map(json_diagnostic).collect(),
            warnings: if quiet {
                Vec::new()
            } else {
                report.warnings.iter().map(json_diagnostic).collect()
            },
        })
        .collect();

    let count = |severity: Severity| -> usize {
        files
            .iter()
            .map(|f| match severity {
                Severity::Error => f.errors.len(),
                Severity::Warning => f.warnings.len(),
            })
            .sum()
    };
    let summary = JsonSummary {
        files: files.len(),
        errors: count(Severity::Error),
        warnings: count(Severity::Warning),
    };

    JsonOutput { files, summary }
}

/// Format results as a JSON string
pub fn format_json(results: &[(PathBuf, ValidationReport)], quiet: bool) -> String {
    serde_json::to_string_pretty(&json_output(results, quiet)).unwrap_or_default()
}

/// Print results in JSON format
pub fn print_json(results: &[(PathBuf, ValidationReport)], quiet: bool) -> io::Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    serde_json::to_writer_pretty(handle, &json_output(results, quiet))?;
    println!();
    Ok(())
}
