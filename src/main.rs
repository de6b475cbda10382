//! schematron-lint CLI entry point

use clap::Parser;
use log::{debug, warn};
use miette::{IntoDiagnostic, Result, WrapErr};
use rayon::prelude::*;
use schematron_lint::{
    validate_all, CliOptions, Config, Document, ValidateError, ValidationReport,
    ValidationStatistics, Validator,
};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "schematron-lint")]
#[command(author, version, about = "Validate XML documents against Schematron rules", long_about = None)]
struct Cli {
    /// XML files to validate. Use "-" for stdin.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Schematron rule document (can be used multiple times; applied in order)
    #[arg(short, long, env = "SCHEMATRON_RULES")]
    rules: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Config file path (default: auto-detect .schematronrc.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path substituted for the "/*" root selector
    #[arg(long = "root-path", value_name = "XPATH")]
    root_path: Option<String>,

    /// Extra namespace prefix to strip (can be used multiple times)
    #[arg(long = "prefix", value_name = "PREFIX")]
    prefixes: Vec<String>,

    /// Only output errors
    #[arg(short, long)]
    quiet: bool,

    /// Exit with failure when there are warnings
    #[arg(long)]
    warnings_as_errors: bool,

    /// Show statistics at the end
    #[arg(long)]
    statistics: bool,

    /// Number of parallel jobs (0 = auto, 1 = sequential)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    jobs: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Debug, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    /// One `path: message` line per diagnostic
    Compact,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    // Load or create configuration
    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(config_path).into_diagnostic()?
    } else {
        let start_dir = std::env::current_dir().into_diagnostic()?;
        match Config::find_and_load(&start_dir) {
            Ok(Some((path, cfg))) => {
                debug!("Using config: {}", path.display());
                cfg
            }
            Ok(None) => Config::default(),
            Err(e) => {
                warn!("Failed to load config: {}", e);
                Config::default()
            }
        }
    };

    config.merge_cli(CliOptions {
        rules: cli.rules,
        root_path: cli.root_path,
        prefixes: cli.prefixes,
        quiet: cli.quiet,
        warnings_as_errors: cli.warnings_as_errors,
        verbose: cli.verbose,
        statistics: cli.statistics,
        jobs: cli.jobs,
    });

    if config.rules.is_empty() {
        miette::bail!("No rule document given; use --rules or set \"rules\" in the config");
    }

    let loader = config.loader();
    let validators = config
        .rules
        .iter()
        .map(|rules_path| -> Result<Validator> {
            let rule_set = loader
                .load_file(rules_path)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to load rules from {}", rules_path.display()))?;
            let validator = Validator::new(&rule_set)
                .into_diagnostic()
                .wrap_err_with(|| format!("Invalid rules in {}", rules_path.display()))?;
            debug!(
                "Loaded {} rules from {}",
                validator.rule_count(),
                rules_path.display()
            );
            Ok(validator)
        })
        .collect::<Result<Vec<_>>>()?;

    // Collect files to validate
    let mut files = Vec::new();
    for pattern in &cli.files {
        let pattern_str = pattern.to_string_lossy();

        if pattern_str == "-" {
            files.push(PathBuf::from("-"));
            continue;
        }

        if pattern_str.contains('*') {
            for entry in glob::glob(&pattern_str).into_diagnostic()? {
                let path = entry.into_diagnostic()?;
                if !config.is_file_excluded(&path) {
                    files.push(path);
                }
            }
        } else if !config.is_file_excluded(pattern) {
            files.push(pattern.clone());
        }
    }

    if files.is_empty() {
        eprintln!("No files to validate");
        return Ok(ExitCode::from(0));
    }

    if config.jobs > 1 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs)
            .build_global()
            .ok();
    }

    // Any fatal error aborts the whole run
    let results: Vec<(PathBuf, ValidationReport)> = if config.jobs == 1 {
        files
            .iter()
            .map(|file| validate_single_file(file, &validators).map(|r| (file.clone(), r)))
            .collect::<Result<_>>()?
    } else {
        files
            .par_iter()
            .map(|file| validate_single_file(file, &validators).map(|r| (file.clone(), r)))
            .collect::<Result<_>>()?
    };

    let mut stats = ValidationStatistics::default();
    for (_, report) in &results {
        stats.record(report);
    }

    match cli.format {
        OutputFormat::Text => schematron_lint::output::print_text(&results, config.quiet),
        OutputFormat::Json => {
            schematron_lint::output::print_json(&results, config.quiet).into_diagnostic()?
        }
        OutputFormat::Compact => schematron_lint::output::print_compact(&results, config.quiet),
    }

    if config.statistics {
        print_statistics(&stats);
    }

    if !config.quiet {
        let file_word = if stats.files_validated == 1 { "file" } else { "files" };
        if stats.error_count == 0 && stats.warning_count == 0 {
            eprintln!("\nNo issues found in {} {}", stats.files_validated, file_word);
        } else {
            eprintln!(
                "\nFound {} error{} and {} warning{} in {} {}",
                stats.error_count,
                if stats.error_count == 1 { "" } else { "s" },
                stats.warning_count,
                if stats.warning_count == 1 { "" } else { "s" },
                stats.files_validated,
                file_word
            );
        }
    }

    let failed = stats.error_count > 0 || (config.warnings_as_errors && stats.warning_count > 0);
    Ok(if failed {
        ExitCode::from(1)
    } else {
        ExitCode::from(0)
    })
}

fn validate_single_file(file: &Path, validators: &[Validator]) -> Result<ValidationReport> {
    debug!("Validating: {}", file.display());

    let doc = if file.to_string_lossy() == "-" {
        let mut content = String::new();
        io::stdin().read_to_string(&mut content).into_diagnostic()?;
        Document::parse_str(&content)
    } else {
        Document::parse_file(file)
    };

    doc.map_err(ValidateError::from)
        .and_then(|doc| validate_all(validators, &doc))
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to validate {}", file.display()))
}

fn print_statistics(stats: &ValidationStatistics) {
    eprintln!("\n\x1b[1mStatistics:\x1b[0m");
    eprintln!("  Files validated: {}", stats.files_validated);
    eprintln!("  Files with errors: {}", stats.files_with_errors);
    eprintln!("    \x1b[1;31mErrors:\x1b[0m   {}", stats.error_count);
    eprintln!("    \x1b[1;33mWarnings:\x1b[0m {}", stats.warning_count);
}
