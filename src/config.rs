//! Configuration handling for schematron-lint

use crate::loader::RuleLoader;
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Root path substituted for the `/*` selector when none is configured
pub const DEFAULT_ROOT_PATH: &str = "/HPXML";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("Failed to parse JSON config: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("Failed to parse YAML config: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(#[from] globset::Error),
}

/// Runtime validation configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Schematron rule documents, applied in order
    pub rules: Vec<PathBuf>,
    /// Replacement for the `/*` root selector
    pub root_path: String,
    /// Namespace prefixes stripped in addition to the declared ones
    pub prefixes: Vec<String>,
    /// Only report errors
    pub quiet: bool,
    /// Fail the run when there are warnings
    pub warnings_as_errors: bool,
    /// Verbose output
    pub verbose: bool,
    /// Show statistics at the end
    pub statistics: bool,
    /// File patterns to exclude
    pub exclude_patterns: GlobSet,
    /// Number of parallel jobs (0 = auto)
    pub jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            root_path: DEFAULT_ROOT_PATH.to_string(),
            prefixes: Vec::new(),
            quiet: false,
            warnings_as_errors: false,
            verbose: false,
            statistics: false,
            exclude_patterns: GlobSet::empty(),
            jobs: 0,
        }
    }
}

/// CLI options to merge into config
#[derive(Debug, Default)]
pub struct CliOptions {
    /// Rule documents (replace config if non-empty)
    pub rules: Vec<PathBuf>,
    /// Root path (replaces config if set)
    pub root_path: Option<String>,
    /// Extra prefixes (added to config)
    pub prefixes: Vec<String>,
    pub quiet: bool,
    pub warnings_as_errors: bool,
    pub verbose: bool,
    pub statistics: bool,
    /// Number of parallel jobs
    pub jobs: Option<usize>,
}

/// Configuration file format (.schematronrc.json or .schematronrc.yaml)
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// Rule document or list of rule documents, relative to the config file
    #[serde(default, deserialize_with = "one_or_many")]
    pub rules: Vec<PathBuf>,

    /// Replacement for the `/*` root selector
    #[serde(default)]
    pub root_path: Option<String>,

    /// Extra namespace prefixes to strip
    #[serde(default)]
    pub prefixes: Vec<String>,

    /// Treat warnings as errors
    #[serde(default)]
    pub warnings_as_errors: bool,

    /// File/folder patterns to exclude
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Number of parallel jobs (0 = auto)
    #[serde(default)]
    pub jobs: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PathBuf>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(path) => vec![path],
        OneOrMany::Many(paths) => paths,
    })
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config_file: ConfigFile =
            if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
                serde_yaml::from_str(&content)?
            } else {
                serde_json::from_str(&content)?
            };

        if let Some(dir) = path.parent() {
            for rules in &mut config_file.rules {
                if rules.is_relative() {
                    *rules = dir.join(&*rules);
                }
            }
        }

        Self::from_config_file(config_file)
    }

    /// Try to find and load config from standard locations
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        let config_names = [
            ".schematronrc.json",
            ".schematronrc.yaml",
            ".schematronrc.yml",
            "schematron.json",
            "schematron.yaml",
        ];

        let mut current = start_dir.to_path_buf();
        loop {
            for name in &config_names {
                let config_path = current.join(name);
                if config_path.exists() {
                    debug!("Using config {}", config_path.display());
                    let config = Self::from_file(&config_path)?;
                    return Ok(Some((config_path, config)));
                }
            }

            if !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Build config from a ConfigFile
    fn from_config_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let mut exclude_builder = GlobSetBuilder::new();
        for pattern in &file.exclude {
            exclude_builder.add(Glob::new(pattern)?);
        }
        let exclude_patterns = exclude_builder.build()?;

        Ok(Self {
            rules: file.rules,
            root_path: file
                .root_path
                .unwrap_or_else(|| DEFAULT_ROOT_PATH.to_string()),
            prefixes: file.prefixes,
            quiet: false,
            warnings_as_errors: file.warnings_as_errors,
            verbose: false,
            statistics: false,
            exclude_patterns,
            jobs: file.jobs,
        })
    }

    /// Merge CLI options into this config (CLI takes precedence)
    pub fn merge_cli(&mut self, opts: CliOptions) {
        if !opts.rules.is_empty() {
            self.rules = opts.rules;
        }

        if let Some(root_path) = opts.root_path {
            self.root_path = root_path;
        }

        for prefix in opts.prefixes {
            if !self.prefixes.contains(&prefix) {
                self.prefixes.push(prefix);
            }
        }

        self.quiet = opts.quiet;
        self.warnings_as_errors |= opts.warnings_as_errors;
        self.verbose = opts.verbose;
        self.statistics = opts.statistics;

        if let Some(j) = opts.jobs {
            self.jobs = j;
        }
    }

    /// Check if a file should be excluded
    pub fn is_file_excluded(&self, file_path: &Path) -> bool {
        self.exclude_patterns.is_match(file_path)
    }

    /// A rule loader configured with the root path and prefixes
    pub fn loader(&self) -> RuleLoader {
        RuleLoader::new()
            .with_root_path(&self.root_path)
            .with_extra_prefixes(self.prefixes.clone())
    }
}
