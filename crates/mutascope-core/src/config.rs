use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collector::DEFAULT_REPORT_DIRECTORY;
use crate::rules::{EffortFactors, DEFAULT_COVERAGE_THRESHOLD};

pub const CONFIG_FILE: &str = ".mutascope.toml";

/// Top-level configuration from `.mutascope.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub effort: EffortConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Report file or directory, relative to each module.
    #[serde(default = "default_report_directory")]
    pub report_directory: PathBuf,
    /// Skips root discovery when set. Relative to the analyzed module.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    /// Collect every module of the build and compute per-test measures.
    #[serde(default)]
    pub experimental_features: bool,
    #[serde(default = "default_source_roots")]
    pub source_roots: Vec<PathBuf>,
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
}

fn default_report_directory() -> PathBuf {
    PathBuf::from(DEFAULT_REPORT_DIRECTORY)
}

fn default_source_roots() -> Vec<PathBuf> {
    ["src/main/java", "src/main/kotlin", "src/test/java", "src/test/kotlin"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

fn default_source_extensions() -> Vec<String> {
    vec!["java".to_string(), "kt".to_string()]
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            report_directory: default_report_directory(),
            project_root: None,
            experimental_features: false,
            source_roots: default_source_roots(),
            source_extensions: default_source_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffortConfig {
    #[serde(default = "default_factor")]
    pub survived_mutant_factor: f64,
    #[serde(default = "default_factor")]
    pub missing_coverage_factor: f64,
}

fn default_factor() -> f64 {
    1.0
}

impl Default for EffortConfig {
    fn default() -> Self {
        Self {
            survived_mutant_factor: default_factor(),
            missing_coverage_factor: default_factor(),
        }
    }
}

impl EffortConfig {
    pub fn factors(&self) -> EffortFactors {
        EffortFactors {
            survived_mutant: self.survived_mutant_factor,
            missing_coverage: self.missing_coverage_factor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Rule keys to apply. All rules activated by default when absent.
    #[serde(default)]
    pub active: Option<Vec<String>>,
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,
    /// `check` also fails when project mutation coverage is below this.
    #[serde(default)]
    pub min_coverage: Option<f64>,
}

fn default_coverage_threshold() -> f64 {
    DEFAULT_COVERAGE_THRESHOLD
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            active: None,
            coverage_threshold: default_coverage_threshold(),
            min_coverage: None,
        }
    }
}

impl Config {
    /// Load configuration from a `.mutascope.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| {
            format!(
                "failed to parse '{}'. Run `mutascope init` to create a valid config file",
                path.display()
            )
        })?;
        Ok(config)
    }

    /// Load from `.mutascope.toml` in the given directory or any ancestor, or return defaults.
    pub fn load_or_default(dir: &Path) -> Self {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        for current in start.ancestors() {
            let config_path = current.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => {
                        tracing::debug!("Using config {}", config_path.display());
                        config
                    }
                    Err(e) => {
                        tracing::warn!(
                            "failed to load config from '{}': {e:#}. Using defaults.",
                            config_path.display()
                        );
                        Self::default()
                    }
                };
            }
        }
        Self::default()
    }

    /// Generate default TOML content for `mutascope init`.
    pub fn default_toml() -> String {
        r#"# mutascope - Mutation Report Analysis Configuration

[project]
# PIT report file or directory, relative to each module
report_directory = "target/pit-reports"
# Set to skip project root discovery from pom.xml / settings.gradle
# project_root = ".."
# Collect the reports of every module of the build and compute per-test measures
experimental_features = false
source_roots = ["src/main/java", "src/main/kotlin", "src/test/java", "src/test/kotlin"]
source_extensions = ["java", "kt"]

[effort]
# Effort of each issue on a surviving or uncovered mutant
survived_mutant_factor = 1.0
# Effort per mutant that must be killed to reach the coverage threshold
missing_coverage_factor = 1.0

[rules]
# Minimum mutation coverage per source file, in percent
coverage_threshold = 80.0
# Rules to apply; all rules activated by default when omitted
# active = ["mutant.survived", "mutant.uncovered", "mutant.coverage"]
# `mutascope check` fails below this project mutation coverage
# min_coverage = 60.0
"#
        .to_string()
    }
}
