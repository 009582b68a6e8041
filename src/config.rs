use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{Country, QualityThreshold, Severity, TestType};
use crate::error::QualensError;

/// Configuration file structure for Qualens.
///
/// Declares the CI endpoint to index, the cycles to watch and the project's
/// countries, test types, severities and quality thresholds. Loaded from a
/// TOML file in the current directory or a specified path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// CI fetcher settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Discovery/retention parameters
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Countries the project ships to
    #[serde(default)]
    pub countries: Vec<CountryConfig>,

    /// Test technology lanes platform rules can reference
    #[serde(default)]
    pub test_types: Vec<TestTypeConfig>,

    /// Severity classes, ordered by position
    #[serde(default)]
    pub severities: Vec<SeverityConfig>,

    /// Per-severity (or "all") failure/warning percentages
    #[serde(default)]
    pub thresholds: IndexMap<String, QualityThreshold>,

    /// Cycles (branch × name) to discover builds for
    #[serde(default)]
    pub cycles: Vec<CycleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetcherConfig {
    /// CI server base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API token, usually provided through the environment
    pub token: Option<String>,

    /// Push-only CI systems register builds externally; nothing is pulled
    #[serde(default)]
    pub push_only: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            push_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexingConfig {
    /// Keep builds newer than this many days; <=0 disables the bound
    #[serde(default = "default_max_build_days")]
    pub max_build_days: i64,

    /// Always keep at least this many most-recent builds per cycle;
    /// <=0 disables the bound
    #[serde(default = "default_min_builds_to_keep")]
    pub min_builds_to_keep: i64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_build_days: default_max_build_days(),
            min_builds_to_keep: default_min_builds_to_keep(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CountryConfig {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestTypeConfig {
    pub code: String,
    pub name: String,
    /// "cucumber" or "postman"
    pub technology: crate::domain::Technology,
    #[serde(default)]
    pub browser: bool,
    /// Treat top-level Postman folders as country scopes
    #[serde(default)]
    pub country_root_folders: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeverityConfig {
    pub code: String,
    pub name: String,
    pub position: u32,
    #[serde(default)]
    pub default_on_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CycleConfig {
    pub branch: String,
    pub name: String,

    /// Platform rules driving which lanes to expect per build
    #[serde(default)]
    pub platform_rules: Vec<PlatformRule>,
}

/// One platform's hierarchy rule inside a cycle definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlatformRule {
    pub platform: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Test type codes to create one Run per country for
    #[serde(default)]
    pub test_types: Vec<String>,

    /// Comma-separated country codes this platform covers, or "all"
    #[serde(default = "default_all")]
    pub country_tags: String,

    /// Comma-separated severity codes the runs restrict to, or "all"
    #[serde(default = "default_all")]
    pub severity_tags: String,

    #[serde(default = "default_true")]
    pub include_in_thresholds: bool,

    /// Whether a failed quality verdict blocks the release
    #[serde(default)]
    pub blocking_validation: bool,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_build_days() -> i64 {
    14
}

fn default_min_builds_to_keep() -> i64 {
    20
}

fn default_true() -> bool {
    true
}

fn default_all() -> String {
    "all".to_string()
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn countries(&self) -> Vec<Country> {
        self.countries
            .iter()
            .map(|c| Country {
                code: c.code.clone(),
                name: c.name.clone(),
            })
            .collect()
    }

    pub fn severities(&self) -> Vec<Severity> {
        let mut severities: Vec<Severity> = self
            .severities
            .iter()
            .map(|s| Severity {
                code: s.code.clone(),
                name: s.name.clone(),
                position: s.position,
                default_on_missing: s.default_on_missing,
            })
            .collect();
        severities.sort_by_key(|s| s.position);
        severities
    }

    /// Resolves a test type code referenced by a platform rule.
    ///
    /// An unknown code is a setup mistake, not a transient condition, and
    /// fails the crawl loudly.
    pub fn resolve_test_type(&self, code: &str) -> crate::error::Result<TestType> {
        self.test_types
            .iter()
            .find(|t| t.code == code)
            .map(|t| TestType {
                code: t.code.clone(),
                name: t.name.clone(),
                technology: t.technology,
                browser: t.browser,
            })
            .ok_or_else(|| {
                QualensError::Config(format!("Unknown test type code in platform rule: {code}"))
            })
    }

    pub fn test_type_config(&self, code: &str) -> Option<&TestTypeConfig> {
        self.test_types.iter().find(|t| t.code == code)
    }

    pub fn cycle(&self, branch: &str, name: &str) -> Option<&CycleConfig> {
        self.cycles
            .iter()
            .find(|c| c.branch == branch && c.name == name)
    }
}
