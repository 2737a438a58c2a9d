//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.threatlens.toml` files.

use crate::analysis::BatchPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".threatlens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Classification oracle settings.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Batch submission settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Directory staging settings.
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path of the JSON history file.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Records shown by `history`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Records rolled up by `stats` and `export --format dashboard`.
    #[serde(default = "default_dashboard_limit")]
    pub dashboard_limit: usize,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            history_limit: default_history_limit(),
            dashboard_limit: default_dashboard_limit(),
            verbose: false,
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("threatlens_history.json")
}

fn default_history_limit() -> usize {
    50
}

fn default_dashboard_limit() -> usize {
    100
}

/// LLM oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    120
}

/// Batch submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum oracle calls in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Commit policy for a batch.
    #[serde(default)]
    pub policy: BatchPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            policy: BatchPolicy::default(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Settings for staging whole directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Maximum files staged from one directory.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// File extensions to include.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Names to exclude.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,

    /// Maximum file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            extensions: default_extensions(),
            excludes: default_excludes(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_files() -> usize {
    50
}

fn default_extensions() -> Vec<String> {
    vec!["txt", "eml", "msg", "md", "html", "htm", "csv", "json", "log"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_excludes() -> Vec<String> {
    vec![".git", "node_modules", "target", "__pycache__"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_file_size() -> u64 {
    256 * 1024 // 256KB
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load configuration from `dir/.threatlens.toml`.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, and only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref store) = args.store {
            self.general.store_path = store.clone();
        }

        if args.verbose {
            self.general.verbose = true;
        }

        if let crate::cli::Command::Analyze(ref analyze) = args.command {
            if let Some(ref model) = analyze.model {
                self.oracle.model = model.clone();
            }
            if let Some(ref url) = analyze.ollama_url {
                self.oracle.ollama_url = url.clone();
            }
            if let Some(temperature) = analyze.temperature {
                self.oracle.temperature = temperature;
            }
            if let Some(timeout) = analyze.timeout {
                self.oracle.timeout_seconds = timeout;
            }
            if let Some(concurrency) = analyze.concurrency {
                self.batch.concurrency = concurrency;
            }
            if let Some(policy) = analyze.policy {
                self.batch.policy = policy;
            }
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
