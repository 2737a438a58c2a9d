//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::analysis::{BatchPolicy, LabelFilter};
use crate::models::RiskLabel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ThreatLens - batch content risk classifier
///
/// Stage pasted text, URLs and files, classify them for spam, phishing and
/// misinformation with a local LLM, and browse the stored history.
///
/// Examples:
///   threatlens analyze --text "free money now, click here" --url http://example.com
///   threatlens analyze --dir ./suspicious-mail --policy per-item
///   threatlens history --search invoice --label high-risk
///   threatlens batch 3f2a...,9c1e...
///   threatlens export --format csv --output history.csv
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .threatlens.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Path of the JSON history store
    #[arg(long, value_name = "FILE", env = "THREATLENS_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Stage inputs and classify them as one batch
    Analyze(AnalyzeArgs),

    /// List recent analyses, optionally filtered
    History(HistoryArgs),

    /// Show one analysis in full
    Show {
        /// Analysis id
        id: String,
    },

    /// Show the analyses of a batch (comma-separated ids) with a rollup
    Batch {
        /// Comma-separated analysis ids, as printed by `analyze`
        ids: String,
    },

    /// Dashboard statistics over recent analyses
    Stats {
        /// Number of recent analyses to include
        #[arg(long, value_name = "COUNT")]
        limit: Option<usize>,
    },

    /// Export stored analyses
    Export(ExportArgs),

    /// Delete one analysis (no-op if it does not exist)
    Delete {
        /// Analysis id
        id: String,
    },

    /// Delete every stored analysis
    Clear,

    /// Generate a default .threatlens.toml configuration file
    InitConfig,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Text to classify (repeatable)
    #[arg(long, value_name = "TEXT")]
    pub text: Vec<String>,

    /// URL to classify (repeatable)
    #[arg(long, value_name = "URL")]
    pub url: Vec<String>,

    /// File whose text content is classified (repeatable)
    #[arg(long, value_name = "FILE")]
    pub file: Vec<PathBuf>,

    /// Directory whose matching files are each staged
    #[arg(long, value_name = "DIR")]
    pub dir: Vec<PathBuf>,

    /// Ollama model to use
    #[arg(short, long, env = "THREATLENS_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum classification requests in flight
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Commit policy: all-or-nothing or per-item
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<BatchPolicy>,

    /// Print the staged queue and exit without classifying
    #[arg(long)]
    pub dry_run: bool,

    /// Exit with code 2 if any result is at or above this label
    ///
    /// Values: no-risk, low-risk, high-risk
    #[arg(long, value_name = "LABEL", value_parser = parse_label)]
    pub fail_on: Option<RiskLabel>,

    /// Output format for the results
    #[arg(long, default_value = "table", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct HistoryArgs {
    /// Case-insensitive text matched against content and explanation
    #[arg(short, long, default_value = "")]
    pub search: String,

    /// Label filter: all, no-risk, low-risk, high-risk
    #[arg(short, long, default_value = "all", value_parser = parse_label_filter)]
    pub label: LabelFilter,

    /// Number of recent analyses to load
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,

    /// Sort key; a leading '-' sorts descending (e.g. -created_at, score)
    #[arg(long, default_value = "-created_at", allow_hyphen_values = true)]
    pub sort: String,

    /// Output format
    #[arg(long, default_value = "table", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExportArgs {
    /// Export format
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: ExportFormat,

    /// Output file (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of recent analyses to export
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// File format for `export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
    /// Totals, distributions and all analyses in one JSON document
    Dashboard,
}

fn parse_label(s: &str) -> Result<RiskLabel, String> {
    match RiskLabel::parse(s) {
        RiskLabel::Unrecognized(_) => Err(format!(
            "unknown label '{}', expected no-risk, low-risk or high-risk",
            s
        )),
        label => Ok(label),
    }
}

fn parse_label_filter(s: &str) -> Result<LabelFilter, String> {
    s.parse()
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Command::Analyze(ref analyze) = self.command {
            analyze.validate()?;
        }

        if let Command::Batch { ref ids } = self.command {
            if ids.trim().is_empty() {
                return Err("Batch ids must not be empty".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

impl AnalyzeArgs {
    fn validate(&self) -> Result<(), String> {
        if self.text.is_empty() && self.url.is_empty() && self.file.is_empty() && self.dir.is_empty()
        {
            return Err("Nothing to analyze: pass --text, --url, --file or --dir".to_string());
        }

        if self.text.iter().any(|t| t.trim().is_empty()) {
            return Err("--text must not be empty".to_string());
        }

        for url in &self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("URL must start with 'http://' or 'https://': {}", url));
            }
        }

        if let Some(ref ollama_url) = self.ollama_url {
            if !ollama_url.starts_with("http://") && !ollama_url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        for path in &self.file {
            if !path.is_file() {
                return Err(format!("File does not exist: {}", path.display()));
            }
        }

        for path in &self.dir {
            if !path.is_dir() {
                return Err(format!("Not a directory: {}", path.display()));
            }
        }

        Ok(())
    }
}
