//! ThreatLens - batch content risk classifier
//!
//! A CLI tool that stages text, URLs and files, classifies them for spam,
//! phishing and misinformation with a local Ollama model, and keeps a
//! browsable history of the results.
//!
//! Exit codes:
//!   0 - Success (no result above threshold, or no --fail-on set)
//!   1 - Runtime error (connection, config, validation, storage, etc.)
//!   2 - A result at or above the --fail-on label

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod oracle;
mod report;
mod scanner;
mod staging;
mod store;

use analysis::{BatchOrchestrator, BatchReport};
use anyhow::{Context, Result};
use cli::{AnalyzeArgs, Args, Command, ExportArgs, ExportFormat, HistoryArgs, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::{AnalysisRecord, InputKind};
use oracle::OllamaOracle;
use scanner::{FileScanner, ScanConfig};
use staging::StagingQueue;
use std::time::Instant;
use store::{parse_id_list, AnalysisStore, JsonFileStore, MemoryStore, SortKey, MEMORY_STORE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Number of entries in the dashboard's highest-risk and mitigation lists.
const STATS_TOP_N: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if let Command::InitConfig = args.command {
        return handle_init_config();
    }

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("ThreatLens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Store: {}", config.general.store_path.display());

    match run(args.command, &config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .threatlens.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the model, store path, concurrency, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is installed, so problems with the default file
/// are reported on stderr directly.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", DEFAULT_CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}

/// Open the configured store and dispatch a subcommand. Returns the exit code (0 or 2).
async fn run(command: Command, config: &Config) -> Result<i32> {
    let path = &config.general.store_path;

    if path.as_os_str() == MEMORY_STORE {
        info!("Using the in-memory store; nothing will be persisted");
        let history = MemoryStore::new();
        let exit_code = dispatch(command, config, &history).await?;
        debug!("{} analyses held in memory at exit", history.len());
        return Ok(exit_code);
    }

    let history = JsonFileStore::open(path.clone())
        .await
        .with_context(|| format!("Failed to open history store {}", path.display()))?;
    info!("History store: {}", history.path().display());
    dispatch(command, config, &history).await
}

async fn dispatch<S: AnalysisStore>(command: Command, config: &Config, history: &S) -> Result<i32> {
    match command {
        Command::Analyze(ref analyze) => run_analyze(analyze, config, history).await,
        Command::History(ref args) => run_history(args, config, history).await,
        Command::Show { ref id } => run_show(id, history).await,
        Command::Batch { ref ids } => run_batch(ids, history).await,
        Command::Stats { limit } => run_stats(limit, config, history).await,
        Command::Export(ref export) => run_export(export, config, history).await,
        Command::Delete { ref id } => run_delete(id, history).await,
        Command::Clear => run_clear(history).await,
        Command::InitConfig => {
            handle_init_config()?;
            Ok(0)
        }
    }
}

/// Stage the inputs named on the command line.
fn stage_inputs(args: &AnalyzeArgs, config: &Config) -> Result<StagingQueue> {
    let mut queue = StagingQueue::new();
    let file_scanner = FileScanner::new(ScanConfig::from(&config.scanner));

    for text in &args.text {
        queue.add(InputKind::Manual, text.clone(), "");
    }

    for url in &args.url {
        queue.add(InputKind::Url, url.clone(), "");
    }

    for path in &args.file {
        let loaded = file_scanner.load_file(path)?;
        debug!("Staged {} from {}", loaded.name, loaded.path.display());
        queue.add(InputKind::File, loaded.content, &loaded.name);
    }

    for dir in &args.dir {
        let files = file_scanner.collect(dir)?;
        if files.is_empty() {
            warn!("No matching files in {}", dir.display());
        }
        for loaded in files {
            debug!("Staged {} from {}", loaded.name, loaded.path.display());
            queue.add(InputKind::File, loaded.content, &loaded.name);
        }
    }

    Ok(queue)
}

/// Run the complete analyze workflow.
async fn run_analyze<S: AnalysisStore>(
    args: &AnalyzeArgs,
    config: &Config,
    history: &S,
) -> Result<i32> {
    let start_time = Instant::now();

    // Step 1: Stage the inputs
    let mut queue = stage_inputs(args, config)?;
    if queue.is_empty() {
        anyhow::bail!("Nothing to analyze: no staged input had content");
    }

    // Handle --dry-run: print the queue and exit
    if args.dry_run {
        println!("\n🔍 Dry run: staged inputs (no LLM call)...\n");
        print!("{}", report::render_staged(queue.list()));
        println!("\n✅ Dry run complete. No LLM calls were made.");
        return Ok(0);
    }

    // JSON output owns stdout; banners only go with the table view
    let table_view = matches!(args.format, OutputFormat::Table);

    // Step 2: Initialize the oracle and store
    if table_view {
        println!("🤖 Initializing classifier...");
        println!("   Model: {}", config.oracle.model);
        println!("   Ollama: {}", config.oracle.ollama_url);
        println!("   Timeout: {}s", config.oracle.timeout_seconds);
        println!(
            "   Batch: {} items, {} at a time, {:?}",
            queue.len(),
            config.batch.concurrency,
            config.batch.policy
        );
    }

    let classifier = OllamaOracle::new(config.oracle.clone())?;

    // Step 3: Submit the batch, cancellable with Ctrl-C
    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling batch");
            ctrl_c_token.cancel();
        }
    });

    let progress = if table_view {
        let pb = ProgressBar::new(queue.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    if table_view {
        println!("\n🔬 Classifying...");
    }
    let orchestrator = BatchOrchestrator::new(&classifier, history, config.batch.concurrency)
        .with_progress(progress.clone());
    let result = orchestrator
        .submit(&mut queue, config.batch.policy, &cancel)
        .await;
    progress.finish_and_clear();

    let batch = match result {
        Ok(batch) => batch,
        Err(e) => {
            if !queue.is_empty() {
                eprintln!("\n⚠️  {} staged items were not stored.", queue.len());
            }
            return Err(e.into());
        }
    };

    // Step 4: Print the results
    let records: Vec<AnalysisRecord> = batch.records().into_iter().cloned().collect();
    match args.format {
        OutputFormat::Json => {
            report::write_output(&report::generate_batch_json(&batch)?, None)?;
        }
        OutputFormat::Table => print_batch_results(&batch, &records, start_time),
    }

    if !batch.failures().is_empty() && records.is_empty() {
        anyhow::bail!("No item of the batch could be stored");
    }

    // Check --fail-on threshold
    if let Some(ref fail_label) = args.fail_on {
        let threshold = fail_label.rank();
        let has_results_above = records
            .iter()
            .any(|r| r.label.rank().is_some() && r.label.rank() >= threshold);

        if has_results_above {
            eprintln!(
                "\n⛔ Results at or above {} found. Failing (exit code 2).",
                fail_label
            );
            return Ok(2);
        }
    }

    Ok(0)
}

fn print_batch_results(batch: &BatchReport, records: &[AnalysisRecord], start_time: Instant) {
    let refs: Vec<&AnalysisRecord> = records.iter().collect();
    println!();
    print!("{}", report::render_record_table(&refs));

    let failures = batch.failures();
    if !failures.is_empty() {
        println!("\n⚠️  {} items failed:", failures.len());
        for (item_id, error) in &failures {
            println!("   - {}: {}", item_id, error);
        }
    }

    println!();
    print!("{}", report::render_summary(&analysis::summarize(records)));
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());

    if !records.is_empty() {
        println!("\n✅ Batch stored. View it again with:");
        println!("   threatlens batch {}", batch.batch_link());
    }
}

async fn run_history<S: AnalysisStore>(
    args: &HistoryArgs,
    config: &Config,
    history: &S,
) -> Result<i32> {
    let sort: SortKey = args.sort.parse().map_err(anyhow::Error::msg)?;
    let limit = args.limit.unwrap_or(config.general.history_limit);

    let records = history.list(sort, limit).await?;
    let matching = analysis::filter_records(&records, &args.search, &args.label);
    debug!(
        "{} of {} records match search '{}' and label {}",
        matching.len(),
        records.len(),
        args.search,
        args.label
    );

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&matching)?),
        OutputFormat::Table => {
            println!("📜 History ({} shown):\n", matching.len());
            print!("{}", report::render_record_table(&matching));
        }
    }

    Ok(0)
}

async fn run_show<S: AnalysisStore>(id: &str, history: &S) -> Result<i32> {

    match history.get(id).await? {
        Some(record) => print!("{}", report::render_record_detail(&record)),
        None => println!("❓ Analysis {} not found.", id),
    }

    Ok(0)
}

async fn run_batch<S: AnalysisStore>(ids: &str, history: &S) -> Result<i32> {
    let ids = parse_id_list(ids);
    let found = history.get_many(&ids).await?;

    println!("📦 Batch of {} analyses:\n", ids.len());
    for (id, record) in ids.iter().zip(&found) {
        match record {
            Some(record) => println!(
                "   {} {:<10} {:>3}  {}  ({})",
                record.label.emoji(),
                record.label.to_string(),
                record.score,
                record.display_name(),
                record.id
            ),
            None => println!("   ❓ {} not found", id),
        }
    }

    let records: Vec<AnalysisRecord> = found.into_iter().flatten().collect();
    println!();
    print!("{}", report::render_summary(&analysis::summarize(&records)));

    Ok(0)
}

async fn run_stats<S: AnalysisStore>(
    limit: Option<usize>,
    config: &Config,
    history: &S,
) -> Result<i32> {
    let limit = limit.unwrap_or(config.general.dashboard_limit);
    let records = history.list(SortKey::NEWEST_FIRST, limit).await?;

    let summary = analysis::summarize(&records);
    let highest = analysis::highest_risk(&records, STATS_TOP_N);
    let mut mitigations = analysis::common_mitigations(&records);
    mitigations.truncate(STATS_TOP_N);

    println!("📈 Dashboard over the {} most recent analyses:\n", records.len());
    print!("{}", report::render_stats(&summary, &highest, &mitigations));

    Ok(0)
}

async fn run_export<S: AnalysisStore>(
    args: &ExportArgs,
    config: &Config,
    history: &S,
) -> Result<i32> {
    let limit = match (args.limit, args.format) {
        (Some(limit), _) => limit,
        (None, ExportFormat::Dashboard) => config.general.dashboard_limit,
        (None, _) => usize::MAX,
    };

    let records = history.list(SortKey::NEWEST_FIRST, limit).await?;

    let output = match args.format {
        ExportFormat::Csv => report::generate_csv(&records),
        ExportFormat::Json => report::generate_json(&records)?,
        ExportFormat::Dashboard => report::generate_dashboard(&records)?,
    };

    report::write_output(&output, args.output.as_deref())?;

    if let Some(ref path) = args.output {
        info!("Exported {} analyses to {}", records.len(), path.display());
        println!("✅ Exported {} analyses to {}", records.len(), path.display());
    }

    Ok(0)
}

async fn run_delete<S: AnalysisStore>(id: &str, history: &S) -> Result<i32> {
    history.delete(id).await?;
    println!("🗑️  Deleted {} (if it existed).", id);
    Ok(0)
}

async fn run_clear<S: AnalysisStore>(history: &S) -> Result<i32> {
    let ids: Vec<String> = history
        .list(SortKey::NEWEST_FIRST, usize::MAX)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();

    let deleted = history.delete_all(&ids).await?;
    println!("🗑️  Cleared {} analyses.", deleted);
    Ok(0)
}
