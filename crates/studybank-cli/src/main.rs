// crates/studybank-cli/src/main.rs
// ============================================================================
// Module: Studybank CLI Entry Point
// Description: Command dispatcher for one-shot store access workflows.
// Purpose: Run statements, batches, and store introspection from a shell.
// Dependencies: clap, serde, studybank-access, studybank-core, thiserror, tokio,
//               tracing-subscriber.
// ============================================================================

//! ## Overview
//! The Studybank CLI builds an [`AccessService`] from a TOML configuration
//! file (or defaults), runs one command against it, prints the outcome as
//! JSON on stdout, and closes the store. Diagnostics go to stderr through
//! `tracing`, filtered by `--log-level` or the `STUDYBANK_LOG` environment
//! variable. Batch files are read with a hard size limit.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use studybank_access::AccessConfig;
use studybank_access::AccessService;
use studybank_access::CacheMode;
use studybank_access::StoreType;
use studybank_core::BatchStatement;
use studybank_core::SqlValue;
use studybank_core::StoreError;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Environment variable holding the default log filter.
const LOG_FILTER_ENV: &str = "STUDYBANK_LOG";
/// Log filter used when neither flag nor environment provide one.
const DEFAULT_LOG_FILTER: &str = "warn";
/// Maximum size of a batch file in bytes.
const MAX_BATCH_FILE_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "studybank", version, about = "Studybank data store access CLI")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// `SQLite` database path (overrides the configured store).
    #[arg(long, global = true, value_name = "PATH", conflicts_with = "simulated")]
    db: Option<PathBuf>,
    /// Use the in-memory simulated store.
    #[arg(long, global = true)]
    simulated: bool,
    /// Log filter directive (overrides `STUDYBANK_LOG`).
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,
    /// Command to run.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute one statement and print its result.
    Query(QueryCommand),
    /// Execute a JSON batch file as one unit.
    Batch(BatchCommand),
    /// Print cache and dispatch statistics.
    Stats,
    /// Print the store descriptor.
    Config,
    /// Refresh planner statistics.
    Optimize,
    /// Close the store and delete its files.
    Reset(ResetCommand),
}

impl Commands {
    /// Returns the command name used in logs.
    const fn name(&self) -> &'static str {
        match self {
            Self::Query(_) => "query",
            Self::Batch(_) => "batch",
            Self::Stats => "stats",
            Self::Config => "config",
            Self::Optimize => "optimize",
            Self::Reset(_) => "reset",
        }
    }
}

/// Arguments for `query`.
#[derive(Args, Debug)]
struct QueryCommand {
    /// Statement text.
    statement: String,
    /// Positional parameter as a JSON scalar (bare words bind as text).
    #[arg(long = "param", value_name = "VALUE")]
    params: Vec<String>,
    /// Skip the query cache.
    #[arg(long)]
    no_cache: bool,
}

/// Arguments for `batch`.
#[derive(Args, Debug)]
struct BatchCommand {
    /// JSON file holding an array of `{ "text": ..., "params": [...] }`.
    file: PathBuf,
}

/// Arguments for `reset`.
#[derive(Args, Debug)]
struct ResetCommand {
    /// Confirm deletion of the store files.
    #[arg(long)]
    confirm: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing failures.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// Result alias for CLI operations.
type CliResult<T> = Result<T, CliError>;

/// Errors returned by bounded file reads.
#[derive(Debug)]
enum ReadLimitError {
    /// File I/O failure.
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments, builds the service, and dispatches the command.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());
    let config = resolve_config(cli.config.as_deref(), cli.db, cli.simulated)?;
    let service = AccessService::new(config)
        .map_err(|err| CliError::new(format!("invalid config: {err}")))?;
    debug!(command = cli.command.name(), "dispatching command");
    let outcome = match cli.command {
        Commands::Query(command) => command_query(&service, &command).await,
        Commands::Batch(command) => command_batch(&service, &command).await,
        Commands::Stats => command_stats(&service).await,
        Commands::Config => command_config(&service).await,
        Commands::Optimize => command_optimize(&service).await,
        Commands::Reset(command) => command_reset(&service, &command).await,
    };
    service.close().await;
    outcome
}

/// Installs the stderr log subscriber.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_env(LOG_FILTER_ENV).ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Loads the configuration file and applies command-line overrides.
fn resolve_config(
    path: Option<&Path>,
    db: Option<PathBuf>,
    simulated: bool,
) -> CliResult<AccessConfig> {
    let mut config = match path {
        Some(path) => AccessConfig::load(path)
            .map_err(|err| CliError::new(format!("failed to load config: {err}")))?,
        None => AccessConfig::default(),
    };
    if let Some(db) = db {
        config.store.store_type = StoreType::Sqlite;
        config.store.path = db;
    }
    if simulated {
        config.store.store_type = StoreType::Simulated;
    }
    config.validate().map_err(|err| CliError::new(format!("invalid config: {err}")))?;
    Ok(config)
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs `query`.
async fn command_query(service: &AccessService, command: &QueryCommand) -> CliResult<ExitCode> {
    let params = command.params.iter().map(|raw| parse_param(raw)).collect::<CliResult<Vec<_>>>()?;
    let mode = if command.no_cache { CacheMode::Bypass } else { CacheMode::Use };
    let result =
        service.query_with(&command.statement, &params, mode).await.map_err(|err| store_error(&err))?;
    write_json(&result)?;
    Ok(ExitCode::SUCCESS)
}

/// Runs `batch`.
async fn command_batch(service: &AccessService, command: &BatchCommand) -> CliResult<ExitCode> {
    let statements = read_batch_file(&command.file)?;
    let outcome = service.execute_batch(statements).await.map_err(|err| store_error(&err))?;
    write_json(&outcome)?;
    Ok(ExitCode::SUCCESS)
}

/// Runs `stats`.
async fn command_stats(service: &AccessService) -> CliResult<ExitCode> {
    service.ensure_initialized().await.map_err(|err| store_error(&err))?;
    write_json(&service.performance_stats())?;
    Ok(ExitCode::SUCCESS)
}

/// Runs `config`.
async fn command_config(service: &AccessService) -> CliResult<ExitCode> {
    service.ensure_initialized().await.map_err(|err| store_error(&err))?;
    write_json(&service.config())?;
    Ok(ExitCode::SUCCESS)
}

/// Runs `optimize`.
async fn command_optimize(service: &AccessService) -> CliResult<ExitCode> {
    service.optimize().await.map_err(|err| store_error(&err))?;
    write_json(&service.perform_maintenance())?;
    Ok(ExitCode::SUCCESS)
}

/// Runs `reset`.
async fn command_reset(service: &AccessService, command: &ResetCommand) -> CliResult<ExitCode> {
    if !command.confirm {
        return Err(CliError::new("reset deletes the store files; pass --confirm".to_string()));
    }
    service.ensure_initialized().await.map_err(|err| store_error(&err))?;
    let report = service.reset_database().await;
    write_json(&report)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Parses one `--param` value.
///
/// JSON scalars bind by type and arrays of bytes bind as blobs. Anything that
/// is not JSON and does not look like a JSON container binds as text.
fn parse_param(raw: &str) -> CliResult<SqlValue> {
    match serde_json::from_str::<SqlValue>(raw) {
        Ok(value) => Ok(value),
        Err(_) if !raw.trim_start().starts_with(['{', '[']) => Ok(SqlValue::Text(raw.to_string())),
        Err(err) => Err(CliError::new(format!("invalid parameter {raw}: {err}"))),
    }
}

/// Reads and parses a batch file.
fn read_batch_file(path: &Path) -> CliResult<Vec<BatchStatement>> {
    let bytes = read_bytes_with_limit(path, MAX_BATCH_FILE_BYTES).map_err(|err| match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("failed to read batch file {}: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "batch file {} is {size} bytes; limit is {limit}",
            path.display()
        )),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| CliError::new(format!("invalid batch file {}: {err}", path.display())))
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let metadata = file.metadata().map_err(ReadLimitError::Io)?;
    let size = metadata.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        let actual = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        return Err(ReadLimitError::TooLarge {
            size: actual,
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Formats a store error with its code and cause.
fn store_error(error: &StoreError) -> CliError {
    let mut message = format!("{error} [{}]", error.code());
    if let Some(cause) = error.context_value("cause").and_then(|value| value.as_str()) {
        message.push_str(": ");
        message.push_str(cause);
    }
    CliError::new(message)
}

/// Writes a value to stdout as pretty JSON.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to render output: {err}")))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream failure.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
