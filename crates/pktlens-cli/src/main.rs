use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use glob::glob;
use pktlens_core::{
    AnalysisError, CaptureError, CaptureSession, EngineConfig, FilterSpec, QueryEngine,
    SearchField, SearchSpec, SessionError, SessionStore,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const EXAMPLES: &str = "Examples:\n  pktlens summary capture.pcap\n  pktlens packets capture.pcap --protocol tcp --page 2\n  pktlens search capture.pcap --query 8.8.8.8 --field destinationIP\n  pktlens packet capture.pcap 0 --pretty";

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("PKTLENS_BUILD_COMMIT"),
    " ",
    env!("PKTLENS_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "pktlens")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Decode classic packet captures into queryable JSON records.",
    long_about = None,
    after_help = EXAMPLES
)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// File descriptor, header, statistics and walk outcome.
    Summary {
        /// Path to a .pcap file
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Protocol shares and top addresses.
    Stats {
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List records, optionally filtered.
    Packets {
        input: PathBuf,
        /// Primary protocol (case-insensitive)
        #[arg(long)]
        protocol: Option<String>,
        /// Exact source address
        #[arg(long = "src")]
        source: Option<String>,
        /// Exact destination address
        #[arg(long = "dst")]
        destination: Option<String>,
        #[command(flatten)]
        page: PageArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Case-insensitive substring search on one record field.
    Search {
        input: PathBuf,
        #[arg(short, long)]
        query: String,
        /// sourceIP, destinationIP, protocol or info
        #[arg(long, default_value = "info", value_parser = parse_search_field)]
        field: SearchField,
        #[command(flatten)]
        page: PageArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// One record with a hex dump of its bytes.
    Packet {
        input: PathBuf,
        /// Zero-based record index
        index: u64,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
struct PageArgs {
    /// One-based page number
    #[arg(long)]
    page: Option<u32>,
    /// Records per page
    #[arg(long)]
    limit: Option<u32>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Write JSON to this file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, conflicts_with = "compact")]
    pretty: bool,

    /// Compact JSON output (default)
    #[arg(long)]
    compact: bool,
}

fn parse_search_field(value: &str) -> Result<SearchField, String> {
    value.parse().map_err(|err: SessionError| err.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{:#}", err), None)
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        let hint = match &err {
            SessionError::Analysis(AnalysisError::Capture(capture)) => capture_hint(capture),
            SessionError::Analysis(AnalysisError::BudgetExceeded { .. }) => {
                Some("raise budget_base_ms / budget_per_mib_ms in --config".to_string())
            }
            SessionError::InvalidQuery(_) => {
                Some("pages start at 1; --limit must not exceed max_page_size".to_string())
            }
            SessionError::PacketNotFound { .. } => {
                Some("use `pktlens summary` to see the record count".to_string())
            }
            SessionError::NotFound { .. } => None,
        };
        CliError::new(err.to_string(), hint)
    }
}

fn capture_hint(err: &CaptureError) -> Option<String> {
    let hint = match err {
        CaptureError::InvalidFormat { .. } => "expected a classic libpcap capture (.pcap)",
        CaptureError::UnsupportedFormat { .. } => {
            "convert the capture first, e.g. `editcap -F pcap in.pcapng out.pcap`"
        }
        CaptureError::TruncatedHeader { .. } => "the file ends inside the 24-byte global header",
    };
    Some(hint.to_string())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Summary { input, output } => {
            let (_store, session) = ingest(&input, config)?;
            emit(&session.file_info(), &input, &output, quiet)
        }
        Commands::Stats { input, output } => {
            let (store, session) = ingest(&input, config)?;
            let stats = QueryEngine::new(&store).protocol_stats(session.id())?;
            emit(&stats, &input, &output, quiet)
        }
        Commands::Packets {
            input,
            protocol,
            source,
            destination,
            page,
            output,
        } => {
            let (store, session) = ingest(&input, config)?;
            let spec = FilterSpec {
                protocol,
                source,
                destination,
                page: page.page,
                page_size: page.limit,
            };
            let result = QueryEngine::new(&store).filter(session.id(), &spec)?;
            emit(&result, &input, &output, quiet)
        }
        Commands::Search {
            input,
            query,
            field,
            page,
            output,
        } => {
            let (store, session) = ingest(&input, config)?;
            let spec = SearchSpec {
                page: page.page,
                page_size: page.limit,
                ..SearchSpec::new(query, field)
            };
            let result = QueryEngine::new(&store).search(session.id(), &spec)?;
            emit(&result, &input, &output, quiet)
        }
        Commands::Packet {
            input,
            index,
            output,
        } => {
            let (store, session) = ingest(&input, config)?;
            let detail = QueryEngine::new(&store).packet(session.id(), index)?;
            emit(&detail, &input, &output, quiet)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    EngineConfig::from_json_file(path).map_err(|err| {
        CliError::new(
            format!("invalid config {}: {}", path.display(), err),
            Some("see EngineConfig for accepted keys; omitted keys keep their defaults".to_string()),
        )
    })
}

/// Read one capture from disk and decode it into a fresh store.
fn ingest(
    input: &Path,
    config: EngineConfig,
) -> Result<(SessionStore, std::sync::Arc<CaptureSession>), CliError> {
    let resolved = resolve_input_path(input)?;
    validate_input_file(&resolved)?;

    let meta = fs::metadata(&resolved)
        .with_context(|| format!("Failed to read input file: {}", resolved.display()))?;
    if !meta.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use a .pcap file".to_string()),
        ));
    }
    let bytes = fs::read(&resolved)
        .with_context(|| format!("Failed to read input file: {}", resolved.display()))?;
    let name = resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| resolved.display().to_string());

    let store = SessionStore::new(config);
    let session = store.ingest(bytes, &name, meta.len())?;
    tracing::info!(
        file = %name,
        records = session.records().len(),
        "capture decoded"
    );
    Ok((store, session))
}

fn emit<T: Serialize>(
    value: &T,
    input: &Path,
    args: &OutputArgs,
    quiet: bool,
) -> Result<(), CliError> {
    let json = serialize_json(value, args.pretty, args.compact)?;

    let Some(output) = args.output.as_ref() else {
        println!("{}", json);
        return Ok(());
    };

    ensure_distinct_output(input, output)?;
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    fs::write(output, json)
        .with_context(|| format!("Failed to write output: {}", output.display()))?;
    if !quiet {
        eprintln!("OK: written -> {}", output.display());
    }
    Ok(())
}

fn serialize_json<T: Serialize>(value: &T, pretty: bool, compact: bool) -> Result<String, CliError> {
    if pretty && compact {
        return Err(CliError::new(
            "cannot use --pretty and --compact together",
            Some("choose one output format".to_string()),
        ));
    }
    if pretty {
        serde_json::to_string_pretty(value)
            .context("JSON serialization failed")
            .map_err(Into::into)
    } else {
        serde_json::to_string(value)
            .context("JSON serialization failed")
            .map_err(Into::into)
    }
}

fn ensure_distinct_output(input: &Path, output: &Path) -> Result<(), CliError> {
    let Ok(input_abs) = fs::canonicalize(input) else {
        return Ok(());
    };
    let output_dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::canonicalize(parent),
        _ => fs::canonicalize("."),
    };
    let (Ok(output_dir), Some(file_name)) = (output_dir, output.file_name()) else {
        return Ok(());
    };
    if output_dir.join(file_name) == input_abs {
        return Err(CliError::new(
            format!("output path must differ from input: {}", output.display()),
            Some("choose a different output path".to_string()),
        ));
    }
    Ok(())
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .pcap file".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if !matches!(ext.as_str(), "pcap" | "pcapng" | "cap") {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .pcap, .pcapng or .cap file".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    let mut matches = Vec::new();
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    match matches.len() {
        0 => Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern".to_string()),
        )),
        1 => Ok(matches.remove(0)),
        count => {
            let mut listed = matches
                .iter()
                .take(3)
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if count > 3 {
                listed.push_str(", ...");
            }
            Err(CliError::new(
                format!(
                    "multiple files match pattern '{}' ({} matches); matches: {}",
                    pattern, count, listed
                ),
                Some("pass a single capture file, or run once per file".to_string()),
            ))
        }
    }
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
