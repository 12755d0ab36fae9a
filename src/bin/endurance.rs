//! Endurance CLI - Command-line interface for the training-load pipeline
//!
//! Commands:
//! - init-db: Provision the SQLite schema
//! - import: Deposit raw activity JSON into the database
//! - build-runs / build-features / run: Rebuild pipeline stages
//! - show: Dump a derived table
//! - doctor: Diagnose configuration and database health

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use endurance_load::adapters::{parse_array, parse_ndjson, RawActivity};
use endurance_load::types::StageReport;
use endurance_load::{
    Database, FeaturePipeline, PipelineConfig, PipelineError, UnknownZonePolicy,
    ENDURANCE_VERSION, PRODUCER_NAME,
};

/// Endurance - training-load features from running activities
#[derive(Parser)]
#[command(name = "endurance")]
#[command(version = ENDURANCE_VERSION)]
#[command(about = "Build training-load feature tables from running activities", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Maximum heart rate used for zones and TRIMP
    #[arg(long, global = true)]
    hr_max: Option<f64>,

    /// How runs without heart rate count in easy/hard splits
    #[arg(long, global = true)]
    unknown_zone: Option<UnknownZoneArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb,

    /// Deposit raw activities (upsert by activity id)
    Import {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,
    },

    /// Extract run records from raw activities
    BuildRuns,

    /// Rebuild daily, weekly and label tables
    BuildFeatures,

    /// Rebuild every stage from raw activities
    Run,

    /// Print a table
    Show {
        #[arg(value_enum)]
        table: TableName,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        format: OutputFormat,

        /// Print at most this many rows
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Diagnose configuration and database health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// JSON array of activities
    Json,
    /// Newline-delimited JSON (one activity per line)
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// JSON array of rows
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum TableName {
    Runs,
    Daily,
    Weekly,
    Labels,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnknownZoneArg {
    /// Runs without heart rate count toward easy volume
    CountAsEasy,
    /// Runs without heart rate count toward neither split
    Exclude,
}

impl From<UnknownZoneArg> for UnknownZonePolicy {
    fn from(arg: UnknownZoneArg) -> Self {
        match arg {
            UnknownZoneArg::CountAsEasy => UnknownZonePolicy::CountAsEasy,
            UnknownZoneArg::Exclude => UnknownZonePolicy::Exclude,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), EnduranceCliError> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::InitDb => cmd_init_db(&config),
        Commands::Import {
            input,
            input_format,
        } => cmd_import(&config, &input, input_format),
        Commands::BuildRuns => {
            let mut db = Database::open(&config.database_path)?;
            let report = FeaturePipeline::new(config).build_runs(&mut db)?;
            print_reports(&[report])
        }
        Commands::BuildFeatures => {
            let mut db = Database::open(&config.database_path)?;
            let reports = FeaturePipeline::new(config).build_features(&mut db)?;
            print_reports(&reports)
        }
        Commands::Run => {
            let mut db = Database::open(&config.database_path)?;
            let reports = FeaturePipeline::new(config).run_all(&mut db)?;
            print_reports(&reports)
        }
        Commands::Show {
            table,
            format,
            limit,
        } => cmd_show(&config, table, format, limit),
        Commands::Doctor { json } => cmd_doctor(&config, cli.config.as_deref(), json),
    }
}

/// File, then environment, then command-line flags
fn resolve_config(cli: &Cli) -> Result<PipelineConfig, EnduranceCliError> {
    let mut config = match &cli.config {
        Some(path) if !path.exists() => {
            return Err(EnduranceCliError::MissingConfig(path.clone()));
        }
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    }
    .apply_env()?;

    if let Some(hr_max) = cli.hr_max {
        config.hr_max = hr_max;
    }
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    if let Some(policy) = cli.unknown_zone {
        config.unknown_zone = policy.into();
    }

    config.validate()?;
    Ok(config)
}

fn cmd_init_db(config: &PipelineConfig) -> Result<(), EnduranceCliError> {
    let db = Database::open(&config.database_path)?;
    println!(
        "{}",
        serde_json::json!({
            "database": config.database_path.display().to_string(),
            "schema_version": db.schema_version()?,
        })
    );
    Ok(())
}

fn cmd_import(
    config: &PipelineConfig,
    input: &Path,
    input_format: InputFormat,
) -> Result<(), EnduranceCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let values = match input_format {
        InputFormat::Json => parse_array(&input_data)?,
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
    };

    if values.is_empty() {
        return Err(EnduranceCliError::NoActivities);
    }

    let mut activities = Vec::with_capacity(values.len());
    let mut skipped = 0;
    for (index, value) in values.iter().enumerate() {
        match RawActivity::from_value(value) {
            Ok(activity) => activities.push(activity),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping activity without usable id");
                skipped += 1;
            }
        }
    }

    let mut db = Database::open(&config.database_path)?;
    let written = db.upsert_raw_activities(&activities, chrono::Utc::now())?;
    tracing::info!(written, skipped, "imported raw activities");

    println!(
        "{}",
        serde_json::json!({
            "rows_read": values.len(),
            "rows_written": written,
            "rows_skipped": skipped,
        })
    );
    Ok(())
}

fn cmd_show(
    config: &PipelineConfig,
    table: TableName,
    format: OutputFormat,
    limit: Option<usize>,
) -> Result<(), EnduranceCliError> {
    if !config.database_path.exists() {
        return Err(EnduranceCliError::MissingDatabase(config.database_path.clone()));
    }
    let db = Database::open(&config.database_path)?;

    let output = match table {
        TableName::Runs => format_output(&truncate(db.load_runs()?, limit), &format)?,
        TableName::Daily => format_output(&truncate(db.load_daily()?, limit), &format)?,
        TableName::Weekly => format_output(&truncate(db.load_weekly()?, limit), &format)?,
        TableName::Labels => format_output(&truncate(db.load_labels()?, limit), &format)?,
    };

    print!("{}", output);
    Ok(())
}

fn cmd_doctor(
    config: &PipelineConfig,
    config_path: Option<&Path>,
    json: bool,
) -> Result<(), EnduranceCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", PRODUCER_NAME, ENDURANCE_VERSION),
    });

    checks.push(DoctorCheck {
        name: "config".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "{} (hr_max {}, unknown_zone {})",
            config_path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in defaults".to_string()),
            config.hr_max,
            config.unknown_zone.as_str()
        ),
    });

    let mut counts = None;
    if config.database_path.exists() {
        match Database::open(&config.database_path)
            .and_then(|db| Ok((db.schema_version()?, db.table_counts()?)))
        {
            Ok((version, table_counts)) => {
                checks.push(DoctorCheck {
                    name: "database".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "{} (schema version {})",
                        config.database_path.display(),
                        version
                    ),
                });
                counts = Some(table_counts);
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "database".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot open {}: {}", config.database_path.display(), e),
                });
            }
        }
    } else {
        checks.push(DoctorCheck {
            name: "database".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "{} does not exist (run 'endurance init-db')",
                config.database_path.display()
            ),
        });
    }

    if let Some(counts) = &counts {
        let status = if counts.activities_raw == 0 {
            CheckStatus::Warning
        } else {
            CheckStatus::Ok
        };
        checks.push(DoctorCheck {
            name: "tables".to_string(),
            status,
            message: format!(
                "raw {} / runs {} / daily {} / weekly {} / labels {}",
                counts.activities_raw,
                counts.runs,
                counts.daily_features,
                counts.weekly_features,
                counts.labels_weekly
            ),
        });
    }

    // Import reads stdin when given '-'
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (import from '-' ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENDURANCE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Endurance Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(EnduranceCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn truncate<T>(mut rows: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}

fn print_reports(reports: &[StageReport]) -> Result<(), EnduranceCliError> {
    print!("{}", format_output(reports, &OutputFormat::Ndjson)?);
    Ok(())
}

fn format_output<T: Serialize>(
    rows: &[T],
    format: &OutputFormat,
) -> Result<String, EnduranceCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for row in rows {
                out.push_str(&serde_json::to_string(row)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(rows)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(rows)? + "\n"),
    }
}

// Error types

#[derive(Debug)]
enum EnduranceCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Pipeline(PipelineError),
    MissingConfig(PathBuf),
    MissingDatabase(PathBuf),
    NoActivities,
    DoctorFailed,
}

impl From<io::Error> for EnduranceCliError {
    fn from(e: io::Error) -> Self {
        EnduranceCliError::Io(e)
    }
}

impl From<serde_json::Error> for EnduranceCliError {
    fn from(e: serde_json::Error) -> Self {
        EnduranceCliError::Json(e)
    }
}

impl From<PipelineError> for EnduranceCliError {
    fn from(e: PipelineError) -> Self {
        EnduranceCliError::Pipeline(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<EnduranceCliError> for CliError {
    fn from(e: EnduranceCliError) -> Self {
        match e {
            EnduranceCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            EnduranceCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            EnduranceCliError::Pipeline(e) => pipeline_error(e),
            EnduranceCliError::MissingConfig(path) => CliError {
                code: "CONFIG_NOT_FOUND".to_string(),
                message: format!("Config file {} does not exist", path.display()),
                hint: Some("Omit --config to use the built-in defaults".to_string()),
            },
            EnduranceCliError::MissingDatabase(path) => CliError {
                code: "DATABASE_NOT_FOUND".to_string(),
                message: format!("Database {} does not exist", path.display()),
                hint: Some("Run 'endurance init-db' and 'endurance import' first".to_string()),
            },
            EnduranceCliError::NoActivities => CliError {
                code: "NO_ACTIVITIES".to_string(),
                message: "No activities found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            EnduranceCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

fn pipeline_error(e: PipelineError) -> CliError {
    let (code, hint) = match &e {
        PipelineError::ConfigError(_) => (
            "CONFIG_ERROR",
            "Check the config file and ENDURANCE_* variables",
        ),
        PipelineError::StorageError(_) | PipelineError::MigrationError(_) => {
            ("STORAGE_ERROR", "Check the database path or run 'endurance doctor'")
        }
        PipelineError::JsonError(_) | PipelineError::ParseError(_) => {
            ("PARSE_ERROR", "Check input format")
        }
        PipelineError::DateParseError(_) => {
            ("DATE_ERROR", "Check stored dates or rebuild the tables")
        }
        PipelineError::IoError(_) => ("IO_ERROR", "Check file paths and permissions"),
    };
    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: Some(hint.to_string()),
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
