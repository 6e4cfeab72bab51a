//! Hardpoint Flux CLI
//!
//! Commands:
//! - scan: detect test windows over a date range
//! - features: extract per-phase features for a window table
//! - report: acceptance statistics of a feature table
//! - run: scan, features and report in one go
//! - config: print the effective configuration
//! - doctor: check telemetry export and configuration

use clap::{Parser, Subcommand};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use hardpoint_flux::pipeline::HardpointPipeline;
use hardpoint_flux::report::StatsReport;
use hardpoint_flux::store;
use hardpoint_flux::telemetry::{topics, CsvDirectorySource};
use hardpoint_flux::{ComputeError, PipelineConfig, FLUX_VERSION, PRODUCER_NAME};

/// Hardpoint Flux - Breakaway test windows and features from telemetry
#[derive(Parser)]
#[command(name = "hpflux")]
#[command(version = FLUX_VERSION)]
#[command(about = "Extract hardpoint breakaway test features from telemetry", long_about = None)]
struct Cli {
    /// Pipeline configuration (JSON); defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect test windows over whole UTC days
    Scan {
        /// Directory with one <topic>.csv per telemetry topic
        #[arg(short, long)]
        telemetry: PathBuf,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day (YYYY-MM-DD), today when omitted
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Output directory
        #[arg(short, long, default_value = "hardpoint_output")]
        out: PathBuf,

        /// Rescan even when cached tables exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Extract features for the windows of a window table
    Features {
        /// Directory with one <topic>.csv per telemetry topic
        #[arg(short, long)]
        telemetry: PathBuf,

        /// Window table written by `scan`
        #[arg(short, long)]
        windows: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "hardpoint_output")]
        out: PathBuf,

        /// File name of the feature table
        #[arg(long, default_value = store::FEATURES_FILE_NAME)]
        features_file: String,

        /// Recompute even when the feature table exists
        #[arg(long)]
        overwrite: bool,
    },

    /// Write acceptance statistics of a feature table
    Report {
        /// Feature table written by `features`
        #[arg(short, long)]
        features: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "hardpoint_output")]
        out: PathBuf,
    },

    /// Scan, extract features and report
    Run {
        /// Directory with one <topic>.csv per telemetry topic
        #[arg(short, long)]
        telemetry: PathBuf,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day (YYYY-MM-DD), today when omitted
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Output directory
        #[arg(short, long, default_value = "hardpoint_output")]
        out: PathBuf,

        /// Recompute every stage even when cached tables exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Print the effective configuration as JSON
    Config,

    /// Diagnose telemetry export and configuration
    Doctor {
        /// Directory with one <topic>.csv per telemetry topic
        #[arg(short, long)]
        telemetry: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
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

fn run(cli: Cli) -> Result<(), HpfluxCliError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            telemetry,
            start,
            end,
            out,
            overwrite,
        } => cmd_scan(config, &telemetry, start, end, out, overwrite),

        Commands::Features {
            telemetry,
            windows,
            out,
            features_file,
            overwrite,
        } => cmd_features(config, &telemetry, &windows, out, features_file, overwrite),

        Commands::Report { features, out } => cmd_report(&features, &out),

        Commands::Run {
            telemetry,
            start,
            end,
            out,
            overwrite,
        } => cmd_run(config, &telemetry, start, end, out, overwrite),

        Commands::Config => {
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }

        Commands::Doctor { telemetry, json } => cmd_doctor(&config, telemetry.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, HpfluxCliError> {
    match path {
        Some(path) => Ok(PipelineConfig::from_json_file(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn telemetry_source(dir: &Path) -> Result<CsvDirectorySource, HpfluxCliError> {
    if !dir.is_dir() {
        return Err(HpfluxCliError::NoTelemetry(dir.to_path_buf()));
    }
    Ok(CsvDirectorySource::new(dir))
}

fn cmd_scan(
    config: PipelineConfig,
    telemetry: &Path,
    start: NaiveDate,
    end: Option<NaiveDate>,
    out: PathBuf,
    overwrite: bool,
) -> Result<(), HpfluxCliError> {
    let pipeline =
        HardpointPipeline::new(telemetry_source(telemetry)?, config, out)?.with_overwrite(overwrite);
    let result = pipeline.scan_windows(start, end)?;

    println!("Scan Summary");
    println!("============");
    println!("Windows: {}", result.windows.len());
    println!("Days:    {}", result.days.len());
    for day in &result.days {
        println!(
            "  {} {} group(s), {:.2} h, {} command(s)",
            day.date, day.n_groups, day.total_duration_h, day.n_cmds
        );
    }
    Ok(())
}

fn cmd_features(
    config: PipelineConfig,
    telemetry: &Path,
    windows_path: &Path,
    out: PathBuf,
    features_file: String,
    overwrite: bool,
) -> Result<(), HpfluxCliError> {
    let windows = store::read_windows(windows_path)?;
    let pipeline = HardpointPipeline::new(telemetry_source(telemetry)?, config, out)?
        .with_overwrite(overwrite)
        .with_features_file(features_file);
    let rows = pipeline.extract_features(&windows)?;

    let in_band = rows.iter().filter(|r| r.in_band).count();
    println!("Feature rows: {} ({} in band)", rows.len(), in_band);
    println!("Written to:   {}", pipeline.features_path().display());
    Ok(())
}

fn cmd_report(features: &Path, out: &Path) -> Result<(), HpfluxCliError> {
    let rows = store::read_features(features)?;
    std::fs::create_dir_all(out)?;
    let report = StatsReport::from_rows(&rows);
    for path in report.write_to_dir(out)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn cmd_run(
    config: PipelineConfig,
    telemetry: &Path,
    start: NaiveDate,
    end: Option<NaiveDate>,
    out: PathBuf,
    overwrite: bool,
) -> Result<(), HpfluxCliError> {
    let pipeline =
        HardpointPipeline::new(telemetry_source(telemetry)?, config, out)?.with_overwrite(overwrite);
    let output = pipeline.run(start, end)?;

    println!("Run Summary");
    println!("===========");
    println!("Windows:      {}", output.scan.windows.len());
    println!("Feature rows: {}", output.features.len());
    println!("\nOutside-band points by hardpoint:");
    for hp in &output.report.outside_points_by_hp {
        println!(
            "  HP{} {}/{} ({:.1}%)",
            hp.hp, hp.n_outside, hp.n_total, hp.pct_outside
        );
    }
    Ok(())
}

fn cmd_doctor(
    config: &PipelineConfig,
    telemetry: Option<&Path>,
    json: bool,
) -> Result<(), HpfluxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "flux_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Flux version {}", FLUX_VERSION),
    });

    checks.push(match config.validate() {
        Ok(()) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Configuration is valid".to_string(),
        },
        Err(e) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    if let Some(dir) = telemetry {
        let source = CsvDirectorySource::new(dir);
        let required = [
            topics::COMMAND_TOPIC,
            topics::STATUS_TOPIC,
            topics::ACTUATOR_TOPIC,
        ];
        let optional = [topics::ELEVATION_TOPIC, topics::AZIMUTH_TOPIC];
        for topic in required.into_iter().chain(optional) {
            let present = source.topic_path(topic).exists();
            let status = match (present, required.contains(&topic)) {
                (true, _) => CheckStatus::Ok,
                (false, true) => CheckStatus::Error,
                (false, false) => CheckStatus::Warning,
            };
            checks.push(DoctorCheck {
                name: topic.to_string(),
                status,
                message: if present {
                    format!("{} found", source.topic_path(topic).display())
                } else {
                    format!("{} missing", source.topic_path(topic).display())
                },
            });
        }
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Flux Doctor Report");
        println!("==================");
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

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(HpfluxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum HpfluxCliError {
    Io(std::io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoTelemetry(PathBuf),
    DoctorFailed,
}

impl From<std::io::Error> for HpfluxCliError {
    fn from(e: std::io::Error) -> Self {
        HpfluxCliError::Io(e)
    }
}

impl From<ComputeError> for HpfluxCliError {
    fn from(e: ComputeError) -> Self {
        HpfluxCliError::Compute(e)
    }
}

impl From<serde_json::Error> for HpfluxCliError {
    fn from(e: serde_json::Error) -> Self {
        HpfluxCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HpfluxCliError> for CliError {
    fn from(e: HpfluxCliError) -> Self {
        match e {
            HpfluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HpfluxCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::MissingColumn { .. } => (
                        "MISSING_COLUMN",
                        "Regenerate the table with 'hpflux features' or 'hpflux scan'",
                    ),
                    ComputeError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", "Run 'hpflux config' to see the defaults")
                    }
                    ComputeError::InvalidDateRange(_) => {
                        ("INVALID_DATE_RANGE", "The end date must not precede the start date")
                    }
                    ComputeError::TimestampParse(_) => {
                        ("TIMESTAMP_ERROR", "Timestamps must be RFC 3339, e.g. 2024-03-01T10:00:00Z")
                    }
                    _ => ("COMPUTE_ERROR", "Run 'hpflux doctor' to check the inputs"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            HpfluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HpfluxCliError::NoTelemetry(dir) => CliError {
                code: "NO_TELEMETRY".to_string(),
                message: format!("Telemetry directory {} does not exist", dir.display()),
                hint: Some("Export each topic as <topic>.csv into one directory".to_string()),
            },
            HpfluxCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
