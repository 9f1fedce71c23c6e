//! Rhythm CLI - Command-line interface for Synheart Rhythm
//!
//! Commands:
//! - extract: Turn one attempt's key events into a timing vector
//! - enroll: Train and store a user's model from captured attempts
//! - verify: Check an attempt against a stored model
//! - inspect: Print a stored model
//! - doctor: Diagnose configuration and model store health

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use synheart_rhythm::diagnostics::diagnose_attempt;
use synheart_rhythm::{
    Attempt, EngineConfig, FeatureExtractor, JsonFileModelStore, KeyEvent, ModelStore,
    RhythmError, RhythmProcessor, PRODUCER_NAME, RHYTHM_VERSION,
};

/// Rhythm - On-device keystroke-dynamics engine
#[derive(Parser)]
#[command(name = "rhythm")]
#[command(author = "Synheart AI Inc")]
#[command(version = RHYTHM_VERSION)]
#[command(about = "Enroll and verify typists by keystroke rhythm", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a timing vector from one attempt's key events
    Extract {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,
    },

    /// Enroll a user from captured attempts
    Enroll {
        /// Username to enroll
        #[arg(short, long)]
        user: String,

        /// Model store file
        #[arg(short, long)]
        store: PathBuf,

        /// Attempts file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify one attempt against a user's stored model
    Verify {
        /// Username to verify
        #[arg(short, long)]
        user: String,

        /// Model store file
        #[arg(short, long)]
        store: PathBuf,

        /// Attempt file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a user's stored model
    Inspect {
        /// Username to inspect
        #[arg(short, long)]
        user: String,

        /// Model store file
        #[arg(short, long)]
        store: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and model store health
    Doctor {
        /// Check model store file
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

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

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> Result<(), RhythmCliError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Extract {
            input,
            input_format,
        } => cmd_extract(&config, &input, input_format),

        Commands::Enroll {
            user,
            store,
            input,
            input_format,
            json,
        } => cmd_enroll(config, &user, &store, &input, input_format, json),

        Commands::Verify {
            user,
            store,
            input,
            json,
        } => cmd_verify(config, &user, &store, &input, json),

        Commands::Inspect { user, store, json } => cmd_inspect(&user, &store, json),

        Commands::Doctor { store, json } => {
            cmd_doctor(&config, cli.config.as_deref(), store.as_deref(), json)
        }
    }
}

fn cmd_extract(
    config: &EngineConfig,
    input: &Path,
    input_format: InputFormat,
) -> Result<(), RhythmCliError> {
    let input_data = read_input(input)?;
    let events: Vec<KeyEvent> = parse_records(&input_data, &input_format)?;

    let extractor = FeatureExtractor::from_config(config);
    match extractor.extract(&events) {
        Some(vector) => {
            println!("{}", serde_json::to_string(&vector)?);
            Ok(())
        }
        None => {
            // The extractor does not say why; re-derive it for the message
            let reason = diagnose_attempt(&events, config.expected_dimension(), &extractor)
                .err()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "attempt rejected".to_string());
            Err(RhythmCliError::Rejected(reason))
        }
    }
}

fn cmd_enroll(
    config: EngineConfig,
    user: &str,
    store: &Path,
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), RhythmCliError> {
    let input_data = read_input(input)?;
    let attempts: Vec<Attempt> = parse_records(&input_data, &input_format)?;
    if attempts.is_empty() {
        return Err(RhythmCliError::NoAttempts);
    }

    let mut processor = RhythmProcessor::new(config, JsonFileModelStore::open(store)?)?;
    let (model, rejected) = processor.enroll(user, &attempts)?;

    let report = EnrollReport {
        user: user.to_string(),
        attempts: attempts.len(),
        rejected: rejected
            .iter()
            .map(|(index, reason)| RejectedAttempt {
                index: *index,
                reason: reason.to_string(),
                hint: reason.hint(),
            })
            .collect(),
        dimension: model.dimension,
        threshold: model.threshold,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Enrollment Report");
        println!("=================");
        println!("User:       {}", report.user);
        println!("Attempts:   {}", report.attempts);
        println!("Rejected:   {}", report.rejected.len());
        println!("Dimension:  {}", report.dimension);
        println!("Threshold:  {:.3}", report.threshold);

        if !report.rejected.is_empty() {
            println!("\nRejected attempts:");
            for r in &report.rejected {
                println!("  - Attempt {}: {} ({})", r.index, r.reason, r.hint);
            }
        }
    }

    Ok(())
}

fn cmd_verify(
    config: EngineConfig,
    user: &str,
    store: &Path,
    input: &Path,
    json: bool,
) -> Result<(), RhythmCliError> {
    let input_data = read_input(input)?;
    let attempt: Attempt = serde_json::from_str(input_data.trim())?;

    let mut processor = RhythmProcessor::new(config, JsonFileModelStore::open(store)?)?;
    let outcome = processor.verify(user, &attempt)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "user": user,
                "accepted": outcome.decision.accepted,
                "distance": outcome.decision.distance,
                "score": outcome.decision.score,
                "threshold": outcome.model.threshold,
                "adapted": outcome.adapted,
            }))?
        );
    } else {
        let status = if outcome.decision.accepted { "VERIFIED" } else { "FAILED" };
        println!(
            "{} ({}%) distance {:.3} / threshold {:.3}",
            status,
            outcome.decision.score as i64,
            outcome.decision.distance,
            outcome.model.threshold
        );
        if outcome.adapted {
            println!("Model updated toward this attempt");
        }
    }

    if outcome.decision.accepted {
        Ok(())
    } else {
        Err(RhythmCliError::VerificationFailed(outcome.decision.score))
    }
}

fn cmd_inspect(user: &str, store: &Path, json: bool) -> Result<(), RhythmCliError> {
    let store = JsonFileModelStore::open(store)?;
    let record = store
        .find_user(user)?
        .ok_or_else(|| RhythmError::UnknownUser(user.to_string()))?;
    let model = store
        .load_model(record.id)?
        .ok_or_else(|| RhythmError::ModelNotFound(user.to_string()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "user": record,
                "model": model,
            }))?
        );
    } else {
        let k = (model.dimension + 1) / 2;
        let mean_dwell = model.center[..k].iter().sum::<f64>() / k as f64;
        let mean_flight = if k > 1 {
            model.center[k..].iter().sum::<f64>() / (k - 1) as f64
        } else {
            0.0
        };
        println!("User:        {} ({})", record.username, record.id);
        println!("Enrolled:    {}", record.created_at.to_rfc3339());
        println!("Dimension:   {}", model.dimension);
        println!("Threshold:   {:.3}", model.threshold);
        println!("Mean dwell:  {:.1} ms", mean_dwell * 1000.0);
        println!("Mean flight: {:.1} ms", mean_flight * 1000.0);
    }

    Ok(())
}

fn cmd_doctor(
    config: &EngineConfig,
    config_path: Option<&Path>,
    store: Option<&Path>,
    json: bool,
) -> Result<(), RhythmCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "rhythm_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Rhythm version {}", RHYTHM_VERSION),
    });

    checks.push(DoctorCheck {
        name: "config".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "{} ({} chars, {} samples, vector length {})",
            config_path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "default configuration".to_string()),
            config.passphrase_len(),
            config.required_samples,
            config.expected_dimension()
        ),
    });

    if let Some(store_path) = store {
        if store_path.exists() {
            match JsonFileModelStore::open(store_path) {
                Ok(opened) => {
                    let document = opened.document();
                    checks.push(DoctorCheck {
                        name: "model_store".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Model store valid ({} users, {} models)",
                            document.user_count(),
                            document.model_count()
                        ),
                    });
                }
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "model_store".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Cannot open model store: {}", e),
                    });
                }
            }
        } else {
            checks.push(DoctorCheck {
                name: "model_store".to_string(),
                status: CheckStatus::Warning,
                message: "Model store file does not exist (created on first enrollment)"
                    .to_string(),
            });
        }
    }

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
            message: "stdin is a pipe (capture input ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: RHYTHM_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Rhythm Doctor Report");
        println!("====================");
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
        Err(RhythmCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, RhythmCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_records<T: serde::de::DeserializeOwned>(
    data: &str,
    format: &InputFormat,
) -> Result<Vec<T>, RhythmCliError> {
    match format {
        InputFormat::Json => Ok(serde_json::from_str(data)?),
        InputFormat::Ndjson => {
            let mut records = Vec::new();
            for (line_num, line) in data.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let record = serde_json::from_str(trimmed).map_err(|e| {
                    RhythmCliError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    ))
                })?;
                records.push(record);
            }
            Ok(records)
        }
    }
}

// Error types

#[derive(Debug)]
enum RhythmCliError {
    Io(io::Error),
    Engine(RhythmError),
    Json(serde_json::Error),
    ParseError(String),
    NoAttempts,
    Rejected(String),
    VerificationFailed(f64),
    DoctorFailed,
}

impl From<io::Error> for RhythmCliError {
    fn from(e: io::Error) -> Self {
        RhythmCliError::Io(e)
    }
}

impl From<RhythmError> for RhythmCliError {
    fn from(e: RhythmError) -> Self {
        RhythmCliError::Engine(e)
    }
}

impl From<serde_json::Error> for RhythmCliError {
    fn from(e: serde_json::Error) -> Self {
        RhythmCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RhythmCliError> for CliError {
    fn from(e: RhythmCliError) -> Self {
        match e {
            RhythmCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RhythmCliError::Engine(RhythmError::AttemptRejected(reason)) => CliError {
                code: "ATTEMPT_REJECTED".to_string(),
                message: reason.to_string(),
                hint: Some(reason.hint()),
            },
            RhythmCliError::Engine(e @ RhythmError::UnknownUser(_))
            | RhythmCliError::Engine(e @ RhythmError::ModelNotFound(_)) => CliError {
                code: "NOT_ENROLLED".to_string(),
                message: e.to_string(),
                hint: Some("Run 'rhythm enroll' first".to_string()),
            },
            RhythmCliError::Engine(e @ RhythmError::InsufficientSamples { .. }) => CliError {
                code: "INSUFFICIENT_SAMPLES".to_string(),
                message: e.to_string(),
                hint: Some("Capture more clean attempts of the passphrase".to_string()),
            },
            RhythmCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            RhythmCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RhythmCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
            RhythmCliError::NoAttempts => CliError {
                code: "NO_ATTEMPTS".to_string(),
                message: "No attempts found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            RhythmCliError::Rejected(reason) => CliError {
                code: "ATTEMPT_REJECTED".to_string(),
                message: reason,
                hint: None,
            },
            RhythmCliError::VerificationFailed(score) => CliError {
                code: "VERIFICATION_FAILED".to_string(),
                message: format!("Typing rhythm did not match ({}%)", score as i64),
                hint: Some("Try again, typing naturally".to_string()),
            },
            RhythmCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct EnrollReport {
    user: String,
    attempts: usize,
    rejected: Vec<RejectedAttempt>,
    dimension: usize,
    threshold: f64,
}

#[derive(serde::Serialize)]
struct RejectedAttempt {
    index: usize,
    reason: String,
    hint: String,
}

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
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
