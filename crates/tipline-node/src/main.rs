//! Tipline operator node
//!
//! Command-line front end for the report desk. Generates authority keys,
//! seals and opens envelopes offline, runs the expiry sweeper against an
//! on-disk desk, and can drive a full in-memory demonstration.
//!
//! `run` is a sweep-only maintenance process. The node has no content store
//! or settlement ledger connection, so it opens the on-disk records with
//! in-memory stand-ins for both and never accepts submissions or settles
//! verdicts.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

use tipline_core::{
    DeskConfig, DeskConfigBuilder, MemoryContentStore, MemoryLedger, Outcome, ReportDesk,
    Submission,
};
use tipline_crypto::{open, seal, seal_file, AuthorityKeyPair, SealedEnvelope, X25519PublicKey};
use tipline_jury::Vote;

/// Tipline operator node
///
/// Anonymous report intake with sealed envelopes and jury review.
#[derive(Parser, Debug)]
#[command(name = "tipline-node")]
#[command(version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TIPLINE_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Log format (plain, json)
    #[arg(long, env = "TIPLINE_LOG_FORMAT", default_value = "plain", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an authority key pair
    Keygen {
        /// Write the secret key (hex) to this file instead of stdout
        #[arg(long)]
        secret_out: Option<PathBuf>,
    },

    /// Seal a file to an authority public key
    Seal {
        /// Authority public key (hex)
        #[arg(long, env = "TIPLINE_AUTHORITY_KEY")]
        authority: String,

        /// Plaintext input file
        #[arg(short, long)]
        input: PathBuf,

        /// Envelope output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Open an envelope with the authority secret key
    Open {
        /// File holding the authority secret key (hex)
        #[arg(long, env = "TIPLINE_SECRET_FILE")]
        secret_file: PathBuf,

        /// Envelope input file
        #[arg(short, long)]
        input: PathBuf,

        /// Plaintext output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print an envelope's fields as JSON
    Inspect {
        /// Envelope input file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Sweep expired sessions from an on-disk desk until stopped
    ///
    /// Sweep-only: the node has no content store or ledger connection, so
    /// it opens the records with in-memory stand-ins for both. It closes and
    /// deletes expired sessions and never accepts submissions or settles
    /// verdicts.
    Run {
        /// Path to data directory
        #[arg(short, long, env = "TIPLINE_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// File holding the authority secret key (hex)
        #[arg(long, env = "TIPLINE_SECRET_FILE")]
        secret_file: PathBuf,

        /// Seconds between expiry sweeps
        #[arg(long, env = "TIPLINE_SWEEP_INTERVAL", default_value = "60")]
        sweep_interval: u64,
    },

    /// Run a full report lifecycle in memory and print the verdict
    Demo,
}

fn setup_logging(log_level: &str, log_format: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("sled=warn".parse()?);

    match log_format.to_lowercase().as_str() {
        "json" => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
        _ => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
    }

    Ok(())
}

fn read_secret(path: &Path) -> Result<AuthorityKeyPair> {
    let hex = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read secret key from {}", path.display()))?;
    AuthorityKeyPair::from_secret_hex(&hex).context("Invalid authority secret key")
}

fn keygen(secret_out: Option<PathBuf>) -> Result<()> {
    let authority = AuthorityKeyPair::generate();
    let secret = hex::encode(authority.secret_bytes());

    match secret_out {
        Some(path) => {
            if path.exists() {
                bail!("Refusing to overwrite {}", path.display());
            }
            std::fs::write(&path, &secret)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Secret key written");
        }
        None => println!("secret: {secret}"),
    }
    println!("public: {}", authority.public_key().to_hex());
    Ok(())
}

fn seal_command(authority: &str, input: &Path, output: &Path) -> Result<()> {
    let public = X25519PublicKey::from_hex(authority).context("Invalid authority public key")?;
    let plaintext =
        std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let envelope = seal(&plaintext, &public).context("Failed to seal")?;
    let bytes = envelope.to_bytes()?;
    std::fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        input = %input.display(),
        output = %output.display(),
        bytes = bytes.len(),
        hash = %envelope.content_hash()?,
        "Envelope sealed"
    );
    Ok(())
}

fn open_command(secret_file: &Path, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let authority = read_secret(secret_file)?;
    let bytes =
        std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let envelope = SealedEnvelope::from_bytes(&bytes).context("Malformed envelope")?;
    let plaintext = open(&envelope, &authority).context("Failed to open envelope")?;

    match output {
        Some(path) => std::fs::write(&path, &plaintext)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&plaintext)?;
        }
    }
    Ok(())
}

fn inspect(input: &Path) -> Result<()> {
    let bytes =
        std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let envelope = SealedEnvelope::from_bytes(&bytes).context("Malformed envelope")?;

    let summary = serde_json::json!({
        "hash": envelope.content_hash()?.to_hex(),
        "ephemeral_public_key": envelope.ephemeral_public_key().to_hex(),
        "nonce": hex::encode(envelope.nonce().as_bytes()),
        "encrypted_key_len": envelope.encrypted_key().len(),
        "ciphertext_len": envelope.ciphertext().len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Sweep-only maintenance loop over the on-disk records.
async fn run(data_dir: Option<PathBuf>, secret_file: &Path, sweep_interval: u64) -> Result<()> {
    let authority = read_secret(secret_file)?;

    let mut builder = DeskConfigBuilder::new().with_disk_storage();
    if let Some(dir) = data_dir {
        builder = builder.with_data_dir(dir);
    }
    let config = builder.build_validated()?;

    if !config.storage.data_dir.exists() {
        std::fs::create_dir_all(&config.storage.data_dir)
            .context("Failed to create data directory")?;
        info!(path = %config.storage.data_dir.display(), "Created data directory");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.storage.data_dir.display(),
        sweep_interval,
        mode = "sweep-only",
        "Starting tipline node"
    );

    let desk = ReportDesk::new(
        config,
        authority,
        Arc::new(MemoryContentStore::new()),
        Arc::new(MemoryLedger::new()),
    )
    .context("Failed to open report desk")?;

    let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval.max(1)));
    info!("Press Ctrl+C to stop the node");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = desk.sweep_expired() {
                    warn!(error = %e, "Expiry sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    desk.flush().context("Failed to flush records")?;
    info!("Tipline node stopped");
    Ok(())
}

async fn demo() -> Result<()> {
    let desk = ReportDesk::new(
        DeskConfig::in_memory(),
        AuthorityKeyPair::generate(),
        Arc::new(MemoryContentStore::new()),
        Arc::new(MemoryLedger::new()),
    )?;

    let reporter = desk.resolve_identity("demo:reporter")?;
    let session = desk.create_session(&reporter)?;
    info!(session = %session.id, "Session opened");

    let body = seal(
        b"Invoice 88231 from vendor 4471 was paid twice on 2024-03-14",
        desk.authority_public_key(),
    )?;
    let ledger_page = seal_file(
        b"date,vendor,amount\n2024-03-14,4471,9800\n2024-03-14,4471,9800\n",
        "ledger.csv",
        "text/csv",
        desk.authority_public_key(),
    )?;
    let report = desk
        .submit(&session.id, Submission::new(body).with_evidence(ledger_page))
        .await?;

    let opened = desk.open_report(&report.id).await?;
    if let Some(annotation) = &opened.report.annotation {
        info!(
            category = %annotation.category,
            urgency = ?annotation.urgency,
            credibility = annotation.credibility,
            "Advisory annotation"
        );
    }

    for (handle, vote) in [
        ("demo:juror-a", Vote::Valid),
        ("demo:juror-b", Vote::Valid),
        ("demo:juror-c", Vote::Invalid),
    ] {
        let juror = desk.resolve_identity(handle)?;
        desk.cast_vote(&report.id, &juror, vote)?;
    }

    let summary = desk.finalize_verdict(&report.id, Outcome::Verified).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let record = desk.reputation(&reporter)?;
    info!(
        reporter = %reporter.short(),
        score = %record.reporter_or_default(),
        "Reporter reputation"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level, &args.log_format)?;

    match args.command {
        Command::Keygen { secret_out } => keygen(secret_out),
        Command::Seal {
            authority,
            input,
            output,
        } => seal_command(&authority, &input, &output),
        Command::Open {
            secret_file,
            input,
            output,
        } => open_command(&secret_file, &input, output),
        Command::Inspect { input } => inspect(&input),
        Command::Run {
            data_dir,
            secret_file,
            sweep_interval,
        } => run(data_dir, &secret_file, sweep_interval).await,
        Command::Demo => demo().await,
    }
}
