//! PrintLink command-line front end.
//!
//! Drives the printers listed in `printers.toml` through the common adapter
//! interface, and scans the LAN for printers that are not configured yet.
//!
//! # Usage
//!
//! ```text
//! printlink [--config <PATH>] <COMMAND>
//!
//! Commands:
//!   discover   Scan the LAN with mDNS and Bambu SSDP
//!   list       Show configured printers
//!   status     Print one status snapshot
//!   upload     Send a file to a printer
//!   start      Start a file that is already on the printer
//!   print      Upload a file and start it
//!   pause      Pause the running job
//!   resume     Resume a paused job
//!   cancel     Cancel the running job
//!   watch      Print a status snapshot every few seconds
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr so the two never mix.
//!
//! # Environment variable overrides
//!
//! | Variable           | Description                                     |
//! |--------------------|-------------------------------------------------|
//! | `PRINTLINK_CONFIG` | Path to `printers.toml` (same as `--config`)    |
//! | `RUST_LOG`         | Log filter; overrides `settings.log_level`      |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context};
use clap::{Parser, Subcommand};
use printlink_adapters::infrastructure::discovery::{self, mdns, ssdp};
use printlink_adapters::infrastructure::factory::build_adapter;
use printlink_adapters::infrastructure::storage::config::{
    config_file_path, load_config_from, PrintLinkConfig,
};
use printlink_adapters::{PrintJob, PrinterAdapter};
use printlink_core::{PrinterState, PrinterStatus};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Control OctoPrint, Moonraker, Bambu Lab and filesystem printers.
#[derive(Debug, Parser)]
#[command(name = "printlink", about = "Drive 3D printers over the local network", version)]
struct Cli {
    /// Path to the printer configuration file.
    ///
    /// Defaults to `printers.toml` in the platform config directory.
    #[arg(long, global = true, env = "PRINTLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan the LAN for printers.
    Discover {
        /// Scan window in seconds [default: settings.discovery_timeout_secs].
        #[arg(long)]
        timeout: Option<u64>,
        /// Only browse mDNS services.
        #[arg(long, conflicts_with = "ssdp_only")]
        mdns_only: bool,
        /// Only send the Bambu SSDP search.
        #[arg(long)]
        ssdp_only: bool,
    },
    /// Show configured printers.
    List,
    /// Print one status snapshot.
    Status { printer: String },
    /// Send a file to a printer.
    Upload {
        printer: String,
        file: PathBuf,
        /// Name to store the file under on the printer.
        #[arg(long = "as")]
        remote_name: Option<String>,
    },
    /// Start a file that is already on the printer.
    Start { printer: String, filename: String },
    /// Upload a file and start printing it.
    Print {
        printer: String,
        file: PathBuf,
        #[arg(long = "as")]
        remote_name: Option<String>,
    },
    /// Pause the running job.
    Pause { printer: String },
    /// Resume a paused job.
    Resume { printer: String },
    /// Cancel the running job.
    Cancel { printer: String },
    /// Print a status snapshot every `--interval` seconds.
    Watch {
        printer: String,
        #[arg(long, default_value_t = 5)]
        interval: u64,
        /// Stop after this many snapshots (runs until Ctrl+C otherwise).
        #[arg(long)]
        count: Option<u64>,
        /// Stop once the job completes or the printer reports an error.
        #[arg(long)]
        until_done: bool,
    },
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given and no platform config dir"),
        }
    }
}

/// Job-control commands that share the connect / send / report flow.
#[derive(Debug, Clone, Copy)]
enum JobAction {
    Pause,
    Resume,
    Cancel,
}

impl JobAction {
    fn as_str(self) -> &'static str {
        match self {
            JobAction::Pause => "pause",
            JobAction::Resume => "resume",
            JobAction::Cancel => "cancel",
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path()?;
    let config = load_config_from(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    // RUST_LOG wins; otherwise the configured level.  Logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        config = %config_path.display(),
        printers = config.printers.len(),
        "configuration loaded"
    );
    run(cli.command, &config).await
}

async fn run(command: Command, config: &PrintLinkConfig) -> anyhow::Result<()> {
    match command {
        Command::Discover {
            timeout,
            mdns_only,
            ssdp_only,
        } => {
            let window = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.settings.discovery_timeout());
            let found = if mdns_only {
                mdns::discover_printers(window).await
            } else if ssdp_only {
                ssdp::discover_bambu(window).await
            } else {
                discovery::discover_all(window).await
            };
            info!(count = found.len(), "discovery finished");
            emit(&found)
        }
        Command::List => {
            let printers: Vec<_> = config
                .printers
                .iter()
                .map(|entry| {
                    let adapter = build_adapter(entry, &config.settings);
                    json!({
                        "name": adapter.name(),
                        "kind": adapter.kind(),
                        "host": adapter.host(),
                        "port": adapter.port(),
                    })
                })
                .collect();
            emit(&printers)
        }
        Command::Status { printer } => {
            let adapter = connected_adapter(config, &printer).await?;
            let status = adapter.monitor().await;
            adapter.disconnect().await;
            emit(&status)
        }
        Command::Upload {
            printer,
            file,
            remote_name,
        } => {
            let adapter = connected_adapter(config, &printer).await?;
            let result = adapter.upload(&file, remote_name.as_deref()).await;
            adapter.disconnect().await;
            let remote = result.with_context(|| format!("upload of {} failed", file.display()))?;
            emit(&json!({ "printer": printer, "remote": remote }))
        }
        Command::Start { printer, filename } => {
            let adapter = connected_adapter(config, &printer).await?;
            let accepted = adapter.start(&filename).await;
            adapter.disconnect().await;
            emit(&json!({
                "printer": printer,
                "command": "start",
                "file": filename,
                "accepted": accepted,
            }))?;
            ensure!(accepted, "printer '{printer}' rejected start of {filename}");
            Ok(())
        }
        Command::Print {
            printer,
            file,
            remote_name,
        } => {
            let entry = config
                .find_printer(&printer)
                .with_context(|| format!("no printer named '{printer}' in config"))?;
            let adapter: Arc<dyn PrinterAdapter> =
                Arc::from(build_adapter(entry, &config.settings));
            let job = PrintJob::new(Arc::clone(&adapter));
            let result = job.submit(&file, remote_name.as_deref()).await;
            adapter.disconnect().await;
            let remote = result
                .with_context(|| format!("print of {} on '{printer}' failed", file.display()))?;
            emit(&json!({ "printer": printer, "remote": remote, "started": true }))
        }
        Command::Pause { printer } => job_action(config, &printer, JobAction::Pause).await,
        Command::Resume { printer } => job_action(config, &printer, JobAction::Resume).await,
        Command::Cancel { printer } => job_action(config, &printer, JobAction::Cancel).await,
        Command::Watch {
            printer,
            interval,
            count,
            until_done,
        } => {
            let limits = WatchLimits {
                interval: Duration::from_secs(interval.max(1)),
                count,
                until_done,
            };
            watch(config, &printer, limits).await
        }
    }
}

/// Looks `name` up in the config, builds its adapter and connects it.
async fn connected_adapter(
    config: &PrintLinkConfig,
    name: &str,
) -> anyhow::Result<Box<dyn PrinterAdapter>> {
    let entry = config
        .find_printer(name)
        .with_context(|| format!("no printer named '{name}' in config"))?;
    let adapter = build_adapter(entry, &config.settings);
    if !adapter.connect().await {
        bail!(
            "could not connect to '{name}' ({} at {}:{})",
            adapter.kind(),
            adapter.host(),
            adapter.port()
        );
    }
    Ok(adapter)
}

async fn job_action(config: &PrintLinkConfig, name: &str, action: JobAction) -> anyhow::Result<()> {
    let adapter = connected_adapter(config, name).await?;
    let accepted = match action {
        JobAction::Pause => adapter.pause().await,
        JobAction::Resume => adapter.resume().await,
        JobAction::Cancel => adapter.cancel().await,
    };
    adapter.disconnect().await;
    emit(&json!({ "printer": name, "command": action.as_str(), "accepted": accepted }))?;
    ensure!(accepted, "printer '{name}' rejected {}", action.as_str());
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct WatchLimits {
    interval: Duration,
    count: Option<u64>,
    until_done: bool,
}

/// A job is over once the printer reports it complete or failed.
fn job_ended(state: PrinterState) -> bool {
    matches!(state, PrinterState::Complete | PrinterState::Error)
}

/// Emits one compact JSON line per snapshot until a limit is hit or Ctrl+C
/// is pressed.  State changes are logged.
async fn watch(config: &PrintLinkConfig, name: &str, limits: WatchLimits) -> anyhow::Result<()> {
    let adapter = connected_adapter(config, name).await?;
    let mut ticker = tokio::time::interval(limits.interval);
    let mut emitted = 0u64;
    let mut last_state: Option<PrinterState> = None;

    loop {
        if limits.count.is_some_and(|limit| emitted >= limit) {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                break;
            }
        }
        let status: PrinterStatus = adapter.monitor().await;
        println!("{}", serde_json::to_string(&status)?);
        emitted += 1;

        if last_state != Some(status.state) {
            info!(printer = name, state = %status.state, progress = status.progress_pct(), "state");
            last_state = Some(status.state);
        }
        if limits.until_done && job_ended(status.state) {
            break;
        }
    }

    adapter.disconnect().await;
    Ok(())
}

fn emit<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
