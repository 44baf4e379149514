//! Care Agent CLI
//!
//! Situation monitoring for elder care.

use care_agent::{
    config::Config,
    core::{event_log, Investigation, Label},
    events::parse_event_lines,
    orchestrator::{Orchestrator, Progress, RunOutcome},
    store::{MemoryStore, StoreError},
    transparency::{create_shared_log_with_persistence, SharedRunLog},
    VERSION,
};
use chrono::TimeZone;
use clap::{Parser, Subcommand};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "care-agent")]
#[command(version = VERSION)]
#[command(about = "Situation monitoring for elder care", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one investigation
    Run,

    /// Run investigations on a fixed interval until stopped
    Watch {
        /// Seconds between runs (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Append sensor events from a JSON-lines file ("-" for stdin)
    Ingest {
        /// Event file
        file: PathBuf,
    },

    /// List stored investigations
    List,

    /// Correct the estimate of a stored investigation
    Correct {
        /// Investigation index as shown by `list`
        index: usize,

        /// New estimate (normal or anomalous)
        estimate: Label,
    },

    /// Show configuration and run statistics
    Status,

    /// Show configuration
    Config,

    /// Serve the investigation viewer and run investigations in the background
    #[cfg(feature = "server")]
    Serve {
        /// Port to bind (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => cmd_run(),
        Commands::Watch { interval } => cmd_watch(interval),
        Commands::Ingest { file } => cmd_ingest(&file),
        Commands::List => cmd_list(),
        Commands::Correct { index, estimate } => cmd_correct(index, estimate),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
        #[cfg(feature = "server")]
        Commands::Serve { port } => cmd_serve(port),
    }
}

/// Load and validate configuration, exiting on failure.
fn load_config() -> Config {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config from {:?}: {e}", Config::config_path());
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    config
}

fn build_orchestrator(config: &Config, stats: SharedRunLog) -> Orchestrator {
    match Orchestrator::from_config(config) {
        Ok(orchestrator) => orchestrator.with_stats(stats),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn local_time(config: &Config, timestamp: i64) -> String {
    let tz = config.tz().unwrap_or(chrono_tz::Tz::UTC);
    match tz.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => timestamp.to_string(),
    }
}

fn print_outcome(config: &Config, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::NoNewData => println!("No new situations to investigate."),
        RunOutcome::Persisted {
            run_id,
            index,
            investigation,
            notified,
        } => {
            println!(
                "[{}] Investigation #{index}: {} ({} events, {} → {})",
                run_id,
                investigation.estimate,
                investigation.situation.details.len(),
                local_time(config, investigation.situation.start_timestamp),
                local_time(config, investigation.situation.end_timestamp),
            );
            println!("  {}", investigation.situation.situation_description);
            if investigation.estimate == Label::Anomalous {
                println!(
                    "  Alert: {}",
                    if *notified { "sent" } else { "NOT delivered" }
                );
            }
        }
    }
}

fn cmd_run() {
    let config = load_config();
    let stats = create_shared_log_with_persistence(config.stats_path());
    let orchestrator = build_orchestrator(&config, stats);

    match orchestrator.run() {
        Ok(outcome) => print_outcome(&config, &outcome),
        Err(e) => {
            eprintln!("Run failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Print progress messages until the channel closes.
fn spawn_progress_printer(receiver: crossbeam_channel::Receiver<Progress>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for progress in receiver {
            println!("  … {}: {}", progress.phase, progress.detail);
        }
    })
}

/// Sleep for `total`, waking early when `running` is cleared.
fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let started = Instant::now();
    while running.load(Ordering::SeqCst) && started.elapsed() < total {
        thread::sleep(Duration::from_millis(100));
    }
}

fn cmd_watch(interval: Option<u64>) {
    let config = load_config();
    let interval = Duration::from_secs(interval.unwrap_or(config.run_interval_secs).max(1));

    println!("Care Agent v{VERSION}");
    println!();
    println!("Watching {:?}", config.event_log_path());
    println!("  Window duration: {}s", config.window_duration.as_secs());
    println!("  Run interval: {}s", interval.as_secs());
    println!("  Timezone: {}", config.timezone);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let stats = create_shared_log_with_persistence(config.stats_path());
    let (progress_tx, progress_rx) = crossbeam_channel::unbounded();
    let orchestrator = build_orchestrator(&config, stats.clone()).with_progress(progress_tx);
    let printer = spawn_progress_printer(progress_rx);

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    while running.load(Ordering::SeqCst) {
        match orchestrator.run() {
            Ok(outcome) => print_outcome(&config, &outcome),
            Err(e) => eprintln!("Run failed: {e}"),
        }
        sleep_while_running(&running, interval);
    }

    println!();
    println!("Stopping...");
    drop(orchestrator);
    let _ = printer.join();

    println!();
    println!("{}", stats.summary());
}

fn cmd_ingest(file: &Path) {
    let config = load_config();

    let parsed = if file.as_os_str() == "-" {
        parse_event_lines(std::io::stdin().lock())
    } else {
        match std::fs::File::open(file) {
            Ok(f) => parse_event_lines(BufReader::new(f)),
            Err(e) => {
                eprintln!("Error opening {file:?}: {e}");
                std::process::exit(1);
            }
        }
    };

    let (events, skipped) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error reading events: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = event_log(&config).append(&events) {
        eprintln!("Error writing event log: {e}");
        std::process::exit(1);
    }

    println!(
        "Ingested {} events into {:?} ({} lines skipped)",
        events.len(),
        config.event_log_path(),
        skipped
    );
}

fn cmd_list() {
    let config = load_config();
    let investigations: Vec<Investigation> = match MemoryStore::from_config(&config).read_all() {
        Ok(investigations) => investigations,
        Err(e) => {
            eprintln!("Error reading memory: {e}");
            std::process::exit(1);
        }
    };

    if investigations.is_empty() {
        println!("No investigations yet.");
        println!("Run 'care-agent run' after ingesting events.");
        return;
    }

    for (index, investigation) in investigations.iter().enumerate() {
        println!(
            "#{index:<4} {:<9} {} → {}  {}",
            investigation.estimate.as_str(),
            local_time(&config, investigation.situation.start_timestamp),
            local_time(&config, investigation.situation.end_timestamp),
            investigation.situation.situation_description
        );
    }
}

fn cmd_correct(index: usize, estimate: Label) {
    if estimate == Label::Unknown {
        eprintln!("Error: estimate must be 'normal' or 'anomalous'");
        std::process::exit(1);
    }

    let config = load_config();
    let memory = MemoryStore::from_config(&config);

    match memory.update_estimate_at(index, estimate) {
        Ok(corrected) => println!(
            "Investigation #{index} ({}) marked {}",
            corrected.situation.situation_description, corrected.estimate
        ),
        Err(StoreError::IndexOutOfRange { .. }) => {
            eprintln!("Error: no investigation at index {index}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error updating memory: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Care Agent Status");
    println!("=================");
    println!();
    println!("Configuration:");
    println!("  Data directory: {:?}", config.data_path);
    println!("  Window duration: {}s", config.window_duration.as_secs());
    println!("  Timezone: {}", config.timezone);
    println!("  Estimators: {}", config.estimators.len());
    println!(
        "  Retention: events {} weeks, memory {} weeks",
        config.event_retention_weeks, config.memory_retention_weeks
    );
    println!();

    match MemoryStore::from_config(&config).len() {
        Ok(count) => println!("Stored investigations: {count}"),
        Err(e) => println!("Stored investigations: unavailable ({e})"),
    }
    println!();

    if config.stats_path().exists() {
        let stats = create_shared_log_with_persistence(config.stats_path());
        println!("{}", stats.summary());
    } else {
        println!("No previous run data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration file: {:?}", Config::config_path());
    println!();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing config: {e}"),
    }
}

#[cfg(feature = "server")]
fn cmd_serve(port: Option<u16>) {
    use care_agent::server::{self, ServerConfig};
    use std::sync::Mutex;

    let config = load_config();
    let stats = create_shared_log_with_persistence(config.stats_path());
    let orchestrator = build_orchestrator(&config, stats.clone());
    let memory = orchestrator.memory().clone();
    let interval = Duration::from_secs(config.run_interval_secs.max(1));

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let lock = Arc::new(Mutex::new(()));
    let run_lock = lock.clone();
    let run_flag = running.clone();
    let runner = thread::spawn(move || {
        while run_flag.load(Ordering::SeqCst) {
            {
                let _guard = run_lock.lock().unwrap_or_else(|p| p.into_inner());
                if let Err(e) = orchestrator.run() {
                    tracing::error!(error = %e, "scheduled run failed");
                }
            }
            sleep_while_running(&run_flag, interval);
        }
    });

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    let server_config =
        ServerConfig::new(port.unwrap_or(config.server_port), memory, stats).with_lock(lock);
    let served = runtime.block_on(async {
        let (addr, shutdown_tx) = server::run(server_config).await?;
        println!("Care Agent v{VERSION}");
        println!("Viewer: http://{addr}");
        println!("Press Ctrl+C to stop");

        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let _ = shutdown_tx.send(());
        anyhow::Ok(())
    });

    if let Err(e) = served {
        eprintln!("Server error: {e}");
        running.store(false, Ordering::SeqCst);
    }
    let _ = runner.join();
}

fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
