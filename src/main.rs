//! HydraHog CLI
//!
//! - `run`: drive a stress run, printing the run log and a status line
//! - `probe`: one host/sensor snapshot
//! - `worker`: hidden entrypoint executed by spawned worker processes

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hydra_hog::telemetry::sensors::mean_celsius;
use hydra_hog::telemetry::{HostProbe, SysinfoProbe, SysinfoSensors, TemperatureSource};
use hydra_hog::worker::{run_load_generator, ExecSpawner, SharedFlag};
use hydra_hog::{EngineSettings, Hog, RunConfig, RunPhase, RunReport};

#[derive(Parser, Debug)]
#[command(name = "hydra-hog", version, about = "CPU/RAM stress engine with auto-respawning workers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a stress test
    Run(RunArgs),
    /// Print host usage and temperature sensors
    Probe,
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// CPU worker processes (defaults to the number of logical CPUs)
    #[arg(short, long)]
    workers: Option<u32>,

    /// RAM to hold during the run, in MB (0 disables memory pressure)
    #[arg(long, default_value_t = 1024)]
    ram_mb: u64,

    /// Target duration in seconds, excluding time spent paused
    #[arg(short, long, default_value_t = 60)]
    duration: u64,

    /// Fraction of each work cycle spent burning CPU
    #[arg(long, default_value_t = 0.9)]
    duty_cycle: f64,

    /// Disable auto-respawn of killed workers
    #[arg(long)]
    no_hydra: bool,

    /// Write the final report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Override the supervisor tick interval
    #[arg(long)]
    tick_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct WorkerArgs {
    #[arg(long)]
    id: u32,
    #[arg(long)]
    duty_cycle: f64,
    #[arg(long)]
    pause_flag: PathBuf,
    #[arg(long)]
    stop_flag: PathBuf,
}

fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Logs go to stderr; stdout carries the run log
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hydra_hog=info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Worker(args) => run_worker(args),
        Command::Probe => probe(),
        Command::Run(args) => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            runtime.block_on(run(args))
        }
    }
}

fn run_worker(args: WorkerArgs) -> Result<()> {
    let pause = SharedFlag::open(&args.pause_flag)
        .with_context(|| format!("Failed to open pause flag {}", args.pause_flag.display()))?;
    let stop = SharedFlag::open(&args.stop_flag)
        .with_context(|| format!("Failed to open stop flag {}", args.stop_flag.display()))?;

    info!(worker = args.id, duty_cycle = args.duty_cycle, "worker started");
    run_load_generator(args.duty_cycle, &stop, &pause);
    info!(worker = args.id, "worker stopping");
    Ok(())
}

fn probe() -> Result<()> {
    let host = SysinfoProbe::new();
    // CPU usage needs two refreshes some time apart
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    let snapshot = host.snapshot();

    println!("CPU: {:.1}%", snapshot.cpu_percent);
    println!(
        "RAM: {:.1}% of {} MB ({} MB available)",
        snapshot.ram_percent, snapshot.total_memory_mb, snapshot.available_memory_mb
    );

    match SysinfoSensors::new().read_temperatures() {
        Ok(readings) if readings.is_empty() => println!("Temperature sensors not available"),
        Ok(readings) => {
            for r in readings {
                println!("  {:<32} {:>6.1}°C", r.sensor, r.celsius);
            }
        }
        Err(e) => println!("{}", e),
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let workers = match args.workers {
        Some(n) => n,
        None => std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1),
    };
    let config = RunConfig::new(workers, args.ram_mb, args.duration, args.duty_cycle, !args.no_hydra)
        .context("Invalid run configuration")?;

    let mut settings = EngineSettings::from_env().context("Invalid HYDRA_HOG_* environment")?;
    if let Some(ms) = args.tick_ms {
        settings.tick_interval = Duration::from_millis(ms.max(1));
    }

    let spawner = ExecSpawner::current_exe().context("Cannot locate own executable to spawn workers")?;
    let hog = Hog::new(settings, Arc::new(spawner));

    println!("\n{}", "═".repeat(60));
    println!("🐗 HydraHog v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));
    println!("Commands: 'p' pause/resume | 's' stop | Ctrl-C stop");
    println!("{}\n", "═".repeat(60));

    let report = drive(hog, config).await?;

    if let (Some(path), Some(report)) = (args.report_json, report) {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

/// Ticks the supervisor until the run ends, multiplexing stdin commands
/// and Ctrl-C.
async fn drive(mut hog: Hog, config: RunConfig) -> Result<Option<RunReport>> {
    if !hog.start(config) {
        print_log(&mut hog);
        bail!("Stress run did not start");
    }
    print_log(&mut hog);

    let mut ticker = tokio::time::interval(hog.settings().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => hog.tick(),
            res = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = res {
                    warn!("Ctrl-C handler failed: {}", e);
                }
                info!("interrupt received, stopping run");
                hog.stop();
            }
            line = commands.recv(), if stdin_open => match line {
                Some(cmd) => match cmd.trim() {
                    "p" | "pause" => {
                        hog.toggle_pause();
                    }
                    "s" | "stop" => {
                        hog.stop();
                    }
                    "" => {}
                    other => println!("Unknown command '{}' (p = pause/resume, s = stop)", other),
                },
                None => stdin_open = false,
            },
        }

        print_log(&mut hog);
        if hog.phase() == RunPhase::Idle {
            break;
        }
        print_status(&hog);
    }

    Ok(hog.last_report().cloned())
}

/// Stdin is read on a plain thread so a pending read never holds up exit.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_log(hog: &mut Hog) {
    for entry in hog.drain_log() {
        println!("{}", entry);
    }
}

fn print_status(hog: &Hog) {
    let stats = hog.stats();
    let temp = mean_celsius(&stats.current_temps)
        .map(|t| format!("{:.1}°C", t))
        .unwrap_or_else(|| "N/A".to_string());
    println!(
        "{}: {:.0}s / {}s | {} | CPU {:.0}% | RAM {:.0}% | Workers {}",
        stats.phase,
        stats.effective_elapsed_secs,
        stats.target_duration_secs.unwrap_or(0),
        temp,
        stats.cpu_percent,
        stats.ram_percent,
        stats.live_workers
    );
}
