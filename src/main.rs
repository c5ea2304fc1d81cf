//! IMU Logger CLI
//!
//! Fixed-rate IMU capture to Gyroflow-compatible CSV logs.

use clap::{Parser, Subcommand};
use imu_logger::{
    config::Config,
    core::CalibrationStore,
    diagnostics::create_shared_stats_with_persistence,
    inspect_log, FsStorage, MemoryStorage, SessionController, SimulatedSensor, StorageWriter,
    SystemTimeFix, Uptime, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Pause between main loop passes.
const POLL_INTERVAL: Duration = Duration::from_micros(100);

#[derive(Parser)]
#[command(name = "imu-logger")]
#[command(version = VERSION)]
#[command(about = "Fixed-rate IMU data logger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session until Ctrl+C or the duration elapses
    Record {
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Description written to the log header
        #[arg(long)]
        description: Option<String>,

        /// Amplitude of simulated sensor noise
        #[arg(long, default_value = "0.0")]
        noise: f32,
    },

    /// Measure and store sensor offsets (device must be at rest and level)
    Calibrate {
        /// Number of samples to average
        #[arg(long)]
        samples: Option<usize>,
    },

    /// Show logger statistics and calibration
    Status,

    /// Show configuration
    Config,

    /// Print the header new logs will start with
    Header,

    /// Check a finished log file
    Verify {
        /// Log file to check
        file: PathBuf,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Record {
            duration,
            description,
            noise,
        } => {
            cmd_record(duration, description, noise);
        }
        Commands::Calibrate { samples } => {
            cmd_calibrate(samples);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Header => {
            cmd_header();
        }
        Commands::Verify { file } => {
            cmd_verify(&file);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_record(duration: Option<u64>, description: Option<String>, noise: f32) {
    println!("IMU Logger v{VERSION}");
    println!();

    let mut config = load_config();
    if let Some(description) = description {
        config.description = description;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let storage = match FsStorage::new(&config.log_dir) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let sensor = SimulatedSensor::stationary().with_noise(noise);
    let writer = StorageWriter::new(storage, config.log_header());
    let mut controller =
        SessionController::new(sensor, writer, SystemTimeFix, config.session_settings())
            .with_calibration_store(CalibrationStore::new(&config.calibration_path))
            .with_stats(stats.clone());

    println!("Logger ID: {}", config.logger_id);
    println!("Sample rate: {} Hz", config.log_header().sample_rate_hz());
    println!("Sync interval: {}s", config.sync_interval.as_secs());
    println!("Offsets: {}", controller.offsets().to_line().trim_end());

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let uptime = Uptime::new();
    if let Err(e) = controller.clock_mut().start() {
        eprintln!("Error starting sample clock: {e}");
        std::process::exit(1);
    }

    let path = match controller.start(uptime.micros()) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    println!("Recording to {:?}", config.log_dir.join(&path));
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let limit_us = duration.map(|secs| secs.saturating_mul(1_000_000));
    let mut next_report_us = 1_000_000;

    // Stop is only observed at the top of the loop
    while running.load(Ordering::SeqCst) {
        let now = uptime.micros();
        if limit_us.is_some_and(|limit| now >= limit) {
            break;
        }

        controller.poll(now);

        if now >= next_report_us {
            let snapshot = stats.stats();
            println!(
                "[{:>5}s] {} samples | {:.2} km/h | {} ticks lost",
                now / 1_000_000,
                snapshot.samples_written,
                controller.metrics().speed_kmh(),
                snapshot.ticks_coalesced
            );
            next_report_us += 1_000_000;
        }

        thread::sleep(POLL_INTERVAL);
    }

    println!();
    println!("Stopping...");
    let summary = controller.stop(uptime.micros());
    controller.clock_mut().stop();

    if let Some(summary) = summary {
        println!("File: {:?}", config.log_dir.join(&summary.path));
        println!("Samples: {}", summary.samples);
        println!("Bytes written: {}", summary.bytes_written);
        match summary.verified_size {
            Some(size) if summary.is_verified() => println!("Verified: {size} bytes ✓"),
            Some(size) => println!(
                "Verified: {size} bytes, expected {} ✗",
                summary.bytes_written
            ),
            None => println!("Verified: file could not be reopened ✗"),
        }
        println!("Peak speed: {:.2} km/h", summary.peak_speed_kmh);
    }

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

fn cmd_calibrate(samples: Option<usize>) {
    let mut config = load_config();
    if let Some(samples) = samples {
        config.calibration_samples = samples;
    }

    // Calibration never opens a log, so it does not depend on the log medium
    let writer = StorageWriter::new(MemoryStorage::new(), config.log_header());
    let mut controller = SessionController::new(
        SimulatedSensor::stationary(),
        writer,
        SystemTimeFix,
        config.session_settings(),
    )
    .with_calibration_store(CalibrationStore::new(&config.calibration_path));

    println!(
        "Calibrating with {} samples. Keep the device still and level...",
        config.calibration_samples
    );

    match controller.calibrate() {
        Ok(report) => {
            let g = report.offsets.gyro_bias;
            let a = report.offsets.accel_bias;
            println!();
            println!("Gyro bias (deg/s): {:.4}, {:.4}, {:.4}", g.x, g.y, g.z);
            println!("Accel bias (g):    {:.5}, {:.5}, {:.5}", a.x, a.y, a.z);
            println!(
                "Gyro noise (deg/s): {:.4}, {:.4}, {:.4}",
                report.gyro_noise.x, report.gyro_noise.y, report.gyro_noise.z
            );
            println!(
                "Accel noise (g):    {:.5}, {:.5}, {:.5}",
                report.accel_noise.x, report.accel_noise.y, report.accel_noise.z
            );
            println!();
            println!("Saved to {:?}", config.calibration_path);
        }
        Err(e) => {
            eprintln!("Calibration failed: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_status() {
    let config = load_config();

    println!("IMU Logger Status");
    println!("=================");
    println!();

    println!("Configuration:");
    println!("  Log directory: {:?}", config.log_dir);
    println!("  Sample rate: {} Hz", config.log_header().sample_rate_hz());
    println!("  Sync interval: {}s", config.sync_interval.as_secs());
    println!();

    let store = CalibrationStore::new(&config.calibration_path);
    match store.load() {
        Some(offsets) => println!("Calibration: {}", offsets.to_line().trim_end()),
        None => println!("Calibration: none (zero offsets)"),
    }

    let logs = std::fs::read_dir(&config.log_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "csv"))
                .count()
        })
        .unwrap_or(0);
    println!("Log files: {logs}");
    println!();

    if config.stats_path().exists() {
        let stats = create_shared_stats_with_persistence(config.stats_path());
        println!("{}", stats.summary());
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_header() {
    let config = load_config();
    print!("{}", config.log_header().render());
}

fn cmd_verify(file: &Path) {
    let content = match std::fs::read(file) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading {file:?}: {e}");
            std::process::exit(1);
        }
    };

    let text = String::from_utf8_lossy(&content);
    let report = inspect_log(&text);

    println!("File: {file:?} ({} bytes)", content.len());
    println!("Header: {}", if report.header_ok { "ok ✓" } else { "invalid ✗" });
    println!("Rows: {}", report.rows);
    println!("Malformed rows: {}", report.malformed_rows);
    println!("Non-increasing timestamps: {}", report.non_monotonic);
    println!("Torn final row: {}", report.trailing_partial);
    if let Some(interval) = report.mean_interval_us() {
        println!("Mean interval: {interval:.1} µs");
    }

    if !report.is_clean() {
        std::process::exit(1);
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
