//! Demonstration of a short IMU recording session.
//!
//! This example shows how to:
//! 1. Build a controller from a sensor, a storage backend and a time source
//! 2. Run the sample clock on a timer thread
//! 3. Poll the main loop and watch the speed estimate
//! 4. Stop, verify and inspect the finished log
//!
//! Run with: cargo run --example record_demo
//!
//! Logs are written to a fresh directory under the system temp dir.

use std::time::Duration;

use imu_logger::{
    inspect_log, FsStorage, LogHeader, RawReading, SessionController, SessionSettings,
    SimulatedSensor, StorageWriter, SystemTimeFix, Uptime, Vec3,
};

fn main() {
    println!("IMU Logger - Record Demo");
    println!("========================");
    println!();

    let dir = std::env::temp_dir().join(format!("imu-logger-demo-{}", uuid::Uuid::new_v4()));
    let storage = FsStorage::new(&dir).expect("Failed to create log directory");

    // Accelerate gently along X for the first half of the run
    let mut script = vec![RawReading::new(Vec3::ZERO, Vec3::new(0.05, 0.0, 1.0)); 1000];
    script.extend(vec![
        RawReading::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        1000
    ]);
    let sensor = SimulatedSensor::scripted(script).with_noise(0.002).with_seed(7);

    let writer = StorageWriter::new(storage, LogHeader::new("demo", "record demo", 1000));
    let mut controller =
        SessionController::new(sensor, writer, SystemTimeFix, SessionSettings::default());

    let uptime = Uptime::new();
    controller
        .clock_mut()
        .start()
        .expect("Failed to start sample clock");
    let path = controller
        .start(uptime.micros())
        .expect("Failed to start recording");
    println!("Recording to {:?} for 3 seconds...", dir.join(&path));
    println!();

    let mut next_report_us = 500_000;
    while uptime.micros() < 3_000_000 {
        let now = uptime.micros();
        controller.poll(now);

        if now >= next_report_us {
            println!(
                "[{:.1}s] speed {:.3} km/h",
                now as f64 / 1_000_000.0,
                controller.metrics().speed_kmh()
            );
            next_report_us += 500_000;
        }
        std::thread::sleep(Duration::from_micros(100));
    }

    let summary = controller
        .stop(uptime.micros())
        .expect("Session should be recording");
    controller.clock_mut().stop();

    println!();
    println!("Session {}", summary.session_id);
    println!("  Samples: {}", summary.samples);
    println!("  Bytes: {}", summary.bytes_written);
    println!("  Verified: {}", summary.is_verified());
    println!("  Peak speed: {:.3} km/h", summary.peak_speed_kmh);
    println!();

    let text = std::fs::read_to_string(dir.join(&summary.path)).expect("Failed to read log");
    let report = inspect_log(&text);
    println!("Log inspection:");
    println!("  Header ok: {}", report.header_ok);
    println!("  Rows: {}", report.rows);
    if let Some(interval) = report.mean_interval_us() {
        println!("  Mean interval: {interval:.1} µs");
    }
    println!();
    println!("{}", controller.stats().summary());
}
