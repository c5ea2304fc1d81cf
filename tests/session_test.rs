//! Integration tests for recording sessions, driven through the public API.

use chrono::{TimeZone, Utc};
use imu_logger::{
    inspect_log, CalibrationOffsets, CalibrationStore, FixedTimeFix, FsStorage, LogHeader,
    LoggerError, MemoryStorage, NoTimeFix, RawReading, SessionController, SessionSettings,
    SessionState, SimulatedSensor, StorageWriter, Uptime, Vec3,
};
use std::path::PathBuf;
use std::time::Duration;

const EXPECTED_HEADER: &str = "GYROFLOW IMU LOG\n\
    version,1.3\n\
    id,bench-logger\n\
    description,integration\n\
    orientation,YxZ\n\
    sample_rate,1000\n\
    tscale,0.000001\n\
    gscale,0.01745329252\n\
    ascale,1\n\
    t,gx,gy,gz,ax,ay,az\n";

fn header() -> LogHeader {
    LogHeader::new("bench-logger", "integration", 1000)
}

fn memory_controller(
    storage: MemoryStorage,
    settings: SessionSettings,
) -> SessionController<SimulatedSensor, MemoryStorage, NoTimeFix> {
    let writer = StorageWriter::new(storage, header());
    SessionController::new(SimulatedSensor::stationary(), writer, NoTimeFix, settings)
}

fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("imu-logger-{label}-{}", uuid::Uuid::new_v4()))
}

fn text(storage: &MemoryStorage, path: &PathBuf) -> String {
    String::from_utf8(storage.contents(path).expect("log exists")).expect("log is utf-8")
}

#[test]
fn test_end_to_end_session() {
    let storage = MemoryStorage::new();
    let mut controller = memory_controller(storage.clone(), SessionSettings::default());

    let path = controller.start(0).unwrap();
    for i in 1..=2500u64 {
        assert!(controller.step(i * 1000));
    }
    let summary = controller.stop(2_501_000).unwrap();

    let log = text(&storage, &path);
    assert!(log.starts_with(EXPECTED_HEADER));

    let report = inspect_log(&log);
    assert!(report.is_clean());
    assert_eq!(report.rows, 2500);
    assert!(!report.trailing_partial);
    assert_eq!(report.first_timestamp_us, Some(1000));
    assert_eq!(report.last_timestamp_us, Some(2_500_000));
    assert_eq!(report.mean_interval_us(), Some(1000.0));

    let rows: Vec<&str> = log.lines().skip(10).collect();
    assert_eq!(rows[0], "1000,0.000,0.000,0.000,0.0000,0.0000,1.0000");

    assert_eq!(summary.samples, 2500);
    assert!(summary.is_verified());
    assert_eq!(summary.verified_size, Some(log.len() as u64));
}

#[test]
fn test_overrun_ticks_are_coalesced() {
    let storage = MemoryStorage::new();
    let mut controller = memory_controller(storage, SessionSettings::default());
    controller.start(0).unwrap();

    // Three fires before the main loop gets around to polling
    controller.clock().fire();
    controller.clock().fire();
    controller.clock().fire();
    assert!(controller.poll(1000));
    assert!(!controller.poll(1100));

    let stats = controller.stats().stats();
    assert_eq!(stats.ticks_raised, 3);
    assert_eq!(stats.ticks_processed, 1);
    assert_eq!(stats.ticks_coalesced, 2);
    assert!(stats.ticks_raised >= stats.ticks_processed);

    let summary = controller.stop(2000).unwrap();
    assert_eq!(summary.samples, 1);
}

#[test]
fn test_buffer_conservation() {
    let storage = MemoryStorage::new();
    let settings = SessionSettings {
        buffer_capacity: 256,
        low_water: 80,
        ..SessionSettings::default()
    };
    let mut controller = memory_controller(storage.clone(), settings);

    let path = controller.start(0).unwrap();
    for i in 1..=300u64 {
        controller.step(i * 1000);
    }
    controller.stop(301_000).unwrap();

    let stats = controller.stats().stats();
    assert!(stats.flushes > 10);
    assert_eq!(stats.bytes_appended, stats.bytes_flushed);
    assert_eq!(stats.records_dropped, 0);

    let log = text(&storage, &path);
    assert_eq!(log.len() as u64, EXPECTED_HEADER.len() as u64 + stats.bytes_appended);
    assert_eq!(inspect_log(&log).rows, 300);
}

#[test]
fn test_new_session_never_overwrites() {
    let storage = MemoryStorage::new()
        .with_file("00001.csv", b"one")
        .with_file("00002.csv", b"two")
        .with_file("00003.csv", b"three");
    let mut controller = memory_controller(storage.clone(), SessionSettings::default());

    let path = controller.start(0).unwrap();
    assert_eq!(path, PathBuf::from("00004.csv"));
    controller.stop(1000);

    assert_eq!(storage.contents("00001.csv").unwrap(), b"one");
    assert_eq!(storage.contents("00002.csv").unwrap(), b"two");
    assert_eq!(storage.contents("00003.csv").unwrap(), b"three");

    // The next session takes the next free index
    assert_eq!(controller.start(2000).unwrap(), PathBuf::from("00005.csv"));
}

#[test]
fn test_new_session_fills_gap() {
    let storage = MemoryStorage::new()
        .with_file("00001.csv", b"one")
        .with_file("00003.csv", b"three");
    let mut controller = memory_controller(storage.clone(), SessionSettings::default());

    assert_eq!(controller.start(0).unwrap(), PathBuf::from("00002.csv"));
    assert_eq!(storage.contents("00003.csv").unwrap(), b"three");
}

#[test]
fn test_stop_is_idempotent() {
    let storage = MemoryStorage::new();
    let mut controller = memory_controller(storage.clone(), SessionSettings::default());

    assert!(controller.stop(0).is_none());

    controller.start(0).unwrap();
    controller.step(1000);
    assert!(controller.stop(2000).is_some());
    let after_first = storage.contents("00001.csv").unwrap();

    assert!(controller.stop(3000).is_none());
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(storage.contents("00001.csv").unwrap(), after_first);
    assert_eq!(storage.file_names().len(), 1);
    assert_eq!(controller.stats().stats().sessions_completed, 1);
}

#[test]
fn test_power_loss_bounded_by_sync_interval() {
    let storage = MemoryStorage::new();
    let mut controller = memory_controller(storage.clone(), SessionSettings::default());

    let path = controller.start(0).unwrap();
    for i in 1..=2500u64 {
        controller.step(i * 1000);
    }
    storage.power_loss();

    let log = text(&storage, &path);
    let report = inspect_log(&log);

    // Only complete rows survive, and nothing older than one interval is lost
    assert!(report.is_clean());
    assert!(!report.trailing_partial);
    let last = report.last_timestamp_us.unwrap();
    assert!(last >= 2_500_000 - 1_000_000);
    assert_eq!(report.rows as u64, last / 1000);
}

#[test]
fn test_open_failure_stays_idle() {
    let storage = MemoryStorage::new();
    storage.set_fail_open(true);
    let mut controller = memory_controller(storage.clone(), SessionSettings::default());

    match controller.start(0) {
        Err(LoggerError::OpenFailure { path, .. }) => {
            assert_eq!(path, Some(PathBuf::from("00001.csv")))
        }
        other => panic!("expected open failure, got {other:?}"),
    }
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(controller.clock().is_enabled());

    // Ticks keep flowing but nothing is written
    controller.step(1000);
    assert_eq!(controller.stats().stats().samples_written, 0);

    storage.set_fail_open(false);
    assert_eq!(controller.start(2000).unwrap(), PathBuf::from("00001.csv"));
}

#[test]
fn test_start_while_recording_rejected() {
    let storage = MemoryStorage::new();
    let mut controller = memory_controller(storage.clone(), SessionSettings::default());

    let path = controller.start(0).unwrap();
    controller.step(1000);
    assert!(matches!(
        controller.start(1500),
        Err(LoggerError::AlreadyRecording)
    ));
    controller.step(2000);

    let summary = controller.stop(3000).unwrap();
    assert_eq!(summary.path, path);
    assert_eq!(summary.samples, 2);
    assert_eq!(storage.file_names(), vec![path]);
}

#[test]
fn test_short_writes_are_counted_not_retried() {
    let storage = MemoryStorage::new();
    let settings = SessionSettings {
        buffer_capacity: 256,
        low_water: 80,
        ..SessionSettings::default()
    };
    let mut controller = memory_controller(storage.clone(), settings);

    let path = controller.start(0).unwrap();
    storage.set_max_write(Some(100));
    for i in 1..=50u64 {
        controller.step(i * 1000);
    }
    let summary = controller.stop(51_000).unwrap();

    let stats = controller.stats().stats();
    assert!(stats.short_writes > 0);
    assert_eq!(summary.short_writes, stats.short_writes);
    assert!(stats.bytes_flushed < stats.bytes_appended);
    // The session kept going and closed cleanly
    assert_eq!(summary.samples, 50);
    assert!(summary.is_verified());

    // Each torn write leaves one short fragment on its own line; rows that
    // follow it are intact
    let log = text(&storage, &path);
    let report = inspect_log(&log);
    assert!(report.header_ok);
    assert!(!report.trailing_partial);
    assert_eq!(report.non_monotonic, 0);
    assert_eq!(report.malformed_rows as u64, stats.short_writes);
    assert!(report.rows > 0 && report.rows < 50);
    assert!(log
        .lines()
        .skip(10)
        .all(|line| line.split(',').count() <= 7));
}

#[test]
fn test_calibration_does_not_need_log_storage() {
    let dir = temp_dir("cal-no-media");
    let store = CalibrationStore::new(dir.join("calibration.txt"));
    let reading = RawReading::new(Vec3::new(0.2, 0.0, -0.1), Vec3::new(0.0, 0.02, 1.0));

    let storage = MemoryStorage::new();
    storage.set_fail_open(true);
    let writer = StorageWriter::new(storage.clone(), header());
    let mut controller = SessionController::new(
        SimulatedSensor::fixed(reading),
        writer,
        NoTimeFix,
        SessionSettings::default(),
    )
    .with_calibration_store(store.clone());

    assert!(matches!(
        controller.start(0),
        Err(LoggerError::OpenFailure { .. })
    ));

    let report = controller.calibrate().unwrap();
    assert!((report.offsets.gyro_bias.x - 0.2).abs() < 1e-6);
    let saved = store.load().unwrap();
    assert!((saved.accel_bias.y - report.offsets.accel_bias.y).abs() < 1e-6);
    assert!(storage.file_names().is_empty());
}

#[test]
fn test_calibration_persists_and_applies() {
    let dir = temp_dir("cal");
    let store = CalibrationStore::new(dir.join("calibration.txt"));
    let reading = RawReading::new(Vec3::new(0.4, -0.2, 0.1), Vec3::new(0.01, -0.03, 1.02));

    let storage = MemoryStorage::new();
    let writer = StorageWriter::new(storage.clone(), header());
    let mut controller = SessionController::new(
        SimulatedSensor::fixed(reading),
        writer,
        NoTimeFix,
        SessionSettings::default(),
    )
    .with_calibration_store(store.clone());
    assert_eq!(*controller.offsets(), CalibrationOffsets::zero());

    let report = controller.calibrate().unwrap();
    assert_eq!(report.samples, 500);
    assert!((report.offsets.accel_bias.z - 0.02).abs() < 1e-6);
    assert!((report.offsets.gyro_bias.x - 0.4).abs() < 1e-6);

    // Round trip through the file
    let loaded = store.load().unwrap();
    assert!((loaded.gyro_bias.y - report.offsets.gyro_bias.y).abs() < 1e-6);
    assert!((loaded.accel_bias.z - report.offsets.accel_bias.z).abs() < 1e-6);

    // A fresh controller picks the offsets up at startup
    let restarted = SessionController::new(
        SimulatedSensor::fixed(reading),
        StorageWriter::new(MemoryStorage::new(), header()),
        NoTimeFix,
        SessionSettings::default(),
    )
    .with_calibration_store(store);
    assert_eq!(*restarted.offsets(), loaded);

    // Calibrated rows of a resting device read zero rate and 1 g
    let path = controller.start(0).unwrap();
    controller.step(1000);
    controller.stop(2000);
    assert!(text(&storage, &path).ends_with("1000,0.000,0.000,0.000,0.0000,0.0000,1.0000\n"));
}

#[test]
fn test_malformed_calibration_falls_back_to_zero() {
    let dir = temp_dir("badcal");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("calibration.txt");
    std::fs::write(&path, "0.1,0.2,oops,0.4,0.5,0.6\n").unwrap();

    let controller = memory_controller(MemoryStorage::new(), SessionSettings::default())
        .with_calibration_store(CalibrationStore::new(&path));
    assert_eq!(*controller.offsets(), CalibrationOffsets::zero());
}

#[test]
fn test_time_fix_anchors_session() {
    let anchor = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let storage = MemoryStorage::new();
    let writer = StorageWriter::new(storage, header());
    let mut controller = SessionController::new(
        SimulatedSensor::stationary(),
        writer,
        FixedTimeFix(anchor),
        SessionSettings::default(),
    );

    controller.start(5000).unwrap();
    let summary = controller.stop(6000).unwrap();
    assert_eq!(summary.utc_start, Some(anchor));
    assert_eq!(summary.started_at_us, 5000);
    assert_eq!(summary.duration_us(), 1000);
    assert_eq!(
        summary.utc_stop(),
        Some(anchor + chrono::Duration::milliseconds(1))
    );
}

#[test]
fn test_filesystem_session_with_timer_thread() {
    let dir = temp_dir("fs");
    let storage = FsStorage::new(&dir).unwrap();
    let writer = StorageWriter::new(storage, header());
    let mut controller = SessionController::new(
        SimulatedSensor::stationary().with_noise(0.01),
        writer,
        NoTimeFix,
        SessionSettings::default(),
    );

    let uptime = Uptime::new();
    controller.clock_mut().start().unwrap();
    controller.start(uptime.micros()).unwrap();
    while uptime.micros() < 200_000 {
        controller.poll(uptime.micros());
        std::thread::sleep(Duration::from_micros(100));
    }
    let summary = controller.stop(uptime.micros()).unwrap();
    controller.clock_mut().stop();

    let stats = controller.stats().stats();
    assert!(stats.ticks_raised >= stats.ticks_processed);
    assert!(summary.samples > 0);
    assert!(summary.is_verified());

    let log = std::fs::read_to_string(dir.join(&summary.path)).unwrap();
    assert!(log.starts_with(EXPECTED_HEADER));
    let report = inspect_log(&log);
    assert!(report.is_clean());
    assert_eq!(report.rows as u64, summary.samples);
}
