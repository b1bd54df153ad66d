//! Integration tests for the marker sweep
//!
//! These tests verify the acquisition sequencer correctly:
//! - Aborts without exporting when the span cannot be read
//! - Tolerates failed points, setup writes and bandwidth reads
//! - Restores continuous sweep exactly once
//! - Exports to the first free numbered file

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::PathBuf;

use scpi_ctl::acquisition::{marker_sweep, SweepOutcome, TraceResult};
use scpi_ctl::constants::scpi;
use scpi_ctl::export::{CsvTraceExporter, TraceExporter};
use scpi_ctl::session::{SessionConfig, SessionManager};
use scpi_ctl::simulated::SimulatedAnalyzer;
use scpi_ctl::{Error, Result};

/// Exporter that only counts how often it was asked to export
#[derive(Default)]
struct CountingExporter {
    calls: Cell<usize>,
    fail: bool,
}

impl TraceExporter for CountingExporter {
    fn export(&self, _trace: &TraceResult) -> Result<PathBuf> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(Error::Export {
                path: PathBuf::from("unwritable.csv"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        Ok(PathBuf::from("trace000.csv"))
    }
}

fn open(analyzer: SimulatedAnalyzer) -> SessionManager<SimulatedAnalyzer> {
    let mut manager = SessionManager::discover(analyzer, SessionConfig::default()).unwrap();
    manager.open(0).unwrap();
    manager
}

fn sweep(
    manager: &mut SessionManager<SimulatedAnalyzer>,
    points: u32,
    exporter: &impl TraceExporter,
) -> SweepOutcome {
    let mut exchange = manager.exchange().unwrap();
    marker_sweep(&mut exchange, points, exporter)
}

fn completed(outcome: SweepOutcome) -> (TraceResult, Option<PathBuf>) {
    match outcome {
        SweepOutcome::Completed { trace, saved_to } => (trace, saved_to),
        SweepOutcome::Aborted(err) => panic!("sweep aborted: {err}"),
    }
}

/// Test a clean sweep over the default span
#[test]
fn test_full_sweep() {
    let mut manager = open(SimulatedAnalyzer::new());
    let exporter = CountingExporter::default();

    let (trace, saved_to) = completed(sweep(&mut manager, 101, &exporter));

    assert_eq!(saved_to, Some(PathBuf::from("trace000.csv")));
    assert_eq!(exporter.calls.get(), 1);
    assert_eq!(trace.point_count(), 101);
    assert!(trace.is_complete());
    assert_eq!(trace.start_hz, 1.0e9);
    assert_eq!(trace.stop_hz, 2.0e9);
    assert_eq!(trace.rbw_hz, 1.0e6);
    assert_eq!(trace.vbw_hz, 3.0e6);
    assert_eq!(trace.points[0].frequency_hz, 1.0e9);
    assert_eq!(trace.points[100].frequency_hz, 2.0e9);

    // carrier in the middle of the span
    let peak = &trace.points[50];
    assert_eq!(peak.frequency_hz, 1.5e9);
    assert!((peak.amplitude_dbm - -20.0).abs() < 1e-3);

    let analyzer = manager.transport();
    assert!(analyzer.is_sweeping_continuously());
    assert_eq!(analyzer.count_writes(scpi::CONTINUOUS_OFF), 1);
    assert_eq!(analyzer.count_writes(scpi::CONTINUOUS_ON), 1);
    assert_eq!(analyzer.count_writes(scpi::MARKER_Y), 101);
    assert_eq!(analyzer.count_writes(":CALC:MARK1:X 1010000000"), 1);
}

/// Test that setup writes go out in order before the sweep starts
#[test]
fn test_setup_order() {
    let mut manager = open(SimulatedAnalyzer::new());
    completed(sweep(&mut manager, 21, &CountingExporter::default()));

    let writes = manager.transport().writes();
    let setup_start = writes
        .iter()
        .position(|w| w == scpi::CONTINUOUS_OFF)
        .unwrap();
    assert_eq!(
        writes[setup_start..setup_start + 7],
        [
            scpi::CONTINUOUS_OFF,
            scpi::MARKERS_OFF,
            scpi::MARKER_MODE_POSITION,
            scpi::MARKER_FUNCTION_OFF,
            scpi::MARKER_COUNT_ON,
            scpi::RESOLUTION_BANDWIDTH,
            scpi::VIDEO_BANDWIDTH,
        ]
    );
    assert_eq!(writes.last().map(String::as_str), Some(scpi::CONTINUOUS_ON));
}

/// Test that failed points get the sentinel and the sweep still finishes
#[test]
fn test_partial_failures() {
    let analyzer = SimulatedAnalyzer::new().with_failing_marker_reads([5, 42]);
    let mut manager = open(analyzer);
    let exporter = CountingExporter::default();

    let (trace, _) = completed(sweep(&mut manager, 101, &exporter));

    assert_eq!(trace.point_count(), 101);
    assert_eq!(trace.failed, vec![5, 42]);
    for (index, point) in trace.points.iter().enumerate() {
        if index == 5 || index == 42 {
            assert!(point.amplitude_dbm.is_nan(), "point {index} should be missing");
        } else {
            assert!(point.amplitude_dbm.is_finite(), "point {index} should be measured");
        }
    }
    assert_eq!(exporter.calls.get(), 1);
    assert_eq!(manager.transport().count_writes(scpi::CONTINUOUS_ON), 1);
    assert!(manager.transport().is_sweeping_continuously());
}

/// Test that a non-numeric frequency aborts without touching the instrument or exporting
#[test]
fn test_unreadable_frequency_aborts() {
    let analyzer = SimulatedAnalyzer::new().with_frequency_reply("ERR");
    let mut manager = open(analyzer);
    let exporter = CountingExporter::default();

    let outcome = sweep(&mut manager, 101, &exporter);

    assert!(matches!(outcome, SweepOutcome::Aborted(Error::Acquisition(_))));
    assert_eq!(exporter.calls.get(), 0);
    assert_eq!(manager.transport().count_writes(scpi::CONTINUOUS_OFF), 0);
    assert_eq!(manager.transport().count_writes(scpi::MARKER_Y), 0);
}

/// Test that a span reply cut short by the read budget aborts instead of sweeping a wrong span
#[test]
fn test_truncated_frequency_aborts() {
    let mut manager = open(SimulatedAnalyzer::new());
    manager.set_read_budget(4).unwrap();
    let exporter = CountingExporter::default();

    match sweep(&mut manager, 21, &exporter) {
        SweepOutcome::Aborted(Error::Acquisition(reason)) => {
            assert!(reason.contains("cut off after 4 bytes"), "{reason}");
        }
        SweepOutcome::Aborted(err) => panic!("unexpected error: {err}"),
        SweepOutcome::Completed { trace, .. } => {
            panic!("sweep completed over {} - {} Hz", trace.start_hz, trace.stop_hz)
        }
    }
    assert_eq!(exporter.calls.get(), 0);
    assert_eq!(manager.transport().count_writes(scpi::CONTINUOUS_OFF), 0);
    assert_eq!(manager.transport().count_writes(scpi::MARKER_Y), 0);
}

/// Test that a negative start frequency aborts
#[test]
fn test_negative_start_aborts() {
    let analyzer = SimulatedAnalyzer::new().with_span(-5.0e6, 1.0e9);
    let mut manager = open(analyzer);
    let exporter = CountingExporter::default();

    assert!(matches!(
        sweep(&mut manager, 101, &exporter),
        SweepOutcome::Aborted(Error::Acquisition(_))
    ));
    assert_eq!(exporter.calls.get(), 0);
}

/// Test that unreadable bandwidths are recorded as zero without aborting
#[test]
fn test_unreadable_bandwidth_is_tolerated() {
    let analyzer = SimulatedAnalyzer::new().with_bandwidth_reply("AUTO");
    let mut manager = open(analyzer);

    let (trace, _) = completed(sweep(&mut manager, 21, &CountingExporter::default()));

    assert_eq!(trace.rbw_hz, 0.0);
    assert_eq!(trace.vbw_hz, 0.0);
    assert!(trace.is_complete());
}

/// Test that failed setup writes do not stop the sweep
#[test]
fn test_failed_setup_write_is_tolerated() {
    let analyzer = SimulatedAnalyzer::new().with_failing_write(scpi::MARKERS_OFF);
    let mut manager = open(analyzer);

    let (trace, _) = completed(sweep(&mut manager, 21, &CountingExporter::default()));
    assert_eq!(trace.point_count(), 21);
    assert_eq!(manager.transport().count_writes(scpi::CONTINUOUS_ON), 1);
}

/// Test that failed marker moves mark every point as missing but still restore
#[test]
fn test_failed_marker_moves() {
    let analyzer = SimulatedAnalyzer::new().with_failing_write(scpi::MARKER_X);
    let mut manager = open(analyzer);

    let (trace, _) = completed(sweep(&mut manager, 21, &CountingExporter::default()));
    assert_eq!(trace.failed.len(), 21);
    assert_eq!(manager.transport().count_writes(scpi::MARKER_Y), 0);
    assert_eq!(manager.transport().count_writes(scpi::CONTINUOUS_ON), 1);
}

/// Test that an export failure still returns the captured trace
#[test]
fn test_export_failure_keeps_trace() {
    let mut manager = open(SimulatedAnalyzer::new());
    let exporter = CountingExporter {
        fail: true,
        ..CountingExporter::default()
    };

    let (trace, saved_to) = completed(sweep(&mut manager, 21, &exporter));
    assert_eq!(saved_to, None);
    assert_eq!(trace.point_count(), 21);
}

/// Test that an invalid point count is rejected before any exchange
#[test]
fn test_invalid_point_count() {
    let mut manager = open(SimulatedAnalyzer::new());
    let before = manager.transport().writes().len();

    assert!(matches!(
        sweep(&mut manager, 20, &CountingExporter::default()),
        SweepOutcome::Aborted(Error::Validation { value: 20, .. })
    ));
    assert_eq!(manager.transport().writes().len(), before);
}

/// Test that export picks the first unused sequence number
#[test]
fn test_export_naming() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("trace000.csv"), "").unwrap();
    fs::write(dir.path().join("trace001.csv"), "").unwrap();
    let exporter = CsvTraceExporter::new(dir.path(), "trace", "csv");
    let mut manager = open(SimulatedAnalyzer::new());

    let (_, saved_to) = completed(sweep(&mut manager, 101, &exporter));
    let path = saved_to.expect("trace exported");
    assert_eq!(path, dir.path().join("trace002.csv"));

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 7 + 101);
    assert_eq!(lines[0], "filename,trace002.csv");
    assert_eq!(lines[3], "points,101");
    assert_eq!(lines[6], "frequency_hz,amplitude_dbm");
    assert!(lines[7].starts_with("1000000000.000000,"));

    // the untouched files stay empty
    assert_eq!(fs::read_to_string(dir.path().join("trace001.csv")).unwrap(), "");
}
