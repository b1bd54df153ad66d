//! ## Acquisition
//!
//! Trace capture by marker sweep: the marker is stepped across the span one
//! point at a time and its value read back at every step.
//!
//! Only a start/stop frequency that cannot be established aborts a sweep.
//! Everything after that is best effort: failed setup writes and bandwidth
//! queries are logged, a failed point gets a `NaN` amplitude, and continuous
//! sweep is always switched back on before the trace is handed to the
//! exporter.
//!

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::constants::{limits, scpi};
use crate::error::{Error, Result};
use crate::exchange::Exchange;
use crate::export::TraceExporter;
use crate::transport::Transport;

/// Point count for preset `choice` of the point-count menu.
pub fn preset_points(choice: usize) -> Option<u32> {
    limits::SWEEP_POINT_PRESETS.get(choice).copied()
}

/// ### Sweep Plan
///
/// Point count and frequency grid of one marker sweep.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPlan {
    points: u32,
    start_hz: f64,
    stop_hz: f64,
    spacing_hz: f64,
}

impl SweepPlan {
    /// `points` must lie in [`limits::SWEEP_POINTS_MIN`, `limits::SWEEP_POINTS_MAX`].
    pub fn check_points(points: u32) -> Result<()> {
        Error::check_range(
            i64::from(points),
            i64::from(limits::SWEEP_POINTS_MIN),
            i64::from(limits::SWEEP_POINTS_MAX),
        )
    }

    /// ### New
    ///
    /// Plan `points` samples from `start_hz` to `stop_hz` inclusive. The span
    /// must satisfy `stop > start >= 0`.
    ///
    /// ```
    /// use scpi_ctl::acquisition::SweepPlan;
    ///
    /// let plan = SweepPlan::new(101, 1.0e9, 2.0e9).unwrap();
    /// assert_eq!(plan.spacing_hz(), 1.0e7);
    /// assert_eq!(plan.frequency(100), 2.0e9);
    /// ```
    ///
    pub fn new(points: u32, start_hz: f64, stop_hz: f64) -> Result<Self> {
        Self::check_points(points)?;
        if !(start_hz >= 0.0 && stop_hz > start_hz) {
            return Err(Error::Acquisition(format!(
                "invalid frequency span {start_hz} Hz to {stop_hz} Hz"
            )));
        }

        Ok(SweepPlan {
            points,
            start_hz,
            stop_hz,
            spacing_hz: (stop_hz - start_hz) / f64::from(points - 1),
        })
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn start_hz(&self) -> f64 {
        self.start_hz
    }

    pub fn stop_hz(&self) -> f64 {
        self.stop_hz
    }

    pub fn spacing_hz(&self) -> f64 {
        self.spacing_hz
    }

    /// Marker frequency of point `index`, rounded to a whole hertz.
    pub fn frequency(&self, index: u32) -> f64 {
        (self.start_hz + f64::from(index) * self.spacing_hz).round()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TracePoint {
    pub frequency_hz: f64,
    /// `NaN` when the point could not be measured
    pub amplitude_dbm: f64,
}

/// ### Trace Result
///
/// Captured trace with the instrument settings it was taken with.
///
#[derive(Debug, Clone, PartialEq)]
pub struct TraceResult {
    pub start_hz: f64,
    pub stop_hz: f64,
    /// Resolution bandwidth, `0.0` when it could not be read
    pub rbw_hz: f64,
    /// Video bandwidth, `0.0` when it could not be read
    pub vbw_hz: f64,
    pub points: Vec<TracePoint>,
    /// Indices of the points that carry the `NaN` sentinel
    pub failed: Vec<usize>,
}

impl TraceResult {
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub enum SweepOutcome {
    /// The sweep ran to the end, possibly with sentinel points. `saved_to` is
    /// `None` when the export failed.
    Completed {
        trace: TraceResult,
        saved_to: Option<PathBuf>,
    },
    /// Nothing was captured or exported
    Aborted(Error),
}

/// ### Marker Sweep
///
/// Capture a `points` point trace and export it.
///
pub fn marker_sweep<T, E>(exchange: &mut Exchange<'_, T>, points: u32, exporter: &E) -> SweepOutcome
where
    T: Transport,
    E: TraceExporter + ?Sized,
{
    let trace = match capture(exchange, points) {
        Ok(trace) => trace,
        Err(err) => {
            warn!(error = %err, "marker sweep aborted");
            return SweepOutcome::Aborted(err);
        }
    };

    let saved_to = match exporter.export(&trace) {
        Ok(path) => {
            info!(path = %path.display(), points = trace.point_count(), "trace exported");
            Some(path)
        }
        Err(err) => {
            warn!(error = %err, "trace captured but not exported");
            None
        }
    };

    SweepOutcome::Completed { trace, saved_to }
}

/// ### Capture
///
/// Run the sweep without exporting it. Fails only when `points` is out of
/// range or the span cannot be read from the instrument.
///
pub fn capture<T: Transport>(exchange: &mut Exchange<'_, T>, points: u32) -> Result<TraceResult> {
    SweepPlan::check_points(points)?;

    // FREQUENCY DISCOVERY
    // ==========
    let start_hz = read_frequency(exchange, scpi::START_FREQUENCY)?;
    let stop_hz = read_frequency(exchange, scpi::STOP_FREQUENCY)?;
    if start_hz < 0.0 || stop_hz <= 0.0 {
        return Err(frequency_read_failed(format!(
            "start {start_hz} Hz, stop {stop_hz} Hz"
        )));
    }
    let plan = SweepPlan::new(points, start_hz, stop_hz)?;
    info!(points, start_hz, stop_hz, spacing_hz = plan.spacing_hz(), "marker sweep planned");

    // INSTRUMENT SETUP
    // ==========
    for command in scpi::SWEEP_SETUP {
        if let Err(err) = exchange.write(command) {
            warn!(command, status = ?err.status_code(), error = %err, "sweep setup write failed");
        }
    }
    let rbw_hz = read_bandwidth(exchange, scpi::RESOLUTION_BANDWIDTH);
    let vbw_hz = read_bandwidth(exchange, scpi::VIDEO_BANDWIDTH);

    // SWEEP
    // ==========
    let mut trace = Vec::with_capacity(points as usize);
    let mut failed = Vec::new();
    for index in 0..points {
        let frequency_hz = plan.frequency(index);
        let amplitude_dbm = match measure(exchange, frequency_hz) {
            Ok(value) => value,
            Err(err) => {
                warn!(point = index, frequency_hz, status = ?err.status_code(), error = %err, "marker read failed");
                failed.push(index as usize);
                f64::NAN
            }
        };
        debug!(point = index, frequency_hz, amplitude_dbm, "point measured");
        trace.push(TracePoint {
            frequency_hz,
            amplitude_dbm,
        });
    }

    // RESTORE
    // ==========
    if let Err(err) = exchange.write(scpi::CONTINUOUS_ON) {
        warn!(status = ?err.status_code(), error = %err, "continuous sweep not restored");
    }

    if !failed.is_empty() {
        warn!(failed = failed.len(), points, "sweep finished with missing points");
    }

    Ok(TraceResult {
        start_hz,
        stop_hz,
        rbw_hz,
        vbw_hz,
        points: trace,
        failed,
    })
}

fn measure<T: Transport>(exchange: &mut Exchange<'_, T>, frequency_hz: f64) -> Result<f64> {
    exchange.write(&format!("{} {frequency_hz:.0}", scpi::MARKER_X))?;
    exchange.query_f64(scpi::MARKER_Y)
}

fn read_frequency<T: Transport>(exchange: &mut Exchange<'_, T>, command: &str) -> Result<f64> {
    exchange
        .query_f64(command)
        .map_err(|err| frequency_read_failed(format!("{command}: {err}")))
}

fn read_bandwidth<T: Transport>(exchange: &mut Exchange<'_, T>, command: &str) -> f64 {
    exchange.query_f64(command).unwrap_or_else(|err| {
        warn!(command, error = %err, "bandwidth not read, recorded as 0");
        0.0
    })
}

fn frequency_read_failed(detail: String) -> Error {
    Error::Acquisition(format!("frequency read failed ({detail})"))
}
