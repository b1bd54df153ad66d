//! ## Trace Export
//!
//! Writes captured traces to numbered CSV files that never overwrite an
//! earlier capture: `trace000.csv`, `trace001.csv`, ... the first unused name
//! wins.
//!

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::acquisition::TraceResult;
use crate::error::{Error, Result};

/// Highest sequence number a file name can carry
const MAX_SEQUENCE: u32 = 999;

/// Destination for completed traces.
pub trait TraceExporter {
    /// Persist `trace`, returning where it was written.
    fn export(&self, trace: &TraceResult) -> Result<PathBuf>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTraceExporter {
    directory: PathBuf,
    prefix: String,
    extension: String,
}

impl CsvTraceExporter {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        CsvTraceExporter {
            directory: directory.into(),
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, sequence: u32) -> PathBuf {
        self.directory
            .join(format!("{}{:03}.{}", self.prefix, sequence, self.extension))
    }

    /// ### Next Available Path
    ///
    /// First `<prefix>NNN.<extension>` in the directory that does not exist yet.
    ///
    pub fn next_available_path(&self) -> Result<PathBuf> {
        (0..=MAX_SEQUENCE)
            .map(|sequence| self.path_for(sequence))
            .find(|path| !path.exists())
            .ok_or_else(|| Error::Export {
                path: self.path_for(MAX_SEQUENCE),
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("all {} file names are taken", MAX_SEQUENCE + 1),
                ),
            })
    }

    fn write_trace(path: &Path, trace: &TraceResult) -> io::Result<()> {
        // create_new: a file appearing after the name was chosen is not overwritten
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(["filename", name.as_str()])?;
        writer.write_record(["start_hz", fixed(trace.start_hz).as_str()])?;
        writer.write_record(["stop_hz", fixed(trace.stop_hz).as_str()])?;
        writer.write_record(["points", trace.point_count().to_string().as_str()])?;
        writer.write_record(["rbw_hz", fixed(trace.rbw_hz).as_str()])?;
        writer.write_record(["vbw_hz", fixed(trace.vbw_hz).as_str()])?;
        writer.write_record(["frequency_hz", "amplitude_dbm"])?;

        for point in &trace.points {
            writer.write_record([fixed(point.frequency_hz), fixed(point.amplitude_dbm)])?;
        }

        let mut file = writer.into_inner().map_err(|err| err.into_error())?;
        file.flush()
    }
}

impl TraceExporter for CsvTraceExporter {
    fn export(&self, trace: &TraceResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.directory).map_err(|source| Error::Export {
            path: self.directory.clone(),
            source,
        })?;

        let path = self.next_available_path()?;
        debug!(path = %path.display(), "writing trace");
        Self::write_trace(&path, trace).map_err(|source| Error::Export {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

fn fixed(value: f64) -> String {
    format!("{value:.6}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::TracePoint;

    fn trace() -> TraceResult {
        TraceResult {
            start_hz: 1.0e9,
            stop_hz: 2.0e9,
            rbw_hz: 1.0e6,
            vbw_hz: 0.0,
            points: vec![
                TracePoint {
                    frequency_hz: 1.0e9,
                    amplitude_dbm: -90.25,
                },
                TracePoint {
                    frequency_hz: 2.0e9,
                    amplitude_dbm: f64::NAN,
                },
            ],
            failed: vec![1],
        }
    }

    #[test]
    fn file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvTraceExporter::new(dir.path(), "trace", "csv");

        let path = exporter.export(&trace()).unwrap();
        assert_eq!(path, dir.path().join("trace000.csv"));

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            [
                "filename,trace000.csv",
                "start_hz,1000000000.000000",
                "stop_hz,2000000000.000000",
                "points,2",
                "rbw_hz,1000000.000000",
                "vbw_hz,0.000000",
                "frequency_hz,amplitude_dbm",
                "1000000000.000000,-90.250000",
                "2000000000.000000,NaN",
            ]
        );
    }

    #[test]
    fn skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("scan000.txt"), "").unwrap();
        fs::write(dir.path().join("scan002.txt"), "").unwrap();
        let exporter = CsvTraceExporter::new(dir.path(), "scan", "txt");

        assert_eq!(exporter.next_available_path().unwrap(), dir.path().join("scan001.txt"));
    }

    #[test]
    fn all_names_taken_is_an_export_error() {
        let dir = tempfile::tempdir().unwrap();
        for sequence in 0..=MAX_SEQUENCE {
            fs::write(dir.path().join(format!("t{sequence:03}.csv")), "").unwrap();
        }
        let exporter = CsvTraceExporter::new(dir.path(), "t", "csv");

        assert!(matches!(exporter.export(&trace()), Err(Error::Export { .. })));
    }
}
