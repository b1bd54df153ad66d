//! Simulated spectrum analyzer
//!
//! An in-process [`Transport`] that behaves like a swept spectrum analyzer
//! answering SCPI. It backs the test-suite and the `--simulate` flag of the
//! binary, so the whole controller can be exercised without hardware.
//!
//! Failures can be injected per operation; every write is recorded so tests
//! can check the exact command sequence that reached the instrument.
//!
//! # Example
//!
//! ```
//! use scpi_ctl::simulated::SimulatedAnalyzer;
//! use scpi_ctl::transport::Transport;
//!
//! let mut analyzer = SimulatedAnalyzer::new().with_unreachable("GPIB0::7::INSTR");
//! let resources = analyzer.discover().unwrap();
//! assert_eq!(resources.len(), 4);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use tracing::trace;

use crate::constants::scpi;
use crate::error::TransportError;
use crate::transport::Transport;
use crate::types::{ReadChunk, ResourceDescriptor};

/// VISA-style status returned when a read finds nothing to return
pub const STATUS_TIMEOUT: u32 = 0xBFFF_0015;
/// VISA-style status returned when the resource does not answer
pub const STATUS_RESOURCE_NOT_FOUND: u32 = 0xBFFF_0011;
/// VISA-style status for an injected I/O failure
pub const STATUS_IO: u32 = 0xBFFF_003E;
/// VISA-style status for a stale or unknown session
pub const STATUS_INVALID_SESSION: u32 = 0xBFFF_000E;

pub const IDENTITY: &str = "SIMULATED,SA9000,SN0001,1.0.0";

/// Session handle into the simulator
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SimSession(u32);

#[derive(Debug, Default)]
struct SessionState {
    /// Response bytes not yet read
    pending: VecDeque<u8>,
}

#[derive(Debug)]
pub struct SimulatedAnalyzer {
    resources: Vec<ResourceDescriptor>,
    unreachable: HashSet<String>,
    fail_discovery: bool,
    sessions: HashMap<u32, SessionState>,
    next_session: u32,

    start_hz: f64,
    stop_hz: f64,
    rbw_hz: f64,
    vbw_hz: f64,
    marker_hz: f64,
    continuous: bool,

    frequency_reply: Option<String>,
    bandwidth_reply: Option<String>,
    failing_writes: HashSet<String>,
    failing_marker_reads: HashSet<usize>,
    marker_reads: usize,

    writes: Vec<String>,
    max_open_sessions: usize,
    last_timeout: Option<Duration>,
}

impl Default for SimulatedAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAnalyzer {
    /// Analyzer sweeping 1 GHz to 2 GHz, reachable under three descriptors.
    pub fn new() -> Self {
        SimulatedAnalyzer {
            resources: vec![
                ResourceDescriptor::new("USB0::0x2A8D::0x1B0B::SIM0001::INSTR"),
                ResourceDescriptor::new("TCPIP0::192.168.1.50::inst0::INSTR"),
                ResourceDescriptor::new("ASRL1::INSTR"),
            ],
            unreachable: HashSet::new(),
            fail_discovery: false,
            sessions: HashMap::new(),
            next_session: 1,
            start_hz: 1.0e9,
            stop_hz: 2.0e9,
            rbw_hz: 1.0e6,
            vbw_hz: 3.0e6,
            marker_hz: 1.5e9,
            continuous: true,
            frequency_reply: None,
            bandwidth_reply: None,
            failing_writes: HashSet::new(),
            failing_marker_reads: HashSet::new(),
            marker_reads: 0,
            writes: Vec::new(),
            max_open_sessions: 0,
            last_timeout: None,
        }
    }

    /// Add a resource that is listed by discovery but refuses to open.
    pub fn with_unreachable(mut self, descriptor: &str) -> Self {
        self.resources.push(ResourceDescriptor::new(descriptor));
        self.unreachable.insert(descriptor.to_string());
        self
    }

    pub fn with_span(mut self, start_hz: f64, stop_hz: f64) -> Self {
        self.start_hz = start_hz;
        self.stop_hz = stop_hz;
        self
    }

    /// Make discovery itself fail.
    pub fn with_failing_discovery(mut self) -> Self {
        self.fail_discovery = true;
        self
    }

    /// Answer start/stop frequency queries with `reply` instead of a number.
    pub fn with_frequency_reply(mut self, reply: &str) -> Self {
        self.frequency_reply = Some(reply.to_string());
        self
    }

    /// Answer bandwidth queries with `reply` instead of a number.
    pub fn with_bandwidth_reply(mut self, reply: &str) -> Self {
        self.bandwidth_reply = Some(reply.to_string());
        self
    }

    /// Fail every write whose command starts with `prefix`.
    pub fn with_failing_write(mut self, prefix: &str) -> Self {
        self.failing_writes.insert(prefix.to_string());
        self
    }

    /// Fail the marker value read of each sweep point in `points` (0-based).
    pub fn with_failing_marker_reads(mut self, points: impl IntoIterator<Item = usize>) -> Self {
        self.failing_marker_reads.extend(points);
        self
    }

    /// Every command written so far, in order, without terminators.
    pub fn writes(&self) -> &[String] {
        &self.writes
    }

    /// Number of writes equal to `command`.
    pub fn count_writes(&self, command: &str) -> usize {
        self.writes.iter().filter(|w| w.as_str() == command).count()
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Highest number of sessions that were ever open at the same time.
    pub fn max_open_sessions(&self) -> usize {
        self.max_open_sessions
    }

    pub fn is_sweeping_continuously(&self) -> bool {
        self.continuous
    }

    /// Most recent timeout applied to any session.
    pub fn applied_timeout(&self) -> Option<Duration> {
        self.last_timeout
    }

    /// Synthetic trace: noise floor with a single carrier in the middle of the span.
    pub fn amplitude_at(&self, frequency_hz: f64) -> f64 {
        let center = (self.start_hz + self.stop_hz) / 2.0;
        let width = ((self.stop_hz - self.start_hz) / 50.0).max(1.0);
        let offset = (frequency_hz - center) / width;
        -90.0 + 70.0 * (-offset * offset).exp()
    }

    fn session(&mut self, handle: &SimSession) -> Result<&mut SessionState, TransportError> {
        self.sessions
            .get_mut(&handle.0)
            .ok_or(TransportError::Status(STATUS_INVALID_SESSION))
    }

    /// Apply a command, returning the response it queues, if any.
    fn execute(&mut self, command: &str) -> Result<Option<String>, TransportError> {
        let (header, argument) = match command.split_once(' ') {
            Some((header, argument)) => (header, Some(argument.trim())),
            None => (command, None),
        };

        let response = match (header.to_ascii_uppercase().as_str(), argument) {
            ("*IDN?", _) => Some(IDENTITY.to_string()),
            ("*RST", _) | ("*CLS", _) => None,
            (":MMEM:CAT?", _) => Some("52480,1048576,\"STATE1.STA,2048\",\"TRACE1.CSV,50432\"".to_string()),
            (":SENS:FREQ:STAR?", _) => Some(self.frequency_reply_or(self.start_hz)),
            (":SENS:FREQ:STOP?", _) => Some(self.frequency_reply_or(self.stop_hz)),
            (":SENS:BAND:RES?", _) => Some(self.bandwidth_reply_or(self.rbw_hz)),
            (":SENS:BAND:VID?", _) => Some(self.bandwidth_reply_or(self.vbw_hz)),
            (":INIT:CONT", Some(state)) => {
                self.continuous = matches!(state.to_ascii_uppercase().as_str(), "ON" | "1");
                None
            }
            (":CALC:MARK:AOFF", _)
            | (":CALC:MARK1:MODE", Some(_))
            | (":CALC:MARK1:FUNC", Some(_))
            | (":CALC:MARK1:FCO", Some(_)) => None,
            (":CALC:MARK1:X", Some(hz)) => {
                self.marker_hz = hz
                    .parse()
                    .map_err(|_| TransportError::Status(STATUS_IO))?;
                None
            }
            (":CALC:MARK1:Y?", _) => {
                let point = self.marker_reads;
                self.marker_reads += 1;
                if self.failing_marker_reads.contains(&point) {
                    // nothing queued, so the read times out
                    return Ok(None);
                }
                Some(format!("{:+.3E}", self.amplitude_at(self.marker_hz)))
            }
            _ => Some("-113,\"Undefined header\"".to_string()),
        };

        Ok(response)
    }

    fn frequency_reply_or(&self, value: f64) -> String {
        self.frequency_reply
            .clone()
            .unwrap_or_else(|| format!("{:+.11E}", value))
    }

    fn bandwidth_reply_or(&self, value: f64) -> String {
        self.bandwidth_reply
            .clone()
            .unwrap_or_else(|| format!("{:+.11E}", value))
    }
}

impl Transport for SimulatedAnalyzer {
    type Handle = SimSession;

    fn discover(&mut self) -> Result<Vec<ResourceDescriptor>, TransportError> {
        if self.fail_discovery {
            return Err(TransportError::Status(STATUS_RESOURCE_NOT_FOUND));
        }
        Ok(self.resources.clone())
    }

    fn open(&mut self, resource: &ResourceDescriptor) -> Result<SimSession, TransportError> {
        if !self.resources.contains(resource) || self.unreachable.contains(resource.as_str()) {
            return Err(TransportError::Status(STATUS_RESOURCE_NOT_FOUND));
        }

        let id = self.next_session;
        self.next_session += 1;
        self.sessions.insert(id, SessionState::default());
        self.max_open_sessions = self.max_open_sessions.max(self.sessions.len());
        trace!(session = id, %resource, "simulated session opened");

        Ok(SimSession(id))
    }

    fn close(&mut self, handle: SimSession) -> Result<(), TransportError> {
        self.sessions
            .remove(&handle.0)
            .map(|_| ())
            .ok_or(TransportError::Status(STATUS_INVALID_SESSION))
    }

    fn write(&mut self, handle: &mut SimSession, data: &[u8]) -> Result<usize, TransportError> {
        self.session(handle)?;

        let command = String::from_utf8_lossy(data).trim().to_string();
        self.writes.push(command.clone());

        if self.failing_writes.iter().any(|p| command.starts_with(p.as_str())) {
            return Err(TransportError::Status(STATUS_IO));
        }

        // a new command discards any unread response, as a real instrument does
        let response = self.execute(&command)?;
        let session = self.session(handle)?;
        session.pending.clear();
        if let Some(response) = response {
            session.pending.extend(response.bytes());
            session.pending.push_back(b'\n');
        }

        Ok(data.len())
    }

    fn read(&mut self, handle: &mut SimSession, max_bytes: usize) -> Result<ReadChunk, TransportError> {
        let session = self.session(handle)?;
        if session.pending.is_empty() {
            return Err(TransportError::Status(STATUS_TIMEOUT));
        }

        let take = max_bytes.min(session.pending.len());
        let data: Vec<u8> = session.pending.drain(..take).collect();
        Ok(ReadChunk {
            end: session.pending.is_empty(),
            data,
        })
    }

    fn set_timeout(&mut self, handle: &mut SimSession, timeout: Duration) -> Result<(), TransportError> {
        self.session(handle)?;
        self.last_timeout = Some(timeout);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(analyzer: &mut SimulatedAnalyzer, session: &mut SimSession, command: &str) -> String {
        analyzer.write(session, command.as_bytes()).unwrap();
        let chunk = analyzer.read(session, 1024).unwrap();
        String::from_utf8(chunk.data).unwrap()
    }

    #[test]
    fn answers_identification_and_span() {
        let mut analyzer = SimulatedAnalyzer::new();
        let resource = analyzer.discover().unwrap()[0].clone();
        let mut session = analyzer.open(&resource).unwrap();

        assert_eq!(query(&mut analyzer, &mut session, scpi::IDENTIFY), format!("{IDENTITY}\n"));
        assert_eq!(
            query(&mut analyzer, &mut session, scpi::START_FREQUENCY),
            "+1.00000000000E9\n"
        );
    }

    #[test]
    fn partial_read_leaves_remainder_pending() {
        let mut analyzer = SimulatedAnalyzer::new();
        let resource = analyzer.discover().unwrap()[0].clone();
        let mut session = analyzer.open(&resource).unwrap();

        analyzer.write(&mut session, b"*IDN?").unwrap();
        let first = analyzer.read(&mut session, 10).unwrap();
        assert_eq!(first.data, b"SIMULATED,");
        assert!(!first.end);

        let rest = analyzer.read(&mut session, 1024).unwrap();
        assert!(rest.end);
        assert!(analyzer.read(&mut session, 1024).is_err());
    }

    #[test]
    fn unreachable_resources_refuse_to_open() {
        let mut analyzer = SimulatedAnalyzer::new().with_unreachable("GPIB0::7::INSTR");
        let err = analyzer
            .open(&ResourceDescriptor::new("GPIB0::7::INSTR"))
            .unwrap_err();
        assert_eq!(err.code(), Some(STATUS_RESOURCE_NOT_FOUND));
        assert_eq!(analyzer.open_sessions(), 0);
    }

    #[test]
    fn continuous_sweep_follows_init_commands() {
        let mut analyzer = SimulatedAnalyzer::new();
        let resource = analyzer.discover().unwrap()[0].clone();
        let mut session = analyzer.open(&resource).unwrap();

        analyzer.write(&mut session, scpi::CONTINUOUS_OFF.as_bytes()).unwrap();
        assert!(!analyzer.is_sweeping_continuously());
        analyzer.write(&mut session, scpi::CONTINUOUS_ON.as_bytes()).unwrap();
        assert!(analyzer.is_sweeping_continuously());
    }

    #[test]
    fn carrier_peaks_at_center_of_span() {
        let analyzer = SimulatedAnalyzer::new();
        assert!((analyzer.amplitude_at(1.5e9) - -20.0).abs() < 1e-9);
        assert!(analyzer.amplitude_at(1.0e9) < -89.0);
    }
}
