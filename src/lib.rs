//! # scpi-ctl
//!
//! Interactive controller for SCPI instruments.
//!
//! The library discovers reachable instruments once at startup, keeps at most
//! one session open at a time, and runs command/response exchanges on it:
//! writes, reads with a bounded byte budget, queries and identification. On
//! top of that sits a marker-sweep trace capture for spectrum analyzers whose
//! results are exported to numbered CSV files.
//!
//! Two transports are provided: USBTMC over libusb ([`usbtmc`]) and an
//! in-process simulated spectrum analyzer ([`simulated`]).
//!
//! ## Example
//!
//! The example below opens the first simulated instrument and queries it.
//!
//! ```rust
//! use scpi_ctl::session::{SessionConfig, SessionManager};
//! use scpi_ctl::simulated::SimulatedAnalyzer;
//!
//! fn main() -> scpi_ctl::error::Result<()> {
//!     let mut sessions = SessionManager::discover(SimulatedAnalyzer::new(), SessionConfig::default())?;
//!
//!     // open a session, this also identifies the instrument
//!     let identification = sessions.open(0)?;
//!     assert!(identification.identity().is_some());
//!
//!     // query the start of the sweep span
//!     let start_hz = sessions.exchange()?.query_f64(":SENS:FREQ:STAR?")?;
//!     assert_eq!(start_hz, 1.0e9);
//!     Ok(())
//! }
//! ```
//!

pub mod acquisition;
pub mod app;
pub mod catalog;
pub mod config;
pub mod console;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod export;
pub mod menu;
pub mod session;
pub mod simulated;
pub mod transport;
pub mod types;
pub mod usbtmc;

mod init;
mod communication {
    pub mod bulk;
    pub mod control;
}

pub use catalog::ResourceCatalog;
pub use error::{Error, Result, TransportError};
pub use session::SessionManager;
pub use types::{ExchangeResult, ReadStatus, ResourceDescriptor};
