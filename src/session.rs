//! ## Session Manager
//!
//! Owns the transport, the catalog and at most one open session.
//!
//! Opening a resource always closes the previous session first, so two
//! sessions are never open at once. The single session carries its own
//! timeout and read budget, which every exchange on it uses.
//!

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::catalog::ResourceCatalog;
use crate::constants::{limits, scpi};
use crate::error::{Error, Result};
use crate::exchange::Exchange;
use crate::transport::Transport;
use crate::types::ResourceDescriptor;

/// Settings applied to every session the manager opens.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub default_timeout_ms: u32,
    pub default_read_bytes: usize,
    /// Appended to every command before it is written
    pub write_termination: String,
    pub identify_command: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            default_timeout_ms: limits::DEFAULT_TIMEOUT_MS,
            default_read_bytes: limits::DEFAULT_READ_BYTES,
            write_termination: "\n".to_string(),
            identify_command: scpi::IDENTIFY.to_string(),
        }
    }
}

/// ### Session
///
/// A live connection to one catalogued resource.
///
#[derive(Debug)]
pub struct Session<H> {
    index: usize,
    resource: ResourceDescriptor,
    pub(crate) handle: H,
    timeout_ms: u32,
    read_bytes: usize,
}

impl<H> Session<H> {
    /// Catalog index the session was opened from
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn read_bytes(&self) -> usize {
        self.read_bytes
    }
}

/// ### Identification
///
/// What the identification exchange on open produced. The session is open
/// in both cases.
///
#[derive(Debug)]
pub enum Identification {
    Identified(String),
    Failed(Error),
}

impl Identification {
    pub fn identity(&self) -> Option<&str> {
        match self {
            Identification::Identified(identity) => Some(identity),
            Identification::Failed(_) => None,
        }
    }
}

pub struct SessionManager<T: Transport> {
    transport: T,
    catalog: ResourceCatalog,
    config: SessionConfig,
    active: Option<Session<T::Handle>>,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T, catalog: ResourceCatalog, config: SessionConfig) -> Self {
        SessionManager {
            transport,
            catalog,
            config,
            active: None,
        }
    }

    /// Run the discovery pass and manage the resulting catalog.
    pub fn discover(mut transport: T, config: SessionConfig) -> Result<Self> {
        let catalog = ResourceCatalog::discover(&mut transport)?;
        Ok(Self::new(transport, catalog, config))
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn active(&self) -> Option<&Session<T::Handle>> {
        self.active.as_ref()
    }

    /// Catalog index of the open session
    pub fn active_index(&self) -> Option<usize> {
        self.active.as_ref().map(Session::index)
    }

    pub fn timeout_ms(&self) -> Option<u32> {
        self.active.as_ref().map(Session::timeout_ms)
    }

    pub fn read_budget(&self) -> Option<usize> {
        self.active.as_ref().map(Session::read_bytes)
    }

    /// ### Open
    ///
    /// Close whatever is open, then open the resource at `index`, apply the
    /// default timeout and identify the instrument.
    ///
    /// An index outside the catalog is a [`Error::Validation`]. A transport
    /// refusal is a [`Error::Session`] and leaves no session open. A failed
    /// identification does not fail the open: the session stays open and the
    /// error comes back as [`Identification::Failed`].
    ///
    pub fn open(&mut self, index: usize) -> Result<Identification> {
        let last = self.catalog.len() as i64 - 1;
        Error::check_range(index as i64, 0, last)?;

        self.close();

        let resource = self.catalog[index].clone();
        info!(index, %resource, "opening session");
        let mut handle = self.transport.open(&resource).map_err(|source| Error::Session {
            operation: "open",
            resource: resource.to_string(),
            source,
        })?;

        let timeout_ms = self.config.default_timeout_ms;
        if let Err(err) = self.transport.set_timeout(&mut handle, millis(timeout_ms)) {
            warn!(%resource, status = ?err.code(), error = %err, "default timeout not applied");
        }

        self.active = Some(Session {
            index,
            resource,
            handle,
            timeout_ms,
            read_bytes: self.config.default_read_bytes,
        });

        match self.exchange()?.identify() {
            Ok(identity) => Ok(Identification::Identified(identity.text())),
            Err(err) => {
                warn!(index, status = ?err.status_code(), error = %err, "identification failed, session kept open");
                Ok(Identification::Failed(err))
            }
        }
    }

    /// ### Close
    ///
    /// Close the open session, if any. Transport errors are logged; there is
    /// nothing to roll back.
    ///
    pub fn close(&mut self) {
        let Some(session) = self.active.take() else {
            return;
        };

        match self.transport.close(session.handle) {
            Ok(()) => debug!(index = session.index, resource = %session.resource, "session closed"),
            Err(err) => warn!(
                index = session.index,
                resource = %session.resource,
                status = ?err.code(),
                error = %err,
                "closing session failed"
            ),
        }
    }

    /// ### Set Timeout
    ///
    /// `ms` must lie in [`limits::TIMEOUT_MIN_MS`, `limits::TIMEOUT_MAX_MS`].
    /// A rejected value, or one the transport refuses, leaves the previous
    /// timeout in place.
    ///
    pub fn set_timeout(&mut self, ms: u32) -> Result<()> {
        Error::check_range(
            i64::from(ms),
            i64::from(limits::TIMEOUT_MIN_MS),
            i64::from(limits::TIMEOUT_MAX_MS),
        )?;
        let session = self.active.as_mut().ok_or(Error::NoActiveSession)?;

        self.transport
            .set_timeout(&mut session.handle, millis(ms))
            .map_err(|source| Error::Session {
                operation: "set timeout",
                resource: session.resource.to_string(),
                source,
            })?;

        session.timeout_ms = ms;
        info!(index = session.index, timeout_ms = ms, "timeout set");
        Ok(())
    }

    /// ### Set Read Budget
    ///
    /// Default number of bytes each later read on the session asks for.
    ///
    pub fn set_read_budget(&mut self, bytes: usize) -> Result<()> {
        Error::check_range(bytes as i64, 1, limits::MAX_READ_BYTES as i64)?;
        let session = self.active.as_mut().ok_or(Error::NoActiveSession)?;

        session.read_bytes = bytes;
        info!(index = session.index, read_bytes = bytes, "read budget set");
        Ok(())
    }

    /// Borrow the open session for command/response exchanges.
    pub fn exchange(&mut self) -> Result<Exchange<'_, T>> {
        let session = self.active.as_mut().ok_or(Error::NoActiveSession)?;
        Ok(Exchange::new(&mut self.transport, session, &self.config))
    }
}

impl<T: Transport> Drop for SessionManager<T> {
    fn drop(&mut self) {
        self.close();
    }
}

fn millis(ms: u32) -> Duration {
    Duration::from_millis(u64::from(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedAnalyzer, IDENTITY, STATUS_IO};

    fn manager() -> SessionManager<SimulatedAnalyzer> {
        SessionManager::discover(SimulatedAnalyzer::new(), SessionConfig::default()).unwrap()
    }

    #[test]
    fn open_identifies_and_applies_defaults() {
        let mut manager = manager();
        let identity = manager.open(1).unwrap();

        assert_eq!(identity.identity(), Some(IDENTITY));
        assert_eq!(manager.active_index(), Some(1));
        assert_eq!(manager.timeout_ms(), Some(limits::DEFAULT_TIMEOUT_MS));
        assert_eq!(manager.read_budget(), Some(limits::DEFAULT_READ_BYTES));
        assert_eq!(
            manager.transport().applied_timeout(),
            Some(Duration::from_millis(2500))
        );
    }

    #[test]
    fn out_of_range_index_is_rejected_without_touching_the_session() {
        let mut manager = manager();
        manager.open(0).unwrap();

        let err = manager.open(3).unwrap_err();
        assert!(matches!(err, Error::Validation { value: 3, min: 0, max: 2 }));
        assert_eq!(manager.active_index(), Some(0));
    }

    #[test]
    fn identification_failure_keeps_session_open() {
        let analyzer = SimulatedAnalyzer::new().with_failing_write("*IDN?");
        let mut manager = SessionManager::discover(analyzer, SessionConfig::default()).unwrap();

        let identification = manager.open(0).unwrap();
        assert_eq!(identification.identity(), None);
        match identification {
            Identification::Failed(err) => {
                assert!(matches!(err, Error::Write { .. }));
                assert_eq!(err.status_code(), Some(STATUS_IO));
            }
            Identification::Identified(identity) => panic!("identified as {identity}"),
        }
        assert_eq!(manager.active_index(), Some(0));
    }

    #[test]
    fn read_budget_bounds() {
        let mut manager = manager();
        assert!(matches!(manager.set_read_budget(64), Err(Error::NoActiveSession)));

        manager.open(0).unwrap();
        manager.set_read_budget(64).unwrap();
        assert_eq!(manager.read_budget(), Some(64));

        assert!(manager.set_read_budget(0).is_err());
        assert!(manager.set_read_budget(limits::MAX_READ_BYTES + 1).is_err());
        manager.set_read_budget(limits::MAX_READ_BYTES).unwrap();
    }

    #[test]
    fn drop_closes_the_open_session() {
        let mut analyzer = SimulatedAnalyzer::new();
        let catalog = ResourceCatalog::discover(&mut analyzer).unwrap();
        let mut manager = SessionManager::new(analyzer, catalog, SessionConfig::default());
        manager.open(2).unwrap();
        assert_eq!(manager.transport().open_sessions(), 1);

        manager.close();
        assert_eq!(manager.transport().open_sessions(), 0);
        assert_eq!(manager.active_index(), None);
    }
}
