//! ## Command/Response Exchange
//!
//! Writes, reads and queries on the open session.
//!
//! A read asks the transport for at most the read budget. When the budget is
//! used up before the instrument signals the end of its message the bytes are
//! still returned, marked [`ReadStatus::Truncated`], and the rest of the
//! message stays on the device for the next read.
//!

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::session::{Session, SessionConfig};
use crate::transport::Transport;
use crate::types::{ExchangeResult, ReadStatus, WriteResult};

/// Leading decimal or scientific number, as instruments answer numeric queries
static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").expect("valid number pattern")
});

/// ### Parse Leading Number
///
/// Decode the number at the start of `text`, ignoring whatever follows it
/// (terminators, units, a second comma separated value).
///
/// ```
/// use scpi_ctl::exchange::parse_leading_f64;
///
/// assert_eq!(parse_leading_f64("+1.00000000000E9\n"), Some(1.0e9));
/// assert_eq!(parse_leading_f64("-42.5 dBm"), Some(-42.5));
/// assert_eq!(parse_leading_f64("OFF"), None);
/// ```
///
pub fn parse_leading_f64(text: &str) -> Option<f64> {
    let number = LEADING_NUMBER.find(text)?;
    number.as_str().trim().parse().ok()
}

pub struct Exchange<'a, T: Transport> {
    transport: &'a mut T,
    session: &'a mut Session<T::Handle>,
    config: &'a SessionConfig,
}

impl<'a, T: Transport> Exchange<'a, T> {
    pub(crate) fn new(
        transport: &'a mut T,
        session: &'a mut Session<T::Handle>,
        config: &'a SessionConfig,
    ) -> Self {
        Exchange {
            transport,
            session,
            config,
        }
    }

    /// ### Write
    ///
    /// Send `command` followed by the write terminator.
    ///
    pub fn write(&mut self, command: &str) -> Result<WriteResult> {
        let mut payload = String::with_capacity(command.len() + self.config.write_termination.len());
        payload.push_str(command);
        payload.push_str(&self.config.write_termination);

        let bytes_written = self
            .transport
            .write(&mut self.session.handle, payload.as_bytes())
            .map_err(|source| Error::Write {
                command: command.to_string(),
                source,
            })?;
        debug!(command, bytes_written, "command written");

        Ok(WriteResult {
            command: command.to_string(),
            bytes_written,
        })
    }

    /// Read one response using the session's read budget.
    pub fn read(&mut self) -> Result<ExchangeResult> {
        let budget = self.session.read_bytes();
        self.read_with_budget(budget)
    }

    /// ### Read With Budget
    ///
    /// Read at most `max_bytes`. Running out of budget is not an error; the
    /// result is flagged as truncated instead.
    ///
    pub fn read_with_budget(&mut self, max_bytes: usize) -> Result<ExchangeResult> {
        let chunk = self
            .transport
            .read(&mut self.session.handle, max_bytes)
            .map_err(|source| Error::Read { source })?;

        let status = if chunk.end {
            ReadStatus::Complete
        } else {
            warn!(
                bytes = chunk.data.len(),
                max_bytes, "no termination character or END indicator received, increase read bytes"
            );
            ReadStatus::Truncated
        };
        debug!(bytes = chunk.data.len(), ?status, "response read");

        Ok(ExchangeResult {
            status,
            data: chunk.data,
        })
    }

    /// Write `command`, then read its response. A failed write skips the read.
    pub fn query(&mut self, command: &str) -> Result<ExchangeResult> {
        self.write(command)?;
        self.read()
    }

    pub fn identify(&mut self) -> Result<ExchangeResult> {
        let command = self.config.identify_command.clone();
        self.query(&command)
    }

    /// ### Query Number
    ///
    /// Query `command` and decode the leading number of the response.
    ///
    /// A truncated response is an [`Error::Truncated`]: the digits that did
    /// arrive may still parse, but to the wrong value.
    ///
    pub fn query_f64(&mut self, command: &str) -> Result<f64> {
        let response = self.query(command)?;
        if response.is_truncated() {
            return Err(Error::Truncated {
                command: command.to_string(),
                bytes: response.byte_count(),
            });
        }

        let response = response.text();
        parse_leading_f64(&response).ok_or_else(|| Error::Decode {
            command: command.to_string(),
            response,
        })
    }
}
