//! ## Errors
//!
//! The errors used throughout the crate.
//!
//! [`TransportError`] is what a transport backend reports for a single failed
//! primitive. [`Error`] is what the controller reports to its caller; every
//! variant carries enough context (operation, command, raw status code) for an
//! operator to tell a configuration problem from a hardware one.
//!

use std::path::PathBuf;

/// Result alias for the controller's operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("usb transfer failed: {0}")]
    Usb(#[from] rusb::Error),
    #[error("device not found")]
    DeviceNotFound,
    #[error("device is not compatible with USBTMC")]
    DeviceIncompatible,
    #[error("specified interface not found")]
    InterfaceNotFound,
    #[error("specified interface setting not found")]
    InterfaceSettingNotFound,
    #[error("bulk out endpoint not found")]
    BulkOutEndpointNotFound,
    #[error("bulk in endpoint not found")]
    BulkInEndpointNotFound,
    #[error("used incorrect endpoint")]
    IncorrectEndpoint,
    #[error("bulk in transfer cannot be aborted because FIFO is not empty")]
    BulkInFIFONotEmpty,
    #[error("no transfer in progress")]
    StatusNoTransferInProgress,
    #[error("device still reported STATUS_PENDING after {0:?}")]
    StatusPending(std::time::Duration),
    #[error("control request failed with status 0x{0:02X}")]
    StatusFailure(u8),
    #[error("malformed resource descriptor `{0}`")]
    MalformedDescriptor(String),
    #[error("status code 0x{0:08X}")]
    Status(u32),
    #[error(transparent)]
    Other(anyhow::Error),
}

/// Low-level helpers return `anyhow::Result`; recover the typed error when there is one.
impl From<anyhow::Error> for TransportError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<TransportError>() {
            Ok(transport) => return transport,
            Err(err) => err,
        };
        match err.downcast::<rusb::Error>() {
            Ok(usb) => TransportError::Usb(usb),
            Err(err) => TransportError::Other(err),
        }
    }
}

impl TransportError {
    /// Raw numeric status reported by the backend, when it has one.
    pub fn code(&self) -> Option<u32> {
        match self {
            TransportError::Status(code) => Some(*code),
            TransportError::StatusFailure(status) => Some(u32::from(*status)),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {value} is out of range [{min}, {max}]")]
    Validation { value: i64, min: i64, max: i64 },
    #[error("resource discovery failed: {0}")]
    Discovery(#[source] TransportError),
    #[error("{operation} failed on {resource}: {source}")]
    Session {
        operation: &'static str,
        resource: String,
        #[source]
        source: TransportError,
    },
    #[error("no session is open")]
    NoActiveSession,
    #[error("cannot write `{command}` to the device: {source}")]
    Write {
        command: String,
        #[source]
        source: TransportError,
    },
    #[error("cannot read response from the device: {source}")]
    Read {
        #[source]
        source: TransportError,
    },
    #[error("response to `{command}` is not a number: `{response}`")]
    Decode { command: String, response: String },
    #[error("response to `{command}` was cut off after {bytes} bytes, increase read bytes")]
    Truncated { command: String, bytes: usize },
    #[error("acquisition aborted: {0}")]
    Acquisition(String),
    #[error("cannot export trace to {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Out-of-range check shared by every bounded operator input.
    pub fn check_range(value: i64, min: i64, max: i64) -> Result<()> {
        if (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(Error::Validation { value, min, max })
        }
    }

    /// The transport status code behind this error, when there is one.
    pub fn status_code(&self) -> Option<u32> {
        match self {
            Error::Discovery(source)
            | Error::Session { source, .. }
            | Error::Write { source, .. }
            | Error::Read { source } => source.code(),
            _ => None,
        }
    }
}
