//! ## Transport
//!
//! The instrument I/O capability the controller is written against.
//!
//! A transport discovers resources, opens one session per resource and moves
//! raw bytes over it. It knows nothing about SCPI; commands are opaque
//! payloads. Two backends ship with the crate: [`crate::usbtmc::UsbtmcTransport`]
//! for real hardware and [`crate::simulated::SimulatedAnalyzer`] for tests and
//! demos.
//!

use std::time::Duration;

use crate::error::TransportError;
use crate::types::{ReadChunk, ResourceDescriptor};

pub trait Transport {
    /// A live session to one resource
    type Handle;

    /// ### Discover
    ///
    /// List every resource the backend can see, in discovery order.
    ///
    fn discover(&mut self) -> Result<Vec<ResourceDescriptor>, TransportError>;

    /// ### Open
    ///
    /// Open a session to `resource`.
    ///
    fn open(&mut self, resource: &ResourceDescriptor) -> Result<Self::Handle, TransportError>;

    /// ### Close
    ///
    /// Close a session. The handle is consumed whether or not this succeeds.
    ///
    fn close(&mut self, handle: Self::Handle) -> Result<(), TransportError>;

    /// ### Write
    ///
    /// Send `data` and return the number of bytes the device accepted.
    ///
    fn write(&mut self, handle: &mut Self::Handle, data: &[u8]) -> Result<usize, TransportError>;

    /// ### Read
    ///
    /// Read up to `max_bytes`. A chunk with `end == false` means the budget
    /// ran out before a termination character or END indicator arrived.
    ///
    fn read(&mut self, handle: &mut Self::Handle, max_bytes: usize) -> Result<ReadChunk, TransportError>;

    /// ### Set Timeout
    ///
    /// Bound every later write and read on this session.
    ///
    fn set_timeout(&mut self, handle: &mut Self::Handle, timeout: Duration) -> Result<(), TransportError>;
}
