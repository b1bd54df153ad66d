//! ## Types
//!
//! The different types used across the crate
//!

use std::fmt;
use std::str::FromStr;

use rusb::{Direction, TransferType};

use crate::error::TransportError;

/// ### Resource Descriptor
///
/// Opaque, transport-defined identifier for a discoverable instrument.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor(String);

impl ResourceDescriptor {
    pub fn new(descriptor: impl Into<String>) -> Self {
        ResourceDescriptor(descriptor.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ### Read Chunk
///
/// Bytes returned by a single transport read.
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadChunk {
    pub data: Vec<u8>,
    /// A termination character or END indicator was seen
    pub end: bool,
}

/// ### Read Status
///
/// Classification of a successful read.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The message ended with a termination character or END indicator
    Complete,
    /// The read budget ran out before the message ended
    Truncated,
}

/// ### Write Result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub command: String,
    pub bytes_written: usize,
}

/// ### Exchange Result
///
/// The outcome of one successful read.
///
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeResult {
    pub status: ReadStatus,
    pub data: Vec<u8>,
}

impl ExchangeResult {
    pub fn byte_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_truncated(&self) -> bool {
        self.status == ReadStatus::Truncated
    }

    /// Response decoded as text, without surrounding whitespace or terminators.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).trim().to_string()
    }
}

/// ### Device Identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// ### Device Address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddr {
    pub bus: u8,
    pub device: u8,
}

/// ### Device Info
///
/// Enough to find a USBTMC device again after discovery.
///
/// Rendered as `USB<bus>::0x<VID>::0x<PID>::<address>::INSTR`.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub address: DeviceAddr,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "USB{}::0x{:04X}::0x{:04X}::{}::INSTR",
            self.address.bus, self.id.vendor_id, self.id.product_id, self.address.device
        )
    }
}

impl FromStr for DeviceInfo {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TransportError::MalformedDescriptor(s.to_string());

        let parts: Vec<&str> = s.split("::").collect();
        let [bus, vid, pid, device, "INSTR"] = parts.as_slice() else {
            return Err(malformed());
        };

        let bus = bus
            .strip_prefix("USB")
            .and_then(|b| b.parse::<u8>().ok())
            .ok_or_else(malformed)?;
        let hex = |v: &str| {
            v.strip_prefix("0x")
                .or_else(|| v.strip_prefix("0X"))
                .and_then(|h| u16::from_str_radix(h, 16).ok())
        };
        let vendor_id = hex(*vid).ok_or_else(malformed)?;
        let product_id = hex(*pid).ok_or_else(malformed)?;
        let device = device.parse::<u8>().map_err(|_| malformed())?;

        Ok(DeviceInfo {
            id: DeviceId {
                vendor_id,
                product_id,
            },
            address: DeviceAddr { bus, device },
        })
    }
}

/// ### bTag
///
/// The bTag element used to identify a bulk request.
///
/// Each time this value is called, it is incremented. If it increments past 255, it wraps around to 1.
///
#[derive(Debug, Clone)]
pub struct BTag(u8);

impl BTag {
    /// ### New
    ///
    /// Return a fresh bTag set at the value 1.
    ///
    pub fn new() -> BTag {
        BTag(1)
    }

    /// ### Next
    ///
    /// Return the current bTag value and advance it.
    ///
    pub fn next(&mut self) -> u8 {
        let btag = self.0;
        self.0 = if btag == 255 { 1 } else { btag + 1 };
        btag
    }

    /// ### Last
    ///
    /// The value handed out by the previous call to `next`.
    ///
    pub fn last(&self) -> u8 {
        if self.0 == 1 {
            255
        } else {
            self.0 - 1
        }
    }
}

impl Default for BTag {
    fn default() -> Self {
        BTag::new()
    }
}

/// ### Device Mode
///
/// A collection of the configuration, interface and interface number. Also if the interface has a kernel driver attached.
///
#[derive(Debug, Clone, Default)]
pub struct DeviceMode {
    /// The USB configuration number
    pub config_number: u8,
    /// The interface number specific to the configuration
    pub interface_number: u8,
    /// The setting number specific to the interface
    pub setting_number: u8,
    /// If the device has a kernel driver. Important for returning control to the OS (on Linux).
    pub has_kernel_driver: bool,
}

/// ### Endpoint
///
/// Properties of an endpoint.
///
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Address of the endpoint on the interface
    pub address: u8,
    /// The maximal size a packet can have on this endpoint
    pub max_packet_size: u16,
    /// The transfer type of the endpoint (for USBTMC, Bulk or Interrupt)
    pub transfer_type: TransferType,
    /// The direction of the endpoint (for USBTMC, In or Out)
    pub direction: Direction,
}

impl Endpoint {
    pub fn is_bulk(&self, direction: Direction) -> bool {
        self.transfer_type == TransferType::Bulk && self.direction == direction
    }
}

/// ### USBTMC Endpoints
///
/// The bulk endpoint pair of a USBTMC interface.
///
#[derive(Clone, Debug)]
pub struct UsbtmcEndpoints {
    /// The mandatory BULK OUT endpoint
    pub bulk_out_ep: Endpoint,
    /// The mandatory BULK IN endpoint
    pub bulk_in_ep: Endpoint,
}

/// ### Capabilities
///
/// The collected capabilities of a USBTMC device.
///
#[derive(Clone, Debug)]
pub struct Capabilities {
    pub bcd_version: u16,
    /// Only sends data to the controller
    pub is_talk_only: bool,
    /// Only accepts data from the controller
    pub is_listen_only: bool,
    /// When returning data, it has a terminator character in the data
    pub supports_bulk_in_term_char: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_info_descriptor_parses_back() {
        let info = DeviceInfo {
            id: DeviceId {
                vendor_id: 0x0957,
                product_id: 0x1796,
            },
            address: DeviceAddr { bus: 3, device: 12 },
        };
        let rendered = info.to_string();
        assert_eq!(rendered, "USB3::0x0957::0x1796::12::INSTR");
        assert_eq!(rendered.parse::<DeviceInfo>().unwrap(), info);
    }

    #[test]
    fn foreign_descriptors_are_rejected() {
        for s in ["GPIB0::1::INSTR", "USB0::0x0957::0x1796::MY123::INSTR", "USB0::1796::0x1::1::INSTR", ""] {
            assert!(matches!(
                s.parse::<DeviceInfo>(),
                Err(TransportError::MalformedDescriptor(_))
            ));
        }
    }

    #[test]
    fn btag_wraps_past_255_to_one() {
        let mut btag = BTag(254);
        assert_eq!(btag.next(), 254);
        assert_eq!(btag.next(), 255);
        assert_eq!(btag.next(), 1);
        assert_eq!(btag.last(), 1);
    }

    #[test]
    fn exchange_text_strips_terminator() {
        let result = ExchangeResult {
            status: ReadStatus::Complete,
            data: b"KEYSIGHT,N9020A,MY1234,A.1\n".to_vec(),
        };
        assert_eq!(result.text(), "KEYSIGHT,N9020A,MY1234,A.1");
        assert_eq!(result.byte_count(), 27);
        assert!(!result.is_truncated());
    }
}
