//! Bulk
//!
//! Low level functions to read and write data to the bulk endpoints.
//!

use std::time::Duration;

use crate::constants::{bulk_msg_id, misc};
use crate::error::TransportError;
use crate::types::{BTag, Capabilities, Endpoint, ReadChunk};

use anyhow::{anyhow, Result};
use rusb::{Context, DeviceHandle, Direction};

/// ### Write
///
/// Write data to the BULK OUT endpoint as one or more DEV_DEP_MSG_OUT
/// transfers. EOM is set on the last one.
///
/// #### Returns
/// The number of payload bytes sent
///
pub fn write(
    handle: &DeviceHandle<Context>,
    btag: &mut BTag,
    data: &[u8],
    bulk_out_endpoint: &Endpoint,
    timeout: Duration,
) -> Result<usize> {
    if !bulk_out_endpoint.is_bulk(Direction::Out) {
        return Err(TransportError::IncorrectEndpoint.into());
    }

    let num_transactions = data
        .len()
        .div_ceil(misc::APPLICATION_BUFFER_SIZE as usize)
        .max(1);

    let mut transactions = data.chunks(misc::APPLICATION_BUFFER_SIZE as usize);
    for transaction_number in 0..num_transactions {
        let transaction = transactions.next().unwrap_or(&[]);
        let header = device_dependent_msg_out_header(
            btag.next(),
            transaction.len() as u32,
            transaction_number + 1 == num_transactions,
        );

        // header, payload, then alignment to a 4 byte boundary
        let mut message = Vec::with_capacity(misc::USBTMC_HEADER_SIZE + transaction.len() + 3);
        message.extend_from_slice(&header);
        message.extend_from_slice(transaction);
        message.resize(message.len().next_multiple_of(4), 0x00);

        handle.write_bulk(bulk_out_endpoint.address, &message, timeout)?;
    }

    Ok(data.len())
}

/// ### Read
///
/// Read a DEVICE_DEPENDENT message from the BULK IN endpoint, at most `max_bytes` of payload.
///
/// Stops at the EOM bit, at the termination character when the device supports
/// it, or when the budget is spent (reported as `end == false`).
///
pub fn read(
    handle: &DeviceHandle<Context>,
    btag: &mut BTag,
    bulk_in_endpoint: &Endpoint,
    bulk_out_endpoint: &Endpoint,
    device_capabilities: &Capabilities,
    max_bytes: usize,
    timeout: Duration,
) -> Result<ReadChunk> {
    if !bulk_out_endpoint.is_bulk(Direction::Out) || !bulk_in_endpoint.is_bulk(Direction::In) {
        return Err(TransportError::IncorrectEndpoint.into());
    }

    let term_char = device_capabilities
        .supports_bulk_in_term_char
        .then_some(misc::DEFAULT_TERM_CHAR);

    let mut output = ReadChunk::default();

    while output.data.len() < max_bytes {
        let request_size =
            (max_bytes - output.data.len()).min(misc::APPLICATION_BUFFER_SIZE as usize);
        let request_header =
            request_device_dependent_msg_in_header(btag.next(), request_size as u32, term_char);

        handle.write_bulk(bulk_out_endpoint.address, &request_header, timeout)?;

        // whole packets, or libusb reports an overflow on the final short one
        let packet = usize::from(bulk_in_endpoint.max_packet_size).max(1);
        let mut buffer =
            vec![0x00; (misc::USBTMC_HEADER_SIZE + request_size).next_multiple_of(packet)];
        let bytes_read = handle.read_bulk(bulk_in_endpoint.address, &mut buffer, timeout)?;

        let (payload, end_of_message) = parse_device_dependent_msg_in(&buffer[..bytes_read])?;
        let term_seen = term_char.is_some_and(|tc| payload.last() == Some(&tc));
        output.data.extend_from_slice(payload);

        if end_of_message || term_seen {
            output.end = true;
            break;
        }
    }

    output.data.truncate(max_bytes);
    Ok(output)
}

/// ### Parse DEV_DEP_MSG_IN
///
/// Split a bulk-in transfer into its payload and the EOM flag.
///
pub fn parse_device_dependent_msg_in(transfer: &[u8]) -> Result<(&[u8], bool)> {
    if transfer.len() < misc::USBTMC_HEADER_SIZE {
        return Err(anyhow!(
            "short bulk in transfer: {} bytes, header needs {}",
            transfer.len(),
            misc::USBTMC_HEADER_SIZE
        ));
    }
    if transfer[0] != bulk_msg_id::DEVICE_DEPENDENT_MSG_IN {
        return Err(anyhow!("unexpected bulk in message id {}", transfer[0]));
    }

    let transfer_size =
        u32::from_le_bytes([transfer[4], transfer[5], transfer[6], transfer[7]]) as usize;
    let end_of_message = transfer[8] & 0b0000_0001 != 0;

    let payload_end = (misc::USBTMC_HEADER_SIZE + transfer_size).min(transfer.len());
    Ok((&transfer[misc::USBTMC_HEADER_SIZE..payload_end], end_of_message))
}

pub fn device_dependent_msg_out_header(
    btag: u8,
    transfer_size: u32,
    end_of_message: bool,
) -> [u8; 12] {
    let mut header: [u8; 12] = [0x00; 12];

    header[0] = bulk_msg_id::DEVICE_DEPENDENT_MSG_OUT;
    header[1] = btag;
    header[2] = !btag;
    header[4..8].copy_from_slice(&transfer_size.to_le_bytes());

    if end_of_message {
        header[8] = 0b0000_0001;
    }

    header
}

pub fn request_device_dependent_msg_in_header(
    btag: u8,
    transfer_size: u32,
    term_char: Option<u8>,
) -> [u8; 12] {
    let mut header: [u8; 12] = [0x00; 12];

    header[0] = bulk_msg_id::REQUEST_DEVICE_DEPENDENT_MSG_IN;
    header[1] = btag;
    header[2] = !btag;
    header[4..8].copy_from_slice(&transfer_size.to_le_bytes());

    if let Some(tc) = term_char {
        header[8] = 0b0000_0010;
        header[9] = tc;
    }

    header
}
