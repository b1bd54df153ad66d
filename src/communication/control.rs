//! ## Control
//!
//! USBTMC class requests on the default control endpoint: capabilities,
//! transfer aborts and buffer clears.
//!

use std::time::{Duration, Instant};

use crate::constants::{control_requests, usbtmc_status};
use crate::error::TransportError;
use crate::types::{Capabilities, Endpoint};

use anyhow::Result;
use rusb::{Context, DeviceHandle, Direction, Recipient, RequestType};

/// bmAbortBulkIn / bmClear bit telling the host the bulk-in FIFO still holds data
const FIFO_NOT_EMPTY: u8 = 0b0000_0001;

fn class_request_in(recipient: Recipient) -> u8 {
    rusb::request_type(Direction::In, RequestType::Class, recipient)
}

fn check_status(status: u8) -> Result<()> {
    match status {
        usbtmc_status::STATUS_SUCCESS => Ok(()),
        usbtmc_status::STATUS_TRANSFER_NOT_IN_PROGRESS => {
            Err(TransportError::StatusNoTransferInProgress.into())
        }
        other => Err(TransportError::StatusFailure(other).into()),
    }
}

/// One split request: the INITIATE half followed by CHECK_*_STATUS polls.
struct SplitRequest<'h> {
    handle: &'h DeviceHandle<Context>,
    request_type: u8,
    w_index: u16,
    timeout: Duration,
}

impl SplitRequest<'_> {
    fn initiate<const N: usize>(&self, request: u8, w_value: u16) -> Result<[u8; N]> {
        let mut response = [0x00; N];
        self.handle.read_control(
            self.request_type,
            request,
            w_value,
            self.w_index,
            &mut response,
            self.timeout,
        )?;
        check_status(response[0])?;
        Ok(response)
    }

    /// Poll `request` until the device stops answering STATUS_PENDING.
    /// `on_pending` sees every pending response.
    fn poll<const N: usize>(
        &self,
        request: u8,
        on_pending: impl FnMut(&[u8; N]) -> Result<()>,
    ) -> Result<[u8; N]> {
        poll_status(
            self.timeout,
            |response| {
                self.handle.read_control(
                    self.request_type,
                    request,
                    0x0000,
                    self.w_index,
                    response,
                    self.timeout,
                )?;
                Ok(())
            },
            on_pending,
        )
    }
}

/// Repeat `fetch` while the status byte reads STATUS_PENDING, for at most `timeout`.
fn poll_status<const N: usize>(
    timeout: Duration,
    mut fetch: impl FnMut(&mut [u8; N]) -> Result<()>,
    mut on_pending: impl FnMut(&[u8; N]) -> Result<()>,
) -> Result<[u8; N]> {
    let deadline = Instant::now() + timeout;
    let mut response = [0x00; N];
    loop {
        fetch(&mut response)?;
        if response[0] != usbtmc_status::STATUS_PENDING {
            check_status(response[0])?;
            return Ok(response);
        }
        if Instant::now() >= deadline {
            return Err(TransportError::StatusPending(timeout).into());
        }
        on_pending(&response)?;
    }
}

/// Byte count reported in bytes 4..8 of a CHECK_ABORT_*_STATUS response
fn transferred(response: &[u8; 8]) -> usize {
    u32::from_le_bytes([response[4], response[5], response[6], response[7]]) as usize
}

pub fn get_capabilities(
    handle: &DeviceHandle<Context>,
    interface_number: u8,
    timeout: Duration,
) -> Result<Capabilities> {
    let mut buffer = [0x00; 0x18];
    handle.read_control(
        class_request_in(Recipient::Interface),
        control_requests::GET_CAPABILITIES,
        0x0000,
        u16::from(interface_number),
        &mut buffer,
        timeout,
    )?;
    check_status(buffer[0])?;

    let interface_capabilities = buffer[4];
    let device_capabilities = buffer[5];

    Ok(Capabilities {
        bcd_version: u16::from_le_bytes([buffer[2], buffer[3]]),
        is_talk_only: interface_capabilities & 0b0000_0010 != 0,
        is_listen_only: interface_capabilities & 0b0000_0001 != 0,
        supports_bulk_in_term_char: device_capabilities & 0b0000_0001 != 0,
    })
}

/// ### Abort Bulk Out Transfer
///
/// Abort the bulk out transfer tagged `transfer_btag`.
///
/// #### Returns
/// Returns the number of bytes the device received before aborting
///
pub fn abort_bulk_out_transfer(
    handle: &DeviceHandle<Context>,
    bulk_out_endpoint: &Endpoint,
    transfer_btag: u8,
    timeout: Duration,
) -> Result<usize> {
    if !bulk_out_endpoint.is_bulk(Direction::Out) {
        return Err(TransportError::IncorrectEndpoint.into());
    }

    let request = SplitRequest {
        handle,
        request_type: class_request_in(Recipient::Endpoint),
        w_index: u16::from(bulk_out_endpoint.address),
        timeout,
    };
    request.initiate::<2>(control_requests::INITIATE_ABORT_BULK_OUT, u16::from(transfer_btag))?;
    let status = request.poll::<8>(control_requests::CHECK_ABORT_BULK_OUT_STATUS, |_| Ok(()))?;

    Ok(transferred(&status))
}

/// ### Abort Bulk In Transfer
///
/// Abort the bulk in transfer tagged `transfer_btag`, draining whatever the
/// device still has queued.
///
/// #### Returns
/// Returns the number of bytes the device sent to the host
///
pub fn abort_bulk_in_transfer(
    handle: &DeviceHandle<Context>,
    bulk_in_endpoint: &Endpoint,
    transfer_btag: u8,
    timeout: Duration,
) -> Result<usize> {
    if !bulk_in_endpoint.is_bulk(Direction::In) {
        return Err(TransportError::IncorrectEndpoint.into());
    }

    let request = SplitRequest {
        handle,
        request_type: class_request_in(Recipient::Endpoint),
        w_index: u16::from(bulk_in_endpoint.address),
        timeout,
    };
    request.initiate::<2>(control_requests::INITIATE_ABORT_BULK_IN, u16::from(transfer_btag))?;

    let mut drain = vec![0x00; usize::from(bulk_in_endpoint.max_packet_size).max(64)];
    let status = request.poll::<8>(control_requests::CHECK_ABORT_BULK_IN_STATUS, |pending| {
        // the FIFO has to be read before the device finishes the abort
        if pending[1] & FIFO_NOT_EMPTY != 0 {
            handle.read_bulk(bulk_in_endpoint.address, &mut drain, timeout)?;
        }
        Ok(())
    })?;

    Ok(transferred(&status))
}

/// ### Clear Buffers
///
/// Clear all input and output buffers associated to the device.
///
/// **WARNING: must abort all BULK transfers and prevent new ones before using this command.**
///
pub fn clear_buffers(
    handle: &DeviceHandle<Context>,
    interface_number: u8,
    timeout: Duration,
) -> Result<()> {
    let request = SplitRequest {
        handle,
        request_type: class_request_in(Recipient::Interface),
        w_index: u16::from(interface_number),
        timeout,
    };
    request.initiate::<1>(control_requests::INITIATE_CLEAR, 0x0000)?;
    request.poll::<2>(control_requests::CHECK_CLEAR_STATUS, |pending| {
        if pending[1] & FIFO_NOT_EMPTY != 0 {
            return Err(TransportError::BulkInFIFONotEmpty.into());
        }
        Ok(())
    })?;

    Ok(())
}

/// Clear any halt on `endpoint`.
pub fn clear_feature(handle: &mut DeviceHandle<Context>, endpoint: &Endpoint) -> Result<()> {
    handle.clear_halt(endpoint.address)?;
    Ok(())
}
