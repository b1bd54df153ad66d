//! ## USBTMC Transport
//!
//! [`Transport`] over libusb for instruments implementing the USBTMC protocol.
//!
//! Discovery lists every USB device exposing a USBTMC (or USB488) interface.
//! Each gets a descriptor of the form `USB<bus>::0x<VID>::0x<PID>::<address>::INSTR`,
//! which [`UsbtmcTransport::open`] parses back to find the same device.
//!

use std::time::Duration;

use anyhow::Result;
use rusb::{Context, DeviceHandle};
use tracing::{debug, warn};

use crate::communication::{bulk, control};
use crate::constants::limits::DEFAULT_TIMEOUT_MS;
use crate::error::TransportError;
use crate::init;
use crate::transport::Transport;
use crate::types::{
    BTag, Capabilities, DeviceInfo, DeviceMode, ReadChunk, ResourceDescriptor, UsbtmcEndpoints,
};

/// ### UsbtmcClient
///
/// Session to a USBTMC device. The interface stays claimed until the client
/// is closed or dropped.
///
#[derive(Debug)]
pub struct UsbtmcClient {
    resource: ResourceDescriptor,
    handle: DeviceHandle<Context>,
    mode: DeviceMode,
    timeout: Duration,
    capabilities: Capabilities,
    btag: BTag,
    endpoints: UsbtmcEndpoints,
    released: bool,
}

impl UsbtmcClient {
    /// ### Connect
    ///
    /// Open the USB device described by `info` and initialize it.
    ///
    fn connect(context: &Context, info: &DeviceInfo, resource: ResourceDescriptor) -> Result<Self> {
        let (device, mut handle) = init::open_device(context, info)?;

        // GET THE DEVICE MODE
        // ==========
        let mut mode = init::get_usbtmc_mode(&device)?;
        init::detach_kernel_driver(&mut mode, &mut handle)?;

        // GET ENDPOINTS
        // ==========
        let endpoints = init::get_endpoints(&mode, &device)?;

        // CONFIGURE DEVICE
        // ==========
        // the device is usually configured already and some OSes refuse a reconfigure
        if handle.active_configuration().ok() != Some(mode.config_number) {
            handle.set_active_configuration(mode.config_number)?;
        }
        handle.claim_interface(mode.interface_number)?;
        handle.set_alternate_setting(mode.interface_number, mode.setting_number)?;

        let timeout = Duration::from_millis(u64::from(DEFAULT_TIMEOUT_MS));

        // GET CAPABILITIES
        // ==========
        let capabilities = control::get_capabilities(&handle, mode.interface_number, timeout)?;
        debug!(%resource, ?capabilities, "usbtmc capabilities");

        // CLEAR THE BUFFERS AND FEATURES
        // ==========
        control::clear_buffers(&handle, mode.interface_number, timeout)?;
        control::clear_feature(&mut handle, &endpoints.bulk_out_ep)?;
        control::clear_feature(&mut handle, &endpoints.bulk_in_ep)?;

        Ok(UsbtmcClient {
            resource,
            handle,
            mode,
            timeout,
            capabilities,
            btag: BTag::new(),
            endpoints,
            released: false,
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let written = bulk::write(
            &self.handle,
            &mut self.btag,
            data,
            &self.endpoints.bulk_out_ep,
            self.timeout,
        );

        if written.is_err() {
            // the device may still hold part of the message; drop it
            if let Err(err) = control::abort_bulk_out_transfer(
                &self.handle,
                &self.endpoints.bulk_out_ep,
                self.btag.last(),
                self.timeout,
            ) {
                warn!(resource = %self.resource, error = %err, "bulk out abort failed");
            }
        }

        written
    }

    fn read(&mut self, max_bytes: usize) -> Result<ReadChunk> {
        let chunk = bulk::read(
            &self.handle,
            &mut self.btag,
            &self.endpoints.bulk_in_ep,
            &self.endpoints.bulk_out_ep,
            &self.capabilities,
            max_bytes,
            self.timeout,
        );

        if chunk.is_err() {
            // resynchronise so the next exchange does not see stale data
            if let Err(err) = control::abort_bulk_in_transfer(
                &self.handle,
                &self.endpoints.bulk_in_ep,
                self.btag.last(),
                self.timeout,
            ) {
                warn!(resource = %self.resource, error = %err, "bulk in abort failed");
            }
        }

        chunk
    }

    /// ### Release
    ///
    /// Release the interface and give the kernel driver back if we took it.
    ///
    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        self.handle.release_interface(self.mode.interface_number)?;
        if self.mode.has_kernel_driver {
            self.handle.attach_kernel_driver(self.mode.interface_number)?;
        }

        Ok(())
    }
}

impl Drop for UsbtmcClient {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(resource = %self.resource, error = %err, "failed to release usb interface");
        }
    }
}

/// ### UsbtmcTransport
///
/// libusb context shared by every session it opens.
///
pub struct UsbtmcTransport {
    context: Context,
}

impl UsbtmcTransport {
    pub fn new() -> Result<Self, TransportError> {
        Ok(UsbtmcTransport {
            context: Context::new()?,
        })
    }
}

impl Transport for UsbtmcTransport {
    type Handle = UsbtmcClient;

    fn discover(&mut self) -> Result<Vec<ResourceDescriptor>, TransportError> {
        Ok(init::list_devices(&self.context)?
            .iter()
            .map(|info| ResourceDescriptor::new(info.to_string()))
            .collect())
    }

    fn open(&mut self, resource: &ResourceDescriptor) -> Result<UsbtmcClient, TransportError> {
        let info: DeviceInfo = resource.as_str().parse()?;
        Ok(UsbtmcClient::connect(&self.context, &info, resource.clone())?)
    }

    fn close(&mut self, mut handle: UsbtmcClient) -> Result<(), TransportError> {
        Ok(handle.release()?)
    }

    fn write(&mut self, handle: &mut UsbtmcClient, data: &[u8]) -> Result<usize, TransportError> {
        Ok(handle.write(data)?)
    }

    fn read(
        &mut self,
        handle: &mut UsbtmcClient,
        max_bytes: usize,
    ) -> Result<ReadChunk, TransportError> {
        Ok(handle.read(max_bytes)?)
    }

    fn set_timeout(
        &mut self,
        handle: &mut UsbtmcClient,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        handle.timeout = timeout;
        Ok(())
    }
}
