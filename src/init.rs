//! ## Initialization
//!
//! A set of functions to help initialize a connection to the device.
//!

use crate::{
    constants::usb::*,
    error::TransportError,
    types::{DeviceAddr, DeviceId, DeviceInfo, DeviceMode, Endpoint, UsbtmcEndpoints},
};

use anyhow::Result;
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};
use tracing::warn;

fn is_usbtmc_interface(class_code: u8, sub_class_code: u8, protocol_code: u8) -> bool {
    class_code == USBTMC_CLASS_CODE
        && sub_class_code == USBTMC_SUBCLASS_CODE
        && USBTMC_PROTOCOL_CODES.contains(&protocol_code)
}

/// First configuration/interface/setting triple exposing a USBTMC interface.
fn find_usbtmc_mode<T: UsbContext>(
    device: &Device<T>,
    device_desc: &DeviceDescriptor,
) -> Result<Option<DeviceMode>> {
    for index in 0..device_desc.num_configurations() {
        let config_desc = device.config_descriptor(index)?;
        let mode = config_desc
            .interfaces()
            .flat_map(|interface| interface.descriptors())
            .find(|setting| {
                is_usbtmc_interface(setting.class_code(), setting.sub_class_code(), setting.protocol_code())
            })
            .map(|setting| DeviceMode {
                config_number: config_desc.number(),
                interface_number: setting.interface_number(),
                setting_number: setting.setting_number(),
                has_kernel_driver: false,
            });
        if mode.is_some() {
            return Ok(mode);
        }
    }

    Ok(None)
}

/// `Some` when `device` exposes a USBTMC interface.
fn probe_device<T: UsbContext>(device: &Device<T>) -> Result<Option<DeviceInfo>> {
    let device_desc = device.device_descriptor()?;
    Ok(find_usbtmc_mode(device, &device_desc)?.map(|_| device_info(device, &device_desc)))
}

/// Keep the devices `probe` recognizes. A probe failure fails the whole scan.
fn scan<D>(
    devices: impl IntoIterator<Item = D>,
    mut probe: impl FnMut(&D) -> Result<Option<DeviceInfo>>,
) -> Result<Vec<DeviceInfo>> {
    devices
        .into_iter()
        .filter_map(|device| probe(&device).transpose())
        .collect()
}

fn device_info<T: UsbContext>(device: &Device<T>, device_desc: &DeviceDescriptor) -> DeviceInfo {
    DeviceInfo {
        id: DeviceId {
            vendor_id: device_desc.vendor_id(),
            product_id: device_desc.product_id(),
        },
        address: DeviceAddr {
            bus: device.bus_number(),
            device: device.address(),
        },
    }
}

/// ### List Devices
///
/// List all TMC devices using a libusb context, in bus enumeration order.
///
/// A device whose descriptors cannot be read fails the listing instead of
/// being left out of it.
///
pub fn list_devices<T: UsbContext>(context: &T) -> Result<Vec<DeviceInfo>> {
    scan(context.devices()?.iter(), |device| {
        probe_device(device).map_err(|err| {
            warn!(
                bus = device.bus_number(),
                address = device.address(),
                error = %err,
                "cannot read usb descriptors"
            );
            err
        })
    })
}

/// ### Open Device
///
/// Open the TMC device matching both the identifiers and the bus address of `info`.
///
pub fn open_device<T: UsbContext>(
    context: &T,
    info: &DeviceInfo,
) -> Result<(Device<T>, DeviceHandle<T>)> {
    for device in context.devices()?.iter() {
        // another device's unreadable descriptors must not block this open
        let Ok(Some(found)) = probe_device(&device) else {
            continue;
        };
        if found == *info {
            let handle = device.open()?;
            return Ok((device, handle));
        }
    }

    Err(TransportError::DeviceNotFound.into())
}

/// ### Get USBTMC Mode
///
/// Get the device mode (configuration, interface and interface setting) that is compatible with USBTMC.
///
pub fn get_usbtmc_mode(device: &Device<Context>) -> Result<DeviceMode> {
    let device_desc = device.device_descriptor()?;
    find_usbtmc_mode(device, &device_desc)?.ok_or_else(|| TransportError::DeviceIncompatible.into())
}

/// ### Detach Kernel Driver
///
/// If the interface uses a kernel driver, detach it for the duration of the session.
///
pub fn detach_kernel_driver(
    mode: &mut DeviceMode,
    handle: &mut DeviceHandle<Context>,
) -> Result<()> {
    mode.has_kernel_driver = match handle.kernel_driver_active(mode.interface_number) {
        Ok(true) => {
            handle.detach_kernel_driver(mode.interface_number)?;
            true
        }
        _ => false,
    };

    Ok(())
}

/// ### Get Endpoints
///
/// Find the bulk endpoints of the USBTMC interface.
///
pub fn get_endpoints(mode: &DeviceMode, device: &Device<Context>) -> Result<UsbtmcEndpoints> {
    // config numbers are 1-based, descriptor indices are not
    let config_desc = device.config_descriptor(mode.config_number.saturating_sub(1))?;
    let interface = config_desc
        .interfaces()
        .find(|inter| inter.number() == mode.interface_number)
        .ok_or(TransportError::InterfaceNotFound)?;
    let interface_desc = interface
        .descriptors()
        .find(|d| d.setting_number() == mode.setting_number)
        .ok_or(TransportError::InterfaceSettingNotFound)?;

    let endpoints: Vec<Endpoint> = interface_desc
        .endpoint_descriptors()
        .map(|endpoint| Endpoint {
            address: endpoint.address(),
            max_packet_size: endpoint.max_packet_size(),
            transfer_type: endpoint.transfer_type(),
            direction: endpoint.direction(),
        })
        .collect();

    let find_bulk = |direction: Direction| {
        endpoints
            .iter()
            .find(|ep| ep.transfer_type == TransferType::Bulk && ep.direction == direction)
            .cloned()
    };

    Ok(UsbtmcEndpoints {
        bulk_out_ep: find_bulk(Direction::Out).ok_or(TransportError::BulkOutEndpointNotFound)?,
        bulk_in_ep: find_bulk(Direction::In).ok_or(TransportError::BulkInEndpointNotFound)?,
    })
}
