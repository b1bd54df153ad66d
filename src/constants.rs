//! ## Constants
//!
//! Various constants used throughout the project.
//!

/// Operator-tunable bounds. Every prompt and setter validates against these.
pub mod limits {
    /// Minimum session timeout in milliseconds
    pub const TIMEOUT_MIN_MS: u32 = 1000;
    /// Maximum session timeout in milliseconds
    pub const TIMEOUT_MAX_MS: u32 = 25000;
    /// Timeout applied to a freshly opened session
    pub const DEFAULT_TIMEOUT_MS: u32 = 2500;
    /// Read budget applied to a freshly opened session
    pub const DEFAULT_READ_BYTES: usize = 1024;
    /// Largest read budget an operator may configure
    pub const MAX_READ_BYTES: usize = 1_048_576;
    /// Fewest points a marker sweep may take
    pub const SWEEP_POINTS_MIN: u32 = 21;
    /// Most points a marker sweep may take
    pub const SWEEP_POINTS_MAX: u32 = 24001;
    /// Canonical point counts offered before the custom entry
    pub const SWEEP_POINT_PRESETS: [u32; 5] = [101, 201, 401, 801, 1601];
}

/// SCPI payloads issued by the controller. Treated as opaque text.
pub mod scpi {
    pub const IDENTIFY: &str = "*IDN?";
    pub const MEMORY_CATALOG: &str = ":MMEM:CAT? \"C:\"";

    pub const START_FREQUENCY: &str = ":SENS:FREQ:STAR?";
    pub const STOP_FREQUENCY: &str = ":SENS:FREQ:STOP?";
    pub const RESOLUTION_BANDWIDTH: &str = ":SENS:BAND:RES?";
    pub const VIDEO_BANDWIDTH: &str = ":SENS:BAND:VID?";

    pub const CONTINUOUS_OFF: &str = ":INIT:CONT OFF";
    pub const CONTINUOUS_ON: &str = ":INIT:CONT ON";
    pub const MARKERS_OFF: &str = ":CALC:MARK:AOFF";
    pub const MARKER_MODE_POSITION: &str = ":CALC:MARK1:MODE POS";
    pub const MARKER_FUNCTION_OFF: &str = ":CALC:MARK1:FUNC OFF";
    pub const MARKER_COUNT_ON: &str = ":CALC:MARK1:FCO ON";
    /// Followed by a space and the frequency in Hz
    pub const MARKER_X: &str = ":CALC:MARK1:X";
    pub const MARKER_Y: &str = ":CALC:MARK1:Y?";

    /// Setup writes issued, in order, before a marker sweep
    pub const SWEEP_SETUP: [&str; 5] = [
        CONTINUOUS_OFF,
        MARKERS_OFF,
        MARKER_MODE_POSITION,
        MARKER_FUNCTION_OFF,
        MARKER_COUNT_ON,
    ];
}

pub mod usb {
    /// The class code for usbtmc
    pub const USBTMC_CLASS_CODE: u8 = 0xFE;
    /// The subclass code for usbtmc
    pub const USBTMC_SUBCLASS_CODE: u8 = 0x03;
    /// The protocol codes accepted for usbtmc (plain USBTMC and USB488)
    pub const USBTMC_PROTOCOL_CODES: [u8; 2] = [0x00, 0x01];
}

pub mod misc {
    /// The size in bytes of a USBTMC header in a bulk transfer
    pub const USBTMC_HEADER_SIZE: usize = 12;
    /// Largest single DEV_DEP_MSG transfer we issue
    pub const APPLICATION_BUFFER_SIZE: u32 = 1024 * 8;
    /// Default termination character to use (using NI-VISA default '\n')
    pub const DEFAULT_TERM_CHAR: u8 = b'\n';
}

pub mod usbtmc_status {
    /// Success
    pub const STATUS_SUCCESS: u8 = 0x01;
    /// The device has received a split transaction CHECK_STATUS request and the request is being processed
    pub const STATUS_PENDING: u8 = 0x02;
    /// The device received an INITIATE_ABORT request, but the request is not in progress
    pub const STATUS_TRANSFER_NOT_IN_PROGRESS: u8 = 0x81;
}

pub mod control_requests {
    pub const INITIATE_ABORT_BULK_OUT: u8 = 1;
    pub const CHECK_ABORT_BULK_OUT_STATUS: u8 = 2;
    pub const INITIATE_ABORT_BULK_IN: u8 = 3;
    pub const CHECK_ABORT_BULK_IN_STATUS: u8 = 4;
    pub const INITIATE_CLEAR: u8 = 5;
    pub const CHECK_CLEAR_STATUS: u8 = 6;
    pub const GET_CAPABILITIES: u8 = 7;
}

pub mod bulk_msg_id {
    pub const DEVICE_DEPENDENT_MSG_OUT: u8 = 1;
    pub const REQUEST_DEVICE_DEPENDENT_MSG_IN: u8 = 2;
    pub const DEVICE_DEPENDENT_MSG_IN: u8 = 2;
}
