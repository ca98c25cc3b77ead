//! # Serial Communication Module
//!
//! Handles the byte transport to the device.
//!
//! This module handles:
//! - Opening a serial port or a bound RFCOMM device node
//! - Trying a list of candidate device paths in order
//! - Exposing the open port through [`SerialPortIO`] so the session code can
//!   be tested against a mock

pub mod port_trait;

pub use port_trait::{SerialPortIO, TokioSerialPort};

use crate::error::{Result, StimlinkError};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Default baud rate of the device link
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/rfcomm0", // Bluetooth RFCOMM bound with `rfcomm bind`
    "/dev/ttyUSB0", // USB-to-serial adapters
    "/dev/ttyACM0", // USB CDC devices
];

/// Device Serial Port Handler
///
/// Owns the connection to one device.
pub struct DeviceSerial {
    port: TokioSerialPort,
    /// Device path (e.g., /dev/rfcomm0)
    device_path: String,
}

impl std::fmt::Debug for DeviceSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl DeviceSerial {
    /// Open the first default device path that works
    ///
    /// # Errors
    ///
    /// Returns [`StimlinkError::SerialPortNotFound`] if no path could be opened
    pub fn open(baud_rate: u32) -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Open the first of `paths` that works
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/rfcomm0"])
    /// * `baud_rate` - Line speed
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Successfully opened device at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port: TokioSerialPort::new(port),
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(StimlinkError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| StimlinkError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Path of the opened device
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Hand the port over to a session
    pub fn into_port(self) -> TokioSerialPort {
        self.port
    }
}

/// Candidate paths: the configured one first, then the defaults
pub fn candidate_paths(configured: &str) -> Vec<&str> {
    let mut paths = Vec::with_capacity(DEFAULT_DEVICE_PATHS.len() + 1);
    if !configured.is_empty() {
        paths.push(configured);
    }
    for &path in DEFAULT_DEVICE_PATHS {
        if path != configured {
            paths.push(path);
        }
    }
    paths
}
