//! # Protocol Constants
//!
//! Markers, bit masks and limits of the device wire format.

/// Start-of-frame marker
pub const START_MARKER: [u8; 3] = *b"SOF";

/// End-of-frame marker
pub const END_MARKER: [u8; 3] = *b"EOF";

/// Marker length in bytes
pub const MARKER_SIZE: usize = 3;

/// Smallest legal frame: marker(3) + length(2) + status(1) + content(1) + marker(3)
pub const MIN_FRAME_LENGTH: u16 = 10;

/// Size of an outbound frame header: marker(3) + length(2) + action(1) + content(1)
pub const COMMAND_HEADER_SIZE: usize = 7;

/// Offset of the low length byte in an outbound frame
pub const LENGTH_OFFSET_LOW: usize = 3;

/// Offset of the high length byte in an outbound frame
pub const LENGTH_OFFSET_HIGH: usize = 4;

/// Offset of the action byte in an outbound frame
pub const ACTION_OFFSET: usize = 5;

/// Offset of the content byte in an outbound frame
pub const CONTENT_OFFSET: usize = 6;

// Status byte 0 (device → host)

/// Command toggle, flips each time the device accepts a command
pub const STATUS_COMMAND_TOGGLE: u8 = 0x80;

/// Device status field
pub const STATUS_DEVICE_STATUS_MASK: u8 = 0x70;

/// Device error nibble
pub const STATUS_ERROR_MASK: u8 = 0x0F;

/// SD card recording flag (aliases bit 3 of the error nibble)
pub const STATUS_SD_CARD_RECORDING: u8 = 0x08;

/// Raw status bit watched by the artifact heuristic
pub const STATUS_ARTIFACT_BIT: u8 = 0x02;

// Content byte 0 (device → host presence bitmap)

pub const CONTENT_REG_CONFIG: u8 = 0x01;
pub const CONTENT_EEG: u8 = 0x02;
pub const CONTENT_ACCEL: u8 = 0x04;
pub const CONTENT_STIM: u8 = 0x08;
pub const CONTENT_STIM_IMPEDANCE: u8 = 0x10;
pub const CONTENT_PROFILE: u8 = 0x40;
pub const CONTENT_FIRMWARE_VERSION: u8 = 0x80;

// Action byte (host → device)

pub const ACTION_START_EEG: u8 = 0x01;
pub const ACTION_STOP_EEG: u8 = 0x02;
pub const ACTION_START_STIM: u8 = 0x04;
pub const ACTION_STOP_STIM: u8 = 0x08;
pub const ACTION_START_IMPEDANCE: u8 = 0x10;
pub const ACTION_STOP_IMPEDANCE: u8 = 0x20;
pub const ACTION_START_BEACON: u8 = 0x40;
pub const ACTION_STOP_BEACON: u8 = 0x80;

// Content byte (host → device)

pub const REQUEST_REGISTER_READ: u8 = 0x01;
pub const REQUEST_REGISTER_WRITE: u8 = 0x02;
pub const REQUEST_PROFILE: u8 = 0x04;
pub const REQUEST_NULL: u8 = 0x08;

// Limits

/// EEG channels addressable by the 32-bit channel bitmap
pub const MAX_EEG_CHANNELS: usize = 32;

/// Stimulation channels read from the stimulation bitmaps
pub const MAX_STIM_CHANNELS: usize = 32;

/// Samples per frame (the sample count is a single byte)
pub const MAX_SAMPLES_PER_FRAME: usize = 255;

/// Registers per block (the register count is a single byte)
pub const MAX_REGISTERS_PER_BLOCK: usize = 255;

/// Accelerometer axes
pub const ACCEL_AXES: usize = 3;

/// Raw bytes kept for framing-error diagnostics
pub const DIAGNOSTIC_HISTORY_SIZE: usize = 300;

/// Normalized artifact level above which the heuristic may switch itself off
pub const ARTIFACT_THRESHOLD: i32 = 1000;

/// Firmware versions from this one on no longer need the artifact heuristic
pub const ARTIFACT_FIRMWARE_CUTOFF: u16 = 593;

/// Consecutive frames with the artifact status bit before the heuristic trips
pub const ARTIFACT_CONSECUTIVE_FRAMES: i32 = 2;
