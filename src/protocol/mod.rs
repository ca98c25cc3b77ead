//! # Device Protocol Module
//!
//! Implementation of the framed binary protocol spoken by the device.
//!
//! This module handles:
//! - Byte-at-a-time decoding of `SOF`/`EOF` delimited frames
//! - Bitmap-driven EEG, register, stimulation, impedance, profile and
//!   accelerometer blocks
//! - Three EEG compression schemes (none, 16-bit delta, 12-bit packed)
//! - Artifact heuristic for older firmware
//! - Encoding of outbound command frames

pub mod artifact;
pub mod constants;
pub mod decoder;
pub mod diagnostics;
pub mod encoder;
pub mod frame;
pub mod state;

#[cfg(test)]
pub(crate) mod fixtures;

pub use decoder::{Compression, DecoderConfig, DecoderStats, ProtocolDecoder};
pub use encoder::Command;
pub use frame::DecodedFrame;
