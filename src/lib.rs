//! # Stimlink Library
//!
//! Driver core for StarStim/Enobio-class wearable EEG and neurostimulation
//! devices.
//!
//! The device streams `SOF ... EOF` delimited binary frames over a serial or
//! RFCOMM link. This library decodes that stream one byte at a time into a
//! [`protocol::DecodedFrame`] and builds the command frames sent back to the
//! device.

pub mod config;
pub mod error;
pub mod protocol;
pub mod serial;
pub mod session;
pub mod telemetry;
