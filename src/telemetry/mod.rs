//! # Telemetry Module
//!
//! Handles recording of decoded frames to JSONL files with rotation.
//!
//! This module handles:
//! - Converting accepted frames into serializable records
//! - Formatting as JSONL (JSON Lines)
//! - Writing to rotating files (max N records per file)
//! - Retaining only the last M files

pub mod record;
pub mod recorder;

pub use record::FrameRecord;
pub use recorder::FrameRecorder;
