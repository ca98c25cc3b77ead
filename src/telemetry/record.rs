//! Serializable view of an accepted frame.

use serde::Serialize;

use crate::protocol::DecodedFrame;

/// One JSONL line
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FrameRecord {
    /// Host receive time, RFC 3339
    pub received_at: String,
    pub status: StatusRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eeg: Option<EegRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registers: Option<Vec<(u16, u8)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stimulation: Option<Vec<(u8, i32)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stim_impedance: Option<Vec<(u8, i32)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerometer: Option<[i16; 3]>,
    pub artifact_level: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusRecord {
    pub raw: u8,
    pub device_status: u8,
    pub device_mode: u8,
    pub error: u8,
    pub command_toggle: bool,
    pub sd_card_recording: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EegRecord {
    pub timestamp: u32,
    pub channels: Vec<u8>,
    /// `samples[s][i]` is the value of `channels[i]` at sample `s`
    pub samples: Vec<Vec<i32>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProfileRecord {
    pub battery: i32,
    pub firmware_version: u16,
    pub synch_t1: u32,
    pub synch_t2: u32,
    pub device_type: u8,
    pub num_channels: u8,
}

impl FrameRecord {
    pub fn from_frame(frame: &DecodedFrame, received_at: String) -> Self {
        let eeg = (frame.has_eeg && frame.sample_count > 0).then(|| EegRecord {
            timestamp: frame.eeg_timestamp,
            channels: frame.eeg_channels().collect(),
            samples: (0..frame.sample_count).map(|s| frame.eeg_sample_row(s)).collect(),
        });

        let stimulation = frame.has_stim.then(|| {
            frame
                .stim_channels()
                .filter_map(|ch| frame.stim_value(ch).map(|v| (ch, v)))
                .collect()
        });

        let stim_impedance = frame.has_stim_impedance.then(|| {
            frame
                .stim_impedance_channels()
                .filter_map(|ch| frame.stim_impedance(ch).map(|v| (ch, v)))
                .collect()
        });

        let profile = frame.has_profile.then(|| ProfileRecord {
            battery: frame.battery,
            firmware_version: frame.firmware_version,
            synch_t1: frame.synch_t1,
            synch_t2: frame.synch_t2,
            device_type: frame.device_type,
            num_channels: frame.num_channels,
        });

        Self {
            received_at,
            status: StatusRecord {
                raw: frame.raw_status,
                device_status: frame.device_status_code,
                device_mode: frame.device_mode,
                error: frame.device_error_code,
                command_toggle: frame.command_toggle,
                sd_card_recording: frame.sd_card_recording,
            },
            eeg,
            registers: frame.has_reg_config.then(|| frame.registers.clone()),
            stimulation,
            stim_impedance,
            profile,
            accelerometer: frame.has_accel.then_some(frame.accelerometer),
            artifact_level: frame.artifact_level,
        }
    }
}
