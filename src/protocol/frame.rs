//! # Decoded Frame
//!
//! Content of the most recently accepted device frame.

use super::constants::*;

/// EEG sample storage, indexed `[sample][channel]`
type SampleTable = [[i32; MAX_EEG_CHANNELS]; MAX_SAMPLES_PER_FRAME];

/// Content of one fully parsed device frame
///
/// Per-channel data is stored in fixed-size tables; a value is only
/// meaningful when the matching bit is set in its channel mask. Use the
/// accessor methods rather than indexing the tables directly.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Status byte 0 as received
    pub raw_status: u8,

    /// Device status, bits 6..4 of status byte 0
    pub device_status_code: u8,

    /// Alternate status encoding, bits 6..3 of status byte 0
    pub device_mode: u8,

    /// Device error nibble
    pub device_error_code: u8,

    /// Alternates each time the device acknowledges a command
    pub command_toggle: bool,

    /// Device is recording to its SD card
    pub sd_card_recording: bool,

    pub has_reg_config: bool,
    pub has_eeg: bool,
    pub has_accel: bool,
    pub has_stim: bool,
    pub has_stim_impedance: bool,
    pub has_profile: bool,
    pub has_firmware_version: bool,

    /// Bit `i` set when channel `i` carries EEG data in this frame
    pub eeg_channel_mask: u32,

    /// Samples per EEG channel in this frame
    pub sample_count: u8,

    /// Device timestamp of the EEG block
    pub eeg_timestamp: u32,

    samples: Box<SampleTable>,

    /// First address of the register block
    pub register_start_address: u16,

    /// Registers carried by the register block
    pub register_count: u8,

    /// `(address, value)` pairs in wire order
    pub registers: Vec<(u16, u8)>,

    pub stim_channel_mask: u32,
    stim_data: [i32; MAX_STIM_CHANNELS],

    pub stim_impedance_channel_mask: u32,
    stim_impedance: [i32; MAX_STIM_CHANNELS],

    pub battery: i32,
    pub firmware_version: u16,
    pub synch_t1: u32,
    pub synch_t2: u32,
    pub device_type: u8,
    pub num_channels: u8,

    /// X, Y, Z
    pub accelerometer: [i16; ACCEL_AXES],

    /// Normalized artifact metric of this frame
    pub artifact_level: i32,
}

impl Default for DecodedFrame {
    fn default() -> Self {
        Self {
            raw_status: 0,
            device_status_code: 0,
            device_mode: 0,
            device_error_code: 0,
            command_toggle: false,
            sd_card_recording: false,
            has_reg_config: false,
            has_eeg: false,
            has_accel: false,
            has_stim: false,
            has_stim_impedance: false,
            has_profile: false,
            has_firmware_version: false,
            eeg_channel_mask: 0,
            sample_count: 0,
            eeg_timestamp: 0,
            samples: Box::new([[0; MAX_EEG_CHANNELS]; MAX_SAMPLES_PER_FRAME]),
            register_start_address: 0,
            register_count: 0,
            registers: Vec::with_capacity(MAX_REGISTERS_PER_BLOCK),
            stim_channel_mask: 0,
            stim_data: [0; MAX_STIM_CHANNELS],
            stim_impedance_channel_mask: 0,
            stim_impedance: [0; MAX_STIM_CHANNELS],
            battery: 0,
            firmware_version: 0,
            synch_t1: 0,
            synch_t2: 0,
            device_type: 0,
            num_channels: 0,
            accelerometer: [0; ACCEL_AXES],
            artifact_level: 0,
        }
    }
}

impl DecodedFrame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every per-frame field before a new frame is parsed into this one
    ///
    /// Table contents are left in place; the masks and counts that guard
    /// them are zeroed. No memory is released or allocated.
    pub(crate) fn clear(&mut self) {
        self.raw_status = 0;
        self.device_status_code = 0;
        self.device_mode = 0;
        self.device_error_code = 0;
        self.command_toggle = false;
        self.sd_card_recording = false;
        self.has_reg_config = false;
        self.has_eeg = false;
        self.has_accel = false;
        self.has_stim = false;
        self.has_stim_impedance = false;
        self.has_profile = false;
        self.has_firmware_version = false;
        self.eeg_channel_mask = 0;
        self.sample_count = 0;
        self.eeg_timestamp = 0;
        self.register_start_address = 0;
        self.register_count = 0;
        self.registers.clear();
        self.stim_channel_mask = 0;
        self.stim_impedance_channel_mask = 0;
        self.battery = 0;
        self.firmware_version = 0;
        self.synch_t1 = 0;
        self.synch_t2 = 0;
        self.device_type = 0;
        self.num_channels = 0;
        self.accelerometer = [0; ACCEL_AXES];
        self.artifact_level = 0;
    }

    /// Apply status byte 0
    pub(crate) fn set_status(&mut self, status: u8) {
        self.raw_status = status;
        self.command_toggle = status & STATUS_COMMAND_TOGGLE != 0;
        self.device_status_code = (status & STATUS_DEVICE_STATUS_MASK) >> 4;
        self.device_mode = (status >> 3) & 0x0F;
        self.device_error_code = status & STATUS_ERROR_MASK;
        self.sd_card_recording = status & STATUS_SD_CARD_RECORDING != 0;
    }

    /// Apply content byte 0
    pub(crate) fn set_content(&mut self, content: u8) {
        self.has_reg_config = content & CONTENT_REG_CONFIG != 0;
        self.has_eeg = content & CONTENT_EEG != 0;
        self.has_accel = content & CONTENT_ACCEL != 0;
        self.has_stim = content & CONTENT_STIM != 0;
        self.has_stim_impedance = content & CONTENT_STIM_IMPEDANCE != 0;
        self.has_profile = content & CONTENT_PROFILE != 0;
        self.has_firmware_version = content & CONTENT_FIRMWARE_VERSION != 0;
    }

    pub(crate) fn set_eeg_sample(&mut self, sample: usize, channel: usize, value: i32) {
        if sample < MAX_SAMPLES_PER_FRAME && channel < MAX_EEG_CHANNELS {
            self.samples[sample][channel] = value;
        }
    }

    pub(crate) fn set_stim_value(&mut self, channel: usize, value: i32) {
        if let Some(slot) = self.stim_data.get_mut(channel) {
            *slot = value;
        }
    }

    pub(crate) fn set_stim_impedance(&mut self, channel: usize, value: i32) {
        if let Some(slot) = self.stim_impedance.get_mut(channel) {
            *slot = value;
        }
    }

    /// Raw EEG value of `channel` at `sample`
    ///
    /// Returns `None` when the channel carried no EEG data in this frame or
    /// the sample index is beyond `sample_count`.
    pub fn eeg_sample(&self, channel: u8, sample: u8) -> Option<i32> {
        if !mask_has(self.eeg_channel_mask, channel) || sample >= self.sample_count {
            return None;
        }
        Some(self.samples[sample as usize][channel as usize])
    }

    /// EEG-carrying channels in ascending order
    pub fn eeg_channels(&self) -> impl Iterator<Item = u8> + '_ {
        mask_channels(self.eeg_channel_mask, MAX_EEG_CHANNELS)
    }

    /// All EEG values of one sample, in ascending channel order
    pub fn eeg_sample_row(&self, sample: u8) -> Vec<i32> {
        if sample >= self.sample_count {
            return Vec::new();
        }
        let row = &self.samples[sample as usize];
        self.eeg_channels().map(|ch| row[ch as usize]).collect()
    }

    /// Stimulation value of `channel`, if present in this frame
    pub fn stim_value(&self, channel: u8) -> Option<i32> {
        if !self.has_stim || !mask_has(self.stim_channel_mask, channel) {
            return None;
        }
        self.stim_data.get(channel as usize).copied()
    }

    /// Stimulation channels in ascending order
    pub fn stim_channels(&self) -> impl Iterator<Item = u8> + '_ {
        mask_channels(self.stim_channel_mask, MAX_STIM_CHANNELS)
    }

    /// Stimulation electrode impedance of `channel`, if present in this frame
    pub fn stim_impedance(&self, channel: u8) -> Option<i32> {
        if !self.has_stim_impedance || !mask_has(self.stim_impedance_channel_mask, channel) {
            return None;
        }
        self.stim_impedance.get(channel as usize).copied()
    }

    /// Stimulation impedance channels in ascending order
    pub fn stim_impedance_channels(&self) -> impl Iterator<Item = u8> + '_ {
        mask_channels(self.stim_impedance_channel_mask, MAX_STIM_CHANNELS)
    }

    /// Value of the register at `address`, if the register block carried it
    pub fn register(&self, address: u16) -> Option<u8> {
        let offset = address.checked_sub(self.register_start_address)? as usize;
        self.registers.get(offset).map(|&(_, value)| value)
    }
}

fn mask_has(mask: u32, channel: u8) -> bool {
    channel < 32 && mask & (1 << channel) != 0
}

fn mask_channels(mask: u32, limit: usize) -> impl Iterator<Item = u8> {
    (0..limit as u8).filter(move |&ch| mask_has(mask, ch))
}
