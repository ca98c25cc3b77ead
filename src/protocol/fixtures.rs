//! Builders for well-formed device frames used across the test suites.

use super::constants::*;
use super::decoder::Compression;

/// Assembles a device → host frame block by block
///
/// Blocks must be added in wire order. The declared length is computed on
/// [`build`](Self::build).
#[derive(Debug, Default)]
pub struct DeviceFrameBuilder {
    status: u8,
    content: u8,
    body: Vec<u8>,
}

impl DeviceFrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u8) -> Self {
        self.status = status;
        self
    }

    pub fn firmware_flag(mut self) -> Self {
        self.content |= CONTENT_FIRMWARE_VERSION;
        self
    }

    /// EEG block; `rows[s]` holds the values of sample `s` in ascending channel order
    pub fn eeg_block(
        mut self,
        multi_sample: bool,
        compression: Compression,
        mask: u32,
        rows: &[Vec<i32>],
        timestamp: u32,
    ) -> Self {
        self.content |= CONTENT_EEG;
        if multi_sample {
            self.body.push(rows.len() as u8);
        }
        self.body.extend_from_slice(&(!mask).to_be_bytes());
        if mask == 0 || rows.is_empty() {
            return self;
        }

        let mut previous: Option<&Vec<i32>> = None;
        for row in rows {
            match (previous, compression) {
                (None, _) | (_, Compression::None) => {
                    for &v in row {
                        self.body.extend_from_slice(&(v as u32 & 0xFF_FFFF).to_be_bytes()[1..]);
                    }
                }
                (Some(prev), Compression::Delta16) => {
                    for (v, p) in row.iter().zip(prev) {
                        self.body.extend_from_slice(&((v - p) as i16).to_be_bytes());
                    }
                }
                (Some(prev), Compression::Packed12) => {
                    let deltas: Vec<u32> = row.iter().zip(prev).map(|(v, p)| (v - p) as u32 & 0xFFF).collect();
                    for pair in deltas.chunks(2) {
                        let group = (pair[0] << 12) | pair.get(1).copied().unwrap_or(0);
                        self.body.extend_from_slice(&group.to_be_bytes()[1..]);
                    }
                }
            }
            previous = Some(row);
        }
        self.body.extend_from_slice(&timestamp.to_be_bytes());
        self
    }

    pub fn register_block(mut self, start: u16, values: &[u8]) -> Self {
        self.content |= CONTENT_REG_CONFIG;
        self.body.extend_from_slice(&start.to_be_bytes());
        self.body.push(values.len() as u8);
        self.body.extend_from_slice(values);
        self
    }

    pub fn stim_block(mut self, mask: u32, values: &[i16]) -> Self {
        self.content |= CONTENT_STIM;
        self.body.extend_from_slice(&mask.to_be_bytes());
        for v in values {
            self.body.extend_from_slice(&v.to_be_bytes());
        }
        self
    }

    pub fn stim_impedance_block(mut self, mask: u32, values: &[i32]) -> Self {
        self.content |= CONTENT_STIM_IMPEDANCE;
        self.body.extend_from_slice(&mask.to_be_bytes());
        for v in values {
            self.body.extend_from_slice(&v.to_be_bytes());
        }
        self
    }

    /// Profile block; `battery` is given as the four raw wire bytes
    pub fn profile_block(
        mut self,
        battery: [u8; 4],
        firmware_version: u16,
        synch_t1: u32,
        synch_t2: u32,
        device_type: u8,
        num_channels: u8,
    ) -> Self {
        self.content |= CONTENT_PROFILE;
        self.body.extend_from_slice(&battery);
        self.body.extend_from_slice(&firmware_version.to_be_bytes());
        self.body.extend_from_slice(&synch_t1.to_be_bytes());
        self.body.extend_from_slice(&synch_t2.to_be_bytes());
        self.body.push(device_type);
        self.body.push(num_channels);
        self
    }

    pub fn accel_block(mut self, axes: [i16; 3]) -> Self {
        self.content |= CONTENT_ACCEL;
        for axis in axes {
            self.body.extend_from_slice(&axis.to_be_bytes());
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = (MIN_FRAME_LENGTH as usize + self.body.len()) as u16;
        let mut frame = Vec::with_capacity(length as usize);
        frame.extend_from_slice(&START_MARKER);
        frame.extend_from_slice(&length.to_be_bytes());
        frame.push(self.status);
        frame.push(self.content);
        frame.extend_from_slice(&self.body);
        frame.extend_from_slice(&END_MARKER);
        frame
    }
}

/// Deterministic EEG rows whose sample-to-sample change stays within `swing`
pub fn eeg_rows(samples: usize, channels: usize, spacing: i32, swing: i32) -> Vec<Vec<i32>> {
    (0..samples)
        .map(|s| {
            (0..channels)
                .map(|c| {
                    let offset = spacing * (c as i32 - channels as i32 / 2);
                    let wave = ((s as i32 * (c as i32 + 3) * 97) % (swing + 1)) - swing / 2;
                    offset + wave
                })
                .collect()
        })
        .collect()
}
