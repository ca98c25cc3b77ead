//! # Decoder States
//!
//! One variant per point the decoder can stop at between two bytes.
//! Multi-byte fields are collected by the decoder's field accumulator, so a
//! state names the field being read rather than the byte within it.

use super::constants::*;

/// Width of a multi-byte field read in a given state
pub type FieldWidth = u8;

/// Top-level decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Scanning for the start marker
    Idle,
    /// Declared frame length (2 bytes, big-endian)
    Length,
    /// Status byte 0
    Status,
    /// Content byte 0 (block presence bitmap)
    Content,
    /// Inside the EEG block
    Eeg(EegState),
    /// Register block start address (2 bytes)
    RegisterAddress,
    /// Register block count (1 byte)
    RegisterCount,
    /// Register values, one byte each
    RegisterValue,
    /// Stimulation channel bitmap (4 bytes)
    StimMask,
    /// Stimulation value of the current channel (2 bytes)
    StimValue,
    /// Stimulation impedance channel bitmap (4 bytes)
    StimImpedanceMask,
    /// Stimulation impedance value of the current channel (4 bytes)
    StimImpedanceValue,
    /// Battery level (4 bytes, mixed byte order)
    Battery,
    /// Firmware version (2 bytes)
    FirmwareVersion,
    /// First synchronization timestamp (4 bytes)
    SynchT1,
    /// Second synchronization timestamp (4 bytes)
    SynchT2,
    /// Device type (1 byte)
    DeviceType,
    /// Channel count (1 byte)
    NumChannels,
    /// Accelerometer axis (2 bytes each)
    Accel,
    /// End marker (3 bytes)
    EndMarker,
}

/// States of the EEG block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EegState {
    /// Sample count (multi-sample mode only)
    SampleCount,
    /// Inverted channel bitmap (4 bytes)
    ChannelMask,
    /// Sample value of the current channel
    Sample(SampleEncoding),
    /// Block timestamp (4 bytes)
    Timestamp,
}

/// Wire encoding of one EEG value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// 24-bit absolute value
    Full,
    /// Signed 16-bit delta against the previous sample
    Delta16,
    /// Two signed 12-bit deltas packed into 3 bytes
    Packed12,
}

impl SampleEncoding {
    pub fn width(self) -> FieldWidth {
        match self {
            Self::Full | Self::Packed12 => 3,
            Self::Delta16 => 2,
        }
    }
}

impl DecoderState {
    /// Bytes collected before the state's field is complete
    pub fn field_width(self) -> FieldWidth {
        match self {
            Self::Idle | Self::EndMarker => MARKER_SIZE as FieldWidth,
            Self::Length | Self::RegisterAddress | Self::StimValue | Self::FirmwareVersion => 2,
            Self::Accel => 2,
            Self::Status
            | Self::Content
            | Self::RegisterCount
            | Self::RegisterValue
            | Self::DeviceType
            | Self::NumChannels => 1,
            Self::StimMask
            | Self::StimImpedanceMask
            | Self::StimImpedanceValue
            | Self::Battery
            | Self::SynchT1
            | Self::SynchT2 => 4,
            Self::Eeg(eeg) => match eeg {
                EegState::SampleCount => 1,
                EegState::ChannelMask | EegState::Timestamp => 4,
                EegState::Sample(encoding) => encoding.width(),
            },
        }
    }
}

/// Optional frame blocks in the order they are serialized on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Eeg,
    RegisterConfig,
    Stim,
    StimImpedance,
    Profile,
    Accel,
}

impl BlockKind {
    /// Fixed visiting order
    pub const ORDER: [BlockKind; 6] = [
        BlockKind::Eeg,
        BlockKind::RegisterConfig,
        BlockKind::Stim,
        BlockKind::StimImpedance,
        BlockKind::Profile,
        BlockKind::Accel,
    ];

    /// Presence bit in content byte 0
    pub fn content_bit(self) -> u8 {
        match self {
            Self::Eeg => CONTENT_EEG,
            Self::RegisterConfig => CONTENT_REG_CONFIG,
            Self::Stim => CONTENT_STIM,
            Self::StimImpedance => CONTENT_STIM_IMPEDANCE,
            Self::Profile => CONTENT_PROFILE,
            Self::Accel => CONTENT_ACCEL,
        }
    }

    /// Bit in the per-frame processed set
    pub fn processed_bit(self) -> u8 {
        1 << (self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_order_matches_wire_order() {
        assert_eq!(BlockKind::ORDER[0], BlockKind::Eeg);
        assert_eq!(BlockKind::ORDER[5], BlockKind::Accel);
    }

    #[test]
    fn test_processed_bits_are_distinct() {
        let mut seen = 0u8;
        for kind in BlockKind::ORDER {
            assert_eq!(seen & kind.processed_bit(), 0);
            seen |= kind.processed_bit();
        }
        assert_eq!(seen.count_ones(), 6);
    }

    #[test]
    fn test_sample_widths() {
        assert_eq!(SampleEncoding::Full.width(), 3);
        assert_eq!(SampleEncoding::Delta16.width(), 2);
        assert_eq!(SampleEncoding::Packed12.width(), 3);
        assert_eq!(DecoderState::Eeg(EegState::Sample(SampleEncoding::Delta16)).field_width(), 2);
    }

    #[test]
    fn test_field_widths() {
        assert_eq!(DecoderState::Length.field_width(), 2);
        assert_eq!(DecoderState::Battery.field_width(), 4);
        assert_eq!(DecoderState::EndMarker.field_width(), 3);
        assert_eq!(DecoderState::Eeg(EegState::ChannelMask).field_width(), 4);
    }
}
