//! # Protocol Decoder
//!
//! Byte-at-a-time state machine that turns the raw device stream into
//! [`DecodedFrame`]s.
//!
//! ## Frame layout
//!
//! ```text
//! "SOF" | length(2, BE) | status | content | [EEG] [REG] [STIM] [STIM-Z] [PROFILE] [ACCEL] | "EOF"
//! ```
//!
//! Blocks are present when their bit is set in the content byte and always
//! appear in the order shown. A frame is accepted only when the end marker
//! matches and the number of bytes consumed since the start marker equals
//! the declared length. Anything else drops the frame and the decoder goes
//! back to scanning for `SOF`.
//!
//! ## Usage
//!
//! ```
//! use stimlink::protocol::ProtocolDecoder;
//!
//! let mut decoder = ProtocolDecoder::default();
//! let frame = [b'S', b'O', b'F', 0x00, 0x0A, 0x00, 0x00, b'E', b'O', b'F'];
//!
//! let accepted: Vec<bool> = frame.iter().map(|&b| decoder.parse_byte(b)).collect();
//! assert_eq!(accepted.iter().filter(|&&ok| ok).count(), 1);
//! assert!(!decoder.frame().has_eeg);
//! ```

use serde::Deserialize;
use tracing::{error, trace};

use super::artifact::ArtifactDetector;
use super::constants::*;
use super::diagnostics::ByteHistory;
use super::frame::DecodedFrame;
use super::state::{BlockKind, DecoderState, EegState, SampleEncoding};

/// EEG compression applied to every sample after the first one of a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// 3 bytes per value
    #[default]
    None,
    /// 2-byte signed deltas
    Delta16,
    /// Two 12-bit signed deltas per 3 bytes
    Packed12,
}

/// Caller-provided decoder settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Device firmware version, gates the artifact heuristic
    pub firmware_version: u16,
    /// Stimulation is currently running
    pub stimulating: bool,
    /// EEG blocks carry an explicit sample count
    pub multi_sample: bool,
    pub compression: Compression,
}

/// Running decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub bytes_received: u64,
    pub frames_decoded: u64,
    pub framing_errors: u64,
}

/// Outcome of feeding one complete field to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Next(DecoderState),
    Accept,
    Reject(&'static str),
}

/// Scratch state of the frame currently being parsed
///
/// Reset as a whole each time a start marker is seen.
#[derive(Debug, Clone)]
struct FrameContext {
    /// Bytes consumed since (and including) the start marker
    n_bytes: u32,
    declared_length: u32,
    status: u8,
    content: u8,
    /// Blocks already visited this frame, see [`BlockKind::processed_bit`]
    processed: u8,
    /// Big-endian accumulator for multi-byte fields
    field: u32,
    field_len: u8,
    channel: u8,
    sample: u8,
    register_address: u32,
    accel_axis: usize,
    /// Last decoded value per EEG channel, base for delta decoding
    previous: [i32; MAX_EEG_CHANNELS],
}

impl FrameContext {
    fn new() -> Self {
        Self {
            n_bytes: 0,
            declared_length: u32::MAX,
            status: 0,
            content: 0,
            processed: 0,
            field: 0,
            field_len: 0,
            channel: 0,
            sample: 0,
            register_address: 0,
            accel_axis: 0,
            previous: [0; MAX_EEG_CHANNELS],
        }
    }

    fn start(&mut self) {
        *self = Self::new();
        self.n_bytes = MARKER_SIZE as u32;
    }
}

/// Stateful decoder for one device connection
///
/// Feed bytes in arrival order with [`parse_byte`](Self::parse_byte). Each
/// `true` return means [`frame`](Self::frame) now holds a newly accepted
/// frame. Calls must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct ProtocolDecoder {
    config: DecoderConfig,
    state: DecoderState,
    ctx: FrameContext,
    start_window: [u8; MARKER_SIZE],
    end_window: [u8; MARKER_SIZE],
    /// Frame being parsed
    working: DecodedFrame,
    /// Last accepted frame
    current: DecodedFrame,
    artifact: ArtifactDetector,
    history: ByteHistory,
    stats: DecoderStats,
    last_status: u8,
}

impl Default for ProtocolDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl ProtocolDecoder {
    /// Create a decoder in the idle state
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            state: DecoderState::Idle,
            ctx: FrameContext::new(),
            start_window: [0; MARKER_SIZE],
            end_window: [0; MARKER_SIZE],
            working: DecodedFrame::new(),
            current: DecodedFrame::new(),
            artifact: ArtifactDetector::new(),
            history: ByteHistory::new(),
            stats: DecoderStats::default(),
            last_status: 0,
        }
    }

    pub fn config(&self) -> DecoderConfig {
        self.config
    }

    pub fn set_config(&mut self, config: DecoderConfig) {
        self.config = config;
    }

    pub fn set_firmware_version(&mut self, version: u16) {
        self.config.firmware_version = version;
    }

    pub fn set_stimulating(&mut self, stimulating: bool) {
        self.config.stimulating = stimulating;
    }

    pub fn set_multi_sample(&mut self, multi_sample: bool) {
        self.config.multi_sample = multi_sample;
    }

    pub fn set_compression(&mut self, compression: Compression) {
        self.config.compression = compression;
    }

    /// Last accepted frame
    pub fn frame(&self) -> &DecodedFrame {
        &self.current
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Current state, mostly useful for diagnostics
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Status byte of the last accepted frame
    pub fn last_device_status(&self) -> u8 {
        self.last_status
    }

    /// Whether the artifact heuristic is still active this session
    pub fn artifact_detection_enabled(&self) -> bool {
        self.artifact.is_enabled()
    }

    /// Abandon any frame in progress and go back to scanning
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.ctx = FrameContext::new();
        self.start_window = [0; MARKER_SIZE];
        self.end_window = [0; MARKER_SIZE];
    }

    /// Feed one byte
    ///
    /// Returns `true` exactly when this byte completed a valid frame.
    /// Malformed frames are dropped silently apart from an error log line.
    pub fn parse_byte(&mut self, byte: u8) -> bool {
        self.history.push(byte);
        self.stats.bytes_received += 1;

        if self.state == DecoderState::Idle {
            shift_in(&mut self.start_window, byte);
            if self.start_window == START_MARKER {
                self.begin_frame();
            }
            return false;
        }

        self.ctx.n_bytes += 1;
        if self.ctx.n_bytes > self.ctx.declared_length {
            return self.finish(Step::Reject("frame longer than declared length"));
        }

        if self.state == DecoderState::EndMarker {
            shift_in(&mut self.end_window, byte);
            self.ctx.field_len += 1;
            if (self.ctx.field_len as usize) < MARKER_SIZE {
                return false;
            }
            let step = if self.end_window != END_MARKER {
                Step::Reject("end marker mismatch")
            } else if self.ctx.n_bytes != self.ctx.declared_length {
                Step::Reject("byte count does not match declared length")
            } else {
                Step::Accept
            };
            return self.finish(step);
        }

        self.ctx.field = (self.ctx.field << 8) | u32::from(byte);
        self.ctx.field_len += 1;
        if self.ctx.field_len < self.state.field_width() {
            return false;
        }
        let value = self.ctx.field;
        self.ctx.field = 0;
        self.ctx.field_len = 0;

        let step = self.advance(self.state, value);
        self.finish(step)
    }

    /// Feed a chunk, calling `on_frame` for every frame it completes
    ///
    /// Returns the number of frames accepted.
    pub fn parse_bytes<F>(&mut self, bytes: &[u8], mut on_frame: F) -> usize
    where
        F: FnMut(&DecodedFrame),
    {
        let mut accepted = 0;
        for &byte in bytes {
            if self.parse_byte(byte) {
                accepted += 1;
                on_frame(&self.current);
            }
        }
        accepted
    }

    fn begin_frame(&mut self) {
        self.ctx.start();
        self.working.clear();
        self.artifact.begin_frame();
        self.end_window = [0; MARKER_SIZE];
        self.state = DecoderState::Length;
    }

    fn finish(&mut self, step: Step) -> bool {
        match step {
            Step::Next(state) => {
                self.state = state;
                false
            }
            Step::Accept => {
                self.working.artifact_level = self.artifact.finish_frame(
                    self.ctx.status,
                    self.config.firmware_version,
                    self.config.stimulating,
                );
                std::mem::swap(&mut self.working, &mut self.current);
                self.last_status = self.ctx.status;
                self.stats.frames_decoded += 1;
                trace!("Accepted frame ({} bytes, content 0x{:02X})", self.ctx.n_bytes, self.ctx.content);
                self.reset();
                true
            }
            Step::Reject(reason) => {
                self.stats.framing_errors += 1;
                error!(
                    "Dropping frame: {} (declared {} bytes, consumed {}, state {:?}); recent bytes: {}",
                    reason,
                    self.ctx.declared_length,
                    self.ctx.n_bytes,
                    self.state,
                    self.history.to_hex()
                );
                self.reset();
                false
            }
        }
    }

    /// Apply one complete field read in `state` and pick the next state
    fn advance(&mut self, state: DecoderState, value: u32) -> Step {
        match state {
            // Handled in parse_byte
            DecoderState::Idle | DecoderState::EndMarker => Step::Next(state),

            DecoderState::Length => {
                if value < u32::from(MIN_FRAME_LENGTH) {
                    return Step::Reject("declared length below minimum frame size");
                }
                self.ctx.declared_length = value;
                Step::Next(DecoderState::Status)
            }
            DecoderState::Status => {
                let status = value as u8;
                self.ctx.status = status;
                self.working.set_status(status);
                Step::Next(DecoderState::Content)
            }
            DecoderState::Content => {
                let content = value as u8;
                self.ctx.content = content;
                self.working.set_content(content);
                Step::Next(self.next_block())
            }

            DecoderState::Eeg(eeg) => self.advance_eeg(eeg, value),

            DecoderState::RegisterAddress => {
                self.working.register_start_address = value as u16;
                self.ctx.register_address = value;
                Step::Next(DecoderState::RegisterCount)
            }
            DecoderState::RegisterCount => {
                let count = value as u8;
                self.working.register_count = count;
                if count == 0 {
                    return Step::Next(self.next_block());
                }
                if self.ctx.register_address + u32::from(count) > u32::from(u16::MAX) + 1 {
                    return Step::Reject("register block runs past the address space");
                }
                Step::Next(DecoderState::RegisterValue)
            }
            DecoderState::RegisterValue => {
                if self.working.registers.len() >= MAX_REGISTERS_PER_BLOCK {
                    return Step::Reject("too many registers");
                }
                self.working
                    .registers
                    .push((self.ctx.register_address as u16, value as u8));
                self.ctx.register_address += 1;
                if self.working.registers.len() == self.working.register_count as usize {
                    Step::Next(self.next_block())
                } else {
                    Step::Next(DecoderState::RegisterValue)
                }
            }

            DecoderState::StimMask => {
                self.working.stim_channel_mask = value;
                self.first_channel(value, MAX_STIM_CHANNELS, DecoderState::StimValue)
            }
            DecoderState::StimValue => {
                let channel = self.ctx.channel;
                self.working
                    .set_stim_value(channel as usize, i32::from(value as u16 as i16));
                self.following_channel(self.working.stim_channel_mask, MAX_STIM_CHANNELS, DecoderState::StimValue)
            }
            DecoderState::StimImpedanceMask => {
                self.working.stim_impedance_channel_mask = value;
                self.first_channel(value, MAX_STIM_CHANNELS, DecoderState::StimImpedanceValue)
            }
            DecoderState::StimImpedanceValue => {
                let channel = self.ctx.channel;
                self.working.set_stim_impedance(channel as usize, value as i32);
                self.following_channel(
                    self.working.stim_impedance_channel_mask,
                    MAX_STIM_CHANNELS,
                    DecoderState::StimImpedanceValue,
                )
            }

            DecoderState::Battery => {
                // Wire order is [low][bits 31..24][bits 23..16][bits 15..8]
                self.working.battery = value.rotate_left(8) as i32;
                Step::Next(DecoderState::FirmwareVersion)
            }
            DecoderState::FirmwareVersion => {
                self.working.firmware_version = value as u16;
                Step::Next(DecoderState::SynchT1)
            }
            DecoderState::SynchT1 => {
                self.working.synch_t1 = value;
                Step::Next(DecoderState::SynchT2)
            }
            DecoderState::SynchT2 => {
                self.working.synch_t2 = value;
                Step::Next(DecoderState::DeviceType)
            }
            DecoderState::DeviceType => {
                self.working.device_type = value as u8;
                Step::Next(DecoderState::NumChannels)
            }
            DecoderState::NumChannels => {
                self.working.num_channels = value as u8;
                Step::Next(self.next_block())
            }

            DecoderState::Accel => {
                let axis = self.ctx.accel_axis;
                if let Some(slot) = self.working.accelerometer.get_mut(axis) {
                    *slot = value as u16 as i16;
                }
                self.ctx.accel_axis += 1;
                if self.ctx.accel_axis >= ACCEL_AXES {
                    Step::Next(self.next_block())
                } else {
                    Step::Next(DecoderState::Accel)
                }
            }
        }
    }

    fn advance_eeg(&mut self, eeg: EegState, value: u32) -> Step {
        match eeg {
            EegState::SampleCount => {
                self.working.sample_count = value as u8;
                Step::Next(DecoderState::Eeg(EegState::ChannelMask))
            }
            EegState::ChannelMask => {
                // Wire bit 0 marks an EEG channel, 1 a stimulation channel
                let mask = !value;
                self.working.eeg_channel_mask = mask;
                if !self.config.multi_sample {
                    self.working.sample_count = 1;
                }
                let first = next_set_bit(mask, 0, MAX_EEG_CHANNELS);
                match first {
                    Some(channel) if self.working.sample_count > 0 => {
                        self.ctx.channel = channel;
                        self.ctx.sample = 0;
                        Step::Next(DecoderState::Eeg(EegState::Sample(self.encoding_for(0))))
                    }
                    _ => {
                        self.working.sample_count = 0;
                        Step::Next(self.next_block())
                    }
                }
            }
            EegState::Sample(encoding) => {
                let mask = self.working.eeg_channel_mask;
                let channel = self.ctx.channel;
                match encoding {
                    SampleEncoding::Full => self.store_sample(channel, sign_extend(value, 24)),
                    SampleEncoding::Delta16 => {
                        let base = self.ctx.previous[channel as usize];
                        self.store_sample(channel, base.wrapping_add(sign_extend(value, 16)));
                    }
                    SampleEncoding::Packed12 => {
                        let base = self.ctx.previous[channel as usize];
                        self.store_sample(channel, base.wrapping_add(sign_extend(value >> 12, 12)));
                        if let Some(partner) = next_set_bit(mask, channel + 1, MAX_EEG_CHANNELS) {
                            let base = self.ctx.previous[partner as usize];
                            self.store_sample(partner, base.wrapping_add(sign_extend(value & 0xFFF, 12)));
                            self.ctx.channel = partner;
                        }
                    }
                }

                if let Some(next) = next_set_bit(mask, self.ctx.channel + 1, MAX_EEG_CHANNELS) {
                    self.ctx.channel = next;
                    return Step::Next(DecoderState::Eeg(EegState::Sample(encoding)));
                }

                self.ctx.sample += 1;
                if self.ctx.sample < self.working.sample_count {
                    // Mask is known non-empty here
                    self.ctx.channel = next_set_bit(mask, 0, MAX_EEG_CHANNELS).unwrap_or(0);
                    let encoding = self.encoding_for(self.ctx.sample);
                    Step::Next(DecoderState::Eeg(EegState::Sample(encoding)))
                } else {
                    Step::Next(DecoderState::Eeg(EegState::Timestamp))
                }
            }
            EegState::Timestamp => {
                self.working.eeg_timestamp = value;
                Step::Next(self.next_block())
            }
        }
    }

    fn store_sample(&mut self, channel: u8, value: i32) {
        let sample = self.ctx.sample;
        self.working.set_eeg_sample(sample as usize, channel as usize, value);
        self.ctx.previous[channel as usize] = value;
        if sample == 0 {
            self.artifact.observe(channel as usize, value);
        }
    }

    /// The first sample of a frame is always sent uncompressed
    fn encoding_for(&self, sample: u8) -> SampleEncoding {
        if sample == 0 {
            return SampleEncoding::Full;
        }
        match self.config.compression {
            Compression::None => SampleEncoding::Full,
            Compression::Delta16 => SampleEncoding::Delta16,
            Compression::Packed12 => SampleEncoding::Packed12,
        }
    }

    fn first_channel(&mut self, mask: u32, limit: usize, value_state: DecoderState) -> Step {
        match next_set_bit(mask, 0, limit) {
            Some(channel) => {
                self.ctx.channel = channel;
                Step::Next(value_state)
            }
            None => Step::Next(self.next_block()),
        }
    }

    fn following_channel(&mut self, mask: u32, limit: usize, value_state: DecoderState) -> Step {
        match next_set_bit(mask, self.ctx.channel + 1, limit) {
            Some(channel) => {
                self.ctx.channel = channel;
                Step::Next(value_state)
            }
            None => Step::Next(self.next_block()),
        }
    }

    /// Mark the next present, unvisited block as processed and return its
    /// first state, or the end-marker state when none is left
    fn next_block(&mut self) -> DecoderState {
        let pending = BlockKind::ORDER.into_iter().find(|kind| {
            self.ctx.content & kind.content_bit() != 0 && self.ctx.processed & kind.processed_bit() == 0
        });

        let Some(kind) = pending else {
            self.ctx.field_len = 0;
            return DecoderState::EndMarker;
        };
        self.ctx.processed |= kind.processed_bit();

        match kind {
            BlockKind::Eeg if self.config.multi_sample => DecoderState::Eeg(EegState::SampleCount),
            BlockKind::Eeg => DecoderState::Eeg(EegState::ChannelMask),
            BlockKind::RegisterConfig => DecoderState::RegisterAddress,
            BlockKind::Stim => DecoderState::StimMask,
            BlockKind::StimImpedance => DecoderState::StimImpedanceMask,
            BlockKind::Profile => DecoderState::Battery,
            BlockKind::Accel => {
                self.ctx.accel_axis = 0;
                DecoderState::Accel
            }
        }
    }
}

fn shift_in(window: &mut [u8; MARKER_SIZE], byte: u8) {
    window.copy_within(1.., 0);
    window[MARKER_SIZE - 1] = byte;
}

/// Lowest set bit of `mask` at or above `from`, below `limit`
fn next_set_bit(mask: u32, from: u8, limit: usize) -> Option<u8> {
    if from as usize >= limit.min(32) {
        return None;
    }
    let remaining = mask >> from;
    if remaining == 0 {
        return None;
    }
    let channel = from as u32 + remaining.trailing_zeros();
    (channel < limit as u32).then_some(channel as u8)
}

/// Interpret the low `bits` bits of `value` as two's complement
fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}
