//! # Command Frame Encoder
//!
//! Builds host → device command frames.
//!
//! ```text
//! "SOF" | length(2) | action | content | [address(2, BE) | count(1) | data...] | "EOF"
//! ```
//!
//! The length field counts the whole frame, markers included, and is written
//! low byte first. It is patched in by [`finalize`] once the tail is in place.

use bytes::BufMut;

use super::constants::*;
use crate::error::{Result, StimlinkError};

/// Commands understood by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartEeg,
    StopEeg,
    StartStimulation,
    StopStimulation,
    StartImpedance,
    StopImpedance,
    StartBeacon,
    StopBeacon,
    ProfileRequest,
    KeepAlive,
    RegisterRead { address: u16, count: u8 },
    RegisterWrite { address: u16, data: Vec<u8> },
}

impl Command {
    /// Encode into a complete frame
    ///
    /// # Errors
    ///
    /// Returns [`StimlinkError::Encoding`] for register commands with an
    /// invalid count or payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Self::StartEeg => Ok(start_eeg()),
            Self::StopEeg => Ok(stop_eeg()),
            Self::StartStimulation => Ok(start_stimulation()),
            Self::StopStimulation => Ok(stop_stimulation()),
            Self::StartImpedance => Ok(start_impedance()),
            Self::StopImpedance => Ok(stop_impedance()),
            Self::StartBeacon => Ok(start_beacon()),
            Self::StopBeacon => Ok(stop_beacon()),
            Self::ProfileRequest => Ok(profile_request()),
            Self::KeepAlive => Ok(keep_alive()),
            Self::RegisterRead { address, count } => register_read(*address, *count),
            Self::RegisterWrite { address, data } => register_write(*address, data),
        }
    }

    /// Short name for log lines
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartEeg => "start-eeg",
            Self::StopEeg => "stop-eeg",
            Self::StartStimulation => "start-stimulation",
            Self::StopStimulation => "stop-stimulation",
            Self::StartImpedance => "start-impedance",
            Self::StopImpedance => "stop-impedance",
            Self::StartBeacon => "start-beacon",
            Self::StopBeacon => "stop-beacon",
            Self::ProfileRequest => "profile-request",
            Self::KeepAlive => "keep-alive",
            Self::RegisterRead { .. } => "register-read",
            Self::RegisterWrite { .. } => "register-write",
        }
    }
}

/// Start marker, placeholder length, zeroed action and content bytes
pub fn build_header() -> Vec<u8> {
    let mut frame = Vec::with_capacity(COMMAND_HEADER_SIZE + MARKER_SIZE);
    frame.put_slice(&START_MARKER);
    frame.put_u16(0); // length, patched by finalize
    frame.put_u8(0); // action
    frame.put_u8(0); // content
    frame
}

/// Append the end marker and patch the length bytes
///
/// # Errors
///
/// Returns [`StimlinkError::Encoding`] if `frame` is shorter than a header or
/// the finished frame would not fit the 16-bit length field.
pub fn finalize(frame: Vec<u8>) -> Result<Vec<u8>> {
    if frame.len() < COMMAND_HEADER_SIZE {
        return Err(StimlinkError::Encoding(format!(
            "frame of {} bytes is shorter than the {}-byte header",
            frame.len(),
            COMMAND_HEADER_SIZE
        )));
    }
    let total = frame.len() + MARKER_SIZE;
    if total > usize::from(u16::MAX) {
        return Err(StimlinkError::Encoding(format!(
            "frame of {} bytes exceeds the 16-bit length field",
            total
        )));
    }
    Ok(seal(frame))
}

/// Append the end marker and patch the length; caller guarantees the size fits
fn seal(mut frame: Vec<u8>) -> Vec<u8> {
    frame.put_slice(&END_MARKER);
    let total = frame.len();
    frame[LENGTH_OFFSET_LOW] = (total % 256) as u8;
    frame[LENGTH_OFFSET_HIGH] = (total / 256) as u8;
    frame
}

fn command(action: u8, content: u8) -> Vec<u8> {
    let mut frame = build_header();
    frame[ACTION_OFFSET] = action;
    frame[CONTENT_OFFSET] = content;
    seal(frame)
}

pub fn start_eeg() -> Vec<u8> {
    command(ACTION_START_EEG, 0)
}

pub fn stop_eeg() -> Vec<u8> {
    command(ACTION_STOP_EEG, 0)
}

pub fn start_stimulation() -> Vec<u8> {
    command(ACTION_START_STIM, 0)
}

pub fn stop_stimulation() -> Vec<u8> {
    command(ACTION_STOP_STIM, 0)
}

pub fn start_impedance() -> Vec<u8> {
    command(ACTION_START_IMPEDANCE, 0)
}

pub fn stop_impedance() -> Vec<u8> {
    command(ACTION_STOP_IMPEDANCE, 0)
}

pub fn start_beacon() -> Vec<u8> {
    command(ACTION_START_BEACON, 0)
}

pub fn stop_beacon() -> Vec<u8> {
    command(ACTION_STOP_BEACON, 0)
}

/// Ask the device to send its profile block
pub fn profile_request() -> Vec<u8> {
    command(0, REQUEST_PROFILE)
}

/// Empty "null" request that keeps the link alive
pub fn keep_alive() -> Vec<u8> {
    command(0, REQUEST_NULL)
}

/// Read `count` registers starting at `address`
///
/// # Errors
///
/// Returns an error if `count` is zero.
pub fn register_read(address: u16, count: u8) -> Result<Vec<u8>> {
    if count == 0 {
        return Err(StimlinkError::Encoding(
            "register read needs at least one register".to_string()
        ));
    }
    let mut frame = build_header();
    frame[CONTENT_OFFSET] = REQUEST_REGISTER_READ;
    frame.put_u16(address);
    frame.put_u8(count);
    finalize(frame)
}

/// Write `data` to consecutive registers starting at `address`
///
/// # Errors
///
/// Returns an error if `data` is empty or longer than 255 bytes.
///
/// # Examples
///
/// ```
/// use stimlink::protocol::encoder::register_write;
///
/// let frame = register_write(0x0010, &[0xAA, 0xBB]).unwrap();
/// assert_eq!(&frame[frame.len() - 8..], &[0x00, 0x10, 0x02, 0xAA, 0xBB, b'E', b'O', b'F']);
/// ```
pub fn register_write(address: u16, data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() > MAX_REGISTERS_PER_BLOCK {
        return Err(StimlinkError::Encoding(format!(
            "register write needs 1 to {} bytes, got {}",
            MAX_REGISTERS_PER_BLOCK,
            data.len()
        )));
    }
    let mut frame = build_header();
    frame[CONTENT_OFFSET] = REQUEST_REGISTER_WRITE;
    frame.put_u16(address);
    frame.put_u8(data.len() as u8);
    frame.put_slice(data);
    finalize(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal host-side framing check: markers and low-byte-first length
    fn check_framing(frame: &[u8]) -> bool {
        let mut window = [0u8; MARKER_SIZE];
        let mut started = None;
        for (i, &b) in frame.iter().enumerate() {
            window.copy_within(1.., 0);
            window[MARKER_SIZE - 1] = b;
            if started.is_none() && window == START_MARKER {
                started = Some(i + 1 - MARKER_SIZE);
            }
        }
        let Some(start) = started else { return false };
        let declared = u16::from_le_bytes([frame[start + 3], frame[start + 4]]) as usize;
        window == END_MARKER && frame.len() - start == declared
    }

    fn all_commands() -> Vec<Command> {
        vec![
            Command::StartEeg,
            Command::StopEeg,
            Command::StartStimulation,
            Command::StopStimulation,
            Command::StartImpedance,
            Command::StopImpedance,
            Command::StartBeacon,
            Command::StopBeacon,
            Command::ProfileRequest,
            Command::KeepAlive,
            Command::RegisterRead { address: 0x0200, count: 16 },
            Command::RegisterWrite { address: 0x0010, data: vec![0xAA, 0xBB] },
            Command::RegisterWrite { address: 0xFFFF, data: vec![0x55; 255] },
        ]
    }

    #[test]
    fn test_header_layout() {
        let header = build_header();
        assert_eq!(header.len(), COMMAND_HEADER_SIZE);
        assert_eq!(&header[..3], b"SOF");
        assert_eq!(&header[3..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_every_command_is_well_framed() {
        for cmd in all_commands() {
            let frame = cmd.encode().unwrap();
            assert_eq!(&frame[..3], b"SOF", "{}", cmd.name());
            assert_eq!(&frame[frame.len() - 3..], b"EOF", "{}", cmd.name());
            assert!(check_framing(&frame), "{} failed framing check", cmd.name());
        }
    }

    #[test]
    fn test_simple_commands_set_single_bit() {
        let cases = [
            (start_eeg(), ACTION_START_EEG, 0),
            (stop_eeg(), ACTION_STOP_EEG, 0),
            (start_stimulation(), ACTION_START_STIM, 0),
            (stop_stimulation(), ACTION_STOP_STIM, 0),
            (start_impedance(), ACTION_START_IMPEDANCE, 0),
            (stop_impedance(), ACTION_STOP_IMPEDANCE, 0),
            (start_beacon(), ACTION_START_BEACON, 0),
            (stop_beacon(), ACTION_STOP_BEACON, 0),
            (profile_request(), 0, REQUEST_PROFILE),
            (keep_alive(), 0, REQUEST_NULL),
        ];
        for (frame, action, content) in cases {
            assert_eq!(frame.len(), 10);
            assert_eq!(frame[ACTION_OFFSET], action);
            assert_eq!(frame[CONTENT_OFFSET], content);
            assert_eq!((frame[ACTION_OFFSET] | frame[CONTENT_OFFSET]).count_ones(), 1);
            assert_eq!(&frame[3..5], &[10, 0]);
        }
    }

    #[test]
    fn test_register_write_layout() {
        let frame = register_write(0x0010, &[0xAA, 0xBB]).unwrap();

        assert_eq!(frame.len(), 15);
        assert_ne!(frame[CONTENT_OFFSET] & 0x02, 0);
        assert_eq!(&frame[7..12], &[0x00, 0x10, 0x02, 0xAA, 0xBB]);
        assert_eq!(&frame[12..], b"EOF");
        assert_eq!(&frame[3..5], &[15, 0]);
    }

    #[test]
    fn test_register_read_layout() {
        let frame = register_read(0x1234, 4).unwrap();
        assert_eq!(frame[CONTENT_OFFSET], REQUEST_REGISTER_READ);
        assert_eq!(&frame[7..10], &[0x12, 0x34, 0x04]);
        assert_eq!(frame.len(), 13);
    }

    #[test]
    fn test_length_high_byte() {
        let frame = register_write(0, &[0u8; 255]).unwrap();
        // 7 + 3 + 255 + 3
        assert_eq!(frame.len(), 268);
        assert_eq!(frame[LENGTH_OFFSET_LOW], (268 % 256) as u8);
        assert_eq!(frame[LENGTH_OFFSET_HIGH], 1);
    }

    #[test]
    fn test_register_read_zero_count_rejected() {
        assert!(matches!(register_read(0, 0), Err(StimlinkError::Encoding(_))));
    }

    #[test]
    fn test_register_write_bad_payload_rejected() {
        assert!(register_write(0, &[]).is_err());
        assert!(register_write(0, &[0u8; 256]).is_err());
    }

    #[test]
    fn test_finalize_rejects_oversized_frame() {
        let mut frame = build_header();
        frame.resize(usize::from(u16::MAX) - 2, 0);
        assert!(finalize(frame).is_err());

        let mut frame = build_header();
        frame.resize(usize::from(u16::MAX) - 3, 0);
        let sealed = finalize(frame).unwrap();
        assert_eq!(sealed.len(), usize::from(u16::MAX));
        assert_eq!(&sealed[3..5], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_finalize_rejects_truncated_header() {
        assert!(finalize(b"SOF".to_vec()).is_err());
    }

    #[test]
    fn test_frames_are_independent() {
        let a = start_eeg();
        let b = start_eeg();
        assert_eq!(a, b);
        assert_ne!(start_eeg(), stop_eeg());
    }
}
