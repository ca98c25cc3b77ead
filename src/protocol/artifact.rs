//! # Artifact Heuristic
//!
//! Tracks abrupt sample-to-sample jumps on the first sample of each frame.
//!
//! Older firmware raises status bit `0x02` on large signal jumps. When that
//! bit stays set across consecutive frames while the signal really is
//! jumping, the bit is not trustworthy and the heuristic turns itself off
//! for the rest of the session.

use super::constants::*;
use tracing::warn;

/// Sentinel value of the consecutive-frame counter once the heuristic is off
const DISABLED: i32 = -1;

#[derive(Debug, Clone)]
pub struct ArtifactDetector {
    /// High bits of the last first-sample value of each channel
    history: [i32; MAX_EEG_CHANNELS],
    /// First-sample high bits of the frame in progress, committed on accept
    pending: [i32; MAX_EEG_CHANNELS],
    pending_mask: u32,
    /// Consecutive frames with the artifact status bit, or `DISABLED`
    counter: i32,
    accumulator: i64,
    channels_seen: u32,
}

impl Default for ArtifactDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactDetector {
    pub fn new() -> Self {
        Self {
            history: [0; MAX_EEG_CHANNELS],
            pending: [0; MAX_EEG_CHANNELS],
            pending_mask: 0,
            counter: 0,
            accumulator: 0,
            channels_seen: 0,
        }
    }

    /// Whether the heuristic is still running this session
    pub fn is_enabled(&self) -> bool {
        self.counter != DISABLED
    }

    /// Zero the per-frame accumulator and drop uncommitted values
    pub fn begin_frame(&mut self) {
        self.accumulator = 0;
        self.channels_seen = 0;
        self.pending_mask = 0;
    }

    /// Fold one first-sample value into the accumulator
    ///
    /// The channel history only moves forward in [`finish_frame`](Self::finish_frame).
    pub fn observe(&mut self, channel: usize, value: i32) {
        if !self.is_enabled() || channel >= MAX_EEG_CHANNELS {
            return;
        }
        let high = value >> 8;
        self.accumulator += i64::from(high.abs_diff(self.history[channel]));
        self.pending[channel] = high;
        self.pending_mask |= 1 << channel;
        self.channels_seen += 1;
    }

    /// Close an accepted frame and return its normalized artifact level
    ///
    /// Returns 0 once the heuristic has been disabled.
    pub fn finish_frame(&mut self, status: u8, firmware_version: u16, stimulating: bool) -> i32 {
        if !self.is_enabled() {
            return 0;
        }

        let mut committed = self.pending_mask;
        while committed != 0 {
            let channel = committed.trailing_zeros() as usize;
            self.history[channel] = self.pending[channel];
            committed &= committed - 1;
        }
        self.pending_mask = 0;

        let level = if self.channels_seen > 0 {
            let mean = self.accumulator / i64::from(self.channels_seen);
            i32::try_from(mean).unwrap_or(i32::MAX)
        } else {
            0
        };

        if status & STATUS_ARTIFACT_BIT != 0 {
            self.counter = self.counter.saturating_add(1);
        } else {
            self.counter = 0;
        }

        if self.counter >= ARTIFACT_CONSECUTIVE_FRAMES
            && level > ARTIFACT_THRESHOLD
            && firmware_version < ARTIFACT_FIRMWARE_CUTOFF
            && !stimulating
        {
            warn!(
                "Artifact status bit set on {} consecutive frames with level {}; disabling artifact detection",
                self.counter, level
            );
            self.counter = DISABLED;
        }

        level
    }

    /// Forget all history and re-enable the heuristic
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
