//! # Framing Diagnostics
//!
//! Keeps the most recent raw bytes so a dropped frame can be logged with the
//! traffic that led up to it.

use std::fmt::Write;

use super::constants::DIAGNOSTIC_HISTORY_SIZE;

/// Fixed-size ring of the last raw bytes seen by the decoder
#[derive(Debug, Clone)]
pub struct ByteHistory {
    buf: [u8; DIAGNOSTIC_HISTORY_SIZE],
    /// Next write position
    head: usize,
    len: usize,
}

impl Default for ByteHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteHistory {
    pub fn new() -> Self {
        Self {
            buf: [0; DIAGNOSTIC_HISTORY_SIZE],
            head: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, byte: u8) {
        self.buf[self.head] = byte;
        self.head = (self.head + 1) % DIAGNOSTIC_HISTORY_SIZE;
        self.len = (self.len + 1).min(DIAGNOSTIC_HISTORY_SIZE);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Stored bytes, oldest first
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        let start = (self.head + DIAGNOSTIC_HISTORY_SIZE - self.len) % DIAGNOSTIC_HISTORY_SIZE;
        (0..self.len).map(move |i| self.buf[(start + i) % DIAGNOSTIC_HISTORY_SIZE])
    }

    /// Space-separated uppercase hex, oldest first
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.len * 3);
        for (i, byte) in self.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            // Writing into a String cannot fail
            let _ = write!(out, "{:02X}", byte);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history() {
        let history = ByteHistory::new();
        assert!(history.is_empty());
        assert_eq!(history.to_hex(), "");
    }

    #[test]
    fn test_hex_rendering() {
        let mut history = ByteHistory::new();
        for byte in [0x53, 0x4F, 0x46, 0x00] {
            history.push(byte);
        }
        assert_eq!(history.to_hex(), "53 4F 46 00");
    }

    #[test]
    fn test_hex_rendering_full_ring() {
        let mut history = ByteHistory::new();
        for _ in 0..(DIAGNOSTIC_HISTORY_SIZE + 5) {
            history.push(0xAB);
        }
        let hex = history.to_hex();
        assert_eq!(hex.len(), DIAGNOSTIC_HISTORY_SIZE * 3 - 1);
        assert!(hex.split(' ').all(|b| b == "AB"));
    }

    #[test]
    fn test_wraps_and_keeps_newest() {
        let mut history = ByteHistory::new();
        for i in 0..(DIAGNOSTIC_HISTORY_SIZE + 10) {
            history.push(i as u8);
        }
        assert_eq!(history.len(), DIAGNOSTIC_HISTORY_SIZE);

        let bytes: Vec<u8> = history.iter().collect();
        assert_eq!(bytes[0], 10u8);
        assert_eq!(*bytes.last().unwrap(), (DIAGNOSTIC_HISTORY_SIZE + 9) as u8);
    }

    #[test]
    fn test_clear() {
        let mut history = ByteHistory::new();
        history.push(1);
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.iter().count(), 0);
    }
}
