//! # Device Session
//!
//! Ties one transport to one decoder for the lifetime of a connection.
//!
//! The session is the single reader of the port, so decoder calls are
//! naturally serialized. Command frames go out through the same port.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, StimlinkError};
use crate::protocol::{Command, DecodedFrame, DecoderConfig, ProtocolDecoder};
use crate::serial::SerialPortIO;

/// Size of the read buffer handed to the transport
pub const READ_CHUNK_SIZE: usize = 1024;

/// One open device connection
pub struct DeviceSession<P: SerialPortIO> {
    port: P,
    decoder: ProtocolDecoder,
    buf: Box<[u8; READ_CHUNK_SIZE]>,
    last_sent: Option<Instant>,
    commands_sent: u64,
}

impl<P: SerialPortIO> std::fmt::Debug for DeviceSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("decoder", &self.decoder.stats())
            .field("commands_sent", &self.commands_sent)
            .finish_non_exhaustive()
    }
}

impl<P: SerialPortIO> DeviceSession<P> {
    pub fn new(port: P, config: DecoderConfig) -> Self {
        Self {
            port,
            decoder: ProtocolDecoder::new(config),
            buf: Box::new([0; READ_CHUNK_SIZE]),
            last_sent: None,
            commands_sent: 0,
        }
    }

    pub fn decoder(&self) -> &ProtocolDecoder {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut ProtocolDecoder {
        &mut self.decoder
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Encode and send one command
    ///
    /// Starting or stopping stimulation also updates the decoder's
    /// stimulating flag, which gates the artifact heuristic.
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        let frame = command.encode()?;
        self.send_frame(&frame).await?;
        debug!("Sent {} command ({} bytes)", command.name(), frame.len());

        match command {
            Command::StartStimulation => self.decoder.set_stimulating(true),
            Command::StopStimulation => self.decoder.set_stimulating(false),
            _ => {}
        }
        Ok(())
    }

    /// Send an already encoded frame
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.port
            .write_all(frame)
            .await
            .map_err(|e| StimlinkError::Serial(format!("Failed to write frame: {}", e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| StimlinkError::Serial(format!("Failed to flush port: {}", e)))?;

        self.last_sent = Some(Instant::now());
        self.commands_sent += 1;
        Ok(())
    }

    /// Whether nothing has been sent for at least `interval`
    pub fn keep_alive_due(&self, interval: Duration) -> bool {
        self.last_sent.map_or(true, |at| at.elapsed() >= interval)
    }

    /// Send a keep-alive if the link has been quiet for `interval`
    ///
    /// Returns whether a keep-alive was sent.
    pub async fn maintain(&mut self, interval: Duration) -> Result<bool> {
        if !self.keep_alive_due(interval) {
            return Ok(false);
        }
        self.send(&Command::KeepAlive).await?;
        Ok(true)
    }

    /// Read one chunk from the port and decode it
    ///
    /// `on_frame` runs once per frame completed by the chunk. Returns the
    /// number of frames accepted.
    ///
    /// # Errors
    ///
    /// Returns [`StimlinkError::Serial`] when the read fails or the port has
    /// been closed.
    pub async fn receive<F>(&mut self, on_frame: F) -> Result<usize>
    where
        F: FnMut(&DecodedFrame),
    {
        let n = self
            .port
            .read(&mut self.buf[..])
            .await
            .map_err(|e| StimlinkError::Serial(format!("Failed to read from port: {}", e)))?;

        if n == 0 {
            info!("Device closed the connection");
            return Err(StimlinkError::Serial("port closed".to_string()));
        }

        Ok(self.decoder.parse_bytes(&self.buf[..n], on_frame))
    }

    /// Drop any partially parsed frame
    pub fn reset(&mut self) {
        self.decoder.reset();
    }

    /// Give back the transport
    pub fn into_port(self) -> P {
        self.port
    }
}
