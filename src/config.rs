//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, StimlinkError};
use crate::protocol::{Command, Compression, DecoderConfig};

/// Line speeds the device firmware accepts
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 57600, 115_200, 230_400, 460_800, 921_600];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// What the decoder assumes about the connected device
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default)]
    pub firmware_version: u16,

    #[serde(default)]
    pub multi_sample: bool,

    #[serde(default)]
    pub compression: Compression,

    #[serde(default)]
    pub stimulating: bool,
}

/// Which acquisition the session starts with
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StartCommand {
    #[default]
    Eeg,
    Impedance,
}

impl StartCommand {
    pub fn start(self) -> Command {
        match self {
            StartCommand::Eeg => Command::StartEeg,
            StartCommand::Impedance => Command::StartImpedance,
        }
    }

    pub fn stop(self) -> Command {
        match self {
            StartCommand::Eeg => Command::StopEeg,
            StartCommand::Impedance => Command::StopImpedance,
        }
    }
}

/// Streaming loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StreamingConfig {
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,

    #[serde(default = "default_status_log_interval_frames")]
    pub status_log_interval_frames: u64,

    #[serde(default)]
    pub start_command: StartCommand,
}

/// Frame recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecordingConfig {
    #[serde(default = "default_recording_enabled")]
    pub enabled: bool,

    #[serde(default = "default_recording_dir")]
    pub dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily log files; stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/rfcomm0".to_string() }
fn default_baud_rate() -> u32 { 115_200 }
fn default_timeout_ms() -> u64 { 100 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_keep_alive_interval_ms() -> u64 { 1000 }
fn default_status_log_interval_frames() -> u64 { 500 }

fn default_recording_enabled() -> bool { true }
fn default_recording_dir() -> String { "./recordings".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            firmware_version: 0,
            multi_sample: false,
            compression: Compression::None,
            stimulating: false,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
            status_log_interval_frames: default_status_log_interval_frames(),
            start_command: StartCommand::default(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: default_recording_enabled(),
            dir: default_recording_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> StimlinkError {
    StimlinkError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use stimlink::config::Config;
    ///
    /// let config = Config::load("stimlink.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Decoder settings derived from the `[device]` section
    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            firmware_version: self.device.firmware_version,
            stimulating: self.device.stimulating,
            multi_sample: self.device.multi_sample,
            compression: self.device.compression,
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 9600, 57600, 115200, 230400, 460800, 921600",
            ));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.streaming.keep_alive_interval_ms == 0 || self.streaming.keep_alive_interval_ms > 60000 {
            return Err(invalid("keep_alive_interval_ms must be between 1 and 60000"));
        }

        if self.streaming.status_log_interval_frames == 0 {
            return Err(invalid("status_log_interval_frames must be greater than 0"));
        }

        if self.recording.enabled && self.recording.dir.is_empty() {
            return Err(invalid("recording dir cannot be empty when enabled"));
        }

        if self.recording.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.recording.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if matches!(&self.logging.dir, Some(dir) if dir.is_empty()) {
            return Err(invalid("logging dir cannot be empty when set"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config {
            serial: SerialConfig::default(),
            device: DeviceConfig::default(),
            streaming: StreamingConfig::default(),
            recording: RecordingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"
baud_rate = 460800

[device]
firmware_version = 1187
multi_sample = true
compression = "packed12"

[streaming]
start_command = "impedance"

[recording]
enabled = false
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 460_800);
        assert_eq!(config.serial.timeout_ms, 100);
        assert_eq!(config.device.compression, Compression::Packed12);
        assert_eq!(config.streaming.start_command, StartCommand::Impedance);
        assert!(!config.recording.enabled);
        assert!(config.logging.dir.is_none());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.serial.port, "/dev/rfcomm0");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.streaming.start_command, StartCommand::Eeg);
        assert!(config.recording.enabled);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/stimlink.toml");
        assert!(matches!(result, Err(StimlinkError::Io(_))));
    }

    #[test]
    fn test_unknown_compression_rejected() {
        let result = Config::from_toml("[device]\ncompression = \"zip\"\n");
        assert!(matches!(result, Err(StimlinkError::Config(_))));
    }

    #[test]
    fn test_unknown_start_command_rejected() {
        let result = Config::from_toml("[streaming]\nstart_command = \"stim\"\n");
        assert!(matches!(result, Err(StimlinkError::Config(_))));
    }

    #[test]
    fn test_decoder_config_from_device_section() {
        let mut config = create_valid_config();
        config.device.firmware_version = 590;
        config.device.multi_sample = true;
        config.device.compression = Compression::Delta16;
        config.device.stimulating = true;

        let decoder = config.decoder_config();
        assert_eq!(decoder.firmware_version, 590);
        assert!(decoder.multi_sample);
        assert_eq!(decoder.compression, Compression::Delta16);
        assert!(decoder.stimulating);
    }

    #[test]
    fn test_start_command_mapping() {
        assert_eq!(StartCommand::Eeg.start(), Command::StartEeg);
        assert_eq!(StartCommand::Eeg.stop(), Command::StopEeg);
        assert_eq!(StartCommand::Impedance.start(), Command::StartImpedance);
        assert_eq!(StartCommand::Impedance.stop(), Command::StopImpedance);
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = create_valid_config();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = 420_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in SUPPORTED_BAUD_RATES {
            let mut config = create_valid_config();
            config.serial.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_timeout_ms_bounds() {
        let mut config = create_valid_config();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());
        config.serial.timeout_ms = 10001;
        assert!(config.validate().is_err());
        config.serial.timeout_ms = 10000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reconnect_interval_bounds() {
        let mut config = create_valid_config();
        config.serial.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());
        config.serial.reconnect_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keep_alive_interval_bounds() {
        let mut config = create_valid_config();
        config.streaming.keep_alive_interval_ms = 0;
        assert!(config.validate().is_err());
        config.streaming.keep_alive_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_status_log_interval_zero() {
        let mut config = create_valid_config();
        config.streaming.status_log_interval_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_recording_dir_when_enabled() {
        let mut config = create_valid_config();
        config.recording.enabled = true;
        config.recording.dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_recording_dir_when_disabled() {
        let mut config = create_valid_config();
        config.recording.enabled = false;
        config.recording.dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_records_per_file_zero() {
        let mut config = create_valid_config();
        config.recording.max_records_per_file = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_files_to_keep_zero() {
        let mut config = create_valid_config();
        config.recording.max_files_to_keep = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_logging_dir() {
        let mut config = create_valid_config();
        config.logging.dir = Some(String::new());
        assert!(config.validate().is_err());
        config.logging.dir = Some("./logs".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_serial_port(), "/dev/rfcomm0");
        assert_eq!(default_baud_rate(), 115_200);
        assert_eq!(default_timeout_ms(), 100);
        assert_eq!(default_reconnect_interval_ms(), 1000);
        assert_eq!(default_keep_alive_interval_ms(), 1000);
        assert_eq!(default_status_log_interval_frames(), 500);
        assert!(default_recording_enabled());
        assert_eq!(default_recording_dir(), "./recordings");
        assert_eq!(default_max_records_per_file(), 10000);
        assert_eq!(default_max_files_to_keep(), 10);
    }
}
