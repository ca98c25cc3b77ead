//! JSONL frame recorder with file rotation.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::record::FrameRecord;
use crate::error::Result;
use crate::protocol::DecodedFrame;

/// Writes accepted frames to rotating JSONL files
///
/// Files are named `frames_<start time>_<index>.jsonl`. A new file is
/// opened every `max_records_per_file` records and only the newest
/// `max_files_to_keep` files written by this recorder are kept.
#[derive(Debug)]
pub struct FrameRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    session_stamp: String,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    file_index: usize,
    files: VecDeque<PathBuf>,
    total_records: u64,
}

impl FrameRecorder {
    /// Create the recorder, creating `dir` if needed
    ///
    /// No file is opened until the first record arrives.
    pub fn new<P: AsRef<Path>>(dir: P, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            session_stamp: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            writer: None,
            records_in_file: 0,
            file_index: 0,
            files: VecDeque::new(),
            total_records: 0,
        })
    }

    /// Append one frame
    pub fn record(&mut self, frame: &DecodedFrame) -> Result<()> {
        let record = FrameRecord::from_frame(frame, Utc::now().to_rfc3339());
        self.write_record(&record)
    }

    pub fn write_record(&mut self, record: &FrameRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
        }
        self.records_in_file += 1;
        self.total_records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// File currently written to
    pub fn current_file(&self) -> Option<&Path> {
        self.files.back().map(PathBuf::as_path)
    }

    /// Files written by this recorder that still exist, oldest first
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut old) = self.writer.take() {
            old.flush()?;
        }

        let path = self
            .dir
            .join(format!("frames_{}_{:04}.jsonl", self.session_stamp, self.file_index));
        let file = File::create(&path)?;
        info!("Recording frames to {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.file_index += 1;
        self.files.push_back(path);

        while self.files.len() > self.max_files_to_keep {
            if let Some(oldest) = self.files.pop_front() {
                match fs::remove_file(&oldest) {
                    Ok(()) => debug!("Removed old recording {}", oldest.display()),
                    Err(e) => warn!("Failed to remove old recording {}: {}", oldest.display(), e),
                }
            }
        }
        Ok(())
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush frame recording: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::fixtures::DeviceFrameBuilder;
    use crate::protocol::ProtocolDecoder;
    use tempfile::TempDir;

    fn sample_frame() -> ProtocolDecoder {
        let mut decoder = ProtocolDecoder::default();
        let bytes = DeviceFrameBuilder::new().accel_block([1, 2, 3]).build();
        assert_eq!(decoder.parse_bytes(&bytes, |_| {}), 1);
        decoder
    }

    #[test]
    fn test_records_one_line_per_frame() {
        let dir = TempDir::new().unwrap();
        let decoder = sample_frame();
        let mut recorder = FrameRecorder::new(dir.path(), 100, 5).unwrap();

        recorder.record(decoder.frame()).unwrap();
        recorder.record(decoder.frame()).unwrap();
        recorder.flush().unwrap();

        let contents = fs::read_to_string(recorder.current_file().unwrap()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["accelerometer"], serde_json::json!([1, 2, 3]));
        assert_eq!(recorder.total_records(), 2);
    }

    #[test]
    fn test_no_file_before_first_record() {
        let dir = TempDir::new().unwrap();
        let recorder = FrameRecorder::new(dir.path().join("nested"), 10, 2).unwrap();
        assert!(recorder.current_file().is_none());
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = TempDir::new().unwrap();
        let decoder = sample_frame();
        let mut recorder = FrameRecorder::new(dir.path(), 2, 2).unwrap();

        // 7 records at 2 per file = 4 files, only 2 kept
        for _ in 0..7 {
            recorder.record(decoder.frame()).unwrap();
        }
        recorder.flush().unwrap();

        let kept: Vec<PathBuf> = recorder.files().map(Path::to_path_buf).collect();
        assert_eq!(kept.len(), 2);
        assert!(kept[1].to_string_lossy().ends_with("_0003.jsonl"));

        let on_disk = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(on_disk, 2);

        let last = fs::read_to_string(&kept[1]).unwrap();
        assert_eq!(last.lines().count(), 1);
    }
}
