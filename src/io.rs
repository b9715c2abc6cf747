// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use crate::encoder::StatsBuffer;
use crate::types::EncoderError;
use std::fs::File;
use std::io::{ BufWriter, Read, Write };
use std::path::{ Path, PathBuf };

/// Stats files above this size are treated as corrupt.
pub const MAX_STATS_FILE_SIZE: u64 = 1 << 30;

/// Loads a complete first pass stats file into memory.
pub fn read_stats_file(path: &Path) -> Result<StatsBuffer, EncoderError> {
    let size = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => 0,
    };
    if size == 0 {
        return Err(EncoderError::StatsFileMissing { path: path.to_path_buf() });
    }
    if size > MAX_STATS_FILE_SIZE {
        return Err(EncoderError::StatsFileTooLarge { path: path.to_path_buf(), size });
    }

    let file = File::open(path).map_err(|source| EncoderError::StatsFileRead { path: path.to_path_buf(), source })?;
    let stats = read_stats_exact(path, size, file)?;
    log::info!("Loaded {size} bytes of first pass stats from {path:?}");
    Ok(stats)
}

/// Reads exactly `size` bytes, a short read is an error.
fn read_stats_exact<R: Read>(path: &Path, size: u64, mut reader: R) -> Result<StatsBuffer, EncoderError> {
    let read_err = |source: std::io::Error| EncoderError::StatsFileRead { path: path.to_path_buf(), source };
    let mut data = Vec::new();
    data.try_reserve_exact(size as usize).map_err(|_| read_err(std::io::ErrorKind::OutOfMemory.into()))?;
    data.resize(size as usize, 0);
    reader.read_exact(&mut data).map_err(read_err)?;
    Ok(StatsBuffer::new(data))
}

/// Append-only sink for first pass stats. The file is created (or truncated) when the first
/// chunk arrives, so a session that never produces stats leaves no file behind.
#[derive(Debug)]
pub struct StatsWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    written: u64,
    closed: bool,
}

impl StatsWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None, written: 0, closed: false }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Bytes appended so far
    pub fn written(&self) -> u64 { self.written }

    pub fn append(&mut self, chunk: &[u8]) -> Result<(), EncoderError> {
        assert!(!self.closed, "stats file {:?} written after close", self.path);
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                let file = File::create(&self.path).map_err(|source| EncoderError::StatsFileWrite { path: self.path.clone(), source })?;
                log::debug!("Opened stats file {:?} for writing", self.path);
                BufWriter::new(file)
            }
        };
        let file = self.file.insert(file);
        file.write_all(chunk).map_err(|source| EncoderError::StatsFileWrite { path: self.path.clone(), source })?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes and closes the file. Further appends are not allowed.
    pub fn close(&mut self) -> Result<(), EncoderError> {
        self.closed = true;
        if let Some(mut file) = self.file.take() {
            file.flush().map_err(|source| EncoderError::StatsFileWrite { path: self.path.clone(), source })?;
            log::debug!("Closed stats file {:?} after {} bytes", self.path, self.written);
        }
        Ok(())
    }
}

impl Drop for StatsWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("{e}");
        }
    }
}
