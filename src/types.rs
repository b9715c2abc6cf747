// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use std::path::PathBuf;
use thiserror::Error;

/// Rational number as (numerator, denominator). Used for time bases, where `Rational(1, 25)` is 1/25 s per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rational(pub u32, pub u32);

impl Rational {
    pub fn num(&self) -> u32 { self.0 }
    pub fn den(&self) -> u32 { self.1 }

    /// Both terms masked to the non-negative 31-bit range codecs accept.
    pub fn masked(self) -> Self {
        Self(self.0 & 0x7FFF_FFFF, self.1 & 0x7FFF_FFFF)
    }
}

impl From<(u32, u32)> for Rational {
    fn from(v: (u32, u32)) -> Self { Self(v.0, v.1) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    YUV420P,
}

impl PixelFormat {
    pub fn planes(&self) -> usize { 3 }

    /// (width, height) of the given plane for a picture of `width`x`height`
    pub fn plane_size(&self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        match (self, plane) {
            (PixelFormat::YUV420P, 0) => (width, height),
            (PixelFormat::YUV420P, _) => (width.div_ceil(2), height.div_ceil(2)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRange {
    #[default]
    Limited,
    Full,
}

/// Properties of the source stream the encoder is fed from.
#[derive(Debug, Clone, Default)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub time_base: Rational,
    pub frame_increment_us: u64,
    pub duration_us: u64,
}

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Codec interface not available: {0}")]
    CodecUnavailable(String),
    #[error("Codec rejected the configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid pass number {0}")]
    InvalidPass(u32),
    #[error("Pass {pass} cannot be used with rate control mode {mode:?}")]
    PassModeMismatch { pass: u32, mode: crate::RateControlMode },
    #[error("No stats file given for pass {0}")]
    StatsPathMissing(u32),
    #[error("Stats file {path:?} not found or empty, cannot proceed with the second pass")]
    StatsFileMissing { path: PathBuf },
    #[error("Stats file {path:?} size {size} exceeds one GiB, not loading it into memory")]
    StatsFileTooLarge { path: PathBuf, size: u64 },
    #[error("Reading stats file {path:?} failed: {source}")]
    StatsFileRead { path: PathBuf, source: std::io::Error },
    #[error("Cannot write stats file {path:?}: {source}")]
    StatsFileWrite { path: PathBuf, source: std::io::Error },
    #[error("Cannot derive a bitrate for {size_mb} MB over {duration_us} us")]
    BitrateDerivation { duration_us: u64, size_mb: u32 },
    #[error("Cannot allocate a {width}x{height} picture")]
    PictureAllocation { width: u32, height: u32 },
    #[error("Encoding error: {0}")]
    EncodeFailed(String),
    #[error("Codec control {0:?} rejected")]
    ControlRejected(crate::encoder::CodecControl),
    #[error("Frame source error: {0}")]
    Source(String),
    #[error("Invalid settings: {0}")]
    Settings(String),
    #[error("Cannot parse settings: {0}")]
    SettingsParse(#[from] toml::de::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
