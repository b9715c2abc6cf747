// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2025 Adrian <adrian.eddy at gmail>

use serde::{ Deserialize, Serialize };
use std::path::Path;
use crate::types::EncoderError;

pub const MAX_QUANTIZER: u32 = 63;
pub const MAX_SPEED: u32 = 18;
pub const MAX_THREADS: u32 = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateControlMode {
    /// Constant quality
    #[default]
    ConstantQuality,
    ConstantBitrate,
    /// Two-pass, bitrate derived from a requested final size
    TwoPass,
    /// Two-pass with an average bitrate
    TwoPassBitrate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deadline {
    Realtime,
    #[default]
    Good,
    Best,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateControl {
    pub mode: RateControlMode,
    /// Quantizer for constant quality, lower bound otherwise
    pub quantizer: u32,
    /// kbit/s, constant bitrate mode
    pub bitrate: u32,
    /// kbit/s, two-pass bitrate mode
    pub avg_bitrate: u32,
    /// MB, two-pass mode. 0 encodes by quality only.
    pub final_size_mb: u32,
}

impl Default for RateControl {
    fn default() -> Self {
        Self {
            mode: RateControlMode::ConstantQuality,
            quantizer: 30,
            bitrate: 1500,
            avg_bitrate: 1500,
            final_size_mb: 0,
        }
    }
}

/// Encoder settings, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rate_control: RateControl,
    /// Maximum key frame interval in frames, 0 lets the codec decide
    pub keyint: u32,
    /// Speed/quality tradeoff, 0 (slowest) ..= 18 (fastest)
    pub speed: u32,
    pub auto_threads: bool,
    pub threads: u32,
    pub full_range: bool,
    pub deadline: Deadline,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rate_control: RateControl::default(),
            keyint: 300,
            speed: 10,
            auto_threads: true,
            threads: 1,
            full_range: false,
            deadline: Deadline::Good,
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, EncoderError> {
        let settings: Settings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EncoderError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loading encoder settings from {:?}", path.as_ref());
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), EncoderError> {
        if self.rate_control.quantizer > MAX_QUANTIZER {
            return Err(EncoderError::Settings(format!("quantizer {} out of range 0..={MAX_QUANTIZER}", self.rate_control.quantizer)));
        }
        if self.speed > MAX_SPEED {
            return Err(EncoderError::Settings(format!("speed {} out of range 0..={MAX_SPEED}", self.speed)));
        }
        if !self.auto_threads && !(1..=MAX_THREADS).contains(&self.threads) {
            return Err(EncoderError::Settings(format!("thread count {} out of range 1..={MAX_THREADS}", self.threads)));
        }
        match self.rate_control.mode {
            RateControlMode::ConstantBitrate if self.rate_control.bitrate == 0 => {
                Err(EncoderError::Settings("constant bitrate mode needs a bitrate".into()))
            }
            _ => Ok(())
        }
    }

    pub fn is_dual_pass(&self) -> bool {
        matches!(self.rate_control.mode, RateControlMode::TwoPass | RateControlMode::TwoPassBitrate)
    }

    /// Codec speed control value, -9..=9
    pub fn cpu_used(&self) -> i32 {
        if self.speed > MAX_SPEED { 9 } else { self.speed as i32 - 9 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_partial_toml() {
        let settings = Settings::from_toml_str(r#"
            keyint = 5
            deadline = "best"

            [rate_control]
            mode = "two_pass_bitrate"
            avg_bitrate = 2500
        "#).unwrap();

        assert_eq!(settings.keyint, 5);
        assert_eq!(settings.deadline, Deadline::Best);
        assert_eq!(settings.rate_control.mode, RateControlMode::TwoPassBitrate);
        assert_eq!(settings.rate_control.avg_bitrate, 2500);
        assert_eq!(settings.rate_control.quantizer, RateControl::default().quantizer);
        assert!(settings.is_dual_pass());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = Settings::from_toml_str("[rate_control]\nquantizer = 64").unwrap_err();
        assert!(matches!(err, EncoderError::Settings(_)), "{err}");

        let err = Settings::from_toml_str("speed = 19").unwrap_err();
        assert!(matches!(err, EncoderError::Settings(_)), "{err}");

        let err = Settings::from_toml_str("auto_threads = false\nthreads = 0").unwrap_err();
        assert!(matches!(err, EncoderError::Settings(_)), "{err}");

        let err = Settings::from_toml_str("deadline = \"fastest\"").unwrap_err();
        assert!(matches!(err, EncoderError::SettingsParse(_)), "{err}");
    }

    #[test]
    fn cpu_used_mapping() {
        let mut settings = Settings::default();
        settings.speed = 0;
        assert_eq!(settings.cpu_used(), -9);
        settings.speed = 18;
        assert_eq!(settings.cpu_used(), 9);
        settings.speed = 25;
        assert_eq!(settings.cpu_used(), 9);
    }
}
