// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2025 Adrian <adrian.eddy at gmail>

use crate::encoder::{ CodecConfig, CodecPass, EndUsage, PacketKind, StatsBuffer };
use crate::io::{ StatsWriter, read_stats_file };
use crate::settings::{ MAX_QUANTIZER, RateControlMode, Settings };
use crate::types::EncoderError;
use crate::util::average_bitrate_from_duration;
use std::path::PathBuf;

/// Which pass to run and where its stats live. Supplied next to the settings at setup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassOptions {
    /// 0 single pass, 1 first pass, 2 second pass
    pub pass: u32,
    pub stats_path: Option<PathBuf>,
}

impl PassOptions {
    pub fn single() -> Self { Self::default() }
    pub fn first(stats_path: impl Into<PathBuf>) -> Self { Self { pass: 1, stats_path: Some(stats_path.into()) } }
    pub fn second(stats_path: impl Into<PathBuf>) -> Self { Self { pass: 2, stats_path: Some(stats_path.into()) } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass { Single, First, Second }

impl Pass {
    pub fn from_number(pass: u32, mode: RateControlMode) -> Result<Self, EncoderError> {
        let dual = matches!(mode, RateControlMode::TwoPass | RateControlMode::TwoPassBitrate);
        match (pass, dual) {
            (0, false) => Ok(Pass::Single),
            (1, true) => Ok(Pass::First),
            (2, true) => Ok(Pass::Second),
            (0, true) | (3.., _) => Err(EncoderError::InvalidPass(pass)),
            (_, false) => Err(EncoderError::PassModeMismatch { pass, mode }),
        }
    }

    pub fn number(self) -> u32 {
        match self {
            Pass::Single => 0,
            Pass::First => 1,
            Pass::Second => 2,
        }
    }

    pub fn codec_pass(self) -> CodecPass {
        match self {
            Pass::Single => CodecPass::OnePass,
            Pass::First => CodecPass::FirstPass,
            Pass::Second => CodecPass::LastPass,
        }
    }

    /// The only packet kind that carries output in this pass
    pub fn expected_packet(self) -> PacketKind {
        match self {
            Pass::First => PacketKind::Stats,
            Pass::Single | Pass::Second => PacketKind::Frame,
        }
    }
}

/// Per-pass resources: the stats sink while gathering, the loaded stats while using them.
#[derive(Debug)]
pub enum PassState {
    Single,
    First(StatsWriter),
    Second(StatsBuffer),
}

impl PassState {
    /// Prepares the stats side of `pass`. The second pass loads the whole stats file here.
    pub fn open(pass: Pass, options: &PassOptions) -> Result<Self, EncoderError> {
        if pass != Pass::Single {
            log::info!("Starting pass {}", options.pass);
        }
        let stats_path = || options.stats_path.clone().ok_or(EncoderError::StatsPathMissing(options.pass));
        Ok(match pass {
            Pass::Single => PassState::Single,
            Pass::First => PassState::First(StatsWriter::new(stats_path()?)),
            Pass::Second => PassState::Second(read_stats_file(&stats_path()?)?),
        })
    }

    pub fn pass(&self) -> Pass {
        match self {
            PassState::Single => Pass::Single,
            PassState::First(_) => Pass::First,
            PassState::Second(_) => Pass::Second,
        }
    }

    pub fn stats_in(&self) -> Option<StatsBuffer> {
        match self {
            PassState::Second(stats) => Some(stats.clone()),
            _ => None,
        }
    }
}

/// Fills the rate control part of `config` from the settings.
///
/// `duration_us` is the total source duration, needed when the two-pass bitrate is derived from a
/// requested final size.
pub fn apply_rate_control(config: &mut CodecConfig, settings: &Settings, pass: Pass, duration_us: u64) -> Result<(), EncoderError> {
    let rc = &settings.rate_control;
    config.min_quantizer = rc.quantizer;
    config.max_quantizer = MAX_QUANTIZER;

    match rc.mode {
        RateControlMode::ConstantQuality => {
            config.max_quantizer = rc.quantizer;
            config.end_usage = EndUsage::Cq;
        }
        RateControlMode::ConstantBitrate => {
            config.target_bitrate = rc.bitrate;
            config.end_usage = EndUsage::Cbr;
        }
        RateControlMode::TwoPass | RateControlMode::TwoPassBitrate => {
            let bitrate = match rc.mode {
                RateControlMode::TwoPass if rc.final_size_mb != 0 => {
                    average_bitrate_from_duration(duration_us, rc.final_size_mb)
                        .ok_or(EncoderError::BitrateDerivation { duration_us, size_mb: rc.final_size_mb })?
                }
                RateControlMode::TwoPass => 0,
                _ => rc.avg_bitrate,
            };
            if bitrate != 0 {
                config.target_bitrate = bitrate;
                // Sections may peak at twice the target
                config.two_pass_max_section_pct = 100;
                config.end_usage = EndUsage::Cq;
            } else {
                config.target_bitrate = 0;
                config.end_usage = EndUsage::Q;
            }
        }
    }

    config.pass = pass.codec_pass();
    config.kf_max_dist = settings.keyint;
    Ok(())
}
