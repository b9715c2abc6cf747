// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

pub(crate) mod simulated;
pub use simulated::{ SimulatedCodec, SimulatedEncoder, STATS_RECORD_SIZE };

use crate::frame::Picture;
use crate::settings::Deadline;
use crate::types::*;

use std::fmt;
use std::sync::Arc;

/// First-pass statistics handed to the codec for the second pass. Immutable and shared, so it outlives the codec session.
#[derive(Clone, PartialEq, Eq)]
pub struct StatsBuffer(Arc<[u8]>);

impl StatsBuffer {
    pub fn new(data: Vec<u8>) -> Self { Self(data.into()) }
    pub fn as_slice(&self) -> &[u8] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
impl fmt::Debug for StatsBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatsBuffer({} bytes)", self.0.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecPass { OnePass, FirstPass, LastPass }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndUsage {
    Vbr,
    Cbr,
    /// Constrained quality
    Cq,
    /// Fixed quantizer
    Q,
}

#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub width: u32,
    pub height: u32,
    pub threads: u32,
    pub time_base: Rational,
    pub pass: CodecPass,
    pub lag_in_frames: u32,

    pub end_usage: EndUsage,
    /// kbit/s
    pub target_bitrate: u32,
    pub min_quantizer: u32,
    pub max_quantizer: u32,
    /// Max bitrate of a two-pass section as percent over target, 100 means 2x target
    pub two_pass_max_section_pct: u32,
    pub stats_in: Option<StatsBuffer>,

    pub kf_max_dist: u32,
}

/// Secondary tuning knobs applied after codec init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecControl {
    CpuUsed(i32),
    CqLevel(u32),
    ColorRange(ColorRange),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind { Frame, Stats, MbStats, Psnr, Custom }

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PacketKind::Frame   => "compressed frame",
            PacketKind::Stats   => "first pass stats",
            PacketKind::MbStats => "first pass macroblock stats",
            PacketKind::Psnr    => "psnr",
            PacketKind::Custom  => "custom",
        })
    }
}

/// Unit of codec output. `pts` is in codec ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecPacket {
    Frame { data: Vec<u8>, pts: u64, duration: u64, keyframe: bool },
    Stats(Vec<u8>),
    MbStats(Vec<u8>),
    Psnr([f64; 4]),
    Custom(Vec<u8>),
}

impl CodecPacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            CodecPacket::Frame { .. } => PacketKind::Frame,
            CodecPacket::Stats(_)     => PacketKind::Stats,
            CodecPacket::MbStats(_)   => PacketKind::MbStats,
            CodecPacket::Psnr(_)      => PacketKind::Psnr,
            CodecPacket::Custom(_)    => PacketKind::Custom,
        }
    }
}

/// An initialized codec session.
#[enum_dispatch::enum_dispatch(EncoderBackend)]
pub trait EncoderInterface {
    /// Submits a picture, or `None` to flush delayed frames. Output becomes available through `next_packet`.
    fn encode(&mut self, picture: Option<&Picture>, pts: u64, duration: u64, deadline: Deadline) -> Result<(), EncoderError>;

    /// Next packet ready after the last `encode` call, `None` once exhausted.
    fn next_packet(&mut self) -> Option<CodecPacket>;

    fn control(&mut self, control: CodecControl) -> Result<(), EncoderError>;

    /// Quantizer used for the most recently returned frame
    fn last_quantizer(&mut self) -> Result<i32, EncoderError>;
}

/// Codec entry point, creates sessions from a configuration.
pub trait CodecInterface {
    fn name(&self) -> &str;
    fn default_config(&self) -> CodecConfig;
    fn init(&self, config: &CodecConfig) -> Result<EncoderBackend, EncoderError>;
}

#[enum_dispatch::enum_dispatch]
pub enum EncoderBackend {
    SimulatedEncoder(simulated::SimulatedEncoder),
    CustomEncoder(CustomEncoder),
}

/// Codec implemented outside of this crate
pub struct CustomEncoder(pub Box<dyn EncoderInterface + Send>);

impl EncoderInterface for CustomEncoder {
    fn encode(&mut self, picture: Option<&Picture>, pts: u64, duration: u64, deadline: Deadline) -> Result<(), EncoderError> {
        self.0.encode(picture, pts, duration, deadline)
    }
    fn next_packet(&mut self) -> Option<CodecPacket> { self.0.next_packet() }
    fn control(&mut self, control: CodecControl) -> Result<(), EncoderError> { self.0.control(control) }
    fn last_quantizer(&mut self) -> Result<i32, EncoderError> { self.0.last_quantizer() }
}

pub struct Encoder {
    inner: EncoderBackend,
}

impl Encoder {
    /// Looks up a built-in codec by name.
    pub fn find(name: &str) -> Result<Box<dyn CodecInterface>, EncoderError> {
        match name {
            "simulated" => Ok(Box::new(SimulatedCodec::new())),
            _ => Err(EncoderError::CodecUnavailable(name.to_string())),
        }
    }

    pub fn new(codec: &dyn CodecInterface, config: &CodecConfig) -> Result<Self, EncoderError> {
        log::debug!("Initializing {} encoder with {config:#?}", codec.name());
        match codec.init(config) {
            Ok(inner) => Ok(Self { inner }),
            Err(e) => {
                log::error!("[{}] Init failed: {e}", codec.name());
                Err(e)
            }
        }
    }

    pub fn encode(&mut self, picture: Option<&Picture>, pts: u64, duration: u64, deadline: Deadline) -> Result<(), EncoderError> {
        self.inner.encode(picture, pts, duration, deadline)
    }
    pub fn next_packet(&mut self) -> Option<CodecPacket> {
        self.inner.next_packet()
    }
    pub fn control(&mut self, control: CodecControl) -> Result<(), EncoderError> {
        self.inner.control(control)
    }
    pub fn last_quantizer(&mut self) -> Result<i32, EncoderError> {
        self.inner.last_quantizer()
    }
}
