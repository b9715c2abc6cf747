// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2025 Adrian <adrian.eddy at gmail>

//! Deterministic stand-in for a look-ahead block codec.
//!
//! Frames are held back `lag_in_frames` submissions and come out in submission order. Payloads
//! carry the internal timestamp and a CRC32 of the picture, key frames repeat every `kf_max_dist`
//! frames. The first pass produces one stats record per frame plus a trailing summary record
//! once flushed, the same shape a real two-pass codec produces.

use super::*;
use std::collections::VecDeque;

pub const STATS_RECORD_SIZE: usize = 32;
const MAX_LAG_IN_FRAMES: u32 = 25;
const STATS_MAGIC: &[u8; 4] = b"FPST";
const SUMMARY_MAGIC: &[u8; 4] = b"FPSM";

#[derive(Debug, Clone)]
pub struct SimulatedCodec {
    lag_in_frames: u32,
    psnr_packets: bool,
}

impl Default for SimulatedCodec {
    fn default() -> Self { Self::new() }
}

impl SimulatedCodec {
    pub fn new() -> Self {
        Self { lag_in_frames: MAX_LAG_IN_FRAMES, psnr_packets: false }
    }

    /// Look-ahead depth put into the default config
    pub fn with_lag(mut self, lag_in_frames: u32) -> Self {
        self.lag_in_frames = lag_in_frames;
        self
    }

    /// Emit a PSNR packet after every frame or stats packet
    pub fn with_psnr_packets(mut self, enabled: bool) -> Self {
        self.psnr_packets = enabled;
        self
    }

    fn validate(config: &CodecConfig) -> Result<(), EncoderError> {
        if config.width == 0 || config.height == 0 || config.width % 2 != 0 || config.height % 2 != 0 {
            return Err(EncoderError::InvalidConfig(format!("unsupported dimensions {}x{}", config.width, config.height)));
        }
        if config.time_base.num() == 0 || config.time_base.den() == 0 {
            return Err(EncoderError::InvalidConfig(format!("invalid time base {:?}", config.time_base)));
        }
        if config.threads == 0 {
            return Err(EncoderError::InvalidConfig("zero threads".into()));
        }
        if config.min_quantizer > config.max_quantizer || config.max_quantizer > 63 {
            return Err(EncoderError::InvalidConfig(format!("invalid quantizer range {}..={}", config.min_quantizer, config.max_quantizer)));
        }
        if config.end_usage == EndUsage::Cbr && config.target_bitrate == 0 {
            return Err(EncoderError::InvalidConfig("constant bitrate without a target".into()));
        }
        if config.pass == CodecPass::LastPass {
            match &config.stats_in {
                Some(stats) if !stats.is_empty() && stats.len() % STATS_RECORD_SIZE == 0 => { }
                Some(stats) => return Err(EncoderError::InvalidConfig(format!("first pass stats of {} bytes are not a whole number of records", stats.len()))),
                None => return Err(EncoderError::InvalidConfig("last pass without first pass stats".into())),
            }
        }
        Ok(())
    }
}

impl CodecInterface for SimulatedCodec {
    fn name(&self) -> &str { "simulated" }

    fn default_config(&self) -> CodecConfig {
        CodecConfig {
            width: 320,
            height: 240,
            threads: 1,
            time_base: Rational(1, 30),
            pass: CodecPass::OnePass,
            lag_in_frames: self.lag_in_frames,
            end_usage: EndUsage::Vbr,
            target_bitrate: 256,
            min_quantizer: 4,
            max_quantizer: 63,
            two_pass_max_section_pct: 2000,
            stats_in: None,
            kf_max_dist: 128,
        }
    }

    fn init(&self, config: &CodecConfig) -> Result<EncoderBackend, EncoderError> {
        Self::validate(config)?;
        Ok(SimulatedEncoder::new(config.clone(), self.psnr_packets).into())
    }
}

struct Delayed {
    pts: u64,
    duration: u64,
    fingerprint: u32,
}

pub struct SimulatedEncoder {
    config: CodecConfig,
    psnr_packets: bool,

    lookahead: VecDeque<Delayed>,
    ready: VecDeque<CodecPacket>,
    last_pts: Option<u64>,
    frames_out: u64,
    total_duration: u64,
    summary_sent: bool,

    cpu_used: i32,
    cq_level: Option<u32>,
    range: ColorRange,
    last_quantizer: i32,
}

impl SimulatedEncoder {
    fn new(mut config: CodecConfig, psnr_packets: bool) -> Self {
        config.lag_in_frames = config.lag_in_frames.min(MAX_LAG_IN_FRAMES);
        Self {
            config,
            psnr_packets,
            lookahead: VecDeque::new(),
            ready: VecDeque::new(),
            last_pts: None,
            frames_out: 0,
            total_duration: 0,
            summary_sent: false,
            cpu_used: 0,
            cq_level: None,
            range: ColorRange::Limited,
            last_quantizer: 0,
        }
    }

    fn fingerprint(picture: &Picture) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for plane in 0..picture.format().planes() {
            let (w, h) = picture.format().plane_size(plane, picture.width(), picture.height());
            let stride = picture.stride(plane);
            for row in picture.plane(plane).chunks(stride).take(h as usize) {
                hasher.update(&row[..w as usize]);
            }
        }
        hasher.finalize()
    }

    fn frame_quantizer(&self, keyframe: bool) -> i32 {
        match self.config.end_usage {
            EndUsage::Cq => self.cq_level.map(|q| q as i32).unwrap_or(0),
            EndUsage::Q => self.config.min_quantizer as i32,
            EndUsage::Vbr | EndUsage::Cbr if keyframe => self.config.min_quantizer as i32,
            EndUsage::Vbr | EndUsage::Cbr => ((self.config.min_quantizer + self.config.max_quantizer) / 2) as i32,
        }
    }

    fn emit(&mut self, frame: Delayed) {
        let index = self.frames_out;
        self.frames_out += 1;
        self.total_duration += frame.duration;
        let keyframe = match self.config.kf_max_dist {
            0 => index == 0,
            n => index % n as u64 == 0,
        };

        log::trace!("Emitting frame {index} at {}, cpu-used {}", frame.pts, self.cpu_used);
        let packet = match self.config.pass {
            CodecPass::FirstPass => {
                let mut record = Vec::with_capacity(STATS_RECORD_SIZE);
                record.extend_from_slice(STATS_MAGIC);
                record.extend_from_slice(&index.to_le_bytes());
                record.extend_from_slice(&frame.pts.to_le_bytes());
                record.extend_from_slice(&frame.fingerprint.to_le_bytes());
                record.extend_from_slice(&frame.duration.to_le_bytes());
                CodecPacket::Stats(record)
            }
            CodecPass::OnePass | CodecPass::LastPass => {
                let size = if keyframe { 64 } else { 16 };
                let mut data = Vec::with_capacity(size);
                data.push(keyframe as u8 | ((self.range == ColorRange::Full) as u8) << 1);
                data.extend_from_slice(&frame.pts.to_le_bytes());
                data.extend_from_slice(&frame.fingerprint.to_le_bytes());
                data.resize(size, (index & 0xFF) as u8);
                self.last_quantizer = self.frame_quantizer(keyframe);
                CodecPacket::Frame { data, pts: frame.pts, duration: frame.duration, keyframe }
            }
        };
        self.ready.push_back(packet);
        if self.psnr_packets {
            self.ready.push_back(CodecPacket::Psnr([40.0, 42.0, 41.0, 43.0]));
        }
    }

    fn summary(&self) -> Vec<u8> {
        let mut record = Vec::with_capacity(STATS_RECORD_SIZE);
        record.extend_from_slice(SUMMARY_MAGIC);
        record.extend_from_slice(&self.frames_out.to_le_bytes());
        record.extend_from_slice(&0u64.to_le_bytes());
        record.extend_from_slice(&0u32.to_le_bytes());
        record.extend_from_slice(&self.total_duration.to_le_bytes());
        record
    }
}

impl EncoderInterface for SimulatedEncoder {
    fn encode(&mut self, picture: Option<&Picture>, pts: u64, duration: u64, _deadline: Deadline) -> Result<(), EncoderError> {
        let Some(picture) = picture else {
            while let Some(frame) = self.lookahead.pop_front() {
                self.emit(frame);
            }
            if self.config.pass == CodecPass::FirstPass && !self.summary_sent {
                self.summary_sent = true;
                let summary = self.summary();
                self.ready.push_back(CodecPacket::Stats(summary));
            }
            return Ok(());
        };

        if picture.width() != self.config.width || picture.height() != self.config.height {
            return Err(EncoderError::EncodeFailed(format!("picture is {}x{}, configured for {}x{}", picture.width(), picture.height(), self.config.width, self.config.height)));
        }
        if let Some(last) = self.last_pts {
            if pts <= last {
                return Err(EncoderError::EncodeFailed(format!("non-increasing timestamp {pts} after {last}")));
            }
        }
        if self.summary_sent {
            return Err(EncoderError::EncodeFailed("picture submitted after flush".into()));
        }
        self.last_pts = Some(pts);

        self.lookahead.push_back(Delayed { pts, duration, fingerprint: Self::fingerprint(picture) });
        while self.lookahead.len() > self.config.lag_in_frames as usize {
            if let Some(frame) = self.lookahead.pop_front() {
                self.emit(frame);
            }
        }
        Ok(())
    }

    fn next_packet(&mut self) -> Option<CodecPacket> {
        self.ready.pop_front()
    }

    fn control(&mut self, control: CodecControl) -> Result<(), EncoderError> {
        match control {
            CodecControl::CpuUsed(v) if (-9..=9).contains(&v) => self.cpu_used = v,
            CodecControl::CqLevel(q) if q <= self.config.max_quantizer => self.cq_level = Some(q),
            CodecControl::ColorRange(range) => self.range = range,
            _ => return Err(EncoderError::ControlRejected(control)),
        }
        Ok(())
    }

    fn last_quantizer(&mut self) -> Result<i32, EncoderError> {
        Ok(self.last_quantizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(codec: &SimulatedCodec, pass: CodecPass) -> CodecConfig {
        CodecConfig { width: 16, height: 8, pass, kf_max_dist: 3, ..codec.default_config() }
    }

    fn drain(enc: &mut EncoderBackend) -> Vec<CodecPacket> {
        std::iter::from_fn(|| enc.next_packet()).collect()
    }

    #[test]
    fn frames_are_delayed_by_lag() {
        let codec = SimulatedCodec::new().with_lag(2);
        let mut enc = codec.init(&config(&codec, CodecPass::OnePass)).unwrap();
        let pic = Picture::new(16, 8, 16, ColorRange::Limited).unwrap();

        enc.encode(Some(&pic), 0, 1, Deadline::Good).unwrap();
        enc.encode(Some(&pic), 1, 1, Deadline::Good).unwrap();
        assert!(drain(&mut enc).is_empty());

        enc.encode(Some(&pic), 2, 1, Deadline::Good).unwrap();
        let out = drain(&mut enc);
        assert!(matches!(out.as_slice(), [CodecPacket::Frame { pts: 0, keyframe: true, .. }]));

        enc.encode(None, 3, 1, Deadline::Good).unwrap();
        let out = drain(&mut enc);
        assert!(matches!(out.as_slice(), [CodecPacket::Frame { pts: 1, keyframe: false, .. }, CodecPacket::Frame { pts: 2, keyframe: false, .. }]));

        enc.encode(None, 4, 1, Deadline::Good).unwrap();
        assert!(drain(&mut enc).is_empty());
    }

    #[test]
    fn rejects_non_increasing_timestamps() {
        let codec = SimulatedCodec::new();
        let mut enc = codec.init(&config(&codec, CodecPass::OnePass)).unwrap();
        let pic = Picture::new(16, 8, 16, ColorRange::Limited).unwrap();
        enc.encode(Some(&pic), 5, 1, Deadline::Good).unwrap();
        assert!(matches!(enc.encode(Some(&pic), 5, 1, Deadline::Good), Err(EncoderError::EncodeFailed(_))));
    }

    #[test]
    fn first_pass_emits_stats_and_summary() {
        let codec = SimulatedCodec::new().with_lag(0);
        let mut enc = codec.init(&config(&codec, CodecPass::FirstPass)).unwrap();
        let pic = Picture::new(16, 8, 16, ColorRange::Limited).unwrap();
        enc.encode(Some(&pic), 0, 1, Deadline::Good).unwrap();
        enc.encode(None, 1, 1, Deadline::Good).unwrap();
        let out = drain(&mut enc);
        assert_eq!(out.len(), 2);
        for packet in &out {
            let CodecPacket::Stats(record) = packet else { panic!("unexpected {packet:?}") };
            assert_eq!(record.len(), STATS_RECORD_SIZE);
        }
    }

    #[test]
    fn last_pass_needs_whole_stats_records() {
        let codec = SimulatedCodec::new();
        let mut cfg = config(&codec, CodecPass::LastPass);
        assert!(matches!(codec.init(&cfg), Err(EncoderError::InvalidConfig(_))));
        cfg.stats_in = Some(StatsBuffer::new(vec![0; STATS_RECORD_SIZE + 1]));
        assert!(matches!(codec.init(&cfg), Err(EncoderError::InvalidConfig(_))));
        cfg.stats_in = Some(StatsBuffer::new(vec![0; STATS_RECORD_SIZE * 2]));
        assert!(codec.init(&cfg).is_ok());
    }

    #[test]
    fn controls() {
        let codec = SimulatedCodec::new();
        let mut enc = codec.init(&config(&codec, CodecPass::OnePass)).unwrap();
        assert!(enc.control(CodecControl::CpuUsed(4)).is_ok());
        assert!(matches!(enc.control(CodecControl::CpuUsed(12)), Err(EncoderError::ControlRejected(_))));
        assert!(matches!(enc.control(CodecControl::CqLevel(64)), Err(EncoderError::ControlRejected(_))));
    }
}
