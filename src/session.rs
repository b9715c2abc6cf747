// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2025 Adrian <adrian.eddy at gmail>

use crate::encoder::*;
use crate::frame::{ FrameSource, Picture, RawFrame };
use crate::pass::{ Pass, PassOptions, PassState, apply_rate_control };
use crate::queue::{ OutputPacket, OutputQueue, PendingArtifact };
use crate::settings::{ Deadline, MAX_THREADS, Settings };
use crate::timestamps::TimestampMapper;
use crate::timing::TimeRescaler;
use crate::types::*;
use crate::util::thread_count;

const PICTURE_ALIGNMENT: usize = 16;

/// What a session did, returned by [`EncodeSession::close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub pass: Pass,
    pub frames_submitted: u64,
    pub artifacts_out: u64,
    pub stats_bytes: u64,
    /// Artifacts still queued at close
    pub discarded: usize,
}

/// Drives one pass of an encode: pulls frames from `S`, feeds the codec and hands out one
/// artifact per [`produce_one`](Self::produce_one) call.
pub struct EncodeSession<S: FrameSource> {
    source: S,
    info: VideoInfo,
    encoder: Encoder,
    config: CodecConfig,
    picture: Picture,
    pass: PassState,
    deadline: Deadline,
    fallback_quantizer: u32,

    rescaler: TimeRescaler,
    mapper: TimestampMapper,
    queue: OutputQueue,
    last_real: Option<u64>,

    flushing: bool,
    finished: bool,
    closed: bool,

    frames_submitted: u64,
    artifacts_out: u64,
}

impl<S: FrameSource> EncodeSession<S> {
    /// Validates the pass, derives the codec time base, loads second pass stats, configures rate
    /// control and only then initializes the codec and allocates the picture. Secondary controls
    /// rejected by the codec are logged and ignored.
    pub fn setup(codec: &dyn CodecInterface, source: S, settings: &Settings, options: &PassOptions) -> Result<Self, EncoderError> {
        settings.validate()?;
        let pass = Pass::from_number(options.pass, settings.rate_control.mode)?;

        let info = source.video_info();
        let rescaler = TimeRescaler::new(info.time_base, info.frame_increment_us)?;
        log::info!("Source time base {:?}, codec time base {:?}, frame duration {}", info.time_base, rescaler.time_base(), rescaler.frame_duration());

        let pass_state = PassState::open(pass, options)?;

        let mut config = codec.default_config();
        log::debug!("Default {} configuration: {config:#?}", codec.name());
        config.width = info.width;
        config.height = info.height;
        config.threads = thread_count(settings.auto_threads, settings.threads, MAX_THREADS);
        config.time_base = rescaler.time_base();
        apply_rate_control(&mut config, settings, pass, info.duration_us)?;
        config.stats_in = pass_state.stats_in();

        let deadline = match settings.deadline {
            // The first pass keeps good quality and its look-ahead
            Deadline::Realtime if pass == Pass::First => Deadline::Good,
            Deadline::Realtime => {
                config.lag_in_frames = 0;
                Deadline::Realtime
            }
            other => other,
        };

        let mut encoder = Encoder::new(codec, &config)?;
        let range = if settings.full_range { ColorRange::Full } else { ColorRange::Limited };
        let picture = Picture::new(config.width, config.height, PICTURE_ALIGNMENT, range)?;

        let mut controls = vec![CodecControl::CpuUsed(settings.cpu_used())];
        if config.end_usage == EndUsage::Cq {
            controls.push(CodecControl::CqLevel(settings.rate_control.quantizer));
        }
        controls.push(CodecControl::ColorRange(range));
        for control in controls {
            if let Err(e) = encoder.control(control) {
                log::warn!("[{}] Cannot set codec control {control:?}: {e}", codec.name());
            }
        }

        Ok(Self {
            source,
            info,
            encoder,
            config,
            picture,
            pass: pass_state,
            deadline,
            fallback_quantizer: settings.rate_control.quantizer,
            rescaler,
            mapper: TimestampMapper::new(),
            queue: OutputQueue::new(),
            last_real: None,
            flushing: false,
            finished: false,
            closed: false,
            frames_submitted: 0,
            artifacts_out: 0,
        })
    }

    pub fn pass(&self) -> Pass { self.pass.pass() }
    pub fn config(&self) -> &CodecConfig { &self.config }
    pub fn deadline(&self) -> Deadline { self.deadline }
    pub fn time_base(&self) -> Rational { self.rescaler.time_base() }
    pub fn frame_duration(&self) -> u64 { self.rescaler.frame_duration() }
    pub fn is_flushing(&self) -> bool { self.flushing }

    /// Fills `out` with the next artifact. Returns `Ok(false)` once the codec is fully drained
    /// after end of stream, and on every call after that.
    pub fn produce_one(&mut self, out: &mut OutputPacket) -> Result<bool, EncoderError> {
        loop {
            if let Some(artifact) = self.queue.pop() {
                out.fill(artifact);
                self.artifacts_out += 1;
                return Ok(true);
            }
            if self.finished {
                return Ok(false);
            }

            if !self.flushing {
                match self.source.next_frame()? {
                    Some(frame) => {
                        self.submit(&frame)?;
                        self.drain()?;
                        continue;
                    }
                    None => {
                        log::info!("End of stream after {} frames, flushing delayed frames", self.frames_submitted);
                        self.flushing = true;
                    }
                }
            }

            let duration = self.rescaler.frame_duration();
            let pts = self.mapper.next_flush_timestamp(duration);
            self.encoder.encode(None, pts, duration, self.deadline).inspect_err(|e| log::error!("{e}"))?;
            self.drain()?;
            if self.queue.is_empty() {
                log::debug!("Codec drained, {} artifacts produced", self.artifacts_out);
                self.finished = true;
            }
        }
    }

    fn submit(&mut self, frame: &RawFrame) -> Result<(), EncoderError> {
        let real = match (frame.timestamp_us, self.last_real) {
            (Some(ts), _) => ts,
            (None, Some(prev)) => prev + self.info.frame_increment_us,
            (None, None) => 0,
        };
        self.last_real = Some(real);

        self.picture.fill_from(frame)?;
        let internal = self.mapper.record(real, self.rescaler.to_internal(real));
        self.frames_submitted += 1;

        self.encoder.encode(Some(&self.picture), internal, self.rescaler.frame_duration(), self.deadline).inspect_err(|e| log::error!("{e}"))
    }

    /// Moves everything the codec has ready into the output queue.
    fn drain(&mut self) -> Result<(), EncoderError> {
        let pass = self.pass.pass();
        while let Some(packet) = self.encoder.next_packet() {
            match (&mut self.pass, packet) {
                (PassState::Single | PassState::Second(_), CodecPacket::Frame { data, pts, keyframe, .. }) => {
                    let (dts, pts) = self.mapper.recover_real(pts);
                    let quantizer = match self.encoder.last_quantizer() {
                        Ok(q) if q > 0 => q as u32,
                        Ok(_) => self.fallback_quantizer,
                        Err(e) => {
                            log::debug!("Cannot read the last quantizer: {e}");
                            self.fallback_quantizer
                        }
                    };
                    self.queue.push(PendingArtifact::Frame { data, dts, pts, keyframe, quantizer });
                }
                (PassState::First(writer), CodecPacket::Stats(data)) => {
                    let ts = self.mapper.next_stats_timestamp(self.info.frame_increment_us);
                    self.queue.push(PendingArtifact::Stats { dts: ts, pts: ts });
                    if !data.is_empty() {
                        writer.append(&data)?;
                    }
                }
                (_, other) => {
                    log::warn!("Skipping packet of unexpected type \"{}\", pass {} expects {}", other.kind(), pass.number(), pass.expected_packet());
                }
            }
        }
        Ok(())
    }

    /// Ends the session. Undrained artifacts are discarded and the stats file is flushed and closed.
    pub fn close(mut self) -> Result<SessionSummary, EncoderError> {
        self.closed = true;
        let discarded = self.queue.discard();
        if discarded > 0 {
            log::warn!("Discarding {discarded} undrained artifacts");
        }
        let stats_bytes = match &mut self.pass {
            PassState::First(writer) => {
                writer.close()?;
                writer.written()
            }
            _ => 0,
        };
        Ok(SessionSummary {
            pass: self.pass.pass(),
            frames_submitted: self.frames_submitted,
            artifacts_out: self.artifacts_out,
            stats_bytes,
            discarded,
        })
    }
}

impl<S: FrameSource> Drop for EncodeSession<S> {
    fn drop(&mut self) {
        if !self.closed {
            let discarded = self.queue.discard();
            if discarded > 0 {
                log::warn!("Encode session dropped with {discarded} undrained artifacts");
            }
        }
        log::debug!("Destroying pass {} encode session", self.pass.pass().number());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SyntheticSource;
    use crate::settings::RateControlMode;

    fn cq_settings() -> Settings {
        let mut settings = Settings::default();
        settings.rate_control.mode = RateControlMode::ConstantQuality;
        settings.rate_control.quantizer = 20;
        settings.keyint = 5;
        settings.auto_threads = false;
        settings.threads = 2;
        settings
    }

    #[test]
    fn realtime_drops_look_ahead_outside_first_pass() {
        let mut settings = cq_settings();
        settings.deadline = Deadline::Realtime;
        let source = SyntheticSource::new(16, 16, Rational(1, 25), 40000, 3);
        let session = EncodeSession::setup(&SimulatedCodec::new().with_lag(3), source, &settings, &PassOptions::single()).unwrap();
        assert_eq!(session.config().lag_in_frames, 0);
        assert_eq!(session.deadline(), Deadline::Realtime);
        assert_eq!(session.config().threads, 2);
    }

    #[test]
    fn first_pass_keeps_good_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = cq_settings();
        settings.rate_control.mode = RateControlMode::TwoPass;
        settings.deadline = Deadline::Realtime;
        let source = SyntheticSource::new(16, 16, Rational(1, 25), 40000, 3);
        let session = EncodeSession::setup(&SimulatedCodec::new().with_lag(3), source, &settings, &PassOptions::first(dir.path().join("s"))).unwrap();
        assert_eq!(session.config().lag_in_frames, 3);
        assert_eq!(session.deadline(), Deadline::Good);
        assert_eq!(session.config().end_usage, EndUsage::Q);
    }

    #[test]
    fn missing_timestamps_continue_from_previous_frame() {
        let source = SyntheticSource::with_timestamps(16, 16, Rational(1, 25), 40000, vec![Some(80000), None, None]);
        let mut session = EncodeSession::setup(&SimulatedCodec::new().with_lag(0), source, &cq_settings(), &PassOptions::single()).unwrap();
        let mut out = OutputPacket::with_capacity(1024);
        let mut pts = Vec::new();
        while session.produce_one(&mut out).unwrap() {
            pts.push(out.pts);
        }
        assert_eq!(pts, vec![80000, 120000, 160000]);
    }

    #[test]
    fn close_discards_pending_artifacts() {
        let source = SyntheticSource::new(16, 16, Rational(1, 25), 40000, 4);
        let mut session = EncodeSession::setup(&SimulatedCodec::new().with_lag(3), source, &cq_settings(), &PassOptions::single()).unwrap();
        let mut out = OutputPacket::with_capacity(1024);
        assert!(session.produce_one(&mut out).unwrap());
        assert!(!session.is_flushing());
        // the flush returns the remaining three frames at once
        assert!(session.produce_one(&mut out).unwrap());
        assert!(session.is_flushing());
        let summary = session.close().unwrap();
        assert_eq!(summary.frames_submitted, 4);
        assert_eq!(summary.artifacts_out, 2);
        assert_eq!(summary.discarded, 2);
        assert_eq!(summary.pass, Pass::Single);
    }
}
