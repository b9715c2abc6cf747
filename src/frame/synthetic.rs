// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2025 Adrian <adrian.eddy at gmail>

use super::*;
use std::collections::VecDeque;

/// Generates moving gradient frames at the given timestamps.
pub struct SyntheticSource {
    info: VideoInfo,
    timestamps: VecDeque<Option<u64>>,
    index: u64,
    ended: bool,
}

impl SyntheticSource {
    /// `count` frames spaced `frame_increment_us` apart, starting at 0
    pub fn new(width: u32, height: u32, time_base: Rational, frame_increment_us: u64, count: u64) -> Self {
        let timestamps = (0..count).map(|i| Some(i * frame_increment_us)).collect();
        Self::with_timestamps(width, height, time_base, frame_increment_us, timestamps)
    }

    pub fn with_timestamps(width: u32, height: u32, time_base: Rational, frame_increment_us: u64, timestamps: Vec<Option<u64>>) -> Self {
        let count = timestamps.len() as u64;
        Self {
            info: VideoInfo {
                width,
                height,
                time_base,
                frame_increment_us,
                duration_us: count * frame_increment_us,
            },
            timestamps: timestamps.into(),
            index: 0,
            ended: false,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn video_info(&self) -> VideoInfo { self.info.clone() }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, EncoderError> {
        assert!(!self.ended, "frame source polled after end of stream");
        let Some(timestamp_us) = self.timestamps.pop_front() else {
            self.ended = true;
            return Ok(None);
        };

        let mut frame = RawFrame::new(self.info.width, self.info.height, PixelFormat::YUV420P, timestamp_us);
        let shift = self.index as usize;
        for plane in 0..3 {
            let stride = frame.stride(plane);
            for (y, row) in frame.plane_mut(plane).chunks_mut(stride).enumerate() {
                for (x, px) in row.iter_mut().enumerate() {
                    *px = ((x + y * 2 + shift * (plane + 1)) & 0xFF) as u8;
                }
            }
        }
        self.index += 1;
        Ok(Some(frame))
    }
}
