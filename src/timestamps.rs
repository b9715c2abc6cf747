// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2025 Adrian <adrian.eddy at gmail>

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeMapping {
    /// Source timestamp, microseconds
    pub real: u64,
    /// Codec timestamp, codec ticks
    pub internal: u64,
}

/// Remembers which codec timestamp every submitted frame got, so packets coming back from the
/// codec can be given their source timestamps again.
///
/// Decode timestamps are taken from the queue of real timestamps in submission order, the
/// presentation timestamp from the mapping matching the packet.
#[derive(Debug, Default)]
pub struct TimestampMapper {
    mappings: VecDeque<TimeMapping>,
    dts_queue: VecDeque<u64>,
    last_internal: Option<u64>,
    last_stats_ts: u64,
}

impl TimestampMapper {
    pub fn new() -> Self { Self::default() }

    /// Records a submitted frame and returns the codec timestamp to use for it.
    ///
    /// Codec timestamps must strictly increase. A frame whose rescaled timestamp does not is
    /// moved to one tick after the previous one, losing its exact timing.
    pub fn record(&mut self, real: u64, scaled: u64) -> u64 {
        let internal = match self.last_internal {
            Some(last) if scaled <= last => {
                log::debug!("Timestamp {real} us rescaled to {scaled}, not after {last}, using {}", last + 1);
                last + 1
            }
            _ => scaled,
        };
        self.last_internal = Some(internal);
        self.mappings.push_back(TimeMapping { real, internal });
        self.dts_queue.push_back(real);
        internal
    }

    /// Codec timestamp for the next flush request.
    pub fn next_flush_timestamp(&mut self, frame_duration: u64) -> u64 {
        let pts = self.last_internal.map_or(0, |last| last + frame_duration);
        self.last_internal = Some(pts);
        pts
    }

    pub fn last_internal(&self) -> Option<u64> { self.last_internal }

    /// (decode, presentation) source timestamps for a packet the codec returned with `internal`.
    ///
    /// Panics if `internal` was never handed out by `record`, which means the codec made up a timestamp.
    pub fn recover_real(&mut self, internal: u64) -> (u64, u64) {
        let Some(pos) = self.mappings.iter().position(|m| m.internal == internal) else {
            panic!("cannot find a real timestamp for internal timestamp {internal}, pending: {:?}", self.mappings);
        };
        let Some(mapping) = self.mappings.remove(pos) else { unreachable!() };
        let Some(dts) = self.dts_queue.pop_front() else {
            panic!("decode timestamp queue empty while mapping {internal}");
        };
        (dts, mapping.real)
    }

    /// Timestamp for a first pass stats record. Stats carry no timestamp, so they get the oldest
    /// submitted one, or the previous one plus `frame_increment_us` when more records than frames come out.
    pub fn next_stats_timestamp(&mut self, frame_increment_us: u64) -> u64 {
        match self.dts_queue.pop_front() {
            Some(ts) => {
                self.mappings.pop_front();
                self.last_stats_ts = ts;
            }
            None => self.last_stats_ts += frame_increment_us,
        }
        self.last_stats_ts
    }

    /// Frames submitted but not yet returned by the codec
    pub fn pending(&self) -> usize { self.mappings.len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_forces_strictly_increasing_timestamps() {
        let mut mapper = TimestampMapper::new();
        assert_eq!(mapper.record(0, 0), 0);
        assert_eq!(mapper.record(40000, 1), 1);
        assert_eq!(mapper.record(40000, 1), 2);
        assert_eq!(mapper.record(20000, 0), 3);
        assert_eq!(mapper.record(200000, 5), 5);
        assert_eq!(mapper.last_internal(), Some(5));
    }

    #[test]
    fn recovers_in_any_order() {
        let mut mapper = TimestampMapper::new();
        for i in 0..4 {
            mapper.record(i * 1000, i * 10);
        }
        assert_eq!(mapper.recover_real(20), (0, 2000));
        assert_eq!(mapper.recover_real(0), (1000, 0));
        assert_eq!(mapper.recover_real(30), (2000, 3000));
        assert_eq!(mapper.recover_real(10), (3000, 1000));
        assert_eq!(mapper.pending(), 0);
    }

    #[test]
    #[should_panic(expected = "cannot find a real timestamp")]
    fn unknown_internal_timestamp_is_fatal() {
        let mut mapper = TimestampMapper::new();
        mapper.record(0, 0);
        mapper.recover_real(7);
    }

    #[test]
    fn stats_timestamps_extrapolate_when_exhausted() {
        let mut mapper = TimestampMapper::new();
        mapper.record(0, 0);
        mapper.record(40000, 1);
        assert_eq!(mapper.next_stats_timestamp(40000), 0);
        assert_eq!(mapper.next_stats_timestamp(40000), 40000);
        assert_eq!(mapper.next_stats_timestamp(40000), 80000);
        assert_eq!(mapper.next_stats_timestamp(40000), 120000);
        assert_eq!(mapper.pending(), 0);
    }

    #[test]
    fn flush_timestamps_continue_after_last_frame() {
        let mut mapper = TimestampMapper::new();
        assert_eq!(mapper.next_flush_timestamp(3), 0);
        mapper.record(0, 10);
        assert_eq!(mapper.next_flush_timestamp(3), 13);
        assert_eq!(mapper.next_flush_timestamp(3), 16);
    }
}
