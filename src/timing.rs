// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2025 Adrian <adrian.eddy at gmail>

use crate::types::{ EncoderError, Rational };
use crate::util::gcd;

/// Upper bound for codec time base denominators and for frame durations in codec ticks.
pub const MAX_CLOCK: u32 = 180_000;

// Frame rates as reduced (fps numerator, fps denominator)
const STD_FRAME_RATES: &[(u64, u64)] = &[
    (24000, 1001), (24, 1),
    (25, 1),
    (30000, 1001), (30, 1),
    (50, 1),
    (60000, 1001), (60, 1),
];

/// Whether a time base (seconds per tick) corresponds to one of the common broadcast/film frame rates.
pub fn is_std_frame_rate(time_base: Rational) -> bool {
    let (fps_num, fps_den) = (time_base.den() as u64, time_base.num() as u64);
    if fps_num == 0 || fps_den == 0 { return false; }
    let g = gcd(fps_num, fps_den);
    STD_FRAME_RATES.contains(&(fps_num / g, fps_den / g))
}

/// Converts a timestamp in microseconds to ticks of `num/den` seconds.
///
/// The +0.49 bias before truncation (instead of round-to-nearest) is part of the output format,
/// changing it shifts internal timestamps of existing encodes. `None` passes through.
pub fn scale_time(num: u32, den: u32, time: Option<u64>) -> Option<u64> {
    let time = time?;
    assert!(time >> 62 == 0, "timestamp {time} does not fit in 62 bits");
    assert!(num != 0, "time base numerator is zero");
    let mut d = time as f64;
    d /= 1000.0;
    d *= den as f64;
    d /= 1000.0;
    d /= num as f64;
    d += 0.49;
    Some(d as u64)
}

/// Converts ticks of `num/den` seconds back to microseconds, rounding to nearest.
pub fn unscale_time(num: u32, den: u32, ticks: u64) -> u64 {
    assert!(den != 0, "time base denominator is zero");
    let den = den as u128;
    ((ticks as u128 * num as u128 * 1_000_000 + den / 2) / den) as u64
}

/// Best rational approximation of `num/den` with both terms not exceeding `max` (continued fractions).
pub fn reduce(num: u64, den: u64, max: u64) -> (u64, u64) {
    let (mut a0, mut a1) = ((0u64, 1u64), (1u64, 0u64));
    let g = gcd(num, den);
    let (mut num, mut den) = if g != 0 { (num / g, den / g) } else { (num, den) };

    if num <= max && den <= max {
        a1 = (num, den);
        den = 0;
    }

    while den != 0 {
        let mut x = num / den;
        let next_den = num - den * x;
        let a2n = x as u128 * a1.0 as u128 + a0.0 as u128;
        let a2d = x as u128 * a1.1 as u128 + a0.1 as u128;

        if a2n > max as u128 || a2d > max as u128 {
            if a1.0 != 0 { x = (max - a0.0) / a1.0; }
            if a1.1 != 0 { x = x.min((max - a0.1) / a1.1); }
            if den as u128 * (2 * x as u128 * a1.1 as u128 + a0.1 as u128) > num as u128 * a1.1 as u128 {
                a1 = (x * a1.0 + a0.0, x * a1.1 + a0.1);
            }
            break;
        }

        a0 = a1;
        a1 = (a2n as u64, a2d as u64);
        num = den;
        den = next_den;
    }
    a1
}

/// Maps source time (microseconds) onto the codec time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRescaler {
    time_base: Rational,
    frame_duration: u64,
}

impl TimeRescaler {
    /// Picks the codec time base for a source with the given time base and nominal frame increment.
    ///
    /// Standard frame rates keep the source time base and get a duration derived from the increment.
    /// Anything else gets a time base approximated from the increment itself, one tick per frame.
    pub fn new(source_time_base: Rational, frame_increment_us: u64) -> Result<Self, EncoderError> {
        let source_time_base = source_time_base.masked();
        assert!(source_time_base.num() != 0 && source_time_base.den() != 0, "invalid source time base {source_time_base:?}");

        if is_std_frame_rate(source_time_base) {
            let dur = scale_time(source_time_base.num(), source_time_base.den(), Some(frame_increment_us)).unwrap_or(1);
            return Ok(Self {
                time_base: source_time_base,
                frame_duration: dur.clamp(1, MAX_CLOCK as u64),
            });
        }

        let (num, den) = reduce(frame_increment_us, 1_000_000, MAX_CLOCK as u64);
        if num == 0 || den == 0 {
            return Err(EncoderError::InvalidConfig(format!("cannot derive a time base from a frame increment of {frame_increment_us} us")));
        }
        Ok(Self {
            time_base: Rational(num as u32, den as u32),
            frame_duration: 1,
        })
    }

    pub fn time_base(&self) -> Rational { self.time_base }

    /// Nominal frame duration in codec ticks
    pub fn frame_duration(&self) -> u64 { self.frame_duration }

    pub fn to_internal(&self, real_us: u64) -> u64 {
        scale_time(self.time_base.num(), self.time_base.den(), Some(real_us)).unwrap_or_default()
    }

    pub fn to_real(&self, ticks: u64) -> u64 {
        unscale_time(self.time_base.num(), self.time_base.den(), ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STD_RATES: &[(Rational, u64)] = &[
        (Rational(1001, 24000), 41708),
        (Rational(1, 24), 41667),
        (Rational(1, 25), 40000),
        (Rational(1001, 30000), 33367),
        (Rational(1, 30), 33333),
        (Rational(1, 50), 20000),
        (Rational(1001, 60000), 16683),
        (Rational(1, 60), 16667),
    ];

    #[test]
    fn std_rates_are_recognized_regardless_of_scale() {
        assert!(is_std_frame_rate(Rational(1, 25)));
        assert!(is_std_frame_rate(Rational(1000, 25000)));
        assert!(is_std_frame_rate(Rational(1001, 30000)));
        assert!(!is_std_frame_rate(Rational(1, 90000)));
        assert!(!is_std_frame_rate(Rational(1, 1000)));
        assert!(!is_std_frame_rate(Rational(0, 25)));
    }

    #[test]
    fn scale_time_bias() {
        // 0.5 tick is not enough to round up, 0.52 is
        assert_eq!(scale_time(1, 25, Some(20000)), Some(0));
        assert_eq!(scale_time(1, 25, Some(20800)), Some(1));
        assert_eq!(scale_time(1, 25, Some(40000)), Some(1));
        assert_eq!(scale_time(1, 90000, Some(1_000_000)), Some(90000));
        assert_eq!(scale_time(1, 25, None), None);
    }

    #[test]
    #[should_panic]
    fn scale_time_rejects_63_bit_timestamps() {
        scale_time(1, 25, Some(1 << 62));
    }

    #[test]
    #[should_panic]
    fn scale_time_rejects_zero_numerator() {
        scale_time(0, 25, Some(0));
    }

    #[test]
    fn std_rates_round_trip() {
        for &(tb, increment) in STD_RATES {
            let rescaler = TimeRescaler::new(tb, increment).unwrap();
            assert_eq!(rescaler.time_base(), tb);
            assert_eq!(rescaler.frame_duration(), 1, "{tb:?}");

            let tick_us = unscale_time(tb.num(), tb.den(), 1);
            let mut prev = None;
            for n in 0..5000u64 {
                let real = (n as u128 * tb.num() as u128 * 1_000_000 / tb.den() as u128) as u64;
                let internal = rescaler.to_internal(real);
                assert_eq!(internal, n, "{tb:?} frame {n}");
                let back = rescaler.to_real(internal);
                assert!(back.abs_diff(real) <= tick_us, "{tb:?}: {real} -> {internal} -> {back}");
                if let Some(prev) = prev { assert!(internal > prev); }
                prev = Some(internal);
            }
        }
    }

    #[test]
    fn std_rate_duration_is_clamped() {
        let rescaler = TimeRescaler::new(Rational(1, 25), 0).unwrap();
        assert_eq!(rescaler.frame_duration(), 1);
        let rescaler = TimeRescaler::new(Rational(1, 25), 3_600_000_000_000).unwrap();
        assert_eq!(rescaler.frame_duration(), MAX_CLOCK as u64);
        let rescaler = TimeRescaler::new(Rational(1, 25), 120_000).unwrap();
        assert_eq!(rescaler.frame_duration(), 3);
    }

    #[test]
    fn non_std_rates_get_a_derived_time_base() {
        let rescaler = TimeRescaler::new(Rational(1, 90000), 40000).unwrap();
        assert_eq!(rescaler.time_base(), Rational(1, 25));
        assert_eq!(rescaler.frame_duration(), 1);

        let rescaler = TimeRescaler::new(Rational(1, 1000), 33333).unwrap();
        let tb = rescaler.time_base();
        assert!(tb.den() <= MAX_CLOCK && tb.num() <= MAX_CLOCK);
        let approx = tb.num() as f64 / tb.den() as f64;
        assert!((approx - 0.033333).abs() < 1e-6, "{tb:?}");
        assert_eq!(rescaler.frame_duration(), 1);
    }

    #[test]
    fn zero_increment_on_non_std_rate_fails() {
        assert!(matches!(TimeRescaler::new(Rational(1, 90000), 0), Err(EncoderError::InvalidConfig(_))));
    }

    #[test]
    fn time_base_is_masked() {
        let rescaler = TimeRescaler::new(Rational(0x8000_0001, 25), 40000).unwrap();
        assert_eq!(rescaler.time_base(), Rational(1, 25));
    }

    #[test]
    fn reduce_matches_continued_fractions() {
        assert_eq!(reduce(40000, 1_000_000, 180_000), (1, 25));
        assert_eq!(reduce(2, 4, 10), (1, 2));
        assert_eq!(reduce(33333, 1_000_000, 180_000), (3333, 99991));
        assert_eq!(reduce(33367, 1_000_000, 180_000), (2709, 81188));
        assert_eq!(reduce(10001, 1_000_000, 180_000), (100, 9999));
        assert_eq!(reduce(1, 1_000_000, 180_000), (0, 1));
    }

    #[test]
    fn reduce_never_picks_a_worse_semiconvergent() {
        for increment in (1..200_000u64).step_by(7) {
            let (num, den) = reduce(increment, 1_000_000, MAX_CLOCK as u64);
            assert!(num <= MAX_CLOCK as u64 && den <= MAX_CLOCK as u64 && den != 0);
            let err = (num as f64 / den as f64 - increment as f64 / 1e6).abs();
            // a tighter bound never yields a closer fraction
            let (cnum, cden) = reduce(increment, 1_000_000, den.saturating_sub(1).max(1));
            if cden != 0 && (cnum, cden) != (num, den) {
                let cerr = (cnum as f64 / cden as f64 - increment as f64 / 1e6).abs();
                assert!(err <= cerr + 1e-15, "{increment}: {num}/{den} vs {cnum}/{cden}");
            }
        }
    }

    #[test]
    fn microsecond_increment_has_no_time_base() {
        assert!(matches!(TimeRescaler::new(Rational(1, 90000), 1), Err(EncoderError::InvalidConfig(_))));
    }
}
