pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Average bitrate in kbit/s needed to fit `size_mb` megabytes into `duration_us`.
pub fn average_bitrate_from_duration(duration_us: u64, size_mb: u32) -> Option<u32> {
    if duration_us == 0 || size_mb == 0 { return None; }
    let bits = size_mb as f64 * 1024.0 * 1024.0 * 8.0;
    let kbps = bits / (duration_us as f64 / 1_000_000.0) / 1000.0;
    if kbps < 1.0 || kbps > u32::MAX as f64 { return None; }
    Some(kbps as u32)
}

/// Number of encoder threads to use: host CPU count when `auto`, clamped to `1..=max`.
pub fn thread_count(auto: bool, configured: u32, max: u32) -> u32 {
    let threads = if auto { num_cpus::get() as u32 } else { configured };
    threads.clamp(1, max)
}
