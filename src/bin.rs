// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use encode_pipeline::*;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const OUTPUT_BUFFER_SIZE: usize = 1 << 20;

fn run_pass(settings: &Settings, options: &PassOptions, frames: u64, crc: &mut crc32fast::Hasher) -> Result<SessionSummary, EncoderError> {
    let codec = Encoder::find("simulated")?;
    let source = SyntheticSource::new(WIDTH, HEIGHT, Rational(1, 25), 40_000, frames);
    let mut session = EncodeSession::setup(codec.as_ref(), source, settings, options)?;

    let mut out = OutputPacket::with_capacity(OUTPUT_BUFFER_SIZE);
    while session.produce_one(&mut out)? {
        if session.pass() == Pass::First {
            println!("Stats at {} us", out.pts);
        } else {
            println!("Packet dts {} pts {}: {} bytes, key: {}, q: {}", out.dts, out.pts, out.data().len(), out.keyframe, out.quantizer);
            crc.update(out.data());
        }
    }
    session.close()
}

fn main() -> Result<(), EncoderError> {
    let _time = std::time::Instant::now();

    let _ = simple_log::new(simple_log::LogConfig::default());

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let frames = match args.next() {
        Some(n) => n.parse().map_err(|e| EncoderError::Settings(format!("invalid frame count {n:?}: {e}")))?,
        None => 50,
    };

    let mut crc = crc32fast::Hasher::new();
    if settings.is_dual_pass() {
        let stats = std::env::temp_dir().join(format!("encode_pipeline_{}.stats", std::process::id()));
        let first = run_pass(&settings, &PassOptions::first(&stats), frames, &mut crc)?;
        println!("First pass: {first:?}");
        let second = run_pass(&settings, &PassOptions::second(&stats), frames, &mut crc);
        let _ = std::fs::remove_file(&stats);
        println!("Second pass: {:?}", second?);
    } else {
        println!("{:?}", run_pass(&settings, &PassOptions::single(), frames, &mut crc)?);
    }

    println!("Output CRC32: {:08x}", crc.finalize());
    println!("Done in {:.3}s ", _time.elapsed().as_millis() as f64 / 1000.0);
    Ok(())
}
